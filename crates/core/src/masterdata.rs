//! MasterData: typed vocabulary entries with hierarchical parent/child refs.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// A typed vocabulary entry (a GS1 CBV URI), with name/value attributes and
/// optional parent/child references used to express hierarchical
/// vocabularies (e.g. a business location that is a "descendant" of a
/// regional distribution center for `WD_bizLocation` query purposes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterData {
    /// The vocabulary type URI, e.g. `urn:epcglobal:epcis:vtype:BusinessLocation`.
    pub vocabulary_type: String,
    /// The vocabulary element's own URI.
    pub id: String,
    pub attributes: HashMap<String, String>,
    pub children: Vec<String>,
}

impl MasterData {
    pub fn new(vocabulary_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            vocabulary_type: vocabulary_type.into(),
            id: id.into(),
            attributes: HashMap::new(),
            children: Vec::new(),
        }
    }
}

/// Resolve the transitive closure of `root`'s descendants within `entries`.
///
/// Grounds spec.md §4.6's `WD_<readPoint|bizLocation>` ("with descendants")
/// parameter family, which spec.md names but does not detail the traversal
/// for (SPEC_FULL.md §2.5). Cycles are tolerated defensively (a malformed
/// vocabulary should not hang a query): each id is visited at most once.
pub fn descendants_of<'a>(root: &str, entries: &'a [MasterData]) -> HashSet<&'a str> {
    let by_id: HashMap<&str, &MasterData> =
        entries.iter().map(|e| (e.id.as_str(), e)).collect();

    let mut seen: HashSet<&str> = HashSet::new();
    let mut stack = vec![root];

    while let Some(id) = stack.pop() {
        if let Some(entry) = by_id.get(id) {
            for child in &entry.children {
                let child = child.as_str();
                if seen.insert(child) {
                    stack.push(child);
                }
            }
        }
    }

    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descendants_of_follows_chain_and_dedupes_cycles() {
        let mut region = MasterData::new("BusinessLocation", "region:east");
        region.children = vec!["site:a".into(), "site:b".into()];
        let mut site_a = MasterData::new("BusinessLocation", "site:a");
        site_a.children = vec!["region:east".into()]; // cycle back to root
        let site_b = MasterData::new("BusinessLocation", "site:b");

        let entries = vec![region, site_a, site_b];
        let descendants = descendants_of("region:east", &entries);

        assert_eq!(descendants.len(), 2);
        assert!(descendants.contains("site:a"));
        assert!(descendants.contains("site:b"));
    }
}
