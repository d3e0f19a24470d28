//! Typed EPC (Electronic Product Code) references owned by an Event.

use serde::{Deserialize, Serialize};

/// The role an EPC plays within its owning event.
///
/// Spec.md §4.1 step 5 ("EPC partitioning"): the decoder partitions the
/// source document's per-variant EPC lists (`epcList`, `childEPCs`,
/// `parentID`, `inputEPCList`, `outputEPCList`) into this single tagged
/// representation so encoders and the query engine don't need to know which
/// XML/JSON element a given EPC originally came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpcType {
    /// ObjectEvent `epcList` member.
    List,
    /// AggregationEvent `childEPCs` member.
    ChildEpc,
    /// AggregationEvent `parentID`.
    ParentId,
    /// TransformationEvent `inputEPCList` member.
    InputEpc,
    /// TransformationEvent `outputEPCList` member.
    OutputEpc,
    /// A quantity-bearing element (`quantityList` / `childQuantityList` /
    /// `inputQuantityList` / `outputQuantityList`), distinguished from its
    /// plain counterpart by carrying `quantity`/`unit_of_measure`.
    Quantity,
}

/// A single typed identifier reference belonging to one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Epc {
    pub epc_type: EpcType,
    /// The EPC or EPC class URI, e.g. `urn:epc:id:sgtin:8901213.105919.000000`.
    pub id: String,
    pub quantity: Option<f64>,
    pub unit_of_measure: Option<String>,
}

impl Epc {
    pub fn new(epc_type: EpcType, id: impl Into<String>) -> Self {
        Self {
            epc_type,
            id: id.into(),
            quantity: None,
            unit_of_measure: None,
        }
    }

    pub fn with_quantity(mut self, quantity: f64, unit_of_measure: Option<String>) -> Self {
        self.quantity = Some(quantity);
        self.unit_of_measure = unit_of_measure;
        self
    }

    /// The pattern-match target used by `MATCH_epcClass`/`MATCH_anyEPCClass`:
    /// for quantity-bearing class-level EPCs this is still just `id`.
    pub fn matches_prefix(&self, pattern: &str) -> bool {
        match pattern.strip_suffix('*') {
            Some(prefix) => self.id.starts_with(prefix),
            None => self.id == pattern,
        }
    }
}

/// A reference to a business transaction (order, invoice, etc).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessTransaction {
    /// The business transaction type URI.
    pub transaction_type: String,
    pub id: String,
}

/// A source or destination reference (the `source`/`destination` lists).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDest {
    /// The source/destination type URI (`urn:epcglobal:cbv:sdt:owning_party`, ...).
    pub sdt_type: String,
    pub id: String,
}
