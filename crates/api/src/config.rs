//! `RepositoryConfig`: the closed configuration enumeration of spec.md
//! §6.6, loaded once at process start (spec.md §5 "Global state") and
//! handed down as an `Arc<RepositoryConfig>` — there is no process-wide
//! config singleton.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Postgres,
    Sqlserver,
    Sqlite,
    /// Not part of the closed enumeration in spec.md §6.6; the reference
    /// deployment's in-process development/test backend.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConfig {
    #[serde(default = "default_max_events_per_call")]
    pub max_events_per_call: usize,
    #[serde(default = "default_max_events_returned_in_query")]
    pub max_events_returned_in_query: u32,
    #[serde(default = "default_capture_size_limit")]
    pub capture_size_limit: usize,
    #[serde(default = "default_storage_provider")]
    pub storage_provider: StorageProvider,
    #[serde(default)]
    pub connection_string: Option<String>,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_pagination_secret")]
    pub pagination_secret: String,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_max_events_per_call() -> usize {
    500
}

fn default_max_events_returned_in_query() -> u32 {
    20_000
}

fn default_capture_size_limit() -> usize {
    10 * 1024 * 1024
}

fn default_storage_provider() -> StorageProvider {
    StorageProvider::Memory
}

fn default_command_timeout_secs() -> u64 {
    30
}

fn default_pagination_secret() -> String {
    tracing::warn!("paginationSecret not configured; using an insecure dev default");
    "dev-pagination-secret".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

impl RepositoryConfig {
    /// Load from (in increasing priority) built-in defaults, an optional
    /// `epcis.toml`/`epcis.yaml` in the working directory, and `EPCIS_*`
    /// environment variables (e.g. `EPCIS_MAX_EVENTS_PER_CALL=1000`,
    /// `EPCIS_STORAGE_PROVIDER=postgres`).
    pub fn load() -> anyhow::Result<Self> {
        let raw = config::Config::builder()
            .add_source(config::File::with_name("epcis").required(false))
            .add_source(config::Environment::with_prefix("EPCIS").separator("_"))
            .build()?;
        Ok(raw.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let raw = config::Config::builder().build().unwrap();
        let cfg: RepositoryConfig = raw.try_deserialize().unwrap();
        assert_eq!(cfg.max_events_per_call, 500);
        assert_eq!(cfg.max_events_returned_in_query, 20_000);
        assert!(matches!(cfg.storage_provider, StorageProvider::Memory));
    }
}
