//! Decoder/encoder error model (spec.md §4.1 "Fails with").

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("document is not well-formed: {0}")]
    MalformedDocument(String),

    #[error("document failed schema validation: {0}")]
    SchemaInvalid(String),

    #[error("unsupported schemaVersion '{0}'")]
    UnsupportedVersion(String),

    #[error("document exceeds the configured byte budget ({actual} > {limit})")]
    OversizedDocument { actual: usize, limit: usize },

    #[error("unsupported content type '{0}'")]
    UnsupportedContentType(String),
}

pub type CodecResult<T> = Result<T, CodecError>;
