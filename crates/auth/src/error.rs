use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingHeader,

    #[error("unsupported authentication scheme (only HTTP Basic is accepted)")]
    UnsupportedScheme,

    #[error("malformed Authorization header")]
    MalformedHeader,

    #[error("credentials not recognized")]
    InvalidCredentials,
}
