//! HTTP Basic credential parsing (spec.md §6.3: "the repository accepts
//! HTTP Basic credentials and resolves them to a tenant via an identity
//! oracle; it does not itself model users, roles, or sessions").

use base64::Engine;

use crate::error::AuthError;

/// A decoded `Authorization: Basic` pair. Never logged or `Debug`-printed in
/// full — only `username` is safe to surface in traces.
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Parse the raw `Authorization` header value.
    pub fn from_header(value: &str) -> Result<Self, AuthError> {
        let encoded = value
            .strip_prefix("Basic ")
            .ok_or(AuthError::UnsupportedScheme)?;

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|_| AuthError::MalformedHeader)?;

        let decoded = String::from_utf8(decoded).map_err(|_| AuthError::MalformedHeader)?;

        let (username, password) = decoded
            .split_once(':')
            .ok_or(AuthError::MalformedHeader)?;

        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(raw: &str) -> String {
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(raw)
        )
    }

    #[test]
    fn parses_well_formed_header() {
        let header = encode("acme:s3cret");
        let creds = Credentials::from_header(&header).unwrap();
        assert_eq!(creds.username, "acme");
        assert_eq!(creds.password, "s3cret");
    }

    #[test]
    fn rejects_non_basic_scheme() {
        let err = Credentials::from_header("Bearer abc").unwrap_err();
        assert_eq!(err, AuthError::UnsupportedScheme);
    }

    #[test]
    fn rejects_missing_colon() {
        let header = encode("no-colon-here");
        let err = Credentials::from_header(&header).unwrap_err();
        assert_eq!(err, AuthError::MalformedHeader);
    }
}
