//! Identity oracle: resolves HTTP Basic credentials to a tenant id.
//!
//! Spec.md §6.3 deliberately keeps identity out of scope for the repository
//! proper — "the repository trusts whatever authenticated the caller." This
//! crate is that trust boundary's simplest possible implementation: a static
//! table of credential hash → tenant, loaded from `RepositoryConfig`
//! (SPEC_FULL.md §2.3), with one super-user credential that may act on
//! behalf of any tenant it names explicitly.

use std::collections::HashMap;

use base64::Engine;
use sha2::{Digest, Sha256};

use epcis_core::TenantId;

use crate::credentials::Credentials;
use crate::error::AuthError;

fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(digest)
}

/// Resolves a set of credentials to the tenant they are allowed to act as.
pub trait IdentityOracle: Send + Sync {
    /// `on_behalf_of` is `Some` only when the caller named a target tenant
    /// explicitly (e.g. an `X-Epcis-Tenant` header); ordinary credentials
    /// ignore it and always resolve to their own tenant.
    fn resolve(
        &self,
        credentials: &Credentials,
        on_behalf_of: Option<&TenantId>,
    ) -> Result<TenantId, AuthError>;
}

struct Account {
    password_hash: String,
    tenant_id: TenantId,
}

/// A fixed, in-config table of accounts (spec.md §6.3's reference
/// implementation; a deployment backed by a directory service can provide
/// its own `IdentityOracle` instead).
pub struct StaticIdentityOracle {
    accounts: HashMap<String, Account>,
    super_user: Option<(String, String)>,
}

impl StaticIdentityOracle {
    pub fn new() -> Self {
        Self {
            accounts: HashMap::new(),
            super_user: None,
        }
    }

    /// Register a tenant-bound account. `password` is hashed immediately;
    /// the plaintext is not retained.
    pub fn with_account(
        mut self,
        username: impl Into<String>,
        password: &str,
        tenant_id: TenantId,
    ) -> Self {
        self.accounts.insert(
            username.into(),
            Account {
                password_hash: hash_password(password),
                tenant_id,
            },
        );
        self
    }

    /// Register the one super-user credential allowed to act on behalf of
    /// any tenant, provided it names one via `on_behalf_of`.
    pub fn with_super_user(mut self, username: impl Into<String>, password: &str) -> Self {
        self.super_user = Some((username.into(), hash_password(password)));
        self
    }
}

impl Default for StaticIdentityOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityOracle for StaticIdentityOracle {
    fn resolve(
        &self,
        credentials: &Credentials,
        on_behalf_of: Option<&TenantId>,
    ) -> Result<TenantId, AuthError> {
        let presented_hash = hash_password(&credentials.password);

        if let Some((su_user, su_hash)) = &self.super_user {
            if su_user == &credentials.username && su_hash == &presented_hash {
                return on_behalf_of
                    .cloned()
                    .ok_or(AuthError::InvalidCredentials);
            }
        }

        let account = self
            .accounts
            .get(&credentials.username)
            .ok_or(AuthError::InvalidCredentials)?;

        if account.password_hash != presented_hash {
            return Err(AuthError::InvalidCredentials);
        }

        if let Some(requested) = on_behalf_of {
            if requested != &account.tenant_id {
                return Err(AuthError::InvalidCredentials);
            }
        }

        Ok(account.tenant_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_account_to_its_own_tenant() {
        let tenant = TenantId::new("acme");
        let oracle = StaticIdentityOracle::new().with_account("acme", "pw", tenant.clone());

        let creds = Credentials {
            username: "acme".into(),
            password: "pw".into(),
        };
        assert_eq!(oracle.resolve(&creds, None).unwrap(), tenant);
    }

    #[test]
    fn rejects_wrong_password() {
        let tenant = TenantId::new("acme");
        let oracle = StaticIdentityOracle::new().with_account("acme", "pw", tenant);

        let creds = Credentials {
            username: "acme".into(),
            password: "wrong".into(),
        };
        assert_eq!(oracle.resolve(&creds, None).unwrap_err(), AuthError::InvalidCredentials);
    }

    #[test]
    fn super_user_must_name_a_tenant() {
        let oracle = StaticIdentityOracle::new().with_super_user("root", "rootpw");
        let creds = Credentials {
            username: "root".into(),
            password: "rootpw".into(),
        };

        assert!(oracle.resolve(&creds, None).is_err());

        let tenant = TenantId::new("any-tenant");
        assert_eq!(oracle.resolve(&creds, Some(&tenant)).unwrap(), tenant);
    }

    #[test]
    fn ordinary_account_cannot_impersonate_another_tenant() {
        let tenant = TenantId::new("acme");
        let other = TenantId::new("other");
        let oracle = StaticIdentityOracle::new().with_account("acme", "pw", tenant);

        let creds = Credentials {
            username: "acme".into(),
            password: "pw".into(),
        };
        assert!(oracle.resolve(&creds, Some(&other)).is_err());
    }
}
