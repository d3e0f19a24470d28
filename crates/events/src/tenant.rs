use epcis_core::TenantId;

use crate::RepositoryNotification;

/// Marks message types that carry a tenant id, so bus consumers can filter
/// or pin themselves to one tenant (e.g. a subscription worker that only
/// wants notifications for the tenant it was registered under).
pub trait TenantScoped {
    fn tenant_id(&self) -> TenantId;
}

impl TenantScoped for RepositoryNotification {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id.clone()
    }
}
