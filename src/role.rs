use tracing::debug;

use crate::access::require_identity;
use crate::error::Result;
use crate::models::{Identity, Role};
use crate::store::FeedbackBackend;

/// Supplies the identity of whoever is driving the current session.
pub trait IdentityProvider {
    fn current_identity(&self) -> Option<Identity>;
}

/// Identity taken from the command line, falling back to `PORTAL_IDENTITY`.
pub struct CliIdentity(pub Option<Identity>);

impl IdentityProvider for CliIdentity {
    fn current_identity(&self) -> Option<Identity> {
        self.0
    }
}

/// Looks up the explicit role of `identity`, defaulting to `Role::Student` when none is
/// assigned. Not cached: each view lifecycle resolves again.
pub async fn resolve_role(
    backend: &dyn FeedbackBackend,
    identity: Option<&Identity>,
) -> Result<Role> {
    let identity = require_identity(identity)?;
    let role = backend.role_of(identity).await?;
    if role.is_none() {
        debug!(%identity, "no role assigned, defaulting to student");
    }
    Ok(role.unwrap_or_default())
}
