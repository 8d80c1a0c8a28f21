//! Persistence backend seam.
//!
//! The core never talks to storage directly; everything goes through a single long-lived
//! `Arc<dyn FeedbackBackend>` constructed once in `main`.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::access::Scope;
use crate::error::Result;
use crate::models::{ChangeEvent, FeedbackRecord, Identity, NewFeedback, Role};

#[cfg(test)]
pub mod memory;
pub mod postgres;

#[async_trait]
pub trait FeedbackBackend: Send + Sync {
    /// Persists `draft` on behalf of `actor` and returns the stored row with its
    /// server-assigned `id` and `created_at`.
    async fn insert(&self, actor: &Identity, draft: &NewFeedback) -> Result<FeedbackRecord>;

    /// Rows in `scope` that `actor` may see, newest first. The backend applies its own row
    /// policy, so a non-admin asking for `Scope::All` only gets its own rows back.
    async fn select(&self, actor: &Identity, scope: &Scope) -> Result<Vec<FeedbackRecord>>;

    /// Explicit role assignment, `None` when the identity has no row.
    async fn role_of(&self, identity: &Identity) -> Result<Option<Role>>;

    async fn assign_role(&self, identity: &Identity, role: Role) -> Result<()>;

    /// Number of identities holding the admin role.
    async fn admin_count(&self) -> Result<i64>;

    /// Stream of insert notifications, published after the row is committed.
    async fn changes(&self) -> Result<broadcast::Receiver<ChangeEvent>>;
}

pub(crate) const CHANGE_CHANNEL_CAPACITY: usize = 256;
