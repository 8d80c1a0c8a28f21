//! Data access layer: every read and write of feedback goes through here, with the access
//! rules applied before the backend is touched.

use std::sync::Arc;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::access::{authorize_create, authorize_scope, redact_change, require_identity, Scope};
use crate::error::{PortalError, Result};
use crate::models::{
    ChangeEvent, FeedbackChange, FeedbackRecord, FeedbackSubmission, Identity, Role,
};
use crate::role;
use crate::store::FeedbackBackend;
use crate::validation::validate_submission;

#[derive(Clone)]
pub struct FeedbackService {
    backend: Arc<dyn FeedbackBackend>,
}

impl FeedbackService {
    pub fn new(backend: Arc<dyn FeedbackBackend>) -> Self {
        Self { backend }
    }

    pub async fn resolve_role(&self, identity: Option<&Identity>) -> Result<Role> {
        role::resolve_role(self.backend.as_ref(), identity).await
    }

    /// Assigns `role` to `target`. Once any admin exists only an admin `actor` may do this;
    /// before that the first assignment bootstraps the portal.
    pub async fn assign_role(
        &self,
        actor: Option<&Identity>,
        target: &Identity,
        role: Role,
    ) -> Result<()> {
        if self.backend.admin_count().await? > 0 {
            let actor = require_identity(actor)?;
            if self.resolve_role(Some(actor)).await? != Role::Admin {
                return Err(PortalError::Forbidden("assigning roles requires the admin role"));
            }
        }

        self.backend.assign_role(target, role).await?;
        info!(%target, %role, "role assigned");
        Ok(())
    }

    /// Validates and stores a submission authored by `identity`. Nothing reaches the
    /// backend unless authentication and validation both pass.
    pub async fn submit(
        &self,
        identity: Option<&Identity>,
        input: &FeedbackSubmission,
    ) -> Result<FeedbackRecord> {
        let author = authorize_create(identity)?;
        let draft = validate_submission(author, input)?;
        let record = self.backend.insert(author, &draft).await?;

        info!(
            id = %record.id,
            category = %record.category,
            anonymous = record.is_anonymous,
            "feedback stored"
        );
        Ok(record)
    }

    /// Records authored by `identity`, newest first.
    pub async fn fetch_own(&self, identity: Option<&Identity>) -> Result<Vec<FeedbackRecord>> {
        let viewer = require_identity(identity)?;
        let records = self.backend.select(viewer, &Scope::Own(*viewer)).await?;
        debug!(%viewer, count = records.len(), "fetched own feedback");
        Ok(records)
    }

    /// Every record, newest first. Admin only.
    pub async fn fetch_all(&self, identity: Option<&Identity>) -> Result<Vec<FeedbackRecord>> {
        let viewer = require_identity(identity)?;
        let role = self.resolve_role(Some(viewer)).await?;
        authorize_scope(viewer, role, &Scope::All)?;

        let records = self.backend.select(viewer, &Scope::All).await?;
        debug!(%viewer, count = records.len(), "fetched all feedback");
        Ok(records)
    }

    /// Calls `on_change` once for every insert in `scope` committed after this returns,
    /// until the returned handle is unsubscribed or dropped. The author is redacted for
    /// the subscribing viewer exactly as in `access::redact`.
    pub async fn subscribe<F>(
        &self,
        identity: Option<&Identity>,
        scope: Scope,
        on_change: F,
    ) -> Result<Subscription>
    where
        F: Fn(FeedbackChange) + Send + 'static,
    {
        let viewer = *require_identity(identity)?;
        let role = self.resolve_role(Some(&viewer)).await?;
        authorize_scope(&viewer, role, &scope)?;

        let mut receiver = self.backend.changes().await?;
        let (cancel, mut cancelled) = oneshot::channel::<()>();
        info!(%viewer, ?scope, "subscribed to feedback changes");

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut cancelled => {
                        // Deliver what was already queued, then stop.
                        loop {
                            match receiver.try_recv() {
                                Ok(event) => deliver(&event, &scope, &viewer, &on_change),
                                Err(TryRecvError::Lagged(_)) => continue,
                                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                            }
                        }
                        break;
                    }
                    received = receiver.recv() => match received {
                        Ok(event) => deliver(&event, &scope, &viewer, &on_change),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "subscriber fell behind, some changes were dropped");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });

        Ok(Subscription {
            cancel: Some(cancel),
            handle: Some(handle),
        })
    }
}

fn deliver<F>(event: &ChangeEvent, scope: &Scope, viewer: &Identity, on_change: &F)
where
    F: Fn(FeedbackChange),
{
    if scope.matches(event.author_id) {
        on_change(redact_change(event, viewer));
    }
}

/// Live-update registration. Dropping it also cancels.
pub struct Subscription {
    cancel: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Stops further callbacks. Changes already queued for this subscriber are still
    /// delivered; once this returns the callback is never invoked again.
    pub async fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
            debug!("unsubscribed from feedback changes");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}
