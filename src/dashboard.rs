use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::access::{can_read, redact, require_identity, Capability, Scope};
use crate::aggregate::aggregate;
use crate::error::Result;
use crate::models::{AggregateStats, FeedbackView, Identity, Role};
use crate::service::FeedbackService;

/// A viewer's dashboard. The variant is picked once per view from the resolved role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dashboard {
    Student(Identity),
    Admin(Identity),
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub role: Role,
    pub generated_at: DateTime<Utc>,
    pub stats: AggregateStats,
    pub records: Vec<FeedbackView>,
}

impl Dashboard {
    pub async fn open(service: &FeedbackService, identity: Option<&Identity>) -> Result<Self> {
        let viewer = *require_identity(identity)?;
        Ok(match service.resolve_role(Some(&viewer)).await? {
            Role::Student => Dashboard::Student(viewer),
            Role::Admin => Dashboard::Admin(viewer),
        })
    }

    pub fn viewer(&self) -> &Identity {
        match self {
            Dashboard::Student(viewer) | Dashboard::Admin(viewer) => viewer,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Dashboard::Student(_) => Role::Student,
            Dashboard::Admin(_) => Role::Admin,
        }
    }

    pub fn capability(&self) -> Capability {
        self.role().capability()
    }

    /// Rows this dashboard watches for changes.
    pub fn scope(&self) -> Scope {
        match self.capability() {
            Capability::ViewOwn => Scope::Own(*self.viewer()),
            Capability::ViewAll => Scope::All,
        }
    }

    /// Fetches the visible set and aggregates it as of `now`.
    pub async fn load(
        &self,
        service: &FeedbackService,
        now: DateTime<Utc>,
    ) -> Result<DashboardSnapshot> {
        let viewer = self.viewer();
        let records = match self.capability() {
            Capability::ViewOwn => service.fetch_own(Some(viewer)).await?,
            Capability::ViewAll => service.fetch_all(Some(viewer)).await?,
        };

        let mut stats = aggregate(&records, now);
        if self.capability() == Capability::ViewOwn {
            stats.anonymous_count = 0;
        }

        Ok(DashboardSnapshot {
            role: self.role(),
            generated_at: now,
            stats,
            records: records
                .iter()
                .filter(|record| can_read(viewer, self.role(), record))
                .map(|record| redact(record, viewer))
                .collect(),
        })
    }
}
