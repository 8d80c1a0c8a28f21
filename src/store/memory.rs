use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use super::{FeedbackBackend, CHANGE_CHANNEL_CAPACITY};
use crate::access::Scope;
use crate::error::{PortalError, Result};
use crate::models::{ChangeEvent, FeedbackRecord, Identity, NewFeedback, Role};

/// In-process backend that mirrors the PostgreSQL row policy.
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    changes: broadcast::Sender<ChangeEvent>,
    pub fail_writes: AtomicBool,
}

#[derive(Default)]
struct MemoryState {
    rows: Vec<FeedbackRecord>,
    roles: HashMap<Uuid, Role>,
    last_created: Option<DateTime<Utc>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(MemoryState::default()),
            changes,
            fail_writes: AtomicBool::new(false),
        }
    }
}

impl MemoryBackend {
    pub async fn row_count(&self) -> usize {
        self.state.lock().await.rows.len()
    }
}

#[async_trait]
impl FeedbackBackend for MemoryBackend {
    async fn insert(&self, actor: &Identity, draft: &NewFeedback) -> Result<FeedbackRecord> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(PortalError::StorageError("backend unavailable".to_string()));
        }
        if draft.author_id != actor.id() {
            return Err(PortalError::StorageError(
                "new row violates row-level security policy".to_string(),
            ));
        }

        let mut state = self.state.lock().await;
        let now = Utc::now();
        let created_at = state.last_created.map_or(now, |last| last.max(now));
        state.last_created = Some(created_at);

        let record = FeedbackRecord {
            id: Uuid::new_v4(),
            author_id: draft.author_id,
            category: draft.category,
            subject: draft.subject.clone(),
            rating: draft.rating,
            text: draft.text.clone(),
            is_anonymous: draft.is_anonymous,
            created_at,
        };
        state.rows.push(record.clone());
        drop(state);

        let _ = self.changes.send(ChangeEvent {
            id: record.id,
            author_id: record.author_id,
            is_anonymous: record.is_anonymous,
        });
        Ok(record)
    }

    async fn select(&self, actor: &Identity, scope: &Scope) -> Result<Vec<FeedbackRecord>> {
        let state = self.state.lock().await;
        let is_admin = state.roles.get(&actor.id()) == Some(&Role::Admin);

        Ok(state
            .rows
            .iter()
            .rev()
            .filter(|row| scope.matches(row.author_id))
            .filter(|row| is_admin || row.author_id == actor.id())
            .cloned()
            .collect())
    }

    async fn role_of(&self, identity: &Identity) -> Result<Option<Role>> {
        Ok(self.state.lock().await.roles.get(&identity.id()).copied())
    }

    async fn assign_role(&self, identity: &Identity, role: Role) -> Result<()> {
        self.state.lock().await.roles.insert(identity.id(), role);
        Ok(())
    }

    async fn admin_count(&self) -> Result<i64> {
        let state = self.state.lock().await;
        Ok(state.roles.values().filter(|role| **role == Role::Admin).count() as i64)
    }

    async fn changes(&self) -> Result<broadcast::Receiver<ChangeEvent>> {
        Ok(self.changes.subscribe())
    }
}
