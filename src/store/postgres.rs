use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgListener, PgRow};
use sqlx::{PgConnection, PgPool, Row};
use tokio::sync::{broadcast, OnceCell};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{FeedbackBackend, CHANGE_CHANNEL_CAPACITY};
use crate::access::Scope;
use crate::error::{PortalError, Result};
use crate::models::{ChangeEvent, FeedbackRecord, Identity, NewFeedback, Role};

const CHANGE_CHANNEL: &str = "feedback_changes";
const LISTENER_RETRY: Duration = Duration::from_secs(2);

const RECORD_COLUMNS: &str =
    "id, author_id, category, subject, rating, feedback_text, is_anonymous, created_at";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub struct PgBackend {
    pool: PgPool,
    changes: broadcast::Sender<ChangeEvent>,
    listener: OnceCell<()>,
}

impl PgBackend {
    pub fn new(pool: PgPool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            pool,
            changes,
            listener: OnceCell::new(),
        }
    }

    async fn start_listener(&self) -> Result<()> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;
        info!(channel = CHANGE_CHANNEL, "listening for feedback inserts");

        tokio::spawn(forward_notifications(
            listener,
            self.changes.clone(),
            LISTENER_RETRY,
        ));
        Ok(())
    }
}

#[async_trait]
trait NotificationSource: Send {
    async fn next_payload(&mut self) -> std::result::Result<String, sqlx::Error>;
}

#[async_trait]
impl NotificationSource for PgListener {
    async fn next_payload(&mut self) -> std::result::Result<String, sqlx::Error> {
        // A lost connection is re-established on the next call.
        let notification = self.recv().await?;
        Ok(notification.payload().to_string())
    }
}

/// Publishes every insert notification from `source`. Receive errors are retried after
/// `retry` so a dropped connection never ends the stream.
async fn forward_notifications<S: NotificationSource>(
    mut source: S,
    sender: broadcast::Sender<ChangeEvent>,
    retry: Duration,
) {
    loop {
        match source.next_payload().await {
            Ok(payload) => match serde_json::from_str::<ChangeEvent>(&payload) {
                Ok(event) => {
                    debug!(id = %event.id, "feedback insert notification");
                    let _ = sender.send(event);
                }
                Err(err) => warn!(%err, "ignoring malformed change payload"),
            },
            Err(err) => {
                warn!(
                    %err,
                    retry_ms = retry.as_millis() as u64,
                    "change listener failed, retrying"
                );
                tokio::time::sleep(retry).await;
            }
        }
    }
}

/// Scopes the row-level security policies of the current transaction to `actor`.
async fn act_as(conn: &mut PgConnection, actor: &Identity) -> Result<()> {
    sqlx::query("SELECT set_config('feedback_portal.identity', $1, true)")
        .bind(actor.to_string())
        .execute(conn)
        .await?;
    Ok(())
}

fn record_from_row(row: &PgRow) -> Result<FeedbackRecord> {
    let category: String = row.try_get("category")?;
    let category = category
        .parse()
        .map_err(|err| PortalError::StorageError(format!("corrupt row: {err}")))?;

    Ok(FeedbackRecord {
        id: row.try_get("id")?,
        author_id: row.try_get("author_id")?,
        category,
        subject: row.try_get("subject")?,
        rating: row.try_get("rating")?,
        text: row.try_get("feedback_text")?,
        is_anonymous: row.try_get("is_anonymous")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl FeedbackBackend for PgBackend {
    async fn insert(&self, actor: &Identity, draft: &NewFeedback) -> Result<FeedbackRecord> {
        let mut tx = self.pool.begin().await?;
        act_as(&mut tx, actor).await?;

        let query = format!(
            r#"
            INSERT INTO feedback_portal.feedbacks
            (id, author_id, category, subject, rating, feedback_text, is_anonymous)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {RECORD_COLUMNS}
            "#
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(draft.author_id)
            .bind(draft.category.label())
            .bind(draft.subject.as_deref())
            .bind(draft.rating)
            .bind(&draft.text)
            .bind(draft.is_anonymous)
            .fetch_one(&mut *tx)
            .await?;
        let record = record_from_row(&row)?;

        tx.commit().await?;
        Ok(record)
    }

    async fn select(&self, actor: &Identity, scope: &Scope) -> Result<Vec<FeedbackRecord>> {
        let mut tx = self.pool.begin().await?;
        act_as(&mut tx, actor).await?;

        let mut query = format!("SELECT {RECORD_COLUMNS} FROM feedback_portal.feedbacks");
        if let Scope::Own(_) = scope {
            query.push_str(" WHERE author_id = $1");
        }
        query.push_str(" ORDER BY created_at DESC, seq DESC");

        let mut rows = sqlx::query(&query);
        if let Scope::Own(owner) = scope {
            rows = rows.bind(owner.id());
        }
        let rows = rows.fetch_all(&mut *tx).await?;
        tx.commit().await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn role_of(&self, identity: &Identity) -> Result<Option<Role>> {
        let role: Option<String> =
            sqlx::query_scalar("SELECT role FROM feedback_portal.user_roles WHERE user_id = $1")
                .bind(identity.id())
                .fetch_optional(&self.pool)
                .await?;

        role.map(|value| value.parse().map_err(PortalError::StorageError))
            .transpose()
    }

    async fn assign_role(&self, identity: &Identity, role: Role) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO feedback_portal.user_roles (user_id, role)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET role = EXCLUDED.role
            "#,
        )
        .bind(identity.id())
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn admin_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM feedback_portal.user_roles WHERE role = 'admin'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn changes(&self) -> Result<broadcast::Receiver<ChangeEvent>> {
        // Subscribe before the listener can deliver so the first event is not missed.
        let receiver = self.changes.subscribe();
        self.listener
            .get_or_try_init(|| self.start_listener())
            .await?;
        Ok(receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use tokio::time::timeout;

    struct ScriptedSource(VecDeque<std::result::Result<String, sqlx::Error>>);

    #[async_trait]
    impl NotificationSource for ScriptedSource {
        async fn next_payload(&mut self) -> std::result::Result<String, sqlx::Error> {
            match self.0.pop_front() {
                Some(next) => next,
                None => std::future::pending().await,
            }
        }
    }

    #[tokio::test]
    async fn listener_keeps_forwarding_after_a_receive_error() {
        let (sender, mut receiver) = broadcast::channel(8);
        let event = ChangeEvent {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            is_anonymous: true,
        };
        let source = ScriptedSource(VecDeque::from([
            Err(sqlx::Error::PoolClosed),
            Ok("not json".to_string()),
            Ok(serde_json::to_string(&event).unwrap()),
        ]));

        let task = tokio::spawn(forward_notifications(
            source,
            sender,
            Duration::from_millis(10),
        ));
        let received = timeout(Duration::from_secs(1), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, event);
        assert!(!task.is_finished());
        task.abort();
    }

    #[test]
    fn change_payload_carries_anonymity_flag() {
        let id = Uuid::new_v4();
        let author = Uuid::new_v4();
        let payload = format!(r#"{{"id":"{id}","author_id":"{author}","is_anonymous":false}}"#);
        let event: ChangeEvent = serde_json::from_str(&payload).unwrap();
        assert_eq!(event.author_id, author);
        assert!(!event.is_anonymous);
    }
}
