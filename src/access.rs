//! Row-level access rules, independent of the storage technology.
//!
//! The same rules are installed as PostgreSQL policies by the migrations and applied by the
//! in-memory backend, so a caller that skips these checks still cannot read foreign rows.

use serde::Serialize;

use crate::error::{PortalError, Result};
use crate::models::{ChangeEvent, FeedbackChange, FeedbackRecord, FeedbackView, Identity, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Capability {
    ViewOwn,
    ViewAll,
}

impl Role {
    pub fn capability(&self) -> Capability {
        match self {
            Role::Student => Capability::ViewOwn,
            Role::Admin => Capability::ViewAll,
        }
    }
}

/// Set of rows a read or subscription covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Own(Identity),
    All,
}

impl Scope {
    pub fn matches(&self, author_id: uuid::Uuid) -> bool {
        match self {
            Scope::Own(identity) => identity.id() == author_id,
            Scope::All => true,
        }
    }
}

/// Returns the identity or fails with `Unauthenticated`.
pub fn require_identity(identity: Option<&Identity>) -> Result<&Identity> {
    identity.ok_or(PortalError::Unauthenticated)
}

/// Any authenticated identity may create records authored by itself, whatever its role.
pub fn authorize_create(identity: Option<&Identity>) -> Result<&Identity> {
    require_identity(identity)
}

/// Checks that `role` allows reading `scope` on behalf of `viewer`.
pub fn authorize_scope(viewer: &Identity, role: Role, scope: &Scope) -> Result<()> {
    match (scope, role.capability()) {
        (Scope::All, Capability::ViewAll) => Ok(()),
        (Scope::All, Capability::ViewOwn) => {
            Err(PortalError::Forbidden("reading all feedback requires the admin role"))
        }
        (Scope::Own(owner), _) if owner == viewer => Ok(()),
        (Scope::Own(_), _) => Err(PortalError::Forbidden(
            "feedback history is only readable by its author",
        )),
    }
}

pub fn can_read(viewer: &Identity, role: Role, record: &FeedbackRecord) -> bool {
    role == Role::Admin || record.author_id == viewer.id()
}

/// Projects a record for `viewer`, hiding the author of anonymous records written by
/// someone else.
pub fn redact(record: &FeedbackRecord, viewer: &Identity) -> FeedbackView {
    FeedbackView {
        id: record.id,
        author_id: visible_author(record.author_id, record.is_anonymous, viewer),
        category: record.category,
        subject: record.subject.clone(),
        rating: record.rating,
        text: record.text.clone(),
        is_anonymous: record.is_anonymous,
        created_at: record.created_at,
    }
}

/// Same rule as `redact`, applied to a live insert notification.
pub fn redact_change(event: &ChangeEvent, viewer: &Identity) -> FeedbackChange {
    FeedbackChange {
        id: event.id,
        author_id: visible_author(event.author_id, event.is_anonymous, viewer),
        is_anonymous: event.is_anonymous,
    }
}

fn visible_author(
    author_id: uuid::Uuid,
    is_anonymous: bool,
    viewer: &Identity,
) -> Option<uuid::Uuid> {
    (!is_anonymous || author_id == viewer.id()).then_some(author_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use chrono::Utc;
    use uuid::Uuid;

    fn record(author: Uuid, is_anonymous: bool) -> FeedbackRecord {
        FeedbackRecord {
            id: Uuid::new_v4(),
            author_id: author,
            category: Category::TeachingMethod,
            subject: Some("Physics 2".to_string()),
            rating: 4,
            text: "Clear lectures".to_string(),
            is_anonymous,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn create_requires_identity_only() {
        let student = Identity(Uuid::new_v4());
        assert_eq!(authorize_create(Some(&student)).unwrap(), &student);
        assert!(matches!(
            authorize_create(None),
            Err(PortalError::Unauthenticated)
        ));
    }

    #[test]
    fn only_admin_reads_all() {
        let viewer = Identity(Uuid::new_v4());
        assert!(authorize_scope(&viewer, Role::Admin, &Scope::All).is_ok());
        assert!(matches!(
            authorize_scope(&viewer, Role::Student, &Scope::All),
            Err(PortalError::Forbidden(_))
        ));
    }

    #[test]
    fn own_scope_is_limited_to_self_for_every_role() {
        let viewer = Identity(Uuid::new_v4());
        let other = Identity(Uuid::new_v4());
        for role in [Role::Student, Role::Admin] {
            assert!(authorize_scope(&viewer, role, &Scope::Own(viewer)).is_ok());
            assert!(authorize_scope(&viewer, role, &Scope::Own(other)).is_err());
        }
    }

    #[test]
    fn students_read_only_their_rows() {
        let viewer = Identity(Uuid::new_v4());
        let own = record(viewer.id(), false);
        let foreign = record(Uuid::new_v4(), false);
        assert!(can_read(&viewer, Role::Student, &own));
        assert!(!can_read(&viewer, Role::Student, &foreign));
        assert!(can_read(&viewer, Role::Admin, &foreign));
    }

    #[test]
    fn anonymous_author_hidden_from_other_viewers() {
        let author = Uuid::new_v4();
        let admin = Identity(Uuid::new_v4());
        let anonymous = record(author, true);
        let named = record(author, false);

        assert_eq!(redact(&anonymous, &admin).author_id, None);
        assert_eq!(redact(&named, &admin).author_id, Some(author));
        assert_eq!(redact(&anonymous, &Identity(author)).author_id, Some(author));
    }

    #[test]
    fn change_notifications_follow_the_same_anonymity_rule() {
        let author = Uuid::new_v4();
        let admin = Identity(Uuid::new_v4());
        let event = ChangeEvent {
            id: Uuid::new_v4(),
            author_id: author,
            is_anonymous: true,
        };

        assert_eq!(redact_change(&event, &admin).author_id, None);
        assert_eq!(redact_change(&event, &Identity(author)).author_id, Some(author));

        let named = ChangeEvent {
            is_anonymous: false,
            ..event
        };
        assert_eq!(redact_change(&named, &admin).author_id, Some(author));
    }
}
