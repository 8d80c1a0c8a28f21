use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(pub Uuid);

impl Identity {
    pub fn id(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Identity {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Identity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Course Content")]
    CourseContent,
    #[serde(rename = "Teaching Method")]
    TeachingMethod,
    Facilities,
    #[serde(rename = "Support Services")]
    SupportServices,
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::CourseContent,
        Category::TeachingMethod,
        Category::Facilities,
        Category::SupportServices,
        Category::Other,
    ];

    /// Label used in storage and in rendered output.
    pub fn label(&self) -> &'static str {
        match self {
            Category::CourseContent => "Course Content",
            Category::TeachingMethod => "Teaching Method",
            Category::Facilities => "Facilities",
            Category::SupportServices => "Support Services",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let expected: Vec<&str> = Category::ALL.iter().map(Category::label).collect();
        write!(
            f,
            "unknown category '{}', expected one of: {}",
            self.0,
            expected.join(", ")
        )
    }
}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();

        match key.as_str() {
            "coursecontent" => Ok(Category::CourseContent),
            "teachingmethod" => Ok(Category::TeachingMethod),
            "facilities" => Ok(Category::Facilities),
            "supportservices" => Ok(Category::SupportServices),
            "other" => Ok(Category::Other),
            _ => Err(UnknownCategory(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Raw, unvalidated submission as handed over by presentation code.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackSubmission {
    pub category: String,
    #[serde(default)]
    pub subject: Option<String>,
    /// Zero means the rating was never set.
    #[serde(default)]
    pub rating: f64,
    pub text: String,
    #[serde(default = "default_anonymous")]
    pub is_anonymous: bool,
}

fn default_anonymous() -> bool {
    true
}

/// A submission that passed validation and is ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFeedback {
    pub author_id: Uuid,
    pub category: Category,
    pub subject: Option<String>,
    pub rating: i16,
    pub text: String,
    pub is_anonymous: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackRecord {
    pub id: Uuid,
    pub author_id: Uuid,
    pub category: Category,
    pub subject: Option<String>,
    pub rating: i16,
    pub text: String,
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
}

/// Read projection of a record for one viewer. `author_id` is withheld for anonymous
/// records unless the viewer wrote them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackView {
    pub id: Uuid,
    pub author_id: Option<Uuid>,
    pub category: Category,
    pub subject: Option<String>,
    pub rating: i16,
    pub text: String,
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AggregateStats {
    pub total: usize,
    pub average_rating: f64,
    pub category_breakdown: BTreeMap<Category, usize>,
    pub recent_count: usize,
    pub anonymous_count: usize,
}

/// Published by the backend once an insert is durable. Carries the real author, so it
/// never leaves the data access layer unredacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub id: Uuid,
    pub author_id: Uuid,
    pub is_anonymous: bool,
}

/// What a subscriber is told about an insert. `author_id` follows the same rule as
/// `FeedbackView`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeedbackChange {
    pub id: Uuid,
    pub author_id: Option<Uuid>,
    pub is_anonymous: bool,
}
