use anyhow::Context;
use uuid::Uuid;

use crate::models::{FeedbackSubmission, Identity, Role};
use crate::service::FeedbackService;

/// Fixed demo identities: two students and one administrator.
pub const SEED_STUDENTS: [&str; 2] = [
    "d6fd451a-7829-420b-a46f-b22df073566d",
    "3f3943cb-92b8-4efe-85f1-b4177e89aed0",
];
pub const SEED_ADMIN: &str = "fafa1d41-a75d-4a37-a707-50b59433c250";

pub async fn seed(service: &FeedbackService) -> anyhow::Result<usize> {
    let admin = Identity(Uuid::parse_str(SEED_ADMIN)?);
    service
        .assign_role(Some(&admin), &admin, Role::Admin)
        .await
        .context("seed admin could not be assigned")?;

    let entries = [
        (
            SEED_STUDENTS[0],
            "Course Content",
            Some("Computer Science 101"),
            5.0,
            "Lab exercises match the lectures well",
            true,
        ),
        (
            SEED_STUDENTS[0],
            "Facilities",
            None,
            2.0,
            "Library wifi drops every afternoon",
            false,
        ),
        (
            SEED_STUDENTS[1],
            "Teaching Method",
            Some("Calculus II"),
            4.0,
            "Worked examples before proofs help a lot",
            true,
        ),
        (
            SEED_STUDENTS[1],
            "Support Services",
            None,
            3.0,
            "Advising appointments book out two weeks ahead",
            true,
        ),
        (
            SEED_STUDENTS[1],
            "Other",
            None,
            5.0,
            "Orientation week was well organised",
            false,
        ),
    ];

    let mut inserted = 0usize;
    for (author, category, subject, rating, text, is_anonymous) in entries {
        let author = Identity(Uuid::parse_str(author)?);
        let submission = FeedbackSubmission {
            category: category.to_string(),
            subject: subject.map(str::to_string),
            rating,
            text: text.to_string(),
            is_anonymous,
        };
        service.submit(Some(&author), &submission).await?;
        inserted += 1;
    }

    Ok(inserted)
}

/// Submits every row of a CSV file as `identity`. Stops at the first row that fails and
/// reports its line; rows before it stay stored.
pub async fn import_csv(
    service: &FeedbackService,
    identity: Option<&Identity>,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (index, result) in reader.deserialize::<FeedbackSubmission>().enumerate() {
        // Header is line 1.
        let line = index + 2;
        let row = result.with_context(|| format!("malformed row on line {line}"))?;
        service
            .submit(identity, &row)
            .await
            .with_context(|| format!("row on line {line} was not stored"))?;
        inserted += 1;
    }

    Ok(inserted)
}
