use crate::error::ValidationError;
use crate::models::{Category, FeedbackSubmission, Identity, NewFeedback};

/// Checks a raw submission and normalizes it into a persistable draft owned by `author`.
/// Reports the first failing field in the order category, rating, text.
pub fn validate_submission(
    author: &Identity,
    input: &FeedbackSubmission,
) -> Result<NewFeedback, ValidationError> {
    let category: Category = input
        .category
        .parse()
        .map_err(|_| ValidationError::InvalidCategory(input.category.clone()))?;

    let rating = validate_rating(input.rating)?;

    let text = input.text.trim();
    if text.is_empty() {
        return Err(ValidationError::EmptyText);
    }

    let subject = input
        .subject
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(NewFeedback {
        author_id: author.id(),
        category,
        subject,
        rating,
        text: text.to_string(),
        is_anonymous: input.is_anonymous,
    })
}

fn validate_rating(rating: f64) -> Result<i16, ValidationError> {
    if rating.fract() != 0.0 || !(1.0..=5.0).contains(&rating) {
        return Err(ValidationError::InvalidRating(rating));
    }
    Ok(rating as i16)
}
