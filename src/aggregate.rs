use chrono::{DateTime, Duration, Utc};

use crate::models::{AggregateStats, FeedbackRecord};

pub const RECENT_WINDOW_DAYS: i64 = 7;

/// Summarizes a visible record set as of `now`. Holds no state; call it again whenever the
/// set changes.
pub fn aggregate(records: &[FeedbackRecord], now: DateTime<Utc>) -> AggregateStats {
    let window = Duration::days(RECENT_WINDOW_DAYS);
    let mut stats = AggregateStats::default();
    let mut rating_sum: i64 = 0;

    for record in records {
        stats.total += 1;
        rating_sum += i64::from(record.rating);
        *stats.category_breakdown.entry(record.category).or_insert(0) += 1;

        if now - record.created_at <= window {
            stats.recent_count += 1;
        }
        if record.is_anonymous {
            stats.anonymous_count += 1;
        }
    }

    stats.average_rating = rounded_mean(rating_sum, stats.total);
    stats
}

/// Mean rounded half-up to one decimal, computed in integers so 3.85 does not become 3.8.
pub fn rounded_mean(sum: i64, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    let count = count as i64;
    let tenths = (20 * sum + count).div_euclid(2 * count);
    tenths as f64 / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use uuid::Uuid;

    fn sample_record(days_ago: i64, rating: i16, category: Category) -> FeedbackRecord {
        FeedbackRecord {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            category,
            subject: None,
            rating,
            text: "noted".to_string(),
            is_anonymous: false,
            created_at: Utc::now() - Duration::days(days_ago),
        }
    }

    #[test]
    fn empty_set_is_all_zero() {
        let stats = aggregate(&[], Utc::now());
        assert_eq!(stats, AggregateStats::default());
        assert_eq!(stats.average_rating, 0.0);
        assert!(stats.category_breakdown.is_empty());
    }

    #[test]
    fn average_of_sample_ratings() {
        let records: Vec<_> = [5, 4, 3, 5, 2]
            .into_iter()
            .map(|rating| sample_record(1, rating, Category::Other))
            .collect();
        assert_eq!(aggregate(&records, Utc::now()).average_rating, 3.8);
    }

    #[test]
    fn average_rounds_half_up() {
        // 4 + 4 + 4 + 3 = 15 / 4 = 3.75
        assert_eq!(rounded_mean(15, 4), 3.8);
        // 77 / 20 = 3.85
        assert_eq!(rounded_mean(77, 20), 3.9);
        assert_eq!(rounded_mean(10, 3), 3.3);
        assert_eq!(rounded_mean(5, 1), 5.0);
    }

    #[test]
    fn breakdown_omits_absent_categories() {
        let records = vec![
            sample_record(1, 4, Category::Facilities),
            sample_record(2, 3, Category::Facilities),
            sample_record(3, 5, Category::CourseContent),
        ];
        let stats = aggregate(&records, Utc::now());
        assert_eq!(stats.category_breakdown.len(), 2);
        assert_eq!(stats.category_breakdown[&Category::Facilities], 2);
        assert_eq!(stats.category_breakdown[&Category::CourseContent], 1);
        assert!(!stats.category_breakdown.contains_key(&Category::Other));
    }

    #[test]
    fn recent_window_is_seven_days_inclusive() {
        let now = Utc::now();
        let mut records = vec![
            sample_record(6, 3, Category::Other),
            sample_record(8, 3, Category::Other),
        ];
        let mut boundary = sample_record(0, 3, Category::Other);
        boundary.created_at = now - Duration::days(7);
        records.push(boundary);

        assert_eq!(aggregate(&records, now).recent_count, 2);
    }

    #[test]
    fn counts_anonymous_records() {
        let mut anonymous = sample_record(1, 2, Category::SupportServices);
        anonymous.is_anonymous = true;
        let records = vec![anonymous, sample_record(1, 4, Category::SupportServices)];
        let stats = aggregate(&records, Utc::now());
        assert_eq!(stats.total, 2);
        assert_eq!(stats.anonymous_count, 1);
    }

    #[test]
    fn aggregate_is_idempotent() {
        let now = Utc::now();
        let records = vec![
            sample_record(1, 5, Category::TeachingMethod),
            sample_record(10, 1, Category::Other),
        ];
        assert_eq!(aggregate(&records, now), aggregate(&records, now));
    }
}
