use std::fmt::Write;

use crate::aggregate::RECENT_WINDOW_DAYS;
use crate::dashboard::DashboardSnapshot;
use crate::models::{FeedbackView, Role};

pub fn summary_line(snapshot: &DashboardSnapshot) -> String {
    let stats = &snapshot.stats;
    let mut line = format!(
        "{} feedback, avg rating {:.1}, {} in the last {} days",
        stats.total, stats.average_rating, stats.recent_count, RECENT_WINDOW_DAYS
    );
    if snapshot.role == Role::Admin {
        let _ = write!(line, ", {} anonymous", stats.anonymous_count);
    }
    line
}

pub fn build_report(snapshot: &DashboardSnapshot, limit: usize) -> String {
    let stats = &snapshot.stats;
    let mut output = String::new();

    let title = match snapshot.role {
        Role::Admin => "# Feedback Dashboard (all submissions)",
        Role::Student => "# My Feedback",
    };
    let _ = writeln!(output, "{title}");
    let _ = writeln!(
        output,
        "Generated {}",
        snapshot.generated_at.format("%B %d, %Y %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    let _ = writeln!(output, "- Total feedback: {}", stats.total);
    let _ = writeln!(output, "- Average rating: {:.1} / 5", stats.average_rating);
    let _ = writeln!(
        output,
        "- Last {} days: {}",
        RECENT_WINDOW_DAYS, stats.recent_count
    );
    if snapshot.role == Role::Admin {
        let _ = writeln!(output, "- Anonymous: {}", stats.anonymous_count);
    }

    if snapshot.role == Role::Admin {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Categories");
        if stats.category_breakdown.is_empty() {
            let _ = writeln!(output, "No feedback recorded yet.");
        } else {
            for (category, count) in stats.category_breakdown.iter() {
                let _ = writeln!(output, "- {category}: {count}");
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Feedback");
    if snapshot.records.is_empty() {
        let _ = writeln!(output, "No feedback submitted yet.");
    } else {
        for record in snapshot.records.iter().take(limit) {
            let _ = writeln!(output, "{}", record_line(record));
        }
    }

    output
}

pub fn record_line(record: &FeedbackView) -> String {
    let kind = if record.is_anonymous {
        "Anonymous"
    } else {
        "Named"
    };
    format!(
        "- {} | {} | {} | {}/5 | {} | {}",
        record.created_at.format("%b %d, %Y"),
        record.category,
        record.subject.as_deref().unwrap_or("N/A"),
        record.rating,
        kind,
        record.text
    )
}
