use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{DepartmentSummary, UserScore};

const DEVICE_COLUMN_WIDTH: usize = 25;

pub fn summarize_by_department(scores: &[UserScore]) -> Vec<DepartmentSummary> {
    let mut map: std::collections::HashMap<String, (usize, f64, f64)> =
        std::collections::HashMap::new();

    for score in scores {
        let entry = map.entry(score.department.clone()).or_insert((0, 0.0, 0.0));
        entry.0 += 1;
        entry.1 += score.score;
        entry.2 = entry.2.max(score.score);
    }

    let mut summaries: Vec<DepartmentSummary> = map
        .into_iter()
        .map(|(department, (user_count, total_score, max_score))| DepartmentSummary {
            department,
            user_count,
            avg_score: if user_count == 0 {
                0.0
            } else {
                total_score / user_count as f64
            },
            max_score,
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.avg_score
            .partial_cmp(&a.avg_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.department.cmp(&b.department))
    });
    summaries
}

fn device_label(last_device: Option<&str>) -> String {
    match last_device {
        None => "N/A".to_string(),
        Some(device) if device.chars().count() > DEVICE_COLUMN_WIDTH => {
            let short: String = device.chars().take(DEVICE_COLUMN_WIDTH).collect();
            format!("{short}..")
        }
        Some(device) => device.to_string(),
    }
}

pub fn build_report(scope: Option<&str>, generated_at: DateTime<Utc>, scores: &[UserScore]) -> String {
    let summaries = summarize_by_department(scores);

    let mut output = String::new();
    let scope_label = scope.unwrap_or("all users");

    let _ = writeln!(output, "# PhishSim Security Audit Report");
    let _ = writeln!(
        output,
        "Generated for {} at {}",
        scope_label,
        generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## User Risk");

    if scores.is_empty() {
        let _ = writeln!(output, "No users found.");
    } else {
        let _ = writeln!(output, "| Email | Dept | Risk Score | Last Device |");
        let _ = writeln!(output, "|---|---|---|---|");
        for score in scores {
            let _ = writeln!(
                output,
                "| {} | {} | {:.1} | {} |",
                score.email,
                score.department,
                score.score,
                device_label(score.last_device.as_deref())
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Department Summary");

    if summaries.is_empty() {
        let _ = writeln!(output, "No departments to summarize.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} users (avg score {:.1}, highest {:.1})",
                summary.department, summary.user_count, summary.avg_score, summary.max_score
            );
        }
    }

    let mut impulsive: Vec<&UserScore> = scores.iter().filter(|s| s.fast_clicks > 0).collect();
    impulsive.sort_by(|a, b| b.fast_clicks.cmp(&a.fast_clicks));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Impulsive Clickers");

    if impulsive.is_empty() {
        let _ = writeln!(output, "No clicks within a minute of delivery.");
    } else {
        for score in impulsive.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} ({}): {} fast clicks of {} campaigns, {} reported",
                score.email, score.department, score.fast_clicks, score.campaign_count, score.reports
            );
        }
    }

    output
}
