use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::CampaignInteraction;

pub const UNKNOWN_DEVICE: &str = "Unknown";
pub const DEFAULT_CAMPAIGN: &str = "Urgent Password Reset";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InteractionError {
    #[error("click_time is set but the campaign is not marked clicked")]
    ClickTimeWithoutClick,
    #[error("campaign is marked clicked but has no click_time")]
    ClickWithoutClickTime,
    #[error("click_time {click_time} is earlier than sent_at {sent_at}")]
    ClickBeforeSend {
        sent_at: DateTime<Utc>,
        click_time: DateTime<Utc>,
    },
}

pub fn fingerprint_device(user_agent: &str) -> &'static str {
    if user_agent.contains("Mobile") {
        "Mobile Device"
    } else if user_agent.contains("Windows") {
        "Windows PC"
    } else if user_agent.contains("Mac") {
        "Mac OS"
    } else {
        "Linux/Other"
    }
}

pub fn record_click(log: &mut CampaignInteraction, at: DateTime<Utc>, user_agent: &str) -> bool {
    if log.clicked {
        return false;
    }
    log.clicked = true;
    log.click_time = Some(at);
    log.device_info = fingerprint_device(user_agent).to_string();
    true
}

pub fn record_report(log: &mut CampaignInteraction) -> bool {
    if log.reported {
        return false;
    }
    log.reported = true;
    true
}

pub fn validate(log: &CampaignInteraction) -> Result<(), InteractionError> {
    match (log.clicked, log.click_time) {
        (false, Some(_)) => Err(InteractionError::ClickTimeWithoutClick),
        (true, None) => Err(InteractionError::ClickWithoutClickTime),
        (true, Some(click_time)) if click_time < log.sent_at => {
            Err(InteractionError::ClickBeforeSend {
                sent_at: log.sent_at,
                click_time,
            })
        }
        _ => Ok(()),
    }
}

pub fn tracking_link(base_url: &str, log_id: i64) -> String {
    format!("{}/track/{}", base_url.trim_end_matches('/'), log_id)
}

pub fn render_simulated_email(recipient: &str, base_url: &str, log_id: i64) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "To: {recipient}");
    let _ = writeln!(output, "From: security@goggle-support.com (spoofed)");
    let _ = writeln!(output, "Subject: ACTION REQUIRED: Unauthorized Login Attempt");
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "We detected a login from an unrecognized location. If this wasn't you, secure your account:"
    );
    let _ = writeln!(output, "  {}", tracking_link(base_url, log_id));
    let _ = writeln!(output);
    let _ = writeln!(output, "(Internal tracking id: {log_id})");
    output
}
