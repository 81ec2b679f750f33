use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct CampaignInteraction {
    pub log_id: i64,
    pub campaign_name: String,
    pub sent_at: DateTime<Utc>,
    pub clicked: bool,
    pub click_time: Option<DateTime<Utc>>,
    pub reported: bool,
    pub device_info: String,
}

impl CampaignInteraction {
    pub fn launched(log_id: i64, campaign_name: &str, sent_at: DateTime<Utc>) -> Self {
        Self {
            log_id,
            campaign_name: campaign_name.to_string(),
            sent_at,
            clicked: false,
            click_time: None,
            reported: false,
            device_info: crate::tracking::UNKNOWN_DEVICE.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub email: String,
    pub department: String,
    pub history: Vec<CampaignInteraction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserScore {
    pub email: String,
    pub department: String,
    pub score: f64,
    pub campaign_count: usize,
    pub clicks: usize,
    pub fast_clicks: usize,
    pub reports: usize,
    pub last_device: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DepartmentSummary {
    pub department: String,
    pub user_count: usize,
    pub avg_score: f64,
    pub max_score: f64,
}
