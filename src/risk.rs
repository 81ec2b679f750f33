use std::collections::HashMap;

use chrono::Duration;

use crate::models::{CampaignInteraction, UserProfile, UserScore};

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;

const CLICK_RATIO_WEIGHT: f64 = 0.4;
const FAST_CLICK_WINDOW_SECS: i64 = 60;
const FAST_CLICK_PENALTY: f64 = 15.0;
const REPORT_BONUS: f64 = 10.0;
const DEFAULT_DEPARTMENT_WEIGHT: f64 = 1.0;

// Exact, case-sensitive lookup; anything unlisted gets `default`.
#[derive(Debug, Clone)]
pub struct DepartmentWeights {
    weights: HashMap<String, f64>,
    default: f64,
}

impl Default for DepartmentWeights {
    fn default() -> Self {
        Self::empty()
            .with_weight("Finance", 1.5)
            .with_weight("IT", 1.2)
            .with_weight("HR", 1.3)
    }
}

impl DepartmentWeights {
    pub fn empty() -> Self {
        Self {
            weights: HashMap::new(),
            default: DEFAULT_DEPARTMENT_WEIGHT,
        }
    }

    pub fn with_weight(mut self, department: &str, weight: f64) -> Self {
        self.weights.insert(department.to_string(), weight);
        self
    }

    pub fn weight(&self, department: &str) -> f64 {
        self.weights.get(department).copied().unwrap_or(self.default)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub total: usize,
    pub clicks: usize,
    pub fast_clicks: usize,
    pub reports: usize,
    pub click_ratio_points: f64,
    pub base: f64,
}

impl ScoreBreakdown {
    pub fn from_history(history: &[CampaignInteraction]) -> Self {
        let total = history.len();
        let clicks = history.iter().filter(|log| log.clicked).count();
        let fast_clicks = history.iter().filter(|log| is_fast_click(log)).count();
        let reports = history.iter().filter(|log| log.reported).count();

        let click_ratio_points = if total == 0 {
            0.0
        } else {
            (clicks as f64 / total as f64) * 100.0 * CLICK_RATIO_WEIGHT
        };

        let base = click_ratio_points + fast_clicks as f64 * FAST_CLICK_PENALTY
            - reports as f64 * REPORT_BONUS;

        Self {
            total,
            clicks,
            fast_clicks,
            reports,
            click_ratio_points,
            base,
        }
    }
}

// Exclusive window; a click stamped before `sent_at` still counts.
pub fn is_fast_click(log: &CampaignInteraction) -> bool {
    match (log.clicked, log.click_time) {
        (true, Some(click_time)) => {
            click_time - log.sent_at < Duration::seconds(FAST_CLICK_WINDOW_SECS)
        }
        _ => false,
    }
}

#[derive(Debug, Clone, Default)]
pub struct RiskScorer {
    weights: DepartmentWeights,
}

impl RiskScorer {
    pub fn new(weights: DepartmentWeights) -> Self {
        Self { weights }
    }

    pub fn score(&self, department: &str, history: &[CampaignInteraction]) -> f64 {
        if history.is_empty() {
            return MIN_SCORE;
        }

        let breakdown = ScoreBreakdown::from_history(history);
        let weighted = breakdown.base * self.weights.weight(department);
        weighted.clamp(MIN_SCORE, MAX_SCORE)
    }

    pub fn score_user(&self, profile: &UserProfile) -> UserScore {
        let breakdown = ScoreBreakdown::from_history(&profile.history);
        UserScore {
            email: profile.email.clone(),
            department: profile.department.clone(),
            score: self.score(&profile.department, &profile.history),
            campaign_count: breakdown.total,
            clicks: breakdown.clicks,
            fast_clicks: breakdown.fast_clicks,
            reports: breakdown.reports,
            last_device: profile.history.last().map(|log| log.device_info.clone()),
        }
    }
}

pub fn score_users(scorer: &RiskScorer, profiles: &[UserProfile]) -> Vec<UserScore> {
    let mut values: Vec<UserScore> = profiles
        .iter()
        .map(|profile| scorer.score_user(profile))
        .collect();
    values.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;

    fn sent() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn interaction(click_after_ms: Option<i64>, reported: bool) -> CampaignInteraction {
        let sent_at = sent();
        let mut log = CampaignInteraction::launched(1, "Urgent Password Reset", sent_at);
        if let Some(ms) = click_after_ms {
            log.clicked = true;
            log.click_time = Some(sent_at + Duration::milliseconds(ms));
        }
        log.reported = reported;
        log
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 0.001,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn empty_history_scores_zero_in_any_department() {
        let scorer = RiskScorer::default();
        for department in ["Finance", "IT", "HR", "Sales", ""] {
            assert_eq!(scorer.score(department, &[]), 0.0);
        }
    }

    #[test]
    fn single_fast_click_in_finance() {
        let history = vec![interaction(Some(30_000), false)];
        assert_close(RiskScorer::default().score("Finance", &history), 82.5);
    }

    #[test]
    fn reported_slow_click_in_it() {
        let history = vec![interaction(Some(200_000), true), interaction(None, false)];
        assert_close(RiskScorer::default().score("IT", &history), 12.0);
    }

    #[test]
    fn repeated_fast_clicks_in_hr_saturate() {
        let history = vec![
            interaction(Some(10_000), false),
            interaction(Some(5_000), false),
            interaction(Some(1_000), false),
        ];
        let breakdown = ScoreBreakdown::from_history(&history);
        assert_close(breakdown.base, 85.0);
        assert_eq!(RiskScorer::default().score("HR", &history), 100.0);
    }

    #[test]
    fn reports_only_in_unknown_department_floor_at_zero() {
        let history = vec![interaction(None, true), interaction(None, true)];
        let breakdown = ScoreBreakdown::from_history(&history);
        assert_close(breakdown.base, -20.0);
        assert_eq!(RiskScorer::default().score("Sales", &history), 0.0);
    }

    #[test]
    fn click_at_exactly_sixty_seconds_is_not_fast() {
        let at_limit = interaction(Some(60_000), false);
        let just_under = interaction(Some(59_999), false);
        assert!(!is_fast_click(&at_limit));
        assert!(is_fast_click(&just_under));

        let scorer = RiskScorer::default();
        assert_close(scorer.score("Sales", &[at_limit]), 40.0);
        assert_close(scorer.score("Sales", &[just_under]), 55.0);
    }

    #[test]
    fn click_before_send_time_counts_as_fast() {
        let log = interaction(Some(-5_000), false);
        assert!(is_fast_click(&log));
    }

    #[test]
    fn clicked_without_timestamp_is_not_fast() {
        let mut log = interaction(None, false);
        log.clicked = true;
        assert!(!is_fast_click(&log));
        let breakdown = ScoreBreakdown::from_history(&[log]);
        assert_eq!(breakdown.clicks, 1);
        assert_eq!(breakdown.fast_clicks, 0);
    }

    #[test]
    fn extra_report_lowers_base_by_ten() {
        let history = vec![interaction(Some(120_000), false), interaction(None, false)];
        let mut with_report = history.clone();
        with_report.push(interaction(None, true));
        let mut without_report = history;
        without_report.push(interaction(None, false));

        let before = ScoreBreakdown::from_history(&without_report).base;
        let after = ScoreBreakdown::from_history(&with_report).base;
        assert_close(before - after, 10.0);
    }

    #[test]
    fn appended_reported_campaign_without_clicks_lowers_base_by_ten() {
        let history = vec![interaction(None, false), interaction(None, true)];
        let mut extended = history.clone();
        extended.push(interaction(None, true));

        let before = ScoreBreakdown::from_history(&history).base;
        let after = ScoreBreakdown::from_history(&extended).base;
        assert_close(before, -10.0);
        assert_close(after, -20.0);
    }

    #[test]
    fn finance_weighs_half_again_over_default() {
        let history = vec![interaction(Some(300_000), false), interaction(None, false)];
        let scorer = RiskScorer::default();
        let other = scorer.score("Other", &history);
        let finance = scorer.score("Finance", &history);
        assert_close(other, 20.0);
        assert_close(finance, 30.0);
        assert_close(finance, other * 1.5);
    }

    #[test]
    fn unknown_and_empty_departments_use_default_weight() {
        let weights = DepartmentWeights::default();
        assert_eq!(weights.weight("Marketing"), 1.0);
        assert_eq!(weights.weight(""), 1.0);
        assert_eq!(weights.weight("finance"), 1.0);
        assert_eq!(weights.weight("HR"), 1.3);
    }

    #[test]
    fn custom_weights_change_multiplier_only() {
        let history = vec![interaction(Some(300_000), false), interaction(None, false)];
        let scorer = RiskScorer::new(DepartmentWeights::default().with_weight("Executive", 2.0));
        assert_close(scorer.score("Executive", &history), 40.0);
        assert_close(scorer.score("Finance", &history), 30.0);
    }

    #[test]
    fn scoring_is_repeatable() {
        let history = vec![interaction(Some(20_000), true), interaction(None, false)];
        let scorer = RiskScorer::default();
        assert_eq!(scorer.score("IT", &history), scorer.score("IT", &history));
    }

    #[test]
    fn users_are_ranked_highest_score_first() {
        let profile = |email: &str, department: &str, history: Vec<CampaignInteraction>| {
            UserProfile {
                user_id: Uuid::new_v4(),
                email: email.to_string(),
                department: department.to_string(),
                history,
            }
        };
        let mut clicked = interaction(Some(10_000), false);
        clicked.device_info = "Windows PC".to_string();
        let profiles = vec![
            profile("david@sales.com", "Sales", vec![]),
            profile("alice@finance.com", "Finance", vec![clicked]),
            profile("bob@it.com", "IT", vec![interaction(Some(90_000), false)]),
        ];

        let scores = score_users(&RiskScorer::default(), &profiles);
        let order: Vec<&str> = scores.iter().map(|s| s.email.as_str()).collect();
        assert_eq!(order, vec!["alice@finance.com", "bob@it.com", "david@sales.com"]);
        assert_eq!(scores[0].fast_clicks, 1);
        assert_eq!(scores[0].last_device.as_deref(), Some("Windows PC"));
        assert_eq!(scores[2].campaign_count, 0);
        assert_eq!(scores[2].last_device, None);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn build(entries: &[(Option<i64>, bool)]) -> Vec<CampaignInteraction> {
        let sent_at = Utc.with_ymd_and_hms(2026, 1, 5, 8, 30, 0).unwrap();
        entries
            .iter()
            .enumerate()
            .map(|(i, (click_after_ms, reported))| {
                let mut log = CampaignInteraction::launched(i as i64, "Simulated", sent_at);
                if let Some(ms) = click_after_ms {
                    log.clicked = true;
                    log.click_time = Some(sent_at + Duration::milliseconds(*ms));
                }
                log.reported = *reported;
                log
            })
            .collect()
    }

    fn entries() -> impl Strategy<Value = Vec<(Option<i64>, bool)>> {
        prop::collection::vec(
            (prop::option::of(-120_000i64..600_000), any::<bool>()),
            0..40,
        )
    }

    fn department() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["Finance", "IT", "HR", "Sales", "Executive", ""])
            .prop_map(str::to_string)
    }

    proptest! {
        #[test]
        fn prop_score_stays_in_bounds(history in entries(), department in department()) {
            let score = RiskScorer::default().score(&department, &build(&history));
            prop_assert!(score.is_finite());
            prop_assert!((MIN_SCORE..=MAX_SCORE).contains(&score));
        }

        #[test]
        fn prop_slow_click_never_lowers_score(
            history in entries(),
            department in department(),
            delay_ms in 60_000i64..600_000,
        ) {
            let scorer = RiskScorer::default();
            let before_logs = build(&history);
            let mut extended = history.clone();
            extended.push((Some(delay_ms), false));
            let after_logs = build(&extended);

            let before = ScoreBreakdown::from_history(&before_logs);
            let after = ScoreBreakdown::from_history(&after_logs);
            prop_assert!(after.click_ratio_points >= before.click_ratio_points);
            prop_assert!(scorer.score(&department, &after_logs) >= scorer.score(&department, &before_logs));
        }
    }
}
