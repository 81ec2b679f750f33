use anyhow::Context;

use crate::risk::DepartmentWeights;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub tracking_base_url: String,
    pub log_filter: String,
    pub json_logs: bool,
    pub department_weights: DepartmentWeights,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .context("DATABASE_URL must be set to a production Postgres instance")?;
        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(5);
        let tracking_base_url = std::env::var("TRACKING_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:5000".into());
        let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "phishsim=info".into());
        let json_logs = std::env::var("LOG_FORMAT")
            .map(|v| v == "json")
            .unwrap_or(false);
        let department_weights = match std::env::var("DEPARTMENT_WEIGHTS") {
            Ok(raw) => parse_department_weights(&raw)?,
            Err(_) => DepartmentWeights::default(),
        };

        Ok(Self {
            database_url,
            max_connections,
            tracking_base_url,
            log_filter,
            json_logs,
            department_weights,
        })
    }
}

// `Legal=1.4,HR=1.1` on top of the built-in table.
pub fn parse_department_weights(raw: &str) -> anyhow::Result<DepartmentWeights> {
    let mut weights = DepartmentWeights::default();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (department, weight) = pair
            .split_once('=')
            .with_context(|| format!("expected Dept=weight, got {pair:?}"))?;
        let department = department.trim();
        anyhow::ensure!(!department.is_empty(), "department name missing in {pair:?}");
        let weight: f64 = weight
            .trim()
            .parse()
            .with_context(|| format!("invalid weight for {department}"))?;
        anyhow::ensure!(
            weight.is_finite() && weight >= 0.0,
            "weight for {department} must be a non-negative number"
        );
        weights = weights.with_weight(department, weight);
    }
    Ok(weights)
}

pub fn init_tracing(config: &AppConfig) {
    if config.json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(config.log_filter.as_str())
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(config.log_filter.as_str())
            .with_writer(std::io::stderr)
            .init();
    }
}
