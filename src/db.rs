use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{CampaignInteraction, UserProfile};
use crate::tracking;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<usize> {
    let users = vec![
        ("alice@finance.com", "Finance"),
        ("bob@it.com", "IT"),
        ("carol@hr.com", "HR"),
        ("david@sales.com", "Sales"),
        ("eve@marketing.com", "Marketing"),
        ("frank@company.com", "Executive"),
    ];

    for (email, department) in users.iter() {
        upsert_user(pool, email, department).await?;
    }

    Ok(users.len())
}

async fn upsert_user<'e, E>(executor: E, email: &str, department: &str) -> anyhow::Result<Uuid>
where
    E: sqlx::PgExecutor<'e>,
{
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO phishsim.users (id, email, department)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO UPDATE
        SET department = EXCLUDED.department
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(department)
    .fetch_one(executor)
    .await?
    .get("id");
    Ok(id)
}

pub async fn launch_campaign(
    pool: &PgPool,
    email: &str,
    campaign_name: &str,
) -> anyhow::Result<CampaignInteraction> {
    let user_id: Uuid = sqlx::query("SELECT id FROM phishsim.users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?
        .map(|row| row.get("id"))
        .with_context(|| format!("user not found: {email}"))?;

    let row = sqlx::query(
        r#"
        INSERT INTO phishsim.campaign_logs (user_id, campaign_name, device_info)
        VALUES ($1, $2, $3)
        RETURNING id, sent_at
        "#,
    )
    .bind(user_id)
    .bind(campaign_name)
    .bind(tracking::UNKNOWN_DEVICE)
    .fetch_one(pool)
    .await?;

    Ok(CampaignInteraction::launched(
        row.get("id"),
        campaign_name,
        row.get("sent_at"),
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied(String),
    AlreadyApplied(String),
    NotFound,
}

pub async fn mark_clicked(
    pool: &PgPool,
    log_id: i64,
    user_agent: &str,
) -> anyhow::Result<TransitionOutcome> {
    let mut tx = pool.begin().await?;
    let Some((email, mut log)) = lock_log(&mut tx, log_id).await? else {
        return Ok(TransitionOutcome::NotFound);
    };

    let clicked_at = Utc::now().max(log.sent_at);
    if !tracking::record_click(&mut log, clicked_at, user_agent) {
        return Ok(TransitionOutcome::AlreadyApplied(email));
    }

    sqlx::query(
        r#"
        UPDATE phishsim.campaign_logs
        SET clicked = TRUE, click_time = $2, device_info = $3
        WHERE id = $1 AND NOT clicked
        "#,
    )
    .bind(log_id)
    .bind(log.click_time)
    .bind(&log.device_info)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(TransitionOutcome::Applied(email))
}

pub async fn mark_reported(pool: &PgPool, log_id: i64) -> anyhow::Result<TransitionOutcome> {
    let mut tx = pool.begin().await?;
    let Some((email, mut log)) = lock_log(&mut tx, log_id).await? else {
        return Ok(TransitionOutcome::NotFound);
    };

    if !tracking::record_report(&mut log) {
        return Ok(TransitionOutcome::AlreadyApplied(email));
    }

    sqlx::query("UPDATE phishsim.campaign_logs SET reported = TRUE WHERE id = $1")
        .bind(log_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(TransitionOutcome::Applied(email))
}

async fn lock_log(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    log_id: i64,
) -> anyhow::Result<Option<(String, CampaignInteraction)>> {
    let row = sqlx::query(
        r#"
        SELECT u.email, l.id AS log_id, l.campaign_name, l.sent_at, l.clicked,
               l.click_time, l.reported, l.device_info
        FROM phishsim.campaign_logs l
        JOIN phishsim.users u ON u.id = l.user_id
        WHERE l.id = $1
        FOR UPDATE OF l
        "#,
    )
    .bind(log_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row.map(|row| (row.get("email"), interaction_from_row(&row))))
}

fn interaction_from_row(row: &PgRow) -> CampaignInteraction {
    CampaignInteraction {
        log_id: row.get("log_id"),
        campaign_name: row.get("campaign_name"),
        sent_at: row.get("sent_at"),
        clicked: row.get("clicked"),
        click_time: row.get("click_time"),
        reported: row.get("reported"),
        device_info: row.get("device_info"),
    }
}

pub async fn reset_history(pool: &PgPool, email: &str) -> anyhow::Result<Option<u64>> {
    let user_id: Option<Uuid> = sqlx::query("SELECT id FROM phishsim.users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?
        .map(|row| row.get("id"));

    let Some(user_id) = user_id else {
        return Ok(None);
    };

    let result = sqlx::query("DELETE FROM phishsim.campaign_logs WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(Some(result.rows_affected()))
}

#[derive(Debug, Clone)]
pub struct HistoryRow {
    pub user_id: Uuid,
    pub email: String,
    pub department: String,
    pub log: Option<CampaignInteraction>,
}

// Single statement: each profile is one consistent snapshot.
pub async fn fetch_profiles(
    pool: &PgPool,
    department: Option<&str>,
    email: Option<&str>,
) -> anyhow::Result<Vec<UserProfile>> {
    let mut query = String::from(
        "SELECT u.id AS user_id, u.email, u.department, \
         l.id AS log_id, l.campaign_name, l.sent_at, l.clicked, l.click_time, \
         l.reported, l.device_info \
         FROM phishsim.users u \
         LEFT JOIN phishsim.campaign_logs l ON l.user_id = u.id",
    );

    if department.is_some() {
        query.push_str(" WHERE u.department = $1");
    } else if email.is_some() {
        query.push_str(" WHERE u.email = $1");
    }
    query.push_str(" ORDER BY u.email, l.sent_at, l.id");

    let mut rows = sqlx::query(&query);

    if let Some(value) = department {
        rows = rows.bind(value);
    } else if let Some(value) = email {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut history_rows = Vec::with_capacity(records.len());

    for row in records {
        let log_id: Option<i64> = row.get("log_id");
        history_rows.push(HistoryRow {
            user_id: row.get("user_id"),
            email: row.get("email"),
            department: row.get("department"),
            log: log_id.map(|_| interaction_from_row(&row)),
        });
    }

    Ok(group_rows(history_rows))
}

pub fn group_rows(rows: Vec<HistoryRow>) -> Vec<UserProfile> {
    let mut profiles: Vec<UserProfile> = Vec::new();

    for row in rows {
        let same_user = profiles
            .last()
            .map(|profile| profile.user_id == row.user_id)
            .unwrap_or(false);

        if !same_user {
            profiles.push(UserProfile {
                user_id: row.user_id,
                email: row.email,
                department: row.department,
                history: Vec::new(),
            });
        }

        if let (Some(log), Some(profile)) = (row.log, profiles.last_mut()) {
            profile.history.push(log);
        }
    }

    profiles
}

#[derive(Debug, serde::Deserialize)]
struct CsvRow {
    email: String,
    department: String,
    campaign_name: Option<String>,
    sent_at: DateTime<Utc>,
    clicked: bool,
    click_time: Option<DateTime<Utc>>,
    reported: bool,
    device_info: Option<String>,
    source_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportRecord {
    pub email: String,
    pub department: String,
    pub source_key: String,
    pub log: CampaignInteraction,
}

impl CsvRow {
    fn into_record(self) -> Result<ImportRecord, tracking::InteractionError> {
        let log = CampaignInteraction {
            log_id: 0,
            campaign_name: self
                .campaign_name
                .unwrap_or_else(|| tracking::DEFAULT_CAMPAIGN.to_string()),
            sent_at: self.sent_at,
            clicked: self.clicked,
            click_time: self.click_time,
            reported: self.reported,
            device_info: self
                .device_info
                .unwrap_or_else(|| tracking::UNKNOWN_DEVICE.to_string()),
        };
        tracking::validate(&log)?;

        let source_key = self.source_key.unwrap_or_else(|| {
            format!("{}:{}:{}", self.email, log.sent_at.to_rfc3339(), log.campaign_name)
        });

        Ok(ImportRecord {
            email: self.email,
            department: self.department,
            source_key,
            log,
        })
    }
}

pub fn parse_import<R: std::io::Read>(input: R) -> anyhow::Result<Vec<ImportRecord>> {
    let mut reader = csv::Reader::from_reader(input);
    let mut records = Vec::new();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("invalid CSV row on line {line}"))?;
        let email = row.email.clone();
        let record = row
            .into_record()
            .with_context(|| format!("line {line} ({email})"))?;
        records.push(record);
    }

    records.sort_by(|a, b| a.log.sent_at.cmp(&b.log.sent_at));
    Ok(records)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("cannot open {}", csv_path.display()))?;
    let records = parse_import(file)?;

    let mut tx = pool.begin().await?;
    let mut inserted = 0usize;

    for record in records {
        let user_id = upsert_user(&mut *tx, &record.email, &record.department).await?;
        let log = &record.log;

        let result = sqlx::query(
            r#"
            INSERT INTO phishsim.campaign_logs
            (user_id, campaign_name, sent_at, clicked, click_time, reported, device_info, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(&log.campaign_name)
        .bind(log.sent_at)
        .bind(log.clicked)
        .bind(log.click_time)
        .bind(log.reported)
        .bind(&log.device_info)
        .bind(&record.source_key)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    tx.commit().await?;
    Ok(inserted)
}
