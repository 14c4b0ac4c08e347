use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, Pool, Postgres};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::{MatchStore, NOT_STARTED_STATUSES};
use crate::types::{MatchState, MatchStatus, ScheduledMatch, SubmissionRecord};

#[derive(Debug, FromRow)]
struct MatchStateRow {
    match_id: String,
    status: String,
    home_team: Option<String>,
    away_team: Option<String>,
    home_score: i64,
    away_score: i64,
    last_indexed_at: Option<DateTime<Utc>>,
    last_checked_at: DateTime<Utc>,
}

fn score_from_db(match_id: &str, value: i64) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt {
        key: match_id.to_string(),
        reason: format!("score {value} out of range"),
    })
}

fn score_to_db(value: u32) -> i64 {
    i64::from(value)
}

impl TryFrom<MatchStateRow> for MatchState {
    type Error = StoreError;

    fn try_from(row: MatchStateRow) -> Result<Self, Self::Error> {
        let status: MatchStatus = row.status.parse().map_err(|reason| StoreError::Corrupt {
            key: row.match_id.clone(),
            reason,
        })?;

        Ok(MatchState {
            home_score: score_from_db(&row.match_id, row.home_score)?,
            away_score: score_from_db(&row.match_id, row.away_score)?,
            match_id: row.match_id,
            status,
            home_team: row.home_team,
            away_team: row.away_team,
            last_indexed_at: row.last_indexed_at,
            last_checked_at: row.last_checked_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ScheduledMatchRow {
    match_id: String,
    home_team: String,
    away_team: String,
    kickoff_at: DateTime<Utc>,
    status: String,
}

impl From<ScheduledMatchRow> for ScheduledMatch {
    fn from(row: ScheduledMatchRow) -> Self {
        ScheduledMatch {
            match_id: row.match_id,
            home_team: row.home_team,
            away_team: row.away_team,
            kickoff_at: row.kickoff_at,
            status: row.status,
        }
    }
}

/// `MatchStore` backed by Postgres.
pub struct PgMatchStore {
    pool: Pool<Postgres>,
}

impl PgMatchStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl MatchStore for PgMatchStore {
    async fn load_match_states(&self) -> Result<HashMap<String, MatchState>, StoreError> {
        let rows: Vec<MatchStateRow> = sqlx::query_as(
            r#"
            SELECT match_id, status, home_team, away_team, home_score, away_score,
                   last_indexed_at, last_checked_at
            FROM match_states
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        debug!(rows = rows.len(), "Loaded match states");
        rows.into_iter()
            .map(|row| MatchState::try_from(row).map(|state| (state.match_id.clone(), state)))
            .collect()
    }

    async fn upsert_match_state(&self, state: &MatchState) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO match_states (
                match_id, status, home_team, away_team, home_score, away_score,
                last_indexed_at, last_checked_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (match_id) DO UPDATE SET
                status = EXCLUDED.status,
                home_team = EXCLUDED.home_team,
                away_team = EXCLUDED.away_team,
                home_score = EXCLUDED.home_score,
                away_score = EXCLUDED.away_score,
                last_indexed_at = COALESCE(EXCLUDED.last_indexed_at, match_states.last_indexed_at),
                last_checked_at = EXCLUDED.last_checked_at
            "#,
        )
        .bind(&state.match_id)
        .bind(state.status.as_str())
        .bind(&state.home_team)
        .bind(&state.away_team)
        .bind(score_to_db(state.home_score))
        .bind(score_to_db(state.away_score))
        .bind(state.last_indexed_at)
        .bind(state.last_checked_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn submitted_urls(&self, prefix: &str) -> Result<HashSet<String>, StoreError> {
        let urls: Vec<(String,)> =
            sqlx::query_as("SELECT url FROM submission_records WHERE starts_with(url, $1)")
                .bind(prefix)
                .fetch_all(&self.pool)
                .await?;
        Ok(urls.into_iter().map(|(url,)| url).collect())
    }

    async fn touch_submission(&self, url: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE submission_records SET last_checked_at = $2 WHERE url = $1")
            .bind(url)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_submission(&self, record: &SubmissionRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO submission_records (url, submitted_at, indexing_status, last_checked_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (url) DO UPDATE SET last_checked_at = EXCLUDED.last_checked_at
            "#,
        )
        .bind(&record.url)
        .bind(record.submitted_at)
        .bind(&record.indexing_status)
        .bind(record.last_checked_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upcoming_matches(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ScheduledMatch>, StoreError> {
        let statuses: Vec<String> = NOT_STARTED_STATUSES.iter().map(|s| s.to_string()).collect();
        let rows: Vec<ScheduledMatchRow> = sqlx::query_as(
            r#"
            SELECT match_id, home_team, away_team, kickoff_at, status
            FROM match_schedule
            WHERE kickoff_at >= $1
              AND kickoff_at <= $2
              AND status = ANY($3)
            ORDER BY kickoff_at ASC
            "#,
        )
        .bind(from)
        .bind(to)
        .bind(&statuses)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ScheduledMatch::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str, home_score: i64) -> MatchStateRow {
        MatchStateRow {
            match_id: "401638475".to_string(),
            status: status.to_string(),
            home_team: Some("Morocco".to_string()),
            away_team: None,
            home_score,
            away_score: 0,
            last_indexed_at: None,
            last_checked_at: Utc::now(),
        }
    }

    #[test]
    fn test_row_conversion() {
        let state = MatchState::try_from(row("live", 2)).unwrap();
        assert_eq!(state.status, MatchStatus::Live);
        assert_eq!(state.home_score, 2);
    }

    #[test]
    fn test_corrupt_rows_are_rejected() {
        assert!(matches!(
            MatchState::try_from(row("halftime", 0)),
            Err(StoreError::Corrupt { .. })
        ));
        assert!(matches!(
            MatchState::try_from(row("live", -1)),
            Err(StoreError::Corrupt { .. })
        ));
        assert!(matches!(
            MatchState::try_from(row("live", i64::from(u32::MAX) + 1)),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_largest_score_round_trips() {
        let stored = score_to_db(u32::MAX);
        assert_eq!(stored, 4_294_967_295);
        let state = MatchState::try_from(row("live", stored)).unwrap();
        assert_eq!(state.home_score, u32::MAX);
    }
}
