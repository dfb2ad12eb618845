//! Primary record store backed by Postgres (Supabase-hosted in
//! production). One flat row per submission; the evidence manifest rides
//! in a JSON text column, committee votes in the semicolon-joined wire
//! format. Guarded writes put the lock precondition into the UPDATE's
//! WHERE clause so the token check and the write land in one statement.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::error::Result;
use crate::models::{
    CommitteeVote, EvidenceFile, LockState, Perspective, PerspectiveEntry, Stage1Decision,
    SubmissionRecord,
};
use crate::store::{FieldUpdates, RecordKey, RecordStore, WriteGuard};

const SCHEMA_DDL: &[&str] = &[
    "CREATE SCHEMA IF NOT EXISTS awards",
    r#"
    CREATE TABLE IF NOT EXISTS awards.submissions (
        id UUID PRIMARY KEY,
        candidate_name TEXT NOT NULL,
        submitted_at TIMESTAMPTZ NOT NULL,
        financial_action TEXT NOT NULL DEFAULT '',
        financial_score DOUBLE PRECISION NOT NULL DEFAULT 0,
        customer_action TEXT NOT NULL DEFAULT '',
        customer_score DOUBLE PRECISION NOT NULL DEFAULT 0,
        process_action TEXT NOT NULL DEFAULT '',
        process_score DOUBLE PRECISION NOT NULL DEFAULT 0,
        learning_action TEXT NOT NULL DEFAULT '',
        learning_score DOUBLE PRECISION NOT NULL DEFAULT 0,
        evidence TEXT NOT NULL DEFAULT '{}',
        total_score DOUBLE PRECISION NOT NULL DEFAULT 0,
        stage1 TEXT NOT NULL DEFAULT '',
        stage1_comment TEXT NOT NULL DEFAULT '',
        committee_votes TEXT NOT NULL DEFAULT '',
        current_status TEXT NOT NULL DEFAULT '',
        lock_token TEXT NOT NULL DEFAULT '',
        lock_expires_at TIMESTAMPTZ,
        lock_holder TEXT NOT NULL DEFAULT '',
        UNIQUE (candidate_name, submitted_at)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS awards.settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
];

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    for statement in SCHEMA_DDL {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }
}

const SELECT_COLUMNS: &str = "SELECT id, candidate_name, submitted_at, \
     financial_action, financial_score, customer_action, customer_score, \
     process_action, process_score, learning_action, learning_score, \
     evidence, total_score, stage1, stage1_comment, committee_votes, \
     current_status, lock_token, lock_expires_at, lock_holder \
     FROM awards.submissions";

fn row_to_record(row: &PgRow) -> Result<SubmissionRecord> {
    let manifest: BTreeMap<Perspective, Vec<EvidenceFile>> =
        serde_json::from_str(row.get::<String, _>("evidence").as_str())?;

    let mut entries = BTreeMap::new();
    for perspective in Perspective::ALL {
        let action: String = row.get(format!("{}_action", perspective.slug()).as_str());
        let score: f64 = row.get(format!("{}_score", perspective.slug()).as_str());
        entries.insert(
            perspective,
            PerspectiveEntry {
                action,
                score,
                evidence: manifest.get(&perspective).cloned().unwrap_or_default(),
            },
        );
    }

    Ok(SubmissionRecord {
        id: row.get("id"),
        candidate_name: row.get("candidate_name"),
        submitted_at: row.get("submitted_at"),
        entries,
        total_score: row.get("total_score"),
        stage1: Stage1Decision::parse(row.get::<String, _>("stage1").as_str()),
        stage1_comment: row.get("stage1_comment"),
        committee_votes: CommitteeVote::parse_list(
            row.get::<String, _>("committee_votes").as_str(),
        ),
        current_status: row.get("current_status"),
        lock: LockState {
            token: row.get("lock_token"),
            expires_at: row.get("lock_expires_at"),
            holder: row.get("lock_holder"),
        },
    })
}

#[async_trait]
impl RecordStore for PgStore {
    async fn insert(&self, record: &SubmissionRecord) -> Result<()> {
        let manifest: BTreeMap<Perspective, Vec<EvidenceFile>> = Perspective::ALL
            .into_iter()
            .map(|p| (p, record.entry(p).evidence))
            .collect();

        let mut query = sqlx::query(
            r#"
            INSERT INTO awards.submissions
            (id, candidate_name, submitted_at,
             financial_action, financial_score, customer_action, customer_score,
             process_action, process_score, learning_action, learning_score,
             evidence, total_score, stage1, stage1_comment, committee_votes,
             current_status, lock_token, lock_expires_at, lock_holder)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            ON CONFLICT (candidate_name, submitted_at) DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(record.candidate_name.as_str())
        .bind(record.submitted_at);

        for perspective in Perspective::ALL {
            let entry = record.entry(perspective);
            query = query.bind(entry.action).bind(entry.score);
        }

        query
            .bind(serde_json::to_string(&manifest)?)
            .bind(record.total_score)
            .bind(record.stage1.map(|d| d.as_str()).unwrap_or(""))
            .bind(record.stage1_comment.as_str())
            .bind(CommitteeVote::join_list(&record.committee_votes))
            .bind(record.current_status.as_str())
            .bind(record.lock.token.as_str())
            .bind(record.lock.expires_at)
            .bind(record.lock.holder.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn find(&self, key: &RecordKey) -> Result<Option<SubmissionRecord>> {
        let row = match key.submitted_at {
            Some(ts) => {
                let sql =
                    format!("{SELECT_COLUMNS} WHERE candidate_name = $1 AND submitted_at = $2");
                sqlx::query(&sql)
                    .bind(key.candidate_name.as_str())
                    .bind(ts)
                    .fetch_optional(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "{SELECT_COLUMNS} WHERE candidate_name = $1 ORDER BY submitted_at DESC LIMIT 1"
                );
                sqlx::query(&sql)
                    .bind(key.candidate_name.as_str())
                    .fetch_optional(&self.pool)
                    .await?
            }
        };

        row.as_ref().map(row_to_record).transpose()
    }

    async fn list_all(&self) -> Result<Vec<SubmissionRecord>> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY submitted_at ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn apply(
        &self,
        key: &RecordKey,
        updates: FieldUpdates,
        guard: WriteGuard,
    ) -> Result<bool> {
        let mut sets: Vec<String> = Vec::new();
        let mut next = 1usize;

        if updates.stage1.is_some() {
            sets.push(format!("stage1 = ${next}"));
            next += 1;
        }
        if updates.stage1_comment.is_some() {
            sets.push(format!("stage1_comment = ${next}"));
            next += 1;
        }
        if updates.committee_votes.is_some() {
            sets.push(format!("committee_votes = ${next}"));
            next += 1;
        }
        if updates.current_status.is_some() {
            sets.push(format!("current_status = ${next}"));
            next += 1;
        }
        if updates.lock.is_some() {
            sets.push(format!("lock_token = ${next}"));
            next += 1;
            sets.push(format!("lock_expires_at = ${next}"));
            next += 1;
            sets.push(format!("lock_holder = ${next}"));
            next += 1;
        }
        if sets.is_empty() {
            // no-op update; still reports whether key and guard matched
            sets.push("candidate_name = candidate_name".to_string());
        }

        let target = match key.submitted_at {
            Some(_) => {
                let sql = format!(
                    "SELECT id FROM awards.submissions \
                     WHERE candidate_name = ${} AND submitted_at = ${}",
                    next,
                    next + 1
                );
                next += 2;
                sql
            }
            None => {
                let sql = format!(
                    "SELECT id FROM awards.submissions WHERE candidate_name = ${next} \
                     ORDER BY submitted_at DESC LIMIT 1"
                );
                next += 1;
                sql
            }
        };

        let guard_sql = match &guard {
            WriteGuard::Any => String::new(),
            WriteGuard::HeldBy(_) => {
                let sql = format!(" AND lock_token = ${next}");
                next += 1;
                sql
            }
            WriteGuard::TokenOrFree(_) => {
                let sql = format!(" AND (lock_token = '' OR lock_token = ${next})");
                next += 1;
                sql
            }
            WriteGuard::Free(_) => {
                let sql = format!(
                    " AND (lock_token = '' OR lock_expires_at IS NULL \
                     OR lock_expires_at <= ${next})"
                );
                next += 1;
                sql
            }
        };
        let _ = next;

        let sql = format!(
            "UPDATE awards.submissions SET {} WHERE id = ({target}){guard_sql}",
            sets.join(", ")
        );

        let mut query = sqlx::query(&sql);
        if let Some(decision) = updates.stage1 {
            query = query.bind(decision.as_str());
        }
        if let Some(comment) = updates.stage1_comment.as_deref() {
            query = query.bind(comment.to_string());
        }
        if let Some(votes) = updates.committee_votes.as_ref() {
            query = query.bind(CommitteeVote::join_list(votes));
        }
        if let Some(status) = updates.current_status.as_deref() {
            query = query.bind(status.to_string());
        }
        if let Some(lock) = updates.lock.as_ref() {
            query = query
                .bind(lock.token.clone())
                .bind(lock.expires_at)
                .bind(lock.holder.clone());
        }
        query = query.bind(key.candidate_name.as_str());
        if let Some(ts) = key.submitted_at {
            query = query.bind(ts);
        }
        match &guard {
            WriteGuard::Any => {}
            WriteGuard::HeldBy(token) | WriteGuard::TokenOrFree(token) => {
                query = query.bind(token.clone());
            }
            WriteGuard::Free(now) => {
                query = query.bind(*now);
            }
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM awards.settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO awards.settings (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
