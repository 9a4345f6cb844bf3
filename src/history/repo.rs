use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// Lifecycle of a processed image. Moves forward only; `done` and
/// `failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "history_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum HistoryStatus {
    Pending,
    Restoring,
    Colorizing,
    Done,
    Failed,
}

impl sqlx::postgres::PgHasArrayType for HistoryStatus {
    fn array_type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("_history_status")
    }
}

impl HistoryStatus {
    const ALL: [HistoryStatus; 5] = [
        HistoryStatus::Pending,
        HistoryStatus::Restoring,
        HistoryStatus::Colorizing,
        HistoryStatus::Done,
        HistoryStatus::Failed,
    ];

    fn rank(self) -> u8 {
        match self {
            HistoryStatus::Pending => 0,
            HistoryStatus::Restoring => 1,
            HistoryStatus::Colorizing => 2,
            HistoryStatus::Done => 3,
            HistoryStatus::Failed => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, HistoryStatus::Done | HistoryStatus::Failed)
    }

    /// Forward-only transitions; any non-terminal state may fail.
    pub fn can_advance_to(self, next: HistoryStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == HistoryStatus::Failed {
            return true;
        }
        next.rank() > self.rank()
    }

    /// States allowed to move to `next`. The update guards below bind this
    /// set, so the transition rules have exactly one encoding.
    fn advance_sources(next: HistoryStatus) -> Vec<HistoryStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_advance_to(next))
            .collect()
    }
}

/// Append-only record of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HistoryRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub original_url: String,
    pub restored_url: Option<String>,
    pub colorized_url: Option<String>,
    pub status: HistoryStatus,
    /// Provenance only (e.g. which ephemeral URL a stage came from);
    /// never consulted by control flow.
    pub meta: serde_json::Value,
    pub created_at: OffsetDateTime,
}

const COLUMNS: &str =
    "id, user_id, original_url, restored_url, colorized_url, status, meta, created_at";

impl HistoryRecord {
    pub async fn insert(
        db: &PgPool,
        user_id: Uuid,
        original_url: &str,
    ) -> anyhow::Result<HistoryRecord> {
        let record = sqlx::query_as::<_, HistoryRecord>(&format!(
            r#"
            INSERT INTO history (user_id, original_url, status, meta)
            VALUES ($1, $2, 'restoring', '{{}}'::jsonb)
            RETURNING {COLUMNS}
            "#,
        ))
        .bind(user_id)
        .bind(original_url)
        .fetch_one(db)
        .await
        .context("insert history record")?;
        Ok(record)
    }

    /// Stage 1 complete. The status guard in the WHERE clause keeps the
    /// record from regressing if an update races or repeats.
    pub async fn set_restored(
        db: &PgPool,
        id: Uuid,
        restored_url: &str,
        next: HistoryStatus,
        meta: &serde_json::Value,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE history
            SET restored_url = $2, status = $3, meta = meta || $4
            WHERE id = $1 AND status = ANY($5)
            "#,
        )
        .bind(id)
        .bind(restored_url)
        .bind(next)
        .bind(meta)
        .bind(HistoryStatus::advance_sources(next))
        .execute(db)
        .await
        .context("set restored url")?;
        Ok(())
    }

    /// Stage 2 complete. Guarded on `colorizing` alone: stage ordering
    /// (restored before colorized) is stricter than forward-only.
    pub async fn set_colorized(
        db: &PgPool,
        id: Uuid,
        colorized_url: &str,
        meta: &serde_json::Value,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE history
            SET colorized_url = $2, status = 'done', meta = meta || $3
            WHERE id = $1 AND status = 'colorizing'
            "#,
        )
        .bind(id)
        .bind(colorized_url)
        .bind(meta)
        .execute(db)
        .await
        .context("set colorized url")?;
        Ok(())
    }

    /// Terminal failure. Guarded so an already finished record stays put.
    pub async fn mark_failed(db: &PgPool, id: Uuid, detail: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE history
            SET status = 'failed', meta = meta || jsonb_build_object('error', $2::text)
            WHERE id = $1 AND status = ANY($3)
            "#,
        )
        .bind(id)
        .bind(detail)
        .bind(HistoryStatus::advance_sources(HistoryStatus::Failed))
        .execute(db)
        .await
        .context("mark history failed")?;
        Ok(())
    }

    pub async fn list_by_user(
        db: &PgPool,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<HistoryRecord>> {
        let rows = sqlx::query_as::<_, HistoryRecord>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM history
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn get(db: &PgPool, user_id: Uuid, id: Uuid) -> anyhow::Result<Option<HistoryRecord>> {
        let record = sqlx::query_as::<_, HistoryRecord>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM history
            WHERE id = $1 AND user_id = $2
            "#,
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(record)
    }
}
