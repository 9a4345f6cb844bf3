use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

/// Per-user entitlement row. The authoritative source for trial gating;
/// anything a client caches is display-only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub trial_count: i32,
    pub is_premium: bool,
    pub created_at: OffsetDateTime,
}

/// Result of an atomic usage update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageOutcome {
    /// Counter advanced to this value.
    Recorded(i32),
    /// Premium account, usage is not metered.
    Unmetered,
    /// Counter already at the limit; nothing was spent.
    Exhausted,
}

impl Profile {
    /// Entitlement check. Must run before any external call is made.
    pub fn is_allowed(&self, trial_limit: i32) -> bool {
        self.is_premium || self.trial_count < trial_limit
    }

    pub async fn find(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            SELECT id, email, trial_count, is_premium, created_at
            FROM profiles
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(profile)
    }

    /// Created alongside the auth user at signup, inside the same transaction.
    pub async fn create_tx(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        email: &str,
    ) -> anyhow::Result<Profile> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (id, email, trial_count, is_premium)
            VALUES ($1, $2, 0, FALSE)
            RETURNING id, email, trial_count, is_premium, created_at
            "#,
        )
        .bind(id)
        .bind(email)
        .fetch_one(&mut **tx)
        .await
        .context("insert profile")?;
        Ok(profile)
    }

    /// Spend one trial. The guard lives in the UPDATE itself so concurrent
    /// requests for the same user cannot both spend the last trial; a
    /// read-modify-write from handler state would race.
    pub async fn record_usage(
        db: &PgPool,
        id: Uuid,
        trial_limit: i32,
    ) -> anyhow::Result<UsageOutcome> {
        let row = sqlx::query_as::<_, (i32,)>(
            r#"
            UPDATE profiles
            SET trial_count = trial_count + 1
            WHERE id = $1 AND NOT is_premium AND trial_count < $2
            RETURNING trial_count
            "#,
        )
        .bind(id)
        .bind(trial_limit)
        .fetch_optional(db)
        .await
        .context("record usage")?;

        if let Some((count,)) = row {
            return Ok(UsageOutcome::Recorded(count));
        }

        let profile = Profile::find(db, id)
            .await?
            .context("profile disappeared during usage update")?;
        if profile.is_premium {
            Ok(UsageOutcome::Unmetered)
        } else {
            Ok(UsageOutcome::Exhausted)
        }
    }

    /// Payment confirmation happens upstream; this only flips the flag.
    pub async fn upgrade(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            UPDATE profiles
            SET is_premium = TRUE
            WHERE id = $1
            RETURNING id, email, trial_count, is_premium, created_at
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(profile)
    }
}
