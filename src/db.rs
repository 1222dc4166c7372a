use anyhow::Context;
use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::decide::Decision;
use crate::models::NudgeHistoryEntry;

pub async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to record or read nudge history")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn record_decision(
    pool: &PgPool,
    decision: &Decision,
    decided_on: NaiveDate,
) -> anyhow::Result<Uuid> {
    let decision_id = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO nudge_engine.decisions (id, user_id, fomo_score, decided_on)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(decision_id)
    .bind(&decision.response.user_id)
    .bind(decision.fomo_score)
    .bind(decided_on)
    .execute(&mut *tx)
    .await?;

    for (position, nudge) in decision.response.nudges.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO nudge_engine.decision_nudges
            (decision_id, position, kind, title, action, priority)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(decision_id)
        .bind(position as i32)
        .bind(nudge.kind.as_str())
        .bind(&nudge.title)
        .bind(&nudge.action)
        .bind(&nudge.priority)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(decision_id)
}

pub async fn fetch_history(
    pool: &PgPool,
    user_id: &str,
    limit: i64,
) -> anyhow::Result<Vec<NudgeHistoryEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT d.decided_on, d.fomo_score, n.kind, n.title, n.priority
        FROM nudge_engine.decisions d
        JOIN nudge_engine.decision_nudges n ON n.decision_id = d.id
        WHERE d.user_id = $1
        ORDER BY d.created_at DESC, n.position ASC
        LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(limit.max(1))
    .fetch_all(pool)
    .await?;

    let mut history = Vec::new();

    for row in rows {
        history.push(NudgeHistoryEntry {
            decided_on: row.get("decided_on"),
            fomo_score: row.get("fomo_score"),
            kind: row.get("kind"),
            title: row.get("title"),
            priority: row.get("priority"),
        });
    }

    Ok(history)
}
