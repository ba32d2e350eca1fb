use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::models::{AccessLogEntry, DailyCount};
use crate::constants::TZ_SQLITE_MODIFIER;

/// Record one visit from `ip`.
///
/// A single conditional upsert: the increment happens inside the store, so
/// concurrent requests from the same address cannot lose updates. Never a
/// read-then-write pair.
pub async fn record_access(pool: &SqlitePool, ip: &str) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO website_access_log
            (ip_address, access_count, first_access_time, last_access_time, created_at, updated_at)
        VALUES (?, 1, datetime('now'), datetime('now'), datetime('now'), datetime('now'))
        ON CONFLICT(ip_address) DO UPDATE SET
            access_count = access_count + 1,
            last_access_time = excluded.last_access_time,
            updated_at = excluded.updated_at
        ",
    )
    .bind(ip)
    .execute(pool)
    .await
    .context("Failed to record access")?;

    Ok(())
}

/// Count of distinct visitor IPs.
pub async fn total_visitors(pool: &SqlitePool) -> Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM website_access_log")
        .fetch_one(pool)
        .await
        .context("Failed to count visitors")?;
    Ok(row.0)
}

/// Sum of all per-IP access counts.
pub async fn total_access_count(pool: &SqlitePool) -> Result<i64> {
    let row: (i64,) =
        sqlx::query_as("SELECT COALESCE(SUM(access_count), 0) FROM website_access_log")
            .fetch_one(pool)
            .await
            .context("Failed to sum access counts")?;
    Ok(row.0)
}

/// Distinct visitors whose last access falls on the current service-timezone
/// calendar day.
pub async fn today_visitors(pool: &SqlitePool) -> Result<i64> {
    let sql = format!(
        "SELECT COUNT(*) FROM website_access_log
         WHERE date(last_access_time, '{tz}') = date('now', '{tz}')",
        tz = TZ_SQLITE_MODIFIER,
    );
    let row: (i64,) = sqlx::query_as(&sql)
        .fetch_one(pool)
        .await
        .context("Failed to count today's visitors")?;
    Ok(row.0)
}

/// Most recently seen entries.
pub async fn recent_access_logs(pool: &SqlitePool, count: i64) -> Result<Vec<AccessLogEntry>> {
    sqlx::query_as(
        "SELECT * FROM website_access_log
         ORDER BY last_access_time DESC, id DESC
         LIMIT ?",
    )
    .bind(count)
    .fetch_all(pool)
    .await
    .context("Failed to fetch recent access logs")
}

/// Entries with the highest access counts.
pub async fn top_visitors(pool: &SqlitePool, count: i64) -> Result<Vec<AccessLogEntry>> {
    sqlx::query_as(
        "SELECT * FROM website_access_log
         ORDER BY access_count DESC, last_access_time DESC
         LIMIT ?",
    )
    .bind(count)
    .fetch_all(pool)
    .await
    .context("Failed to fetch top visitors")
}

/// Summed access counts bucketed by service-timezone day over the trailing
/// `days`-day window, oldest bucket first.
///
/// Buckets by each entry's last access day, matching the counter's
/// one-row-per-IP shape.
pub async fn daily_visit_stats(pool: &SqlitePool, days: i64) -> Result<Vec<DailyCount>> {
    let sql = format!(
        "SELECT date(last_access_time, '{tz}') AS date,
                COALESCE(SUM(access_count), 0) AS count
         FROM website_access_log
         WHERE last_access_time >= datetime('now', ?)
         GROUP BY date(last_access_time, '{tz}')
         ORDER BY date ASC",
        tz = TZ_SQLITE_MODIFIER,
    );
    sqlx::query_as(&sql)
        .bind(format!("-{days} days"))
        .fetch_all(pool)
        .await
        .context("Failed to fetch daily visit stats")
}
