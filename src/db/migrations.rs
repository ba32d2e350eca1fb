use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

/// Run all pending migrations.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    create_migration_table(pool).await?;
    let current_version = get_schema_version(pool).await?;

    if current_version < 1 {
        debug!("Running migration v1");
        run_migration_v1(pool).await?;
        set_schema_version(pool, 1).await?;
    }

    if current_version < 2 {
        debug!("Running migration v2");
        run_migration_v2(pool).await?;
        set_schema_version(pool, 2).await?;
    }

    Ok(())
}

async fn create_migration_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS _schema_version (
            version INTEGER PRIMARY KEY
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create schema version table")?;

    Ok(())
}

async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT version FROM _schema_version LIMIT 1")
        .fetch_optional(pool)
        .await
        .context("Failed to get schema version")?;

    Ok(row.map_or(0, |(v,)| v))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("DELETE FROM _schema_version")
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO _schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

async fn run_migration_v1(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v1: creating initial schema");

    // Denormalized post table filled by the external crawler. `no` is the
    // only key the feed relies on: immutable, ascending in insertion order.
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS site_bbs_info (
            no INTEGER PRIMARY KEY AUTOINCREMENT,
            number INTEGER,
            site TEXT NOT NULL,
            title TEXT,
            author TEXT,
            content TEXT,
            date TEXT,
            posted_dt TEXT,
            views INTEGER NOT NULL DEFAULT 0,
            likes INTEGER NOT NULL DEFAULT 0,
            reply_num INTEGER NOT NULL DEFAULT 0,
            url TEXT,
            reg_date TEXT NOT NULL DEFAULT (datetime('now'))
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create site_bbs_info table")?;

    // Optimized media produced by the CDN pipeline, many-to-one to posts.
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS optimized_images (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            no INTEGER NOT NULL REFERENCES site_bbs_info(no) ON DELETE CASCADE,
            media_url TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create optimized_images table")?;

    // One row per distinct visitor IP; mutated only by the atomic upsert.
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS website_access_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ip_address TEXT NOT NULL UNIQUE,
            access_count INTEGER NOT NULL DEFAULT 1,
            first_access_time TEXT NOT NULL,
            last_access_time TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create website_access_log table")?;

    Ok(())
}

async fn run_migration_v2(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v2: adding query indexes");

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_site_bbs_info_site ON site_bbs_info(site)",
        "CREATE INDEX IF NOT EXISTS idx_site_bbs_info_posted_dt ON site_bbs_info(posted_dt)",
        "CREATE INDEX IF NOT EXISTS idx_site_bbs_info_reg_date ON site_bbs_info(reg_date)",
        "CREATE INDEX IF NOT EXISTS idx_site_bbs_info_site_title ON site_bbs_info(site, title)",
        "CREATE INDEX IF NOT EXISTS idx_optimized_images_no ON optimized_images(no)",
        "CREATE INDEX IF NOT EXISTS idx_access_log_last_access ON website_access_log(last_access_time)",
    ];

    for sql in indexes {
        sqlx::query(sql)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to create index: {sql}"))?;
    }

    Ok(())
}
