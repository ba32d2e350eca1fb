use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate, TimeZone, Utc};
use chrono_tz::Asia::Seoul;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::models::{
    DailyCount, NewPost, OptimizedImage, Post, SiteDigest, SiteStats, StatsSummary,
    TrendingCommunity,
};
use crate::constants::{NEWS_SITES, TZ_SQLITE_MODIFIER};
use crate::ranking::{self, SortMode, TopWindow};

/// Filter inputs for the post feed query.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    /// Case-insensitive substring over title or content.
    pub keyword: Option<String>,
    /// Exact author match.
    pub author: Option<String>,
    /// Single-site filter; wins over `sites` when both are present.
    pub site: Option<String>,
    /// Multi-site filter.
    pub sites: Vec<String>,
    /// `Some(true)` restricts to the designated news sites, `Some(false)`
    /// excludes them, `None` applies no restriction.
    pub news: Option<bool>,
    /// Upper bound on `no`, used to stabilize a live feed across polls.
    pub max_no: Option<i64>,
    /// Only posts that have at least one media record.
    pub media_only: bool,
    pub sort: SortMode,
    pub window: TopWindow,
}

/// A feed page row: the post plus the window count over the filtered set.
#[derive(sqlx::FromRow)]
struct PagedPostRow {
    #[sqlx(flatten)]
    post: Post,
    total_count: i64,
}

/// Append the WHERE clauses for `filter` to a query.
///
/// Shared by the page query and the empty-page count fallback so the two can
/// never disagree on what "the filtered set" means.
fn push_post_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &PostFilter) {
    qb.push(" WHERE 1=1");

    if let Some(keyword) = filter.keyword.as_deref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{keyword}%");
        qb.push(" AND (title LIKE ")
            .push_bind(pattern.clone())
            .push(" OR content LIKE ")
            .push_bind(pattern)
            .push(")");
    }

    if let Some(author) = filter.author.as_deref().filter(|s| !s.is_empty()) {
        qb.push(" AND author = ").push_bind(author.to_string());
    }

    if let Some(site) = filter.site.as_deref().filter(|s| !s.is_empty()) {
        qb.push(" AND site = ").push_bind(site.to_string());
    } else {
        let sites: Vec<&str> = filter
            .sites
            .iter()
            .map(String::as_str)
            .filter(|s| !s.is_empty())
            .collect();
        if !sites.is_empty() {
            qb.push(" AND site IN (");
            let mut separated = qb.separated(", ");
            for site in sites {
                separated.push_bind(site.to_string());
            }
            qb.push(")");
        }
    }

    match filter.news {
        Some(true) => {
            qb.push(" AND site IN (");
            let mut separated = qb.separated(", ");
            for site in NEWS_SITES {
                separated.push_bind(site);
            }
            qb.push(")");
        }
        Some(false) => {
            qb.push(" AND site NOT IN (");
            let mut separated = qb.separated(", ");
            for site in NEWS_SITES {
                separated.push_bind(site);
            }
            qb.push(")");
        }
        None => {}
    }

    if let Some(max_no) = filter.max_no {
        qb.push(" AND no <= ").push_bind(max_no);
    }

    if filter.media_only {
        qb.push(" AND EXISTS (SELECT 1 FROM optimized_images oi WHERE oi.no = site_bbs_info.no)");
    }

    if let Some(clause) = filter.sort.filter_sql(filter.window) {
        qb.push(" AND ");
        qb.push(clause);
    }
}

/// Fetch one page of the filtered, ranked feed along with the total count
/// of matching posts.
///
/// `page` is 1-based and both paging inputs are assumed pre-clamped by the
/// caller. The total is read from a window count in the page query itself;
/// a page past the end of the result set falls back to a bare COUNT so the
/// paging envelope stays correct.
pub async fn list_posts(
    pool: &SqlitePool,
    filter: &PostFilter,
    page: i64,
    page_size: i64,
) -> Result<(Vec<Post>, i64)> {
    let offset = (page - 1) * page_size;

    let mut qb = QueryBuilder::new(format!(
        "SELECT *, {score} AS score, {tier} AS tier, COUNT(*) OVER () AS total_count FROM site_bbs_info",
        score = ranking::score_sql(),
        tier = ranking::tier_sql(),
    ));
    push_post_filters(&mut qb, filter);
    qb.push(" ");
    qb.push(filter.sort.order_by_sql());
    qb.push(" LIMIT ")
        .push_bind(page_size)
        .push(" OFFSET ")
        .push_bind(offset);

    let rows: Vec<PagedPostRow> = qb
        .build_query_as()
        .fetch_all(pool)
        .await
        .context("Failed to fetch posts page")?;

    let total = match rows.first() {
        Some(row) => row.total_count,
        None => count_posts_filtered(pool, filter).await?,
    };

    Ok((rows.into_iter().map(|r| r.post).collect(), total))
}

/// Count posts matching the filter.
async fn count_posts_filtered(pool: &SqlitePool, filter: &PostFilter) -> Result<i64> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM site_bbs_info");
    push_post_filters(&mut qb, filter);

    let row: (i64,) = qb
        .build_query_as()
        .fetch_one(pool)
        .await
        .context("Failed to count posts")?;
    Ok(row.0)
}

/// Get a post by its identifier.
pub async fn get_post(pool: &SqlitePool, no: i64) -> Result<Option<Post>> {
    sqlx::query_as("SELECT * FROM site_bbs_info WHERE no = ?")
        .bind(no)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch post")
}

/// Media records for a single post, oldest first.
pub async fn media_for_post(pool: &SqlitePool, no: i64) -> Result<Vec<OptimizedImage>> {
    sqlx::query_as("SELECT * FROM optimized_images WHERE no = ? ORDER BY id")
        .bind(no)
        .fetch_all(pool)
        .await
        .context("Failed to fetch media for post")
}

/// Media records for a batch of posts, grouped by owning post.
///
/// One IN query instead of a round trip per post on the feed page.
pub async fn media_for_posts(
    pool: &SqlitePool,
    nos: &[i64],
) -> Result<HashMap<i64, Vec<OptimizedImage>>> {
    if nos.is_empty() {
        return Ok(HashMap::new());
    }

    let mut qb = QueryBuilder::new("SELECT * FROM optimized_images WHERE no IN (");
    let mut separated = qb.separated(", ");
    for no in nos {
        separated.push_bind(*no);
    }
    qb.push(") ORDER BY id");

    let rows: Vec<OptimizedImage> = qb
        .build_query_as()
        .fetch_all(pool)
        .await
        .context("Failed to fetch media for posts")?;

    let mut by_post: HashMap<i64, Vec<OptimizedImage>> = HashMap::new();
    for row in rows {
        by_post.entry(row.no).or_default().push(row);
    }
    Ok(by_post)
}

/// Distinct non-empty site names, ascending.
pub async fn list_sites(pool: &SqlitePool) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT site FROM site_bbs_info WHERE site <> '' ORDER BY site ASC",
    )
    .fetch_all(pool)
    .await
    .context("Failed to list sites")?;
    Ok(rows.into_iter().map(|(site,)| site).collect())
}

/// Top posts by the simple views + likes heuristic.
///
/// This endpoint predates the canonical score and keeps its documented
/// formula; every ranked feed path uses [`ranking::score_sql`] instead.
pub async fn popular_posts(pool: &SqlitePool, count: i64) -> Result<Vec<Post>> {
    sqlx::query_as(
        "SELECT * FROM site_bbs_info
         WHERE views > 0 OR likes > 0
         ORDER BY views + likes * 10 DESC, no DESC
         LIMIT ?",
    )
    .bind(count)
    .fetch_all(pool)
    .await
    .context("Failed to fetch popular posts")
}

/// UTC bounds `[start, end)` for a week-digest request.
///
/// Week `w` covers month days (w-1)*7+1 ..= min(w*7, last day); an optional
/// day 1-7 narrows to the single day (w-1)*7+d. Days are calendar days in
/// the fixed service timezone. Returns `None` for out-of-range inputs.
#[must_use]
pub fn week_digest_range(
    year: i32,
    month: u32,
    week: u32,
    day: Option<u32>,
) -> Option<(String, String)> {
    if !(1..=6).contains(&week) {
        return None;
    }

    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let last_day = days_in_month(first)?;

    let (start_day, end_day) = match day {
        Some(d) => {
            if !(1..=7).contains(&d) {
                return None;
            }
            let day_of_month = (week - 1) * 7 + d;
            (day_of_month, day_of_month)
        }
        None => ((week - 1) * 7 + 1, (week * 7).min(last_day)),
    };

    if start_day > last_day || end_day > last_day {
        return None;
    }

    let start = NaiveDate::from_ymd_opt(year, month, start_day)?;
    let end = NaiveDate::from_ymd_opt(year, month, end_day)?.checked_add_days(Days::new(1))?;

    Some((local_midnight_utc(start)?, local_midnight_utc(end)?))
}

fn days_in_month(first: NaiveDate) -> Option<u32> {
    use chrono::Datelike;
    let next = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)?
    };
    Some(next.signed_duration_since(first).num_days() as u32)
}

/// Midnight of a service-timezone calendar day, rendered as a stored UTC
/// timestamp.
fn local_midnight_utc(date: NaiveDate) -> Option<String> {
    let local = date.and_hms_opt(0, 0, 0)?;
    let zoned = Seoul.from_local_datetime(&local).single()?;
    Some(
        zoned
            .with_timezone(&Utc)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
    )
}

/// Posts in `[start, end)` grouped by site, each site carrying its top
/// `per_site` posts by canonical score.
pub async fn week_digest(
    pool: &SqlitePool,
    start: &str,
    end: &str,
    per_site: usize,
) -> Result<Vec<SiteDigest>> {
    let sql = format!(
        "SELECT *, {score} AS score FROM site_bbs_info
         WHERE posted_dt >= ? AND posted_dt < ?
         ORDER BY site ASC, score DESC, no DESC",
        score = ranking::score_sql(),
    );

    let posts: Vec<Post> = sqlx::query_as(&sql)
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await
        .context("Failed to fetch week digest posts")?;

    // Rows arrive grouped by site, best-first within each group.
    let mut digests: Vec<SiteDigest> = Vec::new();
    for post in posts {
        match digests.last_mut() {
            Some(digest) if digest.site == post.site => {
                if digest.posts.len() < per_site {
                    digest.posts.push(post);
                }
            }
            _ => digests.push(SiteDigest {
                site: post.site.clone(),
                posts: vec![post],
            }),
        }
    }

    Ok(digests)
}

/// Per-site like/reply sums over the trailing 24 hours, each paired with the
/// site's best-scoring post in the window. Most active sites first.
pub async fn trending_communities(pool: &SqlitePool) -> Result<Vec<TrendingCommunity>> {
    let aggregates: Vec<(String, i64, i64)> = sqlx::query_as(
        "SELECT site, COALESCE(SUM(likes), 0), COALESCE(SUM(reply_num), 0)
         FROM site_bbs_info
         WHERE posted_dt >= datetime('now', '-1 day')
         GROUP BY site
         ORDER BY SUM(likes) + SUM(reply_num) DESC",
    )
    .fetch_all(pool)
    .await
    .context("Failed to fetch trending aggregates")?;

    let sql = format!(
        "SELECT *, {score} AS score FROM site_bbs_info
         WHERE posted_dt >= datetime('now', '-1 day')
         ORDER BY score DESC, no DESC",
        score = ranking::score_sql(),
    );
    let posts: Vec<Post> = sqlx::query_as(&sql)
        .fetch_all(pool)
        .await
        .context("Failed to fetch trending posts")?;

    let mut top_by_site: HashMap<String, Post> = HashMap::new();
    for post in posts {
        top_by_site.entry(post.site.clone()).or_insert(post);
    }

    Ok(aggregates
        .into_iter()
        .map(|(site, total_likes, total_replies)| {
            let top_post = top_by_site.remove(&site);
            TrendingCommunity {
                site,
                total_likes,
                total_replies,
                top_post,
            }
        })
        .collect())
}

/// Total post count and distinct site count.
pub async fn stats_summary(pool: &SqlitePool) -> Result<StatsSummary> {
    let row: (i64, i64) =
        sqlx::query_as("SELECT COUNT(*), COUNT(DISTINCT site) FROM site_bbs_info")
            .fetch_one(pool)
            .await
            .context("Failed to fetch stats summary")?;
    Ok(StatsSummary {
        total_posts: row.0,
        total_sites: row.1,
    })
}

/// Per-site post counts and engagement sums, largest boards first.
pub async fn site_stats(pool: &SqlitePool) -> Result<Vec<SiteStats>> {
    sqlx::query_as(
        "SELECT site,
                COUNT(*) AS post_count,
                COALESCE(SUM(views), 0) AS total_views,
                COALESCE(SUM(likes), 0) AS total_likes,
                COALESCE(SUM(reply_num), 0) AS total_replies
         FROM site_bbs_info
         GROUP BY site
         ORDER BY post_count DESC, site ASC",
    )
    .fetch_all(pool)
    .await
    .context("Failed to fetch site stats")
}

/// Most recently ingested posts.
pub async fn recent_posts(pool: &SqlitePool, count: i64) -> Result<Vec<Post>> {
    sqlx::query_as("SELECT * FROM site_bbs_info ORDER BY reg_date DESC, no DESC LIMIT ?")
        .bind(count)
        .fetch_all(pool)
        .await
        .context("Failed to fetch recent posts")
}

/// Posts ingested per service-timezone day over the trailing week.
pub async fn weekly_crawl_histogram(pool: &SqlitePool) -> Result<Vec<DailyCount>> {
    let sql = format!(
        "SELECT date(reg_date, '{tz}') AS date, COUNT(*) AS count
         FROM site_bbs_info
         WHERE reg_date >= datetime('now', '-7 days')
         GROUP BY date(reg_date, '{tz}')
         ORDER BY date ASC",
        tz = TZ_SQLITE_MODIFIER,
    );
    sqlx::query_as(&sql)
        .fetch_all(pool)
        .await
        .context("Failed to fetch weekly crawl histogram")
}

/// Ingestion timestamp of the newest post, if any.
pub async fn latest_crawl(pool: &SqlitePool) -> Result<Option<String>> {
    let row: (Option<String>,) = sqlx::query_as("SELECT MAX(reg_date) FROM site_bbs_info")
        .fetch_one(pool)
        .await
        .context("Failed to fetch latest crawl timestamp")?;
    Ok(row.0)
}

/// Delete a post and its media rows as one transaction.
///
/// Returns whether the post existed. A failure anywhere rolls the whole
/// delete back, so no orphaned media and no dangling post.
pub async fn delete_post(pool: &SqlitePool, no: i64) -> Result<bool> {
    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin delete transaction")?;

    sqlx::query("DELETE FROM optimized_images WHERE no = ?")
        .bind(no)
        .execute(&mut *tx)
        .await
        .context("Failed to delete post media")?;

    let result = sqlx::query("DELETE FROM site_bbs_info WHERE no = ?")
        .bind(no)
        .execute(&mut *tx)
        .await
        .context("Failed to delete post")?;

    if result.rows_affected() == 0 {
        tx.rollback()
            .await
            .context("Failed to roll back delete transaction")?;
        return Ok(false);
    }

    tx.commit()
        .await
        .context("Failed to commit delete transaction")?;
    Ok(true)
}

/// Insert a new post, returning its identifier. Used by the ingestion
/// process and tests; the feed itself never writes posts.
pub async fn insert_post(pool: &SqlitePool, post: &NewPost) -> Result<i64> {
    let result = sqlx::query(
        r"
        INSERT INTO site_bbs_info
            (number, site, title, author, content, date, posted_dt, views, likes, reply_num, url)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(post.number)
    .bind(&post.site)
    .bind(&post.title)
    .bind(&post.author)
    .bind(&post.content)
    .bind(&post.date)
    .bind(&post.posted_dt)
    .bind(post.views)
    .bind(post.likes)
    .bind(post.reply_num)
    .bind(&post.url)
    .execute(pool)
    .await
    .context("Failed to insert post")?;

    Ok(result.last_insert_rowid())
}

/// Attach a media record to a post, returning the record id.
pub async fn insert_image(pool: &SqlitePool, no: i64, media_url: &str) -> Result<i64> {
    let result = sqlx::query("INSERT INTO optimized_images (no, media_url) VALUES (?, ?)")
        .bind(no)
        .bind(media_url)
        .execute(pool)
        .await
        .context("Failed to insert media record")?;

    Ok(result.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_week_digest_range_full_week() {
        let (start, end) = week_digest_range(2025, 3, 2, None).unwrap();
        // Seoul days 8..=14 of March 2025, midnight boundaries in UTC.
        assert_eq!(start, "2025-03-07 15:00:00");
        assert_eq!(end, "2025-03-14 15:00:00");
    }

    #[test]
    fn test_week_digest_range_single_day() {
        let (start, end) = week_digest_range(2025, 3, 1, Some(3)).unwrap();
        assert_eq!(start, "2025-03-02 15:00:00");
        assert_eq!(end, "2025-03-03 15:00:00");
    }

    #[test]
    fn test_week_digest_range_clamps_to_month_end() {
        // Week 5 of February 2025 is day 29+, which does not exist.
        assert!(week_digest_range(2025, 2, 5, None).is_none());
        // Week 5 of March covers days 29..=31.
        let (start, end) = week_digest_range(2025, 3, 5, None).unwrap();
        assert_eq!(start, "2025-03-28 15:00:00");
        assert_eq!(end, "2025-03-31 15:00:00");
    }

    #[test]
    fn test_week_digest_range_rejects_bad_inputs() {
        assert!(week_digest_range(2025, 13, 1, None).is_none());
        assert!(week_digest_range(2025, 3, 0, None).is_none());
        assert!(week_digest_range(2025, 3, 1, Some(8)).is_none());
    }
}
