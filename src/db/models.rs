use serde::{Deserialize, Serialize};

use crate::media::MediaKind;

/// A post scraped from a community bulletin board.
///
/// `no` is assigned by the store, immutable, and ascending in insertion
/// order; the feed uses it as its dedupe/cursor key. `date` is the display
/// string shown on the source board, `posted_dt` the canonical posting
/// timestamp, `reg_date` the ingestion timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub no: i64,
    pub number: Option<i64>,
    pub site: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub content: Option<String>,
    pub date: Option<String>,
    pub posted_dt: Option<String>,
    pub views: i64,
    pub likes: i64,
    pub reply_num: i64,
    pub url: Option<String>,
    pub reg_date: String,
}

/// Data for inserting a new post (ingestion seam and tests).
#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub number: Option<i64>,
    pub site: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub content: Option<String>,
    pub date: Option<String>,
    pub posted_dt: Option<String>,
    pub views: i64,
    pub likes: i64,
    pub reply_num: i64,
    pub url: Option<String>,
}

/// An optimized media record owned by a post.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OptimizedImage {
    pub id: i64,
    pub no: i64,
    pub media_url: String,
    pub created_at: String,
}

impl OptimizedImage {
    /// Kind of media the URL points at, inferred at the boundary.
    #[must_use]
    pub fn media_type(&self) -> Option<MediaKind> {
        MediaKind::infer(&self.media_url)
    }
}

/// Response shape for a media record, with the inferred kind attached.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: i64,
    pub no: i64,
    pub media_url: String,
    pub media_type: Option<MediaKind>,
}

impl From<OptimizedImage> for MediaItem {
    fn from(image: OptimizedImage) -> Self {
        let media_type = image.media_type();
        Self {
            id: image.id,
            no: image.no,
            media_url: image.media_url,
            media_type,
        }
    }
}

/// A post enriched with its media records.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostWithMedia {
    #[serde(flatten)]
    pub post: Post,
    pub media: Vec<MediaItem>,
}

/// One visitor counter row, unique per source IP.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AccessLogEntry {
    pub id: i64,
    pub ip_address: String,
    pub access_count: i64,
    pub first_access_time: String,
    pub last_access_time: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Aggregate post counts for the stats summary endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total_posts: i64,
    pub total_sites: i64,
}

/// Per-site breakdown for the stats endpoints.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SiteStats {
    pub site: String,
    pub post_count: i64,
    pub total_views: i64,
    pub total_likes: i64,
    pub total_replies: i64,
}

/// One day bucket of a time series.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DailyCount {
    pub date: String,
    pub count: i64,
}

/// Per-site activity over the trailing 24 hours, paired with the site's
/// best-scoring post in that window. Derived, never persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingCommunity {
    pub site: String,
    pub total_likes: i64,
    pub total_replies: i64,
    pub top_post: Option<Post>,
}

/// One site's slice of the week digest: its top posts for the period.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteDigest {
    pub site: String,
    pub posts: Vec<Post>,
}
