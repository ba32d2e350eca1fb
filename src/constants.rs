//! Shared constants used across the application.

/// The two designated news aggregator sources. These are kept separate from
/// the community boards: `isNewsYn=y` restricts results to them, `isNewsYn=n`
/// excludes them.
pub const NEWS_SITES: [&str; 2] = ["naver_news", "daum_news"];

/// Default page size when the caller omits or supplies an out-of-range value.
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Upper bound on page size; larger requests are clamped to the default.
pub const MAX_PAGE_SIZE: i64 = 100;

/// SQLite datetime modifier shifting stored UTC timestamps into the fixed
/// service timezone (Asia/Seoul, no DST) for calendar-day bucketing.
pub const TZ_SQLITE_MODIFIER: &str = "+9 hours";
