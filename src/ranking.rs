//! Scoring and ordering policy for the ranked feed.
//!
//! Every ranking path (feed sorts, the week digest, trending) consults the
//! same site-weight table and score formula; the SQL fragments are generated
//! from it rather than duplicated per query.

use std::fmt::Write as _;

/// Per-site popularity weights. High-traffic boards are discounted so a
/// middling post on a huge board doesn't drown out a genuinely popular post
/// on a small one.
const SITE_WEIGHTS: &[(&str, f64)] = &[
    ("dcinside", 0.2),
    ("fmkorea", 0.3),
    ("theqoo", 0.4),
    ("ppomppu", 0.5),
    ("ruliweb", 0.5),
    ("clien", 0.7),
    ("mlbpark", 0.7),
    ("bobaedream", 0.8),
    ("inven", 0.8),
    ("humoruniv", 1.2),
    ("82cook", 1.5),
    ("todayhumor", 1.5),
];

/// Weight applied to sites absent from the table.
pub const DEFAULT_SITE_WEIGHT: f64 = 1.0;

/// Freshness tier breakpoints in hours since posting. A post's tier is the
/// index of the first breakpoint its age fits under; anything older (or with
/// no posting timestamp) lands in the final tier.
pub const TIER_BREAKPOINTS_HOURS: [f64; 4] = [1.0, 3.0, 9.0, 24.0];

/// Tier assigned to posts older than every breakpoint.
pub const OLDEST_TIER: i64 = TIER_BREAKPOINTS_HOURS.len() as i64;

/// Look up the popularity weight for a site.
#[must_use]
pub fn site_weight(site: &str) -> f64 {
    SITE_WEIGHTS
        .iter()
        .find(|(name, _)| *name == site)
        .map_or(DEFAULT_SITE_WEIGHT, |(_, w)| *w)
}

/// Canonical popularity score for a post.
#[must_use]
pub fn score(site: &str, views: i64, likes: i64, replies: i64) -> f64 {
    site_weight(site) * (views + 10 * likes + 5 * replies) as f64
}

/// Freshness tier for a post of the given age. Lowest tier = freshest.
#[must_use]
pub fn tier_for_age_hours(hours: f64) -> i64 {
    for (i, breakpoint) in TIER_BREAKPOINTS_HOURS.iter().enumerate() {
        if hours <= *breakpoint {
            return i as i64;
        }
    }
    OLDEST_TIER
}

/// SQL expression computing the canonical score for a `site_bbs_info` row.
///
/// Generated from [`SITE_WEIGHTS`] so the CASE arms can never drift from the
/// Rust-side lookup.
#[must_use]
pub fn score_sql() -> String {
    let mut sql = String::from("(CASE site");
    for (site, weight) in SITE_WEIGHTS {
        let _ = write!(sql, " WHEN '{site}' THEN {weight:?}");
    }
    let _ = write!(
        sql,
        " ELSE {DEFAULT_SITE_WEIGHT:?} END * (views + likes * 10 + reply_num * 5))"
    );
    sql
}

/// SQL expression computing the freshness tier for a `site_bbs_info` row
/// from hours elapsed since `posted_dt`.
#[must_use]
pub fn tier_sql() -> String {
    let mut sql = String::from("(CASE WHEN posted_dt IS NULL THEN ");
    let _ = write!(sql, "{OLDEST_TIER}");
    for (i, breakpoint) in TIER_BREAKPOINTS_HOURS.iter().enumerate() {
        let _ = write!(
            sql,
            " WHEN (julianday('now') - julianday(posted_dt)) * 24.0 <= {breakpoint:?} THEN {i}"
        );
    }
    let _ = write!(sql, " ELSE {OLDEST_TIER} END)");
    sql
}

/// Sort mode for the post feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    /// Freshness tier ascending, then score descending.
    #[default]
    Hot,
    /// Posting timestamp descending.
    New,
    /// Score descending within a trailing window.
    Top,
    /// Score among the freshest tiers only, then recency.
    Rising,
}

impl SortMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::New => "new",
            Self::Top => "top",
            Self::Rising => "rising",
        }
    }

    /// Parse a query-string value. Unknown values fall back to the default
    /// rather than erroring, matching the lenient feed contract.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "new" => Self::New,
            "top" => Self::Top,
            "rising" => Self::Rising,
            _ => Self::Hot,
        }
    }

    /// ORDER BY clause for this mode. Assumes the enclosing SELECT exposes
    /// `score` and `tier` aliases.
    #[must_use]
    pub fn order_by_sql(&self) -> &'static str {
        match self {
            Self::Hot => "ORDER BY tier ASC, score DESC, no DESC",
            Self::New => "ORDER BY posted_dt IS NULL, posted_dt DESC, no DESC",
            Self::Top => "ORDER BY score DESC, no DESC",
            Self::Rising => "ORDER BY score DESC, posted_dt DESC, no DESC",
        }
    }

    /// Extra WHERE restriction this mode imposes, if any.
    ///
    /// `rising` considers only the freshest two tiers; expressed directly as
    /// an age bound because SQLite cannot reference a SELECT alias in WHERE.
    #[must_use]
    pub fn filter_sql(&self, window: TopWindow) -> Option<String> {
        match self {
            Self::Top => window
                .cutoff_modifier()
                .map(|m| format!("posted_dt IS NOT NULL AND posted_dt >= datetime('now', '{m}')")),
            Self::Rising => {
                let fresh_hours = TIER_BREAKPOINTS_HOURS[1];
                Some(format!(
                    "posted_dt IS NOT NULL AND posted_dt >= datetime('now', '-{fresh_hours:?} hours')"
                ))
            }
            _ => None,
        }
    }
}

/// Trailing window for the `top` sort mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TopWindow {
    Today,
    Week,
    Month,
    #[default]
    All,
}

impl TopWindow {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Week => "week",
            Self::Month => "month",
            Self::All => "all",
        }
    }

    /// Parse a query-string value, defaulting to `all`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "today" => Self::Today,
            "week" => Self::Week,
            "month" => Self::Month,
            _ => Self::All,
        }
    }

    /// SQLite datetime modifier for the window's lower bound, or `None` for
    /// the unbounded window.
    #[must_use]
    pub fn cutoff_modifier(&self) -> Option<&'static str> {
        match self {
            Self::Today => Some("-1 day"),
            Self::Week => Some("-7 days"),
            Self::Month => Some("-30 days"),
            Self::All => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_weight_lookup() {
        assert!(site_weight("dcinside") < site_weight("clien"));
        assert!((site_weight("unknown_board") - DEFAULT_SITE_WEIGHT).abs() < f64::EPSILON);
    }

    #[test]
    fn test_score_is_monotone_in_views() {
        let low = score("clien", 100, 0, 0);
        let high = score("clien", 200, 0, 0);
        assert!(high > low);
    }

    #[test]
    fn test_tier_breakpoints() {
        assert_eq!(tier_for_age_hours(0.5), 0);
        assert_eq!(tier_for_age_hours(2.0), 1);
        assert_eq!(tier_for_age_hours(8.0), 2);
        assert_eq!(tier_for_age_hours(23.9), 3);
        assert_eq!(tier_for_age_hours(25.0), OLDEST_TIER);
    }

    #[test]
    fn test_sort_mode_parse_defaults_to_hot() {
        assert_eq!(SortMode::parse("new"), SortMode::New);
        assert_eq!(SortMode::parse("latest"), SortMode::Hot);
        assert_eq!(SortMode::parse(""), SortMode::Hot);
    }

    #[test]
    fn test_score_sql_covers_every_weight() {
        let sql = score_sql();
        for (site, _) in SITE_WEIGHTS {
            assert!(sql.contains(site), "missing weight arm for {site}");
        }
        assert!(sql.contains("ELSE 1.0 END"));
    }

    #[test]
    fn test_top_window_cutoffs() {
        assert_eq!(TopWindow::Today.cutoff_modifier(), Some("-1 day"));
        assert_eq!(TopWindow::All.cutoff_modifier(), None);
        assert_eq!(TopWindow::parse("month"), TopWindow::Month);
        assert_eq!(TopWindow::parse("bogus"), TopWindow::All);
    }
}
