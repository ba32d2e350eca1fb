//! Integration tests for post query and ranking operations.

use chrono::{Duration, Utc};
use community_feed::db::{
    delete_post, get_post, insert_image, insert_post, list_posts, list_sites, media_for_post,
    popular_posts, recent_posts, site_stats, stats_summary, trending_communities, week_digest,
    Database, NewPost, PostFilter,
};
use community_feed::ranking::{SortMode, TopWindow};
use tempfile::TempDir;

async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let db = Database::new(&db_path)
        .await
        .expect("Failed to create database");
    (db, temp_dir)
}

fn hours_ago(hours: i64) -> String {
    (Utc::now() - Duration::hours(hours))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn minutes_ago(minutes: i64) -> String {
    (Utc::now() - Duration::minutes(minutes))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn post(site: &str, title: &str, views: i64, likes: i64, posted_dt: Option<String>) -> NewPost {
    NewPost {
        site: site.to_string(),
        title: Some(title.to_string()),
        views,
        likes,
        posted_dt,
        ..NewPost::default()
    }
}

#[tokio::test]
async fn test_insert_and_get_post() {
    let (db, _temp_dir) = setup_db().await;

    let no = insert_post(
        db.pool(),
        &NewPost {
            number: Some(99123),
            site: "clien".to_string(),
            title: Some("First post".to_string()),
            author: Some("writer".to_string()),
            content: Some("hello from the board".to_string()),
            views: 120,
            likes: 4,
            reply_num: 2,
            url: Some("https://example.com/board/99123".to_string()),
            ..NewPost::default()
        },
    )
    .await
    .expect("Failed to insert post");
    assert!(no > 0);

    let retrieved = get_post(db.pool(), no)
        .await
        .expect("Failed to get post")
        .expect("Post not found");

    assert_eq!(retrieved.site, "clien");
    assert_eq!(retrieved.title.as_deref(), Some("First post"));
    assert_eq!(retrieved.views, 120);
    assert!(!retrieved.reg_date.is_empty());

    assert!(get_post(db.pool(), no + 1000).await.unwrap().is_none());
}

#[tokio::test]
async fn test_post_identifiers_ascend_in_insertion_order() {
    let (db, _temp_dir) = setup_db().await;

    let first = insert_post(db.pool(), &post("clien", "a", 0, 0, None))
        .await
        .unwrap();
    let second = insert_post(db.pool(), &post("clien", "b", 0, 0, None))
        .await
        .unwrap();

    assert!(second > first);
}

#[tokio::test]
async fn test_keyword_filter_matches_title_and_content() {
    let (db, _temp_dir) = setup_db().await;

    insert_post(db.pool(), &post("clien", "Rust tips", 1, 0, None))
        .await
        .unwrap();
    insert_post(
        db.pool(),
        &NewPost {
            site: "clien".to_string(),
            title: Some("Unrelated".to_string()),
            content: Some("a rust anecdote".to_string()),
            ..NewPost::default()
        },
    )
    .await
    .unwrap();
    insert_post(db.pool(), &post("clien", "Python tips", 1, 0, None))
        .await
        .unwrap();

    let filter = PostFilter {
        keyword: Some("rust".to_string()),
        ..PostFilter::default()
    };
    let (posts, total) = list_posts(db.pool(), &filter, 1, 10).await.unwrap();

    assert_eq!(total, 2);
    assert_eq!(posts.len(), 2);
}

#[tokio::test]
async fn test_site_filters() {
    let (db, _temp_dir) = setup_db().await;

    insert_post(db.pool(), &post("clien", "a", 0, 0, None))
        .await
        .unwrap();
    insert_post(db.pool(), &post("ruliweb", "b", 0, 0, None))
        .await
        .unwrap();
    insert_post(db.pool(), &post("theqoo", "c", 0, 0, None))
        .await
        .unwrap();

    let single = PostFilter {
        site: Some("clien".to_string()),
        ..PostFilter::default()
    };
    let (posts, total) = list_posts(db.pool(), &single, 1, 10).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(posts[0].site, "clien");

    let multi = PostFilter {
        sites: vec!["clien".to_string(), "theqoo".to_string()],
        ..PostFilter::default()
    };
    let (_, total) = list_posts(db.pool(), &multi, 1, 10).await.unwrap();
    assert_eq!(total, 2);

    // A single-site filter wins over the multi-site list.
    let both = PostFilter {
        site: Some("ruliweb".to_string()),
        sites: vec!["clien".to_string()],
        ..PostFilter::default()
    };
    let (posts, total) = list_posts(db.pool(), &both, 1, 10).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(posts[0].site, "ruliweb");
}

#[tokio::test]
async fn test_news_flag_includes_and_excludes_designated_sites() {
    let (db, _temp_dir) = setup_db().await;

    insert_post(db.pool(), &post("clien", "board post", 0, 0, None))
        .await
        .unwrap();
    insert_post(db.pool(), &post("naver_news", "news one", 0, 0, None))
        .await
        .unwrap();
    insert_post(db.pool(), &post("daum_news", "news two", 0, 0, None))
        .await
        .unwrap();

    let news_only = PostFilter {
        news: Some(true),
        ..PostFilter::default()
    };
    let (posts, total) = list_posts(db.pool(), &news_only, 1, 10).await.unwrap();
    assert_eq!(total, 2);
    assert!(posts.iter().all(|p| p.site.ends_with("_news")));

    let no_news = PostFilter {
        news: Some(false),
        ..PostFilter::default()
    };
    let (posts, total) = list_posts(db.pool(), &no_news, 1, 10).await.unwrap();
    assert_eq!(total, 1);
    assert!(posts.iter().all(|p| p.site == "clien"));
}

#[tokio::test]
async fn test_max_no_cursor_bounds_results() {
    let (db, _temp_dir) = setup_db().await;

    let first = insert_post(db.pool(), &post("clien", "a", 0, 0, None))
        .await
        .unwrap();
    let second = insert_post(db.pool(), &post("clien", "b", 0, 0, None))
        .await
        .unwrap();
    insert_post(db.pool(), &post("clien", "c", 0, 0, None))
        .await
        .unwrap();

    let filter = PostFilter {
        max_no: Some(second),
        ..PostFilter::default()
    };
    let (posts, total) = list_posts(db.pool(), &filter, 1, 10).await.unwrap();

    assert_eq!(total, 2);
    assert!(posts.iter().all(|p| p.no <= second));
    assert!(posts.iter().any(|p| p.no == first));
}

#[tokio::test]
async fn test_media_only_filter() {
    let (db, _temp_dir) = setup_db().await;

    let with_media = insert_post(db.pool(), &post("clien", "pic", 0, 0, None))
        .await
        .unwrap();
    insert_post(db.pool(), &post("clien", "text only", 0, 0, None))
        .await
        .unwrap();
    insert_image(db.pool(), with_media, "https://cdn.example.com/a.jpg")
        .await
        .unwrap();

    let filter = PostFilter {
        media_only: true,
        ..PostFilter::default()
    };
    let (posts, total) = list_posts(db.pool(), &filter, 1, 10).await.unwrap();

    assert_eq!(total, 1);
    assert_eq!(posts[0].no, with_media);
}

#[tokio::test]
async fn test_top_sort_ranks_higher_weighted_views_first() {
    let (db, _temp_dir) = setup_db().await;

    // Same site, so only the view counts differ under the fixed weight.
    insert_post(db.pool(), &post("clien", "hundred", 100, 0, Some(hours_ago(2))))
        .await
        .unwrap();
    insert_post(db.pool(), &post("clien", "two hundred", 200, 0, Some(hours_ago(2))))
        .await
        .unwrap();

    let filter = PostFilter {
        sort: SortMode::Top,
        ..PostFilter::default()
    };
    let (posts, _) = list_posts(db.pool(), &filter, 1, 10).await.unwrap();

    assert_eq!(posts[0].title.as_deref(), Some("two hundred"));
    assert_eq!(posts[1].title.as_deref(), Some("hundred"));
}

#[tokio::test]
async fn test_hot_sort_puts_fresher_tier_first() {
    let (db, _temp_dir) = setup_db().await;

    // Old but wildly popular vs fresh and modest: freshness tier wins.
    insert_post(
        db.pool(),
        &post("clien", "old hit", 100_000, 500, Some(hours_ago(25))),
    )
    .await
    .unwrap();
    insert_post(
        db.pool(),
        &post("clien", "fresh", 50, 1, Some(minutes_ago(30))),
    )
    .await
    .unwrap();

    let filter = PostFilter {
        sort: SortMode::Hot,
        ..PostFilter::default()
    };
    let (posts, _) = list_posts(db.pool(), &filter, 1, 10).await.unwrap();

    assert_eq!(posts[0].title.as_deref(), Some("fresh"));
    assert_eq!(posts[1].title.as_deref(), Some("old hit"));
}

#[tokio::test]
async fn test_top_window_restricts_by_age() {
    let (db, _temp_dir) = setup_db().await;

    insert_post(db.pool(), &post("clien", "recent", 10, 0, Some(hours_ago(2))))
        .await
        .unwrap();
    insert_post(
        db.pool(),
        &post("clien", "last week", 999, 0, Some(hours_ago(26))),
    )
    .await
    .unwrap();

    let filter = PostFilter {
        sort: SortMode::Top,
        window: TopWindow::Today,
        ..PostFilter::default()
    };
    let (posts, total) = list_posts(db.pool(), &filter, 1, 10).await.unwrap();

    assert_eq!(total, 1);
    assert_eq!(posts[0].title.as_deref(), Some("recent"));
}

#[tokio::test]
async fn test_rising_sort_only_considers_freshest_tiers() {
    let (db, _temp_dir) = setup_db().await;

    insert_post(db.pool(), &post("clien", "fresh", 10, 0, Some(hours_ago(1))))
        .await
        .unwrap();
    insert_post(
        db.pool(),
        &post("clien", "mid-day", 500, 10, Some(hours_ago(8))),
    )
    .await
    .unwrap();

    let filter = PostFilter {
        sort: SortMode::Rising,
        ..PostFilter::default()
    };
    let (posts, total) = list_posts(db.pool(), &filter, 1, 10).await.unwrap();

    assert_eq!(total, 1);
    assert_eq!(posts[0].title.as_deref(), Some("fresh"));
}

#[tokio::test]
async fn test_window_count_matches_filtered_set_across_pages() {
    let (db, _temp_dir) = setup_db().await;

    for i in 0..7 {
        insert_post(db.pool(), &post("clien", &format!("post {i}"), i, 0, None))
            .await
            .unwrap();
    }

    let filter = PostFilter::default();
    let (page1, total1) = list_posts(db.pool(), &filter, 1, 3).await.unwrap();
    let (page3, total3) = list_posts(db.pool(), &filter, 3, 3).await.unwrap();
    let (past_end, total_past) = list_posts(db.pool(), &filter, 5, 3).await.unwrap();

    assert_eq!(page1.len(), 3);
    assert_eq!(page3.len(), 1);
    assert!(past_end.is_empty());
    assert_eq!(total1, 7);
    assert_eq!(total3, 7);
    // Empty page still reports the true total for the envelope.
    assert_eq!(total_past, 7);
}

#[tokio::test]
async fn test_popular_uses_views_plus_weighted_likes() {
    let (db, _temp_dir) = setup_db().await;

    // 50 views + 10 likes beats 100 views under views + likes * 10.
    insert_post(db.pool(), &post("clien", "liked", 50, 10, None))
        .await
        .unwrap();
    insert_post(db.pool(), &post("clien", "viewed", 100, 0, None))
        .await
        .unwrap();

    let posts = popular_posts(db.pool(), 10).await.unwrap();

    assert_eq!(posts[0].title.as_deref(), Some("liked"));
    assert_eq!(posts[1].title.as_deref(), Some("viewed"));
}

#[tokio::test]
async fn test_list_sites_distinct_sorted() {
    let (db, _temp_dir) = setup_db().await;

    for site in ["theqoo", "clien", "theqoo", "ruliweb"] {
        insert_post(db.pool(), &post(site, "t", 0, 0, None))
            .await
            .unwrap();
    }

    let sites = list_sites(db.pool()).await.unwrap();
    assert_eq!(sites, vec!["clien", "ruliweb", "theqoo"]);
}

#[tokio::test]
async fn test_delete_post_removes_post_and_media_together() {
    let (db, _temp_dir) = setup_db().await;

    let no = insert_post(db.pool(), &post("clien", "doomed", 0, 0, None))
        .await
        .unwrap();
    insert_image(db.pool(), no, "https://cdn.example.com/a.jpg")
        .await
        .unwrap();
    insert_image(db.pool(), no, "https://cdn.example.com/b.mp4")
        .await
        .unwrap();

    let deleted = delete_post(db.pool(), no).await.unwrap();
    assert!(deleted);

    assert!(get_post(db.pool(), no).await.unwrap().is_none());
    assert!(media_for_post(db.pool(), no).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_missing_post_reports_false_and_touches_nothing() {
    let (db, _temp_dir) = setup_db().await;

    let survivor = insert_post(db.pool(), &post("clien", "survivor", 0, 0, None))
        .await
        .unwrap();
    insert_image(db.pool(), survivor, "https://cdn.example.com/keep.png")
        .await
        .unwrap();

    let deleted = delete_post(db.pool(), survivor + 100).await.unwrap();
    assert!(!deleted);

    assert!(get_post(db.pool(), survivor).await.unwrap().is_some());
    assert_eq!(media_for_post(db.pool(), survivor).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_interrupted_delete_leaves_both_rows_intact() {
    let (db, _temp_dir) = setup_db().await;

    let no = insert_post(db.pool(), &post("clien", "kept", 0, 0, None))
        .await
        .unwrap();
    insert_image(db.pool(), no, "https://cdn.example.com/a.jpg")
        .await
        .unwrap();

    // Simulate a failure after the media delete but before the post delete:
    // the transaction is dropped without commit, so everything rolls back.
    {
        let mut tx = db.pool().begin().await.unwrap();
        sqlx::query("DELETE FROM optimized_images WHERE no = ?")
            .bind(no)
            .execute(&mut *tx)
            .await
            .unwrap();
        tx.rollback().await.unwrap();
    }

    assert!(get_post(db.pool(), no).await.unwrap().is_some());
    assert_eq!(media_for_post(db.pool(), no).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_stats_reads() {
    let (db, _temp_dir) = setup_db().await;

    insert_post(db.pool(), &post("clien", "a", 10, 1, None))
        .await
        .unwrap();
    insert_post(db.pool(), &post("clien", "b", 20, 2, None))
        .await
        .unwrap();
    insert_post(db.pool(), &post("ruliweb", "c", 5, 0, None))
        .await
        .unwrap();

    let summary = stats_summary(db.pool()).await.unwrap();
    assert_eq!(summary.total_posts, 3);
    assert_eq!(summary.total_sites, 2);

    let stats = site_stats(db.pool()).await.unwrap();
    assert_eq!(stats[0].site, "clien");
    assert_eq!(stats[0].post_count, 2);
    assert_eq!(stats[0].total_views, 30);
    assert_eq!(stats[0].total_likes, 3);

    let recent = recent_posts(db.pool(), 2).await.unwrap();
    assert_eq!(recent.len(), 2);
    // Ties on reg_date break toward the newest identifier.
    assert!(recent[0].no > recent[1].no);
}

#[tokio::test]
async fn test_trending_pairs_aggregates_with_best_post() {
    let (db, _temp_dir) = setup_db().await;

    insert_post(
        db.pool(),
        &NewPost {
            site: "clien".to_string(),
            title: Some("small".to_string()),
            views: 10,
            likes: 2,
            reply_num: 1,
            posted_dt: Some(hours_ago(2)),
            ..NewPost::default()
        },
    )
    .await
    .unwrap();
    insert_post(
        db.pool(),
        &NewPost {
            site: "clien".to_string(),
            title: Some("big".to_string()),
            views: 500,
            likes: 30,
            reply_num: 12,
            posted_dt: Some(hours_ago(3)),
            ..NewPost::default()
        },
    )
    .await
    .unwrap();
    // Outside the trailing 24h window, must not count.
    insert_post(
        db.pool(),
        &post("clien", "stale", 9999, 99, Some(hours_ago(30))),
    )
    .await
    .unwrap();

    let trending = trending_communities(db.pool()).await.unwrap();

    assert_eq!(trending.len(), 1);
    assert_eq!(trending[0].site, "clien");
    assert_eq!(trending[0].total_likes, 32);
    assert_eq!(trending[0].total_replies, 13);
    let top = trending[0].top_post.as_ref().expect("top post missing");
    assert_eq!(top.title.as_deref(), Some("big"));
}

#[tokio::test]
async fn test_week_digest_groups_by_site_with_per_site_cap() {
    let (db, _temp_dir) = setup_db().await;

    // Posts pinned inside a known Seoul week (2025-03-08 .. 2025-03-14).
    for i in 0..7 {
        insert_post(
            db.pool(),
            &NewPost {
                site: "clien".to_string(),
                title: Some(format!("clien {i}")),
                views: 100 * (i + 1),
                posted_dt: Some(format!("2025-03-10 0{i}:00:00")),
                ..NewPost::default()
            },
        )
        .await
        .unwrap();
    }
    insert_post(
        db.pool(),
        &NewPost {
            site: "ruliweb".to_string(),
            title: Some("ruliweb only".to_string()),
            views: 10,
            posted_dt: Some("2025-03-11 12:00:00".to_string()),
            ..NewPost::default()
        },
    )
    .await
    .unwrap();
    // Outside the requested week.
    insert_post(
        db.pool(),
        &NewPost {
            site: "clien".to_string(),
            title: Some("outside".to_string()),
            views: 9999,
            posted_dt: Some("2025-03-20 12:00:00".to_string()),
            ..NewPost::default()
        },
    )
    .await
    .unwrap();

    let digests = week_digest(db.pool(), "2025-03-07 15:00:00", "2025-03-14 15:00:00", 5)
        .await
        .unwrap();

    assert_eq!(digests.len(), 2);
    let clien = digests.iter().find(|d| d.site == "clien").unwrap();
    assert_eq!(clien.posts.len(), 5);
    // Best-scoring first within the site.
    assert_eq!(clien.posts[0].title.as_deref(), Some("clien 6"));
    let ruliweb = digests.iter().find(|d| d.site == "ruliweb").unwrap();
    assert_eq!(ruliweb.posts.len(), 1);
}
