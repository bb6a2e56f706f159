mod common;

use chrono::{TimeZone, Utc};
use common::{init_logger, page, post};
use feed_scout::feed_scraper::{ExtractContext, FeedScraper};
use feed_scout::session::{MergeOutcome, SessionState};
use feed_scout::types::{IdentityTier, RunOptions};

fn ctx() -> ExtractContext {
    ExtractContext::new(
        Some("https://www.facebook.com/groups/gardeners/"),
        Utc.with_ymd_and_hms(2024, 11, 20, 12, 0, 0).unwrap(),
    )
}

fn ingest(session: &mut SessionState, markup: &str, step: usize) -> Vec<MergeOutcome> {
    FeedScraper::new()
        .extract_snapshot(markup, &ctx())
        .into_iter()
        .map(|raw| session.merge(raw, step))
        .collect()
}

#[test]
fn reprocessing_an_unchanged_snapshot_adds_nothing() {
    init_logger();
    let snapshot = page(&[
        post(Some("Alice Smith"), "14 November at 10:23", "Tomatoes are ripe", Some("/groups/gardeners/posts/1/")),
        post(Some("Bob Jones"), "2 h", "Anyone have spare seeds?", None),
        post(None, "", "A post with nothing but text", None),
    ]);
    let mut session = SessionState::new(&RunOptions::default());
    ingest(&mut session, &snapshot, 1);
    let before = session.records().to_vec();
    assert_eq!(before.len(), 3);

    let outcomes = ingest(&mut session, &snapshot, 2);
    assert!(outcomes.iter().all(|o| matches!(o, MergeOutcome::Merged(_))));
    assert_eq!(session.len(), 3);
    for (old, new) in before.iter().zip(session.records()) {
        assert_eq!(old.identity_key, new.identity_key);
        assert_eq!(old.author, new.author);
        assert_eq!(old.timestamp, new.timestamp);
        assert_eq!(old.text, new.text);
        assert_eq!(old.permalink, new.permalink);
        assert_eq!(old.media_urls, new.media_urls);
        assert_eq!(new.times_seen, 2);
    }
    assert_eq!(session.records()[2].identity_tier, IdentityTier::Content);
}

#[test]
fn later_extraction_never_erases_a_known_author() {
    let permalink = Some("/groups/gardeners/posts/42/");
    let mut session = SessionState::new(&RunOptions::default());
    ingest(
        &mut session,
        &page(&[post(Some("Alice"), "14 November", "Seed swap", permalink)]),
        1,
    );
    // author span not rendered this time, but the image has loaded
    let later = r#"<article><a href="https://www.facebook.com/groups/gardeners/posts/42/?__tn__=R"><span>14 November</span></a>
        <p>Seed swap</p><img src="https://scontent.xx.fbcdn.net/v/t1/seeds.jpg"></article>"#;
    ingest(&mut session, later, 2);

    assert_eq!(session.len(), 1);
    let r = &session.records()[0];
    assert_eq!(r.author.as_deref(), Some("Alice"));
    assert_eq!(r.media_urls, vec!["https://scontent.xx.fbcdn.net/v/t1/seeds.jpg"]);
    assert_eq!(r.identity_tier, IdentityTier::Permalink);
}

#[test]
fn output_keeps_first_discovery_order() {
    let a = post(Some("Ann"), "1 November", "alpha", None);
    let b = post(Some("Ben"), "2 November", "bravo", None);
    let c = post(Some("Cat"), "3 November", "charlie", None);
    let d = post(Some("Dan"), "4 November", "delta", None);

    let mut session = SessionState::new(&RunOptions::default());
    ingest(&mut session, &page(&[a.clone(), b.clone()]), 1);
    ingest(&mut session, &page(&[c, a, d]), 2);
    ingest(&mut session, &page(&[b]), 3);

    let texts: Vec<&str> = session.records().iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["alpha", "bravo", "charlie", "delta"]);
    let steps: Vec<usize> = session.records().iter().map(|r| r.first_seen_step).collect();
    assert_eq!(steps, vec![1, 1, 2, 2]);
}

#[test]
fn same_permalink_with_different_markup_is_one_record() {
    let first = page(&[post(
        Some("Alice"),
        "3 h",
        "Looking for a ladder",
        Some("https://www.facebook.com/groups/gardeners/posts/77/?__cft__[0]=AAA&__tn__=%2CO"),
    )]);
    // different wrappers, mobile host, truncated body, other tracking noise
    let second = r#"<html><body><section><div><article>
        <strong><a href="/alice">Alice</a></strong>
        <a href="https://m.facebook.com/groups/gardeners/posts/77?__cft__[0]=BBB#comments">4 h</a>
        <div data-ad-comet-preview="message">Looking for a ladder… See more</div>
        </article></div></section></body></html>"#;

    let mut session = SessionState::new(&RunOptions::default());
    ingest(&mut session, &first, 1);
    ingest(&mut session, second, 2);

    assert_eq!(session.len(), 1);
    let r = &session.records()[0];
    assert_eq!(
        r.permalink.as_deref(),
        Some("https://facebook.com/groups/gardeners/posts/77")
    );
    assert_eq!(r.text, "Looking for a ladder");
    assert_eq!(r.times_seen, 2);
}

#[test]
fn filtered_posts_are_never_inserted() {
    let snapshot = page(&[
        post(Some("Ann"), "1 November", "Free compost, bring bags", None),
        post(Some("Ben"), "2 November", "Selling a bike", None),
        post(Some("Cat"), "3 November", "COMPOST bins wanted", None),
    ]);
    let options = RunOptions {
        text_filter: Some("compost".to_string()),
        ..RunOptions::default()
    };
    let mut session = SessionState::new(&options);
    let outcomes = ingest(&mut session, &snapshot, 1);
    assert_eq!(outcomes[1], MergeOutcome::Filtered);
    // seeing it again does not sneak it in
    ingest(&mut session, &snapshot, 2);

    assert_eq!(session.len(), 2);
    assert!(session
        .records()
        .iter()
        .all(|r| r.text.to_lowercase().contains("compost")));
}

#[test]
fn comments_stay_inside_their_post() {
    let snapshot = r#"<html><body><div role="main">
        <div role="article">
            <h3><a href="/ann">Ann</a></h3><span>5 November</span>
            <div data-ad-preview="message">Main post body</div>
            <ul><li><div role="article"><a href="/zed">Zed</a> nice one!</div></li></ul>
        </div>
    </div></body></html>"#;
    let mut session = SessionState::new(&RunOptions::default());
    ingest(&mut session, snapshot, 1);
    assert_eq!(session.len(), 1);
    assert_eq!(session.records()[0].author.as_deref(), Some("Ann"));
    assert_eq!(session.records()[0].text, "Main post body");
}
