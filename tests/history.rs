// tests/history.rs
use std::fs;

use ai_news_digest::history::HistoryStore;
use ai_news_digest::Item;
use chrono::{Duration, TimeZone, Utc};

fn it(url: &str) -> Item {
    Item::new("title", url, "Test").unwrap()
}

#[test]
fn missing_file_starts_empty_and_is_created_on_first_add() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("history.json");
    let mut h = HistoryStore::open(&path);
    assert!(h.is_empty());
    assert!(!path.exists());

    let added = h.add_articles(&[it("https://a.test/1"), it("https://a.test/2")]).unwrap();
    assert_eq!(added, 2);
    assert!(path.exists());
    assert!(!path.with_extension("json.tmp").exists());

    let reopened = HistoryStore::open(&path);
    assert_eq!(reopened.len(), 2);
    assert!(reopened.is_sent("https://A.test/1/"));
}

#[test]
fn re_adding_keeps_first_stamp() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    let mut h = HistoryStore::open(&path);
    let t0 = Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap();

    assert_eq!(h.add_articles_at(&[it("https://a.test/1")], t0).unwrap(), 1);
    assert_eq!(h.add_articles_at(&[it("https://a.test/1/")], t0 + Duration::days(20)).unwrap(), 0);

    // the original stamp decides expiry
    assert_eq!(h.cleanup_at(30, t0 + Duration::days(31)).unwrap(), 1);
    assert!(h.is_empty());
}

#[test]
fn filter_existing_keeps_order_of_unsent_items() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = HistoryStore::open(dir.path().join("history.json"));
    h.add_articles(&[it("https://a.test/2")]).unwrap();

    let left = h.filter_existing(vec![it("https://a.test/3"), it("https://a.test/2"), it("https://a.test/1")]);
    let urls: Vec<&str> = left.iter().map(|i| i.url.as_str()).collect();
    assert_eq!(urls, vec!["https://a.test/3", "https://a.test/1"]);
}

#[test]
fn cleanup_drops_old_and_unreadable_stamps() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    fs::write(
        &path,
        r#"{
  "https://a.test/fresh": "2025-05-30T08:00:00+00:00",
  "https://a.test/legacy": "2025-05-29T08:00:00.123456",
  "https://a.test/old": "2025-04-01T08:00:00+00:00",
  "https://a.test/garbage": "yesterday-ish"
}"#,
    )
    .unwrap();

    let mut h = HistoryStore::open(&path);
    assert_eq!(h.len(), 4);
    let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    assert_eq!(h.cleanup_at(30, now).unwrap(), 2);
    assert!(h.is_sent("https://a.test/fresh"));
    assert!(h.is_sent("https://a.test/legacy"));

    let on_disk = HistoryStore::open(&path);
    assert_eq!(on_disk.len(), 2);
}

#[test]
fn corrupt_file_is_treated_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    fs::write(&path, "{ not json").unwrap();
    let mut h = HistoryStore::open(&path);
    assert!(h.is_empty());

    h.add_articles(&[it("https://a.test/1")]).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert!(parsed.get("https://a.test/1").is_some());
}
