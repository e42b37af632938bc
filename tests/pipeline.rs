// tests/pipeline.rs
use std::sync::{Arc, Mutex};

use ai_news_digest::config::{FamilySettings, Settings};
use ai_news_digest::notify::{DeliveryError, DigestSection, DigestSender};
use ai_news_digest::pipeline::{DigestAgent, RunOptions, RunOutcome, RunStage};
use ai_news_digest::{Family, Item, SourceAdapter};
use async_trait::async_trait;

/* ----------------------------
Test doubles
---------------------------- */

type Calls = Arc<Mutex<Vec<(String, u32, bool)>>>;

struct StaticSource {
    name: String,
    items: Vec<Item>,
    fail: bool,
    calls: Calls,
}

impl StaticSource {
    fn ok(name: &str, items: Vec<Item>, calls: &Calls) -> Box<dyn SourceAdapter> {
        Box::new(Self {
            name: name.to_string(),
            items,
            fail: false,
            calls: calls.clone(),
        })
    }

    fn broken(name: &str, calls: &Calls) -> Box<dyn SourceAdapter> {
        Box::new(Self {
            name: name.to_string(),
            items: Vec::new(),
            fail: true,
            calls: calls.clone(),
        })
    }
}

#[async_trait]
impl SourceAdapter for StaticSource {
    async fn fetch(&self, days_back: u32, check_relevance: bool) -> anyhow::Result<Vec<Item>> {
        self.calls
            .lock()
            .unwrap()
            .push((self.name.clone(), days_back, check_relevance));
        if self.fail {
            anyhow::bail!("{} is down", self.name);
        }
        Ok(self.items.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Clone, Default)]
struct Recorder {
    sent: Arc<Mutex<Vec<(String, Vec<DigestSection>, bool)>>>,
    fail_with: Option<fn() -> DeliveryError>,
    not_ready: bool,
}

#[async_trait]
impl DigestSender for Recorder {
    async fn send_digest(
        &self,
        recipient: &str,
        sections: &[DigestSection],
        dry_run: bool,
    ) -> Result<(), DeliveryError> {
        if let Some(f) = self.fail_with {
            return Err(f());
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), sections.to_vec(), dry_run));
        Ok(())
    }

    async fn send_test(&self, _recipient: &str) -> Result<(), DeliveryError> {
        Ok(())
    }

    fn check_ready(&self, dry_run: bool) -> Result<(), DeliveryError> {
        if self.not_ready && !dry_run {
            return Err(DeliveryError::Config("SMTP_EMAIL and SMTP_PASSWORD must both be set".into()));
        }
        Ok(())
    }
}

fn it(title: &str, url: &str, score: f64) -> Item {
    Item::new(title, url, "Test").unwrap().scored(score)
}

fn settings(history: Option<std::path::PathBuf>) -> Settings {
    let mut s = Settings::default();
    s.recipient_email = Some("reader@example.com".to_string());
    s.history_file = history;
    s
}

fn papers() -> Vec<Item> {
    vec![
        it("OpenAI Releases GPT-5", "https://a.test/1", 5.0),
        it("OpenAI releases GPT-5 model", "https://b.test/2", 3.0),
        it("GPT-5 Released by OpenAI", "https://c.test/3", 2.0),
        it("Google Announces Gemini 2.0", "https://d.test/4", 4.0),
    ]
}

/* ----------------------------
Tests
---------------------------- */

#[tokio::test]
async fn missing_recipient_fails_before_fetching() {
    let calls = Calls::default();
    let mut s = settings(None);
    s.recipient_email = None;
    let mut agent = DigestAgent::new(s, Box::new(Recorder::default()))
        .unwrap()
        .with_adapter(Family::Papers, StaticSource::ok("papers", papers(), &calls));

    let report = agent.run(RunOptions::default()).await;
    assert_eq!(report.stage, RunStage::Failed);
    assert_eq!(report.failed_at, Some(RunStage::Collecting));
    assert!(matches!(report.outcome, RunOutcome::ConfigError(_)));
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unready_sender_fails_before_fetching_unless_dry_run() {
    let calls = Calls::default();
    let sender = Recorder {
        not_ready: true,
        ..Recorder::default()
    };
    let mut agent = DigestAgent::new(settings(None), Box::new(sender.clone()))
        .unwrap()
        .with_adapter(Family::Papers, StaticSource::ok("papers", papers(), &calls));

    let report = agent.run(RunOptions::default()).await;
    assert!(matches!(report.outcome, RunOutcome::ConfigError(_)));
    assert!(calls.lock().unwrap().is_empty());

    let report = agent
        .run(RunOptions {
            dry_run: true,
            days_back: 1,
        })
        .await;
    assert_eq!(report.outcome, RunOutcome::Previewed);
    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn nothing_collected_is_a_no_op() {
    let calls = Calls::default();
    let sender = Recorder::default();
    let mut agent = DigestAgent::new(settings(None), Box::new(sender.clone()))
        .unwrap()
        .with_adapter(Family::News, StaticSource::ok("empty", Vec::new(), &calls))
        .with_adapter(Family::News, StaticSource::broken("down", &calls));

    let report = agent.run(RunOptions::default()).await;
    assert_eq!(report.stage, RunStage::Failed);
    assert_eq!(report.outcome, RunOutcome::NoContent);
    assert_eq!(report.failed_at, Some(RunStage::Collecting));
    assert!(sender.sent.lock().unwrap().is_empty());
    assert_eq!(report.families[&Family::News].failed_sources, vec!["down".to_string()]);
}

#[tokio::test]
async fn families_are_processed_independently_and_delivered() {
    let dir = tempfile::tempdir().unwrap();
    let history = dir.path().join("history.json");
    let calls = Calls::default();
    let sender = Recorder::default();

    let mut s = settings(Some(history.clone()));
    s.set_family(
        Family::News,
        FamilySettings {
            cap: 2,
            ..FamilySettings::default_for(Family::News)
        },
    );

    let news = vec![
        it("Anthropic ships Claude update", "https://n.test/1", 3.0),
        it("Anthropic ships a Claude update", "https://n.test/dup", 2.0),
        it("Meta open-sources a model", "https://n.test/2", 2.5),
        it("Regulators eye AI chips", "https://n.test/3", 1.0),
    ];
    let mut agent = DigestAgent::new(s, Box::new(sender.clone()))
        .unwrap()
        .with_adapter(Family::Papers, StaticSource::ok("papers", papers(), &calls))
        .with_adapter(Family::News, StaticSource::broken("newsapi", &calls))
        .with_adapter(Family::News, StaticSource::ok("feeds", news, &calls));

    let report = agent.run(RunOptions::default()).await;
    assert!(report.is_success(), "{:?}", report.outcome);
    assert_eq!(report.outcome, RunOutcome::Delivered);

    // one failing news source does not sink the family
    let news_report = &report.families[&Family::News];
    assert_eq!(news_report.failed_sources, vec!["newsapi".to_string()]);
    assert_eq!(news_report.fetched, 4);
    assert_eq!(news_report.after_dedup, 3);
    assert_eq!(news_report.kept, 2);

    let sent = sender.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    let (recipient, sections, dry_run) = &sent[0];
    assert_eq!(recipient, "reader@example.com");
    assert!(!dry_run);

    let families: Vec<Family> = sections.iter().map(|s| s.family).collect();
    assert_eq!(families, vec![Family::Papers, Family::News]);
    let paper_titles: Vec<&str> = sections[0].items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(paper_titles, vec!["OpenAI Releases GPT-5", "Google Announces Gemini 2.0"]);
    let news_titles: Vec<&str> = sections[1].items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(news_titles, vec!["Anthropic ships Claude update", "Meta open-sources a model"]);

    // delivered urls are remembered
    let stored = std::fs::read_to_string(&history).unwrap();
    assert!(stored.contains("https://a.test/1"));
    assert!(stored.contains("https://n.test/2"));
    assert!(!stored.contains("https://n.test/3"));
    assert_eq!(agent.history().map(|h| h.len()), Some(4));
}

#[tokio::test]
async fn history_suppresses_repeats_on_the_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let history = dir.path().join("state").join("history.json");
    let calls = Calls::default();
    let sender = Recorder::default();

    let mut agent = DigestAgent::new(settings(Some(history)), Box::new(sender.clone()))
        .unwrap()
        .with_adapter(Family::Papers, StaticSource::ok("papers", papers(), &calls));

    assert_eq!(agent.run(RunOptions::default()).await.outcome, RunOutcome::Delivered);

    let second = agent.run(RunOptions::default()).await;
    assert_eq!(second.outcome, RunOutcome::NoContent);
    assert_eq!(second.failed_at, Some(RunStage::Processing));
    assert_eq!(second.families[&Family::Papers].after_history, 0);
    assert_eq!(sender.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn dry_run_does_not_touch_history() {
    let dir = tempfile::tempdir().unwrap();
    let history = dir.path().join("history.json");
    let calls = Calls::default();
    let sender = Recorder::default();

    let mut agent = DigestAgent::new(settings(Some(history.clone())), Box::new(sender.clone()))
        .unwrap()
        .with_adapter(Family::Papers, StaticSource::ok("papers", papers(), &calls));

    let report = agent
        .run(RunOptions {
            dry_run: true,
            days_back: 1,
        })
        .await;
    assert_eq!(report.outcome, RunOutcome::Previewed);
    assert!(report.is_success());
    assert!(sender.sent.lock().unwrap()[0].2);
    assert!(!history.exists());
}

#[tokio::test]
async fn delivery_failure_fails_the_run_and_keeps_history_clean() {
    let dir = tempfile::tempdir().unwrap();
    let history = dir.path().join("history.json");
    let calls = Calls::default();
    let sender = Recorder {
        fail_with: Some(|| DeliveryError::Auth {
            account: "bot@example.com".into(),
            detail: "535 5.7.8 Username and Password not accepted".into(),
        }),
        ..Recorder::default()
    };

    let mut agent = DigestAgent::new(settings(Some(history.clone())), Box::new(sender))
        .unwrap()
        .with_adapter(Family::Papers, StaticSource::ok("papers", papers(), &calls));

    let report = agent.run(RunOptions::default()).await;
    assert_eq!(report.stage, RunStage::Failed);
    assert_eq!(report.failed_at, Some(RunStage::Delivering));
    match &report.outcome {
        RunOutcome::DeliveryFailed(msg) => assert!(msg.contains("app password")),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(!history.exists());
}

#[tokio::test]
async fn lookback_windows_are_clamped_per_family() {
    let calls = Calls::default();
    let mut agent = DigestAgent::new(settings(None), Box::new(Recorder::default()))
        .unwrap()
        .with_adapter(Family::Papers, StaticSource::ok("papers", papers(), &calls))
        .with_adapter(Family::Blogs, StaticSource::ok("blogs", Vec::new(), &calls))
        .with_adapter(Family::Forums, StaticSource::ok("forums", Vec::new(), &calls))
        .with_adapter(Family::Discussions, StaticSource::ok("hn", Vec::new(), &calls));

    agent
        .run(RunOptions {
            dry_run: true,
            days_back: 5,
        })
        .await;

    let calls = calls.lock().unwrap().clone();
    let days = |name: &str| calls.iter().find(|c| c.0 == name).map(|c| (c.1, c.2)).unwrap();
    assert_eq!(days("papers"), (5, false));
    assert_eq!(days("blogs"), (7, true));
    assert_eq!(days("forums"), (2, true));
    assert_eq!(days("hn"), (3, true));
}

struct PanickingSource;

#[async_trait]
impl SourceAdapter for PanickingSource {
    async fn fetch(&self, _days_back: u32, _check_relevance: bool) -> anyhow::Result<Vec<Item>> {
        let empty: Vec<Item> = Vec::new();
        Ok(vec![empty[0].clone()])
    }

    fn name(&self) -> &str {
        "panicky"
    }
}

struct PanickingSender;

#[async_trait]
impl DigestSender for PanickingSender {
    async fn send_digest(&self, _: &str, _: &[DigestSection], _: bool) -> Result<(), DeliveryError> {
        panic!("transport state poisoned");
    }

    async fn send_test(&self, _: &str) -> Result<(), DeliveryError> {
        Ok(())
    }
}

#[tokio::test]
async fn panicking_adapter_only_loses_its_own_items() {
    let calls = Calls::default();
    let sender = Recorder::default();
    let mut agent = DigestAgent::new(settings(None), Box::new(sender.clone()))
        .unwrap()
        .with_adapter(Family::News, Box::new(PanickingSource))
        .with_adapter(
            Family::News,
            StaticSource::ok("feeds", vec![it("Meta open-sources a model", "https://n.test/2", 2.5)], &calls),
        )
        .with_adapter(Family::Papers, StaticSource::ok("papers", papers(), &calls));

    let report = agent.run(RunOptions::default()).await;
    assert_eq!(report.outcome, RunOutcome::Delivered);
    assert_eq!(report.families[&Family::News].failed_sources, vec!["panicky".to_string()]);
    assert_eq!(report.families[&Family::News].kept, 1);
    assert_eq!(report.families[&Family::Papers].kept, 2);
    assert_eq!(sender.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn panic_during_delivery_becomes_a_failed_report() {
    let dir = tempfile::tempdir().unwrap();
    let history = dir.path().join("history.json");
    let calls = Calls::default();
    let mut agent = DigestAgent::new(settings(Some(history.clone())), Box::new(PanickingSender))
        .unwrap()
        .with_adapter(Family::Papers, StaticSource::ok("papers", papers(), &calls));

    let report = agent.run(RunOptions::default()).await;
    assert!(!report.is_success());
    assert_eq!(report.stage, RunStage::Failed);
    assert_eq!(report.failed_at, Some(RunStage::Delivering));
    match &report.outcome {
        RunOutcome::Crashed(msg) => assert!(msg.contains("transport state poisoned")),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(report.finished_at.is_some());
    assert!(!history.exists());
}
