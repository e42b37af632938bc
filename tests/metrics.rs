// tests/metrics.rs
// One test per binary: the Prometheus recorder is process-global.
use ai_news_digest::metrics::Metrics;
use ai_news_digest::pipeline::{DigestAgent, RunOptions};
use ai_news_digest::notify::{DeliveryError, DigestSection, DigestSender};
use ai_news_digest::{Family, Item, Settings, SourceAdapter};
use async_trait::async_trait;

struct Fixed(Vec<Item>);

#[async_trait]
impl SourceAdapter for Fixed {
    async fn fetch(&self, _days_back: u32, _check_relevance: bool) -> anyhow::Result<Vec<Item>> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

struct Broken;

#[async_trait]
impl SourceAdapter for Broken {
    async fn fetch(&self, _days_back: u32, _check_relevance: bool) -> anyhow::Result<Vec<Item>> {
        anyhow::bail!("connection reset")
    }

    fn name(&self) -> &str {
        "broken"
    }
}

struct Sink;

#[async_trait]
impl DigestSender for Sink {
    async fn send_digest(&self, _: &str, _: &[DigestSection], _: bool) -> Result<(), DeliveryError> {
        Ok(())
    }

    async fn send_test(&self, _: &str) -> Result<(), DeliveryError> {
        Ok(())
    }
}

#[tokio::test]
async fn run_metrics_land_in_the_textfile() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("digest.prom");
    let metrics = Metrics::init(&path).expect("recorder");

    let mut settings = Settings::default();
    settings.recipient_email = Some("reader@example.com".into());
    settings.history_file = None;

    let items = vec![
        Item::new("OpenAI Releases GPT-5", "https://a.test/1", "Test").unwrap().scored(5.0),
        Item::new("OpenAI releases GPT-5 model", "https://b.test/2", "Test").unwrap().scored(3.0),
        Item::new("Google Announces Gemini 2.0", "https://c.test/3", "Test").unwrap().scored(4.0),
    ];
    let mut agent = DigestAgent::new(settings, Box::new(Sink))
        .unwrap()
        .with_adapter(Family::Papers, Box::new(Fixed(items)))
        .with_adapter(Family::News, Box::new(Broken));

    let report = agent.run(RunOptions::default()).await;
    assert!(report.is_success());
    metrics.flush().unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    for needle in [
        "digest_items_fetched_total",
        "digest_items_kept_total",
        "digest_dedup_removed_total",
        "digest_source_errors_total",
        "digest_fetch_ms",
        "digest_last_run_ts",
    ] {
        assert!(text.contains(needle), "exposition missing '{needle}'\n{text}");
    }
    assert!(text.contains(r#"digest_items_kept_total{family="papers"} 2"#), "{text}");
    assert!(text.contains(r#"digest_source_errors_total{source="broken"} 1"#), "{text}");
}
