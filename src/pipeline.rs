// src/pipeline.rs
//! One digest run: collect per family, dedup, filter by history, cap,
//! summarize, deliver, record.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use metrics::{counter, gauge};

use crate::config::Settings;
use crate::dedup::Deduplicator;
use crate::history::HistoryStore;
use crate::ingest::providers::{ArxivSource, FeedSource, FeedSpec, HackerNewsSource, NewsApiSource};
use crate::ingest::types::{Family, Item, SourceAdapter};
use crate::ingest::{collect_family, ensure_metrics_described, http_client, panic_message};
use crate::notify::{DeliveryError, DigestSection, DigestSender, SmtpSender};
use crate::relevance::Scorer;
use crate::summarize::Summarizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub dry_run: bool,
    pub days_back: u32,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            days_back: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Collecting,
    Processing,
    Delivering,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Still running.
    Pending,
    Delivered,
    Previewed,
    NoContent,
    ConfigError(String),
    DeliveryFailed(String),
    /// A stage panicked; `failed_at` says which.
    Crashed(String),
}

/// Per-family counts through the processing chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FamilyReport {
    pub fetched: usize,
    pub after_dedup: usize,
    pub after_history: usize,
    pub kept: usize,
    pub failed_sources: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub stage: RunStage,
    pub outcome: RunOutcome,
    /// Stage in which a failed run stopped.
    pub failed_at: Option<RunStage>,
    pub families: BTreeMap<Family, FamilyReport>,
    pub sections: Vec<DigestSection>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            stage: RunStage::Collecting,
            outcome: RunOutcome::Pending,
            failed_at: None,
            families: BTreeMap::new(),
            sections: Vec::new(),
            started_at,
            finished_at: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.stage == RunStage::Done
    }

    pub fn total_fetched(&self) -> usize {
        self.families.values().map(|f| f.fetched).sum()
    }

    pub fn total_kept(&self) -> usize {
        self.sections.iter().map(|s| s.items.len()).sum()
    }

    fn fail(mut self, outcome: RunOutcome) -> Self {
        self.failed_at = Some(self.stage);
        self.stage = RunStage::Failed;
        self.outcome = outcome;
        self.finished_at = Some(Utc::now());
        self
    }

    fn done(mut self, outcome: RunOutcome) -> Self {
        self.stage = RunStage::Done;
        self.outcome = outcome;
        self.finished_at = Some(Utc::now());
        self
    }
}

type Adapters = BTreeMap<Family, Vec<Box<dyn SourceAdapter>>>;

pub struct DigestAgent {
    settings: Settings,
    adapters: Adapters,
    dedup: Deduplicator,
    summarizer: Summarizer,
    sender: Box<dyn DigestSender>,
    history: Option<HistoryStore>,
}

impl DigestAgent {
    /// Agent with no adapters; tests and embedders add their own.
    pub fn new(settings: Settings, sender: Box<dyn DigestSender>) -> Result<Self> {
        let summarizer = Summarizer::new(&settings.llm)?;
        let history = settings.history_file.as_ref().map(HistoryStore::open);
        Ok(Self {
            dedup: Deduplicator::new(settings.dedup_threshold),
            settings,
            adapters: BTreeMap::new(),
            summarizer,
            sender,
            history,
        })
    }

    /// Production wiring: every built-in source and SMTP delivery.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let sender = Box::new(SmtpSender::from_settings(&settings.smtp));
        let mut agent = Self::new(settings, sender)?;
        agent.adapters = build_adapters(&agent.settings)?;
        Ok(agent)
    }

    pub fn with_adapter(mut self, family: Family, adapter: Box<dyn SourceAdapter>) -> Self {
        self.adapters.entry(family).or_default().push(adapter);
        self
    }

    pub fn with_summarizer(mut self, summarizer: Summarizer) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn history(&self) -> Option<&HistoryStore> {
        self.history.as_ref()
    }

    pub async fn send_test(&self) -> Result<(), DeliveryError> {
        let recipient = self
            .settings
            .recipient_email
            .as_deref()
            .ok_or_else(|| DeliveryError::Config("RECIPIENT_EMAIL is not set".to_string()))?;
        tracing::info!(target: "digest", recipient, "sending test email");
        self.sender.send_test(recipient).await
    }

    /// Never returns `Err`; every failure, a panic included, ends in a `Failed` report.
    pub async fn run(&mut self, opts: RunOptions) -> RunReport {
        ensure_metrics_described();
        let mut report = RunReport::new(Utc::now());
        gauge!("digest_last_run_ts").set(report.started_at.timestamp() as f64);
        tracing::info!(target: "digest", dry_run = opts.dry_run, days_back = opts.days_back, "run started");

        let Some(recipient) = self.settings.recipient_email.clone() else {
            tracing::error!(target: "digest", "RECIPIENT_EMAIL is not set");
            return report.fail(RunOutcome::ConfigError("RECIPIENT_EMAIL is not set".to_string()));
        };
        if let Err(e) = self.sender.check_ready(opts.dry_run) {
            tracing::error!(target: "digest", error = %e, "delivery not ready");
            return report.fail(RunOutcome::ConfigError(e.to_string()));
        }

        let finished = AssertUnwindSafe(self.run_stages(&recipient, opts, &mut report))
            .catch_unwind()
            .await;
        let report = match finished {
            Ok(Ok(outcome)) => report.done(outcome),
            Ok(Err(outcome)) => report.fail(outcome),
            Err(panic) => {
                let msg = panic_message(&*panic);
                tracing::error!(target: "digest", stage = ?report.stage, panic = %msg, "run panicked");
                report.fail(RunOutcome::Crashed(msg))
            }
        };
        match &report.outcome {
            RunOutcome::Delivered | RunOutcome::Previewed => tracing::info!(
                target: "digest",
                items = report.total_kept(),
                outcome = ?report.outcome,
                "run finished"
            ),
            other => tracing::warn!(
                target: "digest",
                failed_at = ?report.failed_at,
                outcome = ?other,
                "run failed"
            ),
        }
        report
    }

    /// `Ok` finishes the run, `Err` fails it in the stage `report` is in.
    async fn run_stages(
        &mut self,
        recipient: &str,
        opts: RunOptions,
        report: &mut RunReport,
    ) -> std::result::Result<RunOutcome, RunOutcome> {
        // Collecting
        let mut collected: Vec<(Family, Vec<Item>)> = Vec::new();
        for family in Family::ALL {
            let Some(adapters) = self.adapters.get(&family) else {
                continue;
            };
            let fs = self.settings.family(family);
            let days = fs.lookback(opts.days_back);
            let batch = collect_family(family, adapters, days, fs.check_relevance).await;
            report.families.insert(
                family,
                FamilyReport {
                    fetched: batch.items.len(),
                    failed_sources: batch.failed_sources,
                    ..Default::default()
                },
            );
            collected.push((family, batch.items));
        }
        if report.total_fetched() == 0 {
            tracing::warn!(target: "digest", "no content found; try a longer lookback or check sources");
            return Err(RunOutcome::NoContent);
        }

        // Processing
        report.stage = RunStage::Processing;
        for (family, items) in collected {
            let section = self.process_family(family, items, report).await;
            report.sections.push(section);
        }
        if report.total_kept() == 0 {
            tracing::warn!(target: "digest", "nothing left after dedup and history filter");
            return Err(RunOutcome::NoContent);
        }

        // Delivering
        report.stage = RunStage::Delivering;
        if let Err(e) = self
            .sender
            .send_digest(recipient, &report.sections, opts.dry_run)
            .await
        {
            tracing::error!(target: "digest", error = %e, "delivery failed");
            return Err(RunOutcome::DeliveryFailed(e.to_string()));
        }
        if opts.dry_run {
            return Ok(RunOutcome::Previewed);
        }

        if let Err(e) = self.record_sent(&report.sections) {
            // the digest already went out; keep the run successful
            tracing::warn!(target: "digest", error = ?e, "could not update send history");
        }
        Ok(RunOutcome::Delivered)
    }

    async fn process_family(&self, family: Family, items: Vec<Item>, report: &mut RunReport) -> DigestSection {
        let fs = self.settings.family(family);
        let fetched = items.len();

        let mut items = self.dedup.deduplicate_all(items);
        let after_dedup = items.len();
        counter!("digest_dedup_removed_total", "family" => family.as_str())
            .increment((fetched - after_dedup) as u64);

        if let Some(h) = &self.history {
            items = h.filter_existing(items);
        }
        let after_history = items.len();

        items.truncate(fs.cap);
        if fs.summarize && self.summarizer.has_llm() {
            self.summarizer.summarize_batch(&mut items).await;
        }
        counter!("digest_items_kept_total", "family" => family.as_str()).increment(items.len() as u64);

        tracing::info!(
            target: "digest",
            family = %family,
            fetched,
            after_dedup,
            after_history,
            kept = items.len(),
            "family processed"
        );
        if let Some(r) = report.families.get_mut(&family) {
            r.after_dedup = after_dedup;
            r.after_history = after_history;
            r.kept = items.len();
        }
        DigestSection::new(family, items)
    }

    fn record_sent(&mut self, sections: &[DigestSection]) -> Result<()> {
        let Some(h) = self.history.as_mut() else {
            return Ok(());
        };
        let delivered: Vec<Item> = sections.iter().flat_map(|s| s.items.iter().cloned()).collect();
        let added = h.add_articles(&delivered).context("recording delivered urls")?;
        let removed = h
            .cleanup(self.settings.history_days)
            .context("cleaning up history")?;
        tracing::info!(target: "history", added, removed, total = h.len(), "history updated");
        Ok(())
    }
}

fn scorer_for(settings: &Settings, family: Family) -> Result<Arc<Scorer>> {
    Scorer::new(settings.scoring_profile(family))
        .map(Arc::new)
        .with_context(|| format!("scoring profile for {family}"))
}

fn feed_adapter(
    name: &str,
    feeds: &[FeedSpec],
    scorer: Arc<Scorer>,
    client: &reqwest::Client,
) -> Option<Box<dyn SourceAdapter>> {
    if feeds.is_empty() {
        return None;
    }
    Some(Box::new(FeedSource::new(name, feeds.to_vec(), scorer, client.clone())))
}

/// Built-in sources per family.
pub fn build_adapters(settings: &Settings) -> Result<Adapters> {
    let client = http_client(settings.request_timeout_secs)?;
    let mut out: Adapters = BTreeMap::new();

    let papers = settings.family(Family::Papers);
    out.entry(Family::Papers).or_default().push(Box::new(ArxivSource::new(
        settings.arxiv_categories.clone(),
        settings.ai_topics.clone(),
        papers.cap * 3,
        scorer_for(settings, Family::Papers)?,
        client.clone(),
    )));

    let news = settings.family(Family::News);
    let news_scorer = scorer_for(settings, Family::News)?;
    let news_list = out.entry(Family::News).or_default();
    news_list.push(Box::new(NewsApiSource::new(
        settings.news_api_key.clone(),
        news.cap * 2,
        news_scorer.clone(),
        client.clone(),
    )));
    news_list.extend(feed_adapter("news-feeds", &settings.feeds.news, news_scorer, &client));

    let disc = settings.family(Family::Discussions);
    out.entry(Family::Discussions).or_default().push(Box::new(
        HackerNewsSource::new(scorer_for(settings, Family::Discussions)?, client.clone(), disc.cap * 3)
            .min_points(settings.hn_min_points)
            .concurrency(settings.hn_concurrency),
    ));

    for (family, name, feeds) in [
        (Family::Blogs, "blogs", &settings.feeds.blogs),
        (Family::Forums, "reddit", &settings.feeds.forums),
        (Family::Videos, "youtube", &settings.feeds.videos),
        (Family::Tools, "producthunt", &settings.feeds.tools),
    ] {
        if let Some(a) = feed_adapter(name, feeds, scorer_for(settings, family)?, &client) {
            out.entry(family).or_default().push(a);
        }
    }

    tracing::debug!(
        target: "digest",
        families = out.len(),
        adapters = out.values().map(Vec::len).sum::<usize>(),
        "sources wired"
    );
    Ok(out)
}
