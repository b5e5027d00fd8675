//! Ingestion pipeline: candidate → filters → extraction → classification → store.
//!
//! Candidates are handled strictly one at a time so that the title memory
//! written for one candidate is visible to the next.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use newswatch_extract::ContentExtractor;
use newswatch_filters::{
    DateFormat, DuplicateDetector, FreshnessWindow, HostFilter, SimilarityRule, TitleNormalizer,
    Verdict, parse_published,
};
use newswatch_shared::{AppConfig, CandidateArticle, NewSource, title_key};
use newswatch_storage::{ArticleStore, with_timeout};

use crate::classifier::Classifier;

/// Immutable per-process settings for the pipeline, built once from config.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub date_format: DateFormat,
    /// Name of the ingestion source, stored with each accepted article.
    pub origin: Option<String>,
    pub freshness: FreshnessWindow,
    pub hosts: HostFilter,
    pub normalizer: TitleNormalizer,
    pub similarity: SimilarityRule,
    pub memory_candidates: u32,
    pub store_timeout: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig, date_format: DateFormat, origin: Option<String>) -> Self {
        Self {
            date_format,
            origin,
            freshness: FreshnessWindow::from_config(&config.filters),
            hosts: HostFilter::from_config(&config.filters),
            normalizer: TitleNormalizer::from_config(&config.filters),
            similarity: SimilarityRule::from_config(&config.similarity),
            memory_candidates: config.similarity.memory_candidates,
            store_timeout: config.store_timeout(),
        }
    }
}

/// Terminal state of one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Outcome {
    /// Same link or title already seen earlier in this run.
    RepeatInBatch,
    /// No usable publication date.
    Undated,
    /// Published outside the freshness window.
    Stale,
    /// Blocklisted or malformed link.
    BlockedHost,
    ExactDuplicate,
    FuzzyDuplicate,
    ExtractionFailed,
    ClassifierFailed,
    NotImportant,
    Saved,
    /// Important, but another run stored the same link first.
    AlreadyStored,
    /// Important, but the store write failed; dropped for this run.
    SaveFailed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RepeatInBatch => "repeat-in-batch",
            Self::Undated => "undated",
            Self::Stale => "stale",
            Self::BlockedHost => "blocked-host",
            Self::ExactDuplicate => "exact-duplicate",
            Self::FuzzyDuplicate => "fuzzy-duplicate",
            Self::ExtractionFailed => "extraction-failed",
            Self::ClassifierFailed => "classifier-failed",
            Self::NotImportant => "not-important",
            Self::Saved => "saved",
            Self::AlreadyStored => "already-stored",
            Self::SaveFailed => "save-failed",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tally of one [`Pipeline::run_batch`] call.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub total: usize,
    pub counts: BTreeMap<Outcome, usize>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn count(&self, outcome: Outcome) -> usize {
        self.counts.get(&outcome).copied().unwrap_or(0)
    }

    pub fn saved(&self) -> usize {
        self.count(Outcome::Saved)
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called before a candidate is processed.
    fn candidate_started(&self, link: &str, current: usize, total: usize);
    /// Called with each candidate's outcome.
    fn candidate_finished(&self, link: &str, outcome: Outcome);
    /// Called when the batch completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn candidate_started(&self, _link: &str, _current: usize, _total: usize) {}
    fn candidate_finished(&self, _link: &str, _outcome: Outcome) {}
    fn done(&self, _report: &RunReport) {}
}

/// Per-run memory of what this batch has already produced.
#[derive(Debug, Default)]
struct BatchGuard {
    links: HashSet<String>,
    titles: HashSet<String>,
}

impl BatchGuard {
    /// Records the candidate; `false` if its link or title was already seen.
    fn admit(&mut self, candidate: &CandidateArticle) -> bool {
        let title = title_key(candidate.title.trim());
        let repeat = self.links.contains(&candidate.link)
            || (!title.is_empty() && self.titles.contains(&title));
        self.links.insert(candidate.link.clone());
        if !title.is_empty() {
            self.titles.insert(title);
        }
        !repeat
    }
}

/// The ingestion pipeline coordinator.
pub struct Pipeline {
    storage: Arc<dyn ArticleStore>,
    settings: PipelineSettings,
    detector: DuplicateDetector,
    extractor: Arc<dyn ContentExtractor>,
    classifier: Arc<dyn Classifier>,
    guard: BatchGuard,
}

impl Pipeline {
    pub fn new(
        storage: Arc<dyn ArticleStore>,
        settings: PipelineSettings,
        extractor: Arc<dyn ContentExtractor>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        let detector = DuplicateDetector::new(
            storage.clone(),
            settings.normalizer.clone(),
            settings.similarity,
            settings.memory_candidates,
            settings.store_timeout,
        );
        Self {
            storage,
            settings,
            detector,
            extractor,
            classifier,
            guard: BatchGuard::default(),
        }
    }

    /// Run one candidate through every stage. Never fails: every error is
    /// folded into the returned [`Outcome`].
    #[instrument(skip_all, fields(link = %candidate.link))]
    pub async fn process(&mut self, candidate: &CandidateArticle, now: DateTime<Utc>) -> Outcome {
        if !self.guard.admit(candidate) {
            debug!("repeat within batch");
            return Outcome::RepeatInBatch;
        }

        let published = match parse_published(candidate, self.settings.date_format, now) {
            Ok(published) => published,
            Err(e) => {
                info!(error = %e, "rejecting candidate without usable date");
                return Outcome::Undated;
            }
        };
        if !self.settings.freshness.contains(published, now) {
            debug!(%published, "stale candidate");
            return Outcome::Stale;
        }

        if !self.settings.hosts.check(&candidate.link) {
            return Outcome::BlockedHost;
        }

        match self.detector.check(candidate, now).await {
            Ok(Verdict::Novel) => {}
            Ok(Verdict::ExactDuplicate) => {
                debug!("exact duplicate");
                return Outcome::ExactDuplicate;
            }
            Ok(Verdict::FuzzyDuplicate { matched }) => {
                debug!(matched = %matched.cleaned_title, "fuzzy duplicate");
                return Outcome::FuzzyDuplicate;
            }
            Err(e) => {
                // Fail open.
                warn!(error = %e, "duplicate check failed, treating candidate as novel");
            }
        }

        let article = match self.extractor.extract(&candidate.link).await {
            Ok(article) => article,
            Err(e) => {
                info!(error = %e, "extraction failed");
                return Outcome::ExtractionFailed;
            }
        };

        let raw_title = if candidate.title.trim().is_empty() || candidate.title == candidate.link {
            article.title.as_deref().unwrap_or(&candidate.title)
        } else {
            candidate.title.as_str()
        };
        let title = self.settings.normalizer.normalize(raw_title);

        let summary = match self.classifier.summarize(&article.text).await {
            Ok(summary) => summary,
            Err(e) => {
                info!(error = %e, "summarization failed");
                return Outcome::ClassifierFailed;
            }
        };

        let snippet = format!("# {title}\n\n{summary}");
        let verdict = match self.classifier.assess_importance(&snippet).await {
            Ok(verdict) => verdict,
            Err(e) => {
                info!(error = %e, "importance check failed");
                return Outcome::ClassifierFailed;
            }
        };

        if !verdict.is_important {
            debug!(%title, "not important");
            return Outcome::NotImportant;
        }

        let source = NewSource {
            title,
            link: candidate.link.clone(),
            date: published,
            summary,
            importance: verdict.is_important,
            importance_reasoning: verdict.reasoning,
            origin: self.settings.origin.clone(),
        };

        let insert = with_timeout(
            "save source",
            self.settings.store_timeout,
            self.storage.insert_source(&source),
        )
        .await;
        match insert {
            Ok(true) => {
                info!(title = %source.title, "saved source");
                Outcome::Saved
            }
            Ok(false) => {
                debug!("link already stored by another run");
                Outcome::AlreadyStored
            }
            Err(e) => {
                warn!(error = %e, "failed to save source");
                Outcome::SaveFailed
            }
        }
    }

    /// Process a batch of candidates in order.
    #[instrument(skip_all, fields(run_id = tracing::field::Empty, candidates = candidates.len()))]
    pub async fn run_batch(
        &mut self,
        candidates: Vec<CandidateArticle>,
        progress: &dyn ProgressReporter,
    ) -> RunReport {
        let start = Instant::now();
        let run_id = Uuid::now_v7();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        self.guard = BatchGuard::default();

        let total = candidates.len();
        let mut counts: BTreeMap<Outcome, usize> = BTreeMap::new();

        info!(total, "starting ingestion run");
        for (i, candidate) in candidates.iter().enumerate() {
            progress.candidate_started(&candidate.link, i + 1, total);
            let outcome = self.process(candidate, Utc::now()).await;
            *counts.entry(outcome).or_default() += 1;
            progress.candidate_finished(&candidate.link, outcome);
        }

        let report = RunReport {
            run_id,
            total,
            counts,
            elapsed: start.elapsed(),
        };
        info!(
            saved = report.saved(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "ingestion run complete"
        );
        progress.done(&report);
        report
    }
}
