//! Triage queue support: ordering, skip filters, and background writes.
//!
//! The interactive display itself lives outside this crate. What it needs is
//! here: [`prepare_queue`] to turn the unprocessed backlog into display order,
//! a [`TriageQueue`] model holding optimistic flag changes, and a
//! [`BackgroundWriter`] that persists those changes without blocking input
//! and reports back over a channel.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::{Regex, RegexBuilder};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use newswatch_filters::{SimilarityRule, TitleNormalizer, skip_adjacent_similar};
use newswatch_shared::{NewswatchError, Relevance, Result, SourceRecord, title_key};
use newswatch_storage::Storage;

use crate::topics::TopicSet;

const PROCESSED_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
const RELEVANCE_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// How long the failure indicator stays up after a write is reverted.
pub const ERROR_INDICATOR: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// SkipFilter
// ---------------------------------------------------------------------------

/// Case-insensitive title patterns whose matches never reach the queue.
#[derive(Debug, Clone, Default)]
pub struct SkipFilter {
    patterns: Vec<Regex>,
}

impl SkipFilter {
    /// Compile configured regex patterns.
    pub fn compile(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .filter(|p| !p.trim().is_empty())
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| NewswatchError::parse(format!("bad skip pattern '{p}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Add a literal keyword for the rest of this session.
    pub fn add_keyword(&mut self, keyword: &str) -> Result<()> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(NewswatchError::validation("filter keyword is empty"));
        }
        let pattern = RegexBuilder::new(&regex::escape(keyword))
            .case_insensitive(true)
            .build()
            .map_err(|e| NewswatchError::parse(format!("bad keyword '{keyword}': {e}")))?;
        self.patterns.push(pattern);
        Ok(())
    }

    pub fn is_skipped(&self, title: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(title))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Queue preparation
// ---------------------------------------------------------------------------

/// Display-ready queue plus the ids that were filtered out of it.
#[derive(Debug, Clone, Default)]
pub struct PreparedQueue {
    pub queue: Vec<SourceRecord>,
    /// Should be marked processed so they don't come back next session.
    pub skipped: Vec<i64>,
}

/// Order the unprocessed backlog for display.
///
/// Drops skip-pattern hits and later repeats of the same cleaned title,
/// groups the rest by topic, then drops items too similar to their
/// predecessor in the final order.
pub fn prepare_queue(
    records: Vec<SourceRecord>,
    skip: &SkipFilter,
    topics: &TopicSet,
    rule: &SimilarityRule,
    normalizer: &TitleNormalizer,
) -> PreparedQueue {
    let mut skipped = Vec::new();
    let mut seen = HashSet::new();
    let mut survivors = Vec::with_capacity(records.len());

    for record in records {
        if skip.is_skipped(&record.title) {
            debug!(id = record.id, title = %record.title, "skip pattern hit");
            skipped.push(record.id);
            continue;
        }
        if !seen.insert(title_key(&normalizer.normalize(&record.title))) {
            debug!(id = record.id, title = %record.title, "repeat in queue");
            skipped.push(record.id);
            continue;
        }
        survivors.push(record);
    }

    let ordered = topics.reorder(survivors);
    let (queue, similar) = skip_adjacent_similar(ordered, rule, normalizer);
    skipped.extend(similar.iter().map(|r| r.id));

    PreparedQueue { queue, skipped }
}

// ---------------------------------------------------------------------------
// Background writes
// ---------------------------------------------------------------------------

/// A single flag change to persist. Carries the value it replaced so a
/// failed write can be undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Processed {
        id: i64,
        processed: bool,
        previous: bool,
    },
    Relevance {
        id: i64,
        relevance: Relevance,
        previous: Relevance,
    },
}

impl WriteOp {
    pub fn id(&self) -> i64 {
        match self {
            Self::Processed { id, .. } | Self::Relevance { id, .. } => *id,
        }
    }
}

/// Result of a background write, delivered over the writer's channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteEvent {
    Confirmed(WriteOp),
    Failed { op: WriteOp, error: String },
}

/// Fire-and-forget store writes on the tokio runtime.
pub struct BackgroundWriter {
    storage: Arc<Storage>,
    events: mpsc::UnboundedSender<WriteEvent>,
    tasks: JoinSet<()>,
    processed_timeout: Duration,
    relevance_timeout: Duration,
}

impl BackgroundWriter {
    /// Create a writer and the receiving end of its event channel.
    pub fn new(storage: Arc<Storage>) -> (Self, mpsc::UnboundedReceiver<WriteEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let writer = Self {
            storage,
            events,
            tasks: JoinSet::new(),
            processed_timeout: PROCESSED_WRITE_TIMEOUT,
            relevance_timeout: RELEVANCE_WRITE_TIMEOUT,
        };
        (writer, rx)
    }

    pub fn with_timeouts(mut self, processed: Duration, relevance: Duration) -> Self {
        self.processed_timeout = processed;
        self.relevance_timeout = relevance;
        self
    }

    /// Number of writes not yet finished.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Start persisting `op`. Returns immediately.
    pub fn submit(&mut self, op: WriteOp) {
        self.reap_finished();

        let storage = self.storage.clone();
        let events = self.events.clone();
        let processed_timeout = self.processed_timeout;
        let relevance_timeout = self.relevance_timeout;

        self.tasks.spawn(async move {
            let result = match op {
                WriteOp::Processed { id, processed, .. } => {
                    tokio::time::timeout(processed_timeout, storage.set_processed(id, processed))
                        .await
                }
                WriteOp::Relevance { id, relevance, .. } => {
                    tokio::time::timeout(relevance_timeout, storage.set_relevance(id, relevance))
                        .await
                }
            };

            let event = match result {
                Ok(Ok(true)) => WriteEvent::Confirmed(op),
                Ok(Ok(false)) => WriteEvent::Failed {
                    op,
                    error: format!("source {} not found", op.id()),
                },
                Ok(Err(e)) => WriteEvent::Failed {
                    op,
                    error: e.to_string(),
                },
                Err(_) => WriteEvent::Failed {
                    op,
                    error: "write timed out".into(),
                },
            };

            if let WriteEvent::Failed { error, .. } = &event {
                warn!(id = op.id(), %error, "background write failed");
            }
            if events.send(event).is_err() {
                debug!(id = op.id(), "write event receiver dropped");
            }
        });
    }

    /// Drop handles of tasks that already finished; their results went out
    /// over the event channel.
    fn reap_finished(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            if let Err(e) = joined {
                warn!(error = %e, "background write task panicked");
            }
        }
    }

    /// Wait for every outstanding write. Nothing is cancelled.
    pub async fn shutdown(mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "background write task panicked");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TriageQueue
// ---------------------------------------------------------------------------

/// Single-threaded model of the triage queue with optimistic updates.
///
/// Mutations change local state immediately and return the [`WriteOp`]s to
/// hand to a [`BackgroundWriter`]. Failed writes come back through
/// [`apply`](Self::apply) and are reverted.
#[derive(Debug, Clone)]
pub struct TriageQueue {
    items: Vec<SourceRecord>,
    skip: SkipFilter,
    error_until: Option<Instant>,
}

impl TriageQueue {
    pub fn new(items: Vec<SourceRecord>, skip: SkipFilter) -> Self {
        Self {
            items,
            skip,
            error_until: None,
        }
    }

    pub fn items(&self) -> &[SourceRecord] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&SourceRecord> {
        self.items.get(index)
    }

    pub fn position(&self, id: i64) -> Option<usize> {
        self.items.iter().position(|r| r.id == id)
    }

    /// Flip the processed flag. Unless the item was already judged relevant,
    /// its relevance is also set to `no`.
    pub fn toggle_processed(&mut self, index: usize) -> Vec<WriteOp> {
        let Some(item) = self.items.get_mut(index) else {
            return Vec::new();
        };

        let previous = item.processed;
        item.processed = !previous;
        let mut ops = vec![WriteOp::Processed {
            id: item.id,
            processed: item.processed,
            previous,
        }];

        if item.relevance != Relevance::Yes && item.relevance != Relevance::No {
            ops.push(WriteOp::Relevance {
                id: item.id,
                relevance: Relevance::No,
                previous: item.relevance,
            });
            item.relevance = Relevance::No;
        }
        ops
    }

    pub fn set_relevance(&mut self, index: usize, relevance: Relevance) -> Option<WriteOp> {
        let item = self.items.get_mut(index)?;
        let previous = item.relevance;
        item.relevance = relevance;
        Some(WriteOp::Relevance {
            id: item.id,
            relevance,
            previous,
        })
    }

    /// Add a session keyword and mark every unprocessed match processed.
    pub fn add_filter(&mut self, keyword: &str) -> Result<Vec<WriteOp>> {
        self.skip.add_keyword(keyword)?;

        let mut ops = Vec::new();
        for item in self.items.iter_mut().filter(|i| !i.processed) {
            if self.skip.is_skipped(&item.title) {
                item.processed = true;
                ops.push(WriteOp::Processed {
                    id: item.id,
                    processed: true,
                    previous: false,
                });
            }
        }
        Ok(ops)
    }

    /// Reconcile with a background write result.
    pub fn apply(&mut self, event: &WriteEvent, now: Instant) {
        let WriteEvent::Failed { op, .. } = event else {
            return;
        };
        self.error_until = Some(now + ERROR_INDICATOR);

        let Some(item) = self.items.iter_mut().find(|i| i.id == op.id()) else {
            return;
        };
        // Only undo if nothing newer has overwritten the value since.
        match *op {
            WriteOp::Processed {
                processed,
                previous,
                ..
            } if item.processed == processed => item.processed = previous,
            WriteOp::Relevance {
                relevance,
                previous,
                ..
            } if item.relevance == relevance => item.relevance = previous,
            _ => {}
        }
    }

    /// Whether the failure indicator should currently be shown.
    pub fn showing_error(&self, now: Instant) -> bool {
        self.error_until.is_some_and(|until| now < until)
    }
}
