//! Exact and fuzzy duplicate detection.
//!
//! A candidate is an exact duplicate when its title (case-insensitively) or
//! its link has been seen before. Otherwise its cleaned title is compared
//! against recently remembered titles sharing the same first three words.
//! Every inspected candidate is appended to the title memory, whatever the
//! verdict, so the corpus keeps growing across runs.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use newswatch_shared::{AppConfig, CandidateArticle, Result, TitleMemoryEntry};
use newswatch_storage::{ArticleStore, with_timeout};

use crate::similarity::SimilarityRule;
use crate::title::TitleNormalizer;

/// Number of leading words that select the comparison bucket.
const PREFIX_WORDS: usize = 3;

/// Outcome of a duplicate check.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Novel,
    ExactDuplicate,
    FuzzyDuplicate { matched: TitleMemoryEntry },
}

impl Verdict {
    pub fn is_duplicate(&self) -> bool {
        !matches!(self, Self::Novel)
    }
}

/// Duplicate detector backed by the durable store.
pub struct DuplicateDetector {
    storage: Arc<dyn ArticleStore>,
    normalizer: TitleNormalizer,
    rule: SimilarityRule,
    memory_candidates: u32,
    store_timeout: Duration,
}

impl DuplicateDetector {
    pub fn new(
        storage: Arc<dyn ArticleStore>,
        normalizer: TitleNormalizer,
        rule: SimilarityRule,
        memory_candidates: u32,
        store_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            normalizer,
            rule,
            memory_candidates,
            store_timeout,
        }
    }

    pub fn from_config(storage: Arc<dyn ArticleStore>, config: &AppConfig) -> Self {
        Self::new(
            storage,
            TitleNormalizer::from_config(&config.filters),
            SimilarityRule::from_config(&config.similarity),
            config.similarity.memory_candidates,
            config.store_timeout(),
        )
    }

    /// Classify `candidate` and remember its title.
    ///
    /// Any store failure, including a timeout, is returned as
    /// [`NewswatchError::Storage`]; the caller decides whether to fail open.
    pub async fn check(&self, candidate: &CandidateArticle, now: DateTime<Utc>) -> Result<Verdict> {
        let title = candidate.title.as_str();
        let link = candidate.link.as_str();

        let exact = self
            .timed("exact match", self.storage.exact_match_exists(title, link))
            .await?;

        let cleaned = self.normalizer.normalize(title);
        let verdict = if exact {
            Verdict::ExactDuplicate
        } else {
            self.fuzzy_match(&cleaned).await?
        };

        if !cleaned.is_empty() {
            let inserted = self
                .timed(
                    "remember title",
                    self.storage.remember_title(title, &cleaned, link, now),
                )
                .await?;
            tracing::trace!(cleaned = %cleaned, inserted, "title memory updated");
        }

        Ok(verdict)
    }

    async fn fuzzy_match(&self, cleaned: &str) -> Result<Verdict> {
        let words: Vec<&str> = cleaned.split_whitespace().collect();
        if words.len() < PREFIX_WORDS {
            return Ok(Verdict::Novel);
        }
        let prefix = words[..PREFIX_WORDS].join(" ");

        let recent = self
            .timed(
                "prefix lookup",
                self.storage
                    .recent_titles_with_prefix(&prefix, self.memory_candidates),
            )
            .await?;

        Ok(recent
            .into_iter()
            .find(|entry| self.rule.is_similar(cleaned, &entry.cleaned_title))
            .map_or(Verdict::Novel, |matched| Verdict::FuzzyDuplicate { matched }))
    }

    async fn timed<T>(&self, op: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        with_timeout(op, self.store_timeout, fut).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use newswatch_shared::NewSource;
    use newswatch_storage::Storage;
    use uuid::Uuid;

    fn temp_db_path() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("nw_test_{}.db", Uuid::now_v7()))
    }

    async fn detector() -> (DuplicateDetector, Arc<Storage>) {
        let storage = Arc::new(Storage::open(&temp_db_path()).await.expect("open storage"));
        let detector = DuplicateDetector::from_config(storage.clone(), &AppConfig::default());
        (detector, storage)
    }

    fn candidate(title: &str, link: &str) -> CandidateArticle {
        CandidateArticle::new(title, link)
    }

    #[tokio::test]
    async fn same_link_is_exact_duplicate() {
        let (detector, _) = detector().await;
        let now = Utc::now();
        let first = detector
            .check(&candidate("Quake hits coastal towns overnight", "http://a.com/x"), now)
            .await
            .unwrap();
        assert_eq!(first, Verdict::Novel);

        let second = detector
            .check(&candidate("Entirely different headline here", "http://a.com/x"), now)
            .await
            .unwrap();
        assert_eq!(second, Verdict::ExactDuplicate);
    }

    #[tokio::test]
    async fn stored_title_matches_case_insensitively() {
        let (detector, storage) = detector().await;
        storage
            .insert_source(&NewSource {
                title: "Volcano Erupts In Iceland".into(),
                link: "https://b.com/1".into(),
                date: Utc::now(),
                summary: String::new(),
                importance: true,
                importance_reasoning: String::new(),
                origin: None,
            })
            .await
            .unwrap();

        let verdict = detector
            .check(&candidate("volcano erupts in iceland", "https://c.com/2"), Utc::now())
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::ExactDuplicate);
    }

    #[tokio::test]
    async fn near_identical_title_is_fuzzy_duplicate() {
        let (detector, _) = detector().await;
        let now = Utc::now();
        detector
            .check(
                &candidate(
                    "Earthquake strikes off the coast of northern Japan – Reuters",
                    "https://r.com/1",
                ),
                now - ChronoDuration::minutes(5),
            )
            .await
            .unwrap();

        let verdict = detector
            .check(
                &candidate("Earthquake strikes off the coast of north Japan | AP", "https://ap.com/9"),
                now,
            )
            .await
            .unwrap();
        match verdict {
            Verdict::FuzzyDuplicate { matched } => {
                assert_eq!(
                    matched.cleaned_title,
                    "Earthquake strikes off the coast of northern Japan"
                );
                assert_eq!(matched.link, "https://r.com/1");
            }
            other => panic!("expected fuzzy duplicate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn short_titles_skip_fuzzy_comparison() {
        let (detector, _) = detector().await;
        let now = Utc::now();
        let first = detector
            .check(&candidate("Supercalifragilisticexpialidocious wins", "https://s.com/1"), now)
            .await
            .unwrap();
        assert_eq!(first, Verdict::Novel);

        // Would be similar, but only two words.
        let second = detector
            .check(&candidate("Supercalifragilisticexpialidocious won", "https://s.com/2"), now)
            .await
            .unwrap();
        assert_eq!(second, Verdict::Novel);
    }

    #[tokio::test]
    async fn every_check_is_remembered() {
        let (detector, storage) = detector().await;
        let now = Utc::now();
        let c = candidate("Ceasefire talks resume in Cairo today – BBC", "https://bbc.com/1");
        detector.check(&c, now).await.unwrap();
        // Exact duplicates are remembered too (no-op on the same cleaned title).
        assert_eq!(detector.check(&c, now).await.unwrap(), Verdict::ExactDuplicate);

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.remembered_titles, 1);
        assert_eq!(stats.sources, 0);

        let entries = storage
            .recent_titles_with_prefix("Ceasefire talks resume", 10)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].cleaned_title, "Ceasefire talks resume in Cairo today");
        assert_eq!(entries[0].original_title, c.title);
    }

    #[tokio::test]
    async fn non_ascii_titles_match_case_insensitively() {
        let (detector, _) = detector().await;
        let now = Utc::now();
        let first = detector
            .check(&candidate("Ölpreis explodiert", "https://a.de/1"), now)
            .await
            .unwrap();
        assert_eq!(first, Verdict::Novel);

        // Two words: the fuzzy path never runs, so only the exact check can catch it.
        let second = detector
            .check(&candidate("ölpreis explodiert", "https://b.de/2"), now)
            .await
            .unwrap();
        assert_eq!(second, Verdict::ExactDuplicate);
    }

    /// Never answers.
    struct StalledStore;

    #[async_trait]
    impl ArticleStore for StalledStore {
        async fn exact_match_exists(&self, _title: &str, _link: &str) -> Result<bool> {
            std::future::pending().await
        }

        async fn recent_titles_with_prefix(
            &self,
            _prefix: &str,
            _limit: u32,
        ) -> Result<Vec<TitleMemoryEntry>> {
            std::future::pending().await
        }

        async fn remember_title(
            &self,
            _original_title: &str,
            _cleaned_title: &str,
            _link: &str,
            _seen_at: DateTime<Utc>,
        ) -> Result<bool> {
            std::future::pending().await
        }

        async fn insert_source(&self, _source: &NewSource) -> Result<bool> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn stalled_store_times_out_as_storage_error() {
        let config = AppConfig::default();
        let detector = DuplicateDetector::new(
            Arc::new(StalledStore),
            TitleNormalizer::from_config(&config.filters),
            SimilarityRule::from_config(&config.similarity),
            config.similarity.memory_candidates,
            Duration::from_millis(30),
        );

        let err = detector
            .check(&candidate("Storm surge hits the harbour", "https://s.com/1"), Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_storage());
        assert!(err.to_string().contains("exact match timed out"));
    }

    #[tokio::test]
    async fn store_write_failure_is_reported() {
        let path = temp_db_path();
        drop(Storage::open(&path).await.unwrap());
        let readonly = Arc::new(Storage::open_readonly(&path).await.unwrap());
        let detector = DuplicateDetector::from_config(readonly, &AppConfig::default());

        let err = detector
            .check(&candidate("Any headline at all here", "https://x.com"), Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_storage());
    }
}
