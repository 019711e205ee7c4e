use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::crawl::fetch::{FetchError, PageFetcher};
use crate::crawl::retry::RetryPolicy;
use crate::crawl::types::{Checkpoint, RepoPage, RepoRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Persistence: {source}")]
    Persistence {
        #[from]
        source: anyhow::Error,
    },
}

/// Persistence seam for one partition. `commit_page` must apply the
/// snapshot upserts, the history appends and the checkpoint advance as
/// one atomic unit; a checkpoint must never be observable without its
/// page's data.
pub trait CrawlStore {
    fn load_checkpoint(&mut self, partition_key: &str) -> Result<Checkpoint, StoreError>;

    fn commit_page(
        &mut self,
        partition_key: &str,
        records: &[RepoRecord],
        next_cursor: Option<&str>,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("LoadCheckpoint: {source}")]
    LoadCheckpoint { source: StoreError },

    #[error("Fetch: {source}")]
    Fetch { source: FetchError },

    #[error("RetriesExhausted after {attempts} attempts: {source}")]
    RetriesExhausted { attempts: u32, source: FetchError },

    #[error("CommitPage: {source}")]
    CommitPage { source: StoreError },
}

/// Outcome of a partition that ended without error.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlSummary {
    /// Cumulative fetched count, including prior runs of the partition.
    pub fetched_total: i64,
    /// Pages committed by this run.
    pub pages: u32,
    /// True when the run stopped at a loop boundary on request rather
    /// than exhausting the result set.
    pub cancelled: bool,
}

enum CrawlState {
    Fetching { attempt: u32 },
    Persisting { page: RepoPage },
    Done { cancelled: bool },
}

pub struct CrawlDriver<F, S> {
    fetcher: F,
    store: S,
    retry: RetryPolicy,
    max_records: Option<i64>,
    cancel: Option<Arc<AtomicBool>>,
}

impl<F: PageFetcher, S: CrawlStore> CrawlDriver<F, S> {
    pub fn new(fetcher: F, store: S) -> Self {
        Self {
            fetcher,
            store,
            retry: RetryPolicy::default(),
            max_records: None,
            cancel: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Stop once the partition's cumulative fetched count reaches `cap`.
    pub fn with_record_cap(mut self, cap: i64) -> Self {
        self.max_records = Some(cap);
        self
    }

    /// Cooperative cancellation, honored only between pages so a page's
    /// persist-plus-checkpoint unit is never left half-applied.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Crawls one partition to exhaustion, cap, cancellation or failure,
    /// resuming from its stored checkpoint.
    pub async fn run(&mut self, partition_key: &str) -> Result<CrawlSummary, CrawlError> {
        let checkpoint = self
            .store
            .load_checkpoint(partition_key)
            .map_err(|source| CrawlError::LoadCheckpoint { source })?;

        let mut cursor = checkpoint.end_cursor;
        let mut fetched = checkpoint.fetched_count;
        let mut pages = 0u32;

        info!(
            partition = partition_key,
            resumed_count = fetched,
            has_cursor = cursor.is_some(),
            "starting partition crawl"
        );

        let mut state = self.next_fetch_state(fetched);
        let cancelled = loop {
            state = match state {
                CrawlState::Fetching { attempt } => {
                    match self.fetcher.fetch_page(cursor.as_deref()).await {
                        Ok(page) => CrawlState::Persisting { page },
                        Err(FetchError::Transient { reason, retry_after }) => {
                            let source = FetchError::Transient { reason, retry_after };
                            if self.retry.attempts_exhausted(attempt) {
                                return Err(CrawlError::RetriesExhausted {
                                    attempts: attempt,
                                    source,
                                });
                            }
                            let delay = match source {
                                FetchError::Transient {
                                    retry_after: Some(hint),
                                    ..
                                } => hint,
                                _ => self.retry.delay(attempt),
                            };
                            warn!(
                                partition = partition_key,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                "transient fetch failure, backing off"
                            );
                            tokio::time::sleep(delay).await;
                            CrawlState::Fetching { attempt: attempt + 1 }
                        }
                        Err(source) => return Err(CrawlError::Fetch { source }),
                    }
                }
                CrawlState::Persisting { page } => {
                    // An exhausted page keeps the cursor it was fetched
                    // with, so a finished partition resumes in place
                    // instead of restarting from the first page.
                    let resume_cursor = if page.has_more {
                        page.next_cursor.clone()
                    } else {
                        cursor.clone()
                    };

                    self.store
                        .commit_page(partition_key, &page.records, resume_cursor.as_deref())
                        .map_err(|source| CrawlError::CommitPage { source })?;

                    fetched += page.records.len() as i64;
                    pages += 1;
                    cursor = resume_cursor;

                    info!(
                        partition = partition_key,
                        page_records = page.records.len(),
                        fetched_total = fetched,
                        "committed page"
                    );

                    if page.has_more {
                        self.next_fetch_state(fetched)
                    } else {
                        CrawlState::Done { cancelled: false }
                    }
                }
                CrawlState::Done { cancelled } => break cancelled,
            };
        };

        Ok(CrawlSummary {
            fetched_total: fetched,
            pages,
            cancelled,
        })
    }

    /// Loop boundary: the only place the record cap and a cancellation
    /// request are observed.
    fn next_fetch_state(&self, fetched: i64) -> CrawlState {
        if self.max_records.is_some_and(|cap| fetched >= cap) {
            return CrawlState::Done { cancelled: false };
        }
        if self
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
        {
            return CrawlState::Done { cancelled: true };
        }
        CrawlState::Fetching { attempt: 1 }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::{BTreeMap, VecDeque};
    use std::time::Duration;

    use anyhow::anyhow;
    use chrono::Utc;

    use super::*;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct MemState {
        repos: BTreeMap<String, RepoRecord>,
        history: Vec<(String, i64)>,
        checkpoints: BTreeMap<String, Checkpoint>,
    }

    #[derive(Default)]
    struct MemStore {
        state: MemState,
        fail_next_commits: u32,
    }

    impl CrawlStore for MemStore {
        fn load_checkpoint(&mut self, partition_key: &str) -> Result<Checkpoint, StoreError> {
            Ok(self
                .state
                .checkpoints
                .get(partition_key)
                .cloned()
                .unwrap_or_default())
        }

        fn commit_page(
            &mut self,
            partition_key: &str,
            records: &[RepoRecord],
            next_cursor: Option<&str>,
        ) -> Result<(), StoreError> {
            if self.fail_next_commits > 0 {
                self.fail_next_commits -= 1;
                return Err(StoreError::Persistence {
                    source: anyhow!("injected commit failure"),
                });
            }
            for record in records {
                self.state
                    .repos
                    .insert(record.repo_id.clone(), record.clone());
                self.state
                    .history
                    .push((record.repo_id.clone(), record.stars));
            }
            let checkpoint = self
                .state
                .checkpoints
                .entry(partition_key.to_string())
                .or_default();
            checkpoint.end_cursor = next_cursor.map(String::from);
            checkpoint.fetched_count += records.len() as i64;
            Ok(())
        }
    }

    struct ScriptedFetcher {
        responses: RefCell<VecDeque<Result<RepoPage, FetchError>>>,
        calls: RefCell<Vec<Option<String>>>,
        cancel_on_fetch: Option<Arc<AtomicBool>>,
    }

    impl ScriptedFetcher {
        fn new(responses: Vec<Result<RepoPage, FetchError>>) -> Self {
            Self {
                responses: RefCell::new(responses.into()),
                calls: RefCell::new(Vec::new()),
                cancel_on_fetch: None,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    impl PageFetcher for ScriptedFetcher {
        async fn fetch_page(&self, cursor: Option<&str>) -> Result<RepoPage, FetchError> {
            self.calls.borrow_mut().push(cursor.map(String::from));
            if let Some(flag) = &self.cancel_on_fetch {
                flag.store(true, Ordering::Relaxed);
            }
            self.responses
                .borrow_mut()
                .pop_front()
                .expect("fetch_page called more often than scripted")
        }
    }

    fn record(repo_id: &str, stars: i64) -> RepoRecord {
        RepoRecord {
            repo_id: repo_id.to_string(),
            name: repo_id.to_string(),
            owner: "octo".to_string(),
            full_name: format!("octo/{repo_id}"),
            url: format!("https://github.com/octo/{repo_id}"),
            stars,
            forks: 1,
            language: Some("Rust".to_string()),
            description: None,
            created_at: Some(Utc::now()),
        }
    }

    fn page(records: Vec<RepoRecord>, next_cursor: Option<&str>, has_more: bool) -> RepoPage {
        RepoPage {
            records,
            next_cursor: next_cursor.map(String::from),
            has_more,
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(5))
    }

    #[tokio::test]
    async fn first_run_commits_pages_and_checkpoint() {
        let fetcher = ScriptedFetcher::new(vec![
            Ok(page(vec![record("1", 10), record("2", 20)], Some("abc"), true)),
            Ok(page(vec![], None, false)),
        ]);
        let mut driver = CrawlDriver::new(fetcher, MemStore::default());

        let summary = driver.run("lang:rust").await.unwrap();

        assert_eq!(summary.fetched_total, 2);
        assert_eq!(summary.pages, 2);
        assert!(!summary.cancelled);

        let state = &driver.store().state;
        assert_eq!(state.repos.len(), 2);
        assert_eq!(state.history.len(), 2);
        assert_eq!(
            state.checkpoints["lang:rust"],
            Checkpoint {
                end_cursor: Some("abc".to_string()),
                fetched_count: 2,
            }
        );
    }

    #[tokio::test]
    async fn resumes_from_existing_checkpoint() {
        let mut store = MemStore::default();
        store.state.checkpoints.insert(
            "lang:rust".to_string(),
            Checkpoint {
                end_cursor: Some("abc".to_string()),
                fetched_count: 2,
            },
        );
        let fetcher = ScriptedFetcher::new(vec![Ok(page(vec![], None, false))]);
        let mut driver = CrawlDriver::new(fetcher, store);

        let summary = driver.run("lang:rust").await.unwrap();

        assert_eq!(summary.fetched_total, 2);
        let state = &driver.store().state;
        assert!(state.history.is_empty());
        // Empty final page: delta 0, resume cursor unchanged.
        assert_eq!(
            state.checkpoints["lang:rust"],
            Checkpoint {
                end_cursor: Some("abc".to_string()),
                fetched_count: 2,
            }
        );
    }

    #[tokio::test]
    async fn resume_cursor_is_passed_to_the_fetcher() {
        let mut store = MemStore::default();
        store.state.checkpoints.insert(
            "p".to_string(),
            Checkpoint {
                end_cursor: Some("abc".to_string()),
                fetched_count: 2,
            },
        );
        let fetcher = ScriptedFetcher::new(vec![Ok(page(vec![], None, false))]);
        let mut driver = CrawlDriver::new(fetcher, store);
        driver.run("p").await.unwrap();

        assert_eq!(
            *driver.fetcher.calls.borrow(),
            vec![Some("abc".to_string())]
        );
    }

    #[tokio::test]
    async fn transient_failure_retries_then_succeeds() {
        let fetcher = ScriptedFetcher::new(vec![
            Err(FetchError::transient("http 502")),
            Ok(page(vec![record("1", 5)], None, false)),
        ]);
        let mut driver =
            CrawlDriver::new(fetcher, MemStore::default()).with_retry_policy(fast_retry(3));

        let summary = driver.run("p").await.unwrap();

        assert_eq!(summary.fetched_total, 1);
        assert_eq!(driver.fetcher.call_count(), 2);
        // Both attempts target the same page.
        assert_eq!(*driver.fetcher.calls.borrow(), vec![None, None]);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_hint_overrides_the_policy_delay() {
        let fetcher = ScriptedFetcher::new(vec![
            Err(FetchError::Transient {
                reason: "rate limit nearly exhausted".to_string(),
                retry_after: Some(Duration::from_millis(50)),
            }),
            Ok(page(vec![record("1", 1)], None, false)),
        ]);
        // The policy alone would park the driver for a minute; the
        // server-supplied reset hint must win.
        let policy = RetryPolicy::new(3, Duration::from_secs(60), Duration::from_secs(60));
        let mut driver = CrawlDriver::new(fetcher, MemStore::default()).with_retry_policy(policy);

        let started = tokio::time::Instant::now();
        let summary = driver.run("p").await.unwrap();
        let waited = started.elapsed();

        assert_eq!(summary.fetched_total, 1);
        assert_eq!(driver.fetcher.call_count(), 2);
        assert!(waited >= Duration::from_millis(50), "waited {waited:?}");
        assert!(waited < Duration::from_secs(60), "waited {waited:?}");
    }

    #[tokio::test]
    async fn transient_failures_exhaust_retry_budget() {
        let fetcher = ScriptedFetcher::new(vec![
            Err(FetchError::transient("http 502")),
            Err(FetchError::transient("http 503")),
        ]);
        let mut driver =
            CrawlDriver::new(fetcher, MemStore::default()).with_retry_policy(fast_retry(2));

        let err = driver.run("p").await.unwrap_err();

        assert!(matches!(
            err,
            CrawlError::RetriesExhausted { attempts: 2, .. }
        ));
        assert!(driver.store().state.checkpoints.is_empty());
    }

    #[tokio::test]
    async fn fatal_failure_aborts_without_retry() {
        let fetcher = ScriptedFetcher::new(vec![Err(FetchError::fatal("auth rejected"))]);
        let mut driver =
            CrawlDriver::new(fetcher, MemStore::default()).with_retry_policy(fast_retry(5));

        let err = driver.run("p").await.unwrap_err();

        assert!(matches!(err, CrawlError::Fetch { .. }));
        assert_eq!(driver.fetcher.call_count(), 1);
        assert!(driver.store().state.checkpoints.is_empty());
    }

    #[tokio::test]
    async fn commit_failure_leaves_prior_checkpoint_intact() {
        let mut store = MemStore::default();
        store.state.checkpoints.insert(
            "p".to_string(),
            Checkpoint {
                end_cursor: Some("abc".to_string()),
                fetched_count: 2,
            },
        );
        store.fail_next_commits = 1;

        let fetcher = ScriptedFetcher::new(vec![Ok(page(
            vec![record("3", 30)],
            Some("def"),
            true,
        ))]);
        let mut driver = CrawlDriver::new(fetcher, store);

        let err = driver.run("p").await.unwrap_err();
        assert!(matches!(err, CrawlError::CommitPage { .. }));

        // Pre-page value survives: a re-run fetches the same page again.
        let state = &driver.store().state;
        assert!(state.repos.is_empty());
        assert_eq!(
            state.checkpoints["p"],
            Checkpoint {
                end_cursor: Some("abc".to_string()),
                fetched_count: 2,
            }
        );
    }

    #[tokio::test]
    async fn interrupted_run_resumes_to_the_same_final_state() {
        let page_one = page(vec![record("1", 10), record("2", 20)], Some("abc"), true);
        let page_two = page(vec![record("3", 30)], Some("def"), false);

        // Uninterrupted reference run.
        let fetcher = ScriptedFetcher::new(vec![Ok(page_one.clone()), Ok(page_two.clone())]);
        let mut reference = CrawlDriver::new(fetcher, MemStore::default());
        reference.run("p").await.unwrap();

        // Interrupted run: fatal failure after the first committed page.
        let fetcher = ScriptedFetcher::new(vec![
            Ok(page_one),
            Err(FetchError::fatal("connection dropped")),
        ]);
        let mut interrupted = CrawlDriver::new(fetcher, MemStore::default());
        interrupted.run("p").await.unwrap_err();

        let store = MemStore {
            state: interrupted.store().state.clone(),
            fail_next_commits: 0,
        };
        let fetcher = ScriptedFetcher::new(vec![Ok(page_two)]);
        let mut resumed = CrawlDriver::new(fetcher, store);
        let summary = resumed.run("p").await.unwrap();

        assert_eq!(summary.fetched_total, 3);
        assert_eq!(resumed.store().state, reference.store().state);
        assert_eq!(
            *resumed.fetcher.calls.borrow(),
            vec![Some("abc".to_string())]
        );
    }

    #[tokio::test]
    async fn reprocessing_a_page_is_idempotent_for_snapshots() {
        let page_one = page(vec![record("1", 10)], Some("abc"), true);

        // A re-fetch of an already-seen page (stale checkpoint handed to
        // a fresh run) must not corrupt the snapshot table.
        let fetcher = ScriptedFetcher::new(vec![
            Ok(page_one.clone()),
            Ok(page_one),
            Ok(page(vec![], None, false)),
        ]);
        let mut driver = CrawlDriver::new(fetcher, MemStore::default());
        driver.run("p").await.unwrap();

        let state = &driver.store().state;
        assert_eq!(state.repos.len(), 1);
        // History tolerates duplicates; it is append-only.
        assert_eq!(state.history.len(), 2);
    }

    #[tokio::test]
    async fn record_cap_stops_at_the_loop_boundary() {
        let fetcher = ScriptedFetcher::new(vec![Ok(page(
            vec![record("1", 1), record("2", 2)],
            Some("abc"),
            true,
        ))]);
        let mut driver = CrawlDriver::new(fetcher, MemStore::default()).with_record_cap(2);

        let summary = driver.run("p").await.unwrap();

        assert_eq!(summary.fetched_total, 2);
        assert_eq!(driver.fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn cap_already_met_skips_fetching_entirely() {
        let mut store = MemStore::default();
        store.state.checkpoints.insert(
            "p".to_string(),
            Checkpoint {
                end_cursor: Some("abc".to_string()),
                fetched_count: 5,
            },
        );
        let fetcher = ScriptedFetcher::new(vec![]);
        let mut driver = CrawlDriver::new(fetcher, store).with_record_cap(5);

        let summary = driver.run("p").await.unwrap();

        assert_eq!(summary.fetched_total, 5);
        assert_eq!(driver.fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn cancellation_is_honored_between_pages() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut fetcher = ScriptedFetcher::new(vec![Ok(page(
            vec![record("1", 1)],
            Some("abc"),
            true,
        ))]);
        fetcher.cancel_on_fetch = Some(flag.clone());

        let mut driver = CrawlDriver::new(fetcher, MemStore::default()).with_cancel_flag(flag);

        let summary = driver.run("p").await.unwrap();

        // The in-flight page is committed; the next fetch never starts.
        assert!(summary.cancelled);
        assert_eq!(summary.fetched_total, 1);
        assert_eq!(driver.fetcher.call_count(), 1);
        assert_eq!(
            driver.store().state.checkpoints["p"],
            Checkpoint {
                end_cursor: Some("abc".to_string()),
                fetched_count: 1,
            }
        );
    }
}
