use std::collections::VecDeque;
use std::process::ExitCode;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use projects_crawler::config::{ConfigError, CrawlConfig};
use projects_crawler::crawl::plan::{PartitionPlan, SEARCH_RESULT_CEILING};
use projects_crawler::crawl::{CrawlDriver, GitHubPageFetcher, RetryPolicy};
use projects_crawler::db::store::PgCrawlStore;
use projects_crawler::db::{build_pool, BuildPoolError};

#[derive(Debug, Error)]
enum MainError {
    #[error("TracingInit: {source}")]
    TracingInit {
        #[source]
        source: utils_trace::TracingInitError,
    },
    #[error("Config: {source}")]
    Config {
        #[source]
        source: ConfigError,
    },
    #[error("BuildPool: {source}")]
    BuildPool {
        #[source]
        source: BuildPoolError,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => {
            // Startup failures count as total failure.
            eprintln!("startup error: {err}");
            ExitCode::from(2)
        }
    }
}

async fn run() -> Result<ExitCode, MainError> {
    utils_trace::init("info").map_err(|source| MainError::TracingInit { source })?;

    let config = CrawlConfig::from_env().map_err(|source| MainError::Config { source })?;
    let pool = build_pool(&config.database_url)
        .map_err(|source| MainError::BuildPool { source })?;

    let retry = RetryPolicy::new(
        config.max_attempts,
        Duration::from_secs(2),
        Duration::from_secs(60),
    );

    info!(partitions = config.partitions.len(), "starting crawl run");

    let mut queue: VecDeque<PartitionPlan> = config.partitions.clone().into();
    let mut done = 0usize;
    let mut failed = 0usize;
    while let Some(plan) = queue.pop_front() {
        let fetcher = GitHubPageFetcher::new(
            config.github_token.clone(),
            plan.search_query.clone(),
            config.page_size,
        );

        // Multi-day windows can overrun the 1000-result search ceiling;
        // probe the hit count and fall back to daily windows when one does.
        if plan.is_narrowable() {
            match fetcher.repository_count(&plan.search_query).await {
                Ok(count) if count > SEARCH_RESULT_CEILING => {
                    if let Some(days) = plan.narrow_to_days() {
                        info!(
                            partition = plan.partition_key.as_str(),
                            count, "window exceeds search ceiling, splitting into days"
                        );
                        for day in days.into_iter().rev() {
                            queue.push_front(day);
                        }
                        continue;
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(
                        partition = plan.partition_key.as_str(),
                        "count probe failed, crawling window unsplit: {err}"
                    );
                }
            }
        }

        let store = PgCrawlStore::new(pool.clone());
        let mut driver =
            CrawlDriver::new(fetcher, store).with_retry_policy(retry.clone());
        if let Some(cap) = config.max_per_partition {
            driver = driver.with_record_cap(cap);
        }

        match driver.run(&plan.partition_key).await {
            Ok(summary) => {
                done += 1;
                info!(
                    partition = plan.partition_key.as_str(),
                    fetched_total = summary.fetched_total,
                    pages = summary.pages,
                    "partition done"
                );
            }
            Err(err) => {
                failed += 1;
                error!(
                    partition = plan.partition_key.as_str(),
                    "partition failed: {err}"
                );
            }
        }
    }

    let total = done + failed;
    info!(total, failed, "crawl run finished");

    // 0 = all partitions done, 1 = some failed, 2 = all failed.
    Ok(match failed {
        0 => ExitCode::SUCCESS,
        n if n == total => ExitCode::from(2),
        _ => ExitCode::from(1),
    })
}
