use std::env;
use std::num::ParseIntError;

use chrono::{Days, Utc};
use thiserror::Error;

use crate::crawl::plan::{window_partitions, PartitionPlan};

const DEFAULT_PAGE_SIZE: i64 = 100;
const DEFAULT_MAX_ATTEMPTS: u32 = 6;
const DEFAULT_LOOKBACK_DAYS: u64 = 365 * 5;
const DEFAULT_WINDOW_DAYS: u32 = 7;

/// One run's configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub database_url: String,
    pub github_token: String,
    pub partitions: Vec<PartitionPlan>,
    pub page_size: i64,
    pub max_per_partition: Option<i64>,
    pub max_attempts: u32,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required env var {name}")]
    MissingVar { name: &'static str },

    #[error("Invalid integer in env var {name}: {source}")]
    InvalidNumber {
        name: &'static str,
        source: ParseIntError,
    },

    #[error("No partitions configured: set CRAWL_QUERIES or CRAWL_BASE_QUERY")]
    NoPartitions,
}

impl CrawlConfig {
    /// Reads configuration from the environment (`.env` honored via
    /// dotenvy). Partitions come from `CRAWL_QUERIES` (semicolon-
    /// separated search expressions) or, absent that, from weekly
    /// created-date windows over `CRAWL_BASE_QUERY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let database_url = require_var("DATABASE_URL")?;
        let github_token = require_var("GITHUB_TOKEN")?;

        let partitions = match env::var("CRAWL_QUERIES") {
            Ok(raw) => parse_query_list(&raw),
            Err(_) => match env::var("CRAWL_BASE_QUERY") {
                Ok(base) => {
                    let lookback_days =
                        parse_var("CRAWL_LOOKBACK_DAYS")?.unwrap_or(DEFAULT_LOOKBACK_DAYS);
                    let window_days = parse_var::<u32>("CRAWL_WINDOW_DAYS")?
                        .unwrap_or(DEFAULT_WINDOW_DAYS);
                    let end = Utc::now().date_naive();
                    let start = end
                        .checked_sub_days(Days::new(lookback_days))
                        .unwrap_or(end);
                    window_partitions(&base, start, end, window_days)
                }
                Err(_) => Vec::new(),
            },
        };
        if partitions.is_empty() {
            return Err(ConfigError::NoPartitions);
        }

        Ok(Self {
            database_url,
            github_token,
            partitions,
            page_size: parse_var("CRAWL_PAGE_SIZE")?.unwrap_or(DEFAULT_PAGE_SIZE),
            max_per_partition: parse_var("CRAWL_MAX_PER_PARTITION")?,
            max_attempts: parse_var("CRAWL_MAX_ATTEMPTS")?.unwrap_or(DEFAULT_MAX_ATTEMPTS),
        })
    }
}

fn require_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar { name })
}

fn parse_var<T: std::str::FromStr<Err = ParseIntError>>(
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|source| ConfigError::InvalidNumber { name, source }),
        Err(_) => Ok(None),
    }
}

/// Splits a semicolon-separated list of search expressions into
/// explicit partitions; blanks are dropped.
pub fn parse_query_list(raw: &str) -> Vec<PartitionPlan> {
    raw.split(';')
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(PartitionPlan::from_query)
        .collect()
}
