pub mod driver;
pub mod fetch;
pub mod plan;
pub mod retry;
pub mod types;

pub use driver::{CrawlDriver, CrawlError, CrawlStore, CrawlSummary, StoreError};
pub use fetch::{FetchError, GitHubPageFetcher, PageFetcher};
pub use retry::RetryPolicy;
pub use types::{Checkpoint, RepoPage, RepoRecord};
