pub mod index;

pub use index::{
    fetch_search_page, FetchSearchPageError, GitHubGraphQLResult, GraphQLEnvelope,
};
