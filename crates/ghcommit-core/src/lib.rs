pub mod commit;
pub mod config;
pub mod error;
pub mod git;
pub mod graphql;

pub use commit::{parse_file_list, CommitBuilder, CommitOutcome, CommitRequest};
pub use config::{CommitConfig, RepositorySlug};
pub use error::CommitError;
