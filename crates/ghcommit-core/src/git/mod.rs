pub mod memory;
pub mod remote;
mod repo;

pub use memory::{MemoryCommit, MemoryRemoteRepo, ObjectCounts};
pub use remote::{GraphQlRemoteRepo, DEFAULT_GRAPHQL_ENDPOINT};
pub use repo::{
    qualified_branch_ref, BlobEntry, BranchHead, FileMode, ObjectKind, Oid, RemoteRepo, TreeItem,
};
