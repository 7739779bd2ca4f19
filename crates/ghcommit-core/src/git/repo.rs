use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

use crate::error::CommitError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Oid(String);

impl Oid {
    pub fn new(oid: impl Into<String>) -> Self {
        Self(oid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Oid {
    fn from(oid: &str) -> Self {
        Self::new(oid)
    }
}

/// Where a branch stood when it was resolved: the tip commit and its root tree,
/// plus the node id of the repository that owns them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchHead {
    pub repository_id: String,
    pub commit_oid: Oid,
    pub tree_oid: Oid,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobEntry {
    pub path: String,
    pub oid: Oid,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileMode {
    #[serde(rename = "100644")]
    Regular,
}

impl FileMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileMode::Regular => "100644",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    #[serde(rename = "blob")]
    Blob,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeItem {
    pub path: String,
    pub mode: FileMode,
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    pub sha: Oid,
}

impl TreeItem {
    pub fn blob(path: &str, oid: Oid) -> Self {
        Self {
            path: path.to_string(),
            mode: FileMode::Regular,
            kind: ObjectKind::Blob,
            sha: oid,
        }
    }
}

impl From<&BlobEntry> for TreeItem {
    fn from(entry: &BlobEntry) -> Self {
        TreeItem::blob(&entry.path, entry.oid.clone())
    }
}

pub fn qualified_branch_ref(branch: &str) -> String {
    if branch.starts_with("refs/") {
        branch.to_string()
    } else {
        format!("refs/heads/{branch}")
    }
}

/// The object store a commit is assembled in. Every operation is a single
/// round trip; nothing is cached between calls.
#[async_trait]
pub trait RemoteRepo: Debug + Send + Sync {
    async fn resolve_branch(
        &self,
        owner: &str,
        name: &str,
        qualified_ref: &str,
    ) -> Result<BranchHead, CommitError>;

    async fn create_blob(&self, repository_id: &str, content: &[u8]) -> Result<Oid, CommitError>;

    async fn create_tree(
        &self,
        repository_id: &str,
        base_tree: &Oid,
        items: &[TreeItem],
    ) -> Result<Oid, CommitError>;

    async fn create_commit(
        &self,
        repository_id: &str,
        message: &str,
        tree: &Oid,
        parents: &[Oid],
    ) -> Result<Oid, CommitError>;

    async fn update_ref(
        &self,
        repository_id: &str,
        qualified_ref: &str,
        oid: &Oid,
        force: bool,
    ) -> Result<String, CommitError>;
}
