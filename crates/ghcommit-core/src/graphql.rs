use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::CommitError;
use crate::git::{BranchHead, Oid, TreeItem};

pub const BRANCH_QUERY: &str = r#"
query ($owner: String!, $name: String!, $branchName: String!) {
  repository(owner: $owner, name: $name) {
    id
    ref(qualifiedName: $branchName) {
      target {
        ... on Commit {
          oid
          tree {
            oid
          }
        }
      }
    }
  }
}
"#;

pub const CREATE_BLOB_MUTATION: &str = r#"
mutation ($repositoryId: ID!, $content: Base64String!) {
  createBlob(input: {repositoryId: $repositoryId, content: $content, encoding: BASE64}) {
    blob {
      oid
    }
  }
}
"#;

pub const CREATE_TREE_MUTATION: &str = r#"
mutation ($repositoryId: ID!, $baseTree: String!, $treeItems: [TreeItemInput!]!) {
  createTree(input: {repositoryId: $repositoryId, baseTree: $baseTree, tree: $treeItems}) {
    tree {
      oid
    }
  }
}
"#;

pub const CREATE_COMMIT_MUTATION: &str = r#"
mutation ($repositoryId: ID!, $message: String!, $treeSha: String!, $parentShas: [String!]!) {
  createCommit(input: {repositoryId: $repositoryId, message: $message, tree: $treeSha, parents: $parentShas}) {
    commit {
      oid
    }
  }
}
"#;

pub const UPDATE_REF_MUTATION: &str = r#"
mutation ($repositoryId: ID!, $ref: String!, $commitSha: String!, $force: Boolean!) {
  updateRef(input: {repositoryId: $repositoryId, ref: $ref, oid: $commitSha, force: $force}) {
    ref {
      name
    }
  }
}
"#;

#[derive(Debug, Serialize, Deserialize)]
pub struct GraphQlRequest<V> {
    pub query: String,
    pub variables: V,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlResponse {
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQlError {
    pub message: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl GraphQlResponse {
    /// Errors win over data: a failed mutation comes back with its field set to
    /// null next to `errors`, so `data` is only decoded once `errors` is empty.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T, CommitError> {
        if !self.errors.is_empty() {
            return Err(classify_errors(&self.errors));
        }

        match self.data {
            None | Some(Value::Null) => Err(CommitError::Decode(
                "response carried neither data nor errors".to_string(),
            )),
            Some(data) => {
                serde_json::from_value(data).map_err(|err| CommitError::Decode(err.to_string()))
            }
        }
    }
}

pub fn classify_errors(errors: &[GraphQlError]) -> CommitError {
    let message = errors
        .iter()
        .map(|error| error.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");

    match errors.first().and_then(|error| error.kind.as_deref()) {
        Some("NOT_FOUND") => CommitError::NotFound(message),
        Some("FORBIDDEN") | Some("UNAUTHORIZED") => CommitError::Unauthorized(message),
        _ => CommitError::Validation(message),
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchVariables {
    pub owner: String,
    pub name: String,
    pub branch_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBlobVariables {
    pub repository_id: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTreeVariables {
    pub repository_id: String,
    pub base_tree: Oid,
    pub tree_items: Vec<TreeItem>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommitVariables {
    pub repository_id: String,
    pub message: String,
    pub tree_sha: Oid,
    pub parent_shas: Vec<Oid>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRefVariables {
    pub repository_id: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub commit_sha: Oid,
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct BranchData {
    pub repository: Option<RepositoryNode>,
}

#[derive(Debug, Deserialize)]
pub struct RepositoryNode {
    pub id: String,
    #[serde(rename = "ref")]
    pub git_ref: Option<RefNode>,
}

#[derive(Debug, Deserialize)]
pub struct RefNode {
    pub target: Option<CommitNode>,
}

// `... on Commit` yields an empty object when the ref targets a tag or tree.
#[derive(Debug, Deserialize)]
pub struct CommitNode {
    pub oid: Option<Oid>,
    pub tree: Option<OidNode>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OidNode {
    pub oid: Oid,
}

impl BranchData {
    pub fn into_branch_head(
        self,
        owner: &str,
        name: &str,
        qualified_ref: &str,
    ) -> Result<BranchHead, CommitError> {
        let repository = self.repository.ok_or_else(|| {
            CommitError::NotFound(format!("repository {owner}/{name}"))
        })?;

        let target = repository
            .git_ref
            .and_then(|git_ref| git_ref.target)
            .ok_or_else(|| CommitError::NotFound(format!("ref {qualified_ref}")))?;

        match (target.oid, target.tree) {
            (Some(commit_oid), Some(tree)) => Ok(BranchHead {
                repository_id: repository.id,
                commit_oid,
                tree_oid: tree.oid,
            }),
            _ => Err(CommitError::Validation(format!(
                "{qualified_ref} does not point at a commit"
            ))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBlobData {
    pub create_blob: BlobPayload,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlobPayload {
    pub blob: OidNode,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTreeData {
    pub create_tree: TreePayload,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TreePayload {
    pub tree: OidNode,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommitData {
    pub create_commit: CommitPayload,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommitPayload {
    pub commit: OidNode,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRefData {
    pub update_ref: UpdateRefPayload,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateRefPayload {
    #[serde(rename = "ref")]
    pub git_ref: NameNode,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NameNode {
    pub name: String,
}
