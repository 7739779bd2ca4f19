use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use url::Url;

use super::{BranchHead, Oid, RemoteRepo, TreeItem};
use crate::error::CommitError;
use crate::graphql::{
    BranchData, BranchVariables, CreateBlobData, CreateBlobVariables, CreateCommitData,
    CreateCommitVariables, CreateTreeData, CreateTreeVariables, GraphQlRequest, GraphQlResponse,
    UpdateRefData, UpdateRefVariables, BRANCH_QUERY, CREATE_BLOB_MUTATION, CREATE_COMMIT_MUTATION,
    CREATE_TREE_MUTATION, UPDATE_REF_MUTATION,
};

pub const DEFAULT_GRAPHQL_ENDPOINT: &str = "https://api.github.com/graphql";

const USER_AGENT: &str = concat!("ghcommit/", env!("CARGO_PKG_VERSION"));

pub struct GraphQlRemoteRepo {
    pub endpoint: Url,
    token: String,
    client: reqwest::Client,
}

impl GraphQlRemoteRepo {
    pub fn new(endpoint: &str, token: &str) -> Result<Self, CommitError> {
        let endpoint =
            Url::parse(endpoint).map_err(|_| CommitError::InvalidEndpoint(endpoint.to_string()))?;

        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;

        Ok(Self {
            endpoint,
            token: token.to_string(),
            client,
        })
    }

    async fn execute<V, T>(&self, query: &str, variables: V) -> Result<T, CommitError>
    where
        V: Serialize,
        T: DeserializeOwned,
    {
        let request = GraphQlRequest {
            query: query.to_string(),
            variables,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(CommitError::Unauthorized(format!("{status}: {body}")));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CommitError::Transport(format!("{status}: {body}")));
        }

        let envelope: GraphQlResponse = response.json().await?;

        envelope.into_result()
    }
}

impl Debug for GraphQlRemoteRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GraphQlRemoteRepo({})", self.endpoint)
    }
}

#[async_trait]
impl RemoteRepo for GraphQlRemoteRepo {
    #[tracing::instrument]
    async fn resolve_branch(
        &self,
        owner: &str,
        name: &str,
        qualified_ref: &str,
    ) -> Result<BranchHead, CommitError> {
        let variables = BranchVariables {
            owner: owner.to_string(),
            name: name.to_string(),
            branch_name: qualified_ref.to_string(),
        };

        let data: BranchData = self.execute(BRANCH_QUERY, variables).await?;

        data.into_branch_head(owner, name, qualified_ref)
    }

    #[tracing::instrument(skip(content), fields(len = content.len()))]
    async fn create_blob(&self, repository_id: &str, content: &[u8]) -> Result<Oid, CommitError> {
        let variables = CreateBlobVariables {
            repository_id: repository_id.to_string(),
            content: base64::encode(content),
        };

        let data: CreateBlobData = self.execute(CREATE_BLOB_MUTATION, variables).await?;

        Ok(data.create_blob.blob.oid)
    }

    #[tracing::instrument(skip(items), fields(items = items.len()))]
    async fn create_tree(
        &self,
        repository_id: &str,
        base_tree: &Oid,
        items: &[TreeItem],
    ) -> Result<Oid, CommitError> {
        let variables = CreateTreeVariables {
            repository_id: repository_id.to_string(),
            base_tree: base_tree.clone(),
            tree_items: items.to_vec(),
        };

        let data: CreateTreeData = self.execute(CREATE_TREE_MUTATION, variables).await?;

        Ok(data.create_tree.tree.oid)
    }

    #[tracing::instrument(skip(message))]
    async fn create_commit(
        &self,
        repository_id: &str,
        message: &str,
        tree: &Oid,
        parents: &[Oid],
    ) -> Result<Oid, CommitError> {
        let variables = CreateCommitVariables {
            repository_id: repository_id.to_string(),
            message: message.to_string(),
            tree_sha: tree.clone(),
            parent_shas: parents.to_vec(),
        };

        let data: CreateCommitData = self.execute(CREATE_COMMIT_MUTATION, variables).await?;

        Ok(data.create_commit.commit.oid)
    }

    #[tracing::instrument]
    async fn update_ref(
        &self,
        repository_id: &str,
        qualified_ref: &str,
        oid: &Oid,
        force: bool,
    ) -> Result<String, CommitError> {
        let variables = UpdateRefVariables {
            repository_id: repository_id.to_string(),
            git_ref: qualified_ref.to_string(),
            commit_sha: oid.clone(),
            force,
        };

        let data: UpdateRefData = self.execute(UPDATE_REF_MUTATION, variables).await?;

        Ok(data.update_ref.git_ref.name)
    }
}
