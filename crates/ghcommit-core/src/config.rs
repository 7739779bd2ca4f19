use std::{fmt, str::FromStr};

use crate::error::CommitError;
use crate::git::DEFAULT_GRAPHQL_ENDPOINT;

pub const BRANCH_NAME_VAR: &str = "GITHUB_BRANCH_NAME";
pub const COMMIT_MESSAGE_VAR: &str = "GITHUB_COMMIT_MESSAGE";
pub const TOKEN_VAR: &str = "GITHUB_TOKEN";
pub const REPOSITORY_VAR: &str = "GITHUB_REPOSITORY";
pub const GRAPHQL_URL_VAR: &str = "GITHUB_GRAPHQL_URL";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepositorySlug {
    pub owner: String,
    pub name: String,
}

impl FromStr for RepositorySlug {
    type Err = CommitError;

    fn from_str(slug: &str) -> Result<Self, Self::Err> {
        match slug.split('/').collect::<Vec<_>>()[..] {
            [owner, name] if !owner.is_empty() && !name.is_empty() => Ok(Self {
                owner: owner.to_string(),
                name: name.to_string(),
            }),
            _ => Err(CommitError::InvalidRepository(slug.to_string())),
        }
    }
}

impl fmt::Display for RepositorySlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Clone)]
pub struct CommitConfig {
    pub branch: String,
    pub message: String,
    pub token: String,
    pub repository: RepositorySlug,
    pub endpoint: String,
}

impl CommitConfig {
    pub fn from_env() -> Result<Self, CommitError> {
        Self::from_vars(|key| dotenvy::var(key).ok())
    }

    pub fn from_vars<F>(lookup: F) -> Result<Self, CommitError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required =
            |key: &str| lookup(key).ok_or_else(|| CommitError::MissingConfig(key.to_string()));

        let branch = required(BRANCH_NAME_VAR)?;
        let message = required(COMMIT_MESSAGE_VAR)?;
        let token = required(TOKEN_VAR)?;
        let repository = required(REPOSITORY_VAR)?.parse()?;
        let endpoint = lookup(GRAPHQL_URL_VAR)
            .filter(|endpoint| !endpoint.is_empty())
            .unwrap_or_else(|| DEFAULT_GRAPHQL_ENDPOINT.to_string());

        Ok(Self {
            branch,
            message,
            token,
            repository,
            endpoint,
        })
    }
}

impl fmt::Debug for CommitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitConfig")
            .field("branch", &self.branch)
            .field("message", &self.message)
            .field("token", &"<redacted>")
            .field("repository", &self.repository)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}
