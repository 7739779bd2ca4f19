use futures::future::try_join_all;
use std::{collections::HashSet, path::PathBuf, sync::Arc};

use crate::config::CommitConfig;
use crate::error::CommitError;
use crate::git::{qualified_branch_ref, BlobEntry, BranchHead, Oid, RemoteRepo, TreeItem};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitRequest {
    pub owner: String,
    pub name: String,
    pub branch: String,
    pub message: String,
    pub files: Vec<String>,
}

impl CommitRequest {
    pub fn new(config: &CommitConfig, files: Vec<String>) -> Self {
        Self {
            owner: config.repository.owner.clone(),
            name: config.repository.name.clone(),
            branch: config.branch.clone(),
            message: config.message.clone(),
            files,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitOutcome {
    pub previous_commit: Oid,
    pub commit: Oid,
    pub tree: Oid,
    pub blobs: Vec<BlobEntry>,
    pub ref_name: String,
}

/// Parses the file list handed to the binary: a JSON array of path strings.
pub fn parse_file_list(json: &str) -> Result<Vec<String>, CommitError> {
    serde_json::from_str(json).map_err(|err| CommitError::InvalidFileList(err.to_string()))
}

fn check_files(files: &[String]) -> Result<(), CommitError> {
    if files.is_empty() {
        return Err(CommitError::NoFiles);
    }

    let mut seen = HashSet::new();
    for path in files {
        if !seen.insert(path.as_str()) {
            return Err(CommitError::DuplicatePath(path.clone()));
        }
    }

    Ok(())
}

/// Builds a commit out of local files entirely through remote object calls:
/// resolve the branch, upload blobs, create a tree on top of the branch's tree,
/// create a commit, then force the branch onto it.
///
/// Nothing is rolled back on failure. Objects created before the failing step
/// stay in the remote store unreferenced.
#[derive(Debug)]
pub struct CommitBuilder {
    pub repo: Arc<dyn RemoteRepo>,
    pub working_dir: PathBuf,
}

impl CommitBuilder {
    pub fn new(repo: Arc<dyn RemoteRepo>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo,
            working_dir: working_dir.into(),
        }
    }

    #[tracing::instrument(name = "commit::run", skip_all, fields(branch = %request.branch, files = request.files.len()))]
    pub async fn run(&self, request: &CommitRequest) -> Result<CommitOutcome, CommitError> {
        check_files(&request.files)?;

        let head = self.resolve_branch(request).await?;
        let blobs = self.upload_blobs(&head, &request.files).await?;
        let tree = self.build_tree(&head, &blobs).await?;
        let commit = self.create_commit(&head, &request.message, &tree).await?;
        let ref_name = self.update_branch(&head, &request.branch, &commit).await?;

        Ok(CommitOutcome {
            previous_commit: head.commit_oid,
            commit,
            tree,
            blobs,
            ref_name,
        })
    }

    pub async fn resolve_branch(&self, request: &CommitRequest) -> Result<BranchHead, CommitError> {
        let head = self
            .repo
            .resolve_branch(
                &request.owner,
                &request.name,
                &qualified_branch_ref(&request.branch),
            )
            .await?;

        tracing::info!(
            "resolved branch {} at commit {} tree {}",
            request.branch,
            head.commit_oid,
            head.tree_oid
        );

        Ok(head)
    }

    /// Uploads every file concurrently. The first failure fails the whole batch;
    /// uploads still in flight are dropped.
    pub async fn upload_blobs(
        &self,
        head: &BranchHead,
        files: &[String],
    ) -> Result<Vec<BlobEntry>, CommitError> {
        let uploads = files
            .iter()
            .map(|path| self.upload_blob(&head.repository_id, path));

        let blobs = try_join_all(uploads).await?;

        tracing::info!("uploaded {} blobs", blobs.len());

        Ok(blobs)
    }

    async fn upload_blob(&self, repository_id: &str, path: &str) -> Result<BlobEntry, CommitError> {
        let contents = tokio::fs::read_to_string(self.working_dir.join(path))
            .await
            .map_err(|source| CommitError::LocalRead {
                path: path.to_string(),
                source,
            })?;

        let oid = self
            .repo
            .create_blob(repository_id, contents.as_bytes())
            .await?;

        tracing::debug!("uploaded {} as blob {}", path, oid);

        Ok(BlobEntry {
            path: path.to_string(),
            oid,
        })
    }

    pub async fn build_tree(
        &self,
        head: &BranchHead,
        blobs: &[BlobEntry],
    ) -> Result<Oid, CommitError> {
        let items: Vec<TreeItem> = blobs.iter().map(TreeItem::from).collect();

        let tree = self
            .repo
            .create_tree(&head.repository_id, &head.tree_oid, &items)
            .await?;

        tracing::info!("created tree {} on base tree {}", tree, head.tree_oid);

        Ok(tree)
    }

    pub async fn create_commit(
        &self,
        head: &BranchHead,
        message: &str,
        tree: &Oid,
    ) -> Result<Oid, CommitError> {
        let commit = self
            .repo
            .create_commit(
                &head.repository_id,
                message,
                tree,
                std::slice::from_ref(&head.commit_oid),
            )
            .await?;

        tracing::info!("created commit {} with parent {}", commit, head.commit_oid);

        Ok(commit)
    }

    pub async fn update_branch(
        &self,
        head: &BranchHead,
        branch: &str,
        commit: &Oid,
    ) -> Result<String, CommitError> {
        let ref_name = self
            .repo
            .update_ref(
                &head.repository_id,
                &qualified_branch_ref(branch),
                commit,
                true,
            )
            .await?;

        tracing::info!("moved {} to {}", ref_name, commit);

        Ok(ref_name)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::{fs, time::Duration};
    use tokio::sync::Barrier;

    use super::*;
    use crate::git::MemoryRemoteRepo;
    use crate::test::{
        get_commit_request_fixture, get_memory_repo_fixture, get_working_dir_fixture,
        FIXTURE_BRANCH, FIXTURE_README,
    };

    fn builder(repo: &Arc<MemoryRemoteRepo>, working_dir: &tempfile::TempDir) -> CommitBuilder {
        let repo: Arc<dyn RemoteRepo> = Arc::clone(repo) as Arc<dyn RemoteRepo>;
        CommitBuilder::new(repo, working_dir.path())
    }

    // Every blob upload parks until all of them have arrived, so uploads only
    // complete when they are all in flight at once.
    #[derive(Debug)]
    struct RendezvousRepo {
        barrier: Barrier,
    }

    #[async_trait]
    impl RemoteRepo for RendezvousRepo {
        async fn resolve_branch(
            &self,
            _owner: &str,
            _name: &str,
            _qualified_ref: &str,
        ) -> Result<BranchHead, CommitError> {
            Err(CommitError::Validation("not used".to_string()))
        }

        async fn create_blob(
            &self,
            _repository_id: &str,
            content: &[u8],
        ) -> Result<Oid, CommitError> {
            self.barrier.wait().await;
            Ok(Oid::new(String::from_utf8_lossy(content)))
        }

        async fn create_tree(
            &self,
            _repository_id: &str,
            _base_tree: &Oid,
            _items: &[TreeItem],
        ) -> Result<Oid, CommitError> {
            Err(CommitError::Validation("not used".to_string()))
        }

        async fn create_commit(
            &self,
            _repository_id: &str,
            _message: &str,
            _tree: &Oid,
            _parents: &[Oid],
        ) -> Result<Oid, CommitError> {
            Err(CommitError::Validation("not used".to_string()))
        }

        async fn update_ref(
            &self,
            _repository_id: &str,
            _qualified_ref: &str,
            _oid: &Oid,
            _force: bool,
        ) -> Result<String, CommitError> {
            Err(CommitError::Validation("not used".to_string()))
        }
    }

    #[tokio::test]
    async fn test_uploads_are_in_flight_together() {
        let working_dir =
            get_working_dir_fixture(&[("a.txt", "a"), ("b.txt", "b"), ("c/d.txt", "d")]);
        let files: Vec<String> = ["a.txt", "b.txt", "c/d.txt"]
            .iter()
            .map(|path| path.to_string())
            .collect();

        let repo: Arc<dyn RemoteRepo> = Arc::new(RendezvousRepo {
            barrier: Barrier::new(files.len()),
        });
        let builder = CommitBuilder::new(repo, working_dir.path());
        let head = BranchHead {
            repository_id: "R_1".to_string(),
            commit_oid: Oid::from("c0"),
            tree_oid: Oid::from("t0"),
        };

        let blobs = tokio::time::timeout(
            Duration::from_secs(5),
            builder.upload_blobs(&head, &files),
        )
        .await
        .expect("blob uploads did not overlap")
        .unwrap();

        let oids: Vec<&str> = blobs.iter().map(|blob| blob.oid.as_str()).collect();
        assert_eq!(oids, vec!["a", "b", "d"]);
    }

    #[test]
    fn test_parse_file_list() {
        assert_eq!(
            parse_file_list(r#"["README.md","src/a.txt"]"#).unwrap(),
            vec!["README.md".to_string(), "src/a.txt".to_string()]
        );

        for invalid in ["", "README.md", r#"{"path":"a"}"#, "[1, 2]"] {
            assert!(
                matches!(parse_file_list(invalid), Err(CommitError::InvalidFileList(_))),
                "{invalid}"
            );
        }
    }

    #[tokio::test]
    async fn test_run_commits_files_onto_branch() -> anyhow::Result<()> {
        let repo = Arc::new(get_memory_repo_fixture());
        let previous = repo.branch_head(FIXTURE_BRANCH).unwrap();
        let working_dir = get_working_dir_fixture(&[("src/a.txt", "new a\n")]);

        let outcome = builder(&repo, &working_dir)
            .run(&get_commit_request_fixture(&["src/a.txt"]))
            .await?;

        assert_eq!(outcome.previous_commit, previous);
        assert_eq!(outcome.ref_name, "refs/heads/main");
        assert_eq!(repo.branch_head(FIXTURE_BRANCH), Some(outcome.commit.clone()));

        let commit = repo.commit(&outcome.commit).unwrap();
        assert_eq!(commit.parents, vec![previous]);
        assert_eq!(commit.tree, outcome.tree);

        let files = repo.files_at(FIXTURE_BRANCH).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files["README.md"], FIXTURE_README.as_bytes());
        assert_eq!(files["src/a.txt"], b"new a\n");

        Ok(())
    }

    #[tokio::test]
    async fn test_blobs_keep_input_order() -> anyhow::Result<()> {
        let repo = Arc::new(get_memory_repo_fixture());
        let paths = ["c.txt", "a.txt", "b/d.txt", "e.txt"];
        let working_dir = get_working_dir_fixture(&[
            ("a.txt", "a"),
            ("b/d.txt", "d"),
            ("c.txt", "c"),
            ("e.txt", "e"),
        ]);

        let outcome = builder(&repo, &working_dir)
            .run(&get_commit_request_fixture(&paths))
            .await?;

        let uploaded: Vec<&str> = outcome.blobs.iter().map(|blob| blob.path.as_str()).collect();
        assert_eq!(uploaded, paths);

        Ok(())
    }

    #[tokio::test]
    async fn test_identical_files_share_a_blob() -> anyhow::Result<()> {
        let repo = Arc::new(get_memory_repo_fixture());
        let working_dir = get_working_dir_fixture(&[("one.txt", "same"), ("two.txt", "same")]);

        let outcome = builder(&repo, &working_dir)
            .run(&get_commit_request_fixture(&["one.txt", "two.txt"]))
            .await?;

        assert_eq!(outcome.blobs[0].oid, outcome.blobs[1].oid);
        let files = repo.files_at(FIXTURE_BRANCH).unwrap();
        assert_eq!(files["one.txt"], b"same");
        assert_eq!(files["two.txt"], b"same");

        Ok(())
    }

    #[tokio::test]
    async fn test_rejects_empty_and_duplicate_file_lists() {
        let repo = Arc::new(get_memory_repo_fixture());
        let working_dir = get_working_dir_fixture(&[("a.txt", "a")]);
        let builder = builder(&repo, &working_dir);
        let before = repo.object_counts();

        let err = builder
            .run(&get_commit_request_fixture(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, CommitError::NoFiles));

        let err = builder
            .run(&get_commit_request_fixture(&["a.txt", "a.txt"]))
            .await
            .unwrap_err();
        assert!(matches!(err, CommitError::DuplicatePath(path) if path == "a.txt"));

        assert_eq!(repo.object_counts(), before);
    }

    #[tokio::test]
    async fn test_missing_file_aborts_before_tree() {
        let repo = Arc::new(get_memory_repo_fixture());
        let head = repo.branch_head(FIXTURE_BRANCH);
        let working_dir = get_working_dir_fixture(&[("a.txt", "a")]);
        let before = repo.object_counts();

        let err = builder(&repo, &working_dir)
            .run(&get_commit_request_fixture(&["a.txt", "missing.txt"]))
            .await
            .unwrap_err();

        assert!(matches!(err, CommitError::LocalRead { ref path, .. } if path == "missing.txt"));
        assert_eq!(repo.branch_head(FIXTURE_BRANCH), head);

        let after = repo.object_counts();
        assert_eq!(after.trees, before.trees);
        assert_eq!(after.commits, before.commits);
    }

    #[tokio::test]
    async fn test_non_utf8_file_is_a_read_error() {
        let repo = Arc::new(get_memory_repo_fixture());
        let working_dir = get_working_dir_fixture(&[]);
        fs::write(working_dir.path().join("image.bin"), [0xff, 0xfe, 0x00]).unwrap();

        let err = builder(&repo, &working_dir)
            .run(&get_commit_request_fixture(&["image.bin"]))
            .await
            .unwrap_err();

        assert!(matches!(err, CommitError::LocalRead { .. }));
    }

    #[tokio::test]
    async fn test_missing_branch_creates_nothing() {
        let repo = Arc::new(get_memory_repo_fixture());
        let working_dir = get_working_dir_fixture(&[("a.txt", "a")]);
        let before = repo.object_counts();

        let mut request = get_commit_request_fixture(&["a.txt"]);
        request.branch = "does-not-exist".to_string();

        let err = builder(&repo, &working_dir)
            .run(&request)
            .await
            .unwrap_err();

        assert!(matches!(err, CommitError::NotFound(_)));
        assert_eq!(repo.object_counts(), before);
        assert_eq!(repo.branch_names(), vec!["refs/heads/main".to_string()]);
    }
}
