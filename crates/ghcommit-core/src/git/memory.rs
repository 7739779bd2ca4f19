use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Mutex, MutexGuard},
};

use super::{qualified_branch_ref, BranchHead, Oid, RemoteRepo, TreeItem};
use crate::error::CommitError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryCommit {
    pub message: String,
    pub tree: Oid,
    pub parents: Vec<Oid>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ObjectCounts {
    pub blobs: usize,
    pub trees: usize,
    pub commits: usize,
}

#[derive(Debug, Default)]
struct ObjectStore {
    refs: HashMap<String, Oid>,
    blobs: HashMap<Oid, Vec<u8>>,
    trees: HashMap<Oid, BTreeMap<String, TreeItem>>, // path -> entry
    commits: HashMap<Oid, MemoryCommit>,
    failing_blobs: HashSet<Vec<u8>>,
    commit_sequence: u64,
}

/// A single repository held entirely in memory. Objects are content addressed
/// the way a git object store is, so uploading the same bytes twice yields the
/// same blob id.
#[derive(Debug)]
pub struct MemoryRemoteRepo {
    pub owner: String,
    pub name: String,
    pub repository_id: String,

    store: Mutex<ObjectStore>,
}

fn hash_object(kind: &str, payload: &[u8]) -> Oid {
    let mut hasher = Sha256::new();
    hasher.update(format!("{kind} {}\0", payload.len()).as_bytes());
    hasher.update(payload);

    Oid::new(hex::encode(hasher.finalize()))
}

fn validate_path(path: &str) -> Result<(), CommitError> {
    let invalid = path.is_empty()
        || path.starts_with('/')
        || path.ends_with('/')
        || path
            .split('/')
            .any(|component| component.is_empty() || component == "." || component == "..");

    if invalid {
        return Err(CommitError::Validation(format!(
            "tree path '{path}' is invalid"
        )));
    }

    Ok(())
}

impl ObjectStore {
    fn insert_blob(&mut self, content: &[u8]) -> Oid {
        let oid = hash_object("blob", content);
        self.blobs.insert(oid.clone(), content.to_vec());
        oid
    }

    fn insert_tree(&mut self, entries: BTreeMap<String, TreeItem>) -> Oid {
        let mut payload = String::new();
        for entry in entries.values() {
            payload.push_str(&format!(
                "{} {} {}\t{}\n",
                entry.mode.as_str(),
                entry.kind.as_str(),
                entry.sha,
                entry.path
            ));
        }

        let oid = hash_object("tree", payload.as_bytes());
        self.trees.insert(oid.clone(), entries);
        oid
    }

    fn insert_commit(&mut self, message: &str, tree: &Oid, parents: &[Oid]) -> Oid {
        self.commit_sequence += 1;

        let mut payload = format!("tree {tree}\n");
        for parent in parents {
            payload.push_str(&format!("parent {parent}\n"));
        }
        // Stands in for the committer timestamp.
        payload.push_str(&format!("sequence {}\n\n{message}", self.commit_sequence));

        let oid = hash_object("commit", payload.as_bytes());
        self.commits.insert(
            oid.clone(),
            MemoryCommit {
                message: message.to_string(),
                tree: tree.clone(),
                parents: parents.to_vec(),
            },
        );
        oid
    }

    fn is_ancestor(&self, ancestor: &Oid, descendant: &Oid) -> bool {
        let mut pending = vec![descendant.clone()];
        let mut seen = HashSet::new();

        while let Some(oid) = pending.pop() {
            if &oid == ancestor {
                return true;
            }
            if !seen.insert(oid.clone()) {
                continue;
            }
            if let Some(commit) = self.commits.get(&oid) {
                pending.extend(commit.parents.iter().cloned());
            }
        }

        false
    }
}

impl MemoryRemoteRepo {
    pub fn new(owner: &str, name: &str) -> Self {
        let repository_id = format!(
            "R_{}",
            &hash_object("repository", format!("{owner}/{name}").as_bytes()).as_str()[..12]
        );

        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            repository_id,
            store: Mutex::new(ObjectStore::default()),
        }
    }

    fn get_store_locked(&self) -> Result<MutexGuard<'_, ObjectStore>, CommitError> {
        self.store
            .lock()
            .map_err(|err| CommitError::Transport(format!("memory store poisoned: {err}")))
    }

    fn check_repository(&self, repository_id: &str) -> Result<(), CommitError> {
        if repository_id != self.repository_id {
            return Err(CommitError::NotFound(format!(
                "repository with id '{repository_id}'"
            )));
        }

        Ok(())
    }

    /// Creates `branch` as a root commit holding exactly `files`.
    pub fn seed_branch(
        &self,
        branch: &str,
        files: &[(&str, &[u8])],
        message: &str,
    ) -> Result<Oid, CommitError> {
        let mut store = self.get_store_locked()?;

        let mut entries = BTreeMap::new();
        for (path, content) in files {
            validate_path(path)?;
            let oid = store.insert_blob(content);
            entries.insert(path.to_string(), TreeItem::blob(path, oid));
        }

        let tree = store.insert_tree(entries);
        let commit = store.insert_commit(message, &tree, &[]);
        store.refs.insert(qualified_branch_ref(branch), commit.clone());

        Ok(commit)
    }

    /// Makes every later upload of exactly `content` fail as a network fault would.
    pub fn fail_blob_upload(&self, content: &[u8]) {
        if let Ok(mut store) = self.store.lock() {
            store.failing_blobs.insert(content.to_vec());
        }
    }

    pub fn branch_head(&self, branch: &str) -> Option<Oid> {
        let store = self.store.lock().ok()?;
        store.refs.get(&qualified_branch_ref(branch)).cloned()
    }

    pub fn branch_names(&self) -> Vec<String> {
        let store = match self.store.lock() {
            Ok(store) => store,
            Err(_) => return vec![],
        };

        let mut names: Vec<String> = store.refs.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn blob(&self, oid: &Oid) -> Option<Vec<u8>> {
        let store = self.store.lock().ok()?;
        store.blobs.get(oid).cloned()
    }

    pub fn commit(&self, oid: &Oid) -> Option<MemoryCommit> {
        let store = self.store.lock().ok()?;
        store.commits.get(oid).cloned()
    }

    pub fn tree_entries(&self, oid: &Oid) -> Option<BTreeMap<String, TreeItem>> {
        let store = self.store.lock().ok()?;
        store.trees.get(oid).cloned()
    }

    /// The files reachable from the tip of `branch`, by path.
    pub fn files_at(&self, branch: &str) -> Option<BTreeMap<String, Vec<u8>>> {
        let store = self.store.lock().ok()?;

        let commit = store.refs.get(&qualified_branch_ref(branch))?;
        let tree = &store.commits.get(commit)?.tree;

        let files = store
            .trees
            .get(tree)?
            .iter()
            .map(|(path, entry)| Some((path.clone(), store.blobs.get(&entry.sha)?.clone())))
            .collect();

        files
    }

    pub fn object_counts(&self) -> ObjectCounts {
        match self.store.lock() {
            Ok(store) => ObjectCounts {
                blobs: store.blobs.len(),
                trees: store.trees.len(),
                commits: store.commits.len(),
            },
            Err(_) => ObjectCounts::default(),
        }
    }
}

#[async_trait]
impl RemoteRepo for MemoryRemoteRepo {
    async fn resolve_branch(
        &self,
        owner: &str,
        name: &str,
        qualified_ref: &str,
    ) -> Result<BranchHead, CommitError> {
        if owner != self.owner || name != self.name {
            return Err(CommitError::NotFound(format!(
                "Could not resolve to a Repository with the name '{owner}/{name}'."
            )));
        }

        let store = self.get_store_locked()?;

        let commit_oid = store
            .refs
            .get(qualified_ref)
            .cloned()
            .ok_or_else(|| CommitError::NotFound(format!("ref {qualified_ref}")))?;

        let tree_oid = store
            .commits
            .get(&commit_oid)
            .map(|commit| commit.tree.clone())
            .ok_or_else(|| CommitError::NotFound(format!("commit {commit_oid}")))?;

        Ok(BranchHead {
            repository_id: self.repository_id.clone(),
            commit_oid,
            tree_oid,
        })
    }

    async fn create_blob(&self, repository_id: &str, content: &[u8]) -> Result<Oid, CommitError> {
        self.check_repository(repository_id)?;

        // let concurrent uploads interleave like real requests would
        tokio::task::yield_now().await;

        let mut store = self.get_store_locked()?;

        if store.failing_blobs.contains(content) {
            return Err(CommitError::Transport(
                "connection reset while uploading blob".to_string(),
            ));
        }

        Ok(store.insert_blob(content))
    }

    async fn create_tree(
        &self,
        repository_id: &str,
        base_tree: &Oid,
        items: &[TreeItem],
    ) -> Result<Oid, CommitError> {
        self.check_repository(repository_id)?;

        let mut store = self.get_store_locked()?;

        let mut entries = store
            .trees
            .get(base_tree)
            .cloned()
            .ok_or_else(|| CommitError::Validation(format!("base tree {base_tree} not found")))?;

        for item in items {
            validate_path(&item.path)?;

            if !store.blobs.contains_key(&item.sha) {
                return Err(CommitError::Validation(format!(
                    "tree entry {} refers to unknown blob {}",
                    item.path, item.sha
                )));
            }

            entries.insert(item.path.clone(), item.clone());
        }

        Ok(store.insert_tree(entries))
    }

    async fn create_commit(
        &self,
        repository_id: &str,
        message: &str,
        tree: &Oid,
        parents: &[Oid],
    ) -> Result<Oid, CommitError> {
        self.check_repository(repository_id)?;

        let mut store = self.get_store_locked()?;

        if !store.trees.contains_key(tree) {
            return Err(CommitError::Validation(format!("tree {tree} not found")));
        }

        if let Some(parent) = parents.iter().find(|parent| !store.commits.contains_key(*parent)) {
            return Err(CommitError::Validation(format!(
                "parent commit {parent} not found"
            )));
        }

        Ok(store.insert_commit(message, tree, parents))
    }

    async fn update_ref(
        &self,
        repository_id: &str,
        qualified_ref: &str,
        oid: &Oid,
        force: bool,
    ) -> Result<String, CommitError> {
        self.check_repository(repository_id)?;

        let mut store = self.get_store_locked()?;

        if !store.commits.contains_key(oid) {
            return Err(CommitError::Validation(format!("commit {oid} not found")));
        }

        let current = store
            .refs
            .get(qualified_ref)
            .cloned()
            .ok_or_else(|| CommitError::NotFound(format!("ref {qualified_ref}")))?;

        if !force && !store.is_ancestor(&current, oid) {
            return Err(CommitError::Validation(format!(
                "update of {qualified_ref} to {oid} is not a fast forward"
            )));
        }

        store.refs.insert(qualified_ref.to_string(), oid.clone());

        Ok(qualified_ref.to_string())
    }
}
