use std::{env, path::PathBuf};

use ghcommit_core::CommitConfig;

#[derive(Debug)]
pub struct Context {
    pub config: CommitConfig,
    pub working_dir: PathBuf,
}

impl Context {
    pub fn load() -> anyhow::Result<Self> {
        let config = CommitConfig::from_env()?;
        let working_dir = env::current_dir()?;

        Ok(Self {
            config,
            working_dir,
        })
    }
}
