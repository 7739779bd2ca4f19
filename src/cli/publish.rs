use std::sync::Arc;

use clap::{arg, ArgMatches};
use ghcommit_core::{
    git::{GraphQlRemoteRepo, RemoteRepo},
    parse_file_list, CommitBuilder, CommitError, CommitOutcome, CommitRequest,
};

use crate::context::Context;

pub fn files_arg() -> clap::Arg {
    arg!(<FILES> "JSON array of file paths to commit, relative to the working directory")
}

pub async fn handlers(matches: &ArgMatches, context: &Context) -> anyhow::Result<()> {
    let files_json = matches
        .get_one::<String>("FILES")
        .ok_or_else(|| anyhow::anyhow!("file list expected"))?;

    let repo: Arc<dyn RemoteRepo> = Arc::new(GraphQlRemoteRepo::new(
        &context.config.endpoint,
        &context.config.token,
    )?);
    let builder = CommitBuilder::new(repo, context.working_dir.clone());

    // Failures are reported, not propagated: the process still exits zero.
    match publish(&builder, context, files_json).await {
        Ok(outcome) => tracing::info!(
            "modified or new files updated in branch successfully ({} -> {})",
            outcome.previous_commit,
            outcome.commit
        ),
        Err(err) => tracing::error!("error updating branch: {}", err),
    }

    Ok(())
}

async fn publish(
    builder: &CommitBuilder,
    context: &Context,
    files_json: &str,
) -> Result<CommitOutcome, CommitError> {
    let files = parse_file_list(files_json)?;
    let request = CommitRequest::new(&context.config, files);

    builder.run(&request).await
}
