use clap::Command;
use tracing_subscriber::EnvFilter;

mod context;
mod publish;

use context::Context;

fn cli() -> Command {
    Command::new("ghcommit")
        .about("commit local files to a branch through the GitHub GraphQL API")
        .version(env!("CARGO_PKG_VERSION"))
        .arg_required_else_help(true)
        .arg(publish::files_arg())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let matches = cli().get_matches();

    let context = Context::load()?;

    publish::handlers(&matches, &context).await
}
