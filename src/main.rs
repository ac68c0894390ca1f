mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stex_index=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let hub_root = cli.hub_root()?;
    let cache = cli.hub_cache(&hub_root);

    match &cli.command {
        Commands::Index => {
            cli::index(&hub_root, cache.as_ref())?;
        }
        Commands::Show { file } => {
            cli::show(&hub_root, cache.as_ref(), file)?;
        }
        Commands::CheckDeps { filter, mode } => {
            cli::check_deps(&hub_root, cache.as_ref(), filter.as_deref(), *mode)?;
        }
        Commands::Archives => {
            cli::list_archives(&hub_root, cache.as_ref())?;
        }
        Commands::ClearCache => {
            cli::clear_cache(cache.as_ref())?;
        }
    }

    Ok(())
}
