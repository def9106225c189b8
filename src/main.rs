use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

use chapterhouse::cli::{Cli, Command};
use chapterhouse::commands;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    chapterhouse::logging::init().context("init logging")?;

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    let config = commands::resolve_config(&cli.global)?;
    tracing::debug!(data_dir = %config.data_dir.display(), device = %config.device_id, "resolved config");

    match cli.command {
        Command::Metrics(args) => commands::metrics(args).await.context("metrics")?,
        Command::New(args) => commands::new_book(args, &config).await.context("new")?,
        Command::Write(args) => commands::write(args, &config).await.context("write")?,
        Command::Readiness(args) => commands::readiness(args, &config)
            .await
            .context("readiness")?,
        Command::Publish(args) => commands::publish(args, &config).await.context("publish")?,
        Command::Read(args) => commands::read(args, &config).await.context("read")?,
        Command::Prefs { command } => commands::prefs(command, &config).await.context("prefs")?,
    }

    Ok(())
}
