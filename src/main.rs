use agentboard::adapters::ApiClient;
use agentboard::cli::{commands, Cli, Commands};
use agentboard::config::AppConfig;
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple, shutdown_signal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(&cli.config)?;
    if let Some(base_url) = &cli.base_url {
        config.api.base_url = base_url.clone();
        config.validate()?;
    }

    let mode = cli.output_mode();
    let command = cli.command.clone().unwrap_or(Commands::Watch {
        agent: None,
        activity: None,
    });

    if let Commands::Watch { agent, activity } = command {
        init_logging(&config.logging);
        if agent.is_some() {
            config.session.agent_id = agent;
        }
        if activity.is_some() {
            config.session.activity_id = activity;
        }
        info!(base_url = %config.api.base_url, "starting dashboard watch");
        let api = Arc::new(ApiClient::new(&config.api)?);
        commands::watch(api, &config, shutdown_signal()).await?;
        return Ok(());
    }

    init_logging_simple();
    let api = ApiClient::new(&config.api)?;

    // Ctrl+C aborts the in-flight request
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        cancel.cancel();
    });

    match command {
        Commands::Leaderboard { activity } => {
            commands::show_leaderboard(&api, activity, token, mode).await?;
        }
        Commands::Holdings { agent } => {
            commands::show_holdings(&api, agent, token, mode).await?;
        }
        Commands::Curve { activity, tail } => {
            commands::show_curve(&api, &config, activity, tail, token, mode).await?;
        }
        Commands::Agent { id, by_user } => {
            commands::show_agent(Arc::new(api), &config, id, by_user, token, mode).await?;
        }
        Commands::Watch { .. } => {}
    }

    Ok(())
}
