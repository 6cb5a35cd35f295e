mod cli;
mod commands;
mod settings;
mod walkthrough;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Command, ConsentCommand, GroupsCommand};
use consent_core::{ClientCredentialsTokenProvider, ConsentClient, HttpTransport};
use settings::AppConfiguration;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up tracing
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            commands::report(&err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = AppConfiguration::load(&cli.config)?;
    tracing::info!(
        uri = %settings.consent.consent_service_uri,
        subscription_id = %settings.consent.subscription_id,
        member = %settings.consent.consent_member,
        "loaded configuration"
    );
    let client = build_client(&settings)?;

    match cli.command {
        Command::Walkthrough => walkthrough::run(&client, &settings).await?,
        Command::Groups { command } => match command {
            GroupsCommand::List => commands::list_groups(&client).await?,
            GroupsCommand::Show { id } => commands::show_group(&client, id).await?,
        },
        Command::Consent { command } => match command {
            ConsentCommand::Review { key, member } => commands::review(&client, &key, member.as_deref()).await?,
            ConsentCommand::Get { key, scopes, member } => commands::get(&client, &key, scopes, member).await?,
            ConsentCommand::Save {
                key,
                scopes,
                authorized_members,
                member,
            } => commands::save(&client, &key, scopes, authorized_members, member).await?,
            ConsentCommand::Revoke { key, member } => commands::revoke(&client, &key, member.as_deref()).await?,
        },
    }

    Ok(())
}

fn build_client(settings: &AppConfiguration) -> anyhow::Result<ConsentClient> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.request_timeout_secs))
        .build()
        .context("failed to build HTTP client")?;
    let transport: Arc<dyn HttpTransport> = Arc::new(http);
    let tokens = ClientCredentialsTokenProvider::new(Arc::clone(&transport), settings.token_provider.clone())?;

    let client = ConsentClient::builder()
        .transport(transport)
        .token_provider(Arc::new(tokens))
        .options(settings.consent.clone())
        .build()?;
    Ok(client)
}
