//! Terminal voting booth: signs a voter in, walks them through each open
//! position one at a time, and commits the ballot once every position has an
//! acknowledged vote. Also exposes the public results and vote log.

mod config;

use std::{
    io::{self, BufRead, Write},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use chrono::Duration;
use clap::{Parser, Subcommand};
use tracing::warn;

use client_core::{
    results::winners, AdvanceOutcome, ResultsClient, SystemClock, VotingWizard, WizardConfig,
    WizardPhase,
};
use shared::{domain::VoterIdentity, error::VoteClientError};
use storage::Storage;

#[derive(Parser, Debug)]
#[command(name = "booth", about = "student election voting booth")]
struct Cli {
    /// Backend base URL; overrides booth.toml and environment.
    #[arg(long)]
    server_url: Option<String>,
    /// Local state database; overrides booth.toml and environment.
    #[arg(long)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in (or resume) and vote every open position.
    Vote,
    /// Show the locally stored session and buffered votes.
    Status,
    /// Show the public aggregated results.
    Results,
    /// Show the anonymized public vote log.
    VoteLog,
    /// Discard the local session and buffered votes.
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let cli = Cli::parse();
    let mut settings = config::load_settings();
    if let Some(server_url) = cli.server_url {
        settings.server_url = server_url;
    }
    if let Some(database_url) = cli.database_url {
        settings.database_url = database_url;
    }

    match cli.command {
        Command::Vote => run_vote(&settings).await,
        Command::Status => run_status(&settings).await,
        Command::Results => run_results(&settings).await,
        Command::VoteLog => run_vote_log(&settings).await,
        Command::Logout => run_logout(&settings).await,
    }
}

async fn run_vote(settings: &config::Settings) -> Result<()> {
    let storage = Storage::new(&settings.database_url)
        .await
        .context("failed to open local state database")?;
    let config = WizardConfig::new(settings.server_url.clone())
        .with_session_ttl(Duration::minutes(settings.session_ttl_minutes));
    let mut wizard = VotingWizard::new(config, Arc::new(storage), Arc::new(SystemClock))?;

    match wizard.resume().await {
        Ok(true) => println!("Resuming your interrupted session."),
        Ok(false) => {
            let identity = prompt_identity()?;
            match wizard.sign_in(&identity).await {
                Ok(()) => {}
                Err(VoteClientError::Conflict { reason, .. }) => {
                    bail!("sign-in refused: {reason}")
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(VoteClientError::SessionExpired) => {
            println!("Your previous session expired; signing in again.");
            let identity = prompt_identity()?;
            wizard.sign_in(&identity).await?;
        }
        Err(err) => return Err(err.into()),
    }

    loop {
        match wizard.phase() {
            WizardPhase::Loading | WizardPhase::AwaitingSelection => {
                vote_current_position(&mut wizard).await?;
            }
            WizardPhase::Submitted => match wizard.advance().await? {
                AdvanceOutcome::NextPosition(position) => {
                    println!("Next position: {position}");
                }
                AdvanceOutcome::Completed => break,
            },
            WizardPhase::Finalizing => {
                wizard.finalize().await?;
                break;
            }
            WizardPhase::Done => break,
            WizardPhase::Expired => bail!("session expired; run `booth vote` to start over"),
            WizardPhase::Idle | WizardPhase::Submitting => {
                bail!("voting flow ended unexpectedly")
            }
        }
    }

    println!("All votes recorded. Thank you for voting.");
    Ok(())
}

async fn vote_current_position(wizard: &mut VotingWizard) -> Result<()> {
    let position = wizard
        .current_position()
        .cloned()
        .context("no position left to vote on")?;
    let candidates = wizard.load_candidates().await?.to_vec();
    if candidates.is_empty() {
        bail!("no candidates registered for {position}");
    }

    println!();
    println!("Position: {position}");
    for (index, candidate) in candidates.iter().enumerate() {
        match &candidate.description {
            Some(description) => println!("  {}. {} ({description})", index + 1, candidate.name),
            None => println!("  {}. {}", index + 1, candidate.name),
        }
    }

    loop {
        let raw = prompt(&format!("Choose 1-{}: ", candidates.len()))?;
        let Ok(choice) = raw.trim().parse::<usize>() else {
            println!("Enter the number next to a candidate.");
            continue;
        };
        let Some(candidate) = choice.checked_sub(1).and_then(|i| candidates.get(i)) else {
            println!("Enter the number next to a candidate.");
            continue;
        };

        match wizard.submit_vote(&position, &candidate.id).await {
            Ok(()) => {
                println!("Recorded your vote for {}.", candidate.name);
                return Ok(());
            }
            Err(VoteClientError::Network(reason)) => {
                warn!("vote submission failed: {reason}");
                println!("Could not reach the election server; try again.");
            }
            Err(err) => return Err(err.into()),
        }
    }
}

async fn run_status(settings: &config::Settings) -> Result<()> {
    let storage = Storage::new(&settings.database_url)
        .await
        .context("failed to open local state database")?;

    match storage.load_session().await? {
        Some(session) => {
            println!("Signed in as {}", session.institutional_email);
            println!("Session deadline: {}", session.deadline);
            println!("Remaining positions: {}", session.remaining_positions.len());
        }
        None => println!("No active session."),
    }

    let buffered = storage.buffered_votes().await?;
    if buffered.is_empty() {
        println!("No buffered votes.");
    } else {
        println!("Buffered votes:");
        for (position, vote) in buffered {
            println!("  {position}: {}", vote.candidate_name);
        }
    }
    Ok(())
}

async fn run_results(settings: &config::Settings) -> Result<()> {
    let client = ResultsClient::new(&settings.server_url)?;
    let results = client.fetch_results().await?;

    for (position, tally) in &results.vote_counts {
        println!("{position}");
        let leaders = winners(tally);
        for candidate in tally {
            let marker = if leaders.iter().any(|w| w.name == candidate.name) {
                " (leading)"
            } else {
                ""
            };
            println!("  {} - {} votes{marker}", candidate.name, candidate.votes);
        }
    }
    println!();
    println!(
        "{} valid votes, {} total",
        results.total_valid_votes, results.total_votes
    );
    if let Some(last_updated) = &results.last_updated {
        println!("Last updated: {last_updated}");
    }
    Ok(())
}

async fn run_vote_log(settings: &config::Settings) -> Result<()> {
    let client = ResultsClient::new(&settings.server_url)?;
    let entries = client.fetch_vote_log().await?;

    println!("{} votes recorded", entries.len());
    for entry in entries {
        println!(
            "  {}  {}  {}",
            entry
                .timestamp
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".into()),
            entry.position.map(|p| p.0).unwrap_or_else(|| "-".into()),
            entry.matric_number.unwrap_or_else(|| "-".into()),
        );
    }
    Ok(())
}

async fn run_logout(settings: &config::Settings) -> Result<()> {
    let storage = Storage::new(&settings.database_url)
        .await
        .context("failed to open local state database")?;
    storage.clear_session().await?;
    println!("Local session cleared.");
    Ok(())
}

fn prompt_identity() -> Result<VoterIdentity> {
    println!("Sign in with your registration details.");
    Ok(VoterIdentity {
        institutional_email: prompt("Institutional email: ")?,
        personal_email: prompt("Personal email: ")?,
        matric_number: prompt("Matric number: ")?,
        full_name: prompt("Full name: ")?,
    })
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read input")?;
    Ok(line.trim().to_string())
}
