//! Election operator tools: admin tally access, backup exports, and the
//! offline audit that cross-checks an exported vote log against the roster.

use std::{fs, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use client_core::{
    audit::{compare_votes, AuditCandidate, RawVote},
    results::{winners, BackupKind},
    ResultsClient,
};

#[derive(Parser, Debug)]
#[command(name = "tools", about = "election operator tools")]
struct Cli {
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    server_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Exchange admin credentials for a bearer token.
    AdminLogin { email: String, password: String },
    /// Print the raw admin tally with winners marked.
    AdminVotes {
        #[arg(long)]
        token: String,
    },
    /// Print backup table counts.
    BackupStatus,
    /// Download a backup export to a file.
    BackupDownload {
        #[arg(value_enum)]
        kind: ExportKind,
        #[arg(long)]
        out: PathBuf,
    },
    /// Cross-check an exported vote log against the registered roster.
    Audit {
        /// JSON array of vote rows: {"email", "candidate", "position"?}.
        #[arg(long)]
        votes: PathBuf,
        /// JSON array of roster entries: strings or objects with an email.
        #[arg(long)]
        roster: PathBuf,
        /// JSON array of candidates: {"id", "name", "position"}.
        #[arg(long)]
        candidates: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ExportKind {
    Full,
    Users,
    VotesTable,
}

impl From<ExportKind> for BackupKind {
    fn from(kind: ExportKind) -> Self {
        match kind {
            ExportKind::Full => BackupKind::Full,
            ExportKind::Users => BackupKind::Users,
            ExportKind::VotesTable => BackupKind::VotesTable,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::AdminLogin { email, password } => {
            let client = ResultsClient::new(&cli.server_url)?;
            let token = client.admin_login(&email, &password).await?;
            println!("{token}");
        }
        Command::AdminVotes { token } => {
            let client = ResultsClient::new(&cli.server_url)?;
            let tally = client.fetch_admin_votes(&token).await?;
            for (position, candidates) in &tally {
                println!("{position}");
                let leaders = winners(candidates);
                for candidate in candidates {
                    let marker = if leaders.iter().any(|w| w.name == candidate.name) {
                        " (winner)"
                    } else {
                        ""
                    };
                    println!("  {} - {} votes{marker}", candidate.name, candidate.votes);
                }
            }
        }
        Command::BackupStatus => {
            let client = ResultsClient::new(&cli.server_url)?;
            let status = client.fetch_backup_status().await?;
            println!("{}", status.message);
            println!(
                "users={} votes={} candidates={}",
                status.counts.users, status.counts.votes, status.counts.candidates
            );
        }
        Command::BackupDownload { kind, out } => {
            let client = ResultsClient::new(&cli.server_url)?;
            let bytes = client.download_backup(kind.into()).await?;
            fs::write(&out, &bytes)
                .with_context(|| format!("failed to write backup to {}", out.display()))?;
            println!("wrote {} bytes to {}", bytes.len(), out.display());
        }
        Command::Audit {
            votes,
            roster,
            candidates,
        } => {
            let votes: Vec<RawVote> = read_json(&votes)?;
            let roster = read_roster(&roster)?;
            let candidates: Vec<AuditCandidate> = read_json(&candidates)?;

            let report = compare_votes(&votes, &roster, &candidates);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

/// Roster exports vary: either a flat array of email strings or an array of
/// user objects carrying an email field.
fn read_roster(path: &PathBuf) -> Result<Vec<String>> {
    let value: serde_json::Value = read_json(path)?;
    let Some(entries) = value.as_array() else {
        bail!("{} must contain a JSON array", path.display());
    };

    let mut roster = Vec::with_capacity(entries.len());
    for entry in entries {
        let email = entry.as_str().map(str::to_string).or_else(|| {
            entry
                .get("institutionalEmail")
                .or_else(|| entry.get("email"))
                .and_then(|e| e.as_str())
                .map(str::to_string)
        });
        match email {
            Some(email) => roster.push(email),
            None => bail!("roster entry without an email in {}", path.display()),
        }
    }
    Ok(roster)
}
