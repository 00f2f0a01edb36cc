//! agent-replay - live feed over coding-agent transcripts
//!
//! Subcommands:
//! - `list`: discovered sessions, active first
//! - `watch <file>`: follow one transcript as it grows
//! - `all`: follow the merged feed across every session
//! - `dump <file>`: one-pass parse of a transcript
//!
//! Uses XDG Base Directory specification for file locations:
//! - Logs: $XDG_STATE_HOME/agent-replay/agent-replay.log
//! - Config: $XDG_CONFIG_HOME/agent-replay/config.toml

use agent_replay_core::discovery::{DiscoveredFile, GlobSource, TranscriptSource};
use agent_replay_core::{
    parse_transcript, Agent, Config, Event, FeedMessage, SessionHub, SessionSummary,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "agent-replay")]
#[command(about = "Live feed over coding-agent transcripts")]
#[command(version)]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/agent-replay/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit JSON lines instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List discovered sessions
    List,
    /// Follow one transcript
    Watch {
        /// Path to the JSONL transcript
        file: PathBuf,
        /// Events of the existing history to print first
        #[arg(long, default_value = "20")]
        history: usize,
    },
    /// Follow the merged feed of all sessions
    All,
    /// Parse a transcript once and print it
    Dump {
        /// Path to the JSONL transcript
        file: PathBuf,
        /// Show only summary statistics (no events)
        #[arg(long)]
        summary: bool,
    },
}

/// Output of `dump --summary`
#[derive(Serialize)]
struct DumpSummary {
    file: String,
    session_id: String,
    project: String,
    slug: String,
    branch: String,
    total_events: u64,
    events_by_type: BTreeMap<String, usize>,
    agents: Vec<Agent>,
}

/// Discovery over an explicit list of files
struct FixedSource {
    paths: Vec<PathBuf>,
}

impl TranscriptSource for FixedSource {
    fn discover(&self) -> agent_replay_core::Result<Vec<DiscoveredFile>> {
        let mut files = Vec::new();
        for path in &self.paths {
            let metadata = std::fs::metadata(path)?;
            files.push(DiscoveredFile {
                path: path.clone(),
                size: metadata.len(),
                modified: metadata.modified().map(DateTime::<Utc>::from)?,
            });
        }
        Ok(files)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load().context("failed to load configuration")?,
    };

    let _log_guard =
        agent_replay_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("agent-replay starting");

    match args.command {
        Command::List => list(config, args.json).await,
        Command::Watch { file, history } => watch(config, &file, history, args.json).await,
        Command::All => follow_all(config, args.json).await,
        Command::Dump { file, summary } => dump(&config, &file, summary, args.json),
    }
}

async fn list(config: Config, json: bool) -> Result<()> {
    let source = GlobSource::from_config(&config.sources);
    let hub = SessionHub::new(config);
    let report = hub
        .refresh(&source)
        .await
        .context("failed to discover sessions")?;
    tracing::info!(sessions = report.added.len(), "Listing sessions");

    let sessions = hub.list_sessions();
    hub.shutdown().await;

    if json {
        for summary in &sessions {
            println!("{}", serde_json::to_string(summary)?);
        }
        return Ok(());
    }

    if sessions.is_empty() {
        println!("No sessions found under {}", source.root().display());
        return Ok(());
    }
    let now = Utc::now();
    for summary in &sessions {
        print_summary(summary, now);
    }
    Ok(())
}

async fn watch(config: Config, file: &Path, history: usize, json: bool) -> Result<()> {
    let file = file
        .canonicalize()
        .with_context(|| format!("transcript not found: {}", file.display()))?;
    let source = FixedSource {
        paths: vec![file.clone()],
    };

    let hub = SessionHub::new(config);
    let report = hub.refresh(&source).await?;
    if report.added.is_empty() {
        anyhow::bail!("unsupported transcript: {}", file.display());
    }

    let (session, mut feed) = hub.attach(&file)?;
    let mut seen_total = session.total_events;
    let names = agent_names(&session.agents);
    let skip = session.events.len().saturating_sub(history);
    for event in &session.events[skip..] {
        print_event(event, &names, None, json)?;
    }

    let cancel = shutdown_on_ctrl_c();
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            received = feed.recv() => match received {
                Ok(message) => {
                    if message.covered_by(seen_total) {
                        continue;
                    }
                    match &message {
                        FeedMessage::Full { reason, session } => {
                            tracing::info!(?reason, "Session resynced");
                            seen_total = session.total_events;
                            if !json {
                                println!("--- transcript rewritten, replaying ---");
                            }
                        }
                        FeedMessage::Delta(delta) => seen_total = delta.total_events,
                    }
                    let names = agent_names(message.agents());
                    for event in message.events() {
                        print_event(event, &names, None, json)?;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Feed subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    hub.shutdown().await;
    Ok(())
}

async fn follow_all(config: Config, json: bool) -> Result<()> {
    let source = GlobSource::from_config(&config.sources);
    let hub = SessionHub::new(config);
    let mut feed = hub.subscribe_all();
    let cancel = shutdown_on_ctrl_c();

    let runner = hub.run(&source, cancel.clone());
    tokio::pin!(runner);

    let mut names: BTreeMap<String, String> = BTreeMap::new();
    loop {
        tokio::select! {
            () = &mut runner => break,
            received = feed.recv() => match received {
                Ok(delta) => {
                    for (key, agent) in &delta.agents {
                        names.insert(key.clone(), agent.name.clone());
                    }
                    for tagged in &delta.events {
                        if json {
                            println!("{}", serde_json::to_string(tagged)?);
                            continue;
                        }
                        let key = format!("{}:{}", tagged.project, tagged.event.agent_id);
                        let name = names.get(&key).cloned().unwrap_or(key);
                        print_event(&tagged.event, &BTreeMap::new(), Some(&name), false)?;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Aggregate subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    hub.shutdown().await;
    Ok(())
}

fn dump(config: &Config, file: &Path, summary: bool, json: bool) -> Result<()> {
    let session = parse_transcript(file, config)
        .with_context(|| format!("failed to parse {}", file.display()))?;

    if summary {
        let mut events_by_type = BTreeMap::new();
        for event in &session.events {
            *events_by_type
                .entry(event.event_type.to_string())
                .or_insert(0) += 1;
        }
        let output = DumpSummary {
            file: file.display().to_string(),
            session_id: session.session_id.clone(),
            project: session.project.clone(),
            slug: session.slug.clone(),
            branch: session.branch.clone(),
            total_events: session.total_events,
            events_by_type,
            agents: session.agents.values().cloned().collect(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
        return Ok(());
    }

    println!(
        "Session {} ({}) - {} events, {} agent(s)",
        session.session_id,
        session.project,
        session.total_events,
        session.agents.len()
    );
    let names = agent_names(&session.agents);
    for event in &session.events {
        print_event(event, &names, None, false)?;
    }
    Ok(())
}

/// Cancel the returned token on Ctrl-C
fn shutdown_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, shutting down");
        }
        trigger.cancel();
    });
    cancel
}

fn agent_names(agents: &BTreeMap<String, Agent>) -> BTreeMap<String, String> {
    agents
        .iter()
        .map(|(id, agent)| (id.clone(), agent.name.clone()))
        .collect()
}

fn print_event(
    event: &Event,
    names: &BTreeMap<String, String>,
    label: Option<&str>,
    json: bool,
) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }

    let who = label
        .map(str::to_string)
        .or_else(|| names.get(&event.agent_id).cloned())
        .unwrap_or_else(|| event.agent_id.clone());
    let tokens = event.tokens();
    let usage = if tokens.is_zero() {
        String::new()
    } else {
        format!(" [{} in / {} out]", tokens.input, tokens.output)
    };
    let target = event
        .short_path
        .as_deref()
        .map(|p| format!(" {}", p))
        .unwrap_or_default();

    println!(
        "{:<24} {:<16} {:<12} {}{}{}",
        event.timestamp,
        who,
        event.event_type.as_str(),
        event.summary,
        target,
        usage
    );
    Ok(())
}

fn print_summary(summary: &SessionSummary, now: DateTime<Utc>) {
    let marker = if summary.is_active { "●" } else { " " };
    let age = summary
        .last_modified
        .map(|m| format_age(now.signed_duration_since(m)))
        .unwrap_or_else(|| "-".to_string());
    let label = if summary.slug.is_empty() {
        summary.session_id.as_str()
    } else {
        summary.slug.as_str()
    };

    println!(
        "{} {:<28} {:<36} {:>6} events {:>3} agents {:>9} tokens  {}",
        marker,
        summary.project,
        label,
        summary.event_count,
        summary.agent_count,
        summary.total_input_tokens + summary.total_output_tokens,
        age
    );
}

fn format_age(age: chrono::Duration) -> String {
    let secs = age.num_seconds().max(0);
    match secs {
        0..=59 => format!("{}s ago", secs),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(chrono::Duration::seconds(5)), "5s ago");
        assert_eq!(format_age(chrono::Duration::seconds(125)), "2m ago");
        assert_eq!(format_age(chrono::Duration::hours(3)), "3h ago");
        assert_eq!(format_age(chrono::Duration::days(2)), "2d ago");
        assert_eq!(format_age(chrono::Duration::seconds(-4)), "0s ago");
    }
}
