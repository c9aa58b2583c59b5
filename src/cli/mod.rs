//! CLI commands for QuizRapid using clap.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::channel::MemoryBroker;
use crate::config::{self, EngineConfig, MalformedPolicy};
use crate::core::Rapid;
use crate::protocol::{decode, MessageKind};

pub mod scripted;

pub use scripted::{AnswerScript, ScriptedHandler};

/// Topic used for replayed streams.
const REPLAY_TOPIC: &str = "quiz-replay";

/// QuizRapid - participant engine for live quizzes.
#[derive(Parser)]
#[command(name = "quizrapid")]
#[command(version = "0.1.0")]
#[command(about = "QuizRapid - answer quiz questions from a shared message stream", long_about = None)]
pub struct Commands {
    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Replay a recorded stream through the engine
    Replay {
        /// Team name to answer as
        #[arg(long, env = "QUIZ_TEAM")]
        team: String,

        /// JSON-lines file with one envelope per line
        #[arg(long)]
        input: PathBuf,

        /// YAML file mapping categories to answers
        #[arg(long)]
        answers: Option<PathBuf>,

        /// Where to write published answers (stdout if omitted)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Categories to keep out of info-level logs
        #[arg(long = "ignore-category")]
        ignored_categories: Vec<String>,

        /// Handling of undecodable messages
        #[arg(long, value_enum, default_value = "retry")]
        malformed: MalformedArg,

        /// Attempts before a malformed message is skipped (with --malformed retry)
        #[arg(long, default_value_t = 3)]
        malformed_attempts: u32,
    },

    /// Resolve and print the broker connection
    Config {
        /// Use the local credentials file instead of KAFKA_* variables
        #[arg(long)]
        local: bool,

        /// Directory to search for the local credentials file
        #[arg(long, default_value = ".")]
        base_dir: PathBuf,

        /// Keep the materialised TLS files after exit (with --local)
        #[arg(long, requires = "local")]
        keep_certs: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum MalformedArg {
    /// Never commit undecodable messages
    Leave,
    /// Commit and skip on first sighting
    Skip,
    /// Commit and skip after repeated sightings
    Retry,
}

impl MalformedArg {
    fn policy(self, max_attempts: u32) -> MalformedPolicy {
        match self {
            Self::Leave => MalformedPolicy::LeaveUncommitted,
            Self::Skip => MalformedPolicy::SkipAndCommit,
            Self::Retry => MalformedPolicy::RetryThenSkip { max_attempts },
        }
    }
}

#[derive(Serialize)]
struct ConnectionReport<'a> {
    #[serde(flatten)]
    connection: &'a config::ConnectionConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<&'static str>,
}

const EPHEMERAL_CERTS_NOTE: &str =
    "TLS files are removed when this command exits; pass --keep-certs to keep them";

impl Commands {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Replay {
                team,
                input,
                answers,
                output,
                ignored_categories,
                malformed,
                malformed_attempts,
            } => {
                let script = match answers {
                    Some(path) => AnswerScript::load(&path)?,
                    None => AnswerScript::default(),
                };
                let engine_config = EngineConfig::new(team)
                    .with_ignored_categories(ignored_categories)
                    .with_malformed_policy(malformed.policy(malformed_attempts));
                replay(engine_config, script, &input, output.as_deref()).await
            }

            Command::Config { local, base_dir, keep_certs } => {
                let report = config_report(|key: &str| std::env::var(key).ok(), local, keep_certs, &base_dir)?;
                println!("{}", report);
                Ok(())
            }
        }
    }
}

/// Feed a recorded stream through a fresh engine and write out its answers.
async fn replay(engine_config: EngineConfig, script: AnswerScript, input: &Path, output: Option<&Path>) -> Result<()> {
    let broker = MemoryBroker::new();
    let file = std::fs::File::open(input).with_context(|| format!("Failed to open {}", input.display()))?;

    let mut loaded = 0usize;
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        broker.append(REPLAY_TOPIC, line.into_bytes());
        loaded += 1;
    }
    broker.close();
    tracing::info!("Loaded {} messages from {}", loaded, input.display());

    let handler = ScriptedHandler::new(engine_config.team_name.clone(), script);
    let channel = broker.channel(REPLAY_TOPIC, &engine_config.team_name);
    let mut rapid = Rapid::new(engine_config, channel, handler)?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        trigger.cancel();
    });

    let result = rapid.run(cancel).await;
    rapid.close().await?;

    let mut writer: Box<dyn Write> = match output {
        Some(path) => Box::new(
            std::fs::File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout().lock()),
    };

    for raw in broker.messages(REPLAY_TOPIC).iter().skip(loaded) {
        if matches!(decode(raw), Ok(ref e) if e.kind() == MessageKind::Answer) {
            writer.write_all(raw)?;
            writer.write_all(b"\n")?;
        }
    }
    writer.flush()?;

    result?;
    Ok(())
}

/// Resolve the connection and render it as pretty JSON.
fn config_report<F>(lookup: F, local: bool, keep_certs: bool, base_dir: &Path) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    if !local {
        let connection = config::connection_from_lookup(lookup)?;
        let report = ConnectionReport { connection: &connection, username: None, note: None };
        return Ok(serde_json::to_string_pretty(&report)?);
    }

    let mut resolved = config::load_local_connection(lookup, base_dir)?;
    let note = if keep_certs {
        if let Some(dir) = resolved.keep_credentials() {
            tracing::info!("Keeping TLS files in {}", dir.display());
        }
        None
    } else {
        Some(EPHEMERAL_CERTS_NOTE)
    };
    let report = ConnectionReport {
        connection: &resolved.config,
        username: resolved.username.as_deref(),
        note,
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode, Envelope};

    #[test]
    fn test_parse_replay_arguments() {
        let args = Commands::try_parse_from([
            "quizrapid",
            "replay",
            "--team",
            "blue",
            "--input",
            "stream.jsonl",
            "--ignore-category",
            "ping",
            "--ignore-category",
            "team-registration",
            "--malformed",
            "skip",
        ])
        .unwrap();

        let Command::Replay { team, ignored_categories, malformed, .. } = args.command else {
            panic!("expected replay");
        };
        assert_eq!(team, "blue");
        assert_eq!(ignored_categories, vec!["ping", "team-registration"]);
        assert_eq!(malformed.policy(3), MalformedPolicy::SkipAndCommit);
    }

    const CREDS: &str = "broker: quiz.example.net\ntopics:\n  - quiz-round-1\nca: CA\nuser:\n  access_key: KEY\n  access_cert: CERT\n";

    fn report_json(keep_certs: bool, base_dir: &Path) -> serde_json::Value {
        let report = config_report(|_: &str| None, true, keep_certs, base_dir).unwrap();
        serde_json::from_str(&report).unwrap()
    }

    #[test]
    fn test_local_config_report_flags_ephemeral_certs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(config::LOCAL_CERTS_FILE), CREDS).unwrap();

        let report = report_json(false, dir.path());
        assert_eq!(report["note"], EPHEMERAL_CERTS_NOTE);
        let ca = PathBuf::from(report["tls"]["ca_path"].as_str().unwrap());
        assert!(!ca.exists());
    }

    #[test]
    fn test_local_config_report_keeps_certs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(config::LOCAL_CERTS_FILE), CREDS).unwrap();

        let report = report_json(true, dir.path());
        assert!(report.get("note").is_none());
        let ca = PathBuf::from(report["tls"]["ca_path"].as_str().unwrap());
        assert_eq!(std::fs::read_to_string(&ca).unwrap(), "CA");
        std::fs::remove_dir_all(ca.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_keep_certs_requires_local() {
        assert!(Commands::try_parse_from(["quizrapid", "config", "--keep-certs"]).is_err());
        assert!(Commands::try_parse_from(["quizrapid", "config", "--local", "--keep-certs"]).is_ok());
    }

    #[tokio::test]
    async fn test_replay_writes_answers() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("stream.jsonl");
        let output = dir.path().join("answers.jsonl");

        let question = Envelope::question("team-registration", "Register your team");
        let other = Envelope::question("history", "Who?");
        let lines = [
            String::from_utf8(encode(&question).unwrap()).unwrap(),
            "garbage".to_string(),
            String::from_utf8(encode(&other).unwrap()).unwrap(),
        ];
        std::fs::write(&input, lines.join("\n")).unwrap();

        let script: AnswerScript = serde_yaml::from_str("answers:\n  team-registration: \"{team}\"\n").unwrap();
        replay(EngineConfig::new("blue"), script, &input, Some(&output)).await.unwrap();

        let written = std::fs::read_to_string(&output).unwrap();
        let answers: Vec<Envelope> = written.lines().map(|l| decode(l.as_bytes()).unwrap()).collect();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].correlation_id(), question.message_id());
        let Envelope::Answer(answer) = &answers[0] else {
            panic!("expected answer");
        };
        assert_eq!(answer.answer, "blue");
    }
}
