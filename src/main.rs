mod conf;
mod dispatch;
mod logging;
mod notify;
mod rules;
mod shell;
mod transport;

use crate::conf::Settings;
use crate::dispatch::{ActionKind, ActionResult, Dispatch, Dispatcher};
use crate::notify::NotificationSink;
use crate::rules::RuleTable;
use crate::shell::ShellRunner;
use crate::transport::MqttTransport;
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "mqtt-saver")]
#[command(about = "Run desktop actions in response to MQTT messages")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (default: ~/.config/mqtt-saver/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// MQTT server, overrides the config file
    #[arg(short, long, global = true)]
    server: Option<String>,

    /// MQTT port, overrides the config file
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Log to the console as well as the log file
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Don't execute anything, just log
    #[arg(short, long, global = true)]
    dry_run: bool,

    /// Log file (default: ~/.local/share/mqtt-saver/mqtt-saver.log)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the broker and dispatch messages (default)
    Run,

    /// Validate the config and required programs, then list subscriptions
    Check {
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Dispatch a single message locally without a broker
    Fire { topic: String, payload: String },
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum OutputFormat {
    Text,
    Json,
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load(cli.config.as_deref())?;

    if let Some(server) = &cli.server {
        settings.server = server.clone();
    }
    if let Some(port) = cli.port {
        settings.port = port;
    }
    settings.dry_run |= cli.dry_run;

    Ok(settings)
}

/// Programs that must be installed for the configured rules to work
fn required_programs(rules: &RuleTable, sink: &NotificationSink) -> Vec<&'static str> {
    let mut programs = vec!["sh"];
    if rules.iter().any(|rule| rule.notification.is_some()) {
        programs.extend(sink.required_programs());
    }
    programs
}

fn build_dispatcher(settings: &Settings) -> Result<Dispatcher<ShellRunner>> {
    let rules = RuleTable::build(settings.topics.iter().cloned()).context("Invalid [[topics]]")?;
    let sink = NotificationSink::from_settings(settings);

    if settings.dry_run {
        tracing::info!("dry run, skipping dependency check");
    } else {
        shell::ensure_programs(required_programs(&rules, &sink))?;
    }

    tracing::info!(
        rules = rules.len(),
        notify = sink.name(),
        dry_run = settings.dry_run,
        "dispatcher ready"
    );

    Ok(Dispatcher::new(rules, ShellRunner::new(settings.dry_run), sink))
}

async fn run_service(settings: Settings) -> Result<()> {
    let dispatcher = Arc::new(build_dispatcher(&settings)?);
    let transport = MqttTransport::new(&settings);
    transport.run(dispatcher).await?;
    Ok(())
}

fn check(settings: &Settings, format: OutputFormat) -> Result<()> {
    let dispatcher = build_dispatcher(settings)?;
    let rules = dispatcher.rules();

    match format {
        OutputFormat::Text => {
            println!("Server: {}:{}", settings.server, settings.port);
            println!("Notify: {}", settings.notify.as_str());
            println!();
            println!("{:<30} {:<12} {:<5} Actions", "Topic", "Payload", "QoS");
            println!("{}", "-".repeat(80));
            if rules.is_empty() {
                println!("No topics configured");
            }
            for (rule, sub) in rules.iter().zip(rules.subscription_topics()) {
                let mut actions = Vec::new();
                if let Some(command) = &rule.command {
                    actions.push(format!("run `{}`", command));
                }
                if let Some(text) = &rule.notification {
                    actions.push(format!("show \"{}\"", text));
                }
                if actions.is_empty() {
                    actions.push("none".to_string());
                }
                println!(
                    "{:<30} {:<12} {:<5} {}",
                    rule.topic,
                    rule.payload,
                    sub.qos,
                    actions.join(", ")
                );
            }
        }
        OutputFormat::Json => {
            let topics: Vec<_> = rules
                .iter()
                .zip(rules.subscription_topics())
                .map(|(rule, sub)| {
                    serde_json::json!({
                        "topic": rule.topic,
                        "payload": rule.payload,
                        "qos": sub.qos,
                        "command": rule.command,
                        "osd": rule.notification,
                    })
                })
                .collect();
            let json = serde_json::json!({
                "server": settings.server,
                "port": settings.port,
                "notify": settings.notify.as_str(),
                "topics": topics,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }

    Ok(())
}

fn fire(settings: &Settings, topic: &str, payload: &str) -> Result<()> {
    let dispatcher = build_dispatcher(settings)?;

    match dispatcher.on_message(topic, payload) {
        Dispatch::UnknownTopic => println!("No rule for topic {}", topic),
        Dispatch::PayloadMismatch { expected } => {
            println!("Payload \"{}\" does not match \"{}\"", payload, expected)
        }
        Dispatch::Executed(results) if results.is_empty() => println!("Rule has no actions"),
        Dispatch::Executed(results) => {
            for result in &results {
                let status = match &result.kind {
                    ActionKind::Success => "ok".to_string(),
                    ActionKind::Skipped => "skipped (dry run)".to_string(),
                    ActionKind::CommandFailed { exit_code, .. } => {
                        format!("failed with exit code {}", exit_code)
                    }
                    ActionKind::SpawnFailed(reason) | ActionKind::NotificationFailed(reason) => {
                        format!("failed: {}", reason)
                    }
                };
                println!("{:?}: {}", result.action, status);
            }
            if results.iter().any(ActionResult::is_failure) {
                return Err(anyhow!("One or more actions failed"));
            }
        }
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let log_file = match &cli.log_file {
        Some(path) => path.clone(),
        None => conf::default_log_path().ok_or_else(|| anyhow!("Could not find data directory"))?,
    };
    logging::init(&log_file, cli.verbose)?;

    let settings = load_settings(&cli)?;

    match cli.command {
        None | Some(Commands::Run) => run_service(settings).await,
        Some(Commands::Check { format }) => check(&settings, format),
        Some(Commands::Fire { topic, payload }) => fire(&settings, &topic, &payload),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
