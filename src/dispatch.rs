//! Event dispatch
//!
//! The [`Dispatcher`] turns transport events into actions. It owns no
//! connection state: connect and disconnect are only logged, and the only
//! thing it asks of the transport is the subscription list.
//!
//! Actions never fail the dispatch. Every failure is logged with the command
//! and its captured output, reported in the returned [`Dispatch`], and the
//! next action (and the next message) proceeds as usual.

use crate::notify::NotificationSink;
use crate::rules::{Rule, RuleTable, Subscription};
use crate::shell::CommandRunner;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Command(String),
    Notify(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    Success,
    /// Dry run, nothing was executed
    Skipped,
    CommandFailed {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    /// The shell itself could not be started
    SpawnFailed(String),
    NotificationFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResult {
    pub action: Action,
    pub kind: ActionKind,
}

impl ActionResult {
    pub fn is_failure(&self) -> bool {
        !matches!(self.kind, ActionKind::Success | ActionKind::Skipped)
    }
}

/// What happened to one incoming message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    UnknownTopic,
    PayloadMismatch { expected: String },
    Executed(Vec<ActionResult>),
}

pub struct Dispatcher<R> {
    rules: RuleTable,
    runner: R,
    sink: NotificationSink,
}

impl<R: CommandRunner> Dispatcher<R> {
    pub fn new(rules: RuleTable, runner: R, sink: NotificationSink) -> Self {
        Self {
            rules,
            runner,
            sink,
        }
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Connected to the broker; returns the topics to subscribe to, if any
    pub fn on_connect(&self, reason: &str) -> Option<&[Subscription]> {
        tracing::info!(reason, "connected");

        let topics = self.rules.subscription_topics();
        if topics.is_empty() {
            tracing::warn!("no topics configured, not subscribing");
            return None;
        }

        tracing::info!(count = topics.len(), "subscribing");
        Some(topics)
    }

    pub fn on_connect_failed(&self, reason: &str) {
        tracing::error!(reason, "connection failed");
    }

    pub fn on_disconnect(&self, reason: &str) {
        tracing::info!(reason, "disconnected");
    }

    pub fn on_message(&self, topic: &str, payload: &str) -> Dispatch {
        tracing::info!("{} -> {}", topic, payload);

        let Some(rule) = self.rules.lookup(topic) else {
            tracing::warn!(topic, "no rule for topic");
            return Dispatch::UnknownTopic;
        };

        if rule.payload != payload {
            tracing::warn!(
                topic,
                expected = %rule.payload,
                "Unknown payload \"{}\"",
                payload
            );
            return Dispatch::PayloadMismatch {
                expected: rule.payload.clone(),
            };
        }

        Dispatch::Executed(self.execute(rule))
    }

    /// Command first, then notification; a failure in one never stops the other
    fn execute(&self, rule: &Rule) -> Vec<ActionResult> {
        let mut results = Vec::with_capacity(2);

        if let Some(command) = &rule.command {
            results.push(ActionResult {
                action: Action::Command(command.clone()),
                kind: self.run_command(command),
            });
        }

        if let Some(text) = &rule.notification {
            results.push(ActionResult {
                action: Action::Notify(text.clone()),
                kind: self.notify(text),
            });
        }

        results
    }

    fn run_command(&self, command: &str) -> ActionKind {
        if self.runner.is_dry_run() {
            tracing::info!(command, "dry run: would run");
            return ActionKind::Skipped;
        }

        match self.runner.run(command) {
            Ok(output) if output.success() => {
                tracing::info!("{} -> {}", command, output.exit_code);
                ActionKind::Success
            }
            Ok(output) => {
                tracing::error!(
                    command,
                    exit_code = output.exit_code,
                    stdout = %output.stdout.trim_end(),
                    stderr = %output.stderr.trim_end(),
                    "{} returned {}",
                    command,
                    output.exit_code
                );
                ActionKind::CommandFailed {
                    exit_code: output.exit_code,
                    stdout: output.stdout,
                    stderr: output.stderr,
                }
            }
            Err(e) => {
                tracing::error!(command, error = %e, "command could not be started");
                ActionKind::SpawnFailed(e.to_string())
            }
        }
    }

    fn notify(&self, text: &str) -> ActionKind {
        if self.runner.is_dry_run() {
            tracing::info!(text, backend = self.sink.name(), "dry run: would display");
            return ActionKind::Skipped;
        }

        match self.sink.display_text(&self.runner, text) {
            Ok(()) => {
                tracing::info!(text, backend = self.sink.name(), "displayed");
                ActionKind::Success
            }
            Err(e) => {
                tracing::error!(text, backend = self.sink.name(), error = %e, "notification failed");
                ActionKind::NotificationFailed(e.to_string())
            }
        }
    }
}
