//! Runs accepted prompt lines through kubectl and relays the result to the terminal.

use clap::ValueEnum;
use std::io::Write;
use std::sync::Arc;

use super::completer::exclude_options;
use super::runner::CommandRunner;
use crate::audit::{AuditContext, AuditSink};
use crate::cancel::CancelToken;
use crate::prompt::{ConsoleInput, Executor};
use crate::pty_session::bridge_pty;
use crate::telemetry::content_logging_enabled;

/// Cursor home plus erase display.
pub const CLEAR_SCREEN: &[u8] = b"\x1b[H\x1b[2J";

/// Ends the session; handled by the prompt's exit checker, never run.
pub const EXIT_COMMAND: &str = "exit";

/// How commands are classified as needing a live terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum InteractiveMatch {
    /// Any occurrence of `exec`, `logs`, `edit` or `-w` in the raw text.
    #[default]
    Substring,
    /// The verb is `exec`, `logs`, `edit` or `attach`, or a `-w`/`--watch` flag is present.
    Verb,
}

pub fn is_interactive(command: &str, mode: InteractiveMatch) -> bool {
    match mode {
        InteractiveMatch::Substring => ["exec", "logs", "edit", "-w"]
            .iter()
            .any(|needle| command.contains(needle)),
        InteractiveMatch::Verb => {
            let tokens: Vec<&str> = command.split_whitespace().collect();
            let watching = tokens.iter().any(|token| {
                matches!(*token, "-w" | "--watch")
                    || token.starts_with("-w=")
                    || token.starts_with("--watch=")
            });
            let (positional, _) = exclude_options(&tokens);
            watching
                || matches!(
                    positional.first().map(String::as_str),
                    Some("exec" | "logs" | "edit" | "attach")
                )
        }
    }
}

pub fn is_clear(command: &str) -> bool {
    command.split_whitespace().any(|token| token == "clear")
}

/// `config view` with `--raw`/`--flatten` prints credentials; never relay it.
pub fn is_sensitive<S: AsRef<str>>(args: &[S]) -> bool {
    let tokens: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
    let config_view = tokens
        .iter()
        .position(|token| *token == "config")
        .is_some_and(|at| tokens[at + 1..].contains(&"view"));
    let revealing = tokens.iter().any(|token| {
        let flag = token.split('=').next().unwrap_or_default();
        flag == "--raw" || flag == "--flatten"
    });
    config_view && revealing
}

/// Rewrite every `\n` as `\r\n` for a raw-mode terminal.
pub fn to_crlf(output: &[u8]) -> Vec<u8> {
    let mut converted = Vec::with_capacity(output.len() + output.len() / 16);
    for &byte in output {
        if byte == b'\n' {
            converted.push(b'\r');
        }
        converted.push(byte);
    }
    converted
}

/// Session-bound kubectl executor. `output` and `input` are the session transport.
pub struct KubectlExecutor<W: Write + Send> {
    output: W,
    input: Arc<dyn ConsoleInput>,
    runner: Arc<dyn CommandRunner>,
    default_args: Vec<String>,
    rows: u16,
    cols: u16,
    interactive_match: InteractiveMatch,
    audit: Option<(Arc<dyn AuditSink>, AuditContext)>,
}

impl<W: Write + Send> KubectlExecutor<W> {
    pub fn new(
        output: W,
        input: Arc<dyn ConsoleInput>,
        runner: Arc<dyn CommandRunner>,
        default_args: Vec<String>,
        rows: u16,
        cols: u16,
    ) -> Self {
        Self {
            output,
            input,
            runner,
            default_args,
            rows,
            cols,
            interactive_match: InteractiveMatch::default(),
            audit: None,
        }
    }

    pub fn with_interactive_match(mut self, mode: InteractiveMatch) -> Self {
        self.interactive_match = mode;
        self
    }

    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>, context: AuditContext) -> Self {
        self.audit = Some((sink, context));
        self
    }

    /// Non-empty default flags followed by the command's non-empty tokens.
    pub fn command_args(&self, command: &str) -> Vec<String> {
        self.default_args
            .iter()
            .map(String::as_str)
            .chain(command.split(' '))
            .filter(|arg| !arg.trim().is_empty())
            .map(str::to_string)
            .collect()
    }

    fn write(&mut self, bytes: &[u8]) {
        if let Err(err) = self.output.write_all(bytes).and_then(|()| self.output.flush()) {
            tracing::debug!(error = %err, "unable to write command output");
        }
    }

    fn audit(&self, command: &str) {
        let Some((sink, context)) = &self.audit else {
            return;
        };
        if let Err(err) = sink.record(&context.command_record(command)) {
            tracing::error!(error = %err, "unable to record audit event");
        }
    }

    fn run_interactive(&mut self, cancel: &CancelToken, args: &[String]) {
        let env = [
            ("KUBE_EDITOR".to_string(), "vim".to_string()),
            ("TERM".to_string(), "xterm-256color".to_string()),
        ];
        let child = match self.runner.spawn_pty(args, &env, self.rows, self.cols) {
            Ok(child) => child,
            Err(err) => {
                tracing::info!(error = %err, "unable to start interactive command");
                self.write(format!("{err:#}\r\n").as_bytes());
                return;
            }
        };
        let input = Arc::clone(&self.input);
        let outcome = bridge_pty(&child, input.as_ref(), &mut self.output, cancel);
        tracing::info!(
            exit_code = outcome.exit_status.and_then(|status| status.code()),
            interrupted = outcome.interrupted,
            "interactive command finished"
        );
    }

    fn run_captured(&mut self, cancel: &CancelToken, args: &[String]) {
        match self.runner.run(args, cancel, None) {
            Ok(output) => {
                if !output.success() {
                    tracing::info!(exit_code = output.code, "command exited unsuccessfully");
                }
                self.write(&to_crlf(&output.combined));
            }
            Err(err) => {
                tracing::info!(error = %err, "unable to run command");
                self.write(format!("{err}\r\n").as_bytes());
            }
        }
    }
}

impl<W: Write + Send> Executor for KubectlExecutor<W> {
    fn execute(&mut self, cancel: &CancelToken, command: &str) {
        let command = command.trim_matches(' ');
        if command.is_empty() {
            return;
        }
        self.audit(command);
        if content_logging_enabled() {
            tracing::debug!(command, "executing");
        }

        if command == EXIT_COMMAND {
            return;
        }
        if is_clear(command) {
            self.write(CLEAR_SCREEN);
            return;
        }

        let args = self.command_args(command);
        if is_sensitive(&args) {
            tracing::info!("suppressed credential-revealing config view");
            return;
        }
        if is_interactive(command, self.interactive_match) {
            self.run_interactive(cancel, &args);
        } else {
            self.run_captured(cancel, &args);
        }
    }
}
