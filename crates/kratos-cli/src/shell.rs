//! Interactive shell over the operation bridge.

use std::io::{IsTerminal, Write};

use anyhow::{anyhow, Context, Result};
use kratos_bridge::{OperationBridge, OperationKind, ParameterType};
use rustyline::{
    completion::{Completer, Pair},
    error::ReadlineError,
    highlight::Highlighter,
    hint::Hinter,
    history::DefaultHistory,
    validate::Validator,
    Config as ReadlineConfig, Context as ReadlineContext, Editor, Helper,
};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::commands::{render_catalog, render_history, render_result, render_status};

const SHELL_PROMPT: &str = "kratos> ";
const SHELL_COMMANDS: &[&str] = &["help", "status", "functions", "clusters", "history", "quit", "exit"];

pub(crate) const SHELL_HELP: &str = "\
Commands:
  help                     Show this help
  status                   Show bridge status
  functions                List available operations
  clusters                 List cluster contexts
  history [n]              Show the last n operations
  quit | exit | q          Leave the shell
  <operation> key=value    Run an operation, e.g. listPods namespace=all";

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ShellCommand {
    Empty,
    Help,
    Status,
    Functions,
    Clusters,
    History(Option<usize>),
    Quit,
    Invoke { operation: String, parameters: Value },
}

pub(crate) enum ShellControl {
    Continue(String),
    Exit,
}

/// Parses one shell line. Integer-typed catalog parameters are coerced from
/// their text form.
pub(crate) fn parse_shell_line(line: &str) -> Result<ShellCommand, String> {
    let tokens = shell_words::split(line.trim())
        .map_err(|error| format!("failed to parse input: {error}"))?;
    let Some((head, rest)) = tokens.split_first() else {
        return Ok(ShellCommand::Empty);
    };

    let command = match head.as_str() {
        "help" | "?" => ShellCommand::Help,
        "status" => ShellCommand::Status,
        "functions" | "catalog" => ShellCommand::Functions,
        "clusters" => ShellCommand::Clusters,
        "quit" | "exit" | "q" => ShellCommand::Quit,
        "history" => {
            let limit = match rest.first() {
                Some(raw) => Some(
                    raw.parse::<usize>()
                        .ok()
                        .filter(|limit| *limit > 0)
                        .ok_or_else(|| format!("history limit must be a positive integer, got '{raw}'"))?,
                ),
                None => None,
            };
            ShellCommand::History(limit)
        }
        operation => ShellCommand::Invoke {
            operation: operation.to_string(),
            parameters: parse_parameters(operation, rest)?,
        },
    };
    Ok(command)
}

fn parse_parameters(operation: &str, tokens: &[String]) -> Result<Value, String> {
    let spec = OperationKind::parse(operation).map(OperationKind::spec);
    let mut parameters = Map::new();
    for token in tokens {
        let Some((key, raw)) = token.split_once('=') else {
            return Err(format!("expected key=value, got '{token}'"));
        };
        let kind = spec
            .and_then(|spec| spec.parameter(key))
            .map(|parameter| parameter.kind);
        let value = match kind {
            Some(ParameterType::Integer) => raw
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("parameter '{key}' must be an integer, got '{raw}'"))?,
            _ => Value::from(raw),
        };
        parameters.insert(key.to_string(), value);
    }
    Ok(Value::Object(parameters))
}

/// Runs a parsed shell command. Cluster work is tracked as a task whose input
/// is the raw `line`.
pub(crate) async fn execute_shell_command(
    bridge: &OperationBridge,
    line: &str,
    command: ShellCommand,
    json: bool,
) -> ShellControl {
    let output = match command {
        ShellCommand::Empty => String::new(),
        ShellCommand::Help => SHELL_HELP.to_string(),
        ShellCommand::Quit => return ShellControl::Exit,
        ShellCommand::Status => render_status(&bridge.status().await, json),
        ShellCommand::Functions => render_catalog(json),
        ShellCommand::Clusters => {
            let rendered = bridge
                .dispatch_text_for(line.trim(), "listClusters", Value::Null)
                .await;
            render_result(&rendered, json)
        }
        ShellCommand::History(limit) => {
            let limit = limit.unwrap_or(bridge.config().history_limit_default);
            render_history(&bridge.recent_history(limit), json)
        }
        ShellCommand::Invoke {
            operation,
            parameters,
        } => {
            let rendered = bridge
                .dispatch_text_for(line.trim(), &operation, parameters)
                .await;
            render_result(&rendered, json)
        }
    };
    ShellControl::Continue(output)
}

async fn handle_line(bridge: &OperationBridge, line: &str, json: bool) -> bool {
    let command = match parse_shell_line(line) {
        Ok(command) => command,
        Err(error) => {
            println!("{error}");
            return true;
        }
    };
    match execute_shell_command(bridge, line, command, json).await {
        ShellControl::Continue(output) => {
            if !output.is_empty() {
                println!("{output}");
            }
            true
        }
        ShellControl::Exit => false,
    }
}

pub(crate) async fn run_shell(bridge: &OperationBridge, json: bool) -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stdout().is_terminal() {
        run_shell_tty(bridge, json).await
    } else {
        run_shell_stdin(bridge, json).await
    }
}

async fn run_shell_stdin(bridge: &OperationBridge, json: bool) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{SHELL_PROMPT}");
        std::io::stdout().flush().context("failed to flush stdout")?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if !handle_line(bridge, &line, json).await {
            break;
        }
    }
    Ok(())
}

async fn run_shell_tty(bridge: &OperationBridge, json: bool) -> Result<()> {
    let mut editor = build_shell_editor()?;
    println!("{SHELL_HELP}");
    loop {
        let readline = tokio::task::block_in_place(|| editor.readline(SHELL_PROMPT));
        let line = match readline {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(error) => return Err(anyhow!("failed to read interactive input: {error}")),
        };
        if line.trim().is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(line.as_str());
        if !handle_line(bridge, &line, json).await {
            break;
        }
    }
    Ok(())
}

fn build_shell_editor() -> Result<Editor<ShellCompleter, DefaultHistory>> {
    let config = ReadlineConfig::builder().build();
    let mut editor = Editor::<ShellCompleter, DefaultHistory>::with_config(config)
        .context("failed to initialize interactive editor")?;
    editor.set_helper(Some(ShellCompleter::new()));
    Ok(editor)
}

struct ShellCompleter {
    candidates: Vec<String>,
}

impl ShellCompleter {
    fn new() -> Self {
        let candidates = SHELL_COMMANDS
            .iter()
            .map(|command| (*command).to_string())
            .chain(OperationKind::ALL.iter().map(|kind| kind.name().to_string()))
            .collect();
        Self { candidates }
    }
}

impl Helper for ShellCompleter {}
impl Validator for ShellCompleter {}
impl Highlighter for ShellCompleter {}

impl Hinter for ShellCompleter {
    type Hint = String;
}

impl Completer for ShellCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &ReadlineContext<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let safe_pos = pos.min(line.len());
        if line[..safe_pos].contains(char::is_whitespace) {
            return Ok((safe_pos, Vec::new()));
        }
        let token = &line[..safe_pos];
        let matches = self
            .candidates
            .iter()
            .filter(|candidate| candidate.starts_with(token))
            .map(|candidate| Pair {
                display: candidate.clone(),
                replacement: candidate.clone(),
            })
            .collect();
        Ok((0, matches))
    }
}
