//! Terminal front end: argument parsing and the interactive chat loop.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Notify;

use crate::orchestrator::{ChatOrchestrator, SubmitOutcome, Submission};
use crate::types::OutputEvent;

/// sidechat - ask LLMs about your workspace, with @file.ext mentions
#[derive(Parser, Debug)]
#[command(name = "sidechat")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Workspace directory indexed for @mentions
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Backend index the fallback chain starts from
    #[arg(long)]
    pub backend: Option<usize>,

    /// Append replies to <NAME>.md in the workspace instead of printing them
    #[arg(long, value_name = "NAME", num_args = 0..=1, default_missing_value = "output")]
    pub write_to_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    Clear,
    Models,
    Model(usize),
    Attach(String),
    Detach,
    Reindex,
    Help,
    Say(String),
}

/// Parse one input line. Returns `None` for blank lines.
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let input = line.trim();
    if input.is_empty() {
        return Ok(None);
    }
    if !input.starts_with('/') {
        return Ok(Some(Command::Say(input.to_string())));
    }

    let (name, rest) = match input.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (input, ""),
    };
    let command = match name {
        "/quit" | "/exit" => Command::Quit,
        "/clear" => Command::Clear,
        "/models" => Command::Models,
        "/model" => Command::Model(
            rest.parse()
                .with_context(|| format!("Usage: /model <index> (got '{}')", rest))?,
        ),
        "/attach" if !rest.is_empty() => Command::Attach(rest.to_string()),
        "/attach" => anyhow::bail!("Usage: /attach <file>"),
        "/detach" => Command::Detach,
        "/reindex" => Command::Reindex,
        "/help" => Command::Help,
        other => anyhow::bail!("Unknown command: {} (try /help)", other),
    };
    Ok(Some(command))
}

const HELP: &str = "\
Commands:
  /models          list backends
  /model <n>       start the fallback chain at backend n
  /attach <file>   attach a file's text as context for the next question
  /detach          drop the attachment
  /reindex         rescan the workspace for mentionable files
  /clear           clear the conversation history
  /quit            leave
Mention workspace files with @name.ext. Ctrl-C stops a reply, or leaves when idle.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InterruptAction {
    StopReply,
    Quit,
}

fn interrupt_action(responding: bool) -> InterruptAction {
    if responding {
        InterruptAction::StopReply
    } else {
        InterruptAction::Quit
    }
}

/// Prints output events as they arrive. Response events carry the full
/// running text, so only the unseen suffix is written.
#[derive(Default)]
struct Renderer {
    shown: String,
}

impl Renderer {
    fn render(&mut self, event: OutputEvent, out: &mut impl Write) -> std::io::Result<()> {
        match event {
            OutputEvent::Question(_) => self.end_reply(out)?,
            OutputEvent::Loading => writeln!(out, "Assistant >")?,
            OutputEvent::Content(text) => {
                if !text.is_empty() {
                    writeln!(out, "[Attached]\n{}", text)?;
                }
            }
            OutputEvent::Response(text) => {
                match text.strip_prefix(self.shown.as_str()) {
                    Some(rest) => write!(out, "{}", rest)?,
                    None => write!(out, "\n{}", text)?,
                }
                self.shown = text;
            }
            OutputEvent::Selection {
                question,
                range_max,
                ..
            } => {
                self.end_reply(out)?;
                write!(out, "{}", question)?;
                writeln!(out, "Reply with a number from 1 to {}.", range_max)?;
            }
            OutputEvent::Warning(text) => {
                self.end_reply(out)?;
                writeln!(out, "[Warning: {}]", text)?;
            }
            OutputEvent::Error { message, question } => {
                self.end_reply(out)?;
                writeln!(out, "[Error: {}]", message)?;
                writeln!(out, "[Question was: {}]", question)?;
            }
        }
        out.flush()
    }

    fn end_reply(&mut self, out: &mut impl Write) -> std::io::Result<()> {
        if !self.shown.is_empty() {
            writeln!(out, "\n")?;
            self.shown.clear();
        }
        Ok(())
    }
}

async fn render_events(mut events: UnboundedReceiver<OutputEvent>) {
    let mut renderer = Renderer::default();
    while let Some(event) = events.recv().await {
        let mut stdout = std::io::stdout().lock();
        if renderer.render(event, &mut stdout).is_err() {
            break;
        }
    }
    let _ = renderer.end_reply(&mut std::io::stdout().lock());
}

pub async fn run_chat_loop(
    chat: Arc<ChatOrchestrator>,
    events: UnboundedReceiver<OutputEvent>,
    root: &Path,
) -> Result<()> {
    let renderer = tokio::spawn(render_events(events));

    let quit = Arc::new(Notify::new());
    let interrupt = {
        let chat = chat.clone();
        let quit = quit.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                match interrupt_action(chat.is_responding()) {
                    InterruptAction::StopReply => {
                        tracing::info!("interrupt received, stopping reply");
                        chat.cancel();
                    }
                    InterruptAction::Quit => {
                        tracing::info!("interrupt received while idle, leaving");
                        quit.notify_one();
                        break;
                    }
                }
            }
        })
    };

    println!("Type your message. /help lists commands, /quit leaves.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    // Bare name awaiting a numeric answer.
    let mut pending: Option<String> = None;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break,
            },
            _ = quit.notified() => {
                println!("\nGoodbye!");
                break;
            }
        };
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("[{}]", e);
                continue;
            }
        };

        match command {
            Command::Quit => {
                println!("Goodbye!");
                break;
            }
            Command::Clear => {
                chat.clear_history();
                println!("[Cleared]");
            }
            Command::Help => println!("{}", HELP),
            Command::Models => {
                let selected = chat.selected_backend();
                for (i, name) in chat.backend_names().iter().enumerate() {
                    let marker = if i == selected { "*" } else { " " };
                    println!("{} {} {}", marker, i, name);
                }
            }
            Command::Model(index) => match chat.select_backend(index) {
                Ok(()) => println!("[Backend {} selected]", index),
                Err(e) => println!("[{}]", e),
            },
            Command::Attach(file) => {
                let path = root.join(&file);
                match tokio::fs::read_to_string(&path).await {
                    Ok(text) => {
                        if !chat.attach_selection(&text).await {
                            println!("[Nothing to attach: {} is blank]", file);
                        }
                    }
                    Err(e) => println!("[Failed to read {}: {}]", path.display(), e),
                }
            }
            Command::Detach => {
                if !chat.remove_attachment().await {
                    println!("[No attachment]");
                }
            }
            Command::Reindex => match chat.refresh_index().await {
                Ok(names) => println!("[Index] {} file names", names),
                Err(e) => println!("[Reindex failed: {:#}]", e),
            },
            Command::Say(text) => {
                let submission = match &pending {
                    Some(bare_name) if text.chars().all(|c| c.is_ascii_digit()) => {
                        Submission::answer(text, Some(bare_name.clone()))
                    }
                    _ => Submission::question(text),
                };
                match chat.submit(submission).await {
                    SubmitOutcome::Ignored => println!("[Still responding]"),
                    SubmitOutcome::NeedsChoice { bare_name, .. } => pending = Some(bare_name),
                    SubmitOutcome::Finished(_) => pending = None,
                }
            }
        }
    }

    interrupt.abort();
    // The task holds a clone of the orchestrator until it has finished.
    let _ = interrupt.await;
    // Dropping the orchestrator closes the event channel and ends the renderer.
    drop(chat);
    let _ = renderer.await;
    Ok(())
}
