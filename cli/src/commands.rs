//! Slash command parsing and handling

use std::str::FromStr;

use arbor_core::{
    ArborError, ConversationBackend, ConversationSession, ModelId, SendTarget, TurnId,
};

use crate::render;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    Help,
    /// Print the numbered sidebar tree
    Tree,
    /// Print the active viewport
    Show,
    View(TurnId),
    Use(ModelId),
    Send(String),
    Next(String),
    /// Branch from the given turn, or from the viewing turn
    Branch(Option<TurnId>),
    Root,
    TogglePrevious,
    Refresh,
}

pub enum CommandResult {
    Continue,
    Exit,
}

fn turn_arg(arg: Option<&str>, usage: &str) -> Result<TurnId, String> {
    let arg = arg.ok_or_else(|| format!("Usage: {usage}"))?;
    arg.parse()
        .map_err(|_| format!("Not a turn id: {arg}. Usage: {usage}"))
}

fn text_arg(rest: &str, usage: &str) -> Result<String, String> {
    if rest.is_empty() {
        Err(format!("Usage: {usage}"))
    } else {
        Ok(rest.to_string())
    }
}

impl FromStr for Command {
    type Err = String;

    /// `/command args`, or plain text to send into the viewing turn
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        let Some(command) = input.strip_prefix('/') else {
            return text_arg(input, "<message>").map(Command::Send);
        };

        let (name, rest) = command
            .split_once(char::is_whitespace)
            .map(|(name, rest)| (name, rest.trim()))
            .unwrap_or((command, ""));

        match name {
            "quit" | "exit" => Ok(Command::Quit),
            "help" => Ok(Command::Help),
            "tree" => Ok(Command::Tree),
            "show" => Ok(Command::Show),
            "view" => turn_arg(Some(rest).filter(|r| !r.is_empty()), "/view <turn>").map(Command::View),
            "use" => text_arg(rest, "/use <model>").map(|m| Command::Use(ModelId::from(m))),
            "send" => text_arg(rest, "/send <message>").map(Command::Send),
            "next" => text_arg(rest, "/next <message>").map(Command::Next),
            "branch" if rest.is_empty() => Ok(Command::Branch(None)),
            "branch" => turn_arg(Some(rest), "/branch [turn]").map(|t| Command::Branch(Some(t))),
            "root" => Ok(Command::Root),
            "prev" => Ok(Command::TogglePrevious),
            "refresh" => Ok(Command::Refresh),
            "" => Err("Empty command".to_string()),
            _ => Err(format!(
                "Unknown command: /{name}. Type /help for available commands."
            )),
        }
    }
}

impl Command {
    pub async fn execute<B>(self, session: &ConversationSession<B>) -> Result<CommandResult, ArborError>
    where
        B: ConversationBackend + ?Sized,
    {
        match self {
            Command::Quit => {
                println!("Goodbye!");
                return Ok(CommandResult::Exit);
            }
            Command::Help => print_help(),
            Command::Tree => {
                let viewing = session.active_snapshot()?.viewing_turn;
                print!("{}", render::outline(&session.outline(), viewing));
            }
            Command::Show => show(session)?,
            Command::View(turn) => {
                session.navigate(turn);
                show(session)?;
            }
            Command::Use(model) => {
                session.activate(&model)?;
                show(session)?;
            }
            Command::Send(text) => {
                session.send_message(text, SendTarget::ViewingTurn).await?;
                show(session)?;
            }
            Command::Next(text) => {
                session.send_message(text, SendTarget::NextTurn).await?;
                show(session)?;
            }
            Command::Branch(parent) => {
                let parent = match parent.or(session.active_snapshot()?.viewing_turn) {
                    Some(parent) => parent,
                    None => {
                        println!("Nothing to branch from yet; send a message or use /root.");
                        return Ok(CommandResult::Continue);
                    }
                };
                let created = session.create_branch(parent).await?;
                println!("Created turn {} from turn {}", created.turn_id, parent);
                show(session)?;
            }
            Command::Root => {
                let created = session.create_root().await?;
                println!("Started conversation {}", created.turn_id);
                show(session)?;
            }
            Command::TogglePrevious => {
                let shown = session.toggle_previous();
                println!("Previous turns {}", if shown { "shown" } else { "hidden" });
                show(session)?;
            }
            Command::Refresh => {
                let forest = session.refresh_tree().await?;
                println!("Tree has {} turns", forest.node_count());
            }
        }
        Ok(CommandResult::Continue)
    }
}

fn show<B: ConversationBackend + ?Sized>(session: &ConversationSession<B>) -> Result<(), ArborError> {
    let snapshot = session.active_snapshot()?;
    print!("{}", render::viewport(&snapshot, |id| session.message(id)));
    Ok(())
}

fn print_help() {
    println!("Available commands:");
    println!("  <message>, /send <message>  - Send into the viewing turn");
    println!("  /next <message>             - Open the next turn after a completed one");
    println!("  /branch [turn]              - Branch from a turn (default: viewing turn)");
    println!("  /root                       - Start a new top-level conversation");
    println!("  /view <turn>                - Move the active viewport to a turn");
    println!("  /use <model>                - Switch the active model viewport");
    println!("  /tree                       - Show the numbered conversation tree");
    println!("  /show                       - Show the active viewport");
    println!("  /prev                       - Toggle messages from earlier turns");
    println!("  /refresh                    - Refetch the tree");
    println!("  /quit, /exit                - Exit");
}
