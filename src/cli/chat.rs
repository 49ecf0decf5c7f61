use std::sync::Arc;

use anyhow::{Result, anyhow};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use super::Workspace;
use super::characters::print_character;
use crate::chat::{ChatSession, MessageId, Rejection, Role};
use crate::core::AppConfig;
use crate::gateway::HttpGateway;
use crate::markdown::Projector;
use crate::view::{ChatView, MessageNode, Notice};

const HELP: &str = "\
Type a message and press enter to send it.

/edit <id> [text]   Replace a message. Without text the message is prefilled
/delete <id>        Remove a message
/reroll [id]        Ask again for the newest reply
/copy <id>          Print the raw text of a message
/clear              Start over
/theme              Switch between light and dark
/character [id]     List characters or switch to one
/stats              Show turn and reroll counts
/html               Print the conversation as HTML
/help               Show this message
/quit               Leave";

#[derive(Debug, PartialEq)]
pub enum Input {
    Send(String),
    Edit(MessageId, Option<String>),
    Delete(MessageId),
    Reroll(Option<MessageId>),
    Copy(MessageId),
    Clear,
    Theme,
    Character(Option<String>),
    Stats,
    Html,
    Help,
    Quit,
    Nothing,
}

fn parse_id(arg: Option<&str>) -> Result<MessageId> {
    let arg = arg.ok_or_else(|| anyhow!("Missing message id"))?;
    let id = arg
        .parse::<u64>()
        .map_err(|_| anyhow!("Not a message id: {}", arg))?;
    Ok(MessageId(id))
}

/// Parses a line typed at the prompt. Anything not starting with `/`
/// is a message to send.
pub fn parse_input(line: &str) -> Result<Input> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(Input::Nothing);
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return Ok(Input::Send(line.to_string()));
    };

    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };
    let rest = if rest.is_empty() { None } else { Some(rest) };

    let input = match name {
        "edit" => {
            let (id, text) = match rest.and_then(|r| r.split_once(char::is_whitespace)) {
                Some((id, text)) => (Some(id), Some(text.trim().to_string())),
                None => (rest, None),
            };
            Input::Edit(parse_id(id)?, text)
        }
        "delete" => Input::Delete(parse_id(rest)?),
        "reroll" => match rest {
            Some(_) => Input::Reroll(Some(parse_id(rest)?)),
            None => Input::Reroll(None),
        },
        "copy" => Input::Copy(parse_id(rest)?),
        "clear" => Input::Clear,
        "theme" => Input::Theme,
        "character" => Input::Character(rest.map(str::to_string)),
        "stats" => Input::Stats,
        "html" => Input::Html,
        "help" => Input::Help,
        "quit" | "exit" => Input::Quit,
        other => return Err(anyhow!("Unknown command /{}. Try /help", other)),
    };
    Ok(input)
}

fn print_node(node: &MessageNode) {
    let who = match node.role {
        Role::User => "you",
        Role::Assistant => "bot",
    };
    println!("[{}] {}: {}", node.id, who, node.raw);
}

/// Tells the user which reply `/reroll` would replace now.
fn reroll_hint(view: &ChatView) -> String {
    match view.reroll_target() {
        Some(target) => format!("/reroll now targets message {}", target),
        None => "Nothing left to reroll".to_string(),
    }
}

fn print_notice(notice: Notice) {
    println!("({})", notice.text());
}

struct Repl {
    session: ChatSession,
    workspace: Workspace,
    view: ChatView,
    projector: Projector,
    editor: DefaultEditor,
}

impl Repl {
    async fn refresh(&mut self) {
        let view = &mut self.view;
        let projector = &self.projector;
        self.session
            .read(|c| {
                view.sync(c.log(), projector);
                view.set_stats(c.stats());
            })
            .await;
    }

    fn print_header(&self) {
        let header = self.view.header();
        if header.subtitle.is_empty() {
            println!("== {} ==", header.title);
        } else {
            println!("== {} ({}) ==", header.title, header.subtitle);
        }
    }

    fn print_latest(&self) {
        if let Some(node) = self.view.nodes().last() {
            print_node(node);
        }
    }

    fn print_all(&self) {
        for node in self.view.nodes() {
            print_node(node);
        }
    }

    async fn edit(&mut self, id: MessageId, text: Option<String>) -> Result<(), Rejection> {
        let Some(raw) = self.view.begin_edit(id) else {
            return Err(Rejection::UnknownMessage(id));
        };

        let draft = match text {
            Some(text) => Some(text),
            None => match self.editor.readline_with_initial("edit> ", (raw.as_str(), "")) {
                Ok(line) => Some(line),
                Err(_) => None,
            },
        };

        let draft = match draft {
            Some(draft) if !draft.trim().is_empty() => draft,
            _ => {
                if let Some(notice) = self.view.cancel_edit(id) {
                    print_notice(notice);
                }
                return Ok(());
            }
        };

        self.view.update_draft(id, &draft);
        let result = self.session.edit(id, &draft).await;
        match result {
            Ok(()) => {
                if let Some(notice) = self.view.finish_edit(id) {
                    print_notice(notice);
                }
                self.refresh().await;
                if let Some(node) = self.view.node(id) {
                    print_node(node);
                }
                Ok(())
            }
            Err(err) => {
                self.view.cancel_edit(id);
                Err(err)
            }
        }
    }

    async fn switch_character(&mut self, id: Option<String>) {
        let directory = &mut self.workspace.directory;
        match id {
            None => {
                let active_id = directory.active().id.clone();
                for character in directory.list() {
                    print_character(character, character.id == active_id);
                }
            }
            Some(id) => {
                directory.load().await;
                let active = directory.select(&id).await;
                let (title, subtitle) = (active.name.clone(), active.subtitle.clone());
                self.view.set_character(&title, &subtitle);
                self.print_header();
            }
        }
    }

    /// Handles one line of input. Returns false when the user wants to
    /// leave.
    async fn handle(&mut self, input: Input) -> Result<bool> {
        match input {
            Input::Nothing => {}
            Input::Send(text) => {
                self.session.send(&text).await?;
                self.refresh().await;
                self.print_latest();
            }
            Input::Edit(id, text) => self.edit(id, text).await?,
            Input::Delete(id) => {
                self.session.delete(id).await?;
                self.refresh().await;
                println!("Deleted message {}", id);
                println!("{}", reroll_hint(&self.view));
            }
            Input::Reroll(id) => {
                match id {
                    Some(id) => self.session.reroll(id).await?,
                    None => self.session.reroll_latest().await?,
                };
                self.refresh().await;
                self.print_latest();
            }
            Input::Copy(id) => {
                let (raw, notice) = self
                    .view
                    .copy(id)
                    .ok_or(Rejection::UnknownMessage(id))?;
                println!("{}", raw);
                print_notice(notice);
            }
            Input::Clear => {
                self.session.clear().await;
                self.refresh().await;
                println!("Conversation cleared");
            }
            Input::Theme => {
                let theme = self.workspace.prefs.toggle_theme().await;
                self.view.set_theme(theme);
                println!("Theme: {}", theme);
            }
            Input::Character(id) => self.switch_character(id).await,
            Input::Stats => {
                let stats = self.view.header().stats;
                println!(
                    "Turns: {}  Rerolls: {}  Last reply: {} chars",
                    stats.turn_count, stats.reroll_count, stats.last_reply_length
                );
            }
            Input::Html => println!("{}", self.view.to_html()),
            Input::Help => println!("{}", HELP),
            Input::Quit => return Ok(false),
        }
        Ok(true)
    }
}

pub async fn run(config: &AppConfig, character: Option<String>) -> Result<()> {
    let editor = DefaultEditor::new()?;

    let mut workspace = Workspace::open_or_degrade(config).await;
    let active = match character {
        Some(id) => {
            workspace.directory.load().await;
            workspace.directory.select(&id).await
        }
        None => workspace.directory.restore().await,
    };
    let (title, subtitle) = (active.name.clone(), active.subtitle.clone());

    let gateway = HttpGateway::with_timeout(&config.endpoint, config.request_timeout)?;
    tracing::debug!("Chatting via {}", gateway.endpoint());
    let session = ChatSession::new(Arc::new(gateway), workspace.prefs.clone());

    let mut view = ChatView::new();
    view.set_character(&title, &subtitle);
    view.set_theme(workspace.prefs.theme().await);

    let mut repl = Repl {
        session,
        workspace,
        view,
        projector: Projector::default(),
        editor,
    };
    repl.print_header();
    repl.refresh().await;
    repl.print_all();
    println!("Type /help for commands");

    loop {
        let readline = repl.editor.readline(">>> ");
        match readline {
            Ok(line) => {
                let input = match parse_input(&line) {
                    Ok(input) => input,
                    Err(err) => {
                        println!("{}", err);
                        continue;
                    }
                };
                match repl.handle(input).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(err) => println!("{}", err),
                }
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}
