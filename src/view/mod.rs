//! The view model for a conversation: one node per message, in log
//! order, with the actions each node offers. It is rebuilt from the
//! log after every change and never consulted as a source of truth.
pub mod html;

use crate::chat::{MessageId, Role, SessionStats, Transcript, latest_assistant_id};
use crate::gateway::is_failure_text;
use crate::markdown::Projector;
use crate::storage::Theme;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Copy,
    Edit,
    Delete,
    Reroll,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Copy => "copy",
            Action::Edit => "edit",
            Action::Delete => "delete",
            Action::Reroll => "reroll",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Action::Copy => "Copy",
            Action::Edit => "Edit",
            Action::Delete => "Delete",
            Action::Reroll => "Reroll",
        }
    }
}

/// Short lived feedback for the user, e.g. a toast.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    Copied,
    EditCancelled,
    EditSaved,
}

impl Notice {
    pub fn text(&self) -> &'static str {
        match self {
            Notice::Copied => "Copied to clipboard",
            Notice::EditCancelled => "Edit cancelled",
            Notice::EditSaved => "Message updated",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MessageNode {
    pub id: MessageId,
    pub role: Role,
    /// Text before markdown rendering
    pub raw: String,
    pub html: String,
    pub actions: Vec<Action>,
    /// Draft text while the node is being edited
    pub editing: Option<String>,
    pub is_error: bool,
}

impl MessageNode {
    pub fn has_action(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Header {
    pub title: String,
    pub subtitle: String,
    pub theme: Theme,
    pub stats: SessionStats,
}

#[derive(Default)]
pub struct ChatView {
    nodes: Vec<MessageNode>,
    header: Header,
}

impl ChatView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[MessageNode] {
        &self.nodes
    }

    pub fn node(&self, id: MessageId) -> Option<&MessageNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn set_character(&mut self, title: &str, subtitle: &str) {
        self.header.title = title.to_string();
        self.header.subtitle = subtitle.to_string();
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.header.theme = theme;
    }

    pub fn set_stats(&mut self, stats: SessionStats) {
        self.header.stats = stats;
    }

    /// Rebuilds every node from the log. Nodes that were being edited
    /// and still exist stay in edit mode.
    pub fn sync(&mut self, log: &Transcript, projector: &Projector) {
        let reroll_target = latest_assistant_id(log);
        let nodes = log
            .iter()
            .map(|msg| {
                let mut actions = vec![Action::Copy, Action::Edit, Action::Delete];
                if msg.role == Role::Assistant && Some(msg.id) == reroll_target {
                    actions.push(Action::Reroll);
                }
                let editing = self.node(msg.id).and_then(|n| n.editing.clone());
                MessageNode {
                    id: msg.id,
                    role: msg.role,
                    raw: msg.text.clone(),
                    html: projector.project(&msg.text),
                    actions,
                    editing,
                    is_error: msg.role == Role::Assistant && is_failure_text(&msg.text),
                }
            })
            .collect();
        self.nodes = nodes;
    }

    /// The one node currently offering a reroll, if any.
    pub fn reroll_target(&self) -> Option<MessageId> {
        self.nodes
            .iter()
            .find(|n| n.has_action(Action::Reroll))
            .map(|n| n.id)
    }

    /// Puts a node into edit mode and returns its raw text for the
    /// editable field.
    pub fn begin_edit(&mut self, id: MessageId) -> Option<String> {
        let node = self.nodes.iter_mut().find(|n| n.id == id)?;
        node.editing = Some(node.raw.clone());
        node.editing.clone()
    }

    pub fn update_draft(&mut self, id: MessageId, draft: &str) {
        if let Some(node) = self.nodes.iter_mut().find(|n| n.id == id) {
            if node.editing.is_some() {
                node.editing = Some(draft.to_string());
            }
        }
    }

    /// Leaves edit mode with the previous rendering untouched.
    pub fn cancel_edit(&mut self, id: MessageId) -> Option<Notice> {
        let node = self.nodes.iter_mut().find(|n| n.id == id)?;
        node.editing.take().map(|_| Notice::EditCancelled)
    }

    /// Leaves edit mode after the edit was applied to the log. Call
    /// `sync` afterwards to pick up the new rendering.
    pub fn finish_edit(&mut self, id: MessageId) -> Option<Notice> {
        let node = self.nodes.iter_mut().find(|n| n.id == id)?;
        node.editing.take().map(|_| Notice::EditSaved)
    }

    /// Raw text to put on the clipboard.
    pub fn copy(&self, id: MessageId) -> Option<(String, Notice)> {
        self.node(id).map(|n| (n.raw.clone(), Notice::Copied))
    }
}
