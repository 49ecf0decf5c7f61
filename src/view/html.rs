use super::{ChatView, MessageNode};
use crate::markdown::escape_html;

fn render_node(node: &MessageNode, out: &mut String) {
    let mut classes = format!("message {}", node.role);
    if node.is_error {
        classes.push_str(" error");
    }
    if node.editing.is_some() {
        classes.push_str(" editing");
    }
    out.push_str(&format!(
        r#"<div class="{}" data-id="{}" data-role="{}">"#,
        classes, node.id, node.role
    ));

    out.push_str(r#"<div class="content">"#);
    match &node.editing {
        Some(draft) => out.push_str(&format!(
            r#"<textarea class="message-edit-input">{}</textarea>"#,
            escape_html(draft)
        )),
        None => out.push_str(&node.html),
    }
    out.push_str("</div>");

    out.push_str(r#"<div class="actions">"#);
    for action in node.actions.iter() {
        out.push_str(&format!(
            r#"<button type="button" data-action="{}" data-id="{}">{}</button>"#,
            action.as_str(),
            node.id,
            action.label()
        ));
    }
    out.push_str("</div></div>");
}

impl ChatView {
    /// Renders the whole chat as a markup fragment.
    pub fn to_html(&self) -> String {
        let header = self.header();
        let mut out = format!(r#"<div class="chat theme-{}">"#, header.theme);

        out.push_str(&format!(
            r#"<header class="chat-header"><h1 class="title">{}</h1><p class="subtitle">{}</p>"#,
            escape_html(&header.title),
            escape_html(&header.subtitle)
        ));
        out.push_str(&format!(
            r#"<p class="stats" data-turns="{turns}" data-rerolls="{rerolls}">Turns: {turns} · Rerolls: {rerolls} · Last reply: {len} chars</p></header>"#,
            turns = header.stats.turn_count,
            rerolls = header.stats.reroll_count,
            len = header.stats.last_reply_length
        ));

        out.push_str(r#"<div class="messages">"#);
        for node in self.nodes() {
            render_node(node, &mut out);
        }
        out.push_str("</div></div>");
        out
    }
}
