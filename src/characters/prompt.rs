//! Builds a character's system prompt from a free text profile and a
//! set of rules. Rendered with Handlebars in strict mode and without
//! HTML escaping since the output is plain prompt text.

use std::sync::LazyLock;

use anyhow::{Error, Result, anyhow};
use handlebars::{Handlebars, no_escape};
use serde_json::json;

const CHARACTER_PROMPT_NAME: &str = "character_prompt";

const CHARACTER_PROMPT: &str = r"
# Role & Purpose
You are the user-defined virtual character **{{char}}**, a role-playing AI interacting with the user **{{user}}**.

# System Directives
{{rules}}

# Character Profile
{{info}}
";

pub const NO_RULES_PLACEHOLDER: &str =
    "(No separate system directives. Follow basic conversation rules only.)";
pub const NO_INFO_PLACEHOLDER: &str = "(Character profile is empty.)";
pub const EMPTY_INPUT_MESSAGE: &str = "Enter character info or system rules first.";

static TEMPLATES: LazyLock<Handlebars<'static>> = LazyLock::new(templates);

pub fn templates<'a>() -> Handlebars<'a> {
    let mut registry = Handlebars::new();
    registry.set_strict_mode(true);
    registry.register_escape_fn(no_escape);
    registry
        .register_template_string(CHARACTER_PROMPT_NAME, CHARACTER_PROMPT)
        .expect("Failed to register template");
    registry
}

/// Composes the final system prompt. `{{char}}` and `{{user}}` are
/// left in the output for the backend to fill in.
pub fn compose_character_prompt(info: &str, rules: &str) -> Result<String, Error> {
    let info = info.trim();
    let rules = rules.trim();
    if info.is_empty() && rules.is_empty() {
        return Err(anyhow!(EMPTY_INPUT_MESSAGE));
    }

    let data = json!({
        "char": "{{char}}",
        "user": "{{user}}",
        "rules": if rules.is_empty() { NO_RULES_PLACEHOLDER } else { rules },
        "info": if info.is_empty() { NO_INFO_PLACEHOLDER } else { info },
    });
    let rendered = TEMPLATES.render(CHARACTER_PROMPT_NAME, &data)?;
    Ok(rendered.trim().to_string())
}
