//! Turns message text into markup for display. Renderers are
//! pluggable; without one, text is escaped and shown as is.
use std::sync::LazyLock;

use regex::Regex;

static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*([^*\s][^*]*?)\*").unwrap());
static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+)$").unwrap());

pub trait MarkdownRenderer: Send + Sync {
    fn render(&self, source: &str) -> String;
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// A small markdown subset: fenced code, headings, paragraphs, inline
/// code, bold and italic. Input is escaped before any markup is added.
#[derive(Default)]
pub struct BasicMarkdown;

impl BasicMarkdown {
    pub fn new() -> Self {
        Self
    }

    fn inline(text: &str) -> String {
        let segments: Vec<&str> = text.split('`').collect();
        // An unmatched backtick is just a backtick
        let balanced = segments.len() % 2 == 1;

        let mut out = String::new();
        for (i, segment) in segments.iter().enumerate() {
            if balanced && i % 2 == 1 {
                out.push_str("<code>");
                out.push_str(&escape_html(segment));
                out.push_str("</code>");
            } else {
                if !balanced && i > 0 {
                    out.push('`');
                }
                let escaped = escape_html(segment);
                let bolded = BOLD.replace_all(&escaped, "<strong>$1</strong>");
                out.push_str(&ITALIC.replace_all(&bolded, "<em>$1</em>"));
            }
        }
        out
    }

    fn flush_paragraph(paragraph: &mut Vec<&str>, out: &mut String) {
        if paragraph.is_empty() {
            return;
        }
        let lines: Vec<String> = paragraph.iter().map(|l| Self::inline(l)).collect();
        out.push_str("<p>");
        out.push_str(&lines.join("<br>"));
        out.push_str("</p>");
        paragraph.clear();
    }
}

impl MarkdownRenderer for BasicMarkdown {
    fn render(&self, source: &str) -> String {
        let mut out = String::new();
        let mut paragraph: Vec<&str> = Vec::new();
        let mut code: Option<Vec<&str>> = None;

        for line in source.lines() {
            if line.trim_start().starts_with("```") {
                match code.take() {
                    Some(block) => {
                        out.push_str("<pre><code>");
                        out.push_str(&escape_html(&block.join("\n")));
                        out.push_str("</code></pre>");
                    }
                    None => {
                        Self::flush_paragraph(&mut paragraph, &mut out);
                        code = Some(Vec::new());
                    }
                }
                continue;
            }

            if let Some(block) = code.as_mut() {
                block.push(line);
                continue;
            }

            if line.trim().is_empty() {
                Self::flush_paragraph(&mut paragraph, &mut out);
            } else if let Some(caps) = HEADING.captures(line.trim()) {
                Self::flush_paragraph(&mut paragraph, &mut out);
                let level = caps[1].len();
                out.push_str(&format!(
                    "<h{level}>{}</h{level}>",
                    Self::inline(&caps[2])
                ));
            } else {
                paragraph.push(line);
            }
        }

        // An unclosed fence runs to the end of the text
        if let Some(block) = code {
            out.push_str("<pre><code>");
            out.push_str(&escape_html(&block.join("\n")));
            out.push_str("</code></pre>");
        }
        Self::flush_paragraph(&mut paragraph, &mut out);
        out
    }
}

pub struct Projector {
    renderer: Option<Box<dyn MarkdownRenderer>>,
}

impl Projector {
    pub fn new(renderer: impl MarkdownRenderer + 'static) -> Self {
        Self {
            renderer: Some(Box::new(renderer)),
        }
    }

    /// A projector with no renderer available.
    pub fn plain() -> Self {
        Self { renderer: None }
    }

    pub fn project(&self, text: &str) -> String {
        match &self.renderer {
            Some(renderer) => renderer.render(text),
            None => format!("<p>{}</p>", escape_html(text).replace('\n', "<br>")),
        }
    }
}

impl Default for Projector {
    fn default() -> Self {
        Self::new(BasicMarkdown::new())
    }
}
