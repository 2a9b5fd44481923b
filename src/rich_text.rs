use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static PARAGRAPH_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{2,}").unwrap());

const BOLD_MARKER: &str = "**";

/// Storefront rich text document: `{"type":"root","children":[...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "root")]
pub struct RichTextDocument {
    pub children: Vec<Paragraph>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "paragraph")]
pub struct Paragraph {
    pub children: Vec<TextSpan>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "text")]
pub struct TextSpan {
    pub value: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl TextSpan {
    pub fn plain(value: impl Into<String>) -> Self {
        TextSpan { value: value.into(), bold: false }
    }

    pub fn bold(value: impl Into<String>) -> Self {
        TextSpan { value: value.into(), bold: true }
    }
}

impl RichTextDocument {
    /// Compact JSON, the form the admin API expects as a metafield value.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Encode a text fragment as a single paragraph. Newlines become spaces.
pub fn encode(text: &str) -> RichTextDocument {
    let line = text.replace('\r', "").replace('\n', " ");
    RichTextDocument {
        children: vec![paragraph(line.trim())],
    }
}

/// Encode text as one paragraph per blank-line-separated block.
///
/// With `force_two`, a lone paragraph holding two or more sentences is cut
/// in half by sentence count (the first half gets the smaller share).
pub fn encode_paragraphs(text: &str, force_two: bool) -> RichTextDocument {
    let cleaned = text.replace('\r', "");
    let mut paras: Vec<String> = PARAGRAPH_BREAK_RE
        .split(cleaned.trim())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();

    if force_two && paras.len() == 1 {
        let sentences = split_sentences(&paras[0]);
        if sentences.len() >= 2 {
            let mid = (sentences.len() / 2).max(1);
            paras = vec![sentences[..mid].join(" "), sentences[mid..].join(" ")];
        }
    }

    let mut children: Vec<Paragraph> = paras
        .iter()
        .map(|p| paragraph(&p.replace('\n', " ")))
        .collect();

    if children.is_empty() {
        children.push(Paragraph {
            children: vec![TextSpan::plain("")],
        });
    }

    RichTextDocument { children }
}

/// Toggle bold on every `**`; empty segments between markers are dropped.
fn paragraph(line: &str) -> Paragraph {
    let mut spans = Vec::new();
    let mut bold = false;
    for (i, segment) in line.split(BOLD_MARKER).enumerate() {
        if i > 0 {
            bold = !bold;
        }
        if segment.is_empty() {
            continue;
        }
        spans.push(if bold {
            TextSpan::bold(segment)
        } else {
            TextSpan::plain(segment)
        });
    }
    Paragraph { children: spans }
}

/// Split after `.`, `!` or `?` when followed by whitespace.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().is_some_and(|n| n.is_whitespace()) {
            while chars.peek().is_some_and(|n| n.is_whitespace()) {
                chars.next();
            }
            sentences.push(std::mem::take(&mut current));
        }
    }
    sentences.push(current);

    sentences
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// ── Tests ──
