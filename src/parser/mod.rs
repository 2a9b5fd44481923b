pub mod html;
pub mod markdown;
pub mod sections;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Structured copy pulled out of one model response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedContent {
    pub bullets: Vec<String>,
    pub faq_answers: Vec<String>,
    pub details: BTreeMap<String, String>,
    pub video_title: Option<String>,
    pub video_body: Option<String>,
}

/// The model response as saved by the capture step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawContent {
    pub content: String,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, alias = "generated_at")]
    pub generated_at: Option<DateTime<Utc>>,
}

fn default_format() -> String {
    "markdown".to_string()
}

/// Four-pass pipeline: sections → bullets / FAQ / details / video.
///
/// Section numbers follow the copywriting template: 1 bullets, 2 FAQ,
/// 3 technical details, 4 video. Missing sections leave their fields empty.
pub fn parse_markdown(markdown: &str) -> ParsedContent {
    let sections = sections::split_sections(markdown);
    for s in &sections {
        debug!(number = s.number, title = s.title, "section found");
    }

    let video = markdown::video(sections::section_body(&sections, 4));

    ParsedContent {
        bullets: markdown::bullets(sections::section_body(&sections, 1)),
        faq_answers: markdown::faq_answers(sections::section_body(&sections, 2)),
        details: markdown::details(sections::section_body(&sections, 3)),
        video_title: video.title,
        video_body: video.body,
    }
}

// ── Tests ──
