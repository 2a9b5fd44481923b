use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::ParsedContent;

static META_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<div\s+class=['"]meta['"]\s*>(.*?)</div>"#).unwrap());
static CONTENT_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<div\s+class=['"]content['"]\s*>(.*?)</div>"#).unwrap());
static BREAK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

static META_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<strong>\s*(?:Fecha|Date):\s*</strong>\s*([^<]+)").unwrap());
static META_IMAGES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<strong>\s*(?:Imágenes analizadas|Images analyzed):\s*</strong>\s*(\d+)").unwrap()
});
static META_MODEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<strong>\s*(?:Modelo|Model):\s*</strong>\s*([^<]+)").unwrap());

static NUMBERED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^###\s+(\d+)\.").unwrap());
static QUESTION_ANSWER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.+\?)\s*(.+)$").unwrap());
static KEY_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([^:]+):\s*(.+)$").unwrap());


#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HtmlReport {
    pub metadata: ReportMetadata,
    pub content: HtmlContent,
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub date: Option<String>,
    pub images_analyzed: Option<u32>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HtmlContent {
    pub bullets: Vec<String>,
    pub faq: Vec<FaqEntry>,
    pub details: KeyedLines,
    pub video: HtmlVideo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaqEntry {
    pub question: Option<String>,
    pub answer: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KeyedLines {
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
    /// Lines that did not fit the `key: value` shape.
    #[serde(rename = "__other__", skip_serializing_if = "Vec::is_empty")]
    pub other: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HtmlVideo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(flatten)]
    pub extra: KeyedLines,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportSection {
    Bullets,
    Faq,
    Details,
    Video,
}

/// Parse a saved analysis report: metadata block plus content block.
pub fn parse_report(html: &str, source: &str) -> HtmlReport {
    HtmlReport {
        metadata: parse_metadata(inner_block(&META_BLOCK_RE, html)),
        content: parse_content(inner_block(&CONTENT_BLOCK_RE, html)),
        source: source.to_string(),
    }
}

/// True when the report's content block holds any text once tags are gone.
pub fn has_content(html: &str) -> bool {
    !strip_tags(inner_block(&CONTENT_BLOCK_RE, html)).trim().is_empty()
}

fn inner_block<'a>(re: &Regex, html: &'a str) -> &'a str {
    re.captures(html)
        .and_then(|c| c.get(1))
        .map_or("", |m| m.as_str())
}

pub fn parse_metadata(meta_html: &str) -> ReportMetadata {
    let field = |re: &Regex| {
        re.captures(meta_html)
            .map(|c| c[1].trim().to_string())
            .filter(|s| !s.is_empty())
    };

    ReportMetadata {
        date: field(&*META_DATE_RE),
        images_analyzed: field(&*META_IMAGES_RE).and_then(|n| n.parse().ok()),
        model: field(&*META_MODEL_RE),
    }
}

/// Tag-stripped, line-based parse of the content block.
pub fn parse_content(content_html: &str) -> HtmlContent {
    let text = strip_tags(content_html);
    let mut content = HtmlContent::default();
    let mut section: Option<ReportSection> = None;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.starts_with("### ") {
            if let Some(found) = detect_section(line) {
                section = Some(found);
                continue;
            }
        }

        let Some(item) = line.strip_prefix("- ").map(str::trim) else {
            continue;
        };

        match section {
            Some(ReportSection::Bullets) => content.bullets.push(item.to_string()),
            Some(ReportSection::Faq) => content.faq.push(faq_entry(item)),
            Some(ReportSection::Details) => match key_value(item) {
                Some((key, value)) => {
                    content.details.fields.insert(key.to_lowercase(), value);
                }
                None => content.details.other.push(item.to_string()),
            },
            Some(ReportSection::Video) => match key_value(item) {
                Some((key, value)) => match key.to_lowercase().as_str() {
                    "title" => content.video.title = Some(value),
                    "body" => content.video.body = Some(value),
                    other => {
                        content.video.extra.fields.insert(other.to_string(), value);
                    }
                },
                None => content.video.extra.other.push(item.to_string()),
            },
            None => {}
        }
    }

    content
}

fn strip_tags(html: &str) -> String {
    let with_breaks = BREAK_RE.replace_all(html, "\n");
    decode_entities(&TAG_RE.replace_all(&with_breaks, ""))
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Keyword match on the heading first, then its number.
fn detect_section(heading: &str) -> Option<ReportSection> {
    let low = heading.to_lowercase();
    if low.contains("viñetas") || low.contains("vinetas") || low.contains("bullets") {
        return Some(ReportSection::Bullets);
    }
    if low.contains("faq") {
        return Some(ReportSection::Faq);
    }
    if low.contains("detalles") || low.contains("details") {
        return Some(ReportSection::Details);
    }
    if low.contains("video") {
        return Some(ReportSection::Video);
    }
    match NUMBERED_RE.captures(heading)?[1].parse::<u32>().ok()? {
        1 => Some(ReportSection::Bullets),
        2 => Some(ReportSection::Faq),
        3 => Some(ReportSection::Details),
        4 => Some(ReportSection::Video),
        _ => None,
    }
}

fn faq_entry(item: &str) -> FaqEntry {
    match QUESTION_ANSWER_RE.captures(item) {
        Some(caps) => FaqEntry {
            question: Some(caps[1].trim().to_string()),
            answer: caps[2].trim().to_string(),
        },
        None => FaqEntry {
            question: None,
            answer: item.to_string(),
        },
    }
}

fn key_value(item: &str) -> Option<(String, String)> {
    let caps = KEY_VALUE_RE.captures(item)?;
    Some((caps[1].trim().to_string(), caps[2].trim().to_string()))
}

impl HtmlContent {
    /// Planner input from a report. Questions are dropped, as the planner
    /// only writes answers.
    pub fn to_parsed_content(&self) -> ParsedContent {
        ParsedContent {
            bullets: self.bullets.clone(),
            faq_answers: self
                .faq
                .iter()
                .map(|f| f.answer.clone())
                .filter(|a| !a.is_empty())
                .collect(),
            details: self.details.fields.clone(),
            video_title: self.video.title.clone(),
            video_body: self.video.body.clone(),
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faq_question_kept() {
        assert_eq!(
            faq_entry("¿Qué incluye? Todo el set."),
            FaqEntry {
                question: Some("¿Qué incluye?".into()),
                answer: "Todo el set.".into(),
            }
        );
    }

    #[test]
    fn faq_without_question_mark() {
        let entry = faq_entry("Todo el set incluido.");
        assert_eq!(entry.question, None);
        assert_eq!(entry.answer, "Todo el set incluido.");
    }

    #[test]
    fn content_sections() {
        let html = "<h3>### 1. Viñetas</h3><p>- <strong>1.200 piezas</strong> de diversión</p>\
            <h3>### 2. FAQ</h3><p>- ¿Qué incluye? Todo el set.</p>\
            <h3>### 3. Detalles Técnicos</h3><p>- <strong>Ancho:</strong> 12 cm<br>- sin clave</p>\
            <h3>### 4. Video Section</h3><p>- Title: ¡A construir!<br>- Body: Arma y luce.<br>- Video: clip.mp4<br>- suelto</p>";
        let c = parse_content(&html.replace("</p>", "</p>\n").replace("</h3>", "</h3>\n"));
        assert_eq!(c.bullets, vec!["1.200 piezas de diversión"]);
        assert_eq!(c.faq[0].question.as_deref(), Some("¿Qué incluye?"));
        assert_eq!(c.details.fields.get("ancho").map(String::as_str), Some("12 cm"));
        assert_eq!(c.details.other, vec!["sin clave"]);
        assert_eq!(c.video.title.as_deref(), Some("¡A construir!"));
        assert_eq!(c.video.body.as_deref(), Some("Arma y luce."));
        assert_eq!(c.video.extra.fields.get("video").map(String::as_str), Some("clip.mp4"));
        assert_eq!(c.video.extra.other, vec!["suelto"]);
    }

    #[test]
    fn bullets_before_any_heading_ignored() {
        let c = parse_content("- huérfano\n### 1. Viñetas\n- uno");
        assert_eq!(c.bullets, vec!["uno"]);
    }

    #[test]
    fn metadata_fields() {
        let meta = parse_metadata(
            "<strong>Fecha:</strong> 2025-03-01 10:00:00<br>\n<strong>Imágenes analizadas:</strong> 7<br>\n<strong>Modelo:</strong> gpt-4o\n",
        );
        assert_eq!(meta.date.as_deref(), Some("2025-03-01 10:00:00"));
        assert_eq!(meta.images_analyzed, Some(7));
        assert_eq!(meta.model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn missing_blocks_degrade() {
        let report = parse_report("<html><body>nada</body></html>", "x.html");
        assert_eq!(report.metadata, ReportMetadata::default());
        assert_eq!(report.content, HtmlContent::default());
        assert_eq!(report.source, "x.html");
    }

    #[test]
    fn content_presence() {
        let fixture = std::fs::read_to_string("tests/fixtures/analysis_report.html").unwrap();
        assert!(has_content(&fixture));
        assert!(!has_content(""));
        assert!(!has_content("<div class=\"content\"><br/> &nbsp; </div>"));
        assert!(!has_content("<p>sin bloque de contenido</p>"));
    }

    #[test]
    fn overflow_serializes_under_reserved_key() {
        let c = parse_content("### 3. Detalles\n- Alto: 5 cm\n- raro");
        let json = serde_json::to_value(&c.details).unwrap();
        assert_eq!(json["alto"], "5 cm");
        assert_eq!(json["__other__"][0], "raro");
    }

    #[test]
    fn report_fixture() {
        let html = std::fs::read_to_string("tests/fixtures/analysis_report.html").unwrap();
        let report = parse_report(&html, "analysis_report.html");
        assert_eq!(report.metadata.images_analyzed, Some(6));
        assert_eq!(report.metadata.model.as_deref(), Some("gpt-4o"));
        assert_eq!(report.content.bullets.len(), 5);
        assert_eq!(report.content.faq.len(), 3);
        assert!(report.content.faq.iter().all(|f| f.question.is_some()));
        assert_eq!(report.content.details.fields.get("piezas").map(String::as_str), Some("1.458"));
        assert!(report.content.video.title.is_some());

        let parsed = report.content.to_parsed_content();
        assert_eq!(parsed.faq_answers.len(), 3);
        assert_eq!(parsed.bullets, report.content.bullets);
    }
}
