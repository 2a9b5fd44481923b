use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

static FAQ_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n-\s+\*\*").unwrap());
static ANSWER_AFTER_NEWLINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*\s*\n").unwrap());
static ANSWER_AFTER_DASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*\s*[:\-–—]\s*").unwrap());
static ANSWER_AFTER_SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*\s+").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static DETAIL_COLON_INSIDE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-\s+\*\*([^*]+?):\*\*\s*(.+)$").unwrap());
static DETAIL_COLON_OUTSIDE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-\s+\*\*([^:*]+)\*\*:\s*(.+)$").unwrap());

static TITLE_HINT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*[Tt]itle").unwrap());
static TITLE_COLON_INSIDE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\*\*title[^:]*:\*\*\s*(.+)$").unwrap());
static TITLE_COLON_OUTSIDE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\*\*title\*\*\s*:\s*(.+)$").unwrap());
static BOLD_ONLY_BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-\s+\*\*(.+?)\*\*\s*$").unwrap());
static RESERVED_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(body|title|título|video):").unwrap());
static BODY_MARKER_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\*\*body:?\*\*:?\s*$").unwrap());

static TITLE_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*[Tt]itle[^*]*\*\*").unwrap());
static VIDEO_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*[Vv]ideo[^*]*\*\*").unwrap());
static BODY_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\*\*[Bb]ody[^*]*\*\*").unwrap());

/// Every `- ` line of the section, prefix removed, in document order.
pub fn bullets(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix("- "))
        .map(|item| item.trim().to_string())
        .collect()
}

// ── FAQ ──

type AnswerSplitter = fn(&str) -> Option<&str>;

/// Tried in order; the first splitter that finds a closing bold run wins.
const ANSWER_SPLITTERS: &[AnswerSplitter] = &[
    answer_after_newline,
    answer_after_dash,
    answer_after_space,
];

/// `Question**` then a line break.
fn answer_after_newline(blk: &str) -> Option<&str> {
    split_once(&ANSWER_AFTER_NEWLINE_RE, blk)
}

/// `Question**:`, `Question** -`, en or em dash.
fn answer_after_dash(blk: &str) -> Option<&str> {
    split_once(&ANSWER_AFTER_DASH_RE, blk)
}

fn answer_after_space(blk: &str) -> Option<&str> {
    split_once(&ANSWER_AFTER_SPACE_RE, blk)
}

fn split_once<'a>(re: &Regex, text: &'a str) -> Option<&'a str> {
    let mut parts = re.splitn(text, 2);
    parts.next();
    parts.next()
}

/// Answers of every `- **question**` block. Question text is discarded.
pub fn faq_answers(body: &str) -> Vec<String> {
    // A block opens on "\n- **"; the leading newline lets the first bullet match.
    let text = format!("\n{}", body);
    FAQ_BLOCK_RE
        .split(&text)
        .skip(1)
        .filter_map(|blk| {
            let answer = ANSWER_SPLITTERS
                .iter()
                .find_map(|split| split(blk))
                .unwrap_or(blk);
            let answer = WHITESPACE_RE.replace_all(answer, " ").trim().to_string();
            (!answer.is_empty()).then_some(answer)
        })
        .collect()
}

// ── Technical details ──

/// `- **Field:** value` and `- **Field**: value` lines, keyed by lower-cased field.
pub fn details(body: &str) -> BTreeMap<String, String> {
    let matchers: [&Regex; 2] = [&DETAIL_COLON_INSIDE_RE, &DETAIL_COLON_OUTSIDE_RE];
    let mut out = BTreeMap::new();
    for line in body.lines() {
        let line = line.trim();
        if let Some(caps) = matchers.iter().find_map(|re| re.captures(line)) {
            out.insert(caps[1].trim().to_lowercase(), caps[2].trim().to_string());
        }
    }
    out
}

// ── Video section ──

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VideoSection {
    pub title: Option<String>,
    pub body: Option<String>,
}

/// Line-by-line scan state for the video section.
#[derive(Debug, Default)]
struct VideoScan {
    title: Option<String>,
    title_taken: bool,
    body_lines: Vec<String>,
}

impl VideoScan {
    fn step(mut self, line: &str) -> Self {
        let line = line.trim();
        if line.starts_with("###") {
            return self;
        }

        // Labelled title beats every other rule. A hint without a value is dropped.
        if TITLE_HINT_RE.is_match(line) {
            if let Some(title) = title_marker(line) {
                self.title = Some(title);
                self.title_taken = true;
            }
            return self;
        }

        if !line.starts_with("- ") {
            if !line.is_empty() {
                self.push_body(line);
            }
            return self;
        }

        if !self.title_taken {
            if let Some(caps) = BOLD_ONLY_BULLET_RE.captures(line) {
                let text = caps[1].trim();
                if !RESERVED_WORD_RE.is_match(text) {
                    self.title = Some(text.to_string());
                    self.title_taken = true;
                }
                return self;
            }
        }

        let mut content = line;
        while let Some(rest) = content.strip_prefix("- ") {
            content = rest.trim();
        }
        if BODY_MARKER_ONLY_RE.is_match(content) {
            return self;
        }
        if !content.is_empty() {
            self.push_body(content);
        }
        self
    }

    fn push_body(&mut self, content: &str) {
        if TITLE_MARKER_RE.is_match(content)
            || VIDEO_MARKER_RE.is_match(content)
            || BODY_MARKER_RE.is_match(content)
        {
            return;
        }
        self.body_lines.push(content.to_string());
    }

    fn finish(self) -> VideoSection {
        let body = if self.body_lines.is_empty() {
            None
        } else {
            Some(self.body_lines.join("\n").trim().to_string())
        };
        VideoSection {
            title: self.title,
            body,
        }
    }
}

fn title_marker(line: &str) -> Option<String> {
    [&*TITLE_COLON_INSIDE_RE, &*TITLE_COLON_OUTSIDE_RE]
        .iter()
        .find_map(|re| re.captures(line))
        .map(|caps| caps[1].trim().to_string())
}

/// Title and body of the video section.
///
/// The title comes from a `**Title:**` label, or else from the first bullet
/// that is a single bold run. Everything else that is not a marker is body.
pub fn video(body: &str) -> VideoSection {
    body.lines()
        .fold(VideoScan::default(), VideoScan::step)
        .finish()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bullets_in_order() {
        let body = "\n- **Uno** primero\n  - Dos\ntexto suelto\n- Tres\n";
        assert_eq!(bullets(body), vec!["**Uno** primero", "Dos", "Tres"]);
    }

    #[test]
    fn bullets_idempotent() {
        let body = "- a\n- b\n- a\n";
        assert_eq!(bullets(body), bullets(body));
        assert_eq!(bullets(body).len(), 3);
    }

    #[test]
    fn faq_answer_on_next_line() {
        let answers = faq_answers("\n- **¿Qué incluye?**\nTodo el set.");
        assert_eq!(answers, vec!["Todo el set."]);
    }

    #[test]
    fn faq_answer_after_colon_outside_bold() {
        let answers = faq_answers("\n- **¿Cuántas piezas?**: 1.200 piezas.");
        assert_eq!(answers, vec!["1.200 piezas."]);
    }

    #[test]
    fn faq_answer_after_dash() {
        let answers = faq_answers("\n- **¿Es difícil?** – Para nada, es relajante.");
        assert_eq!(answers, vec!["Para nada, es relajante."]);
    }

    #[test]
    fn faq_answer_after_colon_inside_bold() {
        let answers = faq_answers("\n- **¿Para quién es?:** Para coleccionistas.");
        assert_eq!(answers, vec!["Para coleccionistas."]);
    }

    #[test]
    fn faq_multiline_answer_collapses() {
        let answers = faq_answers("\n- **¿Qué incluye?**\n  El set completo\n  y manual.\n");
        assert_eq!(answers, vec!["El set completo y manual."]);
    }

    #[test]
    fn faq_without_question_keeps_block() {
        let answers = faq_answers("\n- **Solo negritas sin cierre");
        assert_eq!(answers, vec!["Solo negritas sin cierre"]);
    }

    #[test]
    fn faq_skips_preamble_and_empty() {
        let answers = faq_answers("Intro\n- **¿Vacía?**\n\n- **¿Otra?** Sí.");
        assert_eq!(answers, vec!["Sí."]);
    }

    #[test]
    fn details_both_colon_placements() {
        let d = details("\n- **Ancho:** 12 cm\n- **Piezas**: 150 pzas\n- suelto\n");
        assert_eq!(d.get("ancho").map(String::as_str), Some("12 cm"));
        assert_eq!(d.get("piezas").map(String::as_str), Some("150 pzas"));
        assert_eq!(d.len(), 2);
    }

    #[test]
    fn details_last_seen_wins() {
        let d = details("- **Alto:** 10 cm\n- **ALTO:** 11 cm");
        assert_eq!(d.get("alto").map(String::as_str), Some("11 cm"));
    }

    #[test]
    fn video_bold_bullet_is_title() {
        let v = video("- **Mi Gran Título**\n- Primera línea del cuerpo.");
        assert_eq!(v.title.as_deref(), Some("Mi Gran Título"));
        assert_eq!(v.body.as_deref(), Some("Primera línea del cuerpo."));
    }

    #[test]
    fn video_labelled_title_layouts() {
        for line in [
            "- **Title:** ¡Arma tu leyenda!",
            "- **Title**: ¡Arma tu leyenda!",
            "- **Title**:¡Arma tu leyenda!",
        ] {
            let v = video(line);
            assert_eq!(v.title.as_deref(), Some("¡Arma tu leyenda!"), "line: {line}");
            assert_eq!(v.body, None);
        }
    }

    #[test]
    fn labelled_title_overrides_bold_bullet() {
        let v = video("- **Bold primero**\n- **Title:** Etiquetado\n- cuerpo");
        assert_eq!(v.title.as_deref(), Some("Etiquetado"));
        assert_eq!(v.body.as_deref(), Some("cuerpo"));
    }

    #[test]
    fn second_bold_bullet_goes_to_body() {
        let v = video("- **Título real**\n- **Frase destacada**");
        assert_eq!(v.title.as_deref(), Some("Título real"));
        assert_eq!(v.body.as_deref(), Some("**Frase destacada**"));
    }

    #[test]
    fn body_marker_not_a_title() {
        let v = video("- **Body:**\n  - Párrafo uno.\n  - Párrafo dos.");
        assert_eq!(v.title, None);
        assert_eq!(v.body.as_deref(), Some("Párrafo uno.\nPárrafo dos."));
    }

    #[test]
    fn nested_bullets_and_plain_lines() {
        let v = video("### Video\n- **Title:** T\n- **Body:**\n- - Anidado.\nLínea libre.\n**Video:** clip.mp4");
        assert_eq!(v.title.as_deref(), Some("T"));
        assert_eq!(v.body.as_deref(), Some("Anidado.\nLínea libre."));
    }

    #[test]
    fn empty_video_section() {
        assert_eq!(video(""), VideoSection::default());
    }
}
