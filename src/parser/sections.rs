use std::sync::LazyLock;

use regex::Regex;

static NUMBERED_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^###\s+(\d+)\.\s+([^\n]+)$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section<'a> {
    pub number: u32,
    pub title: &'a str,
    pub body: &'a str,
}

/// Split a document on `### <n>. <title>` headings.
///
/// The body runs from the end of the heading line to the next heading (or end
/// of document). Text before the first heading is not part of any section.
pub fn split_sections(markdown: &str) -> Vec<Section<'_>> {
    let headings: Vec<_> = NUMBERED_HEADING_RE.captures_iter(markdown).collect();
    let mut sections = Vec::with_capacity(headings.len());

    for (i, caps) in headings.iter().enumerate() {
        let whole = caps.get(0).unwrap();
        let end = headings
            .get(i + 1)
            .map(|next| next.get(0).unwrap().start())
            .unwrap_or(markdown.len());
        let Ok(number) = caps[1].parse::<u32>() else {
            continue;
        };
        sections.push(Section {
            number,
            title: caps.get(2).map_or("", |m| m.as_str().trim()),
            body: &markdown[whole.end()..end],
        });
    }

    sections
}

/// Body of the section carrying `number`, or `""`. A repeated number
/// resolves to its last occurrence.
pub fn section_body<'a>(sections: &[Section<'a>], number: u32) -> &'a str {
    sections
        .iter()
        .rev()
        .find(|s| s.number == number)
        .map(|s| s.body)
        .unwrap_or("")
}

// ── Tests ──
