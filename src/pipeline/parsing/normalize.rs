//! Parser-side text normalisation and paragraph segmentation.
//!
//! Normalisation is pure: the same input text always yields the same
//! paragraph list, with no clock, randomness, or global state involved.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::SectionRef;

/// Numbered heading at line start: "5.", "12.3", "7)".
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+(?:\.\d+)*)[.)]\s+(.*)$").expect("heading regex"));

/// Lettered or roman bullet at line start: "(a)", "a)", "(iv)", "ii)".
static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(?([a-z]|[ivxl]{1,5})\)\s+").expect("bullet regex"));

/// A segmented paragraph ready for matching.
#[derive(Debug, Clone, PartialEq)]
pub struct Paragraph {
    pub section_ref: SectionRef,
    pub text: String,
}

/// Replace typographic quotes and dashes with their ASCII forms and
/// collapse runs of spaces. Newlines survive; segmentation needs them.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_gap = false;
    for c in text.replace("\r\n", "\n").replace('\r', "\n").chars() {
        let mapped = match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2013}' | '\u{2014}' => '-',
            '\u{00A0}' => ' ',
            other => other,
        };
        if mapped == ' ' || mapped == '\t' {
            in_gap = true;
        } else {
            if in_gap && !out.is_empty() && !out.ends_with('\n') && mapped != '\n' {
                out.push(' ');
            }
            in_gap = false;
            out.push(mapped);
        }
    }
    out
}

/// Split normalised text into paragraphs.
///
/// Boundaries: blank lines, numbered headings, lettered/roman bullets.
/// A numbered heading opens a section and is merged into the following
/// body text, so "5. Price" and its body match as one block carrying
/// section ref "Section 5". Bullets start new paragraphs but inherit
/// the enclosing section. Paragraphs outside any numbered section get
/// a sequential "¶ n" fallback.
pub fn segment(text: &str) -> Vec<Paragraph> {
    let mut paragraphs: Vec<Paragraph> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_label: Option<String> = None;
    let mut order: u32 = 0;
    let mut fallback_counter: u32 = 0;

    let mut flush = |lines: &mut Vec<String>,
                     label: &Option<String>,
                     order: &mut u32,
                     fallback: &mut u32,
                     out: &mut Vec<Paragraph>| {
        let body = lines.join(" ");
        lines.clear();
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return;
        }
        let label = match label {
            Some(l) => l.clone(),
            None => {
                *fallback += 1;
                format!("¶ {fallback}")
            }
        };
        out.push(Paragraph {
            section_ref: SectionRef::new(*order, label),
            text: trimmed.to_string(),
        });
        *order += 1;
    };

    for line in text.split('\n') {
        let line = line.trim();
        if line.is_empty() {
            flush(
                &mut current,
                &current_label,
                &mut order,
                &mut fallback_counter,
                &mut paragraphs,
            );
            continue;
        }

        if let Some(caps) = HEADING_RE.captures(line) {
            flush(
                &mut current,
                &current_label,
                &mut order,
                &mut fallback_counter,
                &mut paragraphs,
            );
            let number = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            current_label = Some(format!("Section {number}"));
            // The heading line itself joins the body that follows it.
            current.push(line.to_string());
            continue;
        }

        if BULLET_RE.is_match(line) {
            flush(
                &mut current,
                &current_label,
                &mut order,
                &mut fallback_counter,
                &mut paragraphs,
            );
            current.push(line.to_string());
            continue;
        }

        current.push(line.to_string());
    }

    flush(
        &mut current,
        &current_label,
        &mut order,
        &mut fallback_counter,
        &mut paragraphs,
    );

    paragraphs
}
