//! Numeric, unit, operator, and period extraction from clause text.
//!
//! One currency/number regex tolerant of thousand separators and
//! decimals; fixed lookup tables for units and periods; operator
//! keywords ("minimum", "not to exceed") mapped onto bound operators.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{BoundOperator, Period};

/// Matches "US$ 335", "$1,250.50", "40,000", "72", "5.5".
static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:US\$|USD|EUR|€|\$)?\s*([0-9]{1,3}(?:,[0-9]{3})+(?:\.[0-9]+)?|[0-9]+(?:\.[0-9]+)?)",
    )
    .expect("number regex")
});

/// Leading numbered-heading marker, e.g. "5. " or "12.3) ".
static HEADING_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(?:\.\d+)*[.)]\s*").expect("heading prefix regex"));

/// Matches an explicit range: "between 30,000 and 40,000".
static BETWEEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)between\s+(?:US\$|USD|\$)?\s*([0-9][0-9,\.]*)\s+and\s+(?:US\$|USD|\$)?\s*([0-9][0-9,\.]*)",
    )
    .expect("between regex")
});

/// Strip a merged heading marker so "5. Price US$ 335/MT" extracts 335,
/// not the section number.
pub fn strip_heading(text: &str) -> &str {
    match HEADING_PREFIX_RE.find(text) {
        Some(m) => &text[m.end()..],
        None => text,
    }
}

/// Parse one numeric token, tolerating thousand separators.
pub fn parse_number(token: &str) -> Option<f64> {
    token.replace(',', "").parse::<f64>().ok()
}

/// First number in the text, if any.
pub fn first_number(text: &str) -> Option<f64> {
    NUMBER_RE
        .captures(text)
        .and_then(|c| parse_number(c.get(1)?.as_str()))
}

/// All numbers in the text, in order of appearance.
pub fn all_numbers(text: &str) -> Vec<f64> {
    NUMBER_RE
        .captures_iter(text)
        .filter_map(|c| parse_number(c.get(1)?.as_str()))
        .collect()
}

/// The number closest before `needle`, e.g. the "10" of
/// "40,000 MT +/- 10 percent" when `needle` is "percent".
pub fn number_before(text: &str, needle: &str) -> Option<f64> {
    let pos = text.find(needle)?;
    NUMBER_RE
        .captures_iter(&text[..pos])
        .filter_map(|c| parse_number(c.get(1)?.as_str()))
        .last()
}

/// The text from `needle` onward; the whole text when absent. Scopes
/// extraction to one provision when a paragraph carries several.
pub fn after<'a>(text: &'a str, needle: &str) -> &'a str {
    match text.find(needle) {
        Some(pos) => &text[pos..],
        None => text,
    }
}

/// An explicit "between X and Y" range, lower bound first.
pub fn between_range(text: &str) -> Option<(f64, f64)> {
    let caps = BETWEEN_RE.captures(text)?;
    let a = parse_number(caps.get(1)?.as_str())?;
    let b = parse_number(caps.get(2)?.as_str())?;
    Some((a.min(b), a.max(b)))
}

/// Unit detection table, most specific first. Keys are matched on the
/// lowercase paragraph. Per-ton forms sit above "per day" so a clause
/// quoting a tonnage rate next to a daily figure reads as $/ton.
const UNIT_TABLE: &[(&str, &str)] = &[
    ("per metric ton per day", "mt/day"),
    ("mt per day", "mt/day"),
    ("mt/day", "mt/day"),
    ("metric tons per day", "mt/day"),
    ("per metric ton", "$/ton"),
    ("per mt", "$/ton"),
    ("/mt", "$/ton"),
    ("per ton", "$/ton"),
    ("/ton", "$/ton"),
    ("per day", "$/day"),
    ("/day", "$/day"),
    ("metric tons", "mt"),
    ("metric ton", "mt"),
    (" mt", "mt"),
    ("percent", "%"),
    ("%", "%"),
    ("hours", "hours"),
    ("hrs", "hours"),
    ("days", "days"),
];

/// Detect the measurement unit mentioned in a paragraph.
pub fn detect_unit(lower: &str) -> Option<&'static str> {
    UNIT_TABLE
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, unit)| *unit)
}

/// Bound operator from directional keywords. `None` when the text
/// carries no direction (callers usually default to an exact bound).
pub fn detect_operator(lower: &str) -> Option<BoundOperator> {
    if between_range(lower).is_some() {
        return Some(BoundOperator::Between);
    }
    const GTE: &[&str] = &[
        "minimum",
        "at least",
        "not less than",
        "no less than",
        "min.",
    ];
    const LTE: &[&str] = &[
        "maximum",
        "not to exceed",
        "at most",
        "no more than",
        "not exceeding",
        "up to",
        "max.",
    ];
    if GTE.iter().any(|k| lower.contains(k)) {
        return Some(BoundOperator::Gte);
    }
    if LTE.iter().any(|k| lower.contains(k)) {
        return Some(BoundOperator::Lte);
    }
    None
}

/// Settlement/measurement period from keyword patterns.
pub fn detect_period(lower: &str) -> Option<Period> {
    const MONTHLY: &[&str] = &["per month", "monthly", "per calendar month"];
    const QUARTERLY: &[&str] = &["per quarter", "quarterly"];
    const ANNUAL: &[&str] = &["per annum", "per year", "annual", "yearly", "contract year"];
    const SPOT: &[&str] = &["per cargo", "per shipment", "single cargo", "spot"];

    if MONTHLY.iter().any(|k| lower.contains(k)) {
        Some(Period::Monthly)
    } else if QUARTERLY.iter().any(|k| lower.contains(k)) {
        Some(Period::Quarterly)
    } else if ANNUAL.iter().any(|k| lower.contains(k)) {
        Some(Period::Annual)
    } else if SPOT.iter().any(|k| lower.contains(k)) {
        Some(Period::Spot)
    } else {
        None
    }
}
