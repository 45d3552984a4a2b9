use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

use super::labels::Field;
use super::{body_text, clean_value, header_tables};
use crate::db::{ChargeRecord, ChargeType};

/// Per-match cap for the free-text sweep.
pub const SWEEP_CAP: usize = 200;

static BOND_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$?([0-9,.]+)").unwrap());
static CHARGE_START_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:charges?|offen[cs]es?)\b[ \t]*(?::|-|\n)\s*").unwrap()
});
static SECTION_END_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\n\s*\n|\b(?:bond|bail|booking|booked|released?|arrest(?:ing)?|agency|facility|court|sentence|holds?|total)\b|\b(?:charges?|offen[cs]es?)[ \t]*:",
    )
    .unwrap()
});

const FELONY_KEYWORDS: &[&str] = &[
    "MURDER", "HOMICIDE", "MANSLAUGHTER", "ASSAULT", "BATTERY", "ROBBERY", "RAPE",
    "KIDNAP", "ARSON", "BURGLARY", "CARJACK", "AGGRAVATED", "TRAFFICKING", "WEAPON",
    "FIREARM", "CRUELTY TO CHILDREN", "CHILD MOLEST",
];

const MISDEMEANOR_KEYWORDS: &[&str] = &[
    "SHOPLIFT", "TRESPASS", "DISORDERLY", "PUBLIC DRUNK", "PUBLIC INTOX", "LOITERING",
    "SPEEDING", "SUSPENDED LICENSE", "LICENSE SUSPENDED", "NO LICENSE", "DUI",
    "DRIVING UNDER", "OBSTRUCTION", "PROBATION VIOLATION",
];

/// Explicit level wins, then explicit wording, then keyword families.
pub fn classify(description: &str, level: Option<&str>) -> ChargeType {
    if let Some(level) = level.map(|l| l.trim().to_uppercase()) {
        if level.starts_with('F') {
            return ChargeType::Felony;
        }
        if level.starts_with('M') {
            return ChargeType::Misdemeanor;
        }
    }

    let upper = description.to_uppercase();
    if upper.contains("FELONY") {
        return ChargeType::Felony;
    }
    if upper.contains("MISDEMEANOR") || upper.contains("MISD") {
        return ChargeType::Misdemeanor;
    }
    // Simple assault and simple battery are the misdemeanor grades.
    if upper.contains("SIMPLE ") {
        return ChargeType::Misdemeanor;
    }
    if FELONY_KEYWORDS.iter().any(|kw| upper.contains(kw)) {
        return ChargeType::Felony;
    }
    if MISDEMEANOR_KEYWORDS.iter().any(|kw| upper.contains(kw)) {
        return ChargeType::Misdemeanor;
    }
    ChargeType::Unknown
}

/// Split a charge cell on `;`, `,` and newlines.
pub fn split_charges(raw: &str) -> Vec<String> {
    raw.split([';', ',', '\n'])
        .filter_map(clean_value)
        .collect()
}

/// Numeric part of a free-text bond, e.g. `$5,000.00` → 5000.0.
pub fn bond_value(text: &str) -> Option<f64> {
    let caps = BOND_VALUE_RE.captures(text)?;
    caps[1].replace(',', "").parse::<f64>().ok()
}

fn record(description: String, bond_amount: Option<String>, level: Option<String>) -> ChargeRecord {
    ChargeRecord {
        charge_type: classify(&description, level.as_deref()),
        description,
        bond_amount,
        level,
    }
}

fn push_unique(out: &mut Vec<ChargeRecord>, charge: ChargeRecord) {
    if !out
        .iter()
        .any(|c| c.description.eq_ignore_ascii_case(&charge.description))
    {
        out.push(charge);
    }
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Charges from labelled rows and charge tables; the text sweep runs only
/// when neither produced anything.
pub fn extract(doc: &Html, labelled: &[String]) -> Vec<ChargeRecord> {
    let mut out = Vec::new();

    for value in labelled {
        for description in split_charges(value) {
            push_unique(&mut out, record(description, None, None));
        }
    }

    for table in header_tables(doc) {
        if table.column(Field::Charges).is_none() {
            continue;
        }
        for row in &table.rows {
            let Some(description) = table.cell(row, Field::Charges).and_then(|d| clean_value(&d))
            else {
                continue;
            };
            let bond = table.cell(row, Field::Bond).and_then(|b| clean_value(&b));
            let level = table.cell(row, Field::Level).and_then(|l| clean_value(&l));
            push_unique(&mut out, record(description, bond, level));
        }
    }

    if out.is_empty() {
        for description in sweep_text(&body_text(doc)) {
            push_unique(&mut out, record(description, None, None));
        }
    }

    out
}

/// Text between a "Charge"/"Offense" marker and the next section marker.
pub fn sweep_text(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    for start in CHARGE_START_RE.find_iter(text) {
        let rest = &text[start.end()..];
        let end = SECTION_END_RE.find(rest).map_or(rest.len(), |m| m.start());
        let segment = truncate_chars(&rest[..end], SWEEP_CAP);
        found.extend(split_charges(segment));
    }
    found
}
