//! Post-processing: deterministic cleanup of the VLM extraction reply.
//!
//! Even with an explicit "reply with JSON only" prompt, vision models
//! occasionally wrap the object in ```json fences, prepend a sentence, or
//! write placeholders like `"SIN VERSION"` instead of the requested empty
//! string. These cheap rules fix those quirks without touching real values.
//!
//! ## Rule Order
//!
//! Reply text: strip fences → remove invisible characters → isolate the
//! outermost `{…}`. Record values: trim → blank placeholders → normalise fuel.

use crate::record::VehicleRecord;
use once_cell::sync::Lazy;
use regex::Regex;

/// Reduce a raw reply to the JSON object it contains, if any.
pub fn isolate_json(reply: &str) -> Option<String> {
    let s = strip_code_fences(reply);
    let s = remove_invisible_chars(&s);
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    (start < end).then(|| s[start..=end].to_string())
}

/// Apply value-level rules to every string field of the record.
pub fn sanitize_record(record: &mut VehicleRecord) {
    let names: Vec<&'static str> = record.iter().map(|(name, _)| name).collect();
    for name in names {
        let Some(slot) = record.field_mut(name) else {
            continue;
        };
        let mut value = blank_placeholder(slot.trim()).to_string();
        if name == "combustible" {
            value = normalise_fuel(&value);
        }
        *slot = value;
    }
}

// ── Rule 1: Strip code fences ────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?\s*\n(.*)\n```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 2: Remove invisible Unicode characters ──────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Blank placeholder tokens ─────────────────────────────────────────

static RE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:sin\s+versi[oó]n|-+)$").unwrap());

fn blank_placeholder(value: &str) -> &str {
    if RE_PLACEHOLDER.is_match(value) {
        ""
    } else {
        value
    }
}

// ── Rule 4: Fuel vocabulary ──────────────────────────────────────────────────

fn normalise_fuel(value: &str) -> String {
    let upper = value.to_uppercase();
    let compact: String = upper.chars().filter(|c| c.is_alphanumeric()).collect();
    let canonical = if compact.is_empty() {
        return String::new();
    } else if compact.starts_with("BI") || compact.contains("DUAL") {
        "BI-COMBUSTIBLE"
    } else if compact.starts_with("GASOL") || compact == "PETROL" {
        "GASOLINA"
    } else if compact.starts_with("DIES") || compact.starts_with("PETROLEO") {
        "DIESEL"
    } else if compact == "GLP" || compact == "LPG" {
        "GLP"
    } else if compact == "GNV" || compact == "GNC" {
        "GNV"
    } else if compact.starts_with("ELECTRIC") {
        "ELECTRICO"
    } else {
        return upper;
    };
    canonical.to_string()
}
