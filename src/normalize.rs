// src/normalize.rs
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::DEFAULT_HEADCOUNT_PROXY;
use crate::models::LegalFormGroup;

/// Canonicalizes a business name for dedup comparison: uppercase, keep
/// only `[A-Z0-9]`. Never used for display.
pub fn normalize_name(name: &str) -> String {
    name.to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Maps an INSEE headcount bracket code to a numeric proxy usable in the
/// ranking key. Unknown or missing codes fall back to a small default
/// rather than erroring.
pub fn headcount_proxy(code: Option<&str>) -> i64 {
    match code {
        Some("00") => 0,
        Some("01") => 1,
        Some("02") => 3,
        Some("03") => 6,
        Some("11") => 10,
        Some("12") => 20,
        Some("21") => 50,
        Some("22") => 100,
        Some("31") => 200,
        Some("32") => 250,
        Some("41") => 500,
        Some("42") => 1000,
        Some("51") => 2000,
        Some("52") => 5000,
        Some("53") => 10000,
        _ => DEFAULT_HEADCOUNT_PROXY,
    }
}

/// Buckets a numeric legal-form category code. Codes outside the known
/// 1..=9999 range (and missing codes) yield None.
pub fn legal_form_group(code: Option<i32>) -> Option<LegalFormGroup> {
    let code = code?;
    match code {
        5700..=5799 => Some(LegalFormGroup::SasSasu),
        5400..=5499 => Some(LegalFormGroup::SarlEurl),
        5300..=5399 | 5500..=5699 => Some(LegalFormGroup::SaSca),
        1000..=1999 => Some(LegalFormGroup::Ei),
        9200..=9299 => Some(LegalFormGroup::Association),
        4000..=4999 | 7000..=7999 => Some(LegalFormGroup::Public),
        1..=9999 => Some(LegalFormGroup::Autre),
        _ => None,
    }
}

static NATIONAL_PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0[1-9]\d{8}$").expect("valid phone regex"));

/// Normalizes an operator-entered phone number. Separators are stripped,
/// a leading `+33`/`0033` becomes the national `0`, and a valid 10-digit
/// national number is reformatted into grouped pairs. Anything else is
/// returned trimmed but otherwise verbatim: malformed input is stored
/// as-entered, never rejected.
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let stripped: String = trimmed
        .chars()
        .filter(|c| !matches!(c, ' ' | '.' | '-' | '(' | ')'))
        .collect();
    let national = if let Some(rest) = stripped.strip_prefix("+33") {
        format!("0{}", rest)
    } else if let Some(rest) = stripped.strip_prefix("0033") {
        format!("0{}", rest)
    } else {
        stripped
    };
    if NATIONAL_PHONE_RE.is_match(&national) {
        national
            .as_bytes()
            .chunks(2)
            .map(|pair| std::str::from_utf8(pair).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        trimmed.to_string()
    }
}

/// Lower-cases and trims an email address.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Department code derived from a postal code: its first two characters.
/// Char-based, so operator-entered codes with multibyte characters never
/// panic; codes shorter than two characters yield None.
pub fn department_from_postal(postal: &str) -> Option<String> {
    let dep: String = postal.chars().take(2).collect();
    if dep.chars().count() == 2 {
        Some(dep)
    } else {
        None
    }
}
