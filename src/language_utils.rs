//! Language utilities for rendering target languages in prompts
//!
//! Target languages are free-form. When the user types an ISO 639-1 or
//! ISO 639-2 code instead of a name, the prompt spells the language out.

use anyhow::{anyhow, Result};
use isolang::Language;

/// Map an ISO 639-2/B code to its ISO 639-2/T form, if it differs
fn bibliographic_to_terminology(code: &str) -> Option<&'static str> {
    match code {
        "fre" => Some("fra"),
        "ger" => Some("deu"),
        "dut" => Some("nld"),
        "gre" => Some("ell"),
        "chi" => Some("zho"),
        "cze" => Some("ces"),
        "ice" => Some("isl"),
        "alb" => Some("sqi"),
        "arm" => Some("hye"),
        "baq" => Some("eus"),
        "bur" => Some("mya"),
        "per" => Some("fas"),
        "geo" => Some("kat"),
        "may" => Some("msa"),
        "mac" => Some("mkd"),
        "rum" => Some("ron"),
        "slo" => Some("slk"),
        "wel" => Some("cym"),
        _ => None,
    }
}

/// Normalize a language code to ISO 639-2/T (3-letter) format
pub fn normalize_to_part2t(code: &str) -> Result<String> {
    let normalized_code = code.trim().to_lowercase();

    match normalized_code.len() {
        2 => {
            if let Some(lang) = Language::from_639_1(&normalized_code) {
                return Ok(lang.to_639_3().to_string());
            }
        }
        3 => {
            if Language::from_639_3(&normalized_code).is_some() {
                return Ok(normalized_code);
            }
            if let Some(part2t) = bibliographic_to_terminology(&normalized_code) {
                return Ok(part2t.to_string());
            }
        }
        _ => {}
    }

    Err(anyhow!("Cannot normalize invalid language code: {}", code))
}

/// Get the English language name from a code
pub fn get_language_name(code: &str) -> Result<String> {
    let normalized = normalize_to_part2t(code)?;
    let lang = Language::from_639_3(&normalized)
        .ok_or_else(|| anyhow!("Failed to get language from code: {}", normalized))?;

    Ok(lang.to_name().to_string())
}

/// Human-readable name for a target language
///
/// Recognized ISO codes are expanded to their English name; anything else
/// (for example "Japanese" or "Brazilian Portuguese") is returned trimmed.
pub fn display_language(target_language: &str) -> String {
    let trimmed = target_language.trim();
    if trimmed.len() <= 3 {
        if let Ok(name) = get_language_name(trimmed) {
            return name;
        }
    }
    trimmed.to_string()
}
