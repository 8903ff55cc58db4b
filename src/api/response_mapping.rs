//! Tolerant mapping from whatever the match endpoint returns to a [`MatchResult`].
//!
//! Each field has an ordered list of JSON pointers; the first one that yields a usable
//! value wins.

use crate::api::match_structs::{MalformedResponse, MatchField, MatchResult};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    /// Already in `0..=1`.
    Fraction,
    /// In `0..=100`, divided by 100.
    Percentage,
}

#[derive(Debug, Clone, Copy)]
pub struct ConfidenceRule {
    pub pointer: &'static str,
    pub scale: Scale,
}

const fn percent(pointer: &'static str) -> ConfidenceRule {
    ConfidenceRule {
        pointer,
        scale: Scale::Percentage,
    }
}

const fn fraction(pointer: &'static str) -> ConfidenceRule {
    ConfidenceRule {
        pointer,
        scale: Scale::Fraction,
    }
}

pub const NAME_RULES: &[&str] = &[
    "/name",
    "/actor_name",
    "/celebrity",
    "/celebrity_name",
    "/match",
    "/match/name",
    "/result/name",
    "/result/actor_name",
];

// Percentage keys come first: when one is present it decides the scale.
pub const CONFIDENCE_RULES: &[ConfidenceRule] = &[
    percent("/match_percentage"),
    percent("/percentage"),
    percent("/match_percent"),
    percent("/similarity_percentage"),
    percent("/result/match_percentage"),
    fraction("/confidence"),
    fraction("/score"),
    fraction("/similarity"),
    fraction("/match/confidence"),
    fraction("/result/confidence"),
];

pub const IMAGE_URL_RULES: &[&str] = &[
    "/matched_image_url",
    "/actor_image",
    "/actor_image_url",
    "/image_url",
    "/image",
    "/match/image_url",
    "/result/matched_image_url",
    "/result/image_url",
];

fn first_text<'a>(body: &'a Value, rules: &[&'static str]) -> Option<(&'static str, &'a str)> {
    rules.iter().find_map(|&pointer| {
        body.pointer(pointer)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| (pointer, s))
    })
}

fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

/// A non-null percentage field settles the scale, so it must hold a number.
/// Fraction fields that don't parse are skipped.
fn first_confidence(body: &Value) -> Result<Option<(ConfidenceRule, f64)>, MalformedResponse> {
    for rule in CONFIDENCE_RULES {
        let Some(value) = body.pointer(rule.pointer).filter(|v| !v.is_null()) else {
            continue;
        };
        match (as_number(value), rule.scale) {
            (Some(raw), _) => return Ok(Some((*rule, raw))),
            (None, Scale::Percentage) => {
                return Err(MalformedResponse::InvalidPercentage {
                    key: rule.pointer,
                    value: value.to_string(),
                });
            }
            (None, Scale::Fraction) => {}
        }
    }
    Ok(None)
}

/// Bring a raw confidence onto the `0..=1` scale, clamping anything still outside it.
#[must_use]
pub fn normalize_confidence(raw: f64, scale: Scale) -> f64 {
    let value = match scale {
        Scale::Fraction => raw,
        Scale::Percentage => raw / 100.0,
    };
    if (0.0..=1.0).contains(&value) {
        value
    } else {
        warn!("Confidence {raw} ({scale:?}) out of range, clamping");
        value.clamp(0.0, 1.0)
    }
}

/// Parse a match endpoint response body.
///
/// Relative image references are resolved against `base`, the endpoint they came from.
pub fn parse_match_response(body: &str, base: &Url) -> Result<MatchResult, MalformedResponse> {
    let body: Value = serde_json::from_str(body)?;
    if !body.is_object() {
        return Err(MalformedResponse::NotAnObject);
    }

    let (name_key, name) =
        first_text(&body, NAME_RULES).ok_or(MalformedResponse::MissingField(MatchField::Name))?;
    let (rule, raw_confidence) =
        first_confidence(&body)?.ok_or(MalformedResponse::MissingField(MatchField::Confidence))?;
    let (image_key, image) = first_text(&body, IMAGE_URL_RULES)
        .ok_or(MalformedResponse::MissingField(MatchField::ImageUrl))?;
    debug!(
        "Mapped response fields: name={name_key}, confidence={}, image={image_key}",
        rule.pointer
    );

    let actor_image_url = base
        .join(image)
        .map_err(|source| MalformedResponse::InvalidImageUrl {
            value: image.to_string(),
            source,
        })?;
    let confidence = normalize_confidence(raw_confidence, rule.scale);

    MatchResult::new(name, confidence, actor_image_url)
        .ok_or(MalformedResponse::MissingField(MatchField::Name))
}
