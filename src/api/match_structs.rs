use crate::common::api_client::ApiClientError;
use serde::Serialize;
use std::fmt;
use url::Url;

/// What the match endpoint found: the look-alike, how sure it is, and a picture of them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    actor_name: String,
    /// Always within `0.0..=1.0`.
    confidence: f64,
    actor_image_url: Url,
}

impl MatchResult {
    /// Returns `None` for a blank name or a confidence outside `0.0..=1.0`.
    #[must_use]
    pub fn new(actor_name: impl Into<String>, confidence: f64, actor_image_url: Url) -> Option<Self> {
        let actor_name = actor_name.into();
        if actor_name.trim().is_empty() || !(0.0..=1.0).contains(&confidence) {
            return None;
        }
        Some(Self {
            actor_name,
            confidence,
            actor_image_url,
        })
    }

    #[must_use]
    pub fn actor_name(&self) -> &str {
        &self.actor_name
    }

    #[must_use]
    pub const fn confidence(&self) -> f64 {
        self.confidence
    }

    #[must_use]
    pub const fn actor_image_url(&self) -> &Url {
        &self.actor_image_url
    }
}

pub type RequestOutcome = Result<MatchResult, MatchFailure>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    MissingInput,
    Transport,
    Malformed,
}

#[derive(Debug, thiserror::Error)]
pub enum MatchFailure {
    #[error("No image was selected or captured")]
    MissingInput,
    #[error("Match request failed: {0}")]
    Transport(#[from] ApiClientError),
    #[error("Malformed match response: {0}")]
    Malformed(#[from] MalformedResponse),
}

impl MatchFailure {
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::MissingInput => FailureKind::MissingInput,
            Self::Transport(_) => FailureKind::Transport,
            Self::Malformed(_) => FailureKind::Malformed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchField {
    Name,
    Confidence,
    ImageUrl,
}

impl fmt::Display for MatchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Name => "name",
            Self::Confidence => "confidence",
            Self::ImageUrl => "image url",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MalformedResponse {
    #[error("body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("body is not a JSON object")]
    NotAnObject,
    #[error("no recognized {0} field")]
    MissingField(MatchField),
    #[error("percentage field {key} is not a number: {value}")]
    InvalidPercentage { key: &'static str, value: String },
    #[error("image url {value:?} can't be resolved: {source}")]
    InvalidImageUrl {
        value: String,
        source: url::ParseError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://x/y.jpg").unwrap()
    }

    #[test]
    fn test_new_validates_fields() {
        assert!(MatchResult::new("Shah Rukh Khan", 0.87, url()).is_some());
        assert!(MatchResult::new("  ", 0.5, url()).is_none());
        assert!(MatchResult::new("Kajol", 1.2, url()).is_none());
        assert!(MatchResult::new("Kajol", -0.1, url()).is_none());
        assert!(MatchResult::new("Kajol", f64::NAN, url()).is_none());
    }

    #[test]
    fn test_failure_kinds() {
        assert_eq!(MatchFailure::MissingInput.kind(), FailureKind::MissingInput);
        let malformed = MatchFailure::from(MalformedResponse::MissingField(MatchField::Name));
        assert_eq!(malformed.kind(), FailureKind::Malformed);
        assert_eq!(
            malformed.to_string(),
            "Malformed match response: no recognized name field"
        );
    }

    #[test]
    fn test_serializes_with_snake_case_keys() {
        let result = MatchResult::new("Deepika Padukone", 0.42, url()).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["actor_name"], "Deepika Padukone");
        assert_eq!(json["confidence"], 0.42);
        assert_eq!(json["actor_image_url"], "https://x/y.jpg");
    }
}
