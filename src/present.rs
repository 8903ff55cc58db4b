use crate::api::match_structs::{FailureKind, MatchFailure, MatchResult};
use url::form_urlencoded::byte_serialize;

const IMDB_FIND_URL: &str = "https://www.imdb.com/find";

impl MatchResult {
    /// Confidence as a whole percentage, the way it is shown to users.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn confidence_percent(&self) -> u8 {
        (self.confidence() * 100.0).round() as u8
    }

    #[must_use]
    pub fn verdict(&self) -> &'static str {
        match self.confidence_percent() {
            80..=u8::MAX => "Incredible match!",
            60..=79 => "Great resemblance!",
            _ => "Interesting similarity!",
        }
    }

    #[must_use]
    pub fn imdb_search_url(&self) -> String {
        let query: String = byte_serialize(self.actor_name().as_bytes()).collect();
        format!("{IMDB_FIND_URL}?q={query}&s=nm")
    }
}

#[must_use]
pub fn success_notification(result: &MatchResult) -> String {
    format!("Found your match: {}!", result.actor_name())
}

#[must_use]
pub fn failure_notification(failure: &MatchFailure) -> &'static str {
    match failure.kind() {
        FailureKind::MissingInput => "Please select or capture an image first",
        FailureKind::Transport | FailureKind::Malformed => {
            "Failed to find your match. Please try again."
        }
    }
}

/// Plain-text card for a terminal.
#[must_use]
pub fn render_summary(result: &MatchResult) -> String {
    let percent = result.confidence_percent();
    let filled = usize::from(percent) / 5;
    [
        format!("You resemble: {}!", result.actor_name()),
        format!(
            "Match score:  [{}{}] {percent}%",
            "#".repeat(filled),
            "-".repeat(20 - filled)
        ),
        format!("              {}", result.verdict()),
        format!("Photo:        {}", result.actor_image_url()),
        format!("IMDb:         {}", result.imdb_search_url()),
    ]
    .join("\n")
}
