use crate::acquire::payload::ImagePayload;
use crate::api::match_structs::{MatchFailure, RequestOutcome};
use crate::api::response_mapping::parse_match_response;
use crate::common::api_client::{ApiClient, ApiClientError};
use crate::common::settings::{EndpointSettings, SettingsError};
use tracing::{info, warn};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum FlowSetupError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("Cannot create HTTP client: {0}")]
    Client(#[from] ApiClientError),
}

/// Sends one photo to the match endpoint and turns the reply into a [`RequestOutcome`].
///
/// Every call to [`submit`](Self::submit) makes at most one request: no retries, no
/// caching, no de-duplication. Keeping a single attempt in flight is up to the caller.
#[derive(Clone, Debug)]
pub struct MatchRequestFlow {
    client: ApiClient,
    field_name: String,
}

impl MatchRequestFlow {
    #[must_use]
    pub fn new(client: ApiClient, field_name: impl Into<String>) -> Self {
        Self {
            client,
            field_name: field_name.into(),
        }
    }

    pub fn from_settings(settings: &EndpointSettings) -> Result<Self, FlowSetupError> {
        let endpoint = settings.parsed_url()?;
        let client = ApiClient::new(endpoint)?;
        Ok(Self::new(client, settings.field_name.clone()))
    }

    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        self.client.endpoint()
    }

    /// Submit a photo for matching.
    ///
    /// # Errors
    /// * `MissingInput` when no image is given; nothing is sent.
    /// * `Transport` when the request fails or the endpoint answers with a non-2xx status.
    /// * `Malformed` when the body has no usable name, confidence or image url.
    pub async fn submit(&self, image: Option<ImagePayload>) -> RequestOutcome {
        let Some(image) = image else {
            warn!("Submit called without an image");
            return Err(MatchFailure::MissingInput);
        };

        info!(
            "Submitting {} ({}, {} bytes) to {}",
            image.file_name(),
            image.mime(),
            image.len(),
            self.client.endpoint()
        );
        let file_name = image.file_name().to_string();
        let mime_type = image.mime().to_string();
        let body = self
            .client
            .post_file(&self.field_name, &file_name, &mime_type, image.into_bytes())
            .await
            .inspect_err(|e| warn!("Match request failed: {e}"))?;

        let result = parse_match_response(&body, self.client.endpoint())
            .inspect_err(|e| warn!("Unusable match response: {e}"))?;
        info!(
            "Found match: {} ({:.2})",
            result.actor_name(),
            result.confidence()
        );
        Ok(result)
    }
}
