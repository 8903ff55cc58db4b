use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ApiClientError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Unexpected status {status}: {text}")]
    UnexpectedStatus { status: StatusCode, text: String },
}

impl ApiClientError {
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Request(_) => None,
            Self::UnexpectedStatus { status, .. } => Some(*status),
        }
    }
}

/// Thin wrapper over a reqwest client bound to one fixed endpoint.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http_client: Client,
    endpoint: Url,
}

impl ApiClient {
    /// Create api client. No request timeout is set, reqwest's default applies.
    ///
    /// # Errors
    /// * If the underlying HTTP client can't be built.
    pub fn new(endpoint: Url) -> Result<Self, ApiClientError> {
        let http_client = Client::builder().build()?;
        Ok(Self::with_client(http_client, endpoint))
    }

    #[must_use]
    pub const fn with_client(http_client: Client, endpoint: Url) -> Self {
        Self {
            http_client,
            endpoint,
        }
    }

    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Post a single binary file as a multipart form and return the response body.
    ///
    /// # Errors
    /// * If the POST request can't be made to the endpoint.
    /// * If the body can't be read.
    /// * If a non-success status code is received.
    pub async fn post_file(
        &self,
        field_name: &str,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, ApiClientError> {
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_type)?;
        let form = Form::new().part(field_name.to_string(), part);

        let response = self
            .http_client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        debug!("{} responded with {status}", self.endpoint);
        if status.is_success() {
            Ok(response.text().await?)
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(ApiClientError::UnexpectedStatus { status, text })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn test_post_file_sends_multipart_under_field_name() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/predict")
            .match_header(
                "content-type",
                Matcher::Regex("^multipart/form-data; boundary=.+".to_string()),
            )
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="file"; filename="me.jpg""#.to_string()),
                Matcher::Regex("Content-Type: image/jpeg".to_string()),
            ]))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let endpoint = Url::parse(&format!("{}/predict", server.url())).unwrap();
        let client = ApiClient::new(endpoint).unwrap();
        let body = client
            .post_file("file", "me.jpg", "image/jpeg", vec![0xFF, 0xD8, 0xFF])
            .await
            .unwrap();

        assert_eq!(body, "{}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_file_reports_unexpected_status_with_body() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/predict")
            .with_status(503)
            .with_body("model loading")
            .create_async()
            .await;

        let endpoint = Url::parse(&format!("{}/predict", server.url())).unwrap();
        let client = ApiClient::new(endpoint).unwrap();
        let err = client
            .post_file("file", "me.jpg", "image/jpeg", vec![1, 2, 3])
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert!(err.to_string().contains("model loading"));
    }
}
