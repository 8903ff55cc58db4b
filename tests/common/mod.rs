use lookalike::common::api_client::ApiClient;
use lookalike::{ImagePayload, MatchRequestFlow};
use mockito::{Mock, ServerGuard};
use url::Url;

pub const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

pub fn selfie() -> ImagePayload {
    ImagePayload::from_bytes(JPEG_MAGIC.to_vec(), "selfie.jpg").expect("valid jpeg magic")
}

pub fn flow_for(server: &ServerGuard) -> MatchRequestFlow {
    let endpoint = Url::parse(&format!("{}/predict", server.url())).expect("mock url");
    MatchRequestFlow::new(ApiClient::new(endpoint).expect("http client"), "file")
}

pub async fn mock_predict(server: &mut ServerGuard, status: usize, body: &str) -> Mock {
    server
        .mock("POST", "/predict")
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await
}
