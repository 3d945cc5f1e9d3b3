//! Shared HTTP client for the hosted inference endpoints

use crate::gateway::AdapterFailure;
use crate::infrastructure::settings::Settings;
use di::{Ref, inject, injectable};
use log::{debug, warn};
use reqwest::RequestBuilder;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

pub struct InferenceClient {
    http: reqwest::Client,
    token: Option<String>,
}

#[injectable]
impl InferenceClient {
    #[inject]
    pub fn create(settings: Ref<Settings>) -> InferenceClient {
        InferenceClient::new(settings.inference_token.clone(), settings.request_timeout)
    }

    pub fn new(token: Option<String>, timeout: Duration) -> InferenceClient {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("falling back to default HTTP client: {e}");
                reqwest::Client::new()
            });

        InferenceClient { http, token }
    }

    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        service: &'static str,
        url: &str,
        body: &B,
    ) -> Result<Vec<u8>, AdapterFailure> {
        self.send(service, self.http.post(url).json(body)).await
    }

    pub async fn post_bytes(
        &self,
        service: &'static str,
        url: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<Vec<u8>, AdapterFailure> {
        self.send(
            service,
            self.http
                .post(url)
                .header(CONTENT_TYPE, content_type)
                .body(bytes),
        )
        .await
    }

    async fn send(
        &self,
        service: &'static str,
        request: RequestBuilder,
    ) -> Result<Vec<u8>, AdapterFailure> {
        let request = match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| AdapterFailure::new(service, format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| AdapterFailure::new(service, format!("reading response failed: {e}")))?;
        debug!("{service} answered {status} with {} bytes", body.len());

        if !status.is_success() {
            let detail = String::from_utf8_lossy(&body);
            return Err(AdapterFailure::new(
                service,
                format!("HTTP {status}: {}", detail.trim()),
            ));
        }

        Ok(body.to_vec())
    }
}

/// Decodes a JSON body into the shape the adapter expects.
pub fn decode<T: DeserializeOwned>(service: &'static str, body: &[u8]) -> Result<T, AdapterFailure> {
    serde_json::from_slice(body)
        .map_err(|e| AdapterFailure::new(service, format!("unexpected response format: {e}")))
}
