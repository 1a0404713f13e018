pub mod moondream;
pub mod openrouter;

pub use moondream::*;
pub use openrouter::*;

use std::sync::Arc;

use thiserror::Error;

use crate::config::{MoondreamConfig, OpenRouterConfig};
use crate::pipeline::detection::{LookupOutcome, VisionBackend, VisionLocateProvider};

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Cannot reach vision provider at {0}")]
    Connection(String),

    #[error("Vision provider returned error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("No API key configured for {0}")]
    MissingApiKey(&'static str),
}

impl ProviderError {
    /// Detection-facing view of a failed call.
    pub fn into_outcome<T>(self) -> LookupOutcome<T> {
        match self {
            Self::ResponseParsing(e) => LookupOutcome::ParseFailure(e),
            other => LookupOutcome::TransportFailure(other.to_string()),
        }
    }
}

pub(crate) fn outcome<T>(result: Result<T, ProviderError>) -> LookupOutcome<T> {
    match result {
        Ok(value) => LookupOutcome::Success(value),
        Err(e) => e.into_outcome(),
    }
}

pub(crate) fn build_http_client(timeout_secs: u64) -> Result<reqwest::blocking::Client, ProviderError> {
    reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ProviderError::HttpClient(format!("Failed to create HTTP client: {e}")))
}

/// Map a reqwest send error the same way for every provider.
pub(crate) fn send_error(e: reqwest::Error, base_url: &str, timeout_secs: u64) -> ProviderError {
    if e.is_connect() {
        ProviderError::Connection(base_url.to_string())
    } else if e.is_timeout() {
        ProviderError::HttpClient(format!("Request timed out after {timeout_secs}s"))
    } else {
        ProviderError::HttpClient(e.to_string())
    }
}

/// Check the status and decode a JSON body.
pub(crate) fn read_json<R: serde::de::DeserializeOwned>(
    response: reqwest::blocking::Response,
) -> Result<R, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(ProviderError::Api {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .map_err(|e| ProviderError::ResponseParsing(e.to_string()))
}

/// Vision-locate provider for the configured backend.
pub fn build_vision_locator(
    backend: VisionBackend,
    moondream: &MoondreamConfig,
    openrouter: &OpenRouterConfig,
) -> Result<Arc<dyn VisionLocateProvider>, ProviderError> {
    tracing::info!(?backend, "Building vision locator");
    let locator: Arc<dyn VisionLocateProvider> = match backend {
        VisionBackend::Moondream => Arc::new(MoondreamClient::new(moondream)?),
        VisionBackend::OpenRouter => {
            Arc::new(OpenRouterLocator::new(Arc::new(OpenRouterClient::new(openrouter)?)))
        }
    };
    Ok(locator)
}
