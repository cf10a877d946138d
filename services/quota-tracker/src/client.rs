use std::time::Duration;

use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::api::{CheckResponse, ConsumeResponse, ErrorResponse, FeatureRequest, GetUsageResponse};
use crate::tracker::{FeatureUsage, UsageReport};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("quota service responded with status {status}: {message}")]
    Api { status: u16, code: String, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("failed to decode quota service response: {0}")]
    Decode(String),
    #[error("invalid quota service url: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    pub fn is_unknown_feature(&self) -> bool {
        matches!(self, ClientError::Api { code, .. } if code == "unknown_feature")
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            return ClientError::Decode(error.to_string());
        }
        if error.is_timeout() {
            return ClientError::Network("request timed out".to_string());
        }
        if error.is_connect() {
            return ClientError::Network("failed to connect to quota service".to_string());
        }
        ClientError::Network(error.to_string())
    }
}

/// HTTP client for UI surfaces that talk to a remote quota service.
#[derive(Clone)]
pub struct QuotaClient {
    http_client: Client,
    base_url: String,
}

impl QuotaClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn consume(&self, feature: &str) -> Result<ConsumeResponse, ClientError> {
        let url = format!("{}/api/quota/consume", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .json(&FeatureRequest {
                feature: feature.to_string(),
            })
            .send()
            .await?;
        decode(response).await
    }

    pub async fn check(&self, feature: &str) -> Result<CheckResponse, ClientError> {
        let url = format!("{}/api/quota/check", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .json(&FeatureRequest {
                feature: feature.to_string(),
            })
            .send()
            .await?;
        decode(response).await
    }

    pub async fn usage(&self, feature: &str) -> Result<FeatureUsage, ClientError> {
        let url = self.feature_url(feature)?;
        let response = self.http_client.get(url).send().await?;
        decode::<GetUsageResponse>(response).await.map(|body| body.usage)
    }

    pub async fn report(&self) -> Result<UsageReport, ClientError> {
        let url = format!("{}/api/quota", self.base_url);
        let response = self.http_client.get(&url).send().await?;
        decode(response).await
    }

    /// `{base}/api/quota/{feature}` with the feature encoded as one path segment.
    fn feature_url(&self, feature: &str) -> Result<Url, ClientError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|err| ClientError::InvalidUrl(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["api", "quota", feature]);
        Ok(url)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unable to read error body".to_string());
    let (code, message) = match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(err) => (err.code, err.error),
        Err(_) => ("unknown".to_string(), body),
    };

    Err(ClientError::Api {
        status: status.as_u16(),
        code,
        message,
    })
}
