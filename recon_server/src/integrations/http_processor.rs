//! A generic JSON-over-HTTP payment processor client.
//!
//! `POST {api_url}/payments/{txn}/capture` with `{"order_id", "amount", "currency"}` (amount in minor units), and
//! `POST {api_url}/payments/{txn}/cancel` with an empty object. Requests carry the API key as a bearer token.
use std::time::Duration;

use log::*;
use recon_common::Secret;
use recon_engine::traits::{CaptureRequest, CaptureResponse, PaymentProcessor, ProcessorError};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{config::ProcessorConfig, errors::ServerError};

#[derive(Debug, Serialize)]
struct CaptureBody<'a> {
    order_id: &'a str,
    amount: i64,
    currency: &'a str,
}

#[derive(Debug, Deserialize)]
struct CaptureReply {
    #[serde(default)]
    gateway_txn_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Clone)]
pub struct HttpProcessorClient {
    name: String,
    api_url: String,
    api_key: Secret<String>,
    client: Client,
}

impl HttpProcessorClient {
    pub fn new(name: &str, api_url: &str, api_key: Secret<String>, timeout: Duration) -> Result<Self, ServerError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ServerError::InitializeError(format!("Could not create the {name} API client. {e}")))?;
        let api_url = api_url.trim_end_matches('/').to_string();
        Ok(Self { name: name.to_string(), api_url, api_key, client })
    }

    pub fn from_config(config: &ProcessorConfig) -> Result<Self, ServerError> {
        Self::new(&config.name, &config.api_url, config.api_key.clone(), config.timeout)
    }

    fn url(&self, txn: &str, action: &str) -> String {
        format!("{}/payments/{txn}/{action}", self.api_url)
    }

    async fn post<T: Serialize + ?Sized>(&self, url: String, body: &T) -> Result<Response, ProcessorError> {
        trace!("📦️ POST {url}");
        let mut req = self.client.post(url).json(body);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(self.api_key.reveal());
        }
        let response = req.send().await.map_err(classify)?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProcessorError::Declined(format!("{status}. {message}")));
        }
        Ok(response)
    }
}

/// Only failures that happen before the request is written are safe to retry. Everything else may have reached the
/// processor.
fn classify(e: reqwest::Error) -> ProcessorError {
    if e.is_connect() || e.is_builder() {
        ProcessorError::NotSent(e.to_string())
    } else {
        ProcessorError::Timeout(e.to_string())
    }
}

impl PaymentProcessor for HttpProcessorClient {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    async fn capture(&self, request: &CaptureRequest) -> Result<CaptureResponse, ProcessorError> {
        let body = CaptureBody {
            order_id: request.order_id.as_str(),
            amount: request.amount.value(),
            currency: request.currency.as_str(),
        };
        let response = self.post(self.url(&request.gateway_txn_id, "capture"), &body).await?;
        let reply = response.json::<CaptureReply>().await.map_err(|e| {
            if e.is_decode() {
                ProcessorError::Protocol(e.to_string())
            } else {
                ProcessorError::Timeout(e.to_string())
            }
        })?;
        let result = CaptureResponse {
            gateway_txn_id: reply.gateway_txn_id.unwrap_or_else(|| request.gateway_txn_id.clone()),
            status: reply.status.unwrap_or_else(|| "captured".to_string()),
        };
        debug!("📦️ {} captured {} for order {}: {}", self.name, result.gateway_txn_id, request.order_id, result.status);
        Ok(result)
    }

    async fn cancel(&self, gateway_txn_id: &str) -> Result<(), ProcessorError> {
        self.post(self.url(gateway_txn_id, "cancel"), &json!({})).await?;
        debug!("📦️ {} cancelled authorization {gateway_txn_id}", self.name);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn urls() {
        let client =
            HttpProcessorClient::new("gravy", "https://api.example.test/v1/", Secret::default(), Duration::from_secs(1))
                .unwrap();
        assert_eq!(client.name(), "gravy");
        assert_eq!(client.url("tx-1", "capture"), "https://api.example.test/v1/payments/tx-1/capture");
        assert_eq!(client.url("tx-1", "cancel"), "https://api.example.test/v1/payments/tx-1/cancel");
    }

    #[tokio::test]
    async fn refused_connections_are_not_sent() {
        // Nothing listens on port 9 of the loopback interface
        let client =
            HttpProcessorClient::new("gravy", "http://127.0.0.1:9", Secret::default(), Duration::from_secs(2)).unwrap();
        let err = client.cancel("tx-1").await.unwrap_err();
        assert!(matches!(err, ProcessorError::NotSent(_)), "{err:?}");
    }
}
