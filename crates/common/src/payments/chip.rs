//! CHIP hosted checkout client

use super::{PaymentGateway, Purchase, PurchaseRequest, PurchaseStatus};
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// HTTP client for the CHIP purchases API
pub struct ChipClient {
    client: reqwest::Client,
    base_url: String,
}

impl ChipClient {
    /// Create a client; `timeout` bounds every call end to end
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Read the body as JSON; anything else is an upstream error
    async fn read_json(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let text = response.text().await.map_err(|e| AppError::GatewayUnreachable {
            message: e.to_string(),
        })?;

        serde_json::from_str(&text).map_err(|_| AppError::PaymentGateway {
            message: format!("Unexpected response ({})", status),
        })
    }
}

/// Gateway error text, falling back to a generic message
fn gateway_message(body: &Value) -> String {
    body.get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| "Unknown error".to_string())
}

/// Pull `id` and `checkout_url` out of a create-purchase response
pub(crate) fn parse_purchase(body: &Value) -> Result<Purchase> {
    let id = body.get("id").and_then(Value::as_str);
    let checkout_url = body.get("checkout_url").and_then(Value::as_str);

    match (id, checkout_url) {
        (Some(id), Some(checkout_url)) => Ok(Purchase {
            id: id.to_string(),
            checkout_url: checkout_url.to_string(),
        }),
        _ => Err(AppError::PaymentGateway {
            message: gateway_message(body),
        }),
    }
}

#[async_trait]
impl PaymentGateway for ChipClient {
    async fn create_purchase(&self, api_key: &str, request: &PurchaseRequest) -> Result<Purchase> {
        let url = format!("{}/purchases/", self.base_url);
        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                metrics::record_gateway_call("create_purchase", start.elapsed().as_secs_f64(), false);
                warn!(error = %e, reference = %request.reference, "Payment gateway connection failed");
                AppError::GatewayUnreachable { message: e.to_string() }
            })?;

        let body = Self::read_json(response).await?;
        let result = parse_purchase(&body);

        metrics::record_gateway_call("create_purchase", start.elapsed().as_secs_f64(), result.is_ok());
        debug!(reference = %request.reference, ok = result.is_ok(), "Create purchase response");
        result
    }

    async fn fetch_purchase(&self, api_key: &str, purchase_id: &str) -> Result<PurchaseStatus> {
        let url = format!("{}/purchases/{}/", self.base_url, purchase_id);
        let start = Instant::now();

        let response = self
            .client
            .get(&url)
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| {
                metrics::record_gateway_call("fetch_purchase", start.elapsed().as_secs_f64(), false);
                AppError::GatewayUnreachable { message: e.to_string() }
            })?;

        let body = Self::read_json(response).await?;
        metrics::record_gateway_call("fetch_purchase", start.elapsed().as_secs_f64(), true);

        let status = body
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::PaymentGateway {
                message: gateway_message(&body),
            })?
            .to_string();

        Ok(PurchaseStatus {
            id: purchase_id.to_string(),
            status,
            raw: body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_purchase_success() {
        let body = json!({"id": "purch_1", "checkout_url": "https://gate.chip-in.asia/p/purch_1/", "status": "created"});
        let purchase = parse_purchase(&body).unwrap();
        assert_eq!(purchase.id, "purch_1");
        assert_eq!(purchase.checkout_url, "https://gate.chip-in.asia/p/purch_1/");
    }

    #[test]
    fn test_parse_purchase_carries_gateway_message() {
        let body = json!({"message": "Invalid brand"});
        match parse_purchase(&body) {
            Err(AppError::PaymentGateway { message }) => assert_eq!(message, "Invalid brand"),
            other => panic!("unexpected: {:?}", other),
        }

        let body = json!({"id": "purch_1"});
        match parse_purchase(&body) {
            Err(AppError::PaymentGateway { message }) => assert_eq!(message, "Unknown error"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_gateway() {
        // Nothing listens on the discard port
        let client = ChipClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let request = PurchaseRequest::sample();

        let err = client.create_purchase("key", &request).await.unwrap_err();
        assert!(matches!(err, AppError::GatewayUnreachable { .. }));
    }
}
