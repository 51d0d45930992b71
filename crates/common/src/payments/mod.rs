//! Payment gateway adapter
//!
//! Provides:
//! - The [`PaymentGateway`] seam used by the payment workflow
//! - [`ChipClient`], the CHIP hosted-checkout implementation
//! - HMAC-SHA256 webhook signature helpers
//!
//! Gateway credentials live in runtime settings, so the API key is passed
//! per call instead of being baked into the client.

mod chip;
pub mod signature;

pub use chip::ChipClient;

use crate::errors::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Payer contact details
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseClient {
    pub email: String,
    pub full_name: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseProduct {
    pub name: String,
    /// Minor units
    pub price: i64,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseDetails {
    /// Minor units
    pub total: i64,
    pub currency: String,
    pub products: Vec<PurchaseProduct>,
}

/// Body of `POST /purchases/`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseRequest {
    pub brand_id: String,
    pub client: PurchaseClient,
    pub purchase: PurchaseDetails,
    pub success_redirect: String,
    pub failure_redirect: String,
    pub cancel_redirect: String,
    pub reference: String,
    /// Unix seconds
    pub due: i64,
}

/// A created checkout session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Purchase {
    pub id: String,
    pub checkout_url: String,
}

/// Current state of a checkout session as reported by the gateway
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseStatus {
    pub id: String,
    pub status: String,
    pub raw: serde_json::Value,
}

impl PurchaseStatus {
    pub fn is_paid(&self) -> bool {
        self.status == crate::domain::STATUS_PAID
    }
}

/// Hosted checkout provider
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a checkout session
    async fn create_purchase(&self, api_key: &str, request: &PurchaseRequest) -> Result<Purchase>;

    /// Fetch the current status of a checkout session
    async fn fetch_purchase(&self, api_key: &str, purchase_id: &str) -> Result<PurchaseStatus>;
}

#[cfg(test)]
impl PurchaseRequest {
    pub(crate) fn sample() -> Self {
        Self {
            brand_id: "brand".into(),
            client: PurchaseClient {
                email: "ada@example.com".into(),
                full_name: "Ada".into(),
                phone: String::new(),
            },
            purchase: PurchaseDetails {
                total: 30_000,
                currency: "MYR".into(),
                products: vec![PurchaseProduct {
                    name: "Conference Registration - Test".into(),
                    price: 30_000,
                    quantity: 1,
                }],
            },
            success_redirect: "http://localhost/ok".into(),
            failure_redirect: "http://localhost/failed".into(),
            cancel_redirect: "http://localhost/cancelled".into(),
            reference: "PAPER-1-0".into(),
            due: 0,
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use fake::{FakeGateway, FakeOutcome};

#[cfg(any(test, feature = "test-util"))]
mod fake {
    use super::*;
    use crate::errors::AppError;
    use std::sync::Mutex;

    /// What the fake answers to `create_purchase`
    #[derive(Debug, Clone)]
    pub enum FakeOutcome {
        /// Hand out `purch_<n>` sessions
        Succeed,
        /// Transport failure
        Unreachable,
        /// Response without `id`/`checkout_url`, carrying this message
        Rejected(String),
    }

    /// Scripted in-process gateway that records every request
    pub struct FakeGateway {
        outcome: Mutex<FakeOutcome>,
        remote_status: Mutex<String>,
        requests: Mutex<Vec<(String, PurchaseRequest)>>,
        fetches: Mutex<Vec<String>>,
    }

    impl Default for FakeGateway {
        fn default() -> Self {
            Self::new(FakeOutcome::Succeed)
        }
    }

    impl FakeGateway {
        pub fn new(outcome: FakeOutcome) -> Self {
            Self {
                outcome: Mutex::new(outcome),
                remote_status: Mutex::new("created".to_string()),
                requests: Mutex::new(Vec::new()),
                fetches: Mutex::new(Vec::new()),
            }
        }

        pub fn set_outcome(&self, outcome: FakeOutcome) {
            *self.outcome.lock().unwrap() = outcome;
        }

        /// Status returned by `fetch_purchase`
        pub fn set_remote_status(&self, status: &str) {
            *self.remote_status.lock().unwrap() = status.to_string();
        }

        /// `(api_key, request)` pairs received by `create_purchase`
        pub fn requests(&self) -> Vec<(String, PurchaseRequest)> {
            self.requests.lock().unwrap().clone()
        }

        pub fn create_calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn fetch_calls(&self) -> usize {
            self.fetches.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn create_purchase(&self, api_key: &str, request: &PurchaseRequest) -> Result<Purchase> {
            let n = {
                let mut requests = self.requests.lock().unwrap();
                requests.push((api_key.to_string(), request.clone()));
                requests.len()
            };

            match self.outcome.lock().unwrap().clone() {
                FakeOutcome::Succeed => Ok(Purchase {
                    id: format!("purch_{}", n),
                    checkout_url: format!("https://gate.test/p/purch_{}/", n),
                }),
                FakeOutcome::Unreachable => Err(AppError::GatewayUnreachable {
                    message: "connection refused".to_string(),
                }),
                FakeOutcome::Rejected(message) => Err(AppError::PaymentGateway { message }),
            }
        }

        async fn fetch_purchase(&self, _api_key: &str, purchase_id: &str) -> Result<PurchaseStatus> {
            self.fetches.lock().unwrap().push(purchase_id.to_string());
            let status = self.remote_status.lock().unwrap().clone();

            Ok(PurchaseStatus {
                id: purchase_id.to_string(),
                raw: serde_json::json!({ "id": purchase_id, "status": status }),
                status,
            })
        }
    }
}
