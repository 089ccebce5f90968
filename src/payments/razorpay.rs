use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::payments::{GatewayError, Order, OrderRequest, Payment, PaymentGateway};

/// Razorpay-style REST client. Orders are created server-side; payment
/// capture is reported back through the webhook or the client callback.
#[derive(Debug, Clone)]
pub struct RazorpayClient {
    key_id: String,
    key_secret: String,
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct CreateOrderBody {
    amount: i64,
    currency: String,
    receipt: String,
    notes: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    amount: i64,
    currency: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    id: String,
    order_id: Option<String>,
    status: String,
    amount: i64,
    currency: String,
    method: Option<String>,
    created_at: Option<i64>,
}

impl RazorpayClient {
    pub fn new(key_id: String, key_secret: String) -> Self {
        Self {
            key_id,
            key_secret,
            client: reqwest::Client::new(),
            base_url: "https://api.razorpay.com/v1".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        if !status.is_success() {
            #[derive(Deserialize)]
            struct ApiErrorBody {
                error: ApiErrorDetail,
            }
            #[derive(Deserialize)]
            struct ApiErrorDetail {
                description: String,
            }

            if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(&body) {
                return Err(GatewayError::Api(parsed.error.description));
            }
            return Err(GatewayError::Api(format!("HTTP {status}: {body}")));
        }

        serde_json::from_str(&body).map_err(|e| GatewayError::Parse(e.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    async fn create_order(&self, req: OrderRequest) -> Result<Order, GatewayError> {
        if self.key_id.is_empty() || self.key_secret.is_empty() {
            return Err(GatewayError::NotConfigured);
        }

        let body = CreateOrderBody {
            // The gateway bills in minor units.
            amount: req.amount * 100,
            currency: req.currency,
            receipt: req.receipt,
            notes: req.notes,
        };

        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let order: OrderResponse = self.handle_response(response).await?;
        Ok(Order {
            order_ref: order.id,
            amount: order.amount / 100,
            currency: order.currency,
            status: order.status,
        })
    }

    async fn fetch_payment(&self, payment_ref: &str) -> Result<Payment, GatewayError> {
        if self.key_id.is_empty() || self.key_secret.is_empty() {
            return Err(GatewayError::NotConfigured);
        }

        let response = self
            .client
            .get(format!("{}/payments/{}", self.base_url, payment_ref))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let payment: PaymentResponse = self.handle_response(response).await?;
        Ok(Payment {
            payment_ref: payment.id,
            order_ref: payment.order_id,
            status: payment.status,
            amount: payment.amount / 100,
            currency: payment.currency,
            method: payment.method,
            captured_at: payment.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_order_posts_minor_units_and_maps_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/orders")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "amount": 150_000,
                "currency": "INR",
            })))
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "id": "order_abc123",
                    "amount": 150_000,
                    "currency": "INR",
                    "status": "created"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = RazorpayClient::new("key".to_string(), "secret".to_string())
            .with_base_url(server.url());
        let order = client
            .create_order(OrderRequest {
                amount: 1500,
                currency: "INR".to_string(),
                receipt: "receipt-1".to_string(),
                notes: HashMap::new(),
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(order.order_ref, "order_abc123");
        assert_eq!(order.amount, 1500);
        assert_eq!(order.status, "created");
    }

    #[tokio::test]
    async fn api_error_description_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/orders")
            .with_status(400)
            .with_body(
                serde_json::json!({
                    "error": { "description": "amount too small" }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = RazorpayClient::new("key".to_string(), "secret".to_string())
            .with_base_url(server.url());
        let err = client
            .create_order(OrderRequest {
                amount: 0,
                currency: "INR".to_string(),
                receipt: "receipt-2".to_string(),
                notes: HashMap::new(),
            })
            .await
            .unwrap_err();

        match err {
            GatewayError::Api(msg) => assert_eq!(msg, "amount too small"),
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_payment_maps_fields() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/payments/pay_9")
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "id": "pay_9",
                    "order_id": "order_1",
                    "status": "captured",
                    "amount": 50_000,
                    "currency": "INR",
                    "method": "upi",
                    "created_at": 1_700_000_000
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = RazorpayClient::new("key".to_string(), "secret".to_string())
            .with_base_url(server.url());
        let payment = client.fetch_payment("pay_9").await.unwrap();
        assert_eq!(payment.order_ref.as_deref(), Some("order_1"));
        assert_eq!(payment.status, "captured");
        assert_eq!(payment.amount, 500);
        assert_eq!(payment.method.as_deref(), Some("upi"));
    }

    #[tokio::test]
    async fn unconfigured_client_refuses_to_call_out() {
        let client = RazorpayClient::new(String::new(), String::new());
        let err = client
            .create_order(OrderRequest {
                amount: 100,
                currency: "INR".to_string(),
                receipt: "r".to_string(),
                notes: HashMap::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotConfigured));
    }
}
