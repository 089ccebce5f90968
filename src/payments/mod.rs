pub mod razorpay;
pub mod testing;
pub mod webhook;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::shared::schema::payment_receipts;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct OrderRequest {
    /// Amount in whole currency units; the gateway client converts to the
    /// gateway's minor units on the wire.
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_ref: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub payment_ref: String,
    pub order_ref: Option<String>,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    pub method: Option<String>,
    pub captured_at: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway API error: {0}")]
    Api(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("payment gateway is not configured")]
    NotConfigured,
}

/// The opaque payment processor. One production client, one scripted mock.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, req: OrderRequest) -> Result<Order, GatewayError>;
    async fn fetch_payment(&self, payment_ref: &str) -> Result<Payment, GatewayError>;
}

/// One row per captured payment, written exactly once per booking by the
/// Confirm transition.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = payment_receipts)]
pub struct PaymentReceipt {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub payment_ref: String,
    pub amount: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

fn hmac_matches(secret: &str, message: &[u8], signature_hex: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(message);
    match hex::decode(signature_hex) {
        Ok(decoded) => mac.verify_slice(&decoded).is_ok(),
        Err(_) => false,
    }
}

/// Client-callback signature: hex HMAC-SHA256 over `{order_ref}|{payment_ref}`
/// keyed with the gateway key secret.
pub fn verify_payment_signature(
    key_secret: &str,
    order_ref: &str,
    payment_ref: &str,
    signature: &str,
) -> bool {
    let message = format!("{order_ref}|{payment_ref}");
    hmac_matches(key_secret, message.as_bytes(), signature)
}

/// Webhook signature: hex HMAC-SHA256 over the raw request body keyed with the
/// shared webhook secret.
pub fn verify_webhook_signature(webhook_secret: &str, body: &[u8], signature: &str) -> bool {
    hmac_matches(webhook_secret, body, signature)
}

pub fn sign_payment(key_secret: &str, order_ref: &str, payment_ref: &str) -> String {
    let message = format!("{order_ref}|{payment_ref}");
    sign(key_secret, message.as_bytes())
}

pub fn sign(secret: &str, message: &[u8]) -> String {
    match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(message);
            hex::encode(mac.finalize().into_bytes())
        }
        // HMAC accepts keys of any length; unreachable in practice.
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_signature_round_trip() {
        let sig = sign_payment("secret", "order_123", "pay_456");
        assert!(verify_payment_signature("secret", "order_123", "pay_456", &sig));
    }

    #[test]
    fn tampered_payment_signature_is_rejected() {
        let sig = sign_payment("secret", "order_123", "pay_456");
        assert!(!verify_payment_signature("secret", "order_123", "pay_999", &sig));
        assert!(!verify_payment_signature("other", "order_123", "pay_456", &sig));
        assert!(!verify_payment_signature("secret", "order_123", "pay_456", "deadbeef"));
        assert!(!verify_payment_signature("secret", "order_123", "pay_456", "not-hex"));
    }

    #[test]
    fn webhook_signature_covers_raw_body() {
        let body = br#"{"event":"payment.captured"}"#;
        let sig = sign("whsec", body);
        assert!(verify_webhook_signature("whsec", body, &sig));
        assert!(!verify_webhook_signature("whsec", br#"{"event":"x"}"#, &sig));
    }
}
