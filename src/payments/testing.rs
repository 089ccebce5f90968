//! Scripted in-memory gateway for tests and local development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::payments::{GatewayError, Order, OrderRequest, Payment, PaymentGateway};

#[derive(Default)]
pub struct MockGateway {
    orders: Arc<RwLock<HashMap<String, Order>>>,
    fail_next_order: AtomicBool,
    create_order_calls: AtomicUsize,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `create_order` call fail with an API error, simulating
    /// an upstream fault during checkout.
    pub fn fail_next_order(&self) {
        self.fail_next_order.store(true, Ordering::SeqCst);
    }

    pub fn create_order_calls(&self) -> usize {
        self.create_order_calls.load(Ordering::SeqCst)
    }

    pub async fn order(&self, order_ref: &str) -> Option<Order> {
        let orders = self.orders.read().await;
        orders.get(order_ref).cloned()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_order(&self, req: OrderRequest) -> Result<Order, GatewayError> {
        self.create_order_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_order.swap(false, Ordering::SeqCst) {
            return Err(GatewayError::Api("simulated order failure".to_string()));
        }

        let order = Order {
            order_ref: format!("order_{}", Uuid::new_v4().simple()),
            amount: req.amount,
            currency: req.currency,
            status: "created".to_string(),
        };
        let mut orders = self.orders.write().await;
        orders.insert(order.order_ref.clone(), order.clone());
        Ok(order)
    }

    async fn fetch_payment(&self, payment_ref: &str) -> Result<Payment, GatewayError> {
        Ok(Payment {
            payment_ref: payment_ref.to_string(),
            order_ref: None,
            status: "captured".to_string(),
            amount: 0,
            currency: "INR".to_string(),
            method: Some("upi".to_string()),
            captured_at: None,
        })
    }
}
