use std::sync::Arc;

use crate::booking::lifecycle::BookingLifecycle;
use crate::config::AppConfig;
use crate::payments::PaymentGateway;
use crate::store::RentalStore;

pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn RentalStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub lifecycle: Arc<BookingLifecycle>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn RentalStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let lifecycle = Arc::new(BookingLifecycle::new(
            Arc::clone(&store),
            Arc::clone(&gateway),
            config.gateway.key_secret.clone(),
            config.gateway.currency.clone(),
        ));
        Self {
            config,
            store,
            gateway,
            lifecycle,
        }
    }
}
