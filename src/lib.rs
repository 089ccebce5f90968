pub mod api_router;
pub mod auth;
pub mod booking;
pub mod config;
pub mod equipment;
pub mod payments;
pub mod reviews;
pub mod shared;
pub mod store;
