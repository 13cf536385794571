pub mod auth;
pub mod client_origin;
pub mod configuration;
pub mod email_client;
pub mod error;
pub mod logger;
pub mod middleware;
pub mod notifier;
pub mod routes;
pub mod startup;
pub mod storage;
pub mod telemetry;
pub mod validators;
