use std::net::TcpListener;
use std::sync::Arc;

use session_auth::auth::AuthServices;
use session_auth::client_origin::OriginPolicy;
use session_auth::configuration::get_configuration;
use session_auth::email_client::{EmailClient, SenderEmail};
use session_auth::notifier::EmailNotifier;
use session_auth::startup::run;
use session_auth::storage::{spawn_session_sweeper, PgIdentityStore, PgSessionStore};
use session_auth::telemetry::init_telemetry;
use sqlx::postgres::PgPoolOptions;

fn startup_error(kind: std::io::ErrorKind, message: &str) -> std::io::Error {
    std::io::Error::new(kind, message.to_string())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(startup_error(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };
    if let Err(e) = configuration.validate() {
        tracing::error!("Invalid configuration: {}", e);
        return Err(startup_error(
            std::io::ErrorKind::InvalidInput,
            "Configuration error",
        ));
    }
    tracing::info!("Configuration loaded successfully");

    tracing::info!("Attempting to connect to database");
    let pool = PgPoolOptions::new()
        .max_connections(configuration.database.max_connections)
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            startup_error(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error",
            )
        })?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to run migrations: {}", e);
            startup_error(std::io::ErrorKind::Other, "Migration error")
        })?;
    tracing::info!("Database ready");

    let sender = SenderEmail::parse(configuration.email.sender.clone()).map_err(|e| {
        tracing::error!("Invalid sender email: {}", e);
        startup_error(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;
    let http_client = reqwest::Client::builder()
        .timeout(configuration.email.timeout())
        .build()
        .map_err(|e| {
            tracing::error!("Failed to build HTTP client: {}", e);
            startup_error(std::io::ErrorKind::Other, "HTTP client error")
        })?;
    let email_client = EmailClient::new(configuration.email.base_url.clone(), sender, http_client);

    let sessions = Arc::new(PgSessionStore::new(pool.clone()));
    let identities = Arc::new(PgIdentityStore::new(pool));
    let notifier = Arc::new(EmailNotifier::new(email_client, identities.clone()));

    let services = AuthServices::new(
        &configuration.security,
        sessions.clone(),
        identities,
        notifier,
    )
    .map_err(|e| {
        tracing::error!("Failed to build auth services: {}", e);
        startup_error(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;

    // A session past the refresh window can no longer be used
    let _sweeper = spawn_session_sweeper(
        sessions,
        configuration.security.refresh_token_expiry,
        configuration.security.session_sweep_interval(),
    );
    tracing::info!(
        every_secs = configuration.security.session_sweep_interval_secs,
        "Expired session sweeper started"
    );

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let origin_policy = OriginPolicy::new(configuration.application.trust_forwarded_for);
    run(listener, services, origin_policy)?.await
}
