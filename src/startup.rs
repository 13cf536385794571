use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;
use actix_web::dev::Server;

use crate::auth::AuthServices;
use crate::client_origin::OriginPolicy;
use crate::logger::LoggerMiddleware;
use crate::middleware::AccessMiddleware;
use crate::routes::{authenticate, current_session, health_check, refresh, register};

pub fn run(
    listener: TcpListener,
    services: AuthServices,
    origin_policy: OriginPolicy,
) -> Result<Server, std::io::Error> {
    let validator = services.validator.clone();
    let services = web::Data::new(services);
    let origin_policy_data = web::Data::new(origin_policy);

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(Logger::default())                   // Standard logging
            .wrap(LoggerMiddleware::new(origin_policy)) // Structured request span

            // Shared state
            .app_data(services.clone())
            .app_data(origin_policy_data.clone())

            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/api")
                    .route("/register", web::post().to(register))
                    .route("/auth", web::post().to(authenticate))
                    // Verifies its own tokens, see `routes::refresh`
                    .route("/refresh", web::get().to(refresh))
                    // Protected routes (require a live session)
                    .service(
                        web::resource("/session")
                            .wrap(AccessMiddleware::new(validator.clone()))
                            .route(web::get().to(current_session)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
