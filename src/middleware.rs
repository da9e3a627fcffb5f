//! Server-wide middleware configuration helpers.
//!
//! Keeps the Actix application setup focused by providing reusable
//! constructors for the CORS and logging layers.

use actix_cors::Cors;
use actix_web::middleware;
use log::debug;

use sqldock_configs::CorsSettings;

/// Build CORS middleware from server configuration using actix-cors.
///
/// An empty origin list (or an explicit "*") allows any origin, which is
/// the right default for a localhost developer tool queried from browser
/// sandboxes and editor plugins.
pub fn build_cors_from_config(settings: &CorsSettings) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_any_header()
        .max_age(3600);

    if settings.allowed_origins.is_empty()
        || settings.allowed_origins.contains(&"*".to_string())
    {
        cors = cors.allow_any_origin();
        debug!("CORS: Allowing any origin");
    } else {
        for origin in &settings.allowed_origins {
            cors = cors.allowed_origin(origin);
        }
        debug!("CORS: Allowed origins: {:?}", settings.allowed_origins);
    }

    cors
}

/// Build the request logger middleware.
pub fn request_logger() -> middleware::Logger {
    middleware::Logger::default()
}
