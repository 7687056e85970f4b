//! Actix-web extractor guarding the administration routes.

use actix_web::dev::Payload;
use actix_web::http::StatusCode;
use actix_web::{FromRequest, HttpRequest, HttpResponse, ResponseError, web};
use secrecy::{ExposeSecret, SecretString};
use std::future::{Ready, ready};
use tracing::warn;

use super::AdminKey;
use crate::config::ADMIN_KEY_HEADER;
use crate::error::ErrorResponse;

/// Authentication failure on an admin route.
#[derive(Debug)]
pub struct AuthError {
    message: String,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl ResponseError for AuthError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::UNAUTHORIZED).json(ErrorResponse {
            error: "UNAUTHORIZED".to_string(),
            message: self.message.clone(),
            correlation_id: None,
        })
    }
}

/// Present in a handler's arguments when the caller sent the admin key.
///
/// ```ignore
/// async fn admin_handler(_auth: AdminAuth) -> impl Responder { ... }
/// ```
pub struct AdminAuth;

impl FromRequest for AdminAuth {
    type Error = AuthError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let Some(key) = req.app_data::<web::Data<AdminKey>>() else {
            return ready(Err(AuthError {
                message: "Internal configuration error".to_string(),
            }));
        };

        // Wrapped straight away so the value is zeroized on drop.
        let provided: Option<SecretString> = req
            .headers()
            .get(ADMIN_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| SecretString::from(s.to_string()));

        match provided {
            Some(ref provided) if key.verify(provided.expose_secret()) => ready(Ok(AdminAuth)),
            Some(_) => {
                warn!(path = %req.path(), "Rejected admin request with a wrong key");
                ready(Err(AuthError {
                    message: "Invalid admin key".to_string(),
                }))
            }
            None => ready(Err(AuthError {
                message: format!("Missing admin key. Provide {} header.", ADMIN_KEY_HEADER),
            })),
        }
    }
}
