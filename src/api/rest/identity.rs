use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;

/// Header carrying the authenticated driver id, set by the auth gateway.
pub const DRIVER_ID_HEADER: &str = "x-driver-id";

/// The driver on whose behalf the request is made.
pub struct AuthenticatedDriver(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedDriver
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(DRIVER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized(format!("missing {DRIVER_ID_HEADER} header")))?
            .to_str()
            .map_err(|_| AppError::Unauthorized(format!("{DRIVER_ID_HEADER} is not valid text")))?;

        Uuid::parse_str(raw.trim())
            .map(AuthenticatedDriver)
            .map_err(|err| AppError::Unauthorized(format!("invalid {DRIVER_ID_HEADER}: {err}")))
    }
}
