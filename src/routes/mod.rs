pub mod broadcasts;
pub mod events;
pub mod health;
pub mod inbox;

use axum::http::HeaderMap;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Acting identity headers. Who may call these endpoints is the gateway's
/// problem; the engine only needs an explicit actor for its audit trail.
pub fn actor_id(headers: &HeaderMap) -> Result<Uuid> {
    identity_header(headers, "x-admin-id")
}

pub fn recipient_id(headers: &HeaderMap) -> Result<Uuid> {
    identity_header(headers, "x-user-id")
}

fn identity_header(headers: &HeaderMap, name: &str) -> Result<Uuid> {
    let Some(value) = headers.get(name) else {
        return Err(Error::Unauthorized(format!("missing {} header", name)));
    };
    let raw = value
        .to_str()
        .map_err(|_| Error::Unauthorized(format!("invalid {} header", name)))?;
    Uuid::parse_str(raw).map_err(|_| Error::Unauthorized(format!("invalid {} header", name)))
}
