use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::Response,
};
use tracing::warn;

use super::handlers::reject;
use super::state::AppState;
use crate::error::MeetError;
use crate::store::User;

pub const AUTH_HEADER: &str = "x-auth-token";

/// Authenticated caller, resolved from the `x-auth-token` header via
/// the user directory. Token issuance lives with the identity service;
/// this extractor only maps a token to its owner.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTH_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .unwrap_or_default();

        if token.is_empty() {
            return Err(reject(&MeetError::Unauthorized));
        }

        match state.users.find_by_token(token).await {
            Ok(Some(user)) => Ok(CurrentUser(user)),
            Ok(None) => {
                warn!("Rejected request with unknown auth token");
                Err(reject(&MeetError::Unauthorized))
            }
            Err(e) => Err(reject(&e)),
        }
    }
}
