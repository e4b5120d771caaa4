use axum::http::HeaderMap;

use crate::app::AppState;
use crate::error::ApiError;

/// Gate for server-to-server and operator endpoints.
///
/// With no `gateway.push_token` configured every request passes, which is
/// meant for local development only.
pub fn check_auth(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.config.gateway.push_token.as_deref() else {
        return Ok(());
    };
    match extract_bearer(headers) {
        Some(token) if token == expected => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_prefix_is_required() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer abc".parse().unwrap());
        assert_eq!(extract_bearer(&headers), Some("abc"));

        headers.insert("authorization", "Basic abc".parse().unwrap());
        assert_eq!(extract_bearer(&headers), None);
    }
}
