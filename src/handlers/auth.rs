use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::errors::AppError;
use crate::models::{AccountStatus, Principal, Role};
use crate::state::AppState;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let token = header(headers, "authorization")
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    if expected_token.is_empty() || token != expected_token {
        return Err(AppError::Unauthorized("invalid gateway token".to_string()));
    }
    Ok(())
}

/// Reads the caller forwarded by the identity gateway.
pub fn principal_from_headers(headers: &HeaderMap, expected_token: &str) -> Result<Principal, AppError> {
    check_auth(headers, expected_token)?;

    let user_id = header(headers, "x-user-id")
        .ok_or_else(|| AppError::Unauthorized("missing X-User-Id".to_string()))?;
    let role = header(headers, "x-user-role")
        .and_then(Role::parse)
        .ok_or_else(|| AppError::Unauthorized("missing or unknown X-User-Role".to_string()))?;
    let account_status = match header(headers, "x-account-status") {
        None => AccountStatus::Active,
        Some(raw) => AccountStatus::parse(raw)
            .ok_or_else(|| AppError::Unauthorized(format!("unknown account status {raw}")))?,
    };

    Ok(Principal {
        user_id: user_id.to_string(),
        role,
        account_status,
    })
}

/// Extractor wrapper so handlers can take the caller as an argument.
pub struct Caller(pub Principal);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let principal = principal_from_headers(&parts.headers, &state.config.gateway_token)?;
        Ok(Caller(principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_valid_headers() {
        let h = headers(&[
            ("authorization", "Bearer secret"),
            ("x-user-id", "user-1"),
            ("x-user-role", "Manager"),
        ]);
        let p = principal_from_headers(&h, "secret").unwrap();
        assert_eq!(p.user_id, "user-1");
        assert_eq!(p.role, Role::Manager);
        assert!(p.is_active());
    }

    #[test]
    fn test_wrong_token() {
        let h = headers(&[
            ("authorization", "Bearer nope"),
            ("x-user-id", "user-1"),
            ("x-user-role", "client"),
        ]);
        assert!(matches!(principal_from_headers(&h, "secret"), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn test_unknown_role() {
        let h = headers(&[
            ("authorization", "Bearer secret"),
            ("x-user-id", "user-1"),
            ("x-user-role", "superuser"),
        ]);
        assert!(matches!(principal_from_headers(&h, "secret"), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn test_suspended_account_passes_through() {
        let h = headers(&[
            ("authorization", "Bearer secret"),
            ("x-user-id", "user-1"),
            ("x-user-role", "client"),
            ("x-account-status", "suspended"),
        ]);
        let p = principal_from_headers(&h, "secret").unwrap();
        assert_eq!(p.account_status, AccountStatus::Suspended);
    }
}
