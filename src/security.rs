use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::api_errors::AppError;
use crate::loa::LOA;
use crate::request_context::RequestContext;

/// Caller identity as supplied by the fronting platform.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: String,
    pub loa: LOA,
}

impl CurrentUser {
    pub fn context(&self) -> RequestContext {
        RequestContext::new(&self.user_id, self.loa.clone())
    }
}

// The platform's session middleware sets X-User-Id and X-LOA; anything
// unparseable degrades to Guest, which fails every backup capability check.
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let uid = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .trim()
            .to_string();
        let loa_str = parts
            .headers
            .get("x-loa")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("guest");

        if uid.is_empty() {
            return Err(AppError::unauthorized("missing user"));
        }

        let loa = loa_str.trim().parse::<LOA>().unwrap_or(LOA::Guest);
        Ok(CurrentUser { user_id: uid, loa })
    }
}
