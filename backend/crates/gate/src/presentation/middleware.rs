//! Gate Middleware
//!
//! Role guard for admin areas. Runs the route authorizer for the calling
//! client and either lets the request through or redirects it.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use std::sync::Arc;

use crate::domain::provider::IdentityProvider;
use crate::domain::services::{Authorization, Decision, authorize};
use crate::domain::value_object::{PUBLIC_HOME, Role};
use crate::error::GateError;
use crate::presentation::handlers::{GateAccess, GateAppState, GateClient};

/// Middleware state: the app state plus the roles a route accepts
pub struct RoleGuard<P> {
    pub state: GateAppState<P>,
    /// `None` lets any administrator through
    pub required: Option<Arc<[Role]>>,
}

impl<P> RoleGuard<P> {
    pub fn new(state: GateAppState<P>, required: Option<&[Role]>) -> Self {
        Self {
            state,
            required: required.map(Arc::from),
        }
    }
}

impl<P> Clone for RoleGuard<P> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            required: self.required.clone(),
        }
    }
}

/// Redirect carrying the originally requested location in `from`
fn redirect_with_origin(path: &str, from: &str) -> Response {
    let location = format!("{path}?from={}", urlencoding::encode(from));
    Redirect::to(&location).into_response()
}

/// Middleware that requires one of the guard's roles
///
/// A loading session is waited on (bounded by the configured timeout)
/// before deciding; a timeout answers 503. A caller without a client
/// context cannot be signed in, so it is sent home without creating one.
pub async fn require_roles<P>(State(guard): State<RoleGuard<P>>, req: Request<Body>, next: Next) -> Response
where
    P: IdentityProvider + Send + Sync + 'static,
{
    let registry = guard.state.registry.clone();
    let (parts, body) = req.into_parts();

    let requested = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let context = match GateClient::existing(&parts, &guard.state) {
        Ok(Some(context)) => context,
        Ok(None) => {
            tracing::debug!(from = %requested, "No client context, sending home");
            return redirect_with_origin(PUBLIC_HOME, &requested);
        }
        Err(e) => return e.into_response(),
    };
    let required = guard.required.as_deref();

    let mut local_override = context.effective_override();
    let mut session = context.session().snapshot();
    let mut authorization = authorize(required, &session, local_override.as_ref(), &requested);

    if authorization == Authorization::Pending {
        let timeout = registry.config().session_ready_timeout;
        session = match context.session().ready(timeout).await {
            Ok(session) => session,
            Err(e) => return e.into_response(),
        };
        local_override = context.effective_override();
        authorization = authorize(required, &session, local_override.as_ref(), &requested);
    }

    let decision = match authorization {
        Authorization::Decided(decision) => decision,
        Authorization::Pending => return GateError::SessionLoading.into_response(),
    };

    match decision {
        Decision::Render => {
            let access = match &local_override {
                Some(record) => GateAccess {
                    role: record.role,
                    email: Some(record.email.clone()),
                    via_override: true,
                },
                None => GateAccess {
                    role: session.role(),
                    email: session.email().map(str::to_string),
                    via_override: false,
                },
            };
            let mut req = Request::from_parts(parts, body);
            req.extensions_mut().insert(access);
            next.run(req).await
        }
        Decision::RedirectHome { from } => {
            tracing::debug!(from = %from, "Not an administrator, sending home");
            redirect_with_origin(PUBLIC_HOME, &from)
        }
        Decision::RedirectTo { path, from } => {
            tracing::debug!(from = %from, to = %path, "Role does not cover this area");
            redirect_with_origin(path, &from)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_encodes_origin() {
        let response = redirect_with_origin("/", "/admin/charity?tab=donors&x=1");
        assert_eq!(response.status(), axum::http::StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[axum::http::header::LOCATION],
            "/?from=%2Fadmin%2Fcharity%3Ftab%3Ddonors%26x%3D1"
        );
    }
}
