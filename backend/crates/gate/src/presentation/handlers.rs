//! HTTP Handlers

use axum::Json;
use axum::extract::{ConnectInfo, FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use std::net::SocketAddr;
use std::sync::Arc;

use platform::client::{ClientFingerprint, extract_client_ip, extract_fingerprint};
use platform::cookie::{extract_cookie, set_cookie_header};

use crate::application::{ClientContext, ClientRegistry};
use crate::domain::entity::{AttemptStatus, LoginAttempts, Session};
use crate::domain::provider::IdentityProvider;
use crate::domain::value_object::{Role, Sector};
use crate::error::{GateError, GateResult};
use crate::presentation::dto::{AdminAreaResponse, SessionResponse, SignInRequest, SignInResponse};

/// Shared state for gate handlers
pub struct GateAppState<P> {
    pub registry: Arc<ClientRegistry<P>>,
}

impl<P> GateAppState<P> {
    pub fn new(registry: Arc<ClientRegistry<P>>) -> Self {
        Self { registry }
    }
}

impl<P> Clone for GateAppState<P> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

// ============================================================================
// Client extraction
// ============================================================================

/// Browser fingerprint and client cookie of a request
fn client_key<P>(parts: &Parts, state: &GateAppState<P>) -> GateResult<(ClientFingerprint, Option<String>)> {
    let direct_ip = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip());
    let client_ip = extract_client_ip(&parts.headers, direct_ip);
    let fingerprint = extract_fingerprint(&parts.headers, client_ip)?;

    let token = extract_cookie(&parts.headers, &state.registry.config().client_cookie_name);
    Ok((fingerprint, token))
}

/// The calling browser's client context
///
/// A request without a valid client cookie gets a fresh context; the new
/// cookie is attached by [`GateClient::respond`].
pub struct GateClient<P> {
    pub context: Arc<ClientContext<P>>,
    issued_token: Option<String>,
}

impl<P> GateClient<P>
where
    P: IdentityProvider + Send + Sync + 'static,
{
    pub fn from_parts(parts: &Parts, state: &GateAppState<P>) -> GateResult<Self> {
        let (fingerprint, token) = client_key(parts, state)?;
        let resolved = state.registry.resolve(token.as_deref(), &fingerprint)?;

        Ok(Self {
            context: resolved.context,
            issued_token: resolved.issued_token,
        })
    }

    /// The caller's context if its cookie names a live one. Never creates.
    pub fn existing(parts: &Parts, state: &GateAppState<P>) -> GateResult<Option<Arc<ClientContext<P>>>> {
        let (fingerprint, token) = client_key(parts, state)?;
        Ok(token.and_then(|token| state.registry.lookup(&token, &fingerprint)))
    }
}

impl<P> GateClient<P> {
    /// Render `result`, attaching the client cookie when one was issued
    pub fn respond<T: IntoResponse>(&self, registry: &ClientRegistry<P>, result: GateResult<T>) -> Response {
        let response = match result {
            Ok(value) => value.into_response(),
            Err(e) => e.into_response(),
        };
        self.attach_cookie(registry, response)
    }

    pub fn attach_cookie(&self, registry: &ClientRegistry<P>, mut response: Response) -> Response {
        if let Some(token) = &self.issued_token {
            let cookie = set_cookie_header(&registry.config().client_cookie(), token);
            response.headers_mut().append(header::SET_COOKIE, cookie);
        }
        response
    }
}

impl<P> FromRequestParts<GateAppState<P>> for GateClient<P>
where
    P: IdentityProvider + Send + Sync + 'static,
{
    type Rejection = GateError;

    async fn from_request_parts(parts: &mut Parts, state: &GateAppState<P>) -> Result<Self, Self::Rejection> {
        Self::from_parts(parts, state)
    }
}

/// The calling browser's context, if it already has one
pub struct KnownClient<P>(pub Option<Arc<ClientContext<P>>>);

impl<P> FromRequestParts<GateAppState<P>> for KnownClient<P>
where
    P: IdentityProvider + Send + Sync + 'static,
{
    type Rejection = GateError;

    async fn from_request_parts(parts: &mut Parts, state: &GateAppState<P>) -> Result<Self, Self::Rejection> {
        GateClient::existing(parts, state).map(KnownClient)
    }
}

fn parse_sector(raw: &str) -> GateResult<Sector> {
    raw.parse().map_err(|_| GateError::UnknownSector(raw.to_string()))
}

// ============================================================================
// Session
// ============================================================================

/// GET /api/gate/session
pub async fn session_status<P>(KnownClient(client): KnownClient<P>) -> Json<SessionResponse>
where
    P: IdentityProvider + Send + Sync + 'static,
{
    Json(match client {
        Some(context) => SessionResponse::new(&context.session().snapshot(), context.effective_override()),
        None => SessionResponse::new(&Session::signed_out(), None),
    })
}

// ============================================================================
// Sign In
// ============================================================================

/// POST /api/gate/{sector}/signin
pub async fn sign_in<P>(
    State(state): State<GateAppState<P>>,
    Path(sector): Path<String>,
    client: GateClient<P>,
    Json(req): Json<SignInRequest>,
) -> Response
where
    P: IdentityProvider + Send + Sync + 'static,
{
    let result = sign_in_inner(&state, &client, &sector, req).await;
    client.respond(&state.registry, result)
}

async fn sign_in_inner<P>(
    state: &GateAppState<P>,
    client: &GateClient<P>,
    sector: &str,
    req: SignInRequest,
) -> GateResult<Json<SignInResponse>>
where
    P: IdentityProvider + Send + Sync + 'static,
{
    let sector = parse_sector(sector)?;
    let signed_in = client.context.gate(sector).submit(&req.email, &req.password).await?;

    // Let the session catch up so the redirect target sees the new identity
    let uid = signed_in.identity.uid.clone();
    let timeout = state.registry.config().session_ready_timeout;
    let role = match client
        .context
        .session()
        .wait_until(timeout, |session| session.identity().is_some_and(|i| i.uid == uid))
        .await
    {
        Ok(session) => session.role(),
        Err(e) => {
            tracing::warn!(error = %e, "Session did not reflect the sign-in in time");
            client.context.session().snapshot().role()
        }
    };

    Ok(Json(SignInResponse {
        redirect: signed_in.redirect,
        email: signed_in.identity.email,
        role,
    }))
}

/// GET /api/gate/{sector}/attempts
pub async fn attempts<P>(
    State(state): State<GateAppState<P>>,
    Path(sector): Path<String>,
    KnownClient(client): KnownClient<P>,
) -> GateResult<Json<AttemptStatus>>
where
    P: IdentityProvider + Send + Sync + 'static,
{
    let sector = parse_sector(&sector)?;
    Ok(Json(match client {
        Some(context) => context.gate(sector).status(),
        None => LoginAttempts::new().status(&state.registry.config().lockout),
    }))
}

// ============================================================================
// Sign Out
// ============================================================================

/// POST /api/gate/signout
///
/// A caller without a client context has nothing to sign out of.
pub async fn sign_out<P>(KnownClient(client): KnownClient<P>) -> GateResult<StatusCode>
where
    P: IdentityProvider + Send + Sync + 'static,
{
    if let Some(context) = client {
        context.session().sign_out().await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Admin Areas
// ============================================================================

/// Who was let into an admin area. Inserted by the role guard.
#[derive(Debug, Clone)]
pub struct GateAccess {
    pub role: Role,
    pub email: Option<String>,
    pub via_override: bool,
}

/// GET /admin, /admin/{sector}
pub async fn admin_area(uri: Uri, Extension(access): Extension<GateAccess>) -> Json<AdminAreaResponse> {
    Json(AdminAreaResponse {
        area: uri.path().to_string(),
        role: access.role,
        email: access.email,
        via_override: access.via_override,
    })
}

// ============================================================================
// Developer Sign-In
// ============================================================================

/// POST /api/gate/dev/login
#[cfg(feature = "dev-bypass")]
pub async fn dev_login<P>(
    State(state): State<GateAppState<P>>,
    client: GateClient<P>,
    Json(req): Json<crate::presentation::dto::DevLoginRequest>,
) -> Response
where
    P: IdentityProvider + Send + Sync + 'static,
{
    use crate::application::DevSignInUseCase;
    use crate::presentation::dto::DevLoginResponse;

    let result = client
        .context
        .override_store()
        .cloned()
        .ok_or_else(|| GateError::Config("no override slot configured".to_string()))
        .and_then(|store| DevSignInUseCase::new(store).execute(req.role, &req.email))
        .map(|(local_override, redirect)| {
            client.context.session().clear_override_revocation();
            Json(DevLoginResponse {
                redirect,
                local_override,
            })
        });
    client.respond(&state.registry, result)
}
