//! Gate Router

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::domain::provider::IdentityProvider;
use crate::domain::value_object::{ADMIN_ROOT, Role, Sector};
use crate::presentation::handlers::{self, GateAppState};
use crate::presentation::middleware::{RoleGuard, require_roles};

/// Session and sign-in API, meant to be nested under `/api/gate`
pub fn gate_router<P>(state: GateAppState<P>) -> Router
where
    P: IdentityProvider + Send + Sync + 'static,
{
    let router = Router::new()
        .route("/session", get(handlers::session_status::<P>))
        .route("/signout", post(handlers::sign_out::<P>))
        .route("/{sector}/signin", post(handlers::sign_in::<P>))
        .route("/{sector}/attempts", get(handlers::attempts::<P>));

    #[cfg(feature = "dev-bypass")]
    let router = router.route("/dev/login", post(handlers::dev_login::<P>));

    router.with_state(state)
}

/// Guarded admin areas: `/admin` for the super admin and one area per
/// sector for its amir (the super admin may enter all of them).
pub fn admin_router<P>(state: GateAppState<P>) -> Router
where
    P: IdentityProvider + Send + Sync + 'static,
{
    let guarded = |required: &[Role]| {
        get(handlers::admin_area).route_layer(middleware::from_fn_with_state(
            RoleGuard::new(state.clone(), Some(required)),
            require_roles::<P>,
        ))
    };

    let mut router = Router::new().route(ADMIN_ROOT, guarded(&[Role::SuperAdmin]));
    for sector in Sector::ALL {
        router = router.route(sector.route(), guarded(&[sector.amir_role()]));
    }

    router
}
