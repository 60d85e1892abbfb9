//! Route authorization
//!
//! Pure decision functions consulted before a protected view renders.

use serde::Serialize;

use crate::domain::entity::{LocalOverride, Session};
use crate::domain::value_object::Role;

/// Outcome for a request whose session is known
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Render,
    /// Not signed in as an administrator. `from` is the requested location.
    RedirectHome { from: String },
    /// Signed in, but this view belongs to another role.
    RedirectTo { path: &'static str, from: String },
}

/// Result of [`authorize`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    /// Session still loading. Wait for the next phase transition and ask again.
    Pending,
    Decided(Decision),
}

/// Fixed landing route per role
#[inline]
pub fn default_route_for(role: Role) -> &'static str {
    role.default_route()
}

/// Decide whether a view restricted to `required` may render.
///
/// A present override is trusted as-is and skips the loading wait.
/// `required` of `None` or empty means any administrator may enter.
pub fn authorize(
    required: Option<&[Role]>,
    session: &Session,
    local_override: Option<&LocalOverride>,
    requested: &str,
) -> Authorization {
    if let Some(record) = local_override {
        return Authorization::Decided(decide_for_role(record.role, required, requested));
    }

    if session.is_loading() {
        return Authorization::Pending;
    }

    if !session.is_authenticated() || !session.is_admin() {
        return Authorization::Decided(Decision::RedirectHome {
            from: requested.to_string(),
        });
    }

    Authorization::Decided(decide_for_role(session.role(), required, requested))
}

fn decide_for_role(role: Role, required: Option<&[Role]>, requested: &str) -> Decision {
    if role.satisfies(required.unwrap_or_default()) {
        Decision::Render
    } else {
        Decision::RedirectTo {
            path: default_route_for(role),
            from: requested.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::Identity;

    fn admin_session(role: Role) -> Session {
        Session::resolved(Some(Identity::with_email("uid-1", "someone@example.org")), role)
    }

    fn decided(auth: Authorization) -> Decision {
        match auth {
            Authorization::Decided(decision) => decision,
            Authorization::Pending => panic!("expected a decision, got Pending"),
        }
    }

    #[test]
    fn test_loading_session_is_pending() {
        let auth = authorize(Some(&[Role::CharityAmir]), &Session::loading(), None, "/admin/charity");
        assert_eq!(auth, Authorization::Pending);
    }

    #[test]
    fn test_override_skips_loading_wait() {
        let record = LocalOverride::new(Role::CharityAmir, "dev@example.org");
        let auth = authorize(
            Some(&[Role::CharityAmir]),
            &Session::loading(),
            Some(&record),
            "/admin/charity",
        );
        assert_eq!(auth, Authorization::Decided(Decision::Render));
    }

    #[test]
    fn test_override_super_admin_wins_over_session() {
        let session = admin_session(Role::CharityAmir);
        let record = LocalOverride::new(Role::SuperAdmin, "dev@example.org");
        let auth = authorize(Some(&[Role::AcademicAmir]), &session, Some(&record), "/admin/academic");
        assert_eq!(decided(auth), Decision::Render);
    }

    #[test]
    fn test_override_under_privileged_redirects_to_own_area() {
        let record = LocalOverride::new(Role::DawaAmir, "dev@example.org");
        let auth = authorize(
            Some(&[Role::QiratAmir]),
            &Session::signed_out(),
            Some(&record),
            "/admin/qirat",
        );
        assert_eq!(
            decided(auth),
            Decision::RedirectTo {
                path: "/admin/dawa",
                from: "/admin/qirat".to_string()
            }
        );
    }

    #[test]
    fn test_override_without_constraint_renders() {
        let record = LocalOverride::new(Role::User, "dev@example.org");
        assert_eq!(
            decided(authorize(None, &Session::signed_out(), Some(&record), "/admin")),
            Decision::Render
        );
        assert_eq!(
            decided(authorize(Some(&[]), &Session::signed_out(), Some(&record), "/admin")),
            Decision::Render
        );
    }

    #[test]
    fn test_unauthenticated_redirects_home() {
        let auth = authorize(Some(&[Role::DawaAmir]), &Session::signed_out(), None, "/admin/dawa");
        assert_eq!(
            decided(auth),
            Decision::RedirectHome {
                from: "/admin/dawa".to_string()
            }
        );
    }

    #[test]
    fn test_signed_in_non_admin_redirects_home() {
        let session = admin_session(Role::User);
        let auth = authorize(None, &session, None, "/admin");
        assert!(matches!(decided(auth), Decision::RedirectHome { .. }));
    }

    #[test]
    fn test_under_privileged_amir_redirects_to_own_area() {
        let session = admin_session(Role::CharityAmir);
        let auth = authorize(Some(&[Role::AcademicAmir]), &session, None, "/admin/academic");
        assert_eq!(
            decided(auth),
            Decision::RedirectTo {
                path: "/admin/charity",
                from: "/admin/academic".to_string()
            }
        );
    }

    #[test]
    fn test_super_admin_bypasses_sector_restriction() {
        let session = admin_session(Role::SuperAdmin);
        for sector_role in [Role::CharityAmir, Role::AcademicAmir, Role::QiratAmir, Role::DawaAmir] {
            let auth = authorize(Some(&[sector_role]), &session, None, "/admin/x");
            assert_eq!(decided(auth), Decision::Render);
        }
    }

    #[test]
    fn test_matching_amir_renders() {
        let session = admin_session(Role::QiratAmir);
        let auth = authorize(Some(&[Role::QiratAmir]), &session, None, "/admin/qirat");
        assert_eq!(decided(auth), Decision::Render);
    }

    #[test]
    fn test_admin_without_constraint_renders() {
        let session = admin_session(Role::DawaAmir);
        assert_eq!(decided(authorize(None, &session, None, "/admin/any")), Decision::Render);
    }

    #[test]
    fn test_authorize_is_idempotent() {
        let session = admin_session(Role::CharityAmir);
        let before = session.clone();
        let first = authorize(Some(&[Role::AcademicAmir]), &session, None, "/admin/academic");
        let second = authorize(Some(&[Role::AcademicAmir]), &session, None, "/admin/academic");
        assert_eq!(first, second);
        assert_eq!(session, before);
    }
}
