use super::session::{SessionSnapshot, LANDING_ROUTE};

pub const AUTH_ROUTE: &str = "/auth";
pub const DASHBOARD_ROUTE: &str = "/admin-dashboard";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewAccess {
    /// Anyone.
    Open,
    /// Logged-in users only.
    Protected,
    /// Only while logged out, e.g. the login form.
    PublicOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Render,
    /// Session restore still running; show a spinner.
    Wait,
    Redirect(&'static str),
}

pub fn guard(access: ViewAccess, session: &SessionSnapshot) -> RouteDecision {
    if session.loading && access != ViewAccess::Open {
        return RouteDecision::Wait;
    }
    match access {
        ViewAccess::Open => RouteDecision::Render,
        ViewAccess::Protected if !session.is_authenticated() => RouteDecision::Redirect(AUTH_ROUTE),
        ViewAccess::PublicOnly if session.is_authenticated() => {
            RouteDecision::Redirect(DASHBOARD_ROUTE)
        }
        _ => RouteDecision::Render,
    }
}

/// The app's view table. Unknown paths go back to the landing page.
pub fn access_for(path: &str) -> Option<ViewAccess> {
    match path {
        LANDING_ROUTE => Some(ViewAccess::Open),
        AUTH_ROUTE => Some(ViewAccess::PublicOnly),
        "/dashboard" | DASHBOARD_ROUTE | "/user-dashboard" => Some(ViewAccess::Protected),
        _ => None,
    }
}

pub fn resolve(path: &str, session: &SessionSnapshot) -> RouteDecision {
    match access_for(path) {
        Some(access) => guard(access, session),
        None => RouteDecision::Redirect(LANDING_ROUTE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::PublicUser;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn signed_in() -> SessionSnapshot {
        SessionSnapshot {
            user: Some(PublicUser {
                id: Uuid::new_v4(),
                username: "alice".into(),
                email: "alice@x.com".into(),
                fullname: "Alice".into(),
                created_at: OffsetDateTime::UNIX_EPOCH,
                updated_at: OffsetDateTime::UNIX_EPOCH,
            }),
            access_token: Some("tok".into()),
            loading: false,
        }
    }

    #[test]
    fn protected_views_send_anonymous_users_to_login() {
        let anon = SessionSnapshot::default();
        assert_eq!(
            guard(ViewAccess::Protected, &anon),
            RouteDecision::Redirect(AUTH_ROUTE)
        );
        assert_eq!(guard(ViewAccess::Protected, &signed_in()), RouteDecision::Render);
    }

    #[test]
    fn login_form_sends_signed_in_users_to_dashboard() {
        assert_eq!(
            guard(ViewAccess::PublicOnly, &signed_in()),
            RouteDecision::Redirect(DASHBOARD_ROUTE)
        );
        assert_eq!(
            guard(ViewAccess::PublicOnly, &SessionSnapshot::default()),
            RouteDecision::Render
        );
    }

    #[test]
    fn guarded_views_wait_for_boot() {
        let booting = SessionSnapshot {
            loading: true,
            ..Default::default()
        };
        assert_eq!(guard(ViewAccess::Protected, &booting), RouteDecision::Wait);
        assert_eq!(guard(ViewAccess::Open, &booting), RouteDecision::Render);
    }

    #[test]
    fn view_table() {
        let anon = SessionSnapshot::default();
        assert_eq!(resolve("/", &anon), RouteDecision::Render);
        assert_eq!(resolve("/user-dashboard", &anon), RouteDecision::Redirect(AUTH_ROUTE));
        assert_eq!(resolve("/nowhere", &signed_in()), RouteDecision::Redirect(LANDING_ROUTE));
    }
}
