//! Navigation gating by role.
//!
//! Everything here is a pure function of an [`AuthState`] snapshot and a
//! path. Redirects are returned as values; acting on them is the caller's job.

use serde::Serialize;

use super::claims::Role;
use super::session::AuthState;

pub const LOGIN_PATH: &str = "/login";
pub const SIGNUP_PATH: &str = "/signup";
pub const ROOT_PATH: &str = "/";

/// Paths that belong to a single role.
const ROLE_ROUTES: [(&str, Role); 2] = [
    ("/technician", Role::Technician),
    ("/dentist", Role::Dentist),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(tag = "decision", content = "to", rename_all = "camelCase")]
pub enum Decision {
    /// Session still loading; show a placeholder and ask again later.
    Pending,
    Allow,
    RedirectTo(String),
}

/// Strip query, fragment and trailing slashes so `/dentist/?x=1` matches `/dentist`.
fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        ROOT_PATH
    } else {
        trimmed
    }
}

/// The role a path is reserved for, if any.
pub fn required_role(path: &str) -> Option<Role> {
    let path = normalize(path);
    ROLE_ROUTES.iter().find_map(|(prefix, role)| {
        let matches = path == *prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'));
        matches.then_some(*role)
    })
}

fn is_auth_page(path: &str) -> bool {
    path == LOGIN_PATH || path == SIGNUP_PATH
}

/// Decide whether `state` may visit `path` when it requires `required_role`.
pub fn evaluate(state: &AuthState, path: &str, required_role: Option<Role>) -> Decision {
    let path = normalize(path);

    match state {
        AuthState::Loading => Decision::Pending,
        AuthState::Unauthenticated => {
            if required_role.is_some() || path == ROOT_PATH {
                Decision::RedirectTo(LOGIN_PATH.to_string())
            } else {
                Decision::Allow
            }
        }
        AuthState::Authenticated { role, .. } => {
            let home = Decision::RedirectTo(role.home_path().to_string());
            match required_role {
                Some(required) if required != *role => home,
                _ if is_auth_page(path) || path == ROOT_PATH => home,
                _ => Decision::Allow,
            }
        }
    }
}

/// [`evaluate`] with the required role looked up from the route table.
pub fn evaluate_path(state: &AuthState, path: &str) -> Decision {
    evaluate(state, path, required_role(path))
}
