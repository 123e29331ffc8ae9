//! Session and authentication core for the OralVis scan intake client.
//!
//! Start-up is: load a [`Config`], build a [`SessionManager`] over a
//! [`TokenStore`](auth::TokenStore), call [`SessionManager::initialize`],
//! then route every request through an [`HttpClient`] and every navigation
//! through [`auth::guard::evaluate_path`].

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ErrorKind, HttpClient, HttpError};
pub use auth::{AuthState, Role, SessionManager};
pub use config::Config;
