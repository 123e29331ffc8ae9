//! REST API client module for the OralVis backend.
//!
//! This module provides the `HttpClient` through which every request to the
//! backend flows, and the `HttpError` taxonomy every failure is reduced to.
//!
//! Authenticated calls carry the session credential as a bearer token.

pub mod client;
pub mod endpoints;
pub mod error;

pub use client::{HttpClient, ProgressFn, Redirect};
pub use endpoints::AuthError;
pub use error::{ErrorKind, HttpError};
