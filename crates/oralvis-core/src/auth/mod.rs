//! Authentication module for the client session.
//!
//! This module provides:
//! - `TokenStore`: durable slot for the single bearer credential
//! - `claims`: payload decoding and expiry checks
//! - `SessionManager`: owner of the process-wide `AuthState`
//! - `guard`: pure navigation decisions by role

pub mod claims;
pub mod guard;
pub mod session;
pub mod store;

pub use claims::{Claims, DecodeError, Role};
pub use guard::Decision;
pub use session::{AuthState, LoginError, SessionManager};
pub use store::{FileTokenStore, KeyringTokenStore, MemoryTokenStore, StoreError, TokenStore};
