//! Authentication session state.
//!
//! `Session` holds the bearer token and current user returned by the
//! backend's login endpoint. It is persisted to disk and expires after
//! 24 hours. The data layer reads the token and role from it; logging in
//! and out goes through `RemoteClient::login` / `RemoteClient::logout`.

pub mod session;

pub use session::{Session, SessionData};
