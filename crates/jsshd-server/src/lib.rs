//! jsshd-server: SSH daemon running audited shell sessions
//!
//! The daemon authenticates clients against a certificate authority, a
//! per-user authorized keys file, or a small password table. Each session
//! runs the user's login shell (or an explicit command) as a child
//! process. An event audit trail and a byte-exact transcript are recorded
//! for every session.

pub mod auth;
pub mod directory;
pub mod logs;
pub mod server;
pub mod session;
pub mod state;

pub use state::ServerState;
