//! jsshd-core: Core abstractions and configuration for jsshd
//!
//! This crate provides the shared domain types, capability traits and
//! configuration structures used by the server daemon: who a principal
//! is once authenticated, what an audit event looks like, and the
//! interfaces through which sessions reach the operating system and the
//! log store.

pub mod config;
pub mod error;
pub mod time;
pub mod traits;
pub mod types;

pub use types::{AuditEvent, AuditEventKind, Identity, PtyRequest, SessionId, WindowSize};
