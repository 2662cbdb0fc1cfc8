//! ferry-sftp: SFTP adapter for ferry
//!
//! Implements the StorageBackend trait over an authenticated, stateful
//! SSH session (russh + russh-sftp). Sessions are pooled: checked out for
//! the duration of one operation and returned afterward, never shared by
//! two in-flight operations.

pub mod client;
pub mod pool;
mod session;

pub use client::SftpBackend;
pub use pool::{PoolableSession, PooledSession, SessionPool};
