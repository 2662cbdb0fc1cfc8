//! ferry-dropbox: Dropbox API adapter for ferry
//!
//! This crate implements the StorageBackend trait over the Dropbox v2
//! HTTP API. It is the only crate that speaks the Dropbox wire protocol;
//! everything else goes through the ferry-core contract.

pub mod client;
pub mod hash;
mod protocol;

pub use client::DropboxBackend;
pub use hash::ContentHasher;
