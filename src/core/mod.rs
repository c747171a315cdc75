//! Parcel container format
//!
//! - [`error`] - Error types for export and import
//! - [`format`] - Part naming, trailer codec, framing constants
//! - [`digest`] - Incremental SHA-1 content digests
//! - [`io`] - Part file writer and trailer/metadata readers
//! - [`manifest`] - File records and the metadata block
//! - [`exporter`] / [`writer`] - Write side and scoped write handles
//! - [`importer`] / [`reader`] - Read side and bounded read handles
//! - [`source`] - Injected producers of archive entries
//! - [`session`] - Whole-session export and restore drivers
//! - [`config`] - TOML configuration and the exporter builder
//! - [`validation`] - Safety checks for stored relative paths

pub mod config;
pub mod digest;
pub mod error;
pub mod exporter;
pub mod format;
pub mod importer;
pub mod io;
pub mod manifest;
pub mod reader;
pub mod session;
pub mod source;
pub mod validation;
pub mod writer;
