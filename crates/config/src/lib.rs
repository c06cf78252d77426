//! Configuration module for the HLS packager
//!
//! Handles loading configuration from TOML files and environment variable overrides.

pub mod config;
pub mod rendition;

pub use config::*;
pub use rendition::{default_renditions, Bitrate, RenditionSpec, Resolution};
