//! Sceneloom - Scene job orchestrator for ComfyUI-style generation services
//!
//! This library crate exposes the core functionality for the CLI and for
//! integration testing.

pub mod client;
pub mod config;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod retry;
pub mod runner;
pub mod scene;
