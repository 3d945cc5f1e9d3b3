//! Multi-modal chat backend - Library exports for testing
//!
//! (c) Softlandia 2025

pub mod api;
pub mod core;
pub mod gateway;
pub mod infrastructure;
