//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Math types and operations
//! - Identifier generation
//! - Collections and arena keys
//! - Time management
//! - Logging utilities

pub mod math;
pub mod id;
pub mod collections;
pub mod time;
pub mod logging;
