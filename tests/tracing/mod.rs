//! Tests for log output
//!
//! These tests install a subscriber and check the events emitted by the closer and by
//! `with_logging` decorated releases when the tracing feature is enabled, and that
//! shutdown behaves the same without it.
