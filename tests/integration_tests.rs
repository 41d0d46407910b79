//! Integration test suite entry point
//!
//! All test modules are organized under `tests/integration/`.
//!
//! # Running Integration Tests
//!
//! ```bash
//! # Run all integration tests
//! cargo test --test integration_tests
//!
//! # Run specific test module
//! cargo test --test integration_tests closed_state
//!
//! # Show engine logs
//! RUST_LOG=tunnel_tcp=trace cargo test --test integration_tests -- --nocapture
//! ```

mod integration;
