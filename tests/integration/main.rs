//! End-to-end tests for the discovery engine
//!
//! These tests use wiremock to stand in for company websites; the fetcher's
//! host-rewrite option points real-looking domains at the mock server.

mod discovery_tests;
