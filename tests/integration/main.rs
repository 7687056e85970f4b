//! Integration tests for the insights report server.
//!
//! The engine runs against the shipped definitions with in-process fakes for
//! the search backend and the peer services.

mod api_tests;
mod common;
mod definitions_tests;
mod drilldown_tests;
mod report_tests;
mod stream_tests;
