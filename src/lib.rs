//! Insights Report Server library.
//!
//! Turns dashboard widget definitions into search queries against the DevOps
//! analytics indices and shapes the results into widget reports, drilldown
//! tables and CI run streams.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod migration;
pub mod models;
pub mod services;
