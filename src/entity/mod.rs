//! SeaORM entity definitions for PostgreSQL database.

pub mod dashboard_layout;
