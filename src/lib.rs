//! WordRush content pipeline: procedural round synthesis and relational export.
//!
//! Generates vocabulary and trivia rounds from RON content-family
//! descriptors, keeps the JSON content tree consistent through validation
//! and repair passes, and flattens it into delimited tables for a SQL
//! store's bulk loader.

pub mod core;
pub mod schema;
