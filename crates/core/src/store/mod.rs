//! Durable store plumbing shared by the cache, quota, and lock tables.

pub mod connection;
pub mod migrations;

pub use connection::StoreDb;
