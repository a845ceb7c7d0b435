// schemafix-core: migration engine for legacy vector-store collection schemas.

pub mod config;
pub mod naming;
pub mod schema;
pub mod vector;
pub mod metadata;
pub mod journal;
pub mod error;
pub mod inventory;
pub mod executor;
pub mod report;
pub mod cleanup;
pub mod check;

#[cfg(test)]
mod testutil;

pub use error::EngineError;
