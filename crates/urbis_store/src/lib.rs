mod base;
pub mod config;
pub mod datastore;
mod db;
mod geometry;
mod indicators;
pub mod migration;
mod projects;
mod resolver;
pub mod store;
mod territory;
mod writer;
mod zones;

pub use config::{
    DatabaseConfig, GeometryConfig, LimitsConfig, MAX_INSERT_BATCH, PoolConfig, UrbisConfig,
};
pub use store::{BackendCapabilities, UrbisStore};
pub use urbis_core::*;
