//! `MigrationSettings` loader (SPEC_FULL.md §7): TOML files and
//! `MIGRATE_`-prefixed environment variables layered over built-in
//! defaults.

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;
