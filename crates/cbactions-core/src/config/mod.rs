//! Unified configuration layer.
//!
//! Every environment variable the bridge reads is read here; the rest of the
//! workspace receives structured config values through constructors.
//!
//! - `loader`: `env_or`, `env_optional`, `env_bool`, `env_u64`, `take_secret`
//! - `schema`: `CrossingSecrets`, `InsideConfig`, `OutsideConfig`, `LaunchConfig`, ...
//! - `env_keys`: key constants

pub mod env_keys;
pub mod loader;
pub mod schema;

pub use loader::{env_bool, env_optional, env_or, env_u64, remove_env_var, take_secret, SecretString};
pub use schema::{
    default_bundle_paths, AwsConfig, CrossingSecrets, CustodianConfig, InsideConfig, LaunchConfig,
    ObservabilityConfig, OutsideConfig, PollPolicy,
};
