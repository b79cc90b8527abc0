pub mod config;
pub mod connect;
pub mod error;
pub mod models;
pub mod provision;
pub mod schema;
pub mod store;
pub mod verify;

pub use config::Config;
pub use error::{ProvisionError, Result};
pub use provision::{Outcome, ProvisionReport, Provisioner};
pub use schema::{CredentialSpec, SchemaPlan};
pub use store::{MongoStore, SchemaStore};
pub use verify::{verify, VerifyReport};

pub const COMPLETION_NOTICE: &str = "Database initialization completed successfully!";

/// Plan for the database and credential named in `cfg`.
pub fn plan_from_config(cfg: &Config) -> SchemaPlan {
    SchemaPlan::new(CredentialSpec::new(
        cfg.app_user.clone(),
        cfg.app_password.clone(),
        cfg.mongo_db.clone(),
    ))
}
