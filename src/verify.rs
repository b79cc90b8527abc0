//! Read-only comparison of a live database against the plan.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::schema::{SchemaPlan, Step};
use crate::store::SchemaStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Drift {
    MissingCredential { name: String },
    MissingCollection { name: String },
    /// `users` has no validator, or one that differs from the plan.
    ValidatorMismatch { collection: String },
    /// A collection meant to accept any document carries a validator.
    UnexpectedValidator { collection: String },
    MissingIndex { collection: String, index: String },
    /// Same name, different keys, uniqueness or expiry.
    IndexMismatch { collection: String, index: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub database: String,
    pub checked_at: DateTime<Utc>,
    pub drift: Vec<Drift>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.drift.is_empty()
    }
}

pub async fn verify<S>(store: &S, plan: &SchemaPlan) -> Result<VerifyReport>
where
    S: SchemaStore + ?Sized,
{
    let mut drift = Vec::new();
    let collections = store.collection_names().await?;

    for step in &plan.steps {
        match step {
            Step::Credential(credential) => {
                if !store.user_exists(&credential.name).await? {
                    drift.push(Drift::MissingCredential {
                        name: credential.name.clone(),
                    });
                }
            }
            Step::Collection(spec) => {
                if !collections.iter().any(|n| n == spec.name) {
                    drift.push(Drift::MissingCollection {
                        name: spec.name.to_string(),
                    });
                    continue;
                }
                let live = store.collection_validator(spec.name).await?;
                match (&spec.validator, live) {
                    (Some(expected), Some(actual)) if *expected == actual => {}
                    (None, None) => {}
                    (Some(_), _) => drift.push(Drift::ValidatorMismatch {
                        collection: spec.name.to_string(),
                    }),
                    (None, Some(_)) => drift.push(Drift::UnexpectedValidator {
                        collection: spec.name.to_string(),
                    }),
                }
            }
            Step::Index(spec) => {
                let name = spec.name();
                let live = store.indexes(spec.collection).await?;
                match live.iter().find(|i| i.name == name) {
                    None => drift.push(Drift::MissingIndex {
                        collection: spec.collection.to_string(),
                        index: name,
                    }),
                    Some(index) if !index.matches(spec) => drift.push(Drift::IndexMismatch {
                        collection: spec.collection.to_string(),
                        index: name,
                    }),
                    Some(_) => {}
                }
            }
        }
    }

    for item in &drift {
        warn!(?item, "schema drift");
    }
    info!(
        database = %plan.database,
        drift = drift.len(),
        "verification finished"
    );

    Ok(VerifyReport {
        database: plan.database.clone(),
        checked_at: Utc::now(),
        drift,
    })
}
