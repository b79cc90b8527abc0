use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ProvisionError, Result};
use crate::schema::{CollectionSpec, CredentialSpec, IndexSpec, SchemaPlan, Step};
use crate::store::SchemaStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Created,
    Existing,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub database: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepOutcome>,
}

impl ProvisionReport {
    pub fn created(&self) -> usize {
        self.count(Outcome::Created)
    }

    pub fn existing(&self) -> usize {
        self.count(Outcome::Existing)
    }

    fn count(&self, outcome: Outcome) -> usize {
        self.steps.iter().filter(|s| s.outcome == outcome).count()
    }
}

/// Walks a [`SchemaPlan`] against a store, creating whatever is absent.
///
/// Steps run strictly in plan order and the first failure stops the run.
/// Nothing is retried.
pub struct Provisioner<S> {
    store: S,
    plan: SchemaPlan,
}

impl<S: SchemaStore> Provisioner<S> {
    pub fn new(store: S, plan: SchemaPlan) -> Self {
        Self { store, plan }
    }

    pub fn plan(&self) -> &SchemaPlan {
        &self.plan
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn run(&self) -> Result<ProvisionReport> {
        let started_at = Utc::now();
        let mut steps = Vec::with_capacity(self.plan.steps.len());

        info!(
            database = %self.plan.database,
            steps = self.plan.steps.len(),
            "provisioning schema"
        );

        for step in &self.plan.steps {
            let label = step.label();
            let outcome = self
                .apply(step)
                .await
                .map_err(|e| e.at_step(label.clone()))?;
            info!(step = %label, ?outcome, "schema step applied");
            steps.push(StepOutcome {
                step: label,
                outcome,
            });
        }

        let report = ProvisionReport {
            database: self.plan.database.clone(),
            started_at,
            finished_at: Utc::now(),
            steps,
        };
        info!(
            created = report.created(),
            existing = report.existing(),
            "provisioning finished"
        );
        Ok(report)
    }

    async fn apply(&self, step: &Step) -> Result<Outcome> {
        match step {
            Step::Credential(credential) => self.ensure_credential(credential).await,
            Step::Collection(collection) => self.ensure_collection(collection).await,
            Step::Index(index) => self.ensure_index(index).await,
        }
    }

    async fn ensure_credential(&self, credential: &CredentialSpec) -> Result<Outcome> {
        if self.store.user_exists(&credential.name).await? {
            debug!(user = %credential.name, "credential already present, leaving it unchanged");
            return Ok(Outcome::Existing);
        }
        created_or_raced(self.store.create_user(credential).await)
    }

    async fn ensure_collection(&self, collection: &CollectionSpec) -> Result<Outcome> {
        let names = self.store.collection_names().await?;
        if names.iter().any(|n| n == collection.name) {
            return Ok(Outcome::Existing);
        }
        created_or_raced(self.store.create_collection(collection).await)
    }

    async fn ensure_index(&self, index: &IndexSpec) -> Result<Outcome> {
        let name = index.name();
        let present = self.store.indexes(index.collection).await?;
        if let Some(existing) = present.iter().find(|i| i.name == name) {
            if existing.matches(index) {
                return Ok(Outcome::Existing);
            }
            return Err(ProvisionError::IndexConflict {
                index: format!("{}.{}", index.collection, name),
                message: format!("existing definition differs: {existing:?}"),
            });
        }
        self.store.create_index(index).await?;
        Ok(Outcome::Created)
    }
}

// Another provisioner may create the object between the existence check and
// the create call.
fn created_or_raced(result: Result<()>) -> Result<Outcome> {
    match result {
        Ok(()) => Ok(Outcome::Created),
        Err(e) if e.is_already_exists() => {
            warn!(error = %e, "object appeared concurrently, treating as present");
            Ok(Outcome::Existing)
        }
        Err(e) => Err(e),
    }
}
