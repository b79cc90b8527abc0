//! The narrow slice of the database the provisioner talks to.

use std::time::Duration;

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::{Database, IndexModel};
use tracing::debug;

use crate::error::{
    classify_create_collection, classify_create_index, classify_create_user, codes, server_code,
    Result,
};
use crate::schema::{CollectionSpec, CredentialSpec, IndexSpec};

/// An index as reported back by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    pub name: String,
    pub keys: Document,
    pub unique: bool,
    pub expire_after: Option<Duration>,
}

impl IndexInfo {
    pub fn from_spec(spec: &IndexSpec) -> Self {
        Self {
            name: spec.name(),
            keys: spec.keys(),
            unique: spec.unique,
            expire_after: spec.expire_after,
        }
    }

    pub fn from_model(model: IndexModel) -> Self {
        let options = model.options.unwrap_or_default();
        Self {
            name: options.name.unwrap_or_default(),
            keys: model.keys,
            unique: options.unique.unwrap_or(false),
            expire_after: options.expire_after,
        }
    }

    /// Same keys and the same uniqueness/expiry as `spec`.
    pub fn matches(&self, spec: &IndexSpec) -> bool {
        same_keys(&self.keys, &spec.keys())
            && self.unique == spec.unique
            && self.expire_after == spec.expire_after
    }
}

// The server may echo key directions back as int32, int64 or double.
fn same_keys(a: &Document, b: &Document) -> bool {
    fn direction(value: &Bson) -> Option<f64> {
        match value {
            Bson::Int32(v) => Some(f64::from(*v)),
            Bson::Int64(v) => Some(*v as f64),
            Bson::Double(v) => Some(*v),
            _ => None,
        }
    }

    a.len() == b.len()
        && a.iter().zip(b.iter()).all(|((ka, va), (kb, vb))| {
            ka == kb
                && match (direction(va), direction(vb)) {
                    (Some(x), Some(y)) => x == y,
                    _ => va == vb,
                }
        })
}

#[async_trait]
pub trait SchemaStore: Send + Sync {
    async fn user_exists(&self, name: &str) -> Result<bool>;

    async fn create_user(&self, credential: &CredentialSpec) -> Result<()>;

    async fn collection_names(&self) -> Result<Vec<String>>;

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<()>;

    /// `None` both when the collection has no validator and when it is missing.
    async fn collection_validator(&self, name: &str) -> Result<Option<Document>>;

    /// Empty when the collection does not exist.
    async fn indexes(&self, collection: &str) -> Result<Vec<IndexInfo>>;

    async fn create_index(&self, spec: &IndexSpec) -> Result<()>;
}

/// [`SchemaStore`] backed by a live database handle.
#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SchemaStore for MongoStore {
    async fn user_exists(&self, name: &str) -> Result<bool> {
        let reply = self.db.run_command(doc! { "usersInfo": name }).await?;
        Ok(reply
            .get_array("users")
            .map(|users| !users.is_empty())
            .unwrap_or(false))
    }

    async fn create_user(&self, credential: &CredentialSpec) -> Result<()> {
        self.db
            .run_command(credential.create_user_command())
            .await
            .map_err(|e| classify_create_user(e, &credential.name))?;
        Ok(())
    }

    async fn collection_names(&self) -> Result<Vec<String>> {
        Ok(self.db.list_collection_names().await?)
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<()> {
        let mut action = self.db.create_collection(spec.name);
        if let Some(validator) = &spec.validator {
            action = action.validator(validator.clone());
        }
        action
            .await
            .map_err(|e| classify_create_collection(e, spec.name))
    }

    async fn collection_validator(&self, name: &str) -> Result<Option<Document>> {
        let mut cursor = self
            .db
            .list_collections()
            .filter(doc! { "name": name })
            .await?;
        match cursor.try_next().await? {
            Some(collection) => Ok(collection.options.validator),
            None => Ok(None),
        }
    }

    async fn indexes(&self, collection: &str) -> Result<Vec<IndexInfo>> {
        let cursor = match self
            .db
            .collection::<Document>(collection)
            .list_indexes()
            .await
        {
            Ok(cursor) => cursor,
            Err(e) if server_code(&e) == Some(codes::NAMESPACE_NOT_FOUND) => {
                debug!(collection, "listIndexes on missing collection");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        let models: Vec<IndexModel> = cursor.try_collect().await?;
        Ok(models.into_iter().map(IndexInfo::from_model).collect())
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        let label = format!("{}.{}", spec.collection, spec.name());
        self.db
            .collection::<Document>(spec.collection)
            .create_index(spec.to_model())
            .await
            .map_err(|e| classify_create_index(e, &label))?;
        Ok(())
    }
}
