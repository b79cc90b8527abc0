//! Declarative description of everything the provisioner creates.
//!
//! Nothing in here touches the network; the [`SchemaPlan`] is a plain ordered
//! list of steps that the provisioner and the verifier both walk.

use std::time::Duration;

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use mongodb::IndexModel;
use serde::Serialize;

/// Collection names.
pub mod collections {
    pub const USERS: &str = "users";
    pub const SESSIONS: &str = "sessions";
    pub const LOGS: &str = "logs";
    pub const METRICS: &str = "metrics";
}

/// Field names referenced by the validator and the indexes.
pub mod fields {
    pub const EMAIL: &str = "email";
    pub const FULL_NAME: &str = "full_name";
    pub const HASHED_PASSWORD: &str = "hashed_password";
    pub const IS_ACTIVE: &str = "is_active";
    pub const IS_SUPERUSER: &str = "is_superuser";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";

    pub const USER_ID: &str = "user_id";
    pub const EXPIRES_AT: &str = "expires_at";

    pub const TIMESTAMP: &str = "timestamp";
    pub const LEVEL: &str = "level";
    pub const METRIC_NAME: &str = "metric_name";
}

pub const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";
pub const FULL_NAME_MAX_LEN: i32 = 100;

/// Sessions expire exactly at their stored `expires_at`.
pub const SESSION_EXPIRY: Duration = Duration::from_secs(0);

pub const READ_WRITE_ROLE: &str = "readWrite";

/// The application login, scoped to read/write on one database.
#[derive(Clone, Serialize)]
pub struct CredentialSpec {
    pub name: String,
    #[serde(skip_serializing)]
    pub secret: String,
    pub database: String,
}

impl CredentialSpec {
    pub fn new(
        name: impl Into<String>,
        secret: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            secret: secret.into(),
            database: database.into(),
        }
    }

    pub fn roles(&self) -> Document {
        doc! { "role": READ_WRITE_ROLE, "db": self.database.as_str() }
    }

    /// `createUser` command to run against the target database.
    pub fn create_user_command(&self) -> Document {
        doc! {
            "createUser": self.name.as_str(),
            "pwd": self.secret.as_str(),
            "roles": [self.roles()],
        }
    }
}

impl std::fmt::Debug for CredentialSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSpec")
            .field("name", &self.name)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionSpec {
    pub name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validator: Option<Document>,
}

impl CollectionSpec {
    pub fn plain(name: &'static str) -> Self {
        Self {
            name,
            validator: None,
        }
    }

    pub fn validated(name: &'static str, validator: Document) -> Self {
        Self {
            name,
            validator: Some(validator),
        }
    }
}

/// A single-field ascending index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexSpec {
    pub collection: &'static str,
    pub field: &'static str,
    pub unique: bool,
    #[serde(rename = "expire_after_secs", serialize_with = "serialize_secs")]
    pub expire_after: Option<Duration>,
}

fn serialize_secs<S: serde::Serializer>(
    value: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(d) => serializer.serialize_some(&d.as_secs()),
        None => serializer.serialize_none(),
    }
}

impl IndexSpec {
    pub fn ascending(collection: &'static str, field: &'static str) -> Self {
        Self {
            collection,
            field,
            unique: false,
            expire_after: None,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn expire_after(mut self, after: Duration) -> Self {
        self.expire_after = Some(after);
        self
    }

    /// The engine's default name for `{ field: 1 }`.
    pub fn name(&self) -> String {
        format!("{}_1", self.field)
    }

    pub fn keys(&self) -> Document {
        let mut keys = Document::new();
        keys.insert(self.field, 1);
        keys
    }

    pub fn to_model(&self) -> IndexModel {
        IndexModel::builder()
            .keys(self.keys())
            .options(
                IndexOptions::builder()
                    .name(Some(self.name()))
                    .unique(self.unique.then_some(true))
                    .expire_after(self.expire_after)
                    .build(),
            )
            .build()
    }
}

/// `$jsonSchema` validator for the `users` collection.
pub fn users_validator() -> Document {
    doc! {
        "$jsonSchema": {
            "bsonType": "object",
            "required": ["email", "full_name", "hashed_password"],
            "properties": {
                "email": {
                    "bsonType": "string",
                    "pattern": EMAIL_PATTERN,
                    "description": "Email must be a valid email address",
                },
                "full_name": {
                    "bsonType": "string",
                    "minLength": 1,
                    "maxLength": FULL_NAME_MAX_LEN,
                    "description": "Full name is required and must be between 1 and 100 characters",
                },
                "hashed_password": {
                    "bsonType": "string",
                    "description": "Hashed password is required",
                },
                "is_active": {
                    "bsonType": "bool",
                    "description": "is_active must be a boolean",
                },
                "is_superuser": {
                    "bsonType": "bool",
                    "description": "is_superuser must be a boolean",
                },
                "created_at": {
                    "bsonType": "date",
                    "description": "created_at must be a date",
                },
                "updated_at": {
                    "bsonType": "date",
                    "description": "updated_at must be a date",
                },
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    Credential(CredentialSpec),
    Collection(CollectionSpec),
    Index(IndexSpec),
}

impl Step {
    /// Short label used in logs and error messages.
    pub fn label(&self) -> String {
        match self {
            Step::Credential(c) => format!("createUser {}", c.name),
            Step::Collection(c) => format!("createCollection {}", c.name),
            Step::Index(i) => format!("createIndex {}.{}", i.collection, i.name()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaPlan {
    pub database: String,
    pub steps: Vec<Step>,
}

impl SchemaPlan {
    pub fn new(credential: CredentialSpec) -> Self {
        use self::collections::*;
        use self::fields::*;

        let database = credential.database.clone();
        let steps = vec![
            Step::Credential(credential),
            Step::Collection(CollectionSpec::validated(USERS, users_validator())),
            Step::Index(IndexSpec::ascending(USERS, EMAIL).unique()),
            Step::Index(IndexSpec::ascending(USERS, CREATED_AT)),
            Step::Index(IndexSpec::ascending(USERS, IS_ACTIVE)),
            Step::Collection(CollectionSpec::plain(SESSIONS)),
            Step::Collection(CollectionSpec::plain(LOGS)),
            Step::Collection(CollectionSpec::plain(METRICS)),
            Step::Index(IndexSpec::ascending(SESSIONS, USER_ID)),
            Step::Index(IndexSpec::ascending(SESSIONS, EXPIRES_AT).expire_after(SESSION_EXPIRY)),
            Step::Index(IndexSpec::ascending(LOGS, TIMESTAMP)),
            Step::Index(IndexSpec::ascending(LOGS, LEVEL)),
            Step::Index(IndexSpec::ascending(METRICS, TIMESTAMP)),
            Step::Index(IndexSpec::ascending(METRICS, METRIC_NAME)),
        ];

        Self { database, steps }
    }

    pub fn collections(&self) -> impl Iterator<Item = &CollectionSpec> {
        self.steps.iter().filter_map(|s| match s {
            Step::Collection(c) => Some(c),
            _ => None,
        })
    }

    pub fn indexes(&self) -> impl Iterator<Item = &IndexSpec> {
        self.steps.iter().filter_map(|s| match s {
            Step::Index(i) => Some(i),
            _ => None,
        })
    }

    pub fn credential(&self) -> Option<&CredentialSpec> {
        self.steps.iter().find_map(|s| match s {
            Step::Credential(c) => Some(c),
            _ => None,
        })
    }
}
