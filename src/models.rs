//! Document shapes the application stores in the provisioned collections.

use bson::oid::ObjectId;
use bson::{DateTime, Document};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    pub full_name: String,
    pub hashed_password: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl UserDoc {
    pub fn new(
        email: impl Into<String>,
        full_name: impl Into<String>,
        hashed_password: impl Into<String>,
    ) -> Self {
        let now = DateTime::now();
        Self {
            id: None,
            email: email.into(),
            full_name: full_name.into(),
            hashed_password: hashed_password.into(),
            is_active: true,
            is_superuser: false,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub expires_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogDoc {
    pub timestamp: DateTime,
    pub level: String,
    pub message: String,
    #[serde(default)]
    pub context: Option<Document>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDoc {
    pub timestamp: DateTime,
    pub metric_name: String,
    pub value: f64,
    #[serde(default)]
    pub labels: Option<Document>,
}
