use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};

pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;

/// Server error codes the provisioner gives a meaning to.
pub mod codes {
    pub const BAD_VALUE: i32 = 2;
    pub const FAILED_TO_PARSE: i32 = 9;
    pub const NAMESPACE_NOT_FOUND: i32 = 26;
    pub const NAMESPACE_EXISTS: i32 = 48;
    pub const CANNOT_CREATE_INDEX: i32 = 67;
    pub const INDEX_OPTIONS_CONFLICT: i32 = 85;
    pub const INDEX_KEY_SPECS_CONFLICT: i32 = 86;
    pub const INVALID_OPTIONS: i32 = 72;
    pub const DUPLICATE_KEY: i32 = 11000;
    pub const USER_ALREADY_EXISTS: i32 = 51003;
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("credential `{0}` already exists")]
    CredentialExists(String),

    #[error("collection `{0}` already exists")]
    CollectionExists(String),

    #[error("validator for `{collection}` rejected by the server: {message}")]
    InvalidValidator { collection: String, message: String },

    #[error("index `{index}` conflicts with existing data or definition: {message}")]
    IndexConflict { index: String, message: String },

    #[error(transparent)]
    Engine(#[from] MongoError),

    #[error("step `{step}` failed")]
    Step {
        step: String,
        #[source]
        source: Box<ProvisionError>,
    },
}

impl ProvisionError {
    pub fn at_step(self, step: impl Into<String>) -> Self {
        ProvisionError::Step {
            step: step.into(),
            source: Box::new(self),
        }
    }

    /// True for the "object is already there" family, which a create-if-absent
    /// step may treat as success.
    pub fn is_already_exists(&self) -> bool {
        match self {
            ProvisionError::CredentialExists(_) | ProvisionError::CollectionExists(_) => true,
            ProvisionError::Step { source, .. } => source.is_already_exists(),
            _ => false,
        }
    }

    /// Label of the step that failed, if the error was raised by one.
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            ProvisionError::Step { step, .. } => Some(step),
            _ => None,
        }
    }
}

/// Numeric server code carried by a command or write error.
pub fn server_code(err: &MongoError) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Command(command) => Some(command.code),
        ErrorKind::Write(WriteFailure::WriteError(write)) => Some(write.code),
        ErrorKind::Write(WriteFailure::WriteConcernError(concern)) => Some(concern.code),
        _ => None,
    }
}

pub fn classify_create_user(err: MongoError, name: &str) -> ProvisionError {
    match server_code(&err) {
        Some(codes::USER_ALREADY_EXISTS) => ProvisionError::CredentialExists(name.to_string()),
        _ => ProvisionError::Engine(err),
    }
}

pub fn classify_create_collection(err: MongoError, collection: &str) -> ProvisionError {
    match server_code(&err) {
        Some(codes::NAMESPACE_EXISTS) => ProvisionError::CollectionExists(collection.to_string()),
        Some(codes::BAD_VALUE | codes::FAILED_TO_PARSE | codes::INVALID_OPTIONS) => {
            ProvisionError::InvalidValidator {
                collection: collection.to_string(),
                message: err.to_string(),
            }
        }
        _ => ProvisionError::Engine(err),
    }
}

pub fn classify_create_index(err: MongoError, index: &str) -> ProvisionError {
    match server_code(&err) {
        Some(
            codes::CANNOT_CREATE_INDEX
            | codes::INDEX_OPTIONS_CONFLICT
            | codes::INDEX_KEY_SPECS_CONFLICT
            | codes::DUPLICATE_KEY,
        ) => ProvisionError::IndexConflict {
            index: index.to_string(),
            message: err.to_string(),
        },
        _ => ProvisionError::Engine(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use mongodb::error::{CommandError, WriteError};

    fn command_error(code: i32) -> MongoError {
        let command: CommandError = bson::from_document(doc! {
            "code": code,
            "codeName": "Test",
            "errmsg": format!("server said {code}"),
        })
        .unwrap();
        MongoError::from(ErrorKind::Command(command))
    }

    fn write_error(code: i32) -> MongoError {
        let write: WriteError = bson::from_document(doc! {
            "code": code,
            "codeName": "DuplicateKey",
            "errmsg": "E11000 duplicate key error collection: users index: email_1",
        })
        .unwrap();
        MongoError::from(ErrorKind::Write(WriteFailure::WriteError(write)))
    }

    #[test]
    fn server_code_reads_command_and_write_errors() {
        assert_eq!(server_code(&command_error(48)), Some(48));
        assert_eq!(server_code(&write_error(11000)), Some(11000));
    }

    #[test]
    fn create_user_codes() {
        assert!(matches!(
            classify_create_user(command_error(codes::USER_ALREADY_EXISTS), "app_user"),
            ProvisionError::CredentialExists(ref name) if name == "app_user"
        ));
        assert!(matches!(
            classify_create_user(command_error(13), "app_user"),
            ProvisionError::Engine(_)
        ));
    }

    #[test]
    fn create_collection_codes() {
        let exists = classify_create_collection(command_error(codes::NAMESPACE_EXISTS), "users");
        assert!(matches!(exists, ProvisionError::CollectionExists(ref c) if c == "users"));
        assert!(exists.is_already_exists());

        for code in [codes::BAD_VALUE, codes::FAILED_TO_PARSE, codes::INVALID_OPTIONS] {
            let err = classify_create_collection(command_error(code), "users");
            match err {
                ProvisionError::InvalidValidator { collection, message } => {
                    assert_eq!(collection, "users");
                    assert!(message.contains(&format!("server said {code}")), "{message}");
                }
                other => panic!("code {code} classified as {other:?}"),
            }
        }

        assert!(matches!(
            classify_create_collection(command_error(13), "users"),
            ProvisionError::Engine(_)
        ));
    }

    #[test]
    fn create_index_codes() {
        for code in [
            codes::CANNOT_CREATE_INDEX,
            codes::INDEX_OPTIONS_CONFLICT,
            codes::INDEX_KEY_SPECS_CONFLICT,
            codes::DUPLICATE_KEY,
        ] {
            let err = classify_create_index(command_error(code), "users.email_1");
            assert!(
                matches!(err, ProvisionError::IndexConflict { ref index, .. } if index == "users.email_1"),
                "code {code} classified as {err:?}"
            );
            assert!(!err.is_already_exists());
        }

        let dup = classify_create_index(write_error(codes::DUPLICATE_KEY), "users.email_1");
        match dup {
            ProvisionError::IndexConflict { message, .. } => assert!(message.contains("E11000")),
            other => panic!("write error classified as {other:?}"),
        }

        let unknown = classify_create_index(command_error(12345), "users.email_1");
        assert!(matches!(unknown, ProvisionError::Engine(ref e) if server_code(e) == Some(12345)));
        // a namespace clash on an index build is not an "already exists"
        assert!(matches!(
            classify_create_index(command_error(codes::NAMESPACE_EXISTS), "users.email_1"),
            ProvisionError::Engine(_)
        ));
    }

    #[test]
    fn step_wrapping_keeps_the_already_exists_family() {
        let err = ProvisionError::CollectionExists("users".into()).at_step("createCollection users");
        assert!(err.is_already_exists());
        assert_eq!(err.failed_step(), Some("createCollection users"));
        assert_eq!(err.to_string(), "step `createCollection users` failed");
        assert_eq!(
            std::error::Error::source(&err).map(|s| s.to_string()),
            Some("collection `users` already exists".to_string())
        );
    }

    #[test]
    fn step_cause_is_printed_once_in_the_chain() {
        let err = ProvisionError::IndexConflict {
            index: "users.email_1".into(),
            message: "E11000 duplicate key".into(),
        }
        .at_step("createIndex users.email_1");
        let printed = format!("{:#}", anyhow::Error::from(err));
        assert_eq!(printed.matches("E11000").count(), 1, "{printed}");
        assert!(printed.starts_with("step `createIndex users.email_1` failed: index"));
    }

    #[test]
    fn conflicts_are_not_treated_as_existing() {
        let err = ProvisionError::IndexConflict {
            index: "users.email_1".into(),
            message: "E11000 duplicate key".into(),
        };
        assert!(!err.is_already_exists());
        assert_eq!(err.failed_step(), None);
        assert!(err.to_string().contains("E11000"));
    }
}
