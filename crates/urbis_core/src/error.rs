use thiserror::Error;

pub const INVALID_VALUE: &str = "P0100";
pub const GEOMETRY_WRONG_KIND: &str = "P0101";
pub const GEOMETRY_EMPTY: &str = "P0102";
pub const GEOMETRY_INVALID: &str = "P0103";
pub const BUFFER_GEOMETRY_MISSING: &str = "P0111";
pub const BUFFER_RADIUS_MISSING: &str = "P0112";
pub const BUFFER_DEFAULT_AMBIGUOUS: &str = "P0113";

#[derive(Debug, Error)]
pub enum UrbisError {
    #[error("{entity} with id {id} not found")]
    NotFoundById { entity: &'static str, id: i64 },
    #[error("{entity} not found for {params}")]
    NotFoundByParams {
        entity: &'static str,
        params: String,
    },
    #[error("already exists: {message}")]
    AlreadyExists { message: String },
    #[error("{entity} with id {id} was already edited in this scenario")]
    AlreadyEdited { entity: &'static str, id: i64 },
    #[error("dependency not found: {message}")]
    DependencyNotFound { message: String },
    #[error("invalid value [{code}]: {message}")]
    InvalidValue { code: &'static str, message: String },
    #[error("storage trigger [{code}]: {message}")]
    CustomTrigger { code: &'static str, message: String },
    #[error("operation is not allowed in a regional scenario")]
    NotAllowedInRegionalScenario,
    #[error("operation is not allowed in a project scenario")]
    NotAllowedInProjectScenario,
    #[error("operation is not allowed in a regional project")]
    NotAllowedInRegionalProject,
    #[error("forbidden: {message}")]
    Forbidden { message: String },
    #[error("scenario {scenario_id} is the based scenario of its project")]
    InvalidBaseScenario { scenario_id: i64 },
    #[error("internal error: {message}")]
    Internal { message: String },
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl UrbisError {
    pub fn not_found_by_id(entity: &'static str, id: i64) -> Self {
        Self::NotFoundById { entity, id }
    }

    pub fn not_found_by_params(entity: &'static str, params: impl Into<String>) -> Self {
        Self::NotFoundByParams {
            entity,
            params: params.into(),
        }
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::AlreadyExists {
            message: message.into(),
        }
    }

    pub fn already_edited(entity: &'static str, id: i64) -> Self {
        Self::AlreadyEdited { entity, id }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidValue {
            code: INVALID_VALUE,
            message: message.into(),
        }
    }

    pub fn invalid_with_code(code: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            code,
            message: message.into(),
        }
    }

    pub fn trigger(code: &'static str, message: impl Into<String>) -> Self {
        Self::CustomTrigger {
            code,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Errors a caller can report back to the requester; everything else is an internal fault.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Internal { .. } | Self::Storage { .. })
    }

    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::InvalidValue { code, .. } | Self::CustomTrigger { code, .. } => Some(code),
            _ => None,
        }
    }
}

pub type UrbisResult<T> = Result<T, UrbisError>;

impl From<sea_orm::DbErr> for UrbisError {
    fn from(value: sea_orm::DbErr) -> Self {
        match value.sql_err() {
            Some(sea_orm::SqlErr::UniqueConstraintViolation(message)) => {
                UrbisError::already_exists(message)
            }
            Some(sea_orm::SqlErr::ForeignKeyConstraintViolation(message)) => {
                UrbisError::DependencyNotFound { message }
            }
            _ => UrbisError::storage(value.to_string()),
        }
    }
}

impl From<serde_json::Error> for UrbisError {
    fn from(value: serde_json::Error) -> Self {
        UrbisError::storage(format!("json: {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::{GEOMETRY_EMPTY, UrbisError};

    #[test]
    fn helper_constructors_set_variants() {
        let err = UrbisError::not_found_by_id("territory", 7);
        assert!(matches!(err, UrbisError::NotFoundById { id: 7, .. }));
        let err = UrbisError::already_edited("physical object", 3);
        assert!(matches!(err, UrbisError::AlreadyEdited { .. }));
        let err = UrbisError::invalid_with_code(GEOMETRY_EMPTY, "empty");
        assert_eq!(err.code(), Some("P0102"));
        let err = UrbisError::storage("disk");
        assert!(matches!(err, UrbisError::Storage { .. }));
    }

    #[test]
    fn internal_faults_are_not_recoverable() {
        assert!(UrbisError::already_exists("dup").is_recoverable());
        assert!(UrbisError::NotAllowedInRegionalScenario.is_recoverable());
        assert!(!UrbisError::internal("corrupt parent chain").is_recoverable());
        assert!(!UrbisError::storage("io").is_recoverable());
    }

    #[test]
    fn renders_entity_and_id() {
        let err = UrbisError::not_found_by_id("scenario", 42);
        assert_eq!(err.to_string(), "scenario with id 42 not found");
    }
}
