/// Quarry-specific error type with actionable variants.
#[derive(Debug)]
pub enum QuarryError {
    /// Underlying sqlx error.
    Sqlx(sqlx::Error),
    /// `fetch_one` matched no row.
    NoResult,
    /// `fetch_one` / `fetch_optional` matched more than one row.
    NonUniqueResult,
    /// A column value could not be decoded into the requested Rust type.
    Decode {
        expected: &'static str,
        found: &'static str,
    },
    /// A projection targeted a property the DTO does not declare.
    UnknownProperty {
        target: &'static str,
        property: String,
    },
    /// Positional mapping received the wrong number of values.
    ArityMismatch {
        target: &'static str,
        expected: usize,
        found: usize,
    },
    /// A reference was taken to an entity that has no identity yet.
    TransientEntity { entity: &'static str },
    /// `persist` was called with an entity that has an identity but is not managed.
    DetachedEntity { entity: &'static str, id: i64 },
    /// A lazy reference pointed at a row that does not exist.
    EntityNotFound { entity: &'static str, id: i64 },
    /// The query was assembled incorrectly (e.g. `on` without a join).
    InvalidQuery(String),
    /// The session transaction was already committed or rolled back.
    SessionClosed,
}

impl std::fmt::Display for QuarryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlx(err) => write!(f, "sqlx error: {}", err),
            Self::NoResult => write!(f, "query returned no result"),
            Self::NonUniqueResult => write!(f, "query returned more than one result"),
            Self::Decode { expected, found } => {
                write!(f, "cannot decode {} value as {}", found, expected)
            }
            Self::UnknownProperty { target, property } => {
                write!(f, "{} has no property named `{}`", target, property)
            }
            Self::ArityMismatch {
                target,
                expected,
                found,
            } => write!(
                f,
                "{} expects {} values but the row has {}",
                target, expected, found
            ),
            Self::TransientEntity { entity } => {
                write!(f, "{} must be persisted before it can be referenced", entity)
            }
            Self::DetachedEntity { entity, id } => {
                write!(f, "{} with id {} is not managed by this session", entity, id)
            }
            Self::EntityNotFound { entity, id } => write!(f, "{} with id {} not found", entity, id),
            Self::InvalidQuery(message) => write!(f, "invalid query: {}", message),
            Self::SessionClosed => write!(f, "session is closed"),
        }
    }
}

impl std::error::Error for QuarryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sqlx(err) => Some(err),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for QuarryError {
    fn from(err: sqlx::Error) -> Self {
        Self::Sqlx(err)
    }
}

/// Result alias for Quarry operations.
pub type QuarryResult<T> = Result<T, QuarryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_offending_property() {
        let err = QuarryError::UnknownProperty {
            target: "UserDto",
            property: "username".to_owned(),
        };
        assert_eq!(err.to_string(), "UserDto has no property named `username`");
    }

    #[test]
    fn sqlx_errors_keep_their_source() {
        let err = QuarryError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, QuarryError::Sqlx(sqlx::Error::RowNotFound)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
