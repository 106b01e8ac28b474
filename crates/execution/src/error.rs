use displaydoc::Display;
use query_model::SchemaError;
use thiserror::Error;

use crate::GraphQLError;
use crate::ResultPath;

/// Error types for field transformations.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
pub enum TransformationError {
    /// hydration of field '{field_name}' is not supported: {reason}
    UnsupportedHydrationShape {
        /// The hydrated field.
        field_name: String,

        /// What is wrong with the hydration definition.
        reason: String,
    },

    /// {0}
    Schema(#[from] SchemaError),
}

/// Error types for zipper batches.
///
/// These signal a corrupted set of positions rather than bad input.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
pub enum ZipperError {
    /// invalid zipper batch: {reason}
    InvalidBatch {
        /// Why the batch was rejected.
        reason: String,
    },

    /// two different nodes were found at position {indexes:?}
    IncomparablePaths {
        /// The child indexes from the root.
        indexes: Vec<usize>,
    },
}

/// Error types for downstream fetches.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
pub enum FetchError {
    /// service '{service}' fetch failed: {reason}
    ServiceError {
        /// The service that failed.
        service: String,

        /// The reason the fetch failed.
        reason: String,
    },

    /// unknown service '{service}'
    UnknownService {
        /// The service that was unknown.
        service: String,
    },

    /// no service owns root field '{field_name}'
    NoOwningService {
        /// The root field.
        field_name: String,
    },
}

/// Error types for hydration batches.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
pub enum HydrationError {
    /// {0}
    Transformation(#[from] TransformationError),

    /// {0}
    Fetch(#[from] FetchError),

    /// maximum hydration depth of {max_depth} reached
    MaxDepthExceeded {
        /// The configured number of rounds.
        max_depth: usize,
    },
}

/// Error types for a whole execution.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
pub enum ExecutionError {
    /// {0}
    Schema(#[from] SchemaError),

    /// internal consistency failure: {0}
    Zipper(#[from] ZipperError),
}

impl GraphQLError {
    /// The error reported for a node that failed with `error`.
    pub fn from_error(error: &impl std::error::Error, path: &ResultPath) -> Self {
        GraphQLError::new(error.to_string(), Some(path.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        assert_eq!(
            ZipperError::IncomparablePaths {
                indexes: vec![0, 2]
            }
            .to_string(),
            "two different nodes were found at position [0, 2]"
        );
        assert_eq!(
            HydrationError::from(FetchError::UnknownService {
                service: "companies".into()
            })
            .to_string(),
            "unknown service 'companies'"
        );
        assert_eq!(
            TransformationError::from(SchemaError::UnknownType {
                name: "Nope".into()
            })
            .to_string(),
            "unknown type 'Nope'"
        );
    }

    #[test]
    fn graphql_error_from_error() {
        let path = ResultPath::parse("user/company");
        let error = GraphQLError::from_error(
            &HydrationError::MaxDepthExceeded { max_depth: 2 },
            &path,
        );
        assert_eq!(error.message(), "maximum hydration depth of 2 reached");
        assert_eq!(error.path(), Some(&path));
    }
}
