//! Object model for operations, sub-queries and the merged schema.

use displaydoc::Display;
use thiserror::Error;

/// The operation and selection model.
pub mod model;

/// The merged schema registry.
pub mod schema;

pub use model::*;
pub use schema::*;

/// Error types for schema lookups.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
pub enum SchemaError {
    /// the schema has no root type for {kind} operations
    MissingRootType {
        /// The operation kind.
        kind: OperationKind,
    },

    /// unknown type '{name}'
    UnknownType {
        /// The type that was not found.
        name: String,
    },

    /// type '{type_name}' has no field '{field_name}'
    UnknownField {
        /// The type that was searched.
        type_name: String,

        /// The field that was not found.
        field_name: String,
    },
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Schema: Send, Sync);
    assert_impl_all!(Field: Send, Sync);

    #[test]
    fn error_messages() {
        assert_eq!(
            SchemaError::UnknownField {
                type_name: "User".into(),
                field_name: "nope".into()
            }
            .to_string(),
            "type 'User' has no field 'nope'"
        );
        assert_eq!(
            SchemaError::MissingRootType {
                kind: OperationKind::Subscription
            }
            .to_string(),
            "the schema has no root type for subscription operations"
        );
    }
}
