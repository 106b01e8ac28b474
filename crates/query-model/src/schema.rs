//! Read-only registry of the merged schema the gateway serves.
//!
//! Building the registry from SDL is the job of the schema tooling; the gateway receives it
//! already resolved, usually deserialized from JSON or YAML.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;

use crate::OperationKind;
use crate::SchemaError;

pub const TYPENAME_FIELD_NAME: &str = "__typename";

/// The type of a field.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    /// Named type {0}
    Named(String),
    /// List type {0}
    List(Box<FieldType>),
    /// Non null type {0}
    NonNull(Box<FieldType>),
}

impl FieldType {
    /// The named type once list and non null wrappers are removed.
    pub fn inner_type_name(&self) -> &str {
        match self {
            FieldType::Named(name) => name.as_str(),
            FieldType::List(ty) | FieldType::NonNull(ty) => ty.inner_type_name(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Named(ty) => write!(f, "{ty}"),
            FieldType::List(ty) => write!(f, "[{ty}]"),
            FieldType::NonNull(ty) => write!(f, "{ty}!"),
        }
    }
}

/// A field definition of a composite type.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    /// The field name.
    pub name: String,

    /// The declared output type.
    #[serde(rename = "type")]
    pub ty: FieldType,

    /// The downstream service owning this field. Only root fields need one.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub service: Option<String>,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        FieldDefinition {
            name: name.into(),
            ty,
            service: None,
        }
    }

    fn typename() -> Self {
        FieldDefinition::new(
            TYPENAME_FIELD_NAME,
            FieldType::NonNull(Box::new(FieldType::Named("String".into()))),
        )
    }
}

/// A composite type and its fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectType {
    /// The type name.
    pub name: String,

    /// The fields, in declaration order.
    #[serde(default)]
    pub fields: Vec<Arc<FieldDefinition>>,
}

/// The merged schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// The name of the query root type.
    #[serde(default = "default_query_type")]
    pub query_type: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mutation_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub subscription_type: Option<String>,

    /// Composite types by name.
    #[serde(default)]
    pub types: IndexMap<String, ObjectType>,
}

fn default_query_type() -> String {
    "Query".into()
}

impl Schema {
    /// Create a schema with a `Query` root and the given types.
    pub fn new(types: impl IntoIterator<Item = ObjectType>) -> Self {
        Schema {
            query_type: default_query_type(),
            mutation_type: None,
            subscription_type: None,
            types: types
                .into_iter()
                .map(|ty| (ty.name.clone(), ty))
                .collect(),
        }
    }

    pub fn object_type(&self, name: &str) -> Option<&ObjectType> {
        self.types.get(name)
    }

    /// The root type of an operation kind.
    pub fn root_type(&self, kind: OperationKind) -> Result<&ObjectType, SchemaError> {
        let name = match kind {
            OperationKind::Query => Some(&self.query_type),
            OperationKind::Mutation => self.mutation_type.as_ref(),
            OperationKind::Subscription => self.subscription_type.as_ref(),
        }
        .ok_or(SchemaError::MissingRootType { kind })?;
        self.object_type(name)
            .ok_or_else(|| SchemaError::UnknownType { name: name.clone() })
    }

    /// Look up the definition of a field on a composite type.
    ///
    /// `__typename` is defined on every composite type.
    pub fn field_definition(
        &self,
        type_name: &str,
        field_name: &str,
    ) -> Result<Arc<FieldDefinition>, SchemaError> {
        let object_type = self
            .object_type(type_name)
            .ok_or_else(|| SchemaError::UnknownType {
                name: type_name.to_string(),
            })?;
        if field_name == TYPENAME_FIELD_NAME {
            return Ok(Arc::new(FieldDefinition::typename()));
        }
        object_type
            .fields
            .iter()
            .find(|field| field.name == field_name)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownField {
                type_name: type_name.to_string(),
                field_name: field_name.to_string(),
            })
    }
}
