//! Definitions describing how a field maps onto the downstream services.

use serde::Deserialize;
use serde::Serialize;

/// How a client-facing field maps onto the service that owns its parent type.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum FieldMapping {
    /// The field is exposed under a different name by the service.
    Rename(FieldMappingDefinition),

    /// The field is resolved by a second query to another service.
    Hydration(InnerServiceHydration),
}

/// A renamed field.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMappingDefinition {
    /// The name of the field on the downstream service.
    pub underlying_name: String,
}

/// A field hydrated from another service.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InnerServiceHydration {
    /// The service answering the hydration query.
    pub service_name: String,

    /// The root field queried on that service.
    pub top_level_field: String,

    /// The arguments passed to the root field.
    #[serde(default)]
    pub arguments: Vec<RemoteArgumentDefinition>,
}

impl InnerServiceHydration {
    /// A hydration passing the value of `source_field` as argument `argument_name`.
    pub fn from_object_field(
        service_name: impl Into<String>,
        top_level_field: impl Into<String>,
        argument_name: impl Into<String>,
        source_field: impl Into<String>,
    ) -> Self {
        InnerServiceHydration {
            service_name: service_name.into(),
            top_level_field: top_level_field.into(),
            arguments: vec![RemoteArgumentDefinition {
                name: argument_name.into(),
                remote_argument_source: RemoteArgumentSource {
                    source_type: SourceType::ObjectField,
                    name: source_field.into(),
                },
            }],
        }
    }
}

/// An argument of a hydration query.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteArgumentDefinition {
    /// The argument name on the top level field.
    pub name: String,

    /// Where the argument value comes from.
    pub remote_argument_source: RemoteArgumentSource,
}

/// Where a hydration argument value comes from.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteArgumentSource {
    pub source_type: SourceType,

    /// The name of the source field, argument or context entry.
    pub name: String,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    /// A field of the object the hydrated field belongs to.
    ObjectField,
    /// An argument of the hydrated field.
    FieldArgument,
    /// An entry of the execution context.
    Context,
}
