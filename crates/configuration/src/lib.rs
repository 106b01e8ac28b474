//! Logic for loading configuration in to an object model
use displaydoc::Display;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use typed_builder::TypedBuilder;

/// Field mapping and hydration definitions.
pub mod hydration;

pub use hydration::*;

/// Configuration errors.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
pub enum ConfigurationError {
    /// could not read configuration: {reason}
    InvalidConfiguration {
        /// The reason the configuration was rejected.
        reason: String,
    },
}

/// The configuration for the gateway.
/// Maintains the execution hints and the mapping of fields onto the downstream services.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    /// Hints tuning execution.
    #[serde(default)]
    #[builder(default)]
    pub hints: ExecutionHints,

    /// Fields that are renamed or hydrated.
    #[serde(default)]
    #[builder(default)]
    pub transformations: Vec<FieldTransformationDefinition>,
}

impl Configuration {
    /// Parse a configuration from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigurationError> {
        serde_yaml::from_str(yaml).map_err(|err| ConfigurationError::InvalidConfiguration {
            reason: err.to_string(),
        })
    }

    /// The mapping of a field, if it has one.
    pub fn field_mapping(&self, type_name: &str, field_name: &str) -> Option<&FieldMapping> {
        self.transformations
            .iter()
            .find(|definition| {
                definition.type_name == type_name && definition.field_name == field_name
            })
            .map(|definition| &definition.mapping)
    }
}

/// Hints tuning execution.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionHints {
    /// The number of hydration batches fetched at the same time.
    /// Defaults to 4
    #[serde(default = "default_hydration_concurrency")]
    #[builder(default_code = "default_hydration_concurrency()")]
    pub hydration_concurrency: usize,

    /// The number of hydration rounds after which remaining hydrations fail.
    /// Defaults to 8
    #[serde(default = "default_max_hydration_depth")]
    #[builder(default_code = "default_max_hydration_depth()")]
    pub max_hydration_depth: usize,
}

impl Default for ExecutionHints {
    fn default() -> Self {
        ExecutionHints::builder().build()
    }
}

fn default_hydration_concurrency() -> usize {
    4
}

fn default_max_hydration_depth() -> usize {
    8
}

/// The mapping of one field of one type.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldTransformationDefinition {
    /// The type declaring the field.
    pub type_name: String,

    /// The client-facing field name.
    pub field_name: String,

    pub mapping: FieldMapping,
}
