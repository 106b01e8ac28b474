//! Forward and inverse rewrites of single query fields.
//!
//! A [`FieldTransformation`] is created for every occurrence of a mapped field while a query is
//! decomposed. Applying it consumes it and yields an [`AppliedTransformation`] holding both the
//! field sent downstream and the field the client asked for.

use std::sync::Arc;

use configuration::FieldMapping;
use configuration::FieldMappingDefinition;
use configuration::InnerServiceHydration;
use configuration::SourceType;
use query_model::Field;

use crate::ExecutionStepInfo;
use crate::TransformationError;

/// The field being transformed and where it sits.
#[derive(Clone, Copy, Debug)]
pub struct FieldEnvironment<'a> {
    /// The field as the client requested it.
    pub field: &'a Field,

    /// The step info of the field.
    pub step_info: &'a ExecutionStepInfo,
}

/// A transformation that was not applied yet.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldTransformation {
    /// The field is exposed under another name downstream.
    Rename(FieldMappingDefinition),

    /// The field is replaced by the object field supplying the hydration argument.
    Hydration(Arc<InnerServiceHydration>),
}

/// A transformation whose forward rewrite was computed.
#[derive(Clone, Debug, PartialEq)]
pub enum AppliedTransformation {
    Rename {
        original_field: Field,
        new_field: Field,
        step_info: ExecutionStepInfo,
    },
    Hydration {
        original_field: Field,
        new_field: Field,
        hydration: Arc<InnerServiceHydration>,
        step_info: ExecutionStepInfo,
    },
}

impl FieldTransformation {
    pub fn from_mapping(mapping: &FieldMapping) -> Self {
        match mapping {
            FieldMapping::Rename(definition) => FieldTransformation::Rename(definition.clone()),
            FieldMapping::Hydration(hydration) => {
                FieldTransformation::Hydration(Arc::new(hydration.clone()))
            }
        }
    }

    /// Compute the field sent downstream.
    ///
    /// A hydration must have exactly one argument, taken from an object field.
    pub fn apply(
        self,
        environment: FieldEnvironment<'_>,
    ) -> Result<AppliedTransformation, TransformationError> {
        let original_field = environment.field.clone();
        let step_info = environment.step_info.clone();
        match self {
            FieldTransformation::Rename(definition) => {
                let mut new_field = original_field.clone();
                new_field.alias = Some(original_field.response_key().to_string());
                new_field.name = definition.underlying_name;
                Ok(AppliedTransformation::Rename {
                    original_field,
                    new_field,
                    step_info,
                })
            }
            FieldTransformation::Hydration(hydration) => {
                let source = match hydration.arguments.as_slice() {
                    [argument] => &argument.remote_argument_source,
                    arguments => {
                        return Err(TransformationError::UnsupportedHydrationShape {
                            field_name: original_field.name,
                            reason: format!("expected one argument, found {}", arguments.len()),
                        })
                    }
                };
                if source.source_type != SourceType::ObjectField {
                    return Err(TransformationError::UnsupportedHydrationShape {
                        field_name: original_field.name,
                        reason: format!(
                            "argument source '{}' is not an object field",
                            source.name
                        ),
                    });
                }
                let new_field = Field {
                    name: source.name.clone(),
                    selections: None,
                    ..original_field.clone()
                };
                Ok(AppliedTransformation::Hydration {
                    original_field,
                    new_field,
                    hydration,
                    step_info,
                })
            }
        }
    }
}

impl AppliedTransformation {
    /// The field sent downstream.
    pub fn new_field(&self) -> &Field {
        match self {
            AppliedTransformation::Rename { new_field, .. }
            | AppliedTransformation::Hydration { new_field, .. } => new_field,
        }
    }

    /// The field restored for the client.
    pub fn unapply_field(&self) -> &Field {
        match self {
            AppliedTransformation::Rename { original_field, .. }
            | AppliedTransformation::Hydration { original_field, .. } => original_field,
        }
    }

    pub fn step_info(&self) -> &ExecutionStepInfo {
        match self {
            AppliedTransformation::Rename { step_info, .. }
            | AppliedTransformation::Hydration { step_info, .. } => step_info,
        }
    }

    pub fn hydration(&self) -> Option<&Arc<InnerServiceHydration>> {
        match self {
            AppliedTransformation::Hydration { hydration, .. } => Some(hydration),
            AppliedTransformation::Rename { .. } => None,
        }
    }
}
