use std::collections::HashMap;

use configuration::Configuration;
use configuration::FieldMapping;
use query_model::Field;
use query_model::InlineFragment;
use query_model::Schema;
use query_model::Selection;
use tracing::debug;
use tracing::warn;

use crate::AppliedTransformation;
use crate::Context;
use crate::ExecutionStepInfo;
use crate::FieldEnvironment;
use crate::FieldTransformation;
use crate::TransformationError;

/// Transformation outcomes by field id.
pub type Transformations = HashMap<String, Result<AppliedTransformation, TransformationError>>;

/// Client selections split into what is sent downstream and what is needed to read it back.
#[derive(Clone, Debug, Default)]
pub struct Decomposition {
    /// The client selections, every field carrying its ids.
    pub client_selections: Vec<Selection>,

    /// The selections sent to the downstream service.
    pub selections: Vec<Selection>,

    /// The transformations applied to mapped fields.
    pub transformations: Transformations,

    /// The context of the execution, handed to the requests sent for the selections.
    pub context: Context,
}

/// Decompose `selections`, visited at `step_info`, for the service owning them.
///
/// A field without ids gets the path of its response key, list indexes excluded, so every item of
/// a list shares the ids of one selection. Fields that fail to transform are left out of the
/// downstream selections; their outcome is recorded.
pub fn decompose(
    selections: &[Selection],
    step_info: &ExecutionStepInfo,
    schema: &Schema,
    configuration: &Configuration,
    context: &Context,
) -> Decomposition {
    let mut transformations = Transformations::new();
    let (client_selections, selections) = Decomposer {
        schema,
        configuration,
        transformations: &mut transformations,
    }
    .selections(selections, step_info);
    Decomposition {
        client_selections,
        selections,
        transformations,
        context: context.clone(),
    }
}

struct Decomposer<'a> {
    schema: &'a Schema,
    configuration: &'a Configuration,
    transformations: &'a mut Transformations,
}

impl Decomposer<'_> {
    fn selections(
        &mut self,
        selections: &[Selection],
        step_info: &ExecutionStepInfo,
    ) -> (Vec<Selection>, Vec<Selection>) {
        let mut client = Vec::with_capacity(selections.len());
        let mut downstream = Vec::with_capacity(selections.len());
        for selection in selections {
            match selection {
                Selection::Field(field) => {
                    let (client_field, downstream_field) = self.field(field, step_info);
                    client.push(client_field.into());
                    downstream.extend(downstream_field.map(Selection::from));
                }
                Selection::InlineFragment(fragment) => {
                    let fragment_step_info = match &fragment.type_condition {
                        Some(type_condition) => step_info.with_object_type(type_condition),
                        None => step_info.clone(),
                    };
                    let (client_selections, selections) =
                        self.selections(&fragment.selections, &fragment_step_info);
                    client.push(Selection::InlineFragment(InlineFragment {
                        type_condition: fragment.type_condition.clone(),
                        selections: client_selections,
                    }));
                    downstream.push(Selection::InlineFragment(InlineFragment {
                        type_condition: fragment.type_condition.clone(),
                        selections,
                    }));
                }
            }
        }
        (client, downstream)
    }

    fn field(&mut self, field: &Field, step_info: &ExecutionStepInfo) -> (Field, Option<Field>) {
        let mut field = field.clone();
        if field.ids.is_empty() {
            field.ids = vec![step_info
                .path()
                .key(field.response_key())
                .without_indexes()
                .to_string()];
        }

        let field_step_info = match step_info.child(&field, self.schema) {
            Ok(field_step_info) => field_step_info,
            Err(error) => {
                warn!(field = %field.name, %error, "cannot decompose field");
                self.record(&field.ids, Err(error.into()));
                return (field, None);
            }
        };

        let mapping = self
            .configuration
            .field_mapping(step_info.object_type(), &field.name);
        let mut downstream_field = field.clone();
        // hydrated selections are decomposed when the hydration query is built
        if !matches!(mapping, Some(FieldMapping::Hydration(_))) {
            if let Some(selections) = &field.selections {
                let (client_selections, downstream_selections) =
                    self.selections(selections, &field_step_info);
                field.selections = Some(client_selections);
                downstream_field.selections = Some(downstream_selections);
            }
        }

        match mapping {
            None => (field, Some(downstream_field)),
            Some(mapping) => self.transform(field, downstream_field, mapping, &field_step_info),
        }
    }

    /// Apply the transformation of a mapped field. `environment_field` is the field with its
    /// selections already decomposed.
    fn transform(
        &mut self,
        client_field: Field,
        environment_field: Field,
        mapping: &FieldMapping,
        step_info: &ExecutionStepInfo,
    ) -> (Field, Option<Field>) {
        let outcome = FieldTransformation::from_mapping(mapping).apply(FieldEnvironment {
            field: &environment_field,
            step_info,
        });
        let downstream_field = match &outcome {
            Ok(applied) => {
                debug!(field = %client_field.name, downstream = %applied.new_field(), "transformed field");
                Some(applied.new_field().clone())
            }
            Err(error) => {
                warn!(field = %client_field.name, %error, "cannot transform field");
                None
            }
        };
        self.record(&client_field.ids, outcome);
        (client_field, downstream_field)
    }

    fn record(
        &mut self,
        field_ids: &[String],
        outcome: Result<AppliedTransformation, TransformationError>,
    ) {
        for field_id in field_ids {
            self.transformations.insert(field_id.clone(), outcome.clone());
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use query_model::OperationKind;
    use serde_json::json;
    use test_log::test;

    use super::*;
    use crate::root_step_info;
    use crate::step_info::tests::schema;

    pub(crate) fn configuration() -> Configuration {
        Configuration::from_yaml(include_str!("testdata/configuration.yaml")).unwrap()
    }

    fn to_string(selections: &[Selection]) -> String {
        selections
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn user_selection(selections: Vec<Selection>) -> Vec<Selection> {
        vec![Field::new("user").with_selections(selections).into()]
    }

    #[test]
    fn hydrated_field_is_replaced_by_its_source() {
        let schema = schema();
        let root = root_step_info(&schema, OperationKind::Query).unwrap();
        let decomposition = decompose(
            &user_selection(vec![
                Field::new("id").into(),
                Field::new("company")
                    .with_selections(vec![Field::new("name").into()])
                    .into(),
            ]),
            &root,
            &schema,
            &configuration(),
            &Context::default(),
        );
        assert_eq!(
            to_string(&decomposition.selections),
            "user { id companyId }"
        );
        let applied = decomposition.transformations["/user/company"]
            .as_ref()
            .unwrap();
        assert_eq!(applied.unapply_field().to_string(), "company { name }");
        assert_eq!(applied.step_info().path(), &crate::ResultPath::parse("user/company"));
        assert_eq!(decomposition.transformations.len(), 1);
    }

    #[test]
    fn ids_are_assigned_to_client_selections() {
        let schema = schema();
        let root = root_step_info(&schema, OperationKind::Query).unwrap();
        let decomposition = decompose(
            &[Field::new("users")
                .with_selections(vec![Field::new("id").with_alias("key").into()])
                .into()],
            &root,
            &schema,
            &configuration(),
            &Context::default(),
        );
        let Selection::Field(users) = &decomposition.client_selections[0] else {
            panic!("expected a field");
        };
        assert_eq!(users.ids, vec!["/users".to_string()]);
        let Some([Selection::Field(key)]) = users.selections.as_deref() else {
            panic!("expected one field");
        };
        assert_eq!(key.ids, vec!["/users/key".to_string()]);
    }

    #[test]
    fn existing_ids_are_kept() {
        let schema = schema();
        let root = root_step_info(&schema, OperationKind::Query).unwrap();
        let decomposition = decompose(
            &[Field::new("user").with_ids(vec!["f1".into(), "f2".into()]).into()],
            &root,
            &schema,
            &configuration(),
            &Context::default(),
        );
        let Selection::Field(user) = &decomposition.client_selections[0] else {
            panic!("expected a field");
        };
        assert_eq!(user.ids, vec!["f1".to_string(), "f2".to_string()]);
    }

    #[test]
    fn renamed_field_keeps_its_response_key() {
        let schema = schema();
        let root = root_step_info(&schema, OperationKind::Query).unwrap();
        let decomposition = decompose(
            &user_selection(vec![Field::new("fullName").into()]),
            &root,
            &schema,
            &configuration(),
            &Context::default(),
        );
        assert_eq!(
            to_string(&decomposition.selections),
            "user { fullName: name }"
        );
        assert_eq!(
            to_string(&decomposition.client_selections),
            "user { fullName }"
        );
    }

    #[test]
    fn unsupported_hydration_is_left_out() {
        let schema = schema();
        let root = root_step_info(&schema, OperationKind::Query).unwrap();
        let decomposition = decompose(
            &user_selection(vec![
                Field::new("id").into(),
                Field::new("legacy")
                    .with_argument("id", json!("L1"))
                    .with_selections(vec![Field::new("name").into()])
                    .into(),
            ]),
            &root,
            &schema,
            &configuration(),
            &Context::default(),
        );
        assert_eq!(to_string(&decomposition.selections), "user { id }");
        assert!(matches!(
            decomposition.transformations["/user/legacy"],
            Err(TransformationError::UnsupportedHydrationShape { .. })
        ));
    }

    #[test]
    fn unknown_field_is_left_out() {
        let schema = schema();
        let root = root_step_info(&schema, OperationKind::Query).unwrap();
        let decomposition = decompose(
            &user_selection(vec![Field::new("id").into(), Field::new("nope").into()]),
            &root,
            &schema,
            &configuration(),
            &Context::default(),
        );
        assert_eq!(to_string(&decomposition.selections), "user { id }");
        assert!(matches!(
            decomposition.transformations["/user/nope"],
            Err(TransformationError::Schema(_))
        ));
    }

    #[test]
    fn inline_fragments_use_their_type_condition() {
        let schema = schema();
        let root = root_step_info(&schema, OperationKind::Query).unwrap();
        let decomposition = decompose(
            &[Field::new("node")
                .with_selections(vec![
                    Field::new("id").into(),
                    Selection::InlineFragment(InlineFragment {
                        type_condition: Some("User".into()),
                        selections: vec![Field::new("fullName").into()],
                    }),
                ])
                .into()],
            &root,
            &schema,
            &configuration(),
            &Context::default(),
        );
        assert_eq!(
            to_string(&decomposition.selections),
            "node { id ... on User { fullName: name } }"
        );
    }

    #[test]
    fn nested_hydrations_wait_for_their_parent() {
        let schema = schema();
        let root = root_step_info(&schema, OperationKind::Query).unwrap();
        let decomposition = decompose(
            &user_selection(vec![Field::new("company")
                .with_selections(vec![Field::new("owner")
                    .with_selections(vec![Field::new("id").into()])
                    .into()])
                .into()]),
            &root,
            &schema,
            &configuration(),
            &Context::default(),
        );
        // the owner hydration is decomposed with the hydration query of the company
        assert_eq!(decomposition.transformations.len(), 1);
        let applied = decomposition.transformations["/user/company"]
            .as_ref()
            .unwrap();
        assert_eq!(
            applied.unapply_field().to_string(),
            "company { owner { id } }"
        );
    }
}
