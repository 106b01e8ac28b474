use std::sync::Arc;

use configuration::InnerServiceHydration;
use indexmap::IndexMap;
use query_model::Field;
use query_model::Schema;
use query_model::Selection;
use query_model::TYPENAME_FIELD_NAME;
use serde_json::Value;

use crate::AppliedTransformation;
use crate::ExecutionStepInfo;
use crate::GraphQLError;
use crate::HydrationInput;
use crate::Object;
use crate::Response;
use crate::ResultNode;
use crate::ResultNodeData;
use crate::ResultNodeKind;
use crate::ResultPath;
use crate::Transformations;

/// Fields collected by response key, each with the type it was selected on.
pub type CollectedFields<'a> = IndexMap<String, Vec<(String, &'a Field)>>;

/// Collect the fields of `selections` that apply to an object of type `object_type`.
///
/// Inline fragments apply when they have no type condition, or when it matches the object's
/// `__typename`, falling back to `object_type` when the object does not report one.
pub fn collect_fields<'a>(
    selections: &'a [Selection],
    object_type: &str,
    typename: Option<&str>,
    fields: &mut CollectedFields<'a>,
) {
    for selection in selections {
        match selection {
            Selection::Field(field) => fields
                .entry(field.response_key().to_string())
                .or_default()
                .push((object_type.to_string(), field)),
            Selection::InlineFragment(fragment) => match &fragment.type_condition {
                None => collect_fields(&fragment.selections, object_type, typename, fields),
                Some(type_condition) => {
                    if typename.unwrap_or(object_type) == type_condition {
                        collect_fields(&fragment.selections, type_condition, typename, fields)
                    }
                }
            },
        }
    }
}

/// Build the result nodes of `selections` from downstream `data`.
pub fn build_result_nodes(
    selections: &[Selection],
    data: &Object,
    step_info: &ExecutionStepInfo,
    schema: &Schema,
    transformations: &Transformations,
) -> Vec<ResultNode> {
    ResultBuilder::new(schema, transformations, Vec::new()).build_result_nodes(
        selections, data, step_info,
    )
}

/// Builds result nodes from downstream data.
///
/// The builder walks the client selections. Mapped fields are read under the response key of the
/// field that was sent downstream. Errors reported by the service are placed on the null values
/// at their path; the others are kept for the response.
pub struct ResultBuilder<'a> {
    schema: &'a Schema,
    transformations: &'a Transformations,
    errors: Vec<GraphQLError>,
}

impl<'a> ResultBuilder<'a> {
    pub fn new(
        schema: &'a Schema,
        transformations: &'a Transformations,
        errors: Vec<GraphQLError>,
    ) -> Self {
        ResultBuilder {
            schema,
            transformations,
            errors,
        }
    }

    /// The errors that were not placed on any node.
    pub fn into_unplaced_errors(self) -> Vec<GraphQLError> {
        self.errors
    }

    pub fn build_result_nodes(
        &mut self,
        selections: &[Selection],
        data: &Object,
        step_info: &ExecutionStepInfo,
    ) -> Vec<ResultNode> {
        let typename = data.get(TYPENAME_FIELD_NAME).and_then(Value::as_str);
        let mut fields = CollectedFields::new();
        collect_fields(selections, step_info.object_type(), typename, &mut fields);
        fields
            .iter()
            .map(|(key, fields)| self.build_field(key, fields, data, step_info))
            .collect()
    }

    /// Build the node of a value produced for `field`, at the position of `step_info`.
    pub fn build_value(
        &mut self,
        value: &Value,
        field: &Field,
        step_info: &ExecutionStepInfo,
    ) -> ResultNode {
        let fields = [(step_info.field_container().unwrap_or_default().to_string(), field)];
        self.value(value, &fields, &field.ids, step_info)
    }

    fn build_field(
        &mut self,
        key: &str,
        fields: &[(String, &Field)],
        data: &Object,
        parent: &ExecutionStepInfo,
    ) -> ResultNode {
        let field_ids: Vec<String> = fields
            .iter()
            .flat_map(|(_, field)| field.ids.iter().cloned())
            .collect();
        let Some((parent_type, field)) = fields.first() else {
            return self.error(field_ids, parent.path().key(key), None, "no field selected");
        };
        let alias = field.alias.clone();
        let step_info = match parent.with_object_type(parent_type).child(field, self.schema) {
            Ok(step_info) => step_info,
            Err(error) => {
                return self.error(field_ids, parent.path().key(key), None, error.to_string())
            }
        };

        let transformations = self.transformations;
        let transformation = field_ids
            .iter()
            .find_map(|field_id| transformations.get(field_id));
        let node = match transformation {
            None => {
                let value = data.get(key).unwrap_or(&Value::Null);
                self.value(value, fields, &field_ids, &step_info)
            }
            Some(Err(error)) => {
                self.error(field_ids, step_info.path().clone(), Some(&step_info), error.to_string())
            }
            Some(Ok(applied)) => {
                let value = data
                    .get(applied.new_field().response_key())
                    .unwrap_or(&Value::Null);
                match applied {
                    AppliedTransformation::Rename { .. } => {
                        self.value(value, fields, &field_ids, &step_info)
                    }
                    AppliedTransformation::Hydration {
                        original_field,
                        hydration,
                        ..
                    } => {
                        let original_field = merge_selections(original_field, fields);
                        self.hydration_value(value, &original_field, hydration, &field_ids, &step_info)
                    }
                }
            }
        };
        node.transform(|data| data.alias = alias)
    }

    fn value(
        &mut self,
        value: &Value,
        fields: &[(String, &Field)],
        field_ids: &[String],
        step_info: &ExecutionStepInfo,
    ) -> ResultNode {
        let kind = match value {
            Value::Null => return self.null(field_ids, step_info),
            Value::Array(items) => ResultNodeKind::List {
                children: items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        self.value(item, fields, field_ids, &step_info.list_item(index))
                    })
                    .collect(),
            },
            Value::Object(object) if fields.iter().any(|(_, field)| field.selections.is_some()) => {
                let typename = object.get(TYPENAME_FIELD_NAME).and_then(Value::as_str);
                let mut sub_fields = CollectedFields::new();
                for (_, field) in fields {
                    if let Some(selections) = &field.selections {
                        collect_fields(selections, step_info.object_type(), typename, &mut sub_fields);
                    }
                }
                ResultNodeKind::Object {
                    children: sub_fields
                        .iter()
                        .map(|(key, sub)| self.build_field(key, sub, object, step_info))
                        .collect(),
                }
            }
            _ => ResultNodeKind::Leaf {
                value: value.clone(),
            },
        };
        node(field_ids, step_info, kind)
    }

    fn hydration_value(
        &mut self,
        value: &Value,
        original_field: &Field,
        hydration: &Arc<InnerServiceHydration>,
        field_ids: &[String],
        step_info: &ExecutionStepInfo,
    ) -> ResultNode {
        let kind = match value {
            Value::Null => return self.null(field_ids, step_info),
            Value::Array(items) => ResultNodeKind::List {
                children: items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        self.hydration_value(
                            item,
                            original_field,
                            hydration,
                            field_ids,
                            &step_info.list_item(index),
                        )
                    })
                    .collect(),
            },
            _ => ResultNodeKind::HydrationInput(HydrationInput {
                value: value.clone(),
                original_field: original_field.clone(),
                hydration: hydration.clone(),
            }),
        };
        node(field_ids, step_info, kind)
    }

    fn null(&mut self, field_ids: &[String], step_info: &ExecutionStepInfo) -> ResultNode {
        let (errors, others) = std::mem::take(&mut self.errors)
            .into_iter()
            .partition::<Vec<_>, _>(|error| error.path() == Some(step_info.path()));
        self.errors = others;
        let kind = if errors.is_empty() {
            ResultNodeKind::Leaf { value: Value::Null }
        } else {
            ResultNodeKind::Error { errors }
        };
        node(field_ids, step_info, kind)
    }

    fn error(
        &mut self,
        field_ids: Vec<String>,
        path: ResultPath,
        step_info: Option<&ExecutionStepInfo>,
        message: impl Into<String>,
    ) -> ResultNode {
        ResultNodeData {
            field_ids,
            result_path: path.clone(),
            alias: None,
            object_type: step_info.and_then(|step_info| step_info.field_container().map(str::to_string)),
            field_definition: step_info.and_then(|step_info| step_info.field_definition().cloned()),
            kind: ResultNodeKind::Error {
                errors: vec![GraphQLError::new(message, Some(path))],
            },
        }
        .into()
    }
}

fn node(field_ids: &[String], step_info: &ExecutionStepInfo, kind: ResultNodeKind) -> ResultNode {
    ResultNodeData {
        field_ids: field_ids.to_vec(),
        result_path: step_info.path().clone(),
        alias: None,
        object_type: step_info.field_container().map(str::to_string),
        field_definition: step_info.field_definition().cloned(),
        kind,
    }
    .into()
}

/// `field` with the selections of every field sharing its response key.
fn merge_selections(field: &Field, fields: &[(String, &Field)]) -> Field {
    let mut merged = field.clone();
    if fields.len() > 1 {
        merged.selections = fields
            .iter()
            .filter_map(|(_, field)| field.selections.clone())
            .reduce(|mut selections, more| {
                selections.extend(more);
                selections
            });
    }
    merged
}

impl ResultNode {
    /// The client response: data rendered under the client keys, and the errors of every error
    /// node in tree order.
    pub fn to_response(&self) -> Response {
        Response {
            data: self.to_data(),
            errors: self.errors(),
        }
    }

    /// The data of this node. Error nodes and unresolved hydration inputs render as null.
    pub fn to_data(&self) -> Value {
        match self.kind() {
            ResultNodeKind::Object { children } => Value::Object(
                children
                    .iter()
                    .map(|child| {
                        (
                            child.response_key().unwrap_or_default().to_string(),
                            child.to_data(),
                        )
                    })
                    .collect(),
            ),
            ResultNodeKind::List { children } => {
                Value::Array(children.iter().map(ResultNode::to_data).collect())
            }
            ResultNodeKind::Leaf { value } => value.clone(),
            ResultNodeKind::HydrationInput(_) | ResultNodeKind::Error { .. } => Value::Null,
        }
    }

    /// The errors of this node and its descendants.
    pub fn errors(&self) -> Vec<GraphQLError> {
        let mut errors = Vec::new();
        self.collect_errors(&mut errors);
        errors
    }

    fn collect_errors(&self, errors: &mut Vec<GraphQLError>) {
        if let ResultNodeKind::Error { errors: node_errors } = self.kind() {
            errors.extend(node_errors.iter().cloned());
        }
        for child in self.children() {
            child.collect_errors(errors);
        }
    }
}

#[cfg(test)]
mod tests {
    use query_model::InlineFragment;
    use query_model::OperationKind;
    use serde_json::json;
    use test_log::test;

    use super::*;
    use crate::decompose;
    use crate::Context;
    use crate::decompose::tests::configuration;
    use crate::root_step_info;
    use crate::step_info::tests::schema;

    fn convert(selections: Vec<Selection>, data: Value) -> (ResultNode, Vec<GraphQLError>, Value) {
        convert_with_errors(selections, data, vec![])
    }

    fn convert_with_errors(
        selections: Vec<Selection>,
        data: Value,
        errors: Vec<GraphQLError>,
    ) -> (ResultNode, Vec<GraphQLError>, Value) {
        let schema = schema();
        let root = root_step_info(&schema, OperationKind::Query).unwrap();
        let decomposition = decompose(
            &selections,
            &root,
            &schema,
            &configuration(),
            &Context::default(),
        );
        let mut builder = ResultBuilder::new(&schema, &decomposition.transformations, errors);
        let object = data.as_object().cloned().unwrap_or_default();
        let children = builder.build_result_nodes(&decomposition.client_selections, &object, &root);
        let tree = ResultNode::root(children);
        let data = tree.to_data();
        (tree, builder.into_unplaced_errors(), data)
    }

    #[test]
    fn plain_fields_follow_the_data() {
        let (tree, _, data) = convert(
            vec![Field::new("users")
                .with_selections(vec![
                    Field::new("id").into(),
                    Field::new("name").with_alias("label").into(),
                ])
                .into()],
            json!({ "users": [{ "id": "U1", "label": "Ann" }, { "id": "U2", "label": null }] }),
        );
        assert_eq!(
            data,
            json!({ "users": [{ "id": "U1", "label": "Ann" }, { "id": "U2", "label": null }] })
        );
        let label = tree.find(&ResultPath::parse("users/1/label")).unwrap();
        assert_eq!(label.field_ids(), ["/users/label".to_string()]);
        assert_eq!(label.object_type(), Some("User"));
        assert_eq!(label.field_definition().unwrap().name, "name");
        assert!(tree.errors().is_empty());
    }

    #[test]
    fn renamed_fields_are_read_under_the_client_key() {
        let (_, _, data) = convert(
            vec![Field::new("user")
                .with_selections(vec![Field::new("fullName").into()])
                .into()],
            json!({ "user": { "fullName": "Ann Smith" } }),
        );
        assert_eq!(data, json!({ "user": { "fullName": "Ann Smith" } }));
    }

    #[test]
    fn hydrated_fields_become_inputs() {
        let (tree, _, data) = convert(
            vec![Field::new("user")
                .with_selections(vec![
                    Field::new("company")
                        .with_selections(vec![Field::new("name").into()])
                        .into(),
                    Field::new("companies")
                        .with_selections(vec![Field::new("name").into()])
                        .into(),
                ])
                .into()],
            json!({ "user": { "companyId": "C1", "companyIds": ["C2", "C3"] } }),
        );
        let company = tree.find(&ResultPath::parse("user/company")).unwrap();
        let input = company.hydration_input().unwrap();
        assert_eq!(input.value, json!("C1"));
        assert_eq!(input.original_field.to_string(), "company { name }");
        assert_eq!(input.hydration.service_name, "companies");

        let companies = tree.find(&ResultPath::parse("user/companies")).unwrap();
        assert_eq!(companies.children().len(), 2);
        let second = &companies.children()[1];
        assert_eq!(second.result_path(), &ResultPath::parse("user/companies/1"));
        assert_eq!(second.hydration_input().unwrap().value, json!("C3"));
        assert_eq!(second.field_ids(), companies.field_ids());

        assert_eq!(data, json!({ "user": { "company": null, "companies": [null, null] } }));
    }

    #[test]
    fn null_hydration_source_is_null() {
        let (tree, _, _) = convert(
            vec![Field::new("user")
                .with_selections(vec![Field::new("company")
                    .with_selections(vec![Field::new("name").into()])
                    .into()])
                .into()],
            json!({ "user": { "companyId": null } }),
        );
        let company = tree.find(&ResultPath::parse("user/company")).unwrap();
        assert_eq!(company.kind(), &ResultNodeKind::Leaf { value: Value::Null });
    }

    #[test]
    fn failed_fields_become_errors() {
        let (tree, _, data) = convert(
            vec![Field::new("user")
                .with_selections(vec![
                    Field::new("id").into(),
                    Field::new("legacy")
                        .with_argument("id", json!("L1"))
                        .with_selections(vec![Field::new("name").into()])
                        .into(),
                    Field::new("nope").into(),
                ])
                .into()],
            json!({ "user": { "id": "U1" } }),
        );
        assert_eq!(data, json!({ "user": { "id": "U1", "legacy": null, "nope": null } }));
        let errors = tree.errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].path(), Some(&ResultPath::parse("user/legacy")));
        assert!(errors[0].message().contains("not an object field"));
        assert_eq!(errors[1].message(), "type 'User' has no field 'nope'");
    }

    #[test]
    fn service_errors_are_placed_on_null_values() {
        let (tree, unplaced, data) = convert_with_errors(
            vec![Field::new("users")
                .with_selections(vec![Field::new("name").into()])
                .into()],
            json!({ "users": [{ "name": "Ann" }, { "name": null }] }),
            vec![
                GraphQLError::new("not found", Some(ResultPath::parse("users/1/name"))),
                GraphQLError::new("slow", None),
            ],
        );
        assert_eq!(data, json!({ "users": [{ "name": "Ann" }, { "name": null }] }));
        let response = tree.to_response();
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].message(), "not found");
        assert_eq!(unplaced, vec![GraphQLError::new("slow", None)]);
    }

    #[test]
    fn inline_fragments_match_the_typename() {
        let node = |typename: &str| {
            convert(
                vec![Field::new("node")
                    .with_selections(vec![
                        Field::new("id").into(),
                        Selection::InlineFragment(InlineFragment {
                            type_condition: Some("User".into()),
                            selections: vec![Field::new("fullName").into()],
                        }),
                        Selection::InlineFragment(InlineFragment {
                            type_condition: Some("Company".into()),
                            selections: vec![Field::new("name").into()],
                        }),
                    ])
                    .into()],
                json!({ "node": { "__typename": typename, "id": "X", "fullName": "Ann", "name": "Acme" } }),
            )
            .2
        };
        assert_eq!(node("User"), json!({ "node": { "id": "X", "fullName": "Ann" } }));
        assert_eq!(node("Company"), json!({ "node": { "id": "X", "name": "Acme" } }));
    }

    #[test]
    fn fields_with_one_response_key_are_merged() {
        let (tree, _, data) = convert(
            vec![
                Field::new("user")
                    .with_selections(vec![Field::new("id").into()])
                    .into(),
                Field::new("user")
                    .with_selections(vec![Field::new("name").into()])
                    .into(),
            ],
            json!({ "user": { "id": "U1", "name": "Ann" } }),
        );
        assert_eq!(data, json!({ "user": { "id": "U1", "name": "Ann" } }));
        assert_eq!(tree.children().len(), 1);
        assert_eq!(
            tree.children()[0].field_ids(),
            ["/user".to_string(), "/user".to_string()]
        );
    }

    #[test]
    fn hydrated_fields_with_one_response_key_are_merged() {
        let (tree, _, _) = convert(
            vec![Field::new("user")
                .with_selections(vec![
                    Field::new("company")
                        .with_selections(vec![Field::new("name").into()])
                        .into(),
                    Field::new("company")
                        .with_selections(vec![Field::new("id").into()])
                        .into(),
                ])
                .into()],
            json!({ "user": { "companyId": "C1" } }),
        );
        let company = tree.find(&ResultPath::parse("user/company")).unwrap();
        let input = company.hydration_input().unwrap();
        assert_eq!(input.value, json!("C1"));
        assert_eq!(input.original_field.to_string(), "company { name id }");
    }

    #[test]
    fn build_result_nodes_without_service_errors() {
        let schema = schema();
        let root = root_step_info(&schema, OperationKind::Query).unwrap();
        let selections = vec![Field::new("user")
            .with_ids(vec!["u".into()])
            .with_selections(vec![Field::new("id").with_ids(vec!["i".into()]).into()])
            .into()];
        let data = json!({ "user": { "id": "U1" } });
        let nodes = build_result_nodes(
            &selections,
            data.as_object().unwrap(),
            &root,
            &schema,
            &Transformations::new(),
        );
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].field_ids(), ["u".to_string()]);
        assert_eq!(nodes[0].children()[0].field_ids(), ["i".to_string()]);
    }
}
