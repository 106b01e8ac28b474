use std::sync::Arc;

use query_model::Field;
use query_model::FieldDefinition;
use query_model::Schema;
use query_model::SchemaError;
use typed_builder::TypedBuilder;

use crate::ResultPath;

/// The type, field and path in effect while visiting a field.
///
/// Step infos are values: deriving the info of a nested field or of a list item returns a new
/// one and leaves the parent untouched.
#[derive(Clone, Debug, PartialEq, TypedBuilder)]
pub struct ExecutionStepInfo {
    /// The composite type whose selections are visited next.
    #[builder(setter(into))]
    object_type: String,

    /// The type declaring the current field. `None` at the root.
    #[builder(default, setter(strip_option, into))]
    field_container: Option<String>,

    #[builder(default, setter(strip_option))]
    field_definition: Option<Arc<FieldDefinition>>,

    #[builder(default, setter(strip_option))]
    field: Option<Field>,

    #[builder(default)]
    path: ResultPath,
}

impl ExecutionStepInfo {
    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    pub fn field_container(&self) -> Option<&str> {
        self.field_container.as_deref()
    }

    pub fn field_definition(&self) -> Option<&Arc<FieldDefinition>> {
        self.field_definition.as_ref()
    }

    pub fn field(&self) -> Option<&Field> {
        self.field.as_ref()
    }

    pub fn path(&self) -> &ResultPath {
        &self.path
    }

    /// Ids of the current field, empty at the root.
    pub fn field_ids(&self) -> &[String] {
        self.field.as_ref().map(|field| field.ids.as_slice()).unwrap_or_default()
    }

    /// The step info of `field`, selected on the current object type.
    pub fn child(&self, field: &Field, schema: &Schema) -> Result<Self, SchemaError> {
        let definition = schema.field_definition(&self.object_type, &field.name)?;
        Ok(ExecutionStepInfo {
            object_type: definition.ty.inner_type_name().to_string(),
            field_container: Some(self.object_type.clone()),
            field_definition: Some(definition),
            field: Some(field.clone()),
            path: self.path.key(field.response_key()),
        })
    }

    /// The step info of the list item at `index`.
    pub fn list_item(&self, index: usize) -> Self {
        ExecutionStepInfo {
            path: self.path.index(index),
            ..self.clone()
        }
    }

    /// The same step narrowed to another object type, as inside an inline fragment.
    pub fn with_object_type(&self, object_type: impl Into<String>) -> Self {
        ExecutionStepInfo {
            object_type: object_type.into(),
            ..self.clone()
        }
    }

    /// The same step at another path.
    pub fn with_path(&self, path: ResultPath) -> Self {
        ExecutionStepInfo {
            path,
            ..self.clone()
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use query_model::OperationKind;

    use super::*;
    use crate::strategy::root_step_info;

    pub(crate) fn schema() -> Schema {
        serde_json::from_str(include_str!("testdata/schema.json")).unwrap()
    }

    #[test]
    fn root_and_child() {
        let schema = schema();
        let root = root_step_info(&schema, OperationKind::Query).unwrap();
        assert_eq!(root.object_type(), "Query");
        assert!(root.path().is_empty());
        assert!(root.field_ids().is_empty());

        let users = root
            .child(&Field::new("users").with_ids(vec!["/users".into()]), &schema)
            .unwrap();
        assert_eq!(users.object_type(), "User");
        assert_eq!(users.field_container(), Some("Query"));
        assert_eq!(users.field_definition().unwrap().name, "users");
        assert_eq!(users.field_ids(), ["/users".to_string()]);

        let item = users.list_item(1);
        assert_eq!(item.path(), &ResultPath::parse("users/1"));
        assert_eq!(users.path(), &ResultPath::parse("users"));

        let name = item
            .child(&Field::new("name").with_alias("fullName"), &schema)
            .unwrap();
        assert_eq!(name.path(), &ResultPath::parse("users/1/fullName"));
        assert_eq!(name.object_type(), "String");
        assert_eq!(name.field_container(), Some("User"));
    }

    #[test]
    fn unknown_field() {
        let schema = schema();
        let root = root_step_info(&schema, OperationKind::Query).unwrap();
        assert_eq!(
            root.child(&Field::new("nope"), &schema),
            Err(SchemaError::UnknownField {
                type_name: "Query".into(),
                field_name: "nope".into()
            })
        );
    }

    #[test]
    fn narrowing_keeps_the_path() {
        let step = ExecutionStepInfo::builder()
            .object_type("Node")
            .path(ResultPath::parse("node"))
            .build();
        let narrowed = step.with_object_type("User");
        assert_eq!(narrowed.object_type(), "User");
        assert_eq!(narrowed.path(), step.path());
        let moved = step.with_path(ResultPath::parse("other"));
        assert_eq!(moved.path(), &ResultPath::parse("other"));
    }
}
