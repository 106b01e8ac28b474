//! The result tree built while a stitched query executes.
//!
//! Nodes are immutable and cheap to clone: a node is a reference counted pointer to its data, and
//! children are shared between a node and every copy rebuilt from it. Editing a node through
//! [`ResultNode::transform`] returns a new node and leaves the original untouched, so a tree can
//! be read by several in-flight traversals while a new generation of it is being built.

use std::fmt;
use std::sync::Arc;

use configuration::InnerServiceHydration;
use query_model::Field;
use query_model::FieldDefinition;
use serde_json::Value;
use typed_builder::TypedBuilder;

use crate::zipper::TreeNode;
use crate::GraphQLError;
use crate::ResultPath;

/// A node of a result tree.
#[derive(Clone)]
pub struct ResultNode(Arc<ResultNodeData>);

/// The builder state of a [`ResultNode`].
#[derive(Clone, Debug, PartialEq, TypedBuilder)]
pub struct ResultNodeData {
    /// Ids of the query selections this node satisfies.
    #[builder(default, setter(into))]
    pub field_ids: Vec<String>,

    /// Absolute path from the root of the tree.
    #[builder(default)]
    pub result_path: ResultPath,

    /// Client-visible name, when it differs from the last key of the path.
    #[builder(default, setter(strip_option, into))]
    pub alias: Option<String>,

    /// The composite type declaring the field this node is a value of.
    #[builder(default, setter(strip_option, into))]
    pub object_type: Option<String>,

    #[builder(default, setter(strip_option))]
    pub field_definition: Option<Arc<FieldDefinition>>,

    pub kind: ResultNodeKind,
}

/// The variants of a result node.
#[derive(Clone, Debug, PartialEq)]
pub enum ResultNodeKind {
    /// An object; children are its fields in selection order.
    Object { children: Vec<ResultNode> },

    /// A list; children are its items.
    List { children: Vec<ResultNode> },

    /// A scalar, enum or null value.
    Leaf { value: Value },

    /// A value waiting for a hydration fetch.
    HydrationInput(HydrationInput),

    /// A value that could not be resolved. Renders as null.
    Error { errors: Vec<GraphQLError> },
}

/// The pending part of a hydrated field.
#[derive(Clone, Debug, PartialEq)]
pub struct HydrationInput {
    /// The value of the source object field, used as hydration argument.
    pub value: Value,

    /// The field as the client requested it.
    pub original_field: Field,

    pub hydration: Arc<InnerServiceHydration>,
}

impl ResultNode {
    pub fn new(data: ResultNodeData) -> Self {
        ResultNode(Arc::new(data))
    }

    /// An object node at the root path.
    pub fn root(children: Vec<ResultNode>) -> Self {
        ResultNodeData::builder()
            .kind(ResultNodeKind::Object { children })
            .build()
            .into()
    }

    /// An error node standing in for `node`.
    pub fn error_from(node: &ResultNode, errors: Vec<GraphQLError>) -> Self {
        node.transform(|data| data.kind = ResultNodeKind::Error { errors })
    }

    /// Apply an edit to a copy of this node's data and return the edited node.
    pub fn transform(&self, edit: impl FnOnce(&mut ResultNodeData)) -> ResultNode {
        let mut data = self.data().clone();
        edit(&mut data);
        ResultNode::new(data)
    }

    pub fn data(&self) -> &ResultNodeData {
        &self.0
    }

    pub fn kind(&self) -> &ResultNodeKind {
        &self.0.kind
    }

    pub fn field_ids(&self) -> &[String] {
        &self.0.field_ids
    }

    pub fn result_path(&self) -> &ResultPath {
        &self.0.result_path
    }

    pub fn alias(&self) -> Option<&str> {
        self.0.alias.as_deref()
    }

    pub fn object_type(&self) -> Option<&str> {
        self.0.object_type.as_deref()
    }

    pub fn field_definition(&self) -> Option<&Arc<FieldDefinition>> {
        self.0.field_definition.as_ref()
    }

    /// The key this node is rendered under in its parent object.
    pub fn response_key(&self) -> Option<&str> {
        self.alias().or_else(|| self.result_path().last_key())
    }

    /// The direct children, empty for leaves.
    pub fn children(&self) -> &[ResultNode] {
        match self.kind() {
            ResultNodeKind::Object { children } | ResultNodeKind::List { children } => children,
            ResultNodeKind::Leaf { .. }
            | ResultNodeKind::HydrationInput(_)
            | ResultNodeKind::Error { .. } => &[],
        }
    }

    /// A copy of this node with other children. Leaves are returned unchanged.
    pub fn with_new_children(&self, new_children: Vec<ResultNode>) -> ResultNode {
        match self.kind() {
            ResultNodeKind::Object { .. } => {
                self.transform(|data| {
                    data.kind = ResultNodeKind::Object {
                        children: new_children,
                    }
                })
            }
            ResultNodeKind::List { .. } => self.transform(|data| {
                data.kind = ResultNodeKind::List {
                    children: new_children,
                }
            }),
            ResultNodeKind::Leaf { .. }
            | ResultNodeKind::HydrationInput(_)
            | ResultNodeKind::Error { .. } => self.clone(),
        }
    }

    pub fn hydration_input(&self) -> Option<&HydrationInput> {
        match self.kind() {
            ResultNodeKind::HydrationInput(input) => Some(input),
            _ => None,
        }
    }

    pub fn is_hydration_input(&self) -> bool {
        self.hydration_input().is_some()
    }

    /// Find the node at `path`, starting from this node.
    pub fn find(&self, path: &ResultPath) -> Option<&ResultNode> {
        if self.result_path() == path {
            return Some(self);
        }
        self.children()
            .iter()
            .find(|child| {
                child.result_path() == path
                    || path.iter().take(child.result_path().len()).eq(child.result_path().iter())
            })
            .and_then(|child| child.find(path))
    }

    /// Whether both handles point to the same allocation.
    pub fn ptr_eq(&self, other: &ResultNode) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<ResultNodeData> for ResultNode {
    fn from(data: ResultNodeData) -> Self {
        ResultNode::new(data)
    }
}

impl PartialEq for ResultNode {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.0 == other.0
    }
}

impl fmt::Debug for ResultNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TreeNode for ResultNode {
    fn children(&self) -> &[Self] {
        ResultNode::children(self)
    }

    fn with_new_children(&self, children: Vec<Self>) -> Self {
        ResultNode::with_new_children(self, children)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use configuration::InnerServiceHydration;
    use query_model::Field;
    use serde_json::json;
    use serde_json::Value;
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(ResultNode: Send, Sync);

    pub(crate) fn leaf(path: &str, value: Value) -> ResultNode {
        let path = ResultPath::parse(path);
        ResultNodeData::builder()
            .field_ids(vec![path.without_indexes().to_string()])
            .result_path(path)
            .kind(ResultNodeKind::Leaf { value })
            .build()
            .into()
    }

    pub(crate) fn object(path: &str, children: Vec<ResultNode>) -> ResultNode {
        let path = ResultPath::parse(path);
        ResultNodeData::builder()
            .field_ids(vec![path.without_indexes().to_string()])
            .result_path(path)
            .kind(ResultNodeKind::Object { children })
            .build()
            .into()
    }

    pub(crate) fn list(path: &str, children: Vec<ResultNode>) -> ResultNode {
        let path = ResultPath::parse(path);
        ResultNodeData::builder()
            .field_ids(vec![path.without_indexes().to_string()])
            .result_path(path)
            .kind(ResultNodeKind::List { children })
            .build()
            .into()
    }

    pub(crate) fn hydration_input(path: &str, field_id: &str, value: Value) -> ResultNode {
        let path = ResultPath::parse(path);
        let name = path.last_key().unwrap_or_default().to_string();
        ResultNodeData::builder()
            .field_ids(vec![field_id.to_string()])
            .result_path(path)
            .kind(ResultNodeKind::HydrationInput(HydrationInput {
                value,
                original_field: Field::new(name).with_selections(vec![Field::new("name").into()]),
                hydration: Arc::new(InnerServiceHydration::from_object_field(
                    "companies",
                    "companyById",
                    "id",
                    "companyId",
                )),
            }))
            .build()
            .into()
    }

    /// `{ user: { id, companyId, company }, users: [{ company }, { company }] }`
    pub(crate) fn sample_tree() -> ResultNode {
        ResultNode::root(vec![
            object(
                "user",
                vec![
                    leaf("user/id", json!("U1")),
                    leaf("user/companyId", json!("C1")),
                    hydration_input("user/company", "user/company", json!("C1")),
                ],
            ),
            list(
                "users",
                vec![
                    object(
                        "users/0",
                        vec![hydration_input("users/0/company", "users/company", json!("C2"))],
                    ),
                    object(
                        "users/1",
                        vec![hydration_input("users/1/company", "users/company", json!("C3"))],
                    ),
                ],
            ),
        ])
    }

    #[test]
    fn transform_does_not_touch_the_original() {
        let node = leaf("user/id", json!("U1"));
        let edited = node.transform(|data| data.alias = Some("identifier".into()));
        assert_eq!(node.alias(), None);
        assert_eq!(edited.alias(), Some("identifier"));
        assert_eq!(edited.response_key(), Some("identifier"));
        assert_eq!(node.response_key(), Some("id"));
        assert_ne!(node, edited);
    }

    #[test]
    fn children_are_shared() {
        let tree = sample_tree();
        let user = &tree.children()[0];
        let rebuilt = tree.with_new_children(tree.children().to_vec());
        assert!(rebuilt.children()[0].ptr_eq(user));
        assert!(!rebuilt.ptr_eq(&tree));
        assert_eq!(rebuilt, tree);
    }

    #[test]
    fn leaves_have_no_children() {
        let node = leaf("user/id", json!("U1"));
        assert!(node.children().is_empty());
        assert!(node.with_new_children(vec![leaf("x", json!(1))]).ptr_eq(&node));
        let input = hydration_input("user/company", "user/company", json!("C1"));
        assert!(input.children().is_empty());
        assert!(input.is_hydration_input());
        assert_eq!(input.hydration_input().unwrap().value, json!("C1"));
    }

    #[test]
    fn find_by_path() {
        let tree = sample_tree();
        let found = tree.find(&ResultPath::parse("users/1/company")).unwrap();
        assert_eq!(found.field_ids(), ["users/company".to_string()]);
        assert!(tree.find(&ResultPath::parse("users/2/company")).is_none());
        assert!(tree.find(&ResultPath::root()).unwrap().ptr_eq(&tree));
    }

    #[test]
    fn error_from_keeps_field_information() {
        let node = hydration_input("user/company", "user/company", json!("C1"));
        let error = ResultNode::error_from(
            &node,
            vec![GraphQLError::new("boom", Some(node.result_path().clone()))],
        );
        assert_eq!(error.result_path(), node.result_path());
        assert_eq!(error.field_ids(), node.field_ids());
        assert!(matches!(error.kind(), ResultNodeKind::Error { errors } if errors.len() == 1));
    }
}
