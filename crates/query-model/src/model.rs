//! This is the object model for the operations the gateway receives and the
//! sub-queries it sends downstream.
//!
//! Operations are already parsed and validated when they reach the gateway, so the model only
//! keeps what decomposition and result conversion need: names, aliases, arguments, nested
//! selections and the field ids that tie result nodes back to the selections they satisfy.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// The kind of an operation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    /// A query.
    Query,

    /// A mutation.
    Mutation,

    /// A subscription.
    Subscription,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Query => write!(f, "query"),
            OperationKind::Mutation => write!(f, "mutation"),
            OperationKind::Subscription => write!(f, "subscription"),
        }
    }
}

/// A parsed operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// The operation kind.
    pub kind: OperationKind,

    /// The optional operation name.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,

    /// The root selections.
    pub selections: Vec<Selection>,
}

impl Operation {
    /// Create an anonymous operation.
    pub fn new(kind: OperationKind, selections: Vec<Selection>) -> Self {
        Operation {
            kind,
            name: None,
            selections,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(name) = &self.name {
            write!(f, " {name}")?;
        }
        write!(f, " ")?;
        write_selections(f, &self.selections)
    }
}

/// A selection, either a field or an inline fragment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", tag = "kind")]
pub enum Selection {
    /// A field selection.
    Field(Field),

    /// An inline fragment selection.
    InlineFragment(InlineFragment),
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Field(field) => field.fmt(f),
            Selection::InlineFragment(fragment) => fragment.fmt(f),
        }
    }
}

/// A field selection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    /// An optional alias for the field.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub alias: Option<String>,

    /// The name of the field.
    pub name: String,

    /// The arguments of the field.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub arguments: Vec<Argument>,

    /// The selections for the field.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub selections: Option<Vec<Selection>>,

    /// Ids of the query selections this field stands for.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub ids: Vec<String>,
}

impl Field {
    /// A leaf field without alias or arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Field {
            alias: None,
            name: name.into(),
            arguments: Vec::new(),
            selections: None,
            ids: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.push(Argument {
            name: name.into(),
            value,
        });
        self
    }

    pub fn with_selections(mut self, selections: Vec<Selection>) -> Self {
        self.selections = Some(selections);
        self
    }

    pub fn with_ids(mut self, ids: Vec<String>) -> Self {
        self.ids = ids;
        self
    }

    /// The key this field is found under in a response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(self.name.as_str())
    }
}

impl From<Field> for Selection {
    fn from(field: Field) -> Self {
        Selection::Field(field)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(alias) = &self.alias {
            write!(f, "{alias}: ")?;
        }
        write!(f, "{}", self.name)?;
        if !self.arguments.is_empty() {
            write!(f, "(")?;
            for (index, argument) in self.arguments.iter().enumerate() {
                if index > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: ", argument.name)?;
                write_value(f, &argument.value)?;
            }
            write!(f, ")")?;
        }
        if let Some(selections) = &self.selections {
            write!(f, " ")?;
            write_selections(f, selections)?;
        }
        Ok(())
    }
}

/// An inline fragment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineFragment {
    /// The required fragment type.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub type_condition: Option<String>,

    /// The selections from the fragment.
    pub selections: Vec<Selection>,
}

impl fmt::Display for InlineFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "...")?;
        if let Some(type_condition) = &self.type_condition {
            write!(f, " on {type_condition}")?;
        }
        write!(f, " ")?;
        write_selections(f, &self.selections)
    }
}

/// A literal argument.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Argument {
    /// The argument name.
    pub name: String,

    /// The argument value.
    pub value: Value,
}

fn write_selections(f: &mut fmt::Formatter<'_>, selections: &[Selection]) -> fmt::Result {
    write!(f, "{{")?;
    for selection in selections {
        write!(f, " {selection}")?;
    }
    write!(f, " }}")
}

// JSON string escapes are a subset of GraphQL string escapes, so strings are written as JSON.
fn write_value(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Null => write!(f, "null"),
        Value::Bool(b) => write!(f, "{b}"),
        Value::Number(n) => write!(f, "{n}"),
        Value::String(s) => write!(f, "{}", Value::String(s.clone())),
        Value::Array(values) => {
            write!(f, "[")?;
            for (index, value) in values.iter().enumerate() {
                if index > 0 {
                    write!(f, ", ")?;
                }
                write_value(f, value)?;
            }
            write!(f, "]")
        }
        Value::Object(object) => {
            write!(f, "{{")?;
            for (index, (key, value)) in object.iter().enumerate() {
                if index > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}: ")?;
                write_value(f, value)?;
            }
            write!(f, "}}")
        }
    }
}
