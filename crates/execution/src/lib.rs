//! Executes stitched queries against the downstream services.
//!
//! Root fields are decomposed per owning service, the responses are converted into an immutable
//! result tree, and hydrated fields are resolved round by round by splicing the subtrees fetched
//! from other services back into that tree.

/// Conversion of downstream data into result nodes and of result nodes into responses.
pub mod convert;

/// Decomposition of client selections into downstream selections.
pub mod decompose;

/// The query execution engine.
pub mod engine;

/// Error types.
pub mod error;

/// Resolution of hydrated fields.
pub mod hydration;

/// Execution input.
pub mod input;

/// Paths into result trees.
pub mod path;

/// The result node model.
pub mod result;

/// Execution step metadata.
pub mod step_info;

/// Scanning and grouping of result nodes.
pub mod strategy;

/// Field transformations.
pub mod transformation;

/// Cursors over immutable trees.
pub mod zipper;

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
#[cfg(any(test, feature = "mocks"))]
use mockall::automock;
use query_model::Operation;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

pub use convert::*;
pub use decompose::*;
pub use engine::*;
pub use error::*;
pub use hydration::*;
pub use input::*;
pub use path::*;
pub use result::*;
pub use step_info::*;
pub use strategy::*;
pub use transformation::*;
pub use zipper::*;

/// A json object
pub type Object = Map<String, Value>;

/// Extensions is an untyped map that can be used to pass extra data to requests and from responses.
pub type Extensions = Option<Object>;

/// A GraphQL error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLError {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    path: Option<ResultPath>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    extensions: Extensions,
}

impl GraphQLError {
    pub fn new(message: impl Into<String>, path: Option<ResultPath>) -> Self {
        GraphQLError {
            message: message.into(),
            path,
            extensions: None,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn path(&self) -> Option<&ResultPath> {
        self.path.as_ref()
    }

    pub fn extensions(&self) -> Option<&Object> {
        self.extensions.as_ref()
    }

    /// The same error at another path.
    pub fn with_path(mut self, path: ResultPath) -> Self {
        self.path = Some(path);
        self
    }
}

/// A request to a downstream service.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    /// The query text.
    pub query: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub operation_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub variables: Option<Object>,

    /// The context of the execution this request belongs to.
    #[serde(skip)]
    pub context: Context,
}

impl ServiceRequest {
    /// A request running `operation`.
    pub fn new(operation: &Operation, context: Context) -> Self {
        ServiceRequest {
            query: operation.to_string(),
            operation_name: operation.name.clone(),
            variables: None,
            context,
        }
    }

    pub fn with_variables(mut self, variables: Option<Object>) -> Self {
        self.variables = variables;
        self
    }
}

/// A response from a downstream service.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResponse {
    #[serde(default)]
    pub data: Option<Object>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<GraphQLError>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub extensions: Extensions,
}

/// The response sent back to the client: partial data plus per path errors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub data: Value,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<GraphQLError>,
}

/// Sends requests to one downstream service.
/// Transports are plugged in behind this trait; the engine never performs network calls itself.
#[cfg_attr(any(test, feature = "mocks"), automock)]
pub trait ServiceExecution: Send + Sync {
    /// Execute a request and return the service response.
    fn execute(&self, request: ServiceRequest) -> BoxFuture<'static, Result<ServiceResponse, FetchError>>;
}

/// Maintains a map of services to executions.
pub trait ServiceRegistry: Send + Sync {
    /// Get the execution for a service.
    fn get(&self, service: &str) -> Option<Arc<dyn ServiceExecution>>;
}

impl ServiceRegistry for HashMap<String, Arc<dyn ServiceExecution>> {
    fn get(&self, service: &str) -> Option<Arc<dyn ServiceExecution>> {
        HashMap::get(self, service).cloned()
    }
}
