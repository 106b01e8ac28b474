use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use derivative::Derivative;
use typed_builder::TypedBuilder;

use crate::Object;

/// Values shared by everything running on behalf of one execution.
/// Downstream requests carry the context of the execution they belong to.
#[derive(Clone, Default, Derivative)]
#[derivative(Debug)]
pub struct Context {
    #[derivative(Debug = "ignore")]
    content: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Context {
    pub fn get<T: 'static>(&self, name: &str) -> Option<&T> {
        self.content.get(name).and_then(|value| value.downcast_ref())
    }

    pub fn insert<T: Send + Sync + 'static>(
        &mut self,
        name: &str,
        value: T,
    ) -> Option<Arc<dyn Any + Send + Sync>> {
        self.content.insert(name.to_string(), Arc::new(value))
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// What a client submitted for one execution.
///
/// The query is parsed and validated before it reaches the engine; the text is kept for tracing.
/// A context is always present: an empty one is used when the caller does not supply any.
#[derive(Clone, Derivative, TypedBuilder)]
#[derivative(Debug)]
pub struct ExecutionInput {
    /// The query text.
    #[builder(setter(into))]
    pub query: String,

    #[builder(default, setter(strip_option, into))]
    pub operation_name: Option<String>,

    /// Variable bindings, forwarded to the downstream services.
    #[derivative(Debug = "ignore")]
    #[builder(default)]
    pub variables: Option<Object>,

    #[builder(default)]
    pub context: Context,

    /// An id used to correlate the logs of one execution.
    #[builder(default, setter(strip_option, into))]
    pub execution_id: Option<String>,
}
