use std::sync::Arc;

use configuration::Configuration;
use derivative::Derivative;
use futures::future;
use futures::future::join_all;
use futures::FutureExt;
use indexmap::IndexMap;
use query_model::Field;
use query_model::Operation;
use query_model::Schema;
use query_model::Selection;
use tracing::debug;
use tracing::info_span;
use tracing::warn;
use tracing_futures::Instrument;

use crate::collect_fields;
use crate::decompose;
use crate::root_step_info;
use crate::CollectedFields;
use crate::Decomposition;
use crate::ExecutionError;
use crate::ExecutionInput;
use crate::ExecutionStepInfo;
use crate::FetchError;
use crate::GraphQLError;
use crate::HydrationResolver;
use crate::Response;
use crate::ResultBuilder;
use crate::ResultNode;
use crate::ResultNodeData;
use crate::ResultNodeKind;
use crate::ServiceExecution;
use crate::ServiceRegistry;
use crate::ServiceRequest;
use crate::ServiceResponse;

/// Executes operations against the services owning their root fields.
///
/// Root fields are grouped by owning service and every group is fetched concurrently. The
/// responses are merged into one result tree, whose hydrated fields are then resolved.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct Engine {
    schema: Arc<Schema>,
    configuration: Arc<Configuration>,
    #[derivative(Debug = "ignore")]
    services: Arc<dyn ServiceRegistry>,
}

/// The root fields owned by one service.
struct ServiceGroup {
    service_name: Option<String>,
    decomposition: Decomposition,
}

impl Engine {
    pub fn new(
        schema: Arc<Schema>,
        configuration: Arc<Configuration>,
        services: Arc<dyn ServiceRegistry>,
    ) -> Self {
        Engine {
            schema,
            configuration,
            services,
        }
    }

    /// Execute `operation` and return the client response.
    ///
    /// Failures of single fields or services are reported as errors in the response. An error is
    /// returned only when the operation cannot be executed at all.
    pub async fn execute(
        &self,
        input: ExecutionInput,
        operation: &Operation,
    ) -> Result<Response, ExecutionError> {
        let span = info_span!(
            "execute",
            execution_id = input.execution_id.as_deref().unwrap_or_default()
        );
        self.run(input, operation).instrument(span).await
    }

    async fn run(
        &self,
        input: ExecutionInput,
        operation: &Operation,
    ) -> Result<Response, ExecutionError> {
        let root = root_step_info(&self.schema, operation.kind)?;
        let mut root_fields = CollectedFields::new();
        collect_fields(&operation.selections, root.object_type(), None, &mut root_fields);

        let mut selections_by_service: IndexMap<Option<String>, Vec<Selection>> = IndexMap::new();
        for fields in root_fields.values() {
            for (_, field) in fields {
                let service_name = self
                    .schema
                    .field_definition(root.object_type(), &field.name)
                    .ok()
                    .and_then(|definition| definition.service.clone());
                selections_by_service
                    .entry(service_name)
                    .or_default()
                    .push(Selection::Field((*field).clone()));
            }
        }

        let groups: Vec<ServiceGroup> = selections_by_service
            .into_iter()
            .map(|(service_name, selections)| ServiceGroup {
                decomposition: decompose(
                    &selections,
                    &root,
                    &self.schema,
                    &self.configuration,
                    &input.context,
                ),
                service_name,
            })
            .collect();
        debug!(services = groups.len(), "fetching root fields");

        let fetches = groups.iter().map(|group| {
            let service = match self.service(group) {
                Ok(service) => service,
                Err(error) => return future::ready(Err(error)).boxed(),
            };
            let request = ServiceRequest::new(
                &Operation {
                    kind: operation.kind,
                    name: input.operation_name.clone(),
                    selections: group.decomposition.selections.clone(),
                },
                group.decomposition.context.clone(),
            )
            .with_variables(input.variables.clone());
            let span = info_span!(
                "root_fetch",
                service = group.service_name.as_deref().unwrap_or_default()
            );
            service.execute(request).instrument(span).boxed()
        });
        let responses = join_all(fetches).await;

        let mut nodes = IndexMap::new();
        let mut errors = Vec::new();
        for (group, response) in groups.iter().zip(responses) {
            let built = match response {
                Ok(response) => self.build(group, response, &root, &mut errors),
                Err(error) => {
                    warn!(service = ?group.service_name, %error, "root fetch failed");
                    self.failed(group, &error, &root)
                }
            };
            nodes.extend(built);
        }
        let children = root_fields
            .keys()
            .filter_map(|key| nodes.swap_remove(key))
            .collect();

        let hydrated = HydrationResolver::new(
            &self.schema,
            &self.configuration,
            self.services.as_ref(),
            &input.context,
        )
        .resolve(ResultNode::root(children))
        .await?;

        let mut response = hydrated.root.to_response();
        response.errors.extend(errors);
        response.errors.extend(hydrated.errors);
        debug!(errors = response.errors.len(), "execution done");
        Ok(response)
    }

    fn service(&self, group: &ServiceGroup) -> Result<Arc<dyn ServiceExecution>, FetchError> {
        match &group.service_name {
            Some(service) => self
                .services
                .get(service)
                .ok_or_else(|| FetchError::UnknownService {
                    service: service.clone(),
                }),
            None => Err(FetchError::NoOwningService {
                field_name: client_fields(&group.decomposition)
                    .first()
                    .map(|field| field.name.clone())
                    .unwrap_or_default(),
            }),
        }
    }

    /// The root nodes of a group whose service answered.
    fn build(
        &self,
        group: &ServiceGroup,
        response: ServiceResponse,
        root: &ExecutionStepInfo,
        errors: &mut Vec<GraphQLError>,
    ) -> Vec<(String, ResultNode)> {
        let data = response.data.unwrap_or_default();
        let mut builder = ResultBuilder::new(
            &self.schema,
            &group.decomposition.transformations,
            response.errors,
        );
        let nodes = builder.build_result_nodes(&group.decomposition.client_selections, &data, root);
        errors.extend(builder.into_unplaced_errors());
        nodes
            .into_iter()
            .map(|node| (node.response_key().unwrap_or_default().to_string(), node))
            .collect()
    }

    /// The root nodes of a group that could not be fetched, one error node per response key.
    fn failed(
        &self,
        group: &ServiceGroup,
        error: &FetchError,
        root: &ExecutionStepInfo,
    ) -> Vec<(String, ResultNode)> {
        let mut fields = CollectedFields::new();
        collect_fields(
            &group.decomposition.client_selections,
            root.object_type(),
            None,
            &mut fields,
        );
        fields
            .iter()
            .filter_map(|(key, fields)| {
                let (_, field) = fields.first()?;
                let path = root.path().key(key.clone());
                let definition = self.schema.field_definition(root.object_type(), &field.name);
                let error = match error {
                    FetchError::NoOwningService { .. } => match &definition {
                        Err(schema_error) => GraphQLError::from_error(schema_error, &path),
                        Ok(_) => GraphQLError::from_error(
                            &FetchError::NoOwningService {
                                field_name: field.name.clone(),
                            },
                            &path,
                        ),
                    },
                    error => GraphQLError::from_error(error, &path),
                };
                let node = ResultNodeData {
                    field_ids: fields.iter().flat_map(|(_, field)| field.ids.clone()).collect(),
                    result_path: path,
                    alias: field.alias.clone(),
                    object_type: Some(root.object_type().to_string()),
                    field_definition: definition.ok(),
                    kind: ResultNodeKind::Error {
                        errors: vec![error],
                    },
                };
                Some((key.clone(), ResultNode::from(node)))
            })
            .collect()
    }
}

fn client_fields(decomposition: &Decomposition) -> Vec<&Field> {
    decomposition
        .client_selections
        .iter()
        .filter_map(|selection| match selection {
            Selection::Field(field) => Some(field),
            Selection::InlineFragment(_) => None,
        })
        .collect()
}
