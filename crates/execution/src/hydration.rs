//! Resolution of hydrated fields.
//!
//! Hydration runs in rounds. Each round scans the parts of the tree populated by the previous
//! round for hydration inputs, batches them by field, sends one query per batch to the service
//! named by the hydration, and splices the fetched subtrees back at the positions of the inputs.
//! Subtrees fetched in one round may contain hydration inputs of their own; they are resolved in
//! the next round.

use std::collections::HashSet;
use std::sync::Arc;

use configuration::Configuration;
use futures::stream;
use futures::StreamExt;
use query_model::Field;
use query_model::Operation;
use query_model::OperationKind;
use query_model::Schema;
use serde_json::Value;
use tracing::debug;
use tracing::info_span;
use tracing::trace;
use tracing::warn;
use tracing_futures::Instrument;

use crate::copy_field_information;
use crate::decompose;
use crate::get_hydration_input_nodes;
use crate::get_hydration_input_nodes_from;
use crate::group_nodes_into_batches_by_field;
use crate::merge_hydration_input_nodes;
use crate::Context;
use crate::Decomposition;
use crate::ExecutionStepInfo;
use crate::FetchError;
use crate::GraphQLError;
use crate::HydrationError;
use crate::NodeMultiZipper;
use crate::NodeZipper;
use crate::PathElement;
use crate::ResultBuilder;
use crate::ResultNode;
use crate::ResultNodeKind;
use crate::ResultPath;
use crate::ServiceExecution;
use crate::ServiceRegistry;
use crate::ServiceRequest;
use crate::ServiceResponse;
use crate::TransformationError;
use crate::ZipperError;

const HYDRATION_ALIAS_PREFIX: &str = "hydration__";

/// A tree with every hydration resolved, or replaced by an error node.
#[derive(Clone, Debug, PartialEq)]
pub struct Hydrated {
    pub root: ResultNode,

    /// Errors reported by the services that could not be placed on a node.
    pub errors: Vec<GraphQLError>,
}

/// Resolves the hydration inputs of a result tree.
pub struct HydrationResolver<'a> {
    schema: &'a Schema,
    configuration: &'a Configuration,
    services: &'a dyn ServiceRegistry,
    context: &'a Context,
}

struct PreparedBatch {
    service_name: String,
    service: Arc<dyn ServiceExecution>,
    decomposition: Decomposition,
    client_field: Field,
    step_info: ExecutionStepInfo,
}

type BatchOutcome = Result<(PreparedBatch, ServiceResponse), HydrationError>;

impl<'a> HydrationResolver<'a> {
    pub fn new(
        schema: &'a Schema,
        configuration: &'a Configuration,
        services: &'a dyn ServiceRegistry,
        context: &'a Context,
    ) -> Self {
        HydrationResolver {
            schema,
            configuration,
            services,
            context,
        }
    }

    /// Resolve every hydration input of `root`.
    ///
    /// Inputs still present after the configured number of rounds become error nodes.
    pub async fn resolve(&self, root: ResultNode) -> Result<Hydrated, ZipperError> {
        let hints = &self.configuration.hints;
        let mut root = root;
        let mut errors = Vec::new();
        let mut boundary = HashSet::new();
        populated_paths(&root, &mut boundary);

        for round in 0..hints.max_hydration_depth {
            let nodes = scan(&root, &boundary)?;
            if nodes.is_empty() {
                return Ok(Hydrated { root, errors });
            }
            let batches = group_nodes_into_batches_by_field(nodes, &root)?;
            debug!(round, batches = batches.len(), "hydrating");

            let fetches = batches
                .into_iter()
                .enumerate()
                .map(|(index, batch)| self.fetch(index, batch));
            let outcomes: Vec<_> = stream::iter(fetches)
                .buffered(hints.hydration_concurrency.max(1))
                .collect()
                .await;

            boundary = HashSet::new();
            for (batch, outcome) in outcomes {
                root = self.splice(&root, &batch, outcome, &mut boundary, &mut errors)?;
            }
        }

        let remaining = scan(&root, &boundary)?;
        if !remaining.is_empty() {
            warn!(
                nodes = remaining.len(),
                max_depth = hints.max_hydration_depth,
                "hydration depth exceeded"
            );
            let error = HydrationError::MaxDepthExceeded {
                max_depth: hints.max_hydration_depth,
            };
            root = NodeMultiZipper::new(root, remaining)?
                .map_nodes(|zipper| error_node(zipper.current(), &error))
                .to_root_node()?;
        }
        Ok(Hydrated { root, errors })
    }

    async fn fetch(
        &self,
        index: usize,
        batch: NodeMultiZipper<ResultNode>,
    ) -> (NodeMultiZipper<ResultNode>, BatchOutcome) {
        let (prepared, request) = match self.prepare(&batch) {
            Ok(prepared) => prepared,
            Err(error) => return (batch, Err(error)),
        };
        trace!(query = %request.query, "hydration query");
        let span = info_span!(
            "hydration_fetch",
            batch = index,
            service = %prepared.service_name,
            nodes = batch.size()
        );
        let outcome = match prepared.service.execute(request).instrument(span).await {
            Ok(response) => Ok((prepared, response)),
            Err(error) => Err(error.into()),
        };
        (batch, outcome)
    }

    /// Build the query of a batch: one aliased top level field per node.
    fn prepare(
        &self,
        batch: &NodeMultiZipper<ResultNode>,
    ) -> Result<(PreparedBatch, ServiceRequest), HydrationError> {
        let (first, input) = batch
            .zippers()
            .first()
            .map(NodeZipper::current)
            .and_then(|node| Some((node, node.hydration_input()?)))
            .ok_or_else(|| TransformationError::UnsupportedHydrationShape {
                field_name: String::new(),
                reason: "batch holds no hydration input".into(),
            })?;
        let hydration = &input.hydration;
        let argument = hydration.arguments.first().ok_or_else(|| {
            TransformationError::UnsupportedHydrationShape {
                field_name: input.original_field.name.clone(),
                reason: "no argument".into(),
            }
        })?;
        let service = self
            .services
            .get(&hydration.service_name)
            .ok_or_else(|| FetchError::UnknownService {
                service: hydration.service_name.clone(),
            })?;

        let query_type = self
            .schema
            .root_type(OperationKind::Query)
            .map_err(TransformationError::from)?;
        let definition = self
            .schema
            .field_definition(&query_type.name, &hydration.top_level_field)
            .map_err(TransformationError::from)?;
        let step_info = ExecutionStepInfo::builder()
            .object_type(definition.ty.inner_type_name())
            .field_container(first.object_type().unwrap_or(query_type.name.as_str()))
            .field_definition(definition.clone())
            .field(input.original_field.clone())
            .path(first.result_path().clone())
            .build();

        let decomposition = decompose(
            input.original_field.selections.as_deref().unwrap_or_default(),
            &step_info,
            self.schema,
            self.configuration,
            self.context,
        );
        let mut client_field = input.original_field.clone();
        if client_field.selections.is_some() {
            client_field.selections = Some(decomposition.client_selections.clone());
        }

        let fields = batch
            .zippers()
            .iter()
            .enumerate()
            .map(|(index, zipper)| {
                let value = zipper
                    .current()
                    .hydration_input()
                    .map(|input| input.value.clone())
                    .unwrap_or(Value::Null);
                let mut field = Field::new(hydration.top_level_field.clone())
                    .with_alias(hydration_alias(index))
                    .with_argument(argument.name.clone(), value);
                if input.original_field.selections.is_some() {
                    field = field.with_selections(decomposition.selections.clone());
                }
                field.into()
            })
            .collect();
        let request = ServiceRequest::new(
            &Operation::new(OperationKind::Query, fields),
            decomposition.context.clone(),
        );

        let prepared = PreparedBatch {
            service_name: hydration.service_name.clone(),
            service,
            decomposition,
            client_field,
            step_info,
        };
        Ok((prepared, request))
    }

    /// Replace the nodes of a batch in `root` with what was fetched for them.
    fn splice(
        &self,
        root: &ResultNode,
        batch: &NodeMultiZipper<ResultNode>,
        outcome: BatchOutcome,
        boundary: &mut HashSet<ResultPath>,
        errors: &mut Vec<GraphQLError>,
    ) -> Result<ResultNode, ZipperError> {
        let edited = match outcome {
            Err(error) => {
                warn!(nodes = batch.size(), %error, "hydration batch failed");
                batch.map_nodes(|zipper| error_node(zipper.current(), &error))
            }
            Ok((prepared, response)) => {
                let data = response.data.unwrap_or_default();
                let (placed, unplaced) = reroot_errors(response.errors, batch);
                errors.extend(unplaced);
                let mut builder =
                    ResultBuilder::new(self.schema, &prepared.decomposition.transformations, placed);
                let mut index = 0;
                let edited = batch.map_nodes(|zipper| {
                    let node = zipper.current();
                    let value = data.get(&hydration_alias(index)).unwrap_or(&Value::Null);
                    index += 1;
                    let step_info = prepared.step_info.with_path(node.result_path().clone());
                    let fetched = builder.build_value(value, &prepared.client_field, &step_info);
                    let fetched = copy_field_information(node, &fetched);
                    populated_paths(&fetched, boundary);
                    fetched
                });
                errors.extend(builder.into_unplaced_errors());
                for zipper in edited.zippers() {
                    let mut path = zipper.current().result_path().parent();
                    while let Some(ancestor) = path {
                        path = ancestor.parent();
                        boundary.insert(ancestor);
                    }
                }
                edited
            }
        };
        // zippers of later batches are anchored at an older root; only their positions are used
        NodeMultiZipper::new(root.clone(), edited.zippers().to_vec())?.to_root_node()
    }
}

fn hydration_alias(index: usize) -> String {
    format!("{HYDRATION_ALIAS_PREFIX}{index}")
}

fn error_node(node: &ResultNode, error: &impl std::error::Error) -> ResultNode {
    ResultNode::error_from(node, vec![GraphQLError::from_error(error, node.result_path())])
}

/// Move the errors reported under a hydration alias to the path of its node.
fn reroot_errors(
    errors: Vec<GraphQLError>,
    batch: &NodeMultiZipper<ResultNode>,
) -> (Vec<GraphQLError>, Vec<GraphQLError>) {
    let mut placed = Vec::new();
    let mut unplaced = Vec::new();
    for error in errors {
        let node_path = error
            .path()
            .and_then(|path| match path.iter().next() {
                Some(PathElement::Key(key)) => key.strip_prefix(HYDRATION_ALIAS_PREFIX),
                _ => None,
            })
            .and_then(|index| index.parse::<usize>().ok())
            .and_then(|index| batch.zippers().get(index))
            .map(|zipper| zipper.current().result_path());
        let rerooted = node_path.zip(error.path()).map(|(node_path, path)| {
            let relative: ResultPath = path.iter().skip(1).cloned().collect::<Vec<_>>().into();
            node_path.join(&relative)
        });
        match rerooted {
            Some(path) => placed.push(error.with_path(path)),
            None => unplaced.push(error),
        }
    }
    (placed, unplaced)
}

/// Every hydration input inside the boundary, one traversal per child of the root.
fn scan(
    root: &ResultNode,
    boundary: &HashSet<ResultPath>,
) -> Result<Vec<NodeZipper<ResultNode>>, ZipperError> {
    if root.is_hydration_input() || !boundary.contains(root.result_path()) {
        return get_hydration_input_nodes(root, boundary);
    }
    let root_zipper = NodeZipper::root(root.clone());
    let sequences = (0..root.children().len())
        .filter_map(|index| root_zipper.child(index))
        .map(|child| get_hydration_input_nodes_from(child, boundary))
        .collect::<Result<Vec<_>, _>>()?;
    merge_hydration_input_nodes(sequences)
}

/// The paths of the objects and lists of `node`.
fn populated_paths(node: &ResultNode, paths: &mut HashSet<ResultPath>) {
    match node.kind() {
        ResultNodeKind::Object { children } | ResultNodeKind::List { children } => {
            paths.insert(node.result_path().clone());
            for child in children {
                populated_paths(child, paths);
            }
        }
        ResultNodeKind::Leaf { .. }
        | ResultNodeKind::HydrationInput(_)
        | ResultNodeKind::Error { .. } => {}
    }
}
