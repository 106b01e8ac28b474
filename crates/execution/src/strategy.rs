//! Helpers shared by the execution strategies: locating hydration inputs, batching them, and
//! stamping field information onto nodes built during a hydration.

use std::cmp::Ordering;
use std::collections::HashSet;

use indexmap::IndexMap;
use query_model::OperationKind;
use query_model::Schema;
use query_model::SchemaError;

use crate::compare_zippers;
use crate::ExecutionStepInfo;
use crate::NodeMultiZipper;
use crate::NodeZipper;
use crate::ResultNode;
use crate::ResultNodeData;
use crate::ResultNodeKind;
use crate::ResultPath;
use crate::ZipperError;

/// The step info an operation starts from: its root type at the root path.
pub fn root_step_info(
    schema: &Schema,
    operation_kind: OperationKind,
) -> Result<ExecutionStepInfo, SchemaError> {
    let root_type = schema.root_type(operation_kind)?;
    Ok(ExecutionStepInfo::builder()
        .object_type(root_type.name.clone())
        .build())
}

/// Partition `nodes` by the field ids of their current node.
///
/// One multi-zipper anchored at `root` is returned per group, in order of first encounter.
pub fn group_nodes_into_batches_by_field(
    nodes: Vec<NodeZipper<ResultNode>>,
    root: &ResultNode,
) -> Result<Vec<NodeMultiZipper<ResultNode>>, ZipperError> {
    let mut groups: IndexMap<Vec<String>, Vec<NodeZipper<ResultNode>>> = IndexMap::new();
    for zipper in nodes {
        groups
            .entry(zipper.current().field_ids().to_vec())
            .or_default()
            .push(zipper);
    }
    groups
        .into_values()
        .map(|zippers| NodeMultiZipper::new(root.clone(), zippers))
        .collect()
}

/// Every hydration input reachable from `root` without crossing the boundary.
///
/// A visited hydration input is recorded. Children of a node are visited only when the node's
/// path belongs to `boundary_paths`; the root itself is always visited.
pub fn get_hydration_input_nodes(
    root: &ResultNode,
    boundary_paths: &HashSet<ResultPath>,
) -> Result<Vec<NodeZipper<ResultNode>>, ZipperError> {
    get_hydration_input_nodes_from(NodeZipper::root(root.clone()), boundary_paths)
}

/// Like [`get_hydration_input_nodes`], starting from the node a zipper points at.
/// The returned zippers keep the breadcrumbs of `start`.
pub fn get_hydration_input_nodes_from(
    start: NodeZipper<ResultNode>,
    boundary_paths: &HashSet<ResultPath>,
) -> Result<Vec<NodeZipper<ResultNode>>, ZipperError> {
    let mut found = Vec::new();
    let mut stack = vec![start];
    while let Some(zipper) = stack.pop() {
        let node = zipper.current();
        if node.is_hydration_input() {
            found.push(zipper);
            continue;
        }
        if !boundary_paths.contains(node.result_path()) {
            continue;
        }
        for index in (0..node.children().len()).rev() {
            stack.extend(zipper.child(index));
        }
    }
    sort_zippers(found)
}

/// Merge ordered sequences collected by independent traversals of one tree.
///
/// Positions found by several traversals are kept once.
pub fn merge_hydration_input_nodes(
    sequences: impl IntoIterator<Item = Vec<NodeZipper<ResultNode>>>,
) -> Result<Vec<NodeZipper<ResultNode>>, ZipperError> {
    sort_zippers(sequences.into_iter().flatten().collect())
}

fn sort_zippers(
    mut zippers: Vec<NodeZipper<ResultNode>>,
) -> Result<Vec<NodeZipper<ResultNode>>, ZipperError> {
    let mut failure = None;
    zippers.sort_by(|left, right| {
        compare_zippers(left, right).unwrap_or_else(|error| {
            failure.get_or_insert(error);
            Ordering::Equal
        })
    });
    if let Some(error) = failure {
        return Err(error);
    }
    let mut sorted: Vec<NodeZipper<ResultNode>> = Vec::with_capacity(zippers.len());
    for zipper in zippers {
        if let Some(last) = sorted.last() {
            if compare_zippers(last, &zipper)? == Ordering::Equal {
                continue;
            }
        }
        sorted.push(zipper);
    }
    Ok(sorted)
}

/// `to` with the path, field ids, alias, object type and field definition of `from`.
pub fn copy_field_information(from: &ResultNode, to: &ResultNode) -> ResultNode {
    to.transform(|data| {
        data.result_path = from.result_path().clone();
        data.field_ids = from.field_ids().to_vec();
        data.alias = from.alias().map(str::to_string);
        data.object_type = from.object_type().map(str::to_string);
        data.field_definition = from.field_definition().cloned();
    })
}

/// An empty object node stamped with the field information of `step_info`.
pub fn copy_type_information(step_info: &ExecutionStepInfo) -> ResultNode {
    ResultNodeData {
        field_ids: step_info.field_ids().to_vec(),
        result_path: step_info.path().clone(),
        alias: step_info.field().and_then(|field| field.alias.clone()),
        object_type: step_info.field_container().map(str::to_string),
        field_definition: step_info.field_definition().cloned(),
        kind: ResultNodeKind::Object {
            children: Vec::new(),
        },
    }
    .into()
}

pub fn change_field_ids_in_result_node(node: &ResultNode, field_ids: Vec<String>) -> ResultNode {
    node.transform(|data| data.field_ids = field_ids)
}

pub fn change_field_id_in_result_node(node: &ResultNode, field_id: impl Into<String>) -> ResultNode {
    change_field_ids_in_result_node(node, vec![field_id.into()])
}
