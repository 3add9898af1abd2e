use std::fmt;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::*;

/// Structural problems that prevent a graph from being written as a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SerializeError {
    #[error("node branches into multiple paths")]
    Branching,
    #[error("multiple paths lead into one node")]
    Converging,
    #[error("no start node found")]
    NoStartNode,
    #[error("multiple start nodes found")]
    MultipleStartNodes,
}

/// Non-fatal findings attached to a successfully written chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "objectIds", rename_all = "kebab-case")]
pub enum ChainWarning {
    DuplicateObjects(Vec<String>),
    EmptyGroup,
}

impl fmt::Display for ChainWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainWarning::DuplicateObjects(ids) => {
                let quoted = ids
                    .iter()
                    .map(|id| format!("'{id}'"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "the following objects are used two or more times: {quoted}")
            }
            ChainWarning::EmptyGroup => f.write_str("the path contains an empty group"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainString {
    pub text: String,
    /// Every object reference placed in the chain, in first-use order.
    pub used_object_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SerializeError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ChainWarning>,
}

impl ChainString {
    fn failed(graph: &ChainGraph, error: SerializeError) -> Self {
        let mut used = Vec::new();
        let mut seen = HashSet::new();
        for object_ref in graph.object_refs() {
            if seen.insert(object_ref) {
                used.push(object_ref.to_string());
            }
        }

        debug!(%error, "chain could not be serialized");
        Self {
            text: String::new(),
            used_object_ids: used,
            error: Some(error),
            warnings: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    /// The warning to show first; duplicates outrank empty groups.
    pub fn warning(&self) -> Option<String> {
        self.warnings.first().map(ChainWarning::to_string)
    }
}

#[derive(Default)]
struct UsageTracker {
    seen: HashSet<String>,
    used: Vec<String>,
    duplicates: Vec<String>,
}

impl UsageTracker {
    fn record(&mut self, object_ref: &str) {
        if self.seen.insert(object_ref.to_string()) {
            self.used.push(object_ref.to_string());
        } else if !self.duplicates.iter().any(|id| id == object_ref) {
            self.duplicates.push(object_ref.to_string());
        }
    }
}

/// Writes the graph as a chain string.
///
/// The graph must be a single simple path: every node has at most one
/// outgoing and one incoming edge, and exactly one top-level node has no
/// incoming edge. Group members are listed top to bottom.
#[instrument(level = "trace", skip(graph), fields(nodes = graph.nodes.len(), edges = graph.edges.len()))]
pub fn serialize(graph: &ChainGraph) -> ChainString {
    if graph.is_empty() {
        return ChainString::default();
    }

    let mut next: HashMap<&str, &str> = HashMap::new();
    for edge in &graph.edges {
        if next.insert(&edge.source, &edge.target).is_some() {
            return ChainString::failed(graph, SerializeError::Branching);
        }
    }

    let mut targeted = HashSet::new();
    for edge in &graph.edges {
        if !targeted.insert(edge.target.as_str()) {
            return ChainString::failed(graph, SerializeError::Converging);
        }
    }

    let mut start: Option<&str> = None;
    let mut members: HashMap<&str, Vec<&GraphNode>> = HashMap::new();
    for node in &graph.nodes {
        if let Some(parent) = node.parent() {
            members.entry(parent).or_default().push(node);
            continue;
        }
        if targeted.contains(node.id.as_str()) {
            continue;
        }
        if start.is_some() {
            return ChainString::failed(graph, SerializeError::MultipleStartNodes);
        }
        start = Some(node.id.as_str());
    }

    let Some(start) = start else {
        return ChainString::failed(graph, SerializeError::NoStartNode);
    };

    for group in members.values_mut() {
        group.sort_by(|a, b| a.position.y.total_cmp(&b.position.y));
    }

    let mut usage = UsageTracker::default();
    let mut has_empty_group = false;
    let mut steps = Vec::new();
    let mut current = Some(start);
    while let Some(node_id) = current {
        current = next.get(node_id).copied();
        let Some(node) = graph.node(node_id) else {
            continue;
        };

        match &node.kind {
            NodeKind::Step(step) => {
                usage.record(&step.object_ref);
                steps.push(step.object_ref.clone());
            }
            NodeKind::Group => {
                let refs: Vec<&str> = members
                    .get(node_id)
                    .map(|group| group.iter().filter_map(|member| member.object_ref()).collect())
                    .unwrap_or_default();
                if refs.is_empty() {
                    has_empty_group = true;
                }
                for object_ref in &refs {
                    usage.record(object_ref);
                }
                steps.push(format!(
                    "{GROUP_START}{}{GROUP_END}",
                    refs.join(GROUP_SEPARATOR.to_string().as_str())
                ));
            }
        }
    }

    let mut warnings = Vec::new();
    if !usage.duplicates.is_empty() {
        warnings.push(ChainWarning::DuplicateObjects(usage.duplicates));
    }
    if has_empty_group {
        warnings.push(ChainWarning::EmptyGroup);
    }

    ChainString {
        text: steps.join(EDGE_TOKEN),
        used_object_ids: usage.used,
        error: None,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, object_ref: &str) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            position: Point::ORIGIN,
            size: Size::new(65.0, 65.0),
            kind: NodeKind::Step(StepNode {
                object_ref: object_ref.to_string(),
                label: None,
                description: None,
                parent: None,
            }),
        }
    }

    fn member(id: &str, object_ref: &str, group: &str, y: f32) -> GraphNode {
        let mut node = step(id, object_ref);
        node.position = Point::new(32.0, y);
        if let NodeKind::Step(data) = &mut node.kind {
            data.parent = Some(group.to_string());
        }
        node
    }

    fn group(id: &str) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            position: Point::ORIGIN,
            size: Size::new(150.0, 150.0),
            kind: NodeKind::Group,
        }
    }

    fn edges(pairs: &[(&str, &str)]) -> Vec<GraphEdge> {
        pairs.iter().map(|(s, t)| GraphEdge::new(s, t)).collect()
    }

    #[test]
    fn empty_graph_is_empty_text() {
        let result = serialize(&ChainGraph::default());
        assert_eq!(result, ChainString::default());
        assert!(result.is_valid());
    }

    #[test]
    fn walks_linear_path_regardless_of_node_order() {
        let graph = ChainGraph::new(
            vec![step("c", "3"), step("a", "1"), step("b", "2")],
            edges(&[("b", "c"), ("a", "b")]),
        );
        let result = serialize(&graph);
        assert_eq!(result.text, "1>>2>>3");
        assert_eq!(result.used_object_ids, vec!["1", "2", "3"]);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn group_members_are_ordered_by_y() {
        let graph = ChainGraph::new(
            vec![
                group("g"),
                step("a", "1"),
                member("low", "low", "g", 200.0),
                member("high", "high", "g", 10.0),
                step("z", "9"),
            ],
            edges(&[("a", "g"), ("g", "z")]),
        );
        assert_eq!(serialize(&graph).text, "1>>[high,low]>>9");
    }

    #[test]
    fn branching_is_reported_before_convergence() {
        let graph = ChainGraph::new(
            vec![step("a", "a"), step("b", "b"), step("c", "c")],
            edges(&[("a", "b"), ("a", "c"), ("b", "c")]),
        );
        let result = serialize(&graph);
        assert_eq!(result.error, Some(SerializeError::Branching));
        assert_eq!(result.text, "");
        assert_eq!(result.used_object_ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn convergence_is_reported() {
        let graph = ChainGraph::new(
            vec![step("a", "a"), step("b", "b"), step("c", "c")],
            edges(&[("a", "c"), ("b", "c")]),
        );
        assert_eq!(serialize(&graph).error, Some(SerializeError::Converging));
    }

    #[test]
    fn cycle_has_no_start() {
        let graph = ChainGraph::new(
            vec![step("a", "a"), step("b", "b")],
            edges(&[("a", "b"), ("b", "a")]),
        );
        let result = serialize(&graph);
        assert_eq!(result.error, Some(SerializeError::NoStartNode));
        assert_eq!(
            result.error.map(|e| e.to_string()).as_deref(),
            Some("no start node found")
        );
    }

    #[test]
    fn disconnected_nodes_are_multiple_starts() {
        let graph = ChainGraph::new(vec![step("a", "a"), step("b", "b")], Vec::new());
        assert_eq!(
            serialize(&graph).error,
            Some(SerializeError::MultipleStartNodes)
        );
    }

    #[test]
    fn grouped_members_are_not_start_candidates() {
        let graph = ChainGraph::new(
            vec![group("g"), member("m", "1", "g", 16.0)],
            Vec::new(),
        );
        let result = serialize(&graph);
        assert_eq!(result.text, "[1]");
        assert!(result.is_valid());
    }

    #[test]
    fn empty_group_emits_brackets_and_warning() {
        let graph = ChainGraph::new(
            vec![group("g"), step("a", "1")],
            edges(&[("a", "g")]),
        );
        let result = serialize(&graph);
        assert_eq!(result.text, "1>>[]");
        assert_eq!(result.warnings, vec![ChainWarning::EmptyGroup]);
        assert_eq!(
            result.warning().as_deref(),
            Some("the path contains an empty group")
        );
    }

    #[test]
    fn duplicates_outrank_empty_group_warning() {
        let graph = ChainGraph::new(
            vec![group("g"), step("a", "1"), step("b", "1")],
            edges(&[("a", "g"), ("g", "b")]),
        );
        let result = serialize(&graph);
        assert_eq!(result.text, "1>>[]>>1");
        assert_eq!(
            result.warnings,
            vec![
                ChainWarning::DuplicateObjects(vec!["1".to_string()]),
                ChainWarning::EmptyGroup,
            ]
        );
        assert_eq!(
            result.warning().as_deref(),
            Some("the following objects are used two or more times: '1'")
        );
    }

    #[test]
    fn duplicates_inside_groups_are_counted() {
        let graph = ChainGraph::new(
            vec![group("g"), member("m1", "5", "g", 0.0), member("m2", "5", "g", 80.0)],
            Vec::new(),
        );
        let result = serialize(&graph);
        assert_eq!(result.text, "[5,5]");
        assert_eq!(result.used_object_ids, vec!["5"]);
        assert_eq!(
            result.warnings,
            vec![ChainWarning::DuplicateObjects(vec!["5".to_string()])]
        );
    }
}
