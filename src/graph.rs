use std::ops::{Add, Sub};

use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::layout::node_width;
use crate::*;

const GROUP_ID_PREFIX: &str = "___group";

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, other: Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, other: Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
}

impl Rect {
    pub fn from_origin(origin: Point, size: Size) -> Self {
        Rect {
            min_x: origin.x,
            max_x: origin.x + size.width,
            min_y: origin.y,
            max_y: origin.y + size.height,
        }
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }
}

/// Converts a position between coordinate spaces.
///
/// `from` and `to` are the absolute origins of the old and new parent; `None`
/// stands for the absolute (top-level) space. Every reparenting path goes
/// through here.
pub fn translate_position(position: Point, from: Option<Point>, to: Option<Point>) -> Point {
    let absolute = position + from.unwrap_or(Point::ORIGIN);
    absolute - to.unwrap_or(Point::ORIGIN)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepNode {
    pub object_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Owning group; `None` means top level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeKind {
    Step(StepNode),
    Group,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    /// Relative to the parent group if there is one, absolute otherwise.
    pub position: Point,
    pub size: Size,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl GraphNode {
    pub fn step(object: &CatalogObject, position: Point, size: Size, parent: Option<String>) -> Self {
        Self {
            id: format!("{}-{}", object.id, Uuid::new_v4().simple()),
            position,
            size,
            kind: NodeKind::Step(StepNode {
                object_ref: object.id.clone(),
                label: object.name.clone(),
                description: object.description.clone(),
                parent,
            }),
        }
    }

    pub fn group(position: Point, size: Size) -> Self {
        Self {
            id: format!("{GROUP_ID_PREFIX}-{}", Uuid::new_v4().simple()),
            position,
            size,
            kind: NodeKind::Group,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group)
    }

    pub fn as_step(&self) -> Option<&StepNode> {
        match &self.kind {
            NodeKind::Step(step) => Some(step),
            NodeKind::Group => None,
        }
    }

    pub fn object_ref(&self) -> Option<&str> {
        self.as_step().map(|step| step.object_ref.as_str())
    }

    pub fn parent(&self) -> Option<&str> {
        self.as_step().and_then(|step| step.parent.as_deref())
    }

    fn set_parent(&mut self, parent: Option<String>) {
        if let NodeKind::Step(step) = &mut self.kind {
            step.parent = parent;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
}

impl GraphEdge {
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            id: edge_identifier(source, target),
            source: source.to_string(),
            target: target.to_string(),
        }
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}

pub fn edge_identifier(source: &str, target: &str) -> String {
    format!("e{source}-{target}")
}

/// What the user dragged out of the palette.
#[derive(Debug, Clone, PartialEq)]
pub enum PaletteItem {
    Step(CatalogObject),
    Group,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("cannot connect objects: object \"{node_id}\" is inside a group")]
    GroupedEndpoint { node_id: String },
}

#[derive(Debug, Clone, PartialEq)]
struct DragState {
    node_id: String,
    initial_parent: Option<String>,
    hovered_group: Option<String>,
}

/// Result of finishing a drag gesture.
#[derive(Debug, Clone, PartialEq)]
pub struct DragOutcome {
    pub node_id: String,
    pub parent: Option<String>,
    pub removed_edges: usize,
}

/// The live, interactively edited chain graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    #[serde(skip)]
    drag: Option<DragState>,
}

impl PartialEq for ChainGraph {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes && self.edges == other.edges
    }
}

impl ChainGraph {
    pub fn new(nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) -> Self {
        Self {
            nodes,
            edges,
            drag: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    fn node_mut(&mut self, id: &str) -> Option<&mut GraphNode> {
        self.nodes.iter_mut().find(|node| node.id == id)
    }

    fn edge(&self, id: &str) -> Option<&GraphEdge> {
        self.edges.iter().find(|edge| edge.id == id)
    }

    /// Step nodes owned by `group_id`, in node order.
    pub fn members<'a>(&'a self, group_id: &'a str) -> impl Iterator<Item = &'a GraphNode> + 'a {
        self.nodes
            .iter()
            .filter(move |node| node.parent() == Some(group_id))
    }

    /// Object references of every step node, in node order.
    pub fn object_refs(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().filter_map(GraphNode::object_ref)
    }

    fn group_origin(&self, group_id: Option<&str>) -> Option<Point> {
        let group_id = group_id?;
        self.node(group_id)
            .filter(|node| node.is_group())
            .map(|node| node.position)
    }

    pub fn absolute_position(&self, node: &GraphNode) -> Point {
        translate_position(node.position, self.group_origin(node.parent()), None)
    }

    pub fn absolute_rect(&self, node: &GraphNode) -> Rect {
        Rect::from_origin(self.absolute_position(node), node.size)
    }

    /// First group, in node order, whose bounds intersect `rect`.
    pub fn group_at(&self, rect: &Rect) -> Option<&GraphNode> {
        self.nodes
            .iter()
            .filter(|node| node.is_group())
            .find(|group| self.absolute_rect(group).intersects(rect))
    }

    /// Drops a palette item at `at` (graph coordinates) and returns the new node id.
    ///
    /// Groups are inserted ahead of every other node; a step dropped onto a
    /// group becomes its member.
    pub fn add_from_palette(&mut self, item: PaletteItem, at: Point, layout: &LayoutConfig) -> String {
        match item {
            PaletteItem::Group => {
                let group = GraphNode::group(
                    at,
                    Size::new(layout.palette_group_width, layout.palette_group_height),
                );
                let id = group.id.clone();
                debug!(node = %id, x = at.x, y = at.y, "group dropped from palette");
                self.nodes.insert(0, group);
                id
            }
            PaletteItem::Step(object) => {
                let size = Size::new(node_width(&object, layout), layout.node_height);
                let mut node = GraphNode::step(&object, at, size, None);

                let dropped = Rect::from_origin(at, size);
                if let Some(group) = self.group_at(&dropped) {
                    node.position = translate_position(at, None, Some(group.position));
                    node.set_parent(Some(group.id.clone()));
                }

                let id = node.id.clone();
                debug!(node = %id, parent = ?node.parent(), "step dropped from palette");
                self.nodes.push(node);
                id
            }
        }
    }

    /// Connects two top-level nodes.
    ///
    /// Missing endpoints and already existing connections are ignored
    /// (`Ok(None)`); grouped endpoints are rejected.
    pub fn connect(&mut self, source: &str, target: &str) -> Result<Option<String>, ConnectError> {
        let (Some(source_node), Some(target_node)) = (self.node(source), self.node(target)) else {
            return Ok(None);
        };

        for node in [source_node, target_node] {
            if node.parent().is_some() {
                warn!(node = %node.id, "refusing to connect a grouped node");
                return Err(ConnectError::GroupedEndpoint {
                    node_id: node.id.clone(),
                });
            }
        }

        let edge = GraphEdge::new(source, target);
        if self.edge(&edge.id).is_some() {
            return Ok(None);
        }

        let id = edge.id.clone();
        debug!(edge = %id, "nodes connected");
        self.edges.push(edge);
        Ok(Some(id))
    }

    pub fn disconnect(&mut self, edge_id: &str) -> bool {
        let before = self.edges.len();
        self.edges.retain(|edge| edge.id != edge_id);
        before != self.edges.len()
    }

    /// Removes every edge that starts or ends at `node_id`.
    pub fn remove_node_edges(&mut self, node_id: &str) -> usize {
        let before = self.edges.len();
        self.edges.retain(|edge| !edge.touches(node_id));
        before - self.edges.len()
    }

    /// Moves a node within its current coordinate space.
    pub fn move_node(&mut self, node_id: &str, position: Point) -> bool {
        match self.node_mut(node_id) {
            Some(node) => {
                node.position = position;
                true
            }
            None => false,
        }
    }

    pub fn resize_group(&mut self, group_id: &str, size: Size) -> bool {
        match self.node_mut(group_id) {
            Some(node) if node.is_group() => {
                node.size = size;
                true
            }
            _ => false,
        }
    }

    /// Deletes a node, releasing a group's members to the top level and
    /// dropping every edge that touched the node.
    pub fn delete_node(&mut self, node_id: &str) -> bool {
        let Some(index) = self.nodes.iter().position(|node| node.id == node_id) else {
            return false;
        };

        let removed = self.nodes.remove(index);
        if removed.is_group() {
            for node in &mut self.nodes {
                if node.parent() == Some(node_id) {
                    node.position = translate_position(node.position, Some(removed.position), None);
                    node.set_parent(None);
                }
            }
        }

        let removed_edges = self.remove_node_edges(node_id);
        debug!(node = %node_id, removed_edges, "node deleted");

        if self
            .drag
            .as_ref()
            .is_some_and(|drag| drag.node_id == node_id)
        {
            self.drag = None;
        }
        true
    }

    pub fn begin_drag(&mut self, node_id: &str) -> bool {
        let Some(node) = self.node(node_id) else {
            return false;
        };
        let parent = node.parent().map(str::to_string);
        self.drag = Some(DragState {
            node_id: node_id.to_string(),
            initial_parent: parent.clone(),
            hovered_group: parent,
        });
        true
    }

    /// Moves the dragged node and returns the group currently under it.
    ///
    /// `position` is in the node's current coordinate space. Dragging a node
    /// that was not announced with [`ChainGraph::begin_drag`] starts a drag.
    pub fn drag_to(&mut self, node_id: &str, position: Point) -> Option<String> {
        let dragging = self.drag.as_ref().is_some_and(|drag| drag.node_id == node_id);
        if !dragging && !self.begin_drag(node_id) {
            return None;
        }

        self.move_node(node_id, position);
        let node = self.node(node_id)?;
        let hovered = if node.is_group() {
            None
        } else {
            let rect = self.absolute_rect(node);
            self.group_at(&rect).map(|group| group.id.clone())
        };

        if let Some(drag) = self.drag.as_mut() {
            drag.hovered_group = hovered.clone();
        }
        hovered
    }

    /// Commits the parent chosen during the drag.
    pub fn end_drag(&mut self) -> Option<DragOutcome> {
        let drag = self.drag.take()?;
        let node = self.node(&drag.node_id)?;
        if node.is_group() {
            return Some(DragOutcome {
                node_id: drag.node_id,
                parent: None,
                removed_edges: 0,
            });
        }

        let current_parent = node.parent().map(str::to_string);
        let new_parent = drag
            .hovered_group
            .filter(|group_id| self.group_origin(Some(group_id.as_str())).is_some());

        if current_parent != new_parent {
            let from = self.group_origin(current_parent.as_deref());
            let to = self.group_origin(new_parent.as_deref());
            if let Some(node) = self.node_mut(&drag.node_id) {
                node.position = translate_position(node.position, from, to);
                node.set_parent(new_parent.clone());
            }
        }

        let removed_edges = if drag.initial_parent.is_none() && new_parent.is_some() {
            self.remove_node_edges(&drag.node_id)
        } else {
            0
        };

        debug!(node = %drag.node_id, parent = ?new_parent, removed_edges, "drag finished");
        Some(DragOutcome {
            node_id: drag.node_id,
            parent: new_parent,
            removed_edges,
        })
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }
}
