use tracing::{debug, instrument};

use crate::grammar::parse_steps;
use crate::*;

/// Width of the box for `object`: its longest text plus padding, floored at
/// the minimum node width.
pub fn node_width(object: &CatalogObject, layout: &LayoutConfig) -> f32 {
    let text = layout.text_width(object.longest_text());
    (text + 2.0 * layout.node_padding_x).max(layout.min_node_width)
}

/// Parses a chain string straight into a laid-out graph.
pub fn parse_chain(definition: &str, catalog: &ObjectCatalog, layout: &LayoutConfig) -> ChainGraph {
    build_graph(&parse_steps(definition), catalog, layout)
}

/// Lays steps out left to right and links consecutive anchors.
///
/// Groups come first in the returned node list. Empty groups produce no node
/// and occupy a zero-width slot, so only the gap is added to the horizontal
/// offset; the edge skips over them.
#[instrument(level = "trace", skip(catalog, layout))]
pub fn build_graph(steps: &[Step], catalog: &ObjectCatalog, layout: &LayoutConfig) -> ChainGraph {
    let mut group_nodes = Vec::new();
    let mut step_nodes = Vec::new();
    let mut edges = Vec::new();

    let mut previous_anchor: Option<String> = None;
    let mut x_offset = 0.0_f32;

    for step in steps {
        if step.is_empty_group() {
            x_offset += layout.step_gap;
            continue;
        }

        let placed = match step {
            Step::Single(object_ref) => place_single(object_ref, x_offset, catalog, layout),
            Step::Group(refs) => place_group(refs, x_offset, catalog, layout),
        };

        if let Some(previous) = &previous_anchor {
            edges.push(GraphEdge::new(previous, &placed.anchor));
        }
        previous_anchor = Some(placed.anchor);
        x_offset += placed.width + layout.step_gap;

        group_nodes.extend(placed.group);
        step_nodes.extend(placed.members);
    }

    group_nodes.extend(step_nodes);
    debug!(
        nodes = group_nodes.len(),
        edges = edges.len(),
        "chain laid out"
    );
    ChainGraph::new(group_nodes, edges)
}

struct PlacedStep {
    anchor: String,
    width: f32,
    group: Option<GraphNode>,
    members: Vec<GraphNode>,
}

fn place_single(
    object_ref: &str,
    x_offset: f32,
    catalog: &ObjectCatalog,
    layout: &LayoutConfig,
) -> PlacedStep {
    let object = catalog.resolve(object_ref);
    let width = node_width(&object, layout);
    let node = GraphNode::step(
        &object,
        Point::new(x_offset, 0.0),
        Size::new(width, layout.node_height),
        None,
    );

    PlacedStep {
        anchor: node.id.clone(),
        width,
        group: None,
        members: vec![node],
    }
}

fn place_group(
    refs: &[String],
    x_offset: f32,
    catalog: &ObjectCatalog,
    layout: &LayoutConfig,
) -> PlacedStep {
    let height = refs.len() as f32 * layout.row_height + layout.group_padding_y;
    let mut group = GraphNode::group(Point::new(x_offset, 0.0), Size::new(0.0, height));

    let mut members = Vec::with_capacity(refs.len());
    let mut widest = 0.0_f32;
    for (index, object_ref) in refs.iter().enumerate() {
        let object = catalog.resolve(object_ref);
        let width = node_width(&object, layout);
        widest = widest.max(width);

        let position = Point::new(
            layout.group_padding_x,
            index as f32 * layout.row_height + layout.group_padding_y,
        );
        members.push(GraphNode::step(
            &object,
            position,
            Size::new(width, layout.node_height),
            Some(group.id.clone()),
        ));
    }

    let group_width = (widest + 2.0 * layout.group_padding_x).max(layout.min_group_width);
    group.size.width = group_width;

    let inner_width = group_width - 2.0 * layout.group_padding_x;
    for member in &mut members {
        member.position.x += (inner_width - member.size.width) / 2.0;
    }

    PlacedStep {
        anchor: group.id.clone(),
        width: group_width,
        group: Some(group),
        members,
    }
}
