use std::time::Instant;

use anyhow::Result;
use dagedit::{
    CatalogObject, ChainGraph, ChainWarning, EditorConfig, EditorSession, LayoutConfig,
    ObjectCatalog, PaletteItem, Point, SerializeError, SessionHost, parse_chain, serialize,
};

fn format(text: &str) -> String {
    let graph = parse_chain(text, &ObjectCatalog::default(), &LayoutConfig::default());
    serialize(&graph).text
}

fn free_steps(refs: &[&str]) -> (ChainGraph, Vec<String>) {
    let layout = LayoutConfig::default();
    let mut graph = ChainGraph::default();
    let ids = refs
        .iter()
        .enumerate()
        .map(|(index, object_ref)| {
            graph.add_from_palette(
                PaletteItem::Step(CatalogObject::new(*object_ref)),
                Point::new(index as f32 * 200.0, 0.0),
                &layout,
            )
        })
        .collect();
    (graph, ids)
}

#[test]
fn single_path_round_trips() {
    for text in ["1", "1>>2", "extract>>transform>>load", " a>>b ", "a >>b"] {
        assert_eq!(format(text), text);
    }
}

#[test]
fn grouped_path_round_trips() {
    for text in ["[1,2]", "1>>[2,3,4]>>5", "[a]>>[b,c]>>d", "1>>[ 2,3]>>4"] {
        assert_eq!(format(text), text);
    }
}

#[test]
fn formatting_is_idempotent() {
    let once = format("1>>[2,3,]>>>>[]>>4>>");
    assert_eq!(once, "1>>[2,3]>>4");
    assert_eq!(format(&once), once);
}

#[test]
fn padded_refs_stay_distinct_objects() {
    let graph = parse_chain("1>> 1", &ObjectCatalog::default(), &LayoutConfig::default());
    let chain = serialize(&graph);

    assert_eq!(chain.text, "1>> 1");
    assert_eq!(chain.used_object_ids, vec!["1", " 1"]);
    assert!(chain.warnings.is_empty());
}

#[test]
fn empty_input_is_empty_graph() {
    let graph = parse_chain("", &ObjectCatalog::default(), &LayoutConfig::default());
    assert!(graph.nodes.is_empty());
    assert!(graph.edges.is_empty());

    let chain = serialize(&graph);
    assert_eq!(chain.text, "");
    assert!(chain.is_valid());
}

#[test]
fn branching_path_is_rejected() -> Result<()> {
    let (mut graph, ids) = free_steps(&["1", "2", "3"]);
    graph.connect(&ids[0], &ids[1])?;
    graph.connect(&ids[0], &ids[2])?;

    let chain = serialize(&graph);
    assert_eq!(chain.error, Some(SerializeError::Branching));
    assert_eq!(chain.text, "");
    assert_eq!(chain.used_object_ids, vec!["1", "2", "3"]);
    Ok(())
}

#[test]
fn converging_paths_are_rejected() -> Result<()> {
    let (mut graph, ids) = free_steps(&["1", "2", "3"]);
    graph.connect(&ids[0], &ids[2])?;
    graph.connect(&ids[1], &ids[2])?;

    assert_eq!(serialize(&graph).error, Some(SerializeError::Converging));
    Ok(())
}

#[test]
fn cycle_has_no_start_node() -> Result<()> {
    let (mut graph, ids) = free_steps(&["1", "2"]);
    graph.connect(&ids[0], &ids[1])?;
    graph.connect(&ids[1], &ids[0])?;

    assert_eq!(serialize(&graph).error, Some(SerializeError::NoStartNode));
    Ok(())
}

#[test]
fn repeated_objects_are_warned_about() {
    let graph = parse_chain("1>>2>>1", &ObjectCatalog::default(), &LayoutConfig::default());
    let chain = serialize(&graph);

    assert!(chain.is_valid());
    assert_eq!(chain.text, "1>>2>>1");
    assert_eq!(
        chain.warnings,
        vec![ChainWarning::DuplicateObjects(vec!["1".to_string()])]
    );
    assert_eq!(
        chain.warning().as_deref(),
        Some("the following objects are used two or more times: '1'")
    );
}

#[test]
fn grouped_nodes_cannot_be_connected() {
    let mut graph = parse_chain("1>>[2,3]", &ObjectCatalog::default(), &LayoutConfig::default());
    let find = |graph: &ChainGraph, object_ref: &str| {
        graph
            .nodes
            .iter()
            .find(|node| node.object_ref() == Some(object_ref))
            .map(|node| node.id.clone())
            .unwrap()
    };
    let one = find(&graph, "1");
    let three = find(&graph, "3");
    let edges_before = graph.edges.clone();

    assert!(graph.connect(&three, &one).is_err());
    assert_eq!(graph.edges, edges_before);
}

#[test]
fn deleting_a_group_releases_members_and_edges() {
    let mut graph = parse_chain("1>>[2,3]>>4", &ObjectCatalog::default(), &LayoutConfig::default());
    let group = graph.nodes[0].clone();
    assert!(group.is_group());

    let expected: Vec<(String, Point)> = graph
        .members(&group.id)
        .map(|member| (member.id.clone(), graph.absolute_position(member)))
        .collect();
    assert_eq!(expected.len(), 2);

    assert!(graph.delete_node(&group.id));

    for (id, position) in expected {
        let member = graph.node(&id).unwrap();
        assert_eq!(member.parent(), None);
        assert_eq!(member.position, position);
    }
    assert_eq!(graph.edges.len(), 0);
    assert!(graph.edges.iter().all(|edge| !edge.touches(&group.id)));
}

#[test]
fn catalog_labels_shape_the_layout() -> Result<()> {
    let catalog = ObjectCatalog::from_json(
        r#"[{"id": 1, "name": "Extract data"}, {"id": "2", "description": "load"}]"#,
    )?;
    let graph = parse_chain("1>>2", &catalog, &LayoutConfig::default());

    let first = &graph.nodes[0];
    assert_eq!(first.as_step().unwrap().label.as_deref(), Some("Extract data"));
    assert_eq!(first.size.width, 141.0);
    assert_eq!(graph.nodes[1].position.x, 211.0);
    Ok(())
}

struct MemoryHost {
    saved: Option<String>,
    closed: bool,
}

impl SessionHost for MemoryHost {
    fn on_save(&mut self, text: &str) -> Result<()> {
        self.saved = Some(text.to_string());
        Ok(())
    }

    fn on_close(&mut self) {
        self.closed = true;
    }
}

#[test]
fn session_saves_edited_chain() -> Result<()> {
    let now = Instant::now();
    let mut session = EditorSession::with_catalog(
        "1>>[2,3]",
        ObjectCatalog::default(),
        &EditorConfig::default(),
        now,
    );
    let mut host = MemoryHost {
        saved: None,
        closed: false,
    };

    let group = session.graph().nodes[0].id.clone();
    let four = session
        .add_from_palette(
            PaletteItem::Step(CatalogObject::new("4")),
            Point::new(600.0, 0.0),
            now,
        )
        .unwrap();
    session.connect(&group, &four, now)?;

    let text = session.save(&mut host)?;
    assert_eq!(text, "1>>[2,3]>>4");
    assert_eq!(host.saved.as_deref(), Some("1>>[2,3]>>4"));
    assert!(host.closed);
    Ok(())
}
