//! Compiler between chain DAG strings and editable graph models.
//!
//! A chain is a linear path of steps written as `1>>[2,3,4]>>5`: every step is
//! either a single object reference or a bracketed parallel group. This crate
//! parses that notation into positioned graph nodes, lets a host mutate the
//! graph interactively, and serializes the graph back into canonical text with
//! structural validation. [`EditorSession`] ties the pieces together for one
//! editing session.

pub mod catalog;
pub mod config;
pub mod debounce;
pub mod grammar;
pub mod graph;
pub mod layout;
#[cfg(feature = "server")]
pub mod serve;
pub mod serialize;
pub mod session;

pub(crate) use anyhow::{Context, Result};
pub(crate) use serde::{Deserialize, Serialize};
pub(crate) use std::collections::{HashMap, HashSet};

pub use catalog::{CatalogObject, ObjectCatalog};
pub use config::{EditorConfig, LayoutConfig, SessionConfig};
pub use debounce::Debouncer;
pub use grammar::{Step, format_steps, parse_steps, strip_line_ending};
pub use graph::{
    ChainGraph, ConnectError, GraphEdge, GraphNode, NodeKind, PaletteItem, Point, Rect, Size,
    StepNode, translate_position,
};
pub use layout::{build_graph, parse_chain};
pub use serialize::{ChainString, ChainWarning, SerializeError, serialize};
pub use session::{
    EditorSession, Notice, NoticeLevel, SessionError, SessionHost, SessionState,
};

/// Separator between consecutive steps.
pub const EDGE_TOKEN: &str = ">>";
/// Opens a parallel group.
pub const GROUP_START: char = '[';
/// Closes a parallel group.
pub const GROUP_END: char = ']';
/// Separates object references inside a group.
pub const GROUP_SEPARATOR: char = ',';
