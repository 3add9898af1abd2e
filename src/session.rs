//! One editing session of a chain.
//!
//! The session owns the live graph and the canonical text and keeps them
//! eventually consistent: graph edits arm a debounced serialize, while
//! formatting rebuilds the graph from the text synchronously. All time is
//! passed in by the caller, so the host decides what drives the clock.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::graph::DragOutcome;
use crate::*;

const FORMAT_KEYS: [char; 2] = ['f', 'а'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    /// Waiting for the object catalog before the first parse.
    Initializing,
    /// Accepting edits; a serialize may be pending.
    Ready,
    /// The graph was just rebuilt from text; further format requests are ignored.
    Formatting,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A transient message for the user, e.g. a toast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub lifetime_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("cannot save chain: {0}")]
    InvalidChain(SerializeError),
    #[error("the chain editor is still initializing")]
    NotReady,
    #[error("the chain editor session is closed")]
    Closed,
}

/// Callbacks into whatever opened the editor.
pub trait SessionHost {
    fn on_save(&mut self, text: &str) -> Result<()>;
    fn on_close(&mut self);
}

#[derive(Debug)]
pub struct EditorSession {
    config: SessionConfig,
    layout: LayoutConfig,
    state: SessionState,
    opened_at: Instant,
    initial_text: String,
    catalog: Option<ObjectCatalog>,
    graph: ChainGraph,
    text: String,
    error: Option<SerializeError>,
    warnings: Vec<ChainWarning>,
    used_objects: HashSet<String>,
    serialize_debounce: Debouncer,
    formatting_until: Option<Instant>,
    notices: Vec<Notice>,
}

impl EditorSession {
    /// Opens a session; nothing is parsed until the catalog arrives.
    pub fn new(initial_text: impl Into<String>, config: &EditorConfig, now: Instant) -> Self {
        let initial_text = initial_text.into();
        Self {
            config: config.session.clone(),
            layout: config.layout.clone(),
            state: SessionState::Initializing,
            opened_at: now,
            text: initial_text.clone(),
            initial_text,
            catalog: None,
            graph: ChainGraph::default(),
            error: None,
            warnings: Vec::new(),
            used_objects: HashSet::new(),
            serialize_debounce: Debouncer::new(config.session.debounce()),
            formatting_until: None,
            notices: Vec::new(),
        }
    }

    pub fn with_catalog(
        initial_text: impl Into<String>,
        catalog: ObjectCatalog,
        config: &EditorConfig,
        now: Instant,
    ) -> Self {
        let mut session = Self::new(initial_text, config, now);
        session.catalog_loaded(catalog, now);
        session
    }

    /// Stores the catalog; the first one also parses the initial text.
    pub fn catalog_loaded(&mut self, catalog: ObjectCatalog, now: Instant) {
        self.catalog = Some(catalog);
        if self.state != SessionState::Initializing {
            return;
        }

        let graph = self.parse(&self.initial_text);
        self.graph = graph;
        self.refresh();
        self.state = SessionState::Ready;
        info!(
            nodes = self.graph.nodes.len(),
            elapsed_ms = now.saturating_duration_since(self.opened_at).as_millis() as u64,
            "chain editor ready"
        );
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn graph(&self) -> &ChainGraph {
        &self.graph
    }

    /// Canonical text; may lag behind the graph until the debounce fires.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn error(&self) -> Option<SerializeError> {
        self.error
    }

    pub fn warnings(&self) -> &[ChainWarning] {
        &self.warnings
    }

    pub fn warning(&self) -> Option<String> {
        self.warnings.first().map(ChainWarning::to_string)
    }

    pub fn catalog(&self) -> Option<&ObjectCatalog> {
        self.catalog.as_ref()
    }

    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    /// The loader is only worth showing when initialization is slow.
    pub fn show_loader(&self, now: Instant) -> bool {
        self.state == SessionState::Initializing
            && now.saturating_duration_since(self.opened_at) >= self.config.loader_delay()
    }

    pub fn is_serialize_pending(&self) -> bool {
        self.serialize_debounce.is_pending()
    }

    /// How long until [`EditorSession::tick`] has something to do.
    pub fn next_wakeup(&self, now: Instant) -> Option<Duration> {
        let format_end = self
            .formatting_until
            .map(|until| until.saturating_duration_since(now));
        match (self.serialize_debounce.remaining(now), format_end) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Advances timers; returns true when the text was regenerated.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self
            .formatting_until
            .is_some_and(|until| until <= now)
        {
            self.formatting_until = None;
            if self.state == SessionState::Formatting {
                self.state = SessionState::Ready;
            }
        }

        if self.serialize_debounce.fire(now) {
            self.refresh();
            return true;
        }
        false
    }

    pub fn is_object_used(&self, object_id: &str) -> bool {
        self.used_objects.contains(object_id)
    }

    pub fn used_object_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.used_objects.iter().cloned().collect();
        ids.sort();
        ids
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn add_from_palette(&mut self, item: PaletteItem, at: Point, now: Instant) -> Option<String> {
        if !self.accepts_edits() {
            return None;
        }
        if let PaletteItem::Step(object) = &item {
            self.used_objects.insert(object.id.clone());
        }
        let id = self.graph.add_from_palette(item, at, &self.layout);
        self.touch(now);
        Some(id)
    }

    /// Connects two nodes; a grouped endpoint also raises a notice.
    pub fn connect(
        &mut self,
        source: &str,
        target: &str,
        now: Instant,
    ) -> Result<Option<String>, ConnectError> {
        if !self.accepts_edits() {
            return Ok(None);
        }
        match self.graph.connect(source, target) {
            Ok(Some(edge_id)) => {
                self.touch(now);
                Ok(Some(edge_id))
            }
            Ok(None) => Ok(None),
            Err(err) => {
                self.notify(NoticeLevel::Error, err.to_string(), self.config.connect_notice_ms);
                Err(err)
            }
        }
    }

    pub fn disconnect(&mut self, edge_id: &str, now: Instant) -> bool {
        self.edit(now, |graph| graph.disconnect(edge_id))
    }

    pub fn move_node(&mut self, node_id: &str, position: Point, now: Instant) -> bool {
        self.edit(now, |graph| graph.move_node(node_id, position))
    }

    pub fn begin_drag(&mut self, node_id: &str) -> bool {
        self.accepts_edits() && self.graph.begin_drag(node_id)
    }

    pub fn drag_to(&mut self, node_id: &str, position: Point, now: Instant) -> Option<String> {
        if !self.accepts_edits() {
            return None;
        }
        let hovered = self.graph.drag_to(node_id, position);
        self.touch(now);
        hovered
    }

    pub fn end_drag(&mut self, now: Instant) -> Option<DragOutcome> {
        if !self.accepts_edits() {
            return None;
        }
        let outcome = self.graph.end_drag()?;
        self.touch(now);
        Some(outcome)
    }

    pub fn delete_node(&mut self, node_id: &str, now: Instant) -> bool {
        self.edit(now, |graph| graph.delete_node(node_id))
    }

    pub fn resize_group(&mut self, group_id: &str, size: Size, now: Instant) -> bool {
        self.edit(now, |graph| graph.resize_group(group_id, size))
    }

    /// Rebuilds the graph from the current text.
    ///
    /// Pending graph edits are serialized first. Ignored while a previous
    /// format is still settling.
    pub fn format(&mut self, now: Instant) -> bool {
        if self.state != SessionState::Ready {
            return false;
        }
        if self.serialize_debounce.flush() {
            self.refresh();
        }
        self.reformat(now)
    }

    /// Formats when `key` is the format hot-key.
    pub fn key_pressed(&mut self, key: char, now: Instant) -> bool {
        let key = key.to_lowercase().next().unwrap_or(key);
        FORMAT_KEYS.contains(&key) && self.format(now)
    }

    /// Replaces the canonical text by hand and formats right away.
    pub fn set_text(&mut self, text: impl Into<String>, now: Instant) -> bool {
        if !self.accepts_edits() {
            return false;
        }
        self.serialize_debounce.cancel();
        self.text = text.into();
        self.reformat(now)
    }

    /// Hands the canonical text to the host and closes the session.
    pub fn save(&mut self, host: &mut dyn SessionHost) -> Result<String> {
        let text = self.prepare_save()?;
        host.on_save(&text).context("failed to save chain")?;
        self.complete_save();
        host.on_close();
        Ok(text)
    }

    /// First half of a save for hosts that persist asynchronously: flushes
    /// pending edits and returns the text to write, leaving the session open.
    pub fn prepare_save(&mut self) -> std::result::Result<String, SessionError> {
        match self.state {
            SessionState::Closed => return Err(SessionError::Closed),
            SessionState::Initializing => return Err(SessionError::NotReady),
            SessionState::Ready | SessionState::Formatting => {}
        }

        if self.serialize_debounce.flush() {
            self.refresh();
        }
        if let Some(error) = self.error {
            warn!(%error, "refusing to save an invalid chain");
            return Err(SessionError::InvalidChain(error));
        }
        Ok(self.text.clone())
    }

    /// Closes the session once the text from [`EditorSession::prepare_save`]
    /// has been persisted.
    pub fn complete_save(&mut self) {
        info!(text = %self.text, "chain saved");
        self.close();
    }

    /// Closes without persisting anything.
    pub fn cancel(&mut self, host: &mut dyn SessionHost) {
        if self.state == SessionState::Closed {
            return;
        }
        info!("chain edit cancelled");
        self.close();
        host.on_close();
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Stops all timers and rejects further edits.
    pub fn close(&mut self) {
        self.serialize_debounce.cancel();
        self.formatting_until = None;
        self.state = SessionState::Closed;
    }

    fn accepts_edits(&self) -> bool {
        matches!(self.state, SessionState::Ready | SessionState::Formatting)
    }

    fn edit(&mut self, now: Instant, change: impl FnOnce(&mut ChainGraph) -> bool) -> bool {
        if !self.accepts_edits() {
            return false;
        }
        let changed = change(&mut self.graph);
        if changed {
            self.touch(now);
        }
        changed
    }

    fn touch(&mut self, now: Instant) {
        self.serialize_debounce.schedule(now);
    }

    fn parse(&self, text: &str) -> ChainGraph {
        let empty = ObjectCatalog::default();
        let catalog = self.catalog.as_ref().unwrap_or(&empty);
        parse_chain(text, catalog, &self.layout)
    }

    fn reformat(&mut self, now: Instant) -> bool {
        let graph = self.parse(&self.text);
        let malformed = !self.text.trim().is_empty() || self.error.is_some();
        if graph.nodes.is_empty() && malformed {
            warn!(text = %self.text, "chain text produced no nodes");
            self.notify(
                NoticeLevel::Error,
                "failed to format the chain; it may contain errors".to_string(),
                self.config.format_notice_ms,
            );
            return false;
        }

        self.graph = graph;
        self.refresh();
        self.state = SessionState::Formatting;
        self.formatting_until = Some(now + self.config.format_cooldown());
        debug!(nodes = self.graph.nodes.len(), "chain formatted");
        true
    }

    fn refresh(&mut self) {
        let result = serialize(&self.graph);
        self.used_objects = result.used_object_ids.into_iter().collect();
        self.text = result.text;
        self.error = result.error;
        self.warnings = result.warnings;
    }

    fn notify(&mut self, level: NoticeLevel, message: String, lifetime_ms: u64) {
        self.notices.push(Notice {
            level,
            message,
            lifetime_ms,
        });
    }
}
