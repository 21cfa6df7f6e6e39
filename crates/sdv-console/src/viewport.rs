//! View Port Adapter – binds the external map renderer to the connection.
//!
//! Map drawing (occupancy grid, robot marker, goal arrows) belongs to a
//! [`MapRenderer`], which subscribes to the map stream and talks to the
//! navigation action server by itself. The adapter only tells it where the
//! bridge is and which surface to draw on, once per Connection, and pushes
//! zoom and pan changes to it.
//!
//! The cumulative view is an immutable [`ViewTransform`]: every zoom or pan
//! yields a new value.

use sdv_middleware::TransportSession;
use sdv_types::{ConnectionId, Direction};
use tracing::{debug, info};

use crate::config::TopicNames;

/// Scale change of one zoom step.
pub const ZOOM_FACTOR: f64 = 1.1;

/// Map translation of one pan step, in metres.
pub const SHIFT_STEP: f64 = 1.0;

/// Cumulative zoom and pan, counted in steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewTransform {
    zoom_steps: i32,
    horizontal_steps: i32,
    vertical_steps: i32,
}

impl ViewTransform {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn zoomed_in(self) -> Self {
        Self {
            zoom_steps: self.zoom_steps + 1,
            ..self
        }
    }

    pub fn zoomed_out(self) -> Self {
        Self {
            zoom_steps: self.zoom_steps - 1,
            ..self
        }
    }

    /// Move the view towards `direction`. The map itself moves the other
    /// way: panning up shifts the scene by -1 on the vertical axis, panning
    /// right by -1 on the horizontal one.
    pub fn shifted(self, direction: Direction) -> Self {
        let (dx, dy) = match direction {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (1, 0),
            Direction::Right => (-1, 0),
        };
        Self {
            horizontal_steps: self.horizontal_steps + dx,
            vertical_steps: self.vertical_steps + dy,
            ..self
        }
    }

    pub fn zoom_steps(&self) -> i32 {
        self.zoom_steps
    }

    pub fn horizontal_steps(&self) -> i32 {
        self.horizontal_steps
    }

    pub fn vertical_steps(&self) -> i32 {
        self.vertical_steps
    }

    /// Scene scale relative to the unzoomed map.
    pub fn scale(&self) -> f64 {
        ZOOM_FACTOR.powi(self.zoom_steps)
    }

    /// Scene translation in metres, `(horizontal, vertical)`.
    pub fn offset(&self) -> (f64, f64) {
        (
            f64::from(self.horizontal_steps) * SHIFT_STEP,
            f64::from(self.vertical_steps) * SHIFT_STEP,
        )
    }
}

/// Pixel surface the map is drawn on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSurface {
    pub width: u32,
    pub height: u32,
}

impl RenderSurface {
    /// The map panel is square, as wide as its container.
    pub fn square(width: u32) -> Self {
        Self { width, height: width }
    }
}

/// Everything a renderer needs to start drawing for one Connection.
#[derive(Debug, Clone, PartialEq)]
pub struct MapBinding {
    pub connection: ConnectionId,
    pub endpoint: String,
    pub surface: RenderSurface,
    pub map_topic: String,
    pub action_server: String,
}

/// External map drawing collaborator.
pub trait MapRenderer: Send {
    /// Start rendering for a freshly opened Connection.
    fn bind(&mut self, binding: &MapBinding);

    /// Apply a new zoom/pan.
    fn apply_view(&mut self, view: &ViewTransform);
}

/// Renderer for headless consoles: records what it would draw in the log.
#[derive(Debug, Default)]
pub struct LogRenderer {
    binding: Option<MapBinding>,
}

impl LogRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MapRenderer for LogRenderer {
    fn bind(&mut self, binding: &MapBinding) {
        info!(
            endpoint = %binding.endpoint,
            map = %binding.map_topic,
            action_server = %binding.action_server,
            width = binding.surface.width,
            "map view bound"
        );
        self.binding = Some(binding.clone());
    }

    fn apply_view(&mut self, view: &ViewTransform) {
        let (dx, dy) = view.offset();
        debug!(
            bound = self.binding.is_some(),
            scale = view.scale(),
            dx,
            dy,
            "map view changed"
        );
    }
}

pub struct ViewPortAdapter {
    renderer: Box<dyn MapRenderer>,
    surface: RenderSurface,
    map_topic: String,
    action_server: String,
    view: ViewTransform,
    bound: Option<ConnectionId>,
}

impl ViewPortAdapter {
    pub fn new(renderer: Box<dyn MapRenderer>, surface: RenderSurface, topics: &TopicNames) -> Self {
        Self {
            renderer,
            surface,
            map_topic: topics.map.clone(),
            action_server: topics.action_server.clone(),
            view: ViewTransform::identity(),
            bound: None,
        }
    }

    /// Bind the renderer when the transport has just become `Open`.
    ///
    /// Returns `true` when a binding was made by this call. Each Connection
    /// is bound at most once.
    pub fn sync(&mut self, transport: &TransportSession) -> bool {
        if !transport.is_open() {
            return false;
        }
        let (Some(connection), Some(endpoint)) = (transport.connection_id(), transport.endpoint()) else {
            return false;
        };
        if self.bound == Some(connection) {
            return false;
        }
        let binding = MapBinding {
            connection,
            endpoint: endpoint.to_string(),
            surface: self.surface,
            map_topic: self.map_topic.clone(),
            action_server: self.action_server.clone(),
        };
        self.renderer.bind(&binding);
        self.renderer.apply_view(&self.view);
        self.bound = Some(connection);
        true
    }

    pub fn zoom_in(&mut self) -> ViewTransform {
        self.apply(self.view.zoomed_in())
    }

    pub fn zoom_out(&mut self) -> ViewTransform {
        self.apply(self.view.zoomed_out())
    }

    pub fn pan(&mut self, direction: Direction) -> ViewTransform {
        self.apply(self.view.shifted(direction))
    }

    pub fn view(&self) -> ViewTransform {
        self.view
    }

    pub fn bound_connection(&self) -> Option<ConnectionId> {
        self.bound
    }

    fn apply(&mut self, view: ViewTransform) -> ViewTransform {
        self.view = view;
        self.renderer.apply_view(&view);
        view
    }
}
