//! Per-client canvas session state.

use crate::config::CanvasConfig;
use crate::input::{InputAction, InputTracker, PointerEvent};
use crate::stroke::{Brush, Stroke, UserName};
use std::cmp::Ordering;

/// Stable sort into global draw order: ascending timestamp, strokes without
/// one last.
pub fn order_strokes(strokes: &mut [Stroke]) {
    strokes.sort_by(|a, b| match (a.timestamp, b.timestamp) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// Everything one client knows about the canvas: the mirrored stroke log,
/// the selected brush and the gesture in progress.
#[derive(Debug, Clone)]
pub struct CanvasSession {
    me: UserName,
    cache: Vec<Stroke>,
    brush: Brush,
    input: InputTracker,
}

impl CanvasSession {
    pub fn new(me: UserName, brush: Brush) -> Self {
        Self {
            me,
            cache: Vec::new(),
            brush,
            input: InputTracker::new(),
        }
    }

    pub fn from_config(config: &CanvasConfig) -> Self {
        Self::new(config.me.clone(), config.brush())
    }

    pub fn me(&self) -> &UserName {
        &self.me
    }

    /// All known strokes in draw order.
    pub fn cache(&self) -> &[Stroke] {
        &self.cache
    }

    /// Replace the mirror with a fresh snapshot from the store.
    pub fn replace_cache(&mut self, mut strokes: Vec<Stroke>) {
        order_strokes(&mut strokes);
        self.cache = strokes;
    }

    /// Strokes authored by the local user, in draw order.
    pub fn my_strokes(&self) -> impl Iterator<Item = &Stroke> {
        self.strokes_by(&self.me)
    }

    pub fn strokes_by<'a>(&'a self, author: &'a UserName) -> impl Iterator<Item = &'a Stroke> {
        self.cache.iter().filter(move |s| &s.author == author)
    }

    /// The author's most recent acknowledged stroke.
    pub fn last_stroke_by<'a>(&'a self, author: &'a UserName) -> Option<&'a Stroke> {
        self.strokes_by(author).filter(|s| s.id.is_some()).last()
    }

    pub fn can_undo(&self) -> bool {
        self.last_stroke_by(&self.me).is_some()
    }

    pub fn brush(&self) -> &Brush {
        &self.brush
    }

    pub fn brush_mut(&mut self) -> &mut Brush {
        &mut self.brush
    }

    pub fn input(&self) -> &InputTracker {
        &self.input
    }

    /// Feed a pointer event through the tracker with the current brush.
    pub fn handle_pointer(&mut self, event: PointerEvent) -> Vec<InputAction> {
        self.input.handle(event, &self.brush, &self.me)
    }
}
