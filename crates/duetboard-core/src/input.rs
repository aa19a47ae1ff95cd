//! Pointer input: turns drag gestures into strokes.
//!
//! The tracker is pure. It returns [`InputAction`]s describing what to paint
//! locally and what to hand to the sync engine; applying them is the
//! caller's job.

use crate::stroke::{Brush, SerializableColor, StrokeDraft, UserName};
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Pointer event type for unified mouse/touch handling.
///
/// Positions are logical pixels relative to the canvas (see [`client_to_logical`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PointerEvent {
    Down { position: Point },
    Move { position: Point },
    Up,
    /// The pointer left the canvas. Ends a drag exactly like `Up`.
    Leave,
}

/// Map a client (viewport) coordinate into canvas-relative logical pixels,
/// given the canvas element's bounding box in client coordinates.
pub fn client_to_logical(client: Point, bounds: Rect) -> Point {
    Point::new(client.x - bounds.x0, client.y - bounds.y0)
}

/// Something the caller must do in response to input.
#[derive(Debug, Clone, PartialEq)]
pub enum InputAction {
    /// Tap feedback: a filled circle.
    PaintDot {
        center: Point,
        radius: f64,
        color: SerializableColor,
    },
    /// Incremental paint of the newest segment.
    PaintSegment {
        from: Point,
        to: Point,
        color: SerializableColor,
        width: f64,
    },
    /// A finished gesture worth persisting.
    Commit(StrokeDraft),
    /// A finished gesture too short to persist.
    Discard,
}

/// The in-progress stroke of an active drag.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveStroke {
    pub points: Vec<Point>,
    pub color: SerializableColor,
    pub width: f64,
    pub author: UserName,
}

impl LiveStroke {
    fn last(&self) -> Option<Point> {
        self.points.last().copied()
    }

    fn finish(self) -> InputAction {
        let draft = StrokeDraft {
            points: self.points,
            color: self.color,
            width: self.width,
            author: self.author,
        };
        if draft.is_committable() {
            InputAction::Commit(draft)
        } else {
            InputAction::Discard
        }
    }
}

/// Per-gesture state machine: idle, or holding a live stroke.
#[derive(Debug, Clone, Default)]
pub struct InputTracker {
    live: Option<LiveStroke>,
}

impl InputTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.live.is_some()
    }

    pub fn live(&self) -> Option<&LiveStroke> {
        self.live.as_ref()
    }

    /// Feed one event. `brush` and `author` are only read on `Down`.
    pub fn handle(
        &mut self,
        event: PointerEvent,
        brush: &Brush,
        author: &UserName,
    ) -> Vec<InputAction> {
        match event {
            PointerEvent::Down { position } => self.pointer_down(position, brush, author),
            PointerEvent::Move { position } => self.pointer_move(position).into_iter().collect(),
            PointerEvent::Up | PointerEvent::Leave => self.pointer_up().into_iter().collect(),
        }
    }

    /// Start a gesture. A gesture that was still active is finished first.
    pub fn pointer_down(
        &mut self,
        position: Point,
        brush: &Brush,
        author: &UserName,
    ) -> Vec<InputAction> {
        let mut actions = Vec::with_capacity(2);
        if let Some(previous) = self.pointer_up() {
            actions.push(previous);
        }
        self.live = Some(LiveStroke {
            points: vec![position],
            color: brush.stroke_color(),
            width: brush.stroke_width(),
            author: author.clone(),
        });
        actions.push(InputAction::PaintDot {
            center: position,
            radius: brush.dot_radius(),
            color: brush.stroke_color(),
        });
        actions
    }

    /// Extend the active gesture. Ignored while idle.
    pub fn pointer_move(&mut self, position: Point) -> Option<InputAction> {
        let live = self.live.as_mut()?;
        let from = live.last()?;
        live.points.push(position);
        Some(InputAction::PaintSegment {
            from,
            to: position,
            color: live.color,
            width: live.width,
        })
    }

    /// End the active gesture. The release position is not added.
    pub fn pointer_up(&mut self) -> Option<InputAction> {
        self.live.take().map(LiveStroke::finish)
    }

    /// Same as [`InputTracker::pointer_up`].
    pub fn pointer_leave(&mut self) -> Option<InputAction> {
        self.pointer_up()
    }
}
