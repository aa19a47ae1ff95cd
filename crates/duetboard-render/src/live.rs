//! Optimistic paint of the local gesture, ahead of the store round-trip.

use crate::surface::{Surface, SurfaceResult};
use duetboard_core::InputAction;

/// Paint the feedback for one tracker action directly onto `surface`.
/// Commits and discards paint nothing; the authoritative copy arrives via
/// reconstruction.
pub fn paint_action<S: Surface + ?Sized>(surface: &mut S, action: &InputAction) -> SurfaceResult<()> {
    match action {
        InputAction::PaintDot {
            center,
            radius,
            color,
        } => surface.fill_circle(*center, *radius, *color),
        InputAction::PaintSegment {
            from,
            to,
            color,
            width,
        } => surface.stroke_polyline(&[*from, *to], *color, *width),
        InputAction::Commit(_) | InputAction::Discard => Ok(()),
    }
}
