//! Full repaint of a surface from an ordered stroke list.

use crate::surface::{Surface, SurfaceResult};
use duetboard_core::{Geometry, SerializableColor, Stroke};
use kurbo::{Affine, Rect};

/// Repaints a surface from scratch. Never incremental: the output depends
/// only on the stroke list and the geometry, so every client holding the
/// same list draws the same pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reconstructor {
    background: SerializableColor,
}

impl Default for Reconstructor {
    fn default() -> Self {
        Self::new(duetboard_core::stroke::BACKGROUND)
    }
}

impl Reconstructor {
    pub fn new(background: SerializableColor) -> Self {
        Self { background }
    }

    pub fn background(&self) -> SerializableColor {
        self.background
    }

    /// Clear `surface` and draw `strokes` in order. Strokes with fewer than
    /// two points are skipped.
    pub fn reconstruct<S: Surface + ?Sized>(
        &self,
        surface: &mut S,
        geometry: &Geometry,
        strokes: &[Stroke],
    ) -> SurfaceResult<()> {
        // set_transform replaces whatever transform is left over from live paint.
        surface.set_transform(Affine::scale(geometry.scale()))?;
        surface.clear()?;
        surface.fill_rect(
            Rect::from_origin_size((0.0, 0.0), geometry.logical),
            self.background,
        )?;

        let mut drawn = 0;
        for stroke in strokes.iter().filter(|s| s.is_committable()) {
            surface.stroke_polyline(&stroke.points, stroke.color, stroke.width)?;
            drawn += 1;
        }
        log::trace!(
            "Reconstructed {} of {} strokes at {}x{} @{}",
            drawn,
            strokes.len(),
            geometry.logical.width,
            geometry.logical.height,
            geometry.scale()
        );
        Ok(())
    }
}
