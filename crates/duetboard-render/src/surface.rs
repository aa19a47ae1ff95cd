//! Raster surface abstraction.

use duetboard_core::{PhysicalSize, SerializableColor};
use kurbo::{Affine, Point, Rect, Size};
use thiserror::Error;

/// Surface errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SurfaceError {
    #[error("Invalid surface size: {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("Surface backend error: {0}")]
    Backend(String),
}

/// Result type for surface operations.
pub type SurfaceResult<T> = Result<T, SurfaceError>;

/// A pixel buffer plus a 2D drawing context, modelled on the HTML canvas.
///
/// Drawing coordinates pass through the current transform; `clear` and
/// `physical_size` always work in device pixels.
pub trait Surface {
    /// Backing-store dimensions in device pixels.
    fn physical_size(&self) -> PhysicalSize;

    /// Reallocate the backing store. Clears all pixels and resets the
    /// transform to identity.
    fn set_physical_size(&mut self, size: PhysicalSize) -> SurfaceResult<()>;

    /// On-screen size in logical pixels.
    fn set_display_size(&mut self, size: Size) -> SurfaceResult<()>;

    /// Replace the current transform.
    fn set_transform(&mut self, transform: Affine) -> SurfaceResult<()>;

    /// Clear every pixel to transparent, regardless of the transform.
    fn clear(&mut self) -> SurfaceResult<()>;

    fn fill_rect(&mut self, rect: Rect, color: SerializableColor) -> SurfaceResult<()>;

    /// Stroke a connected polyline with round caps and joins.
    fn stroke_polyline(
        &mut self,
        points: &[Point],
        color: SerializableColor,
        width: f64,
    ) -> SurfaceResult<()>;

    fn fill_circle(
        &mut self,
        center: Point,
        radius: f64,
        color: SerializableColor,
    ) -> SurfaceResult<()>;
}

impl<T: Surface + ?Sized> Surface for Box<T> {
    fn physical_size(&self) -> PhysicalSize {
        (**self).physical_size()
    }

    fn set_physical_size(&mut self, size: PhysicalSize) -> SurfaceResult<()> {
        (**self).set_physical_size(size)
    }

    fn set_display_size(&mut self, size: Size) -> SurfaceResult<()> {
        (**self).set_display_size(size)
    }

    fn set_transform(&mut self, transform: Affine) -> SurfaceResult<()> {
        (**self).set_transform(transform)
    }

    fn clear(&mut self) -> SurfaceResult<()> {
        (**self).clear()
    }

    fn fill_rect(&mut self, rect: Rect, color: SerializableColor) -> SurfaceResult<()> {
        (**self).fill_rect(rect, color)
    }

    fn stroke_polyline(
        &mut self,
        points: &[Point],
        color: SerializableColor,
        width: f64,
    ) -> SurfaceResult<()> {
        (**self).stroke_polyline(points, color, width)
    }

    fn fill_circle(
        &mut self,
        center: Point,
        radius: f64,
        color: SerializableColor,
    ) -> SurfaceResult<()> {
        (**self).fill_circle(center, radius, color)
    }
}
