//! Keeps the surface's backing store in step with the container and DPR.

use crate::reconstruct::Reconstructor;
use crate::surface::{Surface, SurfaceResult};
use duetboard_core::{CanvasConfig, DeferredCheck, Geometry, OrientationWatch, Stroke};
use std::time::Duration;

// Use web_time for WASM compatibility
#[cfg(target_arch = "wasm32")]
use web_time::Instant;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;

/// What a [`SurfaceSizer::resize`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeOutcome {
    /// Geometry unchanged; the surface was not touched.
    Unchanged,
    /// Same backing store, new logical size or scale; repainted in place.
    Rescaled,
    /// Backing store reallocated and repainted.
    Reallocated,
}

/// Surface sizing manager.
///
/// Physical size is always `round(logical × dpr)`, display size is the
/// logical size, and any change is followed by a full reconstruction from
/// the cached strokes, so a resize never loses content.
#[derive(Debug, Clone)]
pub struct SurfaceSizer {
    reconstructor: Reconstructor,
    applied: Option<Geometry>,
    orientation: OrientationWatch,
    settle: DeferredCheck,
}

impl SurfaceSizer {
    pub fn new(reconstructor: Reconstructor, orientation_delay: Duration, settle_delay: Duration) -> Self {
        Self {
            reconstructor,
            applied: None,
            orientation: OrientationWatch::new(orientation_delay),
            settle: DeferredCheck::new(settle_delay),
        }
    }

    pub fn from_config(config: &CanvasConfig) -> Self {
        Self::new(
            Reconstructor::new(config.background),
            config.orientation_recheck(),
            config.mount_settle(),
        )
    }

    pub fn reconstructor(&self) -> &Reconstructor {
        &self.reconstructor
    }

    /// The geometry last applied to the surface.
    pub fn geometry(&self) -> Option<Geometry> {
        self.applied
    }

    /// Current device pixel ratio (1 before the first resize).
    pub fn dpr(&self) -> f64 {
        self.applied.map_or(1.0, |g| g.scale())
    }

    /// Apply `geometry` to `surface` and repaint from `strokes`. A call with
    /// the geometry already in effect does nothing.
    pub fn resize<S: Surface + ?Sized>(
        &mut self,
        surface: &mut S,
        geometry: Geometry,
        strokes: &[Stroke],
        now: Instant,
    ) -> SurfaceResult<ResizeOutcome> {
        let physical = geometry.physical();
        let same_buffer = surface.physical_size() == physical;
        if same_buffer && self.applied == Some(geometry) {
            return Ok(ResizeOutcome::Unchanged);
        }

        let outcome = if same_buffer {
            ResizeOutcome::Rescaled
        } else {
            surface.set_physical_size(physical)?;
            ResizeOutcome::Reallocated
        };
        surface.set_display_size(geometry.logical)?;
        self.applied = Some(geometry);
        self.orientation.observe(&geometry, now);
        log::debug!(
            "Surface {:?}: {}x{} logical @{} -> {}x{} physical",
            outcome,
            geometry.logical.width,
            geometry.logical.height,
            geometry.scale(),
            physical.width,
            physical.height
        );

        self.reconstructor.reconstruct(surface, &geometry, strokes)?;
        Ok(outcome)
    }

    /// Repaint at the current geometry. Does nothing before the first resize.
    pub fn repaint<S: Surface + ?Sized>(&self, surface: &mut S, strokes: &[Stroke]) -> SurfaceResult<bool> {
        match self.applied {
            Some(geometry) => {
                self.reconstructor.reconstruct(surface, &geometry, strokes)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Schedule the post-mount re-measure.
    pub fn mounted(&mut self, now: Instant) {
        self.settle.arm(now);
    }

    /// Schedule a re-measure after the platform reported a rotation.
    pub fn orientation_changed(&mut self, now: Instant) {
        self.orientation.notify(now);
    }

    /// Whether a deferred re-measure is due. Each scheduled check fires once.
    pub fn take_due(&mut self, now: Instant) -> bool {
        let settle = self.settle.take_due(now);
        let orientation = self.orientation.take_due(now);
        settle || orientation
    }

    pub fn has_pending_check(&self) -> bool {
        self.settle.is_armed() || self.orientation.is_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuSurface;
    use duetboard_core::stroke::{BACKGROUND, DEFAULT_COLOR};
    use duetboard_core::{PhysicalSize, StrokeId, Timestamp, UserName};
    use kurbo::{Point, Size};

    fn sizer() -> SurfaceSizer {
        SurfaceSizer::from_config(&CanvasConfig::default())
    }

    fn line() -> Vec<Stroke> {
        vec![Stroke {
            id: Some(StrokeId("s".into())),
            points: vec![Point::new(10.0, 10.0), Point::new(50.0, 10.0)],
            color: DEFAULT_COLOR,
            width: 5.0,
            author: UserName::new("Lena"),
            timestamp: Some(Timestamp(1)),
        }]
    }

    #[test]
    fn test_physical_tracks_dpr() {
        let mut surface = CpuSurface::new(PhysicalSize::new(1, 1)).unwrap();
        let mut sizer = sizer();
        let outcome = sizer
            .resize(&mut surface, Geometry::new(300.0, 150.0, 2.0), &[], Instant::now())
            .unwrap();
        assert_eq!(outcome, ResizeOutcome::Reallocated);
        assert_eq!(surface.physical_size(), PhysicalSize::new(600, 300));
        assert_eq!(surface.display_size(), Size::new(300.0, 150.0));
        assert_eq!(sizer.dpr(), 2.0);
    }

    #[test]
    fn test_second_resize_is_noop() {
        let mut surface = CpuSurface::new(PhysicalSize::new(1, 1)).unwrap();
        let mut sizer = sizer();
        let geometry = Geometry::new(120.0, 90.0, 1.5);
        let strokes = line();
        sizer.resize(&mut surface, geometry, &strokes, Instant::now()).unwrap();
        let before = surface.snapshot().unwrap();
        let commands = surface.command_count();

        let outcome = sizer.resize(&mut surface, geometry, &strokes, Instant::now()).unwrap();
        assert_eq!(outcome, ResizeOutcome::Unchanged);
        assert_eq!(surface.command_count(), commands);
        assert_eq!(surface.physical_size(), PhysicalSize::new(180, 135));
        assert_eq!(surface.snapshot().unwrap(), before);
    }

    #[test]
    fn test_content_survives_resize() {
        let mut surface = CpuSurface::new(PhysicalSize::new(1, 1)).unwrap();
        let mut sizer = sizer();
        let strokes = line();
        sizer
            .resize(&mut surface, Geometry::new(100.0, 50.0, 1.0), &strokes, Instant::now())
            .unwrap();
        assert_eq!(surface.snapshot().unwrap().pixel(30, 10).map(|p| p[0]), Some(DEFAULT_COLOR.r));

        sizer
            .resize(&mut surface, Geometry::new(200.0, 80.0, 2.0), &strokes, Instant::now())
            .unwrap();
        let snapshot = surface.snapshot().unwrap();
        assert_eq!(snapshot.pixel(60, 20).map(|p| p[0]), Some(DEFAULT_COLOR.r));
        assert_eq!(snapshot.pixel(300, 100).map(|p| p[0]), Some(BACKGROUND.r));
    }

    #[test]
    fn test_same_buffer_new_scale_repaints_without_reallocating() {
        let mut surface = CpuSurface::new(PhysicalSize::new(1, 1)).unwrap();
        let mut sizer = sizer();
        let strokes = line();
        sizer
            .resize(&mut surface, Geometry::new(300.0, 150.0, 2.0), &strokes, Instant::now())
            .unwrap();
        let outcome = sizer
            .resize(&mut surface, Geometry::new(600.0, 300.0, 1.0), &strokes, Instant::now())
            .unwrap();
        assert_eq!(outcome, ResizeOutcome::Rescaled);
        assert_eq!(surface.display_size(), Size::new(600.0, 300.0));
        let snapshot = surface.snapshot().unwrap();
        // Logical (30, 10) now maps 1:1.
        assert_eq!(snapshot.pixel(30, 10).map(|p| p[0]), Some(DEFAULT_COLOR.r));
    }

    #[test]
    fn test_deferred_checks() {
        let start = Instant::now();
        let mut sizer = sizer();
        assert!(!sizer.take_due(start));

        sizer.mounted(start);
        assert!(!sizer.take_due(start + Duration::from_millis(10)));
        assert!(sizer.take_due(start + Duration::from_millis(50)));
        assert!(!sizer.has_pending_check());

        sizer.orientation_changed(start);
        assert!(sizer.has_pending_check());
        assert!(!sizer.take_due(start + Duration::from_millis(99)));
        assert!(sizer.take_due(start + Duration::from_millis(100)));
    }

    #[test]
    fn test_rotation_seen_through_resize_schedules_recheck() {
        let start = Instant::now();
        let mut surface = CpuSurface::new(PhysicalSize::new(1, 1)).unwrap();
        let mut sizer = sizer();
        sizer.resize(&mut surface, Geometry::new(400.0, 800.0, 2.0), &[], start).unwrap();
        assert!(!sizer.has_pending_check());
        sizer.resize(&mut surface, Geometry::new(800.0, 400.0, 2.0), &[], start).unwrap();
        assert!(sizer.has_pending_check());
    }

    #[test]
    fn test_invalid_size_is_reported() {
        let mut surface = CpuSurface::new(PhysicalSize::new(1, 1)).unwrap();
        let mut sizer = sizer();
        let result = sizer.resize(&mut surface, Geometry::new(40_000.0, 10.0, 2.0), &[], Instant::now());
        assert!(result.is_err());
        assert!(sizer.geometry().is_none());
    }
}
