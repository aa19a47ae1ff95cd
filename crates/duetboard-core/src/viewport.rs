//! Viewport geometry: logical size, device pixel ratio and orientation.

use kurbo::Size;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// Use web_time for WASM compatibility
#[cfg(target_arch = "wasm32")]
use web_time::Instant;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;

/// Treat a missing or nonsensical device pixel ratio as 1.
pub fn sanitize_dpr(dpr: f64) -> f64 {
    if dpr.is_finite() && dpr > 0.0 { dpr } else { 1.0 }
}

/// Backing-store dimensions in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhysicalSize {
    pub width: u32,
    pub height: u32,
}

impl PhysicalSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    Landscape,
    Portrait,
}

/// Container size in logical pixels plus the device pixel ratio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub logical: Size,
    pub dpr: f64,
}

impl Geometry {
    pub fn new(width: f64, height: f64, dpr: f64) -> Self {
        let clamp = |v: f64| if v.is_finite() && v > 0.0 { v } else { 0.0 };
        Self {
            logical: Size::new(clamp(width), clamp(height)),
            dpr: sanitize_dpr(dpr),
        }
    }

    /// Scale factor from logical to physical pixels.
    pub fn scale(&self) -> f64 {
        sanitize_dpr(self.dpr)
    }

    /// `round(logical × dpr)` per axis, at least 1×1.
    pub fn physical(&self) -> PhysicalSize {
        let axis = |v: f64| {
            let scaled = (v * self.scale()).round();
            if scaled >= u32::MAX as f64 {
                u32::MAX
            } else if scaled >= 1.0 {
                scaled as u32
            } else {
                1
            }
        };
        PhysicalSize::new(axis(self.logical.width), axis(self.logical.height))
    }

    pub fn orientation(&self) -> Orientation {
        if self.logical.width > self.logical.height {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        }
    }
}

/// A one-shot timer the host polls.
#[derive(Debug, Clone)]
pub struct DeferredCheck {
    delay: Duration,
    armed_at: Option<Instant>,
}

impl DeferredCheck {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            armed_at: None,
        }
    }

    /// Start (or restart) the countdown.
    pub fn arm(&mut self, now: Instant) {
        self.armed_at = Some(now);
    }

    pub fn is_armed(&self) -> bool {
        self.armed_at.is_some()
    }

    /// True once per arming, when the delay has elapsed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.armed_at {
            Some(at) if now.saturating_duration_since(at) >= self.delay => {
                self.armed_at = None;
                true
            }
            _ => false,
        }
    }
}

/// Defers a re-measure after the device rotates, since the container size
/// reported right after an orientation event can still be stale.
#[derive(Debug, Clone)]
pub struct OrientationWatch {
    check: DeferredCheck,
    last: Option<Orientation>,
}

impl OrientationWatch {
    pub fn new(delay: Duration) -> Self {
        Self {
            check: DeferredCheck::new(delay),
            last: None,
        }
    }

    /// The platform reported an orientation change.
    pub fn notify(&mut self, now: Instant) {
        self.check.arm(now);
    }

    /// Record the geometry just applied; arms the re-check if the
    /// orientation flipped since the previous one.
    pub fn observe(&mut self, geometry: &Geometry, now: Instant) {
        let orientation = geometry.orientation();
        if self.last.is_some_and(|last| last != orientation) {
            self.check.arm(now);
        }
        self.last = Some(orientation);
    }

    pub fn orientation(&self) -> Option<Orientation> {
        self.last
    }

    pub fn is_pending(&self) -> bool {
        self.check.is_armed()
    }

    /// True once when the deferred re-check should run.
    pub fn take_due(&mut self, now: Instant) -> bool {
        self.check.take_due(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_physical_scales_by_dpr() {
        let geometry = Geometry::new(300.0, 150.0, 2.0);
        assert_eq!(geometry.physical(), PhysicalSize::new(600, 300));
    }

    #[test]
    fn test_physical_rounds_fractional_dpr() {
        let geometry = Geometry::new(333.0, 101.0, 1.5);
        assert_eq!(geometry.physical(), PhysicalSize::new(500, 152));
    }

    #[test]
    fn test_bad_dpr_falls_back_to_one() {
        assert_eq!(sanitize_dpr(0.0), 1.0);
        assert_eq!(sanitize_dpr(-2.0), 1.0);
        assert_eq!(sanitize_dpr(f64::NAN), 1.0);
        assert_eq!(Geometry::new(10.0, 10.0, f64::INFINITY).physical(), PhysicalSize::new(10, 10));
    }

    #[test]
    fn test_empty_container_clamps_to_one_pixel() {
        assert_eq!(Geometry::new(0.0, -5.0, 2.0).physical(), PhysicalSize::new(1, 1));
    }

    #[test]
    fn test_orientation() {
        assert_eq!(Geometry::new(800.0, 600.0, 1.0).orientation(), Orientation::Landscape);
        assert_eq!(Geometry::new(600.0, 800.0, 1.0).orientation(), Orientation::Portrait);
        assert_eq!(Geometry::new(500.0, 500.0, 1.0).orientation(), Orientation::Portrait);
    }

    #[test]
    fn test_deferred_check_fires_once() {
        let start = Instant::now();
        let mut check = DeferredCheck::new(Duration::from_millis(100));
        assert!(!check.take_due(start));

        check.arm(start);
        assert!(!check.take_due(start + Duration::from_millis(99)));
        assert!(check.take_due(start + Duration::from_millis(100)));
        assert!(!check.take_due(start + Duration::from_millis(200)));
    }

    #[test]
    fn test_orientation_watch_arms_on_flip() {
        let start = Instant::now();
        let mut watch = OrientationWatch::new(Duration::from_millis(100));
        watch.observe(&Geometry::new(400.0, 800.0, 2.0), start);
        assert!(!watch.is_pending());

        watch.observe(&Geometry::new(800.0, 400.0, 2.0), start);
        assert!(watch.is_pending());
        assert_eq!(watch.orientation(), Some(Orientation::Landscape));
        assert!(watch.take_due(start + Duration::from_millis(150)));
        assert!(!watch.is_pending());
    }

    #[test]
    fn test_orientation_event_restarts_countdown() {
        let start = Instant::now();
        let mut watch = OrientationWatch::new(Duration::from_millis(100));
        watch.notify(start);
        watch.notify(start + Duration::from_millis(80));
        assert!(!watch.take_due(start + Duration::from_millis(120)));
        assert!(watch.take_due(start + Duration::from_millis(180)));
    }
}
