//! Browser bindings: an HTML canvas surface and page-level helpers.

use crate::surface::{Surface, SurfaceError, SurfaceResult};
use duetboard_core::{CanvasStore, Geometry, PhysicalSize, SerializableColor, StrokeDraft, SyncEngine};
use kurbo::{Affine, Point, Rect, Size};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{CanvasRenderingContext2d, Element, HtmlCanvasElement};

fn js_err(err: JsValue) -> SurfaceError {
    SurfaceError::Backend(format!("{:?}", err))
}

/// [`Surface`] backed by a `<canvas>` element's 2D context.
pub struct WebCanvasSurface {
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
}

impl WebCanvasSurface {
    pub fn new(canvas: HtmlCanvasElement) -> SurfaceResult<Self> {
        let ctx = canvas
            .get_context("2d")
            .map_err(js_err)?
            .ok_or_else(|| SurfaceError::Backend("2d context unavailable".to_string()))?
            .dyn_into::<CanvasRenderingContext2d>()
            .map_err(|_| SurfaceError::Backend("not a 2d context".to_string()))?;
        Ok(Self { canvas, ctx })
    }

    pub fn canvas(&self) -> &HtmlCanvasElement {
        &self.canvas
    }
}

impl Surface for WebCanvasSurface {
    fn physical_size(&self) -> PhysicalSize {
        PhysicalSize::new(self.canvas.width(), self.canvas.height())
    }

    fn set_physical_size(&mut self, size: PhysicalSize) -> SurfaceResult<()> {
        if size.width == 0 || size.height == 0 {
            return Err(SurfaceError::InvalidSize {
                width: size.width,
                height: size.height,
            });
        }
        // Assigning either dimension resets the bitmap and the context state.
        self.canvas.set_width(size.width);
        self.canvas.set_height(size.height);
        Ok(())
    }

    fn set_display_size(&mut self, size: Size) -> SurfaceResult<()> {
        let style = self.canvas.style();
        style
            .set_property("width", &format!("{}px", size.width))
            .map_err(js_err)?;
        style
            .set_property("height", &format!("{}px", size.height))
            .map_err(js_err)
    }

    fn set_transform(&mut self, transform: Affine) -> SurfaceResult<()> {
        let [a, b, c, d, e, f] = transform.as_coeffs();
        self.ctx.set_transform(a, b, c, d, e, f).map_err(js_err)
    }

    fn clear(&mut self) -> SurfaceResult<()> {
        self.ctx.save();
        let result = self.ctx.set_transform(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);
        if result.is_ok() {
            self.ctx.clear_rect(
                0.0,
                0.0,
                f64::from(self.canvas.width()),
                f64::from(self.canvas.height()),
            );
        }
        self.ctx.restore();
        result.map_err(js_err)
    }

    fn fill_rect(&mut self, rect: Rect, color: SerializableColor) -> SurfaceResult<()> {
        self.ctx.set_fill_style_str(&color.to_hex());
        self.ctx.fill_rect(rect.x0, rect.y0, rect.width(), rect.height());
        Ok(())
    }

    fn stroke_polyline(
        &mut self,
        points: &[Point],
        color: SerializableColor,
        width: f64,
    ) -> SurfaceResult<()> {
        let Some((first, rest)) = points.split_first() else {
            return Ok(());
        };
        self.ctx.begin_path();
        self.ctx.move_to(first.x, first.y);
        for p in rest {
            self.ctx.line_to(p.x, p.y);
        }
        self.ctx.set_stroke_style_str(&color.to_hex());
        self.ctx.set_line_width(width);
        self.ctx.set_line_cap("round");
        self.ctx.set_line_join("round");
        self.ctx.stroke();
        Ok(())
    }

    fn fill_circle(
        &mut self,
        center: Point,
        radius: f64,
        color: SerializableColor,
    ) -> SurfaceResult<()> {
        self.ctx.begin_path();
        self.ctx
            .arc(center.x, center.y, radius, 0.0, std::f64::consts::TAU)
            .map_err(js_err)?;
        self.ctx.set_fill_style_str(&color.to_hex());
        self.ctx.fill();
        Ok(())
    }
}

/// The window's device pixel ratio, or 1 outside a browser window.
pub fn device_pixel_ratio() -> f64 {
    web_sys::window().map_or(1.0, |w| w.device_pixel_ratio())
}

/// Element box in client coordinates.
pub fn element_bounds(element: &Element) -> Rect {
    let r = element.get_bounding_client_rect();
    Rect::from_origin_size((r.left(), r.top()), (r.width(), r.height()))
}

/// Current canvas geometry for a container element.
pub fn element_geometry(element: &Element) -> Geometry {
    let bounds = element_bounds(element);
    Geometry::new(bounds.width(), bounds.height(), device_pixel_ratio())
}

/// Install the panic hook and route `log` to the browser console.
pub fn init_logging() {
    console_error_panic_hook::set_once();
    if console_log::init_with_level(log::Level::Info).is_err() {
        log::debug!("Logger already initialized");
    }
}

/// Persist a finished gesture in the background.
pub fn spawn_commit<S: CanvasStore + 'static>(engine: SyncEngine<S>, draft: StrokeDraft) {
    wasm_bindgen_futures::spawn_local(async move {
        if let Some(id) = engine.append(draft).await {
            log::debug!("Stroke {} saved", id.0);
        }
    });
}

#[wasm_bindgen(start)]
pub fn start() {
    init_logging();
    log::info!("Starting Duetboard (WASM)");
}
