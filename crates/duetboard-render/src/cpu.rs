//! Software surface rendered with `vello_cpu`.
//!
//! Drawing calls are recorded as a display list; [`CpuSurface::snapshot`]
//! rasterizes the list from scratch, so the same calls always produce the
//! same bytes.

use crate::surface::{Surface, SurfaceError, SurfaceResult};
use duetboard_core::{PhysicalSize, SerializableColor};
use kurbo::{Affine, Point, Rect, Size};
use vello_cpu::kurbo::Shape as _;

/// Tolerance used when flattening circles.
const CIRCLE_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, PartialEq)]
enum Command {
    FillRect {
        transform: Affine,
        rect: Rect,
        color: SerializableColor,
    },
    Polyline {
        transform: Affine,
        points: Vec<Point>,
        color: SerializableColor,
        width: f64,
    },
    Circle {
        transform: Affine,
        center: Point,
        radius: f64,
        color: SerializableColor,
    },
}

fn checked_dims(size: PhysicalSize) -> SurfaceResult<(u16, u16)> {
    let invalid = || SurfaceError::InvalidSize {
        width: size.width,
        height: size.height,
    };
    let width = u16::try_from(size.width).map_err(|_| invalid())?;
    let height = u16::try_from(size.height).map_err(|_| invalid())?;
    if width == 0 || height == 0 {
        return Err(invalid());
    }
    Ok((width, height))
}

fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn point_to_cpu(p: Point) -> vello_cpu::kurbo::Point {
    vello_cpu::kurbo::Point::new(p.x, p.y)
}

fn color_to_cpu(c: SerializableColor) -> vello_cpu::peniko::Color {
    c.into()
}

fn polyline_to_cpu(points: &[Point]) -> vello_cpu::kurbo::BezPath {
    let mut out = vello_cpu::kurbo::BezPath::new();
    let mut iter = points.iter();
    if let Some(first) = iter.next() {
        out.move_to(point_to_cpu(*first));
        for p in iter {
            out.line_to(point_to_cpu(*p));
        }
    }
    out
}

fn draw(ctx: &mut vello_cpu::RenderContext, command: &Command) {
    match command {
        Command::FillRect {
            transform,
            rect,
            color,
        } => {
            ctx.set_transform(affine_to_cpu(*transform));
            ctx.set_paint(color_to_cpu(*color));
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(rect.x0, rect.y0, rect.x1, rect.y1));
        }
        Command::Polyline {
            transform,
            points,
            color,
            width,
        } => {
            ctx.set_transform(affine_to_cpu(*transform));
            ctx.set_paint(color_to_cpu(*color));
            ctx.set_stroke(
                vello_cpu::kurbo::Stroke::new(*width)
                    .with_caps(vello_cpu::kurbo::Cap::Round)
                    .with_join(vello_cpu::kurbo::Join::Round),
            );
            ctx.stroke_path(&polyline_to_cpu(points));
        }
        Command::Circle {
            transform,
            center,
            radius,
            color,
        } => {
            ctx.set_transform(affine_to_cpu(*transform));
            ctx.set_paint(color_to_cpu(*color));
            let circle = vello_cpu::kurbo::Circle::new(point_to_cpu(*center), *radius);
            ctx.fill_path(&circle.to_path(CIRCLE_TOLERANCE));
        }
    }
}

/// RGBA8 pixels read back from a [`CpuSurface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA data (4 bytes per pixel).
    pub data: Vec<u8>,
}

impl Snapshot {
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y as usize) * (self.width as usize) + x as usize) * 4;
        self.data.get(i..i + 4).map(|p| [p[0], p[1], p[2], p[3]])
    }

    /// Number of pixels not equal to `color`.
    pub fn count_other_than(&self, color: SerializableColor) -> usize {
        let target = [color.r, color.g, color.b, color.a];
        self.data.chunks_exact(4).filter(|p| *p != target).count()
    }

    /// Encode as PNG bytes.
    pub fn to_png(&self) -> SurfaceResult<Vec<u8>> {
        let mut png_data = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut png_data, self.width, self.height);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);

            let mut writer = encoder
                .write_header()
                .map_err(|e| SurfaceError::Backend(format!("PNG header: {}", e)))?;
            writer
                .write_image_data(&self.data)
                .map_err(|e| SurfaceError::Backend(format!("PNG data: {}", e)))?;
        }
        Ok(png_data)
    }
}

/// Headless surface for tests and offline rendering.
#[derive(Debug, Clone)]
pub struct CpuSurface {
    size: PhysicalSize,
    display: Size,
    transform: Affine,
    commands: Vec<Command>,
}

impl CpuSurface {
    pub fn new(size: PhysicalSize) -> SurfaceResult<Self> {
        checked_dims(size)?;
        Ok(Self {
            size,
            display: Size::new(size.width as f64, size.height as f64),
            transform: Affine::IDENTITY,
            commands: Vec::new(),
        })
    }

    pub fn display_size(&self) -> Size {
        self.display
    }

    pub fn transform(&self) -> Affine {
        self.transform
    }

    /// Number of drawing calls since the last clear.
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    /// Rasterize the current contents.
    pub fn snapshot(&self) -> SurfaceResult<Snapshot> {
        let (width, height) = checked_dims(self.size)?;
        let mut ctx = vello_cpu::RenderContext::new(width, height);
        for command in &self.commands {
            draw(&mut ctx, command);
        }
        ctx.flush();
        let mut pixmap = vello_cpu::Pixmap::new(width, height);
        ctx.render_to_pixmap(&mut pixmap);
        Ok(Snapshot {
            width: u32::from(width),
            height: u32::from(height),
            data: pixmap.data_as_u8_slice().to_vec(),
        })
    }
}

impl Surface for CpuSurface {
    fn physical_size(&self) -> PhysicalSize {
        self.size
    }

    fn set_physical_size(&mut self, size: PhysicalSize) -> SurfaceResult<()> {
        checked_dims(size)?;
        log::debug!("CPU surface reallocated to {}x{}", size.width, size.height);
        self.size = size;
        self.transform = Affine::IDENTITY;
        self.commands.clear();
        Ok(())
    }

    fn set_display_size(&mut self, size: Size) -> SurfaceResult<()> {
        self.display = size;
        Ok(())
    }

    fn set_transform(&mut self, transform: Affine) -> SurfaceResult<()> {
        self.transform = transform;
        Ok(())
    }

    fn clear(&mut self) -> SurfaceResult<()> {
        self.commands.clear();
        Ok(())
    }

    fn fill_rect(&mut self, rect: Rect, color: SerializableColor) -> SurfaceResult<()> {
        self.commands.push(Command::FillRect {
            transform: self.transform,
            rect,
            color,
        });
        Ok(())
    }

    fn stroke_polyline(
        &mut self,
        points: &[Point],
        color: SerializableColor,
        width: f64,
    ) -> SurfaceResult<()> {
        if points.is_empty() {
            return Ok(());
        }
        self.commands.push(Command::Polyline {
            transform: self.transform,
            points: points.to_vec(),
            color,
            width,
        });
        Ok(())
    }

    fn fill_circle(
        &mut self,
        center: Point,
        radius: f64,
        color: SerializableColor,
    ) -> SurfaceResult<()> {
        self.commands.push(Command::Circle {
            transform: self.transform,
            center,
            radius,
            color,
        });
        Ok(())
    }
}
