//! Render a stroke log to PNG.
//!
//! Usage: `duetboard-snapshot <strokes.json> <out.png> [width height [dpr]]`
//!
//! The input is a JSON array of stroke records as exported by the store.

use duetboard_core::{Geometry, Stroke, order_strokes};
use duetboard_render::{CpuSurface, Reconstructor};
use std::error::Error;

const DEFAULT_WIDTH: f64 = 800.0;
const DEFAULT_HEIGHT: f64 = 600.0;

fn parse_arg(args: &[String], index: usize, default: f64) -> Result<f64, Box<dyn Error>> {
    match args.get(index) {
        Some(raw) => Ok(raw.parse().map_err(|e| format!("Bad number {:?}: {}", raw, e))?),
        None => Ok(default),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (Some(input), Some(output)) = (args.first(), args.get(1)) else {
        return Err("usage: duetboard-snapshot <strokes.json> <out.png> [width height [dpr]]".into());
    };
    let geometry = Geometry::new(
        parse_arg(&args, 2, DEFAULT_WIDTH)?,
        parse_arg(&args, 3, DEFAULT_HEIGHT)?,
        parse_arg(&args, 4, 1.0)?,
    );

    let json = std::fs::read_to_string(input)?;
    let mut strokes: Vec<Stroke> = serde_json::from_str(&json)?;
    order_strokes(&mut strokes);
    log::info!("Loaded {} strokes from {}", strokes.len(), input);

    let mut surface = CpuSurface::new(geometry.physical())?;
    Reconstructor::default().reconstruct(&mut surface, &geometry, &strokes)?;
    let snapshot = surface.snapshot()?;
    std::fs::write(output, snapshot.to_png()?)?;

    log::info!(
        "Wrote {}x{} snapshot to {}",
        snapshot.width,
        snapshot.height,
        output
    );
    Ok(())
}
