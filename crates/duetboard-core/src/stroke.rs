//! Stroke model: the atomic unit of shared drawing.
//!
//! A stroke is one continuous pointer drag, stored as an ordered list of
//! points in logical (CSS) pixels together with its color, width and author.
//! The remote store assigns the `id` and `timestamp`; a stroke that has not
//! been acknowledged yet carries neither.

use kurbo::{BezPath, Point, Rect};
use peniko::Color;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Canvas background. Also the eraser color.
pub const BACKGROUND: SerializableColor = SerializableColor::rgb(0xfa, 0xfa, 0xfa);

/// Default ink color.
pub const DEFAULT_COLOR: SerializableColor = SerializableColor::rgb(0x1a, 0x1a, 0x1a);

/// Ink colors offered to the user.
pub const PALETTE: [SerializableColor; 12] = [
    SerializableColor::rgb(0x1a, 0x1a, 0x1a),
    SerializableColor::rgb(0xff, 0xff, 0xff),
    SerializableColor::rgb(0xef, 0x44, 0x44),
    SerializableColor::rgb(0xf9, 0x73, 0x16),
    SerializableColor::rgb(0xea, 0xb3, 0x08),
    SerializableColor::rgb(0x22, 0xc5, 0x5e),
    SerializableColor::rgb(0x14, 0xb8, 0xa6),
    SerializableColor::rgb(0x38, 0xbd, 0xf8),
    SerializableColor::rgb(0x3b, 0x82, 0xf6),
    SerializableColor::rgb(0x8b, 0x5c, 0xf6),
    SerializableColor::rgb(0xec, 0x48, 0x99),
    SerializableColor::rgb(0x92, 0x40, 0x0e),
];

/// Base stroke widths in logical pixels.
pub const STROKE_WIDTHS: [f64; 4] = [2.0, 5.0, 10.0, 18.0];

/// Width selected when a session starts.
pub const DEFAULT_WIDTH: f64 = 5.0;

/// Eraser strokes are this much wider than the selected base width.
pub const ERASER_WIDTH_MULTIPLIER: f64 = 2.5;

/// Diameter multiplier for the eraser's tap-feedback dot.
pub const ERASER_DOT_MULTIPLIER: f64 = 2.0;

/// A stroke needs at least this many points to be persisted.
pub const MIN_COMMIT_POINTS: usize = 2;

/// Error returned when a color string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid color: {0:?}")]
pub struct ColorParseError(pub String);

/// Serializable color representation (RGBA8).
///
/// On the wire a color is a CSS hex string (`#rrggbb`, or `#rrggbbaa` when
/// not fully opaque), which is what the stored stroke records use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Fully opaque color.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`.
    pub fn from_hex(input: &str) -> Result<Self, ColorParseError> {
        let err = || ColorParseError(input.to_string());
        let hex = input.trim().strip_prefix('#').ok_or_else(err)?;
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(err());
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| err());
        match hex.len() {
            3 => {
                let nibble = |i: usize| {
                    u8::from_str_radix(&hex[i..=i], 16)
                        .map(|n| n * 17)
                        .map_err(|_| err())
                };
                Ok(Self::rgb(nibble(0)?, nibble(1)?, nibble(2)?))
            }
            6 => Ok(Self::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Ok(Self::new(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => Err(err()),
        }
    }

    /// Lowercase CSS hex form.
    pub fn to_hex(self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl fmt::Display for SerializableColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for SerializableColor {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<SerializableColor> for String {
    fn from(color: SerializableColor) -> Self {
        color.to_hex()
    }
}

impl From<Color> for SerializableColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<SerializableColor> for Color {
    fn from(color: SerializableColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// Opaque identifier assigned by the store on append.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrokeId(pub String);

impl StrokeId {
    /// Fresh random identifier, for stores that mint their own ids.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StrokeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store-assigned ordering key, in milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub const EPOCH: Timestamp = Timestamp(0);

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Time elapsed from `earlier` to `self`; zero if `earlier` is later.
    pub fn since(self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }

    /// `self` moved back by `duration`, saturating at the epoch.
    pub fn saturating_sub(self, duration: Duration) -> Timestamp {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Timestamp(self.0.saturating_sub(millis))
    }
}

/// One of the two people sharing the canvas.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserName(pub String);

impl UserName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stroke as handed to the store: no id and no timestamp yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeDraft {
    pub points: Vec<Point>,
    pub color: SerializableColor,
    pub width: f64,
    pub author: UserName,
}

impl StrokeDraft {
    /// Whether the draft has enough points to be persisted.
    pub fn is_committable(&self) -> bool {
        self.points.len() >= MIN_COMMIT_POINTS
    }

    /// Attach the store-assigned identity and ordering key.
    pub fn into_stroke(self, id: StrokeId, timestamp: Timestamp) -> Stroke {
        Stroke {
            id: Some(id),
            points: self.points,
            color: self.color,
            width: self.width,
            author: self.author,
            timestamp: Some(timestamp),
        }
    }
}

/// A committed (or in-flight) freehand stroke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<StrokeId>,
    /// Points in logical pixels, in drawing order.
    pub points: Vec<Point>,
    pub color: SerializableColor,
    /// Thickness in logical pixels.
    pub width: f64,
    pub author: UserName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

impl Stroke {
    /// Whether the stroke has enough points to be persisted and drawn.
    pub fn is_committable(&self) -> bool {
        self.points.len() >= MIN_COMMIT_POINTS
    }

    /// Strictly connected polyline through the points.
    pub fn to_path(&self) -> BezPath {
        let mut path = BezPath::new();
        let mut points = self.points.iter();
        if let Some(first) = points.next() {
            path.move_to(*first);
            for point in points {
                path.line_to(*point);
            }
        }
        path
    }

    /// Logical-pixel area the stroke can touch (points inflated by half the width).
    pub fn bounds(&self) -> Rect {
        let Some(first) = self.points.first() else {
            return Rect::ZERO;
        };
        let rect = self
            .points
            .iter()
            .skip(1)
            .fold(Rect::from_points(*first, *first), |acc, p| {
                acc.union_pt(*p)
            });
        rect.inflate(self.width / 2.0, self.width / 2.0)
    }
}

/// The currently selected ink.
///
/// Selecting a color or a width leaves eraser mode, matching the picker
/// behavior of the canvas toolbar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Brush {
    pub color: SerializableColor,
    pub base_width: f64,
    pub eraser: bool,
    pub background: SerializableColor,
    pub eraser_width_multiplier: f64,
    pub eraser_dot_multiplier: f64,
}

impl Default for Brush {
    fn default() -> Self {
        Self {
            color: DEFAULT_COLOR,
            base_width: DEFAULT_WIDTH,
            eraser: false,
            background: BACKGROUND,
            eraser_width_multiplier: ERASER_WIDTH_MULTIPLIER,
            eraser_dot_multiplier: ERASER_DOT_MULTIPLIER,
        }
    }
}

impl Brush {
    pub fn select_color(&mut self, color: SerializableColor) {
        self.color = color;
        self.eraser = false;
    }

    pub fn select_width(&mut self, width: f64) {
        self.base_width = width;
        self.eraser = false;
    }

    pub fn toggle_eraser(&mut self) {
        self.eraser = !self.eraser;
    }

    /// Color written into committed strokes.
    pub fn stroke_color(&self) -> SerializableColor {
        if self.eraser { self.background } else { self.color }
    }

    /// Width written into committed strokes.
    pub fn stroke_width(&self) -> f64 {
        if self.eraser {
            self.base_width * self.eraser_width_multiplier
        } else {
            self.base_width
        }
    }

    /// Radius of the feedback dot painted on pointer-down.
    pub fn dot_radius(&self) -> f64 {
        if self.eraser {
            self.base_width * self.eraser_dot_multiplier / 2.0
        } else {
            self.base_width / 2.0
        }
    }
}
