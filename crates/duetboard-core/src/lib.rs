//! Duetboard Core Library
//!
//! Platform-agnostic data model, store interface and sync engine for the
//! Duetboard shared sketch canvas.

pub mod clock;
pub mod config;
pub mod input;
pub mod lifecycle;
pub mod session;
pub mod store;
pub mod stroke;
pub mod sync;
pub mod viewport;

#[cfg(test)]
mod test_support;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CanvasConfig, ConfigError};
pub use input::{InputAction, InputTracker, LiveStroke, PointerEvent, client_to_logical};
pub use lifecycle::{ExpiryCheck, LifecyclePolicy};
pub use session::{CanvasSession, order_strokes};
pub use store::{
    BoxFuture, CanvasMeta, CanvasStore, MemoryStore, PresenceRecord, Prompt, StoreError,
    StoreEvent, StoreResult, Subscription, WriteOp,
};
pub use stroke::{Brush, SerializableColor, Stroke, StrokeDraft, StrokeId, Timestamp, UserName};
pub use sync::SyncEngine;
pub use viewport::{DeferredCheck, Geometry, Orientation, OrientationWatch, PhysicalSize};
