//! Remote store abstraction.
//!
//! The canvas treats its backing store as an ordered, append-only log of
//! strokes plus three small documents: canvas metadata, the shared prompt and
//! one presence record per user. Anything that preserves the record fields
//! and delivers stroke snapshots in timestamp order can back a canvas.

mod memory;

pub use memory::MemoryStore;

use crate::stroke::{Stroke, StrokeDraft, StrokeId, Timestamp, UserName};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use thiserror::Error;

/// Store errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Write rejected: {0}")]
    Rejected(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Boxed future for async operations (compatible with WASM).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Shared canvas metadata document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasMeta {
    /// Time of the last full clear. In a write, `None` asks the store to
    /// stamp its own current time.
    #[serde(default)]
    pub last_reset: Option<Timestamp>,
}

impl CanvasMeta {
    /// Metadata write that records a reset at the store's current time.
    pub fn reset_now() -> Self {
        Self { last_reset: None }
    }
}

/// The shared prompt shown above the canvas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub text: String,
    pub updated_by: UserName,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

/// One user's presence document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user: UserName,
    pub online: bool,
    pub timestamp: Timestamp,
}

/// A single write inside an atomic [`CanvasStore::commit`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    DeleteStroke(StrokeId),
    SetMeta(CanvasMeta),
    DeletePrompt,
}

/// What a subscription listener receives.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent<T> {
    /// The full current value.
    Snapshot(T),
    /// The subscription hit an error. Later snapshots may still follow.
    Failed(StoreError),
}

/// Subscription callback.
pub type Listener<T> = Box<dyn FnMut(StoreEvent<T>)>;

/// Handle to a live subscription. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Backing store for a shared canvas.
///
/// Calls are single-threaded; listeners are never invoked from inside one of
/// these methods, only from the store's own event delivery.
pub trait CanvasStore {
    /// Watch the stroke log. Every delivery carries the full list ordered by
    /// ascending timestamp, starting with the current contents.
    fn subscribe_strokes(&self, listener: Listener<Vec<Stroke>>) -> Subscription;

    /// Append a stroke; the store assigns its id and timestamp.
    fn append_stroke(&self, draft: StrokeDraft) -> BoxFuture<'_, StoreResult<StrokeId>>;

    /// Remove a single stroke.
    fn delete_stroke(&self, id: &StrokeId) -> BoxFuture<'_, StoreResult<()>>;

    /// Ids of every stroke currently in the log.
    fn stroke_ids(&self) -> BoxFuture<'_, StoreResult<Vec<StrokeId>>>;

    /// Apply all writes atomically: observers see either none or all of them.
    fn commit(&self, ops: Vec<WriteOp>) -> BoxFuture<'_, StoreResult<()>>;

    /// Read the metadata document, `None` if it was never written.
    fn read_meta(&self) -> BoxFuture<'_, StoreResult<Option<CanvasMeta>>>;

    fn subscribe_prompt(&self, listener: Listener<Option<Prompt>>) -> Subscription;

    /// Overwrite the prompt; the store stamps the time.
    fn set_prompt(&self, text: &str, updated_by: &UserName) -> BoxFuture<'_, StoreResult<()>>;

    /// Mark `user` online.
    fn set_presence(&self, user: &UserName) -> BoxFuture<'_, StoreResult<()>>;

    /// Remove `user`'s presence document.
    fn clear_presence(&self, user: &UserName) -> BoxFuture<'_, StoreResult<()>>;

    /// Watch one user's presence document.
    fn subscribe_presence(
        &self,
        user: &UserName,
        listener: Listener<Option<PresenceRecord>>,
    ) -> Subscription;
}

impl<S: CanvasStore + ?Sized> CanvasStore for Rc<S> {
    fn subscribe_strokes(&self, listener: Listener<Vec<Stroke>>) -> Subscription {
        (**self).subscribe_strokes(listener)
    }

    fn append_stroke(&self, draft: StrokeDraft) -> BoxFuture<'_, StoreResult<StrokeId>> {
        (**self).append_stroke(draft)
    }

    fn delete_stroke(&self, id: &StrokeId) -> BoxFuture<'_, StoreResult<()>> {
        (**self).delete_stroke(id)
    }

    fn stroke_ids(&self) -> BoxFuture<'_, StoreResult<Vec<StrokeId>>> {
        (**self).stroke_ids()
    }

    fn commit(&self, ops: Vec<WriteOp>) -> BoxFuture<'_, StoreResult<()>> {
        (**self).commit(ops)
    }

    fn read_meta(&self) -> BoxFuture<'_, StoreResult<Option<CanvasMeta>>> {
        (**self).read_meta()
    }

    fn subscribe_prompt(&self, listener: Listener<Option<Prompt>>) -> Subscription {
        (**self).subscribe_prompt(listener)
    }

    fn set_prompt(&self, text: &str, updated_by: &UserName) -> BoxFuture<'_, StoreResult<()>> {
        (**self).set_prompt(text, updated_by)
    }

    fn set_presence(&self, user: &UserName) -> BoxFuture<'_, StoreResult<()>> {
        (**self).set_presence(user)
    }

    fn clear_presence(&self, user: &UserName) -> BoxFuture<'_, StoreResult<()>> {
        (**self).clear_presence(user)
    }

    fn subscribe_presence(
        &self,
        user: &UserName,
        listener: Listener<Option<PresenceRecord>>,
    ) -> Subscription {
        (**self).subscribe_presence(user, listener)
    }
}
