//! In-memory store implementation.

use super::{
    BoxFuture, CanvasMeta, CanvasStore, Listener, PresenceRecord, Prompt, StoreError, StoreEvent,
    StoreResult, Subscription, WriteOp,
};
use crate::clock::{Clock, SystemClock};
use crate::stroke::{Stroke, StrokeDraft, StrokeId, Timestamp, UserName};
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

type SharedListener<T> = Rc<RefCell<Listener<T>>>;
type Delivery = Box<dyn FnOnce()>;

/// Queue a single event for one listener. The job holds a weak handle so an
/// unsubscribed listener is skipped.
fn delivery<T: 'static>(listener: &SharedListener<T>, event: StoreEvent<T>) -> Delivery {
    let weak = Rc::downgrade(listener);
    Box::new(move || {
        if let Some(listener) = weak.upgrade() {
            if let Ok(mut callback) = listener.try_borrow_mut() {
                callback(event);
            }
        }
    })
}

struct Inner {
    clock: Box<dyn Clock>,
    last_stamp: u64,
    offline: bool,
    dispatching: bool,
    /// Kept in ascending timestamp order.
    strokes: Vec<Stroke>,
    meta: Option<CanvasMeta>,
    prompt: Option<Prompt>,
    presence: BTreeMap<UserName, PresenceRecord>,
    next_listener: u64,
    stroke_listeners: Vec<(u64, SharedListener<Vec<Stroke>>)>,
    prompt_listeners: Vec<(u64, SharedListener<Option<Prompt>>)>,
    presence_listeners: Vec<(u64, UserName, SharedListener<Option<PresenceRecord>>)>,
    queue: VecDeque<Delivery>,
}

impl Inner {
    fn new(clock: Box<dyn Clock>) -> Self {
        Self {
            clock,
            last_stamp: 0,
            offline: false,
            dispatching: false,
            strokes: Vec::new(),
            meta: None,
            prompt: None,
            presence: BTreeMap::new(),
            next_listener: 0,
            stroke_listeners: Vec::new(),
            prompt_listeners: Vec::new(),
            presence_listeners: Vec::new(),
            queue: VecDeque::new(),
        }
    }

    /// Server time: wall clock, but never equal to or behind the previous stamp.
    fn stamp(&mut self) -> Timestamp {
        let now = self.clock.now().as_millis();
        self.last_stamp = now.max(self.last_stamp.saturating_add(1));
        Timestamp::from_millis(self.last_stamp)
    }

    fn ensure_online(&self) -> StoreResult<()> {
        if self.offline {
            Err(StoreError::Unavailable("memory store is offline".into()))
        } else {
            Ok(())
        }
    }

    fn listener_id(&mut self) -> u64 {
        self.next_listener += 1;
        self.next_listener
    }

    fn insert_ordered(&mut self, stroke: Stroke) {
        let key = stroke.timestamp;
        let at = self
            .strokes
            .partition_point(|s| match (s.timestamp, key) {
                (_, None) => true,
                (None, Some(_)) => false,
                (Some(a), Some(b)) => a <= b,
            });
        self.strokes.insert(at, stroke);
    }

    fn notify_strokes(&mut self) {
        for (_, listener) in &self.stroke_listeners {
            let job = delivery(listener, StoreEvent::Snapshot(self.strokes.clone()));
            self.queue.push_back(job);
        }
    }

    fn notify_prompt(&mut self) {
        for (_, listener) in &self.prompt_listeners {
            let job = delivery(listener, StoreEvent::Snapshot(self.prompt.clone()));
            self.queue.push_back(job);
        }
    }

    fn notify_presence(&mut self, user: &UserName) {
        let record = self.presence.get(user).cloned();
        for (_, watched, listener) in &self.presence_listeners {
            if watched == user {
                let job = delivery(listener, StoreEvent::Snapshot(record.clone()));
                self.queue.push_back(job);
            }
        }
    }
}

/// Single-process store for tests and local canvases.
///
/// Cloning yields another handle to the same store, which is how two
/// simulated clients share one log. Change notifications are queued and only
/// delivered from [`MemoryStore::dispatch`].
#[derive(Clone)]
pub struct MemoryStore {
    inner: Rc<RefCell<Inner>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("MemoryStore")
            .field("strokes", &inner.strokes.len())
            .field("meta", &inner.meta)
            .field("offline", &inner.offline)
            .field("pending", &inner.queue.len())
            .finish()
    }
}

impl MemoryStore {
    /// Create an empty store stamped by the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Create an empty store stamped by `clock`.
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner::new(Box::new(clock)))),
        }
    }

    /// Deliver queued notifications, including any queued while delivering.
    /// Returns the number of deliveries made. Nested calls return 0.
    pub fn dispatch(&self) -> usize {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.dispatching {
                return 0;
            }
            inner.dispatching = true;
        }
        let mut delivered = 0;
        loop {
            let next = self.inner.borrow_mut().queue.pop_front();
            let Some(job) = next else {
                break;
            };
            job();
            delivered += 1;
        }
        self.inner.borrow_mut().dispatching = false;
        delivered
    }

    /// Number of queued notifications.
    pub fn pending(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// Make every read and write fail with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.inner.borrow_mut().offline = offline;
    }

    /// Queue a failure event for every stroke subscriber.
    pub fn fail_stroke_subscribers(&self, error: StoreError) {
        let mut inner = self.inner.borrow_mut();
        let jobs: Vec<Delivery> = inner
            .stroke_listeners
            .iter()
            .map(|(_, l)| delivery(l, StoreEvent::Failed(error.clone())))
            .collect();
        inner.queue.extend(jobs);
    }

    /// Queue an arbitrary stroke list for every stroke subscriber, in the
    /// given order, without touching the log.
    pub fn deliver_raw_snapshot(&self, strokes: Vec<Stroke>) {
        let mut inner = self.inner.borrow_mut();
        let jobs: Vec<Delivery> = inner
            .stroke_listeners
            .iter()
            .map(|(_, l)| delivery(l, StoreEvent::Snapshot(strokes.clone())))
            .collect();
        inner.queue.extend(jobs);
    }

    /// Insert a stroke as-is (id and timestamp filled in if missing).
    pub fn seed_stroke(&self, mut stroke: Stroke) -> StrokeId {
        let mut inner = self.inner.borrow_mut();
        let id = stroke.id.get_or_insert_with(StrokeId::generate).clone();
        match stroke.timestamp {
            Some(ts) => inner.last_stamp = inner.last_stamp.max(ts.as_millis()),
            None => stroke.timestamp = Some(inner.stamp()),
        }
        inner.insert_ordered(stroke);
        inner.notify_strokes();
        id
    }

    pub fn seed_meta(&self, meta: CanvasMeta) {
        self.inner.borrow_mut().meta = Some(meta);
    }

    pub fn seed_prompt(&self, prompt: Prompt) {
        let mut inner = self.inner.borrow_mut();
        inner.prompt = Some(prompt);
        inner.notify_prompt();
    }

    /// The log, in timestamp order.
    pub fn strokes(&self) -> Vec<Stroke> {
        self.inner.borrow().strokes.clone()
    }

    pub fn meta(&self) -> Option<CanvasMeta> {
        self.inner.borrow().meta
    }

    pub fn prompt(&self) -> Option<Prompt> {
        self.inner.borrow().prompt.clone()
    }

    pub fn presence(&self, user: &UserName) -> Option<PresenceRecord> {
        self.inner.borrow().presence.get(user).cloned()
    }

    /// Number of live subscriptions of any kind.
    pub fn listener_count(&self) -> usize {
        let inner = self.inner.borrow();
        inner.stroke_listeners.len() + inner.prompt_listeners.len() + inner.presence_listeners.len()
    }

    /// Serialize the stroke log as a JSON array.
    pub fn export_json(&self) -> StoreResult<String> {
        Ok(serde_json::to_string(&self.inner.borrow().strokes)?)
    }

    /// Load strokes from a JSON array, keeping their ids and timestamps.
    /// Returns the number of strokes loaded.
    pub fn import_json(&self, json: &str) -> StoreResult<usize> {
        let strokes: Vec<Stroke> = serde_json::from_str(json)?;
        let count = strokes.len();
        for stroke in strokes {
            self.seed_stroke(stroke);
        }
        Ok(count)
    }

    fn cancel_handle(&self, remove: impl FnOnce(&mut Inner) + 'static) -> Subscription {
        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                if let Ok(mut inner) = inner.try_borrow_mut() {
                    remove(&mut inner);
                }
            }
        })
    }
}

impl CanvasStore for MemoryStore {
    fn subscribe_strokes(&self, listener: Listener<Vec<Stroke>>) -> Subscription {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.listener_id();
            let listener = Rc::new(RefCell::new(listener));
            let job = delivery(&listener, StoreEvent::Snapshot(inner.strokes.clone()));
            inner.queue.push_back(job);
            inner.stroke_listeners.push((id, listener));
            id
        };
        self.cancel_handle(move |inner| inner.stroke_listeners.retain(|(i, _)| *i != id))
    }

    fn append_stroke(&self, draft: StrokeDraft) -> BoxFuture<'_, StoreResult<StrokeId>> {
        Box::pin(async move {
            let mut inner = self.inner.borrow_mut();
            inner.ensure_online()?;
            if draft.author.as_str().is_empty() {
                return Err(StoreError::Rejected("stroke has no author".into()));
            }
            if !(draft.width.is_finite() && draft.width > 0.0) {
                return Err(StoreError::Rejected(format!(
                    "invalid stroke width {}",
                    draft.width
                )));
            }
            let id = StrokeId::generate();
            let timestamp = inner.stamp();
            log::debug!(
                "append stroke {} by {} ({} points) at {}",
                id,
                draft.author,
                draft.points.len(),
                timestamp.as_millis()
            );
            inner.insert_ordered(draft.into_stroke(id.clone(), timestamp));
            inner.notify_strokes();
            Ok(id)
        })
    }

    fn delete_stroke(&self, id: &StrokeId) -> BoxFuture<'_, StoreResult<()>> {
        let id = id.clone();
        Box::pin(async move {
            let mut inner = self.inner.borrow_mut();
            inner.ensure_online()?;
            let index = inner
                .strokes
                .iter()
                .position(|s| s.id.as_ref() == Some(&id))
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            inner.strokes.remove(index);
            inner.notify_strokes();
            Ok(())
        })
    }

    fn stroke_ids(&self) -> BoxFuture<'_, StoreResult<Vec<StrokeId>>> {
        Box::pin(async move {
            let inner = self.inner.borrow();
            inner.ensure_online()?;
            Ok(inner.strokes.iter().filter_map(|s| s.id.clone()).collect())
        })
    }

    fn commit(&self, ops: Vec<WriteOp>) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            let mut inner = self.inner.borrow_mut();
            inner.ensure_online()?;
            let now = inner.stamp();
            let (mut strokes_changed, mut prompt_changed) = (false, false);
            for op in ops {
                match op {
                    // Deleting a stroke that is already gone is not an error in a batch.
                    WriteOp::DeleteStroke(id) => {
                        let before = inner.strokes.len();
                        inner.strokes.retain(|s| s.id.as_ref() != Some(&id));
                        strokes_changed |= inner.strokes.len() != before;
                    }
                    WriteOp::SetMeta(meta) => {
                        inner.meta = Some(CanvasMeta {
                            last_reset: Some(meta.last_reset.unwrap_or(now)),
                        });
                    }
                    WriteOp::DeletePrompt => {
                        prompt_changed |= inner.prompt.take().is_some();
                    }
                }
            }
            if strokes_changed {
                inner.notify_strokes();
            }
            if prompt_changed {
                inner.notify_prompt();
            }
            Ok(())
        })
    }

    fn read_meta(&self) -> BoxFuture<'_, StoreResult<Option<CanvasMeta>>> {
        Box::pin(async move {
            let inner = self.inner.borrow();
            inner.ensure_online()?;
            Ok(inner.meta)
        })
    }

    fn subscribe_prompt(&self, listener: Listener<Option<Prompt>>) -> Subscription {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.listener_id();
            let listener = Rc::new(RefCell::new(listener));
            let job = delivery(&listener, StoreEvent::Snapshot(inner.prompt.clone()));
            inner.queue.push_back(job);
            inner.prompt_listeners.push((id, listener));
            id
        };
        self.cancel_handle(move |inner| inner.prompt_listeners.retain(|(i, _)| *i != id))
    }

    fn set_prompt(&self, text: &str, updated_by: &UserName) -> BoxFuture<'_, StoreResult<()>> {
        let text = text.to_string();
        let updated_by = updated_by.clone();
        Box::pin(async move {
            let mut inner = self.inner.borrow_mut();
            inner.ensure_online()?;
            let timestamp = inner.stamp();
            inner.prompt = Some(Prompt {
                text,
                updated_by,
                timestamp: Some(timestamp),
            });
            inner.notify_prompt();
            Ok(())
        })
    }

    fn set_presence(&self, user: &UserName) -> BoxFuture<'_, StoreResult<()>> {
        let user = user.clone();
        Box::pin(async move {
            let mut inner = self.inner.borrow_mut();
            inner.ensure_online()?;
            let timestamp = inner.stamp();
            inner.presence.insert(
                user.clone(),
                PresenceRecord {
                    user: user.clone(),
                    online: true,
                    timestamp,
                },
            );
            inner.notify_presence(&user);
            Ok(())
        })
    }

    fn clear_presence(&self, user: &UserName) -> BoxFuture<'_, StoreResult<()>> {
        let user = user.clone();
        Box::pin(async move {
            let mut inner = self.inner.borrow_mut();
            inner.ensure_online()?;
            if inner.presence.remove(&user).is_some() {
                inner.notify_presence(&user);
            }
            Ok(())
        })
    }

    fn subscribe_presence(
        &self,
        user: &UserName,
        listener: Listener<Option<PresenceRecord>>,
    ) -> Subscription {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.listener_id();
            let listener = Rc::new(RefCell::new(listener));
            let record = inner.presence.get(user).cloned();
            let job = delivery(&listener, StoreEvent::Snapshot(record));
            inner.queue.push_back(job);
            inner
                .presence_listeners
                .push((id, user.clone(), listener));
            id
        };
        self.cancel_handle(move |inner| inner.presence_listeners.retain(|(i, _, _)| *i != id))
    }
}
