//! Sync engine: mirrors the remote stroke log into the session and issues
//! the canvas's writes.
//!
//! Write failures are logged and reported as a `None`/`false` result; they
//! never propagate to input handling or rendering.

use crate::session::CanvasSession;
use crate::store::{
    CanvasMeta, CanvasStore, PresenceRecord, Prompt, StoreEvent, StoreResult, Subscription,
    WriteOp,
};
use crate::stroke::{Stroke, StrokeDraft, StrokeId, UserName};
use std::cell::RefCell;
use std::rc::Rc;

pub struct SyncEngine<S> {
    store: Rc<S>,
    session: Rc<RefCell<CanvasSession>>,
    /// Latest snapshot that arrived while the session was borrowed.
    backlog: Rc<RefCell<Option<Vec<Stroke>>>>,
}

impl<S> Clone for SyncEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Rc::clone(&self.store),
            session: Rc::clone(&self.session),
            backlog: Rc::clone(&self.backlog),
        }
    }
}

impl<S: CanvasStore> SyncEngine<S> {
    pub fn new(store: Rc<S>, session: Rc<RefCell<CanvasSession>>) -> Self {
        Self {
            store,
            session,
            backlog: Rc::new(RefCell::new(None)),
        }
    }

    pub fn store(&self) -> &Rc<S> {
        &self.store
    }

    pub fn session(&self) -> &Rc<RefCell<CanvasSession>> {
        &self.session
    }

    fn me(&self) -> UserName {
        self.session.borrow().me().clone()
    }

    /// Watch the stroke log. The session cache is replaced before
    /// `on_update` runs with the full ordered list.
    ///
    /// A snapshot that arrives while the session is borrowed is kept as a
    /// backlog instead; see [`SyncEngine::apply_backlog`].
    pub fn subscribe(&self, mut on_update: impl FnMut(&[Stroke]) + 'static) -> Subscription {
        let session = Rc::downgrade(&self.session);
        let backlog = Rc::downgrade(&self.backlog);
        self.store.subscribe_strokes(Box::new(move |event: StoreEvent<Vec<Stroke>>| match event {
            StoreEvent::Snapshot(strokes) => {
                let Some(session) = session.upgrade() else {
                    return;
                };
                let ordered = match session.try_borrow_mut() {
                    Ok(mut session) => {
                        session.replace_cache(strokes);
                        session.cache().to_vec()
                    }
                    Err(_) => {
                        log::warn!("Session busy, deferring stroke snapshot");
                        if let Some(backlog) = backlog.upgrade() {
                            *backlog.borrow_mut() = Some(strokes);
                        }
                        return;
                    }
                };
                if let Some(backlog) = backlog.upgrade() {
                    backlog.borrow_mut().take();
                }
                log::debug!("Stroke snapshot: {} strokes", ordered.len());
                on_update(&ordered);
            }
            StoreEvent::Failed(err) => {
                log::error!("Stroke subscription failed: {}", err);
            }
        }))
    }

    /// Move a deferred snapshot into the session cache. Returns whether the
    /// cache changed; the caller repaints from it.
    pub fn apply_backlog(&self) -> bool {
        let Ok(mut session) = self.session.try_borrow_mut() else {
            return false;
        };
        match self.backlog.borrow_mut().take() {
            Some(strokes) => {
                log::debug!("Applying deferred snapshot: {} strokes", strokes.len());
                session.replace_cache(strokes);
                true
            }
            None => false,
        }
    }

    /// Persist a finished stroke. Strokes with fewer than two points are
    /// never sent.
    pub async fn append(&self, draft: StrokeDraft) -> Option<StrokeId> {
        if !draft.is_committable() {
            log::debug!("Not appending stroke with {} point(s)", draft.points.len());
            return None;
        }
        match self.store.append_stroke(draft).await {
            Ok(id) => Some(id),
            Err(err) => {
                log::error!("Failed to append stroke: {}", err);
                None
            }
        }
    }

    /// Delete `author`'s most recent stroke. Returns whether one was deleted.
    pub async fn undo_last(&self, author: &UserName) -> bool {
        let id = self
            .session
            .borrow()
            .last_stroke_by(author)
            .and_then(|s| s.id.clone());
        let Some(id) = id else {
            log::debug!("Nothing to undo for {}", author);
            return false;
        };
        match self.store.delete_stroke(&id).await {
            Ok(()) => true,
            Err(err) => {
                log::error!("Failed to undo stroke {}: {}", id, err);
                false
            }
        }
    }

    /// Clear the canvas in one atomic write: every stroke in the store, the
    /// reset time and, if asked, the prompt.
    pub async fn reset(&self, clear_prompt: bool) -> bool {
        let ids = match self.store.stroke_ids().await {
            Ok(ids) => ids,
            Err(err) => {
                log::error!("Failed to list strokes for reset: {}", err);
                return false;
            }
        };
        let count = ids.len();
        let mut ops: Vec<WriteOp> = ids.into_iter().map(WriteOp::DeleteStroke).collect();
        ops.push(WriteOp::SetMeta(CanvasMeta::reset_now()));
        if clear_prompt {
            ops.push(WriteOp::DeletePrompt);
        }
        match self.store.commit(ops).await {
            Ok(()) => {
                log::info!(
                    "Canvas reset: {} strokes deleted{}",
                    count,
                    if clear_prompt { ", prompt cleared" } else { "" }
                );
                true
            }
            Err(err) => {
                log::error!("Failed to reset canvas: {}", err);
                false
            }
        }
    }

    pub async fn read_meta(&self) -> StoreResult<Option<CanvasMeta>> {
        self.store.read_meta().await
    }

    /// Replace the shared prompt, signed by the local user.
    pub async fn set_prompt(&self, text: &str) -> bool {
        let me = self.me();
        match self.store.set_prompt(text, &me).await {
            Ok(()) => true,
            Err(err) => {
                log::error!("Failed to save prompt: {}", err);
                false
            }
        }
    }

    pub fn watch_prompt(&self, mut on_change: impl FnMut(Option<Prompt>) + 'static) -> Subscription {
        self.store.subscribe_prompt(Box::new(move |event: StoreEvent<Option<Prompt>>| match event {
            StoreEvent::Snapshot(prompt) => on_change(prompt),
            StoreEvent::Failed(err) => log::error!("Prompt subscription failed: {}", err),
        }))
    }

    /// Mark the local user online.
    pub async fn announce_presence(&self) -> bool {
        let me = self.me();
        match self.store.set_presence(&me).await {
            Ok(()) => true,
            Err(err) => {
                log::error!("Failed to announce presence for {}: {}", me, err);
                false
            }
        }
    }

    pub async fn withdraw_presence(&self) -> bool {
        let me = self.me();
        match self.store.clear_presence(&me).await {
            Ok(()) => true,
            Err(err) => {
                log::error!("Failed to withdraw presence for {}: {}", me, err);
                false
            }
        }
    }

    /// Watch whether `partner` is online.
    pub fn watch_partner(
        &self,
        partner: &UserName,
        mut on_change: impl FnMut(bool) + 'static,
    ) -> Subscription {
        self.store.subscribe_presence(
            partner,
            Box::new(move |event: StoreEvent<Option<PresenceRecord>>| match event {
                StoreEvent::Snapshot(record) => on_change(record.is_some_and(|r| r.online)),
                StoreEvent::Failed(err) => log::error!("Presence subscription failed: {}", err),
            }),
        )
    }
}
