//! The shared canvas controller.
//!
//! [`SharedCanvas`] owns one client's session, surface and sizing state and
//! wires them to a store. Hosts forward pointer, resize and orientation
//! events to it and drive its async methods (store round-trips) on their
//! executor.

use crate::live;
use crate::sizing::{ResizeOutcome, SurfaceSizer};
use crate::surface::Surface;
use duetboard_core::{
    CanvasConfig, CanvasSession, CanvasStore, Clock, ExpiryCheck, Geometry, InputAction,
    LifecyclePolicy, PointerEvent, Prompt, SerializableColor, StrokeDraft, StrokeId, Subscription,
    SyncEngine, SystemClock,
};
use kurbo::Point;
use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;

// Use web_time for WASM compatibility
#[cfg(target_arch = "wasm32")]
use web_time::Instant;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Instant;

pub struct SharedCanvas<S, F> {
    config: CanvasConfig,
    engine: SyncEngine<S>,
    surface: Rc<RefCell<F>>,
    sizer: Rc<RefCell<SurfaceSizer>>,
    lifecycle: LifecyclePolicy,
    clock: Rc<dyn Clock>,
    prompt: Rc<RefCell<Option<Prompt>>>,
    partner_online: Rc<Cell<bool>>,
    subscriptions: Vec<Subscription>,
}

impl<S: CanvasStore + 'static, F: Surface + 'static> SharedCanvas<S, F> {
    pub fn new(config: CanvasConfig, store: Rc<S>, surface: F) -> Self {
        Self::with_clock(config, store, surface, SystemClock)
    }

    pub fn with_clock(
        config: CanvasConfig,
        store: Rc<S>,
        surface: F,
        clock: impl Clock + 'static,
    ) -> Self {
        let session = Rc::new(RefCell::new(CanvasSession::from_config(&config)));
        Self {
            engine: SyncEngine::new(store, session),
            surface: Rc::new(RefCell::new(surface)),
            sizer: Rc::new(RefCell::new(SurfaceSizer::from_config(&config))),
            lifecycle: LifecyclePolicy::from_config(&config),
            clock: Rc::new(clock),
            prompt: Rc::new(RefCell::new(None)),
            partner_online: Rc::new(Cell::new(false)),
            subscriptions: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    /// A handle to the sync engine, for spawning store calls.
    pub fn engine(&self) -> SyncEngine<S> {
        self.engine.clone()
    }

    pub fn session(&self) -> Ref<'_, CanvasSession> {
        self.engine.session().borrow()
    }

    pub fn surface(&self) -> Ref<'_, F> {
        self.surface.borrow()
    }

    pub fn geometry(&self) -> Option<Geometry> {
        self.sizer.borrow().geometry()
    }

    pub fn is_started(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    /// First layout: size the surface now and schedule a settle re-measure.
    pub fn mount(&mut self, geometry: Geometry, now: Instant) -> bool {
        let changed = self.resize(geometry, now);
        self.sizer.borrow_mut().mounted(now);
        changed
    }

    /// Apply a stroke snapshot that arrived while the session was borrowed
    /// and repaint from it. Returns whether anything was applied.
    pub fn catch_up(&mut self) -> bool {
        if !self.engine.apply_backlog() {
            return false;
        }
        let session = self.engine.session().borrow();
        let (Ok(mut surface), Ok(sizer)) = (self.surface.try_borrow_mut(), self.sizer.try_borrow()) else {
            log::warn!("Surface busy, skipping reconstruction");
            return true;
        };
        if let Err(err) = sizer.repaint(&mut *surface, session.cache()) {
            log::warn!("Reconstruction failed: {}", err);
        }
        true
    }

    /// Apply new container geometry. Returns whether the surface changed.
    pub fn resize(&mut self, geometry: Geometry, now: Instant) -> bool {
        self.catch_up();
        let session = self.engine.session().borrow();
        let mut surface = self.surface.borrow_mut();
        match self
            .sizer
            .borrow_mut()
            .resize(&mut *surface, geometry, session.cache(), now)
        {
            Ok(outcome) => outcome != ResizeOutcome::Unchanged,
            Err(err) => {
                log::warn!("Resize failed: {}", err);
                false
            }
        }
    }

    pub fn orientation_changed(&mut self, now: Instant) {
        self.sizer.borrow_mut().orientation_changed(now);
    }

    /// Timer hook: runs any due deferred re-measure against `geometry`.
    pub fn poll(&mut self, now: Instant, geometry: Geometry) -> bool {
        self.catch_up();
        let due = self.sizer.borrow_mut().take_due(now);
        due && self.resize(geometry, now)
    }

    /// Subscribe to the store and run the once-per-session expiry check.
    pub async fn start(&mut self) -> ExpiryCheck {
        if self.is_started() {
            log::warn!("Canvas already started");
            return ExpiryCheck::AlreadyChecked;
        }

        let surface = Rc::downgrade(&self.surface);
        let sizer = Rc::downgrade(&self.sizer);
        let strokes = self.engine.subscribe(move |strokes| {
            let (Some(surface), Some(sizer)) = (surface.upgrade(), sizer.upgrade()) else {
                return;
            };
            let (Ok(mut surface), Ok(sizer)) = (surface.try_borrow_mut(), sizer.try_borrow()) else {
                log::warn!("Surface busy, skipping reconstruction");
                return;
            };
            match sizer.repaint(&mut *surface, strokes) {
                Ok(true) => {}
                Ok(false) => log::debug!("Not mounted yet, reconstruction deferred"),
                Err(err) => log::warn!("Reconstruction failed: {}", err),
            }
        });

        let prompt = Rc::clone(&self.prompt);
        let prompt_sub = self
            .engine
            .watch_prompt(move |latest| *prompt.borrow_mut() = latest);

        let online = Rc::clone(&self.partner_online);
        let partner_sub = self
            .engine
            .watch_partner(&self.config.partner, move |flag| online.set(flag));

        self.subscriptions = vec![strokes, prompt_sub, partner_sub];
        self.engine.announce_presence().await;
        self.lifecycle.check(&self.engine, &self.clock).await
    }

    /// Feed one pointer event. Returns a draft when a gesture finished with
    /// enough points to persist; pass it to [`SharedCanvas::commit`].
    pub fn pointer(&mut self, event: PointerEvent) -> Option<StrokeDraft> {
        self.catch_up();
        let actions = self.engine.session().borrow_mut().handle_pointer(event);
        let mut committed = None;
        for action in actions {
            match action {
                InputAction::Commit(draft) => committed = Some(draft),
                InputAction::Discard => log::trace!("Gesture too short, discarded"),
                paint => match self.surface.try_borrow_mut() {
                    Ok(mut surface) => {
                        if let Err(err) = live::paint_action(&mut *surface, &paint) {
                            log::warn!("Live paint failed: {}", err);
                        }
                    }
                    Err(_) => log::warn!("Surface busy, skipping live paint"),
                },
            }
        }
        committed
    }

    pub fn pointer_down(&mut self, position: Point) -> Option<StrokeDraft> {
        self.pointer(PointerEvent::Down { position })
    }

    pub fn pointer_move(&mut self, position: Point) {
        self.pointer(PointerEvent::Move { position });
    }

    pub fn pointer_up(&mut self) -> Option<StrokeDraft> {
        self.pointer(PointerEvent::Up)
    }

    pub fn pointer_leave(&mut self) -> Option<StrokeDraft> {
        self.pointer(PointerEvent::Leave)
    }

    pub async fn commit(&self, draft: StrokeDraft) -> Option<StrokeId> {
        self.engine.append(draft).await
    }

    /// Undo the local user's most recent stroke.
    pub async fn undo(&self) -> bool {
        let me = self.config.me.clone();
        self.engine.undo_last(&me).await
    }

    pub fn can_undo(&self) -> bool {
        self.session().can_undo()
    }

    pub async fn reset(&self, clear_prompt: bool) -> bool {
        self.engine.reset(clear_prompt).await
    }

    pub fn set_brush_color(&mut self, color: SerializableColor) {
        self.engine.session().borrow_mut().brush_mut().select_color(color);
    }

    pub fn set_brush_width(&mut self, width: f64) {
        self.engine.session().borrow_mut().brush_mut().select_width(width);
    }

    pub fn toggle_eraser(&mut self) {
        self.engine.session().borrow_mut().brush_mut().toggle_eraser();
    }

    pub async fn set_prompt(&self, text: &str) -> bool {
        self.engine.set_prompt(text).await
    }

    /// Latest prompt seen from the store.
    pub fn prompt(&self) -> Option<Prompt> {
        self.prompt.borrow().clone()
    }

    pub fn partner_online(&self) -> bool {
        self.partner_online.get()
    }

    /// Drop every subscription, then mark the local user offline.
    pub async fn teardown(&mut self) {
        self.subscriptions.clear();
        self.engine.withdraw_presence().await;
        log::debug!("Canvas for {} torn down", self.config.me);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::{CpuSurface, Snapshot};
    use duetboard_core::stroke::{BACKGROUND, DEFAULT_COLOR, PALETTE};
    use duetboard_core::{CanvasMeta, ManualClock, MemoryStore, PhysicalSize, Timestamp, UserName};
    use std::future::Future;
    use std::pin::pin;
    use std::task::{Context, Poll, Waker};
    use std::time::Duration;

    /// MemoryStore futures complete on first poll.
    fn block_on<F: Future>(future: F) -> F::Output {
        let mut cx = Context::from_waker(Waker::noop());
        let mut future = pin!(future);
        loop {
            if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
                return output;
            }
        }
    }

    const NOW: u64 = 1_700_000_000_000;
    const HOUR_MS: u64 = 3_600_000;

    type Canvas = SharedCanvas<MemoryStore, CpuSurface>;

    fn client(store: &MemoryStore, clock: &Rc<ManualClock>, me: &str, partner: &str) -> Canvas {
        let surface = CpuSurface::new(PhysicalSize::new(1, 1)).unwrap();
        SharedCanvas::with_clock(
            CanvasConfig::for_user(me, partner),
            Rc::new(store.clone()),
            surface,
            Rc::clone(clock),
        )
    }

    fn setup() -> (MemoryStore, Rc<ManualClock>) {
        let clock = Rc::new(ManualClock::new(Timestamp(NOW)));
        let store = MemoryStore::with_clock(Rc::clone(&clock));
        store.seed_meta(CanvasMeta {
            last_reset: Some(Timestamp(NOW - HOUR_MS)),
        });
        (store, clock)
    }

    fn draw(canvas: &mut Canvas, points: &[(f64, f64)]) -> Option<StrokeId> {
        let mut iter = points.iter().map(|&(x, y)| Point::new(x, y));
        canvas.pointer_down(iter.next()?);
        for p in iter {
            canvas.pointer_move(p);
        }
        let draft = canvas.pointer_up()?;
        block_on(canvas.commit(draft))
    }

    fn snapshot(canvas: &Canvas) -> Snapshot {
        canvas.surface().snapshot().unwrap()
    }

    fn red(snapshot: &Snapshot, x: u32, y: u32) -> Option<u8> {
        snapshot.pixel(x, y).map(|p| p[0])
    }

    #[test]
    fn test_two_clients_converge() {
        let (store, clock) = setup();
        let geometry = Geometry::new(200.0, 100.0, 2.0);
        let mut lena = client(&store, &clock, "Lena", "Mohamed");
        let mut mohamed = client(&store, &clock, "Mohamed", "Lena");
        lena.mount(geometry, Instant::now());
        mohamed.mount(geometry, Instant::now());
        assert_eq!(block_on(lena.start()), ExpiryCheck::Fresh);
        assert_eq!(block_on(mohamed.start()), ExpiryCheck::Fresh);
        store.dispatch();

        draw(&mut lena, &[(10.0, 10.0), (100.0, 50.0)]).unwrap();
        mohamed.set_brush_color(PALETTE[2]);
        draw(&mut mohamed, &[(10.0, 90.0), (190.0, 10.0)]).unwrap();
        store.dispatch();

        let a = snapshot(&lena);
        let b = snapshot(&mohamed);
        assert_eq!(a, b);
        assert!(a.count_other_than(BACKGROUND) > 0);
        assert_eq!(lena.session().cache().len(), 2);
    }

    #[test]
    fn test_single_tap_is_never_committed() {
        let (store, clock) = setup();
        let mut lena = client(&store, &clock, "Lena", "Mohamed");
        lena.mount(Geometry::new(50.0, 50.0, 1.0), Instant::now());
        block_on(lena.start());
        store.dispatch();

        assert!(lena.pointer_down(Point::new(25.0, 25.0)).is_none());
        assert_eq!(red(&snapshot(&lena), 25, 25), Some(DEFAULT_COLOR.r));
        assert!(lena.pointer_up().is_none());
        store.dispatch();
        assert!(store.strokes().is_empty());
    }

    #[test]
    fn test_paint_before_resize_persists() {
        let (store, clock) = setup();
        let mut lena = client(&store, &clock, "Lena", "Mohamed");
        lena.mount(Geometry::new(100.0, 60.0, 1.0), Instant::now());
        block_on(lena.start());
        draw(&mut lena, &[(10.0, 30.0), (90.0, 30.0)]).unwrap();
        store.dispatch();
        assert_eq!(red(&snapshot(&lena), 50, 30), Some(DEFAULT_COLOR.r));

        assert!(lena.resize(Geometry::new(100.0, 60.0, 3.0), Instant::now()));
        let after = snapshot(&lena);
        assert_eq!((after.width, after.height), (300, 180));
        assert_eq!(red(&after, 150, 90), Some(DEFAULT_COLOR.r));

        assert!(!lena.resize(Geometry::new(100.0, 60.0, 3.0), Instant::now()));
        assert_eq!(snapshot(&lena), after);
    }

    #[test]
    fn test_deferred_remeasure_after_rotation() {
        let (store, clock) = setup();
        let mut lena = client(&store, &clock, "Lena", "Mohamed");
        let start = Instant::now();
        lena.mount(Geometry::new(400.0, 800.0, 2.0), start);
        assert!(!lena.poll(start, Geometry::new(400.0, 800.0, 2.0)));

        // Settle check after mount finds nothing new.
        assert!(!lena.poll(start + Duration::from_millis(60), Geometry::new(400.0, 800.0, 2.0)));

        lena.orientation_changed(start);
        let rotated = Geometry::new(800.0, 400.0, 2.0);
        assert!(!lena.poll(start + Duration::from_millis(50), rotated));
        assert!(lena.poll(start + Duration::from_millis(100), rotated));
        assert_eq!(lena.geometry(), Some(rotated));
        assert_eq!(lena.surface().physical_size(), PhysicalSize::new(1600, 800));
    }

    #[test]
    fn test_undo_keeps_partner_strokes() {
        let (store, clock) = setup();
        let mut lena = client(&store, &clock, "Lena", "Mohamed");
        let mut mohamed = client(&store, &clock, "Mohamed", "Lena");
        lena.mount(Geometry::new(100.0, 100.0, 1.0), Instant::now());
        block_on(lena.start());
        block_on(mohamed.start());

        let l1 = draw(&mut lena, &[(0.0, 0.0), (10.0, 10.0)]).unwrap();
        let m1 = draw(&mut mohamed, &[(0.0, 50.0), (10.0, 50.0)]).unwrap();
        draw(&mut lena, &[(50.0, 50.0), (90.0, 90.0)]).unwrap();
        store.dispatch();
        assert!(lena.can_undo());

        assert!(block_on(lena.undo()));
        store.dispatch();
        let ids: Vec<_> = store.strokes().into_iter().filter_map(|s| s.id).collect();
        assert_eq!(ids, vec![l1, m1]);
        assert_eq!(red(&snapshot(&lena), 70, 70), Some(BACKGROUND.r));
    }

    #[test]
    fn test_start_clears_expired_canvas_once() {
        let (store, clock) = setup();
        store.seed_meta(CanvasMeta {
            last_reset: Some(Timestamp(NOW - 25 * HOUR_MS)),
        });
        let mut mohamed = client(&store, &clock, "Mohamed", "Lena");
        block_on(mohamed.set_prompt("Draw a tree"));
        draw(&mut mohamed, &[(0.0, 0.0), (5.0, 5.0)]).unwrap();

        let mut lena = client(&store, &clock, "Lena", "Mohamed");
        lena.mount(Geometry::new(40.0, 40.0, 1.0), Instant::now());
        assert_eq!(block_on(lena.start()), ExpiryCheck::Expired);
        assert_eq!(block_on(lena.start()), ExpiryCheck::AlreadyChecked);
        store.dispatch();

        assert!(store.strokes().is_empty());
        assert_eq!(lena.prompt().map(|p| p.text), Some("Draw a tree".to_string()));
        assert!(store.meta().unwrap().last_reset.unwrap() >= Timestamp(NOW));
        assert_eq!(snapshot(&lena).count_other_than(BACKGROUND), 0);
    }

    #[test]
    fn test_manual_reset_clears_prompt() {
        let (store, clock) = setup();
        let mut lena = client(&store, &clock, "Lena", "Mohamed");
        block_on(lena.start());
        block_on(lena.set_prompt("Draw a cloud"));
        draw(&mut lena, &[(0.0, 0.0), (5.0, 5.0)]).unwrap();
        store.dispatch();
        assert!(lena.prompt().is_some());

        assert!(block_on(lena.reset(true)));
        store.dispatch();
        assert!(lena.prompt().is_none());
        assert!(lena.session().cache().is_empty());
        assert!(!lena.can_undo());
    }

    #[test]
    fn test_presence_and_teardown() {
        let (store, clock) = setup();
        let mut lena = client(&store, &clock, "Lena", "Mohamed");
        let mut mohamed = client(&store, &clock, "Mohamed", "Lena");
        lena.mount(Geometry::new(60.0, 60.0, 1.0), Instant::now());
        block_on(lena.start());
        block_on(mohamed.start());
        store.dispatch();
        assert!(lena.partner_online());
        assert!(mohamed.partner_online());

        block_on(lena.teardown());
        assert!(!lena.is_started());
        assert!(store.presence(&UserName::new("Lena")).is_none());
        let frozen = snapshot(&lena);

        draw(&mut mohamed, &[(0.0, 30.0), (60.0, 30.0)]).unwrap();
        store.dispatch();
        assert!(!mohamed.partner_online());
        assert_eq!(snapshot(&lena), frozen);
    }

    #[test]
    fn test_eraser_strokes_use_background() {
        let (store, clock) = setup();
        let mut lena = client(&store, &clock, "Lena", "Mohamed");
        lena.mount(Geometry::new(60.0, 60.0, 1.0), Instant::now());
        block_on(lena.start());
        draw(&mut lena, &[(0.0, 30.0), (60.0, 30.0)]).unwrap();
        lena.set_brush_width(10.0);
        lena.toggle_eraser();
        draw(&mut lena, &[(30.0, 0.0), (30.0, 60.0)]).unwrap();
        store.dispatch();

        let erased = &store.strokes()[1];
        assert_eq!(erased.color, BACKGROUND);
        assert_eq!(erased.width, 25.0);
        assert_eq!(red(&snapshot(&lena), 30, 30), Some(BACKGROUND.r));
        assert_eq!(red(&snapshot(&lena), 5, 30), Some(DEFAULT_COLOR.r));
    }

    #[test]
    fn test_failed_append_leaves_canvas_usable() {
        let (store, clock) = setup();
        let mut lena = client(&store, &clock, "Lena", "Mohamed");
        lena.mount(Geometry::new(60.0, 60.0, 1.0), Instant::now());
        block_on(lena.start());
        store.dispatch();

        store.set_offline(true);
        assert!(draw(&mut lena, &[(0.0, 0.0), (20.0, 20.0)]).is_none());
        store.set_offline(false);
        assert!(draw(&mut lena, &[(0.0, 40.0), (20.0, 40.0)]).is_some());
        store.dispatch();
        assert_eq!(lena.session().cache().len(), 1);
        // The failed stroke's optimistic paint is gone after reconstruction.
        assert_eq!(red(&snapshot(&lena), 10, 10), Some(BACKGROUND.r));
    }

    #[test]
    fn test_resize_mid_drag_keeps_gesture() {
        let (store, clock) = setup();
        let mut lena = client(&store, &clock, "Lena", "Mohamed");
        let start = Instant::now();
        lena.mount(Geometry::new(100.0, 60.0, 1.0), start);
        block_on(lena.start());
        store.dispatch();

        lena.pointer_down(Point::new(10.0, 30.0));
        lena.pointer_move(Point::new(30.0, 30.0));
        assert!(lena.resize(Geometry::new(100.0, 60.0, 2.0), start));
        lena.pointer_move(Point::new(60.0, 30.0));
        lena.pointer_move(Point::new(90.0, 30.0));
        let draft = lena.pointer_up().unwrap();
        let xs: Vec<f64> = draft.points.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![10.0, 30.0, 60.0, 90.0]);

        block_on(lena.commit(draft)).unwrap();
        store.dispatch();
        let after = snapshot(&lena);
        assert_eq!((after.width, after.height), (200, 120));
        // Logical (20, 30) and (85, 30), on both sides of the resize.
        assert_eq!(red(&after, 40, 60), Some(DEFAULT_COLOR.r));
        assert_eq!(red(&after, 170, 60), Some(DEFAULT_COLOR.r));
        assert_eq!(red(&after, 100, 90), Some(BACKGROUND.r));
    }

    #[test]
    fn test_snapshot_during_borrow_is_repainted_later() {
        let (store, clock) = setup();
        let mut lena = client(&store, &clock, "Lena", "Mohamed");
        let mut mohamed = client(&store, &clock, "Mohamed", "Lena");
        let start = Instant::now();
        let geometry = Geometry::new(60.0, 60.0, 1.0);
        lena.mount(geometry, start);
        block_on(lena.start());
        store.dispatch();

        draw(&mut mohamed, &[(0.0, 30.0), (60.0, 30.0)]).unwrap();
        {
            let _held = lena.session();
            store.dispatch();
        }
        assert!(lena.session().cache().is_empty());
        assert_eq!(red(&snapshot(&lena), 30, 30), Some(BACKGROUND.r));

        assert!(!lena.poll(start, geometry));
        assert_eq!(lena.session().cache().len(), 1);
        assert_eq!(red(&snapshot(&lena), 30, 30), Some(DEFAULT_COLOR.r));
    }
}
