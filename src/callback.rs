//! Session callbacks.
//!
//! Render workers never call client code. They post [`SessionEvent`]s into a
//! channel, and the client-facing side drains it with
//! [`CallbackTable::dispatch`] on the thread that asked for the dispatch
//! (`sample`, `wait` or an explicit dispatch call). Callbacks therefore only
//! need to be `Send`, never `Sync`.

use bitflags::bitflags;
use crossbeam_channel::{Receiver, Sender};

use crate::handle::SessionId;
use crate::session::PassType;

bitflags! {
    /// Callback kinds, used to skip building events nobody listens to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CallbackKinds: u32 {
        const STATUS_UPDATE = 1 << 0;
        const CANCEL_TEST = 1 << 1;
        const TILE_UPDATE = 1 << 2;
        const TILE_WRITE = 1 << 3;
        const DISPLAY_UPDATE = 1 << 4;
    }
}

/// Pixels of one tile, owned by the event.
#[derive(Debug, Clone, PartialEq)]
pub struct TileData {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub sample: u32,
    /// Bounce depth the tile was rendered with.
    pub depth: u32,
    pub pass: PassType,
    pub pixels: Vec<f32>,
}

/// What a tile callback sees. The pixel slice is only valid for the call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileView<'a> {
    pub session: SessionId,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub sample: u32,
    pub depth: u32,
    pub pass: PassType,
    pub pixels: &'a [f32],
}

impl TileData {
    fn view(&self, session: SessionId) -> TileView<'_> {
        TileView {
            session,
            x: self.x,
            y: self.y,
            w: self.w,
            h: self.h,
            sample: self.sample,
            depth: self.depth,
            pass: self.pass,
            pixels: &self.pixels,
        }
    }
}

/// Event posted by a render worker.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StatusUpdate,
    /// Progressive update of a tile after one sample.
    TileUpdate(TileData),
    /// Final pixels of a tile.
    TileWrite(TileData),
    DisplayUpdate { sample: u32 },
}

impl SessionEvent {
    fn kind(&self) -> CallbackKinds {
        match self {
            Self::StatusUpdate => CallbackKinds::STATUS_UPDATE,
            Self::TileUpdate(_) => CallbackKinds::TILE_UPDATE,
            Self::TileWrite(_) => CallbackKinds::TILE_WRITE,
            Self::DisplayUpdate { .. } => CallbackKinds::DISPLAY_UPDATE,
        }
    }
}

pub type StatusCallback = Box<dyn FnMut(SessionId) + Send>;
/// Returns `true` to cancel the session.
pub type CancelCallback = Box<dyn FnMut(SessionId) -> bool + Send>;
pub type TileCallback = Box<dyn FnMut(&TileView<'_>) + Send>;
pub type DisplayCallback = Box<dyn FnMut(SessionId, u32) + Send>;

/// At most one callback per kind. Setting `None` disables a kind.
#[derive(Default)]
pub struct CallbackTable {
    status_update: Option<StatusCallback>,
    cancel_test: Option<CancelCallback>,
    tile_update: Option<TileCallback>,
    tile_write: Option<TileCallback>,
    display_update: Option<DisplayCallback>,
}

impl CallbackTable {
    pub fn set_status_update(&mut self, callback: Option<StatusCallback>) {
        self.status_update = callback;
    }

    pub fn set_cancel_test(&mut self, callback: Option<CancelCallback>) {
        self.cancel_test = callback;
    }

    pub fn set_tile_update(&mut self, callback: Option<TileCallback>) {
        self.tile_update = callback;
    }

    pub fn set_tile_write(&mut self, callback: Option<TileCallback>) {
        self.tile_write = callback;
    }

    pub fn set_display_update(&mut self, callback: Option<DisplayCallback>) {
        self.display_update = callback;
    }

    /// Kinds with a registered callback.
    pub fn registered(&self) -> CallbackKinds {
        let mut kinds = CallbackKinds::empty();
        kinds.set(CallbackKinds::STATUS_UPDATE, self.status_update.is_some());
        kinds.set(CallbackKinds::CANCEL_TEST, self.cancel_test.is_some());
        kinds.set(CallbackKinds::TILE_UPDATE, self.tile_update.is_some());
        kinds.set(CallbackKinds::TILE_WRITE, self.tile_write.is_some());
        kinds.set(CallbackKinds::DISPLAY_UPDATE, self.display_update.is_some());
        kinds
    }

    /// Asks the cancel-test callback whether to cancel.
    pub fn test_cancel(&mut self, session: SessionId) -> bool {
        self.cancel_test.as_mut().is_some_and(|test| test(session))
    }

    /// Invokes the callback registered for `event`, if any.
    pub fn dispatch(&mut self, session: SessionId, event: &SessionEvent) {
        match event {
            SessionEvent::StatusUpdate => {
                if let Some(callback) = self.status_update.as_mut() {
                    callback(session);
                }
            }
            SessionEvent::TileUpdate(tile) => {
                if let Some(callback) = self.tile_update.as_mut() {
                    callback(&tile.view(session));
                }
            }
            SessionEvent::TileWrite(tile) => {
                if let Some(callback) = self.tile_write.as_mut() {
                    callback(&tile.view(session));
                }
            }
            SessionEvent::DisplayUpdate { sample } => {
                if let Some(callback) = self.display_update.as_mut() {
                    callback(session, *sample);
                }
            }
        }
    }

    /// Dispatches every queued event. Returns how many were delivered to a
    /// callback.
    pub fn drain(&mut self, session: SessionId, events: &Receiver<SessionEvent>) -> usize {
        let registered = self.registered();
        let mut delivered = 0;
        for event in events.try_iter() {
            if registered.contains(event.kind()) {
                self.dispatch(session, &event);
                delivered += 1;
            }
        }
        delivered
    }
}

/// Sending half used by the worker. Events of kinds nobody listens to are
/// dropped before they are built.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: Sender<SessionEvent>,
}

impl EventSink {
    pub fn new(sender: Sender<SessionEvent>) -> Self {
        Self { sender }
    }

    /// Builds and sends an event of `kind` if `wanted` contains it.
    pub fn post(
        &self,
        wanted: CallbackKinds,
        kind: CallbackKinds,
        event: impl FnOnce() -> SessionEvent,
    ) {
        if !wanted.contains(kind) {
            return;
        }
        if self.sender.send(event()).is_err() {
            log::trace!("EventSink: receiver gone, event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;
    use std::sync::Arc;
    use parking_lot::Mutex;

    fn session() -> SessionId {
        SessionId::from(KeyData::from_ffi(7))
    }

    fn tile(sample: u32) -> TileData {
        TileData {
            x: 0,
            y: 0,
            w: 1,
            h: 1,
            sample,
            depth: 3,
            pass: PassType::Combined,
            pixels: vec![0.25, 0.5, 0.75, 1.0],
        }
    }

    #[test]
    fn test_dispatch_passes_session_and_tile() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut table = CallbackTable::default();
        {
            let seen = Arc::clone(&seen);
            table.set_tile_update(Some(Box::new(move |view: &TileView<'_>| {
                seen.lock().push((view.session, view.sample, view.pixels.to_vec()));
            })));
        }

        table.dispatch(session(), &SessionEvent::TileUpdate(tile(2)));
        table.dispatch(session(), &SessionEvent::TileWrite(tile(3)));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], (session(), 2, vec![0.25, 0.5, 0.75, 1.0]));
    }

    #[test]
    fn test_replacing_and_clearing_callbacks() {
        let mut table = CallbackTable::default();
        table.set_cancel_test(Some(Box::new(|_| false)));
        assert!(!table.test_cancel(session()));
        table.set_cancel_test(Some(Box::new(|_| true)));
        assert!(table.test_cancel(session()));
        table.set_cancel_test(None);
        assert!(!table.test_cancel(session()));
        assert_eq!(table.registered(), CallbackKinds::empty());
    }

    #[test]
    fn test_sink_drops_unwanted_events() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let sink = EventSink::new(tx);
        let wanted = CallbackKinds::DISPLAY_UPDATE;
        sink.post(wanted, CallbackKinds::STATUS_UPDATE, || SessionEvent::StatusUpdate);
        sink.post(wanted, CallbackKinds::DISPLAY_UPDATE, || {
            SessionEvent::DisplayUpdate { sample: 1 }
        });
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn test_drain_runs_on_calling_thread() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let sink = EventSink::new(tx);
        let worker = std::thread::spawn(move || {
            for sample in 1..=3 {
                sink.post(CallbackKinds::all(), CallbackKinds::DISPLAY_UPDATE, || {
                    SessionEvent::DisplayUpdate { sample }
                });
            }
        });
        worker.join().unwrap();

        let caller = std::thread::current().id();
        let samples = Arc::new(Mutex::new(Vec::new()));
        let mut table = CallbackTable::default();
        {
            let samples = Arc::clone(&samples);
            table.set_display_update(Some(Box::new(move |_: SessionId, sample: u32| {
                assert_eq!(std::thread::current().id(), caller);
                samples.lock().push(sample);
            })));
        }
        assert_eq!(table.drain(session(), &rx), 3);
        assert_eq!(*samples.lock(), vec![1, 2, 3]);
    }
}
