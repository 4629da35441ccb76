//! Sampling step and the background render loop.
//!
//! [`Shared`] is the part of a session the render worker can see. One
//! sampling step:
//! 1. checks the state under the session mutex,
//! 2. takes the scene lock and re-snapshots the scene if it is dirty,
//! 3. renders every tile without holding any lock,
//! 4. merges the whole sample into the buffers under the session mutex.
//!
//! Readers of the buffers therefore only ever see whole samples. The cancel
//! flag is checked before every tile and again before merging.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use super::buffers::{BufferParams, PassType, PixelSample, RenderBuffers};
use super::progress::Progress;
use super::state::{SampleStatus, SessionState};
use super::tiles::Tile;
use crate::callback::{CallbackKinds, EventSink, SessionEvent, TileData};
use crate::engine::{guarded, RenderEngine};
use crate::error::{HostError, HostResult};
use crate::handle::SessionId;
use crate::params::SessionParams;
use crate::scene::{SceneSnapshot, SharedScene};

/// Session data guarded by the session mutex.
pub(crate) struct Core {
    pub state: SessionState,
    /// State to return to when un-paused.
    pub resume_to: SessionState,
    pub scene: Option<Arc<SharedScene>>,
    pub buffer_params: Option<BufferParams>,
    pub passes: Vec<PassType>,
    /// Sample budget.
    pub samples: u32,
    pub buffers: Option<RenderBuffers>,
    pub tiles: Vec<Tile>,
    pub snapshot: Option<SceneSnapshot>,
    pub progress: Progress,
    /// Whether the final tiles of the current run were written.
    pub written: bool,
    pub worker_running: bool,
}

pub(crate) struct Shared {
    pub id: SessionId,
    pub engine: Arc<dyn RenderEngine>,
    pub params: SessionParams,
    pub core: Mutex<Core>,
    /// Signalled on every state change.
    pub changed: Condvar,
    pub cancel: AtomicBool,
    /// [`CallbackKinds`] bits with a registered callback.
    pub wanted: AtomicU32,
    pub sink: EventSink,
}

impl Shared {
    pub fn new(
        id: SessionId,
        engine: Arc<dyn RenderEngine>,
        params: SessionParams,
        sink: EventSink,
    ) -> Self {
        let mut progress = Progress::default();
        progress.set_total_samples(params.samples);
        Self {
            id,
            engine,
            core: Mutex::new(Core {
                state: SessionState::Created,
                resume_to: SessionState::Sampling,
                scene: None,
                buffer_params: None,
                passes: Vec::new(),
                samples: params.samples,
                buffers: None,
                tiles: Vec::new(),
                snapshot: None,
                progress,
                written: false,
                worker_running: false,
            }),
            params,
            changed: Condvar::new(),
            cancel: AtomicBool::new(false),
            wanted: AtomicU32::new(0),
            sink,
        }
    }

    pub fn wanted(&self) -> CallbackKinds {
        CallbackKinds::from_bits_truncate(self.wanted.load(Ordering::Acquire))
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Posts a status update event.
    pub fn post_status(&self) {
        self.sink
            .post(self.wanted(), CallbackKinds::STATUS_UPDATE, || SessionEvent::StatusUpdate);
    }

    /// Moves to `Cancelled`, recording `message`.
    pub fn cancel_locked(&self, core: &mut Core, message: &str) {
        self.cancel.store(true, Ordering::Release);
        core.state = SessionState::Cancelled;
        core.progress.set_cancel(message);
        log::info!("Session {:?}: cancelled: {message}", self.id);
        self.changed.notify_all();
        self.post_status();
    }

    /// Moves to `EndedRun`, writing final tiles if the run did not.
    pub fn end_run_locked(&self, core: &mut Core) {
        if !core.written {
            self.post_tile_writes(core);
        }
        core.state = SessionState::EndedRun;
        core.progress.set_status("Done", "");
        log::debug!("Session {:?}: run ended", self.id);
        self.changed.notify_all();
        self.post_status();
    }

    fn post_tile_writes(&self, core: &mut Core) {
        let wanted = self.wanted();
        let depth = core
            .snapshot
            .as_ref()
            .map_or(0, |s| s.integrator().max_bounce.max(0) as u32);
        if let Some(buffers) = core.buffers.as_ref() {
            let sample = buffers.samples();
            for tile in &core.tiles {
                self.sink.post(wanted, CallbackKinds::TILE_WRITE, || {
                    SessionEvent::TileWrite(tile_data(buffers, tile, sample, depth))
                });
            }
        }
        core.written = true;
    }

    /// Whether the run was cancelled or ended from outside.
    fn run_stopped(&self) -> bool {
        self.is_cancelled() || !self.core.lock().state.is_running()
    }

    /// Snapshots the scene under its lock, re-using the previous snapshot
    /// when nothing changed. Returns `None` if the run stopped while waiting.
    fn snapshot(&self, scene: &SharedScene) -> HostResult<Option<(SceneSnapshot, bool)>> {
        if scene.lock().is_held_by_current_thread() {
            return Err(HostError::ScenePrecondition {
                operation: "sample",
                reason: "the calling thread holds the scene lock".to_string(),
            });
        }
        let _guard = loop {
            if self.run_stopped() {
                return Ok(None);
            }
            if let Some(guard) = scene.lock().try_guard_for(self.params.cancel_timeout) {
                break guard;
            }
        };

        let previous = self.core.lock().snapshot.clone();
        let (snapshot, changed) = scene.edit(|scene| match previous {
            Some(previous) if !scene.is_dirty() => Ok((previous, false)),
            previous => scene.snapshot().map(|s| (s, previous.is_some())),
        })?;
        Ok(Some((snapshot, changed)))
    }

    /// Renders and accumulates one sample.
    pub fn step(&self) -> HostResult<SampleStatus> {
        let (scene, params, tiles, sample) = {
            let mut core = self.core.lock();
            match core.state {
                SessionState::Cancelled => return Ok(SampleStatus::Cancelled),
                SessionState::Prepared | SessionState::Sampling => {}
                state => {
                    return Err(HostError::StatePrecondition {
                        operation: "sample",
                        state,
                    })
                }
            }
            if core.progress.sample() >= core.samples {
                return Ok(SampleStatus::Done);
            }
            let (Some(scene), Some(params)) = (core.scene.clone(), core.buffer_params) else {
                return Err(HostError::StatePrecondition {
                    operation: "sample",
                    state: core.state,
                });
            };
            core.state = SessionState::Sampling;
            (scene, params, core.tiles.clone(), core.progress.sample())
        };

        let Some((snapshot, changed)) = self.snapshot(&scene)? else {
            return Ok(if self.is_cancelled() {
                SampleStatus::Cancelled
            } else {
                SampleStatus::Done
            });
        };
        let sample = if changed { 0 } else { sample };

        let started = Instant::now();
        let mut rendered = Vec::with_capacity(tiles.len());
        for tile in &tiles {
            if self.is_cancelled() {
                return Ok(SampleStatus::Cancelled);
            }
            let mut pixels = Vec::new();
            guarded(|| {
                self.engine
                    .render_tile(&snapshot, &params, tile, sample, &mut pixels)
            })?;
            rendered.push((tile, pixels));
        }

        self.merge(snapshot, changed, rendered, started)
    }

    fn merge(
        &self,
        snapshot: SceneSnapshot,
        changed: bool,
        rendered: Vec<(&Tile, Vec<PixelSample>)>,
        started: Instant,
    ) -> HostResult<SampleStatus> {
        let mut guard = self.core.lock();
        let core = &mut *guard;
        match core.state {
            SessionState::Sampling | SessionState::Paused => {}
            SessionState::Cancelled => return Ok(SampleStatus::Cancelled),
            _ => return Ok(SampleStatus::Done),
        }
        if self.is_cancelled() {
            return Ok(SampleStatus::Cancelled);
        }
        let Some(buffers) = core.buffers.as_mut() else {
            return Err(HostError::StatePrecondition {
                operation: "sample",
                state: core.state,
            });
        };

        if changed {
            log::debug!("Session {:?}: scene changed, restarting accumulation", self.id);
            buffers.clear();
            core.progress.reset_sample();
            core.written = false;
        }
        for (tile, pixels) in &rendered {
            buffers.accumulate(tile, pixels)?;
            core.progress.add_tile();
        }
        buffers.finish_sample();
        core.progress.add_sample(started.elapsed());
        let sample = buffers.samples();

        let wanted = self.wanted();
        let depth = snapshot.integrator().max_bounce.max(0) as u32;
        for (tile, _) in &rendered {
            self.sink.post(wanted, CallbackKinds::TILE_UPDATE, || {
                SessionEvent::TileUpdate(tile_data(buffers, tile, sample, depth))
            });
        }
        self.sink.post(wanted, CallbackKinds::DISPLAY_UPDATE, || {
            SessionEvent::DisplayUpdate { sample }
        });
        core.snapshot = Some(snapshot);

        let total = core.samples;
        core.progress
            .set_status("Rendering", format!("Sample {sample}/{total}"));
        log::trace!("Session {:?}: sample {sample}/{total}", self.id);
        self.post_status();

        if sample >= total {
            self.post_tile_writes(core);
            Ok(SampleStatus::Done)
        } else {
            Ok(SampleStatus::Continue)
        }
    }
}

fn tile_data(buffers: &RenderBuffers, tile: &Tile, sample: u32, depth: u32) -> TileData {
    TileData {
        x: tile.x,
        y: tile.y,
        w: tile.w,
        h: tile.h,
        sample,
        depth,
        pass: PassType::Combined,
        pixels: buffers
            .tile_pixels(PassType::Combined, tile, sample)
            .unwrap_or_default(),
    }
}

/// Background render loop. Runs until the budget is reached, the session is
/// cancelled or the run is ended from outside.
pub(crate) fn run(shared: Arc<Shared>) {
    log::debug!("Session {:?}: worker started", shared.id);
    loop {
        {
            let mut core = shared.core.lock();
            while core.state == SessionState::Paused && !shared.is_cancelled() {
                shared
                    .changed
                    .wait_for(&mut core, shared.params.cancel_timeout);
            }
            if !matches!(core.state, SessionState::Prepared | SessionState::Sampling) {
                break;
            }
        }

        match shared.step() {
            Ok(SampleStatus::Continue) => {}
            Ok(SampleStatus::Done) => {
                let mut core = shared.core.lock();
                if core.state == SessionState::Sampling {
                    shared.end_run_locked(&mut core);
                }
                break;
            }
            Ok(SampleStatus::Cancelled) => break,
            // An end_run racing the state check surfaces as an error here;
            // only a live run is cancelled.
            Err(err) => {
                let mut core = shared.core.lock();
                if core.state.can_cancel() {
                    log::error!("Session {:?}: render failed: {err}", shared.id);
                    shared.cancel_locked(&mut core, &err.to_string());
                }
                break;
            }
        }
    }

    let mut core = shared.core.lock();
    core.worker_running = false;
    shared.changed.notify_all();
    drop(core);
    shared.post_status();
    log::debug!("Session {:?}: worker stopped", shared.id);
}
