//! Render sessions.
//!
//! A [`Session`] samples an attached scene into its buffers, either stepped
//! by the client ([`Session::sample`]) or by a background worker thread
//! ([`Session::start`]). Cancellation and pausing are cooperative: they set
//! flags the sampling loop observes between tiles and samples.
//!
//! Callbacks registered on a session are only ever invoked on the thread
//! that calls [`Session::sample`], [`Session::wait`] or
//! [`Session::dispatch_events`].

mod buffers;
mod progress;
mod state;
mod tiles;
mod worker;

pub use buffers::{BufferInfo, BufferParams, PassType, PixelSample, RenderBuffers};
pub use progress::Progress;
pub use state::{SampleStatus, SessionState};
pub use tiles::{split as split_tiles, Tile};

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;

use crate::callback::{
    CallbackTable, CancelCallback, DisplayCallback, EventSink, SessionEvent, StatusCallback,
    TileCallback,
};
use crate::device::DeviceInfo;
use crate::engine::{guarded, RenderEngine};
use crate::error::{HostError, HostResult};
use crate::handle::{RawHandle, SessionId};
use crate::lock::SceneLockGuard;
use crate::params::SessionParams;
use crate::scene::SharedScene;
use worker::Shared;

/// Message recorded when the cancel-test callback asks for cancellation.
pub const CLIENT_CANCEL_MESSAGE: &str = "Cancelled by client";

pub struct Session {
    shared: Arc<Shared>,
    device: DeviceInfo,
    callbacks: Mutex<CallbackTable>,
    events: Receiver<SessionEvent>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.shared.id)
            .field("device", &self.device.id)
            .field("state", &self.state())
            .finish()
    }
}

impl Session {
    /// Creates a session rendering on `device` (device `index`).
    ///
    /// Fails with [`HostError::Engine`] if the engine cannot open the device.
    pub fn new(
        id: SessionId,
        params: SessionParams,
        index: u32,
        device: DeviceInfo,
        engine: Arc<dyn RenderEngine>,
    ) -> HostResult<Self> {
        guarded(|| engine.open_device(index, &device))?;
        let (sender, events) = crossbeam_channel::unbounded();
        log::debug!(
            "Session {id:?}: created on device {index} ({}) with {}",
            device.description,
            engine.name()
        );
        Ok(Self {
            shared: Arc::new(Shared::new(id, engine, params, EventSink::new(sender))),
            device,
            callbacks: Mutex::new(CallbackTable::default()),
            events,
            worker: Mutex::new(None),
        })
    }

    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    pub fn params(&self) -> &SessionParams {
        &self.shared.params
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn state(&self) -> SessionState {
        self.shared.core.lock().state
    }

    // Scene binding.

    /// Attaches `scene`. Valid before a run and after one ended.
    pub fn set_scene(&self, scene: Arc<SharedScene>) -> HostResult<()> {
        use SessionState::*;
        let mut core = self.shared.core.lock();
        core.state
            .require("set_scene", &[Created, Configured, EndedRun])?;
        core.scene = Some(scene);
        core.snapshot = None;
        core.state = Configured;
        Ok(())
    }

    pub fn scene(&self) -> Option<Arc<SharedScene>> {
        self.shared.core.lock().scene.clone()
    }

    /// Detaches the scene so it can move to another session. Fails while a
    /// run is in progress.
    pub fn detach_scene(&self) -> HostResult<Option<Arc<SharedScene>>> {
        let mut core = self.shared.core.lock();
        if core.state.is_running() {
            return Err(HostError::StatePrecondition {
                operation: "detach_scene",
                state: core.state,
            });
        }
        if matches!(core.state, SessionState::Configured | SessionState::EndedRun) {
            core.state = SessionState::Created;
        }
        core.snapshot = None;
        Ok(core.scene.take())
    }

    // Run setup.

    /// Sets the buffer region and sample budget for the next run.
    pub fn reset(&self, params: BufferParams, samples: u32) -> HostResult<()> {
        use SessionState::*;
        params.validate()?;
        let mut core = self.shared.core.lock();
        core.state.require("reset", &[Configured, EndedRun])?;
        core.buffer_params = Some(params);
        core.samples = samples;
        core.progress.reset();
        core.progress.set_total_samples(samples);
        Ok(())
    }

    /// Enables an extra render pass for the next run.
    pub fn add_pass(&self, pass: PassType) -> HostResult<()> {
        let mut core = self.shared.core.lock();
        if core.state.is_running() {
            return Err(HostError::StatePrecondition {
                operation: "add_pass",
                state: core.state,
            });
        }
        if !core.passes.contains(&pass) {
            core.passes.push(pass);
        }
        Ok(())
    }

    pub fn clear_passes(&self) -> HostResult<()> {
        let mut core = self.shared.core.lock();
        if core.state.is_running() {
            return Err(HostError::StatePrecondition {
                operation: "clear_passes",
                state: core.state,
            });
        }
        core.passes.clear();
        Ok(())
    }

    /// Changes the sample budget, also during a run.
    pub fn set_samples(&self, samples: u32) -> HostResult<()> {
        let mut core = self.shared.core.lock();
        if core.state.is_finished() && core.state != SessionState::EndedRun {
            return Err(HostError::StatePrecondition {
                operation: "set_samples",
                state: core.state,
            });
        }
        core.samples = samples;
        core.progress.set_total_samples(samples);
        Ok(())
    }

    /// Allocates buffers and validates the scene for a new run.
    ///
    /// Without an explicit [`reset`](Self::reset) the buffers cover the
    /// camera resolution.
    pub fn prepare_run(&self) -> HostResult<()> {
        use SessionState::*;
        let scene = {
            let core = self.shared.core.lock();
            core.state.require("prepare_run", &[Configured, EndedRun])?;
            core.scene.clone().ok_or(HostError::StatePrecondition {
                operation: "prepare_run",
                state: core.state,
            })?
        };

        // The session mutex is free while waiting for the scene lock.
        let snapshot = {
            let _guard = self.prepare_guard(&scene)?;
            scene.edit(|scene| scene.snapshot())?
        };

        let mut core = self.shared.core.lock();
        core.state.require("prepare_run", &[Configured, EndedRun])?;
        if !core
            .scene
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &scene))
        {
            return Err(HostError::StatePrecondition {
                operation: "prepare_run",
                state: core.state,
            });
        }
        let params = match core.buffer_params {
            Some(params) => params,
            None => {
                let camera = snapshot.camera();
                BufferParams::full(camera.width, camera.height)
            }
        };
        let buffers = RenderBuffers::new(params, &core.passes)?;
        let shared = &self.shared.params;

        core.tiles = split_tiles(params.width, params.height, shared.tile_size, shared.tile_order);
        core.progress.reset_sample();
        let total_samples = core.samples;
        core.progress.set_total_samples(total_samples);
        let tiles_total = core.tiles.len() as u32;
        core.progress.set_tiles_total(tiles_total);
        core.progress.begin();
        core.progress.set_status("Rendering", "");
        core.buffer_params = Some(params);
        core.buffers = Some(buffers);
        core.snapshot = Some(snapshot);
        core.written = false;
        core.resume_to = Sampling;
        core.state = Prepared;
        self.shared.cancel.store(false, Ordering::Release);
        log::debug!(
            "Session {:?}: prepared {}x{} in {} tiles, {} samples",
            self.shared.id,
            params.width,
            params.height,
            core.tiles.len(),
            core.samples
        );
        Ok(())
    }

    /// Scene lock for [`prepare_run`](Self::prepare_run). Polls so a state
    /// change made while waiting (a cancel, a destroy) ends the wait.
    fn prepare_guard<'a>(&self, scene: &'a SharedScene) -> HostResult<Option<SceneLockGuard<'a>>> {
        use SessionState::*;
        if scene.lock().is_held_by_current_thread() {
            return Ok(None);
        }
        loop {
            if let Some(guard) = scene.lock().try_guard_for(self.shared.params.cancel_timeout) {
                return Ok(Some(guard));
            }
            self.shared
                .core
                .lock()
                .state
                .require("prepare_run", &[Configured, EndedRun])?;
        }
    }

    // Sampling.

    /// Renders one sample on the calling thread, then dispatches the events
    /// it produced.
    pub fn sample(&self) -> HostResult<SampleStatus> {
        if self.shared.core.lock().worker_running {
            return Err(HostError::StatePrecondition {
                operation: "sample",
                state: self.state(),
            });
        }
        self.poll_cancel_test();
        let status = self.shared.step();
        self.dispatch_events();
        status
    }

    /// Starts the background render loop.
    pub fn start(&self) -> HostResult<()> {
        {
            let mut core = self.shared.core.lock();
            core.state.require("start", &[SessionState::Prepared])?;
            if core.worker_running {
                return Err(HostError::StatePrecondition {
                    operation: "start",
                    state: core.state,
                });
            }
            core.worker_running = true;
            core.state = SessionState::Sampling;
        }

        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name(format!("render-session-{}", self.shared.id.raw()))
            .spawn(move || worker::run(shared));
        match spawned {
            Ok(handle) => {
                *self.worker.lock() = Some(handle);
                Ok(())
            }
            Err(err) => {
                let mut core = self.shared.core.lock();
                core.worker_running = false;
                core.state = SessionState::Prepared;
                Err(HostError::Engine(format!("failed to spawn render worker: {err}")))
            }
        }
    }

    /// Pauses or resumes sampling. Never blocks.
    pub fn set_pause(&self, pause: bool) -> HostResult<()> {
        use SessionState::*;
        let mut core = self.shared.core.lock();
        match (pause, core.state) {
            (true, Paused) | (false, Prepared | Sampling) => return Ok(()),
            (true, state @ (Prepared | Sampling)) => {
                core.resume_to = state;
                core.state = Paused;
            }
            (false, Paused) => core.state = core.resume_to,
            (_, state) => {
                return Err(HostError::StatePrecondition {
                    operation: "set_pause",
                    state,
                })
            }
        }
        self.shared.changed.notify_all();
        self.shared.post_status();
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.state() == SessionState::Paused
    }

    /// Cancels the session. Never blocks; a running sample stops at the
    /// next tile boundary.
    pub fn cancel(&self, message: &str) -> HostResult<()> {
        let mut core = self.shared.core.lock();
        if !core.state.can_cancel() {
            return Err(HostError::StatePrecondition {
                operation: "cancel",
                state: core.state,
            });
        }
        self.shared.cancel_locked(&mut core, message);
        Ok(())
    }

    /// Finishes the current run, stopping the worker if one is running.
    pub fn end_run(&self) -> HostResult<()> {
        use SessionState::*;
        {
            let mut core = self.shared.core.lock();
            core.state
                .require("end_run", &[Prepared, Sampling, Paused])?;
            self.shared.end_run_locked(&mut core);
        }
        self.join_worker();
        self.dispatch_events();
        Ok(())
    }

    /// Blocks until the background worker stops, dispatching events while
    /// waiting. Returns immediately if no worker is running.
    pub fn wait(&self) {
        let poll = self.shared.params.cancel_timeout.max(Duration::from_millis(1));
        loop {
            self.dispatch_events();
            let mut core = self.shared.core.lock();
            if !core.worker_running {
                break;
            }
            self.shared.changed.wait_for(&mut core, poll);
        }
        self.join_worker();
        self.dispatch_events();
    }

    /// Stops any run and marks the session destroyed. Returns the scene it
    /// was attached to.
    pub fn destroy(&self) -> Option<Arc<SharedScene>> {
        let scene = {
            let mut core = self.shared.core.lock();
            self.shared.cancel.store(true, Ordering::Release);
            core.state = SessionState::Destroyed;
            self.shared.changed.notify_all();
            core.scene.take()
        };
        self.join_worker();
        self.events.try_iter().for_each(drop);
        log::debug!("Session {:?}: destroyed", self.shared.id);
        scene
    }

    fn join_worker(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("Session {:?}: render worker panicked", self.shared.id);
                self.shared.core.lock().worker_running = false;
            }
        }
    }

    // Callbacks.

    fn update_wanted(&self, table: &CallbackTable) {
        self.shared
            .wanted
            .store(table.registered().bits(), Ordering::Release);
    }

    pub fn set_status_callback(&self, callback: Option<StatusCallback>) {
        let mut table = self.callbacks.lock();
        table.set_status_update(callback);
        self.update_wanted(&table);
    }

    pub fn set_cancel_callback(&self, callback: Option<CancelCallback>) {
        let mut table = self.callbacks.lock();
        table.set_cancel_test(callback);
        self.update_wanted(&table);
    }

    pub fn set_tile_update_callback(&self, callback: Option<TileCallback>) {
        let mut table = self.callbacks.lock();
        table.set_tile_update(callback);
        self.update_wanted(&table);
    }

    pub fn set_tile_write_callback(&self, callback: Option<TileCallback>) {
        let mut table = self.callbacks.lock();
        table.set_tile_write(callback);
        self.update_wanted(&table);
    }

    pub fn set_display_update_callback(&self, callback: Option<DisplayCallback>) {
        let mut table = self.callbacks.lock();
        table.set_display_update(callback);
        self.update_wanted(&table);
    }

    /// Asks the cancel-test callback, cancelling if it says so.
    fn poll_cancel_test(&self) {
        if !self.state().can_cancel() {
            return;
        }
        let cancel = self.callbacks.lock().test_cancel(self.shared.id);
        if cancel {
            let mut core = self.shared.core.lock();
            if core.state.can_cancel() {
                self.shared.cancel_locked(&mut core, CLIENT_CANCEL_MESSAGE);
            }
        }
    }

    /// Delivers queued worker events to the registered callbacks on the
    /// calling thread. Returns the number delivered.
    pub fn dispatch_events(&self) -> usize {
        self.poll_cancel_test();
        let delivered = self.callbacks.lock().drain(self.shared.id, &self.events);
        self.poll_cancel_test();
        delivered
    }

    // Buffers and progress.

    /// Averaged pixels of `pass` over the whole buffer.
    pub fn float_buffer(&self, pass: PassType) -> HostResult<Vec<f32>> {
        let core = self.shared.core.lock();
        let buffers = core.buffers.as_ref().ok_or(HostError::StatePrecondition {
            operation: "get_float_buffer",
            state: core.state,
        })?;
        buffers
            .pass_pixels(pass)
            .ok_or_else(|| HostError::argument(format!("pass {pass:?} is not enabled")))
    }

    /// Copy of the combined pass.
    pub fn copy_buffer(&self) -> HostResult<Vec<f32>> {
        self.float_buffer(PassType::Combined)
    }

    /// Size of the combined pass, zero before the first run.
    pub fn buffer_info(&self) -> BufferInfo {
        self.shared
            .core
            .lock()
            .buffers
            .as_ref()
            .map(RenderBuffers::info)
            .unwrap_or_default()
    }

    /// Resets the progress counters, keeping the budget.
    pub fn progress_reset(&self) {
        self.shared.core.lock().progress.reset();
    }

    pub fn progress(&self) -> Progress {
        self.shared.core.lock().progress.clone()
    }

    /// Samples finished in the current run.
    pub fn progress_sample(&self) -> u32 {
        self.shared.core.lock().progress.sample()
    }

    /// `(status, substatus)`; after a cancel the substatus is the cancel
    /// message.
    pub fn status(&self) -> (String, String) {
        let core = self.shared.core.lock();
        (
            core.progress.status().to_string(),
            core.progress.substatus().to_string(),
        )
    }

    pub fn cancel_message(&self) -> Option<String> {
        self.shared
            .core
            .lock()
            .progress
            .cancel_message()
            .map(str::to_string)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shared.cancel.store(true, Ordering::Release);
        {
            let mut core = self.shared.core.lock();
            if core.state != SessionState::Destroyed {
                core.state = SessionState::Destroyed;
            }
            self.shared.changed.notify_all();
        }
        self.join_worker();
    }
}
