//! Control thread that drives an engine's tick.

use crate::Result;
use crossbeam_channel::{bounded, RecvTimeoutError, Receiver, Sender};
use parking_lot::Mutex;
use spool_core::AtomicFlag;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thread_priority::ThreadPriority;
use tracing::debug;

/// Control-path work an engine does on a fixed schedule.
pub trait Tick: Send {
    /// One round of control work. `false` once there is nothing left to drive.
    fn tick(&mut self) -> bool;
}

enum DriverCommand {
    Shutdown,
}

/// Ticks a shared engine every `interval` on its own thread.
///
/// The thread exits when the engine's tick returns `false`, on [`TickDriver::stop`],
/// or when the driver is dropped. Control calls from other threads lock the same
/// mutex, so they never interleave with a tick.
pub struct TickDriver<T: Tick + 'static> {
    engine: Arc<Mutex<T>>,
    command_tx: Sender<DriverCommand>,
    thread_handle: Option<JoinHandle<()>>,
    running: Arc<AtomicFlag>,
}

impl<T: Tick + 'static> TickDriver<T> {
    pub fn spawn(engine: Arc<Mutex<T>>, interval: Duration) -> Result<Self> {
        let (tx, rx) = bounded(1);
        let running = Arc::new(AtomicFlag::new(true));

        let thread_engine = Arc::clone(&engine);
        let thread_running = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("spool-tick".into())
            .spawn(move || {
                let _ = thread_priority::set_current_thread_priority(ThreadPriority::Max);
                tick_loop(thread_engine, rx, interval, thread_running);
            })?;

        Ok(Self {
            engine,
            command_tx: tx,
            thread_handle: Some(handle),
            running,
        })
    }

    pub fn engine(&self) -> &Arc<Mutex<T>> {
        &self.engine
    }

    /// The control thread has not exited yet.
    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    /// Stop ticking and join the thread.
    pub fn stop(&mut self) {
        let _ = self.command_tx.try_send(DriverCommand::Shutdown);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl<T: Tick + 'static> Drop for TickDriver<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn tick_loop<T: Tick>(
    engine: Arc<Mutex<T>>,
    rx: Receiver<DriverCommand>,
    interval: Duration,
    running: Arc<AtomicFlag>,
) {
    let mut ticks = 0u64;
    loop {
        ticks += 1;
        if !engine.lock().tick() {
            break;
        }
        match rx.recv_timeout(interval) {
            Ok(DriverCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
    running.set(false);
    debug!(ticks, "tick driver exited");
}
