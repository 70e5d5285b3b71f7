use crate::error::{Result, SleepError};
use crate::models::array::ActivitySnapshot;
use crate::util::shutdown;
use crate::util::slot::{Offer, SlotSender};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Read the array's activity counter (`/sys/block/<md>/stat`) as raw bytes.
pub fn read_snapshot(path: &Path) -> Result<ActivitySnapshot> {
    fs::read(path)
        .map(ActivitySnapshot::new)
        .map_err(|source| SleepError::MonitorRead { path: path.to_path_buf(), source })
}

/// Polls the activity counter and signals whenever its bytes change.
#[derive(Debug, Clone)]
pub struct ActivityMonitor {
    path:     PathBuf,
    interval: Duration,
}

/// Running monitor thread. Dropping the handle stops the thread.
pub struct MonitorHandle {
    stop_tx: Option<Sender<()>>,
    thread:  Option<JoinHandle<Result<()>>>,
}

impl ActivityMonitor {
    pub fn new(path: PathBuf, interval: Duration) -> Self {
        Self { path, interval }
    }

    /// Take the baseline reading and start polling on a background thread.
    ///
    /// The first read happens here, so a missing counter fails the caller
    /// instead of the thread.
    pub fn spawn(self, tx: SlotSender<ActivitySnapshot>) -> Result<MonitorHandle> {
        let baseline = read_snapshot(&self.path)?;
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = thread::spawn(move || self.run(baseline, tx, stop_rx));
        Ok(MonitorHandle { stop_tx: Some(stop_tx), thread: Some(thread) })
    }

    fn run(
        &self,
        mut last: ActivitySnapshot,
        tx: SlotSender<ActivitySnapshot>,
        stop_rx: mpsc::Receiver<()>,
    ) -> Result<()> {
        loop {
            match stop_rx.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }
            if shutdown::requested() {
                tracing::info!("termination requested, stopping activity monitor");
                return Ok(());
            }

            let current = match read_snapshot(&self.path) {
                Ok(s)  => s,
                Err(e) => {
                    tracing::error!("{}", e);
                    return Err(e);
                }
            };
            if current == last { continue; }

            let size = current.as_bytes().len();
            match tx.offer(current.clone()) {
                Offer::Delivered => tracing::trace!("activity on {} ({} bytes)", self.path.display(), size),
                Offer::Coalesced => tracing::trace!("activity coalesced into pending signal"),
                Offer::Closed    => return Ok(()),
            }
            last = current;
        }
    }
}

impl MonitorHandle {
    /// Ask the thread to exit; it notices immediately.
    pub fn stop(&mut self) {
        self.stop_tx.take();
    }

    /// Stop the thread and return how it ended.
    pub fn join(mut self) -> Result<()> {
        self.stop();
        match self.thread.take() {
            Some(t) => match t.join() {
                Ok(res)    => res,
                Err(panic) => std::panic::resume_unwind(panic),
            },
            None => Ok(()),
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.stop();
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}
