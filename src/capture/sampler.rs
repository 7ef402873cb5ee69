//! Sampler - runs a sample source on its own thread
//!
//! The render loop asks for one reading per sample slot and waits at most
//! `timeout` for the answer. A slow or failing source therefore never
//! stalls the frame cadence; the caller just gets an error for that slot.
//!
//! ## Request/reply protocol
//!
//! Every request carries an increasing id. If the worker falls behind it
//! answers only the newest request it has queued, and the caller discards
//! replies whose id doesn't match the request it is waiting on (those
//! belong to requests that already timed out).

use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::ring::MIDPOINT;
use super::source::{validate, SampleSource, SourceError};
use super::stats::{SignalHistory, StatsFeed};

type Reply = (u64, Result<f32, SourceError>);

/// Extra time a shutting-down worker gets on top of one read timeout
const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

/// Builds the source on the worker thread
pub type SourceFactory =
    Box<dyn FnOnce() -> Result<Box<dyn SampleSource>, SourceError> + Send + 'static>;

/// Where the worker records statistics for successful readings
pub struct StatsSink {
    pub feed: StatsFeed,
    pub capacity: usize,
    pub full_scale: f32,
}

/// Handle to the sampler worker
pub struct Sampler {
    requests: Option<Sender<u64>>,
    replies: Receiver<Reply>,
    next_id: u64,
    timeout: Duration,
    worker: Option<JoinHandle<()>>,
}

impl Sampler {
    /// Start the worker thread
    ///
    /// # Arguments
    /// * `factory` - Called once on the worker to build the source
    /// * `timeout` - Longest a single `read()` waits for its reply
    /// * `stats` - Optional statistics sink fed with every good reading
    pub fn spawn(
        factory: SourceFactory,
        timeout: Duration,
        stats: Option<StatsSink>,
    ) -> io::Result<Self> {
        let (request_tx, request_rx) = mpsc::channel::<u64>();
        let (reply_tx, reply_rx) = mpsc::channel::<Reply>();

        let worker = std::thread::Builder::new()
            .name("crt-scope-sampler".into())
            .spawn(move || run_worker(factory, request_rx, reply_tx, stats))?;

        Ok(Self {
            requests: Some(request_tx),
            replies: reply_rx,
            next_id: 0,
            timeout,
            worker: Some(worker),
        })
    }

    /// Bounded wait applied to every read
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Request one reading and wait for it, up to the timeout
    pub fn read(&mut self) -> Result<f32, SourceError> {
        let requests = self.requests.as_ref().ok_or(SourceError::Disconnected)?;

        let id = self.next_id;
        self.next_id += 1;
        requests.send(id).map_err(|_| SourceError::Disconnected)?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.replies.recv_timeout(remaining) {
                Ok((reply_id, result)) if reply_id == id => return result,
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => return Err(SourceError::TimedOut),
                Err(RecvTimeoutError::Disconnected) => return Err(SourceError::Disconnected),
            }
        }
    }

    /// Stop the worker and wait a bounded time for it to exit
    ///
    /// Safe to call more than once. A source stuck inside `read()` gets one
    /// read timeout plus `SHUTDOWN_GRACE` to return; after that the worker
    /// is detached and exits on its own once the read completes.
    pub fn shutdown(&mut self) {
        // Closing the request channel ends the worker loop
        self.requests = None;
        let Some(worker) = self.worker.take() else {
            return;
        };

        let deadline = Instant::now() + self.timeout + SHUTDOWN_GRACE;
        while !worker.is_finished() {
            if Instant::now() >= deadline {
                log::warn!("Sample source did not return in time, detaching sampler thread");
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        if worker.join().is_err() {
            log::error!("Sampler thread panicked");
        }
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    factory: SourceFactory,
    requests: Receiver<u64>,
    replies: Sender<Reply>,
    stats: Option<StatsSink>,
) {
    let mut source = match factory() {
        Ok(source) => source,
        Err(e) => {
            log::error!("Failed to open sample source: {}", e);
            return;
        }
    };
    log::info!("Sampling from {}", source.name());

    let mut history = stats
        .as_ref()
        .map(|sink| SignalHistory::new(sink.capacity, MIDPOINT, sink.full_scale));

    while let Ok(mut id) = requests.recv() {
        // Skip straight to the newest request if we fell behind
        while let Ok(newer) = requests.try_recv() {
            id = newer;
        }

        let result = source.read().and_then(validate);

        if let (Ok(value), Some(history), Some(sink)) = (&result, history.as_mut(), stats.as_ref())
        {
            history.push(*value);
            sink.feed.publish(history.stats());
        }

        if replies.send((id, result)).is_err() {
            break;
        }
    }

    log::debug!("Sampler thread exiting");
}
