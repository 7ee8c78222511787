//! Push stream over a tokio channel.
//!
//! A producer holds an [`Emitter`] and pushes [`Signal`]s; a single consumer
//! loop ([`drive`]) hands each one to a [`Subscriber`]. Terminal signals
//! consume the emitter, so a well-behaved producer can send at most one.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::error::{PrimerError, Result};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("producer failed: {0}")]
    Producer(String),

    #[error("producer went away without completing the stream")]
    Truncated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal<T> {
    Next(T),
    Complete,
    Error(StreamError),
}

pub type SignalStream<T> = ReceiverStream<Signal<T>>;

pub struct Emitter<T> {
    tx: mpsc::Sender<Signal<T>>,
}

/// A zero `capacity` is raised to one.
pub fn channel<T>(capacity: usize) -> (Emitter<T>, SignalStream<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (Emitter { tx }, ReceiverStream::new(rx))
}

impl<T> Emitter<T> {
    pub async fn next(&mut self, item: T) -> Result<()> {
        self.tx
            .send(Signal::Next(item))
            .await
            .map_err(|_| PrimerError::SubscriberGone)
    }

    pub async fn complete(self) -> Result<()> {
        self.finish(Signal::Complete).await
    }

    pub async fn error(self, err: StreamError) -> Result<()> {
        self.finish(Signal::Error(err)).await
    }

    async fn finish(self, signal: Signal<T>) -> Result<()> {
        self.tx.send(signal).await.map_err(|_| PrimerError::SubscriberGone)
    }
}

pub trait Subscriber<T> {
    fn on_next(&mut self, item: T);
    fn on_error(&mut self, err: StreamError);
    fn on_complete(&mut self);
}

/// What the consumer loop saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub items: usize,
    pub completed: bool,
    pub errored: bool,
}

/// Feeds every signal to `subscriber` until the first terminal one.
///
/// A channel that closes without a terminal signal is reported to the
/// subscriber as [`StreamError::Truncated`].
pub async fn drive<T, S>(mut stream: SignalStream<T>, subscriber: &mut S) -> StreamSummary
where
    S: Subscriber<T>,
{
    let mut summary = StreamSummary::default();

    while let Some(signal) = stream.next().await {
        match signal {
            Signal::Next(item) => {
                summary.items += 1;
                subscriber.on_next(item);
            }
            Signal::Complete => {
                summary.completed = true;
                subscriber.on_complete();
                return summary;
            }
            Signal::Error(err) => {
                summary.errored = true;
                subscriber.on_error(err);
                return summary;
            }
        }
    }

    summary.errored = true;
    subscriber.on_error(StreamError::Truncated);
    summary
}

/// Spawns a producer that emits `0..count` in order and then completes.
pub fn range_publisher(count: u32, capacity: usize) -> SignalStream<u32> {
    let (mut emitter, stream) = channel(capacity);

    tokio::spawn(async move {
        for i in 0..count {
            if emitter.next(i).await.is_err() {
                debug!(emitted = i, "subscriber dropped, producer stopping");
                return;
            }
        }
        if let Err(err) = emitter.complete().await {
            debug!(%err, "completion not delivered");
        }
    });

    stream
}

/// Logs each signal and remembers what it saw.
#[derive(Debug)]
pub struct LoggingSubscriber<T> {
    pub received: Vec<T>,
    pub completions: usize,
    pub errors: Vec<StreamError>,
}

impl<T> LoggingSubscriber<T> {
    pub fn new() -> Self {
        Self {
            received: Vec::new(),
            completions: 0,
            errors: Vec::new(),
        }
    }
}

impl<T: std::fmt::Debug> Subscriber<T> for LoggingSubscriber<T> {
    fn on_next(&mut self, item: T) {
        info!(?item, "next");
        self.received.push(item);
    }

    fn on_error(&mut self, err: StreamError) {
        warn!(%err, "stream error");
        self.errors.push(err);
    }

    fn on_complete(&mut self) {
        info!(items = self.received.len(), "completed");
        self.completions += 1;
    }
}
