//! Observable dispatcher events.
//!
//! Every event is written to the log and broadcast to subscribers obtained
//! through [`Dispatcher::subscribe`](crate::Dispatcher::subscribe).
//! Publishing never fails: without subscribers events are only logged,
//! and slow subscribers miss the oldest events.

use std::fmt::{self, Display};
use std::time::Duration;

use tokio::sync::broadcast;

use crate::Method;

/// Number of events kept for subscribers that have not caught up yet
const EVENT_CAPACITY: usize = 256;

/// Something the dispatcher wants to tell its observers about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Diagnostic message
    Debug(String),
    /// A request waits for its bucket to reset
    RateLimited(RateLimitInfo),
    /// The server imposed a global rate limit
    GlobalRateLimited {
        /// How long all requests are held back
        duration: Duration,
    },
}

/// Details of a bucket-level rate limit wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Method of the waiting request
    pub method: Method,
    /// Endpoint of the waiting request
    pub endpoint: String,
    /// Time until the bucket resets
    pub duration: Duration,
    /// Bucket hash
    pub hash: String,
    /// Quota of the bucket, if the server reported one
    pub limit: Option<u64>,
    /// Major parameter of the bucket
    pub major_parameter: String,
}

impl Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Debug(message) => f.write_str(message),
            Event::RateLimited(info) => write!(
                f,
                "Rate limited on {} {}, waiting {}ms (bucket {}:{}, limit {})",
                info.method,
                info.endpoint,
                info.duration.as_millis(),
                info.hash,
                info.major_parameter,
                info.limit
                    .map_or_else(|| "unknown".to_string(), |l| l.to_string()),
            ),
            Event::GlobalRateLimited { duration } => write!(
                f,
                "Global rate limit hit, holding all requests for {}ms",
                duration.as_millis()
            ),
        }
    }
}

/// Sending half of the event channel
#[derive(Debug, Clone)]
pub(crate) struct Events {
    sender: broadcast::Sender<Event>,
}

impl Default for Events {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }
}

impl Events {
    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub(crate) fn publish(&self, event: Event) {
        match &event {
            Event::Debug(_) => log::debug!("{event}"),
            Event::RateLimited(_) => log::info!("{event}"),
            Event::GlobalRateLimited { .. } => log::warn!("{event}"),
        }
        // An error only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub(crate) fn debug(&self, message: impl Into<String>) {
        self.publish(Event::Debug(message.into()));
    }
}
