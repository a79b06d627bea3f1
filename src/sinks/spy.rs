// Downbeat - A Statsd client for Rust
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::sinks::core::MetricSink;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use std::io::{self, ErrorKind};

/// `MetricSink` implementation that writes all payloads to the `Sender` half
/// of a channel while callers are given ownership of the `Receiver` half.
///
/// This is not a general purpose sink, rather it's a sink meant for verifying
/// payloads written during the course of tests. By default the channel used
/// is unbounded. The channel size can be limited using the `with_capacity`
/// method.
///
/// Each payload is sent to the underlying channel when the `.emit()` method
/// is called, in the thread of the caller.
///
/// # Example
///
/// ```
/// use downbeat::prelude::*;
/// use downbeat::{SpyMetricSink, StatsdClient};
///
/// let (rx, sink) = SpyMetricSink::new();
/// let mut client = StatsdClient::from_sink("my.app", sink);
///
/// client.incr("some.event");
/// assert_eq!("my.app.some.event:1|c".as_bytes(), rx.recv().unwrap().as_slice());
/// ```
#[derive(Debug)]
pub struct SpyMetricSink {
    sender: Sender<Vec<u8>>,
    force_sampling: bool,
}

impl SpyMetricSink {
    pub fn new() -> (Receiver<Vec<u8>>, Self) {
        Self::with_queue_capacity(None)
    }

    pub fn with_capacity(queue: usize) -> (Receiver<Vec<u8>>, Self) {
        Self::with_queue_capacity(Some(queue))
    }

    /// Report the force-sampling override through this sink, causing the
    /// client to send every sampled emission. Lets tests assert on sampled
    /// call sites without involving randomness.
    pub fn with_force_sampling(mut self, force: bool) -> Self {
        self.force_sampling = force;
        self
    }

    fn with_queue_capacity(queue: Option<usize>) -> (Receiver<Vec<u8>>, Self) {
        let (tx, rx) = new_channel(queue);
        let sink = SpyMetricSink {
            sender: tx,
            force_sampling: false,
        };
        (rx, sink)
    }
}

impl MetricSink for SpyMetricSink {
    fn emit(&self, payload: &str) -> io::Result<usize> {
        send_payload(&self.sender, payload.as_bytes())
    }

    fn force_sampling(&self) -> bool {
        self.force_sampling
    }
}

fn new_channel(cap: Option<usize>) -> (Sender<Vec<u8>>, Receiver<Vec<u8>>) {
    if let Some(sz) = cap {
        bounded(sz)
    } else {
        unbounded()
    }
}

fn send_payload(sender: &Sender<Vec<u8>>, payload: &[u8]) -> io::Result<usize> {
    match sender.try_send(payload.to_vec()) {
        Err(TrySendError::Disconnected(_)) => Err(io::Error::new(ErrorKind::Other, "channel disconnected")),
        Err(TrySendError::Full(_)) => Err(io::Error::new(ErrorKind::Other, "channel full")),
        Ok(_) => Ok(payload.len()),
    }
}
