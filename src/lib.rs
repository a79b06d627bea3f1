// Downbeat - A Statsd client for Rust
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A Statsd client for Rust with sampling, batching, and per-tenant fan-out.
//!
//! Downbeat emits application metrics to a Statsd aggregation daemon over
//! UDP, fire and forget: no emit operation can fail into, block, or slow
//! down the embedding application beyond a single nonblocking socket write.
//!
//! ## Features
//!
//! * Counters, timers, and gauges in the classic Statsd line format.
//! * Probabilistic sampling with receiver-side rate annotations.
//! * Timing and memory-profiling sessions keyed by metric name.
//! * Batching of formatted lines into a single datagram.
//! * Optional multi-tenant fan-out, re-emitting every metric under a
//!   tenant-scoped sub-key.
//! * Alternate transports via the `MetricSink` trait, including a channel
//!   backed spy sink for tests.
//!
//! ## Usage
//!
//! Create a client from a UDP connection and start emitting:
//!
//! ```rust,no_run
//! use downbeat::prelude::*;
//! use downbeat::{StatsdClient, UdpConnection, DEFAULT_PORT};
//!
//! let conn = UdpConnection::new("metrics.example.com", DEFAULT_PORT).unwrap();
//! let mut client = StatsdClient::from_sink("my.metrics", conn);
//!
//! client.incr("some.counter");
//! client.time("some.method", 42);
//! client.gauge("some.thing", 7);
//! ```
//!
//! ### Sampling
//!
//! High-frequency call sites can transmit only a fraction of their calls.
//! Each transmitted line carries a `|@rate` annotation so the daemon can
//! extrapolate true counts:
//!
//! ```rust,no_run
//! # use downbeat::prelude::*;
//! # use downbeat::{NopMetricSink, StatsdClient};
//! # let mut client = StatsdClient::from_sink("my.metrics", NopMetricSink);
//! client.incr_with_rate("requests.handled", 0.1);
//! client.time_with_rate("requests.duration", 288, 0.1);
//! ```
//!
//! ### Timing sessions
//!
//! Instead of measuring elapsed time yourself, open a session and close it
//! when the work is done:
//!
//! ```rust
//! use downbeat::prelude::*;
//! use downbeat::{NopMetricSink, StatsdClient};
//!
//! let mut client = StatsdClient::from_sink("my.metrics", NopMetricSink);
//!
//! client.start_timing("page.render");
//! // ... render the page ...
//! client.end_timing("page.render");
//! ```
//!
//! ### Batching
//!
//! Emissions between `start_batch` and `end_batch` are buffered and written
//! as one newline-joined datagram, cutting syscall and network overhead for
//! bursts of related metrics:
//!
//! ```rust
//! use downbeat::prelude::*;
//! use downbeat::{NopMetricSink, StatsdClient};
//!
//! let mut client = StatsdClient::from_sink("my.metrics", NopMetricSink);
//!
//! client.start_batch();
//! client.time("queries.select", 288);
//! client.count("queries.select", 12);
//! client.end_batch();
//! ```
//!
//! ### Multi-tenant fan-out
//!
//! In multi-tenant deployments a single client can feed an aggregate view
//! and a per-tenant rollup at the same time. Every metric is re-emitted
//! under a sanitized tenant sub-key, with its own independent sampling
//! draw:
//!
//! ```rust
//! use downbeat::prelude::*;
//! use downbeat::{SpyMetricSink, StatsdClient};
//!
//! let (rx, sink) = SpyMetricSink::new();
//! let mut client = StatsdClient::builder("my.app", sink)
//!     .with_tenant("app01.example.com")
//!     .build();
//!
//! client.incr("logins.login");
//!
//! assert_eq!("my.app.logins.login:1|c".as_bytes(), rx.recv().unwrap().as_slice());
//! assert_eq!(
//!     "my.app.logins.login.app01_example_com:1|c".as_bytes(),
//!     rx.recv().unwrap().as_slice()
//! );
//! ```
//!
//! ### Quiet emission and error handling
//!
//! Metrics emission must never interrupt the host application, so every
//! failure degrades to "metric lost". To observe losses, register an error
//! handler when building the client; transport errors expose the exact
//! payload that was dropped:
//!
//! ```rust
//! use downbeat::prelude::*;
//! use downbeat::{MetricError, NopMetricSink, StatsdClient};
//!
//! fn my_error_handler(err: MetricError) {
//!     eprintln!("metric error: {} ({:?})", err, err.payload());
//! }
//!
//! let mut client = StatsdClient::builder("prefix", NopMetricSink)
//!     .with_error_handler(my_error_handler)
//!     .build();
//!
//! client.count("some.counter", 42);
//! ```
//!
//! ## Ownership
//!
//! A client is built once per request or process scope and passed
//! explicitly to whatever emits metrics; there is no global instance. All
//! stateful operations take `&mut self` and run to completion on the
//! calling thread. Nothing inside the client locks, spawns, or retries.

#![forbid(unsafe_code)]

/// Default port that a Statsd daemon listens on.
pub const DEFAULT_PORT: u16 = 8125;

pub use self::client::{Counted, Gauged, MetricClient, StatsdClient, StatsdClientBuilder, Timed};

pub use self::sinks::{MetricSink, NopMetricSink, SinkStats, SpyMetricSink, UdpConnection};

pub use self::types::{ErrorKind, MetricError, MetricResult};

mod client;
mod format;
pub mod prelude;
mod replica;
mod sampler;
mod sinks;
mod types;
