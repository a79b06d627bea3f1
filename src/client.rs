// Downbeat - A Statsd client for Rust
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::format::{MetricFormatter, MetricType, MetricValue};
use crate::replica::TenantReplicator;
use crate::sampler::Sampler;
use crate::sinks::MetricSink;
use crate::types::{ErrorKind, MetricError};
use rand::RngCore;
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;
use tracing::{debug, warn};

/// Trait for incrementing and decrementing counters.
///
/// Counters are simple values incremented or decremented by a client. The
/// rates at which these events occur or average values will be determined
/// by the server receiving them. Examples of counter uses include number
/// of logins to a system or requests received.
///
/// The `_with_rate` variants transmit only the given fraction of calls,
/// decided by a uniform draw per call, and annotate each transmitted line
/// with the rate so the server can extrapolate true counts. A rate of one
/// or more always transmits and never annotates.
///
/// See the [Statsd spec](https://github.com/b/statsd_spec) for more
/// information.
pub trait Counted {
    /// Increment or decrement the counter by the given amount, transmitting
    /// only the given fraction of calls.
    fn count_with_rate(&mut self, key: &str, count: i64, rate: f64);

    /// Increment or decrement the counter by the given amount
    fn count(&mut self, key: &str, count: i64) {
        self.count_with_rate(key, count, 1.0);
    }

    /// Increment the counter by 1
    fn incr(&mut self, key: &str) {
        self.count_with_rate(key, 1, 1.0);
    }

    /// Increment the counter by 1, transmitting only the given fraction
    /// of calls.
    fn incr_with_rate(&mut self, key: &str, rate: f64) {
        self.count_with_rate(key, 1, rate);
    }

    /// Decrement the counter by 1
    fn decr(&mut self, key: &str) {
        self.count_with_rate(key, -1, 1.0);
    }

    /// Decrement the counter by 1, transmitting only the given fraction
    /// of calls.
    fn decr_with_rate(&mut self, key: &str, rate: f64) {
        self.count_with_rate(key, -1, rate);
    }
}

/// Trait for recording timings in milliseconds.
///
/// Timings are a positive number of milliseconds between a start and end
/// time. Examples include time taken to render a web page or time taken
/// for a database call to return.
///
/// See the [Statsd spec](https://github.com/b/statsd_spec) for more
/// information.
pub trait Timed {
    /// Record a timing in milliseconds with the given key, transmitting
    /// only the given fraction of calls.
    fn time_with_rate(&mut self, key: &str, millis: u64, rate: f64);

    /// Record a timing in milliseconds with the given key
    fn time(&mut self, key: &str, millis: u64) {
        self.time_with_rate(key, millis, 1.0);
    }
}

/// Trait for recording gauge values.
///
/// Gauge values are an instantaneous measurement of a value determined
/// by the client. They do not change unless changed by the client. Examples
/// include things like load average or how many connections are active.
///
/// Gauges are never sampled: an out-of-date gauge is worse than a missed
/// counter increment, so every call transmits.
pub trait Gauged {
    /// Record a gauge value with the given key
    fn gauge(&mut self, key: &str, value: u64);
}

/// Trait that encompasses all other traits for sending metrics.
///
/// If you wish to use `StatsdClient` with a generic type or place a
/// `StatsdClient` instance behind a pointer (such as a `Box`) this will
/// allow you to reference all the implemented methods for recording
/// metrics while using a single trait.
///
/// ```
/// use downbeat::{MetricClient, NopMetricSink, StatsdClient};
///
/// let mut client: Box<dyn MetricClient> = Box::new(StatsdClient::from_sink(
///     "prefix", NopMetricSink));
///
/// client.count("some.counter", 1);
/// client.time("some.timer", 42);
/// client.gauge("some.gauge", 8);
/// ```
pub trait MetricClient: Counted + Timed + Gauged {}

type ErrorHandler = Box<dyn Fn(MetricError)>;
type MonotonicClock = Box<dyn FnMut() -> u64>;
type MemoryProbe = Box<dyn Fn() -> i64>;

/// Builder for creating and customizing `StatsdClient` instances.
///
/// Instances of the builder should be created by calling the `::builder()`
/// method on the `StatsdClient` struct.
///
/// # Example
///
/// ```
/// use downbeat::prelude::*;
/// use downbeat::{MetricError, NopMetricSink, StatsdClient};
///
/// fn my_error_handler(err: MetricError) {
///     eprintln!("metric error: {}", err);
/// }
///
/// let mut client = StatsdClient::builder("prefix", NopMetricSink)
///     .with_error_handler(my_error_handler)
///     .with_tenant("app01.example.com")
///     .build();
///
/// client.count("something", 123);
/// ```
pub struct StatsdClientBuilder {
    prefix: String,
    sink: Box<dyn MetricSink>,
    errors: ErrorHandler,
    sampler: Sampler,
    clock: MonotonicClock,
    memory_probe: Option<MemoryProbe>,
    tenant: Option<TenantReplicator>,
}

impl StatsdClientBuilder {
    // Set the required fields and defaults for optional fields
    fn new<T>(prefix: &str, sink: T) -> Self
    where
        T: MetricSink + 'static,
    {
        StatsdClientBuilder {
            // required
            prefix: formatted_prefix(prefix),
            sink: Box::new(sink),

            // optional with defaults
            errors: Box::new(nop_error_handler),
            sampler: Sampler::from_entropy(),
            clock: default_clock(),
            memory_probe: None,
            tenant: None,
        }
    }

    /// Set an error handler to invoke when an emission is lost.
    ///
    /// The handler is invoked when a payload could not be written to the
    /// sink or when an operation was called with input that cannot produce
    /// a datagram (such as a sample rate of zero). For transport failures
    /// the error exposes the exact dropped payload via
    /// [`MetricError::payload`].
    ///
    /// The handler should consume the error without panicking. The error
    /// may be logged, counted, discarded, etc., this is up to the
    /// implementation.
    pub fn with_error_handler<F>(mut self, errors: F) -> Self
    where
        F: Fn(MetricError) + 'static,
    {
        self.errors = Box::new(errors);
        self
    }

    /// Use the given random number generator for sampling draws.
    ///
    /// The default generator is seeded from OS entropy. Supplying a seeded
    /// generator makes the sampling behavior of the built client fully
    /// deterministic, which is mostly useful in tests.
    pub fn with_rng<R>(mut self, rng: R) -> Self
    where
        R: RngCore + 'static,
    {
        self.sampler = Sampler::with_rng(rng);
        self
    }

    /// Use the given closure as the monotonic clock for timing sessions.
    ///
    /// The closure returns a milliseconds reading from an arbitrary fixed
    /// origin. The default clock is anchored to the moment the client was
    /// built.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: FnMut() -> u64 + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    /// Use the given closure as the source of memory readings, in bytes,
    /// for memory profiling sessions.
    ///
    /// There is no default: without a probe the memory profiling operations
    /// of the built client are logged no-ops.
    pub fn with_memory_probe<F>(mut self, probe: F) -> Self
    where
        F: Fn() -> i64 + 'static,
    {
        self.memory_probe = Some(Box::new(probe));
        self
    }

    /// Enable multi-tenant fan-out for the built client.
    ///
    /// Every metric that survives its sampling draw is additionally
    /// re-emitted under `key.<tenant>`, with the tenant identifier
    /// sanitized into a single Graphite path segment. The replica makes
    /// its own independent sampling draw.
    pub fn with_tenant(mut self, tenant: &str) -> Self {
        self.tenant = Some(TenantReplicator::new(tenant));
        self
    }

    /// Construct a new `StatsdClient` instance based on current settings.
    pub fn build(self) -> StatsdClient {
        StatsdClient::from_builder(self)
    }
}

fn formatted_prefix(prefix: &str) -> String {
    if prefix.is_empty() {
        String::new()
    } else {
        format!("{}.", prefix.trim_end_matches('.'))
    }
}

fn default_clock() -> MonotonicClock {
    let origin = Instant::now();
    Box::new(move || origin.elapsed().as_millis() as u64)
}

#[allow(clippy::needless_pass_by_value)]
fn nop_error_handler(_err: MetricError) {
    // nothing
}

/// Client for Statsd that implements various traits to record metrics.
///
/// # Traits
///
/// The client is the main entry point for users of this library. It
/// supports several traits for recording metrics of different types.
///
/// * `Counted` for emitting counters.
/// * `Timed` for emitting timings.
/// * `Gauged` for emitting gauge values.
/// * `MetricClient` for a combination of all of the above.
///
/// For more information about the uses for each type of metric, see the
/// documentation for each mentioned trait.
///
/// # Sinks
///
/// The client uses some implementation of a `MetricSink` to emit payloads.
/// Production use goes through a [`UdpConnection`](crate::UdpConnection);
/// tests typically use the [`SpyMetricSink`](crate::SpyMetricSink) or the
/// [`NopMetricSink`](crate::NopMetricSink).
///
/// Emission is fire and forget: no emit operation returns an error to the
/// caller. A payload that cannot be written is dropped, logged, and handed
/// to the error handler configured at construction time.
///
/// # Sessions and batching
///
/// Beyond one-shot emissions the client keeps three pieces of call-scoped
/// state: timing sessions (`start_timing` / `end_timing`), memory profiling
/// sessions (`start_memory_profile` / `end_memory_profile`), and an
/// optional batch buffer (`start_batch` / `end_batch` / `cancel_batch`)
/// that coalesces formatted lines into a single datagram. None of this
/// state expires on its own; callers are responsible for pairing the start
/// and end calls.
///
/// # Ownership
///
/// All stateful operations take `&mut self`: a client belongs to one
/// request or process scope and runs every operation to completion on the
/// calling thread. There is no internal locking. Sharing an instance
/// across threads requires synchronization supplied by the caller.
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
/// client.count("users.signup", 2);
///
/// assert_eq!("my.app.users.signup:2|c".as_bytes(), rx.recv().unwrap().as_slice());
/// ```
pub struct StatsdClient {
    prefix: String,
    sink: Box<dyn MetricSink>,
    errors: ErrorHandler,
    sampler: Sampler,
    clock: MonotonicClock,
    memory_probe: Option<MemoryProbe>,
    tenant: Option<TenantReplicator>,
    timings: HashMap<String, u64>,
    memory_marks: HashMap<String, i64>,
    batch: Option<Vec<String>>,
}

impl StatsdClient {
    /// Create a new client instance that will use the given prefix for
    /// all metrics emitted to the given `MetricSink` implementation.
    ///
    /// Note that this client will discard errors encountered when
    /// emitting metrics.
    ///
    /// # No-op Example
    ///
    /// ```
    /// use downbeat::{NopMetricSink, StatsdClient};
    ///
    /// let prefix = "my.stats";
    /// let client = StatsdClient::from_sink(prefix, NopMetricSink);
    /// ```
    ///
    /// # UDP Example
    ///
    /// ```no_run
    /// use downbeat::{StatsdClient, UdpConnection, DEFAULT_PORT};
    ///
    /// let prefix = "my.stats";
    /// let conn = UdpConnection::new("127.0.0.1", DEFAULT_PORT).unwrap();
    /// let client = StatsdClient::from_sink(prefix, conn);
    /// ```
    pub fn from_sink<T>(prefix: &str, sink: T) -> Self
    where
        T: MetricSink + 'static,
    {
        Self::builder(prefix, sink).build()
    }

    /// Create a new builder with the provided prefix and metric sink.
    ///
    /// A prefix and a metric sink are required to create a new client
    /// instance. All other optional customizations can be set by calling
    /// methods on the returned builder. Any customizations that aren't
    /// set by the caller will use defaults.
    ///
    /// Note, though a metric prefix is required, you may pass an empty
    /// string as a prefix. In this case, the metrics emitted will use only
    /// the bare keys supplied when you call the various methods to emit
    /// metrics.
    pub fn builder<T>(prefix: &str, sink: T) -> StatsdClientBuilder
    where
        T: MetricSink + 'static,
    {
        StatsdClientBuilder::new(prefix, sink)
    }

    // Create a new StatsdClient by consuming the builder
    fn from_builder(builder: StatsdClientBuilder) -> Self {
        StatsdClient {
            prefix: builder.prefix,
            sink: builder.sink,
            errors: builder.errors,
            sampler: builder.sampler,
            clock: builder.clock,
            memory_probe: builder.memory_probe,
            tenant: builder.tenant,
            timings: HashMap::new(),
            memory_marks: HashMap::new(),
            batch: None,
        }
    }

    /// Point every subsequently emitted key at a new namespace prefix.
    pub fn set_namespace(&mut self, namespace: &str) {
        self.prefix = formatted_prefix(namespace);
    }

    /// The namespace every emitted key is prefixed with, without the
    /// trailing separator. Empty when keys are sent bare.
    pub fn namespace(&self) -> &str {
        self.prefix.strip_suffix('.').unwrap_or(&self.prefix)
    }

    /// Open a timing session for the given key, recording the current
    /// monotonic clock reading. Re-issuing `start_timing` for a key that
    /// already has an open session overwrites the prior start.
    pub fn start_timing(&mut self, key: &str) {
        let now = (self.clock)();
        self.timings.insert(key.to_string(), now);
    }

    /// Close the timing session for the given key and emit the elapsed
    /// milliseconds as a timer.
    ///
    /// Calling this without a matching `start_timing` emits nothing; the
    /// dropped session is visible only in diagnostic logging.
    pub fn end_timing(&mut self, key: &str) {
        self.end_timing_with_rate(key, 1.0);
    }

    /// Close the timing session for the given key and emit the elapsed
    /// milliseconds as a timer, transmitting only the given fraction of
    /// calls.
    pub fn end_timing_with_rate(&mut self, key: &str, rate: f64) {
        match self.timings.remove(key) {
            Some(start) => {
                let elapsed = (self.clock)().saturating_sub(start);
                self.time_with_rate(key, elapsed, rate);
            }
            None => debug!(key = %key, "no timing session to end"),
        }
    }

    /// Run the given closure inside a timing session for the given key,
    /// returning whatever the closure returned.
    ///
    /// # Example
    ///
    /// ```
    /// use downbeat::{NopMetricSink, StatsdClient};
    ///
    /// let mut client = StatsdClient::from_sink("my.app", NopMetricSink);
    ///
    /// let rows = client.time_block("db.lookup", || {
    ///     // run the query ...
    ///     42
    /// });
    /// assert_eq!(42, rows);
    /// ```
    pub fn time_block<F, T>(&mut self, key: &str, block: F) -> T
    where
        F: FnOnce() -> T,
    {
        self.start_timing(key);
        let result = block();
        self.end_timing(key);
        result
    }

    /// Open a memory profiling session for the given key, recording the
    /// current reading of the configured memory probe. Without a probe
    /// this is a logged no-op.
    pub fn start_memory_profile(&mut self, key: &str) {
        match self.memory_probe {
            Some(ref probe) => {
                let reading = probe();
                self.memory_marks.insert(key.to_string(), reading);
            }
            None => debug!(key = %key, "no memory probe configured"),
        }
    }

    /// Close the memory profiling session for the given key and emit the
    /// consumed bytes as a counter delta, which may be negative.
    ///
    /// Calling this without a matching `start_memory_profile` emits
    /// nothing.
    pub fn end_memory_profile(&mut self, key: &str) {
        self.end_memory_profile_with_rate(key, 1.0);
    }

    /// Close the memory profiling session for the given key, transmitting
    /// only the given fraction of calls.
    pub fn end_memory_profile_with_rate(&mut self, key: &str, rate: f64) {
        match self.memory_marks.remove(key) {
            Some(start) => {
                let reading = match self.memory_probe {
                    Some(ref probe) => probe(),
                    None => return,
                };
                self.count_with_rate(key, reading - start, rate);
            }
            None => debug!(key = %key, "no memory profile to end"),
        }
    }

    /// Emit the current reading of the configured memory probe as a
    /// counter. Without a probe this is a logged no-op.
    pub fn memory(&mut self, key: &str) {
        self.memory_with_rate(key, 1.0);
    }

    /// Emit the current reading of the configured memory probe as a
    /// counter, transmitting only the given fraction of calls.
    pub fn memory_with_rate(&mut self, key: &str, rate: f64) {
        let reading = match self.memory_probe {
            Some(ref probe) => probe(),
            None => {
                debug!(key = %key, "no memory probe configured");
                return;
            }
        };
        self.count_with_rate(key, reading, rate);
    }

    /// Start buffering emissions instead of writing them to the sink.
    ///
    /// While batch mode is active every emission that survives its
    /// sampling draw is appended, already formatted, to an in-memory
    /// buffer. `end_batch` writes the whole buffer as one newline-joined
    /// payload. Starting a batch while one is already active has no
    /// effect; batches do not nest.
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
    /// client.start_batch();
    /// client.count("a", 1);
    /// client.count("b", 2);
    /// client.end_batch();
    ///
    /// assert_eq!("my.app.a:1|c\nmy.app.b:2|c".as_bytes(), rx.recv().unwrap().as_slice());
    /// ```
    pub fn start_batch(&mut self) {
        if self.batch.is_none() {
            self.batch = Some(Vec::new());
        }
    }

    /// Leave batch mode and write everything buffered since `start_batch`
    /// as a single payload. An empty buffer writes nothing.
    pub fn end_batch(&mut self) {
        match self.batch.take() {
            Some(lines) => {
                if !lines.is_empty() {
                    let payload = lines.join("\n");
                    self.emit_now(&payload);
                }
            }
            None => debug!("end_batch called outside of batch mode"),
        }
    }

    /// Leave batch mode and discard everything buffered since
    /// `start_batch`.
    pub fn cancel_batch(&mut self) {
        self.batch = None;
    }

    /// Is batch mode currently active?
    pub fn in_batch(&self) -> bool {
        self.batch.is_some()
    }

    /// The funnel every emission goes through: namespace the key, decide
    /// the sampling fate, format the line, then buffer or write it. An
    /// emission that survives its own draw is replayed once through the
    /// funnel under the tenant-scoped key; the `replica` flag stops the
    /// replay from fanning out again.
    fn send_metric(&mut self, key: &str, value: MetricValue, type_: MetricType, rate: f64, replica: bool) {
        if key.is_empty() {
            debug!("empty metric key, nothing to send");
            return;
        }
        if !rate.is_finite() || rate <= 0.0 {
            (self.errors)(MetricError::from((
                ErrorKind::InvalidInput,
                "sample rate must be within (0, 1]",
            )));
            return;
        }

        let sampled = rate >= 1.0 || self.sampler.draw() <= rate || self.sink.force_sampling();
        if !sampled {
            return;
        }

        let line = {
            let mut formatter = MetricFormatter::new(&self.prefix, key, value, type_);
            if rate < 1.0 {
                formatter.with_sample_rate(rate);
            }
            formatter.format()
        };

        match self.batch {
            Some(ref mut buffer) => buffer.push(line),
            None => self.emit_now(&line),
        }

        if !replica {
            let scoped = self.tenant.as_ref().map(|t| t.scoped_key(key));
            if let Some(scoped) = scoped {
                self.send_metric(&scoped, value, type_, rate, true);
            }
        }
    }

    fn emit_now(&self, payload: &str) {
        if let Err(err) = self.sink.emit(payload) {
            warn!(payload = %payload, error = %err, "metric payload dropped");
            (self.errors)(MetricError::dropped(payload.to_string(), err));
        }
    }
}

impl Counted for StatsdClient {
    fn count_with_rate(&mut self, key: &str, count: i64, rate: f64) {
        self.send_metric(key, MetricValue::Signed(count), MetricType::Counter, rate, false);
    }
}

impl Timed for StatsdClient {
    fn time_with_rate(&mut self, key: &str, millis: u64, rate: f64) {
        self.send_metric(key, MetricValue::Unsigned(millis), MetricType::Timer, rate, false);
    }
}

impl Gauged for StatsdClient {
    fn gauge(&mut self, key: &str, value: u64) {
        self.send_metric(key, MetricValue::Unsigned(value), MetricType::Gauge, 1.0, false);
    }
}

impl MetricClient for StatsdClient {}

impl fmt::Debug for StatsdClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StatsdClient {{ prefix: {:?}, sink: ..., tenant: {:?}, in_batch: {} }}",
            self.prefix,
            self.tenant.as_ref().map(|t| t.segment()),
            self.in_batch(),
        )
    }
}
