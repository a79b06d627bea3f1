// Downbeat - A Statsd client for Rust
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::fmt::{self, Write};

/// Type of metric that knows how to display its wire code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MetricType {
    Counter,
    Timer,
    Gauge,
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MetricType::Counter => "c".fmt(f),
            MetricType::Timer => "ms".fmt(f),
            MetricType::Gauge => "g".fmt(f),
        }
    }
}

/// Holder for primitive metric values that knows how to display itself.
///
/// Counters carry signed values (negative deltas are legal on the wire),
/// timers and gauges carry unsigned ones.
#[derive(Debug, Clone, Copy)]
pub(crate) enum MetricValue {
    Signed(i64),
    Unsigned(u64),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MetricValue::Signed(v) => v.fmt(f),
            MetricValue::Unsigned(v) => v.fmt(f),
        }
    }
}

/// Assembles a single `key:value|type` line, optionally suffixed with the
/// `|@rate` annotation for emissions that survived a sampling draw.
#[derive(Debug, Clone)]
pub(crate) struct MetricFormatter<'a> {
    prefix: &'a str,
    key: &'a str,
    val: MetricValue,
    type_: MetricType,
    sample_rate: Option<f64>,
}

impl<'a> MetricFormatter<'a> {
    pub(crate) fn new(prefix: &'a str, key: &'a str, val: MetricValue, type_: MetricType) -> Self {
        MetricFormatter {
            prefix,
            key,
            val,
            type_,
            sample_rate: None,
        }
    }

    /// Tag the line with the rate it was sampled at. Only lines that were
    /// actually sent with a rate below one carry the annotation.
    pub(crate) fn with_sample_rate(&mut self, rate: f64) {
        self.sample_rate = Some(rate);
    }

    pub(crate) fn format(&self) -> String {
        // prefix and key dominate the length; leave room for the value,
        // the type code, and a possible rate suffix.
        let size_hint = self.prefix.len() + self.key.len() + 24;
        let mut out = String::with_capacity(size_hint);
        let _ = write!(out, "{}{}:{}|{}", self.prefix, self.key, self.val, self.type_);
        if let Some(rate) = self.sample_rate {
            out.push_str("|@");
            out.push_str(&format_rate(rate));
        }
        out
    }
}

/// Render a sample rate with at most six fractional digits, trimming the
/// trailing zeros so common rates read as `0.5` rather than `0.500000`.
fn format_rate(rate: f64) -> String {
    let mut repr = format!("{:.6}", rate);
    while repr.len() > 3 && repr.ends_with('0') {
        repr.pop();
    }
    repr
}

#[cfg(test)]
mod tests {
    use super::{MetricFormatter, MetricType, MetricValue};

    #[test]
    fn test_format_counter() {
        let fmt = MetricFormatter::new("prefix.", "some.key", MetricValue::Signed(4), MetricType::Counter);
        assert_eq!("prefix.some.key:4|c", &fmt.format());
    }

    #[test]
    fn test_format_counter_negative_value() {
        let fmt = MetricFormatter::new("prefix.", "some.key", MetricValue::Signed(-2), MetricType::Counter);
        assert_eq!("prefix.some.key:-2|c", &fmt.format());
    }

    #[test]
    fn test_format_counter_empty_prefix() {
        let fmt = MetricFormatter::new("", "some.key", MetricValue::Signed(4), MetricType::Counter);
        assert_eq!("some.key:4|c", &fmt.format());
    }

    #[test]
    fn test_format_timer() {
        let fmt = MetricFormatter::new("prefix.", "some.method", MetricValue::Unsigned(21), MetricType::Timer);
        assert_eq!("prefix.some.method:21|ms", &fmt.format());
    }

    #[test]
    fn test_format_gauge() {
        let fmt = MetricFormatter::new("prefix.", "num.failures", MetricValue::Unsigned(7), MetricType::Gauge);
        assert_eq!("prefix.num.failures:7|g", &fmt.format());
    }

    #[test]
    fn test_format_counter_with_sample_rate() {
        let mut fmt = MetricFormatter::new("prefix.", "some.key", MetricValue::Signed(4), MetricType::Counter);
        fmt.with_sample_rate(0.5);

        assert_eq!("prefix.some.key:4|c|@0.5", &fmt.format());
    }

    #[test]
    fn test_format_sample_rate_trims_trailing_zeros() {
        let mut fmt = MetricFormatter::new("prefix.", "some.key", MetricValue::Signed(4), MetricType::Counter);
        fmt.with_sample_rate(0.25);

        assert_eq!("prefix.some.key:4|c|@0.25", &fmt.format());
    }

    #[test]
    fn test_format_sample_rate_keeps_significant_digits() {
        let mut fmt = MetricFormatter::new("prefix.", "some.key", MetricValue::Signed(4), MetricType::Counter);
        fmt.with_sample_rate(1.0 / 3.0);

        assert_eq!("prefix.some.key:4|c|@0.333333", &fmt.format());
    }
}
