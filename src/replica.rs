// Downbeat - A Statsd client for Rust
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

/// Fan-out helper that re-scopes metric keys under a tenant segment.
///
/// In multi-tenant deployments every metric is emitted twice: once under its
/// plain key for the aggregate view and once under `key.<tenant>` for the
/// per-tenant rollup. Both land in the same namespace hierarchy so a single
/// client instance serves both views.
#[derive(Debug)]
pub(crate) struct TenantReplicator {
    segment: String,
}

impl TenantReplicator {
    pub(crate) fn new(tenant: &str) -> TenantReplicator {
        TenantReplicator {
            segment: sanitize(tenant),
        }
    }

    pub(crate) fn scoped_key(&self, key: &str) -> String {
        let mut scoped = String::with_capacity(key.len() + 1 + self.segment.len());
        scoped.push_str(key);
        scoped.push('.');
        scoped.push_str(&self.segment);
        scoped
    }

    pub(crate) fn segment(&self) -> &str {
        &self.segment
    }
}

/// Graphite treats dots as path separators, so a tenant identifier (often a
/// hostname) must collapse into a single path segment: everything outside
/// `[A-Za-z0-9-]` becomes an underscore.
fn sanitize(tenant: &str) -> String {
    tenant
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
