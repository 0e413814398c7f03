//! Bounded retry wrapper for log providers.

use std::thread;
use std::time::Duration;

use tracing::debug;

use super::{LogProvider, PathInfo, ProviderError, ProviderResult, RawRevision};

/// Wraps a [`LogProvider`] so every call is retried with identical
/// parameters up to `max_attempts` times on transient failure. Exhausting
/// the budget surfaces a single terminal error; terminal failures pass
/// through on the first occurrence.
pub struct Retrying<P> {
    inner: P,
    max_attempts: u32,
    delay: Duration,
}

impl<P: LogProvider> Retrying<P> {
    pub fn new(inner: P, max_attempts: u32) -> Self {
        Self { inner, max_attempts: max_attempts.max(1), delay: Duration::from_millis(100) }
    }

    /// Override the pause between attempts (tests use zero).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn into_inner(self) -> P {
        self.inner
    }

    fn run<T>(&self, what: &str, mut op: impl FnMut() -> ProviderResult<T>) -> ProviderResult<T> {
        let mut last_err = None;
        for attempt in 1..=self.max_attempts {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    debug!(what, attempt, max = self.max_attempts, %err, "transient provider failure");
                    last_err = Some(err);
                    if attempt < self.max_attempts && !self.delay.is_zero() {
                        thread::sleep(self.delay);
                    }
                }
                Err(err) => return Err(err),
            }
        }
        let err = last_err.expect("at least one attempt was made");
        Err(ProviderError::Terminal(format!(
            "{} failed after {} attempts: {}",
            what, self.max_attempts, err
        )))
    }
}

impl<P: LogProvider> LogProvider for Retrying<P> {
    fn head_revision(&self) -> ProviderResult<i64> {
        self.run("head_revision", || self.inner.head_revision())
    }

    fn log_range(&self, start: i64, end: i64, detailed: bool) -> ProviderResult<Vec<RawRevision>> {
        self.run("log_range", || self.inner.log_range(start, end, detailed))
    }

    fn diff(&self, path: &str, rev1: i64, rev2: i64) -> ProviderResult<String> {
        self.run("diff", || self.inner.diff(path, rev1, rev2))
    }

    fn path_info(&self, path: &str, revno: i64) -> ProviderResult<PathInfo> {
        self.run("path_info", || self.inner.path_info(path, revno))
    }

    fn read_full_content(&self, path: &str, revno: i64) -> ProviderResult<Vec<u8>> {
        self.run("read_full_content", || self.inner.read_full_content(path, revno))
    }

    fn content_type_property(&self, path: &str, revno: i64) -> ProviderResult<Option<String>> {
        self.run("content_type_property", || self.inner.content_type_property(path, revno))
    }
}
