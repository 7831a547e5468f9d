//! Rule doubles for downstream test suites.
//!
//! Exported as a regular module so hosts extending the engine can reuse the
//! same doubles the in-tree tests use.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use trellis_types::Result;

use crate::validator::{ExecuteMeta, Rule};

/// Never active.
pub struct AlwaysValid;

#[async_trait]
impl Rule for AlwaysValid {
    fn name(&self) -> &str {
        "AlwaysValid"
    }

    async fn execute(
        &self,
        _value: &serde_json::Value,
        _param: &serde_json::Value,
        _meta: &ExecuteMeta,
    ) -> Result<bool> {
        Ok(false)
    }
}

/// Always active.
pub struct AlwaysInvalid;

#[async_trait]
impl Rule for AlwaysInvalid {
    fn name(&self) -> &str {
        "AlwaysInvalid"
    }

    async fn execute(
        &self,
        _value: &serde_json::Value,
        _param: &serde_json::Value,
        _meta: &ExecuteMeta,
    ) -> Result<bool> {
        Ok(true)
    }
}

/// Never active; crosses one scheduling boundary.
pub struct AsyncAlwaysValid;

#[async_trait]
impl Rule for AsyncAlwaysValid {
    fn name(&self) -> &str {
        "AsyncAlwaysValid"
    }

    fn is_async(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        _value: &serde_json::Value,
        _param: &serde_json::Value,
        _meta: &ExecuteMeta,
    ) -> Result<bool> {
        tokio::task::yield_now().await;
        Ok(false)
    }
}

/// Always active; crosses one scheduling boundary.
pub struct AsyncAlwaysInvalid;

#[async_trait]
impl Rule for AsyncAlwaysInvalid {
    fn name(&self) -> &str {
        "AsyncAlwaysInvalid"
    }

    fn is_async(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        _value: &serde_json::Value,
        _param: &serde_json::Value,
        _meta: &ExecuteMeta,
    ) -> Result<bool> {
        tokio::task::yield_now().await;
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// GatedAsync — completion controlled by the test
// ---------------------------------------------------------------------------

/// Opens the gate of a [`GatedAsync`] rule and inspects its abort state.
#[derive(Clone)]
pub struct Gate {
    open: watch::Sender<bool>,
    aborted: Arc<AtomicBool>,
}

impl Gate {
    /// Release all pending and future executions.
    pub fn open(&self) {
        let _ = self.open.send(true);
    }

    /// Whether the engine advised this rule to abandon in-flight work.
    pub fn was_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

/// An async rule whose `execute` suspends until the test opens its gate,
/// then reports the configured active state.
pub struct GatedAsync {
    active: bool,
    open: watch::Receiver<bool>,
    aborted: Arc<AtomicBool>,
}

impl GatedAsync {
    /// A gated rule and the handle that releases it.
    pub fn new(active: bool) -> (Self, Gate) {
        let (tx, rx) = watch::channel(false);
        let aborted = Arc::new(AtomicBool::new(false));
        let gate = Gate {
            open: tx,
            aborted: aborted.clone(),
        };
        (
            Self {
                active,
                open: rx,
                aborted,
            },
            gate,
        )
    }
}

#[async_trait]
impl Rule for GatedAsync {
    fn name(&self) -> &str {
        "GatedAsync"
    }

    fn is_async(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        _value: &serde_json::Value,
        _param: &serde_json::Value,
        _meta: &ExecuteMeta,
    ) -> Result<bool> {
        let mut rx = self.open.clone();
        // Suspend until the test opens the gate; stay suspended forever if
        // the gate handle was dropped unopened.
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
        Ok(self.active)
    }

    fn abort_execution(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Counted — execute-call spy
// ---------------------------------------------------------------------------

/// Shared view on a [`Counted`] rule's call count.
#[derive(Clone)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Wraps a rule and counts `execute` invocations.
pub struct Counted<R> {
    inner: R,
    count: Arc<AtomicUsize>,
}

impl<R: Rule> Counted<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn counter(&self) -> CallCounter {
        CallCounter(self.count.clone())
    }
}

#[async_trait]
impl<R: Rule> Rule for Counted<R> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn is_async(&self) -> bool {
        self.inner.is_async()
    }

    fn runs_on_empty(&self) -> bool {
        self.inner.runs_on_empty()
    }

    fn default_type(&self) -> &str {
        self.inner.default_type()
    }

    async fn execute(
        &self,
        value: &serde_json::Value,
        param: &serde_json::Value,
        meta: &ExecuteMeta,
    ) -> Result<bool> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(value, param, meta).await
    }

    fn abort_execution(&self) {
        self.inner.abort_execution();
    }
}
