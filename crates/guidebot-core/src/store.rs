//! In-memory corpus store.
//!
//! Holds the loaded reports and the load-state machine
//! (`Unloaded → Loading → Loaded`). The store is written exactly once by a
//! successful load and is immutable afterwards: readers take an
//! [`Arc`] snapshot of the report list and rank without holding the lock.
//!
//! A failed load returns the store to `Unloaded` and keeps the failure
//! message for diagnostics; a partially populated store is never published.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use crate::error::RetrievalError;
use crate::models::{CorpusStats, LoadReport, LoadState, Report};

struct Inner {
    state: LoadState,
    reports: Arc<Vec<Report>>,
    dims: Option<usize>,
    model: Option<String>,
    report: LoadReport,
    loaded_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Process-wide report store, shared by the loader and the ranking engine.
pub struct CorpusStore {
    inner: RwLock<Inner>,
}

impl CorpusStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                state: LoadState::Unloaded,
                reports: Arc::new(Vec::new()),
                dims: None,
                model: None,
                report: LoadReport::default(),
                loaded_at: None,
                last_error: None,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> LoadState {
        self.read().state
    }

    pub fn is_loaded(&self) -> bool {
        self.state() == LoadState::Loaded
    }

    /// Move `Unloaded → Loading`.
    ///
    /// Returns `false` (and changes nothing) if a load is already running
    /// or the store is loaded.
    pub fn begin_loading(&self) -> bool {
        let mut inner = self.write();
        if inner.state != LoadState::Unloaded {
            return false;
        }
        inner.state = LoadState::Loading;
        true
    }

    /// Publish the result of a load and move to `Loaded`.
    ///
    /// Fails, reverting to `Unloaded`, if no report is embedded or if any
    /// embedded report disagrees with `dims`.
    pub fn publish(
        &self,
        reports: Vec<Report>,
        dims: usize,
        model: &str,
        report: LoadReport,
    ) -> Result<(), RetrievalError> {
        let embedded = reports.iter().filter(|r| r.is_embedded()).count();
        let check = if embedded == 0 {
            Err(RetrievalError::NoEmbeddingsGenerated {
                records: reports.len(),
            })
        } else if let Some(bad) = reports
            .iter()
            .find(|r| r.is_embedded() && r.embedding.len() != dims)
        {
            Err(RetrievalError::DimensionMismatch {
                expected: dims,
                actual: bad.embedding.len(),
            })
        } else {
            Ok(())
        };

        if let Err(e) = check {
            self.fail(&e.to_string());
            return Err(e);
        }

        let mut inner = self.write();
        inner.state = LoadState::Loaded;
        inner.reports = Arc::new(reports);
        inner.dims = Some(dims);
        inner.model = Some(model.to_string());
        inner.report = report;
        inner.loaded_at = Some(Utc::now());
        inner.last_error = None;
        Ok(())
    }

    /// Record a failed load and move back to `Unloaded`.
    ///
    /// Has no effect on a loaded store.
    pub fn fail(&self, message: &str) {
        let mut inner = self.write();
        if inner.state == LoadState::Loaded {
            return;
        }
        inner.state = LoadState::Unloaded;
        inner.last_error = Some(message.to_string());
    }

    /// Shared read-only view of the loaded reports.
    pub fn snapshot(&self) -> Result<Arc<Vec<Report>>, RetrievalError> {
        let inner = self.read();
        if inner.state != LoadState::Loaded {
            return Err(RetrievalError::NotLoaded);
        }
        Ok(Arc::clone(&inner.reports))
    }

    pub fn stats(&self) -> CorpusStats {
        let inner = self.read();
        let loaded = inner.state == LoadState::Loaded;
        CorpusStats {
            state: inner.state,
            reports: inner.reports.len(),
            embedded: inner.report.embedded,
            failed: inner.report.failed,
            lines: inner.report.lines,
            skipped: inner.report.skipped,
            dims: inner.dims,
            model: inner.model.clone(),
            loaded_at: inner
                .loaded_at
                .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            load_duration_ms: loaded.then_some(inner.report.duration_ms),
            last_error: inner.last_error.clone(),
        }
    }
}

impl Default for CorpusStore {
    fn default() -> Self {
        Self::new()
    }
}
