//! Compensating actions for multi-step writes.
//!
//! A [`Saga`] records every step that has committed together with the
//! action that undoes it. When a later step fails, [`Saga::compensate`] runs
//! the undo actions in reverse order. Compensation is best-effort: a failing
//! undo is logged and the remaining undos still run.
//!
//! ```rust,ignore
//! let mut saga = Saga::new("upload");
//! store.upload(&path, data, mime).await?;
//! saga.record("storage_write", move || -> BoxFuture<'static, Result<()>> {
//!     Box::pin(async move { remove(path).await })
//! });
//!
//! if let Err(e) = table.insert(&record).await {
//!     saga.compensate().await;
//!     return Err(e.into());
//! }
//! saga.commit();
//! ```

use futures::future::BoxFuture;
use tracing::{info, warn};

use crate::error::Result;

type Compensation = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

struct Step {
    name: &'static str,
    undo: Compensation,
}

/// Ordered list of committed steps and their inverse actions
pub struct Saga {
    operation: &'static str,
    steps: Vec<Step>,
}

/// What happened while compensating
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CompensationReport {
    /// Steps undone successfully, in the order they were undone
    pub undone: Vec<&'static str>,
    /// Steps whose undo failed
    pub failed: Vec<&'static str>,
}

impl CompensationReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl Saga {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            steps: Vec::new(),
        }
    }

    /// Record a committed step and how to undo it
    pub fn record<F>(&mut self, name: &'static str, undo: F)
    where
        F: FnOnce() -> BoxFuture<'static, Result<()>> + Send + 'static,
    {
        self.steps.push(Step {
            name,
            undo: Box::new(undo),
        });
    }

    /// Number of committed steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// All steps succeeded; drop the undo actions
    pub fn commit(self) {
        drop(self.steps);
    }

    /// Undo committed steps in reverse order
    pub async fn compensate(self) -> CompensationReport {
        let mut report = CompensationReport::default();

        for step in self.steps.into_iter().rev() {
            match (step.undo)().await {
                Ok(()) => {
                    info!(operation = self.operation, step = step.name, "Compensated step");
                    report.undone.push(step.name);
                }
                Err(e) => {
                    warn!(
                        operation = self.operation,
                        step = step.name,
                        error = %e,
                        "Compensation failed"
                    );
                    report.failed.push(step.name);
                }
            }
        }

        report
    }
}

impl std::fmt::Debug for Saga {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Saga")
            .field("operation", &self.operation)
            .field(
                "steps",
                &self.steps.iter().map(|s| s.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}
