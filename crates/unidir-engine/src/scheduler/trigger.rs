//! Injected cron trigger capability.
//!
//! The scheduler registers callbacks against this seam rather than owning
//! timers itself, so its logic is testable without wall-clock waits: the
//! tokio backend drives real firings, the manual backend fires on demand.

use chrono::Utc;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use super::cron;

/// Callback invoked on each firing.
pub type TriggerCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Opaque handle to a registered trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TriggerHandle(Uuid);

impl TriggerHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Error raised when a trigger cannot be registered.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// The backend cannot evaluate the expression.
    #[error("unsupported cron expression: {0}")]
    Unsupported(String),
}

/// Cron trigger primitive.
///
/// `timezone` is carried for backends that honor it; the built-in tokio
/// backend evaluates in UTC.
pub trait TriggerBackend: Send + Sync {
    /// Register a recurring trigger. Exactly one trigger exists per
    /// handle; cancel it before registering a replacement.
    fn register(
        &self,
        cron_expression: &str,
        timezone: &str,
        callback: TriggerCallback,
    ) -> Result<TriggerHandle, TriggerError>;

    /// Cancel a registered trigger. Unknown handles are ignored.
    fn cancel(&self, handle: &TriggerHandle);
}

/// Production backend: one tokio task per trigger, sleeping until the next
/// occurrence.
///
/// Cancellation is cooperative; a firing already in progress completes,
/// then the task exits before its next sleep.
#[derive(Default)]
pub struct TokioTriggerBackend {
    stops: Mutex<HashMap<TriggerHandle, watch::Sender<bool>>>,
}

impl TokioTriggerBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TriggerBackend for TokioTriggerBackend {
    fn register(
        &self,
        cron_expression: &str,
        _timezone: &str,
        callback: TriggerCallback,
    ) -> Result<TriggerHandle, TriggerError> {
        let schedule = cron::parse(cron_expression).map_err(TriggerError::Unsupported)?;
        let handle = TriggerHandle::new();
        let (stop_tx, mut stop_rx) = watch::channel(false);

        tokio::spawn(async move {
            loop {
                if *stop_rx.borrow() {
                    break;
                }
                let now = Utc::now();
                let next = schedule.next_after(now);
                let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

                tokio::select! {
                    () = tokio::time::sleep(wait) => {
                        callback().await;
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Trigger task stopped");
        });

        self.stops
            .lock()
            .expect("trigger backend lock poisoned")
            .insert(handle, stop_tx);
        Ok(handle)
    }

    fn cancel(&self, handle: &TriggerHandle) {
        let sender = self
            .stops
            .lock()
            .expect("trigger backend lock poisoned")
            .remove(handle);
        if let Some(sender) = sender {
            if sender.send(true).is_err() {
                warn!("Trigger task already gone");
            }
        }
    }
}

struct ManualTrigger {
    cron_expression: String,
    callback: TriggerCallback,
}

/// Test backend: triggers fire only when told to.
#[derive(Default)]
pub struct ManualTriggerBackend {
    triggers: Mutex<HashMap<TriggerHandle, ManualTrigger>>,
}

impl ManualTriggerBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered triggers.
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.triggers
            .lock()
            .expect("manual backend lock poisoned")
            .len()
    }

    /// The cron expression a handle was registered with.
    #[must_use]
    pub fn expression_of(&self, handle: &TriggerHandle) -> Option<String> {
        self.triggers
            .lock()
            .expect("manual backend lock poisoned")
            .get(handle)
            .map(|t| t.cron_expression.clone())
    }

    /// Fire one trigger and await its callback.
    ///
    /// Returns `false` when the handle is not registered.
    pub async fn fire(&self, handle: &TriggerHandle) -> bool {
        let callback = {
            let triggers = self
                .triggers
                .lock()
                .expect("manual backend lock poisoned");
            triggers.get(handle).map(|t| t.callback.clone())
        };
        match callback {
            Some(callback) => {
                callback().await;
                true
            }
            None => false,
        }
    }

    /// Fire every registered trigger once.
    pub async fn fire_all(&self) {
        let callbacks: Vec<TriggerCallback> = {
            let triggers = self
                .triggers
                .lock()
                .expect("manual backend lock poisoned");
            triggers.values().map(|t| t.callback.clone()).collect()
        };
        for callback in callbacks {
            callback().await;
        }
    }
}

impl TriggerBackend for ManualTriggerBackend {
    fn register(
        &self,
        cron_expression: &str,
        _timezone: &str,
        callback: TriggerCallback,
    ) -> Result<TriggerHandle, TriggerError> {
        let handle = TriggerHandle::new();
        self.triggers
            .lock()
            .expect("manual backend lock poisoned")
            .insert(
                handle,
                ManualTrigger {
                    cron_expression: cron_expression.to_string(),
                    callback,
                },
            );
        Ok(handle)
    }

    fn cancel(&self, handle: &TriggerHandle) {
        self.triggers
            .lock()
            .expect("manual backend lock poisoned")
            .remove(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_callback() -> (TriggerCallback, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counted = count.clone();
        let callback: TriggerCallback = Arc::new(move || {
            let counted = counted.clone();
            Box::pin(async move {
                counted.fetch_add(1, Ordering::SeqCst);
            })
        });
        (callback, count)
    }

    #[tokio::test]
    async fn test_manual_backend_fires_on_demand() {
        let backend = ManualTriggerBackend::new();
        let (callback, count) = counting_callback();

        let handle = backend.register("0 2 * * *", "UTC", callback).unwrap();
        assert_eq!(backend.registered_count(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        assert!(backend.fire(&handle).await);
        assert!(backend.fire(&handle).await);
        assert_eq!(count.load(Ordering::SeqCst), 2);

        backend.cancel(&handle);
        assert!(!backend.fire(&handle).await);
        assert_eq!(backend.registered_count(), 0);
    }

    #[tokio::test]
    async fn test_tokio_backend_rejects_unsupported_expressions() {
        let backend = TokioTriggerBackend::new();
        let (callback, _count) = counting_callback();
        let result = backend.register("*/5 * * * *", "UTC", callback);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_tokio_backend_registers_and_cancels() {
        let backend = TokioTriggerBackend::new();
        let (callback, count) = counting_callback();

        let handle = backend.register("0 2 * * *", "UTC", callback).unwrap();
        backend.cancel(&handle);
        // Firing is at most daily; nothing should have run.
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
