//! Correlation records for outstanding requests.
//!
//! Each request sent over the connection gets one entry in the
//! transaction table and one [`PendingRequest`] returned to the caller.
//! The two sides are joined by oneshot channels, so every slot goes
//! from unresolved to resolved at most once.
//!
//! # Modes
//!
//! | Mode | Caller unblocks on | Entry removed on |
//! |------|--------------------|------------------|
//! | ack-only | `ack` | `ack` (or a final frame) |
//! | normal | final frame | final frame |
//!
//! A normal request may also see an early `ack`; it is exposed through
//! [`PendingRequest::acknowledged`] but never ends correlation.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Error, Result, RoutingAnomaly};
use crate::identifiers::TransactionId;
use crate::protocol::Frame;

use super::millis;

// ============================================================================
// Types
// ============================================================================

/// Map of transaction ids to resolver halves.
pub(crate) type CorrelationMap = FxHashMap<TransactionId, PendingEntry>;

/// Transaction table shared between senders and the dispatch loop.
pub(crate) type SharedCorrelation = Arc<Mutex<CorrelationMap>>;

// ============================================================================
// PendingEntry
// ============================================================================

/// Resolver half, owned by the transaction table.
pub(crate) enum PendingEntry {
    /// Caller waits for the acknowledgement only.
    AckOnly {
        ack: Option<oneshot::Sender<Result<()>>>,
    },
    /// Caller waits for the final frame.
    Final {
        ack: Option<oneshot::Sender<Result<()>>>,
        result: oneshot::Sender<Result<Value>>,
    },
}

impl PendingEntry {
    /// Applies an acknowledgement.
    ///
    /// Returns `true` when correlation is finished and the entry must be
    /// removed from the table.
    fn acknowledge(&mut self) -> bool {
        match self {
            Self::AckOnly { ack } => {
                if let Some(tx) = ack.take() {
                    let _ = tx.send(Ok(()));
                }
                true
            }
            Self::Final { ack, .. } => {
                if let Some(tx) = ack.take() {
                    let _ = tx.send(Ok(()));
                }
                false
            }
        }
    }

    /// Applies a final frame. Always ends correlation.
    fn complete(self, frame: Frame) {
        match self {
            Self::AckOnly { ack } => {
                debug!(kind = frame.kind(), "Final frame for ack-only transaction");
                if let Some(tx) = ack {
                    let outcome = if frame.is_success() {
                        Ok(())
                    } else {
                        Err(Error::unexpected_response(frame.into_raw()))
                    };
                    let _ = tx.send(outcome);
                }
            }
            Self::Final { ack, result } => {
                if let Some(tx) = ack {
                    let _ = tx.send(Ok(()));
                }
                let _ = result.send(Ok(frame.into_raw()));
            }
        }
    }

    /// Fails the caller with a connection-level error.
    pub(crate) fn fail(self, error: Error) {
        match self {
            Self::AckOnly { ack } => {
                if let Some(tx) = ack {
                    let _ = tx.send(Err(error));
                }
            }
            Self::Final { result, .. } => {
                let _ = result.send(Err(error));
            }
        }
    }
}

/// Resolves a frame carrying a `transaction` field against the table.
///
/// # Errors
///
/// Returns [`RoutingAnomaly::UnknownTransaction`] when no entry exists;
/// nothing is resolved in that case.
pub(crate) fn resolve(
    correlation: &Mutex<CorrelationMap>,
    transaction: &TransactionId,
    frame: Frame,
) -> std::result::Result<(), RoutingAnomaly> {
    let unknown = || RoutingAnomaly::UnknownTransaction {
        transaction: transaction.clone(),
    };

    if frame.is_ack() {
        let mut table = correlation.lock();
        let finished = table.get_mut(transaction).ok_or_else(unknown)?.acknowledge();
        if finished {
            table.remove(transaction);
        }
        return Ok(());
    }

    let entry = correlation.lock().remove(transaction).ok_or_else(unknown)?;
    entry.complete(frame);
    Ok(())
}

// ============================================================================
// PendingRequest
// ============================================================================

/// State of the caller's acknowledgement slot.
enum AckSlot {
    Waiting(oneshot::Receiver<Result<()>>),
    Received,
    Failed,
}

/// Caller half of the correlation record.
enum Slots {
    AckOnly {
        ack: AckSlot,
    },
    Final {
        ack: AckSlot,
        result: oneshot::Receiver<Result<Value>>,
    },
}

/// An outstanding request.
///
/// Returned by every `send`. Await [`response`](Self::response) for a
/// normal request or [`acknowledged`](Self::acknowledged) for an
/// ack-only one; [`wait`](Self::wait) picks the right slot by mode.
///
/// Every wait is bounded by the timeout given at send time. A timeout
/// that ends the request also removes its table entry, so a reply that
/// arrives later is dropped as a routing anomaly.
pub struct PendingRequest {
    transaction: TransactionId,
    timeout: Duration,
    slots: Slots,
    correlation: Weak<Mutex<CorrelationMap>>,
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("transaction", &self.transaction)
            .field("ack_only", &self.is_ack_only())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl PendingRequest {
    /// Registers a new record in `correlation` and returns the caller half.
    pub(crate) fn register(
        correlation: &SharedCorrelation,
        transaction: TransactionId,
        ack_only: bool,
        timeout: Duration,
    ) -> Self {
        let (entry, slots) = if ack_only {
            let (ack_tx, ack_rx) = oneshot::channel();
            (
                PendingEntry::AckOnly { ack: Some(ack_tx) },
                Slots::AckOnly {
                    ack: AckSlot::Waiting(ack_rx),
                },
            )
        } else {
            let (ack_tx, ack_rx) = oneshot::channel();
            let (result_tx, result_rx) = oneshot::channel();
            (
                PendingEntry::Final {
                    ack: Some(ack_tx),
                    result: result_tx,
                },
                Slots::Final {
                    ack: AckSlot::Waiting(ack_rx),
                    result: result_rx,
                },
            )
        };

        correlation.lock().insert(transaction.clone(), entry);

        Self {
            transaction,
            timeout,
            slots,
            correlation: Arc::downgrade(correlation),
        }
    }

    /// Returns the correlation key.
    #[inline]
    #[must_use]
    pub fn transaction(&self) -> &TransactionId {
        &self.transaction
    }

    /// Returns `true` if the caller only waits for an acknowledgement.
    #[inline]
    #[must_use]
    pub fn is_ack_only(&self) -> bool {
        matches!(self.slots, Slots::AckOnly { .. })
    }

    /// Returns the timeout applied to each wait.
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Waits until the gateway acknowledged the request.
    ///
    /// For an ack-only request this is the completion. For a normal
    /// request the final frame also counts as acknowledgement, and
    /// calling this again after it resolved returns immediately.
    ///
    /// # Errors
    ///
    /// - [`Error::RequestTimeout`] if nothing arrived in time
    /// - [`Error::Protocol`] if an ack-only request got an error frame
    /// - [`Error::Connection`] / [`Error::ConnectionClosed`] if the
    ///   connection failed first
    pub async fn acknowledged(&mut self) -> Result<()> {
        let wait = self.timeout;
        let ack_only = self.is_ack_only();
        let (Slots::AckOnly { ack } | Slots::Final { ack, .. }) = &mut self.slots;

        let rx = match &mut *ack {
            AckSlot::Waiting(rx) => rx,
            AckSlot::Received => return Ok(()),
            AckSlot::Failed => {
                return Err(Error::invalid_argument(format!(
                    "acknowledgement of {} already failed",
                    self.transaction
                )));
            }
        };

        let outcome = match timeout(wait, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) if ack_only => {
                return Err(expire(&self.correlation, &self.transaction, wait));
            }
            // The final frame may still come; keep the entry.
            Err(_) => {
                return Err(Error::request_timeout(
                    self.transaction.clone(),
                    millis(wait),
                ));
            }
        };

        *ack = if outcome.is_ok() {
            AckSlot::Received
        } else {
            AckSlot::Failed
        };
        outcome
    }

    /// Waits for the final frame and returns it verbatim.
    ///
    /// Error-shaped frames are returned as `Ok`; interpreting `janus`
    /// is up to the caller.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] for an ack-only request
    /// - [`Error::RequestTimeout`] if the frame did not arrive in time
    /// - [`Error::Connection`] / [`Error::ConnectionClosed`] if the
    ///   connection failed first
    pub async fn response(self) -> Result<Value> {
        let wait = self.timeout;
        let result = match self.slots {
            Slots::Final { result, .. } => result,
            Slots::AckOnly { .. } => {
                return Err(Error::invalid_argument(format!(
                    "transaction {} is ack-only and has no response",
                    self.transaction
                )));
            }
        };

        match timeout(wait, result).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => Err(expire(&self.correlation, &self.transaction, wait)),
        }
    }

    /// Waits for whichever slot this request's mode designates.
    ///
    /// Returns `None` for ack-only requests and the final frame otherwise.
    ///
    /// # Errors
    ///
    /// See [`acknowledged`](Self::acknowledged) and
    /// [`response`](Self::response).
    pub async fn wait(mut self) -> Result<Option<Value>> {
        if self.is_ack_only() {
            self.acknowledged().await?;
            Ok(None)
        } else {
            self.response().await.map(Some)
        }
    }

    /// Stops waiting without abandoning the table entry.
    ///
    /// The entry stays until the gateway answers, so a late ack is not an
    /// anomaly, but no longer than the request timeout.
    pub(crate) fn detach(self) {
        let Self {
            transaction,
            timeout,
            correlation,
            ..
        } = self;

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(table) = correlation.upgrade()
                && table.lock().remove(&transaction).is_some()
            {
                debug!(%transaction, "Removed unanswered detached transaction");
            }
        });
    }
}

/// Drops the table entry after a terminal timeout.
fn expire(
    correlation: &Weak<Mutex<CorrelationMap>>,
    transaction: &TransactionId,
    wait: Duration,
) -> Error {
    if let Some(table) = correlation.upgrade()
        && table.lock().remove(transaction).is_some()
    {
        debug!(%transaction, "Removed timed-out transaction");
    }
    Error::request_timeout(transaction.clone(), millis(wait))
}

// ============================================================================
// Tests
// ============================================================================
