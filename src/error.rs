//! Error taxonomy for reconciliation passes.
//!
//! [`MalformedRecordError`] is recovered locally: the record is skipped and
//! counted. Every [`ReconcileError`] variant aborts the pass.

/// Phase of a pass an abort is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lock,
    Fetch,
    Resolve,
    Store,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Lock => "lock",
            Phase::Fetch => "fetch",
            Phase::Resolve => "resolve",
            Phase::Store => "store",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single upstream record failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed {kind} record: {reason}")]
pub struct MalformedRecordError {
    pub kind: &'static str,
    pub reason: String,
}

impl MalformedRecordError {
    pub fn lease(reason: impl Into<String>) -> Self {
        Self {
            kind: "lease",
            reason: reason.into(),
        }
    }

    pub fn dns(reason: impl Into<String>) -> Self {
        Self {
            kind: "dns",
            reason: reason.into(),
        }
    }
}

/// Terminal errors of a reconciliation pass.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Another pass is already running in this process.
    #[error("a reconciliation pass is already running")]
    PassInProgress,

    /// A DHCP scope or DNS zone could not be fetched.
    ///
    /// A partial fetch is indistinguishable from clients leaving the network,
    /// so storage is never touched after one.
    #[error("{origin} source unavailable for {target}: {reason}")]
    UpstreamUnavailable {
        origin: &'static str,
        target: String,
        reason: String,
    },

    /// Identity resolution produced no client records.
    #[error("resolution produced no client records; refusing to retire the inventory")]
    EmptyResolution,

    /// Another process holds the inventory write lock.
    #[error("another process holds the reconcile lock: {0:#}")]
    LockHeld(anyhow::Error),

    /// Beginning, reading, applying or committing the pass transaction failed.
    /// The transaction is rolled back.
    #[error("storage transaction failed: {0:#}")]
    StorageTransaction(anyhow::Error),
}

impl ReconcileError {
    pub fn phase(&self) -> Phase {
        match self {
            ReconcileError::PassInProgress | ReconcileError::LockHeld(_) => Phase::Lock,
            ReconcileError::UpstreamUnavailable { .. } => Phase::Fetch,
            ReconcileError::EmptyResolution => Phase::Resolve,
            ReconcileError::StorageTransaction(_) => Phase::Store,
        }
    }

    pub(crate) fn dhcp(scope: &str, err: anyhow::Error) -> Self {
        ReconcileError::UpstreamUnavailable {
            origin: "dhcp",
            target: scope.to_string(),
            reason: format!("{:#}", err),
        }
    }

    /// Classify a failure to open the pass transaction
    pub(crate) fn begin(err: anyhow::Error) -> Self {
        if crate::db::is_lock_contention(&err) {
            ReconcileError::LockHeld(err)
        } else {
            ReconcileError::StorageTransaction(err)
        }
    }

    pub(crate) fn dns(zone: &str, err: anyhow::Error) -> Self {
        ReconcileError::UpstreamUnavailable {
            origin: "dns",
            target: zone.to_string(),
            reason: format!("{:#}", err),
        }
    }
}
