use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::config::PassSettings;
use crate::error::ReconcileError;
use crate::reconcile::Reconciler;

/// Pass scheduler periodically runs a reconciliation pass in serve mode
pub struct PassScheduler {
    reconciler: Arc<Reconciler>,
    settings: PassSettings,
    interval_secs: u64,
    stop_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl PassScheduler {
    pub fn new(reconciler: Arc<Reconciler>, settings: PassSettings, interval_secs: u64) -> Self {
        Self {
            reconciler,
            settings,
            interval_secs,
            stop_tx: None,
        }
    }

    /// Start the scheduler; the first pass runs immediately
    pub fn start(&mut self) {
        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();
        self.stop_tx = Some(stop_tx);

        let reconciler = self.reconciler.clone();
        let settings = self.settings.clone();
        let interval_secs = self.interval_secs.max(1);

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(interval_secs));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match reconciler.run_pass(&settings).await {
                            Ok(_) => {}
                            Err(ReconcileError::PassInProgress) => {
                                tracing::info!("Scheduled pass skipped: a pass is already running");
                            }
                            // already logged and recorded by the reconciler
                            Err(_) => {}
                        }
                    }
                    _ = &mut stop_rx => {
                        tracing::info!("Pass scheduler stopped");
                        break;
                    }
                }
            }
        });
    }

    /// Stop the scheduler
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}
