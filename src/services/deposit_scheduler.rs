use super::deposit_reconciler::{DepositReconciler, ReconcileReport};
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Periodic trigger for `reconcile_all`
pub struct DepositScheduler {
    reconciler: Arc<DepositReconciler>,
    period: Duration,
}

impl DepositScheduler {
    pub fn new(reconciler: Arc<DepositReconciler>, period: Duration) -> Self {
        Self { reconciler, period }
    }

    /// Start the reconciliation loop
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                "Deposit scheduler running every {}s for {} chain(s)",
                self.period.as_secs(),
                self.reconciler.registry().len()
            );

            let mut ticker = interval(self.period);
            // A slow run must not be followed by a burst of catch-up runs.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }

    /// One scheduled pass; failures are only logged.
    pub async fn tick(&self) -> ReconcileReport {
        tracing::info!("Starting scheduled ERC20 deposit check");
        let report = self.reconciler.reconcile_all().await;

        if report.errors.is_empty() {
            tracing::info!("ERC20 deposit check completed: {:?}", report.results);
        } else {
            tracing::warn!(
                "ERC20 deposit check completed with {} failed chain(s): {:?}",
                report.errors.len(),
                report.errors
            );
        }
        report
    }
}
