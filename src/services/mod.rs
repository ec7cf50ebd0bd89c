pub mod deposit_reconciler;
pub mod deposit_scheduler;

pub use deposit_reconciler::{DepositReconciler, ReconcileSummary, ReconcilerOptions};
pub use deposit_scheduler::DepositScheduler;

use crate::config::Config;
use std::sync::Arc;
use tokio::time::Duration;

/// Start all background services
pub async fn start_background_services(reconciler: Arc<DepositReconciler>, config: Config) {
    tracing::info!("Starting background services...");

    if config.enable_deposit_scheduler {
        let scheduler = Arc::new(DepositScheduler::new(
            reconciler,
            Duration::from_secs(config.reconcile_interval_secs),
        ));
        scheduler.start();
    } else {
        tracing::warn!("Deposit scheduler disabled via ENABLE_DEPOSIT_SCHEDULER");
    }

    tracing::info!("All background services started successfully");
}
