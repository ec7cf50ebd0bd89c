// src/api/mod.rs
pub mod chains;
pub mod deposits;
pub mod health;

use crate::config::Config;
use crate::db::Database;
use crate::services::DepositReconciler;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub reconciler: Arc<DepositReconciler>,
    pub config: Config,
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::AppState;
    use crate::config::test_config;
    use crate::db::Database;
    use crate::services::{DepositReconciler, ReconcilerOptions};
    use crate::testing::{self, MemoryStore, ScriptedSource};
    use std::sync::Arc;

    pub struct TestApp {
        pub state: AppState,
        pub store: Arc<MemoryStore>,
        pub source: Arc<ScriptedSource>,
    }

    pub fn app(chain_ids: &[&str]) -> TestApp {
        let config = test_config();
        let store = Arc::new(MemoryStore::new());
        let source = Arc::new(ScriptedSource::new(100));
        let reconciler = Arc::new(DepositReconciler::new(
            Arc::new(testing::registry(chain_ids)),
            source.clone(),
            store.clone(),
            store.clone(),
            ReconcilerOptions::default(),
        ));

        TestApp {
            state: AppState {
                db: Database::new_lazy(&config).unwrap(),
                reconciler,
                config,
            },
            store,
            source,
        }
    }
}
