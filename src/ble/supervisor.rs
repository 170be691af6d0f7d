use std::sync::Arc;

use tokio::task::LocalSet;
use tracing::info;

use crate::ble::janitor::Janitor;
use crate::ble::transport::BleTransport;
use crate::ble::worker::ConnectionWorker;
use crate::state::Hub;

/// Runs *M* identical connection workers plus the janitor on a single
/// cooperative task runtime (spec §4.3, §5 Scheduling model).
///
/// btleplug's underlying platform bindings are not safely reentrant
/// across OS threads, so every worker and the janitor are `spawn_local`
/// tasks on one `LocalSet`, driven from a single dedicated OS thread —
/// concurrency without parallelism.
pub struct BleSupervisor<T> {
    hub: Arc<Hub>,
    transport: Arc<T>,
    worker_count: usize,
}

impl<T: BleTransport + 'static> BleSupervisor<T> {
    #[must_use]
    pub fn new(hub: Arc<Hub>, transport: Arc<T>, worker_count: usize) -> Self {
        Self {
            hub,
            transport,
            worker_count,
        }
    }

    /// Blocks the calling OS thread running the cooperative executor
    /// until cancelled externally (process exit; spec §5 Cancellation:
    /// "no graceful shutdown in the original design").
    pub async fn run(self) {
        let local_set = LocalSet::new();

        local_set
            .run_until(async move {
                for id in 0..self.worker_count {
                    let mut worker =
                        ConnectionWorker::new(id, self.hub.clone(), self.transport.clone());
                    tokio::task::spawn_local(async move {
                        loop {
                            worker.step().await;
                        }
                    });
                }

                let janitor = Janitor::new(self.hub.clone());
                tokio::task::spawn_local(async move {
                    janitor.run_forever().await;
                });

                info!(workers = self.worker_count, "ble supervisor started");
                std::future::pending::<()>().await;
            })
            .await;
    }
}
