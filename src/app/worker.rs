//! Background reaper for stale OTP challenges and idle rate-limit windows.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::service::AuthService;

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub enabled: bool,
    /// Time between purge passes
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(60),
        }
    }
}

/// Periodically purges consumed and expired challenges
pub struct ChallengeReaper {
    service: Arc<AuthService>,
    config: WorkerConfig,
    shutdown_rx: watch::Receiver<bool>,
}

impl ChallengeReaper {
    #[must_use]
    pub fn new(
        service: Arc<AuthService>,
        config: WorkerConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            service,
            config,
            shutdown_rx,
        }
    }

    /// Run until the shutdown signal flips to `true`
    pub async fn run(mut self) {
        if !self.config.enabled {
            info!("Challenge reaper disabled");
            return;
        }

        info!(
            interval_secs = self.config.poll_interval.as_secs(),
            "Challenge reaper started"
        );
        let mut interval = tokio::time::interval(self.config.poll_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.service.purge_expired().await {
                        error!(error = %e, "Challenge purge failed");
                    }
                }
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("Challenge reaper shutting down");
                        break;
                    }
                }
            }
        }
    }
}

/// Spawn the reaper, returning its handle and the shutdown sender
pub fn spawn_worker(
    service: Arc<AuthService>,
    config: WorkerConfig,
) -> (JoinHandle<()>, watch::Sender<bool>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper = ChallengeReaper::new(service, config, shutdown_rx);
    let handle = tokio::spawn(reaper.run());
    (handle, shutdown_tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::OtpPolicy;
    use crate::domain::RequestOtpRequest;
    use crate::test_utils::{MockClock, MockDatabaseClient, MockSmsGateway};
    use chrono::Utc;

    fn service(db: &Arc<MockDatabaseClient>, clock: &Arc<MockClock>) -> Arc<AuthService> {
        Arc::new(
            AuthService::new(
                Arc::clone(db) as _,
                Arc::clone(db) as _,
                Arc::new(MockSmsGateway::new()) as _,
                OtpPolicy::default(),
            )
            .with_clock(Arc::clone(clock) as _),
        )
    }

    #[tokio::test]
    async fn test_reaper_purges_and_stops_on_signal() {
        let db = Arc::new(MockDatabaseClient::new());
        let clock = Arc::new(MockClock::new(Utc::now()));
        let service = service(&db, &clock);

        service
            .request_otp(&RequestOtpRequest::new("+1", "5550100"))
            .await
            .unwrap();
        clock.advance(chrono::Duration::minutes(10));

        let config = WorkerConfig {
            enabled: true,
            poll_interval: Duration::from_millis(10),
        };
        let (handle, tx) = spawn_worker(Arc::clone(&service), config);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(db.challenge_count(), 0);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("reaper did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_disabled_reaper_exits_immediately() {
        let db = Arc::new(MockDatabaseClient::new());
        let clock = Arc::new(MockClock::new(Utc::now()));
        let config = WorkerConfig {
            enabled: false,
            ..Default::default()
        };

        let (handle, _tx) = spawn_worker(service(&db, &clock), config);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("disabled reaper kept running")
            .unwrap();
    }
}
