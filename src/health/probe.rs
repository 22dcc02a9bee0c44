use crate::health::snapshot::HealthWriter;
use crate::replica::{ReplicaError, ReplicaHandle, ServingStatus};
use crate::stop_signal;
use tokio::time;
use tokio::time::error::Elapsed;
use tokio::time::Duration;

/// HealthProbe periodically checks every distinct replica address and is the only writer of the
/// health table. Request handling never waits on it.
pub(crate) struct HealthProbe {
    logger: slog::Logger,
    replicas: Vec<ReplicaHandle>,
    probe_interval: Duration,
    writer: HealthWriter,
}

/// Dropping the handle stops the probe loop at its next tick.
pub(crate) struct HealthProbeHandle {
    _stopper: stop_signal::Stopper,
}

impl HealthProbe {
    pub(crate) fn new(
        logger: slog::Logger,
        replicas: Vec<ReplicaHandle>,
        probe_interval: Duration,
        writer: HealthWriter,
    ) -> Self {
        let mut distinct: Vec<ReplicaHandle> = Vec::with_capacity(replicas.len());
        for replica in replicas {
            if !distinct.iter().any(|r| r.address() == replica.address()) {
                distinct.push(replica);
            }
        }

        HealthProbe {
            logger: logger.new(slog::o!("Component" => "HealthProbe")),
            replicas: distinct,
            probe_interval,
            writer,
        }
    }

    pub(crate) fn spawn_probe_task(self) -> HealthProbeHandle {
        let (stopper, stop_check) = stop_signal::new();
        tokio::task::spawn(self.run(stop_check));

        HealthProbeHandle { _stopper: stopper }
    }

    async fn run(self, stop_check: stop_signal::StopCheck) {
        slog::info!(
            self.logger,
            "Probing {} replicas every {}ms",
            self.replicas.len(),
            self.probe_interval.as_millis()
        );

        // First tick completes immediately, so the table is populated right after startup.
        let mut interval = time::interval(self.probe_interval);
        loop {
            interval.tick().await;
            if stop_check.should_stop() {
                break;
            }
            self.probe_all().await;
        }

        slog::info!(self.logger, "Health probe stopped");
    }

    /// One probe cycle. Probes run concurrently and each is cut off after one probe interval,
    /// so a stuck replica can't push back the next cycle.
    pub(crate) async fn probe_all(&self) {
        let mut probes = Vec::with_capacity(self.replicas.len());
        for replica in self.replicas.iter().cloned() {
            let probe_timeout = self.probe_interval;
            probes.push(tokio::task::spawn(async move {
                let result = time::timeout(probe_timeout, replica.health_check()).await;
                (replica, result)
            }));
        }

        for probe in probes {
            match probe.await {
                Ok((replica, result)) => self.record(&replica, result),
                Err(join_error) => slog::error!(self.logger, "Health probe task failed: {:?}", join_error),
            }
        }
    }

    fn record(&self, replica: &ReplicaHandle, result: Result<Result<ServingStatus, ReplicaError>, Elapsed>) {
        let (status, failure) = match result {
            Ok(Ok(status)) => (status, None),
            Ok(Err(e)) => (ServingStatus::NotServing, Some(e.to_string())),
            Err(_elapsed) => (ServingStatus::NotServing, Some("health check timed out".to_string())),
        };

        let previous = match self.writer.record(replica.address(), status) {
            Some(previous) => previous,
            None => return,
        };

        match failure {
            Some(message) => slog::warn!(
                self.logger,
                "Health check failed for {}: {}. {} -> {}",
                replica.address(),
                message,
                previous,
                status
            ),
            None => slog::info!(
                self.logger,
                "Health status changed for {}: {} -> {}",
                replica.address(),
                previous,
                status
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::snapshot::health_table;
    use crate::replica::test_utils::{test_logger, HealthScript, Script, ScriptedReplica};

    #[tokio::test]
    async fn probe_records_reported_status_and_failures() {
        // -- setup --
        let serving = ScriptedReplica::new("serving:1", Script::Succeed);
        let draining = ScriptedReplica::new("draining:1", Script::Succeed);
        draining.set_health(HealthScript::Report(ServingStatus::NotServing));
        let broken = ScriptedReplica::new("broken:1", Script::Succeed);
        broken.set_health(HealthScript::Fail);

        let (writer, view) = health_table(vec!["serving:1", "draining:1", "broken:1"]);
        let probe = HealthProbe::new(
            test_logger(),
            vec![serving.handle(), draining.handle(), broken.handle()],
            Duration::from_millis(100),
            writer,
        );

        // -- execute --
        probe.probe_all().await;

        // -- verify --
        let snapshot = view.snapshot();
        assert_eq!(snapshot.status("serving:1"), ServingStatus::Serving);
        assert_eq!(snapshot.status("draining:1"), ServingStatus::NotServing);
        assert_eq!(snapshot.status("broken:1"), ServingStatus::NotServing);
    }

    #[tokio::test]
    async fn stuck_probe_is_bounded_by_interval() {
        let stuck = ScriptedReplica::new("stuck:1", Script::Succeed);
        stuck.set_health(HealthScript::Hang);

        let (writer, view) = health_table(vec!["stuck:1"]);
        let probe = HealthProbe::new(test_logger(), vec![stuck.handle()], Duration::from_millis(50), writer);

        tokio::time::timeout(Duration::from_secs(5), probe.probe_all())
            .await
            .expect("probe cycle should not wait on a stuck replica");

        assert_eq!(view.snapshot().status("stuck:1"), ServingStatus::NotServing);
    }

    #[tokio::test]
    async fn duplicate_addresses_are_probed_once() {
        let shared = ScriptedReplica::new("shared:1", Script::Succeed);

        let (writer, _view) = health_table(vec!["shared:1"]);
        let probe = HealthProbe::new(
            test_logger(),
            vec![shared.handle(), shared.handle()],
            Duration::from_millis(100),
            writer,
        );
        probe.probe_all().await;

        assert_eq!(shared.health_calls(), 1);
    }

    #[tokio::test]
    async fn background_task_tracks_recovery_and_stops_on_drop() {
        // -- setup --
        let replica = ScriptedReplica::new("flaky:1", Script::Succeed);
        replica.set_health(HealthScript::Fail);

        let (writer, view) = health_table(vec!["flaky:1"]);
        let handle = HealthProbe::new(test_logger(), vec![replica.handle()], Duration::from_millis(20), writer)
            .spawn_probe_task();

        // -- execute & verify --
        wait_for_status(&view, "flaky:1", ServingStatus::NotServing).await;

        replica.set_health(HealthScript::Report(ServingStatus::Serving));
        wait_for_status(&view, "flaky:1", ServingStatus::Serving).await;

        drop(handle);
        tokio::time::sleep(Duration::from_millis(60)).await;
        let calls_after_stop = replica.health_calls();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(replica.health_calls(), calls_after_stop);
    }

    async fn wait_for_status(view: &crate::health::HealthView, address: &str, expected: ServingStatus) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while view.snapshot().status(address) != expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Timed out waiting for health transition");
    }
}
