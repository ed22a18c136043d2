//! Control loop

use roomwatch_sensors::Monitor;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

/// Drive `monitor` every `tick` until `shutdown` completes.
///
/// Monotonic time handed to the monitor is measured from `boot`, the same
/// origin the monitor's schedule was anchored to. Every message on `reload`
/// re-applies the stored calibration to the running monitor. Returns the
/// number of updates published.
pub async fn run<F>(
    monitor: &mut Monitor,
    boot: Instant,
    tick: Duration,
    mut reload: mpsc::Receiver<()>,
    shutdown: F,
) -> u64
where
    F: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received");
                break;
            }
            Some(()) = reload.recv() => {
                match monitor.reload_config() {
                    Ok(changed) if changed.is_empty() => tracing::info!("Calibration reloaded, no changes"),
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Failed to reload calibration: {}", e),
                }
            }
            _ = interval.tick() => {
                monitor.tick(boot.elapsed());
            }
        }
    }

    monitor.update_count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::hardware::SimulatedHardware;
    use crate::node::build_monitor;
    use roomwatch_sensors::{CalibrationConfig, ConfigStore, MemoryConfigStore, MemoryPublisher};

    fn monitor_with_store(publisher: &MemoryPublisher, store: &MemoryConfigStore) -> Monitor {
        let mut monitor = build_monitor(
            &NodeConfig::default(),
            &mut SimulatedHardware::quiet(),
            Duration::ZERO,
            Box::new(publisher.clone()),
            Box::new(store.clone()),
            None,
        )
        .unwrap();
        monitor.start(Duration::ZERO);
        monitor
    }

    fn monitor(publisher: &MemoryPublisher) -> Monitor {
        monitor_with_store(publisher, &MemoryConfigStore::new())
    }

    fn no_reload() -> mpsc::Receiver<()> {
        mpsc::channel(1).1
    }

    #[test]
    fn test_immediate_shutdown() {
        let publisher = MemoryPublisher::new();
        let mut m = monitor(&publisher);
        let updates = tokio_test::block_on(async {
            run(&mut m, Instant::now(), Duration::from_millis(100), no_reload(), async {}).await
        });
        assert_eq!(updates, 0);
        assert_eq!(publisher.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_runs_on_schedule() {
        let publisher = MemoryPublisher::new();
        let mut m = monitor(&publisher);
        let boot = Instant::now();

        let updates = run(
            &mut m,
            boot,
            Duration::from_millis(100),
            no_reload(),
            tokio::time::sleep(Duration::from_secs(75)),
        )
        .await;

        // First update at 10 s, second at 70 s.
        assert_eq!(updates, 2);
        assert_eq!(publisher.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_saved_calibration_applied_while_running() {
        let publisher = MemoryPublisher::new();
        let store = MemoryConfigStore::new();
        let mut m = monitor_with_store(&publisher, &store);
        assert_eq!(m.mapper("leak").unwrap().config().in_max, 4095.0);

        let (tx, rx) = mpsc::channel(1);
        let mut writer = store.clone();
        let mut group = m.config_group();
        group.insert("leak", CalibrationConfig::new(9.0, 3900.0, 0.0, 100.0, 0));

        let operator = async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            writer.save("room_cfg", &group).unwrap();
            tx.send(()).await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        };
        run(&mut m, Instant::now(), Duration::from_millis(100), rx, operator).await;

        assert_eq!(m.mapper("leak").unwrap().config().in_max, 3900.0);
        assert_eq!(m.config_vars().get("leak_in_max").unwrap().as_f64(), Some(3900.0));
    }
}
