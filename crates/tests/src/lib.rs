//! # Integration Tests
//!
//! Cross-crate end-to-end tests, all runnable without a CARLA server:
//! - the full handshake protocol between the traffic coordinator and the
//!   capture session against the mock simulator
//! - data-integrity failure when a sensor skips ticks
//! - handshake ordering invariants

#[cfg(test)]
mod contract_tests {
    #[test]
    fn contracts_compile() {
        let _ = contracts::ConfigVersion::V1;
        assert_eq!(contracts::town_name(10), Some("Town10HD"));
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use capture::{CaptureSession, SessionEvents};
    use contracts::{
        CaptureConfig, SensorKind, SensorSpec, SessionError, SessionResult, Transform,
    };
    use sim_client::{MockConfig, MockSimulator, SimulatorClient, SyncSettings};
    use supervisor::{ProcessRegistry, WorldInitializer};
    use sync_protocol::{Handshake, ReadySignal};
    use tempfile::tempdir;
    use traffic::{TrafficCoordinator, TrafficParams, TrafficTiming};

    fn sensor(id: &str, kind: SensorKind) -> SensorSpec {
        SensorSpec {
            id: id.to_string(),
            kind,
            transform: Transform::default(),
            attributes: HashMap::new(),
        }
    }

    fn capture_config(frames_to_take: u64, margin: u64) -> CaptureConfig {
        CaptureConfig {
            tick_seconds: 0.05,
            frames_to_take,
            margin,
            warm_up_frames: 2,
            pre_warm_frames: 3,
            settle_seconds: 0.01,
            step_timeout_ms: 500,
        }
    }

    async fn connected(config: MockConfig) -> MockSimulator {
        let mut sim = MockSimulator::with_config(config);
        sim.connect("127.0.0.1", 2000, Duration::from_secs(1))
            .await
            .unwrap();
        sim
    }

    fn always_alive() -> impl Fn() -> SessionResult<()> {
        || -> SessionResult<()> { Ok(()) }
    }

    /// Samples the handshake signals and records first-set order.
    fn watch_handshake(handshake: Handshake) -> Arc<Mutex<Vec<&'static str>>> {
        let order = Arc::new(Mutex::new(Vec::new()));
        let recorded = order.clone();
        tokio::spawn(async move {
            let mut seen = HashSet::new();
            loop {
                let signals = [
                    ("traffic_warm_up", &handshake.traffic_ready_to_warm_up),
                    ("capture_warm_up", &handshake.capture_ready_to_warm_up),
                    ("traffic_take_data", &handshake.traffic_ready_to_take_data),
                    ("capture_take_data", &handshake.capture_ready_to_take_data),
                    ("capture_stop", &handshake.capture_wants_to_stop),
                ];
                for (name, signal) in signals {
                    if signal.is_set() && seen.insert(name) {
                        recorded.lock().unwrap().push(name);
                    }
                }
                if seen.len() == 5 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });
        order
    }

    /// End-to-end: world load -> traffic coordinator -> capture session
    /// against the mock, producing a validated on-disk dataset.
    #[tokio::test]
    async fn full_mock_session_produces_dataset() {
        let dir = tempdir().unwrap();
        let sim = connected(MockConfig::default()).await;

        let registry = ProcessRegistry::new();
        let self_pid = std::process::id();
        WorldInitializer::load_world(&sim, "Town10HD", self_pid, &registry)
            .await
            .unwrap();

        let handshake = Handshake::new();
        let shutdown = ReadySignal::new();
        let order = watch_handshake(handshake.clone());

        let startup = TrafficCoordinator::start(
            &sim,
            TrafficParams {
                vehicles: 3,
                walkers: 2,
                tm_port: 8000,
                tuning: Default::default(),
                timing: TrafficTiming {
                    pre_warm_frames: 3,
                    warm_up_frames: 2,
                    settle: Duration::from_millis(10),
                    keep_alive_interval: Duration::from_millis(30),
                },
                tick_seconds: 0.05,
                shutdown: shutdown.clone(),
            },
            handshake.clone(),
            || true,
        )
        .await;
        assert!(startup.simulator_ok && startup.traffic_ok);

        let events = SessionEvents::new();
        let session = CaptureSession::new(
            sim.clone(),
            capture_config(5, 2),
            vec![
                sensor("depth_front", SensorKind::Depth),
                sensor("dvs_front", SensorKind::Dvs),
            ],
            dir.path().to_path_buf(),
            handshake.clone(),
            events.clone(),
            always_alive(),
            false,
        );

        let artifacts = session.run().await.unwrap();
        assert!(events.hero_found.is_set());
        assert!(events.finished.is_set());
        assert_eq!(artifacts.window_len, 5);
        assert_eq!(
            artifacts.image_sequences,
            vec![("depth_front".to_string(), 5)]
        );
        // 4 events per tick from the mock
        assert_eq!(artifacts.event_archives, vec![("dvs_front".to_string(), 20)]);

        // Persisted layout
        assert!(dir.path().join("sensors.json").exists());
        assert!(dir.path().join("timestamps.json").exists());
        for offset in 0..5u64 {
            assert!(storage::sequence_image_path(&dir.path().join("depth_front"), offset).exists());
        }
        let archive = storage::read_event_archive(&dir.path().join("dvs_front.events.bin")).unwrap();
        assert_eq!(archive.len(), 20);
        // Aligned to the common origin: minimum timestamp is exactly 0
        assert_eq!(archive.t.first().copied(), Some(0));
        assert!(archive.t.windows(2).all(|w| w[0] <= w[1]));
        assert!(archive.ms_to_idx.windows(2).all(|w| w[0] <= w[1]));

        let table = storage::TimestampTable::read(&dir.path().join("timestamps.json")).unwrap();
        assert_eq!(table.sensors["depth_front"].len(), 5);
        assert_eq!(table.sensors["depth_front"][0], 0);

        // Wind down traffic and check its teardown
        shutdown.set();
        startup.handle.await.unwrap();
        assert!(!sim.is_sync_mode());

        // Handshake ordering: each side only ever answers the other
        let order = order.lock().unwrap().clone();
        assert_eq!(
            order,
            vec![
                "traffic_warm_up",
                "capture_warm_up",
                "traffic_take_data",
                "capture_take_data",
                "capture_stop",
            ]
        );
    }

    /// A sensor that skips ticks inside the window must fail validation
    /// naming the smallest missing tick.
    #[tokio::test]
    async fn dropped_ticks_fail_validation_with_context() {
        let dir = tempdir().unwrap();
        let mut config = MockConfig::default();
        // A wide dropped range so the window always intersects it
        config
            .drop_ticks
            .insert("dvs_front".into(), (8..=40).collect());
        let sim = connected(config).await;

        let handshake = Handshake::new();
        let done = ReadySignal::new();

        // Manual clock master playing the traffic side
        let master = {
            let sim = sim.clone();
            let handshake = handshake.clone();
            let done = done.clone();
            tokio::spawn(async move {
                sim.apply_sync_settings(SyncSettings::for_tick(0.05))
                    .await
                    .unwrap();
                sim.spawn_vehicle("vehicle.ford.mustang", Transform::default(), "hero", true)
                    .await
                    .unwrap();

                for _ in 0..3 {
                    sim.tick().await.unwrap();
                }
                handshake.traffic_ready_to_warm_up.set();
                while !handshake.capture_ready_to_warm_up.is_set() {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
                for _ in 0..2 {
                    sim.tick().await.unwrap();
                }
                handshake.traffic_ready_to_take_data.set();
                while !handshake.capture_ready_to_take_data.is_set() {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
                // Step until the capture side errors out and the test ends
                while !done.is_set() {
                    sim.tick().await.unwrap();
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
        };

        let session = CaptureSession::new(
            sim.clone(),
            capture_config(3, 2),
            vec![
                sensor("depth_front", SensorKind::Depth),
                sensor("dvs_front", SensorKind::Dvs),
            ],
            dir.path().to_path_buf(),
            handshake.clone(),
            SessionEvents::new(),
            always_alive(),
            false,
        );

        let err = session.run().await.unwrap_err();
        done.set();
        master.await.unwrap();

        match err {
            SessionError::MissingFrame {
                sensor_id,
                tick,
                context,
            } => {
                assert_eq!(sensor_id, "dvs_front");
                assert!((8..=40).contains(&tick), "missing tick {tick}");
                assert!(context.contains("MISSING"));
            }
            other => panic!("expected MissingFrame, got {other}"),
        }
    }

    /// The startup race classifies a dead simulator ahead of coordinator
    /// state.
    #[tokio::test]
    async fn traffic_race_prefers_simulator_death() {
        let sim = connected(MockConfig::default()).await;
        let startup = TrafficCoordinator::start(
            &sim,
            TrafficParams {
                vehicles: 1,
                walkers: 0,
                tm_port: 8000,
                tuning: Default::default(),
                timing: TrafficTiming::default(),
                tick_seconds: 0.05,
                shutdown: ReadySignal::new(),
            },
            Handshake::new(),
            || false,
        )
        .await;
        assert!(!startup.simulator_ok);
        assert!(startup.traffic_ok);
    }
}
