//! # Integration Tests
//!
//! 跨 crate 集成测试：针对 `MockBackend` 驱动完整的 `CameraSession`。
//!
//! 负责：
//! - 帧交接与检测帧的最多一帧未消费
//! - 回放循环、打开超时、断线恢复
//! - 冷启动与并发感知管线场景

#[cfg(test)]
mod support {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use device::{MockBackend, MockBackendConfig, MockCameraConfig};
    use parking_lot::Mutex;
    use session::CameraSession;

    pub const WAIT: Duration = Duration::from_secs(10);

    /// Tick `session` until `done` holds, failing after `WAIT`.
    pub fn tick_until(session: &mut CameraSession, mut done: impl FnMut(&CameraSession) -> bool) {
        let deadline = Instant::now() + WAIT;
        while !done(session) {
            assert!(Instant::now() < deadline, "condition not reached in time");
            session.update();
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Small frames keep the copies cheap.
    pub fn backend(camera: MockCameraConfig) -> Arc<MockBackend> {
        Arc::new(MockBackend::with_config(MockBackendConfig {
            camera: MockCameraConfig {
                image_size: Some((64, 36)),
                ..camera
            },
            ..Default::default()
        }))
    }

    /// Shared event log filled by observers.
    pub fn log<T>() -> Arc<Mutex<Vec<T>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    pub fn strictly_increasing(values: &[u64]) -> bool {
        values.windows(2).all(|w| w[0] < w[1])
    }
}

#[cfg(test)]
mod config_tests {
    use config_loader::ConfigLoader;

    #[test]
    fn toml_config_drives_a_session() {
        let toml = r#"
            camera_id = "front"
            open_timeout_sec = 0

            [input]
            type = "recorded_file"
            path = "walk.svo2"

            [tracking]
            initial_position = [0.0, 1.5, 0.0]
        "#;
        let config = ConfigLoader::load_from_str(toml, config_loader::ConfigFormat::Toml).unwrap();
        assert_eq!(config.camera_id.as_str(), "front");
        assert!(config.input.loops());
        assert_eq!(config.open_timeout_sec, 0);
        let origin = config.to_tracking_parameters(None).initial_pose;
        assert!((origin.translation.y - 1.5).abs() < 1e-6);
    }
}

#[cfg(test)]
mod frame_handoff_tests {
    use std::thread;
    use std::time::Duration;

    use contracts::SessionConfig;
    use device::MockCameraConfig;
    use session::CameraSession;

    use crate::support::{backend, log, strictly_increasing, tick_until};

    /// A consumer slower than the grab rate sees every frame once, newest
    /// first, and drops the rest.
    #[test]
    fn slow_consumer_sees_strictly_increasing_frames() {
        let backend = backend(MockCameraConfig::default());
        let mut session = CameraSession::new(SessionConfig::live("slow"), backend.clone());
        let stamps = log::<u64>();
        let s = stamps.clone();
        session
            .events()
            .on_frame_grabbed(move |frame| s.lock().push(frame.timestamp_ns));

        session.begin().unwrap();
        tick_until(&mut session, |s| s.is_ready());
        for _ in 0..30 {
            session.update();
            thread::sleep(Duration::from_millis(8));
        }

        let stamps = stamps.lock().clone();
        assert!(stamps.len() >= 10, "only {} frames consumed", stamps.len());
        assert!(strictly_increasing(&stamps));

        let telemetry = session.telemetry();
        assert_eq!(telemetry.frames_consumed, stamps.len() as u64);
        // At most one grabbed frame waits for the consumer.
        assert!(backend.control().grabs() <= telemetry.frames_consumed + 1);
    }

    #[test]
    fn idle_tick_keeps_previous_frame() {
        let mut session = CameraSession::new(
            SessionConfig::live("idle"),
            backend(MockCameraConfig {
                grab_interval: Duration::from_millis(200),
                ..Default::default()
            }),
        );
        session.begin().unwrap();
        tick_until(&mut session, |s| s.latest_frame().is_some());

        let first = session.latest_frame().map(|f| f.timestamp_ns);
        session.update();
        assert_eq!(session.latest_frame().map(|f| f.timestamp_ns), first);
    }
}

#[cfg(test)]
mod detection_tests {
    use std::sync::Arc;

    use contracts::{CameraBackend, DepthCamera, RuntimeParameters, SessionConfig};
    use device::{MockBackend, MockCameraConfig};
    use perception::{DetectionBroker, ObjectDetection};

    fn opened_camera(config: &SessionConfig) -> Arc<dyn DepthCamera> {
        let backend = MockBackend::new();
        let camera = backend.create_camera(&config.input);
        camera.open(&config.to_init_parameters()).unwrap();
        camera
            .enable_object_detection(&config.to_object_detection_parameters())
            .unwrap();
        camera
    }

    #[test]
    fn second_retrieve_before_consume_is_a_no_op() {
        let config = SessionConfig::live("det");
        let camera = opened_camera(&config);
        let mut broker =
            DetectionBroker::<ObjectDetection>::new(config.to_object_detection_runtime());
        broker.activate(config.to_object_detection_parameters());

        camera.grab(&RuntimeParameters::default()).unwrap();
        let first_ts = camera.image_timestamp_ns();
        assert!(broker.retrieve(camera.as_ref()));

        camera.grab(&RuntimeParameters::default()).unwrap();
        assert!(!broker.retrieve(camera.as_ref()));
        assert!(broker.frame_ready());

        let frame = broker.consume().unwrap();
        assert_eq!(frame.raw.timestamp_ns, first_ts);
        assert_eq!(frame.sequence, 1);
        assert!(broker.consume().is_none());

        assert!(broker.retrieve(camera.as_ref()));
        let second = broker.consume().unwrap();
        assert!(second.raw.timestamp_ns > first_ts);
    }

    #[test]
    fn stale_batches_are_not_republished() {
        let config = SessionConfig::live("det");
        let camera = opened_camera(&config);
        let mut broker = DetectionBroker::<ObjectDetection>::default();
        broker.activate(config.to_object_detection_parameters());

        camera.grab(&RuntimeParameters::default()).unwrap();
        assert!(broker.retrieve(camera.as_ref()));
        broker.consume().unwrap();

        // No grab in between: the driver's batch is not fresh.
        assert!(!broker.retrieve(camera.as_ref()));
        assert!(broker.consume().is_none());
    }

    #[test]
    fn segmentation_masks_of_previous_frame_are_released() {
        let mut config = SessionConfig::live("det");
        config.object_detection.enable_segmentation = true;
        let backend = MockBackend::with_config(device::MockBackendConfig {
            camera: MockCameraConfig::default(),
            ..Default::default()
        });
        let camera = backend.create_camera(&config.input);
        camera.open(&config.to_init_parameters()).unwrap();
        camera
            .enable_object_detection(&config.to_object_detection_parameters())
            .unwrap();

        let mut broker = DetectionBroker::<ObjectDetection>::default();
        broker.activate(config.to_object_detection_parameters());
        for _ in 0..2 {
            camera.grab(&RuntimeParameters::default()).unwrap();
            broker.retrieve(camera.as_ref());
            // Listener drops the frame immediately.
            broker.consume().unwrap();
        }
        assert!(broker.masks_released() > 0);
    }
}

#[cfg(test)]
mod playback_tests {
    use std::time::Duration;

    use acquisition::TrackingMode;
    use contracts::{InputSource, SessionConfig};
    use device::MockCameraConfig;
    use session::CameraSession;

    use crate::support::{backend, tick_until};

    fn recorded(camera_id: &str) -> SessionConfig {
        let mut config = SessionConfig::live(camera_id);
        config.input = InputSource::RecordedFile {
            path: "walk.svo2".into(),
            loop_playback: true,
            real_time: false,
        };
        config
    }

    #[test]
    fn every_loop_wrap_restores_the_same_origin() {
        let backend = backend(MockCameraConfig {
            recording_frames: 8,
            ..Default::default()
        });
        let mut session = CameraSession::new(recorded("loop"), backend.clone());
        session.begin().unwrap();
        tick_until(&mut session, |s| s.telemetry().loop_wraps >= 4);

        let resets = backend.control().tracking_reset_poses();
        assert!(resets.len() >= 4, "{} wrap resets", resets.len());
        let origin = resets[0];
        for pose in &resets {
            assert!(pose.approx_eq(&origin, 1e-5));
        }
        assert_eq!(session.tracking_mode(), TrackingMode::Enabled);
        assert!(session.svo_position() < session.svo_number_of_frames());
    }

    #[test]
    fn wrap_reset_failure_degrades_tracking_but_keeps_images() {
        let backend = backend(MockCameraConfig {
            recording_frames: 6,
            ..Default::default()
        });
        let mut session = CameraSession::new(recorded("degrade"), backend.clone());
        session.begin().unwrap();
        tick_until(&mut session, |s| s.is_ready());
        backend.control().set_fail_tracking_reset(true);

        tick_until(&mut session, |s| s.telemetry().loop_wraps >= 1);
        assert_eq!(session.tracking_mode(), TrackingMode::Off);

        let consumed = session.telemetry().frames_consumed;
        tick_until(&mut session, |s| s.telemetry().frames_consumed > consumed + 3);
        assert!(session.is_ready());
    }

    #[test]
    fn non_looping_recording_holds_last_frame() {
        let mut config = recorded("once");
        config.input = InputSource::RecordedFile {
            path: "walk.svo2".into(),
            loop_playback: false,
            real_time: false,
        };
        let mut session = CameraSession::new(
            config,
            backend(MockCameraConfig {
                recording_frames: 5,
                ..Default::default()
            }),
        );
        session.begin().unwrap();
        tick_until(&mut session, |s| s.svo_position() == 4 && s.latest_frame().is_some());

        for _ in 0..20 {
            session.update();
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(session.telemetry().loop_wraps, 0);
        assert!(session.is_ready());
        assert_eq!(session.svo_position(), 4);
    }

    fn idle(session: &mut CameraSession, ticks: usize) {
        for _ in 0..ticks {
            session.update();
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn seeking_a_paused_recording_delivers_exactly_one_frame() {
        let mut session = CameraSession::new(
            recorded("scrub"),
            backend(MockCameraConfig {
                recording_frames: 100,
                ..Default::default()
            }),
        );
        session.begin().unwrap();
        tick_until(&mut session, |s| s.telemetry().frames_consumed >= 3);

        session.pause();
        idle(&mut session, 20);
        let paused_at = session.telemetry().frames_consumed;
        idle(&mut session, 30);
        assert_eq!(session.telemetry().frames_consumed, paused_at);

        session.set_svo_position(50).unwrap();
        tick_until(&mut session, |s| s.telemetry().frames_consumed == paused_at + 1);
        idle(&mut session, 30);
        assert_eq!(session.telemetry().frames_consumed, paused_at + 1);
        assert_eq!(session.svo_position(), 50);
        assert!(session.is_paused());
    }
}

#[cfg(test)]
mod open_timeout_tests {
    use contracts::SessionConfig;
    use device::{MockCameraConfig, FAIL_FOREVER};
    use session::{CameraSession, FailureKind, SessionState};

    use crate::support::{backend, tick_until};

    #[test]
    fn zero_timeout_fails_after_one_attempt() {
        let backend = backend(MockCameraConfig::default());
        backend.control().fail_next_opens(FAIL_FOREVER);
        let mut config = SessionConfig::live("fast-fail");
        config.open_timeout_sec = 0;

        let mut session = CameraSession::new(config, backend.clone());
        session.begin().unwrap();
        tick_until(&mut session, |s| s.state() == SessionState::Closed);

        assert_eq!(backend.control().open_attempts(), 1);
        let err = session.last_error().unwrap();
        assert_eq!(err.kind(), FailureKind::Transient);
        assert!(err.device_code().is_some());
    }

    #[test]
    fn infinite_timeout_retries_until_the_device_appears() {
        let backend = backend(MockCameraConfig::default());
        backend.control().fail_next_opens(4);
        let mut config = SessionConfig::live("patient");
        config.open_timeout_sec = -1;
        config.recovery.open_retry_interval_ms = 1;

        let mut session = CameraSession::new(config, backend.clone());
        session.begin().unwrap();
        tick_until(&mut session, |s| s.is_ready());

        assert_eq!(backend.control().open_attempts(), 5);
        assert_eq!(backend.control().successful_opens(), 1);
    }

    #[test]
    fn closing_cancels_an_endless_open() {
        let backend = backend(MockCameraConfig::default());
        backend.control().fail_next_opens(FAIL_FOREVER);
        let mut session = CameraSession::new(SessionConfig::live("endless"), backend.clone());
        session.begin().unwrap();
        tick_until(&mut session, |_| backend.control().open_attempts() >= 3);

        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        let attempts = backend.control().open_attempts();
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(backend.control().open_attempts(), attempts);
    }
}

#[cfg(test)]
mod recovery_tests {
    use contracts::SessionConfig;
    use device::MockCameraConfig;
    use session::{CameraSession, Disconnected, SessionState, StateChange};

    use crate::support::{backend, log, tick_until};

    #[test]
    fn disconnect_round_trip_reapplies_last_pose() {
        let backend = backend(MockCameraConfig::default());
        let mut config = SessionConfig::live("flaky");
        config.recovery.open_retry_interval_ms = 1;
        let mut session = CameraSession::new(config, backend.clone());

        let disconnects = log::<Disconnected>();
        let d = disconnects.clone();
        session
            .events()
            .on_disconnected(move |event| d.lock().push(event.clone()));
        let states = log::<StateChange>();
        let s = states.clone();
        session
            .events()
            .on_state_changed(move |change| s.lock().push(*change));

        session.begin().unwrap();
        tick_until(&mut session, |s| s.telemetry().frames_consumed >= 10);

        backend.control().disconnect();
        tick_until(&mut session, |s| s.state() == SessionState::Opening);
        assert_eq!(disconnects.lock().len(), 1);

        backend.control().reconnect();
        tick_until(&mut session, |s| s.is_ready());
        for _ in 0..10 {
            session.update();
        }

        let disconnects = disconnects.lock().clone();
        assert_eq!(disconnects.len(), 1);
        assert!(disconnects[0].will_reconnect);
        let last_pose = disconnects[0].last_pose.expect("tracking was active");

        let visited: Vec<SessionState> = states.lock().iter().map(|c| c.to).collect();
        let ready_closed_ready = [SessionState::Ready, SessionState::Closed, SessionState::Ready];
        let mut expected = ready_closed_ready.iter().peekable();
        for state in &visited {
            if expected.peek() == Some(&state) {
                expected.next();
            }
        }
        assert!(expected.peek().is_none(), "visited {visited:?}");

        let enables = backend.control().tracking_enable_poses();
        assert_eq!(enables.len(), 2);
        assert!(enables[1].approx_eq(&last_pose, 1e-5));
        assert_eq!(session.telemetry().reconnects, 1);
    }

    #[test]
    fn disconnect_without_auto_reconnect_stays_closed() {
        let backend = backend(MockCameraConfig::default());
        let mut config = SessionConfig::live("manual");
        config.recovery.auto_reconnect = false;
        let mut session = CameraSession::new(config, backend.clone());
        session.begin().unwrap();
        tick_until(&mut session, |s| s.is_ready());

        backend.control().disconnect();
        tick_until(&mut session, |s| s.state() == SessionState::Closed);
        assert_eq!(backend.control().closes(), 1);
        assert_eq!(session.telemetry().reconnects, 0);
    }
}

#[cfg(test)]
mod scenario_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use contracts::{PositionalTrackingState, SessionConfig};
    use device::{MockBackend, MockBackendConfig, MockCameraConfig};
    use session::{CameraSession, InitializationProgress, SessionRegistry};

    use crate::support::{backend, log, strictly_increasing, tick_until, WAIT};

    #[test]
    fn cold_start_is_ready_within_one_tick() {
        let backend = backend(MockCameraConfig::default());
        let mut session = CameraSession::new(SessionConfig::live("cold"), backend.clone());
        let ready = Arc::new(AtomicUsize::new(0));
        let r = ready.clone();
        session.events().on_session_ready(move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        });

        session.begin().unwrap();
        let deadline = Instant::now() + WAIT;
        while session.progress() != InitializationProgress::Ready {
            assert!(Instant::now() < deadline, "initialization did not finish");
            thread::sleep(Duration::from_millis(1));
        }
        // Let the init thread hand over its result.
        thread::sleep(Duration::from_millis(20));

        session.update();
        assert!(session.is_ready());
        assert_eq!(ready.load(Ordering::SeqCst), 1);
        assert_eq!(backend.control().open_attempts(), 1);
        assert_eq!(session.tracking_state(), PositionalTrackingState::Ok);
    }

    #[test]
    fn concurrent_pipelines_share_frame_timestamps() {
        const N: usize = 15;

        let backend = backend(MockCameraConfig::default());
        let mut session = CameraSession::new(SessionConfig::live("both"), backend);
        let frames = log::<u64>();
        let objects = log::<u64>();
        let bodies = log::<u64>();
        let (f, o, b) = (frames.clone(), objects.clone(), bodies.clone());
        session
            .events()
            .on_frame_grabbed(move |frame| f.lock().push(frame.timestamp_ns));
        session
            .events()
            .on_object_detection_frame(move |frame| o.lock().push(frame.raw.timestamp_ns));
        session
            .events()
            .on_body_tracking_frame(move |frame| b.lock().push(frame.raw.timestamp_ns));

        session.begin().unwrap();
        tick_until(&mut session, |s| s.is_ready());
        session.start_object_detection().unwrap();
        session.start_body_tracking().unwrap();
        tick_until(&mut session, |s| {
            s.is_object_detection_running() && s.is_body_tracking_running()
        });

        let warm = frames.lock().len() + 2;
        tick_until(&mut session, |_| frames.lock().len() >= warm + N);

        let frames = frames.lock().clone();
        let objects = objects.lock().clone();
        let bodies = bodies.lock().clone();
        let tail = &frames[frames.len() - N..];
        assert!(strictly_increasing(tail));
        assert_eq!(&objects[objects.len() - N..], tail);
        assert_eq!(&bodies[bodies.len() - N..], tail);

        let telemetry = session.telemetry();
        assert!(telemetry.object_detection_fps.is_some());
        assert!(telemetry.body_tracking_fps.is_some());
    }

    #[test]
    fn registry_drives_several_cameras() {
        let mut registry = SessionRegistry::new(backend(MockCameraConfig::default()));
        for id in ["left", "right"] {
            registry
                .create(SessionConfig::live(id))
                .unwrap()
                .begin()
                .unwrap();
        }
        assert!(registry.create(SessionConfig::live("left")).is_err());

        let deadline = Instant::now() + WAIT;
        while !registry
            .ids()
            .iter()
            .all(|id| registry.get(id.as_str()).is_some_and(|s| s.is_ready()))
        {
            assert!(Instant::now() < deadline, "sessions not ready");
            registry.update_all();
            thread::sleep(Duration::from_millis(1));
        }

        assert!(registry.close("left"));
        assert!(registry.get("left").is_none());
        registry.close_all();
        assert!(registry.is_empty());
    }

    #[test]
    fn live_input_keeps_streaming_while_a_model_is_optimized() {
        let backend = Arc::new(MockBackend::with_config(MockBackendConfig {
            camera: MockCameraConfig {
                image_size: Some((64, 36)),
                ..Default::default()
            },
            optimization_time: Duration::from_secs(2),
            ..Default::default()
        }));
        let mut session = CameraSession::new(SessionConfig::live("optimizing"), backend.clone());
        session.begin().unwrap();
        tick_until(&mut session, |s| s.is_ready());

        session.start_object_detection().unwrap();
        tick_until(&mut session, |_| backend.optimize_calls() == 1);
        let before = session.telemetry().frames_consumed;
        let until = Instant::now() + Duration::from_millis(500);
        while Instant::now() < until {
            session.update();
            thread::sleep(Duration::from_millis(1));
        }

        assert!(!session.is_object_detection_running());
        assert!(!session.is_paused());
        let streamed = session.telemetry().frames_consumed - before;
        assert!(streamed > 10, "{streamed} frames during optimization");
        session.close();
    }

    #[test]
    fn unsynced_detection_publishes_only_fresh_batches() {
        let mut config = SessionConfig::live("unsynced");
        config.object_detection.image_sync = false;
        let mut session = CameraSession::new(config, backend(MockCameraConfig::default()));
        let objects = log::<u64>();
        let o = objects.clone();
        session
            .events()
            .on_object_detection_frame(move |frame| o.lock().push(frame.raw.timestamp_ns));

        session.begin().unwrap();
        tick_until(&mut session, |s| s.is_ready());
        session.start_object_detection().unwrap();
        tick_until(&mut session, |s| s.is_object_detection_running());
        tick_until(&mut session, |_| objects.lock().len() >= 5);

        session.pause();
        for _ in 0..20 {
            session.update();
            thread::sleep(Duration::from_millis(1));
        }
        let published = objects.lock().len();
        for _ in 0..30 {
            session.update();
            thread::sleep(Duration::from_millis(1));
        }

        let objects = objects.lock().clone();
        assert_eq!(objects.len(), published);
        assert!(strictly_increasing(&objects));
    }

    #[test]
    fn ready_session_reports_camera_identity() {
        let mut session = CameraSession::new(
            SessionConfig::live("id"),
            backend(MockCameraConfig::default()),
        );
        session.begin().unwrap();
        tick_until(&mut session, |s| s.is_ready());
        let info = session.camera_information().unwrap();
        assert_eq!(info.serial_number, device::MOCK_SERIAL);
        assert_eq!((info.width, info.height), (64, 36));
    }
}
