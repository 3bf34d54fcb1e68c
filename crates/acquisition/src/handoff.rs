//! Consumer-side frame handoff
//!
//! Freshest-wins: the consumer takes the single published frame, if any,
//! inside the coarse lock and re-arms the request. Intermediate frames a
//! slow consumer never saw are simply not produced.

use std::sync::Arc;

use contracts::DepthCamera;
use tracing::trace;

use crate::shared::{SharedAcquisition, SharedState};

/// Result of one handoff.
#[derive(Debug, Clone, PartialEq)]
pub struct Handoff<T> {
    pub value: T,
    /// Playback looped back to the first frame during this handoff
    pub wrapped: bool,
}

pub struct FrameHandoff {
    shared: Arc<SharedAcquisition>,
    camera: Arc<dyn DepthCamera>,
}

impl FrameHandoff {
    pub fn new(shared: Arc<SharedAcquisition>, camera: Arc<dyn DepthCamera>) -> Self {
        Self { shared, camera }
    }

    pub fn shared(&self) -> &Arc<SharedAcquisition> {
        &self.shared
    }

    /// Take the published frame.
    ///
    /// `consume` runs under the lock before the request flag is re-armed, so
    /// anything it reads belongs to the same grab. No-op when nothing new
    /// was published.
    pub fn take<T>(
        &self,
        consume: impl FnOnce(&mut SharedState, &dyn DepthCamera) -> T,
    ) -> Option<Handoff<T>> {
        let camera = self.camera.as_ref();
        let mut state = self.shared.lock();
        if !state.new_frame_available {
            return None;
        }

        let value = consume(&mut state, camera);

        let wrapped = self.shared.loops() && state.playback.at_wrap_point();
        if wrapped {
            self.shared.wrap_playback(&mut state, camera);
        }

        state.new_frame_available = false;
        state.request_new_frame = true;
        drop(state);

        self.shared.metrics().record_consumed();
        trace!(camera_id = %self.shared.camera_id(), wrapped, "frame handed off");
        Some(Handoff { value, wrapped })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grab_loop::{AcquisitionLoop, LoopStep};
    use contracts::{InputSource, RuntimeParameters, SessionConfig, View};
    use device::{MockCamera, MockCameraConfig, MockControl};

    fn live() -> (FrameHandoff, AcquisitionLoop) {
        let config = SessionConfig::live("handoff");
        let camera: Arc<dyn DepthCamera> = Arc::new(MockCamera::new(
            MockCameraConfig {
                image_size: Some((8, 4)),
                ..Default::default()
            },
            MockControl::new(),
        ));
        camera.open(&config.to_init_parameters()).unwrap();
        let shared = Arc::new(SharedAcquisition::new(config.camera_id.clone(), &config.input));
        shared.set_ready(true);
        (
            FrameHandoff::new(shared.clone(), camera.clone()),
            AcquisitionLoop::new(shared, camera, RuntimeParameters::default()),
        )
    }

    #[test]
    fn nothing_published_is_noop() {
        let (handoff, _acquisition) = live();
        assert!(handoff.take(|_, _| ()).is_none());
        assert!(handoff.shared().lock().request_new_frame);
    }

    #[test]
    fn take_rearms_request() {
        let (handoff, acquisition) = live();
        assert_eq!(acquisition.step(), LoopStep::Grabbed);

        let taken = handoff
            .take(|state, camera| {
                let image = camera.retrieve_image(View::Left).unwrap();
                (state.grab_timestamp_ns, image.width)
            })
            .unwrap();
        assert_eq!(taken.value.1, 8);
        assert!(!taken.wrapped);

        let state = handoff.shared().lock();
        assert!(!state.new_frame_available);
        assert!(state.request_new_frame);
    }

    #[test]
    fn consumer_sees_strictly_increasing_timestamps() {
        let (handoff, acquisition) = live();
        let mut seen = Vec::new();
        for _ in 0..20 {
            acquisition.step();
            acquisition.step();
            if let Some(h) = handoff.take(|state, _| state.grab_timestamp_ns) {
                seen.push(h.value);
            }
        }
        assert_eq!(seen.len(), 20);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn looping_recording_wraps_near_end() {
        let mut config = SessionConfig::live("wrap");
        config.input = InputSource::RecordedFile {
            path: "loop.svo".into(),
            loop_playback: true,
            real_time: false,
        };
        let camera: Arc<dyn DepthCamera> = Arc::new(MockCamera::new(
            MockCameraConfig {
                recording_frames: 4,
                ..Default::default()
            },
            MockControl::new(),
        ));
        camera.open(&config.to_init_parameters()).unwrap();
        let shared = Arc::new(SharedAcquisition::new(config.camera_id.clone(), &config.input));
        shared.lock().playback.total = camera.svo_number_of_frames();
        shared.set_ready(true);
        let handoff = FrameHandoff::new(shared.clone(), camera.clone());
        let acquisition = AcquisitionLoop::new(shared.clone(), camera.clone(), RuntimeParameters::default());

        let mut wraps = 0;
        for _ in 0..6 {
            acquisition.step();
            if let Some(h) = handoff.take(|_, _| ()) {
                wraps += usize::from(h.wrapped);
            }
        }
        // Frames 0,1,2 -> wrap, 0,1,2 -> wrap
        assert_eq!(wraps, 2);
        assert_eq!(shared.lock().playback.wraps, 2);
        assert_eq!(camera.svo_position(), 0);
    }
}
