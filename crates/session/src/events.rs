//! Session events
//!
//! Observer lists per event kind. Callbacks run synchronously on the thread
//! calling `CameraSession::update`, after the shared lock is released, in
//! the order the events were produced.

use std::sync::Arc;
use std::time::Duration;

use contracts::{BodiesBatch, CameraId, CameraInformation, FrameSlot, ObjectsBatch, Pose};
use perception::DetectionFrame;

use crate::session::SessionState;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Ordered list of callbacks for one event kind.
pub struct Observers<T> {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Callback<T>)>,
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            subscribers: Vec::new(),
        }
    }
}

impl<T> std::fmt::Debug for Observers<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl<T> Observers<T> {
    pub fn subscribe(&mut self, callback: impl Fn(&T) + Send + Sync + 'static) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscribers.push((id, Arc::new(callback)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    pub fn emit(&self, event: &T) {
        for (_, callback) in &self.subscribers {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

/// The session finished initializing.
#[derive(Debug, Clone)]
pub struct SessionReady {
    pub camera_id: CameraId,
    pub information: CameraInformation,
    /// Time from `begin` to ready
    pub init_duration: Duration,
}

/// The device disappeared mid-session.
#[derive(Debug, Clone)]
pub struct Disconnected {
    pub camera_id: CameraId,
    /// Last tracked pose, carried over as the next tracking origin
    pub last_pose: Option<Pose>,
    pub will_reconnect: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub from: SessionState,
    pub to: SessionState,
}

/// All observer lists of one session.
#[derive(Debug, Default)]
pub struct SessionEvents {
    pub session_ready: Observers<SessionReady>,
    pub disconnected: Observers<Disconnected>,
    pub frame_grabbed: Observers<FrameSlot>,
    pub object_detection_frame: Observers<DetectionFrame<ObjectsBatch>>,
    pub body_tracking_frame: Observers<DetectionFrame<BodiesBatch>>,
    pub state_changed: Observers<StateChange>,
}

impl SessionEvents {
    pub fn on_session_ready(
        &mut self,
        f: impl Fn(&SessionReady) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.session_ready.subscribe(f)
    }

    pub fn on_disconnected(
        &mut self,
        f: impl Fn(&Disconnected) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.disconnected.subscribe(f)
    }

    pub fn on_frame_grabbed(
        &mut self,
        f: impl Fn(&FrameSlot) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.frame_grabbed.subscribe(f)
    }

    pub fn on_object_detection_frame(
        &mut self,
        f: impl Fn(&DetectionFrame<ObjectsBatch>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.object_detection_frame.subscribe(f)
    }

    pub fn on_body_tracking_frame(
        &mut self,
        f: impl Fn(&DetectionFrame<BodiesBatch>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.body_tracking_frame.subscribe(f)
    }

    pub fn on_state_changed(
        &mut self,
        f: impl Fn(&StateChange) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.state_changed.subscribe(f)
    }

    pub(crate) fn dispatch(&self, event: &Event) {
        match event {
            Event::Ready(e) => self.session_ready.emit(e),
            Event::Disconnected(e) => self.disconnected.emit(e),
            Event::FrameGrabbed(e) => self.frame_grabbed.emit(e),
            Event::Objects(e) => self.object_detection_frame.emit(e),
            Event::Bodies(e) => self.body_tracking_frame.emit(e),
            Event::StateChanged(e) => self.state_changed.emit(e),
        }
    }
}

/// An event waiting to be dispatched.
#[derive(Debug)]
pub(crate) enum Event {
    Ready(SessionReady),
    Disconnected(Disconnected),
    FrameGrabbed(FrameSlot),
    Objects(DetectionFrame<ObjectsBatch>),
    Bodies(DetectionFrame<BodiesBatch>),
    StateChanged(StateChange),
}
