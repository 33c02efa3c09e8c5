//! Event System
//!
//! Provides a pub/sub event bus so callers (and tests) can observe what the
//! retry and lifecycle loops decided, including the branches that swallow
//! an error and keep going.

use std::fmt;

use parking_lot::RwLock;
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

/// Emulator launch progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchState {
    Launching,
    WaitingForRegistration,
    WaitingForBoot,
    Ready,
    Failed,
}

impl fmt::Display for LaunchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LaunchState::Launching => "launching",
            LaunchState::WaitingForRegistration => "waiting for registration",
            LaunchState::WaitingForBoot => "waiting for boot",
            LaunchState::Ready => "ready",
            LaunchState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of a single readiness probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll {
    /// The awaited condition holds
    Ready,
    /// The probe answered, but with a not-yet value
    Pending(String),
    /// The probe itself failed; the error was ignored and polling continues
    Ignored(String),
}

impl Poll {
    pub fn is_ready(&self) -> bool {
        matches!(self, Poll::Ready)
    }
}

/// Result of a best-effort adb server restart
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    /// `kill-server` ran successfully
    Restarted,
    /// Killing is disabled by configuration
    Suppressed,
    /// `kill-server` failed; logged and ignored
    Failed(String),
}

/// Events emitted by a bridge session
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The adb server restart was attempted
    ServerRestart(RestartOutcome),
    /// A device became the session target
    DeviceSelected { device_id: String, emulator_port: Option<u16> },
    /// A dropped connection forced a rediscovery pass
    Rediscovery { command: String, reason: String },
    /// A boot readiness probe completed
    BootPoll { property: String, outcome: Poll },
    /// An emulator launch changed state
    LaunchStateChanged { avd_name: String, state: LaunchState },
    /// An emulator was told to shut down
    EmulatorKilled { device_id: String },
}

/// Subscriber handle for receiving events
#[derive(Clone)]
pub struct EventSubscription {
    receiver: Receiver<Event>,
}

impl EventSubscription {
    /// Receive the next event (blocking)
    pub fn recv(&self) -> Result<Event, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv(&self) -> Result<Event, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Drain every event already delivered
    pub fn drain(&self) -> Vec<Event> {
        self.receiver.try_iter().collect()
    }
}

/// Event bus for publish/subscribe pattern
pub struct EventBus {
    subscribers: RwLock<Vec<Sender<Event>>>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> EventSubscription {
        let (sender, receiver) = unbounded();
        self.subscribers.write().push(sender);
        EventSubscription { receiver }
    }

    /// Emit an event to all subscribers, dropping closed subscriptions
    pub fn emit(&self, event: Event) -> usize {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());
        let delivered = subscribers.len();

        debug!("Event {:?} delivered to {} subscribers", event, delivered);
        delivered
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
