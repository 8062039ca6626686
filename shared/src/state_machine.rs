//! Measurement and Broker State Machines
//!
//! Defines the valid transitions of a measurement session and the
//! connection states of the broker client.

/// Lifecycle of a measurement session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeasurementState {
    /// No listeners registered, no ticks running
    #[default]
    Idle,
    /// Listeners registered and the periodic tick running
    Measuring,
}

/// Events that can trigger session transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// User asked to start measuring
    Start,
    /// User asked to stop measuring
    Stop,
    /// User pressed the start/stop control
    Toggle,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Session entered `Measuring`
    Started,
    /// Session returned to `Idle`
    Stopped,
    /// Transition was invalid from current state
    Invalid {
        from: MeasurementState,
        event: SessionEvent,
    },
}

/// The two-state start/stop toggle of a measurement session
#[derive(Debug, Default)]
pub struct MeasurementStateMachine {
    current_state: MeasurementState,
    sessions_started: u64,
}

impl MeasurementStateMachine {
    /// Create a new state machine in Idle state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current state
    pub fn state(&self) -> MeasurementState {
        self.current_state
    }

    /// Whether a session is currently running
    pub fn is_measuring(&self) -> bool {
        self.current_state == MeasurementState::Measuring
    }

    /// Number of sessions started since creation
    pub fn sessions_started(&self) -> u64 {
        self.sessions_started
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: SessionEvent) -> TransitionResult {
        use MeasurementState::*;
        use SessionEvent::*;

        match (self.current_state, event) {
            (Idle, Start | Toggle) => {
                self.current_state = Measuring;
                self.sessions_started += 1;
                TransitionResult::Started
            }
            (Measuring, Stop | Toggle) => {
                self.current_state = Idle;
                TransitionResult::Stopped
            }
            (from, event) => TransitionResult::Invalid { from, event },
        }
    }
}

/// Connection state of the broker client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrokerState {
    #[default]
    Disconnected,
    Connected,
}

impl BrokerState {
    /// Publishing is only attempted while connected
    pub fn can_publish(&self) -> bool {
        matches!(self, BrokerState::Connected)
    }
}
