//! Class A transmit/receive state machine
//!
//! The driver moves through these states:
//!
//! ```text
//! Idle --join--> Joining            (join request sent, accept awaited)
//! Joining --accept--> Joined
//! Joined --send--> Transmitting     (radio in TX)
//! Transmitting --tx done--> RxListen (RXCONT, inverted IQ)
//! RxListen --downlink handled--> Joined
//! ```
//!
//! A join transmission stays in `Joining` across TX-done: the state only
//! advances when the accept arrives in RX1/RX2. ABP devices are `Joined`
//! from activation.

/// Driver state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassAState {
    /// No session, no join in flight
    Idle,
    /// Join request sent, waiting for the accept
    Joining,
    /// Session active, radio idle
    Joined,
    /// Uplink handed to the radio, TX in progress
    Transmitting,
    /// Receive windows open (RXCONT until the next transmit)
    RxListen,
}

/// Class A state tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassA {
    state: ClassAState,
}

impl ClassA {
    /// New tracker; `activated` starts the device in `Joined` (ABP or a
    /// cached OTAA session)
    pub fn new(activated: bool) -> Self {
        Self {
            state: if activated {
                ClassAState::Joined
            } else {
                ClassAState::Idle
            },
        }
    }

    /// Current state
    pub fn state(&self) -> ClassAState {
        self.state
    }

    /// A join request was handed to the radio
    pub fn begin_join(&mut self) {
        self.state = ClassAState::Joining;
    }

    /// A data uplink was handed to the radio
    pub fn begin_transmit(&mut self) {
        self.state = ClassAState::Transmitting;
    }

    /// TX complete; receive windows open
    ///
    /// Joins keep waiting in `Joining`, data uplinks move to `RxListen`.
    pub fn tx_done(&mut self) {
        if self.state == ClassAState::Transmitting {
            self.state = ClassAState::RxListen;
        }
    }

    /// Session keys are in place (join accept processed, ABP activation
    /// or cached credentials adopted)
    pub fn activated(&mut self) {
        self.state = ClassAState::Joined;
    }

    /// A downlink was dispatched; back to idle-joined
    pub fn downlink_handled(&mut self) {
        if self.state == ClassAState::RxListen {
            self.state = ClassAState::Joined;
        }
    }

    /// True while a join accept is awaited
    pub fn awaiting_join(&self) -> bool {
        self.state == ClassAState::Joining
    }

    /// True once a session is active
    pub fn is_joined(&self) -> bool {
        matches!(
            self.state,
            ClassAState::Joined | ClassAState::Transmitting | ClassAState::RxListen
        )
    }
}
