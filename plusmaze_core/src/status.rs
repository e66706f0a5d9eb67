//! Sequencer status returned from each scheduler tick.

/// Public status of a single tick of a sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Nothing to do until an operator command arrives.
    AwaitingOperator,
    /// Monitoring or holding; keep ticking.
    Running,
    /// Suspended; needs `resume`.
    Paused,
    /// Session over; the log is final.
    Complete,
}
