//! The capability the motor core consumes from its environment: something
//! that can push a polarity and a PWM duty fraction onto one H-bridge phase.
//! Firmware implements this over the real direction/PWM pins; the test suite
//! substitutes a recording mock.

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Phase {
    A,
    B,
}

/// H-bridge direction-pin state for one phase. `Off` accompanies a zero duty
/// fraction, leaving the winding de-energized.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Polarity {
    Forward,
    Reverse,
    Off,
}

pub trait PhaseDriver {
    type Error;

    /// Configure one phase: direction pins per `polarity`, PWM duty per
    /// `duty` (a fraction in `[0.0, 1.0]`). Expected to apply register state
    /// synchronously without suspending; a failure is fatal for the motor
    /// operation in progress.
    fn set_phase(&mut self, phase: Phase, polarity: Polarity, duty: f32)
    -> Result<(), Self::Error>;
}
