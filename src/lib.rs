#![cfg_attr(not(test), no_std)]

pub mod angle;
pub mod cycle;
pub mod hardware;
pub mod motor;
pub mod runner;

pub use cycle::{FieldMethod, PhaseCommand};
pub use hardware::{Phase, PhaseDriver, Polarity};
pub use motor::StepperMotor;

use embassy_time::Duration;

/// Finest supported microstep resolution. Finer increments would fall below
/// the angular tolerance used to detect full-step alignment, making a
/// mid-microstep position indistinguishable from a boundary.
pub const MAX_MICROSTEPS: u16 = 16;

/// Rotational sense of a commanded move. `Closest` is resolved to `Cw` or
/// `Ccw` before any stepping begins; it is never itself a stepping state.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Direction {
    Cw,
    Ccw,
    Closest,
}

impl Direction {
    /// Resolve `Closest` against a concrete current/target pair. `Cw` and
    /// `Ccw` pass through unchanged.
    pub fn resolve(self, current: f32, target: f32) -> Direction {
        match self {
            Direction::Closest => angle::shortest_direction(current, target),
            d => d,
        }
    }
}

/// Construction-time configuration of a [`StepperMotor`].
#[derive(Debug, PartialEq, Copy, Clone)]
pub struct MotorConfig {
    pub steps_per_revolution: u16,
    pub num_teeth: u16,
    pub field_method: FieldMethod,
    /// Microsteps per full step, a power of two up to [`MAX_MICROSTEPS`].
    /// 1 disables microstepping.
    pub microsteps: u16,
    /// Minimum time between successive phase commands, so the winding
    /// currents can settle. Every commanded delay is floored at this value.
    pub settle_delay: Duration,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            steps_per_revolution: 200,
            num_teeth: 50,
            field_method: FieldMethod::Sinusoidal,
            microsteps: 16,
            settle_delay: Duration::from_millis(10),
        }
    }
}

impl MotorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // One electrical cycle spans 4 full steps and one rotor tooth pitch,
        // so the step count is fixed at four per tooth.
        if self.steps_per_revolution == 0
            || self.num_teeth == 0
            || self.steps_per_revolution != 4 * self.num_teeth
        {
            return Err(ConfigError::InvalidGeometry);
        }
        if !self.microsteps.is_power_of_two() || self.microsteps > MAX_MICROSTEPS {
            return Err(ConfigError::InvalidMicrosteps);
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown field method")]
    UnknownFieldMethod,
    #[error("steps per revolution must be four full steps per rotor tooth")]
    InvalidGeometry,
    #[error("microsteps must be a power of two up to 16")]
    InvalidMicrosteps,
}

/// Errors reported by motor operations. `InvalidArgument` is always raised
/// before any driver I/O; `Driver` is fatal for the operation in progress
/// (open-loop control cannot retry a step it does not know was applied).
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum MotorError<E> {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("phase driver fault")]
    Driver(E),
}
