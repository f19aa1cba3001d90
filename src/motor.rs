//! The motor-control state machine: owns the open-loop position estimate and
//! turns target angles into sequences of phase commands on the driver.

use embassy_time::{Duration, Timer};
use libm::{fabsf, roundf};

use crate::angle::{self, ANGLE_EPS, Geometry};
use crate::cycle::{FieldMethod, PhaseCommand};
use crate::hardware::{Phase, PhaseDriver, Polarity};
use crate::{Direction, MotorConfig, MotorError};

/// Full-step commutation states, indexed by aligned position − 1. One phase
/// fully energized, the other off.
const FULL_STEP_PATTERN: [PhaseCommand; 4] = [
    PhaseCommand { a: 1.0, b: 0.0 },
    PhaseCommand { a: 0.0, b: 1.0 },
    PhaseCommand { a: -1.0, b: 0.0 },
    PhaseCommand { a: 0.0, b: -1.0 },
];

/// Open-loop controller for a two-phase bipolar stepper behind an H-bridge.
///
/// The stored mechanical angle is the single authoritative position estimate:
/// there is no feedback, only the accumulation of commanded steps. It is
/// mutated exclusively by the operation currently executing, and every update
/// lands back in `[0, 360)`.
///
/// Construction energizes phase A so the rotor is pulled onto the 0°
/// reference boundary; the motor starts `Aligned(1)`.
pub struct StepperMotor<D: PhaseDriver> {
    driver: D,
    geometry: Geometry,
    method: FieldMethod,
    microsteps: u16,
    settle_delay: Duration,
    angle: f32,
}

impl<D: PhaseDriver> StepperMotor<D> {
    pub fn new(driver: D, config: MotorConfig) -> Result<Self, MotorError<D::Error>> {
        config.validate()?;
        let mut motor = Self {
            driver,
            geometry: Geometry::new(config.steps_per_revolution, config.num_teeth),
            method: config.field_method,
            microsteps: config.microsteps,
            settle_delay: config.settle_delay,
            angle: 0.0,
        };
        // Pull a rotor tooth onto the reference pole; this is aligned
        // position 1 and defines mechanical 0°.
        motor.issue(FULL_STEP_PATTERN[0])?;
        Ok(motor)
    }

    /// Access the underlying driver, e.g. to inspect a mock in tests.
    pub fn driver(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Current position estimate in degrees, `[0, 360)`.
    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// Whether the rotor sits exactly on a full-step boundary.
    pub fn is_aligned(&self) -> bool {
        let steps = self.angle / self.geometry.step_size;
        fabsf(steps - roundf(steps)) * self.geometry.step_size < ANGLE_EPS
    }

    /// The full-step index (1–4) within the electrical cycle when aligned,
    /// `None` mid-microstep.
    pub fn aligned_position(&self) -> Option<u8> {
        if !self.is_aligned() {
            return None;
        }
        Some((self.geometry.sector_of(self.angle) % 4) as u8 + 1)
    }

    /// Turn the rotor onto the nearest full-step boundary in the given sense
    /// and hold it there with the full-step command for that position. `Cw`
    /// advances to the next boundary, `Ccw` retreats to the previous one,
    /// `Closest` picks the nearer of the two (ties clockwise). No-op when
    /// already aligned.
    pub async fn align_rotor(&mut self, direction: Direction) -> Result<(), MotorError<D::Error>> {
        if self.is_aligned() {
            return Ok(());
        }

        let sector = self.geometry.sector_of(self.angle);
        let ccw_boundary = angle::normalize(sector as f32 * self.geometry.step_size);
        let cw_boundary = angle::normalize((sector + 1) as f32 * self.geometry.step_size);
        let target = match direction {
            Direction::Cw => cw_boundary,
            Direction::Ccw => ccw_boundary,
            Direction::Closest => {
                let cw_delta = angle::normalize(cw_boundary - self.angle);
                let ccw_delta = angle::normalize(self.angle - ccw_boundary);
                if cw_delta <= ccw_delta {
                    cw_boundary
                } else {
                    ccw_boundary
                }
            }
        };

        let position = (self.geometry.sector_of(target) % 4) as u8 + 1;
        log::debug!(
            "aligning rotor {:.3}° -> {:.3}° (position {})",
            self.angle,
            target,
            position
        );
        self.issue(FULL_STEP_PATTERN[(position - 1) as usize])?;
        self.angle = target;
        Timer::after(self.settle_delay).await;
        Ok(())
    }

    /// Position the rotor at `target_angle` (degrees, normalized before use)
    /// with microstepping, suspending for `delay` between microsteps. The
    /// final stored angle equals the normalized target exactly.
    pub async fn set_rotor(
        &mut self,
        target_angle: f32,
        direction: Direction,
        delay: Duration,
    ) -> Result<(), MotorError<D::Error>> {
        let target = angle::normalize(target_angle);
        let direction = direction.resolve(self.angle, target);
        let increment = self.geometry.step_size / self.microsteps as f32;
        let delay = delay.max(self.settle_delay);

        log::info!(
            "positioning rotor {:.3}° -> {:.3}° ({:?})",
            self.angle,
            target,
            direction
        );
        for step_angle in angle::path(self.angle, target, direction, increment) {
            let electrical = self.geometry.electrical_angle_of(step_angle);
            let command = self.method.compute(electrical);
            self.issue(command)?;
            self.angle = step_angle;
            Timer::after(delay).await;
        }
        Ok(())
    }

    /// Spin continuously in full steps: `revolutions` whole turns (fractions
    /// are rounded to whole steps, `f32::INFINITY` spins until the future is
    /// cancelled) at `rpm`. The rotor is aligned in the spin direction before
    /// counting starts. Direction must be `Cw` or `Ccw`.
    ///
    /// Cancellation is cooperative: dropping the future between steps (e.g.
    /// losing a `select` against a stop signal, as [`crate::runner`] does)
    /// leaves the motor aligned on the boundary it last commanded.
    pub async fn spin_rotor(
        &mut self,
        revolutions: f32,
        rpm: f32,
        direction: Direction,
    ) -> Result<(), MotorError<D::Error>> {
        if !(rpm > 0.0) {
            return Err(MotorError::InvalidArgument("rpm must be positive"));
        }
        if !(revolutions >= 0.0) {
            return Err(MotorError::InvalidArgument(
                "revolutions must be non-negative",
            ));
        }
        if direction == Direction::Closest {
            return Err(MotorError::InvalidArgument(
                "spin direction must be cw or ccw",
            ));
        }

        let period = step_period(rpm, self.geometry.steps_per_revolution).max(self.settle_delay);
        let total = if revolutions.is_infinite() {
            None
        } else {
            Some(roundf(revolutions * self.geometry.steps_per_revolution as f32) as u64)
        };
        log::info!(
            "spinning rotor {:?} at {} rpm ({:?} steps, period {:?})",
            direction,
            rpm,
            total,
            period
        );

        self.align_rotor(direction).await?;

        let mut issued: u64 = 0;
        while total.is_none_or(|n| issued < n) {
            self.step_once(direction, period).await?;
            issued += 1;
        }
        Ok(())
    }

    /// Advance one full step from an aligned position and hold the new
    /// full-step command for `period`.
    async fn step_once(
        &mut self,
        direction: Direction,
        period: Duration,
    ) -> Result<(), MotorError<D::Error>> {
        let steps = self.geometry.steps_per_revolution;
        let sector = self.geometry.sector_of(self.angle);
        let next = match direction {
            Direction::Ccw => (sector + steps - 1) % steps,
            _ => (sector + 1) % steps,
        };
        self.issue(FULL_STEP_PATTERN[(next % 4) as usize])?;
        // quantize to the boundary so full revolutions return to the exact
        // starting angle
        self.angle = angle::normalize(next as f32 * self.geometry.step_size);
        Timer::after(period).await;
        Ok(())
    }

    fn issue(&mut self, command: PhaseCommand) -> Result<(), MotorError<D::Error>> {
        self.set_phase(Phase::A, command.a)?;
        self.set_phase(Phase::B, command.b)
    }

    fn set_phase(&mut self, phase: Phase, magnitude: f32) -> Result<(), MotorError<D::Error>> {
        let polarity = if magnitude > 0.0 {
            Polarity::Forward
        } else if magnitude < 0.0 {
            Polarity::Reverse
        } else {
            Polarity::Off
        };
        self.driver
            .set_phase(phase, polarity, fabsf(magnitude))
            .map_err(MotorError::Driver)
    }
}

/// Time per full step at the given speed: `60 / (rpm * steps_per_revolution)`
/// seconds.
pub fn step_period(rpm: f32, steps_per_revolution: u16) -> Duration {
    Duration::from_micros(roundf(60_000_000.0 / (rpm * steps_per_revolution as f32)) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_period_matches_rpm() {
        assert_eq!(step_period(60.0, 200), Duration::from_micros(5_000));
        assert_eq!(step_period(30.0, 200), Duration::from_micros(10_000));
        assert_eq!(step_period(3000.0, 200), Duration::from_micros(100));
    }
}
