//! Mapping from electrical angle to phase currents.
//!
//! Full-stepping cycles through four electrical states, `(+1, 0)`, `(0, +1)`,
//! `(-1, 0)`, `(0, -1)`; microstepping walks the same cycle in finer
//! increments. The interesting part is what to command in between: the stator
//! poles of the two phases sit 45° apart, not 90°, so the textbook sinusoidal
//! waveform only lands exactly at full- and half-step positions. In between,
//! the resulting field wobbles in both magnitude and direction. The geometric
//! method instead decomposes the desired field vector onto the two pole
//! directions that bracket it, which keeps the field magnitude constant at
//! every microstep position.

use core::str::FromStr;

use libm::{cosf, fabsf, floorf, sinf};

use crate::ConfigError;
use crate::angle::{self, ANGLE_EPS};

/// Angular separation between the pole axes of the two phases, from the motor
/// geometry: poles of one phase sit 90° apart, poles of different phases are
/// interleaved halfway between.
const PHASE_SEPARATION_DEG: f32 = 45.0;

/// Signed current fractions for the two phases, each in `[-1.0, 1.0]`. Sign
/// selects H-bridge polarity, magnitude is the PWM duty fraction. Commands are
/// produced fresh for every step and never stored.
#[derive(Debug, PartialEq, Copy, Clone)]
pub struct PhaseCommand {
    pub a: f32,
    pub b: f32,
}

/// How intermediate microstep currents are derived from the electrical angle.
/// Chosen once at construction and fixed for the life of the motor.
#[derive(Debug, PartialEq, Copy, Clone)]
pub enum FieldMethod {
    /// `a = cos θ, b = sin θ`. Assumes orthogonal pole axes; exact at full
    /// and half steps, approximate in between.
    Sinusoidal,
    /// Decomposition onto the non-orthogonal 45° pole basis. The basis matrix
    /// inverse is computed once here and reused for every command.
    Geometric { inverse: [[f32; 2]; 2] },
}

impl Default for FieldMethod {
    fn default() -> Self {
        FieldMethod::Sinusoidal
    }
}

impl FieldMethod {
    /// Build the geometric method, inverting the pole-direction basis for the
    /// fixed 45° separation.
    pub fn geometric() -> Self {
        let rad = PHASE_SEPARATION_DEG.to_radians();
        let (ax, ay) = (1.0, 0.0);
        let (bx, by) = (cosf(rad), sinf(rad));
        let det = ax * by - ay * bx;
        FieldMethod::Geometric {
            inverse: [[by / det, -bx / det], [-ay / det, ax / det]],
        }
    }

    /// Phase currents for an electrical angle in degrees.
    ///
    /// Both variants keep `max(|a|, |b|) <= 1.0` for every angle. At the four
    /// cardinal angles the exact full-step commands are returned so that
    /// full- and half-step positions carry no float fuzz.
    pub fn compute(&self, electrical_angle: f32) -> PhaseCommand {
        let theta = angle::normalize(electrical_angle);

        if let Some(command) = cardinal_command(theta) {
            return command;
        }

        match self {
            FieldMethod::Sinusoidal => {
                let rad = theta.to_radians();
                PhaseCommand {
                    a: cosf(rad),
                    b: sinf(rad),
                }
            }
            FieldMethod::Geometric { inverse } => {
                // 90° of electrical angle sweeps the field across one 45°
                // pole gap, so work within the current quarter cycle.
                let quarter = floorf(theta / 90.0) as u8;
                let frac = (theta - quarter as f32 * 90.0) / 90.0;
                let phi = frac * PHASE_SEPARATION_DEG.to_radians();

                // Decompose the unit field vector onto the bracketing pole
                // pair: `ccw` is the coefficient along the pole behind the
                // field, `cw` along the pole ahead of it.
                let (tx, ty) = (cosf(phi), sinf(phi));
                let ccw = inverse[0][0] * tx + inverse[0][1] * ty;
                let cw = inverse[1][0] * tx + inverse[1][1] * ty;

                // Which physical pole pair brackets the field depends on the
                // quarter; pole polarities alternate, hence the sign flips.
                match quarter {
                    0 => PhaseCommand { a: ccw, b: cw },
                    1 => PhaseCommand { a: -cw, b: ccw },
                    2 => PhaseCommand { a: -ccw, b: -cw },
                    _ => PhaseCommand { a: cw, b: -ccw },
                }
            }
        }
    }
}

/// The four aligned electrical states, one phase fully on and the other off.
fn cardinal_command(theta: f32) -> Option<PhaseCommand> {
    const CARDINALS: [(f32, PhaseCommand); 5] = [
        (0.0, PhaseCommand { a: 1.0, b: 0.0 }),
        (90.0, PhaseCommand { a: 0.0, b: 1.0 }),
        (180.0, PhaseCommand { a: -1.0, b: 0.0 }),
        (270.0, PhaseCommand { a: 0.0, b: -1.0 }),
        (360.0, PhaseCommand { a: 1.0, b: 0.0 }),
    ];
    CARDINALS
        .iter()
        .find(|(c, _)| fabsf(theta - c) < ANGLE_EPS)
        .map(|(_, command)| *command)
}

impl FromStr for FieldMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s {
            "sinusoidal" => Ok(FieldMethod::Sinusoidal),
            "geometric" => Ok(FieldMethod::geometric()),
            _ => Err(ConfigError::UnknownFieldMethod),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Undo the quarter sign/permutation mapping and rebuild the field vector
    /// in the bracketing-pole basis: two unit axes 45° apart, `ccw` on the
    /// pole behind the field and `cw` on the pole ahead of it. For a correct
    /// decomposition this must be a unit vector at the in-quarter field angle.
    fn field_in_quarter(theta: f32, command: PhaseCommand) -> (f32, f32) {
        let quarter = (theta / 90.0).floor() as u8 % 4;
        let (ccw, cw) = match quarter {
            0 => (command.a, command.b),
            1 => (command.b, -command.a),
            2 => (-command.a, -command.b),
            _ => (-command.b, command.a),
        };
        let sep = PHASE_SEPARATION_DEG.to_radians();
        (ccw + cw * sep.cos(), cw * sep.sin())
    }

    #[test]
    fn cardinal_angles_are_exact() {
        for method in [FieldMethod::Sinusoidal, FieldMethod::geometric()] {
            assert_eq!(method.compute(0.0), PhaseCommand { a: 1.0, b: 0.0 });
            assert_eq!(method.compute(90.0), PhaseCommand { a: 0.0, b: 1.0 });
            assert_eq!(method.compute(180.0), PhaseCommand { a: -1.0, b: 0.0 });
            assert_eq!(method.compute(270.0), PhaseCommand { a: 0.0, b: -1.0 });
            assert_eq!(method.compute(360.0), PhaseCommand { a: 1.0, b: 0.0 });
        }
    }

    #[test]
    fn magnitudes_never_exceed_unity() {
        for method in [FieldMethod::Sinusoidal, FieldMethod::geometric()] {
            for i in 0..3600 {
                let theta = i as f32 * 0.1;
                let command = method.compute(theta);
                assert!(
                    command.a.abs() <= 1.0 + 1e-4 && command.b.abs() <= 1.0 + 1e-4,
                    "{method:?} out of range at {theta}: {command:?}"
                );
            }
        }
    }

    #[test]
    fn geometric_field_magnitude_is_constant() {
        let method = FieldMethod::geometric();
        for i in 0..3600 {
            let theta = i as f32 * 0.1;
            let (fx, fy) = field_in_quarter(theta, method.compute(theta));
            let magnitude = (fx * fx + fy * fy).sqrt();
            assert!(
                (magnitude - 1.0).abs() < 1e-3,
                "field magnitude {magnitude} at {theta}"
            );
        }
    }

    #[test]
    fn geometric_field_tracks_half_the_electrical_angle() {
        // 90° of electrical angle sweeps the field 45° across the pole gap.
        let method = FieldMethod::geometric();
        for i in 1..360 {
            let theta = i as f32;
            let (fx, fy) = field_in_quarter(theta, method.compute(theta));
            let field_angle = fy.atan2(fx).to_degrees();
            let expected = (theta % 90.0) / 2.0;
            assert!(
                (field_angle - expected).abs() < 0.1,
                "field at {field_angle}° for electrical {theta}°, expected {expected}°"
            );
        }
    }

    #[test]
    fn sinusoidal_field_magnitude_drifts_between_steps() {
        // The defining difference between the two methods: at 45° electrical
        // the sinusoidal approximation over-drives the field.
        let (fx, fy) = field_in_quarter(45.0, FieldMethod::Sinusoidal.compute(45.0));
        let magnitude = (fx * fx + fy * fy).sqrt();
        assert!(magnitude > 1.2);
    }

    #[test]
    fn parses_method_names() {
        assert_eq!("sinusoidal".parse(), Ok(FieldMethod::Sinusoidal));
        assert_eq!("geometric".parse(), Ok(FieldMethod::geometric()));
        assert_eq!(
            "trapezoidal".parse::<FieldMethod>(),
            Err(ConfigError::UnknownFieldMethod)
        );
    }
}
