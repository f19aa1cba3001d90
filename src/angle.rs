//! Pure angle and sector arithmetic. No hardware state lives here; the motor
//! recomputes sectors and electrical angles from its single stored mechanical
//! angle so the representations cannot drift apart.

use libm::{ceilf, floorf, fmodf};

use crate::Direction;

/// Slack used when comparing float angles against step boundaries, in degrees.
pub(crate) const ANGLE_EPS: f32 = 1e-3;

/// Reduce any angle in degrees into `[0, 360)`.
pub fn normalize(angle: f32) -> f32 {
    let r = fmodf(angle, 360.0);
    if r < 0.0 {
        let r = r + 360.0;
        // fmodf can leave a tiny negative that rounds up to exactly 360.0
        if r >= 360.0 { 0.0 } else { r }
    } else {
        r
    }
}

/// Choose the rotational sense with the shorter path from `current` to
/// `target`. A tie at exactly 180° resolves clockwise.
pub fn shortest_direction(current: f32, target: f32) -> Direction {
    let delta = normalize(target - current);
    if delta <= 180.0 {
        Direction::Cw
    } else {
        Direction::Ccw
    }
}

/// Step geometry derived once from the motor configuration.
#[derive(Debug, PartialEq, Copy, Clone)]
pub struct Geometry {
    pub steps_per_revolution: u16,
    /// Size of one full step in degrees (1.8° for 200 steps/rev).
    pub step_size: f32,
    /// Mechanical angle spanned by one electrical cycle (7.2° for 50 teeth).
    pub tooth_pitch: f32,
}

impl Geometry {
    pub fn new(steps_per_revolution: u16, num_teeth: u16) -> Self {
        Self {
            steps_per_revolution,
            step_size: 360.0 / steps_per_revolution as f32,
            tooth_pitch: 360.0 / num_teeth as f32,
        }
    }

    /// Index of the full-step interval containing `angle`, in
    /// `[0, steps_per_revolution)`. An angle within `ANGLE_EPS` below a
    /// boundary counts as that boundary's sector.
    pub fn sector_of(&self, angle: f32) -> u16 {
        let sector = floorf((normalize(angle) + ANGLE_EPS) / self.step_size) as u16;
        sector % self.steps_per_revolution
    }

    /// Position within the electrical cycle, in `[0, 360)` electrical
    /// degrees. One tooth pitch of mechanical rotation maps onto one full
    /// cycle.
    pub fn electrical_angle_of(&self, angle: f32) -> f32 {
        fmodf(normalize(angle), self.tooth_pitch) * (360.0 / self.tooth_pitch)
    }
}

/// Build the lazy sequence of intermediate angles from `current` to `target`
/// in the commanded sense, stepping by `increment` degrees. The sequence has
/// `ceil(distance / increment)` elements and the last one is forced to equal
/// `target` exactly, so float accumulation can never overshoot. Empty when
/// the two angles coincide.
///
/// `direction` must already be resolved to `Cw` or `Ccw`.
pub fn path(current: f32, target: f32, direction: Direction, increment: f32) -> AngularPath {
    debug_assert!(direction != Direction::Closest);
    debug_assert!(increment > 0.0);

    let start = normalize(current);
    let target = normalize(target);
    let distance = match direction {
        Direction::Ccw => normalize(start - target),
        _ => normalize(target - start),
    };
    let total = if distance == 0.0 {
        0
    } else {
        ceilf(distance / increment) as u32
    };

    AngularPath {
        start,
        target,
        increment,
        direction,
        total,
        index: 0,
    }
}

/// Iterator produced by [`path`]. Yields normalized mechanical angles,
/// monotone modulo 360 in the commanded sense, endpoint inclusive.
#[derive(Debug, Clone)]
pub struct AngularPath {
    start: f32,
    target: f32,
    increment: f32,
    direction: Direction,
    total: u32,
    index: u32,
}

impl Iterator for AngularPath {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.index >= self.total {
            return None;
        }
        self.index += 1;
        if self.index == self.total {
            return Some(self.target);
        }
        let offset = self.increment * self.index as f32;
        let raw = match self.direction {
            Direction::Ccw => self.start - offset,
            _ => self.start + offset,
        };
        Some(normalize(raw))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.total - self.index) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for AngularPath {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_reduces_into_range() {
        for a in [-720.5, -360.0, -1.0, 0.0, 1.8, 359.9, 360.0, 725.3] {
            let n = normalize(a);
            assert!((0.0..360.0).contains(&n), "normalize({a}) = {n}");
            // idempotence
            assert_eq!(normalize(n), n);
        }
        assert_eq!(normalize(-90.0), 270.0);
        assert_eq!(normalize(405.5), 45.5);
    }

    #[test]
    fn sector_lookup() {
        let g = Geometry::new(200, 50);
        assert_eq!(g.sector_of(0.0), 0);
        assert_eq!(g.sector_of(1.7), 0);
        assert_eq!(g.sector_of(1.8), 1);
        assert_eq!(g.sector_of(45.0), 25);
        assert_eq!(g.sector_of(44.0), 24);
        assert_eq!(g.sector_of(359.9), 199);
    }

    #[test]
    fn electrical_angle_spans_one_tooth_pitch() {
        let g = Geometry::new(200, 50);
        assert_eq!(g.electrical_angle_of(0.0), 0.0);
        assert!((g.electrical_angle_of(1.8) - 90.0).abs() < 1e-3);
        assert!((g.electrical_angle_of(3.6) - 180.0).abs() < 1e-3);
        assert!((g.electrical_angle_of(5.4) - 270.0).abs() < 1e-3);
        // one full tooth pitch wraps back to the start of the cycle
        assert!(g.electrical_angle_of(7.2) < 1e-3 || g.electrical_angle_of(7.2) > 360.0 - 1e-3);
        assert!((g.electrical_angle_of(45.5) - 115.0).abs() < 1e-2);
    }

    #[test]
    fn shortest_direction_picks_the_short_way() {
        assert_eq!(shortest_direction(0.0, 10.0), Direction::Cw);
        assert_eq!(shortest_direction(10.0, 350.0), Direction::Ccw);
        assert_eq!(shortest_direction(350.0, 10.0), Direction::Cw);
        // tie at exactly 180° resolves clockwise
        assert_eq!(shortest_direction(0.0, 180.0), Direction::Cw);
    }

    #[test]
    fn path_is_endpoint_inclusive_and_exact() {
        let steps: Vec<f32> = path(0.0, 9.0, Direction::Cw, 1.8).collect();
        assert_eq!(steps.len(), 5);
        assert_eq!(*steps.last().unwrap(), 9.0);

        let increment = 1.8 / 16.0;
        let steps: Vec<f32> = path(0.0, 45.5, Direction::Cw, increment).collect();
        assert_eq!(steps.len(), 405); // ceil(45.5 / 0.1125)
        assert_eq!(*steps.last().unwrap(), 45.5);
    }

    #[test]
    fn path_is_monotone_modulo_360() {
        // clockwise across the 0° seam
        let steps: Vec<f32> = path(350.0, 10.0, Direction::Cw, 1.8).collect();
        assert_eq!(steps.len(), 12); // ceil(20 / 1.8)
        let mut travelled = 0.0;
        let mut prev = 350.0;
        for s in &steps {
            let delta = normalize(s - prev);
            assert!(delta > 0.0 && delta <= 1.8 + 1e-3);
            travelled += delta;
            prev = *s;
        }
        assert!((travelled - 20.0).abs() < 1e-2);
        assert_eq!(*steps.last().unwrap(), 10.0);

        // counter-clockwise
        let steps: Vec<f32> = path(10.0, 350.0, Direction::Ccw, 1.8).collect();
        assert_eq!(steps.len(), 12);
        assert_eq!(*steps.last().unwrap(), 350.0);
    }

    #[test]
    fn zero_length_path_is_empty() {
        assert_eq!(path(45.0, 45.0, Direction::Cw, 1.8).count(), 0);
        assert_eq!(path(0.0, 360.0, Direction::Ccw, 1.8).count(), 0);
    }
}
