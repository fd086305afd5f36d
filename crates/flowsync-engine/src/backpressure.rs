//! Queue-depth admission control with hysteresis.
//!
//! The controller tracks the observed live queue depth against three
//! thresholds. Once the state leaves `accepting` it only returns after the
//! depth drops all the way to the low-water mark, preventing flapping around
//! the high-water boundary.

use std::sync::Mutex;

use serde::Serialize;

/// Admission thresholds: `low_water <= high_water <= max_depth`.
#[derive(Debug, Clone, Copy)]
pub struct BackpressureThresholds {
    pub low_water: i64,
    pub high_water: i64,
    pub max_depth: i64,
}

impl Default for BackpressureThresholds {
    fn default() -> Self {
        Self {
            low_water: 200,
            high_water: 800,
            max_depth: 1000,
        }
    }
}

/// Admission state derived from queue depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionState {
    Accepting,
    Pressured,
    Rejecting,
}

/// Depth-driven admission state machine.
pub struct BackpressureController {
    thresholds: BackpressureThresholds,
    state: Mutex<AdmissionState>,
}

impl BackpressureController {
    pub fn new(thresholds: BackpressureThresholds) -> Self {
        Self {
            thresholds,
            state: Mutex::new(AdmissionState::Accepting),
        }
    }

    /// Feed an observed depth and return the resulting state.
    pub fn observe(&self, depth: i64) -> AdmissionState {
        let t = self.thresholds;
        let mut state = self.state.lock().expect("backpressure lock poisoned");

        *state = match (*state, depth) {
            (_, d) if d >= t.max_depth => AdmissionState::Rejecting,
            (_, d) if d <= t.low_water => AdmissionState::Accepting,
            // Between the watermarks: accepting stays accepting until the
            // high-water mark is crossed; pressured/rejecting stay pressured
            // until the depth falls to the low-water mark.
            (AdmissionState::Accepting, d) if d < t.high_water => AdmissionState::Accepting,
            _ => AdmissionState::Pressured,
        };

        *state
    }

    /// Whether new publications are admitted in the current state.
    pub fn can_accept(&self) -> bool {
        *self.state.lock().expect("backpressure lock poisoned") != AdmissionState::Rejecting
    }

    pub fn state(&self) -> AdmissionState {
        *self.state.lock().expect("backpressure lock poisoned")
    }
}

impl Default for BackpressureController {
    fn default() -> Self {
        Self::new(BackpressureThresholds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> BackpressureController {
        BackpressureController::new(BackpressureThresholds {
            low_water: 200,
            high_water: 800,
            max_depth: 1000,
        })
    }

    #[test]
    fn starts_accepting() {
        let c = controller();
        assert_eq!(c.state(), AdmissionState::Accepting);
        assert!(c.can_accept());
    }

    #[test]
    fn stays_accepting_below_high_water() {
        let c = controller();
        assert_eq!(c.observe(500), AdmissionState::Accepting);
        assert_eq!(c.observe(799), AdmissionState::Accepting);
        assert!(c.can_accept());
    }

    #[test]
    fn high_water_moves_to_pressured_but_still_accepts() {
        let c = controller();
        assert_eq!(c.observe(800), AdmissionState::Pressured);
        assert!(c.can_accept());
    }

    #[test]
    fn max_depth_rejects() {
        let c = controller();
        assert_eq!(c.observe(1000), AdmissionState::Rejecting);
        assert!(!c.can_accept());
    }

    #[test]
    fn hysteresis_holds_pressured_between_watermarks() {
        let c = controller();
        c.observe(900);
        assert_eq!(c.state(), AdmissionState::Pressured);

        // Dropping below high water is not enough.
        assert_eq!(c.observe(500), AdmissionState::Pressured);
        assert_eq!(c.observe(201), AdmissionState::Pressured);

        // Only the low-water mark releases the pressure.
        assert_eq!(c.observe(200), AdmissionState::Accepting);
    }

    #[test]
    fn rejecting_relaxes_to_pressured_then_accepting() {
        let c = controller();
        c.observe(1200);
        assert!(!c.can_accept());

        assert_eq!(c.observe(950), AdmissionState::Pressured);
        assert!(c.can_accept());

        assert_eq!(c.observe(150), AdmissionState::Accepting);
    }

    #[test]
    fn accepting_band_does_not_trip_on_mid_depths() {
        let c = controller();
        // Never crossed high water, so mid-band depths keep accepting.
        assert_eq!(c.observe(400), AdmissionState::Accepting);
        assert_eq!(c.observe(600), AdmissionState::Accepting);
    }
}
