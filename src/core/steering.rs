//! Upstream decision layer: derives the 2-value steering command from
//! bilateral odor asymmetry, and classifies approach odor exposure into a
//! discrete mating decision.

use crate::body::ControlError;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Odor channels: attractive first, aversive second.
pub const ODOR_CHANNELS: usize = 2;

/// Relative sensitivities of the two detectors per side (palp, antenna).
pub const DETECTOR_WEIGHTS: [f64; 2] = [120.0, 1200.0];

const ASYMMETRY_EPS: f64 = 1e-6;

/// How the "reached odor source" latch releases.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ReachedLatch {
    /// Release on the first sub-threshold reading.
    Eager,
    /// Release only after the intensity stays sub-threshold for this long
    /// (seconds of decision time).
    Sticky { release_after: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdorTaxisConfig {
    /// Per-channel gains applied to the asymmetry vector.
    pub odor_gains: [f64; ODOR_CHANNELS],
    /// Attractive-channel intensity on either side beyond this means the
    /// source is reached; steering drops to zero.
    pub odor_threshold: f64,
    /// Steering is re-derived at this cadence, slower than the physics tick.
    pub decision_interval: f64,
    pub reached_latch: ReachedLatch,
}

impl Default for OdorTaxisConfig {
    fn default() -> Self {
        Self {
            odor_gains: [-500.0, 80.0],
            odor_threshold: 0.15,
            decision_interval: 0.05,
            reached_latch: ReachedLatch::Eager,
        }
    }
}

/// Derives steering commands from raw odor intensities. Holds only the
/// reached-source latch between calls.
#[derive(Debug, Clone)]
pub struct OdorTaxis {
    cfg: OdorTaxisConfig,
    reached: bool,
    below_for: f64,
    reached_transitions: u32,
}

impl OdorTaxis {
    pub fn new(cfg: OdorTaxisConfig) -> Self {
        Self {
            cfg,
            reached: false,
            below_for: 0.0,
            reached_transitions: 0,
        }
    }

    pub fn config(&self) -> &OdorTaxisConfig {
        &self.cfg
    }

    pub fn reached_source(&self) -> bool {
        self.reached
    }

    /// How many times the latch has transitioned to "reached". Stays at one
    /// per contiguous exceedance.
    pub fn reached_transitions(&self) -> u32 {
        self.reached_transitions
    }

    /// Physics substeps per steering decision at the given timestep.
    pub fn substeps_per_decision(&self, timestep: f64) -> usize {
        (self.cfg.decision_interval / timestep).round() as usize
    }

    pub fn reset(&mut self) {
        self.reached = false;
        self.below_for = 0.0;
        self.reached_transitions = 0;
    }

    /// Map raw odor intensities into the 2-value steering command.
    ///
    /// `odor_intensity` is [channel][detector][side] flattened, so 8 values
    /// for the attractive/aversive pair.
    pub fn steering_command(&mut self, odor_intensity: &[f64]) -> Result<[f64; 2], ControlError> {
        let sides = side_intensities(odor_intensity)?;

        // Left-right asymmetry per channel, epsilon-guarded. The exact-zero
        // check is a second guard in case the epsilon cancels out.
        let mut delta = [0.0; ODOR_CHANNELS];
        for (ch, &[left, right]) in sides.iter().enumerate() {
            let mut denom = (left + right) / 2.0 + ASYMMETRY_EPS;
            if denom == 0.0 {
                denom = 1.0;
            }
            delta[ch] = (left - right) / denom;
        }

        let s: f64 = self
            .cfg
            .odor_gains
            .iter()
            .zip(delta)
            .map(|(g, d)| g * d)
            .sum();
        let bias = (s * s).tanh();

        let mut command = [1.0, 1.0];
        let side_to_modulate = usize::from(s > 0.0);
        command[side_to_modulate] -= bias * 0.8;

        // Zero bias means walk straight with no drive at all, not [1, 1].
        if bias == 0.0 {
            command = [0.0, 0.0];
        }

        // Reached-source latch on the attractive channel.
        let [attr_left, attr_right] = sides[0];
        if attr_left > self.cfg.odor_threshold || attr_right > self.cfg.odor_threshold {
            command = [0.0, 0.0];
            self.below_for = 0.0;
            if !self.reached {
                self.reached = true;
                self.reached_transitions += 1;
                info!(
                    attractive_left = attr_left,
                    attractive_right = attr_right,
                    "reached odor source"
                );
            }
        } else if self.reached {
            match self.cfg.reached_latch {
                ReachedLatch::Eager => self.reached = false,
                ReachedLatch::Sticky { release_after } => {
                    self.below_for += self.cfg.decision_interval;
                    if self.below_for >= release_after {
                        self.reached = false;
                    }
                }
            }
        }

        Ok(command)
    }
}

/// One of five discrete readings of approach odor exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApproachDecision {
    Reject,
    Accept,
    FlyCloseButNoDecision,
    FlyNearby,
    NoFlyNearby,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApproachConfig {
    /// Detection thresholds per channel (attractive, aversive).
    pub odor_thresholds: [f64; ODOR_CHANNELS],
    /// Baseline intensity of the fly's own odor; accept requires exceeding
    /// this plus a fixed margin.
    pub own_smelling: f64,
    /// Exposure time required before committing to a decision, in seconds.
    pub time_before_decision: f64,
}

impl Default for ApproachConfig {
    fn default() -> Self {
        Self {
            odor_thresholds: [0.119, 0.03],
            own_smelling: 0.1,
            time_before_decision: 1.0,
        }
    }
}

/// Classifies approach odor exposure over time. The exposure timer is the
/// only state; it resets whenever both channels fall below threshold.
#[derive(Debug, Clone)]
pub struct ApproachClassifier {
    cfg: ApproachConfig,
    time_since_odor_high: f64,
}

impl ApproachClassifier {
    pub fn new(cfg: ApproachConfig) -> Self {
        Self {
            cfg,
            time_since_odor_high: 0.0,
        }
    }

    pub fn exposure_time(&self) -> f64 {
        self.time_since_odor_high
    }

    pub fn reset(&mut self) {
        self.time_since_odor_high = 0.0;
    }

    /// Classify the current tick's odor intensities. `elapsed` is the time
    /// since the previous call, in seconds.
    pub fn classify(
        &mut self,
        odor_intensity: &[f64],
        elapsed: f64,
    ) -> Result<ApproachDecision, ControlError> {
        let sides = side_intensities(odor_intensity)?;
        // Average the two sides per channel.
        let attractive = (sides[0][0] + sides[0][1]) / 2.0;
        let aversive = (sides[1][0] + sides[1][1]) / 2.0;

        if attractive > self.cfg.odor_thresholds[0] || aversive > self.cfg.odor_thresholds[1] {
            self.time_since_odor_high += elapsed;
            if self.time_since_odor_high >= self.cfg.time_before_decision {
                if aversive > 0.0 {
                    Ok(ApproachDecision::Reject)
                } else if attractive > self.cfg.own_smelling + 0.01 {
                    Ok(ApproachDecision::Accept)
                } else {
                    Ok(ApproachDecision::FlyCloseButNoDecision)
                }
            } else {
                Ok(ApproachDecision::FlyNearby)
            }
        } else {
            self.time_since_odor_high = 0.0;
            Ok(ApproachDecision::NoFlyNearby)
        }
    }
}

/// Collapse the raw intensity array into per-channel (left, right) pairs
/// using the fixed detector weights.
fn side_intensities(odor_intensity: &[f64]) -> Result<[[f64; 2]; ODOR_CHANNELS], ControlError> {
    let expected = ODOR_CHANNELS * DETECTOR_WEIGHTS.len() * 2;
    if odor_intensity.len() != expected {
        return Err(ControlError::Shape(format!(
            "odor intensity must have {expected} values, got {}",
            odor_intensity.len()
        )));
    }

    let weight_sum: f64 = DETECTOR_WEIGHTS.iter().sum();
    let mut out = [[0.0; 2]; ODOR_CHANNELS];
    for ch in 0..ODOR_CHANNELS {
        for side in 0..2 {
            let mut acc = 0.0;
            for (det, w) in DETECTOR_WEIGHTS.iter().enumerate() {
                acc += w * odor_intensity[ch * 4 + det * 2 + side];
            }
            out[ch][side] = acc / weight_sum;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intensities(attr_l: f64, attr_r: f64, avers_l: f64, avers_r: f64) -> Vec<f64> {
        // Both detectors on a side read the same value.
        vec![
            attr_l, attr_r, attr_l, attr_r, // attractive: palp L/R, antenna L/R
            avers_l, avers_r, avers_l, avers_r, // aversive
        ]
    }

    #[test]
    fn asymmetry_is_antisymmetric() {
        let mut taxis = OdorTaxis::new(OdorTaxisConfig::default());
        let a = taxis.steering_command(&intensities(0.08, 0.02, 0.0, 0.0)).unwrap();
        let b = taxis.steering_command(&intensities(0.02, 0.08, 0.0, 0.0)).unwrap();
        // Swapping sides flips which command component gets suppressed, with
        // the same modulation amount.
        assert!((a[0] - b[1]).abs() < 1e-12);
        assert!((a[1] - b[0]).abs() < 1e-12);
        assert_ne!(a[0], a[1]);
    }

    #[test]
    fn zero_bias_yields_zero_vector() {
        let mut taxis = OdorTaxis::new(OdorTaxisConfig::default());
        // Perfectly symmetric input: s == 0, b == 0.
        let cmd = taxis.steering_command(&intensities(0.0, 0.0, 0.0, 0.0)).unwrap();
        assert_eq!(cmd, [0.0, 0.0]);
    }

    #[test]
    fn asymmetric_input_suppresses_one_side() {
        let mut taxis = OdorTaxis::new(OdorTaxisConfig::default());
        let cmd = taxis.steering_command(&intensities(0.1, 0.02, 0.0, 0.0)).unwrap();
        // Attractive gain is negative, so stronger left smell gives s < 0 and
        // suppresses index 0, turning toward the source.
        assert!(cmd[0] < 1.0);
        assert_eq!(cmd[1], 1.0);
        assert!(cmd[0] >= 1.0 - 0.8);
    }

    #[test]
    fn reached_source_latch_fires_once_per_exceedance() {
        let mut taxis = OdorTaxis::new(OdorTaxisConfig::default());
        let above = intensities(0.2, 0.2, 0.0, 0.0);
        let below = intensities(0.01, 0.02, 0.0, 0.0);

        for _ in 0..5 {
            let cmd = taxis.steering_command(&above).unwrap();
            assert_eq!(cmd, [0.0, 0.0]);
        }
        assert!(taxis.reached_source());
        assert_eq!(taxis.reached_transitions(), 1);

        // Eager release on the first sub-threshold reading.
        taxis.steering_command(&below).unwrap();
        assert!(!taxis.reached_source());

        taxis.steering_command(&above).unwrap();
        assert_eq!(taxis.reached_transitions(), 2);
    }

    #[test]
    fn sticky_latch_requires_sustained_absence() {
        let cfg = OdorTaxisConfig {
            reached_latch: ReachedLatch::Sticky { release_after: 0.2 },
            ..OdorTaxisConfig::default()
        };
        let mut taxis = OdorTaxis::new(cfg);
        let above = intensities(0.2, 0.2, 0.0, 0.0);
        let below = intensities(0.01, 0.01, 0.0, 0.0);

        taxis.steering_command(&above).unwrap();
        assert!(taxis.reached_source());

        // 0.05 s per decision: three sub-threshold readings are not enough.
        for _ in 0..3 {
            taxis.steering_command(&below).unwrap();
            assert!(taxis.reached_source());
        }
        taxis.steering_command(&below).unwrap();
        assert!(!taxis.reached_source());
    }

    #[test]
    fn wrong_intensity_shape_is_a_shape_error() {
        let mut taxis = OdorTaxis::new(OdorTaxisConfig::default());
        let err = taxis.steering_command(&[0.0; 5]).unwrap_err();
        assert!(matches!(err, ControlError::Shape(_)));
    }

    #[test]
    fn classify_accept_after_sustained_attractive_exposure() {
        let mut clf = ApproachClassifier::new(ApproachConfig::default());
        let input = intensities(0.2, 0.2, 0.0, 0.0);
        let mut last = ApproachDecision::NoFlyNearby;
        for _ in 0..25 {
            last = clf.classify(&input, 0.05).unwrap();
        }
        assert_eq!(last, ApproachDecision::Accept);
    }

    #[test]
    fn classify_rejects_on_any_aversive_trace() {
        let mut clf = ApproachClassifier::new(ApproachConfig::default());
        let input = intensities(0.2, 0.2, 0.05, 0.05);
        let mut last = ApproachDecision::NoFlyNearby;
        for _ in 0..25 {
            last = clf.classify(&input, 0.05).unwrap();
        }
        assert_eq!(last, ApproachDecision::Reject);
    }

    #[test]
    fn classify_nearby_before_decision_time() {
        let mut clf = ApproachClassifier::new(ApproachConfig::default());
        let input = intensities(0.2, 0.2, 0.0, 0.0);
        assert_eq!(
            clf.classify(&input, 0.05).unwrap(),
            ApproachDecision::FlyNearby
        );
    }

    #[test]
    fn classify_close_but_undecided_without_accept_margin() {
        // Above detection threshold but below own_smelling + margin.
        let cfg = ApproachConfig {
            own_smelling: 0.15,
            ..ApproachConfig::default()
        };
        let mut clf = ApproachClassifier::new(cfg);
        let input = intensities(0.13, 0.13, 0.0, 0.0);
        let mut last = ApproachDecision::NoFlyNearby;
        for _ in 0..25 {
            last = clf.classify(&input, 0.05).unwrap();
        }
        assert_eq!(last, ApproachDecision::FlyCloseButNoDecision);
    }

    #[test]
    fn sub_threshold_input_resets_the_exposure_timer() {
        let mut clf = ApproachClassifier::new(ApproachConfig::default());
        let strong = intensities(0.2, 0.2, 0.0, 0.0);
        let weak = intensities(0.05, 0.05, 0.0, 0.0);

        for _ in 0..10 {
            clf.classify(&strong, 0.05).unwrap();
        }
        assert!(clf.exposure_time() > 0.0);

        assert_eq!(
            clf.classify(&weak, 0.05).unwrap(),
            ApproachDecision::NoFlyNearby
        );
        assert_eq!(clf.exposure_time(), 0.0);

        // Accumulation starts over after the reset.
        assert_eq!(
            clf.classify(&strong, 0.05).unwrap(),
            ApproachDecision::FlyNearby
        );
    }
}
