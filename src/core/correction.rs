//! Reflex-like correction estimator: per-leg retraction and stumbling
//! amounts, charged and discharged at configured rates from the current
//! observation.

use crate::body::{
    ControlError, LegGroup, LegIndex, Observation, Segment, SensorPlacement, LEG_COUNT, LEG_DOF,
};
use serde::{Deserialize, Serialize};

/// Increment/decrement rates in amount per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrectionRates {
    pub increment: f64,
    pub decrement: f64,
}

/// Per-group joint offset directions. The net correction amount scales these
/// onto the nominal joint angles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionVectors {
    pub front: [f64; LEG_DOF],
    pub middle: [f64; LEG_DOF],
    pub hind: [f64; LEG_DOF],
}

impl CorrectionVectors {
    pub fn for_group(&self, group: LegGroup) -> &[f64; LEG_DOF] {
        match group {
            LegGroup::Front => &self.front,
            LegGroup::Middle => &self.middle,
            LegGroup::Hind => &self.hind,
        }
    }
}

impl Default for CorrectionVectors {
    fn default() -> Self {
        Self {
            front: [0.0, 0.0, 0.0, -0.02, 0.0, 0.016, 0.0],
            middle: [-0.015, 0.0, 0.0, 0.004, 0.0, 0.01, -0.008],
            hind: [0.0, 0.0, 0.0, -0.01, 0.0, 0.005, 0.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionConfig {
    pub retraction_rates: CorrectionRates,
    pub stumbling_rates: CorrectionRates,
    /// Height margin (body-relative) by which the deepest end effector must
    /// stand out from the third-deepest before retraction triggers.
    pub retraction_margin: f64,
    /// Force projections onto the heading below this value count as a
    /// backward push (stumble). Negative.
    pub stumbling_force_threshold: f64,
    /// Distal segments whose contact sensors feed the stumbling rule.
    pub stumble_segments: Vec<Segment>,
    pub correction_vectors: CorrectionVectors,
    /// Record per-leg rule activity for debugging/visualization.
    pub draw_corrections: bool,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            retraction_rates: CorrectionRates {
                increment: 500.0,
                decrement: 1000.0 / 3.0,
            },
            stumbling_rates: CorrectionRates {
                increment: 2000.0,
                decrement: 500.0,
            },
            retraction_margin: 0.05,
            stumbling_force_threshold: -1.0,
            stumble_segments: vec![Segment::Tibia, Segment::Tarsus1, Segment::Tarsus2],
            correction_vectors: CorrectionVectors::default(),
            draw_corrections: false,
        }
    }
}

/// Debug color code for one leg's rule state: green while the rule fires,
/// red while its amount decays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionViz {
    Active,
    Decaying,
}

#[derive(Debug, Clone, Default)]
pub struct VizState {
    pub retraction: [Option<CorrectionViz>; LEG_COUNT],
    pub stumbling: [Option<CorrectionViz>; LEG_COUNT],
}

#[derive(Debug, Clone)]
pub struct CorrectionEstimator {
    cfg: CorrectionConfig,
    /// Contact-force indices per leg, restricted to the stumble segments.
    stumbling_sensors: [Vec<usize>; LEG_COUNT],
    retraction: [f64; LEG_COUNT],
    stumbling: [f64; LEG_COUNT],
    viz: VizState,
}

impl CorrectionEstimator {
    /// Resolve stumbling sensor indices from the declared placements.
    /// Fails eagerly if any leg lacks a sensor on any stumble segment.
    pub fn new(
        cfg: CorrectionConfig,
        placements: &[SensorPlacement],
    ) -> Result<Self, ControlError> {
        let mut stumbling_sensors: [Vec<usize>; LEG_COUNT] = Default::default();
        for (i, p) in placements.iter().enumerate() {
            if cfg.stumble_segments.contains(&p.segment) {
                stumbling_sensors[p.leg.as_usize()].push(i);
            }
        }
        for leg in LegIndex::ALL {
            let found = stumbling_sensors[leg.as_usize()].len();
            if found != cfg.stumble_segments.len() {
                return Err(ControlError::Configuration(format!(
                    "leg {} has {found} stumble sensors, need {} (contact detection must \
                     cover every stumble segment on every leg)",
                    leg.tag(),
                    cfg.stumble_segments.len()
                )));
            }
        }
        Ok(Self {
            cfg,
            stumbling_sensors,
            retraction: [0.0; LEG_COUNT],
            stumbling: [0.0; LEG_COUNT],
            viz: VizState::default(),
        })
    }

    pub fn config(&self) -> &CorrectionConfig {
        &self.cfg
    }

    pub fn retraction_amounts(&self) -> &[f64; LEG_COUNT] {
        &self.retraction
    }

    pub fn stumbling_amounts(&self) -> &[f64; LEG_COUNT] {
        &self.stumbling
    }

    pub fn viz(&self) -> &VizState {
        &self.viz
    }

    /// Zero all stored amounts. Called on episode reset.
    pub fn reset(&mut self) {
        self.retraction = [0.0; LEG_COUNT];
        self.stumbling = [0.0; LEG_COUNT];
        self.viz = VizState::default();
    }

    /// Retraction rule: the leg whose end effector hangs deepest below the
    /// body, if it stands out from the third-deepest by more than the margin.
    /// Ties resolve by stable sort order.
    pub fn retraction_target(&self, obs: &Observation) -> Option<usize> {
        let body_z = obs.fly_position[2];
        let mut depth = [0.0; LEG_COUNT];
        for (i, ee) in obs.end_effector_positions.iter().enumerate() {
            depth[i] = body_z - ee[2];
        }
        let mut order: Vec<usize> = (0..LEG_COUNT).collect();
        order.sort_by(|&a, &b| depth[a].partial_cmp(&depth[b]).unwrap_or(std::cmp::Ordering::Equal));
        let deepest = order[LEG_COUNT - 1];
        let third = order[LEG_COUNT - 3];
        if depth[deepest] > depth[third] + self.cfg.retraction_margin {
            Some(deepest)
        } else {
            None
        }
    }

    /// Stumbling rule: any contact force on the leg's distal segments
    /// projecting backward along the heading beyond the threshold.
    pub fn stumbling_condition(&self, obs: &Observation, leg: LegIndex) -> bool {
        let heading = obs.fly_orientation;
        self.stumbling_sensors[leg.as_usize()].iter().any(|&idx| {
            let f = obs.contact_forces[idx];
            let proj = f[0] * heading[0] + f[1] * heading[1] + f[2] * heading[2];
            proj < self.cfg.stumbling_force_threshold
        })
    }

    /// Charge/discharge both rules for every leg from the current
    /// observation. `timestep` is the tick duration in seconds.
    pub fn update(&mut self, obs: &Observation, timestep: f64) {
        let retraction_target = self.retraction_target(obs);
        let draw = self.cfg.draw_corrections;

        for leg in LegIndex::ALL {
            let i = leg.as_usize();

            let retracting = retraction_target == Some(i);
            let (amount, viz) = update_amount(
                retracting,
                self.retraction[i],
                self.cfg.retraction_rates,
                timestep,
            );
            self.retraction[i] = amount;
            self.viz.retraction[i] = draw.then_some(viz);

            let stumbling = self.stumbling_condition(obs, leg);
            let (amount, viz) = update_amount(
                stumbling,
                self.stumbling[i],
                self.cfg.stumbling_rates,
                timestep,
            );
            self.stumbling[i] = amount;
            self.viz.stumbling[i] = draw.then_some(viz);
        }
    }

    /// Retraction strictly wins while its amount is positive; stumbling only
    /// applies otherwise. A tie-break, not a blend.
    pub fn net_correction(&self, leg: LegIndex) -> f64 {
        let i = leg.as_usize();
        if self.retraction[i] > 0.0 {
            self.retraction[i]
        } else {
            self.stumbling[i]
        }
    }
}

fn update_amount(
    condition: bool,
    current: f64,
    rates: CorrectionRates,
    timestep: f64,
) -> (f64, CorrectionViz) {
    if condition {
        (current + rates.increment * timestep, CorrectionViz::Active)
    } else {
        (
            (current - rates.decrement * timestep).max(0.0),
            CorrectionViz::Decaying,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::default_sensor_placements;

    fn estimator(cfg: CorrectionConfig) -> CorrectionEstimator {
        CorrectionEstimator::new(cfg, &default_sensor_placements()).unwrap()
    }

    fn flat_observation() -> Observation {
        Observation {
            fly_position: [0.0, 0.0, 1.0],
            fly_orientation: [1.0, 0.0, 0.0],
            end_effector_positions: [[0.0, 0.0, 0.0]; LEG_COUNT],
            contact_forces: vec![[0.0; 3]; 36],
            odor_intensity: vec![0.0; 8],
        }
    }

    #[test]
    fn incomplete_sensor_coverage_is_rejected() {
        let mut placements = default_sensor_placements();
        // Strip the LF tibia sensor; that leg can no longer be monitored.
        placements.retain(|p| !(p.leg == LegIndex::LeftFront && p.segment == Segment::Tibia));
        let err = CorrectionEstimator::new(CorrectionConfig::default(), &placements)
            .unwrap_err();
        assert!(matches!(err, ControlError::Configuration(_)));
    }

    #[test]
    fn retraction_flags_only_a_clear_outlier() {
        let est = estimator(CorrectionConfig::default());
        let mut obs = flat_observation();
        assert_eq!(est.retraction_target(&obs), None);

        // One leg dangling well below the others.
        obs.end_effector_positions[4][2] = -0.2;
        assert_eq!(est.retraction_target(&obs), Some(4));

        // Within the margin of the third-deepest: no flag.
        obs.end_effector_positions[4][2] = -0.04;
        assert_eq!(est.retraction_target(&obs), None);

        // Two deep legs, but the third-deepest is shallow: still flags the
        // single deepest.
        obs.end_effector_positions[4][2] = -0.3;
        obs.end_effector_positions[1][2] = -0.2;
        assert_eq!(est.retraction_target(&obs), Some(4));
    }

    #[test]
    fn stumbling_detects_backward_force_on_distal_segments() {
        let est = estimator(CorrectionConfig::default());
        let mut obs = flat_observation();
        assert!(!est.stumbling_condition(&obs, LegIndex::LeftFront));

        // Push backward against the heading on LF's tibia sensor (index 0 in
        // the default placement order).
        obs.contact_forces[0] = [-1.5, 0.0, 0.0];
        assert!(est.stumbling_condition(&obs, LegIndex::LeftFront));
        // Other legs are unaffected.
        assert!(!est.stumbling_condition(&obs, LegIndex::RightHind));

        // A forward force of the same size is not a stumble.
        obs.contact_forces[0] = [1.5, 0.0, 0.0];
        assert!(!est.stumbling_condition(&obs, LegIndex::LeftFront));
    }

    #[test]
    fn amounts_charge_linearly_and_decay_to_zero() {
        let mut est = estimator(CorrectionConfig::default());
        let mut obs = flat_observation();
        obs.end_effector_positions[2][2] = -0.5;

        let dt = 1e-4;
        let ticks = 200;
        for _ in 0..ticks {
            est.update(&obs, dt);
        }
        let expected = 500.0 * dt * ticks as f64;
        let got = est.retraction_amounts()[2];
        assert!((got - expected).abs() < 1e-9, "{got} vs {expected}");

        // Condition gone: linear decay, floored at exactly zero.
        obs.end_effector_positions[2][2] = 0.0;
        let mut last = got;
        for _ in 0..1000 {
            est.update(&obs, dt);
            let now = est.retraction_amounts()[2];
            assert!(now <= last);
            assert!(now >= 0.0);
            last = now;
        }
        assert_eq!(est.retraction_amounts()[2], 0.0);
    }

    #[test]
    fn retraction_takes_priority_over_stumbling() {
        let mut est = estimator(CorrectionConfig::default());
        let mut obs = flat_observation();
        obs.end_effector_positions[0][2] = -0.5;
        obs.contact_forces[0] = [-2.0, 0.0, 0.0];

        for _ in 0..100 {
            est.update(&obs, 1e-4);
        }
        let i = LegIndex::LeftFront.as_usize();
        assert!(est.retraction_amounts()[i] > 0.0);
        assert!(est.stumbling_amounts()[i] > 0.0);
        assert_eq!(
            est.net_correction(LegIndex::LeftFront),
            est.retraction_amounts()[i]
        );

        // Once retraction hits zero, the stumbling amount takes over.
        let mut decayed = est.clone();
        obs.end_effector_positions[0][2] = 0.0;
        for _ in 0..10_000 {
            decayed.update(&obs, 1e-4);
        }
        assert_eq!(decayed.retraction_amounts()[i], 0.0);
        assert_eq!(
            decayed.net_correction(LegIndex::LeftFront),
            decayed.stumbling_amounts()[i]
        );
    }

    #[test]
    fn viz_tracks_rule_state_when_enabled() {
        let cfg = CorrectionConfig {
            draw_corrections: true,
            ..CorrectionConfig::default()
        };
        let mut est = estimator(cfg);
        let mut obs = flat_observation();
        obs.end_effector_positions[3][2] = -0.5;
        est.update(&obs, 1e-4);
        assert_eq!(est.viz().retraction[3], Some(CorrectionViz::Active));
        assert_eq!(est.viz().retraction[0], Some(CorrectionViz::Decaying));

        est.reset();
        assert_eq!(est.viz().retraction[3], None);
        assert_eq!(est.retraction_amounts()[3], 0.0);
    }
}
