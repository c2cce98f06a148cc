//! The per-tick locomotion pipeline: descending steering command in,
//! actuator targets out.
//!
//! Data flows one way per tick: observation → correction estimator →
//! oscillator step → joint command synthesis → body. The steering layer sits
//! upstream and only rewrites the oscillator's intrinsic parameters.

use crate::body::{
    BodyModel, ControlError, JointCommand, LegIndex, Observation, SensorPlacement, StepGenerator,
    StepOutcome, LEG_COUNT, TOTAL_DOF,
};
use crate::body::default_sensor_placements;
use crate::correction::{CorrectionConfig, CorrectionEstimator, VizState};
use crate::oscillator::{CpgConfig, CpgNetwork};
use crate::steering::{
    ApproachClassifier, ApproachConfig, ApproachDecision, OdorTaxis, OdorTaxisConfig,
};
use serde::{Deserialize, Serialize};

/// How incoming actions are interpreted. An explicit variant, not a boolean:
/// every `step` call is checked exhaustively against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMode {
    /// 2-value steering command drives the oscillator network.
    HybridTurning,
    /// Structured per-joint command bypasses the oscillator entirely.
    RawJoint,
}

/// A descending action for one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Independent left/right drive in the configured amplitude range.
    Steering([f64; 2]),
    /// Raw joint targets plus adhesion flags.
    Structured(JointCommand),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub cpg: CpgConfig,
    pub correction: CorrectionConfig,
    pub taxis: OdorTaxisConfig,
    pub approach: ApproachConfig,
    /// Valid range of each steering component; inputs are clamped into it.
    pub amplitude_range: (f64, f64),
    pub contact_sensor_placements: Vec<SensorPlacement>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cpg: CpgConfig::default(),
            correction: CorrectionConfig::default(),
            taxis: OdorTaxisConfig::default(),
            approach: ApproachConfig::default(),
            amplitude_range: (-0.5, 1.5),
            contact_sensor_placements: default_sensor_placements(),
        }
    }
}

impl ControllerConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.cpg.seed = Some(seed);
        self
    }
}

/// Read-only snapshot of the controller's internal state, for observers and
/// debugging. Never feeds back into control.
#[derive(Debug, Clone)]
pub struct ControllerSnapshot {
    pub mode: ControlMode,
    pub phases: [f64; LEG_COUNT],
    pub magnitudes: [f64; LEG_COUNT],
    pub retraction: [f64; LEG_COUNT],
    pub stumbling: [f64; LEG_COUNT],
    pub net_correction: [f64; LEG_COUNT],
    pub reached_odor_source: bool,
    pub odor_exposure_time: f64,
    pub correction_viz: VizState,
}

pub struct Controller<S: StepGenerator> {
    steps: S,
    cpg: CpgNetwork,
    corrections: CorrectionEstimator,
    taxis: OdorTaxis,
    approach: ApproachClassifier,
    mode: ControlMode,
    amplitude_range: (f64, f64),

    // Intrinsic parameters as configured; the steering layer derives the
    // per-tick values from these so sign flips stay idempotent.
    base_freqs: [f64; LEG_COUNT],
    base_amps: [f64; LEG_COUNT],

    seed: u64,
}

impl<S: StepGenerator> Controller<S> {
    pub fn new(cfg: ControllerConfig, steps: S) -> Result<Self, ControlError> {
        let corrections =
            CorrectionEstimator::new(cfg.correction, &cfg.contact_sensor_placements)?;
        let base_freqs = cfg.cpg.intrinsic_freqs;
        let base_amps = cfg.cpg.intrinsic_amps;
        let seed = cfg.cpg.seed.unwrap_or(0);
        Ok(Self {
            steps,
            cpg: CpgNetwork::new(cfg.cpg),
            corrections,
            taxis: OdorTaxis::new(cfg.taxis),
            approach: ApproachClassifier::new(cfg.approach),
            mode: ControlMode::HybridTurning,
            amplitude_range: cfg.amplitude_range,
            base_freqs,
            base_amps,
            seed,
        })
    }

    pub fn timestep(&self) -> f64 {
        self.cpg.timestep()
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ControlMode) {
        self.mode = mode;
    }

    pub fn cpg(&self) -> &CpgNetwork {
        &self.cpg
    }

    pub fn taxis(&self) -> &OdorTaxis {
        &self.taxis
    }

    /// Advance the simulation by one tick.
    ///
    /// The action must match the current mode; a steering command in raw
    /// joint mode (or vice versa) is a shape error, as is a structured
    /// command of the wrong dimensionality.
    pub fn step(
        &mut self,
        body: &mut dyn BodyModel,
        action: &Action,
    ) -> Result<StepOutcome, ControlError> {
        match (self.mode, action) {
            (ControlMode::HybridTurning, Action::Steering(cmd)) => self.step_hybrid(body, *cmd),
            (ControlMode::RawJoint, Action::Structured(cmd)) => {
                if cmd.joints.len() != TOTAL_DOF {
                    return Err(ControlError::Shape(format!(
                        "structured command must carry {TOTAL_DOF} joint targets, got {}",
                        cmd.joints.len()
                    )));
                }
                Ok(body.apply(cmd))
            }
            (ControlMode::HybridTurning, Action::Structured(_)) => Err(ControlError::Shape(
                "hybrid turning mode expects a 2-value steering command".into(),
            )),
            (ControlMode::RawJoint, Action::Steering(_)) => Err(ControlError::Shape(
                "raw joint mode expects a structured joint command".into(),
            )),
        }
    }

    /// Odor-taxis variant: derive the steering command from the current
    /// observation's odor intensities, then run the normal pipeline.
    pub fn step_odor_taxis(&mut self, body: &mut dyn BodyModel) -> Result<StepOutcome, ControlError> {
        if self.mode != ControlMode::HybridTurning {
            return Err(ControlError::Shape(
                "odor taxis requires hybrid turning mode".into(),
            ));
        }
        let command = {
            let odor = &body.observation().odor_intensity;
            self.taxis.steering_command(odor)?
        };
        self.step_hybrid(body, command)
    }

    /// Derive a steering command from raw odor intensities without stepping.
    /// Callers running the taxis layer at a slower cadence hold the returned
    /// command across `substeps_per_decision` ticks.
    pub fn derive_steering(&mut self, odor_intensity: &[f64]) -> Result<[f64; 2], ControlError> {
        self.taxis.steering_command(odor_intensity)
    }

    fn step_hybrid(
        &mut self,
        body: &mut dyn BodyModel,
        command: [f64; 2],
    ) -> Result<StepOutcome, ControlError> {
        let (lo, hi) = self.amplitude_range;
        let command = [command[0].clamp(lo, hi), command[1].clamp(lo, hi)];

        // Amplitude targets: |command| broadcast across each side's 3 legs.
        // Frequency sign: flip the side whose drive is non-positive so those
        // legs step backward. Derived from the configured base every tick.
        let mut amps = [0.0; LEG_COUNT];
        let mut freqs = self.base_freqs;
        for i in 0..LEG_COUNT {
            let side = i / 3;
            amps[i] = command[side].abs();
            if command[side] <= 0.0 {
                freqs[i] = -freqs[i];
            }
        }
        self.cpg.intrinsic_amps = amps;
        self.cpg.intrinsic_freqs = freqs;

        let obs = body.observation().clone();
        let dt = self.cpg.timestep();
        self.corrections.update(&obs, dt);

        self.cpg.step();

        let command = self.synthesize_command();
        Ok(body.apply(&command))
    }

    /// Translate oscillator state plus net corrections into the full joint
    /// command payload.
    fn synthesize_command(&self) -> JointCommand {
        let phases = self.cpg.phases();
        let magnitudes = self.cpg.magnitudes();
        let vectors = &self.corrections.config().correction_vectors;

        let mut out = JointCommand::empty();
        for leg in LegIndex::ALL {
            let i = leg.as_usize();
            let mut angles = self.steps.joint_angles(leg, phases[i], magnitudes[i]);

            let net = self.corrections.net_correction(leg);
            let offsets = vectors.for_group(leg.group());
            for (angle, offset) in angles.iter_mut().zip(offsets) {
                *angle += net * offset;
            }
            out.joints.extend_from_slice(&angles);

            out.adhesion[i] = u8::from(self.steps.adhesion(leg, phases[i]));
        }

        // Abdomen hinges are present in the payload but not driven here.
        for _ in crate::body::ABDOMEN_SEGMENTS {
            out.joints.push(0.0);
        }
        out
    }

    /// Classify approach odor exposure; see `ApproachClassifier`.
    pub fn classify_approach(
        &mut self,
        odor_intensity: &[f64],
        elapsed: f64,
    ) -> Result<ApproachDecision, ControlError> {
        self.approach.classify(odor_intensity, elapsed)
    }

    /// Full episode reset: body, oscillator (re-seeded), corrections, odor
    /// latch and exposure timer. Episodes are independent afterwards.
    pub fn reset(
        &mut self,
        body: &mut dyn BodyModel,
        seed: Option<u64>,
        init_phases: Option<[f64; LEG_COUNT]>,
        init_magnitudes: Option<[f64; LEG_COUNT]>,
    ) -> Observation {
        if let Some(seed) = seed {
            self.seed = seed;
        }
        self.cpg.reseed(self.seed);
        self.cpg.intrinsic_freqs = self.base_freqs;
        self.cpg.intrinsic_amps = self.base_amps;
        self.cpg.reset(init_phases, init_magnitudes);
        self.corrections.reset();
        self.taxis.reset();
        self.approach.reset();
        body.reset()
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        let mut net = [0.0; LEG_COUNT];
        for leg in LegIndex::ALL {
            net[leg.as_usize()] = self.corrections.net_correction(leg);
        }
        ControllerSnapshot {
            mode: self.mode,
            phases: *self.cpg.phases(),
            magnitudes: *self.cpg.magnitudes(),
            retraction: *self.corrections.retraction_amounts(),
            stumbling: *self.corrections.stumbling_amounts(),
            net_correction: net,
            reached_odor_source: self.taxis.reached_source(),
            odor_exposure_time: self.approach.exposure_time(),
            correction_viz: self.corrections.viz().clone(),
        }
    }
}
