//! Synthetic flat-terrain environment: a kinematic stand-in for the physics
//! collaborator, plus a sinusoidal preprogrammed-steps stand-in. Used by the
//! demo binary and as the in-repo integration harness.

use crate::body::{
    BodyModel, JointCommand, LegIndex, Observation, StepGenerator, StepOutcome, Termination,
    LEG_COUNT, LEG_DOF,
};
use crate::controller::{Action, Controller, ControllerConfig};
use std::collections::HashMap;
use std::f64::consts::PI;
use std::io::{self, Write};

/// Synthetic preprogrammed steps: a neutral pose plus a per-DoF sinusoidal
/// excursion scaled by the oscillator magnitude. Swing occupies the first
/// half of the cycle; adhesion engages only in stance.
#[derive(Debug, Clone)]
pub struct SineSteps {
    pub neutral: [f64; LEG_DOF],
    pub excursion: [f64; LEG_DOF],
    pub swing_start: f64,
    pub swing_end: f64,
}

impl Default for SineSteps {
    fn default() -> Self {
        Self {
            neutral: [0.0, 0.6, -0.1, -1.2, 0.0, 0.9, -0.3],
            excursion: [0.15, 0.25, 0.05, 0.35, 0.05, 0.25, 0.1],
            swing_start: 0.0,
            swing_end: PI,
        }
    }
}

impl StepGenerator for SineSteps {
    fn joint_angles(&self, _leg: LegIndex, phase: f64, magnitude: f64) -> [f64; LEG_DOF] {
        let mut out = self.neutral;
        for (d, angle) in out.iter_mut().enumerate() {
            // Stagger distal joints slightly behind proximal ones.
            let lag = d as f64 * 0.2;
            *angle += magnitude * self.excursion[d] * (phase - lag).sin();
        }
        out
    }

    fn adhesion(&self, _leg: LegIndex, phase: f64) -> bool {
        !(self.swing_start..self.swing_end).contains(&phase)
    }
}

#[derive(Debug, Clone)]
pub struct FlatTerrainConfig {
    pub timestep: f64,
    /// World position of the attractive odor source.
    pub attractive_source: [f64; 2],
    /// Optional aversive source.
    pub aversive_source: Option<[f64; 2]>,
    pub odor_peak: f64,
    /// Forward speed per stance leg, length units per second.
    pub speed_gain: f64,
    /// Yaw rate per unit of left/right actuation asymmetry, rad per second.
    pub turn_gain: f64,
}

impl Default for FlatTerrainConfig {
    fn default() -> Self {
        Self {
            timestep: 1e-4,
            attractive_source: [20.0, 0.0],
            aversive_source: None,
            odor_peak: 1.0,
            speed_gain: 4.0,
            turn_gain: 0.6,
        }
    }
}

/// Flat ground, no obstacles: end effectors follow the adhesion pattern,
/// contact forces stay benign, odor falls off with squared distance.
#[derive(Debug)]
pub struct FlatTerrain {
    cfg: FlatTerrainConfig,
    position: [f64; 2],
    yaw: f64,
    obs: Observation,
    steps: u64,
}

// Detector offsets in body frame: (forward, lateral). Order matches the
// steering layer's detector weighting (palp first, antenna second).
const DETECTOR_OFFSETS: [[f64; 2]; 2] = [[0.1, 0.05], [0.3, 0.15]];

impl FlatTerrain {
    pub fn new(cfg: FlatTerrainConfig) -> Self {
        let mut body = Self {
            cfg,
            position: [0.0, 0.0],
            yaw: 0.0,
            obs: Observation {
                fly_position: [0.0, 0.0, 1.0],
                fly_orientation: [1.0, 0.0, 0.0],
                end_effector_positions: [[0.0; 3]; LEG_COUNT],
                contact_forces: vec![[0.0; 3]; 36],
                odor_intensity: vec![0.0; 8],
            },
            steps: 0,
        };
        body.refresh_observation(&[1; LEG_COUNT]);
        body
    }

    pub fn position(&self) -> [f64; 2] {
        self.position
    }

    pub fn distance_to_source(&self) -> f64 {
        let [sx, sy] = self.cfg.attractive_source;
        let dx = sx - self.position[0];
        let dy = sy - self.position[1];
        (dx * dx + dy * dy).sqrt()
    }

    fn detector_world(&self, det: usize, side: usize) -> [f64; 2] {
        let [fwd, lat] = DETECTOR_OFFSETS[det];
        let lat = if side == 0 { lat } else { -lat };
        let (sin, cos) = self.yaw.sin_cos();
        [
            self.position[0] + fwd * cos - lat * sin,
            self.position[1] + fwd * sin + lat * cos,
        ]
    }

    fn intensity_from(&self, source: Option<[f64; 2]>, at: [f64; 2]) -> f64 {
        let Some([sx, sy]) = source else {
            return 0.0;
        };
        let dx = sx - at[0];
        let dy = sy - at[1];
        self.cfg.odor_peak / (1.0 + dx * dx + dy * dy)
    }

    fn refresh_observation(&mut self, adhesion: &[u8; LEG_COUNT]) {
        let (sin, cos) = self.yaw.sin_cos();
        self.obs.fly_position = [self.position[0], self.position[1], 1.0];
        self.obs.fly_orientation = [cos, sin, 0.0];

        // Stance feet on the ground, swing feet lifted.
        for leg in LegIndex::ALL {
            let i = leg.as_usize();
            let row = (i % 3) as f64 - 1.0;
            let side = if leg.side() == crate::body::Side::Left {
                1.0
            } else {
                -1.0
            };
            let z = if adhesion[i] == 1 { 0.0 } else { 0.3 };
            self.obs.end_effector_positions[i] = [
                self.position[0] - row * 0.4 * cos - side * 0.5 * sin,
                self.position[1] - row * 0.4 * sin + side * 0.5 * cos,
                z,
            ];
        }

        let sources = [self.cfg.attractive_source, [0.0, 0.0]];
        for ch in 0..2 {
            let source = if ch == 0 {
                Some(sources[0])
            } else {
                self.cfg.aversive_source
            };
            for det in 0..2 {
                for side in 0..2 {
                    let at = self.detector_world(det, side);
                    self.obs.odor_intensity[ch * 4 + det * 2 + side] =
                        self.intensity_from(source, at);
                }
            }
        }
    }
}

impl BodyModel for FlatTerrain {
    fn observation(&self) -> &Observation {
        &self.obs
    }

    fn apply(&mut self, command: &JointCommand) -> StepOutcome {
        let dt = self.cfg.timestep;
        let stance = command.adhesion.iter().filter(|&&a| a == 1).count();
        let speed = self.cfg.speed_gain * stance as f64 / LEG_COUNT as f64;

        // Left/right actuation asymmetry steers the body: a weaker side turns
        // the fly toward that side, differential-drive style.
        let per_leg = LEG_DOF;
        let activity = |joints: &[f64]| joints.iter().map(|a| a.abs()).sum::<f64>();
        let left = activity(&command.joints[..3 * per_leg]);
        let right = activity(&command.joints[3 * per_leg..6 * per_leg]);
        self.yaw += self.cfg.turn_gain * (right - left) / (left + right + 1e-9) * dt * 50.0;

        let (sin, cos) = self.yaw.sin_cos();
        self.position[0] += speed * cos * dt;
        self.position[1] += speed * sin * dt;
        self.steps += 1;

        self.refresh_observation(&command.adhesion);

        let mut info = HashMap::new();
        info.insert("steps".to_string(), self.steps as f64);
        info.insert("speed".to_string(), speed);
        info.insert("x".to_string(), self.position[0]);
        info.insert("y".to_string(), self.position[1]);
        info.insert("distance_to_source".to_string(), self.distance_to_source());

        StepOutcome {
            observation: self.obs.clone(),
            termination: Termination::default(),
            info,
        }
    }

    fn reset(&mut self) -> Observation {
        self.position = [0.0, 0.0];
        self.yaw = 0.0;
        self.steps = 0;
        self.refresh_observation(&[1; LEG_COUNT]);
        self.obs.clone()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WalkDemoConfig {
    pub run_time: f64,
    pub timestep: f64,
    pub seed: u64,
    pub print_every: usize,
}

impl Default for WalkDemoConfig {
    fn default() -> Self {
        Self {
            run_time: 2.0,
            timestep: 1e-4,
            seed: 0,
            print_every: 2000,
        }
    }
}

/// Straight walking with a mid-run turn: drive [1.2, 0.2] for the first half,
/// [0.2, 1.2] for the second.
pub fn run_walk_demo(cfg: WalkDemoConfig) {
    let ctl_cfg = ControllerConfig::default().with_seed(cfg.seed);
    let mut ctl = match Controller::new(ctl_cfg, SineSteps::default()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("controller construction failed: {e}");
            return;
        }
    };
    let mut body = FlatTerrain::new(FlatTerrainConfig {
        timestep: cfg.timestep,
        ..FlatTerrainConfig::default()
    });

    let ticks = (cfg.run_time / cfg.timestep) as usize;
    if out_line(format_args!(
        "walk-demo: run_time={}s timestep={} ticks={}",
        cfg.run_time, cfg.timestep, ticks
    ))
    .is_err()
    {
        return;
    }

    for t in 0..ticks {
        let command = if (t as f64) * cfg.timestep < cfg.run_time / 2.0 {
            [1.2, 0.2]
        } else {
            [0.2, 1.2]
        };
        if ctl.step(&mut body, &Action::Steering(command)).is_err() {
            return;
        }

        if cfg.print_every > 0 && t % cfg.print_every == 0 {
            let snap = ctl.snapshot();
            let avg_mag = snap.magnitudes.iter().sum::<f64>() / LEG_COUNT as f64;
            let [x, y] = body.position();
            if out_line(format_args!(
                "t={:.2}s pos=({:.2},{:.2}) avg_magnitude={:.3} net_correction_max={:.3}",
                t as f64 * cfg.timestep,
                x,
                y,
                avg_mag,
                snap.net_correction.iter().cloned().fold(0.0, f64::max),
            ))
            .is_err()
            {
                return;
            }
        }
    }

    let [x, y] = body.position();
    let _ = out_line(format_args!("walk-demo done: final pos=({x:.2},{y:.2})"));
}

/// Odor taxis toward the attractive source, re-deriving the steering command
/// at the taxis decision interval.
pub fn run_taxis_demo(cfg: WalkDemoConfig) {
    let ctl_cfg = ControllerConfig::default().with_seed(cfg.seed);
    let mut ctl = match Controller::new(ctl_cfg, SineSteps::default()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("controller construction failed: {e}");
            return;
        }
    };
    let mut body = FlatTerrain::new(FlatTerrainConfig {
        timestep: cfg.timestep,
        attractive_source: [8.0, 2.0],
        ..FlatTerrainConfig::default()
    });

    let ticks = (cfg.run_time / cfg.timestep) as usize;
    let substeps = ctl.taxis().substeps_per_decision(cfg.timestep).max(1);
    let mut command = [0.0, 0.0];

    if out_line(format_args!(
        "taxis-demo: source at (8.0, 2.0), initial distance {:.2}",
        body.distance_to_source()
    ))
    .is_err()
    {
        return;
    }

    for t in 0..ticks {
        if t % substeps == 0 {
            let odor = body.observation().odor_intensity.clone();
            command = match ctl.derive_steering(&odor) {
                Ok(c) => c,
                Err(_) => return,
            };
        }
        if ctl.step(&mut body, &Action::Steering(command)).is_err() {
            return;
        }

        if cfg.print_every > 0 && t % cfg.print_every == 0 {
            if out_line(format_args!(
                "t={:.2}s distance={:.3} command=({:.2},{:.2}) reached={}",
                t as f64 * cfg.timestep,
                body.distance_to_source(),
                command[0],
                command[1],
                ctl.taxis().reached_source(),
            ))
            .is_err()
            {
                return;
            }
        }
    }

    let _ = out_line(format_args!(
        "taxis-demo done: distance={:.3} reached={}",
        body.distance_to_source(),
        ctl.taxis().reached_source()
    ));
}

fn out_line(args: std::fmt::Arguments<'_>) -> io::Result<()> {
    let mut out = io::stdout().lock();
    match out.write_fmt(args) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => return Err(e),
        Err(e) => return Err(e),
    }
    out.write_all(b"\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_steps_scale_with_magnitude() {
        let steps = SineSteps::default();
        let zero = steps.joint_angles(LegIndex::LeftFront, 1.0, 0.0);
        assert_eq!(zero, steps.neutral);

        let full = steps.joint_angles(LegIndex::LeftFront, 1.0, 1.0);
        assert_ne!(full, steps.neutral);
    }

    #[test]
    fn adhesion_disengages_during_swing() {
        let steps = SineSteps::default();
        assert!(!steps.adhesion(LegIndex::LeftFront, 0.5));
        assert!(steps.adhesion(LegIndex::LeftFront, PI + 0.5));
    }

    #[test]
    fn odor_field_is_stronger_on_the_source_side() {
        let mut terrain = FlatTerrain::new(FlatTerrainConfig {
            attractive_source: [2.0, 3.0], // ahead and to the left
            ..FlatTerrainConfig::default()
        });
        terrain.refresh_observation(&[1; LEG_COUNT]);
        let odor = &terrain.observation().odor_intensity;
        // Attractive channel, antenna detectors: left reads stronger.
        assert!(odor[2] > odor[3]);
    }

    #[test]
    fn straight_drive_walks_forward() {
        let mut ctl = Controller::new(
            ControllerConfig::default().with_seed(1),
            SineSteps::default(),
        )
        .unwrap();
        let mut body = FlatTerrain::new(FlatTerrainConfig::default());
        for _ in 0..10_000 {
            ctl.step(&mut body, &Action::Steering([1.0, 1.0])).unwrap();
        }
        assert!(body.position()[0] > 0.5, "x = {}", body.position()[0]);
    }

    #[test]
    fn taxis_closes_distance_to_the_source() {
        let mut ctl = Controller::new(
            ControllerConfig::default().with_seed(4),
            SineSteps::default(),
        )
        .unwrap();
        let mut body = FlatTerrain::new(FlatTerrainConfig {
            attractive_source: [6.0, 1.0],
            ..FlatTerrainConfig::default()
        });
        let initial = body.distance_to_source();
        let substeps = ctl.taxis().substeps_per_decision(1e-4).max(1);
        let mut command = [0.0, 0.0];
        for t in 0..20_000usize {
            if t % substeps == 0 {
                let odor = body.observation().odor_intensity.clone();
                command = ctl.derive_steering(&odor).unwrap();
            }
            ctl.step(&mut body, &Action::Steering(command)).unwrap();
        }
        assert!(
            body.distance_to_source() < initial,
            "distance did not shrink: {} vs {}",
            body.distance_to_source(),
            initial
        );
    }
}
