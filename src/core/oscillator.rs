//! Coupled-oscillator network (CPG): one phase/amplitude pair per leg,
//! advanced per tick by Euler integration of the coupled phase dynamics.

use crate::body::LEG_COUNT;
use crate::prng::Prng;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

/// Fixed coupling structure: pairwise weights and target phase offsets.
/// Immutable after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouplingSpec {
    pub weights: [[f64; LEG_COUNT]; LEG_COUNT],
    pub phase_biases: [[f64; LEG_COUNT]; LEG_COUNT],
}

impl CouplingSpec {
    /// Idealized tripod gait: the two leg tripods step in anti-phase.
    ///
    /// With the fixed leg order (LF, LM, LH, RF, RM, RH) the tripods are the
    /// even and odd indices, so the bias between legs of different parity is
    /// π and zero otherwise. Legs are coupled wherever the bias is non-zero.
    pub fn tripod() -> Self {
        let mut phase_biases = [[0.0; LEG_COUNT]; LEG_COUNT];
        let mut weights = [[0.0; LEG_COUNT]; LEG_COUNT];
        for i in 0..LEG_COUNT {
            for j in 0..LEG_COUNT {
                if (i + j) % 2 == 1 {
                    phase_biases[i][j] = PI;
                    weights[i][j] = 10.0;
                }
            }
        }
        Self {
            weights,
            phase_biases,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpgConfig {
    /// Integration timestep in seconds.
    pub timestep: f64,
    /// Per-leg intrinsic stepping frequency in Hz. The sign encodes stepping
    /// direction: negative walks the leg backward.
    pub intrinsic_freqs: [f64; LEG_COUNT],
    /// Per-leg amplitude targets the convergence term pulls toward.
    pub intrinsic_amps: [f64; LEG_COUNT],
    /// Convergence rate of amplitude toward its intrinsic target.
    pub convergence_coefs: [f64; LEG_COUNT],
    pub coupling: CouplingSpec,
    /// If set, makes initial state reproducible.
    pub seed: Option<u64>,
}

impl Default for CpgConfig {
    fn default() -> Self {
        Self {
            timestep: 1e-4,
            intrinsic_freqs: [12.0; LEG_COUNT],
            intrinsic_amps: [1.0; LEG_COUNT],
            convergence_coefs: [20.0; LEG_COUNT],
            coupling: CouplingSpec::tripod(),
            seed: None,
        }
    }
}

impl CpgConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_timestep(mut self, timestep: f64) -> Self {
        self.timestep = timestep;
        self
    }
}

/// The oscillator network. Intrinsic frequency/amplitude are plain fields so
/// the steering layer can overwrite them between ticks; they are consumed at
/// the next `step()`.
#[derive(Debug, Clone)]
pub struct CpgNetwork {
    pub intrinsic_freqs: [f64; LEG_COUNT],
    pub intrinsic_amps: [f64; LEG_COUNT],

    timestep: f64,
    convergence_coefs: [f64; LEG_COUNT],
    coupling: CouplingSpec,

    phases: [f64; LEG_COUNT],
    magnitudes: [f64; LEG_COUNT],

    rng: Prng,
}

impl CpgNetwork {
    pub fn new(cfg: CpgConfig) -> Self {
        let mut net = Self {
            intrinsic_freqs: cfg.intrinsic_freqs,
            intrinsic_amps: cfg.intrinsic_amps,
            timestep: cfg.timestep,
            convergence_coefs: cfg.convergence_coefs,
            coupling: cfg.coupling,
            phases: [0.0; LEG_COUNT],
            magnitudes: [0.0; LEG_COUNT],
            rng: Prng::new(cfg.seed.unwrap_or(0)),
        };
        net.reset(None, None);
        net
    }

    pub fn timestep(&self) -> f64 {
        self.timestep
    }

    pub fn phases(&self) -> &[f64; LEG_COUNT] {
        &self.phases
    }

    pub fn magnitudes(&self) -> &[f64; LEG_COUNT] {
        &self.magnitudes
    }

    /// Re-seed the owned generator. Called by the controller on episode
    /// reset; the generator is never shared or global.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = Prng::new(seed);
    }

    /// Reinitialize oscillator state. Missing initial phases are sampled
    /// uniformly on the circle; missing magnitudes uniformly in
    /// [0, intrinsic_amp).
    pub fn reset(
        &mut self,
        init_phases: Option<[f64; LEG_COUNT]>,
        init_magnitudes: Option<[f64; LEG_COUNT]>,
    ) {
        match init_phases {
            Some(p) => {
                for (dst, src) in self.phases.iter_mut().zip(p) {
                    *dst = src.rem_euclid(TAU);
                }
            }
            None => {
                for p in self.phases.iter_mut() {
                    *p = self.rng.next_phase();
                }
            }
        }
        match init_magnitudes {
            Some(m) => {
                for (dst, src) in self.magnitudes.iter_mut().zip(m) {
                    *dst = src.max(0.0);
                }
            }
            None => {
                for (m, amp) in self.magnitudes.iter_mut().zip(self.intrinsic_amps) {
                    *m = self.rng.gen_range_f64(0.0, amp.max(0.0));
                }
            }
        }
    }

    /// Advance all phase/amplitude pairs by one timestep.
    ///
    /// Phase: `dθ_i = 2π ν_i + Σ_j r_j w_ij sin(θ_j − θ_i − φ_ij)`.
    /// Amplitude: `dr_i = α_i (R_i − r_i)`, with the convergence step bounded
    /// so one Euler step never overshoots the target.
    pub fn step(&mut self) {
        let dt = self.timestep;
        let mut next_phases = [0.0; LEG_COUNT];
        let mut next_mags = [0.0; LEG_COUNT];

        for i in 0..LEG_COUNT {
            let mut coupling_term = 0.0;
            for j in 0..LEG_COUNT {
                let w = self.coupling.weights[i][j];
                if w == 0.0 {
                    continue;
                }
                let bias = self.coupling.phase_biases[i][j];
                coupling_term +=
                    self.magnitudes[j] * w * (self.phases[j] - self.phases[i] - bias).sin();
            }
            let d_phase = TAU * self.intrinsic_freqs[i] + coupling_term;
            next_phases[i] = (self.phases[i] + d_phase * dt).rem_euclid(TAU);

            let gap = self.intrinsic_amps[i] - self.magnitudes[i];
            let d_mag = self.convergence_coefs[i] * gap * dt;
            // Bound the convergence step to the remaining distance.
            let d_mag = if gap >= 0.0 {
                d_mag.min(gap)
            } else {
                d_mag.max(gap)
            };
            next_mags[i] = (self.magnitudes[i] + d_mag).max(0.0);
        }

        self.phases = next_phases;
        self.magnitudes = next_mags;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(seed: u64) -> CpgNetwork {
        CpgNetwork::new(CpgConfig::default().with_seed(seed))
    }

    #[test]
    fn tripod_coupling_is_consistent() {
        let spec = CouplingSpec::tripod();
        for i in 0..LEG_COUNT {
            assert_eq!(spec.weights[i][i], 0.0);
            assert_eq!(spec.phase_biases[i][i], 0.0);
            for j in 0..LEG_COUNT {
                // Coupled exactly where a phase bias exists.
                assert_eq!(spec.weights[i][j] > 0.0, spec.phase_biases[i][j] != 0.0);
                assert_eq!(spec.weights[i][j], spec.weights[j][i]);
            }
        }
    }

    #[test]
    fn state_stays_in_invariant_range_over_long_runs() {
        let mut net = network(3);
        for _ in 0..50_000 {
            net.step();
            for (&p, &m) in net.phases().iter().zip(net.magnitudes()) {
                assert!((0.0..TAU).contains(&p), "phase left the unit circle: {p}");
                assert!(m >= 0.0, "magnitude went negative: {m}");
                assert!(m.is_finite());
            }
        }
    }

    #[test]
    fn amplitudes_converge_to_intrinsic_targets() {
        let mut net = network(9);
        for _ in 0..20_000 {
            net.step();
        }
        for (&m, &target) in net.magnitudes().iter().zip(&net.intrinsic_amps) {
            assert!((m - target).abs() < 1e-3, "magnitude {m} vs target {target}");
        }
    }

    #[test]
    fn tripod_groups_lock_in_antiphase() {
        let mut net = network(11);
        for _ in 0..100_000 {
            net.step();
        }
        let p = *net.phases();
        // Legs within a tripod converge to the same phase, across tripods to
        // a π offset.
        let within = 1.0 - (p[0] - p[2]).cos();
        assert!(within < 0.01, "within-tripod spread: {within}");
        let across = 1.0 + (p[0] - p[1]).cos();
        assert!(across < 0.01, "across-tripod offset error: {across}");
    }

    #[test]
    fn reset_with_seed_is_reproducible() {
        let mut a = network(21);
        let mut b = network(22);
        a.reseed(5);
        b.reseed(5);
        a.reset(None, None);
        b.reset(None, None);
        assert_eq!(a.phases(), b.phases());
        assert_eq!(a.magnitudes(), b.magnitudes());
    }

    #[test]
    fn explicit_init_is_normalized() {
        let mut net = network(1);
        net.reset(Some([7.0; LEG_COUNT]), Some([-0.5; LEG_COUNT]));
        for &p in net.phases() {
            assert!((0.0..TAU).contains(&p));
        }
        for &m in net.magnitudes() {
            assert_eq!(m, 0.0);
        }
    }
}
