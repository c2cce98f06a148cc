// Minimal PRNG (no external crates).
//
// This is NOT cryptographically secure.
// It is used only for oscillator state initialization and synthetic test
// inputs, so that runs are reproducible from a single seed.

use std::f64::consts::TAU;

#[derive(Debug, Clone)]
pub struct Prng {
    state: u64,
}

impl Prng {
    pub fn new(seed: u64) -> Self {
        // Avoid a zero state.
        let seed = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self { state: seed }
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        // Marsaglia / Vigna family. Simple, fast, decent for simulation noise.
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    #[inline]
    pub fn next_f64_01(&mut self) -> f64 {
        // Top 53 bits, converted to [0,1).
        let x = self.next_u64() >> 11;
        (x as f64) / ((1u64 << 53) as f64)
    }

    #[inline]
    pub fn gen_range_f64(&mut self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.next_f64_01()
    }

    /// Uniform phase angle in [0, 2π).
    #[inline]
    pub fn next_phase(&mut self) -> f64 {
        self.next_f64_01() * TAU
    }

    /// Fill an array with uniform samples from [low, high).
    pub fn fill_range<const N: usize>(&mut self, low: f64, high: f64) -> [f64; N] {
        let mut out = [0.0; N];
        for v in out.iter_mut() {
            *v = self.gen_range_f64(low, high);
        }
        out
    }
}
