// Downbeat - A Statsd client for Rust
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

/// Uniform source of sampling draws in `[0, 1)`.
///
/// Each draw decides the fate of exactly one emission so the only state is
/// the RNG itself. The RNG is boxed so that callers can substitute a seeded
/// or scripted implementation for deterministic tests.
pub(crate) struct Sampler {
    rng: Box<dyn RngCore>,
}

impl Sampler {
    pub(crate) fn from_entropy() -> Sampler {
        Sampler {
            rng: Box::new(StdRng::from_entropy()),
        }
    }

    pub(crate) fn with_rng<R>(rng: R) -> Sampler
    where
        R: RngCore + 'static,
    {
        Sampler { rng: Box::new(rng) }
    }

    pub(crate) fn draw(&mut self) -> f64 {
        self.rng.gen()
    }
}

#[cfg(test)]
mod tests {
    use super::Sampler;
    use rand::rngs::mock::StepRng;

    #[test]
    fn test_draw_stays_in_unit_interval() {
        let mut sampler = Sampler::from_entropy();
        for _ in 0..1000 {
            let draw = sampler.draw();
            assert!((0.0..1.0).contains(&draw), "draw was {}", draw);
        }
    }

    #[test]
    fn test_draw_uses_injected_rng() {
        let mut sampler = Sampler::with_rng(StepRng::new(0, 0));
        assert_eq!(0.0, sampler.draw());
    }
}
