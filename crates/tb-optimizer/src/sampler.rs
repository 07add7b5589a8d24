//! Seeded sampling of configurations from a discrete search space.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tb_types::{Configuration, SearchSpace, TbResult};

/// Independent uniform sampling across the search space.
///
/// The sampler owns its random source. It is seeded once at construction and
/// never reseeded, so a given seed always yields the same sequence of
/// configurations, on any machine.
#[derive(Debug, Clone)]
pub struct ParameterSampler {
    space: SearchSpace,
    rng: ChaCha8Rng,
    draws: u64,
}

impl ParameterSampler {
    /// Fails if the space has no parameters or any candidate set is empty.
    pub fn new(space: SearchSpace, seed: u64) -> TbResult<Self> {
        Self::with_rng(space, ChaCha8Rng::seed_from_u64(seed))
    }

    pub fn with_rng(space: SearchSpace, rng: ChaCha8Rng) -> TbResult<Self> {
        space.validate()?;
        Ok(Self {
            space,
            rng,
            draws: 0,
        })
    }

    /// Draw one configuration, visiting parameters in declaration order.
    pub fn sample(&mut self) -> Configuration {
        let mut configuration = Configuration::new();
        for param in &self.space.parameters {
            // Sampled as u64 so the stream does not depend on pointer width.
            let idx = self.rng.gen_range(0..param.candidates.len() as u64) as usize;
            configuration = configuration.with(param.name.clone(), param.candidates[idx].clone());
        }
        self.draws += 1;
        configuration
    }

    /// Draw `count` configurations in sequence.
    pub fn suggest(&mut self, count: usize) -> Vec<Configuration> {
        (0..count).map(|_| self.sample()).collect()
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    /// Number of configurations drawn so far.
    pub fn draws(&self) -> u64 {
        self.draws
    }
}
