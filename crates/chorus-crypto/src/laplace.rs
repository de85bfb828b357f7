use rand::Rng;

/// Laplace(mu, b) sampler for cover-traffic counts. Draws are truncated to
/// nonnegative integers; sampling must happen before the real batch size is
/// known so counts stay independent of actual traffic.
#[derive(Clone, Copy, Debug)]
pub struct Laplace {
    pub mu: f64,
    pub b: f64,
}

impl Laplace {
    pub fn new(mu: f64, b: f64) -> Self {
        Self { mu, b }
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        // Inverse CDF over u uniform in [-0.5, 0.5).
        let u: f64 = rng.gen::<f64>() - 0.5;
        self.mu - self.b * u.signum() * (1.0 - 2.0 * u.abs()).ln()
    }

    pub fn sample_u32<R: Rng>(&self, rng: &mut R) -> u32 {
        let x = self.sample(rng);
        if x <= 0.0 {
            0
        } else if x >= u32::MAX as f64 {
            u32::MAX
        } else {
            x.round() as u32
        }
    }
}
