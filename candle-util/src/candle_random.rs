//! Seeded randomness for model parameters and latent noise
//!
//! candle's CPU backend cannot be seeded, so every random draw of a
//! training run goes through a `StdRng` instead.

use candle_core::{Device, Result, Shape, Tensor};
use candle_nn::VarMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal, Uniform};
use std::sync::Mutex;

fn lock_error<T>(_: T) -> candle_core::Error {
    candle_core::Error::Msg("poisoned random number generator".to_string())
}

/// Gaussian noise `N(0, sd^2)` drawn from a seeded generator
pub struct GaussianNoise {
    rng: Mutex<StdRng>,
    normal: Normal<f32>,
}

impl GaussianNoise {
    pub fn new(sd: f64, seed: u64) -> Result<Self> {
        let normal = Normal::new(0_f32, sd as f32)
            .map_err(|e| candle_core::Error::Msg(format!("noise sd {}: {}", sd, e)))?;
        Ok(Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            normal,
        })
    }

    /// A tensor of noise with the shape of `like`
    pub fn sample_like(&self, like: &Tensor) -> Result<Tensor> {
        self.sample(like.shape(), like.device())
    }

    pub fn sample<S: Into<Shape>>(&self, shape: S, device: &Device) -> Result<Tensor> {
        let shape: Shape = shape.into();
        let mut rng = self.rng.lock().map_err(lock_error)?;
        let values: Vec<f32> = (0..shape.elem_count())
            .map(|_| self.normal.sample(&mut *rng))
            .collect();
        Tensor::from_vec(values, shape, device)
    }
}

/// Re-draw every variable of `varmap` from a seeded generator
///
/// Variables are visited in the order of their names. Matrices named
/// `*weight` get Glorot-uniform values `U(-a, a)` with
/// `a = sqrt(6 / (fan_in + fan_out))`; everything else is set to zero.
pub fn reinitialize_glorot_uniform(varmap: &VarMap, seed: u64) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let data = varmap.data().lock().map_err(lock_error)?;

    let mut names: Vec<&String> = data.keys().collect();
    names.sort();

    for name in names {
        let var = &data[name];
        let shape = var.shape().clone();
        let device = var.device().clone();
        let dtype = var.dtype();

        let values: Vec<f32> = match shape.dims() {
            &[fan_out, fan_in] if name.ends_with("weight") => {
                let limit = (6. / (fan_in + fan_out) as f64).sqrt() as f32;
                let unif = Uniform::new_inclusive(-limit, limit).map_err(|e| {
                    candle_core::Error::Msg(format!("glorot uniform for {}: {}", name, e))
                })?;
                (0..shape.elem_count()).map(|_| unif.sample(&mut rng)).collect()
            }
            _ => vec![0_f32; shape.elem_count()],
        };

        let t = Tensor::from_vec(values, shape, &device)?.to_dtype(dtype)?;
        var.set(&t)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarBuilder;

    #[test]
    fn noise_is_reproducible() -> Result<()> {
        let a = GaussianNoise::new(1., 7)?.sample((4, 3), &Device::Cpu)?;
        let b = GaussianNoise::new(1., 7)?.sample((4, 3), &Device::Cpu)?;
        assert_eq!(a.to_vec2::<f32>()?, b.to_vec2::<f32>()?);

        let zero = GaussianNoise::new(0., 7)?.sample((2, 2), &Device::Cpu)?;
        assert_eq!(zero.to_vec2::<f32>()?, vec![vec![0_f32; 2]; 2]);
        Ok(())
    }

    #[test]
    fn glorot_reinit_is_reproducible() -> Result<()> {
        let draw = |seed: u64| -> Result<(Vec<Vec<f32>>, Vec<f32>)> {
            let varmap = VarMap::new();
            let vs = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
            let layer = candle_nn::linear(5, 3, vs.pp("fc"))?;
            reinitialize_glorot_uniform(&varmap, seed)?;
            let w = layer.weight().to_vec2::<f32>()?;
            let b = layer
                .bias()
                .map(|b| b.to_vec1::<f32>())
                .transpose()?
                .unwrap_or_default();
            Ok((w, b))
        };

        let (w1, b1) = draw(3)?;
        let (w2, _) = draw(3)?;
        let (w3, _) = draw(4)?;
        assert_eq!(w1, w2);
        assert_ne!(w1, w3);
        assert_eq!(b1, vec![0_f32; 3]);

        let limit = (6_f32 / 8.).sqrt();
        assert!(w1.iter().flatten().all(|x| x.abs() <= limit));
        Ok(())
    }
}
