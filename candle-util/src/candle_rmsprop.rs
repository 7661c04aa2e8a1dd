use candle_core::backprop::GradStore;
use candle_core::{DType, Result, Tensor, Var};
use candle_nn::Optimizer;

#[derive(Clone, Debug)]
pub struct ParamsRmsProp {
    pub lr: f64,
    /// decay of the running average of squared gradients
    pub rho: f64,
    pub eps: f64,
    /// rescale each gradient whose L2 norm exceeds this
    pub clip_norm: Option<f64>,
}

impl Default for ParamsRmsProp {
    fn default() -> Self {
        Self {
            lr: 1e-3,
            rho: 0.9,
            eps: 1e-7,
            clip_norm: None,
        }
    }
}

#[derive(Debug)]
struct VarRmsProp {
    var: Var,
    mean_sq: Var,
}

/// RMSProp
///
/// ```text
/// g <- clip(g)
/// a <- rho * a + (1 - rho) * g^2
/// w <- w - lr * g / (sqrt(a) + eps)
/// ```
#[derive(Debug)]
pub struct RmsProp {
    vars: Vec<VarRmsProp>,
    params: ParamsRmsProp,
}

/// Rescale `g` to have L2 norm at most `max_norm`
pub fn clip_by_norm(g: &Tensor, max_norm: f64) -> Result<Tensor> {
    let norm = g
        .to_dtype(DType::F64)?
        .sqr()?
        .sum_all()?
        .sqrt()?
        .to_scalar::<f64>()?;
    if norm.is_finite() && norm > max_norm {
        g * (max_norm / norm)
    } else {
        Ok(g.clone())
    }
}

impl Optimizer for RmsProp {
    type Config = ParamsRmsProp;

    fn new(vars: Vec<Var>, params: ParamsRmsProp) -> Result<Self> {
        let vars = vars
            .into_iter()
            .filter(|var| var.dtype().is_float())
            .map(|var| {
                let mean_sq = Var::zeros(var.shape(), var.dtype(), var.device())?;
                Ok(VarRmsProp { var, mean_sq })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { vars, params })
    }

    fn learning_rate(&self) -> f64 {
        self.params.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.params.lr = lr
    }

    fn step(&mut self, grads: &GradStore) -> Result<()> {
        let ParamsRmsProp {
            lr,
            rho,
            eps,
            clip_norm,
        } = self.params;

        for var in self.vars.iter() {
            let theta = &var.var;
            let mean_sq = &var.mean_sq;
            if let Some(g) = grads.get(theta) {
                let g = match clip_norm {
                    Some(c) => clip_by_norm(g, c)?,
                    None => g.clone(),
                };
                let next_mean_sq = ((mean_sq.as_tensor() * rho)? + (g.sqr()? * (1. - rho))?)?;
                let delta = (g.div(&(next_mean_sq.sqrt()? + eps)?)? * lr)?;
                theta.set(&theta.sub(&delta)?)?;
                mean_sq.set(&next_mean_sq)?;
            }
        }
        Ok(())
    }
}

impl RmsProp {
    pub fn new_lr(vars: Vec<Var>, learning_rate: f64) -> Result<Self> {
        let params = ParamsRmsProp {
            lr: learning_rate,
            ..ParamsRmsProp::default()
        };
        Self::new(vars, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use candle_core::Device;

    #[test]
    fn clipping_rescales_large_gradients() -> Result<()> {
        let g = Tensor::new(&[3_f32, 4.], &Device::Cpu)?;
        let clipped = clip_by_norm(&g, 2.)?.to_vec1::<f32>()?;
        assert_abs_diff_eq!(clipped[0], 1.2, epsilon = 1e-6);
        assert_abs_diff_eq!(clipped[1], 1.6, epsilon = 1e-6);

        let kept = clip_by_norm(&g, 10.)?.to_vec1::<f32>()?;
        assert_eq!(kept, vec![3., 4.]);
        Ok(())
    }

    #[test]
    fn first_step_matches_formula() -> Result<()> {
        // loss = sum(w * c) so that the gradient is c
        let w = Var::new(&[1_f32, 1.], &Device::Cpu)?;
        let c = Tensor::new(&[3_f32, 4.], &Device::Cpu)?;

        let params = ParamsRmsProp {
            lr: 0.1,
            clip_norm: Some(2.),
            ..Default::default()
        };
        let mut opt = RmsProp::new(vec![w.clone()], params)?;
        let loss = w.as_tensor().mul(&c)?.sum_all()?;
        opt.backward_step(&loss)?;

        // clipped gradient (1.2, 1.6); a = 0.1 g^2; step = lr g / sqrt(a)
        let step = 0.1 / 0.1_f32.sqrt();
        let w = w.as_tensor().to_vec1::<f32>()?;
        assert_abs_diff_eq!(w[0], 1. - step, epsilon = 1e-5);
        assert_abs_diff_eq!(w[1], 1. - step, epsilon = 1e-5);
        Ok(())
    }

    #[test]
    fn minimises_a_quadratic() -> Result<()> {
        let w = Var::new(&[5_f32, -3.], &Device::Cpu)?;
        let mut opt = RmsProp::new_lr(vec![w.clone()], 0.02)?;
        for _ in 0..1000 {
            let loss = w.as_tensor().sqr()?.sum_all()?;
            opt.backward_step(&loss)?;
        }
        let w = w.as_tensor().to_vec1::<f32>()?;
        assert!(w.iter().all(|x| x.abs() < 0.1), "{:?}", w);
        Ok(())
    }
}
