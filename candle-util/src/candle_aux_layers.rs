use candle_core::{Result, Tensor};
use candle_nn::{Activation, Linear, Module, VarBuilder};

/// A sequence of modules, each optionally followed by an activation
pub struct StackLayers<M>
where
    M: Module,
{
    layers: Vec<(M, Option<Activation>)>,
}

impl<M> Module for StackLayers<M>
where
    M: Module,
{
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        self.layers
            .iter()
            .try_fold(input.clone(), |x, (module, activation)| {
                let h = module.forward(&x)?;
                match activation {
                    Some(act) => act.forward(&h),
                    None => Ok(h),
                }
            })
    }
}

impl<M> StackLayers<M>
where
    M: Module,
{
    pub fn push_with_act(&mut self, layer: M, activation: Activation) {
        self.layers.push((layer, Some(activation)));
    }

    pub fn push(&mut self, layer: M) {
        self.layers.push((layer, None));
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl<M> Default for StackLayers<M>
where
    M: Module,
{
    fn default() -> Self {
        Self { layers: vec![] }
    }
}

impl StackLayers<Linear> {
    /// Fully connected layers `d_in -> layers[0] -> layers[1] -> ...`,
    /// each followed by `activation`. The variables are named
    /// `{prefix}.{j}.weight` and `{prefix}.{j}.bias`.
    ///
    /// Returns the stack and its output dimension.
    pub fn fully_connected(
        d_in: usize,
        layers: &[usize],
        activation: Activation,
        prefix: &str,
        vs: VarBuilder,
    ) -> Result<(Self, usize)> {
        let mut fc = Self::default();
        let mut prev_dim = d_in;
        for (j, &next_dim) in layers.iter().enumerate() {
            let linear = candle_nn::linear(prev_dim, next_dim, vs.pp(format!("{}.{}", prefix, j)))?;
            fc.push_with_act(linear, activation);
            prev_dim = next_dim;
        }
        Ok((fc, prev_dim))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn fully_connected_shapes_and_names() -> Result<()> {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vs = VarBuilder::from_varmap(&varmap, DType::F32, &dev);

        let (mut fc, d_out) = StackLayers::fully_connected(7, &[5, 3], Activation::Relu, "fc", vs.clone())?;
        assert_eq!(d_out, 3);
        assert_eq!(fc.len(), 2);

        let x = Tensor::ones((4, 7), DType::F32, &dev)?;
        let h = fc.forward(&x)?;
        assert_eq!(h.dims(), &[4, 3]);
        assert!(h.flatten_all()?.to_vec1::<f32>()?.iter().all(|&v| v >= 0.));

        fc.push(candle_nn::linear(3, 2, vs.pp("out"))?);
        assert_eq!(fc.forward(&x)?.dims(), &[4, 2]);

        let names: Vec<String> = varmap.data().lock().unwrap().keys().cloned().collect();
        assert!(names.contains(&"fc.0.weight".to_string()));
        assert!(names.contains(&"fc.1.bias".to_string()));
        assert!(names.contains(&"out.weight".to_string()));
        Ok(())
    }
}
