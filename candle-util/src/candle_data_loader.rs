use candle_core::{Device, Tensor};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// `DataLoader` for minibatch learning
pub trait DataLoader {
    /// rows of the `batch_idx`-th minibatch of the current shuffle
    fn minibatch_data(&self, batch_idx: usize, target_device: &Device) -> anyhow::Result<Tensor>;

    fn num_minibatch(&self) -> usize;

    /// Permute the samples and cut them into minibatches of
    /// `batch_size` (the last one may be smaller)
    fn shuffle_minibatch(&mut self, batch_size: usize, rng: &mut StdRng) -> anyhow::Result<()>;
}

///
/// A simple data loader for in-memory 2d matrix.  Each row will be
/// considered as a feature vector. The number of samples is the
/// number of rows.
///
pub struct InMemoryData {
    input_data: Tensor,
    minibatches: Minibatches,
}

impl InMemoryData {
    ///
    /// Create a data loader with the main data matrix `data`
    ///
    pub fn new<D>(data: &D) -> anyhow::Result<Self>
    where
        D: MatToTensor,
    {
        let input_data = data.to_tensor(&Device::Cpu)?;
        let nrows = input_data.dims2()?.0;

        Ok(InMemoryData {
            input_data,
            minibatches: Minibatches {
                samples: (0..nrows).collect(),
                chunks: vec![],
            },
        })
    }
}

impl DataLoader for InMemoryData {
    fn minibatch_data(&self, batch_idx: usize, target_device: &Device) -> anyhow::Result<Tensor> {
        let samples = self.minibatches.chunks.get(batch_idx).ok_or_else(|| {
            anyhow::anyhow!(
                "invalid index = {} vs. total # = {}",
                batch_idx,
                self.num_minibatch()
            )
        })?;

        let idx: Vec<u32> = samples.iter().map(|&i| i as u32).collect();
        let idx = Tensor::from_vec(idx, samples.len(), &Device::Cpu)?;
        Ok(self
            .input_data
            .index_select(&idx, 0)?
            .to_device(target_device)?)
    }

    fn num_minibatch(&self) -> usize {
        self.minibatches.chunks.len()
    }

    fn shuffle_minibatch(&mut self, batch_size: usize, rng: &mut StdRng) -> anyhow::Result<()> {
        if batch_size == 0 {
            return Err(anyhow::anyhow!("batch size must be positive"));
        }
        self.minibatches.shuffle_minibatch(batch_size, rng);
        Ok(())
    }
}

///
/// A helper `struct` for shuffling and creating minibatch indexes;
/// after `shuffle_minibatch` is called, `chunks` partition indexes.
///
pub struct Minibatches {
    samples: Vec<usize>,
    pub chunks: Vec<Vec<usize>>,
}

impl Minibatches {
    pub fn shuffle_minibatch(&mut self, batch_size: usize, rng: &mut StdRng) {
        self.samples.sort_unstable();
        self.samples.shuffle(rng);
        self.chunks = self
            .samples
            .chunks(batch_size.max(1))
            .map(|c| c.to_vec())
            .collect();
    }
}

///
/// Convert a matrix to a 2d `Tensor` of the same shape
///
pub trait MatToTensor {
    fn to_tensor(&self, device: &Device) -> candle_core::Result<Tensor>;
}

impl MatToTensor for DMatrix<f32> {
    fn to_tensor(&self, device: &Device) -> candle_core::Result<Tensor> {
        // nalgebra stores columns contiguously
        let row_major: Vec<f32> = self.transpose().as_slice().to_vec();
        Tensor::from_vec(row_major, (self.nrows(), self.ncols()), device)
    }
}

impl MatToTensor for Tensor {
    fn to_tensor(&self, device: &Device) -> candle_core::Result<Tensor> {
        self.to_device(device)
    }
}

///
/// Convert a 2d `Tensor` back to a matrix
///
pub fn tensor_to_mat(t: &Tensor) -> candle_core::Result<DMatrix<f32>> {
    let (nrows, ncols) = t.dims2()?;
    let rows = t
        .to_device(&Device::Cpu)?
        .to_dtype(candle_core::DType::F32)?
        .to_vec2::<f32>()?;
    Ok(DMatrix::from_row_iterator(
        nrows,
        ncols,
        rows.into_iter().flatten(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn matrix_tensor_round_trip() -> anyhow::Result<()> {
        let xx = DMatrix::<f32>::from_row_slice(2, 3, &[1., 2., 3., 4., 5., 6.]);
        let t = xx.to_tensor(&Device::Cpu)?;
        assert_eq!(t.to_vec2::<f32>()?, vec![vec![1., 2., 3.], vec![4., 5., 6.]]);
        assert_eq!(tensor_to_mat(&t)?, xx);
        Ok(())
    }

    #[test]
    fn minibatches_partition_samples() -> anyhow::Result<()> {
        let xx = DMatrix::<f32>::from_fn(10, 2, |i, _| i as f32);
        let mut data = InMemoryData::new(&xx)?;
        let mut rng = StdRng::seed_from_u64(1);

        data.shuffle_minibatch(5, &mut rng)?;
        assert_eq!(data.num_minibatch(), 2);

        let mut seen = vec![];
        for b in 0..data.num_minibatch() {
            let x = data.minibatch_data(b, &Device::Cpu)?;
            assert_eq!(x.dims2()?, (5, 2));
            seen.extend(x.to_vec2::<f32>()?.into_iter().map(|r| r[0] as usize));
        }
        seen.sort();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());

        data.shuffle_minibatch(4, &mut rng)?;
        assert_eq!(data.num_minibatch(), 3);
        assert_eq!(data.minibatch_data(2, &Device::Cpu)?.dims2()?.0, 2);
        assert!(data.minibatch_data(3, &Device::Cpu).is_err());
        Ok(())
    }

    #[test]
    fn shuffle_depends_only_on_seed() {
        let order = |seed: u64| {
            let mut mb = Minibatches {
                samples: (0..20).collect(),
                chunks: vec![],
            };
            let mut rng = StdRng::seed_from_u64(seed);
            mb.shuffle_minibatch(20, &mut rng);
            let first = mb.chunks[0].clone();
            mb.shuffle_minibatch(20, &mut rng);
            (first, mb.chunks[0].clone())
        };
        assert_eq!(order(3), order(3));
        let (a, b) = order(3);
        assert_ne!(a, b);
    }
}
