pub use log::{info, warn};

pub type Mat = nalgebra::DMatrix<f32>;

pub use matrix_util::traits::*;

pub use candle_util::{candle_core, candle_nn};

pub use crate::errors::LupinError;
pub use anyhow::Context;

/// Compute device for the neural network
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, Default)]
#[clap(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    #[default]
    Cpu,
    Cuda,
    Metal,
}

impl ComputeDevice {
    /// Open the device; fails if candle was built without it
    pub fn open(&self, device_no: usize) -> anyhow::Result<candle_core::Device> {
        let dev = match self {
            ComputeDevice::Cpu => Ok(candle_core::Device::Cpu),
            ComputeDevice::Cuda => candle_core::Device::new_cuda(device_no),
            ComputeDevice::Metal => candle_core::Device::new_metal(device_no),
        };
        dev.map_err(|e| {
            LupinError::InvalidConfig(format!("cannot open {:?} device {}: {}", self, device_no, e))
                .into()
        })
    }
}
