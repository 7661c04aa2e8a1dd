pub struct TrainConfig {
    pub learning_rate: f32,
    /// gradient L2 norm limit per parameter
    pub clip_norm: Option<f32>,
    pub batch_size: usize,
    pub num_epochs: usize,
    pub device: candle_core::Device,
    pub verbose: bool,
    pub show_progress: bool,
    /// seed for shuffling minibatches
    pub seed: u64,
}
