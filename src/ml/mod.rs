pub mod network;
pub mod preprocess;
pub mod inference;

use std::sync::Arc;

pub use network::{MorphologyNet, MorphologyNetConfig};
pub use preprocess::load_and_normalize_image;
pub use inference::{export_artifacts, CompileOptions, EngineSettings, InferenceEngine, LoadedModel};

use crate::classifier::Classifier;
use crate::model::{AppConfig, DeviceType};

/// CPUバックエンド
pub type CpuBackend = burn_ndarray::NdArray<f32>;

/// GPUバックエンド
pub type GpuBackend = burn::backend::Wgpu;

/// 設定の計算デバイスに応じた推論エンジンを作成
pub fn engine_for(config: &AppConfig) -> Arc<dyn Classifier> {
    let settings = EngineSettings::from(config);
    match config.device_type {
        DeviceType::Cpu => Arc::new(InferenceEngine::<CpuBackend>::new(
            burn_ndarray::NdArrayDevice::Cpu,
            settings,
        )),
        DeviceType::Wgpu => Arc::new(InferenceEngine::<GpuBackend>::new(
            burn_wgpu::WgpuDevice::default(),
            settings,
        )),
    }
}
