//! モデル推論機能

use burn::{
    config::Config,
    module::Module,
    record::{BinFileRecorder, FullPrecisionSettings, Recorder},
    tensor::{backend::Backend, Tensor},
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::classifier::{Classifier, Prediction};
use crate::error::ClassifyError;
use crate::ml::network::{MorphologyNet, MorphologyNetConfig, MorphologyNetRecord};
use crate::ml::preprocess::load_and_normalize_image;
use crate::model::{AppConfig, ArtifactPaths, DatasetId, DatasetSpec, Normalization, OptimizerKind};

/// 重みファイルのレコーダ
pub type WeightsRecorder = BinFileRecorder<FullPrecisionSettings>;

/// コンパイル設定
///
/// 推論のみを行うため予測結果には影響しません（ログ・メトリクス用）。
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOptions {
    pub optimizer: OptimizerKind,
    pub learning_rate: f64,
    pub loss: &'static str,
}

impl CompileOptions {
    pub fn for_dataset(spec: &DatasetSpec) -> Self {
        Self {
            optimizer: spec.optimizer,
            learning_rate: spec.learning_rate,
            loss: "categorical_crossentropy",
        }
    }
}

/// 1回の推論のために読み込んだモデル
#[derive(Debug)]
pub struct LoadedModel<B: Backend> {
    pub dataset: DatasetId,
    pub net: MorphologyNet<B>,
    pub architecture: MorphologyNetConfig,
    pub compile: CompileOptions,
}

/// 推論エンジンの設定
///
/// プロセスのカレントディレクトリには依存せず、アーティファクトは
/// 常に `artifact_root` から解決します。
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub artifact_root: PathBuf,
    pub normalization: Normalization,
}

impl From<&AppConfig> for EngineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            artifact_root: config.artifact_root.clone(),
            normalization: config.normalization,
        }
    }
}

/// 推論エンジン
///
/// 呼び出しごとにアーキテクチャと重みを読み直すため、呼び出し間で共有される状態はありません。
pub struct InferenceEngine<B: Backend> {
    device: B::Device,
    settings: EngineSettings,
}

impl<B: Backend> InferenceEngine<B> {
    pub fn new(device: B::Device, settings: EngineSettings) -> Self {
        Self { device, settings }
    }

    /// アーキテクチャと重みを読み込む
    pub fn load_model(&self, spec: &DatasetSpec) -> Result<LoadedModel<B>, ClassifyError> {
        let paths = ArtifactPaths::for_dataset(spec, &self.settings.artifact_root);
        paths.ensure_exist()?;

        let architecture = MorphologyNetConfig::load(&paths.architecture).map_err(|e| {
            ClassifyError::processing(format!(
                "invalid architecture {}: {}",
                paths.architecture.display(),
                e
            ))
        })?;

        if architecture.num_classes != spec.num_classes() {
            return Err(ClassifyError::WeightMismatch(format!(
                "architecture outputs {} classes, {} has {}",
                architecture.num_classes,
                spec.id,
                spec.num_classes()
            )));
        }
        if architecture.image_size != spec.edge_length as usize {
            return Err(ClassifyError::WeightMismatch(format!(
                "architecture expects {}x{} input, {} uses {}x{}",
                architecture.image_size, architecture.image_size, spec.id, spec.edge_length, spec.edge_length
            )));
        }

        let net = architecture.init::<B>(&self.device)?;

        let record: MorphologyNetRecord<B> = WeightsRecorder::new()
            .load(paths.weights.clone(), &self.device)
            .map_err(|e| {
                ClassifyError::WeightMismatch(format!("{}: {:?}", paths.weights.display(), e))
            })?;

        record
            .verify_shapes(&architecture)
            .map_err(ClassifyError::WeightMismatch)?;
        let net = net.load_record(record);

        let compile = CompileOptions::for_dataset(spec);
        debug!(
            "{} モデルを読み込みました (optimizer={}, lr={}, loss={})",
            spec.id, compile.optimizer, compile.learning_rate, compile.loss
        );

        Ok(LoadedModel {
            dataset: spec.id,
            net,
            architecture,
            compile,
        })
    }

    /// 単一画像を分類
    pub fn classify_image(&self, spec: &DatasetSpec, image_path: &Path) -> Result<Prediction, ClassifyError> {
        if image_path.as_os_str().is_empty() {
            return Ok(Prediction::NoInput);
        }

        let model = self.load_model(spec)?;

        let edge = spec.edge_length as usize;
        let image_data = load_and_normalize_image(image_path, spec.edge_length, self.settings.normalization)?;

        // Tensorに変換 [1, 3, edge, edge]
        let tensor = Tensor::<B, 1>::from_floats(image_data.as_slice(), &self.device)
            .reshape([1, 3, edge, edge]);

        let probabilities = model
            .net
            .predict_proba(tensor)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| ClassifyError::processing(format!("推論結果の取得エラー: {:?}", e)))?;

        if probabilities.len() != spec.num_classes() {
            return Err(ClassifyError::processing(format!(
                "model returned {} values for {} classes",
                probabilities.len(),
                spec.num_classes()
            )));
        }

        info!("{} を分類しました ({})", image_path.display(), spec.id);
        Ok(Prediction::Probabilities(probabilities))
    }
}

impl<B: Backend> Classifier for InferenceEngine<B> {
    fn classify(&self, spec: &DatasetSpec, image_path: &Path) -> Result<Prediction, ClassifyError> {
        self.classify_image(spec, image_path)
    }
}

/// アーキテクチャと重みをアーティファクトディレクトリへ書き出す
///
/// 学習環境から持ち込んだモデルの配置や、テスト用の小さなモデル作成に使います。
pub fn export_artifacts<B: Backend>(
    net: MorphologyNet<B>,
    architecture: &MorphologyNetConfig,
    spec: &DatasetSpec,
    artifact_root: &Path,
) -> anyhow::Result<ArtifactPaths> {
    let paths = ArtifactPaths::for_dataset(spec, artifact_root);
    std::fs::create_dir_all(spec.artifact_path(artifact_root))?;
    architecture.save(&paths.architecture)?;
    net.save_file(paths.weights.clone(), &WeightsRecorder::new())
        .map_err(|e| anyhow::anyhow!("モデル重みの保存エラー: {:?}", e))?;
    Ok(paths)
}
