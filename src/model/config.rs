//! アプリケーション設定管理モジュール
//!
//! 計算デバイスやアーティファクトの場所などをJSON形式で保存・読み込みします。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 計算デバイスの種類
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DeviceType {
    /// WGPU (GPU) バックエンド
    Wgpu,
    /// NdArray (CPU) バックエンド
    #[default]
    Cpu,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
            DeviceType::Cpu => write!(f, "CPU (NdArray)"),
        }
    }
}

/// 入力画素値の正規化方法
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Normalization {
    /// 0.0〜1.0 に線形変換のみ
    #[default]
    UnitRange,
    /// ImageNetの平均と標準偏差で正規化
    ImageNet,
}

/// 信頼度マップの取得元
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ConfidenceSource {
    /// 推論結果の数値ベクトルをそのまま使う
    #[default]
    Numeric,
    /// 整形済みレポートを再パースし、失敗時は既定の分布を使う（旧挙動）
    ParsedReport,
}

/// 解析履歴の設定
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HistorySettings {
    /// 解析完了ごとに履歴全体を書き出すファイル
    #[serde(default)]
    pub auto_save_path: Option<PathBuf>,
}

/// アプリケーション設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 計算デバイスの種類
    pub device_type: DeviceType,
    /// 学習済みアーティファクトのルートディレクトリ
    pub artifact_root: PathBuf,
    /// 入力画像の正規化
    #[serde(default)]
    pub normalization: Normalization,
    /// 信頼度マップの取得元
    #[serde(default)]
    pub confidence_source: ConfidenceSource,
    /// 専門家レビューを推奨する信頼度の閾値（%）
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// 履歴設定
    #[serde(default)]
    pub history: HistorySettings,
    /// 最後に解析した画像のパス
    #[serde(default)]
    pub last_image_path: Option<String>,
    /// 最後に選択したデータセット
    #[serde(default)]
    pub last_dataset: Option<String>,
    /// 最後に選択したモデル
    #[serde(default)]
    pub last_model: Option<String>,
}

fn default_confidence_threshold() -> f64 {
    70.0
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device_type: DeviceType::default(),
            artifact_root: PathBuf::from("models"),
            normalization: Normalization::default(),
            confidence_source: ConfidenceSource::default(),
            confidence_threshold: default_confidence_threshold(),
            history: HistorySettings::default(),
            last_image_path: None,
            last_dataset: None,
            last_model: None,
        }
    }
}

impl AppConfig {
    /// 閾値スライダーの範囲
    pub const THRESHOLD_RANGE: (f64, f64) = (50.0, 95.0);

    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: AppConfig = serde_json::from_str(&content)?;
        config.set_confidence_threshold(config.confidence_threshold);
        Ok(config)
    }

    /// 指定パスから設定を読み込む、存在しない場合はデフォルト設定を返す
    pub fn load_or_default_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if path.exists() {
            match Self::load(path) {
                Ok(config) => {
                    info!("設定ファイルを読み込みました: {}", path.display());
                    config
                }
                Err(e) => {
                    warn!(
                        "設定ファイルの読み込みに失敗しました ({}): {}。デフォルト設定を使用します",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            }
        } else {
            info!("設定ファイルが存在しません。デフォルト設定を使用します");
            Self::default()
        }
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        info!("設定ファイルを保存しました: {}", path.display());
        Ok(())
    }

    /// 閾値を設定（範囲外は丸める）
    pub fn set_confidence_threshold(&mut self, threshold: f64) {
        let (min, max) = Self::THRESHOLD_RANGE;
        self.confidence_threshold = threshold.clamp(min, max);
    }

    /// 最後の選択内容を更新
    pub fn remember_selection(&mut self, dataset: &str, model: &str, image_path: Option<&Path>) {
        self.last_dataset = Some(dataset.to_string());
        self.last_model = Some(model.to_string());
        if let Some(path) = image_path {
            self.last_image_path = Some(path.to_string_lossy().to_string());
        }
    }

    /// 設定情報を表示
    pub fn display(&self) {
        println!("=== アプリケーション設定 ===");
        println!("計算デバイス: {}", self.device_type);
        println!("アーティファクト: {}", self.artifact_root.display());
        println!("正規化: {:?}", self.normalization);
        println!("信頼度の取得元: {:?}", self.confidence_source);
        println!("信頼度の閾値: {:.0}%", self.confidence_threshold);
        if let Some(ref path) = self.history.auto_save_path {
            println!("履歴の自動保存: {}", path.display());
        }
        println!("========================\n");
    }
}
