//! 精子形態分類ライブラリ
//!
//! 顕微鏡画像を学習済みCNNで分類し、クラスごとの信頼度レポートを作成します。
#![recursion_limit = "256"]

pub mod classifier;
pub mod diagnose;
pub mod error;
pub mod history;
pub mod job;
pub mod model;
pub mod report;
pub mod types;
#[cfg(feature = "ml")]
pub mod ml;

use std::sync::Arc;

pub use classifier::{Classifier, Prediction};
pub use error::ClassifyError;
pub use history::AnalysisHistory;
pub use job::{spawn_analysis, AnalysisOutcome, JobEvent, JobHandle, JobOutcome};
pub use model::{AppConfig, DatasetId, DatasetSpec, ModelKind};
pub use report::{format_report, ConfidenceReport, FormattedReport};
pub use types::{AnalysisRecord, InferenceRequest};

/// 設定に応じた推論バックエンドを作成
///
/// `ml` フィーチャー無しでビルドした場合は None。
#[cfg_attr(not(feature = "ml"), allow(unused_variables))]
pub fn load_classifier(config: &AppConfig) -> Option<Arc<dyn Classifier>> {
    #[cfg(feature = "ml")]
    {
        Some(ml::engine_for(config))
    }
    #[cfg(not(feature = "ml"))]
    {
        None
    }
}
