use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::model::{DatasetId, ModelKind};
use crate::report::ConfidenceReport;

/// 履歴のタイムスタンプ書式
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 1回の解析要求
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub dataset: DatasetId,
    pub model: ModelKind,
    /// 未指定（または空文字列）は「入力なし」
    pub image_path: Option<PathBuf>,
}

impl InferenceRequest {
    pub fn new(dataset: DatasetId, model: ModelKind, image_path: impl Into<PathBuf>) -> Self {
        Self {
            dataset,
            model,
            image_path: Some(image_path.into()),
        }
    }

    /// 画像なしの要求（接続確認用）
    pub fn without_image(dataset: DatasetId, model: ModelKind) -> Self {
        Self {
            dataset,
            model,
            image_path: None,
        }
    }

    /// 空でない画像パス
    pub fn image(&self) -> Option<&Path> {
        self.image_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

/// 解析完了ごとに1件作られる履歴レコード
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub timestamp: String,
    pub image_path: String,
    pub prediction: String,
    pub confidence_scores: ConfidenceReport,
    pub dataset: String,
    pub model: String,
}

impl AnalysisRecord {
    /// 現在時刻でレコードを作成
    pub fn now(request: &InferenceRequest, prediction: &str, confidence_scores: ConfidenceReport) -> Self {
        Self {
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            image_path: request
                .image()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default(),
            prediction: prediction.to_string(),
            confidence_scores,
            dataset: request.dataset.to_string(),
            model: request.model.to_string(),
        }
    }

    /// 最大の信頼度（%）
    pub fn max_confidence(&self) -> f64 {
        self.confidence_scores.top().map(|(_, v)| v).unwrap_or(0.0)
    }

    /// 一覧表示用の1行
    pub fn summary_line(&self) -> String {
        format!("{} - {} ({:.1}%)", self.timestamp, self.prediction, self.max_confidence())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_path_means_no_image() {
        let request = InferenceRequest::new(DatasetId::Smids, ModelKind::Xception, "");
        assert!(request.image().is_none());
        let request = InferenceRequest::without_image(DatasetId::Smids, ModelKind::Xception);
        assert!(request.image().is_none());
        let request = InferenceRequest::new(DatasetId::Smids, ModelKind::Xception, "cell.png");
        assert_eq!(request.image(), Some(Path::new("cell.png")));
    }

    #[test]
    fn test_record_fields() {
        let request = InferenceRequest::new(DatasetId::HuSHeM, ModelKind::GoogleNet, "a.png");
        let scores: ConfidenceReport = vec![("Normal".to_string(), 60.0), ("Tapered".to_string(), 40.0)]
            .into_iter()
            .collect();
        let record = AnalysisRecord::now(&request, "Normal", scores);

        assert_eq!(record.dataset, "HuSHeM");
        assert_eq!(record.model, "GoogleNet");
        assert_eq!(record.image_path, "a.png");
        assert_eq!(record.timestamp.len(), "2025-01-01 00:00:00".len());
        assert!(record.summary_line().ends_with("Normal (60.0%)"));
    }
}
