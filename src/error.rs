//! 推論パイプラインのエラー定義

use std::path::PathBuf;
use thiserror::Error;

/// 分類処理のエラー
///
/// 推論エンジンと結果フォーマッタはパニックせず、必ずこの値を返します。
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// 未知のデータセット識別子
    #[error("Unknown dataset: '{0}' (expected HuSHeM or SMIDS)")]
    UnknownDataset(String),

    /// アーキテクチャ定義または重みファイルが存在しない
    #[error("Model files not found. Please ensure the trained models are in the correct location: {}", path.display())]
    ArtifactNotFound { path: PathBuf },

    /// 重みとアーキテクチャの形状が一致しない
    #[error("Model weights do not match the architecture: {0}")]
    WeightMismatch(String),

    /// 画像の読み込み・デコードに失敗
    #[error("Could not decode image {}: {message}", path.display())]
    ImageDecode { path: PathBuf, message: String },

    /// クラス数が0の確率ベクトル
    #[error("Probability vector is empty")]
    EmptyVector,

    /// その他の処理エラー（元のメッセージを保持）
    #[error("Error loading model or processing image: {0}")]
    Processing(String),
}

impl ClassifyError {
    pub fn processing(message: impl std::fmt::Display) -> Self {
        ClassifyError::Processing(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_keep_original_detail() {
        let err = ClassifyError::processing("backend exploded");
        assert!(err.to_string().contains("backend exploded"));

        let err = ClassifyError::ArtifactNotFound { path: PathBuf::from("models/HuSHeM/weights.bin") };
        assert!(err.to_string().contains("weights.bin"));
    }
}
