//! 推論エンジンとジョブ実行の境界

use std::path::Path;

use crate::error::ClassifyError;
use crate::model::DatasetSpec;

/// 1回の推論の結果
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    /// 画像パスが空だったため推論しなかった
    NoInput,
    /// データセットのクラス順の確率ベクトル
    Probabilities(Vec<f32>),
}

/// 画像分類器
///
/// ワーカースレッドから呼ばれるため `Send + Sync` を要求します。
pub trait Classifier: Send + Sync {
    /// 画像を分類して確率ベクトルを返す
    ///
    /// 空のパスはエラーではなく [`Prediction::NoInput`] を返します。
    fn classify(&self, spec: &DatasetSpec, image_path: &Path) -> Result<Prediction, ClassifyError>;
}
