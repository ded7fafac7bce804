//! データセット・モデルの静的メタデータ
//!
//! データセットごとのクラス一覧、入力画像サイズ、コンパイル時の最適化手法、
//! 学習済みアーティファクトの配置場所を定義します。

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ClassifyError;

/// アーキテクチャ定義ファイル名
pub const ARCHITECTURE_FILE: &str = "architecture.json";

/// 重みファイル名
pub const WEIGHTS_FILE: &str = "weights.bin";

/// データセット識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatasetId {
    #[serde(rename = "HuSHeM")]
    HuSHeM,
    #[serde(rename = "SMIDS")]
    Smids,
}

impl DatasetId {
    pub const ALL: [DatasetId; 2] = [DatasetId::HuSHeM, DatasetId::Smids];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetId::HuSHeM => "HuSHeM",
            DatasetId::Smids => "SMIDS",
        }
    }

    /// このデータセットの仕様を取得
    pub fn spec(&self) -> &'static DatasetSpec {
        match self {
            DatasetId::HuSHeM => &HUSHEM,
            DatasetId::Smids => &SMIDS,
        }
    }
}

impl std::fmt::Display for DatasetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DatasetId {
    type Err = ClassifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "HuSHeM" => Ok(DatasetId::HuSHeM),
            "SMIDS" => Ok(DatasetId::Smids),
            other => Err(ClassifyError::UnknownDataset(other.to_string())),
        }
    }
}

/// コンパイル時に指定する最適化手法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Adam,
    Adamax,
}

impl std::fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptimizerKind::Adam => write!(f, "Adam"),
            OptimizerKind::Adamax => write!(f, "Adamax"),
        }
    }
}

/// 画面上で選択できるモデル名
///
/// 現状のアーティファクト選択はデータセットのみで決まり、
/// このモデル名は読み込む重みに影響しません（履歴へ記録されるだけ）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelKind {
    Xception,
    #[default]
    MobileNet,
    GoogleNet,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [ModelKind::Xception, ModelKind::MobileNet, ModelKind::GoogleNet];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Xception => "Xception",
            ModelKind::MobileNet => "MobileNet",
            ModelKind::GoogleNet => "GoogleNet",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ModelKind::MobileNet => "Optimized for speed (~100ms)",
            ModelKind::Xception => "High accuracy, slower processing (~500ms)",
            ModelKind::GoogleNet => "Balanced speed and accuracy (~300ms)",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = String;

    /// "MobileNet (fast)" のような表示文字列も先頭の単語で受け付ける
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.split_whitespace().next().unwrap_or("");
        ModelKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| format!("Unknown model: '{}'", s))
    }
}

/// データセット仕様
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSpec {
    pub id: DatasetId,
    /// クラスラベル（モデル出力の順序）
    pub classes: &'static [&'static str],
    /// 入力画像の一辺（ピクセル）
    pub edge_length: u32,
    pub optimizer: OptimizerKind,
    pub learning_rate: f64,
    /// アーティファクトルートからの相対ディレクトリ
    pub artifact_dir: &'static str,
}

pub static HUSHEM: DatasetSpec = DatasetSpec {
    id: DatasetId::HuSHeM,
    classes: &["Normal", "Tapered", "Pyriform", "Amorphous"],
    edge_length: 170,
    optimizer: OptimizerKind::Adam,
    learning_rate: 1e-4,
    artifact_dir: "HuSHeM",
};

pub static SMIDS: DatasetSpec = DatasetSpec {
    id: DatasetId::Smids,
    classes: &["Acrosome Abnormality", "Boya", "Sperm"],
    edge_length: 170,
    optimizer: OptimizerKind::Adamax,
    learning_rate: 1e-4,
    artifact_dir: "SMIDS",
};

impl DatasetSpec {
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// アーティファクトディレクトリ
    pub fn artifact_path(&self, artifact_root: &Path) -> PathBuf {
        artifact_root.join(self.artifact_dir)
    }

    /// アーキテクチャ定義(JSON)のパス
    pub fn architecture_path(&self, artifact_root: &Path) -> PathBuf {
        self.artifact_path(artifact_root).join(ARCHITECTURE_FILE)
    }

    /// 重みファイルのパス
    pub fn weights_path(&self, artifact_root: &Path) -> PathBuf {
        self.artifact_path(artifact_root).join(WEIGHTS_FILE)
    }

    /// 一行の説明文
    pub fn summary(&self) -> String {
        format!("{}: {} classes ({})", self.id, self.num_classes(), self.classes.join(", "))
    }
}

/// データセット識別子の文字列から仕様を取得
pub fn lookup(dataset: &str) -> Result<&'static DatasetSpec, ClassifyError> {
    dataset.parse::<DatasetId>().map(|id| id.spec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_datasets() {
        let hushem = lookup("HuSHeM").unwrap();
        assert_eq!(hushem.classes, &["Normal", "Tapered", "Pyriform", "Amorphous"]);
        assert_eq!(hushem.edge_length, 170);
        assert_eq!(hushem.optimizer, OptimizerKind::Adam);

        let smids = lookup("SMIDS").unwrap();
        assert_eq!(smids.classes, &["Acrosome Abnormality", "Boya", "Sperm"]);
        assert_eq!(smids.optimizer, OptimizerKind::Adamax);
    }

    #[test]
    fn test_lookup_unknown_dataset() {
        match lookup("MNIST") {
            Err(ClassifyError::UnknownDataset(name)) => assert_eq!(name, "MNIST"),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(lookup("hushem").is_err());
    }

    #[test]
    fn test_artifact_paths_depend_on_dataset_only() {
        let root = Path::new("models");
        assert_eq!(HUSHEM.architecture_path(root), PathBuf::from("models/HuSHeM/architecture.json"));
        assert_eq!(SMIDS.weights_path(root), PathBuf::from("models/SMIDS/weights.bin"));
    }

    #[test]
    fn test_model_kind_parse() {
        assert_eq!("MobileNet (fast)".parse::<ModelKind>().unwrap(), ModelKind::MobileNet);
        assert_eq!("xception".parse::<ModelKind>().unwrap(), ModelKind::Xception);
        assert!("ResNet".parse::<ModelKind>().is_err());
        assert_eq!(ModelKind::default(), ModelKind::MobileNet);
    }

    #[test]
    fn test_dataset_serde_names() {
        assert_eq!(serde_json::to_string(&DatasetId::Smids).unwrap(), "\"SMIDS\"");
        let id: DatasetId = serde_json::from_str("\"HuSHeM\"").unwrap();
        assert_eq!(id, DatasetId::HuSHeM);
    }
}
