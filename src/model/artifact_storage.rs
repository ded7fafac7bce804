//! 学習済みアーティファクトの配置確認とバンドル
//!
//! アーティファクトはデータセットごとのディレクトリに置かれます:
//! - architecture.json - ネットワーク構成
//! - weights.bin       - モデルの重み（バイナリ）
//!
//! 配布用に2ファイルを1つのtar.gzにまとめることもできます。

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};
use tracing::info;

use crate::error::ClassifyError;
use crate::model::registry::{DatasetSpec, ARCHITECTURE_FILE, WEIGHTS_FILE};

/// 1データセット分のアーティファクトの場所
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPaths {
    pub architecture: PathBuf,
    pub weights: PathBuf,
}

impl ArtifactPaths {
    pub fn for_dataset(spec: &DatasetSpec, artifact_root: &Path) -> Self {
        Self {
            architecture: spec.architecture_path(artifact_root),
            weights: spec.weights_path(artifact_root),
        }
    }

    /// 両方のファイルが存在することを確認
    pub fn ensure_exist(&self) -> Result<(), ClassifyError> {
        for path in [&self.architecture, &self.weights] {
            if !path.is_file() {
                return Err(ClassifyError::ArtifactNotFound { path: path.clone() });
            }
        }
        Ok(())
    }

    /// 重みファイルのサイズ（MB）
    pub fn weights_size_mb(&self) -> Option<f64> {
        std::fs::metadata(&self.weights)
            .ok()
            .map(|m| m.len() as f64 / 1024.0 / 1024.0)
    }
}

/// アーティファクトをTar.gz形式で1ファイルにまとめる
pub fn create_bundle(spec: &DatasetSpec, artifact_root: &Path, output_path: &Path) -> Result<PathBuf> {
    let paths = ArtifactPaths::for_dataset(spec, artifact_root);
    paths.ensure_exist()?;

    // output_pathがすでに.tar.gzで終わっている場合はそのまま、そうでなければ拡張子を追加
    let tar_gz_path = if output_path.extension().and_then(|s| s.to_str()) == Some("gz") {
        output_path.to_path_buf()
    } else {
        output_path.with_extension("tar.gz")
    };

    if let Some(parent) = tar_gz_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {:?}", parent))?;
    }

    let tar_gz_file = File::create(&tar_gz_path)
        .with_context(|| format!("Failed to create tar.gz file: {:?}", tar_gz_path))?;
    let encoder = GzEncoder::new(tar_gz_file, Compression::default());
    let mut tar_builder = Builder::new(encoder);

    tar_builder
        .append_path_with_name(&paths.architecture, ARCHITECTURE_FILE)
        .with_context(|| format!("Failed to add {} to tar", ARCHITECTURE_FILE))?;
    tar_builder
        .append_path_with_name(&paths.weights, WEIGHTS_FILE)
        .with_context(|| format!("Failed to add {} to tar", WEIGHTS_FILE))?;

    let encoder = tar_builder
        .into_inner()
        .context("Failed to finalize tar.gz archive")?;
    encoder.finish().context("Failed to finish gzip stream")?;

    info!("{} のアーティファクトをバンドルしました: {}", spec.id, tar_gz_path.display());
    Ok(tar_gz_path)
}

/// Tar.gzバンドルをデータセットのアーティファクトディレクトリへ展開
///
/// 2ファイルが揃っていないバンドルは何も書き込まずにエラーにします。
pub fn install_bundle(bundle_path: &Path, spec: &DatasetSpec, artifact_root: &Path) -> Result<ArtifactPaths> {
    let tar_gz_file = File::open(bundle_path)
        .with_context(|| format!("Failed to open tar.gz file: {:?}", bundle_path))?;
    let decoder = GzDecoder::new(tar_gz_file);
    let mut archive = Archive::new(decoder);

    let mut architecture: Option<Vec<u8>> = None;
    let mut weights: Option<Vec<u8>> = None;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?;

        let slot = match path.to_str() {
            Some(ARCHITECTURE_FILE) => &mut architecture,
            Some(WEIGHTS_FILE) => &mut weights,
            _ => continue,
        };
        let mut buffer = Vec::new();
        entry.read_to_end(&mut buffer)?;
        *slot = Some(buffer);
    }

    let (architecture, weights) = match (architecture, weights) {
        (Some(a), Some(w)) => (a, w),
        (None, _) => anyhow::bail!("{} not found in tar.gz archive", ARCHITECTURE_FILE),
        (_, None) => anyhow::bail!("{} not found in tar.gz archive", WEIGHTS_FILE),
    };

    let paths = ArtifactPaths::for_dataset(spec, artifact_root);
    let dir = spec.artifact_path(artifact_root);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create artifact directory: {:?}", dir))?;
    std::fs::write(&paths.architecture, architecture)?;
    std::fs::write(&paths.weights, weights)?;

    info!("{} のアーティファクトを展開しました: {}", spec.id, dir.display());
    Ok(paths)
}
