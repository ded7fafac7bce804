//! 実行環境の診断
//!
//! 推論バックエンド、アーティファクトの配置、入力なし呼び出しの応答を確認します。

use std::path::Path;
use std::sync::Arc;

use crate::classifier::{Classifier, Prediction};
use crate::model::{AppConfig, ArtifactPaths, DatasetId};

/// 1項目の診断結果
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticCheck {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl DiagnosticCheck {
    fn new(name: impl Into<String>, passed: bool, detail: impl Into<String>) -> Self {
        Self { name: name.into(), passed, detail: detail.into() }
    }
}

/// 診断結果一覧
#[derive(Debug, Clone, Default)]
pub struct DiagnosticReport {
    pub checks: Vec<DiagnosticCheck>,
}

impl DiagnosticReport {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &DiagnosticCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }

    pub fn print(&self) {
        for check in &self.checks {
            let mark = if check.passed { "✓" } else { "✗" };
            println!("{} {}: {}", mark, check.name, check.detail);
        }
    }
}

/// 全項目を診断
pub fn run_diagnostics(config: &AppConfig, classifier: Option<&Arc<dyn Classifier>>) -> DiagnosticReport {
    let mut report = DiagnosticReport::default();

    report.checks.push(match classifier {
        Some(_) => DiagnosticCheck::new("backend", true, format!("inference backend ready ({})", config.device_type)),
        None => DiagnosticCheck::new("backend", false, "built without the `ml` feature"),
    });

    for id in DatasetId::ALL {
        let paths = ArtifactPaths::for_dataset(id.spec(), &config.artifact_root);
        let check = match paths.ensure_exist() {
            Ok(()) => DiagnosticCheck::new(
                format!("{} artifacts", id),
                true,
                format!(
                    "{} + {} ({:.1} MB)",
                    paths.architecture.display(),
                    paths.weights.display(),
                    paths.weights_size_mb().unwrap_or(0.0)
                ),
            ),
            Err(e) => DiagnosticCheck::new(format!("{} artifacts", id), false, e.to_string()),
        };
        report.checks.push(check);
    }

    if let Some(classifier) = classifier {
        let spec = DatasetId::HuSHeM.spec();
        let check = match classifier.classify(spec, Path::new("")) {
            Ok(Prediction::NoInput) => {
                DiagnosticCheck::new("self-check", true, "responds correctly to empty input")
            }
            Ok(other) => DiagnosticCheck::new("self-check", false, format!("unexpected response: {:?}", other)),
            Err(e) => DiagnosticCheck::new("self-check", false, e.to_string()),
        };
        report.checks.push(check);
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClassifyError;
    use crate::model::DatasetSpec;
    use crate::model::registry::{ARCHITECTURE_FILE, WEIGHTS_FILE};

    struct EmptyAware;

    impl Classifier for EmptyAware {
        fn classify(&self, _spec: &DatasetSpec, image_path: &Path) -> Result<Prediction, ClassifyError> {
            if image_path.as_os_str().is_empty() {
                Ok(Prediction::NoInput)
            } else {
                Ok(Prediction::Probabilities(vec![1.0]))
            }
        }
    }

    #[test]
    fn test_missing_everything() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig { artifact_root: dir.path().to_path_buf(), ..AppConfig::default() };
        let report = run_diagnostics(&config, None);
        assert!(!report.all_passed());
        assert_eq!(report.failures().count(), 3);
    }

    #[test]
    fn test_all_checks_pass() {
        let dir = tempfile::tempdir().unwrap();
        for id in DatasetId::ALL {
            let artifact_dir = id.spec().artifact_path(dir.path());
            std::fs::create_dir_all(&artifact_dir).unwrap();
            std::fs::write(artifact_dir.join(ARCHITECTURE_FILE), "{}").unwrap();
            std::fs::write(artifact_dir.join(WEIGHTS_FILE), [0u8; 16]).unwrap();
        }
        let config = AppConfig { artifact_root: dir.path().to_path_buf(), ..AppConfig::default() };
        let classifier: Arc<dyn Classifier> = Arc::new(EmptyAware);

        let report = run_diagnostics(&config, Some(&classifier));
        assert!(report.all_passed(), "{:?}", report);
        assert_eq!(report.checks.len(), 4);
    }
}
