//! 解析履歴の保持とエクスポート

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::types::AnalysisRecord;

/// 解析履歴（追記のみ、クリアは全件）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisHistory {
    records: Vec<AnalysisRecord>,
}

impl AnalysisHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: AnalysisRecord) {
        self.records.push(record);
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn records(&self) -> &[AnalysisRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// JSON配列として全件を書き出す
    pub fn export_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(&self.records)
            .context("Failed to serialize analysis history")?;
        fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
        info!("{}件の解析結果を書き出しました: {}", self.records.len(), path.display());
        Ok(())
    }

    /// JSON配列から読み込む
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let records: Vec<AnalysisRecord> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse analysis history {:?}", path))?;
        Ok(Self { records })
    }

    /// ファイルがなければ空の履歴
    pub fn load_or_empty<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load_json(path)
        } else {
            Ok(Self::new())
        }
    }

    /// 1件追加し、自動保存先があれば履歴全体を書き直す
    ///
    /// `auto_save_path` が None のときはディスクに触れず、今回の1件だけの履歴を返します。
    pub fn record_with_auto_save(auto_save_path: Option<&Path>, record: AnalysisRecord) -> Result<Self> {
        let mut history = match auto_save_path {
            Some(path) => Self::load_or_empty(path)?,
            None => Self::new(),
        };
        history.push(record);
        if let Some(path) = auto_save_path {
            history
                .export_json(path)
                .with_context(|| format!("Failed to auto-save analysis history {:?}", path))?;
        }
        Ok(history)
    }

    /// CSVとして書き出す（信頼度は最大値のみ）
    pub fn export_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path.as_ref())
            .with_context(|| format!("Failed to create {:?}", path.as_ref()))?;
        writer.write_record(["timestamp", "image_path", "prediction", "confidence", "dataset", "model"])?;
        for record in &self.records {
            let confidence = format!("{:.2}", record.max_confidence());
            writer.write_record([
                record.timestamp.as_str(),
                record.image_path.as_str(),
                record.prediction.as_str(),
                confidence.as_str(),
                record.dataset.as_str(),
                record.model.as_str(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// エクスポートの既定ファイル名
pub fn default_export_file_name(now: chrono::DateTime<chrono::Local>) -> String {
    format!("sperm_analysis_{}.json", now.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ConfidenceReport;
    use chrono::TimeZone;

    fn record(prediction: &str, scores: &[(&str, f64)]) -> AnalysisRecord {
        AnalysisRecord {
            timestamp: "2025-06-30 08:50:35".to_string(),
            image_path: "/data/cells/01.png".to_string(),
            prediction: prediction.to_string(),
            confidence_scores: scores.iter().map(|(l, v)| (l.to_string(), *v)).collect::<ConfidenceReport>(),
            dataset: "HuSHeM".to_string(),
            model: "MobileNet".to_string(),
        }
    }

    #[test]
    fn test_json_export_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exports").join("history.json");

        let mut history = AnalysisHistory::new();
        history.push(record("Normal", &[("Normal", 70.5), ("Tapered", 20.25), ("Pyriform", 5.0), ("Amorphous", 4.25)]));
        history.push(record("Amorphous", &[("Normal", 1.0), ("Tapered", 2.0), ("Pyriform", 3.0), ("Amorphous", 94.0)]));
        history.export_json(&path).unwrap();

        let loaded = AnalysisHistory::load_json(&path).unwrap();
        assert_eq!(loaded, history);
    }

    #[test]
    fn test_json_reload_keeps_computed_percentages() {
        use crate::model::HUSHEM;
        use crate::report::format_report;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        // 正規化で得られる任意のf64値でも値が変わらないこと
        let mut state: u32 = 12345;
        let mut next = || {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            ((state >> 8) % 10_000) as f32 / 10_000.0 + 1e-4
        };
        let mut history = AnalysisHistory::new();
        for _ in 0..500 {
            let probabilities = [next(), next(), next(), next()];
            let report = format_report(&HUSHEM, &probabilities).unwrap();
            let mut entry = record(&report.predicted_label, &[]);
            entry.confidence_scores = report.confidences;
            history.push(entry);
        }
        history.export_json(&path).unwrap();

        let loaded = AnalysisHistory::load_json(&path).unwrap();
        let mismatched = loaded
            .records()
            .iter()
            .zip(history.records())
            .filter(|(a, b)| a != b)
            .count();
        assert_eq!(mismatched, 0);
        assert_eq!(loaded.len(), 500);
    }

    #[test]
    fn test_json_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut history = AnalysisHistory::new();
        history.push(record("Sperm", &[("Sperm", 100.0)]));
        history.export_json(&path).unwrap();

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let first = &value[0];
        for key in ["timestamp", "image_path", "prediction", "confidence_scores", "dataset", "model"] {
            assert!(first.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(first["confidence_scores"]["Sperm"], 100.0);
    }

    #[test]
    fn test_auto_save_only_when_configured() {
        let dir = tempfile::tempdir().unwrap();

        let history = AnalysisHistory::record_with_auto_save(None, record("Normal", &[("Normal", 100.0)])).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);

        let path = dir.path().join("auto").join("history.json");
        AnalysisHistory::record_with_auto_save(Some(&path), record("Normal", &[("Normal", 100.0)])).unwrap();
        let history =
            AnalysisHistory::record_with_auto_save(Some(&path), record("Tapered", &[("Tapered", 100.0)])).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(AnalysisHistory::load_json(&path).unwrap(), history);
    }

    #[test]
    fn test_clear_discards_everything() {
        let mut history = AnalysisHistory::new();
        history.push(record("Normal", &[("Normal", 100.0)]));
        history.push(record("Normal", &[("Normal", 100.0)]));
        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn test_load_or_empty() {
        let dir = tempfile::tempdir().unwrap();
        let history = AnalysisHistory::load_or_empty(dir.path().join("none.json")).unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn test_csv_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        let mut history = AnalysisHistory::new();
        history.push(record("Normal", &[("Normal", 70.5), ("Tapered", 29.5)]));
        history.export_csv(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("timestamp,image_path,prediction,confidence,dataset,model"));
        assert_eq!(lines.next(), Some("2025-06-30 08:50:35,/data/cells/01.png,Normal,70.50,HuSHeM,MobileNet"));
    }

    #[test]
    fn test_default_export_file_name() {
        let now = chrono::Local.with_ymd_and_hms(2025, 6, 30, 8, 50, 35).unwrap();
        assert_eq!(default_export_file_name(now), "sperm_analysis_20250630_085035.json");
    }
}
