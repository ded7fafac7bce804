//! 推論結果の整形
//!
//! 確率ベクトルを `label: value%` 形式のレポートと信頼度マップに変換します。

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use crate::error::ClassifyError;
use crate::model::{DatasetId, DatasetSpec};

/// クラスごとの信頼度（%）
///
/// クラス順序を保ったまま、JSONではラベル→値のオブジェクトとして表現します。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfidenceReport {
    entries: Vec<(String, f64)>,
}

impl ConfidenceReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同じラベルは上書き
    pub fn insert(&mut self, label: impl Into<String>, percentage: f64) {
        let label = label.into();
        match self.entries.iter_mut().find(|(l, _)| *l == label) {
            Some(entry) => entry.1 = percentage,
            None => self.entries.push((label, percentage)),
        }
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.entries.iter().find(|(l, _)| l == label).map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(l, v)| (l.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, v)| v).sum()
    }

    /// 最大の信頼度を持つエントリ（同値は先頭優先）
    pub fn top(&self) -> Option<(&str, f64)> {
        let mut best: Option<(&str, f64)> = None;
        for (label, value) in self.iter() {
            if best.map_or(true, |(_, b)| value > b) {
                best = Some((label, value));
            }
        }
        best
    }
}

impl FromIterator<(String, f64)> for ConfidenceReport {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut report = ConfidenceReport::new();
        for (label, value) in iter {
            report.insert(label, value);
        }
        report
    }
}

impl Serialize for ConfidenceReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, value) in &self.entries {
            map.serialize_entry(label, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ConfidenceReport {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ReportVisitor;

        impl<'de> Visitor<'de> for ReportVisitor {
            type Value = ConfidenceReport;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of class label to percentage")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut report = ConfidenceReport::new();
                while let Some((label, value)) = access.next_entry::<String, f64>()? {
                    report.insert(label, value);
                }
                Ok(report)
            }
        }

        deserializer.deserialize_map(ReportVisitor)
    }
}

/// 整形済みの推論結果
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedReport {
    /// 1行1クラスの `label: value%` テキスト
    pub text: String,
    /// 最大確率のクラス
    pub predicted_label: String,
    /// 数値のままの信頼度
    pub confidences: ConfidenceReport,
}

/// 確率ベクトルをレポートに整形
///
/// 合計で割ってから100倍するため、出力が正規化されていないモデルでも合計は100%になります。
pub fn format_report(spec: &DatasetSpec, probabilities: &[f32]) -> Result<FormattedReport, ClassifyError> {
    if probabilities.is_empty() || spec.classes.is_empty() {
        return Err(ClassifyError::EmptyVector);
    }
    if probabilities.len() != spec.num_classes() {
        return Err(ClassifyError::processing(format!(
            "model returned {} probabilities, {} expects {} classes",
            probabilities.len(),
            spec.id,
            spec.num_classes()
        )));
    }

    let total: f64 = probabilities.iter().map(|&p| p as f64).sum();
    if !total.is_finite() || total <= 0.0 || probabilities.iter().any(|&p| p < 0.0 || !p.is_finite()) {
        return Err(ClassifyError::processing(format!(
            "invalid probability vector: {:?}",
            probabilities
        )));
    }

    let mut text = String::new();
    let mut confidences = ConfidenceReport::new();
    for (label, &p) in spec.classes.iter().zip(probabilities) {
        let percentage = p as f64 / total * 100.0;
        text.push_str(&format!("{}: {:.2}%\n", label, percentage));
        confidences.insert(*label, percentage);
    }

    let predicted = argmax(probabilities).ok_or(ClassifyError::EmptyVector)?;

    Ok(FormattedReport {
        text,
        predicted_label: spec.classes[predicted].to_string(),
        confidences,
    })
}

/// 最大値のインデックス（同値は先頭優先）
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some(b) if v <= values[b] => {}
            _ => best = Some(i),
        }
    }
    best
}

/// レポートのパースエラー
#[derive(Debug, Clone, PartialEq, Error)]
#[error("could not parse report: {0}")]
pub struct ReportParseError(pub String);

/// `label: value%` 形式のテキストを信頼度マップに戻す
///
/// `:` と `%` を含まない行は無視します。該当行が1つもなければエラーです。
pub fn parse_report(text: &str) -> Result<ConfidenceReport, ReportParseError> {
    let mut report = ConfidenceReport::new();
    for line in text.trim().lines() {
        if !(line.contains(':') && line.contains('%')) {
            continue;
        }
        let (label, value) = line
            .split_once(": ")
            .ok_or_else(|| ReportParseError(format!("missing separator in '{}'", line)))?;
        let value: f64 = value
            .trim()
            .trim_end_matches('%')
            .parse()
            .map_err(|e| ReportParseError(format!("'{}': {}", line, e)))?;
        report.insert(label.trim(), value);
    }
    if report.is_empty() {
        return Err(ReportParseError("no 'label: value%' lines".to_string()));
    }
    Ok(report)
}

/// パース失敗時に使う既定の信頼度分布
pub fn default_confidences(dataset: DatasetId) -> ConfidenceReport {
    let values: &[(&str, f64)] = match dataset {
        DatasetId::HuSHeM => &[("Normal", 85.2), ("Tapered", 8.3), ("Pyriform", 4.1), ("Amorphous", 2.4)],
        DatasetId::Smids => &[("Acrosome Abnormality", 15.2), ("Boya", 10.8), ("Sperm", 74.0)],
    };
    values.iter().map(|(l, v)| (l.to_string(), *v)).collect()
}

/// 信頼度の段階
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceLevel {
    VeryHigh,
    High,
    Good,
    Moderate,
    Low,
    VeryLow,
}

impl ConfidenceLevel {
    pub fn from_percentage(confidence: f64) -> Self {
        if confidence >= 90.0 {
            ConfidenceLevel::VeryHigh
        } else if confidence >= 80.0 {
            ConfidenceLevel::High
        } else if confidence >= 70.0 {
            ConfidenceLevel::Good
        } else if confidence >= 60.0 {
            ConfidenceLevel::Moderate
        } else if confidence >= 50.0 {
            ConfidenceLevel::Low
        } else {
            ConfidenceLevel::VeryLow
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ConfidenceLevel::VeryHigh => "Very High Confidence",
            ConfidenceLevel::High => "High Confidence",
            ConfidenceLevel::Good => "Good Confidence",
            ConfidenceLevel::Moderate => "Moderate Confidence",
            ConfidenceLevel::Low => "Low Confidence",
            ConfidenceLevel::VeryLow => "Very Low Confidence",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            ConfidenceLevel::VeryHigh => "This result is highly reliable for clinical consideration.",
            ConfidenceLevel::High => "This result is reliable and suitable for clinical workflow.",
            ConfidenceLevel::Good => "Consider this result reliable but it may benefit from expert review.",
            ConfidenceLevel::Moderate => "Expert review is recommended before making clinical decisions.",
            ConfidenceLevel::Low => "Manual expert review is strongly recommended.",
            ConfidenceLevel::VeryLow => {
                "This result should not be used for clinical decisions without thorough expert validation."
            }
        }
    }

    /// 説明文
    pub fn explain(confidence: f64) -> String {
        let level = Self::from_percentage(confidence);
        format!("{} ({:.1}%): {}", level.title(), confidence, level.recommendation())
    }
}

/// 形態分類の説明
#[derive(Debug, Clone, Copy)]
pub struct MorphologyDefinition {
    pub description: &'static str,
    pub characteristics: &'static str,
    pub clinical_impact: &'static str,
}

/// クラスラベルの説明を取得
pub fn morphology_definition(dataset: DatasetId, label: &str) -> Option<MorphologyDefinition> {
    let def = |description: &'static str, characteristics: &'static str, clinical_impact: &'static str| {
        Some(MorphologyDefinition { description, characteristics, clinical_impact })
    };
    match (dataset, label) {
        (DatasetId::HuSHeM, "Normal") => def(
            "Normal sperm have an oval-shaped head (length 4-5.5 um, width 2.5-3.5 um) with a well-defined acrosome covering 40-70% of the head area.",
            "Smooth, oval head contour; intact midpiece; single, uncoiled tail; no cytoplasmic droplets.",
            "Normal morphology indicates good fertilization potential. WHO considers >=4% normal forms as acceptable for natural conception.",
        ),
        (DatasetId::HuSHeM, "Tapered") => def(
            "Tapered head morphology is characterized by a head that narrows significantly, creating an elongated, cone-like appearance.",
            "Elongated head shape; reduced width; pointed anterior region; may have irregular acrosome.",
            "May indicate reduced fertilization capacity. High percentages of tapered forms are associated with decreased pregnancy rates.",
        ),
        (DatasetId::HuSHeM, "Pyriform") => def(
            "Pyriform (pear-shaped) sperm have heads that are wider at the base and taper toward the anterior end, resembling a pear.",
            "Pear-shaped head; wider posterior region; narrow anterior region; asymmetrical appearance.",
            "Associated with reduced binding to zona pellucida and decreased fertilization rates in both natural and assisted conception.",
        ),
        (DatasetId::HuSHeM, "Amorphous") => def(
            "Amorphous sperm have irregularly shaped heads that do not fit into any other specific morphological category.",
            "Irregular, undefined head shape; variable size; may have multiple abnormalities; asymmetrical contours.",
            "Indicates significant morphological abnormality. High percentages strongly correlate with reduced fertility potential.",
        ),
        (DatasetId::Smids, "Sperm") => def(
            "Normal sperm cell successfully identified in the image with typical morphological features.",
            "Recognizable sperm structure; distinct head, midpiece, and tail regions.",
            "Successful sperm identification allows for further morphological assessment and analysis.",
        ),
        (DatasetId::Smids, "Acrosome Abnormality") => def(
            "Defects in the acrosome region, which is crucial for sperm-egg interaction and fertilization.",
            "Abnormal acrosome size, shape, or position; may be absent, enlarged, or irregularly shaped.",
            "Acrosome abnormalities can severely impact fertilization ability as the acrosome contains enzymes needed for egg penetration.",
        ),
        (DatasetId::Smids, "Boya") => def(
            "Non-sperm cellular debris, artifacts, or other cellular material present in the sample.",
            "Cellular debris; artifacts from sample preparation; non-sperm cells; staining irregularities.",
            "Indicates sample quality issues or preparation artifacts. May require sample re-processing.",
        ),
        _ => None,
    }
}
