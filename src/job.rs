//! 解析ジョブのバックグラウンド実行
//!
//! 推論はブロッキング処理のため `spawn_blocking` のワーカーで実行し、
//! 進捗と結果はチャネル経由で呼び出し側へ通知します。
//! 1つのジョブでは進捗 (25, 50, 75, 100) が昇順に届いた後、終端イベントがちょうど1回届きます。

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::classifier::{Classifier, Prediction};
use crate::error::ClassifyError;
use crate::model::{ConfidenceSource, DatasetSpec};
use crate::report::{default_confidences, format_report, parse_report, ConfidenceReport};
use crate::types::InferenceRequest;

/// 推論バックエンドが無いときのメッセージ
pub const MODEL_NOT_AVAILABLE: &str = "Model not available";

/// 進捗の通知点
pub const PROGRESS_STARTED: u8 = 25;
pub const PROGRESS_PREPROCESSED: u8 = 50;
pub const PROGRESS_PREDICTED: u8 = 75;
pub const PROGRESS_FORMATTED: u8 = 100;

/// 成功時の結果
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    /// `label: value%` 形式のレポート
    pub report_text: String,
    pub prediction: String,
    pub confidences: ConfidenceReport,
}

/// ワーカーから届くイベント
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Progress(u8),
    /// 画像が指定されていなかった（進捗は送られない）
    NoInput,
    Completed(AnalysisOutcome),
    Failed(String),
}

impl JobEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobEvent::Progress(_))
    }
}

/// ジョブの終端結果
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    NoInput,
    Completed(AnalysisOutcome),
    Failed(String),
}

/// 実行中のジョブ
///
/// 同時に実行できるジョブは呼び出し側ごとに1つまで。
/// ランナー自身は排他制御をしないため、呼び出し側が完了まで次のジョブを開始しないこと。
pub struct JobHandle {
    events: mpsc::UnboundedReceiver<JobEvent>,
    task: JoinHandle<()>,
}

impl JobHandle {
    /// 次のイベント（終端イベントの後は None）
    pub async fn next_event(&mut self) -> Option<JobEvent> {
        self.events.recv().await
    }

    /// 終端イベントまで待つ
    ///
    /// 途中の進捗は `on_progress` に渡されます。
    pub async fn wait_with_progress<F: FnMut(u8)>(mut self, mut on_progress: F) -> JobOutcome {
        while let Some(event) = self.events.recv().await {
            match event {
                JobEvent::Progress(value) => on_progress(value),
                JobEvent::NoInput => return JobOutcome::NoInput,
                JobEvent::Completed(outcome) => return JobOutcome::Completed(outcome),
                JobEvent::Failed(message) => return JobOutcome::Failed(message),
            }
        }
        // 終端イベント無しでチャネルが閉じた
        let reason = match self.task.await {
            Err(e) => e.to_string(),
            Ok(()) => "worker exited without a result".to_string(),
        };
        JobOutcome::Failed(format!("Processing error: {}", reason))
    }

    pub async fn wait(self) -> JobOutcome {
        self.wait_with_progress(|_| {}).await
    }
}

/// ジョブを開始
///
/// `classifier` が None のとき（推論バックエンド無しでビルドされた場合など）は失敗を通知します。
/// Tokioランタイム内から呼ぶこと。
pub fn spawn_analysis(
    classifier: Option<Arc<dyn Classifier>>,
    request: InferenceRequest,
    confidence_source: ConfidenceSource,
) -> JobHandle {
    let (tx, events) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        let image_path = match request.image() {
            Some(path) => path.to_path_buf(),
            None => {
                tx.send(JobEvent::NoInput).ok();
                return;
            }
        };

        let worker_tx = tx.clone();
        let worker = tokio::task::spawn_blocking(move || {
            run_job(classifier, &request, image_path, confidence_source, &worker_tx)
        });

        // ワーカー内のパニックは失敗として通知
        if let Err(e) = worker.await {
            warn!("解析ワーカーが異常終了しました: {}", e);
            tx.send(JobEvent::Failed(format!("Processing error: {}", e))).ok();
        }
    });

    JobHandle { events, task }
}

fn run_job(
    classifier: Option<Arc<dyn Classifier>>,
    request: &InferenceRequest,
    image_path: PathBuf,
    confidence_source: ConfidenceSource,
    tx: &mpsc::UnboundedSender<JobEvent>,
) {
    let send = |event: JobEvent| {
        tx.send(event).ok();
    };

    send(JobEvent::Progress(PROGRESS_STARTED));
    let Some(classifier) = classifier else {
        send(JobEvent::Failed(MODEL_NOT_AVAILABLE.to_string()));
        return;
    };

    let spec = request.dataset.spec();
    send(JobEvent::Progress(PROGRESS_PREPROCESSED));
    debug!(
        "{} / {} で解析を開始します (モデル選択は重みの選択に影響しません)",
        spec.id, request.model
    );

    let probabilities = match classifier.classify(spec, &image_path) {
        Ok(Prediction::Probabilities(p)) => p,
        Ok(Prediction::NoInput) => {
            send(JobEvent::NoInput);
            return;
        }
        Err(e) => {
            send(JobEvent::Failed(e.to_string()));
            return;
        }
    };
    send(JobEvent::Progress(PROGRESS_PREDICTED));

    match build_outcome(spec, &probabilities, confidence_source) {
        Ok(outcome) => {
            send(JobEvent::Progress(PROGRESS_FORMATTED));
            send(JobEvent::Completed(outcome));
        }
        Err(e) => send(JobEvent::Failed(e.to_string())),
    }
}

/// 確率ベクトルから結果を組み立てる
pub fn build_outcome(
    spec: &DatasetSpec,
    probabilities: &[f32],
    confidence_source: ConfidenceSource,
) -> Result<AnalysisOutcome, ClassifyError> {
    let report = format_report(spec, probabilities)?;

    let confidences = match confidence_source {
        ConfidenceSource::Numeric => report.confidences,
        ConfidenceSource::ParsedReport => match parse_report(&report.text) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("{}。既定の信頼度を使用します", e);
                default_confidences(spec.id)
            }
        },
    };

    Ok(AnalysisOutcome {
        report_text: report.text,
        prediction: report.predicted_label,
        confidences,
    })
}
