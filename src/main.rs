//! 精子形態分類 CLI

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};

use sperm_morphology::diagnose::run_diagnostics;
use sperm_morphology::history::default_export_file_name;
use sperm_morphology::model::{create_bundle, install_bundle};
use sperm_morphology::report::{morphology_definition, ConfidenceLevel};
use sperm_morphology::{
    load_classifier, spawn_analysis, AnalysisHistory, AnalysisRecord, AppConfig, DatasetId,
    InferenceRequest, JobOutcome, ModelKind,
};

#[derive(Parser)]
#[command(name = "sperm-morphology")]
#[command(about = "Sperm morphology classification from microscope images")]
#[command(version)]
struct Cli {
    /// 設定ファイル
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify one image
    Analyze {
        /// Dataset (HuSHeM or SMIDS)
        #[arg(short, long)]
        dataset: DatasetId,
        /// Model name (recorded in history only)
        #[arg(short, long, default_value = "MobileNet")]
        model: ModelKind,
        /// Image to classify (omit to run without input)
        #[arg(short, long)]
        image: Option<PathBuf>,
        /// Also export the history to this file (.json or .csv)
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// List datasets, classes and model kinds
    Datasets,
    /// Check backend and artifacts
    Diagnose,
    /// Manage analysis history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Package or install model artifacts
    Bundle {
        #[command(subcommand)]
        action: BundleAction,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Print all records
    Show,
    /// Remove all records
    Clear,
    /// Write records to a .json or .csv file
    Export {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum BundleAction {
    Create {
        #[arg(short, long)]
        dataset: DatasetId,
        #[arg(short, long)]
        output: PathBuf,
    },
    Install {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        dataset: DatasetId,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load_or_default_from(&config_path);

    match cli.command {
        Commands::Analyze { dataset, model, image, export } => {
            cmd_analyze(&mut config, &config_path, dataset, model, image, export).await
        }
        Commands::Datasets => {
            cmd_datasets();
            Ok(())
        }
        Commands::Diagnose => cmd_diagnose(&config),
        Commands::History { action } => cmd_history(&config, action),
        Commands::Bundle { action } => cmd_bundle(&config, action),
    }
}

const NO_AUTO_SAVE: &str = "履歴の自動保存先が設定されていません (history.auto_save_path)";

fn export_history(history: &AnalysisHistory, output: &Path) -> Result<()> {
    let is_csv = output
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        history.export_csv(output)?;
    } else {
        history.export_json(output)?;
    }
    println!("✓ {} 件を書き出しました: {}", history.len(), output.display());
    Ok(())
}

async fn cmd_analyze(
    config: &mut AppConfig,
    config_path: &Path,
    dataset: DatasetId,
    model: ModelKind,
    image: Option<PathBuf>,
    export: Option<PathBuf>,
) -> Result<()> {
    let request = match &image {
        Some(path) => InferenceRequest::new(dataset, model, path.clone()),
        None => InferenceRequest::without_image(dataset, model),
    };

    let job = spawn_analysis(load_classifier(config), request.clone(), config.confidence_source);
    let outcome = job
        .wait_with_progress(|value| {
            print!("\r進捗: {:>3}%", value);
            std::io::stdout().flush().ok();
        })
        .await;
    println!();

    let outcome = match outcome {
        JobOutcome::NoInput => {
            println!("画像が指定されていません。");
            return Ok(());
        }
        JobOutcome::Failed(message) => bail!(message),
        JobOutcome::Completed(outcome) => outcome,
    };

    println!("\n=== {} / {} ===", dataset, model);
    print!("{}", outcome.report_text);
    println!("\n予測: {}", outcome.prediction);

    let record = AnalysisRecord::now(&request, &outcome.prediction, outcome.confidences);
    let confidence = record.max_confidence();
    println!("{}", ConfidenceLevel::explain(confidence));
    if confidence < config.confidence_threshold {
        println!(
            "⚠ 信頼度が閾値 {:.0}% を下回っています。専門家によるレビューを推奨します。",
            config.confidence_threshold
        );
    }

    if let Some(definition) = morphology_definition(dataset, &outcome.prediction) {
        println!("\n{}", definition.description);
        println!("特徴: {}", definition.characteristics);
        println!("臨床的意義: {}", definition.clinical_impact);
    }

    let history = AnalysisHistory::record_with_auto_save(config.history.auto_save_path.as_deref(), record)?;

    if let Some(output) = export {
        export_history(&history, &output)?;
    }

    config.remember_selection(dataset.as_str(), model.as_str(), request.image());
    config.save(config_path)?;
    Ok(())
}

fn cmd_datasets() {
    for id in DatasetId::ALL {
        let spec = id.spec();
        println!("{}", spec.summary());
        for class in spec.classes {
            println!("  - {}", class);
        }
    }
    println!("\nモデル:");
    for kind in ModelKind::ALL {
        println!("  {:<10} {}", kind.as_str(), kind.description());
    }
}

fn cmd_diagnose(config: &AppConfig) -> Result<()> {
    config.display();
    let classifier = load_classifier(config);
    let report = run_diagnostics(config, classifier.as_ref());
    report.print();
    if !report.all_passed() {
        bail!("{} 件の診断項目が失敗しました", report.failures().count());
    }
    Ok(())
}

fn cmd_history(config: &AppConfig, action: HistoryAction) -> Result<()> {
    let Some(path) = config.history.auto_save_path.as_deref() else {
        println!("{}", NO_AUTO_SAVE);
        return Ok(());
    };
    let mut history = AnalysisHistory::load_or_empty(path)?;
    match action {
        HistoryAction::Show => {
            if history.is_empty() {
                println!("履歴はありません");
            }
            for record in history.records() {
                println!("{}  [{} / {}] {}", record.summary_line(), record.dataset, record.model, record.image_path);
            }
        }
        HistoryAction::Clear => {
            history.clear();
            history.export_json(path)?;
            println!("✓ 履歴を削除しました");
        }
        HistoryAction::Export { output } => {
            let output = output
                .unwrap_or_else(|| PathBuf::from(default_export_file_name(chrono::Local::now())));
            export_history(&history, &output)?;
        }
    }
    Ok(())
}

fn cmd_bundle(config: &AppConfig, action: BundleAction) -> Result<()> {
    match action {
        BundleAction::Create { dataset, output } => {
            let path = create_bundle(dataset.spec(), &config.artifact_root, &output)?;
            println!("✓ バンドルを作成しました: {}", path.display());
        }
        BundleAction::Install { input, dataset } => {
            let paths = install_bundle(&input, dataset.spec(), &config.artifact_root)?;
            println!("✓ {} を配置しました: {}", dataset, paths.weights.display());
        }
    }
    Ok(())
}
