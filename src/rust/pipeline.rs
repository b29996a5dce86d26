//! The end-to-end analysis run: load, project, cross-validate, pick `k`, ROC.

use anyhow::{Context, Result};
use log::info;

use crate::config::PipelineConfig;
use crate::data::{load_data, EmbeddingDataset};
use crate::evaluation::{evaluate_knn, evaluate_roc, select_best_k, KnnEvaluation, RocReport};
use crate::visualization::{project_tsne, projection_figure, roc_figure, Figure, Projection};

/// Everything a run computed, for callers that need more than the printed summary.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub n_samples: usize,
    pub n_features: usize,
    pub n_classes: usize,
    pub projection: Projection,
    pub evaluations: Vec<KnnEvaluation>,
    pub best_k: usize,
    pub roc: RocReport,
}

/// Runs every stage in order. The first failing stage aborts the run.
pub fn run(config: &PipelineConfig) -> Result<PipelineReport> {
    println!("Loading data...");
    let dataset = load_data(&config.input)
        .with_context(|| format!("failed to load {}", config.input.display()))?;
    println!(
        "Data loaded: {} samples, {} features",
        dataset.n_samples(),
        dataset.n_features()
    );
    run_on(&dataset, config)
}

/// Runs the stages after loading on an in-memory dataset.
pub fn run_on(dataset: &EmbeddingDataset, config: &PipelineConfig) -> Result<PipelineReport> {
    config.validate()?;

    println!("Generating t-SNE visualization...");
    let projection = project_tsne(dataset, &config.tsne_options()).context("t-SNE projection failed")?;
    display(&projection_figure(&projection), config.display)?;

    println!("Evaluating KNN...");
    let evaluations = evaluate_knn(dataset, config.k_min..=config.k_max, config.folds)
        .context("cross-validation failed")?;
    for evaluation in &evaluations {
        println!(
            "k={}: Euclidean={:.4}, Cosine={:.4}",
            evaluation.k, evaluation.accuracy_euclidean, evaluation.accuracy_cosine
        );
    }

    let best_k = select_best_k(&evaluations).context("no k produced a usable accuracy")?;
    println!("Best K found: {}", best_k);

    println!("Generating ROC curve...");
    let roc = evaluate_roc(dataset, best_k, &config.roc_options()).context("ROC evaluation failed")?;
    for curve in roc.curves() {
        println!("{} AUC = {:.2}", curve.metric.title(), curve.auc);
    }
    display(&roc_figure(&roc), config.display)?;

    println!("Done!");
    Ok(PipelineReport {
        n_samples: dataset.n_samples(),
        n_features: dataset.n_features(),
        n_classes: dataset.n_classes(),
        projection,
        evaluations,
        best_k,
        roc,
    })
}

fn display(figure: &Figure, enabled: bool) -> Result<()> {
    if !enabled {
        info!("Display disabled, not showing '{}'", figure.title);
        return Ok(());
    }
    figure
        .show()
        .with_context(|| format!("failed to show '{}'", figure.title))?;
    Ok(())
}
