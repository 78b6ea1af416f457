use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use eval::{
    ComparisonOutput, OutputFormat, Playground, PlaygroundConfig, ResponseEvaluator,
    answer_with_feedback, plot_latency,
};
use index::QueryMode;
use ingest::FileReader;

const USAGE: &str = "usage: run_playground <docs_dir> <query> [config.json]";

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let docs_dir = PathBuf::from(args.next().context(USAGE)?);
    let query = args.next().context(USAGE)?;
    let config = match args.next() {
        Some(path) => PlaygroundConfig::load(Path::new(&path))?,
        None => PlaygroundConfig::default(),
    };

    init_tracing(config.json_logs);

    println!("=== Index Playground ===\n");

    // Validate configuration before touching the LLM
    let index_kinds = config.index_kinds()?;
    let modes = config.modes()?;
    let service_context = config.service_context()?;

    let documents = FileReader::read_directory(&docs_dir).await?;
    println!("Documents: {}", documents.len());

    let playground = Playground::from_docs_with(&documents, &service_context, &index_kinds, modes).await?;

    let output = playground.compare(&query, OutputFormat::Table).await;

    println!("\n=== RESULTS ===\n");
    if let ComparisonOutput::Table(table) = &output {
        println!("{}", table);
    }

    // Save results
    let output_dir = Path::new(&config.output_dir);
    std::fs::create_dir_all(output_dir)?;

    let records_json = serde_json::to_string_pretty(output.records())?;
    std::fs::write(output_dir.join("comparison.json"), records_json)?;
    println!("✅ Results saved to {}", output_dir.join("comparison.json").display());

    if output.records().is_empty() {
        println!("No supported (index, mode) combinations ran, skipping plot");
    } else {
        plot_latency(output.records(), &output_dir.join("latency.png"))?;
        println!("✅ Plot saved to {}", output_dir.join("latency.png").display());
    }

    if config.feedback_rounds > 0 {
        run_feedback_loop(&playground, &query, config.feedback_rounds, &service_context.llm_predictor).await?;
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Re-ask the first index with evaluator feedback folded into the query
async fn run_feedback_loop(
    playground: &Playground,
    query: &str,
    rounds: usize,
    llm_predictor: &Arc<dyn llm::LlmPredictor>,
) -> Result<()> {
    let index = &playground.indices()[0];
    let evaluator = ResponseEvaluator::new(llm_predictor.clone());

    let (response, evaluations) =
        answer_with_feedback(index, QueryMode::Default, &evaluator, query, rounds).await?;

    println!("\n=== FEEDBACK LOOP ({}) ===\n", index.kind());
    for (round, evaluation) in evaluations.iter().enumerate() {
        println!(
            "Round {}: {}",
            round,
            evaluation.feedback.as_deref().unwrap_or("passed")
        );
    }
    println!("\nFinal answer: {}", response);

    Ok(())
}
