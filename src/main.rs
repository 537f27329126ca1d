use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

use dogwrangle::config::{Config, DEFAULT_CONFIG_PATH};
use dogwrangle::infra::http_client::ReqwestHttp;
use dogwrangle::observability::{init_logging, metrics};
use dogwrangle::pipeline::{Pipeline, PipelineResult};
use dogwrangle::storage::write_atomic;

const METRICS_SNAPSHOT_FILE: &str = "metrics.prom";

#[derive(Parser)]
#[command(name = "dogwrangle")]
#[command(about = "Gather, clean and merge dog-rating post archives into one tidy table")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the run configuration
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: gather, assess, clean, merge, persist and report
    Run {
        /// Re-read the cached predictions file instead of downloading it
        #[arg(long)]
        use_cache: bool,
    },
    /// Gather the sources and print quality assessments without writing output
    Assess {
        /// Re-read the cached predictions file instead of downloading it
        #[arg(long)]
        use_cache: bool,
    },
}

fn print_summary(result: &PipelineResult) {
    println!("\n📊 Pipeline results:");
    println!("   Archive rows: {}", result.archive_rows);
    println!("   Prediction rows: {}", result.prediction_rows);
    println!(
        "   Engagement records: {} ({} lines skipped)",
        result.engagement_records, result.skipped_engagement_lines
    );
    println!("\n🧹 Cleaning steps:");
    for step in &result.steps {
        println!("   {}", step);
    }
    println!("\n💾 Merged rows: {}", result.merged_rows);
    println!("   Output file: {}", result.output.path.display());
    println!("   SHA-256: {}", result.output.sha256);
    println!("\n{}", result.report);
    for chart in &result.artifacts.charts {
        println!("📈 Chart: {}", chart.display());
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    let _guard = init_logging(&config.logging.dir);

    let prometheus = match metrics::init() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            None
        }
    };

    let http = ReqwestHttp::new(Duration::from_secs(config.http.timeout_seconds))
        .context("building HTTP client")?;
    let report_dir = config.output.report_dir.clone();

    match cli.command {
        Commands::Run { use_cache } => {
            println!("🚀 Running wrangling pipeline...");
            let pipeline = Pipeline::new(config, Box::new(http)).use_cache(use_cache);
            match pipeline.run().await {
                Ok(result) => {
                    info!("Pipeline finished");
                    print_summary(&result);
                }
                Err(e) => {
                    error!("Pipeline failed: {}", e);
                    return Err(e).context("pipeline run failed; no merged output was written");
                }
            }
        }
        Commands::Assess { use_cache } => {
            println!("🔍 Assessing sources...");
            let pipeline = Pipeline::new(config, Box::new(http)).use_cache(use_cache);
            let gathered = pipeline.gather().await.context("gathering sources")?;
            let assessment = Pipeline::assess(&gathered).context("assessing sources")?;

            for table in &assessment.tables {
                println!("\n{}", table);
            }
            println!(
                "Engagement lines skipped: {}",
                assessment.skipped_engagement_lines
            );
            if assessment.issues.is_empty() {
                println!("\n✅ No archive quality issues found");
            } else {
                println!("\n⚠️  Archive quality issues:");
                for issue in &assessment.issues {
                    println!(
                        "   - [{:?}] {}: {} ({} rows)",
                        issue.severity,
                        issue.column.as_deref().unwrap_or("-"),
                        issue.description,
                        issue.affected_rows
                    );
                }
            }
        }
    }

    if let Some(handle) = prometheus {
        let path = report_dir.join(METRICS_SNAPSHOT_FILE);
        write_atomic(&path, handle.render().as_bytes())
            .with_context(|| format!("writing metrics snapshot to {}", path.display()))?;
        info!("Metrics snapshot written to {}", path.display());
    }

    Ok(())
}
