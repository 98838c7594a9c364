use clap::{Parser, Subcommand};
use colored::Colorize;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use dagrefactor_core::{Config, Finding, Report, Severity};
use dagrefactor_dbt::{Manifest, Project};
use dagrefactor_engine::{Analyzer, ComponentSource, FreshParse};
use dagrefactor_incremental::ComponentCache;
use dagrefactor_sql::ComponentParser;

const DEFAULT_CONFIG: &str = "dagrefactor.toml";

/// dagrefactor - structural refactoring analysis for dbt model DAGs
#[derive(Parser)]
#[command(name = "dagrefactor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: dagrefactor.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze the model DAG and write report.json
    Analyze {
        /// Path to dbt manifest.json
        #[arg(short = 'f', long, default_value = "target/manifest.json")]
        manifest: PathBuf,

        /// Output file for report.json
        #[arg(short, long, default_value = "report.json")]
        output: PathBuf,

        /// Directory for rewritten model SQL
        #[arg(short, long)]
        rewrites: Option<PathBuf>,

        /// Override the similarity threshold
        #[arg(long)]
        similarity_threshold: Option<f64>,

        /// Override the complexity score threshold
        #[arg(long)]
        complexity_threshold: Option<f64>,

        /// Parse every model from scratch instead of through the memo database
        #[arg(long)]
        no_cache: bool,

        /// Exit with status 1 when any warning-level finding is reported
        #[arg(long)]
        fail_on_findings: bool,
    },

    /// Show upstream and downstream models of one model
    Impact {
        /// Model name to analyze (can be short name or unique_id)
        model: String,

        /// Path to dbt manifest.json
        #[arg(short = 'f', long, default_value = "target/manifest.json")]
        manifest: PathBuf,

        /// Limit traversal depth
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Print the parsed components of one SQL file as JSON
    Parse {
        /// Model SQL file
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref(), cli.verbose)?;

    if cli.verbose {
        eprintln!("{} dialect: {:?}", "Using".cyan(), config.dialect);
    }

    match cli.command {
        Commands::Analyze {
            manifest,
            output,
            rewrites,
            similarity_threshold,
            complexity_threshold,
            no_cache,
            fail_on_findings,
        } => {
            let mut config = config;
            if let Some(threshold) = similarity_threshold {
                config.similarity.threshold = threshold;
            }
            if let Some(threshold) = complexity_threshold {
                config.complexity.score_threshold = threshold;
            }
            let options = AnalyzeOptions {
                manifest: &manifest,
                output: &output,
                rewrites: rewrites.as_deref(),
                no_cache,
                verbose: cli.verbose,
            };
            let report = analyze_command(config, &options)?;
            if fail_on_findings && report.findings().any(|f| f.severity >= Severity::Warn) {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Impact { model, manifest, depth } => {
            impact_command(&model, &manifest, depth, cli.verbose)
        }
        Commands::Parse { file } => parse_command(&config, &file),
    }
}

/// Log to stderr; `RUST_LOG` overrides the default level
fn init_tracing(verbose: bool) {
    let default = if verbose { "dagrefactor=debug,info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>, verbose: bool) -> Result<Config> {
    if let Some(path) = path {
        return Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }
    let default = Path::new(DEFAULT_CONFIG);
    if default.exists() {
        tracing::debug!(path = DEFAULT_CONFIG, "loading config");
        return Ok(Config::from_file(default)?);
    }
    if verbose {
        eprintln!("{}", "No config file found, using defaults".yellow());
    }
    Ok(Config::default())
}

struct AnalyzeOptions<'a> {
    manifest: &'a Path,
    output: &'a Path,
    rewrites: Option<&'a Path>,
    no_cache: bool,
    verbose: bool,
}

/// Analyze command - run all detectors and write the report
fn analyze_command(config: Config, options: &AnalyzeOptions<'_>) -> Result<Report> {
    if !options.manifest.exists() {
        return Err(anyhow::anyhow!(
            "Manifest not found at {}. Run 'dbt compile' or 'dbt build' first.",
            options.manifest.display()
        ));
    }

    if options.verbose {
        eprintln!("{} {}", "Loading manifest from:".cyan(), options.manifest.display());
    }
    let manifest = Manifest::from_file(options.manifest)?;

    let mut source: Box<dyn ComponentSource> = if options.no_cache {
        Box::new(FreshParse::new(ComponentParser::from_dialect(&config.dialect)))
    } else {
        Box::new(ComponentCache::new(config.dialect.clone()))
    };

    let analyzer = Analyzer::new(config).context("Invalid configuration")?;
    let report = analyzer.analyze_manifest(&manifest, source.as_mut())?;

    report.save_to_file(options.output)?;
    if options.verbose {
        eprintln!("{} {}", "Report saved to:".green(), options.output.display());
    }

    if let Some(dir) = options.rewrites {
        let written = write_rewrites(&report, dir)?;
        if options.verbose {
            eprintln!("{} {} file(s) in {}", "Rewrites saved:".green(), written, dir.display());
        }
    }

    print_report_summary(&report);
    Ok(report)
}

/// Write one `<model>.sql` per rewrite artifact
fn write_rewrites(report: &Report, dir: &Path) -> Result<usize> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    for artifact in &report.rewrites {
        let path = dir.join(format!("{}.sql", artifact.model_name));
        std::fs::write(&path, &artifact.rewritten_sql)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(report.rewrites.len())
}

/// Impact command - show upstream and downstream dependencies
fn impact_command(model: &str, manifest_path: &Path, depth: Option<usize>, verbose: bool) -> Result<()> {
    if verbose {
        eprintln!("{} {}", "Loading manifest from:".cyan(), manifest_path.display());
    }

    let manifest = Manifest::from_file(manifest_path)
        .map_err(|e| anyhow::anyhow!("Failed to load manifest: {}", e))?;
    let project = Project::from_manifest(&manifest)?;

    let node = project.resolve(model).ok_or_else(|| {
        anyhow::anyhow!(
            "Model '{}' not found in manifest. Try using the full unique_id (e.g., 'model.project.{}')",
            model,
            model
        )
    })?;

    let graph = project.graph();
    let upstream = graph.ancestors(&node.unique_id, depth);
    let downstream = graph.descendants(&node.unique_id, depth);

    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Impact Analysis".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("{} {}", "Model:".bold(), node.unique_id.green());
    println!("{} {}", "Upstream models:".bold(), upstream.len());
    println!("{} {}", "Downstream models:".bold(), downstream.len());
    println!();

    for (title, nodes) in [("Upstream:", &upstream), ("Downstream:", &downstream)] {
        if nodes.is_empty() {
            continue;
        }
        println!("{}", title.bold());
        for (i, id) in nodes.iter().enumerate() {
            println!("  {}. {}", i + 1, id.yellow());
        }
        println!();
    }

    if downstream.is_empty() {
        println!("{}", "✓ No downstream dependencies".green());
    }

    println!("{}", "=".repeat(60).bright_blue());
    Ok(())
}

/// Parse command - show how one model's SQL is split up
fn parse_command(config: &Config, file: &Path) -> Result<()> {
    let sql = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let component = ComponentParser::from_dialect(&config.dialect).parse(&sql)?;
    println!("{}", serde_json::to_string_pretty(&component)?);
    Ok(())
}

/// Print report summary to stdout
fn print_report_summary(report: &Report) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "DAG Refactoring Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Version: {}", report.version);
    println!("Timestamp: {}", report.timestamp);
    println!();

    let summary = &report.summary;
    println!("{}", "Summary:".bold());
    println!("  Models analyzed:          {}", summary.models_analyzed);
    println!("  Complex models:           {}", count(summary.complex_models));
    println!("  Redundant references:     {}", count(summary.redundant_references));
    println!("  Rejoin patterns:          {}", count(summary.rejoin_patterns));
    println!("  Combinable intermediates: {}", count(summary.combinable_intermediates));
    println!("  Similar pairs:            {}", count(summary.similar_pairs));
    println!("  Rewrites:                 {}", summary.rewrites);
    if summary.parse_failures > 0 {
        println!("  Parse failures:           {}", summary.parse_failures.to_string().red());
    }
    println!();

    if !report.has_findings() {
        println!("{}", "✓ No issues found!".green().bold());
    } else {
        println!("{}", "Findings:".bold());
        for finding in report.findings() {
            print_finding(finding);
        }
    }

    if !report.recommendations.is_empty() {
        println!();
        println!("{}", "Recommendations:".bold());
        for rec in &report.recommendations {
            let affected = rec.models.len() + rec.model_pairs.len();
            println!("  - {} ({} affected)", rec.suggestion, affected);
        }
    }

    for skipped in &report.skipped_rewrites {
        println!("  {} {}: {}", "Not rewritten".yellow(), skipped.model, skipped.reason);
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
}

fn print_finding(finding: &Finding) {
    let severity_str = match finding.severity {
        Severity::Error => "ERROR".red().bold(),
        Severity::Warn => "WARN".yellow().bold(),
        Severity::Info => "INFO".cyan(),
    };

    match finding.related_model() {
        Some(related) => println!(
            "  [{}] {}: {} -> {}",
            severity_str,
            finding.code(),
            finding.model(),
            related
        ),
        None => println!("  [{}] {}: {}", severity_str, finding.code(), finding.model()),
    }
    println!("    {}", finding.suggestion);
    for note in &finding.notes {
        println!("    {}: {}", note.level, note.message);
    }
}

fn count(n: usize) -> colored::ColoredString {
    if n > 0 {
        n.to_string().yellow()
    } else {
        n.to_string().green()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn analyze_flags_parse() {
        let cli = Cli::try_parse_from([
            "dagrefactor",
            "analyze",
            "--rewrites",
            "out",
            "--similarity-threshold",
            "0.9",
            "--no-cache",
        ])
        .unwrap();
        match cli.command {
            Commands::Analyze { rewrites, similarity_threshold, no_cache, .. } => {
                assert_eq!(rewrites, Some(PathBuf::from("out")));
                assert_eq!(similarity_threshold, Some(0.9));
                assert!(no_cache);
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn missing_manifest_is_reported() {
        let options = AnalyzeOptions {
            manifest: Path::new("does/not/exist/manifest.json"),
            output: Path::new("report.json"),
            rewrites: None,
            no_cache: true,
            verbose: false,
        };
        let err = analyze_command(Config::default(), &options).unwrap_err();
        assert!(err.to_string().contains("Manifest not found"));
    }
}
