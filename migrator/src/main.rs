//! Shopmigrate CLI - Convert product spreadsheets to Shopify import CSVs
//!
//! ```bash
//! shopmigrate migrate export.csv -c mapping.json -o shopify.csv
//! shopmigrate analyze export.csv                 # Inspect a source file
//! shopmigrate validate-config mapping.json      # Check a mapping configuration
//! shopmigrate example-config                    # Print an example configuration
//! ```
//!
//! `--config` falls back to the `SHOPMIGRATE_CONFIG` environment variable,
//! which may also come from a `.env` file.

use clap::{Parser, Subcommand};
use shopmigrate::config::CONFIG_ENV_VAR;
use shopmigrate::logs::LOG_BROADCASTER;
use shopmigrate::{
    analyze, example_config, migrate_file, parse_csv_file_auto, GroupingStrategy, MappingConfig,
    MigrateOptions, RuleSet,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "shopmigrate")]
#[command(about = "Convert flat product spreadsheets into Shopify product import CSVs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full migration: source CSV -> Shopify import CSV + issue report
    Migrate {
        /// Input CSV file
        input: PathBuf,

        /// Mapping configuration (default: $SHOPMIGRATE_CONFIG)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output CSV file
        #[arg(short, long, default_value = "shopify_products.csv")]
        output: PathBuf,

        /// Issue report (default: error_report_<timestamp>.csv next to the output)
        #[arg(short, long)]
        error_report: Option<PathBuf>,

        /// Write a JSON run report
        #[arg(long)]
        summary: Option<PathBuf>,

        /// Process only the first N rows
        #[arg(long)]
        sample: Option<usize>,

        /// Grouping strategy (overrides the configuration)
        #[arg(long, value_enum)]
        strategy: Option<GroupingStrategy>,

        /// Do not echo progress logs
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show encoding, delimiter, column fill rates and sample rows
    Analyze {
        /// Input CSV file
        input: PathBuf,

        /// Mapping configuration to check headers against
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of sample rows
        #[arg(long, default_value = "5")]
        sample: usize,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load a mapping configuration and report problems
    ValidateConfig {
        /// Configuration file
        config: PathBuf,
    },

    /// Show example mapping configuration
    ExampleConfig,
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Migrate {
            input,
            config,
            output,
            error_report,
            summary,
            sample,
            strategy,
            quiet,
        } => {
            if quiet {
                LOG_BROADCASTER.set_echo(false);
            }
            let options = MigrateOptions {
                sample,
                strategy,
                error_report,
                summary,
            };
            cmd_migrate(&input, config, &output, &options)
        }

        Commands::Analyze {
            input,
            config,
            sample,
            output,
        } => cmd_analyze(&input, config.as_deref(), sample, output.as_deref()),

        Commands::ValidateConfig { config } => cmd_validate_config(&config),

        Commands::ExampleConfig => cmd_example_config(),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn resolve_config_path(explicit: Option<PathBuf>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match explicit {
        Some(path) => Ok(path),
        None => std::env::var(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .map_err(|_| format!("no --config given and {} is not set", CONFIG_ENV_VAR).into()),
    }
}

fn cmd_migrate(
    input: &Path,
    config: Option<PathBuf>,
    output: &Path,
    options: &MigrateOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = resolve_config_path(config)?;
    eprintln!("📄 Processing: {}", input.display());
    eprintln!("   Config: {}", config_path.display());

    let config = MappingConfig::from_path(&config_path)?;
    let report = migrate_file(input, output, &config, options)?;

    eprintln!("\n✨ Done! {} rows written to {}", report.stats.output_rows, output.display());
    Ok(())
}

fn cmd_analyze(
    input: &Path,
    config: Option<&Path>,
    sample: usize,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("🔍 Analyzing: {}", input.display());

    let parsed = parse_csv_file_auto(input)?;
    let analysis = analyze(&parsed, sample);

    eprintln!("   Encoding: {}", analysis.encoding);
    eprintln!("   Delimiter: '{}'", analysis.delimiter);
    eprintln!("   Rows: {} ({} blank)", analysis.row_count, analysis.blank_rows);
    eprintln!("   Columns: {}", analysis.column_count);
    for column in &analysis.columns {
        eprintln!("     {:<30} {:>6} filled {:>6} blank", column.name, column.filled, column.blank);
    }

    if let Some(path) = config {
        let config = MappingConfig::from_path(path)?;
        let missing = config.missing_headers(&parsed.headers);
        if missing.is_empty() {
            eprintln!("   ✅ All configured source columns present");
        } else {
            eprintln!("   ⚠️  Missing source columns: {}", missing.join(", "));
        }
    }

    let json = serde_json::to_string_pretty(&analysis)?;
    write_output(&json, output)?;
    Ok(())
}

fn cmd_validate_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("✔️  Validating: {}", path.display());

    let config = MappingConfig::from_path(path)?;
    let rules = RuleSet::from_config(&config);

    eprintln!("   {} rules", rules.len());
    eprintln!("   Grouping: {:?}", config.grouping.strategy);
    eprintln!("   Source columns: {}", config.source_columns().join(", "));

    let mut problems = 0;
    for target in config.unknown_targets() {
        eprintln!("   ⚠️  Unknown target column: {}", target);
        problems += 1;
    }
    for (target, operator) in rules.unknown_operators() {
        eprintln!("   ❌ Unknown operator '{}' for {}", operator, target);
        problems += 1;
    }

    if problems > 0 {
        return Err(format!("{} problem(s) in configuration", problems).into());
    }
    eprintln!("✅ Configuration is valid");
    Ok(())
}

fn cmd_example_config() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", example_config().to_json()?);
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
