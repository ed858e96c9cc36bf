//! tabreg: Tabular ETL and Regression CLI Tool
//!
//! Runs a JSON-configured pipeline (load, clean, reshape, aggregate, model)
//! and prints the results, or inspects the inferred schema of one CSV.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use tabreg::cli::{Cli, Commands};
use tabreg::pipeline::{inspect_schema, run_pipeline_with, LoadOptions, Locator};
use tabreg::report::{
    build_run_report, export_run_report, export_tables, print_clean_report, print_model,
    print_profile, print_run_summary, print_schema, print_table_preview, ResidualDiagnostics,
    TableFormat,
};
use tabreg::utils::{
    create_spinner, finish_with_success, print_banner, print_completion, print_config,
    print_info, print_saved, print_step_header, print_step_time, print_success, SpinnerObserver,
};
use tabreg::PipelineConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_filter());

    match &cli.command {
        Commands::Run {
            config,
            report_json,
            export_dir,
            format,
            timeout,
            residual_bins,
            preview_rows,
        } => run(
            config,
            RunArgs {
                report_json: report_json.as_deref(),
                export_dir: export_dir.as_deref(),
                format: *format,
                timeout: *timeout,
                residual_bins: *residual_bins,
                preview_rows: *preview_rows,
                quiet: cli.quiet,
            },
        ),
        Commands::Inspect {
            locator,
            null_values,
            timeout,
        } => inspect(locator, null_values, *timeout),
    }
}

/// Human-readable stderr logging; RUST_LOG wins over -v / -q.
fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter);

    tracing_subscriber::registry().with(stderr_layer).init();
}

struct RunArgs<'a> {
    report_json: Option<&'a Path>,
    export_dir: Option<&'a Path>,
    format: TableFormat,
    timeout: Option<u64>,
    residual_bins: Option<usize>,
    preview_rows: usize,
    quiet: bool,
}

fn run(config_path: &Path, args: RunArgs<'_>) -> Result<()> {
    let mut config = PipelineConfig::load(config_path)
        .with_context(|| format!("Failed to load pipeline config {}", config_path.display()))?;
    if let Some(secs) = args.timeout {
        config.timeout_secs = secs;
    }

    print_banner(env!("CARGO_PKG_VERSION"));
    print_config(config_path, config.datasets.len(), config.timeout_secs);

    // Step 1: run every stage
    print_step_header(1, "Run Pipeline");
    let step_start = Instant::now();
    let mut observer = if args.quiet {
        SpinnerObserver::hidden()
    } else {
        SpinnerObserver::new()
    };
    let output = match run_pipeline_with(&config, &mut observer) {
        Ok(output) => output,
        Err(e) => {
            observer.abandon();
            return Err(e).context("Pipeline run failed");
        }
    };
    print_success("All stages finished");
    print_step_time(step_start.elapsed());

    // Step 2: what each dataset looks like
    print_step_header(2, "Datasets");
    for dataset in &output.datasets {
        print_schema(&format!("LOADED SCHEMA · {}", dataset.name), &dataset.loaded_schema);
        print_clean_report(&dataset.name, &dataset.clean_report);
        print_table_preview(
            &format!("FINAL TABLE · {}", dataset.name),
            &dataset.table,
            args.preview_rows,
        );
    }
    if let Some((name, table)) = &output.combined {
        print_table_preview(&format!("COMBINED · {}", name), table, args.preview_rows);
    }
    print_run_summary(&output);

    // Step 3: model
    if let (Some(result), Some(dataset)) = (&output.model, &output.model_dataset) {
        print_step_header(3, "Model");
        print_model(dataset, result);
        match ResidualDiagnostics::from_residuals(&result.residuals, args.residual_bins) {
            Some(diagnostics) => diagnostics.display(),
            None => print_info("Residuals are not finite; skipping diagnostics"),
        }
    }

    // Step 4: exports
    if args.report_json.is_some() || args.export_dir.is_some() {
        print_step_header(4, "Export");
        let step_start = Instant::now();

        if let Some(path) = args.report_json {
            let spinner = create_spinner("Writing JSON report...");
            let report = build_run_report(&output, Some(config_path), args.residual_bins);
            export_run_report(&report, path)?;
            finish_with_success(&spinner, "JSON report written");
            print_saved(path);
        }

        if let Some(dir) = args.export_dir {
            let spinner = create_spinner("Writing final tables...");
            let written = export_tables(&output, dir, args.format)?;
            finish_with_success(&spinner, &format!("{} table(s) written", written.len()));
            for path in &written {
                print_saved(path);
            }
        }
        print_step_time(step_start.elapsed());
    }

    print_completion();
    Ok(())
}

fn inspect(locator: &str, null_values: &[String], timeout: Option<u64>) -> Result<()> {
    let locator = Locator::parse(locator);
    let mut options = LoadOptions {
        null_values: null_values.to_vec(),
        ..LoadOptions::default()
    };
    if let Some(secs) = timeout {
        options.timeout = Duration::from_secs(secs);
    }

    let spinner = create_spinner(&format!("Loading {}...", locator));
    let profile = match inspect_schema(&locator, &options) {
        Ok(profile) => profile,
        Err(e) => {
            spinner.abandon();
            return Err(e).with_context(|| format!("Failed to inspect {}", locator));
        }
    };
    finish_with_success(&spinner, "Schema inferred");

    print_profile(&profile);
    Ok(())
}
