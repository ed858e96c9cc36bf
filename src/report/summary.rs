//! Terminal summaries of a pipeline run

use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, CellAlignment, Color, Table};
use console::style;

use crate::error::Stage;
use crate::pipeline::{CleanReport, FitSummary, ModelResult, RunOutput, SchemaProfile};
use crate::table::{ColumnDescriptor, Table as DataTable};

/// Rows shown by [`print_table_preview`] unless asked otherwise.
pub const PREVIEW_ROWS: usize = 10;

fn section(icon: &str, title: &str) {
    println!();
    println!("    {} {}", style(icon).cyan(), style(title).white().bold());
    println!("    {}", style("─".repeat(50)).dim());
}

fn print_indented(table: &Table) {
    for line in table.to_string().lines() {
        println!("    {}", line);
    }
}

fn header(cells: &[&str]) -> Vec<Cell> {
    cells
        .iter()
        .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
        .collect()
}

/// Print a declared schema.
pub fn print_schema(title: &str, schema: &[ColumnDescriptor]) {
    section("🧾", title);

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(header(&["Column", "Kind"]));
    for desc in schema {
        table.add_row(vec![Cell::new(&desc.name), Cell::new(desc.kind.to_string())]);
    }
    print_indented(&table);
}

/// Print the output of `inspect`.
pub fn print_profile(profile: &SchemaProfile) {
    section("🔎", &format!("SCHEMA ({} rows)", profile.rows));

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(header(&["Column", "Kind", "Missing"]));
    for column in &profile.columns {
        table.add_row(vec![
            Cell::new(&column.name),
            Cell::new(&column.kind),
            Cell::new(column.missing).fg(if column.missing == 0 {
                Color::White
            } else {
                Color::Yellow
            }),
        ]);
    }
    print_indented(&table);
}

/// Print what the cleaner did to one dataset.
pub fn print_clean_report(dataset: &str, report: &CleanReport) {
    section("🧹", &format!("CLEANING · {}", dataset));

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(header(&["Metric", "Value"]));
    table.add_row(vec![Cell::new("Rows in"), Cell::new(report.rows_in)]);
    table.add_row(vec![
        Cell::new("Rows dropped"),
        Cell::new(report.rows_dropped).fg(if report.rows_dropped == 0 {
            Color::White
        } else {
            Color::Red
        }),
    ]);
    table.add_row(vec![
        Cell::new("Rows out"),
        Cell::new(report.rows_out)
            .fg(Color::Green)
            .add_attribute(Attribute::Bold),
    ]);
    for (column, count) in &report.imputed {
        table.add_row(vec![
            Cell::new(format!("Imputed · {}", column)),
            Cell::new(count).fg(Color::Yellow),
        ]);
    }
    for (column, count) in &report.date_parse_failures {
        table.add_row(vec![
            Cell::new(format!("Unparsed dates · {}", column)),
            Cell::new(count).fg(Color::Red),
        ]);
    }
    if !report.dropped_columns.is_empty() {
        table.add_row(vec![
            Cell::new("Dropped columns"),
            Cell::new(report.dropped_columns.join(", ")),
        ]);
    }
    print_indented(&table);
}

/// Print the first `max_rows` rows of a table.
pub fn print_table_preview(title: &str, data: &DataTable, max_rows: usize) {
    section("📊", &format!("{} ({} × {})", title, data.height(), data.width()));

    let Ok(columns) = data.to_columns(Stage::Reporter) else {
        println!("    {}", style("(table could not be read)").dim());
        return;
    };

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(
        columns
            .iter()
            .map(|(desc, _)| Cell::new(&desc.name).add_attribute(Attribute::Bold)),
    );
    for row in 0..data.height().min(max_rows) {
        table.add_row(columns.iter().map(|(_, values)| Cell::new(&values[row])));
    }
    print_indented(&table);

    if data.height() > max_rows {
        println!(
            "    {}",
            style(format!("… {} more row(s)", data.height() - max_rows)).dim()
        );
    }
}

fn format_p(p: f64) -> String {
    if p < 2e-16 {
        "<2e-16".to_string()
    } else if p < 1e-4 {
        format!("{:.2e}", p)
    } else {
        format!("{:.4}", p)
    }
}

fn significance(p: f64) -> &'static str {
    match p {
        p if p < 0.001 => "***",
        p if p < 0.01 => "**",
        p if p < 0.05 => "*",
        p if p < 0.1 => ".",
        _ => "",
    }
}

/// Print the coefficient table and fit statistics.
pub fn print_model(dataset: &str, result: &ModelResult) {
    section(
        "📈",
        &format!(
            "{} MODEL · {} (outcome: {})",
            result.family.to_string().to_uppercase(),
            dataset,
            result.outcome
        ),
    );

    if let Some(level) = &result.event_level {
        println!("    Event level: {}", style(level).yellow());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(header(&[
        "Term",
        "Estimate",
        "Std. Error",
        result.statistic_name(),
        "Pr(>|stat|)",
        "",
    ]));
    for c in &result.coefficients {
        let p_color = if c.p_value < 0.05 {
            Color::Green
        } else {
            Color::White
        };
        table.add_row(vec![
            Cell::new(&c.term),
            Cell::new(format!("{:.6}", c.estimate)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.6}", c.std_error)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.3}", c.statistic)).set_alignment(CellAlignment::Right),
            Cell::new(format_p(c.p_value))
                .fg(p_color)
                .set_alignment(CellAlignment::Right),
            Cell::new(significance(c.p_value)),
        ]);
    }
    print_indented(&table);

    println!(
        "    Observations: {}  (omitted: {}, residual df: {})",
        style(result.n_obs).bold(),
        result.rows_omitted,
        result.df_residual
    );

    match &result.summary {
        FitSummary::Linear {
            r_squared,
            adj_r_squared,
            sigma,
            f_statistic,
            f_p_value,
            log_likelihood,
            aic,
        } => {
            println!("    Residual standard error: {:.4}", sigma);
            println!(
                "    R²: {:.4}   Adjusted R²: {:.4}",
                r_squared, adj_r_squared
            );
            if let Some(f) = f_statistic {
                let p = f_p_value.map(format_p).unwrap_or_else(|| "NA".into());
                println!("    F-statistic: {:.3}   p-value: {}", f, p);
            }
            println!("    Log-likelihood: {:.3}   AIC: {:.3}", log_likelihood, aic);
        }
        FitSummary::Logistic {
            deviance,
            null_deviance,
            log_likelihood,
            aic,
            iterations,
            converged,
        } => {
            println!(
                "    Null deviance: {:.3}   Residual deviance: {:.3}",
                null_deviance, deviance
            );
            println!("    Log-likelihood: {:.3}   AIC: {:.3}", log_likelihood, aic);
            let status = if *converged {
                style(format!("converged in {} iteration(s)", iterations)).green()
            } else {
                style(format!("did not converge after {} iteration(s)", iterations)).red()
            };
            println!("    Fisher scoring: {}", status);
        }
    }
}

/// Per-dataset shapes through the run.
pub fn print_run_summary(output: &RunOutput) {
    section("📋", "RUN SUMMARY");

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(header(&["Dataset", "Loaded", "Cleaned", "Long", "Final"]));

    let shape = |s: (usize, usize)| format!("{} × {}", s.0, s.1);
    for d in &output.datasets {
        table.add_row(vec![
            Cell::new(&d.name).add_attribute(Attribute::Bold),
            Cell::new(shape(d.loaded_shape)),
            Cell::new(shape(d.cleaned_shape)),
            Cell::new(d.long_shape.map(shape).unwrap_or_else(|| "-".into())),
            Cell::new(shape(d.table.shape())).fg(Color::Green),
        ]);
    }
    if let Some((name, combined)) = &output.combined {
        table.add_row(vec![
            Cell::new(name).add_attribute(Attribute::Bold),
            Cell::new("-"),
            Cell::new("-"),
            Cell::new("-"),
            Cell::new(shape(combined.shape())).fg(Color::Green),
        ]);
    }
    print_indented(&table);
}
