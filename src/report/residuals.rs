//! Residual diagnostics: five-number summary, histogram and index series

use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, Table};
use console::style;
use serde::Serialize;

/// One histogram bin, `[lower, upper)` except the last, which is closed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// Summary of a model's residuals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResidualDiagnostics {
    pub n: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub mean: f64,
    pub q3: f64,
    pub max: f64,
    pub histogram: Vec<HistogramBin>,
    /// (row index, residual) in fit order, for an index plot
    pub index_series: Vec<(usize, f64)>,
}

/// Sturges' rule: ⌈log₂ n⌉ + 1 bins.
pub fn sturges_bins(n: usize) -> usize {
    if n <= 1 {
        return 1;
    }
    (n as f64).log2().ceil() as usize + 1
}

/// Quantile with linear interpolation between order statistics.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

impl ResidualDiagnostics {
    /// Summarise `residuals`; `None` when there are none or any is not finite.
    ///
    /// # Arguments
    /// * `residuals` - Residuals in fit order
    /// * `bins` - Histogram bin count; Sturges' rule when `None`
    pub fn from_residuals(residuals: &[f64], bins: Option<usize>) -> Option<Self> {
        if residuals.is_empty() || residuals.iter().any(|r| !r.is_finite()) {
            return None;
        }

        let mut sorted = residuals.to_vec();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();
        let min = sorted[0];
        let max = sorted[n - 1];

        let bins = bins.unwrap_or_else(|| sturges_bins(n)).max(1);
        let width = (max - min) / bins as f64;
        let mut histogram: Vec<HistogramBin> = (0..bins)
            .map(|i| HistogramBin {
                lower: min + i as f64 * width,
                upper: if i + 1 == bins {
                    max
                } else {
                    min + (i + 1) as f64 * width
                },
                count: 0,
            })
            .collect();
        for r in &sorted {
            let idx = if width > 0.0 {
                (((r - min) / width) as usize).min(bins - 1)
            } else {
                0
            };
            histogram[idx].count += 1;
        }

        Some(Self {
            n,
            min,
            q1: quantile(&sorted, 0.25),
            median: quantile(&sorted, 0.5),
            mean: residuals.iter().sum::<f64>() / n as f64,
            q3: quantile(&sorted, 0.75),
            max,
            histogram,
            index_series: residuals.iter().copied().enumerate().collect(),
        })
    }

    /// Print the summary and a text histogram.
    pub fn display(&self) {
        println!();
        println!(
            "    {} {}",
            style("📉").cyan(),
            style("RESIDUALS").white().bold()
        );
        println!("    {}", style("─".repeat(50)).dim());

        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(
            ["Min", "1Q", "Median", "Mean", "3Q", "Max"]
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );
        table.add_row(
            [self.min, self.q1, self.median, self.mean, self.q3, self.max]
                .iter()
                .map(|v| Cell::new(format!("{:.4}", v))),
        );
        for line in table.to_string().lines() {
            println!("    {}", line);
        }

        let peak = self.histogram.iter().map(|b| b.count).max().unwrap_or(0).max(1);
        println!();
        for bin in &self.histogram {
            let bar = "█".repeat(bin.count * 40 / peak);
            println!(
                "    {:>11.4} │ {} {}",
                bin.lower,
                style(bar).cyan(),
                style(bin.count).dim()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_five_number_summary() {
        let d = ResidualDiagnostics::from_residuals(&[3.0, -1.0, 0.0, 2.0, -4.0], Some(4)).unwrap();
        assert_eq!(d.min, -4.0);
        assert_eq!(d.q1, -1.0);
        assert_eq!(d.median, 0.0);
        assert_eq!(d.q3, 2.0);
        assert_eq!(d.max, 3.0);
        assert_eq!(d.mean, 0.0);
        assert_eq!(d.index_series[0], (0, 3.0));
    }

    #[test]
    fn test_histogram_counts_every_residual() {
        let residuals: Vec<f64> = (0..100).map(|i| (i as f64 / 7.0).sin()).collect();
        let d = ResidualDiagnostics::from_residuals(&residuals, None).unwrap();
        assert_eq!(d.histogram.len(), sturges_bins(100));
        assert_eq!(d.histogram.iter().map(|b| b.count).sum::<usize>(), 100);
        assert_eq!(d.histogram.last().unwrap().upper, d.max);
    }

    #[test]
    fn test_constant_residuals_single_bin() {
        let d = ResidualDiagnostics::from_residuals(&[0.5, 0.5, 0.5], Some(3)).unwrap();
        assert_eq!(d.histogram[0].count, 3);
        assert!(ResidualDiagnostics::from_residuals(&[], None).is_none());
    }

    #[test]
    fn test_sturges() {
        assert_eq!(sturges_bins(1), 1);
        assert_eq!(sturges_bins(8), 4);
        assert_eq!(sturges_bins(9), 5);
    }
}
