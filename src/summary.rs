use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::analysis::energy::EnergySummary;
use crate::data::model::Grid;
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Summary record
// ---------------------------------------------------------------------------

/// Where the noise/denoised bands came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Real,
    Synthetic,
}

impl DataSource {
    pub fn status_line(self) -> &'static str {
        match self {
            DataSource::Real => "Status: Using real BEMD results",
            DataSource::Synthetic => "Status: Using synthetic demonstration data",
        }
    }
}

/// Statistics written at the end of the reporting stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRecord {
    pub step: u32,
    /// (height, width)
    pub resolution: (usize, usize),
    pub original_range: Option<(f64, f64)>,
    pub noise_range: Option<(f64, f64)>,
    pub denoised_range: Option<(f64, f64)>,
    pub energy: EnergySummary,
    /// `None` when the original energy is zero.
    pub noise_percent: Option<f64>,
    pub denoised_percent: Option<f64>,
    pub source: DataSource,
    pub generated_files: Vec<String>,
}

impl SummaryRecord {
    pub fn build(
        step: u32,
        original: &Grid,
        noise: &Grid,
        denoised: &Grid,
        source: DataSource,
    ) -> Result<Self> {
        let energy = EnergySummary::compute(original, noise, denoised)?;
        let (noise_percent, denoised_percent) =
            match (energy.noise_percent(), energy.denoised_percent()) {
                (Ok(n), Ok(d)) => (Some(n), Some(d)),
                (Err(PipelineError::ZeroEnergy), _) | (_, Err(PipelineError::ZeroEnergy)) => {
                    log::warn!("original field energy is zero; energy fractions undefined");
                    (None, None)
                }
                (Err(e), _) | (_, Err(e)) => return Err(e),
            };

        Ok(SummaryRecord {
            step,
            resolution: original.shape(),
            original_range: original.min_max(),
            noise_range: noise.min_max(),
            denoised_range: denoised.min_max(),
            energy,
            noise_percent,
            denoised_percent,
            source,
            generated_files: Vec::new(),
        })
    }

    /// Plain-text report.
    pub fn to_text(&self) -> String {
        self.to_string()
    }

    pub fn write_text(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_text()).map_err(|e| PipelineError::io(path, e))
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::parse(path, format!("encoding summary: {e}")))?;
        std::fs::write(path, json).map_err(|e| PipelineError::io(path, e))
    }
}

impl fmt::Display for SummaryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "BEMD Analysis Results Summary")?;
        writeln!(f, "============================")?;
        writeln!(f)?;
        writeln!(f, "Target step: {}", self.step)?;
        writeln!(f, "Spatial resolution: {} x {}", self.resolution.0, self.resolution.1)?;
        writeln!(f, "Original field range: {}", fmt_range(self.original_range))?;
        writeln!(f, "IMF1 field range: {}", fmt_range(self.noise_range))?;
        writeln!(f, "Denoised field range: {}", fmt_range(self.denoised_range))?;
        writeln!(f)?;
        writeln!(f, "Energy Analysis:")?;
        writeln!(f, "Original energy: {}", sci(self.energy.original))?;
        writeln!(
            f,
            "IMF1 energy: {} ({})",
            sci(self.energy.noise),
            fmt_percent(self.noise_percent)
        )?;
        writeln!(
            f,
            "Denoised energy: {} ({})",
            sci(self.energy.denoised),
            fmt_percent(self.denoised_percent)
        )?;
        writeln!(f)?;
        writeln!(f, "{}", self.source.status_line())?;
        if !self.generated_files.is_empty() {
            writeln!(f)?;
            writeln!(f, "Generated files:")?;
            for file in &self.generated_files {
                writeln!(f, "- {file}")?;
            }
        }
        Ok(())
    }
}

/// `1.23e+04` style, matching the usual `%.2e` rendering.
pub fn sci(v: f64) -> String {
    if !v.is_finite() {
        return format!("{v}");
    }
    let s = format!("{v:.2e}");
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => s,
    }
}

fn fmt_range(range: Option<(f64, f64)>) -> String {
    match range {
        Some((lo, hi)) => format!("[{}, {}]", sci(lo), sci(hi)),
        None => "[n/a]".to_string(),
    }
}

fn fmt_percent(p: Option<f64>) -> String {
    match p {
        Some(p) => format!("{p:.1}%"),
        None => "undefined (original energy is zero)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scientific_format_pads_exponent() {
        assert_eq!(sci(12345.0), "1.23e+04");
        assert_eq!(sci(0.000123), "1.23e-04");
        assert_eq!(sci(0.0), "0.00e+00");
        assert_eq!(sci(-2.5e-12), "-2.50e-12");
    }

    #[test]
    fn text_contains_energy_and_status() {
        let orig = Grid::new(1, 2, vec![3.0, 4.0]).unwrap();
        let noise = Grid::new(1, 2, vec![0.0, 5.0]).unwrap();
        let denoised = Grid::new(1, 2, vec![0.0, 0.0]).unwrap();
        let rec = SummaryRecord::build(1005, &orig, &noise, &denoised, DataSource::Real).unwrap();
        let text = rec.to_text();
        assert!(text.contains("Spatial resolution: 1 x 2"));
        assert!(text.contains("Original energy: 2.50e+01"));
        assert!(text.contains("IMF1 energy: 2.50e+01 (100.0%)"));
        assert!(text.contains("Denoised energy: 0.00e+00 (0.0%)"));
        assert!(text.ends_with("Status: Using real BEMD results\n"));
    }

    #[test]
    fn generated_files_are_listed_after_status() {
        let g = Grid::new(1, 1, vec![2.0]).unwrap();
        let mut rec = SummaryRecord::build(9, &g, &g, &g, DataSource::Real).unwrap();
        rec.generated_files = vec!["a.png".into(), "b.txt".into()];
        let text = rec.to_text();
        assert_eq!(text, format!("{rec}"));
        assert!(text.ends_with("Status: Using real BEMD results\n\nGenerated files:\n- a.png\n- b.txt\n"));
    }

    #[test]
    fn zero_original_energy_is_reported_in_text() {
        let z = Grid::zeros(2, 2);
        let rec = SummaryRecord::build(1, &z, &z, &z, DataSource::Synthetic).unwrap();
        assert_eq!(rec.noise_percent, None);
        let text = rec.to_text();
        assert!(text.contains("undefined (original energy is zero)"));
        assert!(!text.contains("NaN"));
        assert!(text.contains("synthetic demonstration data"));
    }

    #[test]
    fn json_records_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let g = Grid::new(1, 1, vec![1.0]).unwrap();
        let rec = SummaryRecord::build(3, &g, &g, &g, DataSource::Synthetic).unwrap();
        rec.write_json(&path).unwrap();
        let v: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["source"], "synthetic");
        assert_eq!(v["noise_percent"], 100.0);
    }
}
