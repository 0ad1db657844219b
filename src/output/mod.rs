mod csv;
mod json;
mod text;

use chrono::Utc;

use crate::element::Element;
use crate::fit::FitOutcome;

pub use self::csv::CsvFormatter;
pub use self::json::JsonFormatter;
pub use self::text::TextFormatter;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

/// One reported k-ratio
pub struct KRatioOutput {
    /// Label of the unknown spectrum
    pub spectrum: String,
    pub element: Element,
    /// Transition set, e.g. `Fe [Ka2, Ka1]`
    pub transitions: String,
    pub kratio: f64,
    pub uncertainty: f64,
    /// Element was culled during the fit
    pub removed: bool,
    /// Unexplained fraction of the filtered unknown
    pub fit_metric: f64,
}

impl KRatioOutput {
    /// One row per fitted transition set of `outcome`
    pub fn from_outcome(spectrum: &str, outcome: &FitOutcome, fit_metric: f64) -> Vec<Self> {
        outcome
            .kratios
            .iter()
            .map(|(transitions, k)| Self {
                spectrum: spectrum.to_string(),
                element: transitions.element(),
                transitions: transitions.to_string(),
                kratio: k.value(),
                uncertainty: k.uncertainty(),
                removed: outcome.state.removed().contains(&transitions.element()),
                fit_metric,
            })
            .collect()
    }

    pub fn significance(&self) -> f64 {
        if self.uncertainty > 0.0 {
            self.kratio / self.uncertainty
        } else {
            0.0
        }
    }
}

pub trait Formatter: Send {
    fn format(&self, output: &KRatioOutput) -> String;

    fn header(&self) -> Option<&'static str> {
        None
    }
}

pub fn create_formatter(format: OutputFormat, verbose: bool) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter::new(verbose)),
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Csv => Box::new(CsvFormatter),
    }
}

pub fn iso8601_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> KRatioOutput {
        KRatioOutput {
            spectrum: "steel".to_string(),
            element: "Fe".parse().unwrap(),
            transitions: "Fe [Ka2, Ka1]".to_string(),
            kratio: 0.7125,
            uncertainty: 0.0025,
            removed: false,
            fit_metric: 0.012,
        }
    }

    #[test]
    fn test_text_format() {
        let line = create_formatter(OutputFormat::Text, false).format(&row());
        assert!(line.contains("Fe [Ka2, Ka1]"));
        assert!(line.contains("0.71250"));
        let verbose = create_formatter(OutputFormat::Text, true).format(&row());
        assert!(verbose.contains("285.0σ"));
    }

    #[test]
    fn test_json_format_parses() {
        let line = create_formatter(OutputFormat::Json, false).format(&row());
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["element"], "Fe");
        assert_eq!(value["kratio"], 0.7125);
        assert_eq!(value["removed"], false);
    }

    #[test]
    fn test_csv_matches_header() {
        let formatter = create_formatter(OutputFormat::Csv, false);
        let header = formatter.header().unwrap();
        let line = formatter.format(&row());
        assert_eq!(header.split(',').count(), line.split(',').count());
    }
}
