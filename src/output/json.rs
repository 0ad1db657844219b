use serde::Serialize;

use super::{Formatter, KRatioOutput, iso8601_timestamp};

pub struct JsonFormatter;

#[derive(Serialize)]
struct Record<'a> {
    ts: String,
    spectrum: &'a str,
    element: &'static str,
    transitions: &'a str,
    kratio: f64,
    uncertainty: f64,
    removed: bool,
    fit_metric: f64,
}

impl Formatter for JsonFormatter {
    fn format(&self, output: &KRatioOutput) -> String {
        let record = Record {
            ts: iso8601_timestamp(),
            spectrum: &output.spectrum,
            element: output.element.symbol(),
            transitions: &output.transitions,
            kratio: output.kratio,
            uncertainty: output.uncertainty,
            removed: output.removed,
            fit_metric: output.fit_metric,
        };
        serde_json::to_string(&record).unwrap_or_default()
    }
}
