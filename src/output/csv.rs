use super::{Formatter, KRatioOutput, iso8601_timestamp};

pub struct CsvFormatter;

impl Formatter for CsvFormatter {
    fn format(&self, output: &KRatioOutput) -> String {
        // Transition sets list their lines with commas
        format!(
            "{},{},{},{},{:.6},{:.6},{},{:.5}",
            iso8601_timestamp(),
            output.spectrum,
            output.element,
            output.transitions.replace(',', ";"),
            output.kratio,
            output.uncertainty,
            output.removed,
            output.fit_metric
        )
    }

    fn header(&self) -> Option<&'static str> {
        Some("ts,spectrum,element,transitions,kratio,uncertainty,removed,fit_metric")
    }
}
