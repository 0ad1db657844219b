use super::{Formatter, KRatioOutput};

pub struct TextFormatter {
    verbose: bool,
}

impl TextFormatter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl Formatter for TextFormatter {
    fn format(&self, output: &KRatioOutput) -> String {
        if self.verbose {
            format!(
                "{}: {:<24} k = {:.5} ± {:.5} ({:.1}σ){} [metric: {:.4}]",
                output.spectrum,
                output.transitions,
                output.kratio,
                output.uncertainty,
                output.significance(),
                if output.removed { " culled" } else { "" },
                output.fit_metric
            )
        } else {
            format!(
                "{}: {:<24} k = {:.5} ± {:.5}",
                output.spectrum, output.transitions, output.kratio, output.uncertainty
            )
        }
    }
}
