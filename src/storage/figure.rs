//! Minimal SVG rendering for evaluation plots.

use std::fmt::Write as _;

const WIDTH: f64 = 480.0;
const HEIGHT: f64 = 480.0;
const MARGIN: f64 = 48.0;

/// A rendered figure.
#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    title: String,
    svg: String,
}

impl Figure {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn svg(&self) -> &str {
        &self.svg
    }

    /// Scatter plot of predictions against actual values, one colour per
    /// series, with the identity line drawn for reference.
    pub fn predicted_vs_actual(title: &str, series: &[(&str, &[f64], &[f64])]) -> Self {
        const COLOURS: [&str; 4] = ["#1f77b4", "#ff7f0e", "#2ca02c", "#d62728"];

        let values = series
            .iter()
            .flat_map(|(_, actual, predicted)| actual.iter().chain(predicted.iter()))
            .copied()
            .filter(|v| v.is_finite());
        let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        let (lo, hi) = if lo.is_finite() && hi > lo {
            (lo, hi)
        } else if lo.is_finite() {
            (lo - 1.0, lo + 1.0)
        } else {
            (0.0, 1.0)
        };

        let span = WIDTH - 2.0 * MARGIN;
        let sx = |v: f64| MARGIN + (v - lo) / (hi - lo) * span;
        let sy = |v: f64| HEIGHT - MARGIN - (v - lo) / (hi - lo) * span;

        let mut svg = String::new();
        let _ = writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}">"#
        );
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="24" text-anchor="middle" font-size="14">{}</text>"#,
            WIDTH / 2.0,
            escape(title)
        );
        let _ = writeln!(
            svg,
            r##"<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" stroke="#999" stroke-dasharray="4"/>"##,
            sx(lo),
            sy(lo),
            sx(hi),
            sy(hi)
        );

        for (idx, (label, actual, predicted)) in series.iter().enumerate() {
            let colour = COLOURS[idx % COLOURS.len()];
            let _ = writeln!(svg, r#"<g fill="{colour}" data-series="{}">"#, escape(label));
            for (a, p) in actual.iter().zip(predicted.iter()) {
                if a.is_finite() && p.is_finite() {
                    let _ = writeln!(
                        svg,
                        r#"<circle cx="{:.2}" cy="{:.2}" r="3"/>"#,
                        sx(*a),
                        sy(*p)
                    );
                }
            }
            let _ = writeln!(svg, "</g>");
            let _ = writeln!(
                svg,
                r#"<text x="{}" y="{}" fill="{colour}" font-size="12">{}</text>"#,
                WIDTH - MARGIN - 60.0,
                MARGIN + 16.0 * idx as f64,
                escape(label)
            );
        }
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="middle" font-size="12">actual</text>"#,
            WIDTH / 2.0,
            HEIGHT - 12.0
        );
        let _ = writeln!(svg, "</svg>");

        Self {
            title: title.to_string(),
            svg,
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scatter_has_one_circle_per_finite_point() {
        let actual = [1.0, 2.0, f64::NAN];
        let predicted = [1.5, 2.5, 3.0];
        let test_actual = [4.0];
        let test_predicted = [3.5];
        let figure = Figure::predicted_vs_actual(
            "Predicted vs actual",
            &[("train", &actual, &predicted), ("test", &test_actual, &test_predicted)],
        );

        assert!(figure.svg().starts_with("<svg"));
        assert!(figure.svg().trim_end().ends_with("</svg>"));
        assert_eq!(figure.svg().matches("<circle").count(), 3);
        assert_eq!(figure.title(), "Predicted vs actual");
    }

    #[test]
    fn test_title_is_escaped() {
        let figure = Figure::predicted_vs_actual("a < b & c", &[]);
        assert!(figure.svg().contains("a &lt; b &amp; c"));
    }
}
