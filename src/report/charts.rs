use plotters::prelude::*;

use super::CategoryCount;
use crate::error::{Result, WrangleError};

const CHART_SIZE: (u32, u32) = (1200, 600);

fn chart_error<E: std::fmt::Display>(e: E) -> WrangleError {
    WrangleError::Chart(e.to_string())
}

/// Render a vertical bar chart of `counts` as an SVG document.
pub fn bar_chart_svg(title: &str, x_desc: &str, counts: &[CategoryCount]) -> Result<String> {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, CHART_SIZE).into_drawing_area();
        root.fill(&WHITE).map_err(chart_error)?;

        let bars = counts.len().max(1) as u32;
        let y_max = counts.iter().map(|c| c.count).max().unwrap_or(0).max(1) as u32;
        let y_top = y_max + (y_max / 10).max(1);

        let labels: Vec<&str> = counts.iter().map(|c| c.label.as_str()).collect();
        let label_of = |v: &SegmentValue<u32>| match v {
            SegmentValue::CenterOf(i) => labels.get(*i as usize).map_or_else(String::new, |l| l.to_string()),
            _ => String::new(),
        };

        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 30))
            .margin(10)
            .x_label_area_size(50)
            .y_label_area_size(60)
            .build_cartesian_2d((0u32..bars).into_segmented(), 0u32..y_top)
            .map_err(chart_error)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(counts.len().max(1))
            .x_label_formatter(&label_of)
            .x_desc(x_desc)
            .y_desc("Count")
            .draw()
            .map_err(chart_error)?;

        chart
            .draw_series(counts.iter().enumerate().map(|(i, c)| {
                let i = i as u32;
                let mut bar = Rectangle::new(
                    [
                        (SegmentValue::Exact(i), 0),
                        (SegmentValue::Exact(i + 1), c.count as u32),
                    ],
                    BLUE.mix(0.7).filled(),
                );
                bar.set_margin(0, 0, 15, 15);
                bar
            }))
            .map_err(chart_error)?;

        root.present().map_err(chart_error)?;
    }
    Ok(svg)
}
