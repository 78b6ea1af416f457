use anyhow::Result;
use plotters::prelude::*;
use std::path::Path;

use crate::playground::ComparisonRecord;

/// Bar chart of elapsed milliseconds per (index, mode) cell; failed cells in red.
/// With no records nothing is drawn and no file is written.
pub fn plot_latency(records: &[ComparisonRecord], path: &Path) -> Result<()> {
    if records.is_empty() {
        tracing::warn!(path = %path.display(), "No comparison records, skipping latency plot");
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let root = BitMapBackend::new(path, (1000, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let latencies: Vec<f64> = records
        .iter()
        .map(|r| r.elapsed.as_secs_f64() * 1000.0)
        .collect();
    let max_latency = latencies.iter().copied().fold(1.0f64, f64::max);
    let labels: Vec<String> = records
        .iter()
        .map(|r| format!("{}/{}", r.index, r.mode))
        .collect();

    let mut chart = ChartBuilder::on(&root)
        .caption("Latency by Index and Mode (ms)", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(80)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..records.len() as f64, 0f64..(max_latency * 1.2))?;

    chart
        .configure_mesh()
        .y_desc("Latency (ms)")
        .x_labels(records.len())
        .x_label_formatter(&|x| {
            labels
                .get(x.floor() as usize)
                .cloned()
                .unwrap_or_default()
        })
        .draw()?;

    for (i, (record, latency)) in records.iter().zip(&latencies).enumerate() {
        let color = if record.outcome.is_failed() { RED } else { BLUE };
        chart.draw_series(std::iter::once(Rectangle::new(
            [(i as f64 + 0.2, 0.0), (i as f64 + 0.8, *latency)],
            color.filled(),
        )))?;
    }

    root.present()?;
    tracing::info!(path = %path.display(), "Saved latency plot");
    Ok(())
}
