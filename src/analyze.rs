//! `analyze` command: per-segment ride statistics over session files

use anyhow::{Context, Result};
use collect_shared::analysis::{self, RideSummary, SUMMARY_HEADER};
use collect_shared::codec;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Options of the `analyze` command
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub files: Vec<PathBuf>,
    pub segment_secs: u64,
    pub sample_interval_ms: u64,
    pub summary_out: Option<PathBuf>,
    pub json: bool,
}

/// Summaries for every complete segment of `path`
pub async fn summarize_file(path: &Path, rows_per_segment: usize) -> Result<Vec<RideSummary>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let rows = codec::decode_file(&contents).with_context(|| format!("parsing {}", path.display()))?;

    let name = path.display().to_string();
    let summaries = analysis::analyze_segments(&name, &rows, rows_per_segment)
        .with_context(|| format!("analyzing {}", path.display()))?;

    if summaries.is_empty() {
        warn!(
            "[ANALYZE] {} has {} rows, less than one segment of {} rows",
            name,
            rows.len(),
            rows_per_segment
        );
    }
    Ok(summaries)
}

/// Contents of the summary CSV
pub fn summary_csv(summaries: &[RideSummary]) -> String {
    let mut out = String::with_capacity(SUMMARY_HEADER.len() + 1 + summaries.len() * 96);
    out.push_str(SUMMARY_HEADER);
    out.push('\n');
    for summary in summaries {
        out.push_str(&summary.to_csv_line());
        out.push('\n');
    }
    out
}

fn print_table(summaries: &[RideSummary]) {
    println!(
        "{:<32} {:>4} {:>10} {:>10} {:>8} {:>8} {:>8} {:>9}",
        "File", "Seg", "Mean km/h", "Max km/h", "Std X", "Std Y", "Stop %", "Speed var"
    );
    for s in summaries {
        println!(
            "{:<32} {:>4} {:>10.2} {:>10.2} {:>8.3} {:>8.3} {:>8.1} {:>9.3}",
            s.name,
            s.segment.map(|i| i.to_string()).unwrap_or_else(|| "-".into()),
            s.mean_speed_kmh,
            s.max_speed_kmh,
            s.std_accel_x,
            s.std_accel_y,
            s.stop_time_percent,
            s.mean_speed_variation
        );
    }
}

pub async fn run(options: AnalyzeOptions) -> Result<()> {
    let rows_per_segment = analysis::rows_per_segment(options.segment_secs, options.sample_interval_ms);
    info!(
        "[ANALYZE] {} file(s), {} s segments of {} rows",
        options.files.len(),
        options.segment_secs,
        rows_per_segment
    );

    let mut summaries = Vec::new();
    for path in &options.files {
        summaries.extend(summarize_file(path, rows_per_segment).await?);
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        print_table(&summaries);
    }

    if let Some(out) = &options.summary_out {
        tokio::fs::write(out, summary_csv(&summaries))
            .await
            .with_context(|| format!("writing {}", out.display()))?;
        info!("[ANALYZE] Wrote {} segment(s) to {}", summaries.len(), out.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use collect_shared::codec::CSV_HEADER;
    use std::fmt::Write as _;

    /// A drive at constant 10 m/s with a flat accelerometer
    fn write_session_file(dir: &Path, name: &str, rows: usize) -> PathBuf {
        let mut contents = format!("{}\n", CSV_HEADER);
        for i in 0..rows {
            writeln!(contents, "48.{:06},2.352222,10.00,0.00,0.00,9.81", i).unwrap();
        }
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_segments_of_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_session_file(dir.path(), "sensor_data_20241105.csv", 50);

        let summaries = summarize_file(&path, 20).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[1].segment, Some(1));
        assert!((summaries[0].mean_speed_kmh - 36.0).abs() < 1e-9);
        assert!(summaries[0].std_accel_x.abs() < 1e-9);
        assert_eq!(summaries[0].stop_time_percent, 0.0);
    }

    #[tokio::test]
    async fn test_short_file_has_no_segments() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_session_file(dir.path(), "short.csv", 10);
        assert!(summarize_file(&path, 360).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = summarize_file(&dir.path().join("absent.csv"), 360).await.unwrap_err();
        assert!(err.to_string().contains("absent.csv"));
    }

    #[tokio::test]
    async fn test_summary_out() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_session_file(dir.path(), "ride.csv", 40);
        let out = dir.path().join("summary_by_3min.csv");

        run(AnalyzeOptions {
            files: vec![input],
            segment_secs: 10,
            sample_interval_ms: 500,
            summary_out: Some(out.clone()),
            json: true,
        })
        .await
        .unwrap();

        let written = std::fs::read_to_string(out).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], SUMMARY_HEADER);
        assert!(lines[1].contains("ride.csv,"));
    }
}
