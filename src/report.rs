//! Tab separated report files.

use std::fs::OpenOptions;
use std::path::Path;

use csv::{Writer, WriterBuilder};
use tracing::debug;

use crate::dvh::DoseStatistics;
use crate::error::AnalysisError;
use crate::scanner::SliceSummary;

/// Dose levels (Gy) reported as V10, V15, ... V70 in the summary file.
pub fn summary_thresholds_gy() -> impl Iterator<Item = u32> {
    (10..=70).step_by(5)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DvhRow {
    pub dose: f64,
    pub volume_absolute: f64,
    pub volume_relative: f64,
}

/// One line of the aggregate summary file.
#[derive(Clone, Debug, PartialEq)]
pub struct SummaryRow {
    /// Volumes at [`summary_thresholds_gy`], in cm³.
    pub absolute: Vec<f64>,
    /// Volumes at [`summary_thresholds_gy`], in percent.
    pub relative: Vec<f64>,
    pub statistics: DoseStatistics,
}

fn tab_writer<W: std::io::Write>(writer: W) -> Writer<W> {
    WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_writer(writer)
}

fn two_decimals(value: f64) -> String {
    format!("{value:.2}")
}

pub fn write_dvh_table(path: impl AsRef<Path>, rows: &[DvhRow]) -> Result<(), AnalysisError> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path.as_ref())?;
    let mut writer = tab_writer(file);
    for row in rows {
        writer.write_record([
            two_decimals(row.dose),
            two_decimals(row.volume_absolute),
            two_decimals(row.volume_relative),
        ])?;
    }
    writer.flush()?;
    debug!(path = %path.as_ref().display(), rows = rows.len(), "Wrote DVH table");
    Ok(())
}

/// Append `row` to the summary file, writing the header first when the
/// file does not exist yet.
pub fn append_summary(path: impl AsRef<Path>, row: &SummaryRow) -> Result<(), AnalysisError> {
    let path = path.as_ref();
    let is_new = !path.exists();
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = tab_writer(file);

    if is_new {
        let header = summary_thresholds_gy()
            .map(|gy| format!("V{gy}"))
            .chain(summary_thresholds_gy().map(|gy| format!("V{gy}_r")))
            .chain(["Mean", "Median", "MaxDose", "Volume"].map(String::from));
        writer.write_record(header)?;
    }

    let stats = &row.statistics;
    let totals = [stats.mean, stats.median, stats.max, stats.volume_cm3];
    let record = row
        .absolute
        .iter()
        .chain(&row.relative)
        .chain(&totals)
        .map(|&value| two_decimals(value));
    writer.write_record(record)?;
    writer.flush()?;
    Ok(())
}

pub fn write_slice_table(
    path: impl AsRef<Path>,
    slices: &[SliceSummary],
) -> Result<(), AnalysisError> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path.as_ref())?;
    let mut writer = tab_writer(file);
    writer.write_record(["Slice", "MinDose", "MaxDose", "Covered"])?;
    for slice in slices {
        writer.write_record([
            slice.slice_index.to_string(),
            slice.min_dose.map(two_decimals).unwrap_or_default(),
            slice.max_dose.map(two_decimals).unwrap_or_default(),
            u8::from(slice.covered).to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn summary_row(offset: f64) -> SummaryRow {
        SummaryRow {
            absolute: summary_thresholds_gy()
                .map(|gy| f64::from(gy) + offset)
                .collect(),
            relative: summary_thresholds_gy().map(|_| 50.0).collect(),
            statistics: DoseStatistics {
                mean: 1234.5,
                median: 1200.0,
                max: 6000.0,
                volume_cm3: 25.126,
            },
        }
    }

    #[test]
    fn dvh_table_uses_two_decimals_and_tabs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("P001_DVH.txt");
        let rows = [
            DvhRow {
                dose: 0.0,
                volume_absolute: 25.0,
                volume_relative: 100.0,
            },
            DvhRow {
                dose: 1.0,
                volume_absolute: 24.987,
                volume_relative: 99.944,
            },
        ];
        write_dvh_table(&path, &rows).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "0.00\t25.00\t100.00\n1.00\t24.99\t99.94\n");
    }

    #[test]
    fn summary_header_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("basic dosimetric.txt");
        append_summary(&path, &summary_row(0.0)).unwrap();
        append_summary(&path, &summary_row(0.5)).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);

        let header: Vec<_> = lines[0].split('\t').collect();
        assert_eq!(header.len(), 13 + 13 + 4);
        assert_eq!(header[0], "V10");
        assert_eq!(header[12], "V70");
        assert_eq!(header[13], "V10_r");
        assert_eq!(&header[26..], ["Mean", "Median", "MaxDose", "Volume"]);

        let second: Vec<_> = lines[2].split('\t').collect();
        assert_eq!(second[0], "10.50");
        assert_eq!(&second[26..], ["1234.50", "1200.00", "6000.00", "25.13"]);
    }

    #[test]
    fn uncovered_slices_have_empty_dose_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("P001_slices.txt");
        let slices = [
            SliceSummary {
                slice_index: 0,
                min_dose: Some(1500.0),
                max_dose: Some(4200.25),
                covered: true,
            },
            SliceSummary {
                slice_index: 1,
                min_dose: None,
                max_dose: None,
                covered: false,
            },
        ];
        write_slice_table(&path, &slices).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "Slice\tMinDose\tMaxDose\tCovered\n0\t1500.00\t4200.25\t1\n1\t\t\t0\n"
        );
    }
}
