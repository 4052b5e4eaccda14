//! CSV persistence layer for clinostat growth series.
//!
//! The core driver talks to storage through its [`SampleSink`] trait; this
//! crate provides the CSV-backed implementation behind a shared handle so the
//! caller keeps ownership of the writers and can flush them after a run.

use clinostat_core::{GrowthSample, SampleSink, SeriesKind};
use serde::Serialize;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Storage error wrapper.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// One exported measurement row.
///
/// Column order matches the chart/table export contract:
/// `time, species, gravity, light, stem_angle, stem_length, root_depth, branch_count`.
#[derive(Debug, Serialize)]
struct ExportRow {
    time: f64,
    species: &'static str,
    gravity: f32,
    light: &'static str,
    stem_angle: f32,
    stem_length: f32,
    root_depth: f32,
    branch_count: u32,
}

impl From<&GrowthSample> for ExportRow {
    fn from(sample: &GrowthSample) -> Self {
        Self {
            time: sample.time_minutes,
            species: sample.species.as_str(),
            gravity: sample.gravity,
            light: sample.light.as_str(),
            stem_angle: sample.shoot_angle_degrees,
            stem_length: sample.shoot_length,
            root_depth: sample.root_depth,
            branch_count: sample.branch_count,
        }
    }
}

/// Streams growth samples into one CSV document.
pub struct CsvRecorder<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvRecorder<W> {
    /// Wrap a writer; the header row is emitted with the first sample.
    pub fn new(writer: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(writer),
        }
    }

    /// Append one sample row.
    pub fn write_sample(&mut self, sample: &GrowthSample) -> Result<(), StorageError> {
        self.writer.serialize(ExportRow::from(sample))?;
        Ok(())
    }

    /// Append a whole series in order.
    pub fn write_series(&mut self, samples: &[GrowthSample]) -> Result<(), StorageError> {
        for sample in samples {
            self.write_sample(sample)?;
        }
        Ok(())
    }

    /// Flush buffered rows to the underlying writer.
    pub fn flush(&mut self) -> Result<(), StorageError> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(self) -> Result<W, StorageError> {
        self.writer
            .into_inner()
            .map_err(|error| StorageError::Io(error.into_error()))
    }
}

impl CsvRecorder<File> {
    /// Create (or truncate) a CSV file at `path`.
    pub fn create(path: &Path) -> Result<Self, StorageError> {
        Ok(Self::new(File::create(path)?))
    }
}

/// File-backed recorder for an experiment run: one CSV per recorded series.
///
/// Sink callbacks cannot surface errors, so a failed row is remembered and
/// reported by [`Recorder::finish`] instead of being dropped silently.
pub struct Recorder {
    treatment: CsvRecorder<File>,
    control: Option<CsvRecorder<File>>,
    deferred_error: Option<StorageError>,
}

impl Recorder {
    /// Open the treatment CSV and, when a path is given, the control CSV.
    pub fn create(treatment: &Path, control: Option<&Path>) -> Result<Self, StorageError> {
        Ok(Self {
            treatment: CsvRecorder::create(treatment)?,
            control: control.map(CsvRecorder::create).transpose()?,
            deferred_error: None,
        })
    }

    /// Append one sample to the matching series document.
    pub fn record(&mut self, series: SeriesKind, sample: &GrowthSample) {
        if self.deferred_error.is_some() {
            return;
        }
        let result = match series {
            SeriesKind::Treatment => self.treatment.write_sample(sample),
            SeriesKind::Control => match self.control.as_mut() {
                Some(recorder) => recorder.write_sample(sample),
                None => Ok(()),
            },
        };
        if let Err(error) = result {
            self.deferred_error = Some(error);
        }
    }

    /// Flush both documents and surface any deferred write error.
    pub fn finish(&mut self) -> Result<(), StorageError> {
        if let Some(error) = self.deferred_error.take() {
            return Err(error);
        }
        self.treatment.flush()?;
        if let Some(recorder) = self.control.as_mut() {
            recorder.flush()?;
        }
        Ok(())
    }
}

/// Clonable [`SampleSink`] adapter sharing one [`Recorder`].
pub struct SharedRecorder {
    inner: Arc<Mutex<Recorder>>,
}

impl SharedRecorder {
    #[must_use]
    pub fn new(inner: Arc<Mutex<Recorder>>) -> Self {
        Self { inner }
    }
}

impl SampleSink for SharedRecorder {
    fn on_sample(&mut self, series: SeriesKind, sample: &GrowthSample) {
        let mut recorder = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        recorder.record(series, sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinostat_core::{LightDirection, Species};

    fn sample(time: f64) -> GrowthSample {
        GrowthSample {
            time_minutes: time,
            shoot_length: 42.5,
            root_depth: 17.25,
            branch_count: 3,
            shoot_angle_degrees: 88.0,
            species: Species::Cress,
            gravity: 0.0,
            light: LightDirection::Left,
        }
    }

    #[test]
    fn rows_follow_the_export_contract() {
        let mut recorder = CsvRecorder::new(Vec::new());
        recorder.write_sample(&sample(8.0)).expect("row");
        recorder.write_sample(&sample(16.0)).expect("row");
        let bytes = recorder.into_inner().expect("writer");
        let document = String::from_utf8(bytes).expect("utf8");
        let mut lines = document.lines();
        assert_eq!(
            lines.next(),
            Some("time,species,gravity,light,stem_angle,stem_length,root_depth,branch_count"),
        );
        assert_eq!(lines.next(), Some("8.0,cress,0.0,left,88.0,42.5,17.25,3"));
        assert_eq!(lines.next(), Some("16.0,cress,0.0,left,88.0,42.5,17.25,3"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn write_series_preserves_order() {
        let samples = vec![sample(1.0), sample(2.0), sample(3.0)];
        let mut recorder = CsvRecorder::new(Vec::new());
        recorder.write_series(&samples).expect("series");
        let bytes = recorder.into_inner().expect("writer");
        let document = String::from_utf8(bytes).expect("utf8");
        let times: Vec<&str> = document
            .lines()
            .skip(1)
            .map(|line| line.split(',').next().expect("time column"))
            .collect();
        assert_eq!(times, vec!["1.0", "2.0", "3.0"]);
    }
}
