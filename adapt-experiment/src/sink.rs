//! Trial data output.
//!
//! A trial hands its summary record and its trajectory to a [`DataSink`]
//! as soon as it ends; nothing is buffered across trials.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use adapt_core::{TrajectorySample, TrialRecord};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot format row: {0}")]
    Csv(#[from] csv::Error),
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> SinkError + '_ {
    move |source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub trait DataSink {
    /// One summary row per trial.
    fn write_summary(&mut self, record: &TrialRecord) -> Result<(), SinkError>;

    /// The samples of one trial, preceded by `label`.
    fn write_trajectory(
        &mut self,
        block: u32,
        samples: &[TrajectorySample],
        label: &str,
    ) -> Result<(), SinkError>;
}

/// Tab-separated files under a data directory:
/// `<subject>.ana` holds one summary row per trial and
/// `<subject>_<block>.mvt` the trajectories of each block.
#[derive(Debug, Clone)]
pub struct TsvSink {
    dir: PathBuf,
    subject: String,
}

impl TsvSink {
    /// Creates `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>, subject: impl Into<String>) -> Result<Self, SinkError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        Ok(Self {
            dir,
            subject: subject.into(),
        })
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir.join(format!("{}.ana", self.subject))
    }

    pub fn trajectory_path(&self, block: u32) -> PathBuf {
        self.dir.join(format!("{}_{block:02}.mvt", self.subject))
    }

    fn open_append(path: &Path) -> Result<(File, bool), SinkError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_err(path))?;
        let fresh = file.metadata().map_err(io_err(path))?.len() == 0;
        Ok((file, fresh))
    }
}

/// Rows are formatted into memory so each record reaches the file in one
/// `write_all`.
fn tsv_buffer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_writer(Vec::new())
}

fn into_bytes(writer: csv::Writer<Vec<u8>>, path: &Path) -> Result<Vec<u8>, SinkError> {
    writer.into_inner().map_err(|e| SinkError::Io {
        path: path.to_path_buf(),
        source: e.into_error(),
    })
}

impl DataSink for TsvSink {
    fn write_summary(&mut self, record: &TrialRecord) -> Result<(), SinkError> {
        let path = self.summary_path();
        let (mut file, fresh) = Self::open_append(&path)?;
        let columns = record.columns();

        let mut writer = tsv_buffer();
        if fresh {
            writer.write_record(columns.iter().map(|(k, _)| *k))?;
        }
        writer.write_record(columns.iter().map(|(_, v)| v.to_string()))?;

        let out = into_bytes(writer, &path)?;
        file.write_all(&out).map_err(io_err(&path))
    }

    fn write_trajectory(
        &mut self,
        block: u32,
        samples: &[TrajectorySample],
        label: &str,
    ) -> Result<(), SinkError> {
        let path = self.trajectory_path(block);
        let (mut file, fresh) = Self::open_append(&path)?;

        let mut writer = tsv_buffer();
        if fresh {
            writer.write_record(TrajectorySample::HEADER)?;
        }
        writer.write_record([label])?;
        for s in samples {
            writer.write_record([
                s.time.to_string(),
                s.state.code().to_string(),
                s.raw_x.to_string(),
                s.raw_y.to_string(),
                s.display_x.to_string(),
                s.display_y.to_string(),
            ])?;
        }

        let mut out = into_bytes(writer, &path)?;
        out.push(b'\n');
        file.write_all(&out).map_err(io_err(&path))
    }
}

/// One labelled trajectory as kept by [`MemorySink`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTrajectory {
    pub block: u32,
    pub label: String,
    pub samples: Vec<TrajectorySample>,
}

/// Keeps everything in memory, for tests and embedders.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub summaries: Vec<TrialRecord>,
    pub trajectories: Vec<StoredTrajectory>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataSink for MemorySink {
    fn write_summary(&mut self, record: &TrialRecord) -> Result<(), SinkError> {
        self.summaries.push(record.clone());
        Ok(())
    }

    fn write_trajectory(
        &mut self,
        block: u32,
        samples: &[TrajectorySample],
        label: &str,
    ) -> Result<(), SinkError> {
        self.trajectories.push(StoredTrajectory {
            block,
            label: label.to_string(),
            samples: samples.to_vec(),
        });
        Ok(())
    }
}

/// Writes any serializable value as pretty JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), SinkError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).map_err(io_err(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use adapt_core::{FieldValue, TrialState};

    fn sample(t: f64, state: TrialState) -> TrajectorySample {
        TrajectorySample {
            time: t,
            state,
            raw_x: 1.5,
            raw_y: -2.0,
            display_x: 513.5,
            display_y: 382.0,
        }
    }

    #[test]
    fn summary_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = TsvSink::new(dir.path(), "s01").unwrap();

        let mut record = TrialRecord::template();
        record.block_number = Some(1);
        record.trial_number = Some(1);
        sink.write_summary(&record).unwrap();
        record.trial_number = Some(2);
        sink.write_summary(&record).unwrap();

        let text = fs::read_to_string(sink.summary_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("blockNumber\ttrialNumber\tstartTime"));
        let row: Vec<&str> = lines[2].split('\t').collect();
        assert_eq!(row[0], "1");
        assert_eq!(row[1], "2");
        assert_eq!(row[5], "-1");
        assert_eq!(row.len(), adapt_core::SUMMARY_COLUMNS.len());
    }

    #[test]
    fn existing_summary_file_gets_no_second_header() {
        let dir = tempfile::tempdir().unwrap();
        let mut record = TrialRecord::template();
        record.insert_extra("session", FieldValue::Int(4));

        TsvSink::new(dir.path(), "s02").unwrap().write_summary(&record).unwrap();
        let mut again = TsvSink::new(dir.path(), "s02").unwrap();
        again.write_summary(&record).unwrap();

        let text = fs::read_to_string(again.summary_path()).unwrap();
        assert_eq!(text.lines().filter(|l| l.starts_with("blockNumber")).count(), 1);
        assert!(text.lines().next().unwrap().ends_with("\tsession"));
    }

    #[test]
    fn extra_key_with_a_tab_is_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = TsvSink::new(dir.path(), "s04").unwrap();
        let mut record = TrialRecord::template();
        record.insert_extra("hand\tside", FieldValue::Int(1));
        sink.write_summary(&record).unwrap();

        let text = fs::read_to_string(sink.summary_path()).unwrap();
        let header = text.lines().next().unwrap();
        assert!(header.ends_with("\tfeedbackAngle\t\"hand\tside\""), "{header}");

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_reader(text.as_bytes());
        let names = reader.headers().unwrap().clone();
        assert_eq!(names.len(), adapt_core::SUMMARY_COLUMNS.len() + 1);
        assert_eq!(&names[names.len() - 1], "hand\tside");
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(&row[row.len() - 1], "1");
    }

    #[test]
    fn trajectory_blocks_are_labelled_and_separated() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = TsvSink::new(dir.path().join("nested"), "s03").unwrap();
        let samples = [sample(0.0, TrialState::Starting), sample(0.01, TrialState::MovingEarly)];

        sink.write_trajectory(2, &samples, "Trial 1:").unwrap();
        sink.write_trajectory(2, &samples[..1], "Trial 2:").unwrap();

        let path = sink.trajectory_path(2);
        assert!(path.ends_with("s03_02.mvt"));
        let text = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "time\tstate\trawX\trawY\tdisplayX\tdisplayY");
        assert_eq!(lines[1], "Trial 1:");
        assert_eq!(lines[2], "0\t0\t1.5\t-2\t513.5\t382");
        assert_eq!(lines[3], "0.01\t4\t1.5\t-2\t513.5\t382");
        assert_eq!(lines[4], "");
        assert_eq!(lines[5], "Trial 2:");
        assert!(text.ends_with("\n\n"));
    }

    #[test]
    fn memory_sink_keeps_everything() {
        let mut sink = MemorySink::new();
        sink.write_summary(&TrialRecord::template()).unwrap();
        sink.write_trajectory(1, &[sample(0.0, TrialState::Waiting)], "Trial 1:")
            .unwrap();
        assert_eq!(sink.summaries.len(), 1);
        assert_eq!(sink.trajectories[0].label, "Trial 1:");
        assert_eq!(sink.trajectories[0].samples.len(), 1);
    }

    #[test]
    fn json_written_pretty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_json(&path, &serde_json::json!({ "trials": 3 })).unwrap();
        let back: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back["trials"], 3);
    }
}
