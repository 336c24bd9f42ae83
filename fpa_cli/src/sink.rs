//! File-backed persistence: one CSV log plus a JSON history snapshot per
//! experiment, inside a freshly created folder.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use fpa_core::{FpaError, RecordSink, SampleRecord, Variant};
use thiserror::Error;

/// Columns written before the variant's own channels.
pub const BASE_COLUMNS: [&str; 11] = [
    "time_s",
    "observation",
    "phase",
    "pv_raw",
    "pv_smoothed",
    "pv_controller",
    "lamp_volts",
    "ihf_kw_m2",
    "pid_p",
    "pid_i",
    "pid_d",
];

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("output folder {0} already exists; refusing to overwrite")]
    Exists(PathBuf),
    #[error("create output folder {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// `<prefix>_<test>_<material>_<setpoint><unit>`, e.g. `air_007_pmma_20kWm-2`.
pub fn experiment_name(variant: Variant, test_id: &str, material: &str, setpoint: f64) -> String {
    format!(
        "{}_{}_{}_{}{}",
        variant.file_prefix(),
        test_id.trim(),
        material.trim().replace(char::is_whitespace, "-"),
        setpoint,
        variant.file_unit()
    )
}

/// Create `parent/name`; an existing folder is an error.
pub fn create_experiment_dir(parent: &Path, name: &str) -> Result<PathBuf, OutputError> {
    let path = parent.join(name);
    if let Err(e) = fs::create_dir_all(parent) {
        return Err(OutputError::Create {
            path: parent.to_path_buf(),
            source: e,
        });
    }
    match fs::create_dir(&path) {
        Ok(()) => Ok(path),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(OutputError::Exists(path)),
        Err(e) => Err(OutputError::Create { path, source: e }),
    }
}

fn sink_err(what: &str, e: impl std::fmt::Display) -> FpaError {
    FpaError::Sink(format!("{what}: {e}"))
}

fn num(x: f64) -> String {
    x.to_string()
}

/// Append-only CSV log. Each row is flushed so a crash loses at most the
/// row being written.
pub struct CsvSink {
    writer: csv::Writer<File>,
    channels: Vec<&'static str>,
}

impl CsvSink {
    pub fn create(path: &Path, channels: Vec<&'static str>) -> Result<Self, FpaError> {
        let mut writer = csv::Writer::from_path(path).map_err(|e| sink_err("open csv", e))?;
        let header = BASE_COLUMNS.iter().copied().chain(channels.iter().copied());
        writer
            .write_record(header)
            .map_err(|e| sink_err("write csv header", e))?;
        writer.flush().map_err(|e| sink_err("flush csv", e))?;
        Ok(Self { writer, channels })
    }

    fn fields(&self, r: &SampleRecord) -> Vec<String> {
        let mut out = Vec::with_capacity(BASE_COLUMNS.len() + self.channels.len());
        out.push(format!("{:.3}", r.time_s));
        out.push(r.marker.map(|m| m.as_str().to_string()).unwrap_or_default());
        out.push(r.stage.as_str().to_string());
        for v in [
            r.pv_raw,
            r.pv_smoothed,
            r.pv_controller,
            r.lamp_volts,
            r.ihf_kw_m2,
        ] {
            out.push(num(v));
        }
        match r.terms {
            Some(t) => {
                out.push(num(t.proportional));
                out.push(num(t.integral));
                out.push(num(t.derivative));
            }
            None => out.extend(std::iter::repeat_n(String::new(), 3)),
        }
        // the sentinel row carries no channels
        for name in &self.channels {
            out.push(r.channel(name).map(num).unwrap_or_default());
        }
        out
    }
}

impl RecordSink for CsvSink {
    fn append(&mut self, record: &SampleRecord) -> Result<(), FpaError> {
        let fields = self.fields(record);
        self.writer
            .write_record(&fields)
            .map_err(|e| sink_err("write csv row", e))?;
        self.writer.flush().map_err(|e| sink_err("flush csv", e))
    }

    fn finish(&mut self) -> Result<(), FpaError> {
        self.writer.flush().map_err(|e| sink_err("flush csv", e))
    }
}

/// Full history as a compact JSON array, replaced atomically on every
/// snapshot so a reader never sees a half-written file.
#[derive(Debug)]
pub struct JsonSnapshotSink {
    path: PathBuf,
    tmp: PathBuf,
}

impl JsonSnapshotSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        Self {
            path,
            tmp: tmp.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for JsonSnapshotSink {
    fn append(&mut self, _record: &SampleRecord) -> Result<(), FpaError> {
        Ok(())
    }

    fn snapshot(&mut self, history: &[SampleRecord]) -> Result<(), FpaError> {
        let file = File::create(&self.tmp).map_err(|e| sink_err("create snapshot", e))?;
        let mut w = BufWriter::new(file);
        serde_json::to_writer(&mut w, history).map_err(|e| sink_err("encode snapshot", e))?;
        w.flush().map_err(|e| sink_err("write snapshot", e))?;
        drop(w);
        fs::rename(&self.tmp, &self.path).map_err(|e| sink_err("publish snapshot", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpa_core::{Marker, Stage};

    fn row(cycle: u64, t: f64) -> SampleRecord {
        SampleRecord {
            cycle,
            time_s: t,
            marker: None,
            stage: Stage::Pretest,
            pv_raw: 1.5,
            pv_smoothed: 1.25,
            pv_controller: 1.25,
            lamp_volts: 0.0,
            ihf_kw_m2: 0.0,
            terms: None,
            channels: vec![fpa_core::Channel {
                name: "mass_g",
                value: 249.5,
            }],
        }
    }

    #[test]
    fn names_follow_variant_convention() {
        assert_eq!(
            experiment_name(Variant::NetHeatFlux, "007", "pmma", 20.0),
            "air_007_pmma_20kWm-2"
        );
        assert_eq!(
            experiment_name(Variant::MassLossRate, "12", "black pmma", 7.5),
            "N2_12_black-pmma_7.5gm-2s-1"
        );
    }

    #[test]
    fn existing_folder_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        create_experiment_dir(dir.path(), "x").unwrap();
        let err = create_experiment_dir(dir.path(), "x").unwrap_err();
        assert!(matches!(err, OutputError::Exists(_)));
    }

    #[test]
    fn csv_has_header_markers_and_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut sink = CsvSink::create(&path, vec!["mass_g"]).unwrap();
        sink.append(&row(0, 0.0).with_marker(Marker::StartLogging))
            .unwrap();
        sink.append(&SampleRecord::end_of_test(1, 0.1, Stage::Pretest))
            .unwrap();
        sink.finish().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("time_s,observation,phase,"));
        assert!(lines[0].ends_with(",pid_d,mass_g"));
        assert!(lines[1].starts_with("0.000,start_logging,pretest,1.5,"));
        assert!(lines[1].ends_with(",249.5"));
        assert!(lines[2].contains("end_test"));
    }

    #[test]
    fn snapshot_replaces_file_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonSnapshotSink::new(dir.path().join("history.json"));
        sink.snapshot(&[row(0, 0.0)]).unwrap();
        sink.snapshot(&[row(0, 0.0), row(1, 0.1)]).unwrap();

        let text = fs::read_to_string(sink.path()).unwrap();
        assert_eq!(text.lines().count(), 1, "snapshot is compact JSON");
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v.as_array().map(Vec::len), Some(2));
        assert!(!dir.path().join("history.json.tmp").exists());
    }
}
