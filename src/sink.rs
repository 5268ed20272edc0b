// Report sinks - where fused reports go once built
//
// Sending is fire-and-forget from the pipeline's point of view: a failed send
// is logged by the caller and never retried.

use crate::report::FusedReport;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Device id used by the cloud hub when none is configured
pub const DEFAULT_DEVICE_ID: &str = "ADFReport";

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Envelope the cloud hub expects around each report
#[derive(Debug, Serialize)]
pub struct CloudMessage<'a> {
    #[serde(rename = "deviceId")]
    pub device_id: &'a str,
    #[serde(flatten)]
    pub report: &'a FusedReport,
}

pub trait ReportSink: Send {
    fn send(&mut self, report: &FusedReport) -> Result<(), SinkError>;
}

impl<S: ReportSink + ?Sized> ReportSink for Box<S> {
    fn send(&mut self, report: &FusedReport) -> Result<(), SinkError> {
        (**self).send(report)
    }
}

/// Discards every report
#[derive(Debug, Default)]
pub struct NullSink;

impl ReportSink for NullSink {
    fn send(&mut self, _report: &FusedReport) -> Result<(), SinkError> {
        Ok(())
    }
}

/// One JSON envelope per line, e.g. to stdout for a forwarding process
pub struct JsonLinesSink<W> {
    device_id: String,
    out: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(device_id: impl Into<String>, out: W) -> Self {
        Self {
            device_id: device_id.into(),
            out,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> ReportSink for JsonLinesSink<W> {
    fn send(&mut self, report: &FusedReport) -> Result<(), SinkError> {
        let message = CloudMessage {
            device_id: &self.device_id,
            report,
        };
        serde_json::to_writer(&mut self.out, &message)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

/// Saves each report as a pretty JSON file for later upload or inspection
#[derive(Debug, Clone)]
pub struct FileSink {
    device_id: String,
    output_dir: PathBuf,
}

impl FileSink {
    pub fn new(device_id: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            device_id: device_id.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write one report, returning the file path
    pub fn save(&self, report: &FusedReport) -> Result<PathBuf, SinkError> {
        std::fs::create_dir_all(&self.output_dir)?;

        let path = self.output_dir.join(report_file_name(report));
        let message = CloudMessage {
            device_id: &self.device_id,
            report,
        };
        std::fs::write(&path, serde_json::to_string_pretty(&message)?)?;
        log::debug!("Report saved to: {}", path.display());

        Ok(path)
    }
}

impl ReportSink for FileSink {
    fn send(&mut self, report: &FusedReport) -> Result<(), SinkError> {
        self.save(report).map(|_| ())
    }
}

fn report_file_name(report: &FusedReport) -> String {
    let sanitize = |s: &str| -> String {
        s.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
            .collect()
    };
    format!(
        "adf-report_{}_{}.json",
        sanitize(&report.device_alias),
        sanitize(&report.device_reporting_utc_time)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Dispatcher;
    use crate::params::Parameters;
    use crate::report;
    use chrono::{TimeZone, Utc};

    fn sample_report() -> FusedReport {
        let now = Utc.with_ymd_and_hms(2017, 2, 25, 18, 7, 47).unwrap();
        let mut d = Dispatcher::default();
        d.dispatch_at("%240/7", now);
        let params = Parameters {
            device_alias: "Tiger Mountain".into(),
            ..Parameters::default()
        };
        report::build_at(d.readings(), &params, now).unwrap()
    }

    #[test]
    fn test_json_lines_envelope() {
        let mut sink = JsonLinesSink::new("ADF-7", Vec::new());
        sink.send(&sample_report()).unwrap();
        sink.send(&sample_report()).unwrap();
        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["deviceId"], "ADF-7");
        assert_eq!(value["absoluteBearing"], "240");
        assert_eq!(value["gpsPosition"], serde_json::Value::Null);
    }

    #[test]
    fn test_file_sink_writes_parseable_json() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(DEFAULT_DEVICE_ID, dir.path().join("reports"));
        let path = sink.save(&sample_report()).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "adf-report_Tiger-Mountain_2017-02-25T18-07-47-000Z.json"
        );
        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["deviceId"], DEFAULT_DEVICE_ID);
        assert_eq!(saved["deviceUTCTime"], "2017-02-25T18:07:47.000Z");
    }

    #[test]
    fn test_null_sink() {
        assert!(NullSink.send(&sample_report()).is_ok());
        let mut boxed: Box<dyn ReportSink> = Box::new(NullSink);
        assert!(boxed.send(&sample_report()).is_ok());
    }
}
