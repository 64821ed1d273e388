//! Per-tick result files
//!
//! Each tick writes one file per [`Stream`], named `<base><time><stream>`,
//! where `time` is the tick time printed as a plain decimal (`120`, `0.5`).
//! The file name part of a base must not end in a digit, `.` or `-`, or the
//! files of base `run` could not be told apart from those of base `run1`.

use crate::driver::{RequestFailure, RunSummary};
use crate::workload::Request;
use crate::{Result, SimError};
use constellation_net::{ResolvedPath, RoutingTable};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stream {
    ShortestSatPaths,
    GndSatLinks,
    Paths,
    Failures,
}

impl Stream {
    pub const ALL: [Stream; 4] = [
        Stream::ShortestSatPaths,
        Stream::GndSatLinks,
        Stream::Paths,
        Stream::Failures,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            Stream::ShortestSatPaths => "shortest_sat_paths",
            Stream::GndSatLinks => "gnd_sat_links",
            Stream::Paths => "paths",
            Stream::Failures => "failures",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            Stream::ShortestSatPaths => "sat_1,sat_2,distance,path",
            Stream::GndSatLinks => "gnd,sat,distance",
            Stream::Paths => "item,bandwidth,path",
            Stream::Failures => "item,source,destination,reason",
        }
    }
}

pub fn format_time(time_s: f64) -> String {
    format!("{time_s}")
}

/// Appends `suffix` to the file name of `base` without inserting a separator.
pub(crate) fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Splits `base` into the directory holding the result files and the file
/// name prefix. A base ending in a separator is a bare directory.
pub(crate) fn split_base(base: &Path) -> (PathBuf, String) {
    let raw = base.to_string_lossy();
    if raw.ends_with('/') || raw.ends_with(std::path::MAIN_SEPARATOR) {
        return (base.to_path_buf(), String::new());
    }
    let dir = match base.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let prefix = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    (dir, prefix)
}

/// Rejects a base whose file name prefix could run into the tick time.
pub(crate) fn check_base(base: &Path) -> Result<()> {
    let (_, prefix) = split_base(base);
    match prefix.chars().last() {
        Some(c) if c.is_ascii_digit() || c == '.' || c == '-' => Err(SimError::Config(format!(
            "result base {base:?} must not end in {c:?}"
        ))),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone)]
pub struct ResultWriter {
    base: PathBuf,
}

impl ResultWriter {
    /// Creates the parent directory of `base` if needed.
    pub fn new(base: impl Into<PathBuf>) -> Result<Self> {
        let base = base.into();
        check_base(&base)?;
        let (dir, _) = split_base(&base);
        std::fs::create_dir_all(dir)?;
        Ok(Self { base })
    }

    pub fn tick_path(&self, time_s: f64, stream: Stream) -> PathBuf {
        with_suffix(&self.base, &format!("{}{}", format_time(time_s), stream.suffix()))
    }

    pub fn summary_path(&self, worker: usize) -> PathBuf {
        with_suffix(&self.base, &format!("summary-{worker}.json"))
    }

    pub fn write_tick(
        &self,
        time_s: f64,
        table: &RoutingTable,
        resolved: &[(&Request, ResolvedPath)],
        failures: &[RequestFailure],
    ) -> Result<()> {
        self.write_stream(time_s, Stream::ShortestSatPaths, |out| {
            for (a, b, path) in table.sat_paths.iter() {
                let hops: Vec<String> = path.satellites.iter().map(|s| s.to_string()).collect();
                writeln!(out, "{},{},{},{}", a, b, path.distance_m, hops.join("|"))?;
            }
            Ok(())
        })?;

        self.write_stream(time_s, Stream::GndSatLinks, |out| {
            for (ground, attachment) in table.attachments.iter() {
                writeln!(out, "{},{},{}", ground, attachment.satellite, attachment.distance_m)?;
            }
            Ok(())
        })?;

        self.write_stream(time_s, Stream::Paths, |out| {
            for (request, path) in resolved {
                writeln!(out, "{},{},{}", request.item, request.size, path.pipe_joined())?;
            }
            Ok(())
        })?;

        self.write_stream(time_s, Stream::Failures, |out| {
            for failure in failures {
                let request = &failure.request;
                writeln!(
                    out,
                    "{},{},{},{}",
                    request.item,
                    request.source,
                    request.destination,
                    failure.error.reason()
                )?;
            }
            Ok(())
        })
    }

    fn write_stream<F>(&self, time_s: f64, stream: Stream, rows: F) -> Result<()>
    where
        F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
    {
        let path = self.tick_path(time_s, stream);
        let mut out = BufWriter::new(File::create(&path)?);
        writeln!(out, "{}", stream.header())?;
        rows(&mut out)?;
        out.flush()?;
        debug!("Wrote {:?}", path);
        Ok(())
    }

    pub fn write_summary(&self, summary: &RunSummary) -> Result<PathBuf> {
        let path = self.summary_path(summary.worker);
        let out = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(out, summary)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_formatting() {
        assert_eq!(format_time(120.0), "120");
        assert_eq!(format_time(0.5), "0.5");
        assert_eq!(format_time(0.0), "0");
    }

    #[test]
    fn test_file_names() {
        let writer = ResultWriter {
            base: PathBuf::from("results/run_"),
        };
        assert_eq!(
            writer.tick_path(60.0, Stream::GndSatLinks),
            PathBuf::from("results/run_60gnd_sat_links")
        );
        assert_eq!(writer.summary_path(3), PathBuf::from("results/run_summary-3.json"));
    }

    #[test]
    fn test_split_base() {
        assert_eq!(
            split_base(Path::new("results/run_")),
            (PathBuf::from("results"), "run_".to_string())
        );
        assert_eq!(
            split_base(Path::new("results/")),
            (PathBuf::from("results/"), String::new())
        );
        assert_eq!(split_base(Path::new("run_")), (PathBuf::from("."), "run_".to_string()));
    }

    #[test]
    fn test_base_must_not_end_in_time_characters() {
        assert!(check_base(Path::new("results/run_")).is_ok());
        assert!(check_base(Path::new("results/")).is_ok());
        for bad in ["results/run1", "results/run.", "results/run-"] {
            assert!(
                matches!(check_base(Path::new(bad)), Err(SimError::Config(_))),
                "{bad}"
            );
        }
        assert!(ResultWriter::new("results/run7").is_err());
    }

    #[test]
    fn test_directory_base() {
        let dir = tempfile::TempDir::new().unwrap();
        let base = format!("{}/out/", dir.path().display());
        let writer = ResultWriter::new(&base).unwrap();
        writer
            .write_tick(0.0, &RoutingTable::default(), &[], &[])
            .unwrap();
        assert!(dir.path().join("out/0paths").exists());
    }

    #[test]
    fn test_empty_tick_writes_headers() {
        let dir = tempfile::TempDir::new().unwrap();
        let writer = ResultWriter::new(dir.path().join("nested/r_")).unwrap();
        writer
            .write_tick(5.0, &RoutingTable::default(), &[], &[])
            .unwrap();
        for stream in Stream::ALL {
            let content = std::fs::read_to_string(writer.tick_path(5.0, stream)).unwrap();
            assert_eq!(content, format!("{}\n", stream.header()));
        }
    }
}
