//! Folds per-tick result files into one file per stream.
//!
//! `<base>merged_<stream>` gets a leading `time` column; rows are ordered by
//! tick time, then by their order inside the tick file. Only files whose
//! time part is exactly the canonical rendering of a non-negative time are
//! picked up, so `r_060paths` or a neighbouring base's files are skipped.

use crate::output::{check_base, format_time, split_base, with_suffix, Stream};
use crate::Result;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct MergeReport {
    pub stream: Stream,
    pub path: PathBuf,
    pub ticks: usize,
    pub rows: usize,
}

pub fn merged_path(base: &Path, stream: Stream) -> PathBuf {
    with_suffix(base, &format!("merged_{}", stream.suffix()))
}

/// Tick files of `stream` under `base`, sorted by time.
pub fn tick_files(base: &Path, stream: Stream) -> Result<Vec<(f64, PathBuf)>> {
    check_base(base)?;
    let (dir, prefix) = split_base(base);
    let suffix = stream.suffix();

    let mut files = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(middle) = name
            .strip_prefix(prefix.as_str())
            .and_then(|rest| rest.strip_suffix(suffix))
        else {
            continue;
        };
        // "120shortest_sat_" also ends in "paths"; only plain numbers qualify
        match middle.parse::<f64>() {
            Ok(time) if time.is_finite() && time >= 0.0 && format_time(time) == middle => {
                files.push((time, entry.path()))
            }
            _ => debug!("Ignoring {:?}", name),
        }
    }
    files.sort_by(|a, b| a.0.total_cmp(&b.0));
    Ok(files)
}

pub fn merge_stream(base: &Path, stream: Stream) -> Result<MergeReport> {
    let files = tick_files(base, stream)?;
    let path = merged_path(base, stream);
    let mut out = BufWriter::new(File::create(&path)?);
    writeln!(out, "time,{}", stream.header())?;

    let mut rows = 0;
    for (time, file) in &files {
        let mut lines = BufReader::new(File::open(file)?).lines();
        match lines.next().transpose()? {
            Some(header) if header == stream.header() => {}
            other => {
                warn!("Skipping {:?}: unexpected header {:?}", file, other);
                continue;
            }
        }
        for line in lines {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            writeln!(out, "{time},{line}")?;
            rows += 1;
        }
        debug!("Merged {:?}", file);
    }
    out.flush()?;

    info!(
        "Merged {} {} files into {:?} ({} rows)",
        files.len(),
        stream.suffix(),
        path,
        rows
    );
    Ok(MergeReport {
        stream,
        path,
        ticks: files.len(),
        rows,
    })
}

pub fn merge_all(base: &Path) -> Result<Vec<MergeReport>> {
    Stream::ALL
        .iter()
        .map(|&stream| merge_stream(base, stream))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) {
        std::fs::write(dir.path().join(name), content).unwrap();
    }

    #[test]
    fn test_merge_orders_by_time() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("r_");
        write(&dir, "r_120paths", "item,bandwidth,path\nb,2,-1|4|-2\n");
        write(&dir, "r_60paths", "item,bandwidth,path\na,1,-1|3|-2\nc,3,-2|3|-1\n");
        write(&dir, "r_60shortest_sat_paths", "sat_1,sat_2,distance,path\n3,4,10,3|4\n");
        write(&dir, "r_0.5paths", "item,bandwidth,path\n");
        write(&dir, "other_60paths", "item,bandwidth,path\nz,9,-1|1|-2\n");

        let report = merge_stream(&base, Stream::Paths).unwrap();
        assert_eq!(report.ticks, 3);
        assert_eq!(report.rows, 3);

        let merged = std::fs::read_to_string(merged_path(&base, Stream::Paths)).unwrap();
        assert_eq!(
            merged,
            "time,item,bandwidth,path\n\
             60,a,1,-1|3|-2\n\
             60,c,3,-2|3|-1\n\
             120,b,2,-1|4|-2\n"
        );
    }

    #[test]
    fn test_neighbouring_bases_stay_apart() {
        let dir = TempDir::new().unwrap();
        write(&dir, "run60paths", "item,bandwidth,path
a,1,-1|3|-2
");
        write(&dir, "run-60paths", "item,bandwidth,path
x,1,-1|3|-2
");
        write(&dir, "run060paths", "item,bandwidth,path
y,1,-1|3|-2
");
        write(&dir, "run0.50paths", "item,bandwidth,path
z,1,-1|3|-2
");

        let files = tick_files(&dir.path().join("run"), Stream::Paths).unwrap();
        let names: Vec<_> = files.iter().map(|(t, p)| (*t, p.file_name().unwrap())).collect();
        assert_eq!(names, [(60.0, std::ffi::OsStr::new("run60paths"))]);

        // a base ending in a digit would read "run160paths" as tick 60
        assert!(matches!(
            tick_files(&dir.path().join("run1"), Stream::Paths),
            Err(crate::SimError::Config(_))
        ));
    }

    #[test]
    fn test_merge_is_repeatable() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("r_");
        write(&dir, "r_1gnd_sat_links", "gnd,sat,distance\n-1,7,800000\n");

        merge_stream(&base, Stream::GndSatLinks).unwrap();
        let first = std::fs::read_to_string(merged_path(&base, Stream::GndSatLinks)).unwrap();
        merge_stream(&base, Stream::GndSatLinks).unwrap();
        let second = std::fs::read_to_string(merged_path(&base, Stream::GndSatLinks)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "time,gnd,sat,distance\n1,-1,7,800000\n");
    }

    #[test]
    fn test_merge_all_without_ticks() {
        let dir = TempDir::new().unwrap();
        let reports = merge_all(&dir.path().join("r_")).unwrap();
        assert_eq!(reports.len(), 4);
        assert!(reports.iter().all(|r| r.rows == 0 && r.ticks == 0));
    }
}
