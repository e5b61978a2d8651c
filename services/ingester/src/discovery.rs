//! Locating raw exposure files on disk.

use anyhow::{Context, Result};
use archive_common::{DateRange, Instrument};
use chrono::{Datelike, NaiveDate};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Name of an instrument's directory within a night.
pub fn instrument_dir(instrument: Instrument) -> &'static str {
    match instrument {
        Instrument::Rss => "rss",
        Instrument::Hrs => "hrs",
        Instrument::Salticam => "scam",
        Instrument::Bcam => "bcam",
    }
}

/// `<base>/salt/data/YYYY/MMDD/<instrument>/raw`
pub fn raw_dir(base: &Path, night: NaiveDate, instrument: Instrument) -> PathBuf {
    base.join("salt")
        .join("data")
        .join(format!("{:04}", night.year()))
        .join(format!("{:02}{:02}", night.month(), night.day()))
        .join(instrument_dir(instrument))
        .join("raw")
}

fn is_fits(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("fits"))
        .unwrap_or(false)
}

/// Raw files of the given instruments for every night in `range`.
///
/// Nights are visited in order, instruments in the order given and files
/// sorted by name. Missing directories are skipped.
pub fn discover(base: &Path, range: &DateRange, instruments: &[Instrument]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for night in range.nights() {
        for instrument in instruments {
            let dir = raw_dir(base, night, *instrument);
            if !dir.is_dir() {
                continue;
            }
            let before = files.len();
            for entry in WalkDir::new(&dir)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
            {
                let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
                if entry.file_type().is_file() && is_fits(entry.path()) {
                    files.push(entry.into_path());
                }
            }
            debug!(
                night = %night,
                instrument = %instrument,
                files = files.len() - before,
                "Scanned night directory"
            );
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_raw_dir_layout() {
        let dir = raw_dir(Path::new("/data"), date(2021, 6, 5), Instrument::Salticam);
        assert_eq!(dir, PathBuf::from("/data/salt/data/2021/0605/scam/raw"));
    }

    #[test]
    fn test_discover_sorted_and_filtered() {
        let base = tempfile::tempdir().unwrap();
        let night = date(2021, 6, 15);
        let rss = raw_dir(base.path(), night, Instrument::Rss);
        fs::create_dir_all(&rss).unwrap();
        for name in ["P202106150002.fits", "P202106150001.fits", "notes.txt"] {
            fs::write(rss.join(name), b"").unwrap();
        }
        let hrs = raw_dir(base.path(), date(2021, 6, 16), Instrument::Hrs);
        fs::create_dir_all(&hrs).unwrap();
        fs::write(hrs.join("H202106160001.FITS"), b"").unwrap();

        let range = DateRange::new(night, date(2021, 6, 16), true).unwrap();
        let files = discover(base.path(), &range, &[Instrument::Rss, Instrument::Hrs]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["P202106150001.fits", "P202106150002.fits", "H202106160001.FITS"]
        );

        let exclusive = DateRange::new(night, date(2021, 6, 16), false).unwrap();
        let files = discover(base.path(), &exclusive, &[Instrument::Hrs]).unwrap();
        assert!(files.is_empty());
    }
}
