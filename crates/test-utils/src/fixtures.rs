//! Synthetic SALT exposure files.
//!
//! Each builder starts from a realistic header for one instrument setup.
//! Tweak it with [`FitsFixture::with`] / [`FitsFixture::without`] and write it
//! into a temporary night directory.

use chrono::NaiveDate;
use fits_header::{FitsHeader, BLOCK_SIZE};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::paths::night_raw_dir;

/// Block visit used by the science fixtures.
pub const BLOCK_VISIT_ID: i64 = 71234;

/// Proposal code used by the science fixtures.
pub const PROPOSAL_CODE: &str = "2021-1-SCI-008";

#[derive(Debug, Clone)]
pub struct FitsFixture {
    header: FitsHeader,
    file_name: String,
    instrument_dir: &'static str,
    payload: Vec<u8>,
}

impl FitsFixture {
    fn base(instrument: &str, instrument_dir: &'static str, file_name: &str) -> Self {
        let mut header = FitsHeader::new();
        header.set_raw("SIMPLE", "T");
        header.set_raw("BITPIX", 16);
        header.set_raw("NAXIS", 0);
        header.set_text("INSTRUME", instrument);
        header.set_text("OBSERVAT", "SALT");
        header.set_text("PROPID", PROPOSAL_CODE);
        header.set_raw("BVISITID", BLOCK_VISIT_ID);
        header.set_text("OBJECT", "NGC 6744");
        header.set_text("OBSTYPE", "OBJECT");
        header.set_text("DATE-OBS", "2021-06-15");
        header.set_text("TIME-OBS", "21:14:07.512");
        header.set_raw("EXPTIME", "300.0");
        header.set_text("RA", "19:09:46.10");
        header.set_text("DEC", "-63:51:27.1");
        header.set_raw("EQUINOX", "2000.0");
        header.set_text("CCDSUM", "2 2");
        Self {
            header,
            file_name: file_name.to_string(),
            instrument_dir,
            payload: vec![0u8; BLOCK_SIZE],
        }
    }

    /// RSS longslit spectroscopy with the PG0900 grating.
    pub fn rss_spectroscopy() -> Self {
        Self::base("RSS", "rss", "P202106150042.fits")
            .with("OBSMODE", "SPECTROSCOPY")
            .with("DETMODE", "NORMAL")
            .with("FILTER", "PC04600")
            .with("GRATING", "PG0900")
            .with_raw("GR-ANGLE", "15.125")
            .with_raw("AR-ANGLE", "30.5")
            .with("MASKID", "PL0150N001")
            .with("POLCONF", "OPEN")
    }

    /// RSS imaging through a bandpass filter.
    pub fn rss_imaging(filter: &str) -> Self {
        Self::base("RSS", "rss", "P202106150043.fits")
            .with("OBSMODE", "IMAGING")
            .with("DETMODE", "NORMAL")
            .with("FILTER", filter)
            .with("POLCONF", "OPEN")
    }

    /// RSS Fabry-Pérot with the second etalon in medium resolution.
    pub fn rss_fabry_perot() -> Self {
        Self::base("RSS", "rss", "P202106150044.fits")
            .with("OBSMODE", "FABRY-PEROT")
            .with("FILTER", "PI06530")
            .with("ET-STATE", "S3 - Etalon 2")
            .with("ET1MODE", "HIGH RESOLUTION")
            .with_raw("ET1WAVE0", "656.0")
            .with("ET2MODE", "MEDIUM RESOLUTION")
            .with_raw("ET2WAVE0", "600.0")
            .with("POLCONF", "OPEN")
    }

    /// RSS linear polarimetry.
    pub fn rss_polarimetry() -> Self {
        Self::rss_spectroscopy()
            .named("P202106150045.fits")
            .with("POLCONF", "POLARIMETRY")
            .with("WPPATERN", "LINEAR")
    }

    /// HRS exposure on the given arm (`'H'` blue, `'R'` red).
    pub fn hrs(arm: char) -> Self {
        Self::base("HRS", "hrs", &format!("{}202106150012.fits", arm))
            .with("OBSMODE", "HIGH RESOLUTION")
            .with("DETMODE", "NORMAL")
            .with("CCDSUM", "1 1")
    }

    pub fn salticam(filter: &str) -> Self {
        Self::base("SALTICAM", "scam", "S202106150007.fits")
            .with("OBSMODE", "IMAGING")
            .with("DETMODE", "NORMAL")
            .with("FILTER", filter)
    }

    pub fn bcam(filter: &str) -> Self {
        Self::base("BCAM", "bcam", "B202106150003.fits")
            .with("OBSMODE", "IMAGING")
            .with("FILTER", filter)
    }

    /// Turn the exposure into a bias frame of a calibration proposal.
    pub fn as_bias(self) -> Self {
        self.with("PROPID", "CAL_BIAS")
            .with("OBJECT", "BIAS")
            .with("OBSTYPE", "ZERO")
            .without("BVISITID")
            .with("RA", "00:00:00.00")
            .with("DEC", "00:00:00.0")
    }

    /// Set a string-valued keyword.
    pub fn with(mut self, keyword: &str, value: &str) -> Self {
        self.header.set_text(keyword, value);
        self
    }

    /// Set a numeric keyword, written unquoted.
    pub fn with_raw(mut self, keyword: &str, value: &str) -> Self {
        self.header.set_raw(keyword, value);
        self
    }

    pub fn without(mut self, keyword: &str) -> Self {
        self.header.remove(keyword);
        self
    }

    pub fn named(mut self, file_name: &str) -> Self {
        self.file_name = file_name.to_string();
        self
    }

    /// Change the data payload, and with it the file checksum.
    pub fn with_payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn header(&self) -> &FitsHeader {
        &self.header
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.header.to_bytes();
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Write into `dir` under the fixture's file name.
    pub fn write_to(&self, dir: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        fs::write(&path, self.to_bytes())?;
        Ok(path)
    }

    /// Write into the raw directory of `night` under `base`.
    pub fn write_night(&self, base: &Path, night: NaiveDate) -> io::Result<PathBuf> {
        self.write_to(&night_raw_dir(base, night, self.instrument_dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_round_trips_through_reader() {
        let fixture = FitsFixture::rss_spectroscopy();
        let bytes = fixture.to_bytes();
        let header = FitsHeader::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(header.get("GRATING"), Some("PG0900"));
        assert_eq!(header.get("GR-ANGLE"), Some("15.125"));
        assert_eq!(header.get("BVISITID"), Some("71234"));
    }

    #[test]
    fn test_write_night_layout() {
        let dir = tempfile::tempdir().unwrap();
        let night = NaiveDate::from_ymd_opt(2021, 6, 15).unwrap();
        let path = FitsFixture::salticam("V-S1").write_night(dir.path(), night).unwrap();
        assert!(path.ends_with("salt/data/2021/0615/scam/raw/S202106150007.fits"));
    }
}
