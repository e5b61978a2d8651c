//! Declarative header keyword mapping.
//!
//! Each instrument has a two-column table (header keyword, setup field) that
//! is loaded once into an immutable [`KeywordTable`]. Mapping a header through
//! the table yields a [`SetupRecord`] in which unmapped or absent keywords
//! are null; calculators that need a field ask for it and report
//! [`IngestionError::MissingKeyword`] themselves.

use archive_common::Instrument;
use fits_header::FitsHeader;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{IngestionError, Result};

/// Setup field names shared by the calculators.
pub mod fields {
    pub const INSTRUMENT: &str = "instrument";
    pub const TELESCOPE: &str = "telescope";
    pub const PROPOSAL_CODE: &str = "proposal_code";
    pub const BLOCK_VISIT_ID: &str = "block_visit_id";
    pub const OBJECT: &str = "object";
    pub const OBSERVATION_TYPE: &str = "observation_type";
    pub const OBSERVATION_MODE: &str = "observation_mode";
    pub const DATE_OBS: &str = "date_obs";
    pub const TIME_OBS: &str = "time_obs";
    pub const EXPOSURE_TIME: &str = "exposure_time";
    pub const RA: &str = "ra";
    pub const DEC: &str = "dec";
    pub const EQUINOX: &str = "equinox";
    pub const DETECTOR_SUMMATION: &str = "detector_summation";
    pub const FILTER: &str = "filter";
    pub const GRATING: &str = "grating";
    pub const GRATING_ANGLE: &str = "grating_angle";
    pub const CAMERA_ANGLE: &str = "camera_angle";
    pub const SLIT_BARCODE: &str = "slit_barcode";
    pub const MASK_TYPE: &str = "mask_type";
    pub const ETALON_STATE: &str = "etalon_state";
    pub const ETALON1_MODE: &str = "etalon1_mode";
    pub const ETALON1_WAVELENGTH: &str = "etalon1_wavelength";
    pub const ETALON2_MODE: &str = "etalon2_mode";
    pub const ETALON2_WAVELENGTH: &str = "etalon2_wavelength";
    pub const POLARIZATION_CONFIG: &str = "polarization_config";
    pub const WAVEPLATE_PATTERN: &str = "waveplate_pattern";
}

/// Ordered (keyword, field) pairs for one instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordTable {
    entries: Vec<(String, String)>,
}

impl KeywordTable {
    /// Parse a two-column table. Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries: Vec<(String, String)> = Vec::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let columns: Vec<&str> = line.split_whitespace().collect();
            let [keyword, field] = columns.as_slice() else {
                return Err(IngestionError::KeywordTable(format!(
                    "line {}: expected 'KEYWORD field', got '{}'",
                    number + 1,
                    line
                )));
            };
            if entries.iter().any(|(_, f)| f == field) {
                return Err(IngestionError::KeywordTable(format!(
                    "line {}: field '{}' mapped twice",
                    number + 1,
                    field
                )));
            }
            entries.push((keyword.to_ascii_uppercase(), field.to_string()));
        }
        Ok(Self { entries })
    }

    /// Table shipped with the crate.
    pub fn builtin(instrument: Instrument) -> Result<Self> {
        let text = match instrument {
            Instrument::Rss => include_str!("../keywords/rss.txt"),
            Instrument::Hrs => include_str!("../keywords/hrs.txt"),
            Instrument::Salticam => include_str!("../keywords/salticam.txt"),
            Instrument::Bcam => include_str!("../keywords/bcam.txt"),
        };
        Self::parse(text)
            .map_err(|e| IngestionError::KeywordTable(format!("built-in {} table: {}", instrument, e)))
    }

    /// Load `<dir>/<instrument>.txt`, falling back to the built-in table.
    pub fn load(dir: &Path, instrument: Instrument) -> Result<Self> {
        let path = dir.join(format!("{}.txt", instrument.as_str().to_ascii_lowercase()));
        if !path.exists() {
            return Self::builtin(instrument);
        }
        let text = fs::read_to_string(&path)?;
        Self::parse(&text)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, f)| (k.as_str(), f.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Header keyword mapped to a field.
    pub fn keyword_for(&self, field: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, f)| f == field)
            .map(|(k, _)| k.as_str())
    }

    /// Map a raw header into a setup record.
    pub fn map(&self, header: &FitsHeader) -> SetupRecord {
        let values = self
            .entries
            .iter()
            .map(|(keyword, field)| {
                let value = header
                    .get(keyword)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string);
                (field.clone(), MappedValue {
                    keyword: keyword.clone(),
                    value,
                })
            })
            .collect();
        SetupRecord { values }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct MappedValue {
    keyword: String,
    value: Option<String>,
}

/// Instrument setup: field name to optional header value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetupRecord {
    values: BTreeMap<String, MappedValue>,
}

impl SetupRecord {
    /// Build a record directly from (field, value) pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let values = pairs
            .into_iter()
            .map(|(field, value)| {
                (field.to_string(), MappedValue {
                    keyword: field.to_ascii_uppercase(),
                    value: Some(value.to_string()),
                })
            })
            .collect();
        Self { values }
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.values.get(field).and_then(|v| v.value.as_deref())
    }

    pub fn required_text(&self, field: &str) -> Result<&str> {
        self.text(field).ok_or_else(|| self.missing(field))
    }

    /// Parse a numeric field; absent is `None`, unparseable is an error.
    pub fn f64(&self, field: &str) -> Result<Option<f64>> {
        match self.text(field) {
            None => Ok(None),
            Some(value) => value
                .parse::<f64>()
                .map(Some)
                .map_err(|_| IngestionError::invalid(self.keyword(field), format!("'{}' is not a number", value))),
        }
    }

    pub fn required_f64(&self, field: &str) -> Result<f64> {
        self.f64(field)?.ok_or_else(|| self.missing(field))
    }

    /// First value of a detector summation such as `2 2`.
    pub fn spectral_binning(&self) -> Result<u32> {
        let value = self.required_text(fields::DETECTOR_SUMMATION)?;
        value
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|b| *b > 0)
            .ok_or_else(|| {
                IngestionError::invalid(
                    self.keyword(fields::DETECTOR_SUMMATION),
                    format!("'{}' is not a binning", value),
                )
            })
    }

    /// Header keyword behind a field, for diagnostics.
    pub fn keyword(&self, field: &str) -> String {
        self.values
            .get(field)
            .map(|v| v.keyword.clone())
            .unwrap_or_else(|| field.to_ascii_uppercase())
    }

    /// Non-null values, keyed by field.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .filter_map(|(field, v)| v.value.clone().map(|value| (field.clone(), value)))
            .collect()
    }

    fn missing(&self, field: &str) -> IngestionError {
        IngestionError::MissingKeyword {
            keyword: self.keyword(field),
            field: field.to_string(),
        }
    }
}
