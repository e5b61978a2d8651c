//! Bandpass filter coverage from transmission curves.
//!
//! The wavelength interval of a filter is where its transmission is at or
//! above 50%. Both edges are found by linear interpolation between the
//! samples that bracket the threshold.

use archive_common::{Energy, Instrument};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::error::{IngestionError, Result};

/// Transmission level that bounds the filter interval.
pub const TRANSMISSION_THRESHOLD: f64 = 0.5;

const ANGSTROM: f64 = 1e-10;

/// Transmission samples sorted by wavelength. Wavelengths in Ångström,
/// transmission as a fraction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransmissionCurve {
    points: Vec<(f64, f64)>,
}

impl TransmissionCurve {
    pub fn new(mut points: Vec<(f64, f64)>) -> Self {
        points.retain(|(w, t)| w.is_finite() && t.is_finite());
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        // Curves given in percent.
        if points.iter().any(|(_, t)| *t > 1.0) {
            for point in &mut points {
                point.1 /= 100.0;
            }
        }
        Self { points }
    }

    /// Parse a two-column text file. Lines starting with `!` or `#` and
    /// lines without exactly two columns are skipped.
    pub fn parse(text: &str) -> Result<Self> {
        let mut points = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.starts_with('!') || line.starts_with('#') {
                continue;
            }
            let columns: Vec<&str> = line.split_whitespace().collect();
            if columns.len() != 2 {
                continue;
            }
            let wavelength = columns[0].parse::<f64>();
            let transmission = columns[1].parse::<f64>();
            match (wavelength, transmission) {
                (Ok(w), Ok(t)) => points.push((w, t)),
                _ => {
                    return Err(IngestionError::FilterCurve(format!(
                        "unparseable line '{}'",
                        line
                    )))
                }
            }
        }
        if points.len() < 2 {
            return Err(IngestionError::FilterCurve(
                "curve needs at least two samples".to_string(),
            ));
        }
        Ok(Self::new(points))
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Rising and falling threshold crossings, in Ångström.
    ///
    /// A curve already above the threshold at its first (last) sample is
    /// bounded by that sample's wavelength. `None` if the curve never
    /// reaches the threshold.
    pub fn threshold_interval(&self, threshold: f64) -> Option<(f64, f64)> {
        let points = &self.points;
        let first_above = points.iter().position(|(_, t)| *t >= threshold)?;
        let last_above = points.iter().rposition(|(_, t)| *t >= threshold)?;
        let rising = match first_above {
            0 => points[0].0,
            i => crossing(points[i - 1], points[i], threshold),
        };
        let falling = if last_above == points.len() - 1 {
            points[last_above].0
        } else {
            crossing(points[last_above], points[last_above + 1], threshold)
        };
        if falling > rising {
            Some((rising, falling))
        } else {
            None
        }
    }
}

/// Wavelength at which the line through two samples reaches `p`:
/// `λ = (p + m·x₁ − t₁) / m`.
fn crossing((x1, t1): (f64, f64), (x2, t2): (f64, f64), p: f64) -> f64 {
    let m = (t2 - t1) / (x2 - x1);
    (p + m * x1 - t1) / m
}

/// Energy for an imaging exposure through the given filter curve.
pub fn filter_energy(curve: &TransmissionCurve) -> Result<Option<Energy>> {
    let Some((low, high)) = curve.threshold_interval(TRANSMISSION_THRESHOLD) else {
        return Ok(None);
    };
    let (low, high) = (low * ANGSTROM, high * ANGSTROM);
    let resolving_power = 0.5 * (low + high) / (high - low);
    let energy = Energy::from_interval(low, high, 1, Some(resolving_power), high - low)?;
    Ok(Some(energy))
}

/// Curve file name for a header filter name.
pub fn curve_name(filter: &str) -> String {
    let name = match filter {
        "Halpha-S1" | "H-alpha" => "H-alpha",
        "SDSSr-S1" => "SDSS_rp",
        "SDSSi-S1" => "SDSS_ip",
        "SDSSg-S1" => "SDSS_gp",
        "SDSSu-S1" => "SDSS_up",
        "SDSSz-S1" => "SDSS_zp",
        "CLR-S1" => "Fused_silica_clear",
        "B-S1" => "Johnson_B",
        "U-S1" => "Johnson_U",
        "V-S1" => "Johnson_V",
        "I-S1" => "Cousins_I",
        "R-S1" => "Cousins_R",
        "380-40" => "380nm_40nm_FWHM",
        "Su-S1" => "Stroemgren_u",
        "Sv-S1" => "Stroemgren_v",
        "Sb-S1" => "Stroemgren_b",
        "Sy-S1" => "Stroemgren_y",
        other => match other.replace('\'', "").as_str() {
            "SDSS-r" => "SDSS_rp",
            "SDSS-i" => "SDSS_ip",
            "SDSS-g" => "SDSS_gp",
            "SDSS-u" => "SDSS_up",
            "SDSS-z" => "SDSS_zp",
            _ => return other.to_string(),
        },
    };
    name.to_string()
}

/// Filter transmission curves under `<root>/<instrument>/<curve>.txt`.
///
/// BCAM has no curves of its own and shares Salticam's; RSS falls back to
/// Salticam for filters it does not have.
#[derive(Debug, Clone)]
pub struct FilterCurveLibrary {
    root: PathBuf,
    cache: Arc<RwLock<HashMap<PathBuf, Arc<TransmissionCurve>>>>,
}

impl FilterCurveLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the curve used for a filter, if one exists.
    pub fn curve_path(&self, instrument: Instrument, filter: &str) -> Option<PathBuf> {
        let name = format!("{}.txt", curve_name(filter));
        let salticam = self.root.join("salticam").join(&name);
        match instrument {
            Instrument::Rss => {
                let rss = self.root.join("rss").join(&name);
                if rss.exists() {
                    Some(rss)
                } else if salticam.exists() {
                    Some(salticam)
                } else {
                    None
                }
            }
            Instrument::Salticam | Instrument::Bcam => salticam.exists().then_some(salticam),
            Instrument::Hrs => None,
        }
    }

    pub fn load(&self, instrument: Instrument, filter: &str) -> Result<Arc<TransmissionCurve>> {
        let path = self.curve_path(instrument, filter).ok_or_else(|| {
            IngestionError::FilterCurve(format!(
                "no transmission curve for {} filter '{}' under {}",
                instrument,
                filter,
                self.root.display()
            ))
        })?;

        if let Ok(cache) = self.cache.read() {
            if let Some(curve) = cache.get(&path) {
                return Ok(Arc::clone(curve));
            }
        }

        let text = fs::read_to_string(&path)?;
        let curve = Arc::new(TransmissionCurve::parse(&text).map_err(|e| {
            IngestionError::FilterCurve(format!("{}: {}", path.display(), e))
        })?);
        debug!(path = %path.display(), samples = curve.points().len(), "Loaded filter curve");

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(path, Arc::clone(&curve));
        }
        Ok(curve)
    }
}
