//! Observation model persisted by the archive.
//!
//! One exposure file becomes one [`ObservationGraph`]: an Observation with a
//! single Plane, the Plane's optional descriptors (Energy, Polarization,
//! Position, Time) and the Artifact pointing at the file itself. Shared
//! reference entities (Proposal, Target, Telescope, Institution) travel in the
//! graph by natural key and are resolved to surrogate ids by the store.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

use crate::error::{ArchiveError, ArchiveResult};

/// Target type code used when the science database has none.
pub const UNKNOWN_TARGET_TYPE: &str = "00.00.00.00";

macro_rules! named_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal { $($variant:ident => $label:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// All variants, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Name as stored in the archive.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            /// Case-insensitive lookup by stored name.
            pub fn for_name(name: &str) -> ArchiveResult<Self> {
                let name = name.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(name))
                    .ok_or_else(|| ArchiveError::UnknownValue {
                        kind: $kind,
                        value: name.to_string(),
                    })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

named_enum!(
    /// Instruments whose exposures can be ingested.
    Instrument, "instrument" {
        Rss => "RSS",
        Hrs => "HRS",
        Salticam => "Salticam",
        Bcam => "BCAM",
    }
);

named_enum!(
    /// Telescopes known to the archive.
    Telescope, "telescope" {
        Salt => "SALT",
    }
);

named_enum!(
    /// Institutions to which proposals are submitted.
    Institution, "institution" {
        Salt => "SALT",
    }
);

named_enum!(
    Intent, "intent" {
        Science => "Science",
        Calibration => "Calibration",
    }
);

named_enum!(
    ObservationStatus, "observation status" {
        Accepted => "Accepted",
        Rejected => "Rejected",
        Deleted => "Deleted",
        InQueue => "In queue",
    }
);

named_enum!(
    DataProductType, "data product type" {
        Image => "Image",
        Spectrum => "Spectrum",
        Unknown => "Unknown",
    }
);

named_enum!(
    /// Classification of the physical file product.
    ProductType, "product type" {
        Science => "Science",
        Arc => "Arc",
        Bias => "Bias",
        Flat => "Flat",
        Dark => "Dark",
        Standard => "Standard",
    }
);

named_enum!(
    StokesParameter, "Stokes parameter" {
        I => "I",
        Q => "Q",
        U => "U",
        V => "V",
    }
);

impl Instrument {
    /// Telescope the instrument is mounted on.
    pub fn telescope(&self) -> Telescope {
        match self {
            Instrument::Rss | Instrument::Hrs | Instrument::Salticam | Instrument::Bcam => {
                Telescope::Salt
            }
        }
    }
}

impl ProductType {
    /// Intent implied by the product type.
    pub fn intent(&self) -> Intent {
        match self {
            ProductType::Science => Intent::Science,
            _ => Intent::Calibration,
        }
    }
}

/// Spectral coverage of a plane. Wavelengths and sample size are in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Energy {
    pub min_wavelength: f64,
    pub max_wavelength: f64,
    /// Pixel count along the dispersion axis.
    pub dimension: u32,
    pub resolving_power: Option<f64>,
    /// Wavelength covered by one pixel.
    pub sample_size: f64,
}

impl Energy {
    /// Build an energy record from the two interval bounds in any order.
    pub fn from_interval(
        a: f64,
        b: f64,
        dimension: u32,
        resolving_power: Option<f64>,
        sample_size: f64,
    ) -> ArchiveResult<Self> {
        let energy = Energy {
            min_wavelength: a.min(b),
            max_wavelength: a.max(b),
            dimension,
            resolving_power,
            sample_size: sample_size.abs(),
        };
        energy.validate()?;
        Ok(energy)
    }

    pub fn validate(&self) -> ArchiveResult<()> {
        if !self.min_wavelength.is_finite() || !self.max_wavelength.is_finite() {
            return Err(ArchiveError::invalid("energy bounds must be finite"));
        }
        if self.min_wavelength <= 0.0 {
            return Err(ArchiveError::invalid(format!(
                "energy lower bound {} is not a positive wavelength",
                self.min_wavelength
            )));
        }
        if self.min_wavelength > self.max_wavelength {
            return Err(ArchiveError::invalid(format!(
                "energy lower bound {} exceeds upper bound {}",
                self.min_wavelength, self.max_wavelength
            )));
        }
        if self.dimension == 0 {
            return Err(ArchiveError::invalid("energy dimension must be positive"));
        }
        if !(self.sample_size >= 0.0) {
            return Err(ArchiveError::invalid("energy sample size must be non-negative"));
        }
        if let Some(power) = self.resolving_power {
            if !power.is_finite() || power < 0.0 {
                return Err(ArchiveError::invalid(format!(
                    "resolving power {} must be finite and non-negative",
                    power
                )));
            }
        }
        Ok(())
    }

    /// Centre of the wavelength interval.
    pub fn center(&self) -> f64 {
        0.5 * (self.min_wavelength + self.max_wavelength)
    }

    pub fn width(&self) -> f64 {
        self.max_wavelength - self.min_wavelength
    }
}

/// Stokes parameters observed in a plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Polarization {
    pub stokes_parameters: BTreeSet<StokesParameter>,
}

impl Polarization {
    pub fn new(parameters: impl IntoIterator<Item = StokesParameter>) -> ArchiveResult<Self> {
        let stokes_parameters: BTreeSet<_> = parameters.into_iter().collect();
        if stokes_parameters.is_empty() {
            return Err(ArchiveError::invalid("polarization needs at least one Stokes parameter"));
        }
        Ok(Self { stokes_parameters })
    }
}

/// Pointing of a plane, in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub equinox: f64,
    pub ra: f64,
    pub dec: f64,
    /// Users allowed to see the position; `None` means public.
    pub owners: Option<Vec<String>>,
}

impl Position {
    pub fn new(ra: f64, dec: f64, equinox: f64) -> ArchiveResult<Self> {
        let position = Position {
            equinox,
            ra,
            dec,
            owners: None,
        };
        position.validate()?;
        Ok(position)
    }

    pub fn validate(&self) -> ArchiveResult<()> {
        if !(0.0..360.0).contains(&self.ra) {
            return Err(ArchiveError::invalid(format!(
                "right ascension {} outside [0, 360)",
                self.ra
            )));
        }
        if !(-90.0..=90.0).contains(&self.dec) {
            return Err(ArchiveError::invalid(format!(
                "declination {} outside [-90, 90]",
                self.dec
            )));
        }
        Ok(())
    }
}

/// Time coverage of a plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationTime {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Exposure duration in seconds.
    pub exposure_time: f64,
    /// Temporal resolution in seconds.
    pub resolution: f64,
    /// Start date of the observing night.
    pub night: NaiveDate,
}

impl ObservationTime {
    pub fn validate(&self) -> ArchiveResult<()> {
        if self.start > self.end {
            return Err(ArchiveError::invalid(format!(
                "start time {} is after end time {}",
                self.start, self.end
            )));
        }
        if !(self.exposure_time >= 0.0) {
            return Err(ArchiveError::invalid("exposure time must be non-negative"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plane {
    /// Product identifier, derived from the file name.
    pub product_id: String,
    pub data_product_type: DataProductType,
}

/// Physical file referenced by a plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub identifier: Uuid,
    pub name: String,
    /// Storage path relative to the archive base directory. Unique.
    pub path: String,
    pub content_length: u64,
    pub content_checksum: String,
    pub product_type: ProductType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    /// SIMBAD-style numeric code, e.g. `14.06.16.03`.
    pub target_type: String,
    pub standard: bool,
    pub moving: bool,
}

/// A proposal, keyed by (code, institution).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalRecord {
    pub code: String,
    pub institution: Institution,
    pub title: Option<String>,
    pub principal_investigator: Option<String>,
    /// Science-database user ids of the investigators.
    pub investigators: Vec<String>,
}

/// What the science database knows about a block visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockVisit {
    pub id: i64,
    pub proposal: ProposalRecord,
    pub status: ObservationStatus,
    pub data_release: NaiveDate,
    pub meta_release: NaiveDate,
    /// Target type code, if the target is classified.
    pub target_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationGroup {
    pub identifier: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub data_release: NaiveDate,
    pub meta_release: NaiveDate,
    pub intent: Intent,
    pub status: ObservationStatus,
    pub instrument: Instrument,
    pub telescope: Telescope,
    pub group: Option<ObservationGroup>,
    /// Mapped instrument setup fields (field name to header value).
    pub instrument_setup: BTreeMap<String, String>,
}

impl Observation {
    pub fn validate(&self) -> ArchiveResult<()> {
        if self.meta_release > self.data_release {
            return Err(ArchiveError::invalid(format!(
                "metadata release {} is after data release {}",
                self.meta_release, self.data_release
            )));
        }
        Ok(())
    }

    /// Whether the metadata is still proprietary on the given day.
    pub fn is_proprietary_on(&self, today: NaiveDate) -> bool {
        self.meta_release > today
    }
}

/// Everything written for one exposure file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationGraph {
    pub observation: Observation,
    pub proposal: Option<ProposalRecord>,
    pub target: Option<Target>,
    pub plane: Plane,
    pub energy: Option<Energy>,
    pub polarization: Option<Polarization>,
    pub position: Option<Position>,
    pub time: Option<ObservationTime>,
    pub artifact: Artifact,
}

impl ObservationGraph {
    /// Check every record invariant before anything is written.
    pub fn validate(&self) -> ArchiveResult<()> {
        self.observation.validate()?;
        if let Some(energy) = &self.energy {
            energy.validate()?;
        }
        if let Some(polarization) = &self.polarization {
            if polarization.stokes_parameters.is_empty() {
                return Err(ArchiveError::invalid("empty polarization"));
            }
        }
        if let Some(position) = &self.position {
            position.validate()?;
        }
        if let Some(time) = &self.time {
            time.validate()?;
        }
        if self.artifact.path.is_empty() {
            return Err(ArchiveError::invalid("artifact path is empty"));
        }
        Ok(())
    }
}
