//! Instrument name to handler dispatch.

use archive_common::Instrument;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::error::{IngestionError, Result};
use crate::instruments::{HrsHandler, ImagingCameraHandler, InstrumentHandler, RssHandler};
use crate::keywords::KeywordTable;

/// Handler and keyword table for one instrument.
#[derive(Debug, Clone)]
pub struct InstrumentProfile {
    pub handler: Arc<dyn InstrumentHandler>,
    pub keywords: Arc<KeywordTable>,
}

impl InstrumentProfile {
    pub fn instrument(&self) -> Instrument {
        self.handler.instrument()
    }
}

/// Lookup table from instrument name (case-insensitive) to profile.
#[derive(Debug, Clone)]
pub struct InstrumentRegistry {
    profiles: BTreeMap<String, InstrumentProfile>,
}

impl InstrumentRegistry {
    /// Registry with no instruments.
    pub fn empty() -> Self {
        Self {
            profiles: BTreeMap::new(),
        }
    }

    /// RSS, HRS, Salticam and BCAM with the built-in keyword tables.
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::empty();
        for handler in builtin_handlers() {
            let keywords = KeywordTable::builtin(handler.instrument())?;
            registry.register(handler, keywords);
        }
        Ok(registry)
    }

    /// Built-in handlers with keyword tables read from `dir` where present.
    pub fn with_keyword_dir(dir: &Path) -> Result<Self> {
        let mut registry = Self::empty();
        for handler in builtin_handlers() {
            let keywords = KeywordTable::load(dir, handler.instrument())?;
            registry.register(handler, keywords);
        }
        debug!(dir = %dir.display(), "Loaded keyword tables");
        Ok(registry)
    }

    /// Add or replace the profile for the handler's instrument.
    pub fn register(&mut self, handler: Arc<dyn InstrumentHandler>, keywords: KeywordTable) {
        let name = handler.instrument().as_str().to_ascii_lowercase();
        self.profiles.insert(
            name,
            InstrumentProfile {
                handler,
                keywords: Arc::new(keywords),
            },
        );
    }

    pub fn resolve(&self, name: &str) -> Result<&InstrumentProfile> {
        self.profiles
            .get(&name.trim().to_ascii_lowercase())
            .ok_or_else(|| IngestionError::UnknownInstrument(name.trim().to_string()))
    }

    pub fn instruments(&self) -> impl Iterator<Item = Instrument> + '_ {
        self.profiles.values().map(|profile| profile.instrument())
    }
}

fn builtin_handlers() -> Vec<Arc<dyn InstrumentHandler>> {
    vec![
        Arc::new(RssHandler),
        Arc::new(HrsHandler),
        Arc::new(ImagingCameraHandler::salticam()),
        Arc::new(ImagingCameraHandler::bcam()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_is_case_insensitive() {
        let registry = InstrumentRegistry::builtin().unwrap();
        assert_eq!(registry.resolve("SALTICAM").unwrap().instrument(), Instrument::Salticam);
        assert_eq!(registry.resolve("rss").unwrap().instrument(), Instrument::Rss);
        assert_eq!(registry.resolve(" Bcam ").unwrap().instrument(), Instrument::Bcam);
        assert_eq!(registry.instruments().count(), 4);
    }

    #[test]
    fn test_unknown_instrument() {
        let registry = InstrumentRegistry::builtin().unwrap();
        match registry.resolve("SpUpNIC") {
            Err(IngestionError::UnknownInstrument(name)) => assert_eq!(name, "SpUpNIC"),
            other => panic!("unexpected {:?}", other.map(|p| p.instrument())),
        }
    }

    #[test]
    fn test_keyword_dir_override() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hrs.txt"), "PROPID proposal_code\nOBSMODE observation_mode\n").unwrap();
        let registry = InstrumentRegistry::with_keyword_dir(dir.path()).unwrap();
        assert_eq!(registry.resolve("HRS").unwrap().keywords.len(), 2);
        assert!(registry.resolve("RSS").unwrap().keywords.len() > 2);
    }
}
