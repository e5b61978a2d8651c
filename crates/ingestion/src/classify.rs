//! Product classification, targets and skip rules.

use archive_common::{ProductType, Target, UNKNOWN_TARGET_TYPE};

use crate::error::{IngestionError, Result};
use crate::keywords::{fields, SetupRecord};

/// Proposal codes whose files are never ingested.
const IGNORED_PROPOSALS: &[&str] = &["JUNK", "UNKNOWN", "NONE", "ENG", "CAL_GAIN"];

/// Calibration proposals that observe standard stars.
const STANDARD_PROPOSALS: &[&str] = &["CAL_SPST", "CAL_LICKST", "CAL_RVST"];

/// Objects that are never a target.
const NON_TARGET_OBJECTS: &[&str] = &["ARC", "BIAS", "FLAT"];

/// Whether a file with this proposal code should be skipped.
pub fn is_ignored_proposal(proposal_code: &str) -> bool {
    let code = proposal_code.trim().to_ascii_uppercase();
    IGNORED_PROPOSALS.contains(&code.as_str()) || code.starts_with("ENG_") || code.starts_with("ENG-")
}

/// Whether a proposal code denotes a calibration programme.
pub fn is_calibration_proposal(proposal_code: &str) -> bool {
    proposal_code.to_ascii_uppercase().contains("CAL_")
}

/// Product type from `OBJECT` and `OBSTYPE`.
pub fn product_type(setup: &SetupRecord) -> Result<ProductType> {
    let object = setup.text(fields::OBJECT).unwrap_or("").trim().to_ascii_uppercase();
    let obstype = setup
        .text(fields::OBSERVATION_TYPE)
        .unwrap_or("")
        .trim()
        .to_ascii_uppercase();
    let either = |names: &[&str]| names.contains(&object.as_str()) || names.contains(&obstype.as_str());

    let product_type = if either(&["ARC"]) {
        ProductType::Arc
    } else if either(&["BIAS"]) {
        ProductType::Bias
    } else if either(&["FLAT", "FLAT FIELD"]) {
        ProductType::Flat
    } else if either(&["DARK"]) {
        ProductType::Dark
    } else if either(&["STANDARD", "STANDARDS"]) {
        ProductType::Standard
    } else if obstype == "OBJECT" || obstype == "SCIENCE" {
        ProductType::Science
    } else {
        return Err(IngestionError::invalid(
            setup.keyword(fields::OBSERVATION_TYPE),
            format!("cannot classify OBJECT '{}' with OBSTYPE '{}'", object, obstype),
        ));
    };
    Ok(product_type)
}

/// Target of an exposure. Calibration frames and files outside a block
/// visit have none.
pub fn target(
    setup: &SetupRecord,
    in_block_visit: bool,
    target_type: Option<&str>,
) -> Option<Target> {
    if !in_block_visit {
        return None;
    }
    let name = setup.text(fields::OBJECT)?.trim();
    if NON_TARGET_OBJECTS.contains(&name.to_ascii_uppercase().as_str()) {
        return None;
    }
    let proposal_code = setup.text(fields::PROPOSAL_CODE).unwrap_or("").to_ascii_uppercase();
    if ["CAL_BIAS", "CAL_FLAT", "CAL_ARC"].contains(&proposal_code.as_str()) {
        return None;
    }
    Some(Target {
        name: name.to_string(),
        target_type: target_type.unwrap_or(UNKNOWN_TARGET_TYPE).to_string(),
        standard: STANDARD_PROPOSALS.contains(&proposal_code.as_str()),
        moving: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignored_proposals() {
        assert!(is_ignored_proposal("JUNK"));
        assert!(is_ignored_proposal("eng_rss"));
        assert!(is_ignored_proposal("ENG-HRS"));
        assert!(!is_ignored_proposal("2019-1-SCI-012"));
        assert!(!is_ignored_proposal("ENGLAND"));
    }

    #[test]
    fn test_product_types() {
        let classify = |object: &str, obstype: &str| {
            product_type(&SetupRecord::from_pairs([("object", object), ("observation_type", obstype)]))
        };
        assert_eq!(classify("ARC", "OBJECT").unwrap(), ProductType::Arc);
        assert_eq!(classify("NGC 300", "FLAT FIELD").unwrap(), ProductType::Flat);
        assert_eq!(classify("BIAS", "ZERO").unwrap(), ProductType::Bias);
        assert_eq!(classify("NGC 300", "Science").unwrap(), ProductType::Science);
        assert!(classify("NGC 300", "POINTING").is_err());
    }

    #[test]
    fn test_target_rules() {
        let setup = SetupRecord::from_pairs([("object", "HD 12345"), ("proposal_code", "CAL_SPST")]);
        let target = target(&setup, true, Some("14.06.16.03")).unwrap();
        assert!(target.standard);
        assert_eq!(target.target_type, "14.06.16.03");

        assert!(super::target(&setup, false, None).is_none());

        let arc = SetupRecord::from_pairs([("object", "ARC"), ("proposal_code", "2020-1-SCI-001")]);
        assert!(super::target(&arc, true, None).is_none());
    }

    #[test]
    fn test_unknown_target_type() {
        let setup = SetupRecord::from_pairs([("object", "M 83"), ("proposal_code", "2020-1-SCI-001")]);
        let target = target(&setup, true, None).unwrap();
        assert_eq!(target.target_type, UNKNOWN_TARGET_TYPE);
        assert!(!target.standard);
    }
}
