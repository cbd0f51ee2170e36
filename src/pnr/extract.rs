//! Identifier occurrence extraction.
//!
//! Walks the located registry objects and emits every patient, healthcare
//! worker and facility identifier together with the DOM sites needed to
//! overwrite them later. Occurrences with the same category and identifier
//! collapse into one entry carrying multiple sites.

use crate::datatypes::{IdCategory, Identifier};
use crate::xds::metadata;
use crate::xml::DomSite;

use super::PnrRequest;

#[derive(Debug, Clone)]
pub struct IdentifierOccurrence {
    pub category: IdCategory,
    pub identifier: Identifier,
    /// Exact wire rendering used in error reporting: CX for patients,
    /// XCN for healthcare workers, XON (with organization name) for
    /// facilities.
    pub wire: String,
    pub sites: Vec<DomSite>,
}

/// Extraction order is deterministic: the SubmissionSet patient first, then
/// each DocumentEntry's patient, authors and institutions in document order.
pub fn extract_occurrences(req: &PnrRequest) -> Vec<IdentifierOccurrence> {
    let mut occurrences: Vec<IdentifierOccurrence> = Vec::new();

    if let Some((eid, value)) = metadata::external_identifier(
        &req.dom,
        req.submission_set,
        metadata::UUID_SUBMISSION_SET_PATIENT_ID,
    ) {
        if let Some(identifier) = Identifier::parse_cx(&value) {
            let wire = identifier.to_cx();
            record(
                &mut occurrences,
                IdCategory::Patient,
                identifier,
                wire,
                DomSite::Attribute {
                    node: eid,
                    name: "value".to_string(),
                },
            );
        }
    }

    for &entry in &req.document_entries {
        if let Some((eid, value)) =
            metadata::external_identifier(&req.dom, entry, metadata::UUID_DOC_ENTRY_PATIENT_ID)
        {
            if let Some(identifier) = Identifier::parse_cx(&value) {
                let wire = identifier.to_cx();
                record(
                    &mut occurrences,
                    IdCategory::Patient,
                    identifier,
                    wire,
                    DomSite::Attribute {
                        node: eid,
                        name: "value".to_string(),
                    },
                );
            }
        }

        for classification in
            metadata::classifications(&req.dom, entry, metadata::UUID_DOC_ENTRY_AUTHOR)
        {
            for value_el in metadata::slot_values(&req.dom, classification, "authorPerson") {
                let raw = req.dom.text(value_el);
                if let Some(identifier) = Identifier::parse_xcn(&raw) {
                    let wire = identifier.to_xcn();
                    record(
                        &mut occurrences,
                        IdCategory::Provider,
                        identifier,
                        wire,
                        DomSite::Text { node: value_el },
                    );
                }
            }
            for value_el in metadata::slot_values(&req.dom, classification, "authorInstitution") {
                let raw = req.dom.text(value_el);
                if let Some((identifier, org_name)) = Identifier::parse_xon(&raw) {
                    let wire = identifier.to_xon(&org_name);
                    record(
                        &mut occurrences,
                        IdCategory::Facility,
                        identifier,
                        wire,
                        DomSite::Text { node: value_el },
                    );
                }
            }
        }
    }

    occurrences
}

fn record(
    occurrences: &mut Vec<IdentifierOccurrence>,
    category: IdCategory,
    identifier: Identifier,
    wire: String,
    site: DomSite,
) {
    match occurrences
        .iter_mut()
        .find(|o| o.category == category && o.identifier == identifier)
    {
        Some(existing) => existing.sites.push(site),
        None => occurrences.push(IdentifierOccurrence {
            category,
            identifier,
            wire,
            sites: vec![site],
        }),
    }
}
