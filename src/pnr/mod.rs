pub mod demographics;
pub mod enrich;
pub mod extract;

pub use extract::{extract_occurrences, IdentifierOccurrence};

use crate::error::MediatorError;
use crate::xds::metadata;
use crate::xml::{Document, NodeId};

/// A parsed Provide-and-Register transaction: the envelope DOM plus the
/// located registry objects. The DOM is exclusively owned by its
/// transaction and mutated in place during enrichment.
#[derive(Debug, Clone)]
pub struct PnrRequest {
    pub dom: Document,
    pub submission_set: NodeId,
    pub document_entries: Vec<NodeId>,
}

impl PnrRequest {
    pub fn parse(envelope: &str) -> Result<Self, MediatorError> {
        let dom = Document::parse(envelope)
            .map_err(|e| MediatorError::MalformedRequest(e.to_string()))?;
        Self::from_dom(dom)
    }

    /// Entry point for the pre-parse orchestration mode, where the DOM
    /// arrives already built.
    pub fn from_dom(dom: Document) -> Result<Self, MediatorError> {
        let submission_set = metadata::submission_set(&dom).ok_or_else(|| {
            MediatorError::MalformedRequest(
                "envelope carries no XDSSubmissionSet registry package".to_string(),
            )
        })?;
        let document_entries = metadata::extrinsic_objects(&dom);
        Ok(PnrRequest {
            dom,
            submission_set,
            document_entries,
        })
    }

    /// Unique ids of every document entry, for downstream notification.
    pub fn document_unique_ids(&self) -> Vec<String> {
        self.document_entries
            .iter()
            .filter_map(|&entry| {
                metadata::external_identifier(
                    &self.dom,
                    entry,
                    metadata::UUID_DOC_ENTRY_UNIQUE_ID,
                )
                .map(|(_, value)| value)
            })
            .collect()
    }

    /// Serialize the (possibly rewritten) envelope; transport headers and
    /// element order come back untouched.
    pub fn serialize(&self) -> Result<String, MediatorError> {
        Ok(self.dom.to_string()?)
    }
}
