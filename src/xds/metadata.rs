//! Location helpers over ebRIM registry metadata.
//!
//! XDS.b metadata is an ebXML `SubmitObjectsRequest` whose registry objects
//! are classified and identified through well-known UUIDs rather than element
//! names; everything here resolves those UUIDs against the parsed DOM.

use crate::xml::{Document, NodeId};

/// Classification node marking a `RegistryPackage` as an XDSSubmissionSet.
pub const UUID_SUBMISSION_SET: &str = "urn:uuid:a54d6aa5-d40d-43f9-88c5-b4633d873bdd";
/// SubmissionSet patientId external identifier scheme.
pub const UUID_SUBMISSION_SET_PATIENT_ID: &str = "urn:uuid:6b5aea1a-874d-4603-a4bc-96a0a7b38446";
/// DocumentEntry patientId external identifier scheme.
pub const UUID_DOC_ENTRY_PATIENT_ID: &str = "urn:uuid:58a6f841-87b3-4a3e-92fd-a8ffeff98427";
/// DocumentEntry uniqueId external identifier scheme.
pub const UUID_DOC_ENTRY_UNIQUE_ID: &str = "urn:uuid:2e82c1f6-a085-4c72-9da3-8640a32e42ab";
/// DocumentEntry author classification scheme (authorPerson / authorInstitution slots).
pub const UUID_DOC_ENTRY_AUTHOR: &str = "urn:uuid:93606bcf-9494-43ec-9b4e-a7748d1a838d";

/// The `RegistryPackage` classified as an XDSSubmissionSet, if any.
///
/// The classifying element may be nested inside the package or appear as a
/// sibling in the `RegistryObjectList`; both shapes occur on the wire.
pub fn submission_set(doc: &Document) -> Option<NodeId> {
    let root = doc.root()?;
    let packages = doc.descendant_elements(root, "RegistryPackage");

    for classification in doc.descendant_elements(root, "Classification") {
        if doc.attr(classification, "classificationNode") != Some(UUID_SUBMISSION_SET) {
            continue;
        }
        if let Some(classified) = doc.attr(classification, "classifiedObject") {
            if let Some(&pkg) = packages
                .iter()
                .find(|&&p| doc.attr(p, "id") == Some(classified))
            {
                return Some(pkg);
            }
        }
        // Classification nested inside the package itself.
        if let Some(&pkg) = packages.iter().find(|&&p| {
            doc.descendant_elements(p, "Classification")
                .contains(&classification)
        }) {
            return Some(pkg);
        }
    }
    None
}

/// Every `ExtrinsicObject` (document entry) in document order.
pub fn extrinsic_objects(doc: &Document) -> Vec<NodeId> {
    match doc.root() {
        Some(root) => doc.descendant_elements(root, "ExtrinsicObject"),
        None => Vec::new(),
    }
}

/// The `ExternalIdentifier` child of `object` using the given identification
/// scheme, together with its current value.
pub fn external_identifier(
    doc: &Document,
    object: NodeId,
    scheme: &str,
) -> Option<(NodeId, String)> {
    doc.descendant_elements(object, "ExternalIdentifier")
        .into_iter()
        .find(|&eid| doc.attr(eid, "identificationScheme") == Some(scheme))
        .and_then(|eid| doc.attr(eid, "value").map(|v| (eid, v.to_string())))
}

/// Classifications of `object` using `scheme`. Handles both nested
/// classifications and siblings referencing the object by id.
pub fn classifications(doc: &Document, object: NodeId, scheme: &str) -> Vec<NodeId> {
    let mut out = Vec::new();
    for c in doc.descendant_elements(object, "Classification") {
        if doc.attr(c, "classificationScheme") == Some(scheme) {
            out.push(c);
        }
    }
    if let (Some(root), Some(object_id)) = (doc.root(), doc.attr(object, "id")) {
        let object_id = object_id.to_string();
        for c in doc.descendant_elements(root, "Classification") {
            if doc.attr(c, "classificationScheme") == Some(scheme)
                && doc.attr(c, "classifiedObject") == Some(object_id.as_str())
                && !out.contains(&c)
            {
                out.push(c);
            }
        }
    }
    out
}

/// `Value` elements of the named slot under `element`, in document order.
pub fn slot_values(doc: &Document, element: NodeId, slot_name: &str) -> Vec<NodeId> {
    let mut out = Vec::new();
    for slot in doc.descendant_elements(element, "Slot") {
        if doc.attr(slot, "name") == Some(slot_name) {
            out.extend(doc.descendant_elements(slot, "Value"));
        }
    }
    out
}

/// `xdsb:Document` payload elements keyed by their `id` attribute.
pub fn documents(doc: &Document) -> Vec<(String, NodeId)> {
    let Some(root) = doc.root() else {
        return Vec::new();
    };
    doc.descendant_elements(root, "Document")
        .into_iter()
        .filter_map(|d| doc.attr(d, "id").map(|id| (id.to_string(), d)))
        .collect()
}

/// The `mimeType` of an `ExtrinsicObject`.
pub fn mime_type<'a>(doc: &'a Document, object: NodeId) -> Option<&'a str> {
    doc.attr(object, "mimeType")
}
