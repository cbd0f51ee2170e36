//! Patient demographics extraction for the identity feed.
//!
//! Source policy, in order: an embedded FHIR Patient document is used
//! verbatim; otherwise the CDA Level-2 header of the first document in the
//! set; otherwise registration proceeds with identifiers only.

use base64::{engine::general_purpose, Engine as _};

use crate::xds::metadata;
use crate::xml::Document;

use super::PnrRequest;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Demographics {
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<String>,
    pub telecom: Option<String>,
    pub language_communication_code: Option<String>,
}

impl Demographics {
    pub fn is_empty(&self) -> bool {
        self.given_name.is_none()
            && self.family_name.is_none()
            && self.gender.is_none()
            && self.birth_date.is_none()
            && self.telecom.is_none()
            && self.language_communication_code.is_none()
    }
}

/// A FHIR Patient document carried inside the submission, forwarded to the
/// identity feed as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedFhirPatient {
    pub content_type: String,
    pub body: String,
}

/// Extract demographics and any embedded FHIR Patient from the request.
pub fn patient_demographics(req: &PnrRequest) -> (Demographics, Option<EmbeddedFhirPatient>) {
    let documents = metadata::documents(&req.dom);

    for &entry in &req.document_entries {
        let Some(entry_id) = req.dom.attr(entry, "id") else {
            continue;
        };
        let Some(&(_, doc_el)) = documents.iter().find(|(id, _)| id == entry_id) else {
            continue;
        };
        let Some(body) = document_body(&req.dom.text(doc_el)) else {
            continue;
        };
        let mime = metadata::mime_type(&req.dom, entry).unwrap_or("");

        if mime.starts_with("application/fhir+json") {
            if let Ok(resource) = serde_json::from_str::<serde_json::Value>(&body) {
                if resource.get("resourceType").and_then(|t| t.as_str()) == Some("Patient") {
                    return (
                        Demographics::default(),
                        Some(EmbeddedFhirPatient {
                            content_type: mime.to_string(),
                            body,
                        }),
                    );
                }
            }
        } else if mime.starts_with("application/fhir+xml") {
            if let Ok(parsed) = Document::parse(&body) {
                if parsed.root().map(|r| parsed.local_name(r)) == Some("Patient") {
                    return (
                        Demographics::default(),
                        Some(EmbeddedFhirPatient {
                            content_type: mime.to_string(),
                            body,
                        }),
                    );
                }
            }
        }

        // First document decides; if its header is not CDA the feed goes
        // out with identifiers only.
        return (cda_demographics(&body), None);
    }

    (Demographics::default(), None)
}

/// Document payloads are base64binary on the wire; test fixtures may carry
/// the raw document in a CDATA section instead.
fn document_body(text: &str) -> Option<String> {
    let trimmed: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(bytes) = general_purpose::STANDARD.decode(trimmed.as_bytes()) {
        if let Ok(decoded) = String::from_utf8(bytes) {
            return Some(decoded);
        }
    }
    Some(text.trim().to_string())
}

fn cda_demographics(body: &str) -> Demographics {
    let Ok(doc) = Document::parse(body) else {
        return Demographics::default();
    };
    let Some(root) = doc.root() else {
        return Demographics::default();
    };
    if doc.local_name(root) != "ClinicalDocument" {
        return Demographics::default();
    }
    let Some(&patient_role) = doc.descendant_elements(root, "patientRole").first() else {
        return Demographics::default();
    };

    let mut demographics = Demographics {
        telecom: doc
            .first_child_element(patient_role, "telecom")
            .and_then(|t| doc.attr(t, "value").map(str::to_string)),
        ..Demographics::default()
    };

    if let Some(patient) = doc.first_child_element(patient_role, "patient") {
        if let Some(name) = doc.first_child_element(patient, "name") {
            demographics.given_name = doc
                .first_child_element(name, "given")
                .map(|g| doc.text(g).trim().to_string())
                .filter(|s| !s.is_empty());
            demographics.family_name = doc
                .first_child_element(name, "family")
                .map(|f| doc.text(f).trim().to_string())
                .filter(|s| !s.is_empty());
        }
        demographics.gender = doc
            .first_child_element(patient, "administrativeGenderCode")
            .and_then(|g| doc.attr(g, "code").map(str::to_string));
        demographics.birth_date = doc
            .first_child_element(patient, "birthTime")
            .and_then(|b| doc.attr(b, "value").map(str::to_string));
        demographics.language_communication_code = doc
            .descendant_elements(patient, "languageCode")
            .first()
            .and_then(|&l| doc.attr(l, "code").map(str::to_string));
    }

    demographics
}

#[cfg(test)]
mod tests {
    use super::*;

    const CDA: &str = r#"<ClinicalDocument xmlns="urn:hl7-org:v3">
  <recordTarget>
    <patientRole>
      <id extension="1111111111" root="1.2.3"/>
      <telecom value="tel:+27832222222"/>
      <patient>
        <name><given>Jane</given><family>Doe</family></name>
        <administrativeGenderCode code="F" codeSystem="2.16.840.1.113883.5.1"/>
        <birthTime value="19860101"/>
        <languageCommunication><languageCode code="eng"/></languageCommunication>
      </patient>
    </patientRole>
  </recordTarget>
</ClinicalDocument>"#;

    #[test]
    fn reads_cda_level2_header() {
        let demographics = cda_demographics(CDA);
        assert_eq!(demographics.given_name.as_deref(), Some("Jane"));
        assert_eq!(demographics.family_name.as_deref(), Some("Doe"));
        assert_eq!(demographics.gender.as_deref(), Some("F"));
        assert_eq!(demographics.birth_date.as_deref(), Some("19860101"));
        assert_eq!(demographics.telecom.as_deref(), Some("tel:+27832222222"));
        assert_eq!(
            demographics.language_communication_code.as_deref(),
            Some("eng")
        );
    }

    #[test]
    fn non_cda_document_yields_empty_demographics() {
        assert!(cda_demographics("plain text payload").is_empty());
        assert!(cda_demographics("<Other/>").is_empty());
    }

    #[test]
    fn base64_bodies_are_decoded() {
        let encoded = general_purpose::STANDARD.encode("<ClinicalDocument/>");
        assert_eq!(
            document_body(&encoded).as_deref(),
            Some("<ClinicalDocument/>")
        );
    }
}
