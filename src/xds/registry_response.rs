//! ebRS `RegistryResponse` rendering.
//!
//! Failure envelopes are a wire contract: attribute order, the `ns3` prefix
//! and the severity URN are what downstream XDS actors and their test rigs
//! key on, so the writer emits them byte-for-byte.

use std::io::Cursor;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::Writer;

pub const ERR_UNKNOWN_PATIENT_ID: &str = "XDSUnknownPatientId";
pub const ERR_REPOSITORY_ERROR: &str = "XDSRepositoryError";
pub const ERR_REGISTRY_ERROR: &str = "XDSRegistryError";

pub const SEVERITY_ERROR: &str = "urn:oasis:names:tc:ebxml-regrep:ErrorSeverityType:Error";
pub const SEVERITY_WARNING: &str = "urn:oasis:names:tc:ebxml-regrep:ErrorSeverityType:Warning";

const STATUS_FAILURE: &str = "urn:oasis:names:tc:ebxml-regrep:ResponseStatusType:Failure";
const NS_RS: &str = "urn:oasis:names:tc:ebxml-regrep:xsd:rs:3.0";
const NS_SOAP: &str = "http://www.w3.org/2003/05/soap-envelope";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryError {
    pub code: String,
    pub code_context: String,
    pub severity: String,
}

impl RegistryError {
    pub fn error(code: &str, code_context: impl Into<String>) -> Self {
        RegistryError {
            code: code.to_string(),
            code_context: code_context.into(),
            severity: SEVERITY_ERROR.to_string(),
        }
    }

    pub fn unknown_patient(code_context: impl Into<String>) -> Self {
        RegistryError::error(ERR_UNKNOWN_PATIENT_ID, code_context)
    }

    pub fn repository(code_context: impl Into<String>) -> Self {
        RegistryError::error(ERR_REPOSITORY_ERROR, code_context)
    }

    pub fn registry(code_context: impl Into<String>) -> Self {
        RegistryError::error(ERR_REGISTRY_ERROR, code_context)
    }
}

/// A failure registry response carrying one entry per distinct failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryResponse {
    pub errors: Vec<RegistryError>,
}

impl RegistryResponse {
    pub fn failure(errors: Vec<RegistryError>) -> Self {
        RegistryResponse { errors }
    }

    /// Render the full SOAP envelope body for the HTTP 200 failure path.
    pub fn to_soap(&self) -> String {
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        let mut envelope = BytesStart::new("soapenv:Envelope");
        envelope.push_attribute(("xmlns:soapenv", NS_SOAP));
        writer.write_event(Event::Start(envelope)).expect("in-memory write");
        writer
            .write_event(Event::Start(BytesStart::new("soapenv:Body")))
            .expect("in-memory write");

        let mut response = BytesStart::new("ns3:RegistryResponse");
        response.push_attribute(("xmlns:ns3", NS_RS));
        response.push_attribute(("status", STATUS_FAILURE));
        writer.write_event(Event::Start(response)).expect("in-memory write");
        writer
            .write_event(Event::Start(BytesStart::new("ns3:RegistryErrorList")))
            .expect("in-memory write");

        for error in &self.errors {
            let mut el = BytesStart::new("ns3:RegistryError");
            el.push_attribute(("errorCode", error.code.as_str()));
            el.push_attribute(("codeContext", error.code_context.as_str()));
            el.push_attribute(("severity", error.severity.as_str()));
            writer.write_event(Event::Empty(el)).expect("in-memory write");
        }

        writer
            .write_event(Event::End(BytesEnd::new("ns3:RegistryErrorList")))
            .expect("in-memory write");
        writer
            .write_event(Event::End(BytesEnd::new("ns3:RegistryResponse")))
            .expect("in-memory write");
        writer
            .write_event(Event::End(BytesEnd::new("soapenv:Body")))
            .expect("in-memory write");
        writer
            .write_event(Event::End(BytesEnd::new("soapenv:Envelope")))
            .expect("in-memory write");

        String::from_utf8(writer.into_inner().into_inner()).expect("writer emits UTF-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_registry_errors_with_exact_shape() {
        let response = RegistryResponse::failure(vec![RegistryError::unknown_patient(
            "Failed to resolve patient identifier: 1111111111^^^&1.2.3&ISO",
        )]);
        let soap = response.to_soap();

        assert!(soap.contains(
            "<ns3:RegistryError errorCode=\"XDSUnknownPatientId\" \
             codeContext=\"Failed to resolve patient identifier: \
             1111111111^^^&amp;1.2.3&amp;ISO\" \
             severity=\"urn:oasis:names:tc:ebxml-regrep:ErrorSeverityType:Error\"/>"
        ));
        assert!(soap.contains(
            "status=\"urn:oasis:names:tc:ebxml-regrep:ResponseStatusType:Failure\""
        ));
    }

    #[test]
    fn aggregates_multiple_errors() {
        let response = RegistryResponse::failure(vec![
            RegistryError::repository("first"),
            RegistryError::repository("second"),
        ]);
        let soap = response.to_soap();
        assert!(soap.contains("codeContext=\"first\""));
        assert!(soap.contains("codeContext=\"second\""));
    }
}
