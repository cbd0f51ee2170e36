//! PIX/PDQ resolver and identity feed over HL7v2 MLLP.
//!
//! Queries are QBP^Q21 and answers RSP^K23; registrations are ADT^A04
//! acknowledged with an ACK. Segments are built and read with a small ER7
//! codec — component splitting must preserve empty trailing fields, so no
//! general-purpose tokenizer is trusted with it.

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use uuid::Uuid;

use crate::audit::{AtnaAudit, AuditEmitter, AuditKind};
use crate::config::PixConfig;
use crate::datatypes::{AssigningAuthority, Identifier};
use crate::error::{MediatorError, Result};

use super::{IdentifierResolver, IdentityFeed, PatientRegistration, Resolution};

const MLLP_START: u8 = 0x0B;
const MLLP_END: u8 = 0x1C;
const MLLP_CR: u8 = 0x0D;

pub struct PixClient {
    config: PixConfig,
    audit: AuditEmitter,
}

impl PixClient {
    pub fn new(config: PixConfig, audit: AuditEmitter) -> Self {
        PixClient { config, audit }
    }

    fn msh(&self, message_type: &str, message_id: &str) -> String {
        format!(
            "MSH|^~\\&|{}|{}|{}|{}|{}||{}|{}|P|2.5",
            self.config.sending_application,
            self.config.sending_facility,
            self.config.receiving_application,
            self.config.receiving_facility,
            Utc::now().format("%Y%m%d%H%M%S"),
            message_type,
            message_id,
        )
    }

    fn build_qbp_q21(
        &self,
        message_id: &str,
        identifier: &Identifier,
        target: &AssigningAuthority,
    ) -> String {
        let msh = self.msh("QBP^Q21^QBP_Q21", message_id);
        let qpd = format!(
            "QPD|IHE PIX Query|{}|{}|^^^{}",
            message_id,
            identifier.to_cx(),
            target.to_hd(),
        );
        [msh, qpd, "RCP|I".to_string()].join("\r")
    }

    fn build_adt_a04(&self, message_id: &str, registration: &PatientRegistration) -> String {
        let msh = self.msh("ADT^A04^ADT_A01", message_id);
        let evn = format!("EVN|A04|{}", Utc::now().format("%Y%m%d%H%M%S"));

        let ids = registration
            .patient_identifiers
            .iter()
            .map(Identifier::to_cx)
            .collect::<Vec<_>>()
            .join("~");
        let demographics = &registration.demographics;
        let name = match (&demographics.family_name, &demographics.given_name) {
            (None, None) => String::new(),
            (family, given) => format!(
                "{}^{}",
                family.as_deref().unwrap_or(""),
                given.as_deref().unwrap_or("")
            ),
        };
        let pid = [
            "PID",
            "1",
            "",
            ids.as_str(),
            "",
            name.as_str(),
            "",
            demographics.birth_date.as_deref().unwrap_or(""),
            demographics.gender.as_deref().unwrap_or(""),
            "",
            "",
            "",
            "",
            demographics.telecom.as_deref().unwrap_or(""),
            "",
            demographics
                .language_communication_code
                .as_deref()
                .unwrap_or(""),
        ]
        .join("|");

        [msh, evn, pid, "PV1|1|O".to_string()].join("\r")
    }

    async fn exchange(&self, payload: &str) -> Result<String> {
        let addr = format!("{}:{}", self.config.manager_host, self.config.manager_port);
        let mut stream = TcpStream::connect(&addr).await.map_err(|e| {
            MediatorError::Transport(format!("MLLP connect to {} failed: {}", addr, e))
        })?;

        let mut framed = Vec::with_capacity(payload.len() + 3);
        framed.push(MLLP_START);
        framed.extend_from_slice(payload.as_bytes());
        framed.push(MLLP_END);
        framed.push(MLLP_CR);
        stream
            .write_all(&framed)
            .await
            .map_err(|e| MediatorError::Transport(format!("MLLP write failed: {}", e)))?;

        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream
                .read(&mut chunk)
                .await
                .map_err(|e| MediatorError::Transport(format!("MLLP read failed: {}", e)))?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if buf.contains(&MLLP_END) {
                break;
            }
        }

        let start = buf
            .iter()
            .position(|&b| b == MLLP_START)
            .map(|i| i + 1)
            .unwrap_or(0);
        let end = buf
            .iter()
            .position(|&b| b == MLLP_END)
            .unwrap_or(buf.len());
        if start > end {
            return Err(MediatorError::Transport(
                "MLLP response frame is corrupt".to_string(),
            ));
        }
        String::from_utf8(buf[start..end].to_vec())
            .map_err(|e| MediatorError::Transport(format!("MLLP response is not UTF-8: {}", e)))
    }
}

#[async_trait]
impl IdentifierResolver for PixClient {
    async fn resolve(
        &self,
        identifier: &Identifier,
        target: &AssigningAuthority,
    ) -> Result<Resolution> {
        let message_id = Uuid::new_v4().to_string();
        tracing::debug!(
            identifier = %identifier,
            target = %target,
            message_id = %message_id,
            "Issuing PIX query"
        );

        let query = self.build_qbp_q21(&message_id, identifier, target);
        let response = self.exchange(&query).await;

        let result = response.and_then(|body| parse_rsp_k23(&body, target));
        self.audit.emit(AtnaAudit::new(
            AuditKind::PixRequest,
            vec![identifier.clone()],
            &message_id,
            matches!(result, Ok(Resolution::Resolved(_))),
        ));
        result
    }
}

#[async_trait]
impl IdentityFeed for PixClient {
    async fn register_patient(&self, registration: &PatientRegistration) -> Result<()> {
        let message_id = Uuid::new_v4().to_string();
        tracing::info!(
            message_id = %message_id,
            identifiers = registration.patient_identifiers.len(),
            "Sending patient identity feed"
        );

        let message = self.build_adt_a04(&message_id, registration);
        let result = self
            .exchange(&message)
            .await
            .and_then(|body| parse_ack(&body));

        self.audit.emit(
            AtnaAudit::new(
                AuditKind::PixIdentityFeed,
                registration.patient_identifiers.clone(),
                &message_id,
                result.is_ok(),
            )
            .with_message(message),
        );
        result
    }
}

/// A segment by name; the name must be followed by the field separator.
fn segment<'a>(message: &'a str, name: &str) -> Option<&'a str> {
    message
        .split(['\r', '\n'])
        .map(str::trim)
        .find(|s| s.len() > name.len() && s.starts_with(name) && s.as_bytes()[name.len()] == b'|')
}

/// SEG-n field access (1-based, name excluded). Empty trailing fields read
/// as empty strings.
fn field<'a>(segment: &'a str, index: usize) -> &'a str {
    segment.split('|').nth(index).unwrap_or("")
}

fn parse_rsp_k23(body: &str, target: &AssigningAuthority) -> Result<Resolution> {
    if let Some(msa) = segment(body, "MSA") {
        let ack_code = field(msa, 1);
        if !ack_code.eq_ignore_ascii_case("AA") {
            return Err(MediatorError::Transport(format!(
                "PIX manager rejected query: MSA-1 {}",
                ack_code
            )));
        }
    }

    let Some(pid) = segment(body, "PID") else {
        return Ok(Resolution::NotFound);
    };
    for repetition in field(pid, 3).split('~') {
        if let Some(candidate) = Identifier::parse_cx(repetition) {
            if candidate.authority.matches(target) {
                return Ok(Resolution::Resolved(candidate));
            }
        }
    }
    Ok(Resolution::NotFound)
}

fn parse_ack(body: &str) -> Result<()> {
    let Some(msa) = segment(body, "MSA") else {
        return Err(MediatorError::Transport(
            "identity feed response carries no MSA segment".to_string(),
        ));
    };
    if field(msa, 1).eq_ignore_ascii_case("AA") {
        return Ok(());
    }

    let mut err = String::from("Failed to register new patient:\n");
    if let Some(err_segment) = segment(body, "ERR") {
        let code = field(err_segment, 3);
        let mut parts = code.split('^');
        if let Some(id) = parts.next().filter(|s| !s.is_empty()) {
            err.push_str(id);
            err.push('\n');
        }
        if let Some(text) = parts.next().filter(|s| !s.is_empty()) {
            err.push_str(text);
            err.push('\n');
        }
    }
    Err(MediatorError::Transport(err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> AssigningAuthority {
        AssigningAuthority::new("ECID", "ECID", "ECID")
    }

    const RSP_HIT: &str = "MSH|^~\\&|pix|pix|xdsgate|xdsgate|20240101000000||RSP^K23^RSP_K23|1|P|2.5\r\
                           MSA|AA|1\r\
                           QAK|q1|OK\r\
                           QPD|IHE PIX Query|q1|1111111111^^^&1.2.3&ISO\r\
                           PID|1||ECID1^^^ECID&ECID&ECID~other^^^&9.9.9&ISO";

    #[test]
    fn rsp_k23_with_matching_authority_resolves() {
        let resolution = parse_rsp_k23(RSP_HIT, &target()).unwrap();
        assert_eq!(
            resolution,
            Resolution::Resolved(Identifier::new(
                "ECID1",
                AssigningAuthority::new("ECID", "ECID", "ECID")
            ))
        );
    }

    #[test]
    fn rsp_k23_without_matching_authority_misses() {
        let other = AssigningAuthority::new("XXX", "XXX", "XXX");
        assert_eq!(parse_rsp_k23(RSP_HIT, &other).unwrap(), Resolution::NotFound);
    }

    #[test]
    fn rsp_k23_without_pid_misses() {
        let body = "MSH|^~\\&|a|a|b|b|20240101000000||RSP^K23^RSP_K23|1|P|2.5\rMSA|AA|1\rQAK|q1|NF";
        assert_eq!(parse_rsp_k23(body, &target()).unwrap(), Resolution::NotFound);
    }

    #[test]
    fn rejected_query_is_a_transport_error() {
        let body = "MSH|^~\\&|a|a|b|b|20240101000000||RSP^K23^RSP_K23|1|P|2.5\rMSA|AE|1";
        assert!(parse_rsp_k23(body, &target()).is_err());
    }

    #[test]
    fn ack_aa_succeeds() {
        let body = "MSH|^~\\&|a|a|b|b|20240101000000||ACK|1|P|2.5\rMSA|AA|1";
        assert!(parse_ack(body).is_ok());
    }

    #[test]
    fn ack_error_carries_err_segment_detail() {
        let body = "MSH|^~\\&|a|a|b|b|20240101000000||ACK|1|P|2.5\r\
                    MSA|AE|1\r\
                    ERR|||204^Unknown key identifier";
        let err = parse_ack(body).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Failed to register new patient:"));
        assert!(message.contains("204"));
        assert!(message.contains("Unknown key identifier"));
    }

    #[test]
    fn qbp_q21_carries_query_and_target_domain() {
        let (emitter, _rx) = AuditEmitter::new();
        let client = PixClient::new(test_config(), emitter);
        let id = Identifier::new("1111111111", AssigningAuthority::iso("1.2.3"));
        let message = client.build_qbp_q21("msg-1", &id, &target());

        let qpd = segment(&message, "QPD").unwrap();
        assert_eq!(field(qpd, 1), "IHE PIX Query");
        assert_eq!(field(qpd, 3), "1111111111^^^&1.2.3&ISO");
        assert_eq!(field(qpd, 4), "^^^ECID&ECID&ECID");
        assert!(segment(&message, "RCP").is_some());
    }

    #[test]
    fn adt_a04_batches_identifiers_and_demographics() {
        let (emitter, _rx) = AuditEmitter::new();
        let client = PixClient::new(test_config(), emitter);
        let registration = PatientRegistration {
            patient_identifiers: vec![
                Identifier::new("76cc765a442f410", AssigningAuthority::iso("1.3.6.1.4.1.21367.2005.3.7")),
                Identifier::new("1111111111", AssigningAuthority::iso("1.2.3")),
            ],
            demographics: crate::pnr::demographics::Demographics {
                given_name: Some("Jane".to_string()),
                family_name: Some("Doe".to_string()),
                gender: Some("F".to_string()),
                birth_date: Some("19860101".to_string()),
                telecom: Some("tel:+27832222222".to_string()),
                language_communication_code: Some("eng".to_string()),
            },
            fhir_resource: None,
        };
        let message = client.build_adt_a04("msg-2", &registration);

        let pid = segment(&message, "PID").unwrap();
        assert_eq!(
            field(pid, 3),
            "76cc765a442f410^^^&1.3.6.1.4.1.21367.2005.3.7&ISO~1111111111^^^&1.2.3&ISO"
        );
        assert_eq!(field(pid, 5), "Doe^Jane");
        assert_eq!(field(pid, 7), "19860101");
        assert_eq!(field(pid, 8), "F");
        assert_eq!(field(pid, 13), "tel:+27832222222");
        assert_eq!(field(pid, 15), "eng");
    }

    fn test_config() -> PixConfig {
        PixConfig {
            manager_host: "localhost".to_string(),
            manager_port: 3600,
            sending_application: "xdsgate".to_string(),
            sending_facility: "xdsgate".to_string(),
            receiving_application: "pix".to_string(),
            receiving_facility: "pix".to_string(),
        }
    }
}
