//! FHIR R4 resolver and identity feed against the MPI.
//!
//! Resolution is a Patient search by identifier token; the enterprise id is
//! the returned Patient's identifier whose `system` equals the configured
//! enterprise system URI. Registration creates a Patient resource, either
//! the one embedded in the submission or one derived from the extracted
//! demographics.

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::audit::{AtnaAudit, AuditEmitter, AuditKind};
use crate::config::FhirConfig;
use crate::datatypes::{AssigningAuthority, Identifier};
use crate::error::{MediatorError, Result};

use super::{IdentifierResolver, IdentityFeed, PatientRegistration, Resolution};

pub struct FhirClient {
    http: reqwest::Client,
    config: FhirConfig,
    audit: AuditEmitter,
}

impl FhirClient {
    pub fn new(config: FhirConfig, audit: AuditEmitter) -> Self {
        FhirClient {
            http: reqwest::Client::new(),
            config,
            audit,
        }
    }

    fn base_url(&self) -> &str {
        self.config.mpi_url.trim_end_matches('/')
    }

    fn with_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.config.mpi_client_name.is_empty() {
            request
        } else {
            request.basic_auth(&self.config.mpi_client_name, Some(&self.config.mpi_password))
        }
    }

    async fn search_patient(&self, system: &str, value: &str) -> Result<Value> {
        let url = format!("{}/Patient", self.base_url());
        let response = self
            .with_auth(self.http.get(&url))
            .query(&[("identifier", format!("{}|{}", system, value))])
            .header("Accept", "application/fhir+json")
            .send()
            .await
            .map_err(|e| MediatorError::Transport(format!("FHIR MPI request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(MediatorError::Transport(format!(
                "FHIR MPI search returned {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| MediatorError::Transport(format!("FHIR MPI response unreadable: {}", e)))
    }

    /// The enterprise identifier on a searchset bundle, if any entry
    /// carries one in the configured enterprise system.
    fn enterprise_id(&self, bundle: &Value, target: &AssigningAuthority) -> Option<Identifier> {
        let entries = bundle.get("entry").and_then(Value::as_array)?;
        let patient = entries.last()?.get("resource")?;
        let identifiers = patient.get("identifier").and_then(Value::as_array)?;
        identifiers
            .iter()
            .find(|id| {
                id.get("system").and_then(Value::as_str) == Some(self.config.enterprise_system.as_str())
            })
            .and_then(|id| id.get("value").and_then(Value::as_str))
            .map(|value| Identifier::new(value, target.clone()))
    }
}

#[async_trait]
impl IdentifierResolver for FhirClient {
    async fn resolve(
        &self,
        identifier: &Identifier,
        target: &AssigningAuthority,
    ) -> Result<Resolution> {
        let correlation_id = Uuid::new_v4().to_string();
        let system = if identifier.authority.universal_id.is_empty() {
            identifier.authority.namespace_id.clone()
        } else {
            identifier.authority.universal_id.clone()
        };
        tracing::debug!(
            identifier = %identifier,
            system = %system,
            correlation_id = %correlation_id,
            "Issuing FHIR MPI search"
        );

        let result = self
            .search_patient(&system, &identifier.value)
            .await
            .map(|bundle| match self.enterprise_id(&bundle, target) {
                Some(id) => Resolution::Resolved(id),
                None => Resolution::NotFound,
            });

        self.audit.emit(AtnaAudit::new(
            AuditKind::PixRequest,
            vec![identifier.clone()],
            &correlation_id,
            matches!(result, Ok(Resolution::Resolved(_))),
        ));
        result
    }
}

#[async_trait]
impl IdentityFeed for FhirClient {
    async fn register_patient(&self, registration: &PatientRegistration) -> Result<()> {
        let correlation_id = Uuid::new_v4().to_string();
        let url = format!("{}/Patient", self.base_url());

        let request = match &registration.fhir_resource {
            Some(embedded) => self
                .with_auth(self.http.post(&url))
                .header("Content-Type", embedded.content_type.clone())
                .body(embedded.body.clone()),
            None => self
                .with_auth(self.http.post(&url))
                .header("Content-Type", "application/fhir+json")
                .json(&patient_resource(registration)),
        };

        let result = match request.send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => Err(MediatorError::Transport(format!(
                "FHIR MPI patient create returned {}",
                response.status()
            ))),
            Err(e) => Err(MediatorError::Transport(format!(
                "FHIR MPI patient create failed: {}",
                e
            ))),
        };

        self.audit.emit(AtnaAudit::new(
            AuditKind::PixIdentityFeed,
            registration.patient_identifiers.clone(),
            &correlation_id,
            result.is_ok(),
        ));
        result
    }
}

/// Build a Patient resource from extracted demographics. Only populated
/// fields are emitted.
fn patient_resource(registration: &PatientRegistration) -> Value {
    let mut patient = json!({
        "resourceType": "Patient",
        "identifier": registration
            .patient_identifiers
            .iter()
            .map(identifier_token)
            .collect::<Vec<Value>>(),
    });
    let demographics = &registration.demographics;

    if demographics.given_name.is_some() || demographics.family_name.is_some() {
        let mut name = json!({});
        if let Some(family) = &demographics.family_name {
            name["family"] = json!(family);
        }
        if let Some(given) = &demographics.given_name {
            name["given"] = json!([given]);
        }
        patient["name"] = json!([name]);
    }
    if let Some(gender) = &demographics.gender {
        patient["gender"] = json!(fhir_gender(gender));
    }
    if let Some(birth_date) = &demographics.birth_date {
        patient["birthDate"] = json!(fhir_date(birth_date));
    }
    if let Some(telecom) = &demographics.telecom {
        patient["telecom"] = json!([{ "value": telecom }]);
    }
    if let Some(language) = &demographics.language_communication_code {
        patient["communication"] =
            json!([{ "language": { "coding": [{ "code": language }] } }]);
    }
    patient
}

fn identifier_token(id: &Identifier) -> Value {
    let system = if !id.authority.universal_id.is_empty() {
        format!("urn:oid:{}", id.authority.universal_id)
    } else {
        id.authority.namespace_id.clone()
    };
    json!({ "system": system, "value": id.value })
}

/// HL7v2 administrative sex to FHIR administrative-gender.
fn fhir_gender(code: &str) -> &str {
    match code {
        "F" | "f" => "female",
        "M" | "m" => "male",
        "O" | "o" => "other",
        _ => "unknown",
    }
}

/// `YYYYMMDD` to FHIR `YYYY-MM-DD`; anything else passes through.
fn fhir_date(raw: &str) -> String {
    if raw.len() == 8 && raw.chars().all(|c| c.is_ascii_digit()) {
        format!("{}-{}-{}", &raw[..4], &raw[4..6], &raw[6..8])
    } else {
        raw.to_string()
    }
}
