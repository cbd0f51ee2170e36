//! Provide-and-Register orchestration.
//!
//! One state machine per in-flight transaction: parse and extract, fan the
//! unique identifiers out to the resolvers, triage the aggregated outcomes,
//! optionally feed unknown patients to the MPI and resolve once more, then
//! rewrite the envelope or reject with every failure listed. All state is
//! private to the transaction; the only suspension points are the resolver
//! and feed calls.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio::time::timeout;
use uuid::Uuid;

use crate::audit::{AtnaAudit, AuditEmitter, AuditKind};
use crate::config::Config;
use crate::datatypes::{IdCategory, Identifier};
use crate::dsub::{DsubBroadcaster, NewDocumentRegistered};
use crate::pnr::demographics::patient_demographics;
use crate::pnr::{enrich, extract_occurrences, IdentifierOccurrence, PnrRequest};
use crate::resolve::{IdentifierResolver, IdentityFeed, PatientRegistration, Resolution};
use crate::xds::{RegistryError, RegistryResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestrationState {
    Received,
    Resolving,
    Triage,
    IdentityFeeding,
    ReResolving,
    Enriching,
    Completed,
    Failed,
}

impl std::fmt::Display for OrchestrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OrchestrationState::Received => "Received",
            OrchestrationState::Resolving => "Resolving",
            OrchestrationState::Triage => "Triage",
            OrchestrationState::IdentityFeeding => "IdentityFeeding",
            OrchestrationState::ReResolving => "ReResolving",
            OrchestrationState::Enriching => "Enriching",
            OrchestrationState::Completed => "Completed",
            OrchestrationState::Failed => "Failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolutionKey {
    pub category: IdCategory,
    pub identifier: Identifier,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionState {
    InFlight,
    Resolved(Identifier),
    NotFound,
    Error(String),
}

#[derive(Debug, Clone)]
struct ResolutionEntry {
    state: ResolutionState,
    /// Exact wire rendering for error reporting, fixed at extraction time.
    wire: String,
}

type ResolutionMap = HashMap<ResolutionKey, ResolutionEntry>;

/// Terminal result of a transaction. Both variants render at HTTP 200.
#[derive(Debug, Clone)]
pub enum PnrOutcome {
    /// The envelope with enterprise identifiers written in place.
    Enriched { envelope: String },
    /// An ebRS failure response listing every unresolved identifier.
    Rejected {
        response: RegistryResponse,
        body: String,
    },
}

impl PnrOutcome {
    pub fn is_enriched(&self) -> bool {
        matches!(self, PnrOutcome::Enriched { .. })
    }

    pub fn body(&self) -> &str {
        match self {
            PnrOutcome::Enriched { envelope } => envelope,
            PnrOutcome::Rejected { body, .. } => body,
        }
    }
}

pub struct Orchestrator {
    config: Arc<Config>,
    patient_resolver: Arc<dyn IdentifierResolver>,
    provider_resolver: Arc<dyn IdentifierResolver>,
    facility_resolver: Arc<dyn IdentifierResolver>,
    identity_feed: Arc<dyn IdentityFeed>,
    audit: AuditEmitter,
    dsub: DsubBroadcaster,
}

impl Orchestrator {
    pub fn new(
        config: Arc<Config>,
        patient_resolver: Arc<dyn IdentifierResolver>,
        provider_resolver: Arc<dyn IdentifierResolver>,
        facility_resolver: Arc<dyn IdentifierResolver>,
        identity_feed: Arc<dyn IdentityFeed>,
        audit: AuditEmitter,
        dsub: DsubBroadcaster,
    ) -> Self {
        Orchestrator {
            config,
            patient_resolver,
            provider_resolver,
            facility_resolver,
            identity_feed,
            audit,
            dsub,
        }
    }

    pub fn dsub(&self) -> &DsubBroadcaster {
        &self.dsub
    }

    /// Run a transaction from raw envelope bytes.
    pub async fn orchestrate(&self, envelope: &str) -> PnrOutcome {
        let correlation_id = Uuid::new_v4();
        self.transition(correlation_id, OrchestrationState::Received);
        match PnrRequest::parse(envelope) {
            Ok(request) => self.run_with_deadline(correlation_id, request).await,
            Err(e) => {
                self.transition(correlation_id, OrchestrationState::Failed);
                self.reject(correlation_id, vec![RegistryError::registry(e.to_string())])
            }
        }
    }

    /// Run a transaction whose envelope was parsed upstream
    /// (pre-parse orchestration mode).
    pub async fn orchestrate_parsed(&self, request: PnrRequest) -> PnrOutcome {
        let correlation_id = Uuid::new_v4();
        self.transition(correlation_id, OrchestrationState::Received);
        self.run_with_deadline(correlation_id, request).await
    }

    /// The hard transaction deadline. On expiry the run future is dropped,
    /// which aborts the fan-out; any late resolver responses land in
    /// cancelled tasks and never touch transaction state.
    async fn run_with_deadline(&self, correlation_id: Uuid, request: PnrRequest) -> PnrOutcome {
        match timeout(
            self.config.transaction_timeout,
            self.run(correlation_id, request),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(correlation_id = %correlation_id, "Transaction deadline exceeded");
                self.transition(correlation_id, OrchestrationState::Failed);
                self.reject(
                    correlation_id,
                    vec![RegistryError::repository(format!(
                        "Transaction exceeded the {}s deadline",
                        self.config.transaction_timeout.as_secs()
                    ))],
                )
            }
        }
    }

    async fn run(&self, correlation_id: Uuid, mut request: PnrRequest) -> PnrOutcome {
        let occurrences = extract_occurrences(&request);
        tracing::info!(
            correlation_id = %correlation_id,
            occurrences = occurrences.len(),
            document_entries = request.document_entries.len(),
            "Transaction received"
        );

        // One map entry per unique (category, identifier) pair across all
        // occurrences; disabled categories never enter the map.
        let mut map: ResolutionMap = HashMap::new();
        for occurrence in &occurrences {
            if !self.config.category_enabled(occurrence.category) {
                continue;
            }
            map.entry(key_of(occurrence)).or_insert(ResolutionEntry {
                state: ResolutionState::InFlight,
                wire: occurrence.wire.clone(),
            });
        }

        if !map.is_empty() {
            self.transition(correlation_id, OrchestrationState::Resolving);
            let keys: Vec<ResolutionKey> = map.keys().cloned().collect();
            self.resolve_keys(correlation_id, &mut map, keys).await;
        }

        let mut identity_feed_sent = false;
        loop {
            self.transition(correlation_id, OrchestrationState::Triage);
            let missed_patients: Vec<ResolutionKey> = map
                .iter()
                .filter(|(k, e)| {
                    k.category == IdCategory::Patient && e.state == ResolutionState::NotFound
                })
                .map(|(k, _)| k.clone())
                .collect();

            if missed_patients.is_empty()
                || !self.config.pnr.patients_auto_register
                || identity_feed_sent
            {
                break;
            }

            // At most one identity feed per transaction, batched over all
            // patient identifiers: the submission describes one patient.
            identity_feed_sent = true;
            self.transition(correlation_id, OrchestrationState::IdentityFeeding);
            let registration = build_registration(&request, &occurrences);
            match self.identity_feed.register_patient(&registration).await {
                Ok(()) => {
                    self.transition(correlation_id, OrchestrationState::ReResolving);
                    for key in &missed_patients {
                        if let Some(entry) = map.get_mut(key) {
                            entry.state = ResolutionState::InFlight;
                        }
                    }
                    self.resolve_keys(correlation_id, &mut map, missed_patients)
                        .await;
                }
                Err(e) => {
                    self.transition(correlation_id, OrchestrationState::Failed);
                    let mut errors = vec![RegistryError::repository(format!(
                        "Failed to register patient on the MPI: {}",
                        e
                    ))];
                    errors.extend(collect_failures(&occurrences, &map));
                    return self.reject(correlation_id, errors);
                }
            }
        }

        let failures = collect_failures(&occurrences, &map);
        if !failures.is_empty() {
            self.transition(correlation_id, OrchestrationState::Failed);
            return self.reject(correlation_id, failures);
        }

        // Single-patient invariant: every patient identifier in the set must
        // cross-reference to the same enterprise id.
        let mut patient_ecids: Vec<&Identifier> = Vec::new();
        for (key, entry) in &map {
            if key.category == IdCategory::Patient {
                if let ResolutionState::Resolved(id) = &entry.state {
                    if !patient_ecids.contains(&id) {
                        patient_ecids.push(id);
                    }
                }
            }
        }
        if patient_ecids.len() > 1 {
            self.transition(correlation_id, OrchestrationState::Failed);
            return self.reject(
                correlation_id,
                vec![RegistryError::registry(
                    "Patient identifiers resolve to conflicting enterprise identifiers",
                )],
            );
        }

        self.transition(correlation_id, OrchestrationState::Enriching);
        for occurrence in &occurrences {
            if let Some(entry) = map.get(&key_of(occurrence)) {
                if let ResolutionState::Resolved(enterprise) = &entry.state {
                    enrich::apply(&mut request.dom, occurrence, enterprise);
                }
            }
        }

        let envelope = match request.serialize() {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(correlation_id = %correlation_id, error = %e, "Envelope serialization failed");
                self.transition(correlation_id, OrchestrationState::Failed);
                return self.reject(
                    correlation_id,
                    vec![RegistryError::registry("Internal mediator error")],
                );
            }
        };

        self.transition(correlation_id, OrchestrationState::Completed);
        self.audit.emit(AtnaAudit::new(
            AuditKind::XdsRegister,
            patient_identifiers(&occurrences),
            correlation_id.to_string(),
            true,
        ));

        let facility_id = occurrences
            .iter()
            .filter(|o| o.category == IdCategory::Facility)
            .find_map(|o| match map.get(&key_of(o)).map(|e| &e.state) {
                Some(ResolutionState::Resolved(id)) => Some(id.value.clone()),
                _ => None,
            });
        for document_unique_id in request.document_unique_ids() {
            self.dsub.publish(NewDocumentRegistered {
                document_unique_id,
                facility_id: facility_id.clone(),
                correlation_id: correlation_id.to_string(),
            });
        }

        PnrOutcome::Enriched { envelope }
    }

    /// Fan one resolve task out per unique key. Completions are folded back
    /// into the map in whatever order they arrive; triage begins only once
    /// nothing is left in flight.
    async fn resolve_keys(
        &self,
        correlation_id: Uuid,
        map: &mut ResolutionMap,
        keys: Vec<ResolutionKey>,
    ) {
        let mut join_set = JoinSet::new();
        for key in keys {
            let resolver = self.resolver_for(key.category);
            let target = self.config.target_authority(key.category).clone();
            let per_call = self.config.resolve_timeout;
            join_set.spawn(async move {
                let result = timeout(per_call, resolver.resolve(&key.identifier, &target)).await;
                (key, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            let Ok((key, result)) = joined else {
                tracing::error!(correlation_id = %correlation_id, "Resolver task failed to complete");
                continue;
            };
            let state = match result {
                Ok(Ok(Resolution::Resolved(id))) => {
                    tracing::debug!(
                        correlation_id = %correlation_id,
                        category = %key.category,
                        identifier = %key.identifier,
                        enterprise = %id,
                        "Identifier resolved"
                    );
                    ResolutionState::Resolved(id)
                }
                Ok(Ok(Resolution::NotFound)) => ResolutionState::NotFound,
                Ok(Err(e)) => ResolutionState::Error(e.to_string()),
                Err(_) => ResolutionState::Error(format!(
                    "Resolve call exceeded the {}s deadline",
                    self.config.resolve_timeout.as_secs()
                )),
            };
            if let Some(entry) = map.get_mut(&key) {
                entry.state = state;
            }
        }
    }

    fn resolver_for(&self, category: IdCategory) -> Arc<dyn IdentifierResolver> {
        match category {
            IdCategory::Patient => Arc::clone(&self.patient_resolver),
            IdCategory::Provider => Arc::clone(&self.provider_resolver),
            IdCategory::Facility => Arc::clone(&self.facility_resolver),
        }
    }

    fn reject(&self, correlation_id: Uuid, errors: Vec<RegistryError>) -> PnrOutcome {
        self.audit.emit(AtnaAudit::new(
            AuditKind::XdsRegister,
            vec![],
            correlation_id.to_string(),
            false,
        ));
        let response = RegistryResponse::failure(errors);
        let body = response.to_soap();
        PnrOutcome::Rejected { response, body }
    }

    fn transition(&self, correlation_id: Uuid, state: OrchestrationState) {
        tracing::debug!(correlation_id = %correlation_id, state = %state, "Orchestration state");
    }
}

fn key_of(occurrence: &IdentifierOccurrence) -> ResolutionKey {
    ResolutionKey {
        category: occurrence.category,
        identifier: occurrence.identifier.clone(),
    }
}

fn patient_identifiers(occurrences: &[IdentifierOccurrence]) -> Vec<Identifier> {
    occurrences
        .iter()
        .filter(|o| o.category == IdCategory::Patient)
        .map(|o| o.identifier.clone())
        .collect()
}

fn build_registration(
    request: &PnrRequest,
    occurrences: &[IdentifierOccurrence],
) -> PatientRegistration {
    let (demographics, fhir_resource) = patient_demographics(request);
    PatientRegistration {
        patient_identifiers: patient_identifiers(occurrences),
        demographics,
        fhir_resource,
    }
}

/// One `RegistryError` per unresolved key, in extraction order, every
/// category aggregated together.
fn collect_failures(
    occurrences: &[IdentifierOccurrence],
    map: &ResolutionMap,
) -> Vec<RegistryError> {
    let mut failures = Vec::new();
    let mut seen: Vec<ResolutionKey> = Vec::new();

    for occurrence in occurrences {
        let key = key_of(occurrence);
        if seen.contains(&key) {
            continue;
        }
        seen.push(key.clone());

        let Some(entry) = map.get(&key) else {
            continue;
        };
        match (&entry.state, occurrence.category) {
            (ResolutionState::Resolved(_), _) => {}
            (ResolutionState::NotFound, IdCategory::Patient) => {
                failures.push(RegistryError::unknown_patient(format!(
                    "Failed to resolve patient identifier: {}",
                    entry.wire
                )));
            }
            (ResolutionState::NotFound, IdCategory::Provider) => {
                failures.push(RegistryError::repository(format!(
                    "Failed to resolve healthcare worker identifier: {}",
                    entry.wire
                )));
            }
            (ResolutionState::NotFound, IdCategory::Facility) => {
                failures.push(RegistryError::repository(format!(
                    "Failed to resolve facility identifier: {}",
                    entry.wire
                )));
            }
            (ResolutionState::Error(reason), category) => {
                failures.push(RegistryError::repository(format!(
                    "Failed to resolve {} identifier: {}: {}",
                    category, entry.wire, reason
                )));
            }
            (ResolutionState::InFlight, category) => {
                // Unreachable once the fan-out has drained; reported rather
                // than silently enriched if it ever is.
                failures.push(RegistryError::repository(format!(
                    "Failed to resolve {} identifier: {}: no response",
                    category, entry.wire
                )));
            }
        }
    }
    failures
}
