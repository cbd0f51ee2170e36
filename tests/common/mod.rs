#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use xdsgate::audit::AuditEmitter;
use xdsgate::config::Config;
use xdsgate::datatypes::{AssigningAuthority, Identifier};
use xdsgate::dsub::DsubBroadcaster;
use xdsgate::error::{MediatorError, Result};
use xdsgate::orchestration::Orchestrator;
use xdsgate::resolve::{IdentifierResolver, IdentityFeed, PatientRegistration, Resolution};

pub const PNR1: &str = include_str!("../data/pnr1.xml");
pub const PNR2: &str = include_str!("../data/pnr2.xml");
pub const PNR3: &str = include_str!("../data/pnr3.xml");

pub fn ecid1() -> Identifier {
    Identifier::new("ECID1", AssigningAuthority::new("ECID", "ECID", "ECID"))
}

pub fn epid1() -> Identifier {
    Identifier::new("EPID1", AssigningAuthority::new("EPID", "EPID", "EPID"))
}

pub fn elid1() -> Identifier {
    Identifier::new("ELID1", AssigningAuthority::new("ELID", "ELID", "ELID"))
}

/// DocumentEntry patient id in pnr1/pnr2/pnr3.
pub fn patient_id_1() -> Identifier {
    Identifier::new("1111111111", AssigningAuthority::iso("1.2.3"))
}

/// SubmissionSet patient id in pnr1/pnr3.
pub fn patient_id_2() -> Identifier {
    Identifier::new(
        "76cc765a442f410",
        AssigningAuthority::iso("1.3.6.1.4.1.21367.2005.3.7"),
    )
}

pub fn test_config() -> Config {
    Config::from_env().expect("default configuration must parse")
}

pub fn orchestrator(
    config: Config,
    patient_resolver: Arc<dyn IdentifierResolver>,
    provider_resolver: Arc<dyn IdentifierResolver>,
    facility_resolver: Arc<dyn IdentifierResolver>,
    identity_feed: Arc<dyn IdentityFeed>,
) -> Orchestrator {
    let (audit, _rx) = AuditEmitter::new();
    Orchestrator::new(
        Arc::new(config),
        patient_resolver,
        provider_resolver,
        facility_resolver,
        identity_feed,
        audit,
        DsubBroadcaster::new(),
    )
}

/// Resolver that records every request and answers with a fixed identifier
/// or a miss.
pub struct CountingResolver {
    response: Option<Identifier>,
    calls: Mutex<Vec<Identifier>>,
}

impl CountingResolver {
    pub fn resolving(response: Identifier) -> Arc<Self> {
        Arc::new(CountingResolver {
            response: Some(response),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn missing() -> Arc<Self> {
        Arc::new(CountingResolver {
            response: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Identifier> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, identifier: &Identifier) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| *c == identifier)
            .count()
    }
}

#[async_trait]
impl IdentifierResolver for CountingResolver {
    async fn resolve(
        &self,
        identifier: &Identifier,
        _target: &AssigningAuthority,
    ) -> Result<Resolution> {
        self.calls.lock().unwrap().push(identifier.clone());
        Ok(match &self.response {
            Some(id) => Resolution::Resolved(id.clone()),
            None => Resolution::NotFound,
        })
    }
}

/// Resolver whose transport always fails.
pub struct FailingResolver {
    pub message: String,
}

impl FailingResolver {
    pub fn new(message: &str) -> Arc<Self> {
        Arc::new(FailingResolver {
            message: message.to_string(),
        })
    }
}

#[async_trait]
impl IdentifierResolver for FailingResolver {
    async fn resolve(
        &self,
        _identifier: &Identifier,
        _target: &AssigningAuthority,
    ) -> Result<Resolution> {
        Err(MediatorError::Transport(self.message.clone()))
    }
}

/// Resolver that never answers within any reasonable deadline.
pub struct SlowResolver {
    pub delay: Duration,
}

impl SlowResolver {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(SlowResolver { delay })
    }
}

#[async_trait]
impl IdentifierResolver for SlowResolver {
    async fn resolve(
        &self,
        _identifier: &Identifier,
        _target: &AssigningAuthority,
    ) -> Result<Resolution> {
        tokio::time::sleep(self.delay).await;
        Ok(Resolution::NotFound)
    }
}

/// Resolver that misses until a gate opens (an identity feed succeeding),
/// then resolves.
pub struct GatedResolver {
    gate: Arc<AtomicBool>,
    response: Identifier,
    calls: Mutex<Vec<Identifier>>,
}

impl GatedResolver {
    pub fn new(gate: Arc<AtomicBool>, response: Identifier) -> Arc<Self> {
        Arc::new(GatedResolver {
            gate,
            response,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls_for(&self, identifier: &Identifier) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| *c == identifier)
            .count()
    }
}

#[async_trait]
impl IdentifierResolver for GatedResolver {
    async fn resolve(
        &self,
        identifier: &Identifier,
        _target: &AssigningAuthority,
    ) -> Result<Resolution> {
        self.calls.lock().unwrap().push(identifier.clone());
        if self.gate.load(Ordering::SeqCst) {
            Ok(Resolution::Resolved(self.response.clone()))
        } else {
            Ok(Resolution::NotFound)
        }
    }
}

/// Identity feed that records registrations, optionally failing or opening
/// a resolver gate on success.
pub struct RecordingFeed {
    fail: bool,
    gate: Option<Arc<AtomicBool>>,
    requests: Mutex<Vec<PatientRegistration>>,
}

impl RecordingFeed {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(RecordingFeed {
            fail: false,
            gate: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(RecordingFeed {
            fail: true,
            gate: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn opening(gate: Arc<AtomicBool>) -> Arc<Self> {
        Arc::new(RecordingFeed {
            fail: false,
            gate: Some(gate),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<PatientRegistration> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityFeed for RecordingFeed {
    async fn register_patient(&self, registration: &PatientRegistration) -> Result<()> {
        self.requests.lock().unwrap().push(registration.clone());
        if self.fail {
            return Err(MediatorError::Transport(
                "identity feed rejected the registration".to_string(),
            ));
        }
        if let Some(gate) = &self.gate {
            gate.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}
