//! ATNA audit emission.
//!
//! Every security-relevant action — PIX queries, identity feeds, the
//! register step itself — produces an [`AtnaAudit`] record. Records flow
//! through an unbounded channel into a drain task that writes structured
//! log events on the `atna` target; emission never blocks or fails the
//! transaction it describes.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::datatypes::Identifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    PixRequest,
    PixIdentityFeed,
    XdsRegister,
}

impl std::fmt::Display for AuditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            AuditKind::PixRequest => "PIX_REQUEST",
            AuditKind::PixIdentityFeed => "PIX_IDENTITY_FEED",
            AuditKind::XdsRegister => "XDS_REGISTER",
        })
    }
}

#[derive(Debug, Clone)]
pub struct AtnaAudit {
    pub kind: AuditKind,
    pub participant_ids: Vec<Identifier>,
    pub correlation_id: String,
    pub outcome: bool,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AtnaAudit {
    pub fn new(
        kind: AuditKind,
        participant_ids: Vec<Identifier>,
        correlation_id: impl Into<String>,
        outcome: bool,
    ) -> Self {
        AtnaAudit {
            kind,
            participant_ids,
            correlation_id: correlation_id.into(),
            outcome,
            message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Clone)]
pub struct AuditEmitter {
    tx: mpsc::UnboundedSender<AtnaAudit>,
}

impl AuditEmitter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AtnaAudit>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (AuditEmitter { tx }, rx)
    }

    /// An emitter wired straight into the logging drain.
    pub fn spawn() -> Self {
        let (emitter, rx) = Self::new();
        tokio::spawn(drain(rx));
        emitter
    }

    pub fn emit(&self, audit: AtnaAudit) {
        // A closed drain must never fail the transaction being audited.
        let _ = self.tx.send(audit);
    }
}

async fn drain(mut rx: mpsc::UnboundedReceiver<AtnaAudit>) {
    while let Some(audit) = rx.recv().await {
        let participants: Vec<String> = audit
            .participant_ids
            .iter()
            .map(|id| id.to_cx())
            .collect();
        tracing::info!(
            target: "atna",
            kind = %audit.kind,
            correlation_id = %audit.correlation_id,
            outcome = audit.outcome,
            participants = ?participants,
            message = audit.message.as_deref().unwrap_or(""),
            timestamp = %audit.timestamp.to_rfc3339(),
            "ATNA audit"
        );
    }
}
