//! Identifier resolution against the MPI / Client Registry.
//!
//! Resolvers are polymorphic over their transport: PIX/PDQ over HL7v2
//! MLLP, FHIR Patient search, or an internal lookup table. A transport
//! failure is an `Err`; a well-formed "no such identifier" answer is
//! `Resolution::NotFound`.

pub mod fhir;
pub mod internal;
pub mod pix;

pub use fhir::FhirClient;
pub use internal::InternalResolver;
pub use pix::PixClient;

use async_trait::async_trait;

use crate::datatypes::{AssigningAuthority, Identifier};
use crate::error::Result;
use crate::pnr::demographics::{Demographics, EmbeddedFhirPatient};

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(Identifier),
    NotFound,
}

#[async_trait]
pub trait IdentifierResolver: Send + Sync {
    /// Cross-reference `identifier` into the `target` enterprise domain.
    async fn resolve(
        &self,
        identifier: &Identifier,
        target: &AssigningAuthority,
    ) -> Result<Resolution>;
}

/// One registration per transaction, batched over every patient identifier
/// the request carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientRegistration {
    pub patient_identifiers: Vec<Identifier>,
    pub demographics: Demographics,
    /// A FHIR Patient document embedded in the submission, forwarded
    /// verbatim when present.
    pub fhir_resource: Option<EmbeddedFhirPatient>,
}

#[async_trait]
pub trait IdentityFeed: Send + Sync {
    /// Create a new patient demographic record on the MPI.
    async fn register_patient(&self, registration: &PatientRegistration) -> Result<()>;
}
