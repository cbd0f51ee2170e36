use std::collections::HashMap;

use async_trait::async_trait;

use crate::datatypes::{AssigningAuthority, Identifier};
use crate::error::Result;

use super::{IdentifierResolver, Resolution};

/// Resolver over a deterministic in-memory mapping. Used for facility and
/// healthcare-worker lookups that are table-driven rather than MPI-backed,
/// and throughout the test suite.
#[derive(Debug, Clone, Default)]
pub struct InternalResolver {
    mappings: HashMap<Identifier, Identifier>,
    /// When set, unmapped identifiers are re-scoped into the target domain
    /// instead of missing.
    passthrough: bool,
}

impl InternalResolver {
    /// Every lookup misses unless mapped.
    pub fn empty() -> Self {
        InternalResolver::default()
    }

    /// Unmapped identifiers keep their value, re-scoped into the target
    /// authority.
    pub fn passthrough() -> Self {
        InternalResolver {
            mappings: HashMap::new(),
            passthrough: true,
        }
    }

    pub fn with_mappings(mappings: HashMap<Identifier, Identifier>) -> Self {
        InternalResolver {
            mappings,
            passthrough: false,
        }
    }

    pub fn insert(&mut self, from: Identifier, to: Identifier) {
        self.mappings.insert(from, to);
    }
}

#[async_trait]
impl IdentifierResolver for InternalResolver {
    async fn resolve(
        &self,
        identifier: &Identifier,
        target: &AssigningAuthority,
    ) -> Result<Resolution> {
        if let Some(mapped) = self.mappings.get(identifier) {
            return Ok(Resolution::Resolved(mapped.clone()));
        }
        if self.passthrough {
            return Ok(Resolution::Resolved(Identifier::new(
                identifier.value.clone(),
                target.clone(),
            )));
        }
        Ok(Resolution::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mapped_identifiers_resolve() {
        let mut resolver = InternalResolver::empty();
        let local = Identifier::new("45", AssigningAuthority::new("", "1.2.3.4.5.6.7.8.9.1789", ""));
        let enterprise = Identifier::new("ELID1", AssigningAuthority::new("ELID", "ELID", "ELID"));
        resolver.insert(local.clone(), enterprise.clone());

        let target = AssigningAuthority::new("ELID", "ELID", "ELID");
        assert_eq!(
            resolver.resolve(&local, &target).await.unwrap(),
            Resolution::Resolved(enterprise)
        );
    }

    #[tokio::test]
    async fn unmapped_identifiers_miss() {
        let resolver = InternalResolver::empty();
        let id = Identifier::new("unknown", AssigningAuthority::iso("1.2.3"));
        let target = AssigningAuthority::new("ECID", "ECID", "ECID");
        assert_eq!(
            resolver.resolve(&id, &target).await.unwrap(),
            Resolution::NotFound
        );
    }

    #[tokio::test]
    async fn passthrough_rescopes_into_target_domain() {
        let resolver = InternalResolver::passthrough();
        let id = Identifier::new("pro111", AssigningAuthority::new("", "1.2.3", ""));
        let target = AssigningAuthority::new("EPID", "EPID", "EPID");
        let resolved = resolver.resolve(&id, &target).await.unwrap();
        assert_eq!(
            resolved,
            Resolution::Resolved(Identifier::new("pro111", target))
        );
    }
}
