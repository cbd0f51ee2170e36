use serde::{Deserialize, Serialize};

/// An HL7 assigning authority (HD): `namespace&universalId&universalIdType`.
///
/// Any of the three parts may be empty on the wire; equality is over the
/// whole triple.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssigningAuthority {
    pub namespace_id: String,
    pub universal_id: String,
    pub universal_id_type: String,
}

impl AssigningAuthority {
    pub fn new(
        namespace_id: impl Into<String>,
        universal_id: impl Into<String>,
        universal_id_type: impl Into<String>,
    ) -> Self {
        AssigningAuthority {
            namespace_id: namespace_id.into(),
            universal_id: universal_id.into(),
            universal_id_type: universal_id_type.into(),
        }
    }

    /// An ISO OID authority: `&{oid}&ISO`.
    pub fn iso(universal_id: impl Into<String>) -> Self {
        AssigningAuthority::new("", universal_id, "ISO")
    }

    pub fn is_empty(&self) -> bool {
        self.namespace_id.is_empty()
            && self.universal_id.is_empty()
            && self.universal_id_type.is_empty()
    }

    /// Parse an HD string. Empty inner subcomponents are preserved; missing
    /// trailing subcomponents read as empty.
    pub fn parse_hd(raw: &str) -> Self {
        let mut parts = raw.split('&');
        AssigningAuthority {
            namespace_id: parts.next().unwrap_or("").to_string(),
            universal_id: parts.next().unwrap_or("").to_string(),
            universal_id_type: parts.next().unwrap_or("").to_string(),
        }
    }

    /// Render as an HD string, trimming trailing empty subcomponents:
    /// `("", "1.2.3", "")` renders as `&1.2.3`, not `&1.2.3&`.
    pub fn to_hd(&self) -> String {
        let mut parts = vec![
            self.namespace_id.as_str(),
            self.universal_id.as_str(),
            self.universal_id_type.as_str(),
        ];
        while parts.len() > 1 && parts.last() == Some(&"") {
            parts.pop();
        }
        parts.join("&")
    }

    /// Whether an identifier carried in this authority belongs to `target`'s
    /// domain. Universal ids are authoritative when both sides carry one;
    /// otherwise the comparison falls back to namespace ids.
    pub fn matches(&self, target: &AssigningAuthority) -> bool {
        if !self.universal_id.is_empty() && !target.universal_id.is_empty() {
            return self.universal_id == target.universal_id;
        }
        if !self.namespace_id.is_empty() && !target.namespace_id.is_empty() {
            return self.namespace_id == target.namespace_id;
        }
        self == target
    }
}

impl std::fmt::Display for AssigningAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hd())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hd_parse_preserves_empty_subcomponents() {
        let auth = AssigningAuthority::parse_hd("&1.2.3&ISO");
        assert_eq!(auth.namespace_id, "");
        assert_eq!(auth.universal_id, "1.2.3");
        assert_eq!(auth.universal_id_type, "ISO");
    }

    #[test]
    fn hd_render_trims_trailing_empties() {
        assert_eq!(AssigningAuthority::new("", "1.2.3", "").to_hd(), "&1.2.3");
        assert_eq!(
            AssigningAuthority::new("", "1.2.3", "ISO").to_hd(),
            "&1.2.3&ISO"
        );
        assert_eq!(
            AssigningAuthority::new("ECID", "ECID", "ECID").to_hd(),
            "ECID&ECID&ECID"
        );
        assert_eq!(AssigningAuthority::new("NS", "", "").to_hd(), "NS");
    }

    #[test]
    fn domain_matching_prefers_universal_ids() {
        let target = AssigningAuthority::new("ECID", "ECID", "ECID");
        assert!(AssigningAuthority::new("", "ECID", "").matches(&target));
        assert!(!AssigningAuthority::iso("1.2.3").matches(&target));
        assert!(AssigningAuthority::new("ECID", "", "").matches(&target));
    }
}
