use serde::{Deserialize, Serialize};

use super::AssigningAuthority;

/// Which kind of actor an identifier names. The display form feeds the
/// XDS error `codeContext` wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdCategory {
    Patient,
    Provider,
    Facility,
}

impl std::fmt::Display for IdCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            IdCategory::Patient => "patient",
            IdCategory::Provider => "healthcare worker",
            IdCategory::Facility => "facility",
        })
    }
}

/// A scoped identifier: a value qualified by its assigning authority.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    pub value: String,
    pub authority: AssigningAuthority,
}

/// Split an HL7 composite into `^`-separated components, preserving empty
/// inner and trailing components. Never rely on ad-hoc splitting for these:
/// `a^^b^` must read as four components.
pub fn split_components(raw: &str) -> Vec<&str> {
    raw.split('^').collect()
}

/// Join components back, trimming trailing empties.
pub fn join_components(components: &[&str]) -> String {
    let mut parts: Vec<&str> = components.to_vec();
    while parts.len() > 1 && parts.last() == Some(&"") {
        parts.pop();
    }
    parts.join("^")
}

impl Identifier {
    pub fn new(value: impl Into<String>, authority: AssigningAuthority) -> Self {
        Identifier {
            value: value.into(),
            authority,
        }
    }

    /// Parse a CX composite: `value^^^namespace&universalId&universalIdType`.
    /// Returns `None` when the id number component is empty.
    pub fn parse_cx(raw: &str) -> Option<Identifier> {
        let components = split_components(raw);
        let value = components.first().copied().unwrap_or("");
        if value.is_empty() {
            return None;
        }
        let authority = components
            .get(3)
            .map(|hd| AssigningAuthority::parse_hd(hd))
            .unwrap_or_default();
        Some(Identifier::new(value, authority))
    }

    /// Parse an XCN composite; the id number is component 1 and the
    /// assigning authority component 9.
    pub fn parse_xcn(raw: &str) -> Option<Identifier> {
        let components = split_components(raw);
        let value = components.first().copied().unwrap_or("");
        if value.is_empty() {
            return None;
        }
        let authority = components
            .get(8)
            .map(|hd| AssigningAuthority::parse_hd(hd))
            .unwrap_or_default();
        Some(Identifier::new(value, authority))
    }

    /// Parse an XON composite; the organization name is component 1, the
    /// assigning authority component 6 and the id number component 10.
    /// Returns the identifier together with the organization name.
    pub fn parse_xon(raw: &str) -> Option<(Identifier, String)> {
        let components = split_components(raw);
        let org_name = components.first().copied().unwrap_or("").to_string();
        let value = components.get(9).copied().unwrap_or("");
        if value.is_empty() {
            return None;
        }
        let authority = components
            .get(5)
            .map(|hd| AssigningAuthority::parse_hd(hd))
            .unwrap_or_default();
        Some((Identifier::new(value, authority), org_name))
    }

    /// CX wire form: `value^^^authority`.
    pub fn to_cx(&self) -> String {
        format!("{}^^^{}", self.value, self.authority.to_hd())
    }

    /// XCN wire form with only the id and authority populated:
    /// `value^^^^^^^^authority`.
    pub fn to_xcn(&self) -> String {
        format!("{}^^^^^^^^{}", self.value, self.authority.to_hd())
    }

    /// XON wire form carrying an organization name:
    /// `name^^^^^authority^^^^value`.
    pub fn to_xon(&self, org_name: &str) -> String {
        format!("{}^^^^^{}^^^^{}", org_name, self.authority.to_hd(), self.value)
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_cx())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cx_roundtrip() {
        let id = Identifier::parse_cx("1111111111^^^&1.2.3&ISO").unwrap();
        assert_eq!(id.value, "1111111111");
        assert_eq!(id.authority, AssigningAuthority::iso("1.2.3"));
        assert_eq!(id.to_cx(), "1111111111^^^&1.2.3&ISO");
    }

    #[test]
    fn cx_with_full_authority() {
        let id = Identifier::new("ECID1", AssigningAuthority::new("ECID", "ECID", "ECID"));
        assert_eq!(id.to_cx(), "ECID1^^^ECID&ECID&ECID");
    }

    #[test]
    fn cx_empty_value_is_none() {
        assert!(Identifier::parse_cx("^^^&1.2.3&ISO").is_none());
        assert!(Identifier::parse_cx("").is_none());
    }

    #[test]
    fn xcn_keeps_only_id_and_authority() {
        let id = Identifier::parse_xcn("pro111^Dearmon^Levin^^^Dr^^^&1.2.3").unwrap();
        assert_eq!(id.value, "pro111");
        assert_eq!(id.authority, AssigningAuthority::new("", "1.2.3", ""));
        assert_eq!(id.to_xcn(), "pro111^^^^^^^^&1.2.3");
    }

    #[test]
    fn xon_carries_org_name() {
        let (id, name) =
            Identifier::parse_xon("Some Hospital^^^^^&1.2.3.4.5.6.7.8.9.1789^^^^45").unwrap();
        assert_eq!(name, "Some Hospital");
        assert_eq!(id.value, "45");
        assert_eq!(
            id.authority,
            AssigningAuthority::new("", "1.2.3.4.5.6.7.8.9.1789", "")
        );
        assert_eq!(
            id.to_xon(&name),
            "Some Hospital^^^^^&1.2.3.4.5.6.7.8.9.1789^^^^45"
        );
    }

    #[test]
    fn component_split_preserves_trailing_empties() {
        assert_eq!(split_components("a^^b^"), vec!["a", "", "b", ""]);
        assert_eq!(join_components(&["a", "", "b", ""]), "a^^b");
    }
}
