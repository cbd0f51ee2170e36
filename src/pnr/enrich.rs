//! In-place identifier rewriting.
//!
//! Patient external identifiers take the bare enterprise CX. Healthcare
//! worker and facility slot values are rewritten component-wise so that
//! names, qualifications and the rest of the XCN/XON stay untouched.

use crate::datatypes::{join_components, split_components, IdCategory, Identifier};
use crate::xml::Document;

use super::IdentifierOccurrence;

/// Overwrite every DOM site of `occurrence` with the enterprise identifier.
pub fn apply(dom: &mut Document, occurrence: &IdentifierOccurrence, enterprise: &Identifier) {
    for site in &occurrence.sites {
        match occurrence.category {
            IdCategory::Patient => dom.write_site(site, &enterprise.to_cx()),
            IdCategory::Provider => {
                let raw = dom.read_site(site).unwrap_or_default();
                dom.write_site(site, &rewrite_xcn(&raw, enterprise));
            }
            IdCategory::Facility => {
                let raw = dom.read_site(site).unwrap_or_default();
                dom.write_site(site, &rewrite_xon(&raw, enterprise));
            }
        }
    }
}

/// Replace XCN.1 (id number) and XCN.9 (assigning authority), keeping the
/// name components in between.
fn rewrite_xcn(raw: &str, enterprise: &Identifier) -> String {
    let mut components: Vec<String> = split_components(raw)
        .into_iter()
        .map(str::to_string)
        .collect();
    if components.len() < 9 {
        components.resize(9, String::new());
    }
    components[0] = enterprise.value.clone();
    components[8] = enterprise.authority.to_hd();
    join_components(&components.iter().map(String::as_str).collect::<Vec<_>>())
}

/// Replace XON.10 (id number) and XON.6 (assigning authority), keeping the
/// organization name.
fn rewrite_xon(raw: &str, enterprise: &Identifier) -> String {
    let mut components: Vec<String> = split_components(raw)
        .into_iter()
        .map(str::to_string)
        .collect();
    if components.len() < 10 {
        components.resize(10, String::new());
    }
    components[5] = enterprise.authority.to_hd();
    components[9] = enterprise.value.clone();
    join_components(&components.iter().map(String::as_str).collect::<Vec<_>>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::AssigningAuthority;

    fn epid() -> Identifier {
        Identifier::new("EPID1", AssigningAuthority::new("EPID", "EPID", "EPID"))
    }

    fn elid() -> Identifier {
        Identifier::new("ELID1", AssigningAuthority::new("ELID", "ELID", "ELID"))
    }

    #[test]
    fn xcn_rewrite_preserves_name_components() {
        let rewritten = rewrite_xcn("pro111^Dearmon^Levin^^^Dr^^^&1.2.3", &epid());
        assert_eq!(rewritten, "EPID1^Dearmon^Levin^^^Dr^^^EPID&EPID&EPID");
    }

    #[test]
    fn xcn_rewrite_pads_short_composites() {
        let rewritten = rewrite_xcn("pro111", &epid());
        assert_eq!(rewritten, "EPID1^^^^^^^^EPID&EPID&EPID");
    }

    #[test]
    fn xon_rewrite_preserves_organization_name() {
        let rewritten = rewrite_xon(
            "Some Hospital^^^^^&1.2.3.4.5.6.7.8.9.1789^^^^45",
            &elid(),
        );
        assert_eq!(rewritten, "Some Hospital^^^^^ELID&ELID&ELID^^^^ELID1");
    }
}
