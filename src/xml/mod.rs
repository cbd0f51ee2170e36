pub mod dom;

pub use dom::{Document, DomSite, NodeId, XmlError};
