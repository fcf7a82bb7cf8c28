//! XMLA provider surface for Lattice.
//!
//! This crate turns [`lattice_mdx`] query results into wire documents:
//! - [`XmlaService`]: the per-process facade a transport layer drives
//!   (Execute and Discover, session management).
//! - [`write_result_document`]: mddataset serialization through a structured
//!   XML writer (escaping happens exactly once, at node construction).
//! - [`discover`]: schema rowsets derived from catalog metadata.
//!
//! Transport framing (HTTP/SOAP envelopes) is out of scope; the service
//! returns the `<return>` payload bodies a transport would embed.

mod discover;
mod document;
mod service;
mod session;

pub use crate::discover::{discover, DiscoverKind, Restrictions, Rowset};
pub use crate::document::{
    write_empty_document, write_result_document, SerializationError, SerializeResult,
};
pub use crate::service::{RequestProperties, ServiceError, XmlaService};
pub use crate::session::Session;
