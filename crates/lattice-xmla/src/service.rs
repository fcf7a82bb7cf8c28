//! The provider facade a transport layer drives.
//!
//! One [`XmlaService`] serves a whole process; per-client state lives in the
//! [`Session`] objects it hands out. Statements run synchronously within the
//! call, and the response document (or fault) is fully built before the call
//! returns.

use crate::discover::{discover, DiscoverKind, Restrictions};
use crate::document::{write_empty_document, write_result_document, SerializationError};
use crate::session::Session;
use chrono::Utc;
use lattice_mdx::{
    run_query, CancelToken, Catalog, EngineError, ExecutionError, ParseError, SchemaError,
};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

impl From<EngineError> for ServiceError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Parse(err) => ServiceError::Parse(err),
            EngineError::Schema(err) => ServiceError::Schema(err),
            EngineError::Execution(err) => ServiceError::Execution(err),
        }
    }
}

impl ServiceError {
    /// Stable code for the wire-level fault element.
    pub fn fault_code(&self) -> &'static str {
        match self {
            ServiceError::Parse(_) => "ParseError",
            ServiceError::Schema(_) => "SchemaError",
            ServiceError::Execution(_) => "ExecutionError",
            ServiceError::Serialization(_) => "ServerFault",
        }
    }
}

/// Request properties a client sends alongside an Execute statement. Only
/// the catalog selection changes behavior; formatting properties are fixed.
#[derive(Clone, Debug, Default)]
pub struct RequestProperties {
    pub catalog: Option<String>,
}

#[derive(Clone, Debug)]
pub struct XmlaService {
    catalog: Arc<Catalog>,
}

impl XmlaService {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Creates a fresh session with its own id and no catalog selection.
    pub fn open_session(&self) -> Session {
        Session::new(Arc::clone(&self.catalog))
    }

    /// Runs one statement and returns the serialized `<return>` payload. An
    /// empty statement short-circuits to the fixed empty document without
    /// touching the engine.
    pub fn execute(
        &self,
        session: &mut Session,
        statement: &str,
        properties: &RequestProperties,
    ) -> Result<String, ServiceError> {
        self.execute_cancellable(session, statement, properties, &CancelToken::new())
    }

    /// As [`execute`](Self::execute), with an external cancellation handle
    /// checked between aggregation steps.
    pub fn execute_cancellable(
        &self,
        session: &mut Session,
        statement: &str,
        properties: &RequestProperties,
        cancel: &CancelToken,
    ) -> Result<String, ServiceError> {
        if let Some(catalog) = properties.catalog.as_deref() {
            session.set_active_catalog(catalog)?;
        }
        if statement.trim().is_empty() {
            return Ok(write_empty_document()?);
        }

        log::debug!("session {} execute: {statement}", session.id());
        let result =
            run_query(session.current_catalog(), statement, cancel).map_err(|err| {
                if matches!(err, EngineError::Execution(_)) {
                    log::error!("query execution failed: {err}");
                }
                ServiceError::from(err)
            })?;
        Ok(write_result_document(&result, Utc::now().naive_utc())?)
    }

    /// Answers one discover request as a serialized rowset document.
    pub fn discover(
        &self,
        session: &Session,
        kind: DiscoverKind,
        restrictions: &Restrictions,
    ) -> Result<String, ServiceError> {
        Ok(discover(kind, session, restrictions).to_xml()?)
    }
}
