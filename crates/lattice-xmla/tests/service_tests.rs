use lattice_mdx::store::demo_catalog;
use lattice_mdx::CancelToken;
use lattice_xmla::{RequestProperties, ServiceError, XmlaService};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn service() -> XmlaService {
    XmlaService::new(Arc::new(demo_catalog().unwrap()))
}

#[test]
fn a_statement_runs_end_to_end() {
    let service = service();
    let mut session = service.open_session();
    let xml = service
        .execute(
            &mut session,
            "SELECT FROM [sales] WHERE [Measures].[Amount]",
            &RequestProperties::default(),
        )
        .unwrap();

    assert!(xml.contains("<CubeName>sales</CubeName>"));
    assert!(xml.contains(">1023</Value>"));
    assert!(roxmltree::Document::parse(&xml).is_ok());
}

#[test]
fn an_empty_statement_yields_the_empty_document() {
    let service = service();
    let mut session = service.open_session();
    let xml = service
        .execute(&mut session, "  ", &RequestProperties::default())
        .unwrap();
    assert_eq!(
        xml,
        "<return><root xmlns=\"urn:schemas-microsoft-com:xml-analysis:empty\"/></return>"
    );
}

#[test]
fn properties_select_the_catalog_for_the_session() {
    let service = service();
    let mut session = service.open_session();
    let properties = RequestProperties {
        catalog: Some("sales".to_string()),
    };
    service
        .execute(
            &mut session,
            "SELECT FROM [sales] WHERE [Measures].[Amount]",
            &properties,
        )
        .unwrap();
    assert_eq!(session.active_catalog(), Some("sales"));
}

#[test]
fn an_unknown_catalog_faults_and_leaves_the_session_alone() {
    let service = service();
    let mut session = service.open_session();
    session.set_active_catalog("sales").unwrap();

    let properties = RequestProperties {
        catalog: Some("warehouse".to_string()),
    };
    let err = service
        .execute(&mut session, "SELECT FROM [sales]", &properties)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Schema(_)));
    assert_eq!(err.fault_code(), "SchemaError");
    assert_eq!(session.active_catalog(), Some("sales"));
}

#[test]
fn parse_failures_map_to_the_parse_fault() {
    let service = service();
    let mut session = service.open_session();
    let err = service
        .execute(
            &mut session,
            "SELECT [Measures].[Amount] COLUMNS FROM [sales]",
            &RequestProperties::default(),
        )
        .unwrap_err();
    assert_eq!(err.fault_code(), "ParseError");
}

#[test]
fn cancellation_surfaces_as_an_execution_fault() {
    let service = service();
    let mut session = service.open_session();
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = service
        .execute_cancellable(
            &mut session,
            "SELECT FROM [sales] WHERE [Measures].[Amount]",
            &RequestProperties::default(),
            &cancel,
        )
        .unwrap_err();
    assert_eq!(err.fault_code(), "ExecutionError");
}

#[test]
fn sessions_do_not_share_their_selection() {
    let service = service();
    let mut first = service.open_session();
    let second = service.open_session();

    first.set_active_catalog("sales").unwrap();
    assert_eq!(first.active_catalog(), Some("sales"));
    assert_eq!(second.active_catalog(), None);
    assert_ne!(first.id(), second.id());
}
