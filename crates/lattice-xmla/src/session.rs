use lattice_mdx::{Catalog, Cube, SchemaError, SchemaResult};
use std::sync::Arc;
use uuid::Uuid;

/// State scoped to one client session: the shared read-only catalog plus the
/// cube the client has selected via the `Catalog` property. There is no
/// process-wide selection; every request threads its session explicitly.
#[derive(Clone, Debug)]
pub struct Session {
    id: Uuid,
    catalog: Arc<Catalog>,
    active: Option<String>,
}

impl Session {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            id: Uuid::new_v4(),
            catalog,
            active: None,
        }
    }

    /// Opaque identifier echoed back to the client, constant for the
    /// lifetime of this session.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn current_catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Selects the cube subsequent statements run against. Unknown names are
    /// rejected and leave the previous selection untouched.
    pub fn set_active_catalog(&mut self, name: &str) -> SchemaResult<()> {
        if self.catalog.cube(name).is_none() {
            return Err(SchemaError::UnknownCatalog(name.to_string()));
        }
        self.active = Some(name.to_string());
        Ok(())
    }

    pub fn active_catalog(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// The selected cube, when a valid selection has been made.
    pub fn active_cube(&self) -> Option<&Cube> {
        self.active
            .as_deref()
            .and_then(|name| self.catalog.cube(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_mdx::store::demo_catalog;

    #[test]
    fn selection_requires_a_known_cube() {
        let catalog = Arc::new(demo_catalog().unwrap());
        let mut session = Session::new(catalog);
        assert!(session.active_cube().is_none());

        let err = session.set_active_catalog("nope").unwrap_err();
        assert!(matches!(err, SchemaError::UnknownCatalog(name) if name == "nope"));
        assert_eq!(session.active_catalog(), None);

        session.set_active_catalog("sales").unwrap();
        assert_eq!(session.active_cube().unwrap().name(), "sales");
    }

    #[test]
    fn each_session_gets_its_own_id() {
        let catalog = Arc::new(demo_catalog().unwrap());
        let a = Session::new(Arc::clone(&catalog));
        let b = Session::new(catalog);
        assert_ne!(a.id(), b.id());
    }
}
