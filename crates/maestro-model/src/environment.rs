//! The environment: the root of the model.

use indexmap::IndexMap;

use crate::instance::Instance;
use crate::registry::Registry;
use crate::service::Service;
use crate::ship::Ship;

/// A fully loaded, validated environment description.
///
/// Read-only after load: every instance references an existing ship and
/// every declared dependency references an existing service.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Environment name.
    pub name: String,
    /// Schema version the file was written against.
    pub schema: u32,
    /// Ships keyed by name.
    pub ships: IndexMap<String, Ship>,
    /// Registry credentials keyed by name.
    pub registries: IndexMap<String, Registry>,
    /// Services keyed by name.
    pub services: IndexMap<String, Service>,
}

impl Environment {
    /// Looks up a ship by name.
    #[must_use]
    pub fn ship(&self, name: &str) -> Option<&Ship> {
        self.ships.get(name)
    }

    /// Looks up a service by name.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    /// Looks up an instance by name, returning it with its service.
    #[must_use]
    pub fn instance(&self, name: &str) -> Option<(&Service, &Instance)> {
        self.services.values().find_map(|service| {
            service.instances.get(name).map(|instance| (service, instance))
        })
    }

    /// Iterates over all instances with their services.
    pub fn instances(&self) -> impl Iterator<Item = (&Service, &Instance)> {
        self.services
            .values()
            .flat_map(|service| service.instances.values().map(move |i| (service, i)))
    }

    /// The ship an instance runs on.
    ///
    /// # Panics
    ///
    /// Never panics on a loaded environment: the reference was validated.
    #[must_use]
    pub fn ship_of(&self, instance: &Instance) -> &Ship {
        &self.ships[&instance.ship]
    }
}
