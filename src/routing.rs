//! Department → destination mailbox table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::department::Department;

/// Maps each department to the human inbox that receives its forwards.
///
/// Entries may be missing or blank; both mean "no destination configured".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<Department, String>", into = "BTreeMap<Department, String>")]
pub struct RoutingTable {
    routes: BTreeMap<Department, String>,
}

impl From<BTreeMap<Department, String>> for RoutingTable {
    fn from(routes: BTreeMap<Department, String>) -> Self {
        routes
            .into_iter()
            .fold(Self::new(), |table, (department, address)| {
                table.with_route(department, address)
            })
    }
}

impl From<RoutingTable> for BTreeMap<Department, String> {
    fn from(table: RoutingTable) -> Self {
        table.routes
    }
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `ROUTE_SALES`, `ROUTE_BILLING`, `ROUTE_HR`, `ROUTE_SUPPORT`.
    pub fn from_env() -> Self {
        let mut table = Self::new();
        for department in Department::ALL {
            let key = format!("ROUTE_{}", department.name().to_uppercase());
            if let Ok(address) = std::env::var(&key) {
                table.set(department, address);
            }
        }
        table
    }

    pub fn with_route(mut self, department: Department, address: impl Into<String>) -> Self {
        self.set(department, address);
        self
    }

    pub fn set(&mut self, department: Department, address: impl Into<String>) {
        self.routes.insert(department, address.into().trim().to_string());
    }

    /// Configured destination, or `None` when the entry is unset or blank.
    pub fn destination(&self, department: Department) -> Option<&str> {
        self.routes
            .get(&department)
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
    }

    /// Number of departments with a non-blank destination.
    pub fn configured_count(&self) -> usize {
        Department::ALL
            .iter()
            .filter(|d| self.destination(**d).is_some())
            .count()
    }

    /// Destination for a forward, falling back to the service mailbox.
    pub fn resolve<'a>(&'a self, department: Department, service_address: &'a str) -> &'a str {
        self.destination(department).unwrap_or(service_address)
    }
}
