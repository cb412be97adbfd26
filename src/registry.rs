//! Assignment of asyn "reasons" to registered PVs.
//!
//! Reasons are dense indices handed out in registration order, starting at
//! zero. They are never reused or renumbered.

use std::{collections::HashMap, sync::Arc};

use thiserror::Error;

use crate::pv::ProcessVariable;

/// asyn handle identifying a registered PV
pub type Reason = usize;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("A PV named '{0}' is already registered")]
    AlreadyRegistered(String),
}

#[derive(Default)]
pub struct PvRegistry {
    pvs: Vec<Arc<dyn ProcessVariable>>,
    reasons: HashMap<String, Reason>,
}

impl PvRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a PV, returning its reason
    pub fn register(&mut self, pv: Arc<dyn ProcessVariable>) -> Result<Reason, RegistryError> {
        let name = pv.full_name_from_port().to_owned();
        if self.reasons.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        self.pvs.push(pv);
        let reason = self.pvs.len() - 1;
        self.reasons.insert(name, reason);
        Ok(reason)
    }

    pub fn get(&self, reason: Reason) -> Option<&Arc<dyn ProcessVariable>> {
        self.pvs.get(reason)
    }

    /// Indexed lookup of the reason for a PV name
    pub fn reason_of(&self, name: &str) -> Option<Reason> {
        self.reasons.get(name).copied()
    }

    /// Scan the registered PVs in reason order for a name
    pub fn find_by_name(&self, name: &str) -> Option<(Reason, &Arc<dyn ProcessVariable>)> {
        self.pvs
            .iter()
            .enumerate()
            .find(|(_, pv)| pv.full_name_from_port() == name)
    }

    pub fn len(&self) -> usize {
        self.pvs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pvs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Reason, &Arc<dyn ProcessVariable>)> {
        self.pvs.iter().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{value::DataType, variable::VariableBuilder};

    fn pv(name: &str) -> Arc<dyn ProcessVariable> {
        VariableBuilder::new("PORT", name, DataType::Int32).build()
    }

    #[test]
    fn reasons_follow_registration_order() {
        let mut registry = PvRegistry::new();
        let names: Vec<String> = (0..20).map(|i| format!("Node-PV{i}")).collect();
        for (i, name) in names.iter().enumerate() {
            assert_eq!(registry.register(pv(name)).unwrap(), i);
        }
        assert_eq!(registry.len(), 20);
        for (i, name) in names.iter().enumerate() {
            assert_eq!(registry.reason_of(name), Some(i));
            let (reason, found) = registry.find_by_name(name).unwrap();
            assert_eq!(reason, i);
            assert_eq!(found.full_name_from_port(), name);
            assert_eq!(registry.get(i).unwrap().full_name_from_port(), name);
        }
        assert!(registry.iter().map(|(r, _)| r).eq(0..20));
    }

    #[test]
    fn unknown_lookups() {
        let mut registry = PvRegistry::new();
        registry.register(pv("A")).unwrap();
        assert!(registry.get(1).is_none());
        assert!(registry.reason_of("B").is_none());
        assert!(registry.find_by_name("B").is_none());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = PvRegistry::new();
        registry.register(pv("A")).unwrap();
        assert_eq!(
            registry.register(pv("A")),
            Err(RegistryError::AlreadyRegistered("A".to_string()))
        );
        assert_eq!(registry.register(pv("B")).unwrap(), 1);
    }
}
