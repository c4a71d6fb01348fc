//! Method registry and connection identity
//!
//! Holds the single registered method and derives the deterministic
//! connection identity the service addresses this client by: a UUIDv5 of
//! the canonical contract JSON in the master-token namespace. Re-registering
//! replaces the previous method outright.

use std::sync::Arc;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::contract::MethodContract;
use crate::error::Result;
use crate::runner::Invocation;
use crate::session::Metadata;

/// The registered user callable. Asynchrony is enforced by the type.
pub type MethodHandler =
    Arc<dyn Fn(Invocation) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Clone)]
pub struct RegisteredMethod {
    pub contract: MethodContract,
    pub identity: Uuid,
    pub handler: MethodHandler,
}

/// Same contract and metadata always hash to the same identity; any
/// parameter or descriptive-field change yields a new one.
pub fn derive_identity(master_token: &Uuid, contract: &MethodContract) -> Result<Uuid> {
    let canonical = serde_json::to_string(contract)?;
    Ok(Uuid::new_v5(master_token, canonical.as_bytes()))
}

#[derive(Default)]
pub struct MethodRegistry {
    current: Option<RegisteredMethod>,
}

impl MethodRegistry {
    /// Installs a method, discarding any previously registered one
    pub fn install(&mut self, method: RegisteredMethod) {
        self.current = Some(method);
    }

    pub fn current(&self) -> Option<&RegisteredMethod> {
        self.current.as_ref()
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredMethod> {
        self.current
            .as_ref()
            .filter(|m| m.contract.method_name == name)
    }

    pub fn identity(&self) -> Option<Uuid> {
        self.current.as_ref().map(|m| m.identity)
    }

    /// Keeps the stored contract's descriptive fields in sync with the
    /// session metadata. The identity is only recomputed at registration.
    pub fn sync_metadata(&mut self, metadata: &Metadata) {
        if let Some(method) = &mut self.current {
            method.contract.sync_metadata(metadata);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{ParamDescriptor, ParamKind};
    use std::collections::HashMap;

    fn noop_handler() -> MethodHandler {
        Arc::new(|_invocation| Box::pin(async { Ok(()) }))
    }

    fn contract(description: &str) -> MethodContract {
        let metadata = Metadata {
            description: description.to_string(),
            ..Metadata::default()
        };
        MethodContract::build(
            "f",
            &[
                ParamDescriptor::new("a", ParamKind::Int),
                ParamDescriptor::new("b", ParamKind::Float).with_default(2.2),
            ],
            &HashMap::new(),
            &metadata,
        )
        .unwrap()
    }

    #[test]
    fn test_identity_is_deterministic() {
        let master = Uuid::new_v4();
        let first = derive_identity(&master, &contract("desc")).unwrap();
        let second = derive_identity(&master, &contract("desc")).unwrap();
        assert_eq!(first, second);
        assert_ne!(first, master);
    }

    #[test]
    fn test_identity_changes_with_description() {
        let master = Uuid::new_v4();
        let first = derive_identity(&master, &contract("one")).unwrap();
        let second = derive_identity(&master, &contract("two")).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_identity_changes_with_master_token() {
        let contract = contract("desc");
        let first = derive_identity(&Uuid::new_v4(), &contract).unwrap();
        let second = derive_identity(&Uuid::new_v4(), &contract).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_registry_holds_single_method() {
        let master = Uuid::new_v4();
        let mut registry = MethodRegistry::default();

        let first = contract("first");
        let first_identity = derive_identity(&master, &first).unwrap();
        registry.install(RegisteredMethod {
            contract: first,
            identity: first_identity,
            handler: noop_handler(),
        });

        let mut second = contract("second");
        second.method_name = "g".to_string();
        let second_identity = derive_identity(&master, &second).unwrap();
        registry.install(RegisteredMethod {
            contract: second,
            identity: second_identity,
            handler: noop_handler(),
        });

        assert!(registry.get("f").is_none());
        assert!(registry.get("g").is_some());
        assert_eq!(registry.identity(), Some(second_identity));
    }

    #[test]
    fn test_sync_metadata_rewrites_descriptive_fields_only() {
        let master = Uuid::new_v4();
        let mut registry = MethodRegistry::default();
        let built = contract("before");
        let identity = derive_identity(&master, &built).unwrap();
        registry.install(RegisteredMethod {
            contract: built,
            identity,
            handler: noop_handler(),
        });

        let metadata = Metadata {
            description: "after".to_string(),
            ..Metadata::default()
        };
        registry.sync_metadata(&metadata);

        let current = registry.current().unwrap();
        assert_eq!(current.contract.description, "after");
        // identity stays until re-registration
        assert_eq!(current.identity, identity);
    }
}
