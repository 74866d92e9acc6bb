//! Node type registry using ArcSwap
//!
//! Maps a workflow node type name to a constructor. Reads are lock-free;
//! registering swaps the whole map, so runs already in flight keep the
//! constructors they started with.

use super::NodeExecutor;
use crate::error::{EngineError, NodeError};
use arc_swap::ArcSwap;
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};

/// Builds an executor from a node's static configuration
pub type NodeConstructor = Arc<dyn Fn(&Value) -> Result<Box<dyn NodeExecutor>, NodeError> + Send + Sync>;

pub struct NodeRegistry {
    constructors: ArcSwap<HashMap<String, NodeConstructor>>,
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("types", &self.registered_types())
            .finish()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            constructors: ArcSwap::new(Arc::new(HashMap::new())),
        }
    }

    /// Register (or replace) the constructor for `type_name`
    pub fn register<F>(&self, type_name: impl Into<String>, constructor: F)
    where
        F: Fn(&Value) -> Result<Box<dyn NodeExecutor>, NodeError> + Send + Sync + 'static,
    {
        let type_name = type_name.into();
        let constructor: NodeConstructor = Arc::new(constructor);

        let previous = self.constructors.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(type_name.clone(), Arc::clone(&constructor));
            next
        });

        if previous.contains_key(&type_name) {
            tracing::debug!("🔁 Replaced node type: {}", type_name);
        } else {
            tracing::debug!("➕ Registered node type: {}", type_name);
        }
    }

    /// Instantiate an executor. Unknown types and rejected configurations are
    /// configuration errors.
    pub fn create(&self, node_type: &str, config: &Value) -> Result<Box<dyn NodeExecutor>, EngineError> {
        let constructor = self
            .constructors
            .load()
            .get(node_type)
            .cloned()
            .ok_or_else(|| EngineError::Configuration(format!("unknown node type '{}'", node_type)))?;

        constructor(config).map_err(|e| EngineError::Configuration(format!("node type '{}': {}", node_type, e)))
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.constructors.load().contains_key(node_type)
    }

    /// Registered type names, sorted
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.constructors.load().keys().cloned().collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::NodeKind;
    use crate::workflow::{ExecutionContext, NodeInputs, NodeResult};
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo(Value);

    #[async_trait]
    impl NodeExecutor for Echo {
        fn kind(&self) -> NodeKind {
            NodeKind::Processor
        }

        async fn execute(&self, _inputs: NodeInputs, _ctx: &ExecutionContext) -> Result<NodeResult, NodeError> {
            let mut out = NodeResult::new();
            out.insert("config".into(), self.0.clone());
            Ok(out)
        }
    }

    #[test]
    fn unknown_type_is_configuration_error() {
        let registry = NodeRegistry::new();
        let err = registry.create("missing", &Value::Null).err().unwrap();
        assert!(matches!(err, EngineError::Configuration(msg) if msg.contains("missing")));
    }

    #[tokio::test]
    async fn constructor_receives_config() {
        let registry = NodeRegistry::new();
        registry.register("echo", |config| Ok(Box::new(Echo(config.clone())) as Box<dyn NodeExecutor>));

        let node = registry.create("echo", &json!({ "a": 1 })).unwrap();
        let ctx = ExecutionContext::new("e", "w", Default::default());
        let out = node.execute(NodeInputs::new(), &ctx).await.unwrap();
        assert_eq!(out["config"], json!({ "a": 1 }));
    }

    #[test]
    fn rejected_config_is_configuration_error() {
        let registry = NodeRegistry::new();
        registry.register("strict", |_| Err(NodeError::InvalidConfig("nope".into())));
        assert!(matches!(registry.create("strict", &Value::Null), Err(EngineError::Configuration(_))));
    }

    #[test]
    fn re_registering_replaces() {
        let registry = NodeRegistry::new();
        registry.register("x", |_| Err(NodeError::InvalidConfig("old".into())));
        registry.register("x", |config| Ok(Box::new(Echo(config.clone())) as Box<dyn NodeExecutor>));
        assert!(registry.create("x", &Value::Null).is_ok());
        assert_eq!(registry.registered_types(), vec!["x".to_string()]);
    }
}
