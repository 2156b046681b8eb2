//! In-memory alert rule list
//!
//! Rules are opaque JSON objects kept for the lifetime of the process. They
//! are neither validated nor evaluated against incoming events.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct AlertRules {
    rules: Arc<RwLock<Vec<Value>>>,
}

impl AlertRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn list(&self) -> Vec<Value> {
        self.rules.read().await.clone()
    }

    pub async fn add(&self, rule: Value) -> Value {
        self.rules.write().await.push(rule.clone());
        rule
    }
}
