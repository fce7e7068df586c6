use std::collections::HashMap;

use serde_json::{Value, json};

use crate::tool::ToolDescriptor;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate tool name '{0}'")]
    Duplicate(&'static str),
}

/// Ordered tool catalogue. Filled once at startup, then shared read-only.
#[derive(Default, Debug)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, desc: ToolDescriptor) -> Result<(), RegistryError> {
        if self.index.contains_key(desc.name) {
            return Err(RegistryError::Duplicate(desc.name));
        }
        self.index.insert(desc.name, self.tools.len());
        self.tools.push(desc);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// Descriptors in registration order.
    pub fn list(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|d| d.name).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// `tools/list` result payload.
    pub fn to_json(&self) -> Value {
        let tools: Vec<_> = self.tools.iter().map(ToolDescriptor::meta).collect();
        json!({ "tools": tools })
    }
}
