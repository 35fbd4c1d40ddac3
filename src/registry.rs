//! Per-tool capture/apply bindings for preset round-trips.
//!
//! Tools register how their live configuration is captured and applied; the
//! registry dispatches preset saves and loads through those bindings, keyed
//! by tool name rather than any global callback naming scheme.

use crate::presets::PresetManager;
use anyhow::{bail, Result};
use serde_json::Value;
use std::collections::HashMap;

type CaptureFn = Box<dyn Fn() -> Result<Value> + Send + Sync>;
type ApplyFn = Box<dyn Fn(&Value) -> Result<()> + Send + Sync>;

/// How one tool exposes its current configuration.
pub struct ToolBinding {
    capture: CaptureFn,
    apply: ApplyFn,
}

impl ToolBinding {
    pub fn new(
        capture: impl Fn() -> Result<Value> + Send + Sync + 'static,
        apply: impl Fn(&Value) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            capture: Box::new(capture),
            apply: Box::new(apply),
        }
    }
}

/// Registry of tool bindings plus the preset store they round-trip through.
pub struct ToolRegistry {
    presets: PresetManager,
    bindings: HashMap<String, ToolBinding>,
}

impl ToolRegistry {
    pub fn new(presets: PresetManager) -> Self {
        Self {
            presets,
            bindings: HashMap::new(),
        }
    }

    /// Registers (or replaces) the binding for a tool.
    pub fn register(&mut self, tool_name: impl Into<String>, binding: ToolBinding) {
        self.bindings.insert(tool_name.into(), binding);
    }

    pub fn is_registered(&self, tool_name: &str) -> bool {
        self.bindings.contains_key(tool_name)
    }

    /// Captures the tool's current configuration and saves it as a preset.
    pub fn save_current(&self, tool_name: &str, preset_name: &str) -> Result<()> {
        let Some(binding) = self.bindings.get(tool_name) else {
            bail!("No binding registered for tool '{}'", tool_name);
        };
        let data = (binding.capture)()?;
        self.presets.save(tool_name, preset_name, data)
    }

    /// Loads a named preset and applies it to the tool.
    pub fn load_into(&self, tool_name: &str, preset_name: &str) -> Result<()> {
        let Some(binding) = self.bindings.get(tool_name) else {
            bail!("No binding registered for tool '{}'", tool_name);
        };
        let Some(data) = self.presets.load(tool_name, preset_name) else {
            bail!("No preset named '{}' for tool '{}'", preset_name, tool_name);
        };
        (binding.apply)(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryPrefStore;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn registry_with_tool(current: Arc<Mutex<Value>>) -> ToolRegistry {
        let presets = PresetManager::new(Arc::new(MemoryPrefStore::new()));
        let mut registry = ToolRegistry::new(presets);

        let capture_state = Arc::clone(&current);
        let apply_state = Arc::clone(&current);
        registry.register(
            "word-counter",
            ToolBinding::new(
                move || Ok(capture_state.lock().unwrap().clone()),
                move |data| {
                    *apply_state.lock().unwrap() = data.clone();
                    Ok(())
                },
            ),
        );
        registry
    }

    #[test]
    fn test_save_and_load_roundtrip_through_binding() {
        let current = Arc::new(Mutex::new(json!({"mode": "words"})));
        let registry = registry_with_tool(Arc::clone(&current));

        registry.save_current("word-counter", "my-setup").unwrap();

        *current.lock().unwrap() = json!({"mode": "chars"});
        registry.load_into("word-counter", "my-setup").unwrap();
        assert_eq!(*current.lock().unwrap(), json!({"mode": "words"}));
    }

    #[test]
    fn test_unregistered_tool_is_an_error() {
        let current = Arc::new(Mutex::new(Value::Null));
        let registry = registry_with_tool(current);

        assert!(registry.save_current("json-formatter", "x").is_err());
        assert!(registry.load_into("json-formatter", "x").is_err());
        assert!(!registry.is_registered("json-formatter"));
        assert!(registry.is_registered("word-counter"));
    }

    #[test]
    fn test_missing_preset_is_an_error() {
        let current = Arc::new(Mutex::new(Value::Null));
        let registry = registry_with_tool(current);
        assert!(registry.load_into("word-counter", "missing").is_err());
    }
}
