//! Built-in function modules and the registry that serves them.

pub mod cmd;
pub mod diagnostics;
pub mod sys;

use std::collections::BTreeMap;
use std::sync::Arc;

use caller_core::{FunctionNotFound, FunctionRegistry, Invocable};
use tracing::{debug, warn};

/// In-memory function registry keyed by dotted name.
///
/// Modules that failed to load keep their error so a later lookup can
/// explain why a function is missing.
#[derive(Default)]
pub struct ModuleRegistry {
    functions: BTreeMap<String, Arc<dyn Invocable>>,
    load_errors: BTreeMap<String, String>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `test`, `cmd` and `sys` modules loaded.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for function in diagnostics::functions() {
            registry.register(function);
        }
        for function in cmd::functions() {
            registry.register(function);
        }

        let mut docs = registry.doc_prefix_search("");
        for function in sys::functions(Arc::new(BTreeMap::new())) {
            docs.insert(
                function.name().to_string(),
                function.doc().unwrap_or_default().to_string(),
            );
        }
        for function in sys::functions(Arc::new(docs)) {
            registry.register(function);
        }

        debug!("Loaded {} built-in functions", registry.functions.len());
        registry
    }

    pub fn register(&mut self, function: Arc<dyn Invocable>) {
        let name = function.name().to_string();
        if self.functions.insert(name.clone(), function).is_some() {
            warn!("Function '{}' registered twice, keeping the latest", name);
        }
    }

    /// Record that `module` could not be loaded.
    pub fn record_load_error(&mut self, module: &str, reason: impl Into<String>) {
        self.load_errors.insert(module.to_string(), reason.into());
    }

    pub fn load_error(&self, module: &str) -> Option<&str> {
        self.load_errors.get(module).map(String::as_str)
    }
}

fn module_of(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

impl FunctionRegistry for ModuleRegistry {
    fn resolve(&self, name: &str) -> Result<Arc<dyn Invocable>, FunctionNotFound> {
        if let Some(function) = self.functions.get(name) {
            return Ok(Arc::clone(function));
        }

        let module = module_of(name);
        let mut suggestions = self.doc_prefix_search(name);
        if suggestions.is_empty() && !module.is_empty() {
            suggestions = self.doc_prefix_search(&format!("{module}."));
        }

        Err(FunctionNotFound {
            name: name.to_string(),
            suggestions,
            reason: self.load_error(module).map(str::to_string),
        })
    }

    fn doc_prefix_search(&self, prefix: &str) -> BTreeMap<String, String> {
        self.functions
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, function)| {
                (
                    name.clone(),
                    function.doc().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }

    fn list_functions(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_resolves_ping() {
        let registry = ModuleRegistry::builtin();
        let ping = registry.resolve("test.ping").unwrap();
        assert_eq!(ping.name(), "test.ping");
        assert!(registry.list_functions().contains(&"sys.doc".to_string()));
    }

    #[test]
    fn test_missing_function_suggests_module_functions() {
        let registry = ModuleRegistry::builtin();
        let err = registry.resolve("test.pong").err().unwrap();
        assert_eq!(err.name, "test.pong");
        assert!(err.suggestions.contains_key("test.ping"));
        assert!(err.reason.is_none());
    }

    #[test]
    fn test_prefix_search_is_exact_prefix() {
        let registry = ModuleRegistry::builtin();
        let docs = registry.doc_prefix_search("cmd.");
        assert_eq!(
            docs.keys().cloned().collect::<Vec<_>>(),
            vec!["cmd.retcode".to_string(), "cmd.run".to_string()]
        );
        assert!(registry.doc_prefix_search("nonexistent").is_empty());
    }

    #[test]
    fn test_load_error_reported_as_reason() {
        let mut registry = ModuleRegistry::builtin();
        registry.record_load_error("vault", "hvac library is not installed");
        let err = registry.resolve("vault.read_secret").err().unwrap();
        assert!(err.suggestions.is_empty());
        assert_eq!(err.reason.as_deref(), Some("hvac library is not installed"));
    }

    #[test]
    fn test_sys_docs_include_sys_functions() {
        let registry = ModuleRegistry::builtin();
        let docs = registry.doc_prefix_search("sys.");
        assert!(docs.contains_key("sys.list_functions"));
    }
}
