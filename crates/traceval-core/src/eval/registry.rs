//! Name → evaluator constructor lookup.
//!
//! The process-wide registry is filled during start-up
//! ([`register_builtin_evaluators`], [`register_evaluator`]) and read while
//! runs are built. Registering while a run is being dispatched is not
//! supported. [`EvaluatorRegistry`] can also be used standalone.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use serde_json::{Map, Value};

use super::builtin::{
    ErrorFreeEvaluator, OutputMatchEvaluator, TokenBudgetEvaluator, ToolSequenceEvaluator,
    ERROR_FREE, OUTPUT_MATCH, TOKEN_BUDGET, TOOL_SEQUENCE,
};
use super::evaluator::Evaluator;
use crate::domain::{Result, TracevalError};

/// Evaluator parameters as given in configuration.
pub type EvaluatorParams = Map<String, Value>;

/// Builds an evaluator from its configuration parameters.
pub type EvaluatorFactory =
    Arc<dyn Fn(&EvaluatorParams) -> Result<Arc<dyn Evaluator>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct EvaluatorRegistry {
    factories: HashMap<String, EvaluatorFactory>,
}

impl fmt::Debug for EvaluatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluatorRegistry")
            .field("evaluators", &self.names())
            .finish()
    }
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in evaluators.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_builtins();
        registry
    }

    /// Register `factory` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&EvaluatorParams) -> Result<Arc<dyn Evaluator>> + Send + Sync + 'static,
    {
        let name = name.into();
        let previous = self.factories.insert(name.clone(), Arc::new(factory));
        if previous.is_some() {
            tracing::debug!(evaluator = %name, "evaluator registration replaced");
        }
    }

    pub fn register_builtins(&mut self) {
        self.register(TOOL_SEQUENCE, |_| {
            Ok(Arc::new(ToolSequenceEvaluator) as Arc<dyn Evaluator>)
        });
        self.register(OUTPUT_MATCH, |_| {
            Ok(Arc::new(OutputMatchEvaluator::new()?) as Arc<dyn Evaluator>)
        });
        self.register(ERROR_FREE, |_| {
            Ok(Arc::new(ErrorFreeEvaluator) as Arc<dyn Evaluator>)
        });
        self.register(TOKEN_BUDGET, |params| {
            let evaluator = TokenBudgetEvaluator::from_params(params)?;
            Ok(Arc::new(evaluator) as Arc<dyn Evaluator>)
        });
    }

    /// Construct the evaluator registered as `name`.
    pub fn create(&self, name: &str, params: &EvaluatorParams) -> Result<Arc<dyn Evaluator>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| TracevalError::UnknownEvaluator(name.to_string()))?;
        factory(params)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

// ---------------------------------------------------------------------------
// Process-wide registry
// ---------------------------------------------------------------------------

fn global() -> &'static RwLock<EvaluatorRegistry> {
    static REGISTRY: OnceLock<RwLock<EvaluatorRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(EvaluatorRegistry::new()))
}

pub fn register_evaluator<F>(name: impl Into<String>, factory: F)
where
    F: Fn(&EvaluatorParams) -> Result<Arc<dyn Evaluator>> + Send + Sync + 'static,
{
    global()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register(name, factory);
}

/// Add the built-in evaluators to the process-wide registry.
pub fn register_builtin_evaluators() {
    global()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register_builtins();
}

pub fn create_evaluator(name: &str, params: &EvaluatorParams) -> Result<Arc<dyn Evaluator>> {
    global()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .create(name, params)
}

pub fn registered_evaluators() -> Vec<String> {
    global()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .names()
}

/// Copy of the process-wide registry.
pub fn global_registry() -> EvaluatorRegistry {
    global()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtins_are_listed() {
        let registry = EvaluatorRegistry::with_builtins();
        assert_eq!(
            registry.names(),
            [ERROR_FREE, OUTPUT_MATCH, TOKEN_BUDGET, TOOL_SEQUENCE]
        );
    }

    #[test]
    fn test_unknown_evaluator() {
        let registry = EvaluatorRegistry::with_builtins();
        let params = EvaluatorParams::new();
        let err = registry.create("llm_judge", &params).err().unwrap();
        assert!(matches!(
            err,
            TracevalError::UnknownEvaluator(ref name) if name == "llm_judge"
        ));
    }

    #[test]
    fn test_params_reach_factory() {
        let registry = EvaluatorRegistry::with_builtins();
        let mut params = EvaluatorParams::new();
        params.insert("max_tokens".to_string(), json!("not a number"));
        assert!(matches!(
            registry.create(TOKEN_BUDGET, &params),
            Err(TracevalError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_global_registration() {
        register_builtin_evaluators();
        register_evaluator("always_one", |_| {
            Ok(Arc::new(ErrorFreeEvaluator) as Arc<dyn Evaluator>)
        });
        let names = registered_evaluators();
        assert!(names.contains(&"always_one".to_string()));
        assert!(names.contains(&"tool_sequence".to_string()));
        let params = EvaluatorParams::new();
        assert!(create_evaluator("always_one", &params).is_ok());
        assert!(global_registry().contains("error_free"));
    }
}
