use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use caller_core::config::ExecutorConfig;
use caller_core::{
    BoundArgs, CallerError, CallerResult, ExecutionData, Executor, FunctionError, Invocable,
    InvocationOutcome,
};
use rand::Rng;
use tracing::{debug, error, info, warn};

/// Calls the function in the current task.
pub struct DirectCallExecutor;

#[async_trait]
impl Executor for DirectCallExecutor {
    fn name(&self) -> &str {
        "direct_call"
    }

    fn description(&self) -> &str {
        "Invoke the function directly"
    }

    async fn execute(
        &self,
        function: Arc<dyn Invocable>,
        args: &BoundArgs,
        _data: &ExecutionData,
    ) -> Result<Option<InvocationOutcome>, FunctionError> {
        function.invoke(args).await.map(Some)
    }
}

/// Runs the function on its own tokio task so a panic inside it is
/// reported as a command execution error instead of taking the caller down.
pub struct IsolatedExecutor;

#[async_trait]
impl Executor for IsolatedExecutor {
    fn name(&self) -> &str {
        "isolated"
    }

    fn description(&self) -> &str {
        "Invoke the function on a separate task, containing panics"
    }

    async fn execute(
        &self,
        function: Arc<dyn Invocable>,
        args: &BoundArgs,
        data: &ExecutionData,
    ) -> Result<Option<InvocationOutcome>, FunctionError> {
        let args = args.clone();
        let handle = tokio::spawn(async move { function.invoke(&args).await });

        match handle.await {
            Ok(result) => result.map(Some),
            Err(e) if e.is_panic() => {
                error!("Function '{}' panicked in job {}", data.fun, data.jid);
                Err(FunctionError::CommandExecution(format!(
                    "function '{}' panicked",
                    data.fun
                )))
            }
            Err(e) => Err(FunctionError::CommandExecution(format!(
                "function '{}' was cancelled: {e}",
                data.fun
            ))),
        }
    }
}

/// Waits a random delay up to the configured splay time, then hands the
/// call on to the next executor.
pub struct SplayExecutor {
    splaytime: Duration,
}

impl SplayExecutor {
    pub fn new(splaytime: Duration) -> Self {
        Self { splaytime }
    }

    fn delay(&self) -> Duration {
        let max = self.splaytime.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=max))
    }
}

#[async_trait]
impl Executor for SplayExecutor {
    fn name(&self) -> &str {
        "splay"
    }

    fn description(&self) -> &str {
        "Delay the call by a random splay before the next executor runs it"
    }

    async fn execute(
        &self,
        _function: Arc<dyn Invocable>,
        _args: &BoundArgs,
        data: &ExecutionData,
    ) -> Result<Option<InvocationOutcome>, FunctionError> {
        let delay = self.delay();
        debug!("Splaying job {} by {}ms", data.jid, delay.as_millis());
        tokio::time::sleep(delay).await;
        Ok(None)
    }
}

/// Executors available by name.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `direct_call`, `isolated` and `splay`.
    pub fn builtin(config: &ExecutorConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DirectCallExecutor));
        registry.register(Arc::new(IsolatedExecutor));
        registry.register(Arc::new(SplayExecutor::new(Duration::from_secs(
            config.splaytime_seconds,
        ))));
        registry
    }

    pub fn register(&mut self, executor: Arc<dyn Executor>) {
        self.executors.insert(executor.name().to_string(), executor);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Executor>> {
        self.executors.get(name).cloned()
    }

    pub fn list_executors(&self) -> Vec<String> {
        let mut names: Vec<String> = self.executors.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Ordered executors; the first to produce an outcome wins.
#[derive(Clone)]
pub struct ExecutorChain {
    executors: Vec<Arc<dyn Executor>>,
}

impl ExecutorChain {
    pub fn new(executors: Vec<Arc<dyn Executor>>) -> Self {
        Self { executors }
    }

    /// Build the chain from configured names, failing on the first name the
    /// registry does not know.
    pub fn from_names<S: AsRef<str>>(
        names: &[S],
        registry: &ExecutorRegistry,
    ) -> CallerResult<Self> {
        if names.is_empty() {
            return Err(CallerError::config_error("executor chain is empty"));
        }

        let executors = names
            .iter()
            .map(|name| {
                registry.get(name.as_ref()).ok_or_else(|| {
                    warn!(
                        "Unknown executor '{}', available: {}",
                        name.as_ref(),
                        registry.list_executors().join(", ")
                    );
                    CallerError::ExecutorUnavailable(name.as_ref().to_string())
                })
            })
            .collect::<CallerResult<Vec<_>>>()?;

        info!(
            "Executor chain: {}",
            names.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(" -> ")
        );
        Ok(Self { executors })
    }

    pub async fn invoke(
        &self,
        function: Arc<dyn Invocable>,
        args: &BoundArgs,
        data: &ExecutionData,
    ) -> Result<Option<InvocationOutcome>, FunctionError> {
        for executor in &self.executors {
            debug!("Trying executor '{}' for {}", executor.name(), data.fun);
            if let Some(outcome) = executor
                .execute(Arc::clone(&function), args, data)
                .await?
            {
                return Ok(Some(outcome));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use caller_core::{FunctionSignature, JobId};
    use serde_json::{json, Map, Value};

    struct FixedFunction {
        signature: FunctionSignature,
        calls: AtomicUsize,
        panic: bool,
    }

    impl FixedFunction {
        fn new() -> Self {
            Self {
                signature: FunctionSignature::new(),
                calls: AtomicUsize::new(0),
                panic: false,
            }
        }
    }

    #[async_trait]
    impl Invocable for FixedFunction {
        fn name(&self) -> &str {
            "fixed.value"
        }

        fn signature(&self) -> &FunctionSignature {
            &self.signature
        }

        async fn invoke(&self, _args: &BoundArgs) -> Result<InvocationOutcome, FunctionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panic {
                panic!("boom");
            }
            Ok(InvocationOutcome::new(json!("value")))
        }
    }

    struct PassExecutor;

    #[async_trait]
    impl Executor for PassExecutor {
        fn name(&self) -> &str {
            "pass"
        }

        async fn execute(
            &self,
            _function: Arc<dyn Invocable>,
            _args: &BoundArgs,
            _data: &ExecutionData,
        ) -> Result<Option<InvocationOutcome>, FunctionError> {
            Ok(None)
        }
    }

    fn data() -> ExecutionData {
        ExecutionData {
            jid: JobId::new("20240101000000000001"),
            fun: "fixed.value".to_string(),
            arg: Vec::new(),
            kwargs: Map::new(),
            executor_opts: None,
        }
    }

    #[test]
    fn test_unknown_executor_rejected_eagerly() {
        let registry = ExecutorRegistry::builtin(&ExecutorConfig::default());
        let err = ExecutorChain::from_names(&["direct_call", "sudo"], &registry)
            .err()
            .unwrap();
        assert!(matches!(err, CallerError::ExecutorUnavailable(name) if name == "sudo"));
    }

    #[test]
    fn test_builtin_registry_names() {
        let registry = ExecutorRegistry::builtin(&ExecutorConfig::default());
        assert_eq!(
            registry.list_executors(),
            vec!["direct_call", "isolated", "splay"]
        );
    }

    #[tokio::test]
    async fn test_first_non_null_executor_wins() {
        let function = Arc::new(FixedFunction::new());
        let executors: Vec<Arc<dyn Executor>> = vec![
            Arc::new(PassExecutor),
            Arc::new(DirectCallExecutor),
            Arc::new(DirectCallExecutor),
        ];
        let chain = ExecutorChain::new(executors);

        let outcome = chain
            .invoke(function.clone(), &BoundArgs::default(), &data())
            .await
            .unwrap();
        assert_eq!(outcome.map(|o| o.value), Some(Value::from("value")));
        assert_eq!(function.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_chain_of_passing_executors_returns_none() {
        let executors: Vec<Arc<dyn Executor>> = vec![
            Arc::new(PassExecutor),
            Arc::new(SplayExecutor::new(Duration::ZERO)),
        ];
        let chain = ExecutorChain::new(executors);
        let outcome = chain
            .invoke(Arc::new(FixedFunction::new()), &BoundArgs::default(), &data())
            .await
            .unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn test_isolated_executor_contains_panic() {
        let mut function = FixedFunction::new();
        function.panic = true;
        let err = IsolatedExecutor
            .execute(Arc::new(function), &BoundArgs::default(), &data())
            .await
            .unwrap_err();
        assert!(matches!(err, FunctionError::CommandExecution(_)));
    }

    #[test]
    fn test_splay_delay_bounded() {
        let splay = SplayExecutor::new(Duration::from_millis(50));
        for _ in 0..20 {
            assert!(splay.delay() <= Duration::from_millis(50));
        }
    }
}
