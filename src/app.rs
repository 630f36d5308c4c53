use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use caller_core::{
    AppConfig, FunctionRegistry, JidGenerator, JobCache, JobId, JobResult, MarkerStore,
    ProcessMarker,
};
use caller_infrastructure::{
    create_sink, FileJobCache, FileMarkerStore, HttpReturnChannel, RetentionPolicy,
    SysinfoProcessProbe,
};
use caller_worker::{
    parse_input, CallError, CallOutcome, Caller, CallerSettings, DeliveryRouter, ExecutorChain,
    ExecutorRegistry, ModuleRegistry,
};
use serde_json::Value;
use tracing::{debug, info};

/// One `call` invocation as typed on the command line.
#[derive(Debug, Clone, Default)]
pub struct CallRequest {
    pub fun: String,
    pub tokens: Vec<String>,
    pub no_parse: Vec<String>,
    pub metadata: Option<Value>,
}

/// The caller wired up from configuration.
pub struct Application {
    config: AppConfig,
    caller: Caller,
    registry: Arc<ModuleRegistry>,
    markers: Arc<FileMarkerStore>,
    cache: Arc<FileJobCache>,
}

impl Application {
    pub fn new(config: AppConfig) -> Result<Self> {
        let local = config.caller.is_local();
        info!(
            "Initializing caller: id={}, local={}, cachedir={}",
            config.caller.id,
            local,
            config.caller.cachedir.display()
        );

        let registry = Arc::new(ModuleRegistry::builtin());

        let executors = ExecutorRegistry::builtin(&config.executor);
        let chain =
            ExecutorChain::from_names(config.executor.module_executors.as_slice(), &executors)?;

        let probe = Arc::new(SysinfoProcessProbe::new(
            config.process.identity_marker.clone(),
        ));
        let markers = Arc::new(
            FileMarkerStore::new(config.caller.proc_dir(), probe)
                .with_multiprocessing(config.caller.multiprocessing),
        );
        let cache = Arc::new(FileJobCache::new(
            config.caller.jobs_dir(),
            RetentionPolicy::from(&config.job_cache),
        ));

        let router = build_router(&config, local, Arc::clone(&cache))?;

        let jids = if config.caller.unique_jid {
            JidGenerator::with_unique_suffix(std::process::id())
        } else {
            JidGenerator::new()
        };

        let settings = CallerSettings {
            node_id: config.caller.id.clone(),
            target: config.caller.target.clone(),
            executor_opts: config.executor.executor_opts.clone(),
        };

        let caller = Caller::new(
            Arc::clone(&registry) as Arc<dyn FunctionRegistry>,
            chain,
            Arc::clone(&markers) as Arc<dyn MarkerStore>,
            router,
            settings,
        )
        .with_jid_generator(Arc::new(jids));

        Ok(Self {
            config,
            caller,
            registry,
            markers,
            cache,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn call(&self, request: CallRequest) -> Result<CallOutcome, CallError> {
        let parsed = parse_input(request.tokens.as_slice(), &request.no_parse);
        debug!(
            "Parsed {} positional and {} keyword arguments for {}",
            parsed.args.len(),
            parsed.kwargs.len(),
            request.fun
        );
        self.caller
            .call(&request.fun, parsed.args, parsed.kwargs, request.metadata)
            .await
    }

    /// Markers of jobs still running on this host; stale ones are pruned.
    pub async fn running(&self) -> Result<Vec<ProcessMarker>> {
        self.markers
            .list()
            .await
            .with_context(|| format!("Failed to scan {}", self.markers.proc_dir().display()))
    }

    pub async fn jobs(&self) -> Result<Vec<JobId>> {
        self.cache
            .list()
            .await
            .with_context(|| format!("Failed to list {}", self.cache.jobs_dir().display()))
    }

    pub async fn job(&self, jid: &str) -> Result<Option<JobResult>> {
        let jid = JobId::new(jid);
        if !jid.is_well_formed() {
            anyhow::bail!("'{jid}' is not a valid job id");
        }
        self.cache
            .load(&jid)
            .await
            .with_context(|| format!("Failed to load cached job {jid}"))
    }

    pub fn docs(&self, prefix: Option<&str>) -> BTreeMap<String, String> {
        self.registry.doc_prefix_search(prefix.unwrap_or(""))
    }
}

fn build_router(
    config: &AppConfig,
    local: bool,
    cache: Arc<FileJobCache>,
) -> Result<DeliveryRouter> {
    let mut router = DeliveryRouter::new(config.caller.id.clone(), local);

    for name in &config.returners.names {
        router = match create_sink(name, &config.returners) {
            Some(sink) => router.with_sink(sink),
            None => router.with_unresolved_sink(name.clone()),
        };
    }

    if local {
        if config.caller.cache_jobs {
            router = router.with_cache(cache as Arc<dyn JobCache>);
        }
    } else if let Some(url) = &config.master.url {
        let channel = HttpReturnChannel::new(
            url.clone(),
            Duration::from_secs(config.master.timeout_seconds),
        )
        .context("Failed to create controller channel")?;
        router = router.with_channel(Arc::new(channel));
    }

    Ok(router)
}
