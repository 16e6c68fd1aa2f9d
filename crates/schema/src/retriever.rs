//! The schema retriever: a batching, caching façade over a
//! [`SchemaTransport`].
//!
//! Classes are cached in two dimensions: without metadata (for
//! typechecking) and with metadata (for natural-language work). A lookup
//! that misses the cache queues its kind; the first kind queued in a
//! dimension schedules a batch task that yields once to the scheduler, so
//! that every lookup issued in the same turn joins it, then fetches all
//! queued kinds with one transport call.
//!
//! Each returned class is typechecked in its own task before it is
//! installed, because checking a class may look up its parents through
//! this same retriever. Kinds the registry does not return are cached as
//! invalid for the negative TTL. Transport failures are reported to every
//! waiter of the batch and not cached.
//!
//! Cache state lives behind a `std::sync::Mutex` that is never held across
//! an await point; waiters park on `oneshot` channels.

use crate::config::RetrieverConfig;
use crate::error::{SchemaError, TypeError};
use crate::transport::{parse_class, parse_classes, MemoryDelegate, SchemaTransport};
use crate::typecheck::check_class;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thingtalk_core::ast::{ArgDirection, ArgumentDef, ClassDef, FunctionDef, FunctionType, MixinDef};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

type Outcome = Result<Arc<ClassDef>, SchemaError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dimension {
    /// Signatures only.
    Basic,
    /// Signatures with natural-language metadata.
    Everything,
}

enum Entry {
    Ready {
        outcome: Outcome,
        /// `None` for injected classes, which never expire.
        expires: Option<Instant>,
    },
    Pending {
        waiters: Vec<oneshot::Sender<Outcome>>,
    },
}

#[derive(Default)]
struct Cache {
    entries: HashMap<String, Entry>,
    queued: Vec<String>,
    batch_scheduled: bool,
}

#[derive(Default)]
struct CacheState {
    basic: Cache,
    everything: Cache,
    mixins: Option<Arc<HashMap<String, MixinDef>>>,
}

impl CacheState {
    fn cache(&mut self, dimension: Dimension) -> &mut Cache {
        match dimension {
            Dimension::Basic => &mut self.basic,
            Dimension::Everything => &mut self.everything,
        }
    }
}

enum Lookup {
    Hit(Outcome),
    Wait(oneshot::Receiver<Outcome>),
    Miss,
}

struct Inner {
    transport: Arc<dyn SchemaTransport>,
    memory: Option<Arc<dyn MemoryDelegate>>,
    config: RetrieverConfig,
    state: Mutex<CacheState>,
}

/// Resolves class kinds and function names to signatures.
///
/// Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct SchemaRetriever {
    inner: Arc<Inner>,
}

impl SchemaRetriever {
    pub fn new(transport: Arc<dyn SchemaTransport>, config: RetrieverConfig) -> Self {
        Self::build(transport, None, config)
    }

    /// A retriever that also resolves memory tables through `memory`.
    pub fn with_memory(
        transport: Arc<dyn SchemaTransport>,
        memory: Arc<dyn MemoryDelegate>,
        config: RetrieverConfig,
    ) -> Self {
        Self::build(transport, Some(memory), config)
    }

    fn build(
        transport: Arc<dyn SchemaTransport>,
        memory: Option<Arc<dyn MemoryDelegate>>,
        config: RetrieverConfig,
    ) -> Self {
        SchemaRetriever {
            inner: Arc::new(Inner {
                transport,
                memory,
                config,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.inner.config
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ──────────────────────────────────────────────
    // Public lookups
    // ──────────────────────────────────────────────

    /// The class `kind`, without metadata.
    pub async fn get_full_schema(&self, kind: &str) -> Result<Arc<ClassDef>, SchemaError> {
        self.get_class(kind, Dimension::Basic).await
    }

    /// The class `kind`, with metadata.
    pub async fn get_full_meta(&self, kind: &str) -> Result<Arc<ClassDef>, SchemaError> {
        self.get_class(kind, Dimension::Everything).await
    }

    /// The signature of `kind.name`, searching parent classes breadth first.
    pub async fn get_schema_and_names(
        &self,
        kind: &str,
        function_type: FunctionType,
        name: &str,
    ) -> Result<Arc<FunctionDef>, SchemaError> {
        self.get_function(kind, function_type, name, Dimension::Basic)
            .await
    }

    /// Like [`get_schema_and_names`](Self::get_schema_and_names), with
    /// metadata.
    pub async fn get_meta(
        &self,
        kind: &str,
        function_type: FunctionType,
        name: &str,
    ) -> Result<Arc<FunctionDef>, SchemaError> {
        self.get_function(kind, function_type, name, Dimension::Everything)
            .await
    }

    /// The signature of a memory table, or `None` when there is no memory
    /// delegate or it does not know the table. Not cached.
    pub async fn get_memory_schema(
        &self,
        table: &str,
        principal: Option<&str>,
    ) -> Result<Option<Arc<FunctionDef>>, SchemaError> {
        let Some(memory) = &self.inner.memory else {
            return Ok(None);
        };
        let Some(schema) = memory.get_schema(table, principal).await? else {
            return Ok(None);
        };
        let args = schema
            .arg_names
            .iter()
            .zip(schema.arg_types.iter())
            .map(|(name, ty)| ArgumentDef::new(ArgDirection::Out, name, ty.clone()))
            .collect();
        Ok(Some(Arc::new(
            FunctionDef::new(FunctionType::Query, table, args).with_flags(true, true),
        )))
    }

    /// Every mixin the registry offers. Cached until [`clear_cache`](Self::clear_cache).
    pub async fn get_mixins(&self) -> Result<Arc<HashMap<String, MixinDef>>, SchemaError> {
        let cached = self.lock().mixins.clone();
        if let Some(mixins) = cached {
            return Ok(mixins);
        }
        let mixins = Arc::new(self.inner.transport.get_mixins().await?);
        self.lock().mixins = Some(mixins.clone());
        Ok(mixins)
    }

    /// Fetches, parses and typechecks the full code of `kind`. Not cached.
    pub async fn get_device_code(&self, kind: &str) -> Result<ClassDef, TypeError> {
        let text = self.inner.transport.get_device_code(kind).await?;
        let class = parse_class(&text)?;
        check_class(&class, self).await?;
        Ok(class)
    }

    // ──────────────────────────────────────────────
    // Cache control
    // ──────────────────────────────────────────────

    /// Installs `class` in both dimensions without expiry, answering anyone
    /// waiting for it.
    pub fn inject_class(&self, class: ClassDef) {
        let class = Arc::new(class.normalized());
        debug!(kind = %class.kind, "class injected");
        for dimension in [Dimension::Basic, Dimension::Everything] {
            self.install(dimension, &class.kind, Ok(class.clone()), None);
        }
    }

    /// Forgets `kind` in both dimensions. In-flight requests complete.
    pub fn remove_from_cache(&self, kind: &str) {
        let mut state = self.lock();
        for dimension in [Dimension::Basic, Dimension::Everything] {
            let cache = state.cache(dimension);
            if matches!(cache.entries.get(kind), Some(Entry::Ready { .. })) {
                cache.entries.remove(kind);
            }
        }
    }

    /// Forgets every resolved class and the mixins. In-flight requests
    /// complete.
    pub fn clear_cache(&self) {
        let mut state = self.lock();
        for dimension in [Dimension::Basic, Dimension::Everything] {
            state
                .cache(dimension)
                .entries
                .retain(|_, entry| matches!(entry, Entry::Pending { .. }));
        }
        state.mixins = None;
    }

    // ──────────────────────────────────────────────
    // Lookup machinery
    // ──────────────────────────────────────────────

    async fn get_function(
        &self,
        kind: &str,
        function_type: FunctionType,
        name: &str,
        dimension: Dimension,
    ) -> Result<Arc<FunctionDef>, SchemaError> {
        let mut queue = VecDeque::from([kind.to_string()]);
        let mut visited = HashSet::new();
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let class = self.get_class(&current, dimension).await?;
            if let Some(function) = class.function(function_type, name) {
                return Ok(Arc::new(function.clone()));
            }
            if function_type == FunctionType::Stream && class.queries.contains_key(name) {
                return Err(SchemaError::NotMonitorable {
                    kind: current,
                    name: name.to_string(),
                });
            }
            queue.extend(class.extends.iter().cloned());
        }
        Err(SchemaError::InvalidFunction {
            kind: kind.to_string(),
            function_type,
            name: name.to_string(),
        })
    }

    async fn get_class(&self, kind: &str, dimension: Dimension) -> Outcome {
        let mut schedule = false;
        let receiver = {
            let mut state = self.lock();
            let cache = state.cache(dimension);
            let now = Instant::now();
            let lookup = match cache.entries.get_mut(kind) {
                Some(Entry::Ready { outcome, expires }) if expires.map_or(true, |t| t > now) => {
                    Lookup::Hit(outcome.clone())
                }
                Some(Entry::Pending { waiters }) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Lookup::Wait(rx)
                }
                _ => Lookup::Miss,
            };
            match lookup {
                Lookup::Hit(outcome) => return outcome,
                Lookup::Wait(rx) => rx,
                Lookup::Miss => {
                    let (tx, rx) = oneshot::channel();
                    cache
                        .entries
                        .insert(kind.to_string(), Entry::Pending { waiters: vec![tx] });
                    cache.queued.push(kind.to_string());
                    if !cache.batch_scheduled {
                        cache.batch_scheduled = true;
                        schedule = true;
                    }
                    rx
                }
            }
        };
        if schedule {
            self.schedule_batch(dimension);
        }
        receiver.await.map_err(|_| SchemaError::Abandoned {
            kind: kind.to_string(),
        })?
    }

    fn schedule_batch(&self, dimension: Dimension) {
        let retriever = self.clone();
        tokio::spawn(async move { retriever.run_batch(dimension).await });
    }

    async fn run_batch(self, dimension: Dimension) {
        tokio::task::yield_now().await;
        let kinds = {
            let mut state = self.lock();
            let cache = state.cache(dimension);
            cache.batch_scheduled = false;
            std::mem::take(&mut cache.queued)
        };
        if kinds.is_empty() {
            return;
        }
        debug!(count = kinds.len(), ?dimension, "dispatching schema batch");

        let response = self
            .inner
            .transport
            .get_schemas(&kinds, dimension == Dimension::Everything)
            .await
            .and_then(|text| parse_classes(&text));
        let classes = match response {
            Ok(classes) => classes,
            Err(err) => {
                warn!(error = %err, count = kinds.len(), "schema batch failed");
                self.fail(dimension, &kinds, err);
                return;
            }
        };

        let mut missing: HashSet<String> = kinds.into_iter().collect();
        for class in classes {
            missing.remove(&class.kind);
            let retriever = self.clone();
            tokio::spawn(async move { retriever.check_and_install(class, dimension).await });
        }
        let negative_ttl = self.inner.config.negative_ttl();
        for kind in missing {
            debug!(%kind, "kind not found");
            let outcome = Err(SchemaError::InvalidKind { kind: kind.clone() });
            self.install(dimension, &kind, outcome, Some(negative_ttl));
        }
    }

    async fn check_and_install(self, class: ClassDef, dimension: Dimension) {
        let kind = class.kind.clone();
        let outcome = match check_class(&class, &self).await {
            Ok(()) => Ok(Arc::new(class)),
            Err(err) => {
                warn!(%kind, error = %err, "class failed to typecheck");
                Err(SchemaError::InvalidClass {
                    kind: kind.clone(),
                    message: err.to_string(),
                })
            }
        };
        let ttl = self.inner.config.positive_ttl();
        self.install(dimension, &kind, outcome, Some(ttl));
    }

    /// Stores `outcome` for `kind` and answers its waiters. An injected
    /// entry is never replaced by a fetched one.
    fn install(&self, dimension: Dimension, kind: &str, outcome: Outcome, ttl: Option<Duration>) {
        let waiters = {
            let mut state = self.lock();
            let cache = state.cache(dimension);
            if ttl.is_some()
                && matches!(cache.entries.get(kind), Some(Entry::Ready { expires: None, .. }))
            {
                return;
            }
            let expires = ttl.map(|ttl| Instant::now() + ttl);
            let entry = Entry::Ready {
                outcome: outcome.clone(),
                expires,
            };
            match cache.entries.insert(kind.to_string(), entry) {
                Some(Entry::Pending { waiters }) => waiters,
                _ => Vec::new(),
            }
        };
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    /// Drops the pending entries of `kinds` and fails their waiters.
    fn fail(&self, dimension: Dimension, kinds: &[String], err: SchemaError) {
        let mut waiters = Vec::new();
        {
            let mut state = self.lock();
            let cache = state.cache(dimension);
            for kind in kinds {
                if !matches!(cache.entries.get(kind), Some(Entry::Pending { .. })) {
                    continue;
                }
                if let Some(Entry::Pending { waiters: pending }) = cache.entries.remove(kind) {
                    waiters.extend(pending);
                }
            }
        }
        for waiter in waiters {
            let _ = waiter.send(Err(err.clone()));
        }
    }
}
