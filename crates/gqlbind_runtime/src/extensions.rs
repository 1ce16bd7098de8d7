//! Request lifecycle extensions.
//!
//! An [`Extension`] observes one request: it is told when the request
//! starts and finishes, sees the errors produced by execution, contributes
//! to the `extensions` entry of the response and can act as field
//! middleware. A fresh [`ExtensionManager`] is built for every request.

use crate::error::{BoxError, ExtensionError};
use crate::executor::{Context, FieldError};
use crate::middleware::{Middleware, MiddlewareManager, Next};
use crate::resolver::{ResolverArgs, ResolverFuture, ResolverInfo};
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{trace, warn};

/// Data an extension contributes to the response.
pub type ExtensionData = IndexMap<String, Value>;

/// Hooks into the lifecycle of one request.
///
/// Every hook has a no-op default, so an extension only implements what it
/// observes. Hooks take `&self` because the same instance also runs as field
/// middleware; keep per-request state behind a lock or atomics.
pub trait Extension: Send + Sync {
    /// Name used in errors and logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn request_started(&self, _ctx: &Context) -> Result<(), BoxError> {
        Ok(())
    }

    fn request_finished(&self, _ctx: &Context) -> Result<(), BoxError> {
        Ok(())
    }

    /// Receives the errors of the request. Do not rely on other extensions
    /// having seen or not seen them.
    fn has_errors(&self, _errors: &[FieldError]) {}

    /// Returns data for the response `extensions` entry.
    fn format(&self) -> Option<ExtensionData> {
        None
    }

    /// Wraps field resolution. The default forwards to `next`.
    fn resolve<'a>(
        &'a self,
        next: Next<'a>,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        next.run(parent, args, ctx, info)
    }
}

/// Extension with no behavior of its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct BaseExtension;

impl Extension for BaseExtension {}

/// Builds one extension instance per request.
#[derive(Clone)]
pub struct ExtensionFactory(Arc<dyn Fn() -> Arc<dyn Extension> + Send + Sync>);

impl ExtensionFactory {
    /// Creates a factory from a constructor closure.
    pub fn new<F, E>(constructor: F) -> Self
    where
        F: Fn() -> E + Send + Sync + 'static,
        E: Extension + 'static,
    {
        Self(Arc::new(move || Arc::new(constructor()) as Arc<dyn Extension>))
    }

    /// Creates a factory for a `Default`-constructible extension.
    pub fn of<E: Extension + Default + 'static>() -> Self {
        Self::new(E::default)
    }

    /// Instantiates the extension.
    pub fn create(&self) -> Arc<dyn Extension> {
        (self.0)()
    }
}

impl fmt::Debug for ExtensionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExtensionFactory")
    }
}

/// Runs an extension as field middleware.
struct ExtensionMiddleware(Arc<dyn Extension>);

impl Middleware for ExtensionMiddleware {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn resolve<'a>(
        &'a self,
        next: Next<'a>,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        self.0.resolve(next, parent, args, ctx, info)
    }
}

/// The ordered extensions of one request.
#[derive(Clone, Default)]
pub struct ExtensionManager {
    extensions: Vec<Arc<dyn Extension>>,
    extensions_reversed: Vec<Arc<dyn Extension>>,
}

impl ExtensionManager {
    /// Instantiates every factory, keeping registration order.
    pub fn new(factories: &[ExtensionFactory]) -> Self {
        let extensions: Vec<_> = factories.iter().map(ExtensionFactory::create).collect();
        let extensions_reversed = extensions.iter().rev().cloned().collect();
        Self {
            extensions,
            extensions_reversed,
        }
    }

    /// A manager without extensions.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the extensions in registration order.
    pub fn extensions(&self) -> &[Arc<dyn Extension>] {
        &self.extensions
    }

    /// Returns true if no extension is registered.
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Composes a new chain: `existing` middlewares first, then the extensions.
    ///
    /// `existing` is left untouched.
    pub fn as_middleware_manager(&self, existing: Option<&MiddlewareManager>) -> MiddlewareManager {
        let middlewares = existing
            .map(|manager| manager.middlewares().to_vec())
            .unwrap_or_default()
            .into_iter()
            .chain(
                self.extensions
                    .iter()
                    .map(|ext| Arc::new(ExtensionMiddleware(Arc::clone(ext))) as Arc<dyn Middleware>),
            )
            .collect();
        MiddlewareManager::new(middlewares)
    }

    /// Runs `region` inside the request scope.
    ///
    /// Start hooks run in registration order before `region` is polled.
    /// Finish hooks run in reverse order afterwards, whatever the outcome of
    /// `region`. If the returned future is dropped early, or `region` panics,
    /// the finish hooks still run and their errors are only logged. On that
    /// path a finish hook that panics is logged too, and the hooks after it
    /// still run.
    ///
    /// A finish hook error replaces the outcome of `region`.
    pub async fn request<F, T, E>(&self, ctx: &Context, region: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<ExtensionError>,
    {
        let scope = self.enter(ctx)?;
        let outcome = region.await;
        scope.finish()?;
        outcome
    }

    /// Starts the request scope for callers that drive the region themselves.
    ///
    /// If a start hook fails, the extensions started before it are finished
    /// in reverse order and the error is returned.
    pub fn enter<'a>(&'a self, ctx: &'a Context) -> Result<RequestScope<'a>, ExtensionError> {
        trace!(extensions = self.extensions.len(), "entering request scope");
        let mut scope = RequestScope {
            manager: self,
            ctx,
            started: 0,
            finished: false,
        };

        for ext in &self.extensions {
            ext.request_started(ctx)
                .map_err(|source| ExtensionError::RequestStarted {
                    extension: ext.name().to_string(),
                    source,
                })?;
            scope.started += 1;
        }

        Ok(scope)
    }

    /// Hands the same error list to every extension in registration order.
    pub fn has_errors(&self, errors: &[FieldError]) {
        for ext in &self.extensions {
            ext.has_errors(errors);
        }
    }

    /// Merges the extensions' data; on key collisions the later extension wins.
    pub fn format(&self) -> ExtensionData {
        let mut data = ExtensionData::new();
        for ext in &self.extensions {
            if let Some(ext_data) = ext.format() {
                data.extend(ext_data);
            }
        }
        data
    }
}

impl fmt::Debug for ExtensionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.extensions.iter().map(|ext| ext.name()))
            .finish()
    }
}

/// Guard for an entered request scope.
///
/// Dropping the guard without calling [`RequestScope::finish`] still runs
/// the finish hooks. Panics raised by them are caught and logged, so a guard
/// dropped during unwinding never aborts the process.
#[must_use = "dropping the scope immediately finishes the request"]
pub struct RequestScope<'a> {
    manager: &'a ExtensionManager,
    ctx: &'a Context,
    started: usize,
    finished: bool,
}

impl RequestScope<'_> {
    /// Runs the finish hooks in reverse order and returns the first error.
    ///
    /// Every started extension is finished even if an earlier hook fails.
    pub fn finish(mut self) -> Result<(), ExtensionError> {
        self.finished = true;
        let mut first_error = None;
        for ext in self.started_reversed() {
            if let Err(err) = self.finish_one(ext) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Started extensions, last started first.
    fn started_reversed(&self) -> &[Arc<dyn Extension>] {
        let reversed = &self.manager.extensions_reversed;
        trace!(extensions = self.started, "leaving request scope");
        &reversed[reversed.len() - self.started..]
    }

    fn finish_one(&self, ext: &Arc<dyn Extension>) -> Result<(), ExtensionError> {
        ext.request_finished(self.ctx)
            .map_err(|source| ExtensionError::RequestFinished {
                extension: ext.name().to_string(),
                source,
            })
    }
}

impl Drop for RequestScope<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // A hook panicking here may already be inside an unwind; contain it so
        // the process is not aborted and the remaining hooks still run.
        for ext in self.started_reversed() {
            match panic::catch_unwind(AssertUnwindSafe(|| self.finish_one(ext))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(extension = err.extension(), error = %err, "request finish hook failed");
                }
                Err(_) => {
                    warn!(
                        extension = ext.name(),
                        unwinding = std::thread::panicking(),
                        "request finish hook panicked"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        id: &'static str,
        log: Log,
        fail_start: bool,
        fail_finish: bool,
        panic_finish: bool,
        data: Option<ExtensionData>,
    }

    impl Recorder {
        fn factory(id: &'static str, log: &Log) -> ExtensionFactory {
            Self::factory_with(id, log, |_| {})
        }

        fn factory_with(
            id: &'static str,
            log: &Log,
            configure: impl Fn(&mut Recorder) + Send + Sync + 'static,
        ) -> ExtensionFactory {
            let log = Arc::clone(log);
            ExtensionFactory::new(move || {
                let mut recorder = Recorder {
                    id,
                    log: Arc::clone(&log),
                    fail_start: false,
                    fail_finish: false,
                    panic_finish: false,
                    data: None,
                };
                configure(&mut recorder);
                recorder
            })
        }

        fn record(&self, event: &str) {
            self.log.lock().unwrap().push(format!("{event} {}", self.id));
        }
    }

    impl Extension for Recorder {
        fn name(&self) -> &str {
            self.id
        }

        fn request_started(&self, _ctx: &Context) -> Result<(), BoxError> {
            self.record("start");
            if self.fail_start {
                return Err("start failed".into());
            }
            Ok(())
        }

        fn request_finished(&self, _ctx: &Context) -> Result<(), BoxError> {
            self.record("finish");
            assert!(!self.panic_finish, "finish hook exploded");
            if self.fail_finish {
                return Err("finish failed".into());
            }
            Ok(())
        }

        fn has_errors(&self, errors: &[FieldError]) {
            let messages: Vec<_> = errors.iter().map(|e| e.message.as_str()).collect();
            self.record(&format!("errors[{}]", messages.join(",")));
        }

        fn format(&self) -> Option<ExtensionData> {
            self.data.clone()
        }
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_hooks_nest_around_region() {
        let log = Log::default();
        let manager = ExtensionManager::new(&[
            Recorder::factory("a", &log),
            Recorder::factory("b", &log),
            Recorder::factory("c", &log),
        ]);
        let ctx = Context::new();

        let region_log = Arc::clone(&log);
        let value = manager
            .request(&ctx, async move {
                region_log.lock().unwrap().push("region".to_string());
                Ok::<_, ExtensionError>(7)
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(
            entries(&log),
            vec!["start a", "start b", "start c", "region", "finish c", "finish b", "finish a"]
        );
    }

    #[derive(Debug)]
    enum RegionError {
        Failed,
        Extension,
    }

    impl From<ExtensionError> for RegionError {
        fn from(_: ExtensionError) -> Self {
            Self::Extension
        }
    }

    #[tokio::test]
    async fn test_finish_hooks_run_when_region_fails() {
        let log = Log::default();
        let manager =
            ExtensionManager::new(&[Recorder::factory("a", &log), Recorder::factory("b", &log)]);
        let ctx = Context::new();

        let result: Result<(), RegionError> =
            manager.request(&ctx, async { Err(RegionError::Failed) }).await;

        assert!(matches!(result, Err(RegionError::Failed)));
        assert_eq!(
            entries(&log),
            vec!["start a", "start b", "finish b", "finish a"]
        );
    }

    #[tokio::test]
    async fn test_finish_error_masks_region_outcome() {
        let log = Log::default();
        let manager = ExtensionManager::new(&[
            Recorder::factory_with("a", &log, |r| r.fail_finish = true),
            Recorder::factory("b", &log),
        ]);
        let ctx = Context::new();

        let result: Result<(), RegionError> =
            manager.request(&ctx, async { Err(RegionError::Failed) }).await;

        assert!(matches!(result, Err(RegionError::Extension)));
        assert_eq!(
            entries(&log),
            vec!["start a", "start b", "finish b", "finish a"]
        );
    }

    #[test]
    fn test_failed_start_finishes_already_started() {
        let log = Log::default();
        let manager = ExtensionManager::new(&[
            Recorder::factory("a", &log),
            Recorder::factory_with("b", &log, |r| r.fail_start = true),
            Recorder::factory("c", &log),
        ]);
        let ctx = Context::new();

        let err = manager.enter(&ctx).err().unwrap();

        assert!(matches!(err, ExtensionError::RequestStarted { ref extension, .. } if extension == "b"));
        assert_eq!(entries(&log), vec!["start a", "start b", "finish a"]);
    }

    #[test]
    fn test_finish_runs_every_hook_and_reports_first_error() {
        let log = Log::default();
        let manager = ExtensionManager::new(&[
            Recorder::factory_with("a", &log, |r| r.fail_finish = true),
            Recorder::factory_with("b", &log, |r| r.fail_finish = true),
        ]);
        let ctx = Context::new();

        let err = manager.enter(&ctx).unwrap().finish().unwrap_err();

        assert_eq!(err.extension(), "b");
        assert_eq!(
            entries(&log),
            vec!["start a", "start b", "finish b", "finish a"]
        );
    }

    #[tokio::test]
    async fn test_finish_hooks_run_on_cancellation() {
        let log = Log::default();
        let manager = ExtensionManager::new(&[
            Recorder::factory("a", &log),
            Recorder::factory_with("b", &log, |r| r.fail_finish = true),
        ]);
        let ctx = Context::new();

        let timed_out = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            manager.request(&ctx, async {
                std::future::pending::<()>().await;
                Ok::<_, ExtensionError>(())
            }),
        )
        .await;

        assert!(timed_out.is_err());
        assert_eq!(
            entries(&log),
            vec!["start a", "start b", "finish b", "finish a"]
        );
    }

    #[tokio::test]
    async fn test_finish_hooks_run_on_panic() {
        let log = Log::default();
        let manager = Arc::new(ExtensionManager::new(&[
            Recorder::factory("a", &log),
            Recorder::factory("b", &log),
        ]));

        let task_manager = Arc::clone(&manager);
        let joined = tokio::spawn(async move {
            let ctx = Context::new();
            task_manager
                .request(&ctx, async {
                    if task_manager.is_empty() {
                        return Ok::<_, ExtensionError>(());
                    }
                    panic!("resolver exploded")
                })
                .await
        })
        .await;

        assert!(joined.unwrap_err().is_panic());
        assert_eq!(
            entries(&log),
            vec!["start a", "start b", "finish b", "finish a"]
        );
    }

    #[tokio::test]
    async fn test_panicking_finish_hook_on_cancellation_is_contained() {
        let log = Log::default();
        let manager = ExtensionManager::new(&[
            Recorder::factory("a", &log),
            Recorder::factory_with("b", &log, |r| r.panic_finish = true),
        ]);
        let ctx = Context::new();

        let timed_out = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            manager.request(&ctx, std::future::pending::<Result<(), ExtensionError>>()),
        )
        .await;

        assert!(timed_out.is_err());
        assert_eq!(
            entries(&log),
            vec!["start a", "start b", "finish b", "finish a"]
        );
    }

    #[tokio::test]
    async fn test_panicking_finish_hook_during_unwind_does_not_abort() {
        let log = Log::default();
        let manager = Arc::new(ExtensionManager::new(&[
            Recorder::factory("a", &log),
            Recorder::factory_with("b", &log, |r| r.panic_finish = true),
        ]));

        let task_manager = Arc::clone(&manager);
        let joined = tokio::spawn(async move {
            let ctx = Context::new();
            task_manager
                .request(&ctx, async {
                    if task_manager.is_empty() {
                        return Ok::<_, ExtensionError>(());
                    }
                    panic!("resolver exploded")
                })
                .await
        })
        .await;

        assert!(joined.unwrap_err().is_panic());
        assert_eq!(
            entries(&log),
            vec!["start a", "start b", "finish b", "finish a"]
        );
    }

    #[test]
    fn test_has_errors_receives_same_list() {
        let log = Log::default();
        let manager =
            ExtensionManager::new(&[Recorder::factory("a", &log), Recorder::factory("b", &log)]);

        manager.has_errors(&[FieldError::new("e1")]);

        assert_eq!(entries(&log), vec!["errors[e1] a", "errors[e1] b"]);
    }

    #[test]
    fn test_format_merges_later_wins() {
        let log = Log::default();
        let manager = ExtensionManager::new(&[
            Recorder::factory_with("a", &log, |r| {
                r.data = Some(ExtensionData::from([("a".to_string(), Value::from(1))]));
            }),
            Recorder::factory_with("b", &log, |r| r.data = Some(ExtensionData::new())),
            Recorder::factory_with("c", &log, |r| {
                r.data = Some(ExtensionData::from([
                    ("a".to_string(), Value::from(2)),
                    ("b".to_string(), Value::from(3)),
                ]));
            }),
            Recorder::factory("d", &log),
        ]);

        let data = manager.format();

        assert_eq!(
            serde_json::to_value(&data).unwrap(),
            serde_json::json!({"a": 2, "b": 3})
        );
    }

    #[test]
    fn test_format_without_contributions_is_empty() {
        let manager = ExtensionManager::new(&[ExtensionFactory::of::<BaseExtension>()]);
        assert!(manager.format().is_empty());
        assert!(ExtensionManager::empty().format().is_empty());
    }

    struct Named(&'static str);

    impl Middleware for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn resolve<'a>(
            &'a self,
            next: Next<'a>,
            parent: &'a Value,
            args: &'a ResolverArgs,
            ctx: &'a Context,
            info: &'a ResolverInfo,
        ) -> ResolverFuture<'a> {
            next.run(parent, args, ctx, info)
        }
    }

    fn names(manager: &MiddlewareManager) -> Vec<String> {
        manager
            .middlewares()
            .iter()
            .map(|m| m.name().to_string())
            .collect()
    }

    #[test]
    fn test_as_middleware_manager_without_existing_chain() {
        let log = Log::default();
        let manager =
            ExtensionManager::new(&[Recorder::factory("a", &log), Recorder::factory("b", &log)]);

        let chain = manager.as_middleware_manager(None);

        assert_eq!(names(&chain), vec!["a", "b"]);
    }

    #[test]
    fn test_as_middleware_manager_appends_to_existing_chain() {
        let log = Log::default();
        let manager =
            ExtensionManager::new(&[Recorder::factory("a", &log), Recorder::factory("b", &log)]);
        let existing = MiddlewareManager::default()
            .with(Named("m1"))
            .with(Named("m2"));

        let chain = manager.as_middleware_manager(Some(&existing));

        assert_eq!(names(&chain), vec!["m1", "m2", "a", "b"]);
        assert_eq!(names(&existing), vec!["m1", "m2"]);
    }

    #[test]
    fn test_factories_build_fresh_instances() {
        let factory = ExtensionFactory::of::<BaseExtension>();
        let first = ExtensionManager::new(&[factory.clone()]);
        let second = ExtensionManager::new(&[factory]);

        assert!(!Arc::ptr_eq(&first.extensions()[0], &second.extensions()[0]));
    }
}
