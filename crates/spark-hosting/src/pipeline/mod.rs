use std::{collections::BTreeMap, error::Error as StdError, fmt, sync::Arc};

use spark_container::ServiceProvider;
use thiserror::Error;

/// 记录中间件注册失败的原因。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MiddlewareRegistrationError {
    /// 名称重复。
    #[error("middleware `{name}` already registered")]
    Duplicate { name: String },
}

/// 请求在管线中执行失败。
#[derive(Debug, Error)]
pub enum PipelineError {
    /// 中间件主动拒绝请求，后续中间件不会执行。
    #[error("middleware `{middleware}` rejected the request: {reason}")]
    Rejected { middleware: String, reason: String },

    /// 中间件内部出错。
    #[error("middleware `{middleware}` failed")]
    Failed {
        middleware: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },
}

impl PipelineError {
    pub fn rejected(middleware: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::Rejected {
            middleware: middleware.into(),
            reason: reason.into(),
        }
    }

    pub fn failed<E>(middleware: impl Into<String>, error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        PipelineError::Failed {
            middleware: middleware.into(),
            source: error.into(),
        }
    }
}

/// 单次请求在管线中流转的上下文。
#[derive(Clone, Debug, Default)]
pub struct PipelineContext {
    path: String,
    items: BTreeMap<String, String>,
    trail: Vec<String>,
}

impl PipelineContext {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// 写入请求级键值，已有同名键时覆盖并返回旧值。
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.items.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(String::as_str)
    }

    /// 依次进入过的中间件名称。
    pub fn trail(&self) -> &[String] {
        &self.trail
    }
}

/// 对象层中间件。
///
/// # 教案级注释
/// - **执行模型 (How)**：中间件拿到上下文与 [`Next`]，调用 `next.run(context)` 把请求交给下一环；
///   不调用即短路，后续中间件不再执行；
/// - **契约 (What)**：实现需满足 `Send + Sync + 'static`，同一实例会被多个请求共享。
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, context: &mut PipelineContext, next: Next<'_>) -> Result<(), PipelineError>;
}

struct FnMiddleware<F>(F);

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&mut PipelineContext, Next<'_>) -> Result<(), PipelineError> + Send + Sync + 'static,
{
    fn handle(&self, context: &mut PipelineContext, next: Next<'_>) -> Result<(), PipelineError> {
        (self.0)(context, next)
    }
}

type Entry = (String, Arc<dyn Middleware>);

/// 管线中剩余的中间件。
pub struct Next<'a> {
    remaining: &'a [Entry],
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.remaining.len())
            .finish()
    }
}

impl Next<'_> {
    /// 执行下一个中间件；链路已走完时直接返回成功。
    pub fn run(self, context: &mut PipelineContext) -> Result<(), PipelineError> {
        match self.remaining.split_first() {
            Some(((name, middleware), rest)) => {
                context.trail.push(name.clone());
                middleware.handle(context, Next { remaining: rest })
            }
            None => Ok(()),
        }
    }
}

/// `MiddlewareRegistry` 按注册顺序保存中间件。
///
/// # 教案级注释
/// - **设计动机 (Why)**
///   - 启动类的 `configure` 在装配阶段登记鉴权、观测、限流等中间件，执行顺序即注册顺序；
///   - 名称用于诊断与去重，不参与排序。
/// - **契约 (What)**
///   - 名称必须唯一；若重复注册将返回 [`MiddlewareRegistrationError::Duplicate`]，已有条目保持不变；
///   - 中间件应满足对象层契约：`Send + Sync + 'static`。
#[derive(Default, Clone)]
pub struct MiddlewareRegistry {
    entries: Vec<Entry>,
}

impl fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareRegistry")
            .field("names", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

impl MiddlewareRegistry {
    /// 构造空的注册表。
    pub fn new() -> Self {
        Self::default()
    }

    /// 在链尾追加一个中间件。
    pub fn register(
        &mut self,
        name: impl Into<String>,
        middleware: Arc<dyn Middleware>,
    ) -> Result<(), MiddlewareRegistrationError> {
        let name = name.into();
        if self.get(&name).is_some() {
            return Err(MiddlewareRegistrationError::Duplicate { name });
        }
        tracing::debug!(middleware = %name, position = self.entries.len(), "middleware registered");
        self.entries.push((name, middleware));
        Ok(())
    }

    /// 查询指定名称的中间件。
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Middleware>> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, middleware)| middleware)
    }

    /// 按执行顺序列出名称。
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 启动类 `configure` 方法操作的管线构建器。
///
/// # 教案级注释
/// - **体系位置 (Where)**：由宿主在 `configure_services` 之后创建，持有冻结的应用容器；
/// - **用途 (Why)**：`configure` 既可以登记中间件，也可以从 [`application_services`](Self::application_services)
///   取出服务实例交给中间件；
/// - **后置条件 (What)**：`build` 消费构建器，中间件顺序随之冻结。
pub struct ApplicationBuilder {
    application_services: ServiceProvider,
    middleware: MiddlewareRegistry,
}

impl fmt::Debug for ApplicationBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationBuilder")
            .field("application_services", &self.application_services)
            .field("middleware", &self.middleware)
            .finish()
    }
}

impl ApplicationBuilder {
    pub fn new(application_services: ServiceProvider) -> Self {
        Self {
            application_services,
            middleware: MiddlewareRegistry::new(),
        }
    }

    /// `configure_services` 产出的应用容器。
    pub fn application_services(&self) -> &ServiceProvider {
        &self.application_services
    }

    pub fn middleware(&self) -> &MiddlewareRegistry {
        &self.middleware
    }

    /// 登记对象层中间件。
    pub fn use_middleware<M>(
        &mut self,
        name: impl Into<String>,
        middleware: M,
    ) -> Result<&mut Self, MiddlewareRegistrationError>
    where
        M: Middleware,
    {
        self.middleware.register(name, Arc::new(middleware))?;
        Ok(self)
    }

    /// 以闭包形式登记中间件。
    pub fn use_middleware_fn<F>(
        &mut self,
        name: impl Into<String>,
        middleware: F,
    ) -> Result<&mut Self, MiddlewareRegistrationError>
    where
        F: Fn(&mut PipelineContext, Next<'_>) -> Result<(), PipelineError> + Send + Sync + 'static,
    {
        self.use_middleware(name, FnMiddleware(middleware))
    }

    pub fn build(self) -> RequestPipeline {
        RequestPipeline {
            entries: self.middleware.entries.into(),
        }
    }
}

/// 冻结后的请求管线，克隆只复制 `Arc`。
#[derive(Clone)]
pub struct RequestPipeline {
    entries: Arc<[Entry]>,
}

impl fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("names", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

impl RequestPipeline {
    /// 让请求依次穿过全部中间件。
    pub fn handle(&self, context: &mut PipelineContext) -> Result<(), PipelineError> {
        Next {
            remaining: &self.entries,
        }
        .run(context)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ApplicationBuilder, Middleware, MiddlewareRegistrationError, Next, PipelineContext,
        PipelineError,
    };
    use spark_container::ServiceCollection;

    struct Tag(&'static str);

    impl Middleware for Tag {
        fn handle(
            &self,
            context: &mut PipelineContext,
            next: Next<'_>,
        ) -> Result<(), PipelineError> {
            context.insert(self.0, "seen");
            next.run(context)
        }
    }

    #[test]
    fn middleware_runs_in_registration_order() {
        let mut app = ApplicationBuilder::new(ServiceCollection::new().build());
        app.use_middleware("outer", Tag("outer"))
            .and_then(|app| app.use_middleware("inner", Tag("inner")))
            .expect("注册应成功");

        let pipeline = app.build();
        let mut context = PipelineContext::new("/health");
        pipeline.handle(&mut context).expect("管线应成功");
        assert_eq!(context.trail(), ["outer", "inner"]);
        assert_eq!(context.get("inner"), Some("seen"));
        assert_eq!(context.path(), "/health");
    }

    #[test]
    fn rejection_short_circuits_the_chain() {
        let mut app = ApplicationBuilder::new(ServiceCollection::new().build());
        app.use_middleware_fn("auth", |context, _next| {
            Err(PipelineError::rejected("auth", format!("{} requires a token", context.path())))
        })
        .and_then(|app| app.use_middleware("audit", Tag("audit")))
        .expect("注册应成功");

        let mut context = PipelineContext::new("/admin");
        let error = app.build().handle(&mut context).expect_err("应被拒绝");
        assert!(matches!(error, PipelineError::Rejected { .. }));
        assert_eq!(context.trail(), ["auth"]);
        assert!(context.get("audit").is_none());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut app = ApplicationBuilder::new(ServiceCollection::new().build());
        app.use_middleware("tag", Tag("a")).expect("首次注册应成功");
        let error = app.use_middleware("tag", Tag("b")).expect_err("重名必须失败");
        assert_eq!(
            error,
            MiddlewareRegistrationError::Duplicate { name: "tag".into() }
        );
        assert_eq!(app.middleware().len(), 1);
    }
}
