use std::fmt;

use parking_lot::Mutex;
use spark_container::{
    EmptyResolver, Resolver, ServiceCollection, ServiceProvider, WeakServiceProvider,
};

use super::{
    MethodBinder, MethodHandle, ReturnValue, Startup, StartupError, StartupMethods,
    SuppliedArgument,
};
use crate::pipeline::ApplicationBuilder;

/// 约定式启动类在一次宿主构建中的进度。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartupState {
    /// 方法已解析，尚未调用。
    Bound,
    ServicesConfigured,
    PipelineConfigured,
}

/// `ConventionBasedStartup` 把只遵循命名约定的类型适配为 [`Startup`]。
///
/// # 教案级注释
/// - **意图 (Why)**：方法在构造前已由 [`ConventionResolver`](super::ConventionResolver) 一次性解析并缓存，
///   两次调用都不再做名称查找；
/// - **参数来源 (How)**
///   - `configure_services`：服务集合由调用方提供，其余形参从宿主容器解析；
///   - `configure`：管线构建器由调用方提供，其余形参从应用容器解析；
/// - **容器引用 (Trade-offs)**：适配器本身缓存在宿主容器内，因此只持有宿主容器的弱引用；
///   宿主容器已释放时，其余形参视为无法解析；
/// - **状态 (What)**：`Bound → ServicesConfigured → PipelineConfigured`，只记录不强制，
///   重复调用不保证幂等。
pub struct ConventionBasedStartup<S> {
    instance: S,
    methods: StartupMethods<S>,
    hosting_services: WeakServiceProvider,
    state: Mutex<StartupState>,
}

impl<S> fmt::Debug for ConventionBasedStartup<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConventionBasedStartup")
            .field("startup", &self.methods.configure().declaring_type())
            .field("methods", &self.methods)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl<S> ConventionBasedStartup<S> {
    pub fn new(
        instance: S,
        methods: StartupMethods<S>,
        hosting_services: WeakServiceProvider,
    ) -> Self {
        Self {
            instance,
            methods,
            hosting_services,
            state: Mutex::new(StartupState::Bound),
        }
    }

    pub fn instance(&self) -> &S {
        &self.instance
    }

    pub fn methods(&self) -> &StartupMethods<S> {
        &self.methods
    }

    pub fn state(&self) -> StartupState {
        *self.state.lock()
    }

    fn advance(&self, next: StartupState) {
        let mut state = self.state.lock();
        tracing::debug!(
            startup = self.methods.configure().declaring_type(),
            from = ?*state,
            to = ?next,
            "startup state changed"
        );
        *state = next;
    }
}

impl<S> Startup for ConventionBasedStartup<S>
where
    S: Send + Sync + 'static,
{
    fn configure_services(
        &self,
        mut services: ServiceCollection,
    ) -> Result<ServiceProvider, StartupError> {
        let Some(handle) = self.methods.configure_services() else {
            tracing::debug!(
                startup = self.methods.configure().declaring_type(),
                "no services method, building the collection unchanged"
            );
            self.advance(StartupState::ServicesConfigured);
            return Ok(services.build());
        };

        let hosting = self.hosting_services.upgrade();
        let resolver: &dyn Resolver = match &hosting {
            Some(provider) => provider,
            None => &EmptyResolver,
        };
        let returned = MethodBinder::invoke(
            &self.instance,
            handle,
            vec![SuppliedArgument::new(&mut services)],
            resolver,
        )?;
        let provider = match returned {
            ReturnValue::Unit => services.build(),
            ReturnValue::Value(value) => *value
                .downcast::<ServiceProvider>()
                .map_err(|_| unexpected_return(handle, "ServiceProvider"))?,
        };
        self.advance(StartupState::ServicesConfigured);
        Ok(provider)
    }

    fn configure(&self, app: &mut ApplicationBuilder) -> Result<(), StartupError> {
        let handle = self.methods.configure();
        let application_services = app.application_services().clone();
        let returned = MethodBinder::invoke(
            &self.instance,
            handle,
            vec![SuppliedArgument::new(app)],
            &application_services,
        )?;
        if !returned.is_unit() {
            return Err(unexpected_return(handle, "()"));
        }
        self.advance(StartupState::PipelineConfigured);
        Ok(())
    }
}

fn unexpected_return<S>(handle: &MethodHandle<S>, expected: &'static str) -> StartupError {
    StartupError::UnexpectedReturn {
        method: handle.name().to_owned(),
        expected,
    }
}
