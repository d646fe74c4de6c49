use std::{error::Error as StdError, fmt, path::Path, sync::Arc};

use spark_container::{ContainerError, ServiceCollection};
use thiserror::Error;

use crate::{
    environment::{EnvVarEnvironment, EnvironmentProvider, FixedEnvironment, HostingEnvironment},
    host::Host,
    pipeline::ApplicationBuilder,
    settings::{HostSettings, SettingsError},
    startup::{BindingError, ResolutionError, Startup, StartupError},
};

/// 装配阶段（调用 `build` 之前）出现的错误。
#[derive(Debug, Error)]
pub enum HostBuilderError {
    /// 启动类型在登记时即可判定不合法。
    #[error(transparent)]
    Startup(#[from] ResolutionError),

    /// 服务登记回调失败。
    #[error("service registration failed")]
    Service {
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl HostBuilderError {
    pub fn service<E>(error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        HostBuilderError::Service {
            source: error.into(),
        }
    }
}

/// 构建宿主最终失败时的错误。
#[derive(Debug, Error)]
pub enum HostBuildError {
    #[error("no startup type was registered; call `use_startup` before building the host")]
    StartupNotConfigured,

    /// 启动对象的解析、激活或其方法调用失败。
    #[error(transparent)]
    Startup(#[from] StartupError),

    /// 宿主容器中的其他服务创建失败。
    #[error("hosting container failed")]
    Container(#[from] ContainerError),
}

impl HostBuildError {
    pub fn as_resolution(&self) -> Option<&ResolutionError> {
        match self {
            HostBuildError::Startup(error) => error.as_resolution(),
            _ => None,
        }
    }

    pub fn as_binding(&self) -> Option<&BindingError> {
        match self {
            HostBuildError::Startup(error) => error.as_binding(),
            _ => None,
        }
    }

    /// 启动单例工厂的失败被容器包装为工厂错误，这里还原为 [`StartupError`]。
    fn from_startup_factory(error: ContainerError) -> Self {
        match error.downcast_factory_source::<StartupError>() {
            Ok(startup) => HostBuildError::Startup(startup),
            Err(other) => HostBuildError::Container(other),
        }
    }
}

/// `HostBuilder` 聚合环境选择、服务登记与启动类型，产出可处理请求的 [`Host`]。
///
/// # 教案级注释
/// - **设计目标 (Why)**
///   - 为宿主提供统一的装配入口：集成方只登记服务并指定启动类型，
///     宿主容器、应用容器与请求管线的拼装顺序由 `build` 固定下来；
/// - **关键流程 (How)**
///   1. `configure_services`：立即执行闭包，向宿主服务集合写入注册；
///   2. `use_startup`（见 [`StartupHostBuilderExt`](crate::StartupHostBuilderExt)）：登记启动单例；
///   3. `use_environment` / `with_settings`：选择环境标签来源，可以晚于 `use_startup` 调用；
///   4. `build`：
///      1. 把环境提供者与 [`HostingEnvironment`] 写入宿主集合并冻结为宿主容器；
///      2. 从宿主容器解析启动对象，约定式类型此时才从 [`HostingEnvironment`] 读取环境标签并解析方法，
///         环境提供者在整个构建中只被读取一次；
///      3. 复制宿主集合，换入同一个启动实例，交给 `configure_services` 生成应用容器；
///      4. 以应用容器创建 [`ApplicationBuilder`]，调用 `configure` 并冻结请求管线。
/// - **契约说明 (What)**
///   - 装配步骤返回 `Result<&mut Self, HostBuilderError>`，便于链式调用与错误传播；
///   - `build` 的任何失败都会中止构建，不存在部分成功的宿主。
/// - **风险提示 (Trade-offs)**
///   - 应用容器由宿主集合复制而来，其中的单例工厂会在应用容器内再执行一次；
///     需要跨容器共享的实例请以 `add_singleton` / `add_shared` 登记。
pub struct HostBuilder {
    services: ServiceCollection,
    environment: Arc<dyn EnvironmentProvider>,
    application_name: String,
}

impl Default for HostBuilder {
    fn default() -> Self {
        Self {
            services: ServiceCollection::new(),
            environment: Arc::new(EnvVarEnvironment::default()),
            application_name: String::new(),
        }
    }
}

impl fmt::Debug for HostBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBuilder")
            .field("services", &self.services)
            .field("application_name", &self.application_name)
            .finish()
    }
}

impl HostBuilder {
    /// 创建空的 Builder，环境标签默认取自 `SPARK_ENVIRONMENT`。
    pub fn new() -> Self {
        Self::default()
    }

    /// 按配置选择环境来源与应用名称。
    pub fn with_settings(&mut self, settings: &HostSettings) -> &mut Self {
        self.environment = settings.environment_provider();
        self.application_name = settings.application_name.clone();
        self
    }

    /// 读取 TOML 配置文件并应用。
    pub fn load_settings(&mut self, path: impl AsRef<Path>) -> Result<&mut Self, HostBuilderError> {
        let settings = HostSettings::from_path(path)?;
        Ok(self.with_settings(&settings))
    }

    /// 使用固定的环境标签。
    pub fn use_environment(&mut self, label: impl Into<String>) -> &mut Self {
        self.use_environment_provider(Arc::new(FixedEnvironment::new(label)))
    }

    pub fn use_environment_provider(
        &mut self,
        provider: Arc<dyn EnvironmentProvider>,
    ) -> &mut Self {
        self.environment = provider;
        self
    }

    pub fn use_application_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.application_name = name.into();
        self
    }

    /// 向宿主服务集合登记服务。
    ///
    /// # 教案级注释
    /// - **执行逻辑 (How)**：立即调用传入闭包；
    /// - **契约 (What)**：闭包返回错误时整体调用失败，已写入的注册保留；
    /// - **风险提示**：闭包应避免耗时 I/O，防止阻塞装配流程。
    pub fn configure_services<F>(&mut self, configure: F) -> Result<&mut Self, HostBuilderError>
    where
        F: FnOnce(&mut ServiceCollection) -> Result<(), HostBuilderError>,
    {
        configure(&mut self.services)?;
        Ok(self)
    }

    /// 当前的宿主服务集合。
    pub fn services(&self) -> &ServiceCollection {
        &self.services
    }

    /// 最终构建宿主实例。
    pub fn build(self) -> Result<Host, HostBuildError> {
        let HostBuilder {
            mut services,
            environment,
            application_name,
        } = self;

        if !services.contains::<Arc<dyn Startup>>() {
            return Err(HostBuildError::StartupNotConfigured);
        }
        services.add_singleton::<Arc<dyn EnvironmentProvider>>(environment);
        services.add_singleton_factory(move |provider| {
            let environment = provider.require::<Arc<dyn EnvironmentProvider>>()?;
            Ok::<_, ContainerError>(HostingEnvironment::new(
                environment.current_environment_label(),
                application_name.clone(),
            ))
        });

        let hosting_services = services.build();
        let startup: Arc<dyn Startup> = hosting_services
            .require::<Arc<dyn Startup>>()
            .map_err(HostBuildError::from_startup_factory)?
            .as_ref()
            .clone();
        let hosting_environment = hosting_services.require::<HostingEnvironment>()?;
        tracing::info!(
            environment = hosting_environment.environment_name(),
            application = hosting_environment.application_name(),
            "startup resolved"
        );

        let mut application = services;
        application.add_singleton(Arc::clone(&startup));
        application.add_shared(Arc::clone(&hosting_environment));
        let application_services = startup.configure_services(application)?;
        tracing::info!(
            services = application_services.len(),
            "application services configured"
        );

        let mut app = ApplicationBuilder::new(application_services.clone());
        startup.configure(&mut app)?;
        let pipeline = app.build();
        tracing::info!(middleware = pipeline.len(), "host built");

        Ok(Host::new(
            hosting_environment,
            hosting_services,
            application_services,
            startup,
            pipeline,
        ))
    }
}
