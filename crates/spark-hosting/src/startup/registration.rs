use std::{fmt, sync::Arc};

use spark_container::{ServiceCollection, ServiceProvider, TypeKey};

use super::{
    Activate, ConventionBasedStartup, ConventionResolver, ConventionStartup, ResolutionError,
    Startup, StartupError, StartupSource,
};
use crate::environment::{EnvironmentProvider, HostingEnvironment};

type DirectActivator = fn(&ServiceProvider) -> Result<Arc<dyn Startup>, StartupError>;
type ConventionActivator = fn(&ServiceProvider, &str) -> Result<Arc<dyn Startup>, StartupError>;

/// 启动类型的两种登记变体。
#[derive(Clone, Copy)]
pub enum StartupKind {
    /// 类型自身实现了 [`Startup`]，直接激活，不做任何方法查找。
    Direct { activate: DirectActivator },
    /// 类型只遵循命名约定，需要在工厂内解析方法后包装为 [`ConventionBasedStartup`]。
    Convention {
        activate: ConventionActivator,
        has_pipeline_candidate: fn() -> bool,
    },
}

impl fmt::Debug for StartupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupKind::Direct { .. } => f.write_str("Direct"),
            StartupKind::Convention { .. } => f.write_str("Convention"),
        }
    }
}

/// 集成方交给宿主的启动类型描述。
#[derive(Clone, Copy, Debug)]
pub struct StartupType {
    key: TypeKey,
    kind: StartupKind,
}

impl StartupType {
    pub fn direct<T>() -> Self
    where
        T: Startup + Activate,
    {
        Self {
            key: TypeKey::of::<T>(),
            kind: StartupKind::Direct {
                activate: activate_direct::<T>,
            },
        }
    }

    pub fn convention<T>() -> Self
    where
        T: ConventionStartup,
    {
        Self {
            key: TypeKey::of::<T>(),
            kind: StartupKind::Convention {
                activate: activate_convention::<T>,
                has_pipeline_candidate: has_pipeline_candidate::<T>,
            },
        }
    }

    /// 按 [`StartupSource`] 选择变体。
    pub fn of<T: StartupSource>() -> Self {
        T::startup_type()
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn type_name(&self) -> &'static str {
        self.key.name()
    }

    pub fn kind(&self) -> StartupKind {
        self.kind
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.kind, StartupKind::Direct { .. })
    }
}

fn activate_direct<T>(services: &ServiceProvider) -> Result<Arc<dyn Startup>, StartupError>
where
    T: Startup + Activate,
{
    Ok(Arc::new(T::activate(services)?))
}

fn activate_convention<T>(
    services: &ServiceProvider,
    environment: &str,
) -> Result<Arc<dyn Startup>, StartupError>
where
    T: ConventionStartup,
{
    let table = T::methods();
    let methods = ConventionResolver::resolve(&table, environment)?;
    let instance = T::activate(services)?;
    Ok(Arc::new(ConventionBasedStartup::new(
        instance,
        methods,
        services.downgrade(),
    )))
}

fn has_pipeline_candidate<T: ConventionStartup>() -> bool {
    T::methods().has_pipeline_candidate()
}

/// `StartupRegistrationStrategy` 把启动类型登记为宿主容器中唯一的 `Arc<dyn Startup>` 单例。
///
/// # 教案级注释
/// - **决策 (How)**
///   - 直连变体：工厂只激活实例；
///   - 约定变体：工厂在被调用时才读取环境标签，先解析方法再激活实例，
///     解析失败时用户代码一行都不会执行；
/// - **覆盖语义 (What)**：所有登记共用同一个服务键，后登记者覆盖先登记者；
/// - **早期检查 (What)**：约定类型若连一个可能的管线配置方法都没有，登记即失败，
///   无需等到容器构建。
#[derive(Clone, Copy, Debug, Default)]
pub struct StartupRegistrationStrategy;

impl StartupRegistrationStrategy {
    /// 登记前的形状检查，与环境标签无关。
    pub fn validate(startup: &StartupType) -> Result<(), ResolutionError> {
        match startup.kind {
            StartupKind::Direct { .. } => Ok(()),
            StartupKind::Convention {
                has_pipeline_candidate,
                ..
            } => {
                if has_pipeline_candidate() {
                    Ok(())
                } else {
                    Err(ResolutionError::MissingPipelineMethod {
                        type_name: startup.type_name(),
                        tried: vec!["configure_{environment}".into(), "configure".into()],
                    })
                }
            }
        }
    }

    pub fn register(
        services: &mut ServiceCollection,
        startup: &StartupType,
    ) -> Result<(), ResolutionError> {
        Self::validate(startup)?;
        let type_name = startup.type_name();
        match startup.kind {
            StartupKind::Direct { activate } => {
                tracing::debug!(startup = type_name, "registering direct startup");
                services.add_singleton_factory(move |provider| activate(provider));
            }
            StartupKind::Convention { activate, .. } => {
                tracing::debug!(startup = type_name, "registering convention startup factory");
                services.add_singleton_factory(move |provider| {
                    let environment = current_environment(provider)?;
                    activate(provider, &environment)
                });
            }
        }
        Ok(())
    }
}

/// 优先取宿主容器里的 [`HostingEnvironment`]，使启动解析与注入的环境对象看到同一个标签；
/// 只登记了提供者时退回直接读取提供者。
fn current_environment(services: &ServiceProvider) -> Result<String, StartupError> {
    if let Some(environment) = services.get::<HostingEnvironment>()? {
        return Ok(environment.environment_name().to_owned());
    }
    let label = services
        .get::<Arc<dyn EnvironmentProvider>>()?
        .map(|provider| provider.current_environment_label())
        .unwrap_or_default();
    Ok(label)
}
