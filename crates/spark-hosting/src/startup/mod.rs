//! # startup 模块说明
//!
//! ## 角色定位（Why）
//! - 允许集成方把任意类型交给宿主作为“启动类”，而不强制其实现固定接口；
//! - 已实现 [`Startup`] 的类型走直连路径，不做任何方法查找；
//! - 只遵循命名约定的类型由 [`ConventionResolver`] 挑选方法、[`MethodBinder`] 注入参数，
//!   再由 [`ConventionBasedStartup`] 适配为统一契约。
//!
//! ## 组成（Where）
//! - `method`：方法表与形参/返回类型元数据；
//! - `resolver`：按环境标签挑选 `configure_services` / `configure`；
//! - `binder`：逐个形参绑定实参并调用；
//! - `convention`：约定式启动类的适配器；
//! - `registration`：直连/约定两种登记变体以及单例工厂。
//!
//! ## 契约（What）
//! - 每个容器至多存在一个启动单例；
//! - 同一 (启动类型, 环境标签) 总得到同一组方法；
//! - 解析或绑定失败都会原样传播给触发宿主构建的调用方。

mod binder;
mod convention;
mod error;
mod method;
mod registration;
mod resolver;

use spark_container::{ServiceCollection, ServiceProvider};

use crate::pipeline::ApplicationBuilder;

pub use binder::{ArgumentSlot, BoundArguments, MethodBinder, SuppliedArgument};
pub use convention::{ConventionBasedStartup, StartupState};
pub use error::{BindingError, ResolutionError, StartupError};
pub use method::{
    MethodDescriptor, MethodHandle, MethodTable, ParameterAccess, ParameterInfo, ReturnKind,
    ReturnValue, normalize_name,
};
pub use registration::{StartupKind, StartupRegistrationStrategy, StartupType};
pub use resolver::{ConventionResolver, StartupMethods};

/// 宿主最终调用的统一启动契约。
///
/// # 教案级注释
/// - **调用顺序 (What)**：宿主先调用一次 `configure_services`，再调用一次 `configure`；
///   实现方无需自行防御乱序调用；
/// - **所有权 (How)**：`configure_services` 接管服务集合并返回冻结后的应用容器；
///   `configure` 只借用管线构建器。
pub trait Startup: Send + Sync + 'static {
    fn configure_services(&self, services: ServiceCollection)
    -> Result<ServiceProvider, StartupError>;

    fn configure(&self, app: &mut ApplicationBuilder) -> Result<(), StartupError>;
}

/// 由宿主容器创建启动实例。
///
/// 实现了 `Default` 的类型自动获得该能力；需要构造注入时使用 `#[startup(constructor = new)]`。
pub trait Activate: Send + Sync + 'static {
    fn activate(services: &ServiceProvider) -> Result<Self, StartupError>
    where
        Self: Sized;
}

impl<T> Activate for T
where
    T: Default + Send + Sync + 'static,
{
    fn activate(_services: &ServiceProvider) -> Result<Self, StartupError> {
        Ok(T::default())
    }
}

/// 只遵循命名约定的启动类型，通过方法表暴露自身的方法集合。
///
/// 通常由 `#[startup]` 宏实现。
pub trait ConventionStartup: Activate {
    fn methods() -> MethodTable<Self>
    where
        Self: Sized;
}

/// 可交给 `use_startup::<T>()` 的类型。
///
/// 实现了 [`Startup`] 的类型自动走直连变体；`#[startup]` 为约定式类型生成约定变体。
/// 同一类型若两种形态兼备，直连变体生效。
pub trait StartupSource: 'static {
    fn startup_type() -> StartupType
    where
        Self: Sized;
}

impl<T> StartupSource for T
where
    T: Startup + Activate,
{
    fn startup_type() -> StartupType {
        StartupType::direct::<T>()
    }
}
