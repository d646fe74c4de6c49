#![deny(unsafe_code)]
#![doc = "spark-container: 为 Spark 宿主提供按类型索引的最小依赖注入容器。"]
#![doc = ""]
#![doc = "容器只覆盖宿主装配所需的三件事：按类型登记实例或单例工厂、构建只读的 [`ServiceProvider`]、"]
#![doc = "以及通过 [`Resolver`] 能力把类型解析为值。生命周期作用域、构造函数自动推导等完整 IoC 能力不在本 crate 范围内。"]

mod collection;
mod error;
mod key;
mod provider;

pub use collection::{Implementation, ServiceCollection, ServiceDescriptor, ServiceFactoryFn};
pub use error::ContainerError;
pub use key::TypeKey;
pub use provider::{EmptyResolver, Resolver, ServiceProvider, WeakServiceProvider};

/// 容器中保存的类型擦除服务值。
///
/// 注册类型 `T` 时存放的是 `Arc<T>` 擦除后的形态，解析端再通过 [`TypeKey`] 对应的 `T` 向下转型。
pub type Service = std::sync::Arc<dyn std::any::Any + Send + Sync>;
