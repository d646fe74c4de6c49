use std::{error::Error as StdError, fmt, sync::Arc};

use crate::{ContainerError, Service, ServiceProvider, TypeKey};

/// 单例工厂的擦除形态：接收正在构建的容器，返回擦除后的服务值。
pub type ServiceFactoryFn =
    Arc<dyn Fn(&ServiceProvider) -> Result<Service, ContainerError> + Send + Sync + 'static>;

/// 服务注册项的两种形态。
#[derive(Clone)]
pub enum Implementation {
    /// 注册时即已存在的实例。
    Instance(Service),
    /// 首次解析时执行、之后缓存的单例工厂。
    Singleton(ServiceFactoryFn),
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Implementation::Instance(_) => f.write_str("Implementation::Instance"),
            Implementation::Singleton(_) => f.write_str("Implementation::Singleton"),
        }
    }
}

/// 单条注册：服务类型键与其实现。
#[derive(Clone, Debug)]
pub struct ServiceDescriptor {
    key: TypeKey,
    implementation: Implementation,
}

impl ServiceDescriptor {
    pub fn new(key: TypeKey, implementation: Implementation) -> Self {
        Self {
            key,
            implementation,
        }
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn implementation(&self) -> &Implementation {
        &self.implementation
    }

    pub(crate) fn into_parts(self) -> (TypeKey, Implementation) {
        (self.key, self.implementation)
    }
}

/// `ServiceCollection` 是容器的构建期形态，即宿主文档中的 "container builder"。
///
/// # 教案级注释
/// - **意图 (Why)**
///   - 宿主在启动阶段把所有服务登记为描述符，直到 [`build`](Self::build) 时才冻结为只读的
///     [`ServiceProvider`]；
///   - 启动类的 `configure_services` 会拿到同一个集合继续追加注册。
/// - **契约 (What)**
///   - 每个类型键至多保留一条注册；重复登记时后写者胜出，旧注册被静默替换；
///   - 遍历顺序等于当前有效注册的登记顺序，便于调试输出保持稳定；
///   - 集合可廉价克隆：实例与工厂均以 `Arc` 共享。
/// - **风险提示 (Trade-offs)**
///   - 同一描述符被克隆进多个容器后，各容器各自缓存单例，工厂会在每个容器中分别执行一次。
#[derive(Clone, Default)]
pub struct ServiceCollection {
    descriptors: Vec<ServiceDescriptor>,
}

impl fmt::Debug for ServiceCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.descriptors.iter().map(|d| d.key.name()).collect();
        f.debug_struct("ServiceCollection")
            .field("services", &names)
            .finish()
    }
}

impl ServiceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一条描述符，同键的旧注册会被替换。
    pub fn add(&mut self, descriptor: ServiceDescriptor) -> &mut Self {
        if let Some(position) = self.position(descriptor.key) {
            let replaced = self.descriptors.remove(position);
            tracing::debug!(
                service = replaced.key.name(),
                "replacing existing service registration"
            );
        }
        self.descriptors.push(descriptor);
        self
    }

    /// 以现成实例登记单例服务 `T`。
    pub fn add_singleton<T>(&mut self, value: T) -> &mut Self
    where
        T: Send + Sync + 'static,
    {
        self.add_shared(Arc::new(value))
    }

    /// 以已共享的实例登记单例服务 `T`，解析结果与传入的 `Arc` 指向同一对象。
    pub fn add_shared<T>(&mut self, value: Arc<T>) -> &mut Self
    where
        T: Send + Sync + 'static,
    {
        self.add(ServiceDescriptor::new(
            TypeKey::of::<T>(),
            Implementation::Instance(value),
        ))
    }

    /// 登记惰性单例工厂。
    ///
    /// # 教案级注释
    /// - **执行时机 (How)**：工厂在容器首次解析 `T` 时执行一次，结果被缓存；
    /// - **错误契约 (What)**：工厂错误被包装为 [`ContainerError::Factory`]，原始错误保存在 `source` 中，
    ///   调用方可经 [`ContainerError::downcast_factory_source`] 取回；
    /// - **前置条件**：工厂内部可以继续解析其他服务，但不得直接或间接请求 `T` 自身。
    pub fn add_singleton_factory<T, E, F>(&mut self, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
        F: Fn(&ServiceProvider) -> Result<T, E> + Send + Sync + 'static,
    {
        let service = TypeKey::of::<T>();
        let erased: ServiceFactoryFn = Arc::new(move |provider: &ServiceProvider| {
            factory(provider)
                .map(|value| Arc::new(value) as Service)
                .map_err(|error| ContainerError::Factory {
                    service,
                    source: error.into(),
                })
        });
        self.add(ServiceDescriptor::new(
            service,
            Implementation::Singleton(erased),
        ))
    }

    /// 移除 `T` 的注册并返回被移除的描述符。
    pub fn remove<T: ?Sized + 'static>(&mut self) -> Option<ServiceDescriptor> {
        let position = self.position(TypeKey::of::<T>())?;
        Some(self.descriptors.remove(position))
    }

    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.contains_key(TypeKey::of::<T>())
    }

    pub fn contains_key(&self, key: TypeKey) -> bool {
        self.position(key).is_some()
    }

    pub fn get(&self, key: TypeKey) -> Option<&ServiceDescriptor> {
        self.descriptors.iter().find(|d| d.key == key)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.descriptors.iter()
    }

    /// 冻结当前注册，生成只读容器。
    ///
    /// 集合本身保持可用，之后的修改不会影响已构建的容器。
    pub fn build(&self) -> ServiceProvider {
        ServiceProvider::from_descriptors(self.descriptors.iter().cloned())
    }

    fn position(&self, key: TypeKey) -> Option<usize> {
        self.descriptors.iter().position(|d| d.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::ServiceCollection;
    use crate::ContainerError;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };
    use tracing_test::traced_test;

    #[derive(Debug, PartialEq)]
    struct Greeting(&'static str);

    #[test]
    #[traced_test]
    fn last_registration_wins() {
        let mut services = ServiceCollection::new();
        services.add_singleton(Greeting("first"));
        services.add_singleton(7_u32);
        services.add_singleton(Greeting("second"));

        assert_eq!(services.len(), 2);
        let provider = services.build();
        let greeting = provider.require::<Greeting>().expect("应能解析 Greeting");
        assert_eq!(*greeting, Greeting("second"));
        assert!(logs_contain("replacing existing service registration"));
    }

    #[test]
    fn singleton_factory_runs_once_per_provider() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut services = ServiceCollection::new();
        services.add_singleton_factory(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ContainerError>(Greeting("lazy"))
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let provider = services.build();
        let a = provider.require::<Greeting>().expect("首次解析应成功");
        let b = provider.require::<Greeting>().expect("再次解析应命中缓存");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn builds_are_isolated_from_later_changes() {
        let mut services = ServiceCollection::new();
        services.add_singleton(1_u8);
        let provider = services.build();
        services.add_singleton(Greeting("late"));

        assert!(!provider.contains::<Greeting>());
        assert!(services.remove::<Greeting>().is_some());
        assert!(!services.contains::<Greeting>());
    }
}
