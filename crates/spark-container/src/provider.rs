use std::{
    cell::RefCell,
    collections::HashMap,
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::{Mutex, ReentrantMutex};

use crate::{ContainerError, Implementation, Service, ServiceDescriptor, TypeKey};

/// 把类型解析为值的能力。
///
/// # 教案级注释
/// - **意图 (Why)**：方法绑定器只需要“按类型取值”这一窄接口，不关心背后是完整容器还是测试桩；
/// - **契约 (What)**：
///   - `Ok(Some(_))`：解析成功，值的实际类型与 `key` 对应；
///   - `Ok(None)`：该类型未登记，调用方自行决定是否视为错误；
///   - `Err(_)`：已登记但创建失败（工厂报错、循环依赖等）。
pub trait Resolver {
    fn resolve(&self, key: TypeKey) -> Result<Option<Service>, ContainerError>;
}

impl<R: Resolver + ?Sized> Resolver for &R {
    fn resolve(&self, key: TypeKey) -> Result<Option<Service>, ContainerError> {
        (**self).resolve(key)
    }
}

/// 永远解析不到任何值的解析器。
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyResolver;

impl Resolver for EmptyResolver {
    fn resolve(&self, _key: TypeKey) -> Result<Option<Service>, ContainerError> {
        Ok(None)
    }
}

/// `ServiceProvider` 是冻结后的容器，即宿主文档中的 "container descriptor"。
///
/// # 教案级注释
/// - **设计要点 (How)**
///   - 内部以 `Arc` 共享，克隆只增加引用计数；
///   - 每个单例条目持有一把 `parking_lot::Mutex`，只在读写缓存槽时短暂持有；
///   - 单例创建由容器级的 `parking_lot::ReentrantMutex` 串行化：同一线程内的嵌套解析可重入，
///     不同线程的首访排队执行，互相依赖的单例不会因各自持锁而死等；
///   - 线程局部的创建栈用于发现同一线程内的循环依赖。
/// - **契约 (What)**
///   - 单例工厂在每个容器内至多成功执行一次；失败不会缓存，下次解析会重试；
///   - 容器本身不可变，新增注册需回到 [`ServiceCollection`](crate::ServiceCollection) 重新构建。
#[derive(Clone)]
pub struct ServiceProvider {
    inner: Arc<ProviderInner>,
}

struct ProviderInner {
    entries: HashMap<TypeKey, Entry>,
    creation: ReentrantMutex<()>,
}

struct Entry {
    implementation: Implementation,
    instance: Mutex<Option<Service>>,
}

impl fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.inner.entries.keys().map(|k| k.name()).collect();
        names.sort_unstable();
        f.debug_struct("ServiceProvider")
            .field("services", &names)
            .finish()
    }
}

impl ServiceProvider {
    pub(crate) fn from_descriptors(descriptors: impl Iterator<Item = ServiceDescriptor>) -> Self {
        let entries = descriptors
            .map(|descriptor| {
                let (key, implementation) = descriptor.into_parts();
                (
                    key,
                    Entry {
                        implementation,
                        instance: Mutex::new(None),
                    },
                )
            })
            .collect();
        Self {
            inner: Arc::new(ProviderInner {
                entries,
                creation: ReentrantMutex::new(()),
            }),
        }
    }

    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.inner.entries.contains_key(&TypeKey::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// 按类型键解析擦除后的服务值，未登记时返回 [`ContainerError::NotRegistered`]。
    pub fn resolve_key(&self, key: TypeKey) -> Result<Service, ContainerError> {
        match self.inner.entries.get(&key) {
            Some(entry) => self.resolve_entry(key, entry),
            None => Err(ContainerError::NotRegistered { service: key }),
        }
    }

    /// 解析 `T`，未登记时返回 `Ok(None)`。
    pub fn get<T>(&self) -> Result<Option<Arc<T>>, ContainerError>
    where
        T: Send + Sync + 'static,
    {
        let key = TypeKey::of::<T>();
        match self.resolve(key)? {
            Some(service) => downcast(key, service).map(Some),
            None => Ok(None),
        }
    }

    /// 解析必需的服务 `T`。
    pub fn require<T>(&self) -> Result<Arc<T>, ContainerError>
    where
        T: Send + Sync + 'static,
    {
        let key = TypeKey::of::<T>();
        let service = self.resolve_key(key)?;
        downcast(key, service)
    }

    /// 获取不延长容器寿命的弱引用。
    ///
    /// 被容器缓存的单例若需要回访容器，应持有弱引用，否则会与容器形成引用环。
    pub fn downgrade(&self) -> WeakServiceProvider {
        WeakServiceProvider {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// 两个句柄是否指向同一个容器。
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn resolve_entry(&self, key: TypeKey, entry: &Entry) -> Result<Service, ContainerError> {
        let factory = match &entry.implementation {
            Implementation::Instance(service) => return Ok(Arc::clone(service)),
            Implementation::Singleton(factory) => factory,
        };

        let _guard = CreationGuard::enter(self.identity(), key)?;
        if let Some(service) = entry.instance.lock().as_ref() {
            return Ok(Arc::clone(service));
        }

        let _creation = self.inner.creation.lock();
        if let Some(service) = entry.instance.lock().as_ref() {
            return Ok(Arc::clone(service));
        }
        tracing::debug!(service = key.name(), "creating singleton service");
        let created = factory(self)?;
        *entry.instance.lock() = Some(Arc::clone(&created));
        Ok(created)
    }

    fn identity(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }
}

impl Resolver for ServiceProvider {
    fn resolve(&self, key: TypeKey) -> Result<Option<Service>, ContainerError> {
        match self.inner.entries.get(&key) {
            Some(entry) => self.resolve_entry(key, entry).map(Some),
            None => Ok(None),
        }
    }
}

/// [`ServiceProvider`] 的弱引用句柄。
#[derive(Clone, Debug, Default)]
pub struct WeakServiceProvider {
    inner: Weak<ProviderInner>,
}

impl WeakServiceProvider {
    /// 容器仍存活时返回强引用。
    pub fn upgrade(&self) -> Option<ServiceProvider> {
        self.inner.upgrade().map(|inner| ServiceProvider { inner })
    }
}

fn downcast<T>(key: TypeKey, service: Service) -> Result<Arc<T>, ContainerError>
where
    T: Send + Sync + 'static,
{
    service
        .downcast::<T>()
        .map_err(|_| ContainerError::TypeMismatch { service: key })
}

thread_local! {
    static CREATING: RefCell<Vec<(usize, TypeKey)>> = const { RefCell::new(Vec::new()) };
}

/// 线程局部创建栈上的一帧，离开作用域时自动出栈。
struct CreationGuard {
    frame: (usize, TypeKey),
}

impl CreationGuard {
    fn enter(provider: usize, key: TypeKey) -> Result<Self, ContainerError> {
        let frame = (provider, key);
        CREATING.with_borrow_mut(|stack| {
            if stack.contains(&frame) {
                return Err(ContainerError::CircularDependency { service: key });
            }
            stack.push(frame);
            Ok(Self { frame })
        })
    }
}

impl Drop for CreationGuard {
    fn drop(&mut self) {
        CREATING.with_borrow_mut(|stack| {
            if let Some(position) = stack.iter().rposition(|frame| *frame == self.frame) {
                stack.remove(position);
            }
        });
    }
}
