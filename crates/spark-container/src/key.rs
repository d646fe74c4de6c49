use std::{
    any::TypeId,
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

/// `TypeKey` 是容器与方法绑定器共用的类型标识。
///
/// # 教案级注释
/// - **意图 (Why)**：`TypeId` 足以判等却无法打印，排障时需要在错误信息中带出可读的类型名；
/// - **契约 (What)**：相等、哈希与排序只依据 `TypeId`，`name` 仅用于展示；
/// - **风险提示**：`std::any::type_name` 的输出格式不受稳定性保证，禁止据此做逻辑判断。
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// 构造类型 `T` 的标识。
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// 类型的完整路径名，例如 `spark_container::ServiceProvider`。
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 判断当前标识是否对应类型 `T`。
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for TypeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeKey").field(&self.name).finish()
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::TypeKey;

    #[test]
    fn equality_ignores_display_name() {
        let a = TypeKey::of::<String>();
        let b = TypeKey::of::<String>();
        assert_eq!(a, b);
        assert_ne!(a, TypeKey::of::<u32>());
        assert!(a.is::<String>());
        assert_eq!(a.to_string(), "alloc::string::String");
    }
}
