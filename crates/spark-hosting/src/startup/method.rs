use std::{any::Any, fmt, sync::Arc};

use spark_container::TypeKey;

use super::{BoundArguments, StartupError};

/// 形参的借用形态，决定实参从哪里来。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParameterAccess {
    /// `&T`：调用方提供或容器解析均可。
    Shared,
    /// `&mut T`：只能由调用方提供。
    Exclusive,
    /// `Arc<T>`：只能由容器解析。
    Owned,
}

impl ParameterAccess {
    /// 形态对应的签名写法，用于错误信息。
    pub fn signature(&self) -> &'static str {
        match self {
            ParameterAccess::Shared => "&T",
            ParameterAccess::Exclusive => "&mut T",
            ParameterAccess::Owned => "Arc<T>",
        }
    }
}

/// 单个形参的元数据。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParameterInfo {
    name: &'static str,
    ty: TypeKey,
    access: ParameterAccess,
}

impl ParameterInfo {
    /// `name: &T`
    pub fn shared<T: 'static>(name: &'static str) -> Self {
        Self::new(name, TypeKey::of::<T>(), ParameterAccess::Shared)
    }

    /// `name: &mut T`
    pub fn exclusive<T: 'static>(name: &'static str) -> Self {
        Self::new(name, TypeKey::of::<T>(), ParameterAccess::Exclusive)
    }

    /// `name: Arc<T>`
    pub fn owned<T: 'static>(name: &'static str) -> Self {
        Self::new(name, TypeKey::of::<T>(), ParameterAccess::Owned)
    }

    pub fn new(name: &'static str, ty: TypeKey, access: ParameterAccess) -> Self {
        Self { name, ty, access }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 形参指向的值类型；`&T`、`&mut T` 与 `Arc<T>` 都记录为 `T`。
    pub fn ty(&self) -> TypeKey {
        self.ty
    }

    pub fn access(&self) -> ParameterAccess {
        self.access
    }
}

/// 方法声明的返回类型。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReturnKind {
    Unit,
    Value(TypeKey),
}

impl ReturnKind {
    pub fn value<T: 'static>() -> Self {
        ReturnKind::Value(TypeKey::of::<T>())
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, ReturnKind::Unit)
    }

    /// 返回类型是否恰为 `T`。
    pub fn is<T: 'static>(&self) -> bool {
        matches!(self, ReturnKind::Value(key) if key.is::<T>())
    }
}

/// 调用器产出的返回值。
pub enum ReturnValue {
    Unit,
    Value(Box<dyn Any + Send>),
}

impl ReturnValue {
    pub fn value<T: Any + Send>(value: T) -> Self {
        ReturnValue::Value(Box::new(value))
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, ReturnValue::Unit)
    }
}

impl fmt::Debug for ReturnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnValue::Unit => f.write_str("ReturnValue::Unit"),
            ReturnValue::Value(_) => f.write_str("ReturnValue::Value(..)"),
        }
    }
}

type Invoker<S> =
    Arc<dyn Fn(&S, BoundArguments<'_>) -> Result<ReturnValue, StartupError> + Send + Sync>;

/// 启动类型上一个可被约定发现的方法。
///
/// # 教案级注释
/// - **意图 (Why)**：Rust 没有运行期反射，启动类型通过方法表显式声明“有哪些方法、各自的形参与返回类型、
///   以及如何在绑定好的实参上调用它”，解析器与绑定器只和这张表打交道；
/// - **来源 (Where)**：通常由 `#[startup]` 宏在编译期生成，也可以手写；
/// - **契约 (What)**：
///   - 名称在构造时即规范化（仅保留 ASCII 字母数字并转小写），后续匹配不再重复计算；
///   - 调用器拿到的 [`BoundArguments`] 与 `parameters` 一一对应、顺序一致；
///   - 描述符一经构造不可变，克隆只复制 `Arc`。
pub struct MethodDescriptor<S> {
    name: &'static str,
    normalized: String,
    parameters: Vec<ParameterInfo>,
    returns: ReturnKind,
    invoker: Invoker<S>,
}

impl<S> Clone for MethodDescriptor<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            normalized: self.normalized.clone(),
            parameters: self.parameters.clone(),
            returns: self.returns,
            invoker: Arc::clone(&self.invoker),
        }
    }
}

impl<S> fmt::Debug for MethodDescriptor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("returns", &self.returns)
            .finish()
    }
}

impl<S: 'static> MethodDescriptor<S> {
    pub fn new<F>(
        name: &'static str,
        parameters: Vec<ParameterInfo>,
        returns: ReturnKind,
        invoker: F,
    ) -> Self
    where
        F: Fn(&S, BoundArguments<'_>) -> Result<ReturnValue, StartupError> + Send + Sync + 'static,
    {
        Self {
            name,
            normalized: normalize_name(name),
            parameters,
            returns,
            invoker: Arc::new(invoker),
        }
    }
}

impl<S> MethodDescriptor<S> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn normalized_name(&self) -> &str {
        &self.normalized
    }

    pub fn parameters(&self) -> &[ParameterInfo] {
        &self.parameters
    }

    pub fn returns(&self) -> ReturnKind {
        self.returns
    }

    pub(crate) fn call(
        &self,
        instance: &S,
        arguments: BoundArguments<'_>,
    ) -> Result<ReturnValue, StartupError> {
        (self.invoker)(instance, arguments)
    }
}

/// 启动类型的方法集合，按声明顺序保存。
pub struct MethodTable<S> {
    type_name: &'static str,
    methods: Vec<MethodDescriptor<S>>,
}

impl<S> Clone for MethodTable<S> {
    fn clone(&self) -> Self {
        Self {
            type_name: self.type_name,
            methods: self.methods.clone(),
        }
    }
}

impl<S> fmt::Debug for MethodTable<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.methods.iter().map(|m| m.name).collect();
        f.debug_struct("MethodTable")
            .field("type_name", &self.type_name)
            .field("methods", &names)
            .finish()
    }
}

impl<S: 'static> Default for MethodTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: 'static> MethodTable<S> {
    pub fn new() -> Self {
        Self {
            type_name: std::any::type_name::<S>(),
            methods: Vec::new(),
        }
    }
}

impl<S> MethodTable<S> {
    /// 追加一个方法，保持声明顺序。
    pub fn with(mut self, method: MethodDescriptor<S>) -> Self {
        self.push(method);
        self
    }

    pub fn push(&mut self, method: MethodDescriptor<S>) {
        self.methods.push(method);
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn methods(&self) -> &[MethodDescriptor<S>] {
        &self.methods
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// 按规范化名称列出同名方法。
    pub(crate) fn named(&self, normalized: &str) -> Vec<&MethodDescriptor<S>> {
        self.methods
            .iter()
            .filter(|method| method.normalized == normalized)
            .collect()
    }

    /// 是否存在任何可能充当管线配置方法的成员：`configure` 或 `configure{X}`，但不是服务配置方法。
    pub fn has_pipeline_candidate(&self) -> bool {
        self.methods.iter().any(|method| {
            let name = method.normalized.as_str();
            name.starts_with(CONFIGURE) && !name.ends_with(SERVICES_SUFFIX)
        })
    }
}

/// 解析结果：绑定到具体声明类型的方法。
pub struct MethodHandle<S> {
    declaring_type: &'static str,
    descriptor: MethodDescriptor<S>,
}

impl<S> Clone for MethodHandle<S> {
    fn clone(&self) -> Self {
        Self {
            declaring_type: self.declaring_type,
            descriptor: self.descriptor.clone(),
        }
    }
}

impl<S> fmt::Debug for MethodHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodHandle")
            .field("declaring_type", &self.declaring_type)
            .field("name", &self.descriptor.name)
            .field("parameters", &self.descriptor.parameters)
            .field("returns", &self.descriptor.returns)
            .finish()
    }
}

impl<S> MethodHandle<S> {
    pub(crate) fn new(declaring_type: &'static str, descriptor: MethodDescriptor<S>) -> Self {
        Self {
            declaring_type,
            descriptor,
        }
    }

    pub fn declaring_type(&self) -> &'static str {
        self.declaring_type
    }

    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    pub fn parameters(&self) -> &[ParameterInfo] {
        &self.descriptor.parameters
    }

    pub fn returns(&self) -> ReturnKind {
        self.descriptor.returns
    }

    pub fn descriptor(&self) -> &MethodDescriptor<S> {
        &self.descriptor
    }
}

pub(crate) const CONFIGURE: &str = "configure";
pub(crate) const SERVICES_SUFFIX: &str = "services";

/// 规范化方法名或环境标签：只保留 ASCII 字母数字并转为小写。
///
/// `configure_production_services`、`ConfigureProductionServices` 与
/// `"configure" + "Production" + "services"` 会得到同一个结果。
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{MethodDescriptor, MethodTable, ReturnKind, ReturnValue, normalize_name};

    struct Sample;

    fn unit(name: &'static str) -> MethodDescriptor<Sample> {
        MethodDescriptor::new(name, Vec::new(), ReturnKind::Unit, |_: &Sample, _| {
            Ok(ReturnValue::Unit)
        })
    }

    #[test]
    fn normalization_aligns_naming_styles() {
        assert_eq!(normalize_name("configure_production_services"), "configureproductionservices");
        assert_eq!(normalize_name("ConfigureProductionServices"), "configureproductionservices");
        assert_eq!(normalize_name("Staging-EU"), "stagingeu");
        assert_eq!(normalize_name("生产"), "");
    }

    #[test]
    fn pipeline_candidates_exclude_services_methods() {
        let services_only = MethodTable::<Sample>::new().with(unit("configure_services"));
        assert!(!services_only.has_pipeline_candidate());

        let qualified = MethodTable::<Sample>::new()
            .with(unit("configure_services"))
            .with(unit("configure_staging"));
        assert!(qualified.has_pipeline_candidate());
        assert_eq!(qualified.len(), 2);
        assert!(qualified.type_name().ends_with("Sample"));
    }
}
