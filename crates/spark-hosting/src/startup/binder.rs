use std::{any::Any, fmt, sync::Arc};

use spark_container::{Resolver, Service, TypeKey};

use super::{
    BindingError, MethodHandle, ParameterAccess, ParameterInfo, ReturnValue, StartupError,
};

/// 调用方显式提供的实参，例如 `configure_services` 的服务集合或 `configure` 的管线构建器。
pub struct SuppliedArgument<'a> {
    key: TypeKey,
    value: &'a mut (dyn Any + 'static),
}

impl<'a> SuppliedArgument<'a> {
    pub fn new<T: Any>(value: &'a mut T) -> Self {
        Self {
            key: TypeKey::of::<T>(),
            value,
        }
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }
}

impl fmt::Debug for SuppliedArgument<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SuppliedArgument").field(&self.key).finish()
    }
}

enum SlotValue<'a> {
    Supplied(&'a mut (dyn Any + 'static)),
    Resolved(Service),
}

/// 已绑定的单个实参。
///
/// 调用器按形参顺序逐个取出槽位，再依声明形态调用 [`downcast_ref`](Self::downcast_ref)、
/// [`downcast_mut`](Self::downcast_mut) 或 [`shared`](Self::shared)。
pub struct ArgumentSlot<'a> {
    method: &'static str,
    parameter: ParameterInfo,
    value: SlotValue<'a>,
}

impl fmt::Debug for ArgumentSlot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgumentSlot")
            .field("method", &self.method)
            .field("parameter", &self.parameter)
            .field("supplied", &self.is_supplied())
            .finish()
    }
}

impl<'a> ArgumentSlot<'a> {
    pub fn parameter(&self) -> &ParameterInfo {
        &self.parameter
    }

    /// 实参是否来自调用方而非容器。
    pub fn is_supplied(&self) -> bool {
        matches!(self.value, SlotValue::Supplied(_))
    }

    /// 以 `&T` 读取实参，两种来源都支持。
    pub fn downcast_ref<T: Any>(&self) -> Result<&T, BindingError> {
        let value = match &self.value {
            SlotValue::Supplied(value) => (**value).downcast_ref::<T>(),
            SlotValue::Resolved(service) => service.downcast_ref::<T>(),
        };
        value.ok_or_else(|| self.type_mismatch::<T>())
    }

    /// 以 `&mut T` 读取实参，仅调用方提供的实参可用。
    pub fn downcast_mut<T: Any>(&mut self) -> Result<&mut T, BindingError> {
        let method = self.method;
        let parameter = self.parameter.name();
        match &mut self.value {
            SlotValue::Supplied(value) => {
                (**value)
                    .downcast_mut::<T>()
                    .ok_or(BindingError::TypeMismatch {
                        method,
                        parameter,
                        expected: std::any::type_name::<T>(),
                    })
            }
            SlotValue::Resolved(_) => Err(BindingError::AccessMismatch {
                method,
                parameter,
                requested: ParameterAccess::Exclusive.signature(),
            }),
        }
    }

    /// 以 `Arc<T>` 取出容器解析的实参。
    pub fn shared<T: Any + Send + Sync>(&self) -> Result<Arc<T>, BindingError> {
        match &self.value {
            SlotValue::Resolved(service) => Arc::clone(service)
                .downcast::<T>()
                .map_err(|_| self.type_mismatch::<T>()),
            SlotValue::Supplied(_) => Err(BindingError::AccessMismatch {
                method: self.method,
                parameter: self.parameter.name(),
                requested: ParameterAccess::Owned.signature(),
            }),
        }
    }

    fn type_mismatch<T>(&self) -> BindingError {
        BindingError::TypeMismatch {
            method: self.method,
            parameter: self.parameter.name(),
            expected: std::any::type_name::<T>(),
        }
    }
}

/// 一次调用的全部实参，顺序与形参一致。
pub struct BoundArguments<'a> {
    method: &'static str,
    slots: Vec<ArgumentSlot<'a>>,
}

impl fmt::Debug for BoundArguments<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundArguments")
            .field("method", &self.method)
            .field("slots", &self.slots)
            .finish()
    }
}

impl<'a> BoundArguments<'a> {
    pub fn method(&self) -> &'static str {
        self.method
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[ArgumentSlot<'a>] {
        &self.slots
    }

    pub fn into_slots(self) -> Vec<ArgumentSlot<'a>> {
        self.slots
    }

    /// 调用器取第 `index` 个槽位失败时使用的错误。
    pub fn missing(method: &'static str, index: usize) -> BindingError {
        BindingError::MissingArgument { method, index }
    }
}

/// `MethodBinder` 把形参列表绑定为实参并调用方法。
///
/// # 教案级注释
/// - **绑定规则 (How)**：逐个形参按顺序处理——
///   1. `&T` / `&mut T` 形参优先匹配类型键相同、尚未被占用的调用方实参；
///   2. 否则向 `resolver` 请求该类型；`&mut T` 无法由容器满足，直接失败；
///   3. 任一形参失败立即返回，后续形参不再尝试解析。
/// - **契约 (What)**：全部形参绑定成功之前不会触发任何调用，因此绑定失败不会留下半途的副作用；
///   多余的调用方实参被静默忽略。
#[derive(Clone, Copy, Debug, Default)]
pub struct MethodBinder;

impl MethodBinder {
    pub fn bind<'a>(
        method: &'static str,
        parameters: &[ParameterInfo],
        supplied: Vec<SuppliedArgument<'a>>,
        resolver: &dyn Resolver,
    ) -> Result<BoundArguments<'a>, BindingError> {
        let mut supplied: Vec<Option<SuppliedArgument<'a>>> =
            supplied.into_iter().map(Some).collect();
        let mut slots = Vec::with_capacity(parameters.len());

        for parameter in parameters {
            let value = match take_supplied(&mut supplied, parameter) {
                Some(argument) => SlotValue::Supplied(argument.value),
                None => SlotValue::Resolved(resolve(method, parameter, resolver)?),
            };
            slots.push(ArgumentSlot {
                method,
                parameter: *parameter,
                value,
            });
        }

        let unused = supplied.iter().flatten().count();
        if unused > 0 {
            tracing::debug!(method, unused, "supplied arguments left unbound");
        }
        Ok(BoundArguments { method, slots })
    }

    /// 绑定并调用 `handle` 指向的方法。
    pub fn invoke<S>(
        instance: &S,
        handle: &MethodHandle<S>,
        supplied: Vec<SuppliedArgument<'_>>,
        resolver: &dyn Resolver,
    ) -> Result<ReturnValue, StartupError> {
        let arguments = Self::bind(handle.name(), handle.parameters(), supplied, resolver)?;
        tracing::debug!(
            startup = handle.declaring_type(),
            method = handle.name(),
            arguments = arguments.len(),
            "invoking startup method"
        );
        handle.descriptor().call(instance, arguments)
    }
}

fn take_supplied<'a>(
    supplied: &mut [Option<SuppliedArgument<'a>>],
    parameter: &ParameterInfo,
) -> Option<SuppliedArgument<'a>> {
    if parameter.access() == ParameterAccess::Owned {
        return None;
    }
    supplied
        .iter_mut()
        .find(|slot| matches!(slot, Some(argument) if argument.key == parameter.ty()))
        .and_then(Option::take)
}

fn resolve(
    method: &'static str,
    parameter: &ParameterInfo,
    resolver: &dyn Resolver,
) -> Result<Service, BindingError> {
    if parameter.access() == ParameterAccess::Exclusive {
        return Err(BindingError::NotSupplied {
            method,
            parameter: parameter.name(),
            ty: parameter.ty(),
        });
    }
    match resolver.resolve(parameter.ty()) {
        Ok(Some(service)) => Ok(service),
        Ok(None) => Err(BindingError::Unresolved {
            method,
            parameter: parameter.name(),
            ty: parameter.ty(),
        }),
        Err(source) => Err(BindingError::Container {
            method,
            parameter: parameter.name(),
            ty: parameter.ty(),
            source,
        }),
    }
}
