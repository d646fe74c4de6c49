//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 启动解析分两段失败：解析阶段（方法找不到、重载歧义）与绑定阶段（参数无法注入）；
//! - 两段错误都必须原样传播到触发宿主构建的调用方，不重试、不吞掉。
//!
//! ## 设计要求（What）
//! - 错误信息需点名类型、方法与参数，便于集成方直接定位启动类上的问题；
//! - [`StartupError`] 是对外统一出口，内部细分为 [`ResolutionError`] 与 [`BindingError`]。

use std::error::Error as StdError;

use spark_container::{ContainerError, TypeKey};
use thiserror::Error;

/// 约定解析阶段的致命错误。
///
/// # 教案式说明
/// - **触发时机 (Where)**：单例工厂在宿主构建时执行 [`ConventionResolver`](super::ConventionResolver)，
///   或 `use_startup` 在登记前做形状检查；
/// - **契约 (What)**：`type_name` 总是启动类型的完整路径；`method` 为规范化展示名（如 `configure_production`）。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResolutionError {
    /// 必需的管线配置方法不存在。
    #[error(
        "a public method named `{}` could not be found in the `{type_name}` type",
        .tried.join("` or `")
    )]
    MissingPipelineMethod {
        type_name: &'static str,
        tried: Vec<String>,
    },

    /// 同名且形参列表完全相同的描述符重复出现，声明顺序也无法区分它们。
    #[error(
        "having multiple overloads of method `{method}` in the `{type_name}` type is not supported ({count} candidates)"
    )]
    AmbiguousOverload {
        type_name: &'static str,
        method: String,
        count: usize,
    },

    /// 名称匹配但返回类型不符合约定。
    #[error("the `{method}` method in the `{type_name}` type must return {expected}")]
    InvalidReturnType {
        type_name: &'static str,
        method: String,
        expected: &'static str,
    },
}

/// 方法参数绑定失败。
///
/// 绑定在任何调用发生前完成，因此这些错误出现时用户方法一定尚未执行。
#[derive(Debug, Error)]
pub enum BindingError {
    /// 既没有调用方提供的实参，容器也无法解析该类型。
    #[error("unable to resolve parameter `{parameter}` of type `{ty}` for method `{method}`")]
    Unresolved {
        method: &'static str,
        parameter: &'static str,
        ty: TypeKey,
    },

    /// `&mut T` 形参只能由调用方提供，容器中的共享服务无法满足独占借用。
    #[error(
        "parameter `{parameter}` of method `{method}` needs exclusive access to `{ty}` and must be supplied by the caller"
    )]
    NotSupplied {
        method: &'static str,
        parameter: &'static str,
        ty: TypeKey,
    },

    /// 容器在创建参数值时报错。
    #[error("resolving parameter `{parameter}` of type `{ty}` for method `{method}` failed")]
    Container {
        method: &'static str,
        parameter: &'static str,
        ty: TypeKey,
        #[source]
        source: ContainerError,
    },

    /// 槽位以不支持的形态被访问，例如把容器服务当作 `&mut T` 取出。
    #[error("parameter `{parameter}` of method `{method}` cannot be accessed as `{requested}`")]
    AccessMismatch {
        method: &'static str,
        parameter: &'static str,
        requested: &'static str,
    },

    /// 槽位里的值与声明的参数类型不一致，通常说明手写的方法表与实际签名不符。
    #[error("argument bound to parameter `{parameter}` of method `{method}` is not a `{expected}`")]
    TypeMismatch {
        method: &'static str,
        parameter: &'static str,
        expected: &'static str,
    },

    /// 调用器读取的实参个数超过了绑定结果。
    #[error("method `{method}` has no bound argument at position {index}")]
    MissingArgument { method: &'static str, index: usize },
}

/// 启动流程对外暴露的统一错误。
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Binding(#[from] BindingError),

    /// 读取宿主容器（如环境提供者）失败。
    #[error("startup could not read the hosting container")]
    Container(#[from] ContainerError),

    /// 用户的启动方法自身返回了错误。
    #[error("startup method `{method}` failed")]
    Method {
        method: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },

    /// 方法返回值与方法表登记的返回类型不一致。
    #[error("startup method `{method}` returned a value that is not a `{expected}`")]
    UnexpectedReturn {
        method: String,
        expected: &'static str,
    },
}

impl StartupError {
    /// 包装用户方法返回的错误。
    pub fn method<E>(method: impl Into<String>, error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        StartupError::Method {
            method: method.into(),
            source: error.into(),
        }
    }

    pub fn as_resolution(&self) -> Option<&ResolutionError> {
        match self {
            StartupError::Resolution(error) => Some(error),
            _ => None,
        }
    }

    pub fn as_binding(&self) -> Option<&BindingError> {
        match self {
            StartupError::Binding(error) => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ResolutionError;

    #[test]
    fn missing_method_lists_every_tried_name() {
        let error = ResolutionError::MissingPipelineMethod {
            type_name: "app::Startup",
            tried: vec!["configure_production".into(), "configure".into()],
        };
        assert_eq!(
            error.to_string(),
            "a public method named `configure_production` or `configure` could not be found in the `app::Startup` type"
        );
    }
}
