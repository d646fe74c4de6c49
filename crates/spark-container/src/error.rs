//! # error 模块说明
//!
//! 容器层错误集中定义于此，调用方通过 [`ContainerError::downcast_factory_source`]
//! 取回工厂内部抛出的领域错误，避免在宿主层丢失原始语义。

use std::error::Error as StdError;

use thiserror::Error;

use crate::TypeKey;

/// 容器解析阶段的错误域。
#[derive(Debug, Error)]
pub enum ContainerError {
    /// 请求的类型从未登记。
    #[error("service `{service}` is not registered")]
    NotRegistered { service: TypeKey },

    /// 工厂在创建过程中再次请求了自身。
    #[error("circular dependency detected while creating `{service}`")]
    CircularDependency { service: TypeKey },

    /// 登记的值与请求类型不一致，通常意味着擦除注册时传入了错误的键。
    #[error("service `{service}` holds a value of an unexpected type")]
    TypeMismatch { service: TypeKey },

    /// 单例工厂返回错误。
    ///
    /// - **契约 (What)**：`source` 保留工厂原始错误，可经
    ///   [`downcast_factory_source`](Self::downcast_factory_source) 还原为具体类型。
    #[error("factory for service `{service}` failed")]
    Factory {
        service: TypeKey,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },
}

impl ContainerError {
    /// 出错的服务类型。
    pub fn service(&self) -> TypeKey {
        match self {
            ContainerError::NotRegistered { service }
            | ContainerError::CircularDependency { service }
            | ContainerError::TypeMismatch { service }
            | ContainerError::Factory { service, .. } => *service,
        }
    }

    /// 尝试把工厂错误还原为具体类型 `E`。
    ///
    /// 非 `Factory` 变体或类型不符时原样返回 `Err(self)`，调用方可继续按容器错误处理。
    pub fn downcast_factory_source<E>(self) -> Result<E, Self>
    where
        E: StdError + 'static,
    {
        match self {
            ContainerError::Factory { service, source } => match source.downcast::<E>() {
                Ok(inner) => Ok(*inner),
                Err(source) => Err(ContainerError::Factory { service, source }),
            },
            other => Err(other),
        }
    }
}
