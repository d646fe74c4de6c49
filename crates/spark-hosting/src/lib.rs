#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = "spark-hosting: 宿主装配与约定式启动解析。"]
#![doc = ""]
#![doc = "集成方通过 [`HostBuilder`] 登记服务并用 `use_startup::<T>()` 指定启动类型："]
#![doc = "实现了 [`startup::Startup`] 的类型直接登记，只遵循命名约定的类型（通常标注 `#[startup]`）"]
#![doc = "在宿主构建时按环境标签解析 `configure_{env}_services` / `configure_{env}` 等方法。"]

extern crate self as spark_hosting;

pub mod builder;
pub mod environment;
mod extensions;
mod host;
pub mod pipeline;
pub mod settings;
pub mod startup;

pub use builder::{HostBuildError, HostBuilder, HostBuilderError};
pub use environment::{EnvironmentProvider, HostingEnvironment};
pub use extensions::StartupHostBuilderExt;
pub use host::Host;
pub use pipeline::{
    ApplicationBuilder, Middleware, MiddlewareRegistrationError, MiddlewareRegistry, Next,
    PipelineContext, PipelineError, RequestPipeline,
};
pub use settings::{HostSettings, SettingsError};
pub use spark_container as container;
pub use spark_macros::startup;
