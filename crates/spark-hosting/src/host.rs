use std::{fmt, sync::Arc};

use spark_container::ServiceProvider;

use crate::{
    environment::HostingEnvironment,
    pipeline::{PipelineContext, PipelineError, RequestPipeline},
    startup::Startup,
};

/// `Host` 封装装配完成后的核心构件。
///
/// # 教案级注释
/// - **设计目的 (Why)**
///   - 把宿主容器、应用容器、启动对象与请求管线集中保存在一个结构体中，
///     便于宿主在完成装配后以单一入口向下传递依赖；
/// - **体系位置 (Where)**
///   - 该结构由 [`HostBuilder`](crate::builder::HostBuilder) 生成；
/// - **关键要素 (How)**
///   - `hosting_services`：宿主容器，持有启动单例与环境信息；
///   - `application_services`：启动类 `configure_services` 产出的应用容器；
///   - `startup`：两个容器共享的同一个启动实例；
///   - `pipeline`：`configure` 登记的中间件链。
/// - **契约说明 (What)**
///   - 结构体自身不执行任何 I/O；
///   - 宿主存活期间，约定式启动对象持有的宿主容器弱引用始终可升级。
pub struct Host {
    environment: Arc<HostingEnvironment>,
    hosting_services: ServiceProvider,
    application_services: ServiceProvider,
    startup: Arc<dyn Startup>,
    pipeline: RequestPipeline,
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("environment", &self.environment)
            .field("hosting_services", &self.hosting_services.len())
            .field("application_services", &self.application_services.len())
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

impl Host {
    pub(crate) fn new(
        environment: Arc<HostingEnvironment>,
        hosting_services: ServiceProvider,
        application_services: ServiceProvider,
        startup: Arc<dyn Startup>,
        pipeline: RequestPipeline,
    ) -> Self {
        Self {
            environment,
            hosting_services,
            application_services,
            startup,
            pipeline,
        }
    }

    pub fn environment(&self) -> &HostingEnvironment {
        &self.environment
    }

    pub fn hosting_services(&self) -> &ServiceProvider {
        &self.hosting_services
    }

    pub fn application_services(&self) -> &ServiceProvider {
        &self.application_services
    }

    pub fn startup(&self) -> &Arc<dyn Startup> {
        &self.startup
    }

    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    /// 让一次请求穿过应用管线。
    pub fn handle(&self, context: &mut PipelineContext) -> Result<(), PipelineError> {
        tracing::debug!(path = context.path(), "handling request");
        self.pipeline.handle(context)
    }
}
