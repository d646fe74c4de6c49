use crate::{
    builder::{HostBuilder, HostBuilderError},
    startup::{StartupRegistrationStrategy, StartupSource, StartupType},
};

/// 集成方指定启动类型的入口。
///
/// ```ignore
/// let mut builder = HostBuilder::new();
/// builder.use_startup::<AppStartup>()?.use_environment("Production");
/// let host = builder.build()?;
/// ```
pub trait StartupHostBuilderExt {
    /// 登记运行期描述的启动类型；重复调用时后者覆盖前者。
    fn use_startup_type(&mut self, startup: StartupType) -> Result<&mut Self, HostBuilderError>;

    fn use_startup<T: StartupSource>(&mut self) -> Result<&mut Self, HostBuilderError> {
        self.use_startup_type(T::startup_type())
    }
}

impl StartupHostBuilderExt for HostBuilder {
    fn use_startup_type(&mut self, startup: StartupType) -> Result<&mut Self, HostBuilderError> {
        self.configure_services(|services| {
            StartupRegistrationStrategy::register(services, &startup)?;
            Ok(())
        })
    }
}
