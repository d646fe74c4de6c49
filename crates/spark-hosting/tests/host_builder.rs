//! 宿主构建流程：直连启动类、启动实例共享、配置驱动的环境选择与请求管线。

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use spark_hosting::{
    ApplicationBuilder, HostBuildError, HostBuilder, HostSettings, PipelineContext, PipelineError,
    StartupHostBuilderExt,
    container::{ServiceCollection, ServiceProvider},
    startup,
    startup::{Startup, StartupError, StartupType},
};

static DIRECT_ACTIVATIONS: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, PartialEq)]
struct Mode(&'static str);

struct Direct;

impl Default for Direct {
    fn default() -> Self {
        DIRECT_ACTIVATIONS.fetch_add(1, Ordering::SeqCst);
        Direct
    }
}

impl Startup for Direct {
    fn configure_services(
        &self,
        mut services: ServiceCollection,
    ) -> Result<ServiceProvider, StartupError> {
        services.add_singleton(Mode("direct"));
        Ok(services.build())
    }

    fn configure(&self, app: &mut ApplicationBuilder) -> Result<(), StartupError> {
        let mode = app.application_services().require::<Mode>()?;
        app.use_middleware_fn("mode", move |context, next| {
            context.insert("mode", mode.0);
            next.run(context)
        })
        .map_err(|error| StartupError::method("configure", error))?;
        Ok(())
    }
}

#[test]
fn direct_startup_is_activated_once_and_shared() {
    let mut builder = HostBuilder::new();
    builder.use_startup::<Direct>().expect("直连类型登记不会失败");
    let host = builder.build().expect("宿主应构建成功");

    assert_eq!(DIRECT_ACTIVATIONS.load(Ordering::SeqCst), 1);
    let hosting = host
        .hosting_services()
        .require::<Arc<dyn Startup>>()
        .expect("宿主容器持有启动对象");
    let application = host
        .application_services()
        .require::<Arc<dyn Startup>>()
        .expect("应用容器持有同一个启动对象");
    assert!(Arc::ptr_eq(&*hosting, &*application));
    assert!(Arc::ptr_eq(host.startup(), &*hosting));

    let mut context = PipelineContext::new("/");
    host.handle(&mut context).expect("管线应成功");
    assert_eq!(context.get("mode"), Some("direct"));
    assert_eq!(context.trail(), ["mode"]);
}

#[test]
fn building_without_startup_is_an_error() {
    let error = HostBuilder::new().build().expect_err("未指定启动类型");
    assert!(matches!(error, HostBuildError::StartupNotConfigured));
}

#[derive(Default)]
struct Gatekeeper;

#[startup]
impl Gatekeeper {
    pub fn configure(&self, app: &mut ApplicationBuilder) -> Result<(), StartupError> {
        app.use_middleware_fn("auth", |context, next| {
            if context.get("token").is_none() {
                return Err(PipelineError::rejected("auth", "missing token"));
            }
            next.run(context)
        })
        .map_err(|error| StartupError::method("configure", error))?;
        Ok(())
    }

    pub fn configure_staging(&self, _app: &mut ApplicationBuilder) {}
}

#[test]
fn last_registered_startup_wins() {
    let mut builder = HostBuilder::new();
    builder
        .use_environment("Development")
        .use_startup::<Direct>()
        .expect("登记应成功")
        .use_startup_type(StartupType::of::<Gatekeeper>())
        .expect("登记应成功");
    let host = builder.build().expect("宿主应构建成功");

    let mut anonymous = PipelineContext::new("/orders");
    let error = host.handle(&mut anonymous).expect_err("缺少令牌");
    assert!(matches!(error, PipelineError::Rejected { .. }));

    let mut authorized = PipelineContext::new("/orders");
    authorized.insert("token", "secret");
    host.handle(&mut authorized).expect("携带令牌应放行");
    assert_eq!(authorized.trail(), ["auth"]);
}

#[test]
fn settings_select_environment_and_application_name() {
    let settings = HostSettings::from_toml_str(
        r#"
        application_name = "gateway"
        environment = "Staging"
        "#,
    )
    .expect("配置应合法");

    let mut builder = HostBuilder::new();
    builder
        .with_settings(&settings)
        .use_startup::<Gatekeeper>()
        .expect("登记应成功");
    let host = builder.build().expect("宿主应构建成功");

    assert!(host.environment().is_staging());
    assert_eq!(host.environment().application_name(), "gateway");
    assert!(host.pipeline().is_empty());
}

#[derive(Default)]
struct ProductionOnly;

#[startup]
impl ProductionOnly {
    pub fn configure_production(&self, _app: &mut ApplicationBuilder) {}
}

#[test]
fn environment_provider_is_read_once_per_build() {
    let reads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reads);
    let mut builder = HostBuilder::new();
    builder
        .use_environment_provider(Arc::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                "Production".to_owned()
            } else {
                "Staging".to_owned()
            }
        }))
        .use_startup::<ProductionOnly>()
        .expect("登记应成功");
    let host = builder.build().expect("启动解析与注入的环境应一致");

    assert!(host.environment().is_production());
    assert_eq!(reads.load(Ordering::SeqCst), 1);
}
