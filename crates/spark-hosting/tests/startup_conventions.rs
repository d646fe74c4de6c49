//! 约定式启动类的端到端场景：方法选择、环境回退、参数注入与失败传播。

use std::sync::Arc;

use parking_lot::Mutex;
use spark_hosting::{
    ApplicationBuilder, HostBuildError, HostBuilder, HostBuilderError, HostingEnvironment,
    StartupHostBuilderExt,
    container::{ServiceCollection, ServiceProvider},
    startup,
    startup::{BindingError, ResolutionError, StartupError, StartupSource},
};

/// 记录启动方法的调用顺序，由宿主容器注入。
#[derive(Debug, Default)]
struct Journal(Mutex<Vec<&'static str>>);

impl Journal {
    fn record(&self, entry: &'static str) {
        self.0.lock().push(entry);
    }

    fn entries(&self) -> Vec<&'static str> {
        self.0.lock().clone()
    }
}

#[derive(Debug, PartialEq)]
struct Greeting(&'static str);

struct Metrics;

fn builder_with_journal() -> (HostBuilder, Arc<Journal>) {
    let journal = Arc::new(Journal::default());
    let shared = Arc::clone(&journal);
    let mut builder = HostBuilder::new();
    builder
        .use_environment("")
        .configure_services(move |services| {
            services.add_shared(shared);
            Ok(())
        })
        .expect("登记 Journal 应成功");
    (builder, journal)
}

fn build<T: StartupSource>(environment: &str) -> (Result<spark_hosting::Host, HostBuildError>, Arc<Journal>) {
    let (mut builder, journal) = builder_with_journal();
    builder.use_environment(environment);
    builder.use_startup::<T>().expect("登记启动类型应成功");
    (builder.build(), journal)
}

#[derive(Default)]
struct Basic;

#[startup]
impl Basic {
    pub fn configure_services(&self, services: &mut ServiceCollection, journal: &Journal) {
        journal.record("configure_services");
        services.add_singleton(Greeting("basic"));
    }

    pub fn configure(&self, _app: &mut ApplicationBuilder, journal: &Journal) {
        journal.record("configure");
    }
}

#[test]
fn generic_methods_run_once_in_order() {
    let (host, journal) = build::<Basic>("");
    let host = host.expect("宿主应构建成功");

    assert_eq!(journal.entries(), ["configure_services", "configure"]);
    let greeting = host
        .application_services()
        .require::<Greeting>()
        .expect("configure_services 写入的服务");
    assert_eq!(*greeting, Greeting("basic"));
}

#[derive(Default)]
struct PerEnvironment;

#[startup]
impl PerEnvironment {
    pub fn configure_services(&self, _services: &mut ServiceCollection, journal: &Journal) {
        journal.record("configure_services");
    }

    pub fn configure_production_services(
        &self,
        _services: &mut ServiceCollection,
        journal: &Journal,
    ) {
        journal.record("configure_production_services");
    }

    pub fn configure(&self, _app: &mut ApplicationBuilder, journal: &Journal) {
        journal.record("configure");
    }
}

#[test]
fn environment_qualified_services_method_wins() {
    let (host, journal) = build::<PerEnvironment>("Production");
    host.expect("宿主应构建成功");
    assert_eq!(journal.entries(), ["configure_production_services", "configure"]);
}

#[test]
fn generic_services_method_is_the_fallback() {
    let (host, journal) = build::<PerEnvironment>("Staging");
    host.expect("宿主应构建成功");
    assert_eq!(journal.entries(), ["configure_services", "configure"]);
}

#[test]
fn environment_is_read_when_the_host_is_built() {
    let (mut builder, journal) = builder_with_journal();
    builder
        .use_startup::<PerEnvironment>()
        .expect("登记启动类型应成功")
        .use_environment("production");
    builder.build().expect("宿主应构建成功");
    assert_eq!(journal.entries(), ["configure_production_services", "configure"]);
}

#[derive(Default)]
struct PipelineOnly;

#[startup]
impl PipelineOnly {
    pub fn configure(&self, app: &mut ApplicationBuilder, journal: &Journal) {
        assert!(app.application_services().contains::<Journal>());
        journal.record("configure");
    }
}

#[test]
fn missing_services_method_keeps_hosting_registrations() {
    let (host, journal) = build::<PipelineOnly>("Production");
    let host = host.expect("宿主应构建成功");

    assert_eq!(journal.entries(), ["configure"]);
    assert!(host.application_services().contains::<Journal>());
    assert!(host.application_services().contains::<HostingEnvironment>());
}

#[derive(Default)]
struct NoPipeline;

#[startup]
impl NoPipeline {
    pub fn configure_services(&self, _services: &mut ServiceCollection, journal: &Journal) {
        journal.record("configure_services");
    }
}

#[test]
fn types_without_pipeline_method_are_rejected_at_registration() {
    let (mut builder, journal) = builder_with_journal();
    let error = builder
        .use_startup::<NoPipeline>()
        .expect_err("缺少管线方法必须失败");
    assert!(matches!(
        error,
        HostBuilderError::Startup(ResolutionError::MissingPipelineMethod { .. })
    ));
    assert!(journal.entries().is_empty());
}

#[derive(Default)]
struct StagingOnly;

#[startup]
impl StagingOnly {
    pub fn configure_services(&self, _services: &mut ServiceCollection, journal: &Journal) {
        journal.record("configure_services");
    }

    pub fn configure_staging(&self, _app: &mut ApplicationBuilder, journal: &Journal) {
        journal.record("configure_staging");
    }
}

#[test]
fn environment_without_pipeline_method_fails_the_build() {
    let (host, journal) = build::<StagingOnly>("Production");
    let error = host.expect_err("Production 下没有管线方法");

    let Some(ResolutionError::MissingPipelineMethod { type_name, tried }) = error.as_resolution()
    else {
        panic!("应为 MissingPipelineMethod，实际为 {error:?}");
    };
    assert!(type_name.ends_with("StagingOnly"));
    assert_eq!(tried, &["configure_production", "configure"]);
    assert!(journal.entries().is_empty());
}

#[derive(Default)]
struct NeedsMetrics;

#[startup]
impl NeedsMetrics {
    pub fn configure_services(&self, _services: &mut ServiceCollection, journal: &Journal) {
        journal.record("configure_services");
    }

    pub fn configure(&self, _app: &mut ApplicationBuilder, _metrics: &Metrics, journal: &Journal) {
        journal.record("configure");
    }
}

#[test]
fn unresolvable_parameter_is_named_and_method_not_invoked() {
    let (host, journal) = build::<NeedsMetrics>("");
    let error = host.expect_err("Metrics 未登记");

    let Some(BindingError::Unresolved { method, parameter, ty }) = error.as_binding() else {
        panic!("应为 BindingError::Unresolved，实际为 {error:?}");
    };
    assert_eq!(*method, "configure");
    assert_eq!(*parameter, "_metrics");
    assert!(ty.name().ends_with("Metrics"));
    assert_eq!(journal.entries(), ["configure_services"]);
    assert!(error.to_string().contains("_metrics"));
}

#[derive(Default)]
struct ReturnsProvider;

#[startup]
impl ReturnsProvider {
    pub fn configure_services(&self, services: &mut ServiceCollection) {
        services.add_singleton(Greeting("unit overload"));
    }

    #[allow(non_snake_case)]
    pub fn ConfigureServices(
        &self,
        services: &mut ServiceCollection,
        environment: &HostingEnvironment,
    ) -> ServiceProvider {
        let mut own = services.clone();
        own.add_singleton(Greeting(if environment.is_staging() {
            "staging provider"
        } else {
            "provider"
        }));
        own.build()
    }

    pub fn configure(&self, _app: &mut ApplicationBuilder) {}
}

#[test]
fn provider_returning_overload_is_preferred() {
    let (host, _journal) = build::<ReturnsProvider>("Staging");
    let host = host.expect("宿主应构建成功");
    let greeting = host
        .application_services()
        .require::<Greeting>()
        .expect("返回的容器即应用容器");
    assert_eq!(*greeting, Greeting("staging provider"));
}

#[derive(Default)]
struct Twice;

#[startup]
impl Twice {
    pub fn configure(&self, _app: &mut ApplicationBuilder, journal: &Journal) {
        journal.record("configure");
    }

    #[allow(non_snake_case)]
    pub fn Configure(&self, _app: &mut ApplicationBuilder, journal: &Journal) {
        journal.record("Configure");
    }
}

#[test]
fn first_declared_overload_is_used() {
    let (host, journal) = build::<Twice>("");
    host.expect("声明在前的重载应被选中");
    assert_eq!(journal.entries(), ["configure"]);
}

#[derive(Default)]
struct WithHelpers {
    label: String,
}

#[startup]
impl WithHelpers {
    pub fn name(&self) -> &str {
        &self.label
    }

    pub fn scaled(&self, factor: u32, suffix: String) -> String {
        format!("{}{suffix}", factor * 2)
    }

    pub fn configure(&self, _app: &mut ApplicationBuilder, journal: &Journal) {
        journal.record("configure");
    }
}

#[test]
fn non_convention_methods_are_left_alone() {
    let (host, journal) = build::<WithHelpers>("");
    host.expect("辅助方法不影响启动类");
    assert_eq!(journal.entries(), ["configure"]);

    let helpers = WithHelpers::default();
    assert_eq!(helpers.name(), "");
    assert_eq!(helpers.scaled(21, "!".to_owned()), "42!");
    assert_eq!(
        <WithHelpers as spark_hosting::startup::ConventionStartup>::methods().len(),
        1
    );
}

#[derive(Default)]
struct Fallible;

#[startup]
impl Fallible {
    pub fn configure(&self, _app: &mut ApplicationBuilder) -> anyhow::Result<()> {
        anyhow::bail!("pipeline misconfigured")
    }
}

#[test]
fn user_errors_surface_with_the_method_name() {
    let (host, _journal) = build::<Fallible>("");
    let error = host.expect_err("用户方法返回错误");
    let HostBuildError::Startup(StartupError::Method { method, source }) = error else {
        panic!("应为 StartupError::Method");
    };
    assert_eq!(method, "configure");
    assert_eq!(source.to_string(), "pipeline misconfigured");
}

struct Injected {
    application: String,
    journal: Arc<Journal>,
}

#[startup(constructor = new)]
impl Injected {
    pub fn new(environment: &HostingEnvironment, journal: Arc<Journal>) -> Self {
        journal.record("new");
        Self {
            application: environment.application_name().to_owned(),
            journal,
        }
    }

    pub fn configure(&self, app: &mut ApplicationBuilder) -> Result<(), StartupError> {
        self.journal.record("configure");
        let application = self.application.clone();
        app.use_middleware_fn("banner", move |context, next| {
            context.insert("application", application.clone());
            next.run(context)
        })
        .map_err(|error| StartupError::method("configure", error))?;
        Ok(())
    }
}

#[test]
fn constructor_parameters_come_from_the_hosting_container() {
    let (mut builder, journal) = builder_with_journal();
    builder
        .use_application_name("orders")
        .use_startup::<Injected>()
        .expect("登记启动类型应成功");
    let host = builder.build().expect("宿主应构建成功");

    assert_eq!(journal.entries(), ["new", "configure"]);
    let mut context = spark_hosting::PipelineContext::new("/");
    host.handle(&mut context).expect("管线应成功");
    assert_eq!(context.get("application"), Some("orders"));
}
