//! 宿主环境：环境标签的来源，以及注入给启动类的 [`HostingEnvironment`]。

use std::{fmt, sync::Arc};

/// 常用的环境标签。
pub mod environments {
    pub const DEVELOPMENT: &str = "Development";
    pub const STAGING: &str = "Staging";
    pub const PRODUCTION: &str = "Production";
}

/// 环境标签的提供者。
///
/// # 教案级注释
/// - **读取时机 (When)**：约定式启动的单例工厂在宿主容器首次解析启动对象时才调用，
///   因此 `use_startup` 之后再修改环境仍然生效；
/// - **契约 (What)**：空字符串表示不请求环境限定。
pub trait EnvironmentProvider: Send + Sync + 'static {
    fn current_environment_label(&self) -> String;
}

impl<F> EnvironmentProvider for F
where
    F: Fn() -> String + Send + Sync + 'static,
{
    fn current_environment_label(&self) -> String {
        self()
    }
}

/// 固定标签。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FixedEnvironment(String);

impl FixedEnvironment {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }
}

impl EnvironmentProvider for FixedEnvironment {
    fn current_environment_label(&self) -> String {
        self.0.clone()
    }
}

type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// 从进程环境变量读取标签，变量缺失或不是合法 UTF-8 时视为空标签。
#[derive(Clone)]
pub struct EnvVarEnvironment {
    variable: String,
    lookup: Lookup,
}

impl EnvVarEnvironment {
    pub const DEFAULT_VARIABLE: &'static str = "SPARK_ENVIRONMENT";

    pub fn new(variable: impl Into<String>) -> Self {
        Self::with_lookup(variable, |name| std::env::var(name).ok())
    }

    /// 使用自定义查找函数，便于在测试中替代真实的进程环境。
    pub fn with_lookup<F>(variable: impl Into<String>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            variable: variable.into(),
            lookup: Arc::new(lookup),
        }
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }
}

impl Default for EnvVarEnvironment {
    fn default() -> Self {
        Self::new(Self::DEFAULT_VARIABLE)
    }
}

impl fmt::Debug for EnvVarEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvVarEnvironment")
            .field("variable", &self.variable)
            .finish()
    }
}

impl EnvironmentProvider for EnvVarEnvironment {
    fn current_environment_label(&self) -> String {
        (self.lookup)(&self.variable).unwrap_or_default()
    }
}

/// 注入给启动方法的宿主环境信息。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostingEnvironment {
    environment_name: String,
    application_name: String,
}

impl HostingEnvironment {
    pub fn new(environment_name: impl Into<String>, application_name: impl Into<String>) -> Self {
        Self {
            environment_name: environment_name.into(),
            application_name: application_name.into(),
        }
    }

    pub fn environment_name(&self) -> &str {
        &self.environment_name
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    /// 忽略大小写比较环境名。
    pub fn is_environment(&self, name: &str) -> bool {
        self.environment_name.eq_ignore_ascii_case(name)
    }

    pub fn is_development(&self) -> bool {
        self.is_environment(environments::DEVELOPMENT)
    }

    pub fn is_staging(&self) -> bool {
        self.is_environment(environments::STAGING)
    }

    pub fn is_production(&self) -> bool {
        self.is_environment(environments::PRODUCTION)
    }
}

#[cfg(test)]
mod tests {
    use super::{EnvVarEnvironment, EnvironmentProvider, FixedEnvironment, HostingEnvironment};

    #[test]
    fn env_var_provider_reads_lazily_and_defaults_to_empty() {
        let provider = EnvVarEnvironment::with_lookup("APP_ENV", |name| {
            (name == "APP_ENV").then(|| "Staging".to_owned())
        });
        assert_eq!(provider.current_environment_label(), "Staging");

        let unset = EnvVarEnvironment::with_lookup("APP_ENV", |_| None);
        assert_eq!(unset.current_environment_label(), "");
        assert_eq!(EnvVarEnvironment::default().variable(), "SPARK_ENVIRONMENT");
    }

    #[test]
    fn closures_and_fixed_labels_are_providers() {
        let closure = || "Development".to_owned();
        assert_eq!(closure.current_environment_label(), "Development");
        assert_eq!(FixedEnvironment::new("QA").current_environment_label(), "QA");
    }

    #[test]
    fn hosting_environment_compares_case_insensitively() {
        let env = HostingEnvironment::new("production", "orders");
        assert!(env.is_production());
        assert!(!env.is_development());
        assert!(env.is_environment("PRODUCTION"));
        assert_eq!(env.application_name(), "orders");
    }
}
