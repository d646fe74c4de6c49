//! 宿主配置：从 TOML 读取环境选择与应用名称。

use std::{fs, io, path::Path, sync::Arc};

use serde::Deserialize;
use thiserror::Error;

use crate::environment::{EnvVarEnvironment, EnvironmentProvider, FixedEnvironment};

/// 读取宿主配置失败。
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read host settings from `{path}`")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("host settings are not valid TOML")]
    Parse(#[from] toml::de::Error),
}

/// 宿主配置。
///
/// ```toml
/// application_name = "orders"
/// # 固定环境标签；省略时从 `environment_variable` 指向的环境变量读取
/// environment = "Production"
/// environment_variable = "SPARK_ENVIRONMENT"
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct HostSettings {
    pub environment: Option<String>,
    pub application_name: String,
    pub environment_variable: String,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            environment: None,
            application_name: String::new(),
            environment_variable: EnvVarEnvironment::DEFAULT_VARIABLE.to_owned(),
        }
    }
}

impl HostSettings {
    pub fn from_toml_str(raw: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// 固定标签优先，否则按变量名延迟读取进程环境。
    pub fn environment_provider(&self) -> Arc<dyn EnvironmentProvider> {
        match &self.environment {
            Some(label) => Arc::new(FixedEnvironment::new(label.clone())),
            None => Arc::new(EnvVarEnvironment::new(self.environment_variable.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{HostSettings, SettingsError};

    #[test]
    fn fixed_environment_overrides_variable() {
        let settings = HostSettings::from_toml_str(
            r#"
            application_name = "orders"
            environment = "Staging"
            "#,
        )
        .expect("配置应合法");
        assert_eq!(settings.application_name, "orders");
        assert_eq!(settings.environment_variable, "SPARK_ENVIRONMENT");
        assert_eq!(
            settings.environment_provider().current_environment_label(),
            "Staging"
        );
    }

    #[test]
    fn empty_document_uses_defaults() {
        let settings = HostSettings::from_toml_str("").expect("空配置应合法");
        assert_eq!(settings, HostSettings::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let error = HostSettings::from_toml_str("enviroment = \"Production\"").expect_err("拼写错误");
        assert!(matches!(error, SettingsError::Parse(_)));
    }

    #[test]
    fn missing_file_reports_its_path() {
        let error = HostSettings::from_path("/nonexistent/spark-host.toml").expect_err("文件不存在");
        assert!(error.to_string().contains("/nonexistent/spark-host.toml"));
    }
}
