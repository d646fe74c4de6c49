use std::fmt;

use spark_container::ServiceProvider;

use super::{
    MethodDescriptor, MethodHandle, MethodTable, ResolutionError, ReturnKind,
    method::{CONFIGURE, SERVICES_SUFFIX, normalize_name},
};

/// 约定解析的产物：可选的服务配置方法与必需的管线配置方法。
pub struct StartupMethods<S> {
    configure_services: Option<MethodHandle<S>>,
    configure: MethodHandle<S>,
}

impl<S> Clone for StartupMethods<S> {
    fn clone(&self) -> Self {
        Self {
            configure_services: self.configure_services.clone(),
            configure: self.configure.clone(),
        }
    }
}

impl<S> fmt::Debug for StartupMethods<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartupMethods")
            .field(
                "configure_services",
                &self.configure_services.as_ref().map(MethodHandle::name),
            )
            .field("configure", &self.configure.name())
            .finish()
    }
}

impl<S> StartupMethods<S> {
    pub fn configure_services(&self) -> Option<&MethodHandle<S>> {
        self.configure_services.as_ref()
    }

    pub fn configure(&self) -> &MethodHandle<S> {
        &self.configure
    }
}

/// `ConventionResolver` 按命名约定在方法表中挑选启动方法。
///
/// # 教案级注释
/// - **命名优先级 (How)**
///   1. 环境标签非空时先找 `configure_{env}_services` / `configure_{env}`；
///   2. 找不到任何同名方法时回退到 `configure_services` / `configure`；
///   3. 只要带环境限定的名字命中，即使通用名字声明在前也不会被选中。
/// - **重载裁决 (How)**
///   - 服务配置方法：返回 [`ServiceProvider`] 的重载优先于返回 `()` 的重载；
///     同一优先级出现多个候选时取声明在前的一个；
///   - 管线配置方法：只接受返回 `()` 的重载，多个候选同样按声明顺序取第一个；
///   - 同名且签名完全相同的描述符无法按重载区分，报 [`ResolutionError::AmbiguousOverload`]。
/// - **环境标签 (What)**：规范化后以 `services` 结尾的标签会让管线方法与服务配置方法同名，
///   按空标签处理。
/// - **契约 (What)**
///   - 解析是纯函数：相同的方法表与环境标签总得到相同结果；
///   - 服务配置方法缺失不是错误；管线配置方法缺失报 [`ResolutionError::MissingPipelineMethod`]。
#[derive(Clone, Copy, Debug, Default)]
pub struct ConventionResolver;

impl ConventionResolver {
    pub fn resolve<S>(
        table: &MethodTable<S>,
        environment: &str,
    ) -> Result<StartupMethods<S>, ResolutionError> {
        tracing::debug!(
            startup = table.type_name(),
            environment,
            "resolving startup conventions"
        );
        let mut qualifier = normalize_name(environment);
        if qualifier.ends_with(SERVICES_SUFFIX) {
            tracing::debug!(
                startup = table.type_name(),
                environment,
                "environment label collides with the services suffix; using generic names"
            );
            qualifier.clear();
        }

        let configure_services = find(table, ConventionMethod::ConfigureServices, &qualifier)?;
        let configure = find(table, ConventionMethod::Configure, &qualifier)?.ok_or_else(|| {
            ResolutionError::MissingPipelineMethod {
                type_name: table.type_name(),
                tried: ConventionMethod::Configure.display_names(environment, &qualifier),
            }
        })?;

        tracing::debug!(
            startup = table.type_name(),
            configure_services = configure_services.as_ref().map(MethodHandle::name),
            configure = configure.name(),
            "startup conventions resolved"
        );
        Ok(StartupMethods {
            configure_services,
            configure,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ConventionMethod {
    ConfigureServices,
    Configure,
}

impl ConventionMethod {
    fn normalized(self, qualifier: &str) -> String {
        match self {
            ConventionMethod::ConfigureServices => {
                format!("{CONFIGURE}{qualifier}{SERVICES_SUFFIX}")
            }
            ConventionMethod::Configure => format!("{CONFIGURE}{qualifier}"),
        }
    }

    fn display_name(self, environment: Option<&str>) -> String {
        let infix = environment
            .map(|env| {
                let snake: String = env
                    .chars()
                    .map(|c| {
                        if c.is_ascii_alphanumeric() {
                            c.to_ascii_lowercase()
                        } else {
                            '_'
                        }
                    })
                    .collect();
                format!("_{snake}")
            })
            .unwrap_or_default();
        match self {
            ConventionMethod::ConfigureServices => format!("configure{infix}_services"),
            ConventionMethod::Configure => format!("configure{infix}"),
        }
    }

    fn display_names(self, environment: &str, qualifier: &str) -> Vec<String> {
        if qualifier.is_empty() {
            vec![self.display_name(None)]
        } else {
            vec![self.display_name(Some(environment)), self.display_name(None)]
        }
    }

    fn expected_return(self) -> &'static str {
        match self {
            ConventionMethod::ConfigureServices => "`ServiceProvider` or `()`",
            ConventionMethod::Configure => "`()`",
        }
    }
}

fn find<S>(
    table: &MethodTable<S>,
    method: ConventionMethod,
    qualifier: &str,
) -> Result<Option<MethodHandle<S>>, ResolutionError> {
    let mut candidates: Vec<&MethodDescriptor<S>> = Vec::new();
    if !qualifier.is_empty() {
        let qualified = method.normalized(qualifier);
        candidates.extend(table.named(&qualified));
    }
    if candidates.is_empty() {
        let generic = method.normalized("");
        candidates.extend(table.named(&generic));
    }
    let Some(first) = candidates.first() else {
        return Ok(None);
    };
    let method_name = first.name().to_owned();

    let preferred: Vec<&MethodDescriptor<S>> = match method {
        ConventionMethod::ConfigureServices => {
            let returning_provider: Vec<_> = candidates
                .iter()
                .copied()
                .filter(|m| m.returns().is::<ServiceProvider>())
                .collect();
            if returning_provider.is_empty() {
                candidates
                    .iter()
                    .copied()
                    .filter(|m| m.returns() == ReturnKind::Unit)
                    .collect()
            } else {
                returning_provider
            }
        }
        ConventionMethod::Configure => candidates
            .iter()
            .copied()
            .filter(|m| m.returns() == ReturnKind::Unit)
            .collect(),
    };

    let Some((selected, rest)) = preferred.split_first() else {
        return Err(ResolutionError::InvalidReturnType {
            type_name: table.type_name(),
            method: method_name,
            expected: method.expected_return(),
        });
    };
    let duplicates = rest
        .iter()
        .filter(|other| {
            other.name() == selected.name() && other.parameters() == selected.parameters()
        })
        .count();
    if duplicates > 0 {
        return Err(ResolutionError::AmbiguousOverload {
            type_name: table.type_name(),
            method: method_name,
            count: duplicates + 1,
        });
    }
    if !rest.is_empty() {
        let skipped: Vec<&str> = rest.iter().map(|m| m.name()).collect();
        tracing::debug!(
            startup = table.type_name(),
            selected = selected.name(),
            ?skipped,
            "several overloads qualify; using the first declared"
        );
    }
    Ok(Some(MethodHandle::new(
        table.type_name(),
        (*selected).clone(),
    )))
}
