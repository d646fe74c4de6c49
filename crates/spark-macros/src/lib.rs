//! Spark 框架过程宏入口。
//!
//! # 设计意图（Why）
//! - Rust 没有运行期反射，约定式启动类需要一张“方法表”描述自己有哪些方法、各自的形参与返回类型；
//! - 手写方法表既冗长又容易与真实签名脱节，`#[startup]` 在编译期直接从 `impl` 块生成；
//! - 生成代码只依赖 `spark_hosting` 的公开 API，路径统一写作 `::spark_hosting::...`。
//!
//! # 集成方式（How）
//! - 在启动类的固有 `impl` 块上标注 `#[spark_hosting::startup]`；
//! - 需要由宿主容器构造实例时写作 `#[startup(constructor = new)]`，否则启动类需实现 `Default`。

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::{format_ident, quote};
use syn::{
    Error, FnArg, GenericArgument, Ident, ImplItem, ImplItemFn, ItemImpl, Pat, PathArguments,
    ReturnType, Type, Visibility, parse_macro_input, spanned::Spanned,
};

/// 为启动类的固有 `impl` 块生成约定式启动所需的实现。
///
/// # 语义说明（What）
/// - **输入**：不带泛型的固有 `impl` 块；
/// - **收录范围**：名称规范化后以 `configure` 开头、以 `&self` 接收的 `pub` 方法，按声明顺序写入方法表；
///   其余方法（访问器、辅助函数等）原样保留，不做任何检查；
/// - **形参**：只接受 `&T`、`&mut T` 与 `Arc<T>` 三种形态：
///   - `&mut T`：由宿主提供，例如 `&mut ServiceCollection`、`&mut ApplicationBuilder`；
///   - `&T`：宿主提供或从容器解析；
///   - `Arc<T>`：从容器解析；
/// - **返回值**：`()`、任意值类型，或 `Result<_, E>`（`E` 可转换为 `Box<dyn Error + Send + Sync>`）；
/// - **输出**：保留原 `impl` 块，并生成 `ConventionStartup` 与 `StartupSource` 实现；
///   指定 `constructor` 时额外生成 `Activate` 实现。
///
/// # 风险提示（Trade-offs）
/// - 宏只按 `configure` 前缀筛选，完整的名称匹配留给运行期解析器，以便环境标签在宿主构建时才确定；
/// - 启动类若同时实现了 `Startup`，生成的 `StartupSource` 会与直连实现冲突，编译期即报错。
#[proc_macro_attribute]
pub fn startup(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut constructor: Option<Ident> = None;
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("constructor") {
            constructor = Some(meta.value()?.parse()?);
            Ok(())
        } else {
            Err(meta.error("#[startup] 仅接受 `constructor = <fn>` 参数"))
        }
    });
    parse_macro_input!(attr with parser);

    let block = parse_macro_input!(item as ItemImpl);
    expand_startup(block, constructor)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

fn expand_startup(
    block: ItemImpl,
    constructor: Option<Ident>,
) -> Result<proc_macro2::TokenStream, Error> {
    if let Some((_, path, _)) = &block.trait_ {
        return Err(Error::new(
            path.span(),
            "#[startup] 只能标注在固有 impl 块上",
        ));
    }
    if !block.generics.params.is_empty() {
        return Err(Error::new(
            block.generics.span(),
            "#[startup] 暂不支持带泛型参数的启动类",
        ));
    }

    let self_ty = &block.self_ty;
    let mut descriptors = Vec::new();
    let mut constructor_fn = None;

    for item in &block.items {
        let ImplItem::Fn(method) = item else {
            continue;
        };
        if constructor
            .as_ref()
            .is_some_and(|name| method.sig.ident == *name)
        {
            constructor_fn = Some(method);
            continue;
        }
        if !matches!(method.vis, Visibility::Public(_)) || !is_convention_name(&method.sig.ident) {
            continue;
        }
        match method.sig.receiver() {
            None => continue,
            Some(receiver) if receiver.reference.is_none() || receiver.mutability.is_some() => {
                return Err(Error::new(
                    receiver.span(),
                    "#[startup] 收录的方法必须以 `&self` 接收",
                ));
            }
            Some(_) => {}
        }
        descriptors.push(expand_descriptor(method)?);
    }

    let activate = match (&constructor, constructor_fn) {
        (None, _) => None,
        (Some(name), None) => {
            return Err(Error::new(
                name.span(),
                format!("在 impl 块中找不到构造函数 `{name}`"),
            ));
        }
        (Some(_), Some(method)) => Some(expand_activate(self_ty, method)?),
    };

    Ok(quote! {
        #block

        impl ::spark_hosting::startup::ConventionStartup for #self_ty {
            fn methods() -> ::spark_hosting::startup::MethodTable<Self> {
                ::spark_hosting::startup::MethodTable::new()
                    #( .with(#descriptors) )*
            }
        }

        impl ::spark_hosting::startup::StartupSource for #self_ty {
            fn startup_type() -> ::spark_hosting::startup::StartupType {
                ::spark_hosting::startup::StartupType::convention::<Self>()
            }
        }

        #activate
    })
}

/// 与运行期的名称规范化一致：只保留 ASCII 字母数字并转小写后，是否以 `configure` 开头。
fn is_convention_name(ident: &Ident) -> bool {
    let normalized: String = ident
        .to_string()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    normalized.starts_with("configure")
}

/// 形参的三种形态，与 `ParameterAccess` 一一对应。
enum Access {
    Shared,
    Exclusive,
    Owned,
}

struct Parameter<'a> {
    name: String,
    ty: &'a Type,
    access: Access,
}

fn parameters(method: &ImplItemFn) -> Result<Vec<Parameter<'_>>, Error> {
    method
        .sig
        .inputs
        .iter()
        .filter_map(|input| match input {
            FnArg::Typed(typed) => Some(typed),
            FnArg::Receiver(_) => None,
        })
        .enumerate()
        .map(|(index, typed)| {
            let name = match typed.pat.as_ref() {
                Pat::Ident(ident) => ident.ident.to_string(),
                _ => format!("arg{index}"),
            };
            classify(&typed.ty).map(|(ty, access)| Parameter { name, ty, access })
        })
        .collect()
}

fn classify(ty: &Type) -> Result<(&Type, Access), Error> {
    match ty {
        Type::Reference(reference) if reference.mutability.is_some() => {
            Ok((reference.elem.as_ref(), Access::Exclusive))
        }
        Type::Reference(reference) => Ok((reference.elem.as_ref(), Access::Shared)),
        Type::Path(path) => {
            let inner = path
                .path
                .segments
                .last()
                .filter(|segment| segment.ident == "Arc")
                .and_then(|segment| single_type_argument(&segment.arguments));
            inner.map(|inner| (inner, Access::Owned)).ok_or_else(|| {
                Error::new(ty.span(), "启动方法的参数必须是 `&T`、`&mut T` 或 `Arc<T>`")
            })
        }
        _ => Err(Error::new(
            ty.span(),
            "启动方法的参数必须是 `&T`、`&mut T` 或 `Arc<T>`",
        )),
    }
}

fn single_type_argument(arguments: &PathArguments) -> Option<&Type> {
    let PathArguments::AngleBracketed(arguments) = arguments else {
        return None;
    };
    let mut types = arguments.args.iter().filter_map(|argument| match argument {
        GenericArgument::Type(ty) => Some(ty),
        _ => None,
    });
    let first = types.next()?;
    types.next().is_none().then_some(first)
}

/// 返回类型：是否包裹在 `Result` 中，以及成功值是否为 `()`。
struct Output<'a> {
    fallible: bool,
    value: Option<&'a Type>,
}

fn output(sig: &syn::Signature) -> Output<'_> {
    let ReturnType::Type(_, ty) = &sig.output else {
        return Output {
            fallible: false,
            value: None,
        };
    };
    if let Type::Path(path) = ty.as_ref() {
        let ok = path
            .path
            .segments
            .last()
            .filter(|segment| segment.ident == "Result")
            .and_then(|segment| match &segment.arguments {
                PathArguments::AngleBracketed(arguments) => {
                    arguments.args.first().and_then(|argument| match argument {
                        GenericArgument::Type(ty) => Some(ty),
                        _ => None,
                    })
                }
                _ => None,
            });
        if let Some(ok) = ok {
            return Output {
                fallible: true,
                value: (!is_unit(ok)).then_some(ok),
            };
        }
    }
    Output {
        fallible: false,
        value: (!is_unit(ty)).then_some(ty.as_ref()),
    }
}

fn is_unit(ty: &Type) -> bool {
    matches!(ty, Type::Tuple(tuple) if tuple.elems.is_empty())
}

/// 生成“从槽位取出实参”的语句与调用实参列表。
fn bind_arguments(
    method_name: &str,
    parameters: &[Parameter<'_>],
    arguments: &Ident,
) -> (proc_macro2::TokenStream, Vec<Ident>) {
    if parameters.is_empty() {
        return (quote! { let _ = #arguments; }, Vec::new());
    }
    let mut statements = quote! {
        let mut __slots = #arguments.into_slots();
        let mut __iter = __slots.iter_mut();
    };
    let mut idents = Vec::with_capacity(parameters.len());
    for (index, parameter) in parameters.iter().enumerate() {
        let slot = format_ident!("__slot{}", index);
        let arg = format_ident!("__arg{}", index);
        let ty = parameter.ty;
        let extract = match parameter.access {
            Access::Shared => quote! { #slot.downcast_ref::<#ty>()? },
            Access::Exclusive => quote! { #slot.downcast_mut::<#ty>()? },
            Access::Owned => quote! { #slot.shared::<#ty>()? },
        };
        statements.extend(quote! {
            let #slot = __iter.next().ok_or_else(|| {
                ::spark_hosting::startup::BoundArguments::missing(#method_name, #index)
            })?;
            let #arg = #extract;
        });
        idents.push(arg);
    }
    (statements, idents)
}

fn parameter_infos(parameters: &[Parameter<'_>]) -> Vec<proc_macro2::TokenStream> {
    parameters
        .iter()
        .map(|parameter| {
            let name = &parameter.name;
            let ty = parameter.ty;
            let constructor = match parameter.access {
                Access::Shared => quote! { shared },
                Access::Exclusive => quote! { exclusive },
                Access::Owned => quote! { owned },
            };
            quote! { ::spark_hosting::startup::ParameterInfo::#constructor::<#ty>(#name) }
        })
        .collect()
}

fn expand_descriptor(method: &ImplItemFn) -> Result<proc_macro2::TokenStream, Error> {
    if !method.sig.generics.params.is_empty() {
        return Err(Error::new(
            method.sig.generics.span(),
            "#[startup] 收录的方法不能带泛型参数",
        ));
    }
    let ident = &method.sig.ident;
    let name = ident.to_string();
    let parameters = parameters(method)?;
    let infos = parameter_infos(&parameters);
    let arguments = Ident::new("__arguments", Span::call_site());
    let (bind, idents) = bind_arguments(&name, &parameters, &arguments);
    let output = output(&method.sig);

    let returns = match output.value {
        Some(ty) => quote! { ::spark_hosting::startup::ReturnKind::value::<#ty>() },
        None => quote! { ::spark_hosting::startup::ReturnKind::Unit },
    };
    let call = quote! { __this.#ident(#(#idents),*) };
    let call = if output.fallible {
        quote! {
            #call.map_err(|error| ::spark_hosting::startup::StartupError::method(#name, error))?
        }
    } else {
        call
    };
    let finish = match output.value {
        Some(_) => quote! {
            ::std::result::Result::Ok(::spark_hosting::startup::ReturnValue::value(#call))
        },
        None => quote! {
            #call;
            ::std::result::Result::Ok(::spark_hosting::startup::ReturnValue::Unit)
        },
    };

    Ok(quote! {
        ::spark_hosting::startup::MethodDescriptor::new(
            #name,
            ::std::vec![#(#infos),*],
            #returns,
            |__this: &Self, #arguments: ::spark_hosting::startup::BoundArguments<'_>| {
                #bind
                #finish
            },
        )
    })
}

fn expand_activate(
    self_ty: &Type,
    method: &ImplItemFn,
) -> Result<proc_macro2::TokenStream, Error> {
    if method.sig.receiver().is_some() {
        return Err(Error::new(
            method.sig.span(),
            "构造函数不能带 `self` 接收者",
        ));
    }
    let ident = &method.sig.ident;
    let name = ident.to_string();
    let parameters = parameters(method)?;
    if let Some(parameter) = parameters
        .iter()
        .find(|parameter| matches!(parameter.access, Access::Exclusive))
    {
        return Err(Error::new(
            parameter.ty.span(),
            "构造函数的参数只能是 `&T` 或 `Arc<T>`，容器无法提供独占借用",
        ));
    }
    let infos = parameter_infos(&parameters);
    let arguments = Ident::new("__arguments", Span::call_site());
    let (bind, idents) = bind_arguments(&name, &parameters, &arguments);
    let call = quote! { <#self_ty>::#ident(#(#idents),*) };
    let call = if output(&method.sig).fallible {
        quote! {
            #call.map_err(|error| ::spark_hosting::startup::StartupError::method(#name, error))?
        }
    } else {
        call
    };

    Ok(quote! {
        impl ::spark_hosting::startup::Activate for #self_ty {
            fn activate(
                __services: &::spark_hosting::container::ServiceProvider,
            ) -> ::std::result::Result<Self, ::spark_hosting::startup::StartupError> {
                let __parameters = ::std::vec![#(#infos),*];
                let #arguments = ::spark_hosting::startup::MethodBinder::bind(
                    #name,
                    &__parameters,
                    ::std::vec::Vec::new(),
                    __services,
                )?;
                #bind
                ::std::result::Result::Ok(#call)
            }
        }
    })
}
