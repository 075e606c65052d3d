//! Expansion of `#[corolo::main]` and `#[corolo::test]`.
use proc_macro2::{Span, TokenStream};
use quote::{format_ident, quote, quote_spanned};
use syn::parse::Parser;

use crate::parse::*;

// syn::AttributeArgs does not implement syn::Parse
type AttributeArgs = syn::punctuated::Punctuated<syn::Meta, syn::Token![,]>;

/// Config used in case of the attribute not being able to build a valid config
const DEFAULT_ERROR_CONFIG: FinalConfig = FinalConfig { idle: None };

/// For quickstart on how this works, let's analyze this example:
///
/// ```rust,no_run
/// #[corolo::main(idle = "spin")]
/// async fn main() {
///     println!("Hello world");
/// }
/// ```
///
/// `args` holds everything between the attribute's parentheses
/// (`idle = "spin"`), and `item` is the annotated function, which is rewritten
/// into a synchronous function handing its body to `Builder::block_on`.
pub(crate) fn main(args: TokenStream, item: TokenStream) -> TokenStream {
    // On failure, still expand to something close to the expected output so
    // IDE features keep working.
    let input: syn::ItemFn = match syn::parse2(item.clone()) {
        Ok(it) => it,
        Err(e) => return token_stream_with_error(item, e),
    };

    let config = AttributeArgs::parse_terminated
        .parse2(args)
        .and_then(|args| build_config(&input, args, false));

    match config {
        Ok(config) => parse_knobs(input, false, config),
        Err(e) => token_stream_with_error(parse_knobs(input, false, DEFAULT_ERROR_CONFIG), e),
    }
}

pub(crate) fn test(args: TokenStream, item: TokenStream) -> TokenStream {
    let input: syn::ItemFn = match syn::parse2(item.clone()) {
        Ok(it) => it,
        Err(e) => return token_stream_with_error(item, e),
    };

    let config = if let Some(attr) = input.attrs.iter().find(|attr| is_test_attribute(attr)) {
        let msg = "second test attribute is supplied, consider removing or changing the order of your test attributes";
        Err(syn::Error::new_spanned(attr, msg))
    } else {
        AttributeArgs::parse_terminated
            .parse2(args)
            .and_then(|args| build_config(&input, args, true))
    };

    match config {
        Ok(config) => parse_knobs(input, true, config),
        Err(e) => token_stream_with_error(parse_knobs(input, true, DEFAULT_ERROR_CONFIG), e),
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Idle {
    Sleep,
    Spin,
}

impl Idle {
    fn from_str(s: &str) -> Result<Idle, String> {
        match s {
            "sleep" => Ok(Idle::Sleep),
            "spin" => Ok(Idle::Spin),
            _ => Err(format!(
                "No such idle strategy `{s}`. The idle strategies are `sleep` and `spin`."
            )),
        }
    }

    fn variant(self, span: Span) -> syn::Ident {
        match self {
            Idle::Sleep => format_ident!("Sleep", span = span),
            Idle::Spin => format_ident!("Spin", span = span),
        }
    }
}

struct FinalConfig {
    idle: Option<Idle>,
}

struct ConfigBuilder {
    idle: Option<Idle>,
    is_test: bool,
}

impl ConfigBuilder {
    fn new(is_test: bool) -> Self {
        ConfigBuilder {
            idle: None,
            is_test,
        }
    }

    fn macro_name(&self) -> &'static str {
        if self.is_test {
            "corolo::test"
        } else {
            "corolo::main"
        }
    }

    fn set_idle(&mut self, idle: &syn::Lit, span: Span) -> Result<(), syn::Error> {
        if self.idle.is_some() {
            return Err(syn::Error::new(span, "`idle` set multiple times."));
        }

        let idle = parse_string(idle, span, "idle")?;
        self.idle = Some(Idle::from_str(&idle).map_err(|err| syn::Error::new(span, err))?);

        Ok(())
    }

    fn build(&self) -> FinalConfig {
        FinalConfig { idle: self.idle }
    }
}

fn build_config(
    input: &syn::ItemFn,
    args: AttributeArgs,
    is_test: bool,
) -> Result<FinalConfig, syn::Error> {
    if input.sig.asyncness.is_none() {
        let msg = "the `async` keyword is missing from the function declaration";
        return Err(syn::Error::new_spanned(input.sig.fn_token, msg));
    }

    let mut config = ConfigBuilder::new(is_test);
    let macro_name = config.macro_name();

    // The body is moved into a task, it can't borrow from arguments.
    if !input.sig.inputs.is_empty() {
        let msg = format!("functions marked with `#[{macro_name}]` cannot accept arguments");
        return Err(syn::Error::new_spanned(&input.sig.inputs, msg));
    }

    for arg in args {
        match arg {
            syn::Meta::NameValue(namevalue) => {
                let ident = namevalue
                    .path
                    .get_ident()
                    .ok_or_else(|| {
                        syn::Error::new_spanned(&namevalue, "Must have specified ident")
                    })?
                    .to_string()
                    .to_lowercase();
                let lit = match &namevalue.value {
                    syn::Expr::Lit(syn::ExprLit { lit, .. }) => lit,
                    expr => return Err(syn::Error::new_spanned(expr, "Must be a literal")),
                };
                match ident.as_str() {
                    "idle" => config.set_idle(lit, lit.span())?,
                    name => {
                        let msg =
                            format!("Unknown attribute {name} is specified; expected `idle`");
                        return Err(syn::Error::new_spanned(namevalue, msg));
                    }
                }
            }
            syn::Meta::Path(path) => {
                let name = path
                    .get_ident()
                    .ok_or_else(|| syn::Error::new_spanned(&path, "Must have specified ident"))?
                    .to_string()
                    .to_lowercase();
                let msg = match name.as_str() {
                    "sleep" | "spin" => {
                        format!("Set the idle strategy with #[{macro_name}(idle = \"{name}\")].")
                    }
                    "idle" => "The `idle` attribute requires an argument.".to_string(),
                    name => format!("Unknown attribute {name} is specified; expected `idle`."),
                };
                return Err(syn::Error::new_spanned(path, msg));
            }
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    "Unknown attribute inside the macro",
                ));
            }
        }
    }

    Ok(config.build())
}

fn parse_knobs(mut input: syn::ItemFn, is_test: bool, config: FinalConfig) -> TokenStream {
    input.sig.asyncness = None;

    // Type mismatches are reported on the last statement.
    let (last_stmt_start_span, last_stmt_end_span) = match input.block.stmts.last() {
        Some(stmt) => {
            let mut tokens = quote!(#stmt).into_iter();
            let start = tokens.next().map_or_else(Span::call_site, |t| t.span());
            let end = tokens.last().map_or(start, |t| t.span());
            (start, end)
        }
        None => (Span::call_site(), Span::call_site()),
    };

    let mut rt = quote_spanned! {last_stmt_start_span=>
        corolo::Builder::new()
    };

    if let Some(idle) = config.idle {
        let variant = idle.variant(last_stmt_start_span);
        rt = quote_spanned! {last_stmt_start_span=>
            #rt.idle(corolo::runtime::IdleStrategy::#variant)
        };
    }

    let generated_attrs = if is_test {
        quote! {
            #[::core::prelude::v1::test]
        }
    } else {
        quote! {}
    };

    // Inner attributes are not allowed on the block we expand into, lift them
    // onto the function.
    for attr in &mut input.attrs {
        attr.style = syn::AttrStyle::Outer;
    }

    let output_type = match &input.sig.output {
        syn::ReturnType::Default => quote! { () },
        syn::ReturnType::Type(_, ret_type) => quote! { #ret_type },
    };

    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;

    // Boxing names the output type, so `?` inside the body infers.
    let last_block = quote_spanned! {last_stmt_end_span=>
        #[allow(clippy::needless_return)]
        {
            return #rt.block_on(body);
        }
    };

    quote! {
        #(#attrs)*
        #generated_attrs
        #vis #sig {
            let body: ::core::pin::Pin<
                ::std::boxed::Box<dyn ::core::future::Future<Output = #output_type> + ::core::marker::Send>,
            > = ::std::boxed::Box::pin(async move #block);
            #last_block
        }
    }
}
