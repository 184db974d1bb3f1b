//! ringcall-macros: the code-generation step behind `#[ringcall::interface]`.
//!
//! Applied to a trait definition, the macro generates everything the
//! dispatch runtime needs for that interface:
//!
//! - the trait itself, async-trait'd, with `Send + Sync + 'static`
//!   supertraits and a default no-op `on_batch_end` hook;
//! - `{Trait}Method`: a field-less enum identifying each declared method;
//! - `{Trait}Call`: the call enum — one variant per method carrying its
//!   arguments, plus `Empty` for a cleared slot — implementing
//!   `ringcall::RingCall`;
//! - `{Trait}Invoker`: the replay adapter implementing
//!   `ringcall::Invoker`, whose match is the method-to-invoker table;
//! - `{Trait}Proxy`: a cloneable proxy implementing the trait by capturing
//!   each call and publishing it, with a typed `create` constructor.
//!
//! Signature shapes the slot model cannot hold are rejected here, at
//! build time: non-`&self` receivers, generic methods, reference-typed
//! arguments, default method bodies, and the reserved name `on_batch_end`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, parse_quote, Error, FnArg, Ident, ItemTrait, Pat, ReturnType, TraitItem,
    TraitItemFn, Type,
};

/// Generates the dispatch surface for an interface trait.
///
/// # Example
///
/// ```ignore
/// #[ringcall::interface]
/// pub trait Listener {
///     async fn on_string(&self, value: String);
///     async fn on_float_and_int(&self, f: f32, i: i32);
/// }
///
/// // Generated alongside the trait:
/// // - ListenerMethod { OnString, OnFloatAndInt }
/// // - ListenerCall { Empty, OnString(String), OnFloatAndInt(f32, i32) }
/// // - ListenerInvoker (replays a ListenerCall onto an Arc<dyn Listener>)
/// // - ListenerProxy::create(&ring, strategy, implementations)
/// ```
///
/// Argument types must be `Clone + Debug + Send + Sync + 'static`: captured
/// values live in ring slots shared across tasks and are cloned out at
/// replay. Non-`()` return types must implement `Default`; the proxy
/// returns the default value whether the call was published or dropped.
#[proc_macro_attribute]
pub fn interface(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemTrait);

    match generate_interface(&input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

struct MethodInfo {
    name: Ident,
    variant: Ident,
    args: Vec<(Ident, Type)>,
    ret: Option<Type>,
}

fn generate_interface(input: &ItemTrait) -> syn::Result<TokenStream2> {
    if !input.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &input.generics,
            "ring-dispatched interfaces must not be generic",
        ));
    }

    let trait_ident = &input.ident;
    let vis = &input.vis;

    let call_enum = format_ident!("{}Call", trait_ident);
    let method_enum = format_ident!("{}Method", trait_ident);
    let invoker_struct = format_ident!("{}Invoker", trait_ident);
    let proxy_struct = format_ident!("{}Proxy", trait_ident);

    let methods: Vec<MethodInfo> = input
        .items
        .iter()
        .map(|item| match item {
            TraitItem::Fn(method) => parse_method(method),
            other => Err(Error::new_spanned(
                other,
                "ring-dispatched interfaces may only contain methods",
            )),
        })
        .collect::<syn::Result<Vec<_>>>()?;

    let output_trait = generate_trait(input);
    let enums = generate_enums(vis, trait_ident, &call_enum, &method_enum, &methods);
    let ring_call_impl = generate_ring_call_impl(&call_enum, &method_enum, &methods);
    let invoker = generate_invoker(vis, trait_ident, &call_enum, &invoker_struct, &methods);
    let proxy = generate_proxy(
        vis,
        trait_ident,
        &call_enum,
        &invoker_struct,
        &proxy_struct,
        &methods,
    );

    Ok(quote! {
        #output_trait
        #enums
        #ring_call_impl
        #invoker
        #proxy
    })
}

fn parse_method(method: &TraitItemFn) -> syn::Result<MethodInfo> {
    let sig = &method.sig;

    if sig.ident == "on_batch_end" {
        return Err(Error::new_spanned(
            &sig.ident,
            "`on_batch_end` is reserved: every interface gets an end-of-batch \
             hook automatically; override it on an implementation instead",
        ));
    }
    if method.default.is_some() {
        return Err(Error::new_spanned(
            sig,
            "interface methods must not have default bodies",
        ));
    }
    if sig.asyncness.is_none() {
        return Err(Error::new_spanned(
            sig,
            "interface methods must be `async fn`",
        ));
    }
    if !sig.generics.params.is_empty() || sig.generics.where_clause.is_some() {
        return Err(Error::new_spanned(
            &sig.generics,
            "interface methods must not be generic",
        ));
    }
    match sig.inputs.first() {
        Some(FnArg::Receiver(receiver))
            if receiver.reference.is_some() && receiver.mutability.is_none() => {}
        _ => {
            return Err(Error::new_spanned(
                sig,
                "interface methods must take `&self`",
            ));
        }
    }

    let mut args = Vec::new();
    for arg in sig.inputs.iter().skip(1) {
        let FnArg::Typed(pat_type) = arg else {
            return Err(Error::new_spanned(arg, "unexpected receiver"));
        };
        let Pat::Ident(pat_ident) = pat_type.pat.as_ref() else {
            return Err(Error::new_spanned(
                &pat_type.pat,
                "argument patterns must be plain identifiers",
            ));
        };
        if matches!(pat_type.ty.as_ref(), Type::Reference(_)) {
            return Err(Error::new_spanned(
                &pat_type.ty,
                "argument types must be owned: captured arguments live in \
                 ring slots shared across tasks",
            ));
        }
        args.push((pat_ident.ident.clone(), (*pat_type.ty).clone()));
    }

    let ret = match &sig.output {
        ReturnType::Default => None,
        ReturnType::Type(_, ty) => Some((**ty).clone()),
    };

    Ok(MethodInfo {
        name: sig.ident.clone(),
        variant: camel_case(&sig.ident),
        args,
        ret,
    })
}

/// `on_float_and_int` -> `OnFloatAndInt`, keeping the original span so
/// errors in generated code point at the method.
fn camel_case(ident: &Ident) -> Ident {
    let mut camel = String::new();
    let mut boundary = true;
    for ch in ident.to_string().chars() {
        if ch == '_' {
            boundary = true;
        } else if boundary {
            camel.extend(ch.to_uppercase());
            boundary = false;
        } else {
            camel.push(ch);
        }
    }
    format_ident!("{}", camel, span = ident.span())
}

/// Re-emits the trait with dispatch supertraits and the batch hook added.
fn generate_trait(input: &ItemTrait) -> TokenStream2 {
    let mut output = input.clone();
    output.supertraits.push(parse_quote!(::core::marker::Send));
    output.supertraits.push(parse_quote!(::core::marker::Sync));
    output.supertraits.push(parse_quote!('static));
    output.items.push(parse_quote! {
        /// Called after the last invocation of a contiguous batch has been
        /// replayed onto this implementation. The default does nothing;
        /// override it to make an implementation batch-aware.
        async fn on_batch_end(&self) {}
    });

    quote! {
        #[::ringcall::async_trait]
        #output
    }
}

fn generate_enums(
    vis: &syn::Visibility,
    trait_ident: &Ident,
    call_enum: &Ident,
    method_enum: &Ident,
    methods: &[MethodInfo],
) -> TokenStream2 {
    let variants: Vec<&Ident> = methods.iter().map(|m| &m.variant).collect();

    let call_variants = methods.iter().map(|m| {
        let variant = &m.variant;
        if m.args.is_empty() {
            quote! { #variant }
        } else {
            let types = m.args.iter().map(|(_, ty)| ty);
            quote! { #variant(#(#types),*) }
        }
    });

    let method_doc = format!("Identifies one method of [`{trait_ident}`].");
    let call_doc = format!(
        "One captured invocation of [`{trait_ident}`]: the slot payload of its \
         dispatch ring.\n\nThe discriminant is the method identifier and the \
         variant fields are the argument holder; `Empty` is the cleared state \
         every slot is preallocated with."
    );

    quote! {
        #[doc = #method_doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #vis enum #method_enum {
            #(#variants),*
        }

        #[doc = #call_doc]
        #[derive(Debug, Default)]
        #vis enum #call_enum {
            /// Cleared slot: no invocation captured.
            #[default]
            Empty,
            #(#call_variants),*
        }
    }
}

fn generate_ring_call_impl(
    call_enum: &Ident,
    method_enum: &Ident,
    methods: &[MethodInfo],
) -> TokenStream2 {
    let variants: Vec<&Ident> = methods.iter().map(|m| &m.variant).collect();

    quote! {
        impl ::ringcall::RingCall for #call_enum {
            type Method = #method_enum;

            const METHODS: &'static [#method_enum] = &[
                #(#method_enum::#variants),*
            ];

            fn method(&self) -> ::core::option::Option<#method_enum> {
                match self {
                    Self::Empty => ::core::option::Option::None,
                    #(Self::#variants { .. } => ::core::option::Option::Some(#method_enum::#variants),)*
                }
            }

            fn clear(&mut self) {
                *self = Self::Empty;
            }
        }
    }
}

fn generate_invoker(
    vis: &syn::Visibility,
    trait_ident: &Ident,
    call_enum: &Ident,
    invoker_struct: &Ident,
    methods: &[MethodInfo],
) -> TokenStream2 {
    let replay_arms = methods.iter().map(|m| {
        let name = &m.name;
        let variant = &m.variant;
        if m.args.is_empty() {
            quote! {
                #call_enum::#variant => {
                    let _ = self.0.#name().await;
                }
            }
        } else {
            let arg_names: Vec<&Ident> = m.args.iter().map(|(name, _)| name).collect();
            quote! {
                #call_enum::#variant(#(#arg_names),*) => {
                    let _ = self.0.#name(#(#arg_names.clone()),*).await;
                }
            }
        }
    });

    let invoker_doc = format!(
        "Replays captured [`{call_enum}`] invocations onto one \
         [`{trait_ident}`] implementation.\n\nThe `replay` match is the \
         method-identifier-to-invoker table, compiled to a jump table."
    );

    quote! {
        #[doc = #invoker_doc]
        #vis struct #invoker_struct(#vis ::std::sync::Arc<dyn #trait_ident>);

        #[::ringcall::async_trait]
        impl ::ringcall::Invoker<#call_enum> for #invoker_struct {
            async fn replay(&self, call: &#call_enum) {
                match call {
                    #call_enum::Empty => {}
                    #(#replay_arms)*
                }
            }

            async fn end_of_batch(&self) {
                self.0.on_batch_end().await;
            }
        }
    }
}

fn generate_proxy(
    vis: &syn::Visibility,
    trait_ident: &Ident,
    call_enum: &Ident,
    invoker_struct: &Ident,
    proxy_struct: &Ident,
    methods: &[MethodInfo],
) -> TokenStream2 {
    let proxy_methods = methods.iter().map(|m| {
        let name = &m.name;
        let variant = &m.variant;
        let arg_names: Vec<&Ident> = m.args.iter().map(|(name, _)| name).collect();
        let params = m.args.iter().map(|(name, ty)| quote! { #name: #ty });

        let capture = if m.args.is_empty() {
            quote! { #call_enum::#variant }
        } else {
            quote! { #call_enum::#variant(#(#arg_names),*) }
        };

        match &m.ret {
            None => quote! {
                async fn #name(&self, #(#params),*) {
                    self.inner.dispatch(#capture).await;
                }
            },
            Some(ty) => quote! {
                async fn #name(&self, #(#params),*) -> #ty {
                    self.inner.dispatch(#capture).await;
                    // The real result is produced later, on a consumer
                    // task; fire-and-forget callers get the default.
                    ::core::default::Default::default()
                }
            },
        }
    });

    let proxy_doc = format!(
        "Ring-backed proxy implementing [`{trait_ident}`].\n\nEvery call is \
         captured as a [`{call_enum}`] and published to the dispatch ring; \
         the work happens later, on the consumer task of each attached \
         implementation. Cloning is cheap and clones share the ring."
    );
    let create_doc = format!(
        "Attaches `implementations` to `ring` and returns a proxy publishing \
         under `strategy`.\n\nEach implementation gets its own consumer \
         task; more than one adds a reset stage that clears each slot once \
         the whole group has released it. Must be called within a Tokio \
         runtime.\n\n# Errors\n\nReturns \
         [`BuildError`](::ringcall::BuildError) if the ring has no \
         fatal-error handler registered or `implementations` is empty."
    );

    quote! {
        #[doc = #proxy_doc]
        #[derive(Clone)]
        #vis struct #proxy_struct {
            inner: ::ringcall::DispatchProxy<#call_enum>,
        }

        impl #proxy_struct {
            #[doc = #create_doc]
            #vis fn create(
                ring: &::ringcall::DispatchRing<#call_enum>,
                strategy: ::ringcall::OverflowStrategy,
                implementations: ::std::vec::Vec<::std::sync::Arc<dyn #trait_ident>>,
            ) -> ::core::result::Result<Self, ::ringcall::BuildError> {
                let invokers: ::std::vec::Vec<
                    ::std::sync::Arc<dyn ::ringcall::Invoker<#call_enum>>,
                > = implementations
                    .into_iter()
                    .map(
                        |implementation| -> ::std::sync::Arc<
                            dyn ::ringcall::Invoker<#call_enum>,
                        > {
                            ::std::sync::Arc::new(#invoker_struct(implementation))
                        },
                    )
                    .collect();

                ::core::result::Result::Ok(Self {
                    inner: ::ringcall::create_proxy(ring, strategy, invokers)?,
                })
            }

            /// The overflow strategy this proxy was created with.
            #vis fn strategy(&self) -> ::ringcall::OverflowStrategy {
                self.inner.strategy()
            }
        }

        #[::ringcall::async_trait]
        impl #trait_ident for #proxy_struct {
            #(#proxy_methods)*
        }
    }
}
