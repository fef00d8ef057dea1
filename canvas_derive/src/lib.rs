//! Attribute macro that wraps a function body so any `Err` it returns carries
//! an extra formatted context string, the way `anyhow::Context::context` does
//! for a single call site but applied to the whole function body.
//!
//! ```ignore
//! #[context("opening tile store at {path:?}")]
//! fn open(path: &Path) -> anyhow::Result<Store> { ... }
//! ```
//!
//! expands (sync case) to roughly:
//!
//! ```ignore
//! fn open(path: &Path) -> anyhow::Result<Store> {
//!     anyhow::Context::with_context((|| -> anyhow::Result<Store> { ... })(), || format!("opening tile store at {path:?}"))
//! }
//! ```
//!
//! The format string is evaluated lazily, only on the error path, and can
//! reference the function's own parameters by name since the closure/async
//! block that wraps the body is nested inside the original function's scope.

mod args;

use args::Args;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{ItemFn, parse2};

fn context_impl(attr: TokenStream2, item: TokenStream2) -> syn::Result<TokenStream2> {
	let Args(move_token, format_args) = parse2(attr)?;
	let ItemFn {
		attrs,
		vis,
		sig,
		block,
	} = parse2(item)?;

	let output = &sig.output;

	let wrapped = if sig.asyncness.is_some() {
		quote! {
			anyhow::Context::with_context(
				(#move_token async #block).await,
				|| format!(#format_args),
			)
		}
	} else {
		quote! {
			anyhow::Context::with_context(
				(#move_token || #output #block)(),
				|| format!(#format_args),
			)
		}
	};

	Ok(quote! {
		#(#attrs)*
		#vis #sig {
			#wrapped
		}
	})
}

#[proc_macro_attribute]
pub fn context(attr: proc_macro::TokenStream, item: proc_macro::TokenStream) -> proc_macro::TokenStream {
	match context_impl(attr.into(), item.into()) {
		Ok(tokens) => tokens.into(),
		Err(err) => err.to_compile_error().into(),
	}
}
