//! Derive macro for converting a struct into a variant of the Update Engine's
//! `Event` enum, mirroring `raiden`'s `IntoEvent`/`IntoStateChange` pair
//! narrowed to the one enum this workspace needs.
use proc_macro::TokenStream;
use quote::quote;
use syn::{
	parse_macro_input,
	DeriveInput,
};

/// Derive macro generating `impl From<Self> for Event` that wraps the type
/// in the identically-named `Event` variant.
#[proc_macro_derive(IntoEvent)]
pub fn into_event(input: TokenStream) -> TokenStream {
	let input = parse_macro_input!(input as DeriveInput);
	let name = input.ident;

	let expanded = quote! {
		impl From<#name> for Event {
			fn from(value: #name) -> Event {
				Event::#name(value)
			}
		}
	};

	TokenStream::from(expanded)
}
