//! # Setter Derive
//!
//! Derive macro that generates builder-style setters for plain configuration
//! structs such as the MMU configuration.

use proc_macro::TokenStream;
use quote::{ToTokens, format_ident, quote};
use syn::{Attribute, Data, DeriveInput, Field, Fields, LitBool, parse_macro_input, spanned::Spanned};

/// Derive to generate `.set_<field>(&mut self, value: Ty) -> &mut Self` and
/// `const .with_<field>(mut self, value: Ty) -> Self` for each **named** field.
///
/// The field's own `///` documentation is carried over to both generated
/// methods, so the setters show up documented in rustdoc.
///
/// - Skipping a field: `#[setters(skip)]` or `#[setters(skip = true)]`
///
/// # Example
///
/// ```
/// use mmu_accessors_derive::Setters;
///
/// #[derive(Default, Setters)]
/// struct Limits {
///     /// Number of slots.
///     slots: usize,
///     #[setters(skip)]
///     generation: u32,
/// }
///
/// let mut l = Limits::default();
/// l.set_slots(8).set_slots(16);
/// let l2 = l.with_slots(32);
/// assert_eq!(l2.slots, 32);
/// assert_eq!(l2.generation, 0);
/// ```
#[proc_macro_derive(Setters, attributes(setters))]
pub fn derive_setters(input: TokenStream) -> TokenStream {
    let DeriveInput {
        ident,
        generics,
        data,
        ..
    } = parse_macro_input!(input as DeriveInput);

    let fields = match named_fields(&ident, data) {
        Ok(fields) => fields,
        Err(e) => return e.to_compile_error().into(),
    };

    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
    let methods = fields
        .iter()
        .filter(|field| !should_skip(&field.attrs))
        .filter_map(setters_for);

    let expanded = quote! {
        impl #impl_generics #ident #ty_generics #where_clause {
            #(#methods)*
        }
    };

    TokenStream::from(expanded)
}

fn named_fields(ident: &syn::Ident, data: Data) -> syn::Result<Vec<Field>> {
    let Data::Struct(s) = data else {
        return Err(syn::Error::new(
            ident.span(),
            "Setters can only be derived for structs",
        ));
    };

    match s.fields {
        Fields::Named(n) => Ok(n.named.into_iter().collect()),
        Fields::Unnamed(u) => Err(syn::Error::new(
            u.span(),
            "Setters only supports named fields",
        )),
        Fields::Unit => Err(syn::Error::new(
            ident.span(),
            "Setters does not apply to unit structs",
        )),
    }
}

fn setters_for(field: &Field) -> Option<impl ToTokens> {
    let fname = field.ident.as_ref()?;
    let ty = &field.ty;
    let docs: Vec<&Attribute> = field
        .attrs
        .iter()
        .filter(|a| a.path().is_ident("doc"))
        .collect();

    let set_name = format_ident!("set_{}", fname);
    let with_name = format_ident!("with_{}", fname);

    Some(quote! {
        #(#docs)*
        #[inline]
        pub fn #set_name(&mut self, value: #ty) -> &mut Self {
            self.#fname = value;
            self
        }

        #(#docs)*
        #[inline]
        #[must_use]
        pub const fn #with_name(mut self, value: #ty) -> Self {
            self.#fname = value;
            self
        }
    })
}

fn should_skip(attrs: &[Attribute]) -> bool {
    let mut skip = false;
    for attr in attrs.iter().filter(|a| a.path().is_ident("setters")) {
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                skip = meta.input.is_empty() || meta.value()?.parse::<LitBool>()?.value;
            }
            Ok(())
        });
    }
    skip
}
