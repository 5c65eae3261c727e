extern crate proc_macro;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::spanned::Spanned;

/// Derives `tlb::conv::Encode` for structs and enums.
///
/// Accepts the same `#[tlb(...)]` attributes as the `Decode` derive: the
/// struct or variant tag is written first, then every field in declaration
/// order, with `#[tlb(by_ref)]` fields placed in a new child cell.
#[proc_macro_derive(Encode, attributes(tlb))]
pub fn encode_derive(input: TokenStream) -> TokenStream {
    let ast = syn::parse_macro_input!(input as syn::DeriveInput);

    match impl_encode(&ast) {
        Ok(gen) => gen.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn impl_encode(ast: &syn::DeriveInput) -> syn::Result<TokenStream2> {
    let encode_trait = quote! { ::tlb::conv::Encode };
    let builder_type = quote! { ::tlb::builder::CellBuilder };
    let encode_result_type = quote! { ::tlb::conv::EncodeResult };

    let name = &ast.ident;
    let mut generics = ast.generics.clone();
    for param in generics.type_params_mut() {
        param.bounds.push(syn::parse_quote!(#encode_trait));
    }
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let body = match &ast.data {
        syn::Data::Union(_) => {
            return Err(syn::Error::new(
                ast.span(),
                "Derive macro `Encode` not implemented for unions",
            ))
        }
        syn::Data::Struct(syn::DataStruct { fields, .. }) => {
            let tag = write_tag(container_tag(&ast.attrs)?);
            let (pattern, writes) = destructure(quote! { Self }, fields)?;
            quote! {
                let #pattern = self;
                #tag
                #( #writes )*
                Ok(())
            }
        }
        syn::Data::Enum(syn::DataEnum { variants, .. }) => {
            if container_tag(&ast.attrs)?.is_some() {
                return Err(syn::Error::new(
                    ast.span(),
                    "tags go on enum variants, not on the enum itself",
                ));
            }
            let arms = variants
                .iter()
                .map(|v| {
                    let tag = container_tag(&v.attrs)?.ok_or_else(|| {
                        syn::Error::new_spanned(&v.ident, "enum variants require #[tlb(tag = \"...\")]")
                    })?;
                    let tag = write_tag(Some(tag));
                    let vname = &v.ident;
                    let (pattern, writes) = destructure(quote! { Self::#vname }, &v.fields)?;
                    Ok(quote! {
                        #pattern => {
                            #tag
                            #( #writes )*
                        }
                    })
                })
                .collect::<syn::Result<Vec<_>>>()?;
            quote! {
                match self {
                    #( #arms )*
                }
                Ok(())
            }
        }
    };

    Ok(quote! {
        impl #impl_generics #encode_trait for #name #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn write_to(&self, b: &mut #builder_type) -> #encode_result_type<()> {
                #body
            }
        }
    })
}

fn write_tag(tag: Option<syn::LitStr>) -> TokenStream2 {
    match tag {
        Some(tag) => quote! {
            const TAG: ::tlb::tag::Tag = ::tlb::tag::Tag::from_literal(#tag);
            b.store_tag(&TAG)?;
        },
        None => quote! {},
    }
}

/// Pattern binding every field of `path` by reference, and the statements
/// writing those bindings in declaration order
fn destructure(
    path: TokenStream2,
    fields: &syn::Fields,
) -> syn::Result<(TokenStream2, Vec<TokenStream2>)> {
    match fields {
        syn::Fields::Unit => Ok((path, Vec::new())),
        syn::Fields::Unnamed(syn::FieldsUnnamed { unnamed, .. }) => {
            let binds: Vec<_> = (0..unnamed.len()).map(|i| format_ident!("__f{}", i)).collect();
            let writes = unnamed
                .iter()
                .zip(&binds)
                .map(|(f, bind)| write_field(f, bind))
                .collect::<syn::Result<Vec<_>>>()?;
            Ok((quote! { #path( #( #binds ),* ) }, writes))
        }
        syn::Fields::Named(syn::FieldsNamed { named, .. }) => {
            let fnames: Vec<_> = named
                .iter()
                .enumerate()
                .map(|(i, f)| f.ident.clone().unwrap_or_else(|| format_ident!("__f{}", i)))
                .collect();
            let binds: Vec<_> = (0..named.len()).map(|i| format_ident!("__f{}", i)).collect();
            let writes = named
                .iter()
                .zip(&binds)
                .map(|(f, bind)| write_field(f, bind))
                .collect::<syn::Result<Vec<_>>>()?;
            Ok((quote! { #path { #( #fnames: #binds ),* } }, writes))
        }
    }
}

fn write_field(field: &syn::Field, bind: &syn::Ident) -> syn::Result<TokenStream2> {
    let ty = &field.ty;
    Ok(if field_by_ref(field)? {
        quote! { ::tlb::conv::write_ref::<#ty>(#bind, b)?; }
    } else {
        quote! { <#ty as ::tlb::conv::Encode>::write_to(#bind, b)?; }
    })
}

fn container_tag(attrs: &[syn::Attribute]) -> syn::Result<Option<syn::LitStr>> {
    let mut tag = None;
    for attr in attrs.iter().filter(|a| a.path().is_ident("tlb")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("tag") {
                let lit: syn::LitStr = meta.value()?.parse()?;
                tag = Some(lit);
                Ok(())
            } else {
                Err(meta.error("expected `tag = \"...\"`"))
            }
        })?;
    }
    Ok(tag.filter(|lit| !matches!(lit.value().as_str(), "#_" | "$_")))
}

fn field_by_ref(field: &syn::Field) -> syn::Result<bool> {
    let mut by_ref = false;
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("tlb")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("by_ref") {
                by_ref = true;
                Ok(())
            } else {
                Err(meta.error("expected `by_ref`"))
            }
        })?;
    }
    Ok(by_ref)
}
