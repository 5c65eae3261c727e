extern crate proc_macro;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::spanned::Spanned;

/// Derives `tlb::conv::Decode` for structs and enums.
///
/// * `#[tlb(tag = "#...")]` on a struct: the tag is checked before any field.
/// * `#[tlb(tag = "$...")]` on every enum variant: variants are tried in
///   declaration order and the first whose tag matches is decoded.
/// * `#[tlb(by_ref)]` on a field: the field is read from the next child
///   reference instead of inline.
#[proc_macro_derive(Decode, attributes(tlb))]
pub fn decode_derive(input: TokenStream) -> TokenStream {
    let ast = syn::parse_macro_input!(input as syn::DeriveInput);

    match impl_decode(&ast) {
        Ok(gen) => gen.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn impl_decode(ast: &syn::DeriveInput) -> syn::Result<TokenStream2> {
    let decode_trait = quote! { ::tlb::conv::Decode };
    let parser_type = quote! { ::tlb::parse::CellParser };
    let parse_result_type = quote! { ::tlb::parse::ParseResult };

    let name = &ast.ident;
    let name_str = name.to_string();
    let mut generics = ast.generics.clone();
    for param in generics.type_params_mut() {
        param.bounds.push(syn::parse_quote!(#decode_trait));
    }
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let body = match &ast.data {
        syn::Data::Union(_) => {
            return Err(syn::Error::new(
                ast.span(),
                "Derive macro `Decode` not implemented for unions",
            ))
        }
        syn::Data::Struct(syn::DataStruct { fields, .. }) => {
            let check = match container_tag(&ast.attrs)? {
                Some(tag) => quote! {
                    const TAG: ::tlb::tag::Tag = ::tlb::tag::Tag::from_literal(#tag);
                    p.expect_tag(&TAG, #name_str)?;
                },
                None => quote! {},
            };
            let ctor = construct(quote! { Self }, fields)?;
            quote! {
                #check
                Ok(#ctor)
            }
        }
        syn::Data::Enum(syn::DataEnum { variants, .. }) => {
            if container_tag(&ast.attrs)?.is_some() {
                return Err(syn::Error::new(
                    ast.span(),
                    "tags go on enum variants, not on the enum itself",
                ));
            }
            let tags = variants
                .iter()
                .map(|v| {
                    container_tag(&v.attrs)?.ok_or_else(|| {
                        syn::Error::new_spanned(&v.ident, "enum variants require #[tlb(tag = \"...\")]")
                    })
                })
                .collect::<syn::Result<Vec<_>>>()?;
            check_prefix_free(variants.iter().map(|v| &v.ident).zip(&tags))?;
            let arms = variants
                .iter()
                .zip(&tags)
                .map(|(v, tag)| {
                    let vname = &v.ident;
                    let ctor = construct(quote! { Self::#vname }, &v.fields)?;
                    Ok(quote! {
                        {
                            const TAG: ::tlb::tag::Tag = ::tlb::tag::Tag::from_literal(#tag);
                            if p.try_tag(&TAG)? {
                                return Ok(#ctor);
                            }
                        }
                    })
                })
                .collect::<syn::Result<Vec<_>>>()?;
            quote! {
                #( #arms )*
                Err(::tlb::parse::error::ParseError::no_matching_variant(#name_str))
            }
        }
    };

    Ok(quote! {
        impl #impl_generics #decode_trait for #name #ty_generics #where_clause {
            fn parse(p: &mut #parser_type<'_>) -> #parse_result_type<Self> {
                #body
            }
        }
    })
}

/// Expression building `path` from fields read in declaration order
fn construct(path: TokenStream2, fields: &syn::Fields) -> syn::Result<TokenStream2> {
    Ok(match fields {
        syn::Fields::Unit => path,
        syn::Fields::Unnamed(syn::FieldsUnnamed { unnamed, .. }) => {
            let readers = unnamed.iter().map(read_field).collect::<syn::Result<Vec<_>>>()?;
            quote! { #path( #( #readers ),* ) }
        }
        syn::Fields::Named(syn::FieldsNamed { named, .. }) => {
            let fname = named
                .iter()
                .enumerate()
                .map(|(i, f)| f.ident.clone().unwrap_or_else(|| format_ident!("_{}", i)));
            let readers = named.iter().map(read_field).collect::<syn::Result<Vec<_>>>()?;
            quote! { #path { #( #fname: #readers ),* } }
        }
    })
}

fn read_field(field: &syn::Field) -> syn::Result<TokenStream2> {
    let ty = &field.ty;
    Ok(if field_by_ref(field)? {
        quote! { ::tlb::conv::parse_ref::<#ty>(p)? }
    } else {
        quote! { <#ty as ::tlb::conv::Decode>::parse(p)? }
    })
}

/// Value of `#[tlb(tag = "...")]`, with the no-tag markers mapped to `None`
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

/// Rejects variant tags where one is a prefix of another, since lookahead in
/// declaration order could then pick the wrong variant
fn check_prefix_free<'a>(
    tags: impl Iterator<Item = (&'a syn::Ident, &'a syn::LitStr)>,
) -> syn::Result<()> {
    let parsed: Vec<_> = tags
        .filter_map(|(ident, lit)| tag_bits(&lit.value()).map(|bits| (ident, lit, bits)))
        .collect();
    for (i, (first, first_lit, a)) in parsed.iter().enumerate() {
        for (second, second_lit, b) in &parsed[i + 1..] {
            if is_prefix(*a, *b) || is_prefix(*b, *a) {
                return Err(syn::Error::new_spanned(
                    second,
                    format!(
                        "tag {} of `{}` and tag {} of `{}` overlap: one is a prefix of the other",
                        first_lit.value(),
                        first,
                        second_lit.value(),
                        second
                    ),
                ));
            }
        }
    }
    Ok(())
}

fn is_prefix((value, len): (u64, u32), (other, other_len): (u64, u32)) -> bool {
    if len > other_len {
        return false;
    }
    let shift = other_len - len;
    let head = if shift >= 64 { 0 } else { other >> shift };
    head == value
}

/// Value and width of a `#hex` or `$binary` tag literal, with a trailing `_`
/// completion tag resolved. Malformed literals give `None` and are reported
/// where the literal is expanded.
fn tag_bits(lit: &str) -> Option<(u64, u32)> {
    let body = lit.get(1..)?;
    let hex = match lit.get(..1)? {
        "#" => true,
        "$" => false,
        _ => return None,
    };
    let (digits, completion) = match body.strip_suffix('_') {
        Some(stripped) => (stripped, true),
        None => (body, false),
    };
    let mut value: u64 = 0;
    let mut len: u32 = 0;
    for c in digits.chars() {
        let (digit, width) = if hex {
            (c.to_digit(16)?, 4)
        } else {
            (c.to_digit(2)?, 1)
        };
        len += width;
        if len > 64 {
            return None;
        }
        value = (value << width) | u64::from(digit);
    }
    if completion {
        while len > 0 && value & 1 == 0 {
            value >>= 1;
            len -= 1;
        }
        if len == 0 {
            return None;
        }
        value >>= 1;
        len -= 1;
    }
    Some((value, len))
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
