use proc_macro2::Span;
use quote::ToTokens;
use syn::parse::Parser;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{Attribute, Field, FieldsNamed, Ident, ItemStruct, Token, Type};

// 提取非 derive 属性与已有 derive 列表
fn split_derives(attrs: &[Attribute]) -> (Vec<Attribute>, Vec<syn::Path>) {
    let mut retained = Vec::new();
    let mut existing = Vec::new();
    for attr in attrs.iter() {
        if attr.path().is_ident("derive") {
            if let Ok(list) =
                attr.parse_args_with(Punctuated::<syn::Path, Token![,]>::parse_terminated)
            {
                existing.extend(list);
            }
        } else {
            retained.push(attr.clone());
        }
    }
    (retained, existing)
}

// 归一化 derive 的 key，避免 Serialize/serde::Serialize 重复
fn derive_key(p: &syn::Path) -> String {
    match p.segments.last() {
        Some(last) => last.ident.to_string(),
        None => p.to_token_stream().to_string(),
    }
}

/// 合并默认派生与已有派生（去重，默认派生在前）
pub(crate) fn apply_derives(attrs: &mut Vec<Attribute>, required: Vec<syn::Path>) {
    let (retained, existing) = split_derives(attrs);

    let mut seen = std::collections::HashSet::<String>::new();
    let merged: Vec<syn::Path> = required
        .into_iter()
        .chain(existing)
        .filter(|p| seen.insert(derive_key(p)))
        .collect();

    let derive: Attribute = syn::parse_quote!(#[derive(#(#merged),*)]);
    *attrs = std::iter::once(derive).chain(retained).collect();
}

/// 事件载荷的默认派生：Debug, Clone, PartialEq, Serialize, Deserialize
pub(crate) fn event_derives() -> Vec<syn::Path> {
    vec![
        syn::parse_quote!(Debug),
        syn::parse_quote!(Clone),
        syn::parse_quote!(PartialEq),
        syn::parse_quote!(serde::Serialize),
        syn::parse_quote!(serde::Deserialize),
    ]
}

/// 缺失的字段按给定顺序插入到最前，已有字段保持原样
pub(crate) fn ensure_required_fields(fields_named: &mut FieldsNamed, required: &[(&str, &Type)]) {
    let old_named = fields_named.named.clone();
    let mut new_named: Punctuated<Field, Token![,]> = Punctuated::new();

    for (name, ty) in required.iter() {
        if !has_field(&old_named, name) {
            let ident = Ident::new(name, Span::call_site());
            new_named.push(syn::parse_quote! { pub #ident: #ty });
        }
    }
    new_named.extend(old_named);

    fields_named.named = new_named;
}

fn has_field(named: &Punctuated<Field, Token![,]>, name: &str) -> bool {
    named
        .iter()
        .any(|f| f.ident.as_ref().map(|i| i == name).unwrap_or(false))
}

/// 取出具名字段结构体的字段列表
pub(crate) fn named_fields<'a>(
    st: &'a mut ItemStruct,
    macro_name: &str,
) -> syn::Result<&'a mut FieldsNamed> {
    let span = st.span();
    match &mut st.fields {
        syn::Fields::Named(f) => Ok(f),
        _ => Err(syn::Error::new(
            span,
            format!("#[{macro_name}] only supports named-field struct"),
        )),
    }
}

/// `key = "..."` / `key = N` 形式的属性参数
#[derive(Default)]
pub(crate) struct EventAttrConfig {
    pub(crate) event_type: Option<syn::LitStr>,
    pub(crate) version: Option<syn::LitInt>,
}

impl EventAttrConfig {
    pub(crate) fn parse(
        attr: proc_macro2::TokenStream,
        allowed: &[&str],
    ) -> syn::Result<Self> {
        let mut cfg = Self::default();
        if attr.is_empty() {
            return Ok(cfg);
        }

        let pairs = Punctuated::<syn::MetaNameValue, Token![,]>::parse_terminated.parse2(attr)?;

        for kv in pairs {
            let key = kv
                .path
                .get_ident()
                .map(|i| i.to_string())
                .unwrap_or_default();

            match key.as_str() {
                "event_type" if allowed.contains(&"event_type") => {
                    if cfg.event_type.is_some() {
                        return Err(duplicate(&kv));
                    }
                    cfg.event_type = Some(lit_str(&kv)?);
                }
                "version" if allowed.contains(&"version") => {
                    if cfg.version.is_some() {
                        return Err(duplicate(&kv));
                    }
                    let lit = lit_int(&kv)?;
                    if lit.base10_parse::<u32>()? == 0 {
                        return Err(syn::Error::new(lit.span(), "'version' must be positive"));
                    }
                    cfg.version = Some(lit);
                }
                _ => {
                    return Err(syn::Error::new(
                        kv.path.span(),
                        format!("unknown key; expected {}", allowed.join(" | ")),
                    ));
                }
            }
        }

        Ok(cfg)
    }
}

fn duplicate(kv: &syn::MetaNameValue) -> syn::Error {
    syn::Error::new(
        kv.path.span(),
        format!("duplicate key '{}' in attribute", kv.path.to_token_stream()),
    )
}

fn lit_str(kv: &syn::MetaNameValue) -> syn::Result<syn::LitStr> {
    match &kv.value {
        syn::Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Str(lit),
            ..
        }) => Ok(lit.clone()),
        other => Err(syn::Error::new(other.span(), "expected string literal")),
    }
}

fn lit_int(kv: &syn::MetaNameValue) -> syn::Result<syn::LitInt> {
    match &kv.value {
        syn::Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Int(lit),
            ..
        }) => Ok(lit.clone()),
        other => Err(syn::Error::new(other.span(), "expected integer literal")),
    }
}
