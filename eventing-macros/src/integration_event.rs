use crate::utils::{EventAttrConfig, apply_derives, ensure_required_fields, event_derives, named_fields};
use proc_macro2::TokenStream;
use quote::quote;
use syn::{ItemStruct, Type};

/// #[integration_event] 宏实现
/// - 仅支持具名字段结构体
/// - 缺失时追加字段：`published_at: DateTime<Utc>`
/// - 生成 `::eventing::event::IntegrationEvent` 实现（EVENT_TYPE/VERSION/published_at）
/// - 参数：`event_type = "..."`（默认结构体名）、`version = N`（默认 1）
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> syn::Result<TokenStream> {
    let cfg = EventAttrConfig::parse(attr, &["event_type", "version"])?;
    let mut st: ItemStruct = syn::parse2(item)?;

    apply_derives(&mut st.attrs, event_derives());

    let timestamp: Type = syn::parse_quote! { ::chrono::DateTime<::chrono::Utc> };
    ensure_required_fields(
        named_fields(&mut st, "integration_event")?,
        &[("published_at", &timestamp)],
    );

    let ident = &st.ident;
    let event_type = cfg
        .event_type
        .unwrap_or_else(|| syn::LitStr::new(&ident.to_string(), ident.span()));
    let version = cfg.version.unwrap_or_else(|| syn::parse_quote! { 1 });
    let (impl_generics, ty_generics, where_clause) = st.generics.split_for_impl();

    Ok(quote! {
        #st

        impl #impl_generics ::eventing::event::IntegrationEvent for #ident #ty_generics #where_clause {
            const EVENT_TYPE: &'static str = #event_type;
            const VERSION: u32 = #version;

            fn published_at(&self) -> ::chrono::DateTime<::chrono::Utc> {
                self.published_at
            }
        }
    })
}
