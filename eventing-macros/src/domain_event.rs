use crate::utils::{EventAttrConfig, apply_derives, ensure_required_fields, event_derives, named_fields};
use proc_macro2::TokenStream;
use quote::quote;
use syn::{ItemStruct, Type};

/// #[domain_event] 宏实现
/// - 缺失时追加字段：`aggregate_id: String`, `occurred_on: DateTime<Utc>`
/// - 生成 `::eventing::event::DomainEvent` 实现
/// - 参数：`event_type = "..."`（默认结构体名）
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> syn::Result<TokenStream> {
    let cfg = EventAttrConfig::parse(attr, &["event_type"])?;
    let mut st: ItemStruct = syn::parse2(item)?;

    apply_derives(&mut st.attrs, event_derives());

    let id_type: Type = syn::parse_quote! { String };
    let timestamp: Type = syn::parse_quote! { ::chrono::DateTime<::chrono::Utc> };
    ensure_required_fields(
        named_fields(&mut st, "domain_event")?,
        &[("aggregate_id", &id_type), ("occurred_on", &timestamp)],
    );

    let ident = &st.ident;
    let event_type = cfg
        .event_type
        .unwrap_or_else(|| syn::LitStr::new(&ident.to_string(), ident.span()));
    let (impl_generics, ty_generics, where_clause) = st.generics.split_for_impl();

    Ok(quote! {
        #st

        impl #impl_generics ::eventing::event::DomainEvent for #ident #ty_generics #where_clause {
            fn event_type(&self) -> &str {
                #event_type
            }

            fn aggregate_id(&self) -> &str {
                ::core::convert::AsRef::<str>::as_ref(&self.aggregate_id)
            }

            fn occurred_on(&self) -> ::chrono::DateTime<::chrono::Utc> {
                self.occurred_on
            }
        }
    })
}
