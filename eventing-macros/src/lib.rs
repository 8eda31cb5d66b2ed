use proc_macro::TokenStream;

mod domain_event;
mod integration_event;
mod utils;

/// 集成事件宏
/// - 作用于具名字段结构体，追加 `published_at` 字段（若缺失）
/// - 合并派生：Debug, Clone, PartialEq, Serialize, Deserialize
/// - 实现 `::eventing::event::IntegrationEvent`
///
/// ```ignore
/// #[integration_event(event_type = "OrderCreated", version = 2)]
/// pub struct OrderCreated {
///     pub id: u64,
/// }
/// ```
#[proc_macro_attribute]
pub fn integration_event(attr: TokenStream, item: TokenStream) -> TokenStream {
    integration_event::expand(attr.into(), item.into())
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// 领域事件宏
/// - 作用于具名字段结构体，追加 `aggregate_id`、`occurred_on` 字段（若缺失）
/// - 合并派生：Debug, Clone, PartialEq, Serialize, Deserialize
/// - 实现 `::eventing::event::DomainEvent`
#[proc_macro_attribute]
pub fn domain_event(attr: TokenStream, item: TokenStream) -> TokenStream {
    domain_event::expand(attr.into(), item.into())
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
