mod component;

use proc_macro::TokenStream;

/// Implement `rusty_blocks::ecs::Component` for a plain (POD) component type.
///
/// The type must also implement `bytemuck::Pod`, which is checked by the trait bound.
#[proc_macro_derive(Component)]
pub fn derive_component(item: TokenStream) -> TokenStream {
    component::derive_component(item)
}

/// Implement `rusty_blocks::ecs::SharedComponent` for a shared (per-archetype) component type.
#[proc_macro_derive(SharedComponent)]
pub fn derive_shared_component(item: TokenStream) -> TokenStream {
    component::derive_shared_component(item)
}
