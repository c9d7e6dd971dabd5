use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, parse_macro_input};

pub fn derive_component(input: TokenStream) -> TokenStream {
    // Parse the input tokens into a syntax tree
    let ast = parse_macro_input!(input as DeriveInput);

    // Get the struct name we are annotating
    let struct_name = &ast.ident;
    let (impl_generics, type_generics, where_clause) = ast.generics.split_for_impl();

    // Use ::rusty_blocks::ecs::Component which works both inside and outside the crate.
    // Inside the crate, this works because of `extern crate self as rusty_blocks;` in lib.rs
    // Outside the crate, this naturally resolves to the rusty_blocks dependency.
    TokenStream::from(quote! {
        impl #impl_generics ::rusty_blocks::ecs::Component for #struct_name #type_generics #where_clause {
        }
    })
}

pub fn derive_shared_component(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);

    let struct_name = &ast.ident;
    let (impl_generics, type_generics, where_clause) = ast.generics.split_for_impl();

    TokenStream::from(quote! {
        impl #impl_generics ::rusty_blocks::ecs::SharedComponent for #struct_name #type_generics #where_clause {
        }
    })
}
