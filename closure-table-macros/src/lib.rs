use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::{
    parse_macro_input, spanned::Spanned, Attribute, Data, DeriveInput, Fields, Ident, Path, Type,
};

#[proc_macro_derive(ClosureTreeModel, attributes(closure_tree))]
pub fn derive_closure_tree_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match impl_closure_tree_model(&input) {
        Ok(tokens) => tokens,
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct Options {
    id_field: Option<String>,
    id_type: Option<Type>,
    parent_field: Option<String>,
    level_field: Option<String>,
    closure_module: Option<Path>,
    closure_table: Option<String>,
    entity_name: Option<String>,
    closure_parent_field: Option<String>,
    closure_child_field: Option<String>,
    closure_depth_field: Option<String>,
    dependent: Option<Ident>,
    advisory_lock: Option<syn::LitStr>,
    rebuild_batch_size: Option<syn::LitInt>,
}

fn impl_closure_tree_model(input: &DeriveInput) -> syn::Result<TokenStream> {
    let struct_ident = &input.ident;

    let data_struct = match &input.data {
        Data::Struct(data) => data,
        _ => {
            return Err(syn::Error::new(
                input.span(),
                "ClosureTreeModel can only be derived for structs",
            ))
        }
    };

    let mut options = Options::default();
    let mut table_name: Option<String> = None;

    for attr in &input.attrs {
        if attr.path().is_ident("closure_tree") {
            parse_closure_tree_attr(attr, &mut options)?;
        }

        if attr.path().is_ident("sea_orm") {
            if let Some(name) = parse_sea_orm_table_name(attr)? {
                table_name = Some(name);
            }
        }
    }

    let id_field_name = options.id_field.unwrap_or_else(|| "id".to_string());
    let parent_field_name = options
        .parent_field
        .unwrap_or_else(|| "parent_id".to_string());
    let level_field_name = options.level_field.unwrap_or_else(|| "level".to_string());
    let closure_parent_name = options
        .closure_parent_field
        .unwrap_or_else(|| "parent_id".to_string());
    let closure_child_name = options
        .closure_child_field
        .unwrap_or_else(|| "child_id".to_string());
    let closure_depth_name = options
        .closure_depth_field
        .unwrap_or_else(|| "depth".to_string());

    let id_field_ident = Ident::new(&id_field_name, struct_ident.span());
    let parent_field_ident = Ident::new(&parent_field_name, struct_ident.span());
    let level_field_ident = Ident::new(&level_field_name, struct_ident.span());
    let closure_parent_ident = Ident::new(&closure_parent_name, struct_ident.span());
    let closure_child_ident = Ident::new(&closure_child_name, struct_ident.span());
    let closure_depth_ident = Ident::new(&closure_depth_name, struct_ident.span());

    let mut id_field_type: Option<Type> = options.id_type.clone();

    if let Fields::Named(ref fields) = data_struct.fields {
        for field in &fields.named {
            if let Some(ident) = &field.ident {
                if ident == &id_field_ident && id_field_type.is_none() {
                    id_field_type = Some(field.ty.clone());
                }
            }
        }
    } else {
        return Err(syn::Error::new(
            data_struct.fields.span(),
            "ClosureTreeModel requires named fields",
        ));
    }

    let id_type = id_field_type.ok_or_else(|| {
        syn::Error::new(
            struct_ident.span(),
            "Unable to determine id field type; specify `id_type = ...` in #[closure_tree]",
        )
    })?;

    let closure_module_path = options
        .closure_module
        .ok_or_else(|| syn::Error::new(struct_ident.span(), "`closure_module` must be set"))?;

    let entity_name = options
        .entity_name
        .unwrap_or_else(|| struct_ident.unraw().to_string());

    let base_table = table_name.unwrap_or_else(|| struct_ident.unraw().to_string());
    let closure_table = options
        .closure_table
        .unwrap_or_else(|| format!("{}_closure", base_table));

    let id_column_variant = format_ident!("{}", to_pascal_case(&id_field_name));
    let parent_column_variant = format_ident!("{}", to_pascal_case(&parent_field_name));
    let level_column_variant = format_ident!("{}", to_pascal_case(&level_field_name));
    let closure_parent_variant = format_ident!("{}", to_pascal_case(&closure_parent_name));
    let closure_child_variant = format_ident!("{}", to_pascal_case(&closure_child_name));
    let closure_depth_variant = format_ident!("{}", to_pascal_case(&closure_depth_name));

    let closure_table_literal = syn::LitStr::new(&closure_table, struct_ident.span());
    let entity_name_literal = syn::LitStr::new(&entity_name, struct_ident.span());

    let dependent_option = match options.dependent {
        Some(variant) => quote! {
            .dependent_behavior(::closure_table::DependentBehavior::#variant)
        },
        None => quote! {},
    };

    let advisory_lock_option = match options.advisory_lock {
        Some(key) if key.value() == "disabled" => quote! {
            .advisory_lock_strategy(::closure_table::AdvisoryLockStrategy::Disabled)
        },
        Some(key) => quote! {
            .advisory_lock_strategy(::closure_table::AdvisoryLockStrategy::Namespaced(
                ::closure_table::AdvisoryLockKey::new(#key),
            ))
        },
        None => quote! {},
    };

    let batch_option = match options.rebuild_batch_size {
        Some(batch) => quote! { .rebuild_batch_size(#batch) },
        None => quote! {},
    };

    let generated = quote! {
        impl ::closure_table::ClosureTreeModel for #struct_ident {
            type Entity = Entity;
            type ActiveModel = ActiveModel;
            type Id = #id_type;

            type ClosureEntity = #closure_module_path::Entity;
            type ClosureModel = #closure_module_path::Model;
            type ClosureActiveModel = #closure_module_path::ActiveModel;

            fn closure_tree_config() -> &'static ::closure_table::ClosureTreeConfig {
                static CONFIG: ::closure_table::__private::once_cell::sync::Lazy<
                    ::closure_table::ClosureTreeConfig,
                > = ::closure_table::__private::once_cell::sync::Lazy::new(|| {
                    let base = ::closure_table::ClosureTreeConfig::new(
                        #entity_name_literal,
                        #closure_table_literal,
                    );
                    ::closure_table::ClosureTreeOptions::default()
                        #dependent_option
                        #advisory_lock_option
                        #batch_option
                        .apply(base)
                });
                &CONFIG
            }

            fn id(&self) -> Self::Id {
                self.#id_field_ident.clone()
            }

            fn parent_id(&self) -> Option<Self::Id> {
                self.#parent_field_ident.clone()
            }

            fn level(&self) -> i32 {
                self.#level_field_ident
            }

            fn id_to_value(id: &Self::Id) -> ::sea_orm::Value {
                ::sea_orm::Value::from(id.clone())
            }

            fn active_id(active: &Self::ActiveModel) -> Option<Self::Id> {
                match &active.#id_field_ident {
                    ::sea_orm::ActiveValue::Set(value)
                    | ::sea_orm::ActiveValue::Unchanged(value) => Some(value.clone()),
                    ::sea_orm::ActiveValue::NotSet => None,
                }
            }

            fn active_parent(active: &Self::ActiveModel) -> Option<Option<Self::Id>> {
                match &active.#parent_field_ident {
                    ::sea_orm::ActiveValue::Set(value)
                    | ::sea_orm::ActiveValue::Unchanged(value) => Some(value.clone()),
                    ::sea_orm::ActiveValue::NotSet => None,
                }
            }

            fn set_parent(active: &mut Self::ActiveModel, parent: Option<Self::Id>) {
                active.#parent_field_ident = ::sea_orm::ActiveValue::Set(parent);
            }

            fn set_level(active: &mut Self::ActiveModel, level: i32) {
                active.#level_field_ident = ::sea_orm::ActiveValue::Set(level);
            }

            fn id_column() -> <Self::Entity as ::sea_orm::EntityTrait>::Column {
                Column::#id_column_variant
            }

            fn parent_column() -> <Self::Entity as ::sea_orm::EntityTrait>::Column {
                Column::#parent_column_variant
            }

            fn level_column() -> <Self::Entity as ::sea_orm::EntityTrait>::Column {
                Column::#level_column_variant
            }

            fn closure_parent_column() -> <Self::ClosureEntity as ::sea_orm::EntityTrait>::Column {
                #closure_module_path::Column::#closure_parent_variant
            }

            fn closure_child_column() -> <Self::ClosureEntity as ::sea_orm::EntityTrait>::Column {
                #closure_module_path::Column::#closure_child_variant
            }

            fn closure_depth_column() -> <Self::ClosureEntity as ::sea_orm::EntityTrait>::Column {
                #closure_module_path::Column::#closure_depth_variant
            }

            fn closure_model_parent(model: &Self::ClosureModel) -> Self::Id {
                model.#closure_parent_ident.clone()
            }

            fn closure_model_child(model: &Self::ClosureModel) -> Self::Id {
                model.#closure_child_ident.clone()
            }

            fn closure_model_depth(model: &Self::ClosureModel) -> i32 {
                model.#closure_depth_ident
            }

            #[allow(clippy::needless_update)]
            fn closure_build_row(
                parent: Self::Id,
                child: Self::Id,
                depth: i32,
            ) -> Self::ClosureActiveModel {
                #closure_module_path::ActiveModel {
                    #closure_parent_ident: ::sea_orm::ActiveValue::Set(parent),
                    #closure_child_ident: ::sea_orm::ActiveValue::Set(child),
                    #closure_depth_ident: ::sea_orm::ActiveValue::Set(depth),
                    ..::core::default::Default::default()
                }
            }
        }
    };

    Ok(generated.into())
}

fn parse_closure_tree_attr(attr: &Attribute, options: &mut Options) -> syn::Result<()> {
    attr.parse_nested_meta(|meta| {
        let ident = meta
            .path
            .get_ident()
            .ok_or_else(|| syn::Error::new(meta.path.span(), "Invalid option key"))?
            .to_string();

        match ident.as_str() {
            "id_field" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.id_field = Some(value.value());
            }
            "parent_field" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.parent_field = Some(value.value());
            }
            "level_field" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.level_field = Some(value.value());
            }
            "closure_module" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.closure_module = Some(parse_path(&value.value(), value.span())?);
            }
            "closure_table" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.closure_table = Some(value.value());
            }
            "entity_name" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.entity_name = Some(value.value());
            }
            "closure_parent_field" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.closure_parent_field = Some(value.value());
            }
            "closure_child_field" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.closure_child_field = Some(value.value());
            }
            "closure_depth_field" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.closure_depth_field = Some(value.value());
            }
            "dependent" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                let variant = match value.value().as_str() {
                    "ignore" => "Ignore",
                    "restrict" => "Restrict",
                    other => {
                        return Err(syn::Error::new(
                            value.span(),
                            format!("Unsupported dependent behavior `{other}`; expected `ignore` or `restrict`"),
                        ))
                    }
                };
                options.dependent = Some(Ident::new(variant, value.span()));
            }
            "advisory_lock" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.advisory_lock = Some(value);
            }
            "rebuild_batch_size" => {
                let value: syn::LitInt = meta.value()?.parse()?;
                value.base10_parse::<u64>()?;
                options.rebuild_batch_size = Some(value);
            }
            "id_type" => {
                let ty: Type = meta.value()?.parse()?;
                options.id_type = Some(ty);
            }
            other => {
                return Err(syn::Error::new(
                    meta.path.span(),
                    format!("Unsupported closure_tree option `{other}`"),
                ));
            }
        }

        Ok(())
    })
}

fn parse_sea_orm_table_name(attr: &Attribute) -> syn::Result<Option<String>> {
    let mut table_name: Option<String> = None;
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("table_name") {
            let value: syn::LitStr = meta.value()?.parse()?;
            table_name = Some(value.value());
        } else if meta.input.peek(syn::Token![=]) {
            let _: syn::Expr = meta.value()?.parse()?;
        }
        Ok(())
    })?;
    Ok(table_name)
}

fn parse_path(value: &str, span: proc_macro2::Span) -> syn::Result<Path> {
    syn::parse_str::<Path>(value).map_err(|_| syn::Error::new(span, "Invalid path"))
}

fn to_pascal_case(value: &str) -> String {
    value
        .split('_')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}
