use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::{Data, DeriveInput, Field, Fields, Ident, LitStr, Path, Type};

use crate::types::{generic_argument, option_inner, snake_case, sql_type_for, type_name};

struct HasMany {
    name: Ident,
    target: Path,
    column: String,
}

#[derive(Default)]
struct EntityAttrs {
    table: Option<String>,
    has_many: Vec<HasMany>,
}

#[derive(Default)]
struct FieldAttrs {
    id: bool,
    many_to_one: bool,
    column: Option<String>,
}

enum ColumnKind {
    Id,
    Scalar,
    ManyToOne(Type),
}

struct Column<'a> {
    ident: &'a Ident,
    property: String,
    column: String,
    nullable: bool,
    base: &'a Type,
    sql_type: &'static str,
    kind: ColumnKind,
}

fn parse_entity_attrs(input: &DeriveInput) -> syn::Result<EntityAttrs> {
    let mut attrs = EntityAttrs::default();
    for attr in &input.attrs {
        if !attr.path().is_ident("quarry") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                attrs.table = Some(meta.value()?.parse::<LitStr>()?.value());
                return Ok(());
            }
            if !meta.path.is_ident("has_many") {
                return Err(meta.error("expected `table` or `has_many(...)`"));
            }
            let mut name = None;
            let mut target = None;
            let mut column = None;
            meta.parse_nested_meta(|inner| {
                if inner.path.is_ident("name") {
                    let lit = inner.value()?.parse::<LitStr>()?;
                    name = Some(Ident::new(&lit.value(), lit.span()));
                } else if inner.path.is_ident("target") {
                    target = Some(inner.value()?.parse::<Path>()?);
                } else if inner.path.is_ident("column") {
                    column = Some(inner.value()?.parse::<LitStr>()?.value());
                } else {
                    return Err(inner.error("expected `name`, `target` or `column`"));
                }
                Ok(())
            })?;
            match (name, target, column) {
                (Some(name), Some(target), Some(column)) => {
                    attrs.has_many.push(HasMany {
                        name,
                        target,
                        column,
                    });
                    Ok(())
                }
                _ => Err(meta.error("has_many needs `name`, `target` and `column`")),
            }
        })?;
    }
    Ok(attrs)
}

fn parse_field_attrs(field: &Field) -> syn::Result<FieldAttrs> {
    let mut attrs = FieldAttrs::default();
    for attr in &field.attrs {
        if !attr.path().is_ident("quarry") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("id") {
                attrs.id = true;
            } else if meta.path.is_ident("many_to_one") {
                attrs.many_to_one = true;
            } else if meta.path.is_ident("column") {
                attrs.column = Some(meta.value()?.parse::<LitStr>()?.value());
            } else {
                return Err(meta.error("expected `id`, `many_to_one` or `column`"));
            }
            Ok(())
        })?;
    }
    Ok(attrs)
}

fn column_of(field: &Field) -> syn::Result<Column<'_>> {
    let ident = field
        .ident
        .as_ref()
        .ok_or_else(|| syn::Error::new_spanned(field, "Quarry Entity fields must be named"))?;
    let attrs = parse_field_attrs(field)?;
    let property = ident.unraw().to_string();
    let column = attrs.column.unwrap_or_else(|| property.clone());
    let (nullable, base) = match option_inner(&field.ty) {
        Some(inner) => (true, inner),
        None => (false, &field.ty),
    };

    let kind = if attrs.id {
        if !nullable || type_name(base).as_deref() != Some("i64") {
            return Err(syn::Error::new_spanned(
                &field.ty,
                "Quarry Entity id field must be Option<i64>",
            ));
        }
        ColumnKind::Id
    } else if attrs.many_to_one {
        let target = generic_argument(base, "LazyRef").ok_or_else(|| {
            syn::Error::new_spanned(
                &field.ty,
                "many_to_one fields must be LazyRef<T> or Option<LazyRef<T>>",
            )
        })?;
        ColumnKind::ManyToOne(target.clone())
    } else {
        ColumnKind::Scalar
    };

    let sql_type = match kind {
        ColumnKind::Id | ColumnKind::ManyToOne(_) => "BigInt",
        ColumnKind::Scalar => sql_type_for(base).ok_or_else(|| {
            syn::Error::new_spanned(
                &field.ty,
                format!("unsupported column type for `{}`", property),
            )
        })?,
    };

    Ok(Column {
        ident,
        property,
        column,
        nullable: nullable && !attrs.id,
        base,
        sql_type,
        kind,
    })
}

pub fn generate_entity(input: &DeriveInput) -> syn::Result<TokenStream> {
    let struct_name = &input.ident;
    let vis = &input.vis;

    let all_fields = if let Data::Struct(data) = &input.data {
        if let Fields::Named(fields) = &data.fields {
            &fields.named
        } else {
            return Err(syn::Error::new_spanned(
                &data.fields,
                "Quarry Entity only supports structs with named fields",
            ));
        }
    } else {
        return Err(syn::Error::new_spanned(
            input,
            "Quarry Entity only supports structs",
        ));
    };
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Quarry Entity does not support generic structs",
        ));
    }

    let attrs = parse_entity_attrs(input)?;
    let columns = all_fields
        .iter()
        .map(column_of)
        .collect::<syn::Result<Vec<_>>>()?;

    let ids: Vec<&Column> = columns
        .iter()
        .filter(|c| matches!(c.kind, ColumnKind::Id))
        .collect();
    let [id] = ids.as_slice() else {
        return Err(syn::Error::new_spanned(
            struct_name,
            "Quarry Entity needs exactly one #[quarry(id)] field",
        ));
    };

    let entity_name = struct_name.to_string();
    let default_alias = snake_case(&entity_name);
    let default_ctor = format_ident!("{}", default_alias);
    let table = attrs.table.clone().unwrap_or_else(|| default_alias.clone());
    let q_ident = format_ident!("Q{}", struct_name);
    let id_ident = id.ident;
    let id_column = &id.column;
    let column_count = columns.len();
    let q_doc = format!("Query path for [`{}`], one typed expression per column.", entity_name);

    let mut q_fields = Vec::new();
    let mut q_inits = Vec::new();
    let mut column_metas = Vec::new();
    let mut to_values = Vec::new();
    let mut from_values = Vec::new();
    let mut attach = Vec::new();

    for c in &columns {
        let ident = c.ident;
        let property = &c.property;
        let column = &c.column;
        let nullable = c.nullable;
        let primary_key = matches!(c.kind, ColumnKind::Id);
        let sql_type = format_ident!("{}", c.sql_type);

        match &c.kind {
            ColumnKind::Id | ColumnKind::Scalar => {
                let base = c.base;
                q_fields.push(quote! { pub #ident: ::quarry_core::Expr<#base> });
                q_inits.push(quote! { #ident: ::quarry_core::Expr::column(alias, #column, #property) });
                to_values.push(quote! { ::quarry_core::Value::from(self.#ident.clone()) });
                from_values.push(quote! { #ident: reader.next()? });
            }
            ColumnKind::ManyToOne(target) => {
                q_fields.push(quote! {
                    pub #ident: ::quarry_core::ManyToOne<<#target as ::quarry_core::Entity>::Path>
                });
                q_inits.push(quote! { #ident: ::quarry_core::ManyToOne::new(alias, #column, #property) });
                if nullable {
                    to_values.push(quote! {
                        ::quarry_core::Value::from(self.#ident.as_ref().map(::quarry_core::LazyRef::id))
                    });
                    from_values.push(quote! {
                        #ident: reader.next::<Option<i64>>()?.map(::quarry_core::LazyRef::new)
                    });
                    attach.push(quote! {
                        if let Some(reference) = &self.#ident {
                            reference.attach(identity_map);
                        }
                    });
                } else {
                    to_values.push(quote! { ::quarry_core::Value::from(self.#ident.id()) });
                    from_values.push(quote! {
                        #ident: ::quarry_core::LazyRef::new(reader.next::<i64>()?)
                    });
                    attach.push(quote! { self.#ident.attach(identity_map); });
                }
            }
        }

        let references = match &c.kind {
            ColumnKind::ManyToOne(target) => {
                quote! { Some(<#target as ::quarry_core::Entity>::meta) }
            }
            _ => quote! { None },
        };
        column_metas.push(quote! {
            ::quarry_core::ColumnMeta {
                name: #column,
                property: #property,
                sql_type: ::quarry_core::SqlType::#sql_type,
                nullable: #nullable,
                primary_key: #primary_key,
                references: #references,
            }
        });
    }

    for relation in &attrs.has_many {
        let name = &relation.name;
        let property = name.to_string();
        let target = &relation.target;
        let fk_column = &relation.column;
        q_fields.push(quote! {
            pub #name: ::quarry_core::OneToMany<<#target as ::quarry_core::Entity>::Path>
        });
        q_inits.push(quote! {
            #name: ::quarry_core::OneToMany::new(alias, #id_column, #fk_column, #property)
        });
    }

    let attach_impl = if attach.is_empty() {
        quote! {}
    } else {
        quote! {
            fn attach(&self, identity_map: &::quarry_core::IdentityMap) {
                #(#attach)*
            }
        }
    };

    Ok(quote! {
        #[doc = #q_doc]
        #[derive(Debug, Clone)]
        #vis struct #q_ident {
            quarry_alias: String,
            #(#q_fields,)*
        }

        impl #q_ident {
            pub fn new(alias: &str) -> Self {
                Self {
                    quarry_alias: alias.to_owned(),
                    #(#q_inits,)*
                }
            }

            /// The path under its default alias.
            pub fn #default_ctor() -> Self {
                Self::new(#default_alias)
            }
        }

        impl ::quarry_core::EntityPath for #q_ident {
            type Entity = #struct_name;

            fn with_alias(alias: &str) -> Self {
                Self::new(alias)
            }

            fn alias(&self) -> &str {
                &self.quarry_alias
            }
        }

        impl ::quarry_core::SelectItem for #q_ident {
            fn into_item(self) -> ::quarry_core::TupleItem {
                ::quarry_core::TupleItem::entity(&self)
            }
        }

        impl ::quarry_core::SelectItem for &#q_ident {
            fn into_item(self) -> ::quarry_core::TupleItem {
                ::quarry_core::TupleItem::entity(self)
            }
        }

        impl ::quarry_core::IntoProjection for #q_ident {
            type Projection = ::quarry_core::EntityProjection<#q_ident>;
            fn into_projection(self) -> Self::Projection {
                ::quarry_core::EntityProjection::new(self)
            }
        }

        impl ::quarry_core::IntoProjection for &#q_ident {
            type Projection = ::quarry_core::EntityProjection<#q_ident>;
            fn into_projection(self) -> Self::Projection {
                ::quarry_core::EntityProjection::new(self.clone())
            }
        }

        impl ::quarry_core::Entity for #struct_name {
            type Path = #q_ident;

            fn meta() -> &'static ::quarry_core::EntityMeta {
                static META: ::quarry_core::EntityMeta = ::quarry_core::EntityMeta {
                    name: #entity_name,
                    table: #table,
                    id_column: #id_column,
                    columns: &[#(#column_metas),*],
                };
                &META
            }

            fn id(&self) -> Option<i64> {
                self.#id_ident
            }

            fn set_id(&mut self, id: i64) {
                self.#id_ident = Some(id);
            }

            #[allow(clippy::clone_on_copy)]
            fn to_values(&self) -> Vec<::quarry_core::Value> {
                vec![#(#to_values),*]
            }

            fn from_values(
                values: Vec<::quarry_core::Value>,
            ) -> ::quarry_core::QuarryResult<Self> {
                let mut reader = ::quarry_core::ValueReader::new(#entity_name, #column_count, values)?;
                Ok(Self {
                    #(#from_values,)*
                })
            }

            #attach_impl
        }
    })
}
