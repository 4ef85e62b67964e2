use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::{Attribute, Data, DeriveInput, Fields, Ident};

/// `#[projection(constructor = new)]`.
fn constructor_of(attrs: &[Attribute]) -> syn::Result<Option<Ident>> {
    let mut constructor = None;
    for attr in attrs {
        if !attr.path().is_ident("projection") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("constructor") {
                constructor = Some(meta.value()?.parse::<Ident>()?);
                Ok(())
            } else {
                Err(meta.error("expected `constructor = <fn>`"))
            }
        })?;
    }
    Ok(constructor)
}

pub fn generate_projection(input: &DeriveInput) -> syn::Result<TokenStream> {
    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = if let Data::Struct(data) = &input.data {
        if let Fields::Named(fields) = &data.fields {
            &fields.named
        } else {
            return Err(syn::Error::new_spanned(
                &data.fields,
                "Quarry Projection only supports structs with named fields",
            ));
        }
    } else {
        return Err(syn::Error::new_spanned(
            input,
            "Quarry Projection only supports structs",
        ));
    };

    let constructor = constructor_of(&input.attrs)?;
    let target = struct_name.to_string();
    let arity = fields.len();

    let mut setters = Vec::new();
    let mut field_arms = Vec::new();
    let mut bean_arms = Vec::new();
    let mut idents = Vec::new();

    for field in fields {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let ty = &field.ty;
        let property = ident.unraw().to_string();
        let setter = format_ident!("set_{}", ident);

        setters.push(quote! {
            pub fn #setter(&mut self, #ident: #ty) {
                self.#ident = #ident;
            }
        });
        field_arms.push(quote! {
            #property => self.#ident = ::quarry_core::FromValue::from_value(value)?,
        });
        bean_arms.push(quote! {
            #property => self.#setter(::quarry_core::FromValue::from_value(value)?),
        });
        idents.push(ident);
    }

    let next_arg = quote! {
        ::quarry_core::FromValue::from_value(args.next().unwrap_or(::quarry_core::Value::Null))?
    };
    let args: Vec<TokenStream> = idents.iter().map(|_| next_arg.clone()).collect();
    let construct = match &constructor {
        Some(ctor) => quote! { Self::#ctor(#(#args),*) },
        None => quote! { Self { #(#idents: #args),* } },
    };

    Ok(quote! {
        impl #impl_generics #struct_name #ty_generics #where_clause {
            #(#setters)*
        }

        impl #impl_generics ::quarry_core::FieldTarget for #struct_name #ty_generics #where_clause {
            fn set_field(
                &mut self,
                name: &str,
                value: ::quarry_core::Value,
            ) -> ::quarry_core::QuarryResult<()> {
                match name {
                    #(#field_arms)*
                    _ => {
                        return Err(::quarry_core::QuarryError::UnknownProperty {
                            target: #target,
                            property: name.to_owned(),
                        });
                    }
                }
                Ok(())
            }
        }

        impl #impl_generics ::quarry_core::BeanTarget for #struct_name #ty_generics #where_clause {
            fn set_property(
                &mut self,
                name: &str,
                value: ::quarry_core::Value,
            ) -> ::quarry_core::QuarryResult<()> {
                match name {
                    #(#bean_arms)*
                    _ => {
                        return Err(::quarry_core::QuarryError::UnknownProperty {
                            target: #target,
                            property: name.to_owned(),
                        });
                    }
                }
                Ok(())
            }
        }

        impl #impl_generics ::quarry_core::ConstructorTarget for #struct_name #ty_generics #where_clause {
            fn construct(
                args: Vec<::quarry_core::Value>,
            ) -> ::quarry_core::QuarryResult<Self> {
                if args.len() != #arity {
                    return Err(::quarry_core::QuarryError::ArityMismatch {
                        target: #target,
                        expected: #arity,
                        found: args.len(),
                    });
                }
                let mut args = args.into_iter();
                Ok(#construct)
            }
        }
    })
}
