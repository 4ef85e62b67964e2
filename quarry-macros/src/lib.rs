use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod entity;
mod projection;
mod types;

/// Derives `quarry_core::Entity` and a `Q<Name>` query path type.
///
/// ```ignore
/// #[derive(Debug, Clone, Entity)]
/// #[quarry(table = "team", has_many(name = "members", target = Member, column = "team_id"))]
/// pub struct Team {
///     #[quarry(id, column = "team_id")]
///     id: Option<i64>,
///     name: String,
/// }
/// ```
#[proc_macro_derive(Entity, attributes(quarry))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match entity::generate_entity(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

/// Derives setter, field and constructor mapping for a DTO.
#[proc_macro_derive(Projection, attributes(projection))]
pub fn derive_projection(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match projection::generate_projection(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

#[cfg(test)]
mod tests {
    use syn::parse_quote;

    use super::*;

    fn member() -> DeriveInput {
        parse_quote! {
            #[quarry(table = "member")]
            pub struct Member {
                #[quarry(id, column = "member_id")]
                id: Option<i64>,
                username: Option<String>,
                age: i32,
                #[quarry(many_to_one, column = "team_id")]
                team: Option<LazyRef<Team>>,
            }
        }
    }

    #[test]
    fn entity_generates_path_type_and_metadata() {
        let tokens = entity::generate_entity(&member()).unwrap().to_string().replace(' ', "");
        assert!(tokens.contains("pubstructQMember"));
        assert!(tokens.contains("pubfnmember()->Self"));
        assert!(tokens.contains("\"member_id\""));
        assert!(tokens.contains("table:\"member\""));
        assert!(tokens.contains("ManyToOne<<Teamas::quarry_core::Entity>::Path>"));
        assert!(tokens.contains("references:Some(<Teamas::quarry_core::Entity>::meta)"));
    }

    #[test]
    fn entity_maps_optional_columns_as_nullable() {
        let tokens = entity::generate_entity(&member()).unwrap().to_string().replace(' ', "");
        assert!(tokens.contains(
            "name:\"username\",property:\"username\",sql_type:::quarry_core::SqlType::Text,nullable:true"
        ));
        assert!(tokens.contains(
            "name:\"age\",property:\"age\",sql_type:::quarry_core::SqlType::Integer,nullable:false"
        ));
    }

    #[test]
    fn entity_attaches_many_to_one_references() {
        let tokens = entity::generate_entity(&member()).unwrap().to_string().replace(' ', "");
        assert!(tokens.contains("fnattach"));
        assert!(tokens.contains("reader.next::<Option<i64>>()?.map(::quarry_core::LazyRef::new)"));
    }

    #[test]
    fn entity_without_references_keeps_default_attach() {
        let input: DeriveInput = parse_quote! {
            struct Hello {
                #[quarry(id)]
                id: Option<i64>,
            }
        };
        let tokens = entity::generate_entity(&input).unwrap().to_string().replace(' ', "");
        assert!(!tokens.contains("fnattach"));
        assert!(tokens.contains("table:\"hello\""));
    }

    #[test]
    fn has_many_adds_one_to_many_path() {
        let input: DeriveInput = parse_quote! {
            #[quarry(table = "team", has_many(name = "members", target = Member, column = "team_id"))]
            struct Team {
                #[quarry(id, column = "team_id")]
                id: Option<i64>,
                name: String,
            }
        };
        let tokens = entity::generate_entity(&input).unwrap().to_string().replace(' ', "");
        assert!(tokens.contains("pubmembers:::quarry_core::OneToMany"));
        assert!(tokens.contains("OneToMany::new(alias,\"team_id\",\"team_id\",\"members\")"));
    }

    #[test]
    fn entity_requires_optional_i64_id() {
        let input: DeriveInput = parse_quote! {
            struct Member {
                #[quarry(id)]
                id: i32,
            }
        };
        let err = entity::generate_entity(&input).unwrap_err();
        assert!(err.to_string().contains("Option<i64>"));
    }

    #[test]
    fn entity_requires_exactly_one_id() {
        let input: DeriveInput = parse_quote! {
            struct Member {
                age: i32,
            }
        };
        let err = entity::generate_entity(&input).unwrap_err();
        assert!(err.to_string().contains("exactly one"));
    }

    #[test]
    fn entity_rejects_tuple_struct() {
        let input: DeriveInput = parse_quote! {
            struct Member(i64, String);
        };
        let err = entity::generate_entity(&input).unwrap_err();
        assert!(err.to_string().contains("named fields"));
    }

    #[test]
    fn entity_rejects_unknown_attribute() {
        let input: DeriveInput = parse_quote! {
            #[quarry(schema = "public")]
            struct Member {
                #[quarry(id)]
                id: Option<i64>,
            }
        };
        assert!(entity::generate_entity(&input).is_err());
    }

    #[test]
    fn projection_generates_all_three_strategies() {
        let input: DeriveInput = parse_quote! {
            #[projection(constructor = new)]
            struct MemberDto {
                username: String,
                age: i32,
            }
        };
        let tokens = projection::generate_projection(&input).unwrap().to_string().replace(' ', "");
        assert!(tokens.contains("pubfnset_username(&mutself,username:String)"));
        assert!(tokens.contains("impl::quarry_core::FieldTargetforMemberDto"));
        assert!(tokens.contains("impl::quarry_core::BeanTargetforMemberDto"));
        assert!(tokens.contains("\"age\"=>self.set_age"));
        assert!(tokens.contains("Self::new("));
    }

    #[test]
    fn projection_without_constructor_builds_struct_literal() {
        let input: DeriveInput = parse_quote! {
            struct UserDto {
                name: String,
                age: i32,
            }
        };
        let tokens = projection::generate_projection(&input).unwrap().to_string().replace(' ', "");
        assert!(tokens.contains("Ok(Self{name:"));
        assert!(tokens.contains("expected:2usize"));
    }

    #[test]
    fn projection_rejects_non_struct() {
        let input: DeriveInput = parse_quote! {
            enum MemberDto {
                A,
            }
        };
        let err = projection::generate_projection(&input).unwrap_err();
        assert!(err.to_string().contains("only supports structs"));
    }
}
