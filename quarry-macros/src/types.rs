use syn::{GenericArgument, PathArguments, Type};

/// `T` for `Option<T>`, otherwise `None`.
pub fn option_inner(ty: &Type) -> Option<&Type> {
    generic_argument(ty, "Option")
}

/// The single type argument of `Name<T>` when the last segment is `name`.
pub fn generic_argument<'a>(ty: &'a Type, name: &str) -> Option<&'a Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != name {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

pub fn type_name(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(path) => path.path.segments.last().map(|s| s.ident.to_string()),
        _ => None,
    }
}

/// `SqlType` variant for a column's (non-optional) Rust type.
pub fn sql_type_for(ty: &Type) -> Option<&'static str> {
    let name = type_name(ty)?;
    let variant = match name.as_str() {
        "i16" | "i32" | "u8" | "u16" => "Integer",
        "i64" | "u32" => "BigInt",
        "f32" | "f64" => "Real",
        "bool" => "Boolean",
        "String" => "Text",
        _ => return None,
    };
    Some(variant)
}

pub fn snake_case(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len() + 4);
    for (i, ch) in ident.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
