use quarry_core::Projection;
use serde::Serialize;

/// Same shape as `MemberDto` with `name` in place of `username`; filled
/// through aliases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Projection)]
#[projection(constructor = new)]
pub struct UserDto {
    pub name: String,
    pub age: i32,
}

impl UserDto {
    pub fn new(name: String, age: i32) -> Self {
        Self { name, age }
    }
}
