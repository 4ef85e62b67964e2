use quarry_core::Projection;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Projection)]
#[projection(constructor = new)]
pub struct MemberDto {
    pub username: String,
    pub age: i32,
}

impl MemberDto {
    pub fn new(username: String, age: i32) -> Self {
        Self { username, age }
    }
}
