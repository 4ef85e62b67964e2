mod member_dto;
mod user_dto;

pub use member_dto::MemberDto;
pub use user_dto::UserDto;
