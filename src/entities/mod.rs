pub mod accepted;
pub mod room;
pub mod token;
pub mod token_room;
