pub mod extract;
pub mod place;
