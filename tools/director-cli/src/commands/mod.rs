pub mod check;
pub mod render;
pub mod sources;
pub mod validate;
