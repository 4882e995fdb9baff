pub mod pk;
pub mod value;
