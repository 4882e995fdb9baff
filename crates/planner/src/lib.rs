pub mod compile;
pub mod driver;
pub mod error;
pub mod formula;
pub mod plan;
pub mod query;
pub mod scope;
pub mod tree;
