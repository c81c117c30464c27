//! Application services layer.

pub mod admin;
pub mod error;
pub mod operators;
pub mod repos;

#[cfg(test)]
pub(crate) mod testing;
