//! Application services: catalog reads through the cache, writes that invalidate it.

pub mod blogs;
pub mod cart;
pub mod catalog;
pub mod error;
pub mod pagination;
pub mod repos;
pub mod taxonomy;
pub mod views;
