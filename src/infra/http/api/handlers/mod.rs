//! API handlers organized by resource type.
//!
//! Public reads go through the services' read-through paths and answer with
//! freshness headers; cart and admin handlers answer with private responses.

mod admin;
mod blogs;
mod cart;
mod health;
mod products;
mod taxonomy;

pub use admin::*;
pub use blogs::*;
pub use cart::*;
pub use health::*;
pub use products::*;
pub use taxonomy::*;
