//! Los Libros CFI
//!
//! EPUB Canonical Fragment Identifiers and the position indices built on
//! them.
//!
//! # Modules
//!
//! - `cfi`: parse, compare, resolve and generate CFIs
//! - `tree`: read-only document tree access used by the CFI engine
//! - `epub`: package spine, content loaders and the `Book` façade
//! - `locations`: evenly spaced locations over the spine
//! - `pagelist`: publisher page numbers mapped to CFIs

pub mod cfi;
pub mod config;
pub mod epub;
pub mod error;
pub mod locations;
pub mod pagelist;
pub mod tree;

pub use config::Config;
pub use error::{Error, Result};
