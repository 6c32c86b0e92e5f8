pub mod canonical;

pub use canonical::{canonicalize, canonicalize_page, canonicalize_with, Options};
