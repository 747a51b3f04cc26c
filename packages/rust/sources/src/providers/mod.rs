//! Built-in provider kinds.
//!
//! The set is closed: every provider is either a `fixture` (records read
//! from a JSON file, deterministic) or `http` (JSON over HTTP).

mod fixture;
mod http;

pub use fixture::{FixtureContactSource, FixtureListingSource};
pub use http::{HttpContactSource, HttpListingSource, build_client};
