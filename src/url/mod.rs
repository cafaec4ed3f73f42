//! URL handling: canonicalization, domain logic, pattern matching, and
//! crawl admissibility filtering.

mod domain;
mod filter;
mod matcher;
mod normalize;

pub use domain::{extract_host, registrable_domain, same_site};
pub use filter::{admissible, AdmissionCheck, RejectReason};
pub use matcher::matches_path_pattern;
pub use normalize::{canonicalize, canonicalize_with};
