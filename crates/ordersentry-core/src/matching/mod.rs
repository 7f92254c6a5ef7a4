//! Entity matching: contacts against accounting-system customers.

mod customer;
mod model;
mod normalize;
mod similarity;

pub use customer::CustomerMatcher;
pub use model::{MatchConfidence, MatchResult, MatchType};
pub use normalize::{alphanumeric_only, is_entity_variation, normalize_entity_name};
pub use similarity::similarity;
