//! Value comparison: structural asserts, rejections, closest-candidate
//! selection and the overlay merge used for faked attributes.

mod compare;
mod merge;
mod reject;
mod select;

pub use compare::{check_output, compare, planned_output, REJECT_KEY};
pub use merge::merge;
pub use reject::check_reject;
pub use select::{select_closest, type_matches, Candidate};
