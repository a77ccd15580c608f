//! Filters applied to errors and data before a notice leaves the process.

mod ignore;
mod sanitize;

pub use ignore::{CategoryPredicate, ErrorRef, IgnoreFilter, IgnorePattern, PLAIN_ERROR_CLASS};
pub(crate) use sanitize::truncate;
pub use sanitize::{
    to_value, SanitizeFilter, FILTERED_VALUE, MAX_DEPTH, MAX_DEPTH_EXCEEDED, MAX_STRING_LENGTH,
};
