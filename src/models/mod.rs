mod click;
mod link;

pub use click::{Click, NewClick};
pub use link::{is_valid_slug, slugify, Link, LinkValidationError, NewLink};
