//! Types that represent the exported data: a `ResultSet` of `Record`s holding `Value`s.
mod record;
mod value;

pub use record::{Record, ResultSet};
pub use value::Value;
