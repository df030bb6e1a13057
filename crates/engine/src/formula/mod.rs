// Formula parsing and evaluation

pub mod parser;
pub mod eval;
pub mod refs;

pub(crate) mod eval_lookup;
pub(crate) mod eval_datetime;
