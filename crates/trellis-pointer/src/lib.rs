//! JSON pointer plumbing: RFC-6901 traversal, `@[id=..]` selector
//! resolution, and RFC-6902 operation application.

mod ops;
mod pointer;
mod selector;

pub use ops::{OpError, ResolvedOp, apply_op, apply_ops};
pub use pointer::{decode_segment, encode_segment, get_value, parse_pointer};
pub use selector::{SelectorError, contains_numeric_segment, contains_selector, resolve_selector_path};
