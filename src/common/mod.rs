pub mod error;

pub use error::{MergeError, MergeErrorKind};
