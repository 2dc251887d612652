//! Config error plumbing on top of the shared error type.

pub use botline_common::Error;

pub type Result<T> = std::result::Result<T, Error>;

botline_common::impl_context!();
