pub mod error;
pub mod funnel;
pub mod queries;
pub mod test_util;

pub use error::QueryError;
pub use error::Result;
