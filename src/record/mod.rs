//! record
//!
//! Record proxies and query results.

mod proxy;
mod result;

pub(crate) use proxy::ProxyState;
pub use proxy::{Population, RecordProxy};
pub use result::QueryResult;
