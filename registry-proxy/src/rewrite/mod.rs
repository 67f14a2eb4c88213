//! Request and response translation between registry clients and upstreams.

pub mod request;
pub mod response;

pub use request::{RequestRewriter, RewriteOutcome};
pub use response::rewrite_response;
