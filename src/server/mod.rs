//! HTTP server
//!
//! hyper http1 with TokioIo; one tokio task per connection.

pub mod http;

pub use http::{handle_request, run, AppState};
