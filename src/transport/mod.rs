pub mod http;
pub mod retry;
pub mod traits;

pub use http::HttpTransport;
pub use retry::RetryPolicy;
pub use traits::DispatchTransport;
