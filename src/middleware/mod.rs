pub mod interceptor;

pub use interceptor::track_requests;
