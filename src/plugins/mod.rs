pub mod hls;
pub mod http;
pub mod registry;
