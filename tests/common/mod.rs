pub mod hls_server;
