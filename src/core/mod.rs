pub mod assembler;
pub mod config;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod model;
pub mod playlist;
pub mod poller;
pub mod resolver;
pub mod retry;
pub mod session;
pub mod tracker;

#[cfg(test)]
pub(crate) mod testing;
