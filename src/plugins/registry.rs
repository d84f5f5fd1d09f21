use async_trait::async_trait;
use bytes::Bytes;
use clap::{ArgMatches, Command};
use std::sync::Arc;
use std::time::Duration;

use crate::core::config::ArchiveConfig;
use crate::core::error::FetchError;
use crate::core::model::{RequestHeaders, StreamReference, VariantPreference};

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body of a 2xx response; anything else becomes `FetchError::Status`.
    pub fn into_success(self, url: &str) -> Result<Bytes, FetchError> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(FetchError::Status { url: url.to_string(), status: self.status })
        }
    }
}

/// One GET, no retries. Used by the resolver, the segment pool and the live poller alike.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get(&self, url: &str, headers: &RequestHeaders, timeout: Duration) -> Result<HttpResponse, FetchError>;
}

#[derive(Debug)]
pub struct ResolvedInput {
    pub reference: StreamReference,
    pub headers: RequestHeaders,
    pub warnings: Vec<String>,
}

/// Turns a raw command-line input into a stream reference.
#[async_trait]
pub trait InputResolver: Send + Sync {
    fn name(&self) -> &'static str;
    fn can_handle(&self, raw: &str) -> u8;
    async fn resolve(&self, raw: &str) -> anyhow::Result<ResolvedInput>;
}

#[derive(Debug, Clone)]
pub struct ArchiveCliConfig {
    pub headers: RequestHeaders,
    pub preference: VariantPreference,
    pub archive: ArchiveConfig,
}

pub trait CliPlugin: Send + Sync {
    fn name(&self) -> &'static str;
    fn augment_command(&self, cmd: Command) -> Command;
    fn apply_matches(&self, matches: &ArgMatches, cfg: &mut ArchiveCliConfig) -> anyhow::Result<()>;
}

pub struct PluginRegistry {
    resolvers: Vec<Box<dyn InputResolver>>,
    cli_plugins: Vec<Box<dyn CliPlugin>>,
}

impl PluginRegistry {
    pub fn with_defaults() -> Self {
        let mut reg = Self { resolvers: vec![], cli_plugins: vec![] };

        reg.resolvers.push(Box::new(crate::plugins::hls::resolver::UrlInputResolver::new()));
        reg.resolvers.push(Box::new(crate::plugins::hls::resolver::DocumentInputResolver::new()));

        reg.cli_plugins.push(Box::new(crate::plugins::http::cli::HttpCliPlugin::new()));
        reg.cli_plugins.push(Box::new(crate::plugins::hls::cli::HlsCliPlugin::new()));
        reg
    }

    pub fn augment_command(&self, cmd: Command) -> Command {
        self.cli_plugins.iter().fold(cmd, |c, p| p.augment_command(c))
    }

    pub fn apply_matches(&self, matches: &ArgMatches, cfg: &mut ArchiveCliConfig) -> anyhow::Result<()> {
        for p in &self.cli_plugins {
            p.apply_matches(matches, cfg)?;
        }
        Ok(())
    }

    pub fn best_resolver(&self, raw: &str) -> Option<&dyn InputResolver> {
        self.resolvers
            .iter()
            .map(|r| (r.can_handle(raw), r.as_ref()))
            .max_by_key(|(c, _)| *c)
            .and_then(|(c, r)| if c == 0 { None } else { Some(r) })
    }

    pub fn default_fetcher(&self, cfg: &ArchiveConfig) -> anyhow::Result<Arc<dyn HttpFetch>> {
        Ok(Arc::new(crate::plugins::http::driver::HttpDriver::new(&cfg.user_agent)?))
    }
}
