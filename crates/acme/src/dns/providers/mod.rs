//! Built-in DNS-01 providers

mod cloudflare;
mod exec;

pub use cloudflare::{
    CloudflareAuth, CloudflareConfig, CloudflareProvider, CLOUDFLARE_API_BASE, CLOUDFLARE_SCHEMA,
};
pub use exec::{ExecConfig, ExecMode, ExecProvider, EXEC_SCHEMA};

pub(crate) use cloudflare::build as build_cloudflare;
pub(crate) use exec::build as build_exec;

/// Configuration keys recognized by the built-in providers
pub mod keys {
    pub use super::cloudflare::{
        CF_API_EMAIL, CF_API_KEY, CF_DNS_API_TOKEN, CF_ZONE_API_TOKEN, CLOUDFLARE_API_KEY,
        CLOUDFLARE_DNS_API_TOKEN, CLOUDFLARE_EMAIL, CLOUDFLARE_HTTP_TIMEOUT,
        CLOUDFLARE_POLLING_INTERVAL, CLOUDFLARE_PROPAGATION_TIMEOUT, CLOUDFLARE_TTL,
        CLOUDFLARE_ZONE_API_TOKEN,
    };
    pub use super::exec::{
        EXEC_MODE, EXEC_PATH, EXEC_POLLING_INTERVAL, EXEC_PROPAGATION_TIMEOUT,
        EXEC_SEQUENCE_INTERVAL,
    };
}
