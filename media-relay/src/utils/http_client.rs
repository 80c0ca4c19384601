use std::sync::OnceLock;

use tracing::{debug, warn};

use crate::config::OriginConfig;
use crate::origin::check_redirect_target;

/// Redirect hops followed before a fetch is abandoned.
const MAX_REDIRECTS: usize = 10;

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Safe to ignore: can happen if another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build the client used for origin fetches.
///
/// Only connection establishment is bounded. Media bodies can stream for a
/// long time and must not be cut by a whole-request timeout.
///
/// Redirect targets are held to the same private-host rules as the locator.
pub fn build_origin_client(config: &OriginConfig) -> reqwest::Client {
    install_rustls_provider();

    let allow_private_hosts = config.allow_private_hosts;
    let redirects = reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        if !allow_private_hosts {
            if let Err(e) = check_redirect_target(attempt.url()) {
                warn!(target = %attempt.url(), error = %e, "Refusing origin redirect");
                return attempt.error(e);
            }
        }
        attempt.follow()
    });

    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .redirect(redirects)
        .tcp_nodelay(true)
        .pool_max_idle_per_host(20)
        .user_agent(config.user_agent.clone())
        .build()
        .unwrap_or_else(|error| {
            warn!(
                error = %error,
                "Failed to create origin HTTP client; falling back to reqwest defaults"
            );
            reqwest::Client::new()
        })
}
