//! Source locator validation.
//!
//! Validation is a pure function of the input string and the policy: it never
//! resolves names or touches the network.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::LazyLock;

use regex::Regex;
use url::{Host, Url};

use crate::config::OriginConfig;
use crate::{Error, Result};

static VIDEO_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("static regex"));

const VIDEO_PAGE_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtube-nocookie.com",
    "www.youtube-nocookie.com",
    "youtu.be",
];

/// Path prefixes that carry the video id as the next segment.
const VIDEO_ID_PATH_PREFIXES: &[&str] = &["shorts", "embed", "live", "v"];

/// How a validated locator is fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocatorKind {
    /// Plain media URL, fetched over HTTP.
    Direct,
    /// Video page resolved by the extractor tool.
    Extractor { video_id: String },
}

/// A validated reference to an external media resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocator {
    url: Url,
    kind: LocatorKind,
}

impl SourceLocator {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn kind(&self) -> &LocatorKind {
        &self.kind
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Rules a locator must satisfy before any resource is acquired for it.
#[derive(Debug, Clone, Default)]
pub struct LocatorPolicy {
    pub allow_private_hosts: bool,
    pub extractor_enabled: bool,
}

impl LocatorPolicy {
    pub fn from_config(config: &OriginConfig) -> Self {
        Self {
            allow_private_hosts: config.allow_private_hosts,
            extractor_enabled: config.extractor_enabled,
        }
    }

    pub fn validate(&self, raw: &str) -> Result<SourceLocator> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::invalid_locator("url is required"));
        }

        let url = Url::parse(raw).map_err(|e| Error::invalid_locator(format!("invalid url: {e}")))?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::invalid_locator(format!(
                    "unsupported scheme '{other}', only http/https URLs are allowed"
                )));
            }
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(Error::invalid_locator("credentials in url are not allowed"));
        }

        let host = url
            .host()
            .ok_or_else(|| Error::invalid_locator("url has no host"))?;
        if !self.allow_private_hosts {
            check_public_host(&host)?;
        }

        let kind = match &host {
            Host::Domain(domain) if is_video_page_host(domain) => {
                if !self.extractor_enabled {
                    return Err(Error::invalid_locator("video page urls are not supported"));
                }
                let video_id = extract_video_id(&url)
                    .ok_or_else(|| Error::invalid_locator("no valid video id in url"))?;
                LocatorKind::Extractor { video_id }
            }
            _ => LocatorKind::Direct,
        };

        Ok(SourceLocator { url, kind })
    }
}

/// Check a URL the origin redirected to against the private-host rules.
pub(crate) fn check_redirect_target(url: &Url) -> Result<()> {
    let host = url
        .host()
        .ok_or_else(|| Error::invalid_locator("redirect target has no host"))?;
    check_public_host(&host)
}

fn is_video_page_host(domain: &str) -> bool {
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    VIDEO_PAGE_HOSTS.contains(&domain.as_str())
}

fn extract_video_id(url: &Url) -> Option<String> {
    let host = url.host_str()?.trim_end_matches('.').to_ascii_lowercase();
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());

    let candidate = if host == "youtu.be" {
        segments.next().map(str::to_string)
    } else if let Some((_, v)) = url.query_pairs().find(|(k, _)| k == "v") {
        Some(v.into_owned())
    } else {
        match segments.next() {
            Some(prefix) if VIDEO_ID_PATH_PREFIXES.contains(&prefix) => {
                segments.next().map(str::to_string)
            }
            _ => None,
        }
    };

    candidate.filter(|id| VIDEO_ID_RE.is_match(id))
}

fn check_public_host(host: &Host<&str>) -> Result<()> {
    match host {
        Host::Domain(domain) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            if domain == "localhost" || domain.ends_with(".localhost") {
                return Err(Error::invalid_locator("localhost is not allowed"));
            }
            Ok(())
        }
        Host::Ipv4(ip) => check_public_ip(IpAddr::V4(*ip)),
        Host::Ipv6(ip) => check_public_ip(IpAddr::V6(*ip)),
    }
}

fn check_public_ip(ip: IpAddr) -> Result<()> {
    let blocked = match ip {
        IpAddr::V4(v4) => is_blocked_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_blocked_v4(v4),
            None => is_blocked_v6(v6),
        },
    };
    if blocked {
        Err(Error::invalid_locator(format!("address {ip} is not allowed")))
    } else {
        Ok(())
    }
}

fn is_blocked_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
}

fn is_blocked_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || (first & 0xfe00) == 0xfc00 // unique local
        || (first & 0xffc0) == 0xfe80 // link local
}
