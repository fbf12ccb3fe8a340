use serde::{Deserialize, Serialize};

/// How signals are acquired for one attempt. Selected once at attempt
/// start and never changed mid-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionStrategy {
    /// Same-origin frame: a cooperative reporter script inside the frame
    /// forwards scroll/click/mousemove over a message channel, with real
    /// ad-click classification.
    CooperativeFrame,
    /// Cross-origin frame: the host observes its own container's scroll
    /// position as a reading-progress proxy and pointer activity as an
    /// attention proxy. Noisier; ad clicks cannot be attributed.
    HostProxy,
}

impl AcquisitionStrategy {
    /// Pick the strategy for a content URL embedded by `host_origin`.
    /// Unparseable URLs are treated as cross-origin.
    pub fn select(host_origin: &str, content_url: &str) -> Self {
        if same_origin(host_origin, content_url) {
            AcquisitionStrategy::CooperativeFrame
        } else {
            AcquisitionStrategy::HostProxy
        }
    }

    pub fn is_cross_origin(&self) -> bool {
        matches!(self, AcquisitionStrategy::HostProxy)
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Origin {
    scheme: String,
    host: String,
    port: u16,
}

/// Extract scheme://host:port from a URL, normalizing default ports.
fn origin_of(url: &str) -> Option<Origin> {
    let (scheme, rest) = url.split_once("://")?;
    let scheme = scheme.to_ascii_lowercase();
    let authority = rest
        .split(['/', '?', '#'])
        .next()
        .filter(|a| !a.is_empty())?;
    let (host, port) = match authority.rsplit_once(':') {
        Some((h, p)) => (h, p.parse::<u16>().ok()?),
        None => {
            let default = match scheme.as_str() {
                "http" => 80,
                "https" => 443,
                _ => return None,
            };
            (authority, default)
        }
    };
    Some(Origin {
        scheme,
        host: host.to_ascii_lowercase(),
        port,
    })
}

/// Browser-style origin comparison: scheme, host and port all match.
pub fn same_origin(a: &str, b: &str) -> bool {
    match (origin_of(a), origin_of(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
