use anyhow::{Context, Result};
use std::env;
use std::net::IpAddr;
use zeroize::{Zeroize, Zeroizing};

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// Optional Redis URL. When set, the rate limiter uses the shared Redis
    /// store instead of the process-local one.
    pub redis_url: Option<String>,
    /// The session signing/encryption secret (32 raw bytes).
    pub session_secret: Zeroizing<Vec<u8>>,
    /// The canonical application origin, e.g. `https://vote.example.org`.
    pub app_origin: String,
    /// The WebAuthn relying-party ID: the hostname of `app_origin`.
    pub rp_id: String,
    /// Emails granted admin access in addition to the `is_admin` flag.
    pub admin_emails: Vec<String>,
    /// Proxies whose forwarding headers are trusted for client-IP resolution.
    pub trusted_proxies: Vec<IpAddr>,
    /// Base URL of the face-comparison provider.
    pub face_service_url: String,
    /// The operator's face-match confidence floor (0-100).
    pub face_match_floor: f64,
    /// When true, the secondary device-fingerprint/IP duplicate heuristic is
    /// enforced and vote rate limiting keys on the client IP.
    pub enforce_device_ip: bool,
    /// When false, votes record a disabled-sentinel instead of the client IP.
    pub track_voter_ip: bool,
    /// True when `APP_ENV=production`. Controls Secure cookies and the
    /// loopback entries of the WebAuthn origin allow-list.
    pub production: bool,
}

/// Extracts the hostname from an origin like `https://vote.example.org:8443`.
fn origin_host(origin: &str) -> Option<String> {
    let rest = origin.split_once("://").map(|(_, r)| r).unwrap_or(origin);
    let host_port = rest.split('/').next()?;
    if host_port.is_empty() {
        return None;
    }
    // Bracketed IPv6 hosts keep their brackets' content, everything else
    // drops a trailing :port.
    let host = if let Some(stripped) = host_port.strip_prefix('[') {
        stripped.split(']').next()?.to_string()
    } else {
        host_port.split(':').next()?.to_string()
    };
    if host.is_empty() { None } else { Some(host) }
}

impl Config {
    /// Creates a new `Config` from environment variables.
    pub fn from_env() -> Result<Self> {
        let mut secret_hex = env::var("SESSION_SECRET")
            .context("SESSION_SECRET must be set (generate with: openssl rand -hex 32)")?;

        let secret_bytes =
            hex::decode(&secret_hex).context("SESSION_SECRET must be valid hexadecimal")?;

        secret_hex.zeroize();

        if secret_bytes.len() != 32 {
            anyhow::bail!("SESSION_SECRET must be exactly 32 bytes (64 hex characters)");
        }

        let app_origin = env::var("APP_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();

        let rp_id = origin_host(&app_origin)
            .context("APP_ORIGIN must contain a hostname for WebAuthn RP binding")?;

        let admin_emails = env::var("ADMIN_EMAILS")
            .unwrap_or_default()
            .split(',')
            .map(|e| e.trim().to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        let trusted_proxies = env::var("TRUSTED_PROXIES")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse().context("TRUSTED_PROXIES must contain IP addresses"))
            .collect::<Result<Vec<IpAddr>>>()?;

        let face_match_floor: f64 = env::var("FACE_MATCH_FLOOR")
            .unwrap_or_else(|_| "80".to_string())
            .parse()
            .context("Invalid FACE_MATCH_FLOOR")?;

        if !(0.0..=100.0).contains(&face_match_floor) {
            anyhow::bail!("FACE_MATCH_FLOOR must be within 0-100");
        }

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            redis_url: env::var("REDIS_URL").ok(),
            session_secret: Zeroizing::new(secret_bytes),
            app_origin,
            rp_id,
            admin_emails,
            trusted_proxies,
            face_service_url: env::var("FACE_SERVICE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:5001".to_string())
                .trim_end_matches('/')
                .to_string(),
            face_match_floor,
            enforce_device_ip: env::var("ENFORCE_DEVICE_IP")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            track_voter_ip: env::var("TRACK_VOTER_IP")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            production: env::var("APP_ENV")
                .map(|v| v == "production")
                .unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_host_strips_scheme_and_port() {
        assert_eq!(
            origin_host("https://vote.example.org"),
            Some("vote.example.org".to_string())
        );
        assert_eq!(
            origin_host("https://vote.example.org:8443"),
            Some("vote.example.org".to_string())
        );
        assert_eq!(
            origin_host("http://localhost:3000"),
            Some("localhost".to_string())
        );
    }

    #[test]
    fn origin_host_handles_bracketed_ipv6() {
        assert_eq!(origin_host("http://[::1]:3000"), Some("::1".to_string()));
    }

    #[test]
    fn origin_host_rejects_empty() {
        assert_eq!(origin_host("https://"), None);
        assert_eq!(origin_host(""), None);
    }
}
