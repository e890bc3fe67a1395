use crate::{
    crypto::{csrf, token},
    error::{AppError, Result},
    models::session::AuthSession,
    repositories::session as session_repo,
    state::AppState,
};
use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use std::net::IpAddr;
use tower_cookies::cookie::time;
use tower_cookies::{Cookie, Cookies};
use uuid::Uuid;

/// Session lifetime; doubles as the ceiling on the sealed token's age.
pub const SESSION_TTL_HOURS: i64 = 24;

/// Name of the sealed session cookie.
pub const SESSION_COOKIE: &str = "voter_session";
/// Name of the script-readable CSRF cookie.
pub const CSRF_COOKIE: &str = "csrf_token";
/// Header the client echoes the CSRF cookie into.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Sentinel returned when no client IP can be resolved.
pub const UNRESOLVED_IP: &str = "unresolved";

/// All session-validation failures collapse into this one response; callers
/// get no oracle for which check failed.
fn invalid_session() -> AppError {
    AppError::Authentication("Invalid session".to_string())
}

/// Creates a cookie in the application's standard shape.
fn session_cookie(name: &str, value: String, production: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(name.to_string(), value);

    // The CSRF cookie must stay script-readable for the double submit.
    if name != CSRF_COOKIE {
        cookie.set_http_only(true);
    }

    if production {
        cookie.set_secure(true);
    }

    cookie.set_same_site(tower_cookies::cookie::SameSite::Strict);
    cookie.set_max_age(time::Duration::hours(SESSION_TTL_HOURS));
    cookie.set_path("/");

    cookie
}

/// Issues a new session: persists the revocation row, seals the cookie and
/// hands out a fresh CSRF token.
pub async fn create_session(state: &AppState, cookies: &Cookies, user_id: Uuid) -> Result<()> {
    let session_id = Uuid::new_v4();
    let expires_at = Utc::now() + Duration::hours(SESSION_TTL_HOURS);

    session_repo::create(&state.db, session_id, user_id, expires_at).await?;
    tracing::debug!("🔑 Session row created: {}", session_id);

    let claims = token::SessionClaims::new(session_id, user_id);
    let sealed = token::seal(state.session_key.as_bytes(), &claims)?;

    cookies.add(session_cookie(
        SESSION_COOKIE,
        sealed,
        state.config.production,
    ));

    let csrf_token = csrf::generate_csrf_token()?;
    cookies.add(session_cookie(
        CSRF_COOKIE,
        csrf_token,
        state.config.production,
    ));

    tracing::info!("✅ Session issued for user: {}", user_id);
    Ok(())
}

/// Validates a sealed session token against the persistent store.
///
/// Fails closed: tamper, age overflow and a missing/expired row are all the
/// same invalid-session outcome. Expired rows are deleted opportunistically.
pub async fn authenticate_token(state: &AppState, sealed: &str) -> Result<AuthSession> {
    let claims =
        token::open(state.session_key.as_bytes(), sealed).map_err(|_| invalid_session())?;

    let issued_at = claims.issued_at().ok_or_else(invalid_session)?;
    let now = Utc::now();
    if now - issued_at > Duration::hours(SESSION_TTL_HOURS) {
        return Err(invalid_session());
    }

    let session = session_repo::find(&state.db, &claims.sid)
        .await?
        .ok_or_else(invalid_session)?;

    if session.is_expired(now) {
        session_repo::delete(&state.db, &session.id).await?;
        return Err(invalid_session());
    }

    if session.user_id != claims.uid {
        return Err(invalid_session());
    }

    Ok(AuthSession {
        session_id: session.id,
        user_id: session.user_id,
    })
}

/// Revokes the current session row, then clears cookies. The row deletion is
/// what makes logout effective: the cookie's ciphertext would still
/// authenticate on its own.
pub async fn clear_session(state: &AppState, cookies: &Cookies) -> Result<()> {
    if let Some(cookie) = cookies.get(SESSION_COOKIE) {
        if let Ok(claims) = token::open(state.session_key.as_bytes(), cookie.value()) {
            session_repo::delete(&state.db, &claims.sid).await?;
            tracing::info!("✅ Session revoked: {}", claims.sid);
        }
    }

    let mut session_cookie = Cookie::new(SESSION_COOKIE, "");
    session_cookie.set_max_age(time::Duration::seconds(0));
    session_cookie.set_path("/");
    cookies.remove(session_cookie);

    let mut csrf_cookie = Cookie::new(CSRF_COOKIE, "");
    csrf_cookie.set_max_age(time::Duration::seconds(0));
    csrf_cookie.set_path("/");
    cookies.remove(csrf_cookie);

    Ok(())
}

/// Normalizes a raw header/peer IP value: unbrackets IPv6, strips port
/// suffixes, and insists the remainder parses as an address.
fn normalize_ip(raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    // Bracketed IPv6, possibly with a port: [::1]:3000
    if let Some(rest) = value.strip_prefix('[') {
        let host = rest.split(']').next()?;
        return host.parse::<IpAddr>().ok().map(|ip| ip.to_string());
    }

    if let Ok(ip) = value.parse::<IpAddr>() {
        return Some(ip.to_string());
    }

    // IPv4 with a port: 203.0.113.9:51234
    if let Some((host, port)) = value.rsplit_once(':') {
        if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(ip) = host.parse::<IpAddr>() {
                return Some(ip.to_string());
            }
        }
    }

    None
}

fn forwarded_for(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
}

fn real_ip(headers: &HeaderMap) -> Option<&str> {
    headers.get("x-real-ip").and_then(|v| v.to_str().ok())
}

/// Resolves the client IP for rate limiting and vote records.
///
/// When the connecting peer is a configured trusted proxy, the leftmost
/// `x-forwarded-for` entry wins. Otherwise the fallback order is
/// `x-real-ip`, `x-forwarded-for`, then the peer address itself.
pub fn resolve_client_ip(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    trusted_proxies: &[IpAddr],
) -> String {
    if let Some(peer_ip) = peer {
        if trusted_proxies.contains(&peer_ip) {
            if let Some(ip) = forwarded_for(headers).and_then(normalize_ip) {
                return ip;
            }
        }
    }

    if let Some(ip) = real_ip(headers).and_then(normalize_ip) {
        return ip;
    }

    if let Some(ip) = forwarded_for(headers).and_then(normalize_ip) {
        return ip;
    }

    if let Some(peer_ip) = peer {
        return peer_ip.to_string();
    }

    UNRESOLVED_IP.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                axum::http::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn normalize_handles_ipv4_with_port() {
        assert_eq!(
            normalize_ip("203.0.113.9:51234"),
            Some("203.0.113.9".to_string())
        );
    }

    #[test]
    fn normalize_handles_bracketed_ipv6() {
        assert_eq!(normalize_ip("[::1]:3000"), Some("::1".to_string()));
        assert_eq!(normalize_ip("[2001:db8::2]"), Some("2001:db8::2".to_string()));
    }

    #[test]
    fn normalize_rejects_garbage() {
        assert_eq!(normalize_ip(""), None);
        assert_eq!(normalize_ip("not-an-ip"), None);
        assert_eq!(normalize_ip("999.0.0.1"), None);
    }

    #[test]
    fn trusted_proxy_prefers_leftmost_forwarded_for() {
        let proxy: IpAddr = "10.0.0.1".parse().unwrap();
        let map = headers(&[("x-forwarded-for", "203.0.113.9, 10.0.0.1")]);
        assert_eq!(
            resolve_client_ip(&map, Some(proxy), &[proxy]),
            "203.0.113.9"
        );
    }

    #[test]
    fn untrusted_peer_falls_back_through_header_priority() {
        let peer: IpAddr = "198.51.100.7".parse().unwrap();
        let map = headers(&[
            ("x-real-ip", "203.0.113.9"),
            ("x-forwarded-for", "192.0.2.1"),
        ]);
        assert_eq!(resolve_client_ip(&map, Some(peer), &[]), "203.0.113.9");

        let map = headers(&[("x-forwarded-for", "192.0.2.1")]);
        assert_eq!(resolve_client_ip(&map, Some(peer), &[]), "192.0.2.1");

        let map = headers(&[]);
        assert_eq!(resolve_client_ip(&map, Some(peer), &[]), "198.51.100.7");
    }

    #[test]
    fn nothing_resolvable_yields_the_sentinel() {
        let map = headers(&[("x-forwarded-for", "junk")]);
        assert_eq!(resolve_client_ip(&map, None, &[]), UNRESOLVED_IP);
    }
}
