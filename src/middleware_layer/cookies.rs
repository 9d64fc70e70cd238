use http::HeaderMap;
use tower_cookies::Cookie;
use tower_cookies::cookie::time::Duration;

use crate::config::Config;

/// Whether the request reached us over TLS, directly or via a proxy.
pub fn is_secure_transport(headers: &HeaderMap) -> bool {
    headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
}

/// Creates the session cookie carrying a signed token.
///
/// HttpOnly always; Secure when the transport is TLS or the deployment
/// forces it; SameSite as configured. Max-Age matches the session TTL.
pub fn session_cookie(config: &Config, signed_token: String, secure_transport: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(config.session_cookie_name.clone(), signed_token);

    cookie.set_http_only(true);
    cookie.set_secure(secure_transport || config.force_secure_cookies);
    cookie.set_same_site(config.cookie_same_site);
    cookie.set_max_age(Duration::seconds(config.session_duration.as_secs() as i64));
    cookie.set_path("/");

    cookie
}

/// Creates the cookie that tells the client to drop its session cookie.
pub fn removal_cookie(name: &str) -> Cookie<'static> {
    let mut cookie = Cookie::new(name.to_string(), "");
    cookie.set_max_age(Duration::seconds(0));
    cookie.set_path("/");
    cookie
}
