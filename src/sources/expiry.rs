use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static PATH_EXPIRE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/expire/(\d+)").expect("static regex"));

/// Extrae el epoch de expiración embebido en un stream link.
///
/// Los links resueltos traen la expiración como query param (`expire` o
/// `expires`) o como segmento de path (`/expire/<epoch>`), en segundos UTC.
/// Sin ninguno de los dos, el link no expira.
pub fn expiration(link: &str) -> Option<u64> {
    let parsed = Url::parse(link).ok()?;

    if let Some((_, value)) = parsed
        .query_pairs()
        .find(|(key, _)| key == "expire" || key == "expires")
    {
        if let Ok(epoch) = value.parse::<u64>() {
            return Some(epoch);
        }
    }

    PATH_EXPIRE
        .captures(parsed.path())
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
}

/// `true` si el link trae marca de expiración y ya venció a la hora `now`
/// (epoch en segundos).
pub fn is_expired(link: &str, now: u64) -> bool {
    match expiration(link) {
        Some(epoch) => epoch <= now,
        None => false,
    }
}
