//! Canonicalization, hashing, on-disk path derivation, and proxy-kind
//! classification for a single URL. Link objects are ephemeral — computed
//! on demand from the URL string, never persisted directly; their identity
//! in the Work Store and Submit Sink is the URL hash.

use sha2::{Digest, Sha256};
use std::path::PathBuf;
use url::Url;

mod error;
pub use error::LinkError;

/// The anonymizing network (or non-network scheme) a URL is reached
/// through. `Null` is the clear web.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyKind {
    Null,
    Tor,
    I2p,
    Zeronet,
    Freenet,
    Data,
    Script,
    Irc,
    Bitcoin,
    Ed2k,
    Magnet,
    Mail,
    Tel,
}

impl ProxyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyKind::Null => "null",
            ProxyKind::Tor => "tor",
            ProxyKind::I2p => "i2p",
            ProxyKind::Zeronet => "zeronet",
            ProxyKind::Freenet => "freenet",
            ProxyKind::Data => "data",
            ProxyKind::Script => "script",
            ProxyKind::Irc => "irc",
            ProxyKind::Bitcoin => "bitcoin",
            ProxyKind::Ed2k => "ed2k",
            ProxyKind::Magnet => "magnet",
            ProxyKind::Mail => "mail",
            ProxyKind::Tel => "tel",
        }
    }

    pub fn parse(s: &str) -> Option<ProxyKind> {
        match s.to_ascii_lowercase().as_str() {
            "null" => Some(ProxyKind::Null),
            "tor" => Some(ProxyKind::Tor),
            "i2p" => Some(ProxyKind::I2p),
            "zeronet" => Some(ProxyKind::Zeronet),
            "freenet" => Some(ProxyKind::Freenet),
            "data" => Some(ProxyKind::Data),
            "script" => Some(ProxyKind::Script),
            "irc" => Some(ProxyKind::Irc),
            "bitcoin" => Some(ProxyKind::Bitcoin),
            "ed2k" => Some(ProxyKind::Ed2k),
            "magnet" => Some(ProxyKind::Magnet),
            "mail" => Some(ProxyKind::Mail),
            "tel" => Some(ProxyKind::Tel),
            _ => None,
        }
    }
}

/// Known ZeroNet/Freenet HTTP gateway hostnames. Clear-web hosts equal to
/// one of these classify as their respective proxy kind even though they're
/// reached over plain `http(s)`.
const ZERONET_GATEWAYS: &[&str] = &["127.0.0.1:43110", "localhost:43110"];
const FREENET_GATEWAYS: &[&str] = &["127.0.0.1:8888", "localhost:8888"];

/// The canonical representation of a URL, computed by [`parse`].
#[derive(Debug, Clone)]
pub struct Link {
    pub original: String,
    pub scheme: String,
    pub host: String,
    pub path: String,
    pub params: String,
    pub query: String,
    pub fragment: String,
    pub url_hash: String,
    pub host_hash: String,
    pub proxy: ProxyKind,
    /// URL hash of the page that referred this one, if any.
    pub backref: Option<String>,
}

fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Schemes that are legal without a `//host` authority part.
const BARE_SCHEMES: &[&str] = &[
    "data", "magnet", "mailto", "tel", "bitcoin", "ed2k", "javascript", "irc",
];

/// Normalizes `raw`, builds the canonical URL text, and computes its hashes.
///
/// Normalization: scheme lowercased; host percent-decoded then lowercased;
/// path case preserved. Fragment is retained and included in the hash (see
/// Open Question in DESIGN.md — source behavior is preserved deliberately).
pub fn parse(raw: &str, backref: Option<String>) -> Result<Link, LinkError> {
    let parsed = Url::parse(raw).map_err(|e| LinkError::InvalidUrl(format!("{raw}: {e}")))?;

    let scheme = parsed.scheme().to_ascii_lowercase();
    let has_host = parsed.host_str().is_some();
    if !has_host && !BARE_SCHEMES.contains(&scheme.as_str()) {
        return Err(LinkError::InvalidUrl(format!(
            "{raw}: missing host for scheme {scheme}"
        )));
    }

    let host = parsed
        .host_str()
        .map(|h| h.to_ascii_lowercase())
        .unwrap_or_default();

    let path = parsed.path().to_string();
    let params = String::new(); // url crate folds `;params` into path; kept for the record shape.
    let query = parsed.query().unwrap_or("").to_string();
    let fragment = parsed.fragment().unwrap_or("").to_string();

    let canonical = reconstruct(&scheme, &host, parsed.port(), &path, &params, &query, &fragment);
    let url_hash = sha256_hex(&canonical);
    let host_hash = sha256_hex(&host);
    let proxy = classify(&scheme, &host);

    Ok(Link {
        original: raw.to_string(),
        scheme,
        host,
        path,
        params,
        query,
        fragment,
        url_hash,
        host_hash,
        proxy,
        backref,
    })
}

fn reconstruct(
    scheme: &str,
    host: &str,
    port: Option<u16>,
    path: &str,
    params: &str,
    query: &str,
    fragment: &str,
) -> String {
    let mut out = format!("{scheme}://{host}");
    if let Some(p) = port {
        out.push(':');
        out.push_str(&p.to_string());
    }
    out.push_str(path);
    if !params.is_empty() {
        out.push(';');
        out.push_str(params);
    }
    if !query.is_empty() {
        out.push('?');
        out.push_str(query);
    }
    if !fragment.is_empty() {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

/// Classifies a (scheme, host) pair into a proxy kind. Rules applied in
/// order, matching the Link Model's declared priority: bare schemes first,
/// then TLD suffix, then known gateway hosts, otherwise clear web.
pub fn classify(scheme: &str, host: &str) -> ProxyKind {
    match scheme {
        "data" => return ProxyKind::Data,
        "javascript" => return ProxyKind::Script,
        "bitcoin" => return ProxyKind::Bitcoin,
        "ed2k" => return ProxyKind::Ed2k,
        "magnet" => return ProxyKind::Magnet,
        "mailto" => return ProxyKind::Mail,
        "tel" => return ProxyKind::Tel,
        "irc" => return ProxyKind::Irc,
        _ => {}
    }
    if host.ends_with(".onion") {
        return ProxyKind::Tor;
    }
    if host.ends_with(".i2p") {
        return ProxyKind::I2p;
    }
    if ZERONET_GATEWAYS.contains(&host) {
        return ProxyKind::Zeronet;
    }
    if FREENET_GATEWAYS.contains(&host) {
        return ProxyKind::Freenet;
    }
    ProxyKind::Null
}

/// `<root>/<proxy>/<scheme>/<host-hash>/`.
pub fn base_path(root: &std::path::Path, link: &Link) -> PathBuf {
    root.join(link.proxy.as_str())
        .join(&link.scheme)
        .join(&link.host_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn canonicalization_is_idempotent() {
        let l1 = parse("HTTP://Example.COM/Path?q=1#frag", None).unwrap();
        let l2 = parse(&reconstruct(&l1.scheme, &l1.host, None, &l1.path, &l1.params, &l1.query, &l1.fragment), None).unwrap();
        assert_eq!(l1.url_hash, l2.url_hash);
    }

    #[test]
    fn equal_canonical_urls_hash_equal() {
        let a = parse("http://example.com/a", None).unwrap();
        let b = parse("HTTP://EXAMPLE.com/a", None).unwrap();
        assert_eq!(a.url_hash, b.url_hash);
    }

    #[test]
    fn onion_host_classifies_tor() {
        let l = parse("http://abcdefghij234567.onion/", None).unwrap();
        assert_eq!(l.proxy, ProxyKind::Tor);
    }

    #[test]
    fn i2p_host_classifies_i2p() {
        let l = parse("http://stats.i2p/", None).unwrap();
        assert_eq!(l.proxy, ProxyKind::I2p);
    }

    #[test]
    fn bare_scheme_without_host_is_legal() {
        let l = parse("mailto:admin@example.com", None).unwrap();
        assert_eq!(l.proxy, ProxyKind::Mail);
    }

    #[test]
    fn javascript_scheme_is_legal_without_host() {
        let l = parse("javascript:void(0)", None).unwrap();
        assert_eq!(l.proxy, ProxyKind::Script);
    }

    #[test]
    fn missing_scheme_is_rejected() {
        let err = parse("example.com/page", None);
        assert!(err.is_err());
    }

    #[test]
    fn base_path_begins_with_root_and_proxy() {
        let l = parse("http://abcdefghij234567.onion/x", None).unwrap();
        let p = base_path(Path::new("/data"), &l);
        assert!(p.starts_with("/data/tor"));
    }

    #[test]
    fn fragment_is_included_in_hash() {
        let a = parse("http://example.com/p", None).unwrap();
        let b = parse("http://example.com/p#section", None).unwrap();
        assert_ne!(a.url_hash, b.url_hash);
    }
}
