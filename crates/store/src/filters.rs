use darc_core::config::FilterConfig;
use regex::Regex;

/// Compiled white/black lists applied by every `load_*` call before
/// returning claimed entries. Regex lists for links and MIME types;
/// casefold string compare for proxy kinds.
#[derive(Clone)]
pub struct FilterLists {
    link_white: Vec<Regex>,
    link_black: Vec<Regex>,
    mime_white: Vec<Regex>,
    mime_black: Vec<Regex>,
    proxy_white: Vec<String>,
    proxy_black: Vec<String>,
    link_fallback: bool,
    mime_fallback: bool,
    proxy_fallback: bool,
}

fn compile(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(r) => Some(r),
            Err(e) => {
                tracing::warn!(pattern = %p, error = %e, "invalid filter pattern, ignoring");
                None
            }
        })
        .collect()
}

impl FilterLists {
    pub fn from_config(cfg: &FilterConfig) -> Self {
        Self {
            link_white: compile(&cfg.link_white_list),
            link_black: compile(&cfg.link_black_list),
            mime_white: compile(&cfg.mime_white_list),
            mime_black: compile(&cfg.mime_black_list),
            proxy_white: cfg.proxy_white_list.iter().map(|s| s.to_lowercase()).collect(),
            proxy_black: cfg.proxy_black_list.iter().map(|s| s.to_lowercase()).collect(),
            link_fallback: cfg.link_fallback,
            mime_fallback: cfg.mime_fallback,
            proxy_fallback: cfg.proxy_fallback,
        }
    }

    pub fn allows_link(&self, url: &str) -> bool {
        verdict(url, &self.link_white, &self.link_black, self.link_fallback)
    }

    pub fn allows_mime(&self, mime: &str) -> bool {
        verdict(mime, &self.mime_white, &self.mime_black, self.mime_fallback)
    }

    pub fn allows_proxy(&self, proxy_kind: &str) -> bool {
        let kind = proxy_kind.to_lowercase();
        if self.proxy_black.iter().any(|p| p == &kind) {
            return false;
        }
        if self.proxy_white.iter().any(|p| p == &kind) {
            return true;
        }
        self.proxy_fallback
    }
}

fn verdict(subject: &str, white: &[Regex], black: &[Regex], fallback: bool) -> bool {
    if black.iter().any(|r| r.is_match(subject)) {
        return false;
    }
    if white.iter().any(|r| r.is_match(subject)) {
        return true;
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(white: &[&str], black: &[&str], fallback: bool) -> FilterConfig {
        FilterConfig {
            link_white_list: white.iter().map(|s| s.to_string()).collect(),
            link_black_list: black.iter().map(|s| s.to_string()).collect(),
            link_fallback: fallback,
            ..Default::default()
        }
    }

    #[test]
    fn black_list_wins_over_white_list() {
        let filters = FilterLists::from_config(&config_with(&[".*"], &["spam"], false));
        assert!(!filters.allows_link("http://spam.example/"));
        assert!(filters.allows_link("http://ok.example/"));
    }

    #[test]
    fn fallback_applies_when_no_pattern_matches() {
        let filters = FilterLists::from_config(&config_with(&[], &[], true));
        assert!(filters.allows_link("http://anything/"));
    }

    #[test]
    fn proxy_black_list_is_casefolded() {
        let cfg = FilterConfig {
            proxy_black_list: vec!["TOR".to_string()],
            proxy_fallback: true,
            ..Default::default()
        };
        let filters = FilterLists::from_config(&cfg);
        assert!(!filters.allows_proxy("tor"));
        assert!(filters.allows_proxy("i2p"));
    }
}
