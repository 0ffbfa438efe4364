//! A minimal robots.txt matcher: `User-agent: *` rule groups, longest
//! matching `Disallow`/`Allow` prefix wins. An absent or empty robots.txt is
//! equivalent to allow-all.

pub struct Robots {
    rules: Vec<(bool, String)>, // (allow, path_prefix)
}

impl Robots {
    pub fn parse(content: &str) -> Self {
        let mut rules = Vec::new();
        let mut in_wildcard_group = false;

        for raw_line in content.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    in_wildcard_group = value == "*";
                }
                "disallow" if in_wildcard_group => {
                    if !value.is_empty() {
                        rules.push((false, value.to_string()));
                    }
                }
                "allow" if in_wildcard_group => {
                    if !value.is_empty() {
                        rules.push((true, value.to_string()));
                    }
                }
                _ => {}
            }
        }

        Self { rules }
    }

    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Longest matching prefix wins; no match means allowed.
    pub fn is_allowed(&self, path: &str) -> bool {
        let mut best: Option<(usize, bool)> = None;
        for (allow, prefix) in &self.rules {
            if path.starts_with(prefix.as_str()) {
                let len = prefix.len();
                if best.map(|(l, _)| len > l).unwrap_or(true) {
                    best = Some((len, *allow));
                }
            }
        }
        best.map(|(_, allow)| allow).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_robots_allows_everything() {
        let r = Robots::parse("");
        assert!(r.is_allowed("/anything"));
    }

    #[test]
    fn disallow_all_denies_everything() {
        let r = Robots::parse("User-agent: *\nDisallow: /\n");
        assert!(!r.is_allowed("/page"));
    }

    #[test]
    fn more_specific_allow_overrides_broader_disallow() {
        let r = Robots::parse("User-agent: *\nDisallow: /private\nAllow: /private/public\n");
        assert!(!r.is_allowed("/private/secret"));
        assert!(r.is_allowed("/private/public/x"));
    }

    #[test]
    fn non_wildcard_group_is_ignored() {
        let r = Robots::parse("User-agent: Googlebot\nDisallow: /\n");
        assert!(r.is_allowed("/page"));
    }
}
