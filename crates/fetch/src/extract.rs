//! Content-type-dispatched link extraction: per MIME family, a different
//! extractor. New families are added by extending [`ContentFamily`] and
//! `family_for` rather than branching all over the caller.

use quick_xml::events::Event;
use quick_xml::Reader;
use scraper::{Html, Selector};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFamily {
    Html,
    Xml,
    Text,
    Binary,
}

/// Classifies a response's content-type header into the dispatch variant
/// its body should be parsed with.
pub fn family_for(content_type: Option<&str>) -> ContentFamily {
    let Some(ct) = content_type else {
        return ContentFamily::Binary;
    };
    let ct = ct.to_ascii_lowercase();
    if ct.contains("html") {
        ContentFamily::Html
    } else if ct.contains("xml") {
        ContentFamily::Xml
    } else if ct.starts_with("text/") || ct.contains("json") {
        ContentFamily::Text
    } else {
        ContentFamily::Binary
    }
}

/// Extracts candidate URLs from a response body given its content family.
/// Returned strings are resolved against `base` where the source format
/// supports relative references; already-absolute URLs pass through as-is.
pub fn extract_links(family: ContentFamily, body: &str, base: &Url) -> Vec<String> {
    match family {
        ContentFamily::Html => extract_html(body, base),
        ContentFamily::Xml => extract_xml(body),
        ContentFamily::Text => extract_text(body),
        ContentFamily::Binary => Vec::new(),
    }
}

fn extract_html(body: &str, base: &Url) -> Vec<String> {
    let document = Html::parse_document(body);
    let mut out = Vec::new();

    let Ok(a_sel) = Selector::parse("a[href]") else {
        return out;
    };
    for el in document.select(&a_sel) {
        if let Some(href) = el.value().attr("href") {
            push_resolved(&mut out, base, href);
        }
    }

    if let Ok(form_sel) = Selector::parse("form[action]") {
        for el in document.select(&form_sel) {
            if let Some(action) = el.value().attr("action") {
                push_resolved(&mut out, base, action);
            }
        }
    }

    out
}

fn push_resolved(out: &mut Vec<String>, base: &Url, href: &str) {
    if href.is_empty() || href.starts_with('#') {
        return;
    }
    if href.starts_with("javascript:") {
        return;
    }
    match base.join(href) {
        Ok(url) => out.push(url.to_string()),
        Err(_) => {
            if Url::parse(href).is_ok() {
                out.push(href.to_string());
            }
        }
    }
}

/// Extracts `<loc>` entries from a sitemap/sitemap-index XML document.
fn extract_xml(body: &str) -> Vec<String> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);
    let mut out = Vec::new();
    let mut in_loc = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"loc" => in_loc = true,
            Ok(Event::End(e)) if e.local_name().as_ref() == b"loc" => in_loc = false,
            Ok(Event::Text(t)) if in_loc => {
                if let Ok(text) = t.decode() {
                    out.push(text.trim().to_string());
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    out
}

/// Bare text: pull anything that looks like a URL via a permissive regex.
fn extract_text(body: &str) -> Vec<String> {
    static PATTERN: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = PATTERN.get_or_init(|| regex::Regex::new(r#"https?://[^\s"'<>]+"#).unwrap());
    re.find_iter(body).map(|m| m.as_str().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_dispatch_matches_content_type() {
        assert_eq!(family_for(Some("text/html; charset=utf-8")), ContentFamily::Html);
        assert_eq!(family_for(Some("application/xml")), ContentFamily::Xml);
        assert_eq!(family_for(Some("text/plain")), ContentFamily::Text);
        assert_eq!(family_for(Some("image/png")), ContentFamily::Binary);
        assert_eq!(family_for(None), ContentFamily::Binary);
    }

    #[test]
    fn html_extraction_resolves_relative_hrefs() {
        let base = Url::parse("http://example.com/a/").unwrap();
        let body = r#"<html><body><a href="../b">B</a><a href="http://other.com/c">C</a></body></html>"#;
        let links = extract_html(body, &base);
        assert!(links.contains(&"http://example.com/b".to_string()));
        assert!(links.contains(&"http://other.com/c".to_string()));
    }

    #[test]
    fn xml_sitemap_locs_are_extracted() {
        let body = r#"<urlset><url><loc>http://example.com/x</loc></url></urlset>"#;
        let links = extract_xml(body);
        assert_eq!(links, vec!["http://example.com/x".to_string()]);
    }

    #[test]
    fn fragment_only_href_is_skipped() {
        let base = Url::parse("http://example.com/").unwrap();
        let body = r#"<a href="#top">top</a>"#;
        assert!(extract_html(body, &base).is_empty());
    }
}
