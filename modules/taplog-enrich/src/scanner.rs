//! Tag scanner: a small state machine over markup tokens.
//!
//! The scrape-derived source serves real-world HTML; the scanner makes no
//! attempt to build a tree. A tokenizer turns the byte stream into
//! start-tag/end-tag events and two extraction rules run over them.
//! Malformed markup never raises — an absent match is an empty result.

/// A start or end tag event. Text content is irrelevant to both extraction
/// rules and is not emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagEvent {
    Start {
        name: String,
        attrs: Vec<(String, String)>,
    },
    End {
        name: String,
    },
}

impl TagEvent {
    fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
        attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Tokenize markup into tag events. Best effort: comments, doctype and
/// processing instructions are skipped, unterminated constructs are dropped
/// at end of input.
pub fn tokenize(html: &str) -> Vec<TagEvent> {
    let bytes = html.as_bytes();
    let mut events = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let Some(open) = find(bytes, pos, b'<') else {
            break;
        };
        let rest = &html[open..];

        if rest.starts_with("<!--") {
            match html[open + 4..].find("-->") {
                Some(end) => pos = open + 4 + end + 3,
                None => break,
            }
            continue;
        }
        if rest.starts_with("<!") || rest.starts_with("<?") {
            match find(bytes, open + 1, b'>') {
                Some(end) => pos = end + 1,
                None => break,
            }
            continue;
        }

        let Some(close) = find_tag_end(html, open + 1) else {
            break;
        };
        let inner = html[open + 1..close].trim();
        pos = close + 1;
        if inner.is_empty() {
            continue;
        }

        if let Some(name) = inner.strip_prefix('/') {
            let name = name
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_ascii_lowercase();
            if !name.is_empty() {
                events.push(TagEvent::End { name });
            }
            continue;
        }

        let inner = inner.strip_suffix('/').unwrap_or(inner).trim_end();
        let mut parts = inner.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default().to_ascii_lowercase();
        if name.is_empty() || !name.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
            continue;
        }
        let attrs = parts.next().map(parse_attrs).unwrap_or_default();
        events.push(TagEvent::Start { name, attrs });
    }

    events
}

fn find(bytes: &[u8], from: usize, needle: u8) -> Option<usize> {
    bytes[from..].iter().position(|&b| b == needle).map(|i| from + i)
}

/// Position of the `>` ending the tag that starts at `from`, ignoring any
/// `>` inside quoted attribute values.
fn find_tag_end(html: &str, from: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in html[from..].char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '>') => return Some(from + i),
            _ => {}
        }
    }
    None
}

fn parse_attrs(s: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut chars = s.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        // attribute name
        let mut name_end = start;
        while let Some(&(i, c)) = chars.peek() {
            if c.is_whitespace() || c == '=' {
                break;
            }
            name_end = i + c.len_utf8();
            chars.next();
        }
        let name = s[start..name_end].to_ascii_lowercase();

        // optional whitespace, then `=` and a value
        while chars.peek().is_some_and(|&(_, c)| c.is_whitespace()) {
            chars.next();
        }
        if !chars.peek().is_some_and(|&(_, c)| c == '=') {
            if !name.is_empty() {
                attrs.push((name, String::new()));
            }
            continue;
        }
        chars.next(); // consume '='
        while chars.peek().is_some_and(|&(_, c)| c.is_whitespace()) {
            chars.next();
        }

        let value = match chars.peek().copied() {
            Some((vstart, q)) if q == '"' || q == '\'' => {
                chars.next();
                let vstart = vstart + 1;
                let mut vend = vstart;
                for (i, c) in chars.by_ref() {
                    if c == q {
                        break;
                    }
                    vend = i + c.len_utf8();
                }
                s[vstart..vend].to_string()
            }
            Some((vstart, _)) => {
                let mut vend = vstart;
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_whitespace() {
                        break;
                    }
                    vend = i + c.len_utf8();
                    chars.next();
                }
                s[vstart..vend].to_string()
            }
            None => String::new(),
        };
        if !name.is_empty() {
            attrs.push((name, value));
        }
    }

    attrs
}

/// Nested-link rule: hrefs of `a` tags whose nearest enclosing container of
/// the given tag name carries the given class, in document order.
///
/// Scope tracking is a single shallow flag, set when the qualifying
/// container opens and cleared on any matching close tag of that container
/// name. Same-named containers nested inside the qualifying one can falsely
/// retain or drop scope; this matches the upstream page structure and is
/// deliberately not generalized.
#[derive(Debug, Clone)]
pub struct NestedLinkRule<'a> {
    pub container: &'a str,
    pub container_class: &'a str,
    /// When set, only links carrying exactly this class qualify.
    pub link_class: Option<&'a str>,
}

impl NestedLinkRule<'_> {
    pub fn extract(&self, events: &[TagEvent]) -> Vec<String> {
        let mut in_container = false;
        let mut links = Vec::new();

        for event in events {
            match event {
                TagEvent::Start { name, attrs } if name == self.container => {
                    if !in_container
                        && TagEvent::attr(attrs, "class") == Some(self.container_class)
                    {
                        in_container = true;
                    }
                }
                TagEvent::Start { name, attrs } if name == "a" && in_container => {
                    if let Some(required) = self.link_class {
                        if TagEvent::attr(attrs, "class") != Some(required) {
                            continue;
                        }
                    }
                    if let Some(href) = TagEvent::attr(attrs, "href") {
                        links.push(href.to_string());
                    }
                }
                TagEvent::End { name } if name == self.container => {
                    in_container = false;
                }
                _ => {}
            }
        }

        links
    }
}

/// Attribute-value rule: `content` values of `meta` tags whose `property`
/// is one of the given names, in encounter order.
pub fn meta_property_values(events: &[TagEvent], properties: &[&str]) -> Vec<String> {
    let mut values = Vec::new();
    for event in events {
        let TagEvent::Start { name, attrs } = event else {
            continue;
        };
        if name != "meta" {
            continue;
        }
        let Some(property) = TagEvent::attr(attrs, "property") else {
            continue;
        };
        if properties.contains(&property) {
            if let Some(content) = TagEvent::attr(attrs, "content") {
                values.push(content.to_string());
            }
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECKIN_RULE: NestedLinkRule<'static> = NestedLinkRule {
        container: "p",
        container_class: "location",
        link_class: None,
    };

    #[test]
    fn link_inside_classed_container_is_extracted() {
        let html = r#"
            <html><body>
            <p class="intro"><a href="/ignored">no</a></p>
            <p class="location"><a href="/venue/the-brewery/42">The Brewery</a></p>
            </body></html>"#;
        let links = CHECKIN_RULE.extract(&tokenize(html));
        assert_eq!(links, vec!["/venue/the-brewery/42"]);
    }

    #[test]
    fn desktop_and_mobile_variants_come_back_in_document_order() {
        let html = r#"
            <p class="location">
              <a href="/venue/desktop/1">d</a>
              <a href="/venue/mobile/1">m</a>
            </p>"#;
        let links = CHECKIN_RULE.extract(&tokenize(html));
        assert_eq!(links, vec!["/venue/desktop/1", "/venue/mobile/1"]);
    }

    #[test]
    fn link_outside_container_scope_is_ignored() {
        let html = r#"
            <p class="location"></p>
            <a href="/outside">x</a>"#;
        assert!(CHECKIN_RULE.extract(&tokenize(html)).is_empty());
    }

    #[test]
    fn link_class_filter_and_query_survival() {
        let html = r#"
            <div class="venue-social">
              <a class="tw" href="https://twitter.com/x">t</a>
              <a class="fs track-click" href="https://foursquare.com/v/4abc?ref=9">f</a>
            </div>"#;
        let rule = NestedLinkRule {
            container: "div",
            container_class: "venue-social",
            link_class: Some("fs track-click"),
        };
        let links = rule.extract(&tokenize(html));
        assert_eq!(links, vec!["https://foursquare.com/v/4abc?ref=9"]);
    }

    #[test]
    fn shallow_scope_flag_is_cleared_by_nested_same_named_close() {
        // A same-named nested container closes the outer scope early; the
        // trailing link is lost. Known single-flag behavior, kept as-is.
        let html = r#"
            <div class="venue-social">
              <div class="inner"></div>
              <a class="fs track-click" href="https://foursquare.com/v/4abc">f</a>
            </div>"#;
        let rule = NestedLinkRule {
            container: "div",
            container_class: "venue-social",
            link_class: Some("fs track-click"),
        };
        assert!(rule.extract(&tokenize(html)).is_empty());
    }

    #[test]
    fn meta_values_in_encounter_order() {
        let html = r#"
            <meta property="og:title" content="The Brewery"/>
            <meta property="place:location:latitude" content="32.7157"/>
            <meta property="place:location:longitude" content="-117.1611"/>"#;
        let values = meta_property_values(
            &tokenize(html),
            &["place:location:latitude", "place:location:longitude"],
        );
        assert_eq!(values, vec!["32.7157", "-117.1611"]);
    }

    #[test]
    fn malformed_markup_does_not_panic() {
        for html in [
            "<p class=\"location\"><a href=",
            "<<<>>>",
            "<p class='location'><a href='/v/1'",
            "<!-- unterminated",
            "</>",
            "<a href=/venue/bare>x</a>",
        ] {
            let _ = CHECKIN_RULE.extract(&tokenize(html));
        }
    }

    #[test]
    fn unquoted_attribute_values_parse() {
        let html = "<p class=location><a href=/venue/1>v</a></p>";
        let links = CHECKIN_RULE.extract(&tokenize(html));
        assert_eq!(links, vec!["/venue/1"]);
    }
}
