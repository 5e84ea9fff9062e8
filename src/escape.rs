use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

/// Bytes escaped inside a single query key or value.
///
/// `+` stays literal since servers read it as a form-encoded space. `%` is
/// handled separately by [`escape_component`].
const QUERY_COMPONENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'&')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Normalizes a raw query string so every key and value is percent-encoded
/// exactly once.
///
/// Existing `%XX` escapes are copied through untouched, so already-escaped
/// input is left unchanged: `a%20b` stays `a%20b` instead of turning into
/// `a%2520b`. A `%` that does not start a valid escape is encoded as `%25`.
pub fn escape_query(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for (index, pair) in raw.split('&').enumerate() {
        if index > 0 {
            escaped.push('&');
        }
        match pair.split_once('=') {
            Some((key, value)) => {
                escape_component(key, &mut escaped);
                escaped.push('=');
                escape_component(value, &mut escaped);
            }
            None => escape_component(pair, &mut escaped),
        }
    }
    escaped
}

fn escape_component(component: &str, out: &mut String) {
    let mut rest = component;
    while let Some(pos) = rest.find('%') {
        out.extend(utf8_percent_encode(&rest[..pos], QUERY_COMPONENT));
        let tail = &rest[pos..];
        if starts_with_escape(tail) {
            out.push_str(&tail[..3]);
            rest = &tail[3..];
        } else {
            out.push_str("%25");
            rest = &tail[1..];
        }
    }
    out.extend(utf8_percent_encode(rest, QUERY_COMPONENT));
}

fn starts_with_escape(s: &str) -> bool {
    matches!(
        s.as_bytes(),
        [b'%', hi, lo, ..] if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit()
    )
}

/// Rewrites the query of `url` in place with [`escape_query`].
pub(crate) fn escape_url_query(url: &mut reqwest::Url) {
    if let Some(query) = url.query() {
        let escaped = escape_query(query);
        if escaped != query {
            url.set_query(Some(&escaped));
        }
    }
}
