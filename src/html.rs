//! Markup-to-text conversion for HTML mail bodies.
//!
//! Tags are removed by a small scanner instead of regexes so that stray `<`
//! characters, unterminated comments and uppercase `<SCRIPT>` blocks are all
//! handled the same way.

use regex::Regex;
use std::sync::LazyLock;

/// Raw markup beyond this many characters is dropped before scanning.
pub const MAX_RAW_HTML_CHARS: usize = 10_000;

static MULTI_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n\s*\n+").expect("valid regex"));
static HORIZONTAL_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("valid regex"));
static LINE_LEADING_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]+").expect("valid regex"));

/// Converts HTML into readable plain text.
///
/// Script and style elements are dropped with their content, comments are
/// removed, every other tag is stripped, entities are decoded and whitespace
/// is normalised. Length bounding of the result is left to the caller.
pub fn strip_html(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }

    let bounded = match html.char_indices().nth(MAX_RAW_HTML_CHARS) {
        Some((cut, _)) => format!("{}...", &html[..cut]),
        None => html.to_string(),
    };

    let text = remove_markup(&bounded);
    let text = decode_entities(&text);
    normalize_whitespace(&text)
}

/// Collapses blank-line runs to one empty line, squeezes horizontal
/// whitespace and trims each line's indentation.
pub fn normalize_whitespace(text: &str) -> String {
    let text = MULTI_BLANK_LINES.replace_all(text, "\n\n");
    let text = HORIZONTAL_SPACE.replace_all(&text, " ");
    let text = LINE_LEADING_SPACE.replace_all(&text, "\n");
    text.trim().to_string()
}

fn remove_markup(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(pos) = rest.find('<') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        if rest.starts_with("<!--") {
            rest = match rest[4..].find("-->") {
                Some(end) => &rest[4 + end + 3..],
                None => "",
            };
            continue;
        }

        if let Some(name) = raw_text_element(rest) {
            rest = skip_raw_text_element(rest, name);
            continue;
        }

        if looks_like_tag(rest) {
            rest = match rest.find('>') {
                Some(end) => &rest[end + 1..],
                None => "",
            };
        } else {
            // A literal '<' in text, e.g. "a < b".
            out.push('<');
            rest = &rest[1..];
        }
    }

    out.push_str(rest);
    out
}

/// Returns the element name when `s` opens a `<script>` or `<style>` element.
fn raw_text_element(s: &str) -> Option<&'static str> {
    ["script", "style"].into_iter().find(|name| {
        let open_len = 1 + name.len();
        s.len() > open_len
            && s.is_char_boundary(open_len)
            && s[1..open_len].eq_ignore_ascii_case(name)
            && matches!(
                s.as_bytes()[open_len],
                b'>' | b' ' | b'\t' | b'\n' | b'\r' | b'/'
            )
    })
}

fn skip_raw_text_element<'a>(s: &'a str, name: &str) -> &'a str {
    let closing = format!("</{}", name);
    let lower = s.to_ascii_lowercase();
    match lower.find(&closing) {
        Some(start) => match s[start..].find('>') {
            Some(end) => &s[start + end + 1..],
            None => "",
        },
        None => "",
    }
}

fn looks_like_tag(s: &str) -> bool {
    match s[1..].chars().next() {
        Some(c) => c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?'),
        None => false,
    }
}

/// Decodes named, decimal and hexadecimal character references.
/// Unknown references are left untouched.
pub fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        let decoded = rest[1..]
            .find(';')
            .filter(|end| *end > 0 && *end <= 32)
            .and_then(|end| decode_reference(&rest[1..1 + end]).map(|c| (c, end + 2)));

        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_reference(reference: &str) -> Option<char> {
    if let Some(number) = reference.strip_prefix('#') {
        let code = match number.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }

    let c = match reference {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        "euro" => '€',
        "pound" => '£',
        "yen" => '¥',
        "cent" => '¢',
        "sect" => '§',
        "deg" => '°',
        "middot" => '·',
        "bull" => '•',
        "hellip" => '…',
        "ndash" => '–',
        "mdash" => '—',
        "lsquo" => '‘',
        "rsquo" => '’',
        "sbquo" => '‚',
        "ldquo" => '“',
        "rdquo" => '”',
        "bdquo" => '„',
        "laquo" => '«',
        "raquo" => '»',
        "times" => '×',
        "divide" => '÷',
        "zwnj" => '\u{200c}',
        "zwj" => '\u{200d}',
        "shy" => '\u{ad}',
        "eacute" => 'é',
        "egrave" => 'è',
        "ecirc" => 'ê',
        "agrave" => 'à',
        "aacute" => 'á',
        "acirc" => 'â',
        "ccedil" => 'ç',
        "ocirc" => 'ô',
        "ouml" => 'ö',
        "uuml" => 'ü',
        "auml" => 'ä',
        "szlig" => 'ß',
        _ => return None,
    };
    Some(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_markup() {
        assert_eq!(strip_html("<p>Hi <b>there</b></p>"), "Hi there");
    }

    #[test]
    fn test_script_style_and_comments_removed() {
        let html = "<html><head><STYLE type=\"text/css\">p { color: red; }</STYLE>\
                    <script>var x = '<b>';</script></head>\
                    <body><!-- tracking <img> -->Hello<br/>world</body></html>";
        assert_eq!(strip_html(html), "Helloworld");
    }

    #[test]
    fn test_literal_angle_bracket_kept() {
        assert_eq!(strip_html("<p>1 < 2 and 3 > 2</p>"), "1 < 2 and 3 > 2");
    }

    #[test]
    fn test_unterminated_constructs() {
        assert_eq!(strip_html("before<!-- never closed"), "before");
        assert_eq!(strip_html("before<script>alert(1)"), "before");
        assert_eq!(strip_html("before<div class=\"x\""), "before");
    }

    #[test]
    fn test_entities() {
        assert_eq!(
            decode_entities("Fish &amp; Chips &lt;3 &#233;t&#xE9; &nbsp;&bogus; & more"),
            "Fish & Chips <3 été \u{a0}&bogus; & more"
        );
    }

    #[test]
    fn test_whitespace_normalisation() {
        let html = "<div>  Line one\t\t here</div>\n\n\n\n   <div>   Line two</div>\n  \n \n<p>end</p>";
        assert_eq!(strip_html(html), "Line one here\n\nLine two\n\nend");
    }

    #[test]
    fn test_raw_markup_bounded() {
        let html = format!("<p>{}</p>", "a".repeat(20_000));
        let text = strip_html(&html);
        // 3 chars of the opening tag are dropped, the rest is text plus "..."
        assert_eq!(text.chars().count(), MAX_RAW_HTML_CHARS - 3 + 3);
        assert!(text.ends_with("..."));
    }

    #[test]
    fn test_script_prefix_is_not_script() {
        assert_eq!(strip_html("<scripture>Psalm</scripture>"), "Psalm");
    }
}
