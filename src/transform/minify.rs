//! Output minifiers applied by the reference rewriter.
//!
//! - [`css`]: full parse and minify through `lightningcss`.
//! - [`js`]: comment removal and whitespace collapse. Newlines are kept (one
//!   per run) so automatic semicolon insertion behaves as in the source.
//!   String, template, and regex literals are copied untouched.
//! - [`html`]: comment removal, whitespace collapse in text, and minification
//!   of inline `<style>` and `<script>` bodies. `<pre>` and `<textarea>`
//!   contents are preserved.

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};

/// Minify a stylesheet.
pub fn css(source: &str) -> Result<String, String> {
    let mut sheet =
        StyleSheet::parse(source, ParserOptions::default()).map_err(|e| e.to_string())?;
    sheet
        .minify(MinifyOptions::default())
        .map_err(|e| e.to_string())?;
    let printed = sheet
        .to_css(PrinterOptions {
            minify: true,
            ..PrinterOptions::default()
        })
        .map_err(|e| e.to_string())?;
    Ok(printed.code)
}

// ============================================================================
// JavaScript
// ============================================================================

fn is_ident(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || !c.is_ascii()
}

/// Keywords after which a `/` opens a regex literal.
const REGEX_KEYWORDS: &[&str] = &[
    "return", "typeof", "case", "do", "else", "in", "of", "new", "delete", "void", "throw",
    "instanceof", "yield", "await",
];

/// Whether a `/` following the output so far starts a regex rather than a
/// division. Identifiers, literals and closing brackets end an operand;
/// keywords and operators do not.
fn regex_allowed(out: &str) -> bool {
    let Some(last) = out.chars().next_back() else {
        return true;
    };
    if is_ident(last) {
        let head = out.trim_end_matches(is_ident);
        let word = &out[head.len()..];
        return !head.ends_with('.') && REGEX_KEYWORDS.contains(&word);
    }
    !matches!(last, ')' | ']' | '}' | '"' | '\'' | '`')
}

/// Copy a quoted literal starting at `start`, returning the index after it.
fn copy_quoted(chars: &[char], start: usize, out: &mut String) -> usize {
    let quote = chars[start];
    out.push(quote);
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        out.push(c);
        i += 1;
        if c == '\\' && i < chars.len() {
            out.push(chars[i]);
            i += 1;
        } else if c == quote {
            break;
        }
    }
    i
}

/// Copy a regex literal starting at `start` (the opening `/`).
fn copy_regex(chars: &[char], start: usize, out: &mut String) -> usize {
    out.push('/');
    let mut i = start + 1;
    let mut in_class = false;
    while i < chars.len() {
        let c = chars[i];
        if c == '\n' {
            break;
        }
        out.push(c);
        i += 1;
        match c {
            '\\' if i < chars.len() => {
                out.push(chars[i]);
                i += 1;
            }
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => break,
            _ => {}
        }
    }
    i
}

/// Minify a script conservatively.
pub fn js(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut last: Option<char> = None;
    let mut pending_space = false;
    let mut pending_newline = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c.is_whitespace() {
            if c == '\n' {
                pending_newline = true;
            } else {
                pending_space = true;
            }
            i += 1;
            continue;
        }
        if c == '/' && next == Some('/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c == '/' && next == Some('*') {
            let preserve = chars.get(i + 2) == Some(&'!');
            let start = i;
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i = (i + 2).min(chars.len());
            let comment: String = chars[start..i].iter().collect();
            if preserve {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(&comment);
                pending_newline = true;
                pending_space = false;
            } else if comment.contains('\n') {
                pending_newline = true;
            } else {
                pending_space = true;
            }
            continue;
        }

        if pending_newline && !out.is_empty() {
            out.push('\n');
        } else if pending_space {
            if let Some(prev) = last {
                let joins_token = (is_ident(prev) && is_ident(c))
                    || (prev == c && matches!(c, '+' | '-'))
                    || (prev == '/' && c == '/');
                if joins_token {
                    out.push(' ');
                }
            }
        }
        pending_space = false;
        pending_newline = false;

        i = match c {
            '"' | '\'' | '`' => copy_quoted(&chars, i, &mut out),
            '/' if regex_allowed(&out) => copy_regex(&chars, i, &mut out),
            _ => {
                out.push(c);
                i + 1
            }
        };
        last = Some(chars[i - 1]);
    }
    out
}

// ============================================================================
// HTML
// ============================================================================

/// Elements around which whitespace never renders.
const BLOCK_TAGS: &[&str] = &[
    "!doctype", "html", "head", "body", "title", "meta", "link", "script", "style", "base",
    "div", "p", "ul", "ol", "li", "dl", "dt", "dd", "section", "article", "aside", "header",
    "footer", "nav", "main", "figure", "figcaption", "table", "thead", "tbody", "tfoot", "tr",
    "td", "th", "form", "fieldset", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "br", "blockquote",
    "noscript", "template", "option", "select",
];

fn is_block(tag: &str) -> bool {
    BLOCK_TAGS.contains(&tag.trim_start_matches('/'))
}

/// Lowercased element name of the tag starting at `start` (`<` position).
fn tag_name(chars: &[char], start: usize) -> String {
    let mut name = String::new();
    for (n, &c) in chars[start + 1..].iter().enumerate() {
        if c.is_whitespace() || c == '>' || (c == '/' && n > 0) {
            break;
        }
        name.push(c.to_ascii_lowercase());
    }
    name
}

/// Index just past the `>` closing the tag at `start`, honouring quoted attributes.
fn tag_end(chars: &[char], start: usize) -> usize {
    let mut quote: Option<char> = None;
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '>' => return i + 1,
            None => {}
        }
        i += 1;
    }
    chars.len()
}

/// Collapse whitespace inside a tag, outside attribute values.
fn squeeze_tag(tag: &[char]) -> String {
    let mut out = String::with_capacity(tag.len());
    let mut quote: Option<char> = None;
    let mut space = false;
    for &c in tag {
        if quote.is_none() && c.is_whitespace() {
            space = true;
            continue;
        }
        if space && c != '>' {
            out.push(' ');
        }
        space = false;
        match quote {
            Some(q) if c == q => quote = None,
            None if c == '"' || c == '\'' => quote = Some(c),
            _ => {}
        }
        out.push(c);
    }
    out
}

fn find_ci(chars: &[char], from: usize, needle: &str) -> Option<usize> {
    let needle: Vec<char> = needle.chars().collect();
    (from..chars.len().saturating_sub(needle.len() - 1)).find(|&i| {
        chars[i..i + needle.len()]
            .iter()
            .zip(&needle)
            .all(|(a, b)| a.to_ascii_lowercase() == *b)
    })
}

fn is_js_type(open_tag: &str) -> bool {
    let lower = open_tag.to_ascii_lowercase();
    match lower.find("type=") {
        None => true,
        Some(pos) => {
            let value = &lower[pos + 5..];
            value.contains("javascript") || value.contains("module")
        }
    }
}

fn collapse_text(text: &str, prev_block: bool, next_block: bool) -> String {
    let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return if prev_block || next_block || text.is_empty() {
            String::new()
        } else {
            " ".to_string()
        };
    }
    let lead = !prev_block && text.starts_with(char::is_whitespace);
    let trail = !next_block && text.ends_with(char::is_whitespace);
    format!(
        "{}{}{}",
        if lead { " " } else { "" },
        collapsed,
        if trail { " " } else { "" }
    )
}

/// Minify an HTML document.
pub fn html(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut prev_block = true;
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '<' {
            let start = i;
            while i < chars.len() && chars[i] != '<' {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let next_block = i >= chars.len() || is_block(&tag_name(&chars, i));
            out.push_str(&collapse_text(&text, prev_block, next_block));
            continue;
        }

        if chars[i..].starts_with(&['<', '!', '-', '-']) {
            let end = find_ci(&chars, i + 2, "-->").map(|e| e + 3).unwrap_or(chars.len());
            if chars[i..].starts_with(&['<', '!', '-', '-', '[']) {
                out.extend(&chars[i..end]);
            }
            i = end;
            continue;
        }

        let name = tag_name(&chars, i);
        let end = tag_end(&chars, i);
        let open_tag = squeeze_tag(&chars[i..end]);
        out.push_str(&open_tag);
        prev_block = is_block(&name);
        i = end;

        if matches!(name.as_str(), "script" | "style" | "pre" | "textarea")
            && !open_tag.ends_with("/>")
        {
            let close = find_ci(&chars, i, &format!("</{name}")).unwrap_or(chars.len());
            let body: String = chars[i..close].iter().collect();
            let body = match name.as_str() {
                "style" => css(&body).unwrap_or(body),
                "script" if is_js_type(&open_tag) => js(&body).trim().to_string(),
                _ => body,
            };
            out.push_str(&body);
            i = close;
            if i < chars.len() {
                let end = tag_end(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
            }
        }
    }
    out
}
