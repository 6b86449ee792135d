//! Minimal HTML to text conversion, enough to find armor inside HTML bodies.

const BLOCK_TAGS: [&str; 5] = ["/p", "p", "/div", "div", "/tr"];

/// Strips tags, turns block-level tags into line breaks and decodes the
/// common entities. Script and style contents are dropped.
pub fn html_to_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(lt) = rest.find('<') {
        out.push_str(&decode_entities(&rest[..lt]));
        let tag_src = &rest[lt + 1..];
        let Some(gt) = tag_src.find('>') else {
            out.push_str(&decode_entities(&rest[lt..]));
            return out;
        };
        let tag = tag_name(&tag_src[..gt]);
        rest = &tag_src[gt + 1..];

        if tag == "script" || tag == "style" {
            let close = format!("</{tag}");
            match rest.to_ascii_lowercase().find(&close) {
                Some(at) => {
                    rest = &rest[at..];
                    if let Some(end) = rest.find('>') {
                        rest = &rest[end + 1..];
                    }
                }
                None => return out,
            }
            continue;
        }
        if tag == "br" || (BLOCK_TAGS.contains(&tag.as_str()) && !out.ends_with('\n')) {
            out.push('\n');
        }
    }
    out.push_str(&decode_entities(rest));
    out
}

fn tag_name(inner: &str) -> String {
    let inner = inner.trim();
    let closing = inner.starts_with('/');
    let name: String = inner
        .trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    if closing { format!("/{name}") } else { name }
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match tail.find(';').filter(|semi| *semi <= 10) {
            Some(semi) => {
                match entity(&tail[1..semi]) {
                    Some(c) => out.push(c),
                    None => out.push_str(&tail[..=semi]),
                }
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
