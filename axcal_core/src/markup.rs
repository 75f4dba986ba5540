//! Minimal element-tree reader and writer for calibration blocks.
//!
//! Only the subset needed for calibration text is supported: nested elements,
//! text content, self-closing tags, comments and the five predefined entities
//! plus numeric character references. Attributes are accepted and skipped.

use crate::{Error, Result};
use std::borrow::Cow;

/// Deepest element nesting accepted; calibration text needs three levels.
const MAX_DEPTH: usize = 32;

/// A parsed element: tag, verbatim text content and child elements.
///
/// Text between child elements is concatenated. Callers trim what they need.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Element {
    pub tag: String,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    /// Parse a single root element. Only whitespace may surround it.
    pub fn parse(input: &str) -> Result<Element> {
        let mut parser = Parser {
            src: input,
            pos: 0,
            depth: 0,
        };
        parser.skip_misc()?;
        let root = parser.element()?;
        parser.skip_misc()?;
        if parser.pos < input.len() {
            return Err(parser.error("trailing content after root element"));
        }
        Ok(root)
    }

    /// First child with the given tag.
    pub fn child(&self, tag: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.tag == tag)
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn error(&self, what: &str) -> Error {
        Error::MalformedEncoding(format!("{} at byte {}", what, self.pos))
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    /// Whitespace, comments and `<?...?>` declarations.
    fn skip_misc(&mut self) -> Result<()> {
        loop {
            self.skip_whitespace();
            if self.rest().starts_with("<!--") {
                self.skip_comment()?;
            } else if self.rest().starts_with("<?") {
                match self.rest().find("?>") {
                    Some(end) => self.pos += end + 2,
                    None => return Err(self.error("unterminated declaration")),
                }
            } else {
                return Ok(());
            }
        }
    }

    fn skip_comment(&mut self) -> Result<()> {
        match self.rest()[4..].find("-->") {
            Some(end) => {
                self.pos += 4 + end + 3;
                Ok(())
            }
            None => Err(self.error("unterminated comment")),
        }
    }

    fn name(&mut self) -> Result<&'a str> {
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error("expected a tag name"));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    /// Skip attributes up to `>` or `/>`; returns true when self-closing.
    fn finish_start_tag(&mut self) -> Result<bool> {
        let mut quote: Option<char> = None;
        for (i, c) in self.rest().char_indices() {
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '"') | (None, '\'') => quote = Some(c),
                (None, '>') => {
                    let self_closing = self.rest()[..i].trim_end().ends_with('/');
                    self.pos += i + 1;
                    return Ok(self_closing);
                }
                (None, '<') => break,
                _ => {}
            }
        }
        Err(self.error("unterminated start tag"))
    }

    fn element(&mut self) -> Result<Element> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(&format!("elements nested deeper than {}", MAX_DEPTH)));
        }
        self.depth += 1;
        let element = self.element_body();
        self.depth -= 1;
        element
    }

    fn element_body(&mut self) -> Result<Element> {
        if !self.rest().starts_with('<') {
            return Err(self.error("expected '<'"));
        }
        self.pos += 1;
        let tag = self.name()?.to_string();
        if self.finish_start_tag()? {
            return Ok(Element {
                tag,
                ..Default::default()
            });
        }

        let mut text = String::new();
        let mut children = Vec::new();
        loop {
            let rest = self.rest();
            let next = match rest.find('<') {
                Some(i) => i,
                None => {
                    return Err(self.error(&format!("element <{}> is not closed", tag)));
                }
            };
            text.push_str(&unescape(&rest[..next])?);
            self.pos += next;

            if self.rest().starts_with("</") {
                self.pos += 2;
                let closing = self.name()?;
                if closing != tag {
                    return Err(self.error(&format!(
                        "mismatched closing tag </{}> for <{}>",
                        closing, tag
                    )));
                }
                self.skip_whitespace();
                if !self.rest().starts_with('>') {
                    return Err(self.error("expected '>'"));
                }
                self.pos += 1;
                return Ok(Element { tag, text, children });
            } else if self.rest().starts_with("<!--") {
                self.skip_comment()?;
            } else {
                children.push(self.element()?);
            }
        }
    }
}

/// Replace the predefined entities and character references.
pub fn unescape(s: &str) -> Result<Cow<'_, str>> {
    if !s.contains('&') {
        return Ok(Cow::Borrowed(s));
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after
            .find(';')
            .ok_or_else(|| Error::MalformedEncoding(format!("unterminated entity in {:?}", s)))?;
        let entity = &after[..semi];
        let c = match entity {
            "lt" => '<',
            "gt" => '>',
            "amp" => '&',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32).ok_or_else(|| {
                    Error::MalformedEncoding(format!("unknown entity '&{};'", entity))
                })?
            }
        };
        out.push(c);
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    Ok(Cow::Owned(out))
}

/// Escape text content for embedding between tags.
pub fn escape(s: &str) -> Cow<'_, str> {
    if !s.contains(|c| matches!(c, '<' | '>' | '&')) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Compact writer producing `<tag>text</tag>` sequences.
#[derive(Debug, Default)]
pub struct Writer {
    buf: String,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, tag: &str) -> &mut Self {
        self.buf.push('<');
        self.buf.push_str(tag);
        self.buf.push('>');
        self
    }

    pub fn close(&mut self, tag: &str) -> &mut Self {
        self.buf.push_str("</");
        self.buf.push_str(tag);
        self.buf.push('>');
        self
    }

    pub fn leaf(&mut self, tag: &str, text: &str) -> &mut Self {
        self.open(tag);
        self.buf.push_str(&escape(text));
        self.close(tag)
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_elements() {
        let root = Element::parse(
            "<axis_calibration>\n  <axiskey>t</axiskey>\n  <channel0><name>Vm</name></channel0>\n</axis_calibration>",
        )
        .unwrap();
        assert_eq!(root.tag, "axis_calibration");
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.child("axiskey").unwrap().text, "t");
        let ch = root.child("channel0").unwrap();
        assert_eq!(ch.child("name").unwrap().text, "Vm");
    }

    #[test]
    fn test_self_closing_attributes_and_comments() {
        let root = Element::parse(r#"<a><!-- note --><b x="1>2"/><c id='q'>v</c></a>"#).unwrap();
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].tag, "b");
        assert_eq!(root.children[0].text, "");
        assert_eq!(root.child("c").unwrap().text, "v");
    }

    #[test]
    fn test_entities_roundtrip_through_writer() {
        let mut w = Writer::new();
        w.open("n").leaf("name", "a < b & c").close("n");
        let text = w.finish();
        assert_eq!(text, "<n><name>a &lt; b &amp; c</name></n>");
        let root = Element::parse(&text).unwrap();
        assert_eq!(root.child("name").unwrap().text, "a < b & c");
        assert_eq!(unescape("&#956;m &#x3bc;V").unwrap(), "μm μV");
    }

    #[test]
    fn test_text_is_kept_verbatim() {
        let root = Element::parse("<a><name>  Vm </name>\n</a>").unwrap();
        assert_eq!(root.child("name").unwrap().text, "  Vm ");
        assert_eq!(root.text, "\n");
    }

    #[test]
    fn test_deep_nesting_is_malformed() {
        let depth = 200_000;
        let text = format!("<a>{}{}</a>", "<b>".repeat(depth), "</b>".repeat(depth));
        let err = Element::parse(&text).unwrap_err();
        assert!(matches!(err, Error::MalformedEncoding(_)));

        let ok = format!("{}{}", "<b>".repeat(MAX_DEPTH), "</b>".repeat(MAX_DEPTH));
        assert!(Element::parse(&ok).is_ok());
        let too_deep = format!("{}{}", "<b>".repeat(MAX_DEPTH + 1), "</b>".repeat(MAX_DEPTH + 1));
        assert!(matches!(Element::parse(&too_deep), Err(Error::MalformedEncoding(_))));
    }

    #[test]
    fn test_truncated_input_is_malformed() {
        for bad in [
            "<axis_calibration><units>s</units>",
            "<a><b></a>",
            "<a><b>text</b",
            "<a>&bogus;</a>",
            "<a></a><b></b>",
            "<>",
        ] {
            let err = Element::parse(bad).unwrap_err();
            assert!(matches!(err, Error::MalformedEncoding(_)), "{:?}", bad);
        }
    }
}
