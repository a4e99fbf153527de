use std::fmt;
use std::io::Write;
use std::str::FromStr;

use crate::arena::{Arena, Node, NodeKind};
use crate::error::{Error, Result};

/// Result-tree serialization method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Xml,
    Html,
    Text,
    Json,
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "xml" => Ok(Method::Xml),
            "html" => Ok(Method::Html),
            "text" => Ok(Method::Text),
            "json" => Ok(Method::Json),
            other => Err(Error::UnsupportedMethod(other.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Xml => "xml",
            Method::Html => "html",
            Method::Text => "text",
            Method::Json => "json",
        };
        write!(f, "{}", s)
    }
}

/// Serialization settings, one per named output.
#[derive(Debug, Clone)]
pub struct Output {
    pub name: Option<String>,
    pub method: Method,
    pub version: Option<String>,
    pub encoding: String,
    pub indent: bool,
    pub omit_prolog: bool,
    pub doctype_public: Option<String>,
    pub doctype_system: Option<String>,
}

impl Default for Output {
    fn default() -> Self {
        Output {
            name: None,
            method: Method::Xml,
            version: None,
            encoding: "UTF-8".to_string(),
            indent: false,
            omit_prolog: false,
            doctype_public: None,
            doctype_system: None,
        }
    }
}

const HTML_VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const INDENT: &str = "  ";

impl Arena {
    /// Serialize the tree under `node` using the given output settings.
    pub fn serialize(&self, node: Node, output: &Output, w: &mut dyn Write) -> Result<()> {
        match output.method {
            Method::Xml => {
                if !output.omit_prolog {
                    writeln!(
                        w,
                        "<?xml version=\"{}\" encoding=\"{}\"?>",
                        output.version.as_deref().unwrap_or("1.0"),
                        output.encoding
                    )?;
                }
                self.write_doctype(node, output, w)?;
                self.write_xml(node, output, w, 0)?;
                Ok(())
            }
            Method::Html => {
                match output.version.as_deref() {
                    Some("5") | None => writeln!(w, "<!DOCTYPE html>")?,
                    Some(_) => writeln!(
                        w,
                        "<!DOCTYPE html PUBLIC \"-//W3C//DTD HTML 4.01//EN\" \"http://www.w3.org/TR/html4/strict.dtd\">"
                    )?,
                }
                self.write_html(node, output, w)?;
                Ok(())
            }
            Method::Text => {
                w.write_all(self.string_value(node).as_bytes())?;
                Ok(())
            }
            Method::Json => self.write_json(node, w),
        }
    }

    pub fn serialize_to_string(&self, node: Node, output: &Output) -> Result<String> {
        let mut buf = Vec::new();
        self.serialize(node, output, &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn write_doctype(&self, node: Node, output: &Output, w: &mut dyn Write) -> Result<()> {
        let (Some(root), Some(system)) = (
            self.document_element(self.root(node)),
            output.doctype_system.as_deref(),
        ) else {
            return Ok(());
        };
        let name = self.qualified_name(root);
        match output.doctype_public.as_deref() {
            Some(public) => writeln!(w, "<!DOCTYPE {} PUBLIC \"{}\" \"{}\">", name, public, system)?,
            None => writeln!(w, "<!DOCTYPE {} SYSTEM \"{}\">", name, system)?,
        }
        Ok(())
    }

    fn write_xml(&self, node: Node, output: &Output, w: &mut dyn Write, depth: usize) -> Result<()> {
        match self.kind(node) {
            NodeKind::Document => {
                for child in self.children(node) {
                    self.write_xml(*child, output, w, depth)?;
                    if output.indent {
                        writeln!(w)?;
                    }
                }
            }
            NodeKind::Element => {
                write!(w, "<{}", self.qualified_name(node))?;
                for (prefix, uri) in self.namespace_decls(node) {
                    if prefix.is_empty() {
                        write!(w, " xmlns=\"{}\"", escape_attribute(uri))?;
                    } else {
                        write!(w, " xmlns:{}=\"{}\"", prefix, escape_attribute(uri))?;
                    }
                }
                for attr in self.attributes(node) {
                    write!(
                        w,
                        " {}=\"{}\"",
                        self.qualified_name(*attr),
                        escape_attribute(&self.string_value(*attr))
                    )?;
                }
                let children = self.children(node);
                if children.is_empty() {
                    write!(w, "/>")?;
                    return Ok(());
                }
                write!(w, ">")?;
                let block = output.indent
                    && children.iter().all(|c| self.kind(*c) != NodeKind::Text);
                for child in children {
                    if block {
                        writeln!(w)?;
                        write!(w, "{}", INDENT.repeat(depth + 1))?;
                    }
                    self.write_xml(*child, output, w, depth + 1)?;
                }
                if block {
                    writeln!(w)?;
                    write!(w, "{}", INDENT.repeat(depth))?;
                }
                write!(w, "</{}>", self.qualified_name(node))?;
            }
            NodeKind::Text => write!(w, "{}", escape_text(&self.string_value(node)))?,
            NodeKind::Comment => write!(w, "<!--{}-->", self.string_value(node))?,
            NodeKind::ProcessingInstruction => {
                let data = self.string_value(node);
                if data.is_empty() {
                    write!(w, "<?{}?>", self.local_name(node))?;
                } else {
                    write!(w, "<?{} {}?>", self.local_name(node), data)?;
                }
            }
            NodeKind::Attribute => {
                write!(
                    w,
                    "{}=\"{}\"",
                    self.qualified_name(node),
                    escape_attribute(&self.string_value(node))
                )?;
            }
        }
        Ok(())
    }

    fn write_html(&self, node: Node, output: &Output, w: &mut dyn Write) -> Result<()> {
        match self.kind(node) {
            NodeKind::Document => {
                for child in self.children(node) {
                    self.write_html(*child, output, w)?;
                }
            }
            NodeKind::Element => {
                let name = self.local_name(node).to_ascii_lowercase();
                write!(w, "<{}", self.qualified_name(node))?;
                for attr in self.attributes(node) {
                    write!(
                        w,
                        " {}=\"{}\"",
                        self.qualified_name(*attr),
                        escape_attribute(&self.string_value(*attr))
                    )?;
                }
                write!(w, ">")?;
                if HTML_VOID_ELEMENTS.contains(&name.as_str()) {
                    return Ok(());
                }
                let raw_text = name == "script" || name == "style";
                for child in self.children(node) {
                    if raw_text && self.kind(*child) == NodeKind::Text {
                        write!(w, "{}", self.string_value(*child))?;
                    } else {
                        self.write_html(*child, output, w)?;
                    }
                }
                write!(w, "</{}>", self.qualified_name(node))?;
            }
            NodeKind::Text => write!(w, "{}", escape_text(&self.string_value(node)))?,
            NodeKind::Comment => write!(w, "<!--{}-->", self.string_value(node))?,
            NodeKind::ProcessingInstruction => {
                write!(w, "<?{} {}>", self.local_name(node), self.string_value(node))?
            }
            NodeKind::Attribute => {}
        }
        Ok(())
    }

    #[cfg(feature = "json")]
    fn write_json(&self, node: Node, w: &mut dyn Write) -> Result<()> {
        match self.kind(node) {
            NodeKind::Document => {
                match self.document_element(node) {
                    Some(root) => self.write_json(root, w)?,
                    None => write!(w, "null")?,
                }
                Ok(())
            }
            NodeKind::Element => {
                write!(w, "{{\"name\":\"{}\"", escape_json(&self.qualified_name(node)))?;
                if !self.attributes(node).is_empty() {
                    write!(w, ",\"attributes\":{{")?;
                    for (i, attr) in self.attributes(node).iter().enumerate() {
                        if i > 0 {
                            write!(w, ",")?;
                        }
                        write!(
                            w,
                            "\"{}\":\"{}\"",
                            escape_json(&self.qualified_name(*attr)),
                            escape_json(&self.string_value(*attr))
                        )?;
                    }
                    write!(w, "}}")?;
                }
                let children: Vec<Node> = self
                    .children(node)
                    .iter()
                    .copied()
                    .filter(|c| {
                        matches!(self.kind(*c), NodeKind::Element | NodeKind::Text)
                    })
                    .collect();
                if !children.is_empty() {
                    write!(w, ",\"children\":[")?;
                    for (i, child) in children.iter().enumerate() {
                        if i > 0 {
                            write!(w, ",")?;
                        }
                        self.write_json(*child, w)?;
                    }
                    write!(w, "]")?;
                }
                write!(w, "}}")?;
                Ok(())
            }
            _ => {
                write!(w, "\"{}\"", escape_json(&self.string_value(node)))?;
                Ok(())
            }
        }
    }

    #[cfg(not(feature = "json"))]
    fn write_json(&self, _node: Node, _w: &mut dyn Write) -> Result<()> {
        Err(Error::UnsupportedMethod("json".to_string()))
    }
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_attribute(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#10;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(feature = "json")]
fn escape_json(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(xml: &str) -> (Arena, Node) {
        let mut arena = Arena::new();
        let doc = arena.parse_str(xml).unwrap();
        (arena, doc)
    }

    #[test]
    fn xml_round_trip() {
        let (arena, node) = doc(r#"<root><item id="fst">foo</item></root>"#);
        let output = Output {
            omit_prolog: true,
            ..Output::default()
        };
        assert_eq!(
            arena.serialize_to_string(node, &output).unwrap(),
            r#"<root><item id="fst">foo</item></root>"#
        );
    }

    #[test]
    fn xml_prolog_and_escaping() {
        let (arena, node) = doc(r#"<r a="&lt;">x &amp; y</r>"#);
        let rendered = arena.serialize_to_string(node, &Output::default()).unwrap();
        assert!(rendered.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(rendered.contains(r#"<r a="&lt;">x &amp; y</r>"#));
    }

    #[test]
    fn xml_indent() {
        let (arena, node) = doc("<root><a/><b/></root>");
        let output = Output {
            omit_prolog: true,
            indent: true,
            ..Output::default()
        };
        assert_eq!(
            arena.serialize_to_string(node, &output).unwrap(),
            "<root>\n  <a/>\n  <b/>\n</root>\n"
        );
    }

    #[test]
    fn html_void_elements() {
        let (arena, node) = doc("<html><body><br/><p>hi</p></body></html>");
        let output = Output {
            method: Method::Html,
            version: Some("5".to_string()),
            ..Output::default()
        };
        let rendered = arena.serialize_to_string(node, &output).unwrap();
        assert!(rendered.starts_with("<!DOCTYPE html>"));
        assert!(rendered.contains("<br>"));
        assert!(!rendered.contains("</br>"));
        assert!(rendered.contains("<p>hi</p>"));
    }

    #[test]
    fn text_method_concatenates() {
        let (arena, node) = doc("<r>foo<i>bar</i></r>");
        let output = Output {
            method: Method::Text,
            ..Output::default()
        };
        assert_eq!(arena.serialize_to_string(node, &output).unwrap(), "foobar");
    }

    #[test]
    fn doctype_system() {
        let (arena, node) = doc("<root/>");
        let output = Output {
            omit_prolog: true,
            doctype_system: Some("root.dtd".to_string()),
            ..Output::default()
        };
        let rendered = arena.serialize_to_string(node, &output).unwrap();
        assert!(rendered.starts_with("<!DOCTYPE root SYSTEM \"root.dtd\">"));
    }
}
