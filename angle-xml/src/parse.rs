//! Builds an [`Arena`] tree from XML text.
//!
//! The heavy lifting of tokenizing XML is left to `quick-xml`; this module
//! only assembles events into nodes and resolves namespace prefixes against
//! the declarations seen so far.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::arena::{Arena, Node};
use crate::error::{Error, Result};
use crate::name::{QName, XML_NAMESPACE};

impl Arena {
    /// Parse a document from text, returning its document node.
    pub fn parse_str(&mut self, source: &str) -> Result<Node> {
        let mut reader = Reader::from_str(source);
        reader.config_mut().trim_text(false);

        let doc = self.new_document();
        let mut stack = vec![doc];
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf).map_err(Error::from)? {
                Event::Start(e) => {
                    let element = self.open_element(top(&stack)?, &e)?;
                    stack.push(element);
                }
                Event::Empty(e) => {
                    self.open_element(top(&stack)?, &e)?;
                }
                Event::End(_) => {
                    stack.pop();
                    if stack.is_empty() {
                        return Err(Error::Parse("unbalanced end tag".to_string()));
                    }
                }
                Event::Text(e) => {
                    let raw = std::str::from_utf8(e.as_ref())
                        .map_err(|e| Error::Parse(e.to_string()))?;
                    let text = quick_xml::escape::unescape(raw)
                        .map_err(|e| Error::Parse(e.to_string()))?;
                    if !text.is_empty() {
                        let node = self.new_text(text.into_owned());
                        self.append_child(top(&stack)?, node);
                    }
                }
                Event::CData(e) => {
                    let text = std::str::from_utf8(e.as_ref())
                        .map_err(|e| Error::Parse(e.to_string()))?;
                    let node = self.new_text(text);
                    self.append_child(top(&stack)?, node);
                }
                Event::Comment(e) => {
                    let raw = std::str::from_utf8(e.as_ref())
                        .map_err(|e| Error::Parse(e.to_string()))?;
                    let text = quick_xml::escape::unescape(raw)
                        .map_err(|e| Error::Parse(e.to_string()))?;
                    let node = self.new_comment(text.into_owned());
                    self.append_child(top(&stack)?, node);
                }
                Event::PI(e) => {
                    let raw = std::str::from_utf8(e.as_ref())
                        .map_err(|e| Error::Parse(e.to_string()))?;
                    let (target, data) = match raw.split_once(char::is_whitespace) {
                        Some((target, data)) => (target, data.trim_start()),
                        None => (raw, ""),
                    };
                    let node = self.new_processing_instruction(target, data);
                    self.append_child(top(&stack)?, node);
                }
                Event::Decl(_) | Event::DocType(_) => {}
                Event::Eof => break,
            }
            buf.clear();
        }
        if stack.len() != 1 {
            return Err(Error::Parse("unclosed element".to_string()));
        }
        Ok(doc)
    }

    fn open_element(&mut self, parent: Node, event: &quick_xml::events::BytesStart) -> Result<Node> {
        let tag = std::str::from_utf8(event.name().as_ref())
            .map_err(|e| Error::Parse(e.to_string()))?
            .to_string();

        let element = {
            let (prefix, local) = split_name(&tag);
            self.new_element(QName {
                local: local.to_string(),
                prefix: prefix.map(|p| p.to_string()),
                uri: None,
            })
        };
        self.append_child(parent, element);

        // first pass: namespace declarations must be visible before any
        // prefixed name on the same element is resolved
        let mut plain = Vec::new();
        for attr in event.attributes() {
            let attr = attr.map_err(|e| Error::Parse(e.to_string()))?;
            let key = std::str::from_utf8(attr.key.as_ref())
                .map_err(|e| Error::Parse(e.to_string()))?
                .to_string();
            let value = std::str::from_utf8(&attr.value)
                .map_err(|e| Error::Parse(e.to_string()))?;
            let value = quick_xml::escape::unescape(value)
                .map_err(|e| Error::Parse(e.to_string()))?
                .into_owned();
            if key == "xmlns" {
                self.declare_namespace(element, "", value);
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                self.declare_namespace(element, prefix, value);
            } else {
                plain.push((key, value));
            }
        }

        let scope = self.in_scope_namespaces(element);
        let element_name = self.name(element).cloned().unwrap_or(QName::new(""));
        let uri = match &element_name.prefix {
            Some(prefix) => Some(
                scope
                    .resolve(prefix)
                    .ok_or_else(|| Error::UndeclaredPrefix(prefix.clone()))?
                    .to_string(),
            ),
            None => scope.default_element_namespace().map(|s| s.to_string()),
        };
        self.rename(
            element,
            QName {
                uri,
                ..element_name
            },
        );

        for (key, value) in plain {
            let (prefix, local) = split_name(&key);
            let uri = match prefix {
                Some("xml") => Some(XML_NAMESPACE.to_string()),
                Some(prefix) => Some(
                    scope
                        .resolve(prefix)
                        .ok_or_else(|| Error::UndeclaredPrefix(prefix.to_string()))?
                        .to_string(),
                ),
                // unprefixed attributes are in no namespace
                None => None,
            };
            self.set_attribute(
                element,
                QName {
                    local: local.to_string(),
                    prefix: prefix.map(|p| p.to_string()),
                    uri,
                },
                value,
            );
        }
        Ok(element)
    }
}

fn top(stack: &[Node]) -> Result<Node> {
    stack
        .last()
        .copied()
        .ok_or_else(|| Error::Parse("unbalanced end tag".to_string()))
}

fn split_name(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::NodeKind;

    #[test]
    fn parse_simple_document() {
        let mut arena = Arena::new();
        let doc = arena
            .parse_str(r#"<root><item id="fst">foo</item><item id="snd">bar</item></root>"#)
            .unwrap();
        let root = arena.document_element(doc).unwrap();
        assert_eq!(arena.local_name(root), "root");
        let children = arena.children(root);
        assert_eq!(children.len(), 2);
        assert_eq!(arena.attribute(children[0], "id"), Some("fst"));
        assert_eq!(arena.string_value(children[1]), "bar");
    }

    #[test]
    fn parse_namespaces() {
        let mut arena = Arena::new();
        let doc = arena
            .parse_str(r#"<a:root xmlns:a="http://example.com/a"><a:item/></a:root>"#)
            .unwrap();
        let root = arena.document_element(doc).unwrap();
        let name = arena.name(root).unwrap();
        assert_eq!(name.uri.as_deref(), Some("http://example.com/a"));
        let item = arena.children(root)[0];
        assert_eq!(
            arena.name(item).unwrap().uri.as_deref(),
            Some("http://example.com/a")
        );
    }

    #[test]
    fn default_namespace_skips_attributes() {
        let mut arena = Arena::new();
        let doc = arena
            .parse_str(r#"<root xmlns="http://example.com" id="x"/>"#)
            .unwrap();
        let root = arena.document_element(doc).unwrap();
        assert_eq!(
            arena.name(root).unwrap().uri.as_deref(),
            Some("http://example.com")
        );
        let attr = arena.attributes(root)[0];
        assert_eq!(arena.name(attr).unwrap().uri, None);
    }

    #[test]
    fn undeclared_prefix_is_rejected() {
        let mut arena = Arena::new();
        assert!(arena.parse_str("<a:root/>").is_err());
    }

    #[test]
    fn parse_mixed_content() {
        let mut arena = Arena::new();
        let doc = arena
            .parse_str("<r>one<!--note-->two<?pi data?></r>")
            .unwrap();
        let root = arena.document_element(doc).unwrap();
        let kinds: Vec<NodeKind> = arena
            .children(root)
            .iter()
            .map(|n| arena.kind(*n))
            .collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::Text,
                NodeKind::Comment,
                NodeKind::Text,
                NodeKind::ProcessingInstruction
            ]
        );
        assert_eq!(arena.string_value(root), "onetwo");
    }

    #[test]
    fn entities_are_unescaped() {
        let mut arena = Arena::new();
        let doc = arena.parse_str("<r a=\"&lt;&amp;&gt;\">&quot;x&quot;</r>").unwrap();
        let root = arena.document_element(doc).unwrap();
        assert_eq!(arena.attribute(root, "a"), Some("<&>"));
        assert_eq!(arena.string_value(root), "\"x\"");
    }
}
