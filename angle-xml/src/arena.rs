use std::cmp::Ordering;

use crate::name::{Namespaces, QName};

/// Handle to a node owned by an [`Arena`].
///
/// Handles are cheap to copy and serve as node identity: two handles are the
/// same node exactly when they are equal. A handle is only meaningful for
/// the arena that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node(u32);

impl Node {
    pub fn id(&self) -> u32 {
        self.0
    }
}

/// The node variants of the document model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
}

#[derive(Debug, Clone)]
enum Payload {
    Document {
        children: Vec<Node>,
    },
    Element {
        name: QName,
        attributes: Vec<Node>,
        children: Vec<Node>,
        // prefix -> uri, "" prefix is the default namespace
        namespaces: Vec<(String, String)>,
    },
    Attribute {
        name: QName,
        value: String,
    },
    Text {
        text: String,
    },
    Comment {
        text: String,
    },
    Pi {
        target: String,
        data: String,
    },
}

#[derive(Debug, Clone)]
struct Entry {
    parent: Option<Node>,
    payload: Payload,
}

/// Owner of every node in a processing session.
///
/// Parent, child and attribute links are handles into the same arena, which
/// keeps the parent back-reference cycle out of the ownership graph. Detached
/// subtrees stay allocated until the arena is dropped; a session is expected
/// to be short-lived.
#[derive(Debug, Default, Clone)]
pub struct Arena {
    entries: Vec<Entry>,
}

impl Arena {
    pub fn new() -> Self {
        Arena::default()
    }

    fn alloc(&mut self, payload: Payload) -> Node {
        let node = Node(self.entries.len() as u32);
        self.entries.push(Entry {
            parent: None,
            payload,
        });
        node
    }

    fn entry(&self, node: Node) -> &Entry {
        &self.entries[node.0 as usize]
    }

    fn entry_mut(&mut self, node: Node) -> &mut Entry {
        &mut self.entries[node.0 as usize]
    }

    pub fn new_document(&mut self) -> Node {
        self.alloc(Payload::Document {
            children: Vec::new(),
        })
    }

    pub fn new_element(&mut self, name: QName) -> Node {
        self.alloc(Payload::Element {
            name,
            attributes: Vec::new(),
            children: Vec::new(),
            namespaces: Vec::new(),
        })
    }

    pub fn new_text(&mut self, text: impl Into<String>) -> Node {
        self.alloc(Payload::Text { text: text.into() })
    }

    pub fn new_comment(&mut self, text: impl Into<String>) -> Node {
        self.alloc(Payload::Comment { text: text.into() })
    }

    pub fn new_processing_instruction(
        &mut self,
        target: impl Into<String>,
        data: impl Into<String>,
    ) -> Node {
        self.alloc(Payload::Pi {
            target: target.into(),
            data: data.into(),
        })
    }

    /// A detached attribute node; attach it with
    /// [`Arena::adopt_attribute`].
    pub fn new_attribute(&mut self, name: QName, value: impl Into<String>) -> Node {
        self.alloc(Payload::Attribute {
            name,
            value: value.into(),
        })
    }

    /// Attach a detached attribute node to an element, replacing any
    /// attribute with the same name.
    pub fn adopt_attribute(&mut self, element: Node, attr: Node) {
        let Payload::Attribute { name, value } = self.entry(attr).payload.clone() else {
            return;
        };
        self.set_attribute(element, name, value);
    }

    pub fn kind(&self, node: Node) -> NodeKind {
        match &self.entry(node).payload {
            Payload::Document { .. } => NodeKind::Document,
            Payload::Element { .. } => NodeKind::Element,
            Payload::Attribute { .. } => NodeKind::Attribute,
            Payload::Text { .. } => NodeKind::Text,
            Payload::Comment { .. } => NodeKind::Comment,
            Payload::Pi { .. } => NodeKind::ProcessingInstruction,
        }
    }

    pub fn is_element(&self, node: Node) -> bool {
        self.kind(node) == NodeKind::Element
    }

    /// The name of an element or attribute node.
    pub fn name(&self, node: Node) -> Option<&QName> {
        match &self.entry(node).payload {
            Payload::Element { name, .. } | Payload::Attribute { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Local name; the target for processing instructions, empty for
    /// documents, text and comments.
    pub fn local_name(&self, node: Node) -> &str {
        match &self.entry(node).payload {
            Payload::Element { name, .. } | Payload::Attribute { name, .. } => &name.local,
            Payload::Pi { target, .. } => target,
            _ => "",
        }
    }

    /// The name as written in the source, including the prefix.
    pub fn qualified_name(&self, node: Node) -> String {
        match &self.entry(node).payload {
            Payload::Element { name, .. } | Payload::Attribute { name, .. } => name.as_written(),
            Payload::Pi { target, .. } => target.clone(),
            _ => String::new(),
        }
    }

    /// The string value: text content for leaves, the concatenation of all
    /// descendant text for documents and elements.
    pub fn string_value(&self, node: Node) -> String {
        match &self.entry(node).payload {
            Payload::Attribute { value, .. } => value.clone(),
            Payload::Text { text } | Payload::Comment { text } => text.clone(),
            Payload::Pi { data, .. } => data.clone(),
            Payload::Document { .. } | Payload::Element { .. } => {
                let mut out = String::new();
                self.collect_text(node, &mut out);
                out
            }
        }
    }

    fn collect_text(&self, node: Node, out: &mut String) {
        match &self.entry(node).payload {
            Payload::Text { text } => out.push_str(text),
            Payload::Document { children } | Payload::Element { children, .. } => {
                for child in children {
                    self.collect_text(*child, out);
                }
            }
            _ => {}
        }
    }

    pub fn is_leaf(&self, node: Node) -> bool {
        self.children(node).is_empty()
    }

    pub fn parent(&self, node: Node) -> Option<Node> {
        self.entry(node).parent
    }

    /// 0-based position among siblings; attributes count within the
    /// attribute list of their element.
    pub fn position(&self, node: Node) -> usize {
        let Some(parent) = self.parent(node) else {
            return 0;
        };
        let list: &[Node] = if self.kind(node) == NodeKind::Attribute {
            self.attributes(parent)
        } else {
            self.children(parent)
        };
        list.iter().position(|n| *n == node).unwrap_or(0)
    }

    pub fn children(&self, node: Node) -> &[Node] {
        match &self.entry(node).payload {
            Payload::Document { children } | Payload::Element { children, .. } => children,
            _ => &[],
        }
    }

    pub fn attributes(&self, node: Node) -> &[Node] {
        match &self.entry(node).payload {
            Payload::Element { attributes, .. } => attributes,
            _ => &[],
        }
    }

    pub fn attribute_node(&self, node: Node, name: &QName) -> Option<Node> {
        self.attributes(node)
            .iter()
            .copied()
            .find(|attr| self.name(*attr) == Some(name))
    }

    pub fn attribute_value(&self, node: Node, name: &QName) -> Option<&str> {
        let attr = self.attribute_node(node, name)?;
        match &self.entry(attr).payload {
            Payload::Attribute { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Convenience lookup by unprefixed attribute name.
    pub fn attribute(&self, node: Node, local: &str) -> Option<&str> {
        self.attribute_value(node, &QName::new(local))
    }

    /// Set an attribute, replacing an existing one with the same name in
    /// place so attribute order stays stable.
    pub fn set_attribute(&mut self, node: Node, name: QName, value: impl Into<String>) -> Node {
        let value = value.into();
        if let Some(existing) = self.attribute_node(node, &name) {
            if let Payload::Attribute { value: slot, .. } = &mut self.entry_mut(existing).payload {
                *slot = value;
            }
            return existing;
        }
        let attr = self.alloc(Payload::Attribute { name, value });
        self.entry_mut(attr).parent = Some(node);
        if let Payload::Element { attributes, .. } = &mut self.entry_mut(node).payload {
            attributes.push(attr);
        }
        attr
    }

    pub fn remove_attribute(&mut self, node: Node, name: &QName) {
        let Some(attr) = self.attribute_node(node, name) else {
            return;
        };
        if let Payload::Element { attributes, .. } = &mut self.entry_mut(node).payload {
            attributes.retain(|a| *a != attr);
        }
        self.entry_mut(attr).parent = None;
    }

    /// Append `child` to `parent`, detaching it from any previous parent.
    pub fn append_child(&mut self, parent: Node, child: Node) {
        debug_assert!(self.kind(child) != NodeKind::Attribute);
        self.detach(child);
        self.entry_mut(child).parent = Some(parent);
        match &mut self.entry_mut(parent).payload {
            Payload::Document { children } | Payload::Element { children, .. } => {
                children.push(child)
            }
            _ => {}
        }
    }

    pub fn insert_child(&mut self, parent: Node, index: usize, child: Node) {
        self.detach(child);
        self.entry_mut(child).parent = Some(parent);
        match &mut self.entry_mut(parent).payload {
            Payload::Document { children } | Payload::Element { children, .. } => {
                let index = index.min(children.len());
                children.insert(index, child);
            }
            _ => {}
        }
    }

    /// Remove the node from its parent's child (or attribute) list.
    pub fn detach(&mut self, node: Node) {
        let Some(parent) = self.entry(node).parent else {
            return;
        };
        match &mut self.entry_mut(parent).payload {
            Payload::Document { children } => children.retain(|c| *c != node),
            Payload::Element {
                children,
                attributes,
                ..
            } => {
                children.retain(|c| *c != node);
                attributes.retain(|a| *a != node);
            }
            _ => {}
        }
        self.entry_mut(node).parent = None;
    }

    /// Replace the text payload of a text, comment, attribute or
    /// processing-instruction node.
    pub fn set_text_value(&mut self, node: Node, text: impl Into<String>) {
        let text = text.into();
        match &mut self.entry_mut(node).payload {
            Payload::Text { text: slot } | Payload::Comment { text: slot } => *slot = text,
            Payload::Attribute { value, .. } => *value = text,
            Payload::Pi { data, .. } => *data = text,
            _ => {}
        }
    }

    pub fn rename(&mut self, node: Node, new_name: QName) {
        match &mut self.entry_mut(node).payload {
            Payload::Element { name, .. } | Payload::Attribute { name, .. } => *name = new_name,
            _ => {}
        }
    }

    pub fn declare_namespace(&mut self, node: Node, prefix: impl Into<String>, uri: impl Into<String>) {
        let prefix = prefix.into();
        if let Payload::Element { namespaces, .. } = &mut self.entry_mut(node).payload {
            if let Some(slot) = namespaces.iter_mut().find(|(p, _)| *p == prefix) {
                slot.1 = uri.into();
            } else {
                namespaces.push((prefix, uri.into()));
            }
        }
    }

    pub fn namespace_decls(&self, node: Node) -> &[(String, String)] {
        match &self.entry(node).payload {
            Payload::Element { namespaces, .. } => namespaces,
            _ => &[],
        }
    }

    /// All namespace declarations in scope at `node`, nearest ancestor
    /// winning on conflicting prefixes.
    pub fn in_scope_namespaces(&self, node: Node) -> Namespaces {
        let mut chain = Vec::new();
        let mut current = Some(node);
        while let Some(n) = current {
            chain.push(n);
            current = self.parent(n);
        }
        let mut namespaces = Namespaces::new();
        for n in chain.into_iter().rev() {
            for (prefix, uri) in self.namespace_decls(n) {
                if prefix.is_empty() {
                    namespaces.set_default_element_namespace(uri.clone());
                } else {
                    namespaces.declare(prefix.clone(), uri.clone());
                }
            }
        }
        namespaces
    }

    /// The topmost ancestor, which is the node itself when detached.
    pub fn root(&self, node: Node) -> Node {
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current
    }

    /// The single element child of a document node.
    pub fn document_element(&self, doc: Node) -> Option<Node> {
        self.children(doc)
            .iter()
            .copied()
            .find(|child| self.is_element(*child))
    }

    /// Descendants of `node` in document order, the node itself excluded,
    /// attributes excluded.
    pub fn descendants(&self, node: Node) -> Vec<Node> {
        let mut out = Vec::new();
        self.push_descendants(node, &mut out);
        out
    }

    fn push_descendants(&self, node: Node, out: &mut Vec<Node>) {
        for child in self.children(node) {
            out.push(*child);
            self.push_descendants(*child, out);
        }
    }

    /// Deep copy with fresh identities; the copy is detached.
    pub fn clone_subtree(&mut self, node: Node) -> Node {
        let copy = self.clone_shallow(node);
        let children: Vec<Node> = self.children(node).to_vec();
        for child in children {
            let child_copy = self.clone_subtree(child);
            self.append_child(copy, child_copy);
        }
        copy
    }

    /// Copy of the node itself (attributes and namespace declarations
    /// included for elements) with a fresh identity and no children.
    pub fn clone_shallow(&mut self, node: Node) -> Node {
        match self.entry(node).payload.clone() {
            Payload::Document { .. } => self.new_document(),
            Payload::Element {
                name,
                attributes,
                namespaces,
                ..
            } => {
                let copy = self.new_element(name);
                for attr in attributes {
                    if let Payload::Attribute { name, value } = self.entry(attr).payload.clone() {
                        self.set_attribute(copy, name, value);
                    }
                }
                if let Payload::Element {
                    namespaces: slot, ..
                } = &mut self.entry_mut(copy).payload
                {
                    *slot = namespaces;
                }
                copy
            }
            Payload::Attribute { name, value } => {
                let attr = self.alloc(Payload::Attribute { name, value });
                attr
            }
            Payload::Text { text } => self.new_text(text),
            Payload::Comment { text } => self.new_comment(text),
            Payload::Pi { target, data } => self.new_processing_instruction(target, data),
        }
    }

    pub fn is_ancestor_or_self(&self, ancestor: Node, node: Node) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    /// Total order over nodes: document order within a tree (attributes
    /// after their element, before its children), trees ordered by root
    /// handle.
    pub fn compare_document_order(&self, a: Node, b: Node) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let (root_a, path_a) = self.order_path(a);
        let (root_b, path_b) = self.order_path(b);
        if root_a != root_b {
            return root_a.cmp(&root_b);
        }
        path_a.cmp(&path_b)
    }

    fn order_path(&self, node: Node) -> (Node, Vec<usize>) {
        let mut path = Vec::new();
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            let component = if self.kind(current) == NodeKind::Attribute {
                // attributes order directly after their element
                self.position(current)
            } else {
                self.attributes(parent).len() + self.position(current)
            };
            path.push(component);
            current = parent;
        }
        path.reverse();
        (current, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(arena: &mut Arena) -> (Node, Node, Node, Node) {
        let doc = arena.new_document();
        let root = arena.new_element(QName::new("root"));
        arena.append_child(doc, root);
        let first = arena.new_element(QName::new("item"));
        arena.set_attribute(first, QName::new("id"), "fst");
        let text = arena.new_text("foo");
        arena.append_child(first, text);
        arena.append_child(root, first);
        let second = arena.new_element(QName::new("item"));
        arena.append_child(root, second);
        (doc, root, first, second)
    }

    #[test]
    fn parent_child_invariant() {
        let mut arena = Arena::new();
        let (_, root, first, second) = sample(&mut arena);
        assert_eq!(arena.parent(first), Some(root));
        assert_eq!(arena.children(root)[arena.position(first)], first);
        assert_eq!(arena.position(second), 1);
    }

    #[test]
    fn string_value_concatenates_descendants() {
        let mut arena = Arena::new();
        let (doc, _, _, second) = sample(&mut arena);
        let text = arena.new_text("bar");
        arena.append_child(second, text);
        assert_eq!(arena.string_value(doc), "foobar");
    }

    #[test]
    fn attribute_names_are_unique() {
        let mut arena = Arena::new();
        let el = arena.new_element(QName::new("e"));
        arena.set_attribute(el, QName::new("a"), "1");
        arena.set_attribute(el, QName::new("a"), "2");
        assert_eq!(arena.attributes(el).len(), 1);
        assert_eq!(arena.attribute(el, "a"), Some("2"));
    }

    #[test]
    fn clone_subtree_has_fresh_identity() {
        let mut arena = Arena::new();
        let (_, _, first, _) = sample(&mut arena);
        let copy = arena.clone_subtree(first);
        assert_ne!(copy, first);
        assert_eq!(arena.string_value(copy), "foo");
        assert_eq!(arena.attribute(copy, "id"), Some("fst"));
        assert_eq!(arena.parent(copy), None);
    }

    #[test]
    fn document_order_is_total() {
        let mut arena = Arena::new();
        let (doc, root, first, second) = sample(&mut arena);
        assert_eq!(arena.compare_document_order(doc, root), Ordering::Less);
        assert_eq!(arena.compare_document_order(first, second), Ordering::Less);
        assert_eq!(
            arena.compare_document_order(second, first),
            Ordering::Greater
        );
        let id = arena.attribute_node(first, &QName::new("id")).unwrap();
        assert_eq!(arena.compare_document_order(root, id), Ordering::Less);
        assert_eq!(arena.compare_document_order(id, second), Ordering::Less);
    }

    #[test]
    fn detach_clears_parent() {
        let mut arena = Arena::new();
        let (_, root, first, _) = sample(&mut arena);
        arena.detach(first);
        assert_eq!(arena.parent(first), None);
        assert_eq!(arena.children(root).len(), 1);
    }
}
