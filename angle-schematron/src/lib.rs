//! Schematron-over-XPath assertion runner.
//!
//! Loads an ISO Schematron document (patterns, rules, assert/report) and
//! evaluates it against instance documents. Rule contexts use the match
//! pattern grammar; assertion tests are full XPath. Within one pattern a
//! context node is claimed by its first matching rule in document order
//! and reported once.

use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use ahash::AHashMap;
use angle_xml::{Arena, Namespaces, Node, NodeKind, SCH_NAMESPACE};
use angle_xpath::{eval, Context, Error, Item, Registry, Result, Sequence};
use angle_xpath_ast::{parse, parse_pattern, Expr};

const OLD_SCH_NAMESPACE: &str = "http://www.ascc.net/xml/schematron";

/// Selects every pattern, regardless of phase definitions.
pub const ALL_PHASES: &str = "#ALL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssertionKind {
    /// Fails when its test is effective-false.
    Assert,
    /// Fires when its test is effective-true.
    Report,
}

#[derive(Debug, Clone)]
enum MessagePart {
    Text(String),
    /// `<sch:name/>` — the name of the context node.
    Name,
    /// `<sch:value-of select="…"/>`.
    ValueOf(String),
}

#[derive(Debug)]
struct Assertion {
    kind: AssertionKind,
    id: Option<String>,
    test_source: String,
    test: Expr,
    message: Vec<MessagePart>,
}

#[derive(Debug)]
struct Rule {
    context_source: String,
    context: Expr,
    assertions: Vec<Assertion>,
}

#[derive(Debug)]
struct Pattern {
    id: Option<String>,
    rules: Vec<Rule>,
}

/// One failed assert or fired report.
#[derive(Debug, Clone)]
pub struct Violation {
    pub kind: AssertionKind,
    pub assertion_id: Option<String>,
    pub rule_context: String,
    pub test: String,
    /// Rooted path of the offending node.
    pub path: String,
    pub message: String,
}

/// A compiled Schematron schema.
pub struct Schema {
    arena: Rc<RefCell<Arena>>,
    registry: Registry,
    namespaces: Namespaces,
    title: Option<String>,
    patterns: Vec<Pattern>,
    phases: AHashMap<String, Vec<String>>,
    default_phase: Option<String>,
}

impl Schema {
    pub fn load(arena: Rc<RefCell<Arena>>, path: impl AsRef<Path>) -> Result<Schema> {
        let path = path.as_ref();
        let source =
            fs::read_to_string(path).map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))?;
        Self::load_str(arena, &source)
    }

    pub fn load_str(arena: Rc<RefCell<Arena>>, source: &str) -> Result<Schema> {
        let doc = arena.borrow_mut().parse_str(source)?;
        let mut schema = Schema {
            arena: arena.clone(),
            registry: Registry::with_builtins(),
            namespaces: Namespaces::new(),
            title: None,
            patterns: Vec::new(),
            phases: AHashMap::new(),
            default_phase: None,
        };
        let root = {
            let borrowed = arena.borrow();
            let root = borrowed
                .document_element(doc)
                .ok_or_else(|| Error::Type("empty schematron document".to_string()))?;
            if !is_sch(&borrowed, root, "schema") {
                return Err(Error::Type("expected a schematron schema root".to_string()));
            }
            schema.default_phase = borrowed
                .attribute(root, "defaultPhase")
                .map(|s| s.to_string());
            root
        };
        // namespace declarations come first so later contexts compile
        let children: Vec<Node> = arena.borrow().children(root).to_vec();
        for child in &children {
            let borrowed = arena.borrow();
            if is_sch(&borrowed, *child, "ns") {
                let prefix = borrowed.attribute(*child, "prefix").unwrap_or_default().to_string();
                let uri = borrowed.attribute(*child, "uri").unwrap_or_default().to_string();
                drop(borrowed);
                schema.namespaces.declare(prefix, uri);
            }
        }
        for child in children {
            schema.declaration(child)?;
        }
        Ok(schema)
    }

    fn declaration(&mut self, node: Node) -> Result<()> {
        let arena = self.arena.borrow();
        if arena.kind(node) != NodeKind::Element {
            return Ok(());
        }
        let Some(name) = arena.name(node) else {
            return Ok(());
        };
        if !is_sch_uri(name.uri.as_deref()) {
            return Ok(());
        }
        match name.local.as_str() {
            "title" => {
                let title = arena.string_value(node);
                drop(arena);
                self.title = Some(title);
            }
            "phase" => {
                let id = arena.attribute(node, "id").unwrap_or_default().to_string();
                let active: Vec<String> = arena
                    .children(node)
                    .iter()
                    .copied()
                    .filter(|n| is_sch(&arena, *n, "active"))
                    .filter_map(|n| arena.attribute(n, "pattern").map(|s| s.to_string()))
                    .collect();
                drop(arena);
                self.phases.insert(id, active);
            }
            "pattern" => {
                let id = arena.attribute(node, "id").map(|s| s.to_string());
                let rule_nodes: Vec<Node> = arena
                    .children(node)
                    .iter()
                    .copied()
                    .filter(|n| is_sch(&arena, *n, "rule"))
                    .collect();
                drop(arena);
                let mut rules = Vec::new();
                for rule_node in rule_nodes {
                    rules.push(self.rule(rule_node)?);
                }
                self.patterns.push(Pattern { id, rules });
            }
            _ => {}
        }
        Ok(())
    }

    fn rule(&self, node: Node) -> Result<Rule> {
        let arena = self.arena.borrow();
        let context_source = arena
            .attribute(node, "context")
            .ok_or_else(|| Error::Type("rule without a context".to_string()))?
            .to_string();
        let context = parse_pattern(&context_source, &self.namespaces)?;
        let mut assertions = Vec::new();
        for child in arena.children(node) {
            let kind = if is_sch(&arena, *child, "assert") {
                AssertionKind::Assert
            } else if is_sch(&arena, *child, "report") {
                AssertionKind::Report
            } else {
                continue;
            };
            let test_source = arena
                .attribute(*child, "test")
                .ok_or_else(|| Error::Type("assertion without a test".to_string()))?
                .to_string();
            let test = parse(&test_source, &self.namespaces)?;
            assertions.push(Assertion {
                kind,
                id: arena.attribute(*child, "id").map(|s| s.to_string()),
                test_source,
                test,
                message: self.message_parts(&arena, *child),
            });
        }
        Ok(Rule {
            context_source,
            context,
            assertions,
        })
    }

    fn message_parts(&self, arena: &Arena, node: Node) -> Vec<MessagePart> {
        let mut parts = Vec::new();
        for child in arena.children(node) {
            match arena.kind(*child) {
                NodeKind::Text => parts.push(MessagePart::Text(arena.string_value(*child))),
                NodeKind::Element if is_sch(arena, *child, "name") => {
                    parts.push(MessagePart::Name)
                }
                NodeKind::Element if is_sch(arena, *child, "value-of") => {
                    if let Some(select) = arena.attribute(*child, "select") {
                        parts.push(MessagePart::ValueOf(select.to_string()));
                    }
                }
                _ => {}
            }
        }
        parts
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn phases(&self) -> impl Iterator<Item = &str> {
        self.phases.keys().map(|k| k.as_str())
    }

    /// Run the schema against a document. `phase` selects a declared
    /// phase; [`ALL_PHASES`], or no phase at all, activates every pattern.
    pub fn validate(&self, doc: Node, phase: Option<&str>) -> Result<Vec<Violation>> {
        let phase = phase
            .map(|p| p.to_string())
            .or_else(|| self.default_phase.clone());
        let active: Option<&Vec<String>> = match phase.as_deref() {
            None | Some(ALL_PHASES) => None,
            Some(name) => Some(self.phases.get(name).ok_or_else(|| {
                Error::Undefined(format!("phase '{}'", name))
            })?),
        };
        let mut violations = Vec::new();
        let candidates: Vec<Node> = {
            let arena = self.arena.borrow();
            let mut nodes = vec![doc];
            for n in arena.descendants(doc) {
                nodes.push(n);
                nodes.extend(arena.attributes(n).iter().copied());
            }
            nodes
        };
        for pattern in &self.patterns {
            let enabled = match active {
                None => true,
                Some(ids) => pattern
                    .id
                    .as_ref()
                    .is_some_and(|id| ids.contains(id)),
            };
            if !enabled {
                continue;
            }
            self.run_pattern(pattern, &candidates, doc, &mut violations)?;
        }
        Ok(violations)
    }

    fn run_pattern(
        &self,
        pattern: &Pattern,
        candidates: &[Node],
        doc: Node,
        violations: &mut Vec<Violation>,
    ) -> Result<()> {
        let base = Context::new(&self.arena, &self.registry, doc);
        let base = {
            let mut ctx = base;
            ctx.namespaces = Rc::new(self.namespaces.clone());
            ctx
        };
        for node in candidates {
            // first rule in document order claims the node
            for rule in &pattern.rules {
                if !self.context_matches(&base, &rule.context, *node)? {
                    continue;
                }
                self.run_rule(rule, &base, *node, violations)?;
                break;
            }
        }
        Ok(())
    }

    fn run_rule(
        &self,
        rule: &Rule,
        base: &Context,
        node: Node,
        violations: &mut Vec<Violation>,
    ) -> Result<()> {
        let focus = base.sub(Item::Node(node), 1, 1);
        for assertion in &rule.assertions {
            let holds = eval(&assertion.test, &focus)?.effective_boolean()?;
            let failed = match assertion.kind {
                AssertionKind::Assert => !holds,
                AssertionKind::Report => holds,
            };
            if !failed {
                continue;
            }
            violations.push(Violation {
                kind: assertion.kind,
                assertion_id: assertion.id.clone(),
                rule_context: rule.context_source.clone(),
                test: assertion.test_source.clone(),
                path: self.node_path(&focus)?,
                message: self.render_message(&assertion.message, &focus)?,
            });
        }
        Ok(())
    }

    /// A rule context pattern matches a node when evaluating it on some
    /// ancestor-or-self anchor selects that node.
    fn context_matches(&self, base: &Context, pattern: &Expr, node: Node) -> Result<bool> {
        let chain: Vec<Node> = {
            let arena = self.arena.borrow();
            let mut chain = Vec::new();
            let mut current = Some(node);
            while let Some(n) = current {
                chain.push(n);
                current = arena.parent(n);
            }
            chain
        };
        for anchor in chain {
            let anchored = base.sub(Item::Node(anchor), 1, 1);
            let selected = eval(pattern, &anchored)?;
            let hit = selected
                .iter()
                .any(|item| matches!(item, Item::Node(n) if *n == node));
            if hit {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn node_path(&self, focus: &Context) -> Result<String> {
        let expr = parse("path(.)", &self.namespaces)?;
        let result = eval(&expr, focus)?;
        let arena = self.arena.borrow();
        Ok(result.string_values(&arena).join(""))
    }

    fn render_message(&self, parts: &[MessagePart], focus: &Context) -> Result<String> {
        let mut out = String::new();
        for part in parts {
            match part {
                MessagePart::Text(text) => out.push_str(text),
                MessagePart::Name => {
                    let arena = self.arena.borrow();
                    let node = focus.node()?;
                    out.push_str(&arena.qualified_name(node));
                }
                MessagePart::ValueOf(select) => {
                    let expr = parse(select, &self.namespaces)?;
                    let value = eval(&expr, focus)?;
                    let arena = self.arena.borrow();
                    out.push_str(&value.string_values(&arena).join(" "));
                }
            }
        }
        Ok(out.split_whitespace().collect::<Vec<_>>().join(" "))
    }
}

fn is_sch_uri(uri: Option<&str>) -> bool {
    matches!(uri, Some(SCH_NAMESPACE) | Some(OLD_SCH_NAMESPACE))
}

fn is_sch(arena: &Arena, node: Node, local: &str) -> bool {
    arena.kind(node) == NodeKind::Element
        && arena
            .name(node)
            .is_some_and(|n| is_sch_uri(n.uri.as_deref()) && n.local == local)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"<sch:schema xmlns:sch="http://purl.oclc.org/dsdl/schematron">
        <sch:title>items</sch:title>
        <sch:pattern id="ids">
            <sch:rule context="item">
                <sch:assert test="@id" id="has-id">item <sch:name/> is missing @id</sch:assert>
                <sch:report test="@deprecated">item <sch:value-of select="@id"/> is deprecated</sch:report>
            </sch:rule>
        </sch:pattern>
        <sch:pattern id="roots">
            <sch:rule context="/root">
                <sch:assert test="count(item) &gt;= 1">root has no items</sch:assert>
            </sch:rule>
        </sch:pattern>
        <sch:phase id="only-ids">
            <sch:active pattern="ids"/>
        </sch:phase>
    </sch:schema>"#;

    fn check(doc: &str, phase: Option<&str>) -> Vec<Violation> {
        let arena = Rc::new(RefCell::new(Arena::new()));
        let schema = Schema::load_str(arena.clone(), SCHEMA).unwrap();
        let doc = arena.borrow_mut().parse_str(doc).unwrap();
        schema.validate(doc, phase).unwrap()
    }

    #[test]
    fn passing_document_is_clean() {
        let violations = check(r#"<root><item id="a"/><item id="b"/></root>"#, None);
        assert!(violations.is_empty());
    }

    #[test]
    fn missing_id_fails_assert() {
        let violations = check(r#"<root><item id="a"/><item/></root>"#, None);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, AssertionKind::Assert);
        assert_eq!(violations[0].assertion_id.as_deref(), Some("has-id"));
        assert_eq!(violations[0].path, "/root[1]/item[2]");
        assert_eq!(violations[0].message, "item item is missing @id");
    }

    #[test]
    fn report_fires_when_true() {
        let violations = check(r#"<root><item id="a" deprecated="yes"/></root>"#, None);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, AssertionKind::Report);
        assert_eq!(violations[0].message, "item a is deprecated");
    }

    #[test]
    fn empty_root_fails_pattern() {
        let violations = check("<root/>", None);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule_context, "/root");
    }

    #[test]
    fn phase_restricts_patterns() {
        // the roots pattern is inactive in the only-ids phase
        let violations = check("<root/>", Some("only-ids"));
        assert!(violations.is_empty());
        let violations = check("<root/>", Some(ALL_PHASES));
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn unknown_phase_is_an_error() {
        let arena = Rc::new(RefCell::new(Arena::new()));
        let schema = Schema::load_str(arena.clone(), SCHEMA).unwrap();
        let doc = arena.borrow_mut().parse_str("<root/>").unwrap();
        assert!(schema.validate(doc, Some("nope")).is_err());
    }

    #[test]
    fn each_node_claimed_by_first_rule_only() {
        let schema_src = r#"<sch:schema xmlns:sch="http://purl.oclc.org/dsdl/schematron">
            <sch:pattern>
                <sch:rule context="item[@id]"><sch:assert test="false()">first</sch:assert></sch:rule>
                <sch:rule context="item"><sch:assert test="false()">second</sch:assert></sch:rule>
            </sch:pattern>
        </sch:schema>"#;
        let arena = Rc::new(RefCell::new(Arena::new()));
        let schema = Schema::load_str(arena.clone(), schema_src).unwrap();
        let doc = arena
            .borrow_mut()
            .parse_str(r#"<root><item id="a"/></root>"#)
            .unwrap();
        let violations = schema.validate(doc, None).unwrap();
        // both rules match, only the first claims the node
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].message, "first");
    }
}
