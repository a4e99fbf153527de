//! Instruction executors.
//!
//! Every executor produces a sequence; the dispatcher attaches result
//! sequences to the parent being constructed. Nodes returned by executors
//! are freshly allocated in the shared arena, so attaching moves them;
//! nodes that already have a parent (stylesheet or source fragments) are
//! cloned on attach, which keeps the input tree untouched.

use std::cell::RefCell;
use std::fs;

use angle_xml::{Arena, Node, NodeKind, QName, XSL_NAMESPACE};
use angle_xpath::{eval, hidden_name, Atomic, Context, Environ, Error, Item, Result, Sequence};
use angle_xpath_ast::{parse, Expr};

use crate::avt::eval_avt;
use crate::stylesheet::{
    is_xsl, parse_qname_value, xsl_instruction, FunctionDecl, NoMatchPolicy, Stylesheet, Template,
};

struct SecondaryDoc {
    href: String,
    format: String,
    doc: Node,
}

pub(crate) struct Engine<'e> {
    sheet: &'e Stylesheet,
    secondary: RefCell<Vec<SecondaryDoc>>,
    /// Variable scope templates start from: the globals.
    globals: RefCell<Option<Environ<Sequence>>>,
    /// Modes of the templates currently instantiating.
    mode_stack: RefCell<Vec<String>>,
    /// Import precedence of the templates currently instantiating.
    precedence_stack: RefCell<Vec<usize>>,
}

impl<'e> Engine<'e> {
    pub(crate) fn new(sheet: &'e Stylesheet) -> Self {
        Engine {
            sheet,
            secondary: RefCell::new(Vec::new()),
            globals: RefCell::new(None),
            mode_stack: RefCell::new(Vec::new()),
            precedence_stack: RefCell::new(Vec::new()),
        }
    }

    fn arena(&self) -> &RefCell<Arena> {
        self.sheet.arena()
    }

    /// Run the whole transformation: dispatch the source document in the
    /// initial mode and collect the principal result tree.
    pub(crate) fn run(&self, ctx: &Context, doc: Node, mode: &str) -> Result<Node> {
        *self.globals.borrow_mut() = Some(ctx.variables.clone());
        let result_doc = self.arena().borrow_mut().new_document();
        let content = self.apply_to_items(ctx, vec![Item::Node(doc)], mode, &[])?;
        self.attach(ctx, result_doc, content)?;
        Ok(result_doc)
    }

    // ------------------------------------------------------------------
    // template dispatch

    pub(crate) fn apply_to_items(
        &self,
        ctx: &Context,
        items: Vec<Item>,
        mode: &str,
        params: &[(QName, Sequence)],
    ) -> Result<Sequence> {
        let size = items.len();
        let mut out = Sequence::new();
        for (i, item) in items.into_iter().enumerate() {
            ctx.check_deadline()?;
            let sub = ctx.sub(item.clone(), i + 1, size);
            out.append(self.apply_to_item(&sub, item, mode, params)?);
        }
        Ok(out)
    }

    fn apply_to_item(
        &self,
        ctx: &Context,
        item: Item,
        mode: &str,
        params: &[(QName, Sequence)],
    ) -> Result<Sequence> {
        let Item::Node(node) = item else {
            let text = item.string_value(&self.arena().borrow());
            return Ok(Sequence::singleton(Atomic::String(text)));
        };
        match self.sheet.best_template(ctx, node, mode)? {
            Some(template) => self.instantiate(ctx, template, mode, params),
            None => self.no_match(ctx, node, mode),
        }
    }

    fn instantiate(
        &self,
        ctx: &Context,
        template: &Template,
        mode: &str,
        params: &[(QName, Sequence)],
    ) -> Result<Sequence> {
        for (name, _) in params {
            if !template.params.iter().any(|p| p.name == *name) {
                return Err(Error::Undefined(format!(
                    "template does not declare parameter ${}",
                    name
                )));
            }
        }
        // a template body sees the globals, never the caller's locals
        let base = self
            .globals
            .borrow()
            .clone()
            .unwrap_or_else(|| ctx.variables.clone());
        let mut body_ctx = ctx.clone();
        body_ctx.variables = base.enclosed();
        body_ctx
            .variables
            .define(hidden_name("current"), Sequence::singleton(ctx.item.clone()))?;
        for declared in &template.params {
            let value = match params.iter().find(|(name, _)| *name == declared.name) {
                Some((_, value)) => value.clone(),
                None => {
                    self.variable_value(&body_ctx, declared.select.as_deref(), &declared.body)?
                }
            };
            body_ctx.variables.define(declared.name.clone(), value)?;
        }
        self.mode_stack.borrow_mut().push(mode.to_string());
        self.precedence_stack.borrow_mut().push(template.precedence);
        let result = self.execute_nodes(&body_ctx, &template.body);
        self.precedence_stack.borrow_mut().pop();
        self.mode_stack.borrow_mut().pop();
        result
    }

    fn current_mode(&self) -> String {
        self.mode_stack.borrow().last().cloned().unwrap_or_default()
    }

    fn no_match(&self, ctx: &Context, node: Node, mode: &str) -> Result<Sequence> {
        match self.sheet.no_match_policy(mode) {
            NoMatchPolicy::Fail => {
                let path = self.arena().borrow().qualified_name(node);
                Err(Error::Undefined(format!(
                    "no template matches {} in mode '{}'",
                    if path.is_empty() { "/".to_string() } else { path },
                    mode
                )))
            }
            NoMatchPolicy::DeepSkip => Ok(Sequence::new()),
            NoMatchPolicy::DeepCopy => {
                let copy = self.arena().borrow_mut().clone_subtree(node);
                Ok(Sequence::singleton(copy))
            }
            NoMatchPolicy::ShallowSkip => {
                let children: Vec<Item> = self
                    .arena()
                    .borrow()
                    .children(node)
                    .iter()
                    .copied()
                    .map(Item::Node)
                    .collect();
                self.apply_to_items(ctx, children, mode, &[])
            }
            NoMatchPolicy::ShallowCopy => {
                let (copy, children) = {
                    let mut arena = self.arena().borrow_mut();
                    let copy = arena.clone_shallow(node);
                    let children: Vec<Item> =
                        arena.children(node).iter().copied().map(Item::Node).collect();
                    (copy, children)
                };
                let content = self.apply_to_items(ctx, children, mode, &[])?;
                self.attach(ctx, copy, content)?;
                Ok(Sequence::singleton(copy))
            }
            NoMatchPolicy::TextOnlyCopy => {
                let kind = self.arena().borrow().kind(node);
                match kind {
                    NodeKind::Document | NodeKind::Element => {
                        let children: Vec<Item> = self
                            .arena()
                            .borrow()
                            .children(node)
                            .iter()
                            .copied()
                            .map(Item::Node)
                            .collect();
                        self.apply_to_items(ctx, children, mode, &[])
                    }
                    NodeKind::Text | NodeKind::Attribute => {
                        let text = self.arena().borrow().string_value(node);
                        let copy = self.arena().borrow_mut().new_text(text);
                        Ok(Sequence::singleton(copy))
                    }
                    _ => Ok(Sequence::new()),
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // body execution

    fn execute_nodes(&self, ctx: &Context, nodes: &[Node]) -> Result<Sequence> {
        // one shared scope per body so xsl:variable binds for its siblings
        let scope = ctx.nest();
        let mut out = Sequence::new();
        let mut conditional: Vec<(Node, bool)> = Vec::new();
        for node in nodes {
            scope.check_deadline()?;
            match xsl_local(&self.arena().borrow(), *node) {
                Some(local) if local == "on-empty" => conditional.push((*node, true)),
                Some(local) if local == "on-not-empty" => conditional.push((*node, false)),
                _ => out.append(self.execute(&scope, *node)?),
            }
        }
        let populated = !out.is_empty();
        for (node, wants_empty) in conditional {
            if populated != wants_empty {
                let select = self.attribute(node, "select");
                out.append(self.content_value(&scope, select.as_deref(), node)?);
            }
        }
        Ok(out)
    }

    fn execute(&self, ctx: &Context, node: Node) -> Result<Sequence> {
        let kind = self.arena().borrow().kind(node);
        match kind {
            NodeKind::Text => {
                let text = self.arena().borrow().string_value(node);
                // whitespace-only text in template bodies is formatting
                if text.trim().is_empty() {
                    return Ok(Sequence::new());
                }
                let copy = self.arena().borrow_mut().new_text(text);
                Ok(Sequence::singleton(copy))
            }
            NodeKind::Element => {
                let instruction = xsl_local(&self.arena().borrow(), node);
                match instruction {
                    Some(local) => self.execute_instruction(ctx, node, &local),
                    None => self.literal_element(ctx, node),
                }
            }
            _ => Ok(Sequence::new()),
        }
    }

    fn execute_instruction(&self, ctx: &Context, node: Node, local: &str) -> Result<Sequence> {
        match local {
            "apply-templates" => self.exec_apply_templates(ctx, node),
            "apply-imports" => self.exec_apply_imports(ctx, node),
            "call-template" => self.exec_call_template(ctx, node),
            "for-each" => self.exec_for_each(ctx, node),
            "for-each-group" => self.exec_for_each_group(ctx, node),
            "merge" => self.exec_merge(ctx, node),
            "choose" => self.exec_choose(ctx, node),
            "if" => self.exec_if(ctx, node),
            "variable" | "param" => self.exec_variable(ctx, node, local == "param"),
            "value-of" => self.exec_value_of(ctx, node),
            "sequence" => {
                let select = self.attribute(node, "select");
                self.content_value(ctx, select.as_deref(), node)
            }
            "copy" => self.exec_copy(ctx, node),
            "copy-of" => self.exec_copy_of(ctx, node),
            "element" => self.exec_element(ctx, node),
            "attribute" => self.exec_attribute(ctx, node),
            "text" => self.exec_text(node),
            "comment" => self.exec_comment(ctx, node),
            "processing-instruction" => self.exec_processing_instruction(ctx, node),
            "namespace" => self.exec_namespace(ctx, node),
            "message" => self.exec_message(ctx, node),
            "result-document" => self.exec_result_document(ctx, node),
            "try" => self.exec_try(ctx, node),
            "where-populated" => self.exec_where_populated(ctx, node),
            "source-document" => self.exec_source_document(ctx, node),
            "on-empty" | "on-not-empty" | "fallback" => Ok(Sequence::new()),
            // handled by their parent instructions
            "sort" | "with-param" | "when" | "otherwise" | "catch" | "merge-source"
            | "merge-key" | "merge-action" => Ok(Sequence::new()),
            other => Err(Error::Implemented(format!("xsl:{}", other))),
        }
    }

    fn literal_element(&self, ctx: &Context, node: Node) -> Result<Sequence> {
        let (name, attributes, namespaces) = {
            let arena = self.arena().borrow();
            let name = arena.name(node).cloned().unwrap_or_else(|| QName::new(""));
            let attributes: Vec<(QName, String)> = arena
                .attributes(node)
                .iter()
                .map(|a| {
                    (
                        arena.name(*a).cloned().unwrap_or_else(|| QName::new("")),
                        arena.string_value(*a),
                    )
                })
                .collect();
            let namespaces: Vec<(String, String)> = arena
                .namespace_decls(node)
                .iter()
                .filter(|(_, uri)| uri != XSL_NAMESPACE)
                .cloned()
                .collect();
            (name, attributes, namespaces)
        };
        let element = self.arena().borrow_mut().new_element(name);
        for (prefix, uri) in namespaces {
            self.arena().borrow_mut().declare_namespace(element, prefix, uri);
        }
        for (attr_name, raw) in attributes {
            if attr_name.uri.as_deref() == Some(XSL_NAMESPACE) {
                if attr_name.local == "use-attribute-sets" {
                    self.expand_attribute_sets(ctx, element, &raw)?;
                }
                continue;
            }
            let value = eval_avt(&raw, ctx)?;
            self.arena().borrow_mut().set_attribute(element, attr_name, value);
        }
        let children: Vec<Node> = self.arena().borrow().children(node).to_vec();
        let content = self.execute_nodes(ctx, &children)?;
        self.attach(ctx, element, content)?;
        Ok(Sequence::singleton(element))
    }

    fn expand_attribute_sets(&self, ctx: &Context, element: Node, sets: &str) -> Result<()> {
        for set_name in sets.split_whitespace() {
            let attrs = self
                .sheet
                .attribute_sets
                .get(set_name)
                .ok_or_else(|| Error::Undefined(format!("attribute-set '{}'", set_name)))?;
            for attr_instr in attrs.clone() {
                let produced = self.exec_attribute(ctx, attr_instr)?;
                self.attach(ctx, element, produced)?;
            }
        }
        Ok(())
    }

    /// Attach a produced sequence to a parent under construction. Fresh
    /// nodes are moved, nodes owned elsewhere are cloned, document nodes
    /// contribute their children, and runs of adjacent atomics become one
    /// space-separated text node.
    fn attach(&self, _ctx: &Context, parent: Node, content: Sequence) -> Result<()> {
        let mut pending: Option<String> = None;
        for item in content {
            match item {
                Item::Atomic(atomic) => {
                    let text = atomic.string_value();
                    pending = Some(match pending {
                        Some(mut acc) => {
                            acc.push(' ');
                            acc.push_str(&text);
                            acc
                        }
                        None => text,
                    });
                }
                Item::Node(node) => {
                    if let Some(text) = pending.take() {
                        let mut arena = self.arena().borrow_mut();
                        let text = arena.new_text(text);
                        arena.append_child(parent, text);
                    }
                    self.attach_node(parent, node)?;
                }
            }
        }
        if let Some(text) = pending {
            let mut arena = self.arena().borrow_mut();
            let text = arena.new_text(text);
            arena.append_child(parent, text);
        }
        Ok(())
    }

    fn attach_node(&self, parent: Node, node: Node) -> Result<()> {
        let mut arena = self.arena().borrow_mut();
        match arena.kind(node) {
            NodeKind::Attribute => {
                let attr = if arena.parent(node).is_some() {
                    arena.clone_shallow(node)
                } else {
                    node
                };
                arena.adopt_attribute(parent, attr);
            }
            NodeKind::Document => {
                // a document item contributes its children; cloning keeps
                // source documents and shared fragments intact
                let children: Vec<Node> = arena.children(node).to_vec();
                for child in children {
                    let copy = arena.clone_subtree(child);
                    arena.append_child(parent, copy);
                }
            }
            _ => {
                let node = if arena.parent(node).is_some() {
                    arena.clone_subtree(node)
                } else {
                    node
                };
                arena.append_child(parent, node);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // shared helpers

    fn attribute(&self, node: Node, name: &str) -> Option<String> {
        self.arena().borrow().attribute(node, name).map(|s| s.to_string())
    }

    fn compile(&self, ctx: &Context, source: &str) -> Result<Expr> {
        Ok(parse(source, &ctx.namespaces)?)
    }

    fn eval_select(&self, ctx: &Context, source: &str) -> Result<Sequence> {
        let expr = self.compile(ctx, source)?;
        eval(&expr, ctx)
    }

    /// The value of a `select` attribute or, failing that, the constructed
    /// body content as a raw sequence.
    fn content_value(&self, ctx: &Context, select: Option<&str>, node: Node) -> Result<Sequence> {
        match select {
            Some(source) => self.eval_select(ctx, source),
            None => {
                let children: Vec<Node> = self.arena().borrow().children(node).to_vec();
                self.execute_nodes(ctx, &children)
            }
        }
    }

    /// A variable value: the select expression, or a document fragment
    /// built from the body, or the empty string.
    pub(crate) fn variable_value(
        &self,
        ctx: &Context,
        select: Option<&str>,
        body: &[Node],
    ) -> Result<Sequence> {
        if let Some(source) = select {
            return self.eval_select(ctx, source);
        }
        if body.is_empty() {
            return Ok(Sequence::singleton(Atomic::from("")));
        }
        let fragment = self.arena().borrow_mut().new_document();
        let content = self.execute_nodes(ctx, body)?;
        self.attach(ctx, fragment, content)?;
        Ok(Sequence::singleton(fragment))
    }

    pub(crate) fn call_function(
        &self,
        ctx: &Context,
        decl: &FunctionDecl,
        args: Vec<Sequence>,
    ) -> Result<Sequence> {
        let mut body_ctx = ctx.clone();
        body_ctx.variables = ctx.variables.enclosed();
        let mut args = args.into_iter();
        for param in &decl.params {
            let value = args.next().unwrap_or_default();
            body_ctx.variables.define(param.clone(), value)?;
        }
        self.execute_nodes(&body_ctx, &decl.body)
    }

    fn with_params(&self, ctx: &Context, node: Node) -> Result<Vec<(QName, Sequence)>> {
        let children: Vec<Node> = self.arena().borrow().children(node).to_vec();
        let mut params = Vec::new();
        for child in children {
            if !is_xsl(&self.arena().borrow(), child, "with-param") {
                continue;
            }
            let (name, select, body) = {
                let arena = self.arena().borrow();
                let raw = arena
                    .attribute(child, "name")
                    .ok_or_else(|| Error::Type("with-param without a name".to_string()))?;
                let name = parse_qname_value(&arena, child, raw)?;
                let select = arena.attribute(child, "select").map(|s| s.to_string());
                (name, select, arena.children(child).to_vec())
            };
            let value = self.variable_value(ctx, select.as_deref(), &body)?;
            params.push((name, value));
        }
        Ok(params)
    }

    /// Sort specifications on an instruction, applied stably in order.
    fn sorted_items(&self, ctx: &Context, node: Node, items: Vec<Item>) -> Result<Vec<Item>> {
        struct SortSpec {
            select: String,
            descending: bool,
            numeric: bool,
        }
        let specs: Vec<SortSpec> = {
            let arena = self.arena().borrow();
            arena
                .children(node)
                .iter()
                .copied()
                .filter(|n| is_xsl(&arena, *n, "sort"))
                .map(|n| SortSpec {
                    select: arena.attribute(n, "select").unwrap_or(".").to_string(),
                    descending: arena.attribute(n, "order") == Some("descending"),
                    numeric: arena.attribute(n, "data-type") == Some("number"),
                })
                .collect()
        };
        if specs.is_empty() {
            return Ok(items);
        }
        let mut keyed: Vec<(Vec<String>, Item)> = Vec::with_capacity(items.len());
        let size = items.len();
        for (i, item) in items.into_iter().enumerate() {
            let sub = ctx.sub(item.clone(), i + 1, size);
            let mut keys = Vec::with_capacity(specs.len());
            for spec in &specs {
                let value = self.eval_select(&sub, &spec.select)?;
                let arena = self.arena().borrow();
                keys.push(value.string_values(&arena).join(" "));
            }
            keyed.push((keys, item));
        }
        keyed.sort_by(|(a, _), (b, _)| {
            for (spec, (ka, kb)) in specs.iter().zip(a.iter().zip(b.iter())) {
                let ordering = if spec.numeric {
                    let na = ka.trim().parse::<f64>().unwrap_or(f64::NAN);
                    let nb = kb.trim().parse::<f64>().unwrap_or(f64::NAN);
                    na.partial_cmp(&nb).unwrap_or(std::cmp::Ordering::Equal)
                } else {
                    ka.cmp(kb)
                };
                let ordering = if spec.descending {
                    ordering.reverse()
                } else {
                    ordering
                };
                if ordering != std::cmp::Ordering::Equal {
                    return ordering;
                }
            }
            std::cmp::Ordering::Equal
        });
        Ok(keyed.into_iter().map(|(_, item)| item).collect())
    }

    fn non_sort_children(&self, node: Node) -> Vec<Node> {
        let arena = self.arena().borrow();
        arena
            .children(node)
            .iter()
            .copied()
            .filter(|n| !is_xsl(&arena, *n, "sort"))
            .collect()
    }

    // ------------------------------------------------------------------
    // executors

    fn exec_apply_templates(&self, ctx: &Context, node: Node) -> Result<Sequence> {
        let items = match self.attribute(node, "select") {
            Some(source) => self.eval_select(ctx, source.as_str())?.into_items(),
            None => {
                let arena = self.arena().borrow();
                arena
                    .children(ctx.node()?)
                    .iter()
                    .copied()
                    .map(Item::Node)
                    .collect()
            }
        };
        let mode = match self.attribute(node, "mode").as_deref() {
            Some("#current") => self.current_mode(),
            Some("#default") | None => self.sheet.default_mode.clone(),
            Some(mode) => mode.to_string(),
        };
        let items = self.sorted_items(ctx, node, items)?;
        let params = self.with_params(ctx, node)?;
        self.apply_to_items(ctx, items, &mode, &params)
    }

    fn exec_apply_imports(&self, ctx: &Context, node: Node) -> Result<Sequence> {
        let below = self
            .precedence_stack
            .borrow()
            .last()
            .copied()
            .ok_or_else(|| Error::Type("apply-imports outside a template".to_string()))?;
        let mode = self.current_mode();
        let focus = ctx.node()?;
        let params = self.with_params(ctx, node)?;
        match self.sheet.best_imported_template(ctx, focus, &mode, below)? {
            Some(template) => self.instantiate(ctx, template, &mode, &params),
            None => self.no_match(ctx, focus, &mode),
        }
    }

    fn exec_call_template(&self, ctx: &Context, node: Node) -> Result<Sequence> {
        let name = {
            let arena = self.arena().borrow();
            let raw = arena
                .attribute(node, "name")
                .ok_or_else(|| Error::Type("call-template without a name".to_string()))?;
            parse_qname_value(&arena, node, raw)?
        };
        let template = self
            .sheet
            .named_template(&name)
            .ok_or_else(|| Error::Undefined(format!("template '{}'", name)))?;
        let params = self.with_params(ctx, node)?;
        self.instantiate(ctx, template, &self.current_mode(), &params)
    }

    fn exec_for_each(&self, ctx: &Context, node: Node) -> Result<Sequence> {
        let source = self
            .attribute(node, "select")
            .ok_or_else(|| Error::Type("for-each without select".to_string()))?;
        let items = self.eval_select(ctx, &source)?.into_items();
        let items = self.sorted_items(ctx, node, items)?;
        let body = self.non_sort_children(node);
        let size = items.len();
        let mut out = Sequence::new();
        for (i, item) in items.into_iter().enumerate() {
            ctx.check_deadline()?;
            let sub = ctx.sub(item.clone(), i + 1, size).nest();
            sub.variables
                .define(hidden_name("current"), Sequence::from(item))?;
            out.append(self.execute_nodes(&sub, &body)?);
        }
        Ok(out)
    }

    fn exec_for_each_group(&self, ctx: &Context, node: Node) -> Result<Sequence> {
        let source = self
            .attribute(node, "select")
            .ok_or_else(|| Error::Type("for-each-group without select".to_string()))?;
        let key_source = self
            .attribute(node, "group-by")
            .ok_or_else(|| Error::Type("for-each-group without group-by".to_string()))?;
        let items = self.eval_select(ctx, &source)?.into_items();
        // partition by key string, first appearance fixes group order
        let mut groups: Vec<(String, Vec<Item>)> = Vec::new();
        let size = items.len();
        for (i, item) in items.into_iter().enumerate() {
            let sub = ctx.sub(item.clone(), i + 1, size);
            let key = {
                let value = self.eval_select(&sub, &key_source)?;
                let arena = self.arena().borrow();
                value.string_values(&arena).join(" ")
            };
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(item),
                None => groups.push((key, vec![item])),
            }
        }
        let body = self.non_sort_children(node);
        let mut out = Sequence::new();
        let group_count = groups.len();
        for (i, (key, members)) in groups.into_iter().enumerate() {
            let first = members[0].clone();
            let sub = ctx.sub(first.clone(), i + 1, group_count).nest();
            sub.variables
                .define(hidden_name("current"), Sequence::from(first))?;
            sub.variables.define(
                hidden_name("current-group"),
                Sequence::from(members.clone()),
            )?;
            sub.variables.define(
                hidden_name("current-grouping-key"),
                Sequence::singleton(Atomic::String(key)),
            )?;
            out.append(self.execute_nodes(&sub, &body)?);
        }
        Ok(out)
    }

    fn exec_merge(&self, ctx: &Context, node: Node) -> Result<Sequence> {
        struct MergeEntry {
            key: String,
            source: Option<String>,
            item: Item,
        }
        let (sources, action) = {
            let arena = self.arena().borrow();
            let sources: Vec<Node> = arena
                .children(node)
                .iter()
                .copied()
                .filter(|n| is_xsl(&arena, *n, "merge-source"))
                .collect();
            let action = arena
                .children(node)
                .iter()
                .copied()
                .find(|n| is_xsl(&arena, *n, "merge-action"))
                .ok_or_else(|| Error::Type("merge without merge-action".to_string()))?;
            (sources, action)
        };
        let mut entries: Vec<MergeEntry> = Vec::new();
        for source in sources {
            let (name, select, key_select) = {
                let arena = self.arena().borrow();
                let name = arena.attribute(source, "name").map(|s| s.to_string());
                let select = arena
                    .attribute(source, "select")
                    .ok_or_else(|| Error::Type("merge-source without select".to_string()))?
                    .to_string();
                let key = arena
                    .children(source)
                    .iter()
                    .copied()
                    .find(|n| is_xsl(&arena, *n, "merge-key"))
                    .and_then(|n| arena.attribute(n, "select").map(|s| s.to_string()))
                    .unwrap_or_else(|| ".".to_string());
                (name, select, key)
            };
            let items = self.eval_select(ctx, &select)?.into_items();
            let size = items.len();
            for (i, item) in items.into_iter().enumerate() {
                let sub = ctx.sub(item.clone(), i + 1, size);
                let key = {
                    let value = self.eval_select(&sub, &key_select)?;
                    let arena = self.arena().borrow();
                    value.string_values(&arena).join(" ")
                };
                entries.push(MergeEntry {
                    key,
                    source: name.clone(),
                    item,
                });
            }
        }
        let mut keys: Vec<String> = entries.iter().map(|e| e.key.clone()).collect();
        keys.sort();
        keys.dedup();
        let action_body: Vec<Node> = self.arena().borrow().children(action).to_vec();
        let mut out = Sequence::new();
        let key_count = keys.len();
        for (i, key) in keys.into_iter().enumerate() {
            let group: Vec<&MergeEntry> = entries.iter().filter(|e| e.key == key).collect();
            let first = group[0].item.clone();
            let sub = ctx.sub(first, i + 1, key_count).nest();
            sub.variables.define(
                hidden_name("current-merge-key"),
                Sequence::singleton(Atomic::String(key)),
            )?;
            sub.variables.define(
                hidden_name("current-merge-group"),
                group.iter().map(|e| e.item.clone()).collect(),
            )?;
            let mut by_source: Vec<&str> = group.iter().filter_map(|e| e.source.as_deref()).collect();
            by_source.dedup();
            for source in by_source {
                sub.variables.define(
                    hidden_name(&format!("current-merge-group:{}", source)),
                    group
                        .iter()
                        .filter(|e| e.source.as_deref() == Some(source))
                        .map(|e| e.item.clone())
                        .collect(),
                )?;
            }
            out.append(self.execute_nodes(&sub, &action_body)?);
        }
        Ok(out)
    }

    fn exec_choose(&self, ctx: &Context, node: Node) -> Result<Sequence> {
        let children: Vec<Node> = self.arena().borrow().children(node).to_vec();
        for child in &children {
            if !is_xsl(&self.arena().borrow(), *child, "when") {
                continue;
            }
            let test = self
                .attribute(*child, "test")
                .ok_or_else(|| Error::Type("when without test".to_string()))?;
            if self.eval_select(ctx, &test)?.effective_boolean()? {
                let body: Vec<Node> = self.arena().borrow().children(*child).to_vec();
                return self.execute_nodes(ctx, &body);
            }
        }
        for child in &children {
            if is_xsl(&self.arena().borrow(), *child, "otherwise") {
                let body: Vec<Node> = self.arena().borrow().children(*child).to_vec();
                return self.execute_nodes(ctx, &body);
            }
        }
        Ok(Sequence::new())
    }

    fn exec_if(&self, ctx: &Context, node: Node) -> Result<Sequence> {
        let test = self
            .attribute(node, "test")
            .ok_or_else(|| Error::Type("if without test".to_string()))?;
        if self.eval_select(ctx, &test)?.effective_boolean()? {
            let body: Vec<Node> = self.arena().borrow().children(node).to_vec();
            self.execute_nodes(ctx, &body)
        } else {
            Ok(Sequence::new())
        }
    }

    fn exec_variable(&self, ctx: &Context, node: Node, is_param: bool) -> Result<Sequence> {
        let (name, select, body) = {
            let arena = self.arena().borrow();
            let raw = arena
                .attribute(node, "name")
                .ok_or_else(|| Error::Type("variable without a name".to_string()))?;
            let name = parse_qname_value(&arena, node, raw)?;
            let select = arena.attribute(node, "select").map(|s| s.to_string());
            (name, select, arena.children(node).to_vec())
        };
        // params bound by the caller stay bound
        if is_param && ctx.variables.resolve(&name).is_some() {
            return Ok(Sequence::new());
        }
        let value = self.variable_value(ctx, select.as_deref(), &body)?;
        ctx.variables.define(name, value)?;
        Ok(Sequence::new())
    }

    fn exec_value_of(&self, ctx: &Context, node: Node) -> Result<Sequence> {
        let separator = match self.attribute(node, "separator") {
            Some(raw) => eval_avt(&raw, ctx)?,
            None => " ".to_string(),
        };
        let select = self.attribute(node, "select");
        let value = self.content_value(ctx, select.as_deref(), node)?;
        let text = {
            let arena = self.arena().borrow();
            value.string_values(&arena).join(&separator)
        };
        // a zero-length text node is no text node at all
        if text.is_empty() {
            return Ok(Sequence::new());
        }
        let text_node = self.arena().borrow_mut().new_text(text);
        Ok(Sequence::singleton(text_node))
    }

    fn exec_copy(&self, ctx: &Context, node: Node) -> Result<Sequence> {
        let focus = match &ctx.item {
            Item::Node(n) => *n,
            Item::Atomic(a) => {
                let text = self.arena().borrow_mut().new_text(a.string_value());
                return Ok(Sequence::singleton(text));
            }
        };
        let kind = self.arena().borrow().kind(focus);
        match kind {
            NodeKind::Element => {
                let (name, namespaces) = {
                    let arena = self.arena().borrow();
                    (
                        arena.name(focus).cloned().unwrap_or_else(|| QName::new("")),
                        arena.namespace_decls(focus).to_vec(),
                    )
                };
                let copy = self.arena().borrow_mut().new_element(name);
                for (prefix, uri) in namespaces {
                    self.arena().borrow_mut().declare_namespace(copy, prefix, uri);
                }
                if let Some(sets) = self.attribute(node, "use-attribute-sets") {
                    self.expand_attribute_sets(ctx, copy, &sets)?;
                }
                let body: Vec<Node> = self.arena().borrow().children(node).to_vec();
                let content = self.execute_nodes(ctx, &body)?;
                self.attach(ctx, copy, content)?;
                Ok(Sequence::singleton(copy))
            }
            NodeKind::Document => {
                let body: Vec<Node> = self.arena().borrow().children(node).to_vec();
                self.execute_nodes(ctx, &body)
            }
            _ => {
                let copy = self.arena().borrow_mut().clone_shallow(focus);
                Ok(Sequence::singleton(copy))
            }
        }
    }

    fn exec_copy_of(&self, ctx: &Context, node: Node) -> Result<Sequence> {
        let source = self
            .attribute(node, "select")
            .ok_or_else(|| Error::Type("copy-of without select".to_string()))?;
        let value = self.eval_select(ctx, &source)?;
        let mut out = Sequence::new();
        for item in value {
            match item {
                Item::Node(n) => {
                    let copy = self.arena().borrow_mut().clone_subtree(n);
                    out.push(copy);
                }
                atomic => out.push(atomic),
            }
        }
        Ok(out)
    }

    fn exec_element(&self, ctx: &Context, node: Node) -> Result<Sequence> {
        let raw_name = self
            .attribute(node, "name")
            .ok_or_else(|| Error::Type("element without a name".to_string()))?;
        let name = eval_avt(&raw_name, ctx)?;
        let uri = match self.attribute(node, "namespace") {
            Some(raw) => Some(eval_avt(&raw, ctx)?),
            None => None,
        };
        let qname = self.constructed_name(node, &name, uri)?;
        let element = self.arena().borrow_mut().new_element(qname);
        if let Some(sets) = self.attribute(node, "use-attribute-sets") {
            self.expand_attribute_sets(ctx, element, &sets)?;
        }
        let body: Vec<Node> = self.arena().borrow().children(node).to_vec();
        let content = self.execute_nodes(ctx, &body)?;
        self.attach(ctx, element, content)?;
        Ok(Sequence::singleton(element))
    }

    fn exec_attribute(&self, ctx: &Context, node: Node) -> Result<Sequence> {
        let raw_name = self
            .attribute(node, "name")
            .ok_or_else(|| Error::Type("attribute without a name".to_string()))?;
        let name = eval_avt(&raw_name, ctx)?;
        let uri = match self.attribute(node, "namespace") {
            Some(raw) => Some(eval_avt(&raw, ctx)?),
            None => None,
        };
        let qname = self.constructed_name(node, &name, uri)?;
        let select = self.attribute(node, "select");
        let value = self.content_value(ctx, select.as_deref(), node)?;
        let text = {
            let arena = self.arena().borrow();
            value.string_values(&arena).join(" ")
        };
        let attr = self.arena().borrow_mut().new_attribute(qname, text);
        Ok(Sequence::singleton(attr))
    }

    /// Resolve a constructed element or attribute name: an explicit
    /// namespace attribute wins, otherwise the prefix resolves in the
    /// scope of the instruction.
    fn constructed_name(&self, node: Node, name: &str, uri: Option<String>) -> Result<QName> {
        match uri {
            Some(uri) => match name.split_once(':') {
                Some((prefix, local)) => Ok(QName::qualified(local, prefix, uri)),
                None => Ok(QName::with_uri(name, uri)),
            },
            None => {
                let arena = self.arena().borrow();
                parse_qname_value(&arena, node, name)
            }
        }
    }

    fn exec_text(&self, node: Node) -> Result<Sequence> {
        let text = self.arena().borrow().string_value(node);
        if text.is_empty() {
            return Ok(Sequence::new());
        }
        let text_node = self.arena().borrow_mut().new_text(text);
        Ok(Sequence::singleton(text_node))
    }

    fn exec_comment(&self, ctx: &Context, node: Node) -> Result<Sequence> {
        let select = self.attribute(node, "select");
        let value = self.content_value(ctx, select.as_deref(), node)?;
        let text = {
            let arena = self.arena().borrow();
            value.string_values(&arena).join("")
        };
        let comment = self.arena().borrow_mut().new_comment(text);
        Ok(Sequence::singleton(comment))
    }

    fn exec_processing_instruction(&self, ctx: &Context, node: Node) -> Result<Sequence> {
        let raw_name = self
            .attribute(node, "name")
            .ok_or_else(|| Error::Type("processing-instruction without a name".to_string()))?;
        let target = eval_avt(&raw_name, ctx)?;
        let select = self.attribute(node, "select");
        let value = self.content_value(ctx, select.as_deref(), node)?;
        let data = {
            let arena = self.arena().borrow();
            value.string_values(&arena).join("")
        };
        let pi = self
            .arena()
            .borrow_mut()
            .new_processing_instruction(target, data);
        Ok(Sequence::singleton(pi))
    }

    fn exec_namespace(&self, ctx: &Context, node: Node) -> Result<Sequence> {
        let raw_name = self
            .attribute(node, "name")
            .ok_or_else(|| Error::Type("namespace without a name".to_string()))?;
        let prefix = eval_avt(&raw_name, ctx)?;
        let select = self.attribute(node, "select");
        let value = self.content_value(ctx, select.as_deref(), node)?;
        let uri = {
            let arena = self.arena().borrow();
            value.string_values(&arena).join("")
        };
        // modelled as an xmlns attribute on the receiving element
        let attr = self
            .arena()
            .borrow_mut()
            .new_attribute(QName::qualified(prefix, "xmlns", ""), uri);
        Ok(Sequence::singleton(attr))
    }

    fn exec_message(&self, ctx: &Context, node: Node) -> Result<Sequence> {
        let select = self.attribute(node, "select");
        let value = self.content_value(ctx, select.as_deref(), node)?;
        let message = {
            let arena = self.arena().borrow();
            value.string_values(&arena).join(" ")
        };
        let terminate = match self.attribute(node, "terminate") {
            Some(raw) => eval_avt(&raw, ctx)? == "yes",
            None => false,
        };
        if terminate {
            return Err(Error::Terminate(message));
        }
        log::info!("xsl:message: {}", message);
        Ok(Sequence::new())
    }

    fn exec_result_document(&self, ctx: &Context, node: Node) -> Result<Sequence> {
        let href = match self.attribute(node, "href") {
            Some(raw) => eval_avt(&raw, ctx)?,
            None => return Err(Error::Type("result-document without href".to_string())),
        };
        let format = self.attribute(node, "format").unwrap_or_default();
        let doc = self.arena().borrow_mut().new_document();
        let body: Vec<Node> = self.arena().borrow().children(node).to_vec();
        let content = self.execute_nodes(ctx, &body)?;
        self.attach(ctx, doc, content)?;
        self.secondary.borrow_mut().push(SecondaryDoc {
            href,
            format,
            doc,
        });
        Ok(Sequence::new())
    }

    pub(crate) fn write_secondary_documents(&self) -> Result<()> {
        for secondary in self.secondary.borrow().iter() {
            let output = self.sheet.output_named(&secondary.format);
            let path = self.sheet.base_dir.join(&secondary.href);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| Error::Io(format!("{}: {}", parent.display(), e)))?;
            }
            let mut file = fs::File::create(&path)
                .map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))?;
            log::debug!("writing result document {}", path.display());
            self.arena()
                .borrow()
                .serialize(secondary.doc, &output, &mut file)
                .map_err(Error::from)?;
        }
        Ok(())
    }

    fn exec_try(&self, ctx: &Context, node: Node) -> Result<Sequence> {
        let (body, catches) = {
            let arena = self.arena().borrow();
            let mut body = Vec::new();
            let mut catches = Vec::new();
            for child in arena.children(node) {
                if is_xsl(&arena, *child, "catch") {
                    catches.push(*child);
                } else {
                    body.push(*child);
                }
            }
            (body, catches)
        };
        match self.execute_nodes(ctx, &body) {
            Ok(content) => Ok(content),
            // termination is not recoverable
            Err(Error::Terminate(message)) => Err(Error::Terminate(message)),
            Err(error) => match catches.last() {
                Some(catch) => {
                    log::debug!("xsl:try caught {}", error);
                    let body: Vec<Node> = self.arena().borrow().children(*catch).to_vec();
                    self.execute_nodes(ctx, &body)
                }
                None => Err(error),
            },
        }
    }

    fn exec_where_populated(&self, ctx: &Context, node: Node) -> Result<Sequence> {
        let children: Vec<Node> = self.arena().borrow().children(node).to_vec();
        let content = self.execute_nodes(ctx, &children)?;
        let kept: Sequence = content
            .into_iter()
            .filter(|item| self.is_populated(item))
            .collect();
        Ok(kept)
    }

    fn is_populated(&self, item: &Item) -> bool {
        match item {
            Item::Atomic(a) => !a.string_value().is_empty(),
            Item::Node(n) => {
                let arena = self.arena().borrow();
                match arena.kind(*n) {
                    NodeKind::Element | NodeKind::Document => {
                        !arena.children(*n).is_empty() || !arena.attributes(*n).is_empty()
                    }
                    _ => !arena.string_value(*n).is_empty(),
                }
            }
        }
    }

    fn exec_source_document(&self, ctx: &Context, node: Node) -> Result<Sequence> {
        let href = match self.attribute(node, "href") {
            Some(raw) => eval_avt(&raw, ctx)?,
            None => return Err(Error::Type("source-document without href".to_string())),
        };
        let path = match &ctx.base_dir {
            Some(dir) => dir.join(&href),
            None => std::path::PathBuf::from(&href),
        };
        let source =
            fs::read_to_string(&path).map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))?;
        let doc = self.arena().borrow_mut().parse_str(&source)?;
        let children: Vec<Node> = self.arena().borrow().children(node).to_vec();
        let sub = ctx.sub(Item::Node(doc), 1, 1);
        self.execute_nodes(&sub, &children)
    }
}

fn xsl_local(arena: &Arena, node: Node) -> Option<String> {
    xsl_instruction(arena, node).map(|s| s.to_string())
}
