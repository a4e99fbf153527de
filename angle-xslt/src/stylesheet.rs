use std::cell::RefCell;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use ahash::AHashMap;
use angle_xml::{Arena, Namespaces, Node, NodeKind, Output, QName, XSL_NAMESPACE};
use angle_xpath::{Context, Environ, Error, Registry, Result, Sequence};
use angle_xpath_ast::{parse_pattern, pattern_priority, Expr};

use crate::exec::Engine;

/// How a mode treats nodes no template matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoMatchPolicy {
    DeepCopy,
    ShallowCopy,
    DeepSkip,
    ShallowSkip,
    #[default]
    TextOnlyCopy,
    Fail,
}

impl NoMatchPolicy {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "deep-copy" => NoMatchPolicy::DeepCopy,
            "shallow-copy" => NoMatchPolicy::ShallowCopy,
            "deep-skip" => NoMatchPolicy::DeepSkip,
            "shallow-skip" => NoMatchPolicy::ShallowSkip,
            "text-only-copy" => NoMatchPolicy::TextOnlyCopy,
            "fail" => NoMatchPolicy::Fail,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Template {
    pub name: Option<QName>,
    pub pattern: Option<Expr>,
    /// Modes this template serves; `#all` is kept verbatim.
    pub modes: Vec<String>,
    pub declared_priority: Option<f64>,
    pub base_priority: f64,
    /// Import precedence; higher wins.
    pub precedence: usize,
    /// Declaration order; later wins on full ties.
    pub order: usize,
    pub params: Vec<ParamDecl>,
    pub body: Vec<Node>,
}

impl Template {
    pub(crate) fn serves_mode(&self, mode: &str) -> bool {
        self.modes.iter().any(|m| m == mode || m == "#all")
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ParamDecl {
    pub name: QName,
    pub select: Option<String>,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone)]
pub(crate) struct Global {
    pub name: QName,
    pub select: Option<String>,
    pub body: Vec<Node>,
    pub is_param: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct FunctionDecl {
    pub name: QName,
    pub params: Vec<QName>,
    pub body: Vec<Node>,
}

/// A loaded stylesheet: templates, modes, outputs, attribute sets, global
/// parameters and functions, with imports and includes resolved.
///
/// The stylesheet shares one arena with the documents it transforms and is
/// read-only during evaluation, so it can be reused for any number of
/// transformations.
pub struct Stylesheet {
    arena: Rc<RefCell<Arena>>,
    pub(crate) namespaces: Namespaces,
    pub(crate) templates: Vec<Template>,
    pub(crate) modes: AHashMap<String, NoMatchPolicy>,
    pub(crate) outputs: AHashMap<String, Output>,
    pub(crate) attribute_sets: AHashMap<String, Vec<Node>>,
    pub(crate) globals: Vec<Global>,
    pub(crate) functions: Vec<FunctionDecl>,
    strip_space: Vec<QName>,
    preserve_space: Vec<QName>,
    pub(crate) default_mode: String,
    initial_mode: RefCell<String>,
    param_overrides: RefCell<AHashMap<QName, String>>,
    pub(crate) base_dir: PathBuf,
    next_precedence: usize,
    order: usize,
}

impl Stylesheet {
    /// Load a stylesheet file; `context_dir`, when given, anchors relative
    /// references (`include`, `import`, `result-document`).
    pub fn load(
        arena: Rc<RefCell<Arena>>,
        path: impl AsRef<Path>,
        context_dir: Option<&Path>,
    ) -> Result<Rc<Stylesheet>> {
        let path = path.as_ref();
        let source =
            fs::read_to_string(path).map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))?;
        let base_dir = context_dir
            .map(|d| d.to_path_buf())
            .or_else(|| path.parent().map(|d| d.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::load_str(arena, &source, base_dir)
    }

    /// Load a stylesheet from text.
    pub fn load_str(
        arena: Rc<RefCell<Arena>>,
        source: &str,
        base_dir: impl Into<PathBuf>,
    ) -> Result<Rc<Stylesheet>> {
        let base_dir = base_dir.into();
        let doc = arena.borrow_mut().parse_str(source)?;
        let mut sheet = Stylesheet {
            arena: arena.clone(),
            namespaces: Namespaces::new(),
            templates: Vec::new(),
            modes: AHashMap::new(),
            outputs: AHashMap::new(),
            attribute_sets: AHashMap::new(),
            globals: Vec::new(),
            functions: Vec::new(),
            strip_space: Vec::new(),
            preserve_space: Vec::new(),
            default_mode: String::new(),
            initial_mode: RefCell::new(String::new()),
            param_overrides: RefCell::new(AHashMap::new()),
            base_dir: base_dir.clone(),
            next_precedence: 0,
            order: 0,
        };
        let root = sheet.stylesheet_root(doc)?;
        {
            let arena = sheet.arena.borrow();
            sheet.namespaces.merge(&arena.in_scope_namespaces(root));
            if let Some(mode) = arena.attribute(root, "default-mode") {
                sheet.default_mode = mode.to_string();
            }
        }
        *sheet.initial_mode.borrow_mut() = sheet.default_mode.clone();
        sheet.absorb(root, &base_dir)?;
        Ok(Rc::new(sheet))
    }

    fn stylesheet_root(&self, doc: Node) -> Result<Node> {
        let arena = self.arena.borrow();
        let root = arena
            .document_element(doc)
            .ok_or_else(|| Error::Type("empty stylesheet document".to_string()))?;
        let name = arena.name(root).cloned().unwrap_or(QName::new(""));
        let is_sheet = name.uri.as_deref() == Some(XSL_NAMESPACE)
            && (name.local == "stylesheet" || name.local == "transform");
        if !is_sheet {
            return Err(Error::Type(format!(
                "expected an xsl:stylesheet root, found {}",
                name
            )));
        }
        Ok(root)
    }

    /// Collect the declarations of one stylesheet document. Imports are
    /// absorbed first so they end up with lower precedence; includes share
    /// the precedence of the including sheet.
    fn absorb(&mut self, root: Node, base_dir: &Path) -> Result<()> {
        let children: Vec<Node> = self.arena.borrow().children(root).to_vec();
        for child in &children {
            if is_xsl(&self.arena.borrow(), *child, "import") {
                let href = self.required_attribute(*child, "href")?;
                let path = base_dir.join(&href);
                let source = fs::read_to_string(&path)
                    .map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))?;
                let doc = self.arena.borrow_mut().parse_str(&source)?;
                let imported_root = self.stylesheet_root(doc)?;
                let import_base = path.parent().map(|d| d.to_path_buf()).unwrap_or_default();
                self.absorb(imported_root, &import_base)?;
            }
        }
        let precedence = self.next_precedence;
        self.next_precedence += 1;
        for child in children {
            self.declaration(child, precedence, base_dir)?;
        }
        Ok(())
    }

    fn declaration(&mut self, node: Node, precedence: usize, base_dir: &Path) -> Result<()> {
        let arena = self.arena.borrow();
        if arena.kind(node) != NodeKind::Element {
            return Ok(());
        }
        let Some(name) = arena.name(node).cloned() else {
            return Ok(());
        };
        if name.uri.as_deref() != Some(XSL_NAMESPACE) {
            return Ok(());
        }
        drop(arena);
        match name.local.as_str() {
            "import" => {} // handled by absorb
            "include" => {
                let href = self.required_attribute(node, "href")?;
                let path = base_dir.join(&href);
                let source = fs::read_to_string(&path)
                    .map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))?;
                let doc = self.arena.borrow_mut().parse_str(&source)?;
                let included_root = self.stylesheet_root(doc)?;
                let children: Vec<Node> = self.arena.borrow().children(included_root).to_vec();
                let include_base = path.parent().map(|d| d.to_path_buf()).unwrap_or_default();
                for child in children {
                    self.declaration(child, precedence, &include_base)?;
                }
            }
            "template" => self.template_declaration(node, precedence)?,
            "output" => self.output_declaration(node)?,
            "mode" => {
                let arena = self.arena.borrow();
                let mode_name = arena.attribute(node, "name").unwrap_or("").to_string();
                let policy = match arena.attribute(node, "on-no-match") {
                    Some(value) => NoMatchPolicy::from_name(value).ok_or_else(|| {
                        Error::Type(format!("unknown on-no-match policy '{}'", value))
                    })?,
                    None => NoMatchPolicy::default(),
                };
                drop(arena);
                self.modes.insert(mode_name, policy);
            }
            "attribute-set" => {
                let set_name = self.required_attribute(node, "name")?;
                let arena = self.arena.borrow();
                let attrs: Vec<Node> = arena
                    .children(node)
                    .iter()
                    .copied()
                    .filter(|n| is_xsl(&arena, *n, "attribute"))
                    .collect();
                drop(arena);
                self.attribute_sets.insert(set_name, attrs);
            }
            "param" | "variable" => {
                let arena = self.arena.borrow();
                let var_name = arena
                    .attribute(node, "name")
                    .ok_or_else(|| Error::Type("declaration without a name".to_string()))?;
                let var_name = parse_qname_value(&arena, node, var_name)?;
                let select = arena.attribute(node, "select").map(|s| s.to_string());
                let body = arena.children(node).to_vec();
                drop(arena);
                self.globals.push(Global {
                    name: var_name,
                    select,
                    body,
                    is_param: name.local == "param",
                });
            }
            "function" => {
                let arena = self.arena.borrow();
                let fn_name = arena
                    .attribute(node, "name")
                    .ok_or_else(|| Error::Type("function without a name".to_string()))?;
                let fn_name = parse_qname_value(&arena, node, fn_name)?;
                if fn_name.uri.is_none() {
                    return Err(Error::Type(format!(
                        "function name {} must be namespaced",
                        fn_name
                    )));
                }
                let mut params = Vec::new();
                let mut body = Vec::new();
                for child in arena.children(node) {
                    if is_xsl(&arena, *child, "param") {
                        let param = arena
                            .attribute(*child, "name")
                            .ok_or_else(|| Error::Type("param without a name".to_string()))?;
                        params.push(parse_qname_value(&arena, *child, param)?);
                    } else {
                        body.push(*child);
                    }
                }
                drop(arena);
                self.functions.push(FunctionDecl {
                    name: fn_name,
                    params,
                    body,
                });
            }
            "strip-space" | "preserve-space" => {
                let elements = self.required_attribute(node, "elements")?;
                let arena = self.arena.borrow();
                let names: Result<Vec<QName>> = elements
                    .split_whitespace()
                    .map(|n| parse_qname_value(&arena, node, n))
                    .collect();
                drop(arena);
                if name.local == "strip-space" {
                    self.strip_space.extend(names?);
                } else {
                    self.preserve_space.extend(names?);
                }
            }
            other => {
                log::debug!("ignoring unsupported top-level declaration xsl:{}", other);
            }
        }
        Ok(())
    }

    fn template_declaration(&mut self, node: Node, precedence: usize) -> Result<()> {
        let arena = self.arena.borrow();
        let name = match arena.attribute(node, "name") {
            Some(value) => Some(parse_qname_value(&arena, node, value)?),
            None => None,
        };
        let pattern = match arena.attribute(node, "match") {
            Some(value) => {
                let scope = arena.in_scope_namespaces(node);
                Some(parse_pattern(value, &scope)?)
            }
            None => None,
        };
        if name.is_none() && pattern.is_none() {
            return Err(Error::Type(
                "template needs a name or a match pattern".to_string(),
            ));
        }
        let declared_priority = match arena.attribute(node, "priority") {
            Some(value) => Some(value.parse::<f64>().map_err(|_| {
                Error::Type(format!("invalid template priority '{}'", value))
            })?),
            None => None,
        };
        let modes = match arena.attribute(node, "mode") {
            Some(value) => value.split_whitespace().map(|m| m.to_string()).collect(),
            None => vec![self.default_mode.clone()],
        };
        let mut params = Vec::new();
        let mut body = Vec::new();
        for child in arena.children(node) {
            if is_xsl(&arena, *child, "param") {
                let param_name = arena
                    .attribute(*child, "name")
                    .ok_or_else(|| Error::Type("param without a name".to_string()))?;
                params.push(ParamDecl {
                    name: parse_qname_value(&arena, *child, param_name)?,
                    select: arena.attribute(*child, "select").map(|s| s.to_string()),
                    body: arena.children(*child).to_vec(),
                });
            } else {
                body.push(*child);
            }
        }
        let base_priority = pattern.as_ref().map(pattern_priority).unwrap_or(0.0);
        drop(arena);
        self.templates.push(Template {
            name,
            pattern,
            modes,
            declared_priority,
            base_priority,
            precedence,
            order: self.order,
            params,
            body,
        });
        self.order += 1;
        Ok(())
    }

    fn output_declaration(&mut self, node: Node) -> Result<()> {
        let arena = self.arena.borrow();
        let mut output = Output::default();
        output.name = arena.attribute(node, "name").map(|s| s.to_string());
        if let Some(method) = arena.attribute(node, "method") {
            output.method = method.parse().map_err(Error::from)?;
        }
        output.version = arena.attribute(node, "version").map(|s| s.to_string());
        if let Some(encoding) = arena.attribute(node, "encoding") {
            output.encoding = encoding.to_string();
        }
        output.indent = arena.attribute(node, "indent") == Some("yes");
        output.omit_prolog = arena.attribute(node, "omit-xml-declaration") == Some("yes");
        output.doctype_public = arena.attribute(node, "doctype-public").map(|s| s.to_string());
        output.doctype_system = arena.attribute(node, "doctype-system").map(|s| s.to_string());
        let key = output.name.clone().unwrap_or_default();
        drop(arena);
        self.outputs.insert(key, output);
        Ok(())
    }

    fn required_attribute(&self, node: Node, name: &str) -> Result<String> {
        self.arena
            .borrow()
            .attribute(node, name)
            .map(|s| s.to_string())
            .ok_or_else(|| Error::Type(format!("missing required attribute '{}'", name)))
    }

    /// Override a global parameter with an XPath expression, compiled at
    /// transform time.
    pub fn define_param(&self, name: &str, expr: &str) -> Result<()> {
        self.param_overrides
            .borrow_mut()
            .insert(QName::new(name), expr.to_string());
        Ok(())
    }

    /// Select the initial mode of the transformation.
    pub fn set_mode(&self, mode: &str) {
        *self.initial_mode.borrow_mut() = mode.to_string();
    }

    pub fn arena(&self) -> &RefCell<Arena> {
        &self.arena
    }

    pub(crate) fn no_match_policy(&self, mode: &str) -> NoMatchPolicy {
        self.modes.get(mode).copied().unwrap_or_default()
    }

    pub(crate) fn output_named(&self, name: &str) -> Output {
        self.outputs.get(name).cloned().unwrap_or_default()
    }

    /// Transform a source document, producing a fresh result tree in the
    /// shared arena. Secondary `result-document` trees are serialized to
    /// files relative to the stylesheet base directory.
    pub fn transform(self: &Rc<Self>, doc: Node) -> Result<Node> {
        let registry = self.build_registry();
        self.strip_whitespace(doc);
        let result = {
            let engine = Engine::new(self);
            let context = self.initial_context(&registry, doc)?;
            let result = engine.run(&context, doc, &self.initial_mode.borrow())?;
            engine.write_secondary_documents()?;
            result
        };
        Ok(result)
    }

    /// Transform and serialize with the principal output settings.
    pub fn generate(self: &Rc<Self>, writer: &mut dyn Write, doc: Node) -> Result<Node> {
        let result = self.transform(doc)?;
        let output = self.output_named("");
        self.arena
            .borrow()
            .serialize(result, &output, writer)
            .map_err(Error::from)?;
        Ok(result)
    }

    fn build_registry(self: &Rc<Self>) -> Registry {
        let mut registry = Registry::with_builtins();
        for decl in &self.functions {
            let sheet = Rc::clone(self);
            let decl = decl.clone();
            let arity = decl.params.len();
            let name = decl.name.clone();
            registry.register_user(
                name,
                arity,
                Rc::new(move |ctx, args| {
                    let engine = Engine::new(&sheet);
                    engine.call_function(ctx, &decl, args)
                }),
            );
        }
        registry
    }

    /// The context globals are evaluated in: focus on the source document,
    /// every global visible to the ones declared after it.
    fn initial_context<'a>(&'a self, registry: &'a Registry, doc: Node) -> Result<Context<'a>> {
        let mut context = Context::new(&self.arena, registry, doc);
        context.namespaces = Rc::new(self.namespaces.clone());
        context.base_dir = Some(Rc::new(self.base_dir.clone()));
        let globals = Environ::<Sequence>::new();
        context.variables = globals.clone();
        let overrides = self.param_overrides.borrow();
        for global in &self.globals {
            let value = if global.is_param {
                match overrides.get(&global.name) {
                    Some(expr) => {
                        let compiled = angle_xpath_ast::parse(expr, &self.namespaces)?;
                        Some(angle_xpath::eval(&compiled, &context)?)
                    }
                    None => None,
                }
            } else {
                None
            };
            let value = match value {
                Some(value) => value,
                None => {
                    let engine = Engine::new(self);
                    engine.variable_value(&context, global.select.as_deref(), &global.body)?
                }
            };
            globals.define(global.name.clone(), value)?;
        }
        Ok(context)
    }

    /// Remove whitespace-only text children of elements named by
    /// `strip-space`, unless also named by `preserve-space`.
    fn strip_whitespace(&self, doc: Node) {
        if self.strip_space.is_empty() {
            return;
        }
        let doomed: Vec<Node> = {
            let arena = self.arena.borrow();
            arena
                .descendants(doc)
                .into_iter()
                .filter(|n| {
                    arena.kind(*n) == NodeKind::Text
                        && arena.string_value(*n).trim().is_empty()
                        && arena.parent(*n).is_some_and(|p| {
                            let Some(name) = arena.name(p) else {
                                return false;
                            };
                            self.strip_space.iter().any(|s| s.matches(name))
                                && !self.preserve_space.iter().any(|s| s.matches(name))
                        })
                })
                .collect()
        };
        let mut arena = self.arena.borrow_mut();
        for node in doomed {
            arena.detach(node);
        }
    }
}

pub(crate) fn is_xsl(arena: &Arena, node: Node, local: &str) -> bool {
    arena.kind(node) == NodeKind::Element
        && arena.name(node).is_some_and(|n| {
            n.uri.as_deref() == Some(XSL_NAMESPACE) && n.local == local
        })
}

pub(crate) fn xsl_instruction<'a>(arena: &'a Arena, node: Node) -> Option<&'a str> {
    if arena.kind(node) != NodeKind::Element {
        return None;
    }
    let name = arena.name(node)?;
    if name.uri.as_deref() == Some(XSL_NAMESPACE) {
        Some(&name.local)
    } else {
        None
    }
}

/// Resolve a QName written in an attribute value against the in-scope
/// namespaces of the carrying element.
pub(crate) fn parse_qname_value(arena: &Arena, node: Node, value: &str) -> Result<QName> {
    match value.split_once(':') {
        Some((prefix, local)) => {
            let scope = arena.in_scope_namespaces(node);
            let uri = scope
                .resolve(prefix)
                .ok_or_else(|| Error::Undefined(format!("namespace prefix '{}'", prefix)))?;
            Ok(QName::qualified(local, prefix, uri))
        }
        None => Ok(QName::new(value)),
    }
}
