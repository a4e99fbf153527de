use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context as _};
use clap::Parser;

use angle_xml::{Arena, Node, Output, QName};
use angle_xpath::{Item, Session};

#[derive(Debug, Parser)]
pub(crate) struct Query {
    /// Configuration file with `prefix: uri` and `name=expr` lines.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print at most this many matches.
    #[arg(long)]
    limit: Option<usize>,
    /// Truncate serialized matches below this element depth.
    #[arg(long)]
    depth: Option<usize>,
    /// Print string values instead of serialized XML.
    #[arg(long)]
    text: bool,
    /// Namespace declaration `prefix:uri`, repeatable.
    #[arg(long = "xml-namespace")]
    namespaces: Vec<String>,
    /// Variable binding `name=expr`, repeatable; the expression is
    /// evaluated against each document before the query runs.
    #[arg(long = "var")]
    variables: Vec<String>,
    /// XPath expression.
    expr: String,
    /// Input documents.
    files: Vec<PathBuf>,
}

impl Query {
    /// Returns true when any document produced at least one match.
    pub(crate) fn run(&self) -> anyhow::Result<bool> {
        let mut namespaces = Vec::new();
        let mut variables = Vec::new();
        if let Some(config) = &self.config {
            let text = fs::read_to_string(config)
                .with_context(|| format!("reading {}", config.display()))?;
            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((name, expr)) = line.split_once('=') {
                    variables.push((name.trim().to_string(), expr.trim().to_string()));
                } else if let Some((prefix, uri)) = line.split_once(':') {
                    namespaces.push((prefix.trim().to_string(), uri.trim().to_string()));
                } else {
                    bail!("unrecognized config line: {}", line);
                }
            }
        }
        for declaration in &self.namespaces {
            let (prefix, uri) = declaration
                .split_once(':')
                .with_context(|| format!("expected prefix:uri, got {}", declaration))?;
            namespaces.push((prefix.to_string(), uri.to_string()));
        }
        for binding in &self.variables {
            let (name, expr) = binding
                .split_once('=')
                .with_context(|| format!("expected name=expr, got {}", binding))?;
            variables.push((name.to_string(), expr.to_string()));
        }

        let mut printed = 0;
        let mut matched = false;
        for file in &self.files {
            let source =
                fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
            let mut session = Session::new();
            for (prefix, uri) in &namespaces {
                session.register_namespace(prefix, uri);
            }
            let doc = session.load_str(&source)?;
            for (name, expr) in &variables {
                let value = session.find(expr, doc)?;
                session.set_variable(QName::new(name.as_str()), value);
            }
            let result = session.find(&self.expr, doc)?;
            if !result.is_empty() {
                matched = true;
            }
            for item in result.items() {
                if let Some(limit) = self.limit {
                    if printed >= limit {
                        return Ok(matched);
                    }
                }
                self.print_item(&session, item)?;
                printed += 1;
            }
        }
        Ok(matched)
    }

    fn print_item(&self, session: &Session, item: &Item) -> anyhow::Result<()> {
        let arena = session.arena().borrow();
        match item {
            Item::Atomic(_) => println!("{}", item.string_value(&arena)),
            Item::Node(node) => {
                if self.text {
                    println!("{}", arena.string_value(*node));
                } else {
                    drop(arena);
                    let mut arena = session.arena().borrow_mut();
                    let pruned = match self.depth {
                        Some(depth) => prune(&mut arena, *node, depth),
                        None => *node,
                    };
                    let output = Output {
                        omit_prolog: true,
                        ..Output::default()
                    };
                    println!("{}", arena.serialize_to_string(pruned, &output)?);
                }
            }
        }
        Ok(())
    }
}

/// A copy of the subtree cut off below `depth` levels of elements.
fn prune(arena: &mut Arena, node: Node, depth: usize) -> Node {
    let copy = arena.clone_shallow(node);
    if depth > 0 {
        let children: Vec<Node> = arena.children(node).to_vec();
        for child in children {
            let pruned = prune(arena, child, depth - 1);
            arena.append_child(copy, pruned);
        }
    }
    copy
}
