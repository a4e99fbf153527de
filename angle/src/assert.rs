use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Context as _;
use clap::Parser;

use angle_schematron::{AssertionKind, Schema};
use angle_xml::Arena;

#[derive(Debug, Parser)]
pub(crate) struct Assert {
    /// Schematron phase to run (default: the schema's default phase, or
    /// every pattern).
    #[arg(short = 'p', long)]
    phase: Option<String>,
    /// Only print the summary line.
    #[arg(short = 'q', long)]
    quiet: bool,
    /// Stop reporting after the first failure.
    #[arg(short = 'e', long = "fail-fast")]
    fail_fast: bool,
    /// Schematron schema.
    schematron: PathBuf,
    /// Document to validate.
    document: PathBuf,
}

impl Assert {
    /// Returns true when every assertion passed.
    pub(crate) fn run(&self) -> anyhow::Result<bool> {
        let arena = Rc::new(RefCell::new(Arena::new()));
        let schema = Schema::load(arena.clone(), &self.schematron)
            .with_context(|| format!("loading {}", self.schematron.display()))?;
        let source = fs::read_to_string(&self.document)
            .with_context(|| format!("reading {}", self.document.display()))?;
        let doc = arena.borrow_mut().parse_str(&source)?;
        let violations = schema.validate(doc, self.phase.as_deref())?;
        if !self.quiet {
            for violation in &violations {
                let kind = match violation.kind {
                    AssertionKind::Assert => "assert",
                    AssertionKind::Report => "report",
                };
                let id = violation
                    .assertion_id
                    .as_deref()
                    .map(|id| format!(" [{}]", id))
                    .unwrap_or_default();
                println!("{}{} {}: {}", kind, id, violation.path, violation.message);
                if self.fail_fast {
                    break;
                }
            }
        }
        match (violations.len(), schema.title()) {
            (0, Some(title)) => println!("{}: ok", title),
            (0, None) => println!("ok"),
            (n, Some(title)) => println!("{}: {} violation(s)", title, n),
            (n, None) => println!("{} violation(s)", n),
        }
        Ok(violations.is_empty())
    }
}
