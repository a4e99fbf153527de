use std::cell::RefCell;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Context as _;
use clap::Parser;

use angle_xml::Arena;
use angle_xslt::Stylesheet;

#[derive(Debug, Parser)]
pub(crate) struct Transform {
    /// Initial mode.
    #[arg(short = 'm', long)]
    mode: Option<String>,
    /// Directory relative references resolve against.
    #[arg(short = 'd', long = "context-dir")]
    context_dir: Option<PathBuf>,
    /// Output file (default stdout).
    #[arg(short = 'f', long = "file")]
    out: Option<PathBuf>,
    /// Stylesheet parameter `name=expr`, repeatable.
    #[arg(short = 'p', long = "param")]
    params: Vec<String>,
    /// XSLT stylesheet.
    stylesheet: PathBuf,
    /// Input document.
    document: PathBuf,
}

impl Transform {
    pub(crate) fn run(&self) -> anyhow::Result<bool> {
        let arena = Rc::new(RefCell::new(Arena::new()));
        let sheet = Stylesheet::load(arena.clone(), &self.stylesheet, self.context_dir.as_deref())
            .with_context(|| format!("loading {}", self.stylesheet.display()))?;
        for binding in &self.params {
            let (name, expr) = binding
                .split_once('=')
                .with_context(|| format!("expected name=expr, got {}", binding))?;
            sheet.define_param(name, expr)?;
        }
        if let Some(mode) = &self.mode {
            sheet.set_mode(mode);
        }
        let source = fs::read_to_string(&self.document)
            .with_context(|| format!("reading {}", self.document.display()))?;
        let doc = arena.borrow_mut().parse_str(&source)?;
        let mut writer: Box<dyn Write> = match &self.out {
            Some(path) => Box::new(
                fs::File::create(path).with_context(|| format!("creating {}", path.display()))?,
            ),
            None => Box::new(std::io::stdout()),
        };
        sheet.generate(&mut writer, doc)?;
        Ok(true)
    }
}
