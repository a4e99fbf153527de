mod assert;
mod query;
mod transform;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, about, version)]
pub(crate) struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate an XPath expression over XML documents.
    Query(query::Query),
    /// Transform an XML document with an XSLT stylesheet.
    Transform(transform::Transform),
    /// Run Schematron assertions against an XML document.
    Assert(assert::Assert),
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Query(query) => query.run(),
        Commands::Transform(transform) => transform.run(),
        Commands::Assert(assert) => assert.run(),
    };
    match outcome {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(error) => {
            eprintln!("error: {}", error);
            std::process::exit(1);
        }
    }
}
