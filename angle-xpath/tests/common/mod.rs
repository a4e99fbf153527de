use angle_xpath::{Error, Session};

pub const SAMPLE: &str = r#"<root><item id="fst" lang="en">foo</item><item id="snd" lang="en">bar</item><group><item id="nest" lang="ung">qux</item></group></root>"#;

/// Evaluate a query against an optional document, returning the string
/// values of the result.
pub fn run_xml(query: &str, xml: &str) -> Result<Vec<String>, Error> {
    let session = Session::new();
    let doc = session.load_str(xml)?;
    let result = session.find(query, doc)?;
    let arena = session.arena().borrow();
    Ok(result.string_values(&arena))
}

pub fn run(query: &str) -> Result<Vec<String>, Error> {
    run_xml(query, "<empty/>")
}
