mod common;

use common::{run, run_xml, SAMPLE};

#[test]
fn descendant_items() {
    assert_eq!(run_xml("//item", SAMPLE).unwrap(), vec!["foo", "bar", "qux"]);
}

#[test]
fn positional_last() {
    assert_eq!(run_xml("/root/item[last()]", SAMPLE).unwrap(), vec!["bar"]);
}

#[test]
fn for_over_range() {
    assert_eq!(
        run("for $i in 1 to 5 return $i").unwrap(),
        vec!["1", "2", "3", "4", "5"]
    );
}

#[test]
fn quantified_over_sequences() {
    assert_eq!(
        run("some $x in (1, 2, 13) satisfies $x > 10").unwrap(),
        vec!["true"]
    );
    assert_eq!(
        run("every $x in (1, 2, 3) satisfies $x > 10").unwrap(),
        vec!["false"]
    );
}

#[test]
fn arrow_chain() {
    assert_eq!(
        run("'foo' => upper-case() => replace('FOO', 'bar')").unwrap(),
        vec!["bar"]
    );
}

#[test]
fn attribute_tests() {
    assert_eq!(
        run_xml("//item[@id = 'snd']", SAMPLE).unwrap(),
        vec!["bar"]
    );
    assert_eq!(
        run_xml("/root/item/@id", SAMPLE).unwrap(),
        vec!["fst", "snd"]
    );
}

#[test]
fn predicates_positional_and_boolean() {
    assert_eq!(run_xml("/root/item[1]", SAMPLE).unwrap(), vec!["foo"]);
    assert_eq!(run_xml("/root/item[2]", SAMPLE).unwrap(), vec!["bar"]);
    assert_eq!(run_xml("/root/item[3]", SAMPLE).unwrap(), Vec::<String>::new());
    assert_eq!(
        run_xml("//item[@lang = 'ung']", SAMPLE).unwrap(),
        vec!["qux"]
    );
}

#[test]
fn path_equals_manual_traversal() {
    // /a/b is the same as walking children by hand
    let by_path = run_xml("/root/item", SAMPLE).unwrap();
    let by_steps = run_xml("child::root/child::item", SAMPLE).unwrap();
    assert_eq!(by_path, by_steps);
    assert_eq!(by_path, vec!["foo", "bar"]);
}

#[test]
fn axes_include_focus_once() {
    assert_eq!(
        run_xml("count(//group/descendant-or-self::*)", SAMPLE).unwrap(),
        vec!["2"]
    );
    assert_eq!(
        run_xml("count(//group/item/ancestor-or-self::*)", SAMPLE).unwrap(),
        vec!["3"]
    );
}

#[test]
fn sibling_axes() {
    assert_eq!(
        run_xml("/root/item[1]/following-sibling::item", SAMPLE).unwrap(),
        vec!["bar"]
    );
    assert_eq!(
        run_xml("/root/group/preceding-sibling::item", SAMPLE).unwrap(),
        vec!["foo", "bar"]
    );
}

#[test]
fn preceding_following_skip_ancestors() {
    assert_eq!(
        run_xml("count(//item[@id = 'nest']/preceding::item)", SAMPLE).unwrap(),
        vec!["2"]
    );
    assert_eq!(
        run_xml("count(//item[@id = 'fst']/following::item)", SAMPLE).unwrap(),
        vec!["2"]
    );
    // ancestors are not preceding
    assert_eq!(
        run_xml("count(//item[@id = 'nest']/preceding::group)", SAMPLE).unwrap(),
        vec!["0"]
    );
}

#[test]
fn set_operators_are_identity_based() {
    assert_eq!(
        run_xml("count(//item union //item)", SAMPLE).unwrap(),
        vec!["3"]
    );
    assert_eq!(
        run_xml("count(//item intersect //item)", SAMPLE).unwrap(),
        vec!["3"]
    );
    assert_eq!(
        run_xml("count(//item except //item)", SAMPLE).unwrap(),
        vec!["0"]
    );
    // (A union B) except B == A except B
    assert_eq!(
        run_xml(
            "count((/root/item union //group/item) except //group/item)",
            SAMPLE
        )
        .unwrap(),
        run_xml("count(/root/item except //group/item)", SAMPLE).unwrap()
    );
}

#[test]
fn union_result_is_document_order() {
    assert_eq!(
        run_xml("//group/item | /root/item", SAMPLE).unwrap(),
        vec!["foo", "bar", "qux"]
    );
}

#[test]
fn node_identity() {
    assert_eq!(
        run_xml("/root/item[1] is /root/item[1]", SAMPLE).unwrap(),
        vec!["true"]
    );
    assert_eq!(
        run_xml("/root/item[1] is /root/item[2]", SAMPLE).unwrap(),
        vec!["false"]
    );
    assert_eq!(
        run_xml("/root/item[1] << /root/item[2]", SAMPLE).unwrap(),
        vec!["true"]
    );
}

#[test]
fn arithmetic_and_precedence() {
    assert_eq!(run("1 + 2 * 3").unwrap(), vec!["7"]);
    assert_eq!(run("(1 + 2) * 3").unwrap(), vec!["9"]);
    assert_eq!(run("7 mod 3").unwrap(), vec!["1"]);
    assert_eq!(run("12 div 4").unwrap(), vec!["3"]);
    assert_eq!(run("-(3)").unwrap(), vec!["-3"]);
}

#[test]
fn division_by_zero() {
    assert!(run("1 div 0").is_err());
    assert!(run("1 mod 0").is_err());
}

#[test]
fn empty_operand_arithmetic_is_empty() {
    assert_eq!(run("() + 1").unwrap(), Vec::<String>::new());
    assert_eq!(run("1 + ()").unwrap(), Vec::<String>::new());
}

#[test]
fn general_vs_value_comparison() {
    assert_eq!(run("(1, 2) = 2").unwrap(), vec!["true"]);
    assert_eq!(run("(1, 2) != 1").unwrap(), vec!["true"]);
    assert!(run("(1, 2) eq 2").is_err());
    assert_eq!(run("2 eq 2").unwrap(), vec!["true"]);
    assert_eq!(run("1 lt 2").unwrap(), vec!["true"]);
}

#[test]
fn string_concat_operator() {
    assert_eq!(run("'a' || 'b' || 'c'").unwrap(), vec!["abc"]);
    assert_eq!(run("() || 'b'").unwrap(), vec!["b"]);
}

#[test]
fn range_edges() {
    assert_eq!(run("count(5 to 1)").unwrap(), vec!["0"]);
    assert_eq!(run("count(() to 3)").unwrap(), vec!["0"]);
    assert_eq!(run("3 to 3").unwrap(), vec!["3"]);
}

#[test]
fn let_shadowing() {
    assert_eq!(
        run("let $x := 1 return (let $x := 2 return $x) + $x").unwrap(),
        vec!["3"]
    );
    assert_eq!(
        run("let $x := 1, $y := $x + 3 return $y + 5").unwrap(),
        vec!["9"]
    );
}

#[test]
fn for_cartesian_product() {
    assert_eq!(
        run("for $i in (1, 2), $j in (10, 20) return $i * $j").unwrap(),
        vec!["10", "20", "20", "40"]
    );
}

#[test]
fn if_requires_else() {
    assert_eq!(run("if (1) then 'a' else 'b'").unwrap(), vec!["a"]);
    assert_eq!(run("if (0) then 'a' else 'b'").unwrap(), vec!["b"]);
    assert!(run("if (1) then 'a'").is_err());
}

#[test]
fn casts_and_instance() {
    assert_eq!(run("'42' cast as xs:integer").unwrap(), vec!["42"]);
    assert_eq!(run("'x' castable as xs:integer").unwrap(), vec!["false"]);
    assert_eq!(run("() cast as xs:integer?").unwrap(), Vec::<String>::new());
    assert_eq!(run("3 instance of xs:integer").unwrap(), vec!["true"]);
    assert_eq!(run("3 instance of xs:decimal").unwrap(), vec!["true"]);
    assert_eq!(run("(1, 2) instance of xs:integer*").unwrap(), vec!["true"]);
    assert_eq!(run("() instance of xs:integer?").unwrap(), vec!["true"]);
    assert_eq!(run("() instance of xs:integer+").unwrap(), vec!["false"]);
    assert_eq!(
        run("('a', 1) instance of xs:integer*").unwrap(),
        vec!["false"]
    );
}

#[test]
fn undefined_names() {
    assert!(run("$nope").is_err());
    assert!(run("no-such-function()").is_err());
    // known function, wrong arity
    let err = run("true(1)").unwrap_err();
    assert_eq!(err.code(), "XPST0017");
}

#[test]
fn maps_and_arrays() {
    assert_eq!(run("[10, 20, 30](2)").unwrap(), vec!["20"]);
    assert_eq!(run("map { 'k' : 5 }('k')").unwrap(), vec!["5"]);
    assert_eq!(run("array { 1, 2 }(1)").unwrap(), vec!["1"]);
}

#[test]
fn kind_tests_over_mixed_content() {
    let xml = "<r>one<!--note-->two<?pi data?><e/></r>";
    assert_eq!(run_xml("count(/r/text())", xml).unwrap(), vec!["2"]);
    assert_eq!(run_xml("count(/r/comment())", xml).unwrap(), vec!["1"]);
    assert_eq!(
        run_xml("count(/r/processing-instruction('pi'))", xml).unwrap(),
        vec!["1"]
    );
    assert_eq!(run_xml("count(/r/node())", xml).unwrap(), vec!["5"]);
}

#[test]
fn parent_and_root_steps() {
    assert_eq!(
        run_xml("//item[@id = 'nest']/../../item[1]", SAMPLE).unwrap(),
        vec!["foo"]
    );
    // steps do not deduplicate; two items share the same parent
    assert_eq!(run_xml("count(//item/..)", SAMPLE).unwrap(), vec!["3"]);
    assert_eq!(run_xml("count(//item/.. | //item/..)", SAMPLE).unwrap(), vec!["2"]);
}

#[test]
fn builtin_strings() {
    assert_eq!(run("substring('12345', 2, 3)").unwrap(), vec!["234"]);
    assert_eq!(run("substring-before('a-b', '-')").unwrap(), vec!["a"]);
    assert_eq!(run("substring-after('a-b', '-')").unwrap(), vec!["b"]);
    assert_eq!(run("normalize-space('  a   b ')").unwrap(), vec!["a b"]);
    assert_eq!(run("string-join(('a', 'b'), '-')").unwrap(), vec!["a-b"]);
    assert_eq!(run("concat('a', 'b', 'c')").unwrap(), vec!["abc"]);
    assert_eq!(run("string-length('héllo')").unwrap(), vec!["5"]);
    assert_eq!(run("translate('abc', 'ac', 'A')").unwrap(), vec!["Ab"]);
    assert_eq!(run("tokenize('a b  c')").unwrap(), vec!["a", "b", "c"]);
    assert_eq!(run("tokenize('a1b2c', '[0-9]')").unwrap(), vec!["a", "b", "c"]);
    assert_eq!(run("matches('abc', '^a.c$')").unwrap(), vec!["true"]);
    assert_eq!(run("matches('ABC', 'abc', 'i')").unwrap(), vec!["true"]);
    assert_eq!(run("compare('a', 'b')").unwrap(), vec!["-1"]);
}

#[test]
fn builtin_numbers() {
    assert_eq!(run_xml("sum(//item/string-length(.))", SAMPLE).unwrap(), vec!["9"]);
    assert_eq!(run("sum(())").unwrap(), vec!["0"]);
    assert_eq!(run("avg((1, 2, 3))").unwrap(), vec!["2"]);
    assert_eq!(run("min((3, 1, 2))").unwrap(), vec!["1"]);
    assert_eq!(run("max((3, 1, 2))").unwrap(), vec!["3"]);
    assert_eq!(run("round(2.5)").unwrap(), vec!["3"]);
    assert_eq!(run("floor(2.7)").unwrap(), vec!["2"]);
    assert_eq!(run("ceiling(2.1)").unwrap(), vec!["3"]);
    assert_eq!(run("abs(-4)").unwrap(), vec!["4"]);
    assert_eq!(run("number('12.5')").unwrap(), vec!["12.5"]);
    assert_eq!(run("number('nope')").unwrap(), vec!["NaN"]);
    assert_eq!(run("format-integer(7, '001')").unwrap(), vec!["007"]);
    assert_eq!(run("format-number(1234.5, '#,##0.00')").unwrap(), vec!["1,234.50"]);
}

#[test]
fn builtin_nodes() {
    assert_eq!(run_xml("name(//item[1])", SAMPLE).unwrap(), vec!["item"]);
    assert_eq!(run_xml("local-name(//item[1])", SAMPLE).unwrap(), vec!["item"]);
    assert_eq!(
        run_xml("path(//item[@id = 'nest'])", SAMPLE).unwrap(),
        vec!["/root[1]/group[1]/item[1]"]
    );
    let multilingual =
        r#"<r><p xml:lang="en">a</p><p xml:lang="en-US">b</p><p xml:lang="fr">c</p></r>"#;
    assert_eq!(
        run_xml("//p[lang('en')]", multilingual).unwrap(),
        vec!["a", "b"]
    );
    assert_eq!(
        run_xml("has-children(/root)", SAMPLE).unwrap(),
        vec!["true"]
    );
    assert_eq!(
        run_xml("is-same-node(/root, /root)", SAMPLE).unwrap(),
        vec!["true"]
    );
    assert_eq!(
        run_xml("node-before(/root/item[1], /root/item[2])", SAMPLE).unwrap(),
        vec!["true"]
    );
}

#[test]
fn builtin_sequences() {
    assert_eq!(run("empty(())").unwrap(), vec!["true"]);
    assert_eq!(run("exists((1))").unwrap(), vec!["true"]);
    assert_eq!(run("head((1, 2, 3))").unwrap(), vec!["1"]);
    assert_eq!(run("tail((1, 2, 3))").unwrap(), vec!["2", "3"]);
    assert_eq!(run("reverse((1, 2, 3))").unwrap(), vec!["3", "2", "1"]);
    assert_eq!(run("distinct-values((1, 2, 1))").unwrap(), vec!["1", "2"]);
    assert!(run("exactly-one((1, 2))").is_err());
    assert!(run("one-or-more(())").is_err());
    assert_eq!(run("zero-or-one(())").unwrap(), Vec::<String>::new());
}

#[test]
fn effective_boolean_rules() {
    assert_eq!(run("boolean('')").unwrap(), vec!["false"]);
    assert_eq!(run("boolean('false')").unwrap(), vec!["true"]);
    assert_eq!(run("boolean(0)").unwrap(), vec!["false"]);
    assert_eq!(run_xml("boolean(//item)", SAMPLE).unwrap(), vec!["true"]);
    assert_eq!(run_xml("boolean(//nothing)", SAMPLE).unwrap(), vec!["false"]);
    assert!(run("boolean((1, 2))").is_err());
}

#[test]
fn printer_round_trip_evaluates_identically() {
    let session = angle_xpath::Session::new();
    let doc = session.load_str(SAMPLE).unwrap();
    for query in [
        "//item",
        "/root/item[last()]",
        "for $i in 1 to 5 return $i",
        "some $x in (1, 2, 13) satisfies $x > 10",
        "//item[@id = 'fst'] | //group/item",
        "count(//item) * 2",
        "'foo' => upper-case()",
    ] {
        let compiled = session.compile(query).unwrap();
        let reparsed = session.compile(&compiled.to_string()).unwrap();
        let a = session.evaluate(&compiled, doc).unwrap();
        let b = session.evaluate(&reparsed, doc).unwrap();
        assert_eq!(a, b, "round trip diverged for {:?}", query);
    }
}

#[test]
fn variables_from_host() {
    let mut session = angle_xpath::Session::new();
    session.set_variable(
        angle_xml::QName::new("greeting"),
        angle_xpath::Sequence::singleton(angle_xpath::Atomic::from("hello")),
    );
    let doc = session.load_str("<x/>").unwrap();
    let result = session.find("upper-case($greeting)", doc).unwrap();
    let arena = session.arena().borrow();
    assert_eq!(result.string_values(&arena), vec!["HELLO"]);
}

#[test]
fn namespace_queries() {
    let mut session = angle_xpath::Session::new();
    session.register_namespace("a", "http://example.com/a");
    let doc = session
        .load_str(r#"<root xmlns:b="http://example.com/a"><b:item>in-a</b:item><item>plain</item></root>"#)
        .unwrap();
    let result = session.find("//a:item", doc).unwrap();
    let arena = session.arena().borrow();
    assert_eq!(result.string_values(&arena), vec!["in-a"]);
    drop(arena);
    let result = session.find("//*:item", doc).unwrap();
    let arena = session.arena().borrow();
    assert_eq!(result.string_values(&arena), vec!["in-a", "plain"]);
}
