use std::cell::RefCell;
use std::rc::Rc;

use angle_xml::{Arena, Output};
use angle_xslt::Stylesheet;

const SAMPLE: &str = r#"<root><item id="fst" lang="en">foo</item><item id="snd" lang="en">bar</item><group><item id="nest" lang="ung">qux</item></group></root>"#;

fn wrap(body: &str) -> String {
    format!(
        r#"<xsl:stylesheet version="3.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">{}</xsl:stylesheet>"#,
        body
    )
}

fn transform(sheet_body: &str, doc: &str) -> Result<String, angle_xpath::Error> {
    transform_full(&wrap(sheet_body), doc)
}

fn transform_full(sheet_src: &str, doc: &str) -> Result<String, angle_xpath::Error> {
    let arena = Rc::new(RefCell::new(Arena::new()));
    let sheet = Stylesheet::load_str(arena.clone(), sheet_src, ".")?;
    let doc = arena.borrow_mut().parse_str(doc)?;
    let result = sheet.transform(doc)?;
    let output = Output {
        omit_prolog: true,
        ..Output::default()
    };
    let rendered = arena.borrow().serialize_to_string(result, &output)?;
    Ok(rendered)
}

#[test]
fn call_template_with_param() {
    // a named template receives an explicit parameter
    let body = r#"
        <xsl:template match="/"><root><xsl:call-template name="shadow">
            <xsl:with-param name="var" select="'angle'"/>
        </xsl:call-template></root></xsl:template>
        <xsl:template name="shadow"><xsl:param name="var"/><item><xsl:value-of select="$var"/></item></xsl:template>
    "#;
    assert_eq!(
        transform(body, "<any/>").unwrap(),
        "<root><item>angle</item></root>"
    );
}

#[test]
fn undeclared_parameter_is_an_error() {
    let body = r#"
        <xsl:template match="/"><xsl:call-template name="shadow">
            <xsl:with-param name="other" select="1"/>
        </xsl:call-template></xsl:template>
        <xsl:template name="shadow"><xsl:param name="var"/></xsl:template>
    "#;
    assert!(transform(body, "<any/>").is_err());
}

#[test]
fn param_default_applies() {
    let body = r#"
        <xsl:template match="/"><r><xsl:call-template name="greet"/></r></xsl:template>
        <xsl:template name="greet"><xsl:param name="who" select="'world'"/><xsl:value-of select="$who"/></xsl:template>
    "#;
    assert_eq!(transform(body, "<any/>").unwrap(), "<r>world</r>");
}

#[test]
fn apply_templates_with_priorities() {
    let body = r#"
        <xsl:template match="/"><out><xsl:apply-templates select="//item"/></out></xsl:template>
        <xsl:template match="item[@id = 'fst']"><first/></xsl:template>
        <xsl:template match="item"><other><xsl:value-of select="."/></other></xsl:template>
    "#;
    assert_eq!(
        transform(body, SAMPLE).unwrap(),
        "<out><first/><other>bar</other><other>qux</other></out>"
    );
}

#[test]
fn modes_dispatch_separately() {
    let body = r#"
        <xsl:template match="/"><out>
            <xsl:apply-templates select="/root/item"/>
            <xsl:apply-templates select="/root/item" mode="loud"/>
        </out></xsl:template>
        <xsl:template match="item"><q><xsl:value-of select="."/></q></xsl:template>
        <xsl:template match="item" mode="loud"><L><xsl:value-of select="upper-case(.)"/></L></xsl:template>
    "#;
    let result = transform(body, SAMPLE).unwrap();
    assert!(result.contains("<q>foo</q><q>bar</q>"));
    assert!(result.contains("<L>FOO</L><L>BAR</L>"));
}

#[test]
fn default_rules_copy_text_only() {
    let body = r#"<xsl:template match="/root"><t><xsl:apply-templates/></t></xsl:template>"#;
    // no template matches item; the default mode copies text through
    assert_eq!(transform(body, SAMPLE).unwrap(), "<t>foobarqux</t>");
}

#[test]
fn mode_on_no_match_fail() {
    let body = r#"
        <xsl:mode name="strict" on-no-match="fail"/>
        <xsl:template match="/"><xsl:apply-templates select="//group" mode="strict"/></xsl:template>
    "#;
    assert!(transform(body, SAMPLE).is_err());
}

#[test]
fn mode_on_no_match_deep_copy() {
    let body = r#"
        <xsl:mode name="copying" on-no-match="deep-copy"/>
        <xsl:template match="/"><out><xsl:apply-templates select="//group" mode="copying"/></out></xsl:template>
    "#;
    assert_eq!(
        transform(body, SAMPLE).unwrap(),
        r#"<out><group><item id="nest" lang="ung">qux</item></group></out>"#
    );
}

#[test]
fn for_each_with_sort() {
    let body = r#"
        <xsl:template match="/"><out><xsl:for-each select="//item">
            <xsl:sort select="@id"/>
            <i><xsl:value-of select="@id"/></i>
        </xsl:for-each></out></xsl:template>
    "#;
    assert_eq!(
        transform(body, SAMPLE).unwrap(),
        "<out><i>fst</i><i>nest</i><i>snd</i></out>"
    );
}

#[test]
fn sort_is_stable() {
    let body = r#"
        <xsl:template match="/"><out><xsl:for-each select="//item">
            <xsl:sort select="@lang"/>
            <i><xsl:value-of select="@id"/></i>
        </xsl:for-each></out></xsl:template>
    "#;
    // fst and snd share the key "en" and keep their input order
    assert_eq!(
        transform(body, SAMPLE).unwrap(),
        "<out><i>fst</i><i>snd</i><i>nest</i></out>"
    );
}

#[test]
fn sort_numeric_descending() {
    let body = r#"
        <xsl:template match="/"><out><xsl:for-each select="//n">
            <xsl:sort select="." data-type="number" order="descending"/>
            <v><xsl:value-of select="."/></v>
        </xsl:for-each></out></xsl:template>
    "#;
    assert_eq!(
        transform(body, "<r><n>9</n><n>100</n><n>21</n></r>").unwrap(),
        "<out><v>100</v><v>21</v><v>9</v></out>"
    );
}

#[test]
fn choose_picks_first_true_branch() {
    let body = r#"
        <xsl:template match="/"><xsl:choose>
            <xsl:when test="count(//item) > 5"><many/></xsl:when>
            <xsl:when test="count(//item) > 2"><some/></xsl:when>
            <xsl:otherwise><few/></xsl:otherwise>
        </xsl:choose></xsl:template>
    "#;
    assert_eq!(transform(body, SAMPLE).unwrap(), "<some/>");
}

#[test]
fn if_inlines_or_removes() {
    let body = r#"
        <xsl:template match="/"><out>
            <xsl:if test="//item"><yes/></xsl:if>
            <xsl:if test="//missing"><no/></xsl:if>
        </out></xsl:template>
    "#;
    assert_eq!(transform(body, SAMPLE).unwrap(), "<out><yes/></out>");
}

#[test]
fn variables_bind_in_enclosing_scope() {
    let body = r#"
        <xsl:template match="/">
            <xsl:variable name="n" select="count(//item)"/>
            <out total="{$n}"><xsl:value-of select="$n * 2"/></out>
        </xsl:template>
    "#;
    assert_eq!(transform(body, SAMPLE).unwrap(), r#"<out total="3">6</out>"#);
}

#[test]
fn variable_body_builds_a_fragment() {
    let body = r#"
        <xsl:template match="/">
            <xsl:variable name="frag"><v>1</v><v>2</v></xsl:variable>
            <out><xsl:copy-of select="$frag"/></out>
        </xsl:template>
    "#;
    assert_eq!(
        transform(body, "<any/>").unwrap(),
        "<out><v>1</v><v>2</v></out>"
    );
}

#[test]
fn value_of_with_separator() {
    let body = r#"
        <xsl:template match="/"><out><xsl:value-of select="//item/@id" separator=", "/></out></xsl:template>
    "#;
    assert_eq!(
        transform(body, SAMPLE).unwrap(),
        "<out>fst, snd, nest</out>"
    );
}

#[test]
fn attribute_value_templates() {
    let body = r#"
        <xsl:template match="/"><out>
            <xsl:for-each select="//item"><i key="{@id}-{position()}"/></xsl:for-each>
        </out></xsl:template>
    "#;
    assert_eq!(
        transform(body, SAMPLE).unwrap(),
        r#"<out><i key="fst-1"/><i key="snd-2"/><i key="nest-3"/></out>"#
    );
}

#[test]
fn escaped_braces_in_avt() {
    let body = r#"<xsl:template match="/"><out v="{{literal}}"/></xsl:template>"#;
    assert_eq!(transform(body, "<any/>").unwrap(), r#"<out v="{literal}"/>"#);
}

#[test]
fn copy_is_shallow() {
    let body = r#"
        <xsl:template match="/"><out><xsl:apply-templates select="//item[1]"/></out></xsl:template>
        <xsl:template match="item"><xsl:copy><inner/></xsl:copy></xsl:template>
    "#;
    // xsl:copy takes the element name but neither attributes nor children
    assert_eq!(
        transform(body, SAMPLE).unwrap(),
        "<out><item><inner/></item></out>"
    );
}

#[test]
fn copy_of_clones_subtrees() {
    let body = r#"
        <xsl:template match="/"><out><xsl:copy-of select="//item[@id = 'fst']"/></out></xsl:template>
    "#;
    assert_eq!(
        transform(body, SAMPLE).unwrap(),
        r#"<out><item id="fst" lang="en">foo</item></out>"#
    );
}

#[test]
fn element_and_attribute_constructors() {
    let body = r#"
        <xsl:template match="/">
            <xsl:element name="made">
                <xsl:attribute name="n" select="count(//item)"/>
                <xsl:text>body</xsl:text>
            </xsl:element>
        </xsl:template>
    "#;
    assert_eq!(transform(body, SAMPLE).unwrap(), r#"<made n="3">body</made>"#);
}

#[test]
fn comment_and_pi_constructors() {
    let body = r#"
        <xsl:template match="/"><out>
            <xsl:comment>note</xsl:comment>
            <xsl:processing-instruction name="target">data</xsl:processing-instruction>
        </out></xsl:template>
    "#;
    assert_eq!(
        transform(body, "<any/>").unwrap(),
        "<out><!--note--><?target data?></out>"
    );
}

#[test]
fn for_each_group_partitions() {
    let body = r#"
        <xsl:template match="/"><out><xsl:for-each-group select="//item" group-by="@lang">
            <g key="{current-grouping-key()}" n="{count(current-group())}"/>
        </xsl:for-each-group></out></xsl:template>
    "#;
    assert_eq!(
        transform(body, SAMPLE).unwrap(),
        r#"<out><g key="en" n="2"/><g key="ung" n="1"/></out>"#
    );
}

#[test]
fn groups_cover_input_and_are_disjoint() {
    let body = r#"
        <xsl:template match="/"><out><xsl:for-each-group select="//item" group-by="@lang">
            <xsl:value-of select="count(current-group())"/><xsl:text> </xsl:text>
        </xsl:for-each-group></out></xsl:template>
    "#;
    let result = transform(body, SAMPLE).unwrap();
    let total: usize = result
        .trim_start_matches("<out>")
        .trim_end_matches("</out>")
        .split_whitespace()
        .map(|n| n.parse::<usize>().unwrap())
        .sum();
    assert_eq!(total, 3);
}

#[test]
fn merge_walks_keys_in_order() {
    let body = r#"
        <xsl:template match="/"><out><xsl:merge>
            <xsl:merge-source select="//item"><xsl:merge-key select="@id"/></xsl:merge-source>
            <xsl:merge-action><k id="{current-merge-key()}" n="{count(current-merge-group())}"/></xsl:merge-action>
        </xsl:merge></out></xsl:template>
    "#;
    assert_eq!(
        transform(body, SAMPLE).unwrap(),
        r#"<out><k id="fst" n="1"/><k id="nest" n="1"/><k id="snd" n="1"/></out>"#
    );
}

#[test]
fn try_catch_recovers() {
    let body = r#"
        <xsl:template match="/"><out><xsl:try>
            <xsl:value-of select="$undefined"/>
            <xsl:catch><caught/></xsl:catch>
        </xsl:try></out></xsl:template>
    "#;
    assert_eq!(transform(body, "<any/>").unwrap(), "<out><caught/></out>");
}

#[test]
fn try_without_catch_reraises() {
    let body = r#"
        <xsl:template match="/"><xsl:try><xsl:value-of select="$undefined"/></xsl:try></xsl:template>
    "#;
    assert!(transform(body, "<any/>").is_err());
}

#[test]
fn message_terminate_is_fatal() {
    let body = r#"
        <xsl:template match="/"><xsl:message terminate="yes">stop here</xsl:message></xsl:template>
    "#;
    let err = transform(body, "<any/>").unwrap_err();
    assert_eq!(err.code(), "XTMM9000");
}

#[test]
fn terminate_is_not_catchable() {
    let body = r#"
        <xsl:template match="/"><xsl:try>
            <xsl:message terminate="yes">stop</xsl:message>
            <xsl:catch><caught/></xsl:catch>
        </xsl:try></xsl:template>
    "#;
    assert!(transform(body, "<any/>").is_err());
}

#[test]
fn stylesheet_functions_are_callable() {
    let sheet = r#"<xsl:stylesheet version="3.0"
            xmlns:xsl="http://www.w3.org/1999/XSL/Transform"
            xmlns:my="http://example.com/my">
        <xsl:function name="my:twice"><xsl:param name="x"/><xsl:sequence select="$x * 2"/></xsl:function>
        <xsl:template match="/"><r><xsl:value-of select="my:twice(21)"/></r></xsl:template>
    </xsl:stylesheet>"#;
    assert_eq!(transform_full(sheet, "<any/>").unwrap(), "<r>42</r>");
}

#[test]
fn global_params_and_overrides() {
    let sheet_src = wrap(
        r#"
        <xsl:param name="who" select="'nobody'"/>
        <xsl:template match="/"><r><xsl:value-of select="$who"/></r></xsl:template>
    "#,
    );
    let arena = Rc::new(RefCell::new(Arena::new()));
    let sheet = Stylesheet::load_str(arena.clone(), &sheet_src, ".").unwrap();
    sheet.define_param("who", "'someone'").unwrap();
    let doc = arena.borrow_mut().parse_str("<any/>").unwrap();
    let result = sheet.transform(doc).unwrap();
    let output = Output {
        omit_prolog: true,
        ..Output::default()
    };
    assert_eq!(
        arena.borrow().serialize_to_string(result, &output).unwrap(),
        "<r>someone</r>"
    );
}

#[test]
fn where_populated_drops_empty_content() {
    let body = r#"
        <xsl:template match="/"><out>
            <xsl:where-populated><wrap><xsl:value-of select="//missing"/></wrap></xsl:where-populated>
            <xsl:where-populated><wrap><xsl:value-of select="//item[1]"/></wrap></xsl:where-populated>
        </out></xsl:template>
    "#;
    // the first wrap holds only an empty text and is dropped
    let result = transform(body, SAMPLE).unwrap();
    assert_eq!(result.matches("<wrap>").count(), 1);
    assert!(result.contains("<wrap>foo</wrap>"));
}

#[test]
fn on_empty_fires_when_nothing_was_built() {
    let body = r#"
        <xsl:template match="/"><out>
            <xsl:apply-templates select="//missing"/>
            <xsl:on-empty><fallback/></xsl:on-empty>
        </out></xsl:template>
    "#;
    assert_eq!(transform(body, SAMPLE).unwrap(), "<out><fallback/></out>");
}

#[test]
fn sequence_returns_verbatim() {
    let body = r#"
        <xsl:template match="/"><out><xsl:sequence select="1 to 3"/></out></xsl:template>
    "#;
    // adjacent atomics join with single spaces
    assert_eq!(transform(body, "<any/>").unwrap(), "<out>1 2 3</out>");
}

#[test]
fn current_differs_from_dot() {
    let body = r#"
        <xsl:template match="/"><out><xsl:for-each select="//item[@id = 'fst']">
            <v><xsl:value-of select="//item[. = 'qux']/concat(current()/@id, ':', @id)"/></v>
        </xsl:for-each></out></xsl:template>
    "#;
    assert_eq!(transform(body, SAMPLE).unwrap(), "<out><v>fst:nest</v></out>");
}

#[test]
fn imports_have_lower_precedence() {
    let dir = std::env::temp_dir().join(format!("angle-xslt-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let imported = wrap(
        r#"
        <xsl:template match="item"><base><xsl:value-of select="."/></base></xsl:template>
        <xsl:template match="/"><imported-root/></xsl:template>
    "#,
    );
    std::fs::write(dir.join("base.xsl"), imported).unwrap();
    let main = wrap(
        r#"
        <xsl:import href="base.xsl"/>
        <xsl:template match="/"><out><xsl:apply-templates select="//item[1]"/></out></xsl:template>
    "#,
    );
    let main_path = dir.join("main.xsl");
    std::fs::write(&main_path, main).unwrap();

    let arena = Rc::new(RefCell::new(Arena::new()));
    let sheet = Stylesheet::load(arena.clone(), &main_path, None).unwrap();
    let doc = arena.borrow_mut().parse_str(SAMPLE).unwrap();
    let result = sheet.transform(doc).unwrap();
    let output = Output {
        omit_prolog: true,
        ..Output::default()
    };
    // the main sheet's root template wins; the imported item template is
    // still reachable through apply-templates
    assert_eq!(
        arena.borrow().serialize_to_string(result, &output).unwrap(),
        "<out><base>foo</base></out>"
    );
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn strip_space_removes_formatting_text() {
    let sheet = wrap(
        r#"
        <xsl:strip-space elements="r"/>
        <xsl:template match="/"><n><xsl:value-of select="count(/r/text())"/></n></xsl:template>
    "#,
    );
    let result = transform_full(&sheet, "<r>\n  <a/>\n  <b/>\n</r>").unwrap();
    assert_eq!(result, "<n>0</n>");
}
