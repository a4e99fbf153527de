use angle_xml::{Namespaces, QName};
use angle_xpath_lexer::{lexer, Span, Token};
use rust_decimal::prelude::ToPrimitive;

use crate::ast::{Axis, BinaryOp, Binding, Expr, KindTest, Occurrence, SchemaType};
use crate::error::{SyntaxError, XPST0003, XPST0008, XPST0051, XQST0039};

type Result<T> = std::result::Result<T, SyntaxError>;

/// Binding powers, loosest first. The parse loop continues while the next
/// operator binds tighter than the current power.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Power {
    Lowest,
    Or,
    And,
    Cast,
    InstanceOf,
    Identity,
    Range,
    Equality,
    Comparison,
    Concat,
    Intersect,
    Union,
    Additive,
    Multiplicative,
    Negate,
    Step,
    Arrow,
    Postfix,
}

/// Compile an XPath expression.
///
/// Prefixes in name tests, variable references, function calls and type
/// names are resolved against `namespaces` here; an unknown prefix fails
/// compilation with `XPST0008`.
pub fn parse(source: &str, namespaces: &Namespaces) -> Result<Expr> {
    let mut parser = Parser::new(source, namespaces)?;
    let expr = parser.parse_comma_sequence()?;
    if let Some((token, span)) = parser.peek_spanned() {
        return Err(SyntaxError::new(
            XPST0003,
            format!("unexpected token {}", token),
            span,
        ));
    }
    Ok(expr)
}

pub(crate) struct Parser<'a> {
    tokens: Vec<(Token<'a>, Span)>,
    pos: usize,
    namespaces: &'a Namespaces,
    end: usize,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(source: &'a str, namespaces: &'a Namespaces) -> Result<Self> {
        let mut tokens = Vec::new();
        for (token, span) in lexer(source) {
            match token {
                Ok(token) => tokens.push((token, span)),
                Err(()) => {
                    return Err(SyntaxError::new(XPST0003, "malformed token", span));
                }
            }
        }
        Ok(Parser {
            tokens,
            pos: 0,
            namespaces,
            end: source.len(),
        })
    }

    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token<'a>> {
        self.tokens.get(self.pos + offset).map(|(t, _)| t)
    }

    fn peek_spanned(&self) -> Option<(Token<'a>, Span)> {
        self.tokens.get(self.pos).cloned()
    }

    fn here(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|(_, s)| s.clone())
            .unwrap_or(self.end..self.end)
    }

    fn advance(&mut self) -> Option<(Token<'a>, Span)> {
        let entry = self.tokens.get(self.pos).cloned();
        if entry.is_some() {
            self.pos += 1;
        }
        entry
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected {}", token)))
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if let Some(Token::NCName(name)) = self.peek() {
            if *name == word {
                self.pos += 1;
                return true;
            }
        }
        false
    }

    fn expect_word(&mut self, word: &str) -> Result<()> {
        if self.eat_word(word) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected '{}'", word)))
        }
    }

    fn unexpected(&self, message: &str) -> SyntaxError {
        let found = match self.peek() {
            Some(token) => format!("{}, found {}", message, token),
            None => format!("{}, found end of input", message),
        };
        SyntaxError::new(XPST0003, found, self.here())
    }

    /// Two neighbouring tokens with no whitespace between them; this is how
    /// `a:b` (one QName) is told apart from `a : b` (three tokens).
    fn adjacent(&self, offset: usize) -> bool {
        match (
            self.tokens.get(self.pos + offset),
            self.tokens.get(self.pos + offset + 1),
        ) {
            (Some((_, a)), Some((_, b))) => a.end == b.start,
            _ => false,
        }
    }

    /// `expr (, expr)*` — a sequence when more than one member.
    pub(crate) fn parse_comma_sequence(&mut self) -> Result<Expr> {
        let first = self.parse_expr(Power::Lowest)?;
        if self.peek() != Some(&Token::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            items.push(self.parse_expr(Power::Lowest)?);
        }
        Ok(Expr::Sequence(items))
    }

    pub(crate) fn parse_expr(&mut self, power: Power) -> Result<Expr> {
        let mut left = self.parse_prefix()?;
        while let Some(next) = self.infix_power() {
            if next <= power {
                break;
            }
            left = self.parse_infix(left)?;
        }
        Ok(left)
    }

    fn infix_power(&self) -> Option<Power> {
        let power = match self.peek()? {
            Token::NCName(word) => match *word {
                "or" => Power::Or,
                "and" => Power::And,
                "cast" | "castable" => Power::Cast,
                "instance" => Power::InstanceOf,
                "is" => Power::Identity,
                "to" => Power::Range,
                "eq" | "ne" => Power::Equality,
                "lt" | "le" | "gt" | "ge" => Power::Comparison,
                "div" | "mod" => Power::Multiplicative,
                "intersect" | "except" => Power::Intersect,
                "union" => Power::Union,
                _ => return None,
            },
            Token::Equal | Token::NotEqual => Power::Equality,
            Token::LessThan
            | Token::LessThanEqual
            | Token::GreaterThan
            | Token::GreaterThanEqual => Power::Comparison,
            Token::Precedes | Token::Follows => Power::Identity,
            Token::DoublePipe => Power::Concat,
            Token::Pipe => Power::Union,
            Token::Plus | Token::Minus => Power::Additive,
            Token::Asterisk => Power::Multiplicative,
            Token::Slash | Token::DoubleSlash | Token::ExclamationMark => Power::Step,
            Token::Arrow => Power::Arrow,
            Token::LeftBracket | Token::LeftParen => Power::Postfix,
            _ => return None,
        };
        Some(power)
    }

    fn parse_infix(&mut self, left: Expr) -> Result<Expr> {
        let Some((token, _span)) = self.advance() else {
            return Err(self.unexpected("expected an operator"));
        };
        let expr = match token {
            Token::Slash | Token::ExclamationMark => Expr::Step {
                curr: Box::new(left),
                next: Box::new(self.parse_expr(Power::Step)?),
            },
            Token::DoubleSlash => {
                let descend = Expr::Step {
                    curr: Box::new(left),
                    next: Box::new(Expr::Axis {
                        axis: Axis::DescendantOrSelf,
                        next: Box::new(Expr::Kind(KindTest::Node)),
                    }),
                };
                Expr::Step {
                    curr: Box::new(descend),
                    next: Box::new(self.parse_expr(Power::Step)?),
                }
            }
            Token::Plus => self.binary(BinaryOp::Add, left, Power::Additive)?,
            Token::Minus => self.binary(BinaryOp::Sub, left, Power::Additive)?,
            Token::Asterisk => self.binary(BinaryOp::Mul, left, Power::Multiplicative)?,
            Token::Equal => self.binary(BinaryOp::Eq, left, Power::Equality)?,
            Token::NotEqual => self.binary(BinaryOp::Ne, left, Power::Equality)?,
            Token::LessThan => self.binary(BinaryOp::Lt, left, Power::Comparison)?,
            Token::LessThanEqual => self.binary(BinaryOp::Le, left, Power::Comparison)?,
            Token::GreaterThan => self.binary(BinaryOp::Gt, left, Power::Comparison)?,
            Token::GreaterThanEqual => self.binary(BinaryOp::Ge, left, Power::Comparison)?,
            Token::Precedes => self.binary(BinaryOp::Precedes, left, Power::Identity)?,
            Token::Follows => self.binary(BinaryOp::Follows, left, Power::Identity)?,
            Token::DoublePipe => self.binary(BinaryOp::Concat, left, Power::Concat)?,
            Token::Pipe => Expr::Union {
                left: Box::new(left),
                right: Box::new(self.parse_expr(Power::Union)?),
            },
            Token::Arrow => self.parse_arrow(left)?,
            Token::LeftBracket => self.parse_predicate(left)?,
            Token::LeftParen => self.parse_subscript_call(left)?,
            Token::NCName(word) => match word {
                "or" => self.binary(BinaryOp::Or, left, Power::Or)?,
                "and" => self.binary(BinaryOp::And, left, Power::And)?,
                "eq" => self.binary(BinaryOp::ValueEq, left, Power::Equality)?,
                "ne" => self.binary(BinaryOp::ValueNe, left, Power::Equality)?,
                "lt" => self.binary(BinaryOp::ValueLt, left, Power::Comparison)?,
                "le" => self.binary(BinaryOp::ValueLe, left, Power::Comparison)?,
                "gt" => self.binary(BinaryOp::ValueGt, left, Power::Comparison)?,
                "ge" => self.binary(BinaryOp::ValueGe, left, Power::Comparison)?,
                "div" => self.binary(BinaryOp::Div, left, Power::Multiplicative)?,
                "mod" => self.binary(BinaryOp::Mod, left, Power::Multiplicative)?,
                "to" => Expr::Range {
                    from: Box::new(left),
                    to: Box::new(self.parse_expr(Power::Range)?),
                },
                "is" => Expr::Identity {
                    left: Box::new(left),
                    right: Box::new(self.parse_expr(Power::Identity)?),
                },
                "union" => Expr::Union {
                    left: Box::new(left),
                    right: Box::new(self.parse_expr(Power::Union)?),
                },
                "intersect" => Expr::Intersect {
                    left: Box::new(left),
                    right: Box::new(self.parse_expr(Power::Intersect)?),
                },
                "except" => Expr::Except {
                    left: Box::new(left),
                    right: Box::new(self.parse_expr(Power::Intersect)?),
                },
                "cast" => {
                    self.expect_word("as")?;
                    let (target, allow_empty) = self.parse_single_type()?;
                    Expr::Cast {
                        expr: Box::new(left),
                        target,
                        allow_empty,
                    }
                }
                "castable" => {
                    self.expect_word("as")?;
                    let (target, allow_empty) = self.parse_single_type()?;
                    Expr::Castable {
                        expr: Box::new(left),
                        target,
                        allow_empty,
                    }
                }
                "instance" => {
                    self.expect_word("of")?;
                    let (types, occurrence) = self.parse_sequence_type()?;
                    Expr::InstanceOf {
                        expr: Box::new(left),
                        types,
                        occurrence,
                    }
                }
                _ => return Err(self.unexpected("expected an operator")),
            },
            _ => return Err(self.unexpected("expected an operator")),
        };
        Ok(expr)
    }

    fn binary(&mut self, op: BinaryOp, left: Expr, power: Power) -> Result<Expr> {
        Ok(Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(self.parse_expr(power)?),
        })
    }

    /// `left => f(args)` lowers to `f(left, args)` right here; the arrow
    /// never reaches the AST.
    fn parse_arrow(&mut self, left: Expr) -> Result<Expr> {
        let name = self.parse_qname()?;
        self.expect(Token::LeftParen)?;
        let mut args = vec![left];
        if !self.eat(&Token::RightParen) {
            loop {
                args.push(self.parse_expr(Power::Lowest)?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(Token::RightParen)?;
        }
        Ok(Expr::Call { name, args })
    }

    fn parse_predicate(&mut self, left: Expr) -> Result<Expr> {
        let inner = self.parse_comma_sequence()?;
        self.expect(Token::RightBracket)?;
        // a literal numeric predicate is a subscript, anything else filters
        // by effective boolean value at evaluation time
        let expr = if matches!(inner, Expr::Number(_)) {
            Expr::Subscript {
                expr: Box::new(left),
                index: Box::new(inner),
            }
        } else {
            Expr::Filter {
                expr: Box::new(left),
                predicate: Box::new(inner),
            }
        };
        Ok(expr)
    }

    fn parse_subscript_call(&mut self, left: Expr) -> Result<Expr> {
        let index = self.parse_expr(Power::Lowest)?;
        self.expect(Token::RightParen)?;
        Ok(Expr::Subscript {
            expr: Box::new(left),
            index: Box::new(index),
        })
    }

    fn parse_prefix(&mut self) -> Result<Expr> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.unexpected("expected an expression"));
        };
        match token {
            Token::IntegerLiteral(i) => {
                self.advance();
                Ok(Expr::Number(i as f64))
            }
            Token::DecimalLiteral(d) => {
                self.advance();
                Ok(Expr::Number(d.to_f64().unwrap_or(f64::NAN)))
            }
            Token::DoubleLiteral(d) => {
                self.advance();
                Ok(Expr::Number(d))
            }
            Token::StringLiteral(s) => {
                self.advance();
                Ok(Expr::Literal(s))
            }
            Token::Dollar => {
                self.advance();
                Ok(Expr::Variable(self.parse_qname()?))
            }
            Token::Dot => {
                self.advance();
                Ok(Expr::Current)
            }
            Token::DotDot => {
                self.advance();
                Ok(Expr::Axis {
                    axis: Axis::Parent,
                    next: Box::new(Expr::Kind(KindTest::Node)),
                })
            }
            Token::At => {
                self.advance();
                Ok(Expr::Attr(self.parse_test_name(true)?))
            }
            Token::Asterisk => {
                self.advance();
                Ok(Expr::Wildcard)
            }
            Token::AsteriskColon => {
                self.advance();
                let Some(Token::NCName(local)) = self.peek().cloned() else {
                    return Err(self.unexpected("expected a local name after '*:'"));
                };
                self.advance();
                Ok(Expr::Name(QName {
                    local: local.to_string(),
                    prefix: None,
                    uri: Some("*".to_string()),
                }))
            }
            Token::Slash => {
                self.advance();
                if self.starts_step() {
                    Ok(Expr::Step {
                        curr: Box::new(Expr::Root),
                        next: Box::new(self.parse_expr(Power::Step)?),
                    })
                } else {
                    Ok(Expr::Root)
                }
            }
            Token::DoubleSlash => {
                self.advance();
                let descend = Expr::Step {
                    curr: Box::new(Expr::Root),
                    next: Box::new(Expr::Axis {
                        axis: Axis::DescendantOrSelf,
                        next: Box::new(Expr::Kind(KindTest::Node)),
                    }),
                };
                Ok(Expr::Step {
                    curr: Box::new(descend),
                    next: Box::new(self.parse_expr(Power::Step)?),
                })
            }
            Token::LeftParen => {
                self.advance();
                if self.eat(&Token::RightParen) {
                    return Ok(Expr::Sequence(Vec::new()));
                }
                let expr = self.parse_comma_sequence()?;
                self.expect(Token::RightParen)?;
                Ok(expr)
            }
            Token::LeftBracket => {
                self.advance();
                let mut items = Vec::new();
                if !self.eat(&Token::RightBracket) {
                    loop {
                        items.push(self.parse_expr(Power::Lowest)?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                    self.expect(Token::RightBracket)?;
                }
                Ok(Expr::Array(items))
            }
            Token::Minus => {
                self.advance();
                Ok(Expr::Reverse(Box::new(self.parse_expr(Power::Negate)?)))
            }
            Token::Plus => {
                self.advance();
                self.parse_expr(Power::Negate)
            }
            Token::NCName(word) => self.parse_name_prefix(word),
            _ => Err(self.unexpected("expected an expression")),
        }
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(
                Token::NCName(_)
                    | Token::Asterisk
                    | Token::AsteriskColon
                    | Token::At
                    | Token::Dot
                    | Token::DotDot
            )
        )
    }

    fn parse_name_prefix(&mut self, word: &'a str) -> Result<Expr> {
        // reserved constructs first; all of them need their marker token
        // right behind the word, otherwise the word is a plain name test
        match word {
            "if" if self.peek_at(1) == Some(&Token::LeftParen) => return self.parse_if(),
            "let" if self.peek_at(1) == Some(&Token::Dollar) => return self.parse_let(),
            "for" if self.peek_at(1) == Some(&Token::Dollar) => return self.parse_for(),
            "some" | "every" if self.peek_at(1) == Some(&Token::Dollar) => {
                return self.parse_quantified(word == "every")
            }
            "map" if self.peek_at(1) == Some(&Token::LeftBrace) => return self.parse_map(),
            "array" if self.peek_at(1) == Some(&Token::LeftBrace) => {
                return self.parse_array_constructor()
            }
            _ => {}
        }
        if self.peek_at(1) == Some(&Token::DoubleColon) {
            if let Some(axis) = Axis::from_name(word) {
                self.advance();
                self.advance();
                let test = self.parse_node_test(axis == Axis::Attribute)?;
                return Ok(Expr::Axis {
                    axis,
                    next: Box::new(test),
                });
            }
            return Err(self.unexpected("unknown axis"));
        }
        self.parse_node_test(false)
    }

    /// A node test: kind test, wildcard or (possibly prefixed) name; a name
    /// directly followed by `(` is a function call instead.
    fn parse_node_test(&mut self, attribute: bool) -> Result<Expr> {
        match self.peek().cloned() {
            Some(Token::Asterisk) => {
                self.advance();
                Ok(Expr::Wildcard)
            }
            Some(Token::AsteriskColon) => {
                self.advance();
                let Some(Token::NCName(local)) = self.peek().cloned() else {
                    return Err(self.unexpected("expected a local name after '*:'"));
                };
                self.advance();
                Ok(Expr::Name(QName {
                    local: local.to_string(),
                    prefix: None,
                    uri: Some("*".to_string()),
                }))
            }
            Some(Token::NCName(word)) => {
                if self.is_kind_test(word) {
                    self.advance();
                    self.advance();
                    return self.parse_kind_test(word);
                }
                let name = self.parse_test_name(attribute)?;
                if self.peek() == Some(&Token::LeftParen) {
                    self.advance();
                    return self.parse_call(name);
                }
                Ok(Expr::Name(name))
            }
            _ => Err(self.unexpected("expected a node test")),
        }
    }

    fn is_kind_test(&self, word: &str) -> bool {
        matches!(
            word,
            "node"
                | "text"
                | "comment"
                | "element"
                | "attribute"
                | "processing-instruction"
                | "document-node"
        ) && self.peek_at(1) == Some(&Token::LeftParen)
    }

    fn parse_kind_test(&mut self, word: &'a str) -> Result<Expr> {
        let kind = match word {
            "node" => {
                self.expect(Token::RightParen)?;
                KindTest::Node
            }
            "text" => {
                self.expect(Token::RightParen)?;
                KindTest::Text
            }
            "comment" => {
                self.expect(Token::RightParen)?;
                KindTest::Comment
            }
            "document-node" => {
                self.expect(Token::RightParen)?;
                KindTest::Document
            }
            "element" => {
                let name = self.parse_optional_test_name(false)?;
                self.expect(Token::RightParen)?;
                KindTest::Element(name)
            }
            "attribute" => {
                let name = self.parse_optional_test_name(true)?;
                self.expect(Token::RightParen)?;
                KindTest::Attribute(name)
            }
            "processing-instruction" => {
                let target = match self.peek().cloned() {
                    Some(Token::StringLiteral(s)) => {
                        self.advance();
                        Some(s)
                    }
                    Some(Token::NCName(name)) => {
                        self.advance();
                        Some(name.to_string())
                    }
                    _ => None,
                };
                self.expect(Token::RightParen)?;
                KindTest::ProcessingInstruction(target)
            }
            _ => return Err(self.unexpected("unknown kind test")),
        };
        Ok(Expr::Kind(kind))
    }

    fn parse_optional_test_name(&mut self, attribute: bool) -> Result<Option<QName>> {
        match self.peek() {
            Some(Token::RightParen) => Ok(None),
            Some(Token::Asterisk) => {
                self.advance();
                Ok(Some(QName::new("*")))
            }
            _ => Ok(Some(self.parse_test_name(attribute)?)),
        }
    }

    /// A name test, `prefix:local`, `local` or `prefix:*`, resolved.
    /// Unprefixed element tests pick up the default element namespace;
    /// attribute tests never do.
    fn parse_test_name(&mut self, attribute: bool) -> Result<QName> {
        if self.eat(&Token::Asterisk) {
            return Ok(QName::new("*"));
        }
        let span = self.here();
        let Some(Token::NCName(first)) = self.peek().cloned() else {
            return Err(self.unexpected("expected a name"));
        };
        if self.adjacent(0) && self.peek_at(1) == Some(&Token::ColonAsterisk) {
            self.advance();
            self.advance();
            let uri = self.resolve_prefix(first, span)?;
            return Ok(QName {
                local: "*".to_string(),
                prefix: Some(first.to_string()),
                uri: Some(uri),
            });
        }
        if self.adjacent(0)
            && self.peek_at(1) == Some(&Token::Colon)
            && self.adjacent(1)
            && matches!(self.peek_at(2), Some(Token::NCName(_)))
        {
            self.advance();
            self.advance();
            let Some((Token::NCName(local), _)) = self.advance() else {
                return Err(self.unexpected("expected a name"));
            };
            let uri = self.resolve_prefix(first, span)?;
            return Ok(QName {
                local: local.to_string(),
                prefix: Some(first.to_string()),
                uri: Some(uri),
            });
        }
        self.advance();
        let uri = if attribute {
            None
        } else {
            self.namespaces
                .default_element_namespace()
                .map(|s| s.to_string())
        };
        Ok(QName {
            local: first.to_string(),
            prefix: None,
            uri,
        })
    }

    /// A QName for variables, functions and types: no wildcard, no default
    /// namespace applied.
    fn parse_qname(&mut self) -> Result<QName> {
        let span = self.here();
        let Some(Token::NCName(first)) = self.peek().cloned() else {
            return Err(self.unexpected("expected a name"));
        };
        if self.adjacent(0)
            && self.peek_at(1) == Some(&Token::Colon)
            && self.adjacent(1)
            && matches!(self.peek_at(2), Some(Token::NCName(_)))
        {
            self.advance();
            self.advance();
            let Some((Token::NCName(local), _)) = self.advance() else {
                return Err(self.unexpected("expected a name"));
            };
            let uri = self.resolve_prefix(first, span)?;
            return Ok(QName {
                local: local.to_string(),
                prefix: Some(first.to_string()),
                uri: Some(uri),
            });
        }
        self.advance();
        Ok(QName::new(first))
    }

    fn resolve_prefix(&self, prefix: &str, span: Span) -> Result<String> {
        self.namespaces
            .resolve(prefix)
            .map(|uri| uri.to_string())
            .ok_or_else(|| {
                SyntaxError::new(XPST0008, format!("undefined prefix '{}'", prefix), span)
            })
    }

    fn parse_call(&mut self, name: QName) -> Result<Expr> {
        let mut args = Vec::new();
        if !self.eat(&Token::RightParen) {
            loop {
                args.push(self.parse_expr(Power::Lowest)?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(Token::RightParen)?;
        }
        Ok(Expr::Call { name, args })
    }

    fn parse_if(&mut self) -> Result<Expr> {
        self.advance();
        self.expect(Token::LeftParen)?;
        let test = self.parse_comma_sequence()?;
        self.expect(Token::RightParen)?;
        self.expect_word("then")?;
        let then = self.parse_expr(Power::Lowest)?;
        self.expect_word("else")?;
        let alt = self.parse_expr(Power::Lowest)?;
        Ok(Expr::If {
            test: Box::new(test),
            then: Box::new(then),
            alt: Box::new(alt),
        })
    }

    fn parse_bindings(&mut self, separator: &str) -> Result<Vec<Binding>> {
        let mut bindings: Vec<Binding> = Vec::new();
        loop {
            let span = self.here();
            self.expect(Token::Dollar)?;
            let name = self.parse_qname()?;
            if bindings.iter().any(|b| b.name == name) {
                return Err(SyntaxError::new(
                    XQST0039,
                    format!("duplicate binding for ${}", name),
                    span,
                ));
            }
            self.expect_word(separator)?;
            let expr = self.parse_expr(Power::Lowest)?;
            bindings.push(Binding { name, expr });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(bindings)
    }

    fn parse_let(&mut self) -> Result<Expr> {
        self.advance();
        let bindings = self.parse_let_bindings()?;
        self.expect_word("return")?;
        let body = self.parse_expr(Power::Lowest)?;
        Ok(Expr::Let {
            bindings,
            body: Box::new(body),
        })
    }

    fn parse_let_bindings(&mut self) -> Result<Vec<Binding>> {
        let mut bindings: Vec<Binding> = Vec::new();
        loop {
            let span = self.here();
            self.expect(Token::Dollar)?;
            let name = self.parse_qname()?;
            if bindings.iter().any(|b| b.name == name) {
                return Err(SyntaxError::new(
                    XQST0039,
                    format!("duplicate binding for ${}", name),
                    span,
                ));
            }
            self.expect(Token::ColonEqual)?;
            let expr = self.parse_expr(Power::Lowest)?;
            bindings.push(Binding { name, expr });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(bindings)
    }

    fn parse_for(&mut self) -> Result<Expr> {
        self.advance();
        let bindings = self.parse_bindings("in")?;
        self.expect_word("return")?;
        let body = self.parse_expr(Power::Lowest)?;
        Ok(Expr::For {
            bindings,
            body: Box::new(body),
        })
    }

    fn parse_quantified(&mut self, every: bool) -> Result<Expr> {
        self.advance();
        let bindings = self.parse_bindings("in")?;
        self.expect_word("satisfies")?;
        let test = self.parse_expr(Power::Lowest)?;
        Ok(Expr::Quantified {
            every,
            bindings,
            test: Box::new(test),
        })
    }

    fn parse_map(&mut self) -> Result<Expr> {
        self.advance();
        self.expect(Token::LeftBrace)?;
        let mut entries = Vec::new();
        if !self.eat(&Token::RightBrace) {
            loop {
                let key = self.parse_expr(Power::Lowest)?;
                self.expect(Token::Colon)?;
                let value = self.parse_expr(Power::Lowest)?;
                entries.push((key, value));
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(Token::RightBrace)?;
        }
        Ok(Expr::Map(entries))
    }

    fn parse_array_constructor(&mut self) -> Result<Expr> {
        self.advance();
        self.expect(Token::LeftBrace)?;
        let mut items = Vec::new();
        if !self.eat(&Token::RightBrace) {
            loop {
                items.push(self.parse_expr(Power::Lowest)?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(Token::RightBrace)?;
        }
        Ok(Expr::Array(items))
    }

    fn parse_type_name(&mut self) -> Result<SchemaType> {
        let span = self.here();
        let name = self.parse_qname()?;
        SchemaType::from_local(&name.local).ok_or_else(|| {
            SyntaxError::new(XPST0051, format!("unknown type {}", name), span)
        })
    }

    /// `xs:type` with an optional trailing `?` meaning the empty sequence
    /// is acceptable.
    fn parse_single_type(&mut self) -> Result<(SchemaType, bool)> {
        let target = self.parse_type_name()?;
        let allow_empty = self.eat(&Token::QuestionMark);
        Ok((target, allow_empty))
    }

    fn parse_sequence_type(&mut self) -> Result<(Vec<SchemaType>, Occurrence)> {
        let mut types = Vec::new();
        if self.eat(&Token::LeftParen) {
            loop {
                types.push(self.parse_type_name()?);
                if !self.eat(&Token::Pipe) {
                    break;
                }
            }
            self.expect(Token::RightParen)?;
        } else {
            types.push(self.parse_type_name()?);
        }
        let occurrence = if self.eat(&Token::QuestionMark) {
            Occurrence::ZeroOrOne
        } else if self.eat(&Token::Asterisk) {
            Occurrence::ZeroOrMore
        } else if self.eat(&Token::Plus) {
            Occurrence::OneOrMore
        } else {
            Occurrence::One
        };
        Ok((types, occurrence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(source: &str) -> Result<Expr> {
        let namespaces = Namespaces::new();
        parse(source, &namespaces)
    }

    fn ok(source: &str) -> Expr {
        parse_str(source).unwrap()
    }

    #[test]
    fn parse_root_path() {
        let expr = ok("/root/item");
        let Expr::Step { curr, next } = expr else {
            panic!("expected step");
        };
        assert_eq!(*next, Expr::Name(QName::new("item")));
        let Expr::Step { curr, next } = *curr else {
            panic!("expected inner step");
        };
        assert_eq!(*curr, Expr::Root);
        assert_eq!(*next, Expr::Name(QName::new("root")));
    }

    #[test]
    fn double_slash_desugars() {
        let expr = ok("//item");
        let Expr::Step { curr, next } = expr else {
            panic!("expected step");
        };
        assert_eq!(*next, Expr::Name(QName::new("item")));
        let Expr::Step { curr, next } = *curr else {
            panic!("expected descendant step");
        };
        assert_eq!(*curr, Expr::Root);
        assert_eq!(
            *next,
            Expr::Axis {
                axis: Axis::DescendantOrSelf,
                next: Box::new(Expr::Kind(KindTest::Node)),
            }
        );
    }

    #[test]
    fn precedence_or_and() {
        let expr = ok("1 or 2 and 3");
        let Expr::Binary { op, right, .. } = expr else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Or);
        let Expr::Binary { op, .. } = *right else {
            panic!("expected nested and");
        };
        assert_eq!(op, BinaryOp::And);
    }

    #[test]
    fn precedence_additive_multiplicative() {
        let expr = ok("1 + 2 * 3");
        let Expr::Binary { op, right, .. } = expr else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(
            *right,
            Expr::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn numeric_predicate_is_subscript() {
        let expr = ok("item[1]");
        assert!(matches!(expr, Expr::Subscript { .. }));
        let expr = ok("item[@id]");
        assert!(matches!(expr, Expr::Filter { .. }));
    }

    #[test]
    fn arrow_lowering() {
        let expr = ok("'foo' => upper-case()");
        let Expr::Call { name, args } = expr else {
            panic!("expected call");
        };
        assert_eq!(name.local, "upper-case");
        assert_eq!(args, vec![Expr::Literal("foo".to_string())]);
    }

    #[test]
    fn arrow_chain() {
        let expr = ok("'foo' => upper-case() => replace('FOO', 'bar')");
        let Expr::Call { name, args } = expr else {
            panic!("expected call");
        };
        assert_eq!(name.local, "replace");
        assert_eq!(args.len(), 3);
        assert!(matches!(&args[0], Expr::Call { name, .. } if name.local == "upper-case"));
    }

    #[test]
    fn parse_let_with_bindings() {
        let expr = ok("let $x := 1, $y := $x + 3 return $y");
        let Expr::Let { bindings, .. } = expr else {
            panic!("expected let");
        };
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].name, QName::new("x"));
    }

    #[test]
    fn duplicate_let_binding_rejected() {
        let err = parse_str("let $x := 1, $x := 2 return $x").unwrap_err();
        assert_eq!(err.code, XQST0039);
    }

    #[test]
    fn parse_quantified() {
        let expr = ok("some $x in (1, 2, 13) satisfies $x > 10");
        let Expr::Quantified { every, .. } = expr else {
            panic!("expected quantified");
        };
        assert!(!every);
    }

    #[test]
    fn parse_axes() {
        let expr = ok("ancestor-or-self::div");
        let Expr::Axis { axis, next } = expr else {
            panic!("expected axis");
        };
        assert_eq!(axis, Axis::AncestorOrSelf);
        assert_eq!(*next, Expr::Name(QName::new("div")));
    }

    #[test]
    fn word_operators_are_contextual() {
        // "div" as a name test and as an operator in one expression
        let expr = ok("div div div");
        let Expr::Binary { op, left, right } = expr else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Div);
        assert_eq!(*left, Expr::Name(QName::new("div")));
        assert_eq!(*right, Expr::Name(QName::new("div")));
    }

    #[test]
    fn parse_cast_and_castable() {
        let expr = ok("'1' cast as xs:integer");
        assert!(matches!(
            expr,
            Expr::Cast {
                target: SchemaType::Integer,
                allow_empty: false,
                ..
            }
        ));
        let expr = ok("'1' castable as xs:date?");
        assert!(matches!(
            expr,
            Expr::Castable {
                target: SchemaType::Date,
                allow_empty: true,
                ..
            }
        ));
    }

    #[test]
    fn parse_instance_of() {
        let expr = ok("(1, 2) instance of xs:integer+");
        let Expr::InstanceOf {
            types, occurrence, ..
        } = expr
        else {
            panic!("expected instance-of");
        };
        assert_eq!(types, vec![SchemaType::Integer]);
        assert_eq!(occurrence, Occurrence::OneOrMore);
    }

    #[test]
    fn unknown_type_rejected() {
        let err = parse_str("1 cast as xs:unknown").unwrap_err();
        assert_eq!(err.code, XPST0051);
    }

    #[test]
    fn undefined_prefix_rejected() {
        let err = parse_str("foo:bar").unwrap_err();
        assert_eq!(err.code, XPST0008);
    }

    #[test]
    fn prefixed_name_needs_adjacency() {
        // spaced colon is not a QName; inside a map it separates key from value
        let expr = ok("map { a : 'x' }");
        let Expr::Map(entries) = expr else {
            panic!("expected map");
        };
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, Expr::Name(QName::new("a")));
    }

    #[test]
    fn parse_kind_tests() {
        assert_eq!(ok("text()"), Expr::Kind(KindTest::Text));
        assert_eq!(
            ok("processing-instruction('pi')"),
            Expr::Kind(KindTest::ProcessingInstruction(Some("pi".to_string())))
        );
        assert_eq!(
            ok("element(item)"),
            Expr::Kind(KindTest::Element(Some(QName::new("item"))))
        );
    }

    #[test]
    fn parse_union_intersect_except() {
        let expr = ok("a | b intersect c");
        // union binds tighter than intersect
        let Expr::Intersect { left, .. } = expr else {
            panic!("expected intersect at the top");
        };
        assert!(matches!(*left, Expr::Union { .. }));
    }

    #[test]
    fn trailing_tokens_rejected() {
        let err = parse_str("1 2").unwrap_err();
        assert_eq!(err.code, XPST0003);
    }

    #[test]
    fn empty_sequence_literal() {
        assert_eq!(ok("()"), Expr::Sequence(Vec::new()));
    }

    #[test]
    fn printer_round_trips() {
        for source in [
            "/root/item[2]",
            "//item[@id = 'fst']",
            "1 + 2 * 3",
            "let $x := 1 return $x + 2",
            "for $i in 1 to 5 return $i",
            "some $x in (1, 2, 13) satisfies $x > 10",
            "'foo' => upper-case() => replace('FOO', 'bar')",
            "'1' cast as xs:integer",
            "(1, 2) instance of xs:integer+",
            "ancestor-or-self::div[@class]",
            "a | b intersect c",
            "if (@a) then 1 else 2",
            "map { 'k' : 1, 'j' : 2 }",
            "[1, 2, 3]",
            "-(1 + 2)",
            "@lang",
            "..",
            "count(//item) > 2",
        ] {
            let first = ok(source);
            let rendered = first.to_string();
            let second = parse_str(&rendered)
                .unwrap_or_else(|e| panic!("re-parse of {:?} failed: {}", rendered, e));
            assert_eq!(first, second, "round trip of {:?} via {:?}", source, rendered);
        }
    }
}
