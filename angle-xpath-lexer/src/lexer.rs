use std::fmt;

use logos::{Logos, SpannedIter};
use rust_decimal::Decimal;

pub type Span = std::ops::Range<usize>;

#[derive(Logos, Clone, Debug, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(subpattern name_start_char_without_colon = r"[A-Za-z_\u{c0}-\u{d6}\u{d8}-\u{f6}\u{f8}-\u{2ff}\u{370}-\u{37d}\u{37f}-\u{1fff}\u{200c}-\u{200d}\u{2070}-\u{218f}\u{2c00}-\u{2fef}\u{3001}-\u{d7ff}\u{f900}-\u{fdfc}\u{fdf0}-\u{fffd}\u{10000}-\u{effff}]")]
#[logos(subpattern name_char_without_colon = r"(?&name_start_char_without_colon)|[\-\.0-9\u{b7}\u{300}-\u{36F}\u{203f}-\u{2040}]")]
#[logos(subpattern ncname = r"(?&name_start_char_without_colon)(?&name_char_without_colon)*")]
pub enum Token<'a> {
    #[regex(r"[0-9]+", integer_literal, priority = 3)]
    IntegerLiteral(i64),
    #[regex(r"(\.[0-9]+)|([0-9]+\.[0-9]*)", decimal_literal, priority = 2)]
    DecimalLiteral(Decimal),
    #[regex(
        r"(\.[0-9]+|[0-9]+(\.[0-9]*)?)([eE][+-]?[0-9]+)",
        double_literal,
        priority = 2
    )]
    DoubleLiteral(f64),
    #[regex(r#""(?:""|[^"])*"|'(?:''|[^'])*'"#, string_literal, priority = 1)]
    StringLiteral(String),
    // QNames are assembled by the parser; an ncname is all the lexer sees
    #[regex(r"(?&ncname)", priority = 2)]
    NCName(&'a str),

    #[token("!")]
    ExclamationMark,
    #[token("!=")]
    NotEqual,
    #[token("$")]
    Dollar,
    #[token("%")]
    Percent,
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("*")]
    Asterisk,
    #[token("*:")]
    AsteriskColon,
    #[token("+")]
    Plus,
    #[token(",")]
    Comma,
    #[token("-")]
    Minus,
    #[token(".")]
    Dot,
    #[token("..")]
    DotDot,
    #[token("/")]
    Slash,
    #[token("//")]
    DoubleSlash,
    #[token(":")]
    Colon,
    #[token(":*")]
    ColonAsterisk,
    #[token("::")]
    DoubleColon,
    #[token(":=")]
    ColonEqual,
    #[token("<")]
    LessThan,
    #[token("<<")]
    Precedes,
    #[token("<=")]
    LessThanEqual,
    #[token("=")]
    Equal,
    #[token("=>")]
    Arrow,
    #[token(">")]
    GreaterThan,
    #[token(">=")]
    GreaterThanEqual,
    #[token(">>")]
    Follows,
    #[token("?")]
    QuestionMark,
    #[token("@")]
    At,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
    #[token("{")]
    LeftBrace,
    #[token("|")]
    Pipe,
    #[token("||")]
    DoublePipe,
    #[token("}")]
    RightBrace,
}

fn integer_literal<'a>(lexer: &mut logos::Lexer<'a, Token<'a>>) -> Option<i64> {
    lexer.slice().parse().ok()
}

fn decimal_literal<'a>(lexer: &mut logos::Lexer<'a, Token<'a>>) -> Option<Decimal> {
    // "1." is legal XPath but not a legal decimal lexical form
    lexer.slice().trim_end_matches('.').parse().ok()
}

fn double_literal<'a>(lexer: &mut logos::Lexer<'a, Token<'a>>) -> Option<f64> {
    lexer.slice().parse().ok()
}

fn string_literal<'a>(lexer: &mut logos::Lexer<'a, Token<'a>>) -> Option<String> {
    let slice = lexer.slice();
    let quote = slice.chars().next()?;
    let inner = &slice[1..slice.len() - 1];
    let doubled: String = [quote, quote].iter().collect();
    Some(inner.replace(&doubled, &quote.to_string()))
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::IntegerLiteral(i) => write!(f, "{}", i),
            Token::DecimalLiteral(d) => write!(f, "{}", d),
            Token::DoubleLiteral(d) => write!(f, "{}", d),
            Token::StringLiteral(s) => write!(f, "'{}'", s),
            Token::NCName(name) => write!(f, "{}", name),
            Token::ExclamationMark => write!(f, "!"),
            Token::NotEqual => write!(f, "!="),
            Token::Dollar => write!(f, "$"),
            Token::Percent => write!(f, "%"),
            Token::LeftParen => write!(f, "("),
            Token::RightParen => write!(f, ")"),
            Token::Asterisk => write!(f, "*"),
            Token::AsteriskColon => write!(f, "*:"),
            Token::Plus => write!(f, "+"),
            Token::Comma => write!(f, ","),
            Token::Minus => write!(f, "-"),
            Token::Dot => write!(f, "."),
            Token::DotDot => write!(f, ".."),
            Token::Slash => write!(f, "/"),
            Token::DoubleSlash => write!(f, "//"),
            Token::Colon => write!(f, ":"),
            Token::ColonAsterisk => write!(f, ":*"),
            Token::DoubleColon => write!(f, "::"),
            Token::ColonEqual => write!(f, ":="),
            Token::LessThan => write!(f, "<"),
            Token::Precedes => write!(f, "<<"),
            Token::LessThanEqual => write!(f, "<="),
            Token::Equal => write!(f, "="),
            Token::Arrow => write!(f, "=>"),
            Token::GreaterThan => write!(f, ">"),
            Token::GreaterThanEqual => write!(f, ">="),
            Token::Follows => write!(f, ">>"),
            Token::QuestionMark => write!(f, "?"),
            Token::At => write!(f, "@"),
            Token::LeftBracket => write!(f, "["),
            Token::RightBracket => write!(f, "]"),
            Token::LeftBrace => write!(f, "{{"),
            Token::Pipe => write!(f, "|"),
            Token::DoublePipe => write!(f, "||"),
            Token::RightBrace => write!(f, "}}"),
        }
    }
}

/// Tokenize a source string into `(token, span)` pairs.
///
/// Lexical failures (a malformed literal, a stray character) surface as
/// `Err(())` at the offending span.
pub fn lexer(source: &str) -> SpannedIter<'_, Token<'_>> {
    Token::lexer(source).spanned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        lexer(source).map(|(token, _)| token.unwrap()).collect()
    }

    #[test]
    fn lex_path() {
        assert_eq!(
            tokens("/root/item"),
            vec![
                Token::Slash,
                Token::NCName("root"),
                Token::Slash,
                Token::NCName("item"),
            ]
        );
    }

    #[test]
    fn lex_numbers() {
        assert_eq!(
            tokens("42 3.14 1e3"),
            vec![
                Token::IntegerLiteral(42),
                Token::DecimalLiteral("3.14".parse().unwrap()),
                Token::DoubleLiteral(1000.0),
            ]
        );
    }

    #[test]
    fn lex_string_doubled_quotes() {
        assert_eq!(
            tokens(r#""he said ""hi""""#),
            vec![Token::StringLiteral("he said \"hi\"".to_string())]
        );
        assert_eq!(
            tokens("'it''s'"),
            vec![Token::StringLiteral("it's".to_string())]
        );
    }

    #[test]
    fn lex_operators() {
        assert_eq!(
            tokens("a << b >> c => d"),
            vec![
                Token::NCName("a"),
                Token::Precedes,
                Token::NCName("b"),
                Token::Follows,
                Token::NCName("c"),
                Token::Arrow,
                Token::NCName("d"),
            ]
        );
    }

    #[test]
    fn lex_qname_parts_are_adjacent() {
        let spans: Vec<(Token, Span)> = lexer("a:b").map(|(t, s)| (t.unwrap(), s)).collect();
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].1.end, spans[1].1.start);
        assert_eq!(spans[1].1.end, spans[2].1.start);
        let spaced: Vec<(Token, Span)> = lexer("a : b").map(|(t, s)| (t.unwrap(), s)).collect();
        assert_ne!(spaced[0].1.end, spaced[1].1.start);
    }

    #[test]
    fn lex_variable_and_axis() {
        assert_eq!(
            tokens("$x/child::item"),
            vec![
                Token::Dollar,
                Token::NCName("x"),
                Token::Slash,
                Token::NCName("child"),
                Token::DoubleColon,
                Token::NCName("item"),
            ]
        );
    }

    #[test]
    fn word_operators_stay_names() {
        assert_eq!(
            tokens("1 and 2"),
            vec![
                Token::IntegerLiteral(1),
                Token::NCName("and"),
                Token::IntegerLiteral(2),
            ]
        );
    }

    #[test]
    fn malformed_string_is_error() {
        let result: Vec<_> = lexer("'unterminated").map(|(t, _)| t).collect();
        assert!(result.iter().any(|t| t.is_err()));
    }
}
