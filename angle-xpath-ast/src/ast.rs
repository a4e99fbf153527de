use std::fmt;

use angle_xml::QName;

/// One XPath expression.
///
/// A closed sum: the evaluator dispatches with a single match. Paths are
/// left-nested [`Expr::Step`] chains; `a//b` and `..` are desugared during
/// parsing, and the arrow operator is lowered to [`Expr::Call`], so neither
/// appears here.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `/` — the document root of the focus node.
    Root,
    /// `.` — the focus node.
    Current,
    /// `*` — any element on the principal axis.
    Wildcard,
    /// `curr/next` — evaluate `next` once per item of `curr`.
    Step { curr: Box<Expr>, next: Box<Expr> },
    /// `axis::test`.
    Axis { axis: Axis, next: Box<Expr> },
    /// A name test on the principal axis.
    Name(QName),
    /// `node()`, `text()`, `element(name)`, …
    Kind(KindTest),
    /// `expr[predicate]` with a boolean (or positional) predicate.
    Filter { expr: Box<Expr>, predicate: Box<Expr> },
    /// `expr[n]` with a literal numeric index, and array/map indexing.
    Subscript { expr: Box<Expr>, index: Box<Expr> },
    Union { left: Box<Expr>, right: Box<Expr> },
    Intersect { left: Box<Expr>, right: Box<Expr> },
    Except { left: Box<Expr>, right: Box<Expr> },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `left is right` — node identity.
    Identity { left: Box<Expr>, right: Box<Expr> },
    /// Unary minus.
    Reverse(Box<Expr>),
    Literal(String),
    Number(f64),
    Boolean(bool),
    /// `(a, b, …)`.
    Sequence(Vec<Expr>),
    /// `[a, b]` or `array { … }`.
    Array(Vec<Expr>),
    /// `map { k : v, … }`.
    Map(Vec<(Expr, Expr)>),
    /// `from to to`, inclusive.
    Range { from: Box<Expr>, to: Box<Expr> },
    Let {
        bindings: Vec<Binding>,
        body: Box<Expr>,
    },
    For {
        bindings: Vec<Binding>,
        body: Box<Expr>,
    },
    If {
        test: Box<Expr>,
        then: Box<Expr>,
        alt: Box<Expr>,
    },
    Quantified {
        every: bool,
        bindings: Vec<Binding>,
        test: Box<Expr>,
    },
    Cast {
        expr: Box<Expr>,
        target: SchemaType,
        allow_empty: bool,
    },
    Castable {
        expr: Box<Expr>,
        target: SchemaType,
        allow_empty: bool,
    },
    InstanceOf {
        expr: Box<Expr>,
        types: Vec<SchemaType>,
        occurrence: Occurrence,
    },
    Call { name: QName, args: Vec<Expr> },
    /// `@name`.
    Attr(QName),
    /// `$name`.
    Variable(QName),
}

/// A `$name := expr` or `$name in expr` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: QName,
    pub expr: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Parent,
    SelfAxis,
    Ancestor,
    AncestorOrSelf,
    Descendant,
    DescendantOrSelf,
    Preceding,
    PrecedingSibling,
    Following,
    FollowingSibling,
    Attribute,
    Namespace,
}

impl Axis {
    pub fn from_name(name: &str) -> Option<Axis> {
        Some(match name {
            "child" => Axis::Child,
            "parent" => Axis::Parent,
            "self" => Axis::SelfAxis,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "preceding" => Axis::Preceding,
            "preceding-sibling" => Axis::PrecedingSibling,
            "following" => Axis::Following,
            "following-sibling" => Axis::FollowingSibling,
            "attribute" => Axis::Attribute,
            "namespace" => Axis::Namespace,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Axis::Child => "child",
            Axis::Parent => "parent",
            Axis::SelfAxis => "self",
            Axis::Ancestor => "ancestor",
            Axis::AncestorOrSelf => "ancestor-or-self",
            Axis::Descendant => "descendant",
            Axis::DescendantOrSelf => "descendant-or-self",
            Axis::Preceding => "preceding",
            Axis::PrecedingSibling => "preceding-sibling",
            Axis::Following => "following",
            Axis::FollowingSibling => "following-sibling",
            Axis::Attribute => "attribute",
            Axis::Namespace => "namespace",
        }
    }
}

/// A node kind test, with the optional name restriction where the kind
/// carries one.
#[derive(Debug, Clone, PartialEq)]
pub enum KindTest {
    Node,
    Text,
    Comment,
    Document,
    Element(Option<QName>),
    Attribute(Option<QName>),
    ProcessingInstruction(Option<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    // general comparisons
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // value comparisons
    ValueEq,
    ValueNe,
    ValueLt,
    ValueLe,
    ValueGt,
    ValueGe,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// `||`
    Concat,
    /// `<<`
    Precedes,
    /// `>>`
    Follows,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::ValueEq => "eq",
            BinaryOp::ValueNe => "ne",
            BinaryOp::ValueLt => "lt",
            BinaryOp::ValueLe => "le",
            BinaryOp::ValueGt => "gt",
            BinaryOp::ValueGe => "ge",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "div",
            BinaryOp::Mod => "mod",
            BinaryOp::Concat => "||",
            BinaryOp::Precedes => "<<",
            BinaryOp::Follows => ">>",
        }
    }
}

/// The type lattice, a tree rooted at `untyped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaType {
    Untyped,
    Any,
    AnyAtomic,
    String,
    Boolean,
    Decimal,
    Integer,
    Double,
    Date,
    DateTime,
}

impl SchemaType {
    /// Look up a type by its `xs:` local name.
    pub fn from_local(local: &str) -> Option<SchemaType> {
        Some(match local {
            "untyped" | "untypedAtomic" => SchemaType::Untyped,
            "anyType" => SchemaType::Any,
            "anyAtomicType" => SchemaType::AnyAtomic,
            "string" => SchemaType::String,
            "boolean" => SchemaType::Boolean,
            "decimal" => SchemaType::Decimal,
            "integer" => SchemaType::Integer,
            "double" | "float" => SchemaType::Double,
            "date" => SchemaType::Date,
            "dateTime" => SchemaType::DateTime,
            _ => return None,
        })
    }

    pub fn local_name(&self) -> &'static str {
        match self {
            SchemaType::Untyped => "untypedAtomic",
            SchemaType::Any => "anyType",
            SchemaType::AnyAtomic => "anyAtomicType",
            SchemaType::String => "string",
            SchemaType::Boolean => "boolean",
            SchemaType::Decimal => "decimal",
            SchemaType::Integer => "integer",
            SchemaType::Double => "double",
            SchemaType::Date => "date",
            SchemaType::DateTime => "dateTime",
        }
    }

    /// The parent in the subtype tree; `None` for the root.
    pub fn parent(&self) -> Option<SchemaType> {
        Some(match self {
            SchemaType::Untyped => return None,
            SchemaType::Any => SchemaType::Untyped,
            SchemaType::AnyAtomic => SchemaType::Any,
            SchemaType::Integer => SchemaType::Decimal,
            SchemaType::String
            | SchemaType::Boolean
            | SchemaType::Decimal
            | SchemaType::Double
            | SchemaType::Date
            | SchemaType::DateTime => SchemaType::AnyAtomic,
        })
    }

    /// Subtype relation, reflexive, walking the parent chain upward.
    pub fn is_subtype_of(&self, other: SchemaType) -> bool {
        let mut current = Some(*self);
        while let Some(t) = current {
            if t == other {
                return true;
            }
            current = t.parent();
        }
        false
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xs:{}", self.local_name())
    }
}

/// Occurrence indicator on a sequence type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Occurrence {
    /// Exactly one.
    #[default]
    One,
    /// `?`
    ZeroOrOne,
    /// `*`
    ZeroOrMore,
    /// `+`
    OneOrMore,
}

impl Occurrence {
    pub fn marker(&self) -> &'static str {
        match self {
            Occurrence::One => "",
            Occurrence::ZeroOrOne => "?",
            Occurrence::ZeroOrMore => "*",
            Occurrence::OneOrMore => "+",
        }
    }
}

fn write_name(f: &mut fmt::Formatter<'_>, name: &QName) -> fmt::Result {
    match (&name.prefix, name.uri.as_deref()) {
        (Some(prefix), _) => write!(f, "{}:{}", prefix, name.local),
        (None, Some("*")) => write!(f, "*:{}", name.local),
        _ => write!(f, "{}", name.local),
    }
}

fn escape_literal(s: &str) -> String {
    s.replace('\'', "''")
}

/// The canonical printer: parsing the output of `Display` yields an
/// expression that evaluates identically. Grouping is made explicit with
/// parentheses instead of reconstructing precedence.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Root => write!(f, "/"),
            Expr::Current => write!(f, "."),
            Expr::Wildcard => write!(f, "*"),
            Expr::Step { curr, next } => {
                if matches!(**curr, Expr::Root) {
                    write!(f, "/{}", next)
                } else {
                    write!(f, "{}/{}", curr, next)
                }
            }
            Expr::Axis { axis, next } => write!(f, "{}::{}", axis.name(), next),
            Expr::Name(name) => write_name(f, name),
            Expr::Kind(kind) => match kind {
                KindTest::Node => write!(f, "node()"),
                KindTest::Text => write!(f, "text()"),
                KindTest::Comment => write!(f, "comment()"),
                KindTest::Document => write!(f, "document-node()"),
                KindTest::Element(None) => write!(f, "element()"),
                KindTest::Element(Some(name)) => {
                    write!(f, "element(")?;
                    write_name(f, name)?;
                    write!(f, ")")
                }
                KindTest::Attribute(None) => write!(f, "attribute()"),
                KindTest::Attribute(Some(name)) => {
                    write!(f, "attribute(")?;
                    write_name(f, name)?;
                    write!(f, ")")
                }
                KindTest::ProcessingInstruction(None) => {
                    write!(f, "processing-instruction()")
                }
                KindTest::ProcessingInstruction(Some(target)) => {
                    write!(f, "processing-instruction('{}')", escape_literal(target))
                }
            },
            Expr::Filter { expr, predicate } => write!(f, "{}[{}]", expr, predicate),
            Expr::Subscript { expr, index } => {
                // a non-numeric index is array/map indexing and must not
                // read back as a boolean predicate
                if matches!(**index, Expr::Number(_)) {
                    write!(f, "{}[{}]", expr, index)
                } else {
                    write!(f, "{}({})", expr, index)
                }
            }
            Expr::Union { left, right } => write!(f, "({} union {})", left, right),
            Expr::Intersect { left, right } => write!(f, "({} intersect {})", left, right),
            Expr::Except { left, right } => write!(f, "({} except {})", left, right),
            Expr::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Expr::Identity { left, right } => write!(f, "({} is {})", left, right),
            Expr::Reverse(expr) => write!(f, "-({})", expr),
            Expr::Literal(s) => write!(f, "'{}'", escape_literal(s)),
            Expr::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Expr::Boolean(b) => {
                if *b {
                    write!(f, "true()")
                } else {
                    write!(f, "false()")
                }
            }
            Expr::Sequence(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Expr::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Expr::Map(entries) => {
                write!(f, "map {{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} : {}", key, value)?;
                }
                write!(f, "}}")
            }
            Expr::Range { from, to } => write!(f, "({} to {})", from, to),
            Expr::Let { bindings, body } => {
                write!(f, "(let ")?;
                for (i, binding) in bindings.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "${} := {}", binding.name, binding.expr)?;
                }
                write!(f, " return {})", body)
            }
            Expr::For { bindings, body } => {
                write!(f, "(for ")?;
                for (i, binding) in bindings.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "${} in {}", binding.name, binding.expr)?;
                }
                write!(f, " return {})", body)
            }
            Expr::If { test, then, alt } => {
                write!(f, "(if ({}) then {} else {})", test, then, alt)
            }
            Expr::Quantified {
                every,
                bindings,
                test,
            } => {
                write!(f, "({} ", if *every { "every" } else { "some" })?;
                for (i, binding) in bindings.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "${} in {}", binding.name, binding.expr)?;
                }
                write!(f, " satisfies {})", test)
            }
            Expr::Cast {
                expr,
                target,
                allow_empty,
            } => write!(
                f,
                "({} cast as {}{})",
                expr,
                target,
                if *allow_empty { "?" } else { "" }
            ),
            Expr::Castable {
                expr,
                target,
                allow_empty,
            } => write!(
                f,
                "({} castable as {}{})",
                expr,
                target,
                if *allow_empty { "?" } else { "" }
            ),
            Expr::InstanceOf {
                expr,
                types,
                occurrence,
            } => {
                write!(f, "({} instance of ", expr)?;
                for (i, t) in types.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, "{})", occurrence.marker())
            }
            Expr::Call { name, args } => {
                write_name(f, name)?;
                write!(f, "(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Attr(name) => {
                write!(f, "@")?;
                write_name(f, name)
            }
            Expr::Variable(name) => write!(f, "${}", name),
        }
    }
}
