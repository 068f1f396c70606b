//! Filter expression parser using chumsky.
//!
//! Expressions configure filters at any pipeline stage:
//! - `QUAL >= 30 && FILTER == "PASS"` (quick stage)
//! - `NAME in ["NA12878", "NA12891"]` (sample stage)
//! - `FORMAT.DP < 10 || GQ < 20` (genotype stage)
//! - `N_CALLED >= 2` (line stage)
//! - `MAF < 0.01 && AN > 100` (variant stage)
//! - `ANN[*].Annotation_Impact == "HIGH"` (structured INFO annotations)

use chumsky::prelude::*;

use crate::error::{Result, VcfFilterError};

/// Binary operators for comparisons and logic.
#[derive(Debug, Clone, PartialEq)]
pub enum BinaryOp {
    // Comparison
    Eq,       // ==
    NotEq,    // !=
    Lt,       // <
    Gt,       // >
    LtEq,     // <=
    GtEq,     // >=
    Contains, // contains
    In,       // in [..]

    // Logical
    And, // &&
    Or,  // ||
}

/// Unary operators.
#[derive(Debug, Clone, PartialEq)]
pub enum UnaryOp {
    Not, // !
}

/// Part of a variable access path.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessPart {
    /// A field name (e.g. "ANN", "Gene_Name").
    Field(String),
    /// An array index (e.g. `[0]`).
    Index(usize),
    /// Wildcard array access (`[*]`, matches any).
    Wildcard,
}

/// A filter expression AST node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A numeric literal.
    Number(f64),
    /// A string literal.
    String(String),
    /// A boolean literal.
    Bool(bool),
    /// A list literal, used with `in`.
    List(Vec<Expr>),
    /// A variable reference with access path.
    /// e.g. `ANN[0].Gene_Name` becomes `Var([Field("ANN"), Index(0), Field("Gene_Name")])`
    Var(Vec<AccessPart>),
    /// A binary operation.
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    /// A unary operation.
    Unary(UnaryOp, Box<Expr>),
    /// Check if a field exists (is not missing).
    Exists(Vec<AccessPart>),
}

impl Expr {
    /// Create a simple variable expression.
    pub fn var(name: &str) -> Self {
        Expr::Var(vec![AccessPart::Field(name.to_string())])
    }

    /// Root field names referenced by this expression, in order of appearance.
    ///
    /// Namespaced references are reported as `INFO.<name>` / `FORMAT.<name>`.
    pub fn fields(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields(&self, out: &mut Vec<String>) {
        match self {
            Expr::Var(parts) | Expr::Exists(parts) => {
                if let Some(name) = root_name(parts) {
                    if !out.contains(&name) {
                        out.push(name);
                    }
                }
            }
            Expr::Binary(left, _, right) => {
                left.collect_fields(out);
                right.collect_fields(out);
            }
            Expr::Unary(_, inner) => inner.collect_fields(out),
            Expr::List(items) => items.iter().for_each(|e| e.collect_fields(out)),
            Expr::Number(_) | Expr::String(_) | Expr::Bool(_) => {}
        }
    }
}

fn root_name(parts: &[AccessPart]) -> Option<String> {
    match parts {
        [AccessPart::Field(ns), AccessPart::Field(name), ..] if ns == "INFO" || ns == "FORMAT" => {
            Some(format!("{ns}.{name}"))
        }
        [AccessPart::Field(name), ..] => Some(name.clone()),
        _ => None,
    }
}

/// Create the filter expression parser.
pub fn parser() -> impl Parser<char, Expr, Error = Simple<char>> {
    recursive(|full_expr| {
        // Number literal, optionally negative
        let number = just('-')
            .or_not()
            .chain::<char, _, _>(text::int(10))
            .chain::<char, _, _>(just('.').chain(text::digits(10)).or_not().flatten())
            .collect::<String>()
            .try_map(|s, span| {
                s.parse::<f64>()
                    .map(Expr::Number)
                    .map_err(|e| Simple::custom(span, e.to_string()))
            })
            .padded();

        // String literal (double-quoted)
        let string = just('"')
            .ignore_then(filter(|c| *c != '"').repeated())
            .then_ignore(just('"'))
            .collect::<String>()
            .map(Expr::String)
            .padded();

        let boolean = choice((
            text::keyword("true").to(Expr::Bool(true)),
            text::keyword("false").to(Expr::Bool(false)),
        ))
        .padded();

        // List literal: ["a", "b"] or [1, 2]
        let list = just('[')
            .padded()
            .ignore_then(
                choice((number.clone(), string.clone(), boolean.clone()))
                    .separated_by(just(',').padded())
                    .allow_trailing(),
            )
            .then_ignore(just(']').padded())
            .map(Expr::List);

        let ident = text::ident().padded();

        // Array index: [0], [*]
        let array_index = just('[')
            .ignore_then(just('*').to(AccessPart::Wildcard).or(text::int(10).try_map(
                |s: String, span| {
                    s.parse::<usize>()
                        .map(AccessPart::Index)
                        .map_err(|e| Simple::custom(span, e.to_string()))
                },
            )))
            .then_ignore(just(']'));

        // Field access: .FieldName
        let field_access = just('.')
            .ignore_then(text::ident().padded())
            .map(AccessPart::Field);

        // Variable with optional access chain: ANN[0].Gene_Name
        let access_path = ident
            .map(AccessPart::Field)
            .then(choice((array_index, field_access)).repeated())
            .map(|(first, rest)| {
                let mut parts = vec![first];
                parts.extend(rest);
                parts
            });

        let variable = access_path.clone().map(Expr::Var).padded();

        // exists(field)
        let exists_fn = text::keyword("exists")
            .padded()
            .ignore_then(
                just('(')
                    .padded()
                    .ignore_then(access_path)
                    .then_ignore(just(')').padded()),
            )
            .map(Expr::Exists);

        let paren_expr = just('(')
            .padded()
            .ignore_then(full_expr)
            .then_ignore(just(')').padded());

        let atom = choice((exists_fn, boolean, number, string, list, paren_expr, variable));

        let unary = just('!')
            .padded()
            .repeated()
            .then(atom)
            .foldr(|_op, expr| Expr::Unary(UnaryOp::Not, Box::new(expr)));

        let cmp_op = choice((
            just("==").to(BinaryOp::Eq),
            just("!=").to(BinaryOp::NotEq),
            just("<=").to(BinaryOp::LtEq),
            just(">=").to(BinaryOp::GtEq),
            just("<").to(BinaryOp::Lt),
            just(">").to(BinaryOp::Gt),
            text::keyword("contains").to(BinaryOp::Contains),
            text::keyword("in").to(BinaryOp::In),
        ))
        .padded();

        let comparison = unary
            .clone()
            .then(cmp_op.then(unary).repeated())
            .foldl(|left, (op, right)| Expr::Binary(Box::new(left), op, Box::new(right)));

        let and_op = just("&&").padded().to(BinaryOp::And);
        let and_expr = comparison
            .clone()
            .then(and_op.then(comparison).repeated())
            .foldl(|left, (op, right)| Expr::Binary(Box::new(left), op, Box::new(right)));

        let or_op = just("||").padded().to(BinaryOp::Or);
        and_expr
            .clone()
            .then(or_op.then(and_expr).repeated())
            .foldl(|left, (op, right)| Expr::Binary(Box::new(left), op, Box::new(right)))
    })
    .then_ignore(end())
}

/// Parse a filter expression string into an AST.
pub fn parse_expr(text: &str) -> Result<Expr> {
    parser().parse(text).map_err(|errs| {
        VcfFilterError::FilterParseError(
            errs.into_iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        )
    })
}
