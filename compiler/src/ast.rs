// AST node types for .ugg unit definition files.
//
// Every node carries a `SimpleSpan` for error reporting in lowering.
//
// Preconditions: produced by the parser from a valid or partially-valid token stream.
// Postconditions: each node's span covers the source range of the construct.
// Failure modes: none (data-only module).
// Side effects: none.

use chumsky::span::SimpleSpan;

use crate::node::BinOp;
use crate::rate::{Category, RateSet};

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type Span = SimpleSpan;

// ── Root ──

/// A definition file: a sequence of unit declarations.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub units: Vec<UnitDecl>,
    pub span: Span,
}

/// An identifier with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

// ── unit_decl: 'unit' IDENT category 'commutative'? '{' stmt* '}' ──

#[derive(Debug, Clone, PartialEq)]
pub struct UnitDecl {
    pub name: Ident,
    pub category: Category,
    pub commutative: bool,
    pub body: Vec<Stmt>,
    pub span: Span,
}

// ── Statements ──

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `param NAME [: TYPE] @ RATES`
    Param {
        name: Ident,
        ty: Option<Ident>,
        rates: RateSet,
    },
    /// `extern NAME [: TYPE]`
    Extern { name: Ident, ty: Option<Ident> },
    /// `let NAME = EXPR`
    Let { name: Ident, value: Expr },
    /// `var NAME [: TYPE] = EXPR`
    Var {
        name: Ident,
        ty: Option<Ident>,
        value: Expr,
    },
    /// `state NAME [: TYPE] = EXPR`
    State {
        name: Ident,
        ty: Option<Ident>,
        init: Expr,
    },
    /// `next NAME = EXPR`
    Next { state: Ident, value: Expr },
    /// `output_rate NAME`
    OutputRate(Ident),
    /// `no_interp NAME`
    NoInterp(Ident),
    /// `on PARAM STATE = EXPR`
    On {
        param: Ident,
        state: Ident,
        value: Expr,
    },
    /// `out EXPR`
    Out(Expr),
}

// ── Expressions ──

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Float(f64),
    Name(String),
    Call { func: Ident, args: Vec<Expr> },
    Index { target: Box<Expr>, index: Box<Expr> },
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}
