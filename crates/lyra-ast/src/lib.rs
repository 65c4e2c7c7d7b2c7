//! AST node definitions for Lyra.
//!
//! Expressions, statements, and patterns are three closed tagged unions;
//! dispatch over node kinds is exhaustive `match`, never runtime downcasts.
//! Every node embeds its originating [`Token`] for diagnostics, and
//! expressions carry a type slot the checker populates in place.

use std::collections::BTreeSet;

use lyra_types::Type;

mod token;

pub use token::{Token, TokenKind};

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// The kind of a literal expression or pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    Integer,
    Float,
    Boolean,
    Str,
    Nil,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

/// An expression node. `ty` starts empty and is filled by the type checker.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub token: Token,
    pub ty: Option<Type>,
}

impl Expr {
    pub fn new(kind: ExprKind, token: Token) -> Self {
        Self {
            kind,
            token,
            ty: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// A literal; `value` is the raw lexeme (strings keep their quotes —
    /// escape decoding is deferred to IR lowering).
    Literal { kind: LiteralKind, value: String },

    /// Variable reference.
    Variable(String),

    /// Assignment to an existing binding: `name = value`.
    Assign { name: String, value: Box<Expr> },

    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },

    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },

    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },

    /// Array literal: `[a, b, c]`.
    Array(Vec<Expr>),

    /// Dictionary literal: `{k: v, ...}`.
    Dict(Vec<(Expr, Expr)>),

    Lambda {
        params: Vec<Param>,
        ret: Type,
        body: Box<Stmt>,
    },

    Await(Box<Expr>),

    /// Option construction: `Some(value)` / `None`.
    OptionSome(Box<Expr>),
    OptionNone,

    /// Result construction: `Ok(value)` / `Err(value)`.
    ResultOk(Box<Expr>),
    ResultErr(Box<Expr>),

    /// Channel send: `channel <- value`.
    ChannelSend {
        channel: Box<Expr>,
        value: Box<Expr>,
    },

    /// Channel receive: `<-channel`.
    ChannelReceive(Box<Expr>),

    /// Goroutine launch: `go call()`.
    Go(Box<Expr>),

    /// Explicit ownership transfer: `move value`.
    Move(Box<Expr>),
}

/// A named, typed function or lambda parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub token: Token,
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub token: Token,
}

impl Stmt {
    pub fn new(kind: StmtKind, token: Token) -> Self {
        Self { kind, token }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Block(Vec<Stmt>),

    /// Variable declaration: `let name[: declared] [= init]`.
    Var {
        name: String,
        declared: Option<Type>,
        init: Option<Expr>,
    },

    Function(FunctionDecl),

    Class(ClassDecl),

    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },

    While {
        condition: Expr,
        body: Box<Stmt>,
    },

    For {
        binding: String,
        iterable: Expr,
        body: Box<Stmt>,
    },

    Return(Option<Expr>),

    Import { path: String },

    Match {
        scrutinee: Expr,
        arms: Vec<MatchArm>,
    },

    Trait(TraitDecl),

    Impl(ImplDecl),

    /// Channel select statement; each arm pairs a channel operation with a
    /// body.
    Select { arms: Vec<(Expr, Stmt)> },

    Expression(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Type,
    pub body: Box<Stmt>,
    pub is_async: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub fields: Vec<Param>,
    pub methods: Vec<FunctionDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub body: Stmt,
}

/// A trait declaration: requirements plus parent traits.
#[derive(Debug, Clone, PartialEq)]
pub struct TraitDecl {
    pub name: String,
    pub parents: Vec<String>,
    pub methods: Vec<MethodSig>,
    pub associated_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodSig {
    pub name: String,
    pub params: Vec<Type>,
    pub ret: Type,
    pub has_default: bool,
}

/// An `impl Trait for Type` block.
#[derive(Debug, Clone, PartialEq)]
pub struct ImplDecl {
    pub trait_name: String,
    pub target: Type,
    pub methods: Vec<FunctionDecl>,
    pub associated_types: Vec<(String, Type)>,
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub kind: PatternKind,
    pub token: Token,
}

impl Pattern {
    pub fn new(kind: PatternKind, token: Token) -> Self {
        Self { kind, token }
    }

    pub fn binds_variables(&self) -> bool {
        self.kind.binds_variables()
    }

    pub fn bound_variables(&self) -> BTreeSet<String> {
        self.kind.bound_variables()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatternKind {
    /// Matches anything, binds nothing.
    Wildcard,

    /// Matches a literal value, binds nothing.
    Literal { kind: LiteralKind, value: String },

    /// Binds the matched value to a name.
    Variable(String),

    /// Constructor with nested sub-patterns: `Some(x)`, `Pair(a, b)`.
    Constructor { name: String, args: Vec<Pattern> },

    /// Ordered nested patterns: `(a, b)`.
    Tuple(Vec<Pattern>),

    /// Named-field nested patterns: `Point { x: a, y: _ }`.
    Struct {
        name: String,
        fields: Vec<(String, Pattern)>,
    },

    /// Two alternatives. Both arms must bind identical variable sets; arms
    /// that disagree bind nothing (and the checker diagnoses them).
    Or(Box<Pattern>, Box<Pattern>),
}

impl PatternKind {
    /// Whether matching this pattern introduces any bindings.
    ///
    /// Consistent with [`bound_variables`](Self::bound_variables) for every
    /// variant: this returns `true` exactly when that set is non-empty.
    pub fn binds_variables(&self) -> bool {
        match self {
            PatternKind::Wildcard | PatternKind::Literal { .. } => false,
            PatternKind::Variable(_) => true,
            PatternKind::Constructor { args, .. } | PatternKind::Tuple(args) => {
                args.iter().any(Pattern::binds_variables)
            }
            PatternKind::Struct { fields, .. } => {
                fields.iter().any(|(_, p)| p.binds_variables())
            }
            PatternKind::Or(left, right) => {
                left.binds_variables()
                    && right.binds_variables()
                    && left.bound_variables() == right.bound_variables()
            }
        }
    }

    /// The set of names this pattern binds.
    ///
    /// Constructor, tuple, and struct patterns bind the union of their
    /// children. Or-patterns bind the shared set when both arms agree and
    /// nothing otherwise.
    pub fn bound_variables(&self) -> BTreeSet<String> {
        match self {
            PatternKind::Wildcard | PatternKind::Literal { .. } => BTreeSet::new(),
            PatternKind::Variable(name) => BTreeSet::from([name.clone()]),
            PatternKind::Constructor { args, .. } | PatternKind::Tuple(args) => args
                .iter()
                .flat_map(Pattern::bound_variables)
                .collect(),
            PatternKind::Struct { fields, .. } => fields
                .iter()
                .flat_map(|(_, p)| p.bound_variables())
                .collect(),
            PatternKind::Or(left, right) => {
                let left_vars = left.bound_variables();
                if left_vars == right.bound_variables() {
                    left_vars
                } else {
                    BTreeSet::new()
                }
            }
        }
    }
}
