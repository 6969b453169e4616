//! Typed IR consumed by the checker
//!
//! The parser collaborator hands over one [`Unit`] per compilation unit.
//! Type annotations are kept as unresolved [`TypeExpr`] trees; names are
//! resolved by [`crate::lower`]. Every expression carries an [`ExprId`] so
//! the checker can report a type per node.

use gradus_types::Variance;
use serde::{Deserialize, Serialize};

/// Source location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset past the last character
    pub end: usize,
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
}

impl Span {
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Span covering both `self` and `other`
    pub fn combine(&self, other: &Span) -> Span {
        let (first, _) = if self.start <= other.start {
            (self, other)
        } else {
            (other, self)
        };
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line: first.line,
            column: first.column,
        }
    }
}

/// Identity of an expression node within its unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExprId(pub u32);

/// A compilation unit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Unit {
    /// Path used in diagnostics
    pub path: String,
    /// Source text, for rendering diagnostics
    #[serde(default)]
    pub source: String,
    pub statements: Vec<Stmt>,
}

// ============================================================================
// Type annotations
// ============================================================================

/// `+`, `-` or no modifier on a mapped type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModifierExpr {
    #[default]
    Preserve,
    Add,
    Remove,
}

/// Unresolved type annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeExpr {
    /// `string`, `Foo`, `Promise<T>`, `Partial<User>`, `T`
    Named {
        name: String,
        #[serde(default)]
        args: Vec<TypeExpr>,
    },
    StringLit {
        value: String,
    },
    NumberLit {
        value: f64,
    },
    BoolLit {
        value: bool,
    },
    Object {
        properties: Vec<PropertyDecl>,
        /// `[key: string]: T`
        #[serde(default)]
        index: Option<Box<TypeExpr>>,
    },
    Array {
        element: Box<TypeExpr>,
    },
    Tuple {
        elements: Vec<TupleElementExpr>,
        #[serde(default)]
        rest: Option<Box<TypeExpr>>,
    },
    Function(Box<FunctionTypeExpr>),
    Union {
        members: Vec<TypeExpr>,
    },
    Intersection {
        members: Vec<TypeExpr>,
    },
    Conditional {
        check: Box<TypeExpr>,
        extends: Box<TypeExpr>,
        true_type: Box<TypeExpr>,
        false_type: Box<TypeExpr>,
    },
    /// `infer U` inside an `extends` clause
    Infer {
        name: String,
    },
    /// `{ [P in K]: T }`
    Mapped {
        param: String,
        constraint: Box<TypeExpr>,
        template: Box<TypeExpr>,
        #[serde(default)]
        readonly: ModifierExpr,
        #[serde(default)]
        optional: ModifierExpr,
    },
    KeyOf {
        operand: Box<TypeExpr>,
    },
    IndexedAccess {
        object: Box<TypeExpr>,
        index: Box<TypeExpr>,
    },
    TemplateLiteral {
        parts: Vec<TemplateTypePart>,
    },
    /// `typeof value`
    TypeQuery {
        name: String,
    },
}

impl TypeExpr {
    /// Reference to a name without type arguments
    pub fn named(name: impl Into<String>) -> Self {
        TypeExpr::Named {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Generic application `name<args>`
    pub fn generic(name: impl Into<String>, args: Vec<TypeExpr>) -> Self {
        TypeExpr::Named {
            name: name.into(),
            args,
        }
    }

    pub fn string_lit(value: impl Into<String>) -> Self {
        TypeExpr::StringLit {
            value: value.into(),
        }
    }

    pub fn union(members: Vec<TypeExpr>) -> Self {
        TypeExpr::Union { members }
    }

    pub fn array(element: TypeExpr) -> Self {
        TypeExpr::Array {
            element: Box::new(element),
        }
    }

    pub fn object(properties: Vec<PropertyDecl>) -> Self {
        TypeExpr::Object {
            properties,
            index: None,
        }
    }
}

/// Field of an object type, interface or class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDecl {
    pub name: String,
    pub ty: TypeExpr,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub readonly: bool,
}

impl PropertyDecl {
    pub fn new(name: impl Into<String>, ty: TypeExpr) -> Self {
        Self {
            name: name.into(),
            ty,
            optional: false,
            readonly: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupleElementExpr {
    pub ty: TypeExpr,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TemplateTypePart {
    Text { text: String },
    Type { ty: TypeExpr },
}

/// `value is T` / `asserts value is T`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredicateExpr {
    pub param: String,
    pub ty: TypeExpr,
    #[serde(default)]
    pub asserts: bool,
}

/// Function type annotation `<T>(a: A) => R`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionTypeExpr {
    #[serde(default)]
    pub type_params: Vec<TypeParamDecl>,
    pub params: Vec<Param>,
    #[serde(default)]
    pub rest: Option<Param>,
    pub return_type: TypeExpr,
    #[serde(default)]
    pub predicate: Option<PredicateExpr>,
    /// `new (...) => T`
    #[serde(default)]
    pub construct: bool,
}

/// Generic parameter declaration `in out T extends C = D`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeParamDecl {
    pub name: String,
    #[serde(default)]
    pub constraint: Option<TypeExpr>,
    #[serde(default)]
    pub default: Option<TypeExpr>,
    #[serde(default)]
    pub variance: Option<Variance>,
}

impl TypeParamDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraint: None,
            default: None,
            variance: None,
        }
    }

    pub fn with_constraint(mut self, constraint: TypeExpr) -> Self {
        self.constraint = Some(constraint);
        self
    }
}

/// Function or constructor parameter. A missing annotation is typed from
/// context, or `any`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(default)]
    pub ty: Option<TypeExpr>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub span: Span,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: TypeExpr) -> Self {
        Self {
            name: name.into(),
            ty: Some(ty),
            optional: false,
            span: Span::default(),
        }
    }

    /// Parameter typed from context
    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: None,
            optional: false,
            span: Span::default(),
        }
    }
}

// ============================================================================
// Declarations and statements
// ============================================================================

/// Function declaration or method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    #[serde(default)]
    pub type_params: Vec<TypeParamDecl>,
    pub params: Vec<Param>,
    #[serde(default)]
    pub rest: Option<Param>,
    #[serde(default)]
    pub return_type: Option<TypeExpr>,
    #[serde(default)]
    pub predicate: Option<PredicateExpr>,
    #[serde(default)]
    pub is_async: bool,
    /// `None` for ambient (`declare function`) signatures
    #[serde(default)]
    pub body: Option<Vec<Stmt>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassField {
    pub name: String,
    pub ty: TypeExpr,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default)]
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constructor {
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    #[serde(default)]
    pub type_params: Vec<TypeParamDecl>,
    #[serde(default)]
    pub fields: Vec<ClassField>,
    #[serde(default)]
    pub constructor: Option<Constructor>,
    #[serde(default)]
    pub methods: Vec<FunctionDecl>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarKind {
    Let,
    Const,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    /// `None` for `default:`
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    #[serde(flatten)]
    pub kind: StmtKind,
    #[serde(default)]
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StmtKind {
    TypeAlias {
        name: String,
        #[serde(default)]
        type_params: Vec<TypeParamDecl>,
        body: TypeExpr,
    },
    Interface {
        name: String,
        #[serde(default)]
        type_params: Vec<TypeParamDecl>,
        #[serde(default)]
        extends: Vec<TypeExpr>,
        members: Vec<PropertyDecl>,
    },
    Class(ClassDecl),
    Function(FunctionDecl),
    Var {
        var_kind: VarKind,
        name: String,
        #[serde(default)]
        ty: Option<TypeExpr>,
        #[serde(default)]
        init: Option<Expr>,
    },
    Expr {
        expr: Expr,
    },
    Return {
        #[serde(default)]
        value: Option<Expr>,
    },
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        #[serde(default)]
        else_branch: Option<Vec<Stmt>>,
    },
    Switch {
        discriminant: Expr,
        cases: Vec<SwitchCase>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    Block {
        body: Vec<Stmt>,
    },
    Throw {
        value: Expr,
    },
    Break,
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Gt,
    Le,
    Ge,
    /// `===`
    StrictEq,
    /// `!==`
    StrictNe,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    And,
    Or,
    /// `??`
    Nullish,
    InstanceOf,
    In,
}

impl BinaryOp {
    pub fn is_equality(self) -> bool {
        matches!(
            self,
            BinaryOp::StrictEq | BinaryOp::StrictNe | BinaryOp::Eq | BinaryOp::Ne
        )
    }

    /// `!==` / `!=`
    pub fn is_negated_equality(self) -> bool {
        matches!(self, BinaryOp::StrictNe | BinaryOp::Ne)
    }

    /// `==` / `!=`
    pub fn is_loose(self) -> bool {
        matches!(self, BinaryOp::Eq | BinaryOp::Ne)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
    Neg,
    TypeOf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectMember {
    Property { name: String, value: Expr },
    Spread { value: Expr },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TemplatePart {
    Text { text: String },
    Expr { expr: Expr },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FunctionBody {
    Block { body: Vec<Stmt> },
    Expr { expr: Box<Expr> },
}

/// Arrow function or function expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionExpr {
    #[serde(default)]
    pub type_params: Vec<TypeParamDecl>,
    pub params: Vec<Param>,
    #[serde(default)]
    pub return_type: Option<TypeExpr>,
    #[serde(default)]
    pub is_async: bool,
    pub body: FunctionBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub id: ExprId,
    #[serde(flatten)]
    pub kind: ExprKind,
    #[serde(default)]
    pub span: Span,
}

impl Expr {
    pub fn new(id: ExprId, kind: ExprKind, span: Span) -> Self {
        Self { id, kind, span }
    }

    /// Name of a plain identifier expression
    pub fn as_ident(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Ident { name } => Some(name),
            _ => None,
        }
    }

    /// Fresh object or array literal
    pub fn is_fresh_literal(&self) -> bool {
        matches!(self.kind, ExprKind::Object { .. } | ExprKind::Array { .. })
    }

    /// Function expression whose parameters need contextual types
    pub fn is_context_sensitive(&self) -> bool {
        match &self.kind {
            ExprKind::Function(f) => f.params.iter().any(|p| p.ty.is_none()),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExprKind {
    String {
        value: String,
    },
    Number {
        value: f64,
    },
    Bool {
        value: bool,
    },
    BigInt {
        digits: String,
    },
    Null,
    Undefined,
    Template {
        parts: Vec<TemplatePart>,
    },
    Ident {
        name: String,
    },
    This,
    Object {
        members: Vec<ObjectMember>,
    },
    Array {
        elements: Vec<Expr>,
    },
    Call {
        callee: Box<Expr>,
        #[serde(default)]
        type_args: Vec<TypeExpr>,
        args: Vec<Expr>,
    },
    New {
        callee: Box<Expr>,
        #[serde(default)]
        type_args: Vec<TypeExpr>,
        args: Vec<Expr>,
    },
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Function(Box<FunctionExpr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Await {
        value: Box<Expr>,
    },
    As {
        value: Box<Expr>,
        ty: TypeExpr,
    },
    NonNull {
        value: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
}
