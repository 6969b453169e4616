//! Helpers for building checker IR in tests

#![allow(dead_code)]

use gradus_checker::ast::*;
use gradus_checker::{CheckResult, CheckerOptions, TypeChecker};
use gradus_types::TypeContext;

/// Expression builder handing out fresh ids
pub struct Ir {
    next: u32,
}

impl Ir {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn expr(&mut self, kind: ExprKind) -> Expr {
        self.next += 1;
        Expr::new(ExprId(self.next), kind, Span::new(self.next as usize, self.next as usize + 1, 1, 1))
    }

    pub fn ident(&mut self, name: &str) -> Expr {
        self.expr(ExprKind::Ident { name: name.into() })
    }

    pub fn string(&mut self, value: &str) -> Expr {
        self.expr(ExprKind::String {
            value: value.into(),
        })
    }

    pub fn number(&mut self, value: f64) -> Expr {
        self.expr(ExprKind::Number { value })
    }

    pub fn null(&mut self) -> Expr {
        self.expr(ExprKind::Null)
    }

    pub fn member(&mut self, object: Expr, property: &str) -> Expr {
        self.expr(ExprKind::Member {
            object: Box::new(object),
            property: property.into(),
        })
    }

    pub fn call(&mut self, callee: Expr, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Call {
            callee: Box::new(callee),
            type_args: vec![],
            args,
        })
    }

    pub fn call_named(&mut self, name: &str, args: Vec<Expr>) -> Expr {
        let callee = self.ident(name);
        self.call(callee, args)
    }

    pub fn binary(&mut self, op: BinaryOp, left: Expr, right: Expr) -> Expr {
        self.expr(ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    /// `typeof var === tag`
    pub fn typeof_is(&mut self, var: &str, tag: &str) -> Expr {
        let operand = self.ident(var);
        let typeof_expr = self.expr(ExprKind::Unary {
            op: UnaryOp::TypeOf,
            operand: Box::new(operand),
        });
        let tag = self.string(tag);
        self.binary(BinaryOp::StrictEq, typeof_expr, tag)
    }

    pub fn object(&mut self, fields: Vec<(&str, Expr)>) -> Expr {
        let members = fields
            .into_iter()
            .map(|(name, value)| ObjectMember::Property {
                name: name.into(),
                value,
            })
            .collect();
        self.expr(ExprKind::Object { members })
    }

    /// `(params) => body`
    pub fn arrow(&mut self, params: Vec<Param>, body: Expr) -> Expr {
        self.expr(ExprKind::Function(Box::new(FunctionExpr {
            type_params: vec![],
            params,
            return_type: None,
            is_async: false,
            body: FunctionBody::Expr {
                expr: Box::new(body),
            },
        })))
    }

    pub fn await_(&mut self, value: Expr) -> Expr {
        self.expr(ExprKind::Await {
            value: Box::new(value),
        })
    }
}

pub fn stmt(kind: StmtKind) -> Stmt {
    Stmt::new(kind, Span::default())
}

pub fn expr_stmt(expr: Expr) -> Stmt {
    stmt(StmtKind::Expr { expr })
}

pub fn ret(value: Expr) -> Stmt {
    stmt(StmtKind::Return { value: Some(value) })
}

pub fn const_(name: &str, ty: Option<TypeExpr>, init: Expr) -> Stmt {
    stmt(StmtKind::Var {
        var_kind: VarKind::Const,
        name: name.into(),
        ty,
        init: Some(init),
    })
}

pub fn let_(name: &str, ty: Option<TypeExpr>, init: Expr) -> Stmt {
    stmt(StmtKind::Var {
        var_kind: VarKind::Let,
        name: name.into(),
        ty,
        init: Some(init),
    })
}

pub fn if_(cond: Expr, then_branch: Vec<Stmt>, else_branch: Option<Vec<Stmt>>) -> Stmt {
    stmt(StmtKind::If {
        cond,
        then_branch,
        else_branch,
    })
}

pub fn alias(name: &str, type_params: Vec<TypeParamDecl>, body: TypeExpr) -> Stmt {
    stmt(StmtKind::TypeAlias {
        name: name.into(),
        type_params,
        body,
    })
}

pub fn function(name: &str, params: Vec<Param>, return_type: Option<TypeExpr>, body: Vec<Stmt>) -> FunctionDecl {
    FunctionDecl {
        name: name.into(),
        type_params: vec![],
        params,
        rest: None,
        return_type,
        predicate: None,
        is_async: false,
        body: Some(body),
    }
}

pub fn named(name: &str) -> TypeExpr {
    TypeExpr::named(name)
}

pub fn union(names: &[&str]) -> TypeExpr {
    TypeExpr::union(names.iter().map(|n| TypeExpr::named(*n)).collect())
}

pub fn object_type(fields: Vec<(&str, TypeExpr)>) -> TypeExpr {
    TypeExpr::object(
        fields
            .into_iter()
            .map(|(name, ty)| PropertyDecl::new(name, ty))
            .collect(),
    )
}

pub fn check(statements: Vec<Stmt>) -> (TypeContext, CheckResult) {
    check_with(statements, CheckerOptions::default())
}

pub fn check_with(statements: Vec<Stmt>, options: CheckerOptions) -> (TypeContext, CheckResult) {
    let mut ctx = TypeContext::with_limits(options.limits());
    let unit = Unit {
        path: "main.gd".into(),
        source: String::new(),
        statements,
    };
    let result = TypeChecker::new(&mut ctx, options).check_unit(&unit);
    (ctx, result)
}

/// Display the recorded type of an expression
pub fn type_of(ctx: &TypeContext, result: &CheckResult, expr: ExprId) -> String {
    let id = result
        .type_of(expr)
        .unwrap_or_else(|| panic!("no type recorded for {:?}", expr));
    ctx.display(id)
}
