//! Type guard detection for control flow-based type narrowing
//!
//! A condition is turned into a [`TypeGuard`] describing what holds on its
//! true edge. The false edge uses [`TypeGuard::negate`]. Conditions that do
//! not constrain any variable become [`TypeGuard::Opaque`].

use crate::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use gradus_types::{TypeId, TypePredicate};

/// Which nullish values a guard tests for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullKind {
    Null,
    Undefined,
    /// Loose `== null` matches both
    Both,
}

/// A type guard extracted from a conditional expression
#[derive(Debug, Clone, PartialEq)]
pub enum TypeGuard {
    /// `typeof x === "string"`
    TypeOf {
        var: String,
        type_name: String,
        negated: bool,
    },

    /// `x instanceof C`, with the instance type of `C`
    InstanceOf {
        var: String,
        instance: TypeId,
        negated: bool,
    },

    /// `"key" in x`
    In {
        var: String,
        key: String,
        negated: bool,
    },

    /// `if (x)`; negated is the falsy edge
    Truthy { var: String, negated: bool },

    /// `x === null`, `x === undefined`, `x == null`
    Nullish {
        var: String,
        kind: NullKind,
        negated: bool,
    },

    /// `x === "lit"`. `value` is a unit type.
    Literal {
        var: String,
        value: TypeId,
        negated: bool,
    },

    /// `x.tag === "lit"`
    Discriminant {
        var: String,
        field: String,
        value: TypeId,
        negated: bool,
    },

    /// `isFoo(x)` where the callee returns `x is T`
    Predicate {
        var: String,
        ty: TypeId,
        negated: bool,
    },

    And(Box<TypeGuard>, Box<TypeGuard>),
    Or(Box<TypeGuard>, Box<TypeGuard>),

    /// A condition that refines nothing
    Opaque,
}

impl TypeGuard {
    /// Guard that holds on the opposite edge
    pub fn negate(&self) -> TypeGuard {
        use TypeGuard::*;
        match self {
            TypeOf {
                var,
                type_name,
                negated,
            } => TypeOf {
                var: var.clone(),
                type_name: type_name.clone(),
                negated: !negated,
            },
            InstanceOf {
                var,
                instance,
                negated,
            } => InstanceOf {
                var: var.clone(),
                instance: *instance,
                negated: !negated,
            },
            In { var, key, negated } => In {
                var: var.clone(),
                key: key.clone(),
                negated: !negated,
            },
            Truthy { var, negated } => Truthy {
                var: var.clone(),
                negated: !negated,
            },
            Nullish { var, kind, negated } => Nullish {
                var: var.clone(),
                kind: *kind,
                negated: !negated,
            },
            Literal {
                var,
                value,
                negated,
            } => Literal {
                var: var.clone(),
                value: *value,
                negated: !negated,
            },
            Discriminant {
                var,
                field,
                value,
                negated,
            } => Discriminant {
                var: var.clone(),
                field: field.clone(),
                value: *value,
                negated: !negated,
            },
            Predicate { var, ty, negated } => Predicate {
                var: var.clone(),
                ty: *ty,
                negated: !negated,
            },
            And(a, b) => Or(Box::new(a.negate()), Box::new(b.negate())),
            Or(a, b) => And(Box::new(a.negate()), Box::new(b.negate())),
            Opaque => Opaque,
        }
    }

    /// Variable a simple guard refines
    pub fn var(&self) -> Option<&str> {
        use TypeGuard::*;
        match self {
            TypeOf { var, .. }
            | InstanceOf { var, .. }
            | In { var, .. }
            | Truthy { var, .. }
            | Nullish { var, .. }
            | Literal { var, .. }
            | Discriminant { var, .. }
            | Predicate { var, .. } => Some(var),
            And(..) | Or(..) | Opaque => None,
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, TypeGuard::Opaque)
    }
}

/// Type information guard extraction needs from the checker
pub trait GuardContext {
    /// Unit type of a literal expression (`"a"`, `1`, `true`, `null`, `undefined`)
    fn literal_type(&mut self, expr: &Expr) -> Option<TypeId>;

    /// Instance type constructed by the right operand of `instanceof`
    fn instance_type(&mut self, constructor: &Expr) -> Option<TypeId>;

    /// Predicate declared on the return type of a callee
    fn call_predicate(&mut self, callee: &Expr) -> Option<TypePredicate>;
}

/// Extract a type guard from a conditional expression
///
/// Returns `None` when the condition does not refine any variable.
///
/// # Supported Patterns
///
/// - `typeof x === "string"` (either operand order, `!==`, `==`, `!=`)
/// - `x instanceof C`
/// - `"key" in x`
/// - `x`, `!x`
/// - `x === null`, `x !== undefined`, `x == null`
/// - `x === "lit"`, `x.tag === "lit"`
/// - `isFoo(x)` for callees with a `x is T` return
/// - `a && b`, `a || b`
pub fn extract_type_guard(expr: &Expr, cx: &mut dyn GuardContext) -> Option<TypeGuard> {
    let guard = guard_of(expr, cx);
    if guard.is_opaque() {
        None
    } else {
        Some(guard)
    }
}

/// Guard that holds after an expression statement calling an
/// `asserts x is T` function
pub fn extract_assertion(expr: &Expr, cx: &mut dyn GuardContext) -> Option<TypeGuard> {
    let ExprKind::Call { callee, args, .. } = &expr.kind else {
        return None;
    };
    let predicate = cx.call_predicate(callee)?;
    if !predicate.asserts {
        return None;
    }
    let var = args.get(predicate.param)?.as_ident()?;
    Some(TypeGuard::Predicate {
        var: var.to_string(),
        ty: predicate.ty,
        negated: false,
    })
}

fn guard_of(expr: &Expr, cx: &mut dyn GuardContext) -> TypeGuard {
    match &expr.kind {
        ExprKind::Ident { name } => TypeGuard::Truthy {
            var: name.clone(),
            negated: false,
        },
        ExprKind::Unary {
            op: UnaryOp::Not,
            operand,
        } => guard_of(operand, cx).negate(),
        ExprKind::Binary { op, left, right } => match op {
            BinaryOp::And => combine(guard_of(left, cx), guard_of(right, cx), true),
            BinaryOp::Or => combine(guard_of(left, cx), guard_of(right, cx), false),
            op if op.is_equality() => {
                let negated = op.is_negated_equality();
                equality_guard(left, right, *op, negated, cx)
                    .or_else(|| equality_guard(right, left, *op, negated, cx))
                    .unwrap_or(TypeGuard::Opaque)
            }
            BinaryOp::InstanceOf => {
                let (Some(var), Some(instance)) = (left.as_ident(), cx.instance_type(right)) else {
                    return TypeGuard::Opaque;
                };
                TypeGuard::InstanceOf {
                    var: var.to_string(),
                    instance,
                    negated: false,
                }
            }
            BinaryOp::In => match (&left.kind, right.as_ident()) {
                (ExprKind::String { value }, Some(var)) => TypeGuard::In {
                    var: var.to_string(),
                    key: value.clone(),
                    negated: false,
                },
                _ => TypeGuard::Opaque,
            },
            _ => TypeGuard::Opaque,
        },
        ExprKind::Call { callee, args, .. } => {
            let Some(predicate) = cx.call_predicate(callee) else {
                return TypeGuard::Opaque;
            };
            if predicate.asserts {
                return TypeGuard::Opaque;
            }
            match args.get(predicate.param).and_then(|a| a.as_ident()) {
                Some(var) => TypeGuard::Predicate {
                    var: var.to_string(),
                    ty: predicate.ty,
                    negated: false,
                },
                None => TypeGuard::Opaque,
            }
        }
        _ => TypeGuard::Opaque,
    }
}

fn combine(a: TypeGuard, b: TypeGuard, conjunction: bool) -> TypeGuard {
    if a.is_opaque() && b.is_opaque() {
        TypeGuard::Opaque
    } else if conjunction {
        TypeGuard::And(Box::new(a), Box::new(b))
    } else {
        TypeGuard::Or(Box::new(a), Box::new(b))
    }
}

/// `subject <op> other`, where `other` is the constant side
fn equality_guard(
    subject: &Expr,
    other: &Expr,
    op: BinaryOp,
    negated: bool,
    cx: &mut dyn GuardContext,
) -> Option<TypeGuard> {
    // typeof x === "string"
    if let ExprKind::Unary {
        op: UnaryOp::TypeOf,
        operand,
    } = &subject.kind
    {
        let var = operand.as_ident()?;
        let ExprKind::String { value } = &other.kind else {
            return None;
        };
        return Some(TypeGuard::TypeOf {
            var: var.to_string(),
            type_name: value.clone(),
            negated,
        });
    }

    // x.tag === "lit"
    if let ExprKind::Member { object, property } = &subject.kind {
        let var = object.as_ident()?;
        let value = cx.literal_type(other)?;
        return Some(TypeGuard::Discriminant {
            var: var.to_string(),
            field: property.clone(),
            value,
            negated,
        });
    }

    let var = subject.as_ident()?.to_string();
    match &other.kind {
        ExprKind::Null | ExprKind::Undefined if op.is_loose() => Some(TypeGuard::Nullish {
            var,
            kind: NullKind::Both,
            negated,
        }),
        ExprKind::Null => Some(TypeGuard::Nullish {
            var,
            kind: NullKind::Null,
            negated,
        }),
        ExprKind::Undefined => Some(TypeGuard::Nullish {
            var,
            kind: NullKind::Undefined,
            negated,
        }),
        _ => {
            let value = cx.literal_type(other)?;
            Some(TypeGuard::Literal {
                var,
                value,
                negated,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ExprId, Span};
    use gradus_types::TypeContext;

    struct Fixture {
        ctx: TypeContext,
        predicate: Option<TypePredicate>,
    }

    impl GuardContext for Fixture {
        fn literal_type(&mut self, expr: &Expr) -> Option<TypeId> {
            match &expr.kind {
                ExprKind::String { value } => Some(self.ctx.string_literal(value.clone())),
                ExprKind::Number { value } => Some(self.ctx.number_literal(*value)),
                ExprKind::Bool { value } => Some(self.ctx.boolean_literal(*value)),
                _ => None,
            }
        }

        fn instance_type(&mut self, _constructor: &Expr) -> Option<TypeId> {
            Some(TypeId::STRING)
        }

        fn call_predicate(&mut self, _callee: &Expr) -> Option<TypePredicate> {
            self.predicate.clone()
        }
    }

    fn fixture() -> Fixture {
        Fixture {
            ctx: TypeContext::new(),
            predicate: None,
        }
    }

    fn e(kind: ExprKind) -> Expr {
        Expr::new(ExprId(0), kind, Span::default())
    }

    fn ident(name: &str) -> Expr {
        e(ExprKind::Ident { name: name.into() })
    }

    fn string(value: &str) -> Expr {
        e(ExprKind::String {
            value: value.into(),
        })
    }

    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        e(ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn type_of(operand: Expr) -> Expr {
        e(ExprKind::Unary {
            op: UnaryOp::TypeOf,
            operand: Box::new(operand),
        })
    }

    #[test]
    fn test_typeof_either_order() {
        let mut cx = fixture();
        let a = binary(BinaryOp::StrictEq, type_of(ident("x")), string("string"));
        let b = binary(BinaryOp::StrictNe, string("string"), type_of(ident("x")));
        assert_eq!(
            extract_type_guard(&a, &mut cx),
            Some(TypeGuard::TypeOf {
                var: "x".into(),
                type_name: "string".into(),
                negated: false
            })
        );
        assert_eq!(
            extract_type_guard(&b, &mut cx),
            Some(TypeGuard::TypeOf {
                var: "x".into(),
                type_name: "string".into(),
                negated: true
            })
        );
    }

    #[test]
    fn test_loose_null_covers_undefined() {
        let mut cx = fixture();
        let expr = binary(BinaryOp::Ne, ident("x"), e(ExprKind::Null));
        assert_eq!(
            extract_type_guard(&expr, &mut cx),
            Some(TypeGuard::Nullish {
                var: "x".into(),
                kind: NullKind::Both,
                negated: true
            })
        );
    }

    #[test]
    fn test_discriminant() {
        let mut cx = fixture();
        let member = e(ExprKind::Member {
            object: Box::new(ident("action")),
            property: "type".into(),
        });
        let expr = binary(BinaryOp::StrictEq, member, string("RESET"));
        let guard = extract_type_guard(&expr, &mut cx).unwrap();
        let reset = cx.ctx.string_literal("RESET");
        assert_eq!(
            guard,
            TypeGuard::Discriminant {
                var: "action".into(),
                field: "type".into(),
                value: reset,
                negated: false
            }
        );
    }

    #[test]
    fn test_not_and_de_morgan() {
        let mut cx = fixture();
        let expr = e(ExprKind::Unary {
            op: UnaryOp::Not,
            operand: Box::new(binary(BinaryOp::And, ident("a"), ident("b"))),
        });
        let guard = extract_type_guard(&expr, &mut cx).unwrap();
        let TypeGuard::Or(left, right) = guard else {
            panic!("expected disjunction, got {:?}", guard);
        };
        assert_eq!(
            *left,
            TypeGuard::Truthy {
                var: "a".into(),
                negated: true
            }
        );
        assert_eq!(right.var(), Some("b"));
    }

    #[test]
    fn test_predicate_call() {
        let mut cx = fixture();
        cx.predicate = Some(TypePredicate {
            param: 0,
            ty: TypeId::NUMBER,
            asserts: false,
        });
        let call = e(ExprKind::Call {
            callee: Box::new(ident("isNumber")),
            type_args: vec![],
            args: vec![ident("v")],
        });
        assert_eq!(
            extract_type_guard(&call, &mut cx),
            Some(TypeGuard::Predicate {
                var: "v".into(),
                ty: TypeId::NUMBER,
                negated: false
            })
        );
        assert_eq!(extract_assertion(&call, &mut cx), None);
    }

    #[test]
    fn test_plain_comparison_is_not_a_guard() {
        let mut cx = fixture();
        let expr = binary(
            BinaryOp::Lt,
            ident("x"),
            e(ExprKind::Number { value: 3.0 }),
        );
        assert_eq!(extract_type_guard(&expr, &mut cx), None);
    }
}
