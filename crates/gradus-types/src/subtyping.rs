//! Subtyping rules for the Gradus type system
//!
//! Implements the structural relation T <: U (T is a subtype of U).
//! Recursive types are handled coinductively: a pair that is already being
//! compared further up the stack is assumed to hold.

use crate::apparent;
use crate::context::{FieldVariance, TypeContext};
use crate::error::TypeError;
use crate::evaluate::Evaluator;
use crate::infer::InferenceContext;
use crate::substitute::{substitute, Substitution};
use crate::ty::*;
use rustc_hash::FxHashSet;

/// Context for checking subtyping relationships
pub struct SubtypingContext<'a> {
    /// Type context for resolving types
    type_ctx: &'a mut TypeContext,

    /// Pairs currently assumed to hold
    assumptions: FxHashSet<(TypeId, TypeId)>,
}

impl<'a> SubtypingContext<'a> {
    /// Create a new subtyping context
    pub fn new(type_ctx: &'a mut TypeContext) -> Self {
        SubtypingContext {
            type_ctx,
            assumptions: FxHashSet::default(),
        }
    }

    /// Check `sub <: sup`, surfacing a tripped recursion guard as an error
    pub fn check_subtype(&mut self, sub: TypeId, sup: TypeId) -> Result<bool, TypeError> {
        let result = self.is_subtype(sub, sup);
        match self.type_ctx.take_depth_error() {
            Some(err) => Err(err),
            None => Ok(result),
        }
    }

    /// Check if `sub` is a subtype of `sup` (sub <: sup)
    ///
    /// Returns true if a value of type `sub` can be used where `sup` is expected.
    /// A tripped recursion guard answers `false` and stays recorded on the
    /// type context.
    pub fn is_subtype(&mut self, sub: TypeId, sup: TypeId) -> bool {
        // Reflexivity: T <: T
        if sub == sup {
            return true;
        }

        match (self.type_ctx.resolve(sub), self.type_ctx.resolve(sup)) {
            (_, Type::Any | Type::Unknown) => return true,
            (Type::Any | Type::Never, _) => return true,
            _ => {}
        }

        if self.assumptions.contains(&(sub, sup)) {
            return true;
        }
        if !self.type_ctx.enter_recursion() {
            return false;
        }
        self.assumptions.insert((sub, sup));
        let result = self.is_subtype_inner(sub, sup);
        self.assumptions.remove(&(sub, sup));
        self.type_ctx.leave_recursion();
        result
    }

    /// Mutual subtyping
    pub fn is_equal(&mut self, a: TypeId, b: TypeId) -> bool {
        a == b || (self.is_subtype(a, b) && self.is_subtype(b, a))
    }

    /// Assignability. `any` flows both ways, which `is_subtype` already encodes.
    pub fn is_assignable(&mut self, source: TypeId, target: TypeId) -> bool {
        self.is_subtype(source, target)
    }

    fn evaluate(&mut self, id: TypeId) -> TypeId {
        Evaluator::new(self.type_ctx).evaluate(id)
    }

    fn needs_evaluation(&self, ty: &Type) -> bool {
        match ty {
            Type::Intersection(i) => i
                .members
                .iter()
                .any(|&m| self.type_ctx.resolve(m).is_reducible()),
            other => other.is_reducible(),
        }
    }

    fn is_subtype_inner(&mut self, sub: TypeId, sup: TypeId) -> bool {
        let sub_ty = self.type_ctx.shared(sub);
        let sup_ty = self.type_ctx.shared(sup);

        if let (Type::Ref(a), Type::Ref(b)) = (sub_ty.as_ref(), sup_ty.as_ref()) {
            if a.name == b.name {
                if let Some(answer) = self.compare_by_variance(a, b) {
                    return answer;
                }
            }
        }

        if self.needs_evaluation(&sub_ty) {
            let evaluated = self.evaluate(sub);
            if evaluated != sub {
                return self.is_subtype(evaluated, sup);
            }
        }
        if self.needs_evaluation(&sup_ty) {
            let evaluated = self.evaluate(sup);
            if evaluated != sup {
                return self.is_subtype(sub, evaluated);
            }
        }

        match (sub_ty.as_ref(), sup_ty.as_ref()) {
            (Type::Union(u), _) => u.members.iter().all(|&m| self.is_subtype(m, sup)),

            (Type::TypeParam(tp), _) => {
                if let Type::Union(u) = sup_ty.as_ref() {
                    if u.members.iter().any(|&m| self.is_subtype(sub, m)) {
                        return true;
                    }
                }
                let bound = tp.constraint.unwrap_or(TypeId::UNKNOWN);
                self.is_subtype(bound, sup)
            }

            (Type::Intersection(i), _) => i.members.iter().any(|&m| self.is_subtype(m, sup)),

            (_, Type::Union(u)) => u.members.iter().any(|&m| self.is_subtype(sub, m)),

            (_, Type::Intersection(i)) => i.members.iter().all(|&m| self.is_subtype(sub, m)),

            // Deferred forms compare through what they can produce
            (Type::Conditional(c), _) => {
                self.is_subtype(c.true_type, sup) && self.is_subtype(c.false_type, sup)
            }
            (Type::KeyOf(_), _) => {
                let keys = self
                    .type_ctx
                    .union_type(vec![TypeId::STRING, TypeId::NUMBER, TypeId::SYMBOL]);
                self.is_subtype(keys, sup)
            }
            (Type::TemplateLiteral(_) | Type::StringMapping(_), _) => {
                self.is_subtype(TypeId::STRING, sup)
            }

            (Type::Primitive(a), Type::Primitive(b)) => {
                a == b || (*a == PrimitiveType::Undefined && *b == PrimitiveType::Void)
            }
            (Type::Literal(lit), Type::Primitive(p)) => lit.base() == *p,

            (Type::Object(a), Type::Object(b)) => self.is_object_subtype(a, b),
            (Type::Primitive(_) | Type::Literal(_) | Type::Array(_) | Type::Tuple(_), Type::Object(b)) => {
                self.is_apparent_subtype(sub, b)
            }
            (Type::Function(_), Type::Object(b)) => {
                b.properties.iter().all(|p| p.optional) && b.index_signature.is_none()
            }

            (Type::Array(a), Type::Array(b)) => self.is_subtype(a.element, b.element),
            (Type::Tuple(t), Type::Array(a)) => {
                t.elements.iter().all(|e| self.is_subtype(e.ty, a.element))
                    && t.rest.map_or(true, |r| self.is_subtype(r, a.element))
            }
            (Type::Tuple(a), Type::Tuple(b)) => self.is_tuple_subtype(a, b),
            (Type::Array(a), Type::Tuple(b)) => {
                b.elements.is_empty() && b.rest.map_or(false, |r| self.is_subtype(a.element, r))
            }

            (Type::Function(f), Type::Function(g)) => self.is_function_subtype(f, g),

            (Type::Promise(a), Type::Promise(b)) => self.is_subtype(*a, *b),

            _ => false,
        }
    }

    /// Generic references compared argument-wise, when every parameter of the
    /// alias carries a variance annotation. `None` means compare structurally.
    fn compare_by_variance(&mut self, a: &RefType, b: &RefType) -> Option<bool> {
        if a.args.len() != b.args.len() {
            return None;
        }
        if a.args == b.args {
            return Some(true);
        }
        let def = self.type_ctx.alias(&a.name)?;
        if def.params.len() != a.args.len() {
            return None;
        }
        let mut variances = Vec::with_capacity(def.params.len());
        for &param in &def.params {
            match self.type_ctx.resolve(param) {
                Type::TypeParam(TypeParam {
                    variance: Some(v), ..
                }) => variances.push(*v),
                _ => return None,
            }
        }
        let ok = variances
            .into_iter()
            .zip(a.args.iter().zip(&b.args))
            .all(|(variance, (&x, &y))| match variance {
                Variance::Covariant => self.is_subtype(x, y),
                Variance::Contravariant => self.is_subtype(y, x),
                Variance::Invariant => self.is_equal(x, y),
            });
        Some(ok)
    }

    fn is_object_subtype(&mut self, sub: &ObjectType, sup: &ObjectType) -> bool {
        let covariant_fields = self.type_ctx.limits().field_variance == FieldVariance::Covariant;

        for prop in &sup.properties {
            match sub.property(&prop.name) {
                Some(have) => {
                    if have.optional && !prop.optional {
                        return false;
                    }
                    let ok = if prop.readonly || covariant_fields {
                        self.is_subtype(have.ty, prop.ty)
                    } else {
                        self.is_equal(have.ty, prop.ty)
                    };
                    if !ok {
                        return false;
                    }
                }
                None => {
                    if !prop.optional {
                        return false;
                    }
                }
            }
        }

        if let Some(index) = sup.index_signature {
            let fields_fit = sub.properties.iter().all(|p| self.is_subtype(p.ty, index));
            let index_fits = sub.index_signature.map_or(true, |i| self.is_subtype(i, index));
            if !fields_fit || !index_fits {
                return false;
            }
        }

        true
    }

    /// Primitives and arrays against object shapes, via their built-in members
    fn is_apparent_subtype(&mut self, sub: TypeId, sup: &ObjectType) -> bool {
        let nullish = matches!(self.type_ctx.resolve(sub), Type::Primitive(p) if p.is_nullish());
        if nullish || sup.index_signature.is_some() {
            return false;
        }
        for prop in &sup.properties {
            match apparent::apparent_member(self.type_ctx, sub, &prop.name) {
                Some(member) => {
                    if !self.is_subtype(member, prop.ty) {
                        return false;
                    }
                }
                None if prop.optional => {}
                None => return false,
            }
        }
        true
    }

    fn is_tuple_subtype(&mut self, sub: &TupleType, sup: &TupleType) -> bool {
        if sub.min_len() < sup.min_len() {
            return false;
        }
        for (i, want) in sup.elements.iter().enumerate() {
            let have = match sub.element_at(i) {
                Some(ty) => ty,
                None if want.optional => continue,
                None => return false,
            };
            if !self.is_subtype(have, want.ty) {
                return false;
            }
        }
        for extra in sub.elements.iter().skip(sup.elements.len()) {
            match sup.rest {
                Some(rest) => {
                    if !self.is_subtype(extra.ty, rest) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        match (sub.rest, sup.rest) {
            (Some(a), Some(b)) => self.is_subtype(a, b),
            (Some(_), None) => false,
            _ => true,
        }
    }

    fn is_function_subtype(&mut self, f: &FunctionType, g: &FunctionType) -> bool {
        if f.kind != g.kind {
            return false;
        }

        // Bring generic sources into the target's terms first
        let f = if f.type_params.is_empty() {
            f.clone()
        } else if f.type_params.len() == g.type_params.len() {
            let renaming: Substitution = f
                .type_params
                .iter()
                .copied()
                .zip(g.type_params.iter().copied())
                .collect();
            self.instantiate_signature(f, &renaming)
        } else {
            let mut inference = InferenceContext::new(self.type_ctx, &f.type_params);
            for (i, param) in f.params.iter().enumerate() {
                if let Some(target) = g.param_type_at(i) {
                    inference.infer(param.ty, target);
                }
            }
            let solution = inference.solve();
            self.instantiate_signature(f, &solution.substitution)
        };

        let provided = if g.rest.is_some() {
            usize::MAX
        } else {
            g.params.len()
        };
        if f.min_params() > provided {
            return false;
        }

        let count = f.params.len().max(g.params.len());
        for i in 0..count {
            match (f.param_type_at(i), g.param_type_at(i)) {
                (Some(have), Some(want)) => {
                    if !self.is_subtype(want, have) {
                        return false;
                    }
                }
                (None, _) => {}
                (Some(_), None) => {
                    if i < f.params.len() && !f.params[i].optional {
                        return false;
                    }
                }
            }
        }
        if let (Some(have), Some(want)) = (f.rest, g.rest) {
            if !self.is_subtype(want, have) {
                return false;
            }
        }

        match (&f.predicate, &g.predicate) {
            (_, None) => {}
            (Some(p), Some(q)) => {
                if p.param != q.param || p.asserts != q.asserts || !self.is_subtype(p.ty, q.ty) {
                    return false;
                }
            }
            (None, Some(_)) => return false,
        }

        g.return_type == TypeId::VOID || self.is_subtype(f.return_type, g.return_type)
    }

    fn instantiate_signature(&mut self, f: &FunctionType, subst: &Substitution) -> FunctionType {
        let mut without_params = f.clone();
        without_params.type_params.clear();
        let id = self.type_ctx.function_type(without_params);
        let instantiated = substitute(self.type_ctx, id, subst);
        match self.type_ctx.shared(instantiated).as_ref() {
            Type::Function(func) => func.clone(),
            _ => f.clone(),
        }
    }
}

/// `sub <: sup` on a fresh subtyping context
pub fn check_subtype(ctx: &mut TypeContext, sub: TypeId, sup: TypeId) -> Result<bool, TypeError> {
    SubtypingContext::new(ctx).check_subtype(sub, sup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TypeLimits;

    fn obj(ctx: &mut TypeContext, fields: &[(&str, TypeId)]) -> TypeId {
        let props = fields
            .iter()
            .map(|(n, t)| PropertySignature::new(*n, *t))
            .collect();
        ctx.object_type(props, None)
    }

    fn func(ctx: &mut TypeContext, params: &[TypeId], ret: TypeId) -> TypeId {
        let params = params
            .iter()
            .enumerate()
            .map(|(i, &ty)| ParamSignature {
                name: format!("p{}", i),
                ty,
                optional: false,
            })
            .collect();
        ctx.function_type(FunctionType::new(params, ret))
    }

    #[test]
    fn test_reflexivity() {
        let mut ctx = TypeContext::new();
        let o = obj(&mut ctx, &[("a", TypeId::NUMBER)]);
        let mut sub = SubtypingContext::new(&mut ctx);
        assert!(sub.is_subtype(TypeId::NUMBER, TypeId::NUMBER));
        assert!(sub.is_subtype(o, o));
    }

    #[test]
    fn test_never_is_bottom_and_unknown_is_top() {
        let mut ctx = TypeContext::new();
        let mut sub = SubtypingContext::new(&mut ctx);
        assert!(sub.is_subtype(TypeId::NEVER, TypeId::STRING));
        assert!(sub.is_subtype(TypeId::STRING, TypeId::UNKNOWN));
        assert!(!sub.is_subtype(TypeId::UNKNOWN, TypeId::STRING));
    }

    #[test]
    fn test_any_is_bidirectional() {
        let mut ctx = TypeContext::new();
        let mut sub = SubtypingContext::new(&mut ctx);
        assert!(sub.is_assignable(TypeId::ANY, TypeId::NUMBER));
        assert!(sub.is_assignable(TypeId::NUMBER, TypeId::ANY));
    }

    #[test]
    fn test_literal_subtyping() {
        let mut ctx = TypeContext::new();
        let a = ctx.string_literal("a");
        let b = ctx.string_literal("b");
        let mut sub = SubtypingContext::new(&mut ctx);
        assert!(sub.is_subtype(a, TypeId::STRING));
        assert!(!sub.is_subtype(TypeId::STRING, a));
        assert!(!sub.is_subtype(a, b));
    }

    #[test]
    fn test_undefined_is_void() {
        let mut ctx = TypeContext::new();
        let mut sub = SubtypingContext::new(&mut ctx);
        assert!(sub.is_subtype(TypeId::UNDEFINED, TypeId::VOID));
        assert!(!sub.is_subtype(TypeId::VOID, TypeId::UNDEFINED));
        assert!(!sub.is_subtype(TypeId::NULL, TypeId::STRING));
    }

    #[test]
    fn test_union_subtyping() {
        let mut ctx = TypeContext::new();
        let sn = ctx.union_type(vec![TypeId::STRING, TypeId::NUMBER]);
        let snb = ctx.union_type(vec![TypeId::STRING, TypeId::NUMBER, TypeId::BOOLEAN]);
        let mut sub = SubtypingContext::new(&mut ctx);
        assert!(sub.is_subtype(TypeId::STRING, sn));
        assert!(sub.is_subtype(sn, snb));
        assert!(!sub.is_subtype(snb, sn));
    }

    #[test]
    fn test_type_param_into_union_containing_it() {
        let mut ctx = TypeContext::new();
        let t = ctx.type_param(TypeParam {
            name: "T".into(),
            constraint: None,
            default: None,
            variance: None,
            scope: 1,
        });
        let or_null = ctx.union_type(vec![t, TypeId::NULL]);
        let promise = ctx.promise_type(t);
        let promise_or_t = ctx.union_type(vec![promise, t]);
        assert_eq!(check_subtype(&mut ctx, t, or_null), Ok(true));
        let mut sub = SubtypingContext::new(&mut ctx);
        assert!(sub.is_subtype(t, promise_or_t));
        assert!(!sub.is_subtype(or_null, t));
        assert!(!sub.is_subtype(t, TypeId::NULL));
    }

    #[test]
    fn test_object_width_subtyping() {
        let mut ctx = TypeContext::new();
        let wide = obj(&mut ctx, &[("x", TypeId::NUMBER), ("y", TypeId::NUMBER)]);
        let narrow = obj(&mut ctx, &[("x", TypeId::NUMBER)]);
        let mut sub = SubtypingContext::new(&mut ctx);
        assert!(sub.is_subtype(wide, narrow));
        assert!(!sub.is_subtype(narrow, wide));
    }

    #[test]
    fn test_mutable_fields_are_invariant() {
        let mut ctx = TypeContext::new();
        let lit = ctx.string_literal("a");
        let literal_field = obj(&mut ctx, &[("x", lit)]);
        let string_field = obj(&mut ctx, &[("x", TypeId::STRING)]);
        let readonly_field = ctx.object_type(
            vec![PropertySignature::new("x", TypeId::STRING).readonly()],
            None,
        );
        let mut sub = SubtypingContext::new(&mut ctx);
        assert!(!sub.is_subtype(literal_field, string_field));
        assert!(sub.is_subtype(literal_field, readonly_field));
    }

    #[test]
    fn test_covariant_field_option() {
        let mut ctx = TypeContext::with_limits(TypeLimits {
            field_variance: FieldVariance::Covariant,
            ..TypeLimits::default()
        });
        let lit = ctx.string_literal("a");
        let literal_field = obj(&mut ctx, &[("x", lit)]);
        let string_field = obj(&mut ctx, &[("x", TypeId::STRING)]);
        let mut sub = SubtypingContext::new(&mut ctx);
        assert!(sub.is_subtype(literal_field, string_field));
    }

    #[test]
    fn test_optional_fields() {
        let mut ctx = TypeContext::new();
        let empty = obj(&mut ctx, &[]);
        let optional = ctx.object_type(
            vec![PropertySignature::new("x", TypeId::NUMBER).optional()],
            None,
        );
        let mut sub = SubtypingContext::new(&mut ctx);
        assert!(sub.is_subtype(empty, optional));
        assert!(sub.is_subtype(optional, empty));
    }

    #[test]
    fn test_function_subtyping_contravariance() {
        let mut ctx = TypeContext::new();
        let sn = ctx.union_type(vec![TypeId::STRING, TypeId::NUMBER]);
        let takes_wide = func(&mut ctx, &[sn], TypeId::VOID);
        let takes_narrow = func(&mut ctx, &[TypeId::STRING], TypeId::VOID);
        let mut sub = SubtypingContext::new(&mut ctx);
        assert!(sub.is_subtype(takes_wide, takes_narrow));
        assert!(!sub.is_subtype(takes_narrow, takes_wide));
    }

    #[test]
    fn test_function_subtyping_covariance() {
        let mut ctx = TypeContext::new();
        let lit = ctx.number_literal(1.0);
        let returns_lit = func(&mut ctx, &[], lit);
        let returns_number = func(&mut ctx, &[], TypeId::NUMBER);
        let mut sub = SubtypingContext::new(&mut ctx);
        assert!(sub.is_subtype(returns_lit, returns_number));
        assert!(!sub.is_subtype(returns_number, returns_lit));
    }

    #[test]
    fn test_fewer_parameters_accepted() {
        let mut ctx = TypeContext::new();
        let none = func(&mut ctx, &[], TypeId::VOID);
        let two = func(&mut ctx, &[TypeId::STRING, TypeId::NUMBER], TypeId::VOID);
        let mut sub = SubtypingContext::new(&mut ctx);
        assert!(sub.is_subtype(none, two));
        assert!(!sub.is_subtype(two, none));
    }

    #[test]
    fn test_tuple_subtyping() {
        let mut ctx = TypeContext::new();
        let el = |ty| TupleElement {
            ty,
            optional: false,
        };
        let pair = ctx.tuple_type(vec![el(TypeId::STRING), el(TypeId::NUMBER)], None);
        let single = ctx.tuple_type(vec![el(TypeId::STRING)], None);
        let sn = ctx.union_type(vec![TypeId::STRING, TypeId::NUMBER]);
        let arr = ctx.array_type(sn);
        let mut sub = SubtypingContext::new(&mut ctx);
        assert!(sub.is_subtype(pair, arr));
        assert!(!sub.is_subtype(pair, single));
        assert!(!sub.is_subtype(arr, pair));
    }

    #[test]
    fn test_recursive_alias_is_coinductive() {
        let mut ctx = TypeContext::new();
        let node = ctx.declare_alias("Node", vec![]);
        let children = ctx.array_type(node);
        let body = obj(&mut ctx, &[("children", children), ("value", TypeId::NUMBER)]);
        ctx.define_alias("Node", body).expect("define");

        let tree = ctx.declare_alias("Tree", vec![]);
        let kids = ctx.array_type(tree);
        let tree_body = obj(&mut ctx, &[("children", kids), ("value", TypeId::NUMBER)]);
        ctx.define_alias("Tree", tree_body).expect("define");

        assert_eq!(check_subtype(&mut ctx, node, tree), Ok(true));
        assert_eq!(check_subtype(&mut ctx, tree, node), Ok(true));
    }

    #[test]
    fn test_string_against_apparent_shape() {
        let mut ctx = TypeContext::new();
        let has_length = obj(&mut ctx, &[("length", TypeId::NUMBER)]);
        let mut sub = SubtypingContext::new(&mut ctx);
        assert!(sub.is_subtype(TypeId::STRING, has_length));
        assert!(!sub.is_subtype(TypeId::NUMBER, has_length));
    }
}
