//! Replacement of type parameters (and other placeholders) by concrete types
//!
//! Substitution walks the graph structurally. References are never expanded:
//! only their arguments are rewritten, so recursive aliases stay lazy.

use crate::context::TypeContext;
use crate::evaluate::Evaluator;
use crate::ty::*;
use rustc_hash::FxHashMap;

/// Mapping from placeholder ids to their replacements
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Substitution {
    map: FxHashMap<TypeId, TypeId>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, from: TypeId, to: TypeId) {
        self.map.insert(from, to);
    }

    pub fn get(&self, from: TypeId) -> Option<TypeId> {
        self.map.get(&from).copied()
    }

    pub fn contains(&self, from: TypeId) -> bool {
        self.map.contains_key(&from)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, TypeId)> + '_ {
        self.map.iter().map(|(&k, &v)| (k, v))
    }
}

impl FromIterator<(TypeId, TypeId)> for Substitution {
    fn from_iter<I: IntoIterator<Item = (TypeId, TypeId)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}

/// Apply `subst` to `ty`
pub fn substitute(ctx: &mut TypeContext, ty: TypeId, subst: &Substitution) -> TypeId {
    if subst.is_empty() {
        return ty;
    }
    Substituter {
        ctx,
        subst,
        memo: FxHashMap::default(),
    }
    .apply(ty)
}

struct Substituter<'a> {
    ctx: &'a mut TypeContext,
    subst: &'a Substitution,
    memo: FxHashMap<TypeId, TypeId>,
}

impl Substituter<'_> {
    fn apply(&mut self, id: TypeId) -> TypeId {
        if let Some(to) = self.subst.get(id) {
            return to;
        }
        if let Some(&done) = self.memo.get(&id) {
            return done;
        }
        if !self.ctx.enter_recursion() {
            return id;
        }
        let ty = self.ctx.shared(id);
        let result = self.apply_structural(id, &ty);
        self.ctx.leave_recursion();
        self.memo.insert(id, result);
        result
    }

    fn apply_all(&mut self, ids: &[TypeId]) -> Vec<TypeId> {
        ids.iter().map(|&id| self.apply(id)).collect()
    }

    fn apply_structural(&mut self, id: TypeId, ty: &Type) -> TypeId {
        match ty {
            Type::Primitive(_)
            | Type::Literal(_)
            | Type::Any
            | Type::Unknown
            | Type::Never
            | Type::TypeParam(_)
            | Type::TypeVar(_)
            | Type::Infer(_) => id,
            Type::Object(obj) => {
                let properties = obj
                    .properties
                    .iter()
                    .map(|p| PropertySignature {
                        name: p.name.clone(),
                        ty: self.apply(p.ty),
                        optional: p.optional,
                        readonly: p.readonly,
                    })
                    .collect();
                let index = obj.index_signature.map(|i| self.apply(i));
                self.ctx.object_type(properties, index)
            }
            Type::Array(arr) => {
                let element = self.apply(arr.element);
                self.ctx.array_type(element)
            }
            Type::Tuple(tuple) => {
                let elements = tuple
                    .elements
                    .iter()
                    .map(|e| TupleElement {
                        ty: self.apply(e.ty),
                        optional: e.optional,
                    })
                    .collect();
                let rest = tuple.rest.map(|r| self.apply(r));
                self.ctx.tuple_type(elements, rest)
            }
            Type::Function(func) => {
                let params = func
                    .params
                    .iter()
                    .map(|p| ParamSignature {
                        name: p.name.clone(),
                        ty: self.apply(p.ty),
                        optional: p.optional,
                    })
                    .collect();
                let rest = func.rest.map(|r| self.apply(r));
                let return_type = self.apply(func.return_type);
                let predicate = func.predicate.as_ref().map(|pred| TypePredicate {
                    param: pred.param,
                    ty: self.apply(pred.ty),
                    asserts: pred.asserts,
                });
                self.ctx.function_type(FunctionType {
                    type_params: func.type_params.clone(),
                    params,
                    rest,
                    return_type,
                    kind: func.kind,
                    predicate,
                })
            }
            Type::Union(u) => {
                let members = self.apply_all(&u.members);
                self.ctx.union_type(members)
            }
            Type::Intersection(i) => {
                let members = self.apply_all(&i.members);
                self.ctx.intersection_type(members)
            }
            Type::Ref(r) => {
                let args = self.apply_all(&r.args);
                self.ctx.reference(r.name.clone(), args)
            }
            Type::Conditional(c) => self.apply_conditional(id, c),
            Type::Mapped(m) => {
                let constraint = self.apply(m.constraint);
                let template = self.apply(m.template);
                self.ctx.mapped_type(MappedType {
                    param: m.param,
                    constraint,
                    template,
                    readonly: m.readonly,
                    optional: m.optional,
                })
            }
            Type::KeyOf(inner) => {
                let inner = self.apply(*inner);
                self.ctx.keyof_type(inner)
            }
            Type::IndexedAccess(ia) => {
                let object = self.apply(ia.object);
                let index = self.apply(ia.index);
                self.ctx.indexed_access(object, index)
            }
            Type::TemplateLiteral(t) => {
                let spans = t
                    .spans
                    .iter()
                    .map(|span| match span {
                        TemplateSpan::Text(text) => TemplateSpan::Text(text.clone()),
                        TemplateSpan::Hole(hole) => TemplateSpan::Hole(self.apply(*hole)),
                    })
                    .collect();
                self.ctx.template_literal(spans)
            }
            Type::StringMapping(sm) => {
                let inner = self.apply(sm.inner);
                self.ctx.string_mapping(sm.kind, inner)
            }
            Type::Promise(inner) => {
                let inner = self.apply(*inner);
                self.ctx.promise_type(inner)
            }
        }
    }

    /// A distributive conditional whose checked parameter is being replaced
    /// by a union is instantiated once per member.
    fn apply_conditional(&mut self, id: TypeId, c: &ConditionalType) -> TypeId {
        if c.distributive {
            if let Some(arg) = self.subst.get(c.check) {
                let evaluated = Evaluator::new(self.ctx).evaluate(arg);
                match self.ctx.resolve(evaluated) {
                    Type::Never => return TypeId::NEVER,
                    Type::Union(u) => {
                        let members = u.members.clone();
                        let mut results = Vec::with_capacity(members.len());
                        for member in members {
                            let mut per_member = self.subst.clone();
                            per_member.insert(c.check, member);
                            results.push(substitute(self.ctx, id, &per_member));
                        }
                        return self.ctx.union_type(results);
                    }
                    _ => {}
                }
            }
        }
        let check = self.apply(c.check);
        let extends = self.apply(c.extends);
        let true_type = self.apply(c.true_type);
        let false_type = self.apply(c.false_type);
        self.ctx
            .conditional(check, extends, true_type, false_type, c.distributive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(ctx: &mut TypeContext, name: &str) -> TypeId {
        let scope = ctx.fresh_scope();
        ctx.type_param(TypeParam {
            name: name.into(),
            constraint: None,
            default: None,
            variance: None,
            scope,
        })
    }

    #[test]
    fn test_substitute_nested() {
        let mut ctx = TypeContext::new();
        let t = param(&mut ctx, "T");
        let arr = ctx.array_type(t);
        let obj = ctx.object_type(vec![PropertySignature::new("items", arr)], None);

        let subst: Substitution = [(t, TypeId::STRING)].into_iter().collect();
        let result = substitute(&mut ctx, obj, &subst);

        let string_arr = ctx.array_type(TypeId::STRING);
        let expected = ctx.object_type(vec![PropertySignature::new("items", string_arr)], None);
        assert_eq!(result, expected);
    }

    #[test]
    fn test_substitute_keeps_reference_lazy() {
        let mut ctx = TypeContext::new();
        let t = param(&mut ctx, "T");
        let r = ctx.reference("List", vec![t]);
        let subst: Substitution = [(t, TypeId::NUMBER)].into_iter().collect();
        let result = substitute(&mut ctx, r, &subst);
        assert_eq!(result, ctx.reference("List", vec![TypeId::NUMBER]));
    }

    #[test]
    fn test_substitute_intersection_merges() {
        let mut ctx = TypeContext::new();
        let r = param(&mut ctx, "R");
        let point = ctx.object_type(vec![PropertySignature::new("x", TypeId::NUMBER)], None);
        let row = ctx.intersection_type(vec![point, r]);
        let color = ctx.object_type(vec![PropertySignature::new("color", TypeId::STRING)], None);

        let subst: Substitution = [(r, color)].into_iter().collect();
        let result = substitute(&mut ctx, row, &subst);

        let expected = ctx.object_type(
            vec![
                PropertySignature::new("x", TypeId::NUMBER),
                PropertySignature::new("color", TypeId::STRING),
            ],
            None,
        );
        assert_eq!(result, expected);
    }

    #[test]
    fn test_empty_substitution_is_identity() {
        let mut ctx = TypeContext::new();
        let t = param(&mut ctx, "T");
        assert_eq!(substitute(&mut ctx, t, &Substitution::new()), t);
    }
}
