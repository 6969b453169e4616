//! Inference of generic arguments at call sites
//!
//! Each type parameter gets a fresh inference variable. Parameter types are
//! walked against argument types, collecting candidates; solving joins the
//! candidates, widens literals where appropriate and falls back to defaults
//! and constraints for parameters nothing constrained.
//!
//! An intersection parameter `{ x: number } & R` with a naked `R` binds `R`
//! to the argument's remaining fields (row polymorphism).

use crate::context::TypeContext;
use crate::evaluate::evaluate;
use crate::substitute::{substitute, Substitution};
use crate::subtyping::SubtypingContext;
use crate::ty::*;
use rustc_hash::FxHashSet;

/// A solved parameter that does not satisfy its bound
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintFailure {
    pub param: TypeId,
    pub name: String,
    pub inferred: TypeId,
    pub constraint: TypeId,
}

/// Extra argument fields captured by an implicit row variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowCapture {
    pub var: TypeId,
    pub fields: TypeId,
}

/// Result of solving an inference context
#[derive(Debug, Clone, Default)]
pub struct Solution {
    /// Maps each type parameter (and its inference variable) to its solution
    pub substitution: Substitution,
    pub failures: Vec<ConstraintFailure>,
    pub rows: Vec<RowCapture>,
}

#[derive(Debug, Clone)]
struct VarState {
    param: TypeId,
    var: TypeId,
    name: String,
    constraint: Option<TypeId>,
    default: Option<TypeId>,
    covariant: Vec<TypeId>,
    contravariant: Vec<TypeId>,
}

/// Candidate collection for one generic call
pub struct InferenceContext<'a> {
    ctx: &'a mut TypeContext,
    vars: Vec<VarState>,
    rows: Vec<RowCapture>,
    visited: FxHashSet<(TypeId, TypeId, bool)>,
}

impl<'a> InferenceContext<'a> {
    pub fn new(ctx: &'a mut TypeContext, type_params: &[TypeId]) -> Self {
        let mut vars = Vec::with_capacity(type_params.len());
        for &param in type_params {
            let (name, constraint, default) = match ctx.resolve(param) {
                Type::TypeParam(tp) => (tp.name.clone(), tp.constraint, tp.default),
                _ => (String::new(), None, None),
            };
            let var = ctx.fresh_type_var();
            vars.push(VarState {
                param,
                var,
                name,
                constraint,
                default,
                covariant: Vec::new(),
                contravariant: Vec::new(),
            });
        }
        Self {
            ctx,
            vars,
            rows: Vec::new(),
            visited: FxHashSet::default(),
        }
    }

    /// Inference variable standing for `param`
    pub fn var_for(&self, param: TypeId) -> Option<TypeId> {
        self.vars.iter().find(|v| v.param == param).map(|v| v.var)
    }

    /// Collect candidates from one argument
    pub fn infer(&mut self, param_ty: TypeId, arg_ty: TypeId) {
        self.infer_from(param_ty, arg_ty, false);
        self.capture_implicit_row(param_ty, arg_ty);
    }

    /// Solutions found so far, for contextually typing later arguments.
    /// Parameters without candidates are left out.
    pub fn partial_substitution(&mut self) -> Substitution {
        let mut subst = Substitution::new();
        for i in 0..self.vars.len() {
            if let Some(ty) = self.join_candidates(i) {
                subst.insert(self.vars[i].param, ty);
            }
        }
        subst
    }

    /// Freeze every variable
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn solve(mut self) -> Solution {
        let mut subst = Substitution::new();
        let mut failures = Vec::new();

        for i in 0..self.vars.len() {
            let inferred = match self.join_candidates(i) {
                Some(ty) => ty,
                None => {
                    let state = &self.vars[i];
                    match (state.default, state.constraint) {
                        (Some(d), _) | (None, Some(d)) => substitute(self.ctx, d, &subst),
                        (None, None) => TypeId::UNKNOWN,
                    }
                }
            };
            let state = self.vars[i].clone();
            subst.insert(state.param, inferred);
            subst.insert(state.var, inferred);

            if let Some(constraint) = state.constraint {
                let bound = substitute(self.ctx, constraint, &subst);
                if !SubtypingContext::new(self.ctx).is_subtype(inferred, bound) {
                    tracing::debug!(
                        param = %state.name,
                        inferred = %self.ctx.display(inferred),
                        "inferred argument violates constraint"
                    );
                    failures.push(ConstraintFailure {
                        param: state.param,
                        name: state.name.clone(),
                        inferred,
                        constraint: bound,
                    });
                }
            }
        }

        for row in &self.rows {
            subst.insert(row.var, row.fields);
        }

        Solution {
            substitution: subst,
            failures,
            rows: self.rows,
        }
    }

    fn join_candidates(&mut self, i: usize) -> Option<TypeId> {
        let state = self.vars[i].clone();
        if !state.covariant.is_empty() {
            let joined = self.ctx.union_type(state.covariant);
            if self.keeps_literals(state.constraint) {
                Some(joined)
            } else {
                Some(self.ctx.widen_literals(joined))
            }
        } else if !state.contravariant.is_empty() {
            Some(self.ctx.intersection_type(state.contravariant))
        } else {
            None
        }
    }

    /// Literal candidates survive when the bound is itself primitive-like
    fn keeps_literals(&mut self, constraint: Option<TypeId>) -> bool {
        let Some(constraint) = constraint else {
            return false;
        };
        if matches!(self.ctx.resolve(constraint), Type::KeyOf(_)) {
            return true;
        }
        let bound = evaluate(self.ctx, constraint);
        let members = self.ctx.union_members(bound);
        !members.is_empty()
            && members.iter().all(|&m| {
                matches!(
                    self.ctx.resolve(m),
                    Type::Literal(_)
                        | Type::Primitive(
                            PrimitiveType::String
                                | PrimitiveType::Number
                                | PrimitiveType::Boolean
                                | PrimitiveType::BigInt
                        )
                )
            })
    }

    fn var_index(&self, param: TypeId) -> Option<usize> {
        self.vars.iter().position(|v| v.param == param)
    }

    fn add_candidate(&mut self, index: usize, candidate: TypeId, contravariant: bool) {
        let state = &mut self.vars[index];
        let list = if contravariant {
            &mut state.contravariant
        } else {
            &mut state.covariant
        };
        if !list.contains(&candidate) {
            list.push(candidate);
        }
    }

    fn is_subtype(&mut self, sub: TypeId, sup: TypeId) -> bool {
        SubtypingContext::new(self.ctx).is_subtype(sub, sup)
    }

    fn infer_from(&mut self, param: TypeId, arg: TypeId, contravariant: bool) {
        if param == arg || !self.visited.insert((param, arg, contravariant)) {
            return;
        }
        if !self.ctx.enter_recursion() {
            return;
        }
        self.infer_inner(param, arg, contravariant);
        self.ctx.leave_recursion();
    }

    fn infer_inner(&mut self, param: TypeId, arg: TypeId, contravariant: bool) {
        let param_ty = self.ctx.shared(param);
        if let Type::TypeParam(_) = param_ty.as_ref() {
            if let Some(index) = self.var_index(param) {
                self.add_candidate(index, arg, contravariant);
            }
            return;
        }
        if !self.mentions_inference_params(param) {
            return;
        }

        let arg = evaluate(self.ctx, arg);
        let arg_ty = self.ctx.shared(arg);

        match (param_ty.as_ref(), arg_ty.as_ref()) {
            (Type::Union(pu), _) => self.infer_into_union(&pu.members, arg, contravariant),
            (Type::Intersection(pi), _) => self.infer_into_row(&pi.members, arg, contravariant),
            (_, Type::Union(au)) if !matches!(param_ty.as_ref(), Type::Ref(_)) => {
                for &member in &au.members {
                    self.infer_from(param, member, contravariant);
                }
            }
            (Type::Object(po), Type::Object(ao)) => {
                for prop in &po.properties {
                    if let Some(have) = ao.read_type(&prop.name) {
                        self.infer_from(prop.ty, have, contravariant);
                    }
                }
                if let Some(index) = po.index_signature {
                    for prop in &ao.properties {
                        self.infer_from(index, prop.ty, contravariant);
                    }
                    if let Some(arg_index) = ao.index_signature {
                        self.infer_from(index, arg_index, contravariant);
                    }
                }
            }
            (Type::Array(pa), Type::Array(aa)) => {
                self.infer_from(pa.element, aa.element, contravariant)
            }
            (Type::Array(pa), Type::Tuple(at)) => {
                for el in &at.elements {
                    self.infer_from(pa.element, el.ty, contravariant);
                }
                if let Some(rest) = at.rest {
                    self.infer_from(pa.element, rest, contravariant);
                }
            }
            (Type::Tuple(pt), Type::Tuple(at)) => {
                for (pe, ae) in pt.elements.iter().zip(&at.elements) {
                    self.infer_from(pe.ty, ae.ty, contravariant);
                }
                if let (Some(pr), Some(ar)) = (pt.rest, at.rest) {
                    self.infer_from(pr, ar, contravariant);
                }
            }
            (Type::Function(pf), Type::Function(af)) => {
                for (pp, ap) in pf.params.iter().zip(&af.params) {
                    self.infer_from(pp.ty, ap.ty, !contravariant);
                }
                if let (Some(pr), Some(ar)) = (pf.rest, af.rest) {
                    self.infer_from(pr, ar, !contravariant);
                }
                let returned = match &af.predicate {
                    Some(_) => TypeId::BOOLEAN,
                    None => af.return_type,
                };
                self.infer_from(pf.return_type, returned, contravariant);
            }
            (Type::Promise(pp), Type::Promise(ap)) => self.infer_from(*pp, *ap, contravariant),
            (Type::Promise(pp), _) => self.infer_from(*pp, arg, contravariant),
            (Type::Ref(pr), Type::Ref(ar)) if pr.name == ar.name => {
                for (&p, &a) in pr.args.iter().zip(&ar.args) {
                    self.infer_from(p, a, contravariant);
                }
            }
            (Type::Ref(_), _) => {
                let expanded = evaluate(self.ctx, param);
                if expanded != param {
                    self.infer_from(expanded, arg, contravariant);
                }
            }
            _ => {}
        }
    }

    /// `T | null` against `string | null`: members matching a fixed part are
    /// consumed, the rest go to the naked parameter
    fn infer_into_union(&mut self, members: &[TypeId], arg: TypeId, contravariant: bool) {
        let (naked, fixed): (Vec<TypeId>, Vec<TypeId>) = members
            .iter()
            .copied()
            .partition(|&m| self.var_index(m).is_some());

        let mut unmatched = Vec::new();
        for arg_member in self.ctx.union_members(arg) {
            if naked.is_empty() {
                for &f in &fixed {
                    self.infer_from(f, arg_member, contravariant);
                }
                continue;
            }
            let matched = fixed.iter().any(|&f| self.is_subtype(arg_member, f));
            if !matched {
                unmatched.push(arg_member);
            }
        }

        if !unmatched.is_empty() {
            let rest = self.ctx.union_type(unmatched);
            for param in naked {
                if let Some(index) = self.var_index(param) {
                    self.add_candidate(index, rest, contravariant);
                }
            }
        }
    }

    /// `{ x: number } & R` against an object: fixed parts infer normally and
    /// every naked parameter receives the fields they did not claim
    fn infer_into_row(&mut self, members: &[TypeId], arg: TypeId, contravariant: bool) {
        let (naked, fixed): (Vec<TypeId>, Vec<TypeId>) = members
            .iter()
            .copied()
            .partition(|&m| self.var_index(m).is_some());

        let mut claimed: Vec<String> = Vec::new();
        for &f in &fixed {
            self.infer_from(f, arg, contravariant);
            claimed.extend(self.ctx.key_names(f));
        }
        if naked.is_empty() {
            return;
        }

        let remainder = match self.ctx.shared(arg).as_ref() {
            Type::Object(obj) => {
                let rest = obj
                    .properties
                    .iter()
                    .filter(|p| !claimed.contains(&p.name))
                    .cloned()
                    .collect();
                self.ctx.object_type(rest, obj.index_signature)
            }
            _ => arg,
        };
        tracing::trace!(row = %self.ctx.display(remainder), "row parameter captured");
        for param in naked {
            if let Some(index) = self.var_index(param) {
                self.add_candidate(index, remainder, contravariant);
            }
        }
    }

    /// Plain object parameters still accept wider arguments; the surplus is
    /// recorded against a fresh row variable
    fn capture_implicit_row(&mut self, param: TypeId, arg: TypeId) {
        let param = evaluate(self.ctx, param);
        let arg = evaluate(self.ctx, arg);
        let (declared, given) = match (self.ctx.resolve(param), self.ctx.resolve(arg)) {
            (Type::Object(p), Type::Object(a)) if p.index_signature.is_none() => {
                (p.clone(), a.clone())
            }
            _ => return,
        };
        let extra: Vec<PropertySignature> = given
            .properties
            .into_iter()
            .filter(|p| declared.property(&p.name).is_none())
            .collect();
        if extra.is_empty() {
            return;
        }
        let fields = self.ctx.object_type(extra, None);
        let var = self.ctx.fresh_type_var();
        self.rows.push(RowCapture { var, fields });
    }

    fn mentions_inference_params(&self, ty: TypeId) -> bool {
        self.ctx
            .free_type_params(ty)
            .iter()
            .any(|p| self.var_index(*p).is_some())
            || matches!(self.ctx.resolve(ty), Type::Ref(_))
    }
}

/// Infer the type arguments of `func` from argument types, in order
pub fn infer_call(ctx: &mut TypeContext, func: &FunctionType, args: &[TypeId]) -> Solution {
    let mut inference = InferenceContext::new(ctx, &func.type_params);
    for (i, &arg) in args.iter().enumerate() {
        if let Some(param) = func.param_type_at(i) {
            inference.infer(param, arg);
        }
    }
    inference.solve()
}
