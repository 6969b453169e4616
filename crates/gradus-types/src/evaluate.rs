//! Reduction of computed types
//!
//! References to aliases and built-in utilities, conditional types, mapped
//! types, `keyof`, indexed access, template literals and string mappings are
//! rewritten into plain structural types. Anything that still mentions a free
//! type parameter is left in place (deferred). Results are memoized on the
//! type context.

use crate::context::TypeContext;
use crate::promise;
use crate::substitute::{substitute, Substitution};
use crate::subtyping::SubtypingContext;
use crate::ty::*;
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Utility types resolved by name when no user alias shadows them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    Partial,
    Required,
    Readonly,
    Pick,
    Omit,
    Record,
    Exclude,
    Extract,
    NonNullable,
    Parameters,
    ConstructorParameters,
    ReturnType,
    InstanceType,
    Awaited,
    Mapping(StringMappingKind),
}

static BUILTINS: Lazy<FxHashMap<&'static str, (Builtin, usize)>> = Lazy::new(|| {
    let mut table = FxHashMap::default();
    table.insert("Partial", (Builtin::Partial, 1));
    table.insert("Required", (Builtin::Required, 1));
    table.insert("Readonly", (Builtin::Readonly, 1));
    table.insert("Pick", (Builtin::Pick, 2));
    table.insert("Omit", (Builtin::Omit, 2));
    table.insert("Record", (Builtin::Record, 2));
    table.insert("Exclude", (Builtin::Exclude, 2));
    table.insert("Extract", (Builtin::Extract, 2));
    table.insert("NonNullable", (Builtin::NonNullable, 1));
    table.insert("Parameters", (Builtin::Parameters, 1));
    table.insert("ConstructorParameters", (Builtin::ConstructorParameters, 1));
    table.insert("ReturnType", (Builtin::ReturnType, 1));
    table.insert("InstanceType", (Builtin::InstanceType, 1));
    table.insert("Awaited", (Builtin::Awaited, 1));
    for kind in [
        StringMappingKind::Uppercase,
        StringMappingKind::Lowercase,
        StringMappingKind::Capitalize,
        StringMappingKind::Uncapitalize,
    ] {
        table.insert(kind.name(), (Builtin::Mapping(kind), 1));
    }
    table
});

/// Number of type arguments a built-in utility takes
pub fn builtin_arity(name: &str) -> Option<usize> {
    BUILTINS.get(name).map(|&(_, arity)| arity)
}

/// Reduce `id` to normal form
pub fn evaluate(ctx: &mut TypeContext, id: TypeId) -> TypeId {
    Evaluator::new(ctx).evaluate(id)
}

/// Candidates collected for `infer X` placeholders
#[derive(Debug, Default)]
struct InferBindings {
    entries: Vec<(TypeId, Vec<TypeId>, Vec<TypeId>)>,
}

impl InferBindings {
    fn add(&mut self, placeholder: TypeId, candidate: TypeId, contravariant: bool) {
        let pos = match self.entries.iter().position(|(p, _, _)| *p == placeholder) {
            Some(pos) => pos,
            None => {
                self.entries.push((placeholder, Vec::new(), Vec::new()));
                self.entries.len() - 1
            }
        };
        let entry = &mut self.entries[pos];
        let list = if contravariant { &mut entry.2 } else { &mut entry.1 };
        if !list.contains(&candidate) {
            list.push(candidate);
        }
    }
}

/// Evaluator over a type context
pub struct Evaluator<'a> {
    ctx: &'a mut TypeContext,
}

impl<'a> Evaluator<'a> {
    pub fn new(ctx: &'a mut TypeContext) -> Self {
        Self { ctx }
    }

    /// Reduce `id` until its head is structural or deferred
    pub fn evaluate(&mut self, id: TypeId) -> TypeId {
        if let Some(&done) = self.ctx.evaluated.get(&id) {
            return done;
        }
        let ty = self.ctx.shared(id);
        let needs_work = match ty.as_ref() {
            Type::Union(UnionType { members }) | Type::Intersection(IntersectionType { members }) => {
                members.iter().any(|&m| self.ctx.resolve(m).is_reducible())
            }
            other => other.is_reducible(),
        };
        if !needs_work || self.ctx.evaluating.contains(&id) {
            return id;
        }
        if !self.ctx.enter_recursion() {
            return id;
        }
        self.ctx.evaluating.push(id);

        let result = match ty.as_ref() {
            Type::Union(u) => {
                let members = u.members.iter().map(|&m| self.evaluate(m)).collect();
                self.ctx.union_type(members)
            }
            Type::Intersection(i) => {
                let members = i.members.iter().map(|&m| self.evaluate(m)).collect();
                self.ctx.intersection_type(members)
            }
            Type::Ref(r) => self.expand_reference(id, r),
            Type::Conditional(c) => self.evaluate_conditional(id, c),
            Type::Mapped(m) => self.evaluate_mapped(id, m),
            Type::KeyOf(operand) => self.evaluate_keyof(id, *operand),
            Type::IndexedAccess(ia) => self.evaluate_indexed_access(id, ia),
            Type::TemplateLiteral(t) => self.evaluate_template(id, t),
            Type::StringMapping(sm) => self.evaluate_string_mapping(id, sm),
            _ => id,
        };

        self.ctx.evaluating.pop();
        self.ctx.leave_recursion();
        if !self.ctx.depth_exceeded() {
            self.ctx.evaluated.insert(id, result);
        }
        result
    }

    fn is_subtype(&mut self, sub: TypeId, sup: TypeId) -> bool {
        SubtypingContext::new(self.ctx).is_subtype(sub, sup)
    }

    fn expand_reference(&mut self, id: TypeId, r: &RefType) -> TypeId {
        if let Some(def) = self.ctx.alias(&r.name) {
            let Some(body) = def.body else {
                return id;
            };
            let mut subst = Substitution::new();
            for (i, &param) in def.params.iter().enumerate() {
                let arg = match r.args.get(i) {
                    Some(&arg) => arg,
                    None => match self.ctx.resolve(param) {
                        Type::TypeParam(TypeParam {
                            default: Some(d), ..
                        }) => {
                            let d = *d;
                            substitute(self.ctx, d, &subst)
                        }
                        _ => TypeId::UNKNOWN,
                    },
                };
                subst.insert(param, arg);
            }
            tracing::trace!(alias = %r.name, args = r.args.len(), "expanding alias");
            self.ctx.push_expansion(&r.name);
            let expanded = substitute(self.ctx, body, &subst);
            let result = self.evaluate(expanded);
            self.ctx.pop_expansion();
            return result;
        }
        match BUILTINS.get(r.name.as_str()) {
            Some(&(builtin, _)) => self.evaluate_builtin(id, builtin, &r.args),
            None => id,
        }
    }

    // Conditional types

    fn evaluate_conditional(&mut self, id: TypeId, c: &ConditionalType) -> TypeId {
        let check = self.evaluate(c.check);

        if c.distributive {
            match self.ctx.resolve(check) {
                Type::Never => return TypeId::NEVER,
                Type::Union(u) => {
                    let members = u.members.clone();
                    let results = members
                        .into_iter()
                        .map(|m| {
                            let per_member =
                                self.ctx
                                    .conditional(m, c.extends, c.true_type, c.false_type, false);
                            self.evaluate(per_member)
                        })
                        .collect();
                    return self.ctx.union_type(results);
                }
                _ => {}
            }
        }

        if self.ctx.has_free_type_params(check) || self.ctx.has_free_type_params(c.extends) {
            return id;
        }

        let mut bindings = InferBindings::default();
        self.match_infer(c.extends, check, &mut bindings, false);
        let mut subst = Substitution::new();
        for (placeholder, co, contra) in bindings.entries {
            let bound = if !co.is_empty() {
                self.ctx.union_type(co)
            } else if !contra.is_empty() {
                self.ctx.intersection_type(contra)
            } else {
                TypeId::UNKNOWN
            };
            subst.insert(placeholder, bound);
        }
        for placeholder in self.infer_placeholders(c.extends) {
            if !subst.contains(placeholder) {
                subst.insert(placeholder, TypeId::UNKNOWN);
            }
        }
        let extends = substitute(self.ctx, c.extends, &subst);

        if check == TypeId::ANY && extends != TypeId::ANY && extends != TypeId::UNKNOWN {
            let true_type = substitute(self.ctx, c.true_type, &subst);
            let both = self.ctx.union_type(vec![true_type, c.false_type]);
            return self.evaluate(both);
        }

        let branch = if self.is_subtype(check, extends) {
            substitute(self.ctx, c.true_type, &subst)
        } else {
            c.false_type
        };
        self.evaluate(branch)
    }

    fn infer_placeholders(&self, id: TypeId) -> Vec<TypeId> {
        let mut out = Vec::new();
        self.collect_placeholders(id, &mut out, 0);
        out
    }

    fn collect_placeholders(&self, id: TypeId, out: &mut Vec<TypeId>, depth: u32) {
        if depth > self.ctx.limits().max_depth {
            return;
        }
        let depth = depth + 1;
        let visit = |child: TypeId, out: &mut Vec<TypeId>| self.collect_placeholders(child, out, depth);
        match self.ctx.resolve(id) {
            Type::Infer(_) => {
                if !out.contains(&id) {
                    out.push(id);
                }
            }
            Type::Object(o) => {
                for p in &o.properties {
                    visit(p.ty, out);
                }
                if let Some(i) = o.index_signature {
                    visit(i, out);
                }
            }
            Type::Array(a) => visit(a.element, out),
            Type::Tuple(t) => {
                for e in &t.elements {
                    visit(e.ty, out);
                }
                if let Some(r) = t.rest {
                    visit(r, out);
                }
            }
            Type::Function(f) => {
                for p in &f.params {
                    visit(p.ty, out);
                }
                if let Some(r) = f.rest {
                    visit(r, out);
                }
                visit(f.return_type, out);
            }
            Type::Union(UnionType { members }) | Type::Intersection(IntersectionType { members }) => {
                for &m in members {
                    visit(m, out);
                }
            }
            Type::Ref(r) => {
                for &a in &r.args {
                    visit(a, out);
                }
            }
            Type::Promise(inner) | Type::KeyOf(inner) => visit(*inner, out),
            Type::IndexedAccess(ia) => {
                visit(ia.object, out);
                visit(ia.index, out);
            }
            Type::TemplateLiteral(t) => {
                for span in &t.spans {
                    if let TemplateSpan::Hole(h) = span {
                        visit(*h, out);
                    }
                }
            }
            _ => {}
        }
    }

    /// Structural match of an `extends` pattern against a source type,
    /// recording what each `infer` placeholder lines up with
    fn match_infer(
        &mut self,
        pattern: TypeId,
        source: TypeId,
        bindings: &mut InferBindings,
        contravariant: bool,
    ) {
        if !self.ctx.enter_recursion() {
            return;
        }
        self.match_infer_inner(pattern, source, bindings, contravariant);
        self.ctx.leave_recursion();
    }

    fn match_infer_inner(
        &mut self,
        pattern: TypeId,
        source: TypeId,
        bindings: &mut InferBindings,
        contravariant: bool,
    ) {
        let pattern_ty = self.ctx.shared(pattern);
        if let Type::Infer(_) = pattern_ty.as_ref() {
            bindings.add(pattern, source, contravariant);
            return;
        }
        if self.infer_placeholders(pattern).is_empty() {
            return;
        }

        let source = self.evaluate(source);
        let source_ty = self.ctx.shared(source);
        if let (Type::Union(u), false) = (source_ty.as_ref(), matches!(pattern_ty.as_ref(), Type::Union(_))) {
            for &member in &u.members {
                self.match_infer(pattern, member, bindings, contravariant);
            }
            return;
        }

        match (pattern_ty.as_ref(), source_ty.as_ref()) {
            (Type::Array(p), Type::Array(s)) => {
                self.match_infer(p.element, s.element, bindings, contravariant)
            }
            (Type::Array(p), Type::Tuple(s)) => {
                let mut elements: Vec<TypeId> = s.elements.iter().map(|e| e.ty).collect();
                elements.extend(s.rest);
                let joined = self.ctx.union_type(elements);
                self.match_infer(p.element, joined, bindings, contravariant);
            }
            (Type::Tuple(p), Type::Tuple(s)) => {
                for (pe, se) in p.elements.iter().zip(&s.elements) {
                    self.match_infer(pe.ty, se.ty, bindings, contravariant);
                }
                if let (Some(pr), Some(sr)) = (p.rest, s.rest) {
                    self.match_infer(pr, sr, bindings, contravariant);
                }
            }
            (Type::Object(p), Type::Object(s)) => {
                for prop in &p.properties {
                    if let Some(have) = s.read_type(&prop.name) {
                        self.match_infer(prop.ty, have, bindings, contravariant);
                    }
                }
            }
            (Type::Function(p), Type::Function(s)) => {
                for (pp, sp) in p.params.iter().zip(&s.params) {
                    self.match_infer(pp.ty, sp.ty, bindings, !contravariant);
                }
                if let Some(rest) = p.rest {
                    self.match_rest_parameters(rest, p.params.len(), s, bindings, contravariant);
                }
                self.match_infer(p.return_type, s.return_type, bindings, contravariant);
            }
            (Type::Promise(p), Type::Promise(s)) => {
                self.match_infer(*p, *s, bindings, contravariant)
            }
            (Type::Ref(p), Type::Ref(s)) if p.name == s.name => {
                for (&pa, &sa) in p.args.iter().zip(&s.args) {
                    self.match_infer(pa, sa, bindings, contravariant);
                }
            }
            (Type::Ref(_), _) => {
                let expanded = self.evaluate(pattern);
                if expanded != pattern {
                    self.match_infer(expanded, source, bindings, contravariant);
                }
            }
            (Type::TemplateLiteral(p), Type::Literal(LiteralValue::String(text))) => {
                self.match_template(&p.spans, text, bindings);
            }
            _ => {}
        }
    }

    /// `(...args: infer P) => R` binds `P` to the tuple of remaining parameters
    fn match_rest_parameters(
        &mut self,
        rest: TypeId,
        from: usize,
        source: &FunctionType,
        bindings: &mut InferBindings,
        contravariant: bool,
    ) {
        let spread_of = match self.ctx.resolve(rest) {
            Type::IndexedAccess(ia) if ia.index == TypeId::NUMBER => match self.ctx.resolve(ia.object) {
                Type::Infer(_) => Some(ia.object),
                _ => None,
            },
            _ => None,
        };
        match spread_of {
            Some(placeholder) => {
                let elements = source
                    .params
                    .iter()
                    .skip(from)
                    .map(|p| TupleElement {
                        ty: p.ty,
                        optional: p.optional,
                    })
                    .collect();
                let tuple = self.ctx.tuple_type(elements, source.rest);
                bindings.add(placeholder, tuple, !contravariant);
            }
            None => {
                if let Some(source_rest) = source.rest {
                    self.match_infer(rest, source_rest, bindings, !contravariant);
                }
            }
        }
    }

    /// Each hole takes the shortest text up to the next literal span; a
    /// trailing hole takes the remainder
    fn match_template(&mut self, spans: &[TemplateSpan], text: &str, bindings: &mut InferBindings) {
        let mut rest = text;
        let mut i = 0;
        while i < spans.len() {
            match &spans[i] {
                TemplateSpan::Text(lit) => match rest.strip_prefix(lit.as_str()) {
                    Some(after) => rest = after,
                    None => return,
                },
                TemplateSpan::Hole(hole) => {
                    let piece = match spans.get(i + 1) {
                        Some(TemplateSpan::Text(next)) => match rest.find(next.as_str()) {
                            Some(at) => &rest[..at],
                            None => return,
                        },
                        Some(TemplateSpan::Hole(_)) => match rest.chars().next() {
                            Some(c) => &rest[..c.len_utf8()],
                            None => "",
                        },
                        None => rest,
                    };
                    if let Type::Infer(_) = self.ctx.resolve(*hole) {
                        let lit = self.ctx.string_literal(piece);
                        bindings.add(*hole, lit, false);
                    }
                    rest = &rest[piece.len()..];
                }
            }
            i += 1;
        }
    }

    // Mapped types

    fn evaluate_mapped(&mut self, id: TypeId, m: &MappedType) -> TypeId {
        if let Type::KeyOf(source) = self.ctx.resolve(m.constraint) {
            let source = *source;
            return self.evaluate_homomorphic(id, m, source);
        }

        let keys = self.evaluate(m.constraint);
        if self.ctx.has_free_type_params(keys) {
            return id;
        }
        let mut properties = Vec::new();
        let mut index_signature = None;
        for key in self.ctx.union_members(keys) {
            let key_ty = self.ctx.shared(key);
            match key_ty.as_ref() {
                Type::Literal(lit) => {
                    let value = self.instantiate_template(m, key, None);
                    properties.push(PropertySignature {
                        name: lit.as_text(),
                        ty: value,
                        optional: m.optional.apply(false),
                        readonly: m.readonly.apply(false),
                    });
                }
                Type::Primitive(PrimitiveType::String | PrimitiveType::Number) => {
                    index_signature = Some(self.instantiate_template(m, key, None));
                }
                _ => {}
            }
        }
        self.ctx.object_type(properties, index_signature)
    }

    /// `{ [P in keyof T]: ... }` keeps the modifiers of `T`'s fields and
    /// distributes over unions
    fn evaluate_homomorphic(&mut self, id: TypeId, m: &MappedType, source: TypeId) -> TypeId {
        let evaluated = self.evaluate(source);
        let source_ty = self.ctx.shared(evaluated);
        match source_ty.as_ref() {
            Type::Union(u) => {
                let results = u
                    .members
                    .iter()
                    .map(|&member| self.map_over(m, source, member))
                    .collect();
                self.ctx.union_type(results)
            }
            Type::TypeParam(_) => id,
            _ if self.ctx.has_free_type_params(evaluated) && !matches!(source_ty.as_ref(), Type::Object(_)) => id,
            _ => self.map_over(m, source, evaluated),
        }
    }

    fn map_over(&mut self, m: &MappedType, source: TypeId, target: TypeId) -> TypeId {
        let target_ty = self.ctx.shared(target);
        match target_ty.as_ref() {
            Type::Object(obj) => {
                let mut properties = Vec::with_capacity(obj.properties.len());
                for prop in &obj.properties {
                    let key = self.ctx.string_literal(prop.name.clone());
                    let value = self.instantiate_template(m, key, Some((source, target)));
                    properties.push(PropertySignature {
                        name: prop.name.clone(),
                        ty: value,
                        optional: m.optional.apply(prop.optional),
                        readonly: m.readonly.apply(prop.readonly),
                    });
                }
                let index_signature = obj
                    .index_signature
                    .map(|_| self.instantiate_template(m, TypeId::STRING, Some((source, target))));
                self.ctx.object_type(properties, index_signature)
            }
            Type::Array(_) => {
                let element = self.instantiate_template(m, TypeId::NUMBER, Some((source, target)));
                self.ctx.array_type(element)
            }
            Type::Tuple(tuple) => {
                let mut elements = Vec::with_capacity(tuple.elements.len());
                for (i, el) in tuple.elements.iter().enumerate() {
                    let key = self.ctx.number_literal(i as f64);
                    let ty = self.instantiate_template(m, key, Some((source, target)));
                    elements.push(TupleElement {
                        ty,
                        optional: m.optional.apply(el.optional),
                    });
                }
                let rest = tuple
                    .rest
                    .map(|_| self.instantiate_template(m, TypeId::NUMBER, Some((source, target))));
                self.ctx.tuple_type(elements, rest)
            }
            Type::Any => TypeId::ANY,
            _ => target,
        }
    }

    /// Template with `P := key` (and the mapped source replaced by one union
    /// member when distributing). Field values stay lazy when they are
    /// references, so recursive mapped aliases terminate.
    fn instantiate_template(
        &mut self,
        m: &MappedType,
        key: TypeId,
        source: Option<(TypeId, TypeId)>,
    ) -> TypeId {
        let mut subst = Substitution::new();
        subst.insert(m.param, key);
        if let Some((from, to)) = source {
            if from != to {
                subst.insert(from, to);
            }
        }
        let value = substitute(self.ctx, m.template, &subst);
        match self.ctx.resolve(value) {
            Type::Ref(_) | Type::Conditional(_) => value,
            _ => self.evaluate(value),
        }
    }

    // keyof

    fn evaluate_keyof(&mut self, id: TypeId, operand: TypeId) -> TypeId {
        let target = self.evaluate(operand);
        if self.ctx.has_free_type_params(target) && !matches!(self.ctx.resolve(target), Type::Object(_)) {
            return id;
        }
        let target_ty = self.ctx.shared(target);
        match target_ty.as_ref() {
            Type::Any => self
                .ctx
                .union_type(vec![TypeId::STRING, TypeId::NUMBER, TypeId::SYMBOL]),
            Type::Object(obj) => {
                let mut keys: Vec<TypeId> = obj
                    .properties
                    .iter()
                    .map(|p| self.ctx.string_literal(p.name.clone()))
                    .collect();
                if obj.index_signature.is_some() {
                    keys.push(TypeId::STRING);
                }
                self.ctx.union_type(keys)
            }
            Type::Array(_) | Type::Tuple(_) => {
                let length = self.ctx.string_literal("length");
                self.ctx.union_type(vec![TypeId::NUMBER, length])
            }
            Type::Union(_) => {
                let names = self.key_names(target);
                let keys = names
                    .into_iter()
                    .map(|n| self.ctx.string_literal(n))
                    .collect();
                self.ctx.union_type(keys)
            }
            Type::Intersection(i) => {
                let keys = i
                    .members
                    .iter()
                    .map(|&m| {
                        let k = self.ctx.keyof_type(m);
                        self.evaluate(k)
                    })
                    .collect();
                self.ctx.union_type(keys)
            }
            _ => TypeId::NEVER,
        }
    }

    /// Property names of a type: all fields of an object, the shared fields
    /// of a union, every field of an intersection
    pub fn key_names(&mut self, id: TypeId) -> Vec<String> {
        let evaluated = self.evaluate(id);
        let ty = self.ctx.shared(evaluated);
        match ty.as_ref() {
            Type::Object(obj) => obj.properties.iter().map(|p| p.name.clone()).collect(),
            Type::Union(u) => {
                let mut iter = u.members.iter();
                let mut common = match iter.next() {
                    Some(&first) => self.key_names(first),
                    None => return Vec::new(),
                };
                for &member in iter {
                    let names = self.key_names(member);
                    common.retain(|n| names.contains(n));
                }
                common
            }
            Type::Intersection(i) => {
                let mut all: Vec<String> = Vec::new();
                for &member in &i.members {
                    for name in self.key_names(member) {
                        if !all.contains(&name) {
                            all.push(name);
                        }
                    }
                }
                all.sort();
                all
            }
            _ => Vec::new(),
        }
    }

    // Indexed access

    fn evaluate_indexed_access(&mut self, id: TypeId, ia: &IndexedAccessType) -> TypeId {
        let object = self.evaluate(ia.object);
        let index = self.evaluate(ia.index);
        if self.ctx.has_free_type_params(index)
            || (self.ctx.has_free_type_params(object)
                && !matches!(self.ctx.resolve(object), Type::Object(_)))
        {
            return id;
        }
        let results = self
            .ctx
            .union_members(index)
            .into_iter()
            .map(|key| self.access(object, key))
            .collect();
        self.ctx.union_type(results)
    }

    fn access(&mut self, object: TypeId, key: TypeId) -> TypeId {
        let object_ty = self.ctx.shared(object);
        let key_ty = self.ctx.shared(key);
        match (object_ty.as_ref(), key_ty.as_ref()) {
            (Type::Any, _) => TypeId::ANY,
            (Type::Union(u), _) => {
                let parts = u.members.iter().map(|&m| self.access(m, key)).collect();
                self.ctx.union_type(parts)
            }
            (Type::Object(obj), Type::Literal(lit)) => {
                let name = lit.as_text();
                match obj.property(&name) {
                    Some(prop) if prop.optional => {
                        let ty = prop.ty;
                        self.ctx.union_type(vec![ty, TypeId::UNDEFINED])
                    }
                    Some(prop) => self.evaluate(prop.ty),
                    None => obj.index_signature.unwrap_or(TypeId::UNKNOWN),
                }
            }
            (Type::Object(obj), Type::Primitive(PrimitiveType::String)) => match obj.index_signature {
                Some(sig) => sig,
                None => {
                    let all = obj.properties.iter().map(|p| p.ty).collect();
                    self.ctx.union_type(all)
                }
            },
            (Type::Array(arr), Type::Primitive(PrimitiveType::Number)) => arr.element,
            (Type::Array(arr), Type::Literal(LiteralValue::Number(_))) => arr.element,
            (Type::Tuple(tuple), Type::Literal(LiteralValue::Number(n))) => {
                let v = n.value();
                if v >= 0.0 && v.fract() == 0.0 {
                    tuple.element_at(v as usize).unwrap_or(TypeId::UNDEFINED)
                } else {
                    TypeId::UNDEFINED
                }
            }
            (Type::Tuple(tuple), Type::Primitive(PrimitiveType::Number)) => {
                let mut all: Vec<TypeId> = tuple.elements.iter().map(|e| e.ty).collect();
                all.extend(tuple.rest);
                self.ctx.union_type(all)
            }
            (_, Type::Literal(LiteralValue::String(name))) => {
                crate::apparent::apparent_member(self.ctx, object, name).unwrap_or(TypeId::UNKNOWN)
            }
            _ => TypeId::UNKNOWN,
        }
    }

    // Template literals and string mappings

    fn evaluate_template(&mut self, id: TypeId, t: &TemplateLiteralType) -> TypeId {
        let limit = self.ctx.limits().template_literal_limit;
        let mut results: Vec<String> = vec![String::new()];
        for span in &t.spans {
            match span {
                TemplateSpan::Text(text) => {
                    for r in &mut results {
                        r.push_str(text);
                    }
                }
                TemplateSpan::Hole(hole) => {
                    let hole = self.evaluate(*hole);
                    let alternatives = match self.template_alternatives(hole) {
                        Some(alts) => alts,
                        None if self.ctx.has_free_type_params(hole) => return id,
                        None => return TypeId::STRING,
                    };
                    if results.len().saturating_mul(alternatives.len()) > limit {
                        tracing::debug!(limit, "template literal expansion widened to string");
                        return TypeId::STRING;
                    }
                    results = results
                        .iter()
                        .flat_map(|prefix| alternatives.iter().map(move |alt| format!("{}{}", prefix, alt)))
                        .collect();
                }
            }
        }
        let literals = results
            .into_iter()
            .map(|text| self.ctx.string_literal(text))
            .collect();
        self.ctx.union_type(literals)
    }

    fn template_alternatives(&self, hole: TypeId) -> Option<Vec<String>> {
        match self.ctx.resolve(hole) {
            Type::Literal(lit) => Some(vec![lit.as_text()]),
            Type::Never => Some(Vec::new()),
            Type::Union(u) => {
                let mut all = Vec::new();
                for &member in &u.members {
                    all.extend(self.template_alternatives(member)?);
                }
                Some(all)
            }
            Type::Primitive(PrimitiveType::Boolean) => {
                Some(vec!["false".to_string(), "true".to_string()])
            }
            Type::Primitive(PrimitiveType::Null) => Some(vec!["null".to_string()]),
            Type::Primitive(PrimitiveType::Undefined) => Some(vec!["undefined".to_string()]),
            _ => None,
        }
    }

    fn evaluate_string_mapping(&mut self, id: TypeId, sm: &StringMappingType) -> TypeId {
        let inner = self.evaluate(sm.inner);
        let inner_ty = self.ctx.shared(inner);
        match inner_ty.as_ref() {
            Type::Literal(LiteralValue::String(s)) => self.ctx.string_literal(sm.kind.apply(s)),
            Type::Union(u) => {
                let parts = u
                    .members
                    .iter()
                    .map(|&m| {
                        let mapped = self.ctx.string_mapping(sm.kind, m);
                        self.evaluate(mapped)
                    })
                    .collect();
                self.ctx.union_type(parts)
            }
            Type::Primitive(PrimitiveType::String) => TypeId::STRING,
            Type::Any => TypeId::ANY,
            Type::Never => TypeId::NEVER,
            _ if inner != sm.inner => self.ctx.string_mapping(sm.kind, inner),
            _ => id,
        }
    }

    // Built-in utilities

    fn evaluate_builtin(&mut self, id: TypeId, builtin: Builtin, args: &[TypeId]) -> TypeId {
        if args.iter().any(|&a| self.ctx.has_free_type_params(a)) {
            return id;
        }
        let arg = |i: usize| args.get(i).copied().unwrap_or(TypeId::UNKNOWN);
        match builtin {
            Builtin::Partial => self.with_modifiers(arg(0), None, Some(true)),
            Builtin::Required => self.with_modifiers(arg(0), None, Some(false)),
            Builtin::Readonly => self.with_modifiers(arg(0), Some(true), None),
            Builtin::Pick => self.pick(arg(0), arg(1), true),
            Builtin::Omit => self.pick(arg(0), arg(1), false),
            Builtin::Record => self.record(arg(0), arg(1)),
            Builtin::Exclude => self.filter_members(arg(0), arg(1), false),
            Builtin::Extract => self.filter_members(arg(0), arg(1), true),
            Builtin::NonNullable => {
                let target = self.evaluate(arg(0));
                let kept = self
                    .ctx
                    .union_members(target)
                    .into_iter()
                    .filter(|&m| !matches!(self.ctx.resolve(m), Type::Primitive(p) if p.is_nullish()))
                    .collect();
                self.ctx.union_type(kept)
            }
            Builtin::Parameters => self.signature_part(arg(0), FunctionKind::Call, true),
            Builtin::ConstructorParameters => {
                self.signature_part(arg(0), FunctionKind::Construct, true)
            }
            Builtin::ReturnType => self.signature_part(arg(0), FunctionKind::Call, false),
            Builtin::InstanceType => self.signature_part(arg(0), FunctionKind::Construct, false),
            Builtin::Awaited => promise::awaited(self.ctx, arg(0)),
            Builtin::Mapping(kind) => {
                let mapped = self.ctx.string_mapping(kind, arg(0));
                self.evaluate(mapped)
            }
        }
    }

    fn with_modifiers(
        &mut self,
        target: TypeId,
        readonly: Option<bool>,
        optional: Option<bool>,
    ) -> TypeId {
        let evaluated = self.evaluate(target);
        let ty = self.ctx.shared(evaluated);
        match ty.as_ref() {
            Type::Object(obj) => {
                let properties = obj
                    .properties
                    .iter()
                    .map(|p| PropertySignature {
                        name: p.name.clone(),
                        ty: p.ty,
                        optional: optional.unwrap_or(p.optional),
                        readonly: readonly.unwrap_or(p.readonly),
                    })
                    .collect();
                self.ctx.object_type(properties, obj.index_signature)
            }
            Type::Union(u) => {
                let parts = u
                    .members
                    .iter()
                    .map(|&m| self.with_modifiers(m, readonly, optional))
                    .collect();
                self.ctx.union_type(parts)
            }
            Type::Tuple(tuple) => {
                let elements = tuple
                    .elements
                    .iter()
                    .map(|e| TupleElement {
                        ty: e.ty,
                        optional: optional.unwrap_or(e.optional),
                    })
                    .collect();
                self.ctx.tuple_type(elements, tuple.rest)
            }
            _ => evaluated,
        }
    }

    fn literal_keys(&mut self, keys: TypeId) -> Vec<String> {
        let keys = self.evaluate(keys);
        self.ctx
            .union_members(keys)
            .into_iter()
            .filter_map(|k| self.ctx.resolve(k).as_literal().map(|l| l.as_text()))
            .collect()
    }

    fn pick(&mut self, target: TypeId, keys: TypeId, keep: bool) -> TypeId {
        let names = self.literal_keys(keys);
        let evaluated = self.evaluate(target);
        let ty = self.ctx.shared(evaluated);
        match ty.as_ref() {
            Type::Object(obj) => {
                let properties = obj
                    .properties
                    .iter()
                    .filter(|p| names.contains(&p.name) == keep)
                    .cloned()
                    .collect();
                let index = if keep { None } else { obj.index_signature };
                self.ctx.object_type(properties, index)
            }
            _ => evaluated,
        }
    }

    fn record(&mut self, keys: TypeId, value: TypeId) -> TypeId {
        let keys = self.evaluate(keys);
        let mut properties = Vec::new();
        let mut index_signature = None;
        for key in self.ctx.union_members(keys) {
            match self.ctx.resolve(key) {
                Type::Literal(lit) => properties.push(PropertySignature::new(lit.as_text(), value)),
                Type::Primitive(PrimitiveType::String | PrimitiveType::Number) | Type::Any => {
                    index_signature = Some(value)
                }
                _ => {}
            }
        }
        self.ctx.object_type(properties, index_signature)
    }

    fn filter_members(&mut self, target: TypeId, filter: TypeId, keep_matching: bool) -> TypeId {
        let target = self.evaluate(target);
        let kept = self
            .ctx
            .union_members(target)
            .into_iter()
            .filter(|&m| self.is_subtype(m, filter) == keep_matching)
            .collect();
        self.ctx.union_type(kept)
    }

    fn signature_part(&mut self, target: TypeId, kind: FunctionKind, params: bool) -> TypeId {
        let evaluated = self.evaluate(target);
        let ty: Arc<Type> = self.ctx.shared(evaluated);
        match ty.as_ref() {
            Type::Any => {
                if params {
                    self.ctx.array_type(TypeId::UNKNOWN)
                } else {
                    TypeId::ANY
                }
            }
            Type::Never => TypeId::NEVER,
            Type::Union(u) => {
                let parts = u
                    .members
                    .iter()
                    .map(|&m| self.signature_part(m, kind, params))
                    .collect();
                self.ctx.union_type(parts)
            }
            Type::Function(f) if f.kind == kind => {
                if params {
                    let elements = f
                        .params
                        .iter()
                        .map(|p| TupleElement {
                            ty: p.ty,
                            optional: p.optional,
                        })
                        .collect();
                    self.ctx.tuple_type(elements, f.rest)
                } else if f.predicate.is_some() {
                    TypeId::BOOLEAN
                } else {
                    f.return_type
                }
            }
            _ => TypeId::NEVER,
        }
    }
}
