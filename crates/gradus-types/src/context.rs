//! Type context for managing types and type interning

use crate::error::TypeError;
use crate::ty::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;

/// How writable object fields relate their types under subtyping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldVariance {
    /// Mutable fields must match exactly, readonly fields are covariant
    #[default]
    Invariant,
    /// Every field is covariant
    Covariant,
}

/// Tunable limits for type operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeLimits {
    /// Maximum nesting of expansion and comparison
    pub max_depth: u32,
    /// Largest template literal cross product kept as literals
    pub template_literal_limit: usize,
    pub field_variance: FieldVariance,
}

/// Nesting past which `display` prints `...`
pub const DISPLAY_DEPTH: u32 = 16;

impl Default for TypeLimits {
    fn default() -> Self {
        Self {
            max_depth: 100,
            template_literal_limit: 10_000,
            field_variance: FieldVariance::Invariant,
        }
    }
}

/// A named type alias (also used for interfaces and class instance types)
#[derive(Debug, Clone)]
pub struct AliasDef {
    pub name: String,
    /// Generic parameters, each a `Type::TypeParam`
    pub params: Vec<TypeId>,
    /// `None` between declaration and definition
    pub body: Option<TypeId>,
}

static NEVER: Type = Type::Never;

/// Type context that manages all types in a program
///
/// This uses type interning so that identical types have the same TypeId.
/// Aliases are registered in two phases (declare, then define) so bodies can
/// refer to themselves by name.
#[derive(Debug, Clone)]
pub struct TypeContext {
    /// Storage for all types, indexed by TypeId
    types: Vec<Arc<Type>>,

    /// Reverse mapping from Type to TypeId for interning
    type_to_id: FxHashMap<Type, TypeId>,

    aliases: FxHashMap<String, Arc<AliasDef>>,

    limits: TypeLimits,
    next_var: u32,
    next_scope: u32,

    /// Evaluation results, keyed by the unevaluated id
    pub(crate) evaluated: FxHashMap<TypeId, TypeId>,
    /// Ids whose evaluation is in progress
    pub(crate) evaluating: Vec<TypeId>,

    depth: u32,
    expansion_chain: Vec<String>,
    depth_error: Option<TypeError>,
}

impl Default for TypeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeContext {
    /// Create a new type context with default limits
    pub fn new() -> Self {
        Self::with_limits(TypeLimits::default())
    }

    pub fn with_limits(limits: TypeLimits) -> Self {
        let mut ctx = TypeContext {
            types: Vec::new(),
            type_to_id: FxHashMap::default(),
            aliases: FxHashMap::default(),
            limits,
            next_var: 0,
            next_scope: 0,
            evaluated: FxHashMap::default(),
            evaluating: Vec::new(),
            depth: 0,
            expansion_chain: Vec::new(),
            depth_error: None,
        };

        // Order must match the TypeId constants
        ctx.intern(Type::Any);
        ctx.intern(Type::Unknown);
        ctx.intern(Type::Never);
        ctx.intern(Type::Primitive(PrimitiveType::String));
        ctx.intern(Type::Primitive(PrimitiveType::Number));
        ctx.intern(Type::Primitive(PrimitiveType::Boolean));
        ctx.intern(Type::Primitive(PrimitiveType::Null));
        ctx.intern(Type::Primitive(PrimitiveType::Undefined));
        ctx.intern(Type::Primitive(PrimitiveType::Void));
        ctx.intern(Type::Primitive(PrimitiveType::Symbol));
        ctx.intern(Type::Primitive(PrimitiveType::BigInt));
        ctx.intern(Type::Literal(LiteralValue::Boolean(true)));
        ctx.intern(Type::Literal(LiteralValue::Boolean(false)));
        debug_assert_eq!(ctx.types.len(), 13);

        ctx
    }

    pub fn limits(&self) -> TypeLimits {
        self.limits
    }

    /// Copy of this context for an independent checking unit.
    ///
    /// Interned types are shared; recursion state starts fresh.
    pub fn fork(&self) -> Self {
        let mut forked = self.clone();
        forked.depth = 0;
        forked.expansion_chain.clear();
        forked.evaluating.clear();
        forked.depth_error = None;
        forked
    }

    /// Intern a type, returning its TypeId
    ///
    /// If the type already exists, returns the existing TypeId.
    pub fn intern(&mut self, ty: Type) -> TypeId {
        if let Some(&id) = self.type_to_id.get(&ty) {
            return id;
        }

        let id = TypeId(self.types.len() as u32);
        self.types.push(Arc::new(ty.clone()));
        self.type_to_id.insert(ty, id);
        id
    }

    /// Get a type by its TypeId
    pub fn get(&self, id: TypeId) -> Option<&Type> {
        self.types.get(id.0 as usize).map(|arc| arc.as_ref())
    }

    /// Get a type by its TypeId. Ids not created by this context read as `never`.
    pub fn resolve(&self, id: TypeId) -> &Type {
        self.get(id).unwrap_or(&NEVER)
    }

    /// Shared handle to a type, for walks that intern while inspecting it
    pub(crate) fn shared(&self, id: TypeId) -> Arc<Type> {
        match self.types.get(id.0 as usize) {
            Some(ty) => Arc::clone(ty),
            None => Arc::new(Type::Never),
        }
    }

    /// Look up a type's ID without interning
    pub fn lookup(&self, ty: &Type) -> Option<TypeId> {
        self.type_to_id.get(ty).copied()
    }

    /// Get the number of types in the context
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    // Constructors

    pub fn literal(&mut self, value: LiteralValue) -> TypeId {
        match value {
            LiteralValue::Boolean(true) => TypeId::TRUE,
            LiteralValue::Boolean(false) => TypeId::FALSE,
            other => self.intern(Type::Literal(other)),
        }
    }

    pub fn string_literal(&mut self, value: impl Into<String>) -> TypeId {
        self.literal(LiteralValue::String(value.into()))
    }

    pub fn number_literal(&mut self, value: f64) -> TypeId {
        self.literal(LiteralValue::Number(NumberLit::new(value)))
    }

    pub fn boolean_literal(&mut self, value: bool) -> TypeId {
        if value {
            TypeId::TRUE
        } else {
            TypeId::FALSE
        }
    }

    /// Create an object type. Later duplicates of a property name win.
    pub fn object_type(
        &mut self,
        properties: Vec<PropertySignature>,
        index_signature: Option<TypeId>,
    ) -> TypeId {
        let mut properties = properties;
        properties.reverse();
        properties.sort_by(|a, b| a.name.cmp(&b.name));
        properties.dedup_by(|later, earlier| later.name == earlier.name);
        self.intern(Type::Object(ObjectType {
            properties,
            index_signature,
        }))
    }

    pub fn array_type(&mut self, element: TypeId) -> TypeId {
        self.intern(Type::Array(ArrayType { element }))
    }

    pub fn tuple_type(&mut self, elements: Vec<TupleElement>, rest: Option<TypeId>) -> TypeId {
        self.intern(Type::Tuple(TupleType { elements, rest }))
    }

    pub fn function_type(&mut self, func: FunctionType) -> TypeId {
        self.intern(Type::Function(func))
    }

    /// `Promise<T>`. A promise of a promise collapses one level.
    pub fn promise_type(&mut self, inner: TypeId) -> TypeId {
        if let Type::Promise(_) = self.resolve(inner) {
            return inner;
        }
        self.intern(Type::Promise(inner))
    }

    /// Fresh scope tag for the type parameters of one declaration
    pub fn fresh_scope(&mut self) -> u32 {
        self.next_scope += 1;
        self.next_scope
    }

    pub fn type_param(&mut self, param: TypeParam) -> TypeId {
        self.intern(Type::TypeParam(param))
    }

    /// Fresh inference variable
    pub fn fresh_type_var(&mut self) -> TypeId {
        let var = InferenceVar(self.next_var);
        self.next_var += 1;
        self.intern(Type::TypeVar(var))
    }

    /// Named reference, expanded lazily by the evaluator
    pub fn reference(&mut self, name: impl Into<String>, args: Vec<TypeId>) -> TypeId {
        self.intern(Type::Ref(RefType {
            name: name.into(),
            args,
        }))
    }

    pub fn conditional(
        &mut self,
        check: TypeId,
        extends: TypeId,
        true_type: TypeId,
        false_type: TypeId,
        distributive: bool,
    ) -> TypeId {
        self.intern(Type::Conditional(ConditionalType {
            check,
            extends,
            true_type,
            false_type,
            distributive,
        }))
    }

    pub fn infer_placeholder(&mut self, name: impl Into<String>) -> TypeId {
        self.intern(Type::Infer(name.into()))
    }

    pub fn mapped_type(&mut self, mapped: MappedType) -> TypeId {
        self.intern(Type::Mapped(mapped))
    }

    pub fn keyof_type(&mut self, operand: TypeId) -> TypeId {
        self.intern(Type::KeyOf(operand))
    }

    pub fn indexed_access(&mut self, object: TypeId, index: TypeId) -> TypeId {
        self.intern(Type::IndexedAccess(IndexedAccessType { object, index }))
    }

    /// Template literal. Adjacent text is merged; no holes gives a string literal.
    pub fn template_literal(&mut self, spans: Vec<TemplateSpan>) -> TypeId {
        let mut merged: Vec<TemplateSpan> = Vec::with_capacity(spans.len());
        for span in spans {
            match (merged.last_mut(), span) {
                (Some(TemplateSpan::Text(prev)), TemplateSpan::Text(text)) => prev.push_str(&text),
                (_, TemplateSpan::Text(text)) if text.is_empty() => {}
                (_, span) => merged.push(span),
            }
        }
        match merged.as_slice() {
            [] => self.string_literal(""),
            [TemplateSpan::Text(text)] => {
                let text = text.clone();
                self.string_literal(text)
            }
            _ => self.intern(Type::TemplateLiteral(TemplateLiteralType { spans: merged })),
        }
    }

    pub fn string_mapping(&mut self, kind: StringMappingKind, inner: TypeId) -> TypeId {
        self.intern(Type::StringMapping(StringMappingType { kind, inner }))
    }

    /// Create a union type
    ///
    /// Nested unions are flattened, `never` dropped, `unknown` and `any`
    /// absorb everything, literals covered by their primitive are removed and
    /// structurally identical members collapse.
    pub fn union_type(&mut self, members: Vec<TypeId>) -> TypeId {
        let mut flat = Vec::with_capacity(members.len());
        for member in members {
            match self.resolve(member) {
                Type::Union(u) => flat.extend_from_slice(&u.members),
                Type::Never => {}
                _ => flat.push(member),
            }
        }

        if flat.contains(&TypeId::ANY) {
            return TypeId::ANY;
        }
        if flat.contains(&TypeId::UNKNOWN) {
            return TypeId::UNKNOWN;
        }

        flat.sort_unstable();
        flat.dedup();

        if flat.contains(&TypeId::TRUE) && flat.contains(&TypeId::FALSE) {
            flat.retain(|&m| m != TypeId::TRUE && m != TypeId::FALSE);
            flat.push(TypeId::BOOLEAN);
            flat.sort_unstable();
            flat.dedup();
        }

        let present: Vec<PrimitiveType> = flat
            .iter()
            .filter_map(|&m| match self.resolve(m) {
                Type::Primitive(p) => Some(*p),
                _ => None,
            })
            .collect();
        if !present.is_empty() {
            flat.retain(|&m| match self.resolve(m) {
                Type::Literal(lit) => !present.contains(&lit.base()),
                _ => true,
            });
        }

        let mut i = 0;
        while i < flat.len() {
            let mut j = i + 1;
            while j < flat.len() {
                if self.structurally_identical(flat[i], flat[j], 0) {
                    flat.remove(j);
                } else {
                    j += 1;
                }
            }
            i += 1;
        }

        match flat.len() {
            0 => TypeId::NEVER,
            1 => flat[0],
            _ => self.intern(Type::Union(UnionType { members: flat })),
        }
    }

    /// Create an intersection type
    ///
    /// Object members merge field by field, disjoint primitives give `never`
    /// and a literal absorbs its own primitive. A union member distributes.
    pub fn intersection_type(&mut self, members: Vec<TypeId>) -> TypeId {
        let mut flat = Vec::with_capacity(members.len());
        for member in members {
            match self.resolve(member) {
                Type::Intersection(i) => flat.extend_from_slice(&i.members),
                Type::Unknown => {}
                _ => flat.push(member),
            }
        }

        if flat.contains(&TypeId::NEVER) {
            return TypeId::NEVER;
        }
        if flat.contains(&TypeId::ANY) {
            return TypeId::ANY;
        }

        flat.sort_unstable();
        flat.dedup();

        match flat.len() {
            0 => return TypeId::UNKNOWN,
            1 => return flat[0],
            _ => {}
        }

        if let Some(pos) = flat
            .iter()
            .position(|&m| matches!(self.resolve(m), Type::Union(_)))
        {
            let alternatives = match self.resolve(flat[pos]) {
                Type::Union(u) => u.members.clone(),
                _ => Vec::new(),
            };
            if alternatives.len() <= 32 {
                let rest: Vec<TypeId> = flat
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != pos)
                    .map(|(_, &m)| m)
                    .collect();
                let distributed = alternatives
                    .into_iter()
                    .map(|alt| {
                        let mut parts = rest.clone();
                        parts.push(alt);
                        self.intersection_type(parts)
                    })
                    .collect();
                return self.union_type(distributed);
            }
        }

        let mut atom: Option<TypeId> = None;
        let mut objects: Vec<ObjectType> = Vec::new();
        let mut others: Vec<TypeId> = Vec::new();
        for &member in &flat {
            match self.resolve(member) {
                Type::Primitive(_) | Type::Literal(_) => {
                    atom = match atom {
                        None => Some(member),
                        Some(prev) => match self.intersect_atoms(prev, member) {
                            Some(kept) => Some(kept),
                            None => return TypeId::NEVER,
                        },
                    };
                }
                Type::Object(obj) => objects.push(obj.clone()),
                _ => others.push(member),
            }
        }

        if let Some(atom) = atom {
            let nullish = matches!(self.resolve(atom), Type::Primitive(p) if p.is_nullish());
            if nullish && !objects.is_empty() {
                return TypeId::NEVER;
            }
            others.push(atom);
        }

        if !objects.is_empty() {
            let mut merged = objects.remove(0);
            for next in objects {
                merged = self.merge_objects(&merged, &next);
            }
            let id = self.intern(Type::Object(merged));
            others.push(id);
        }

        others.sort_unstable();
        others.dedup();
        match others.len() {
            0 => TypeId::UNKNOWN,
            1 => others[0],
            _ => self.intern(Type::Intersection(IntersectionType { members: others })),
        }
    }

    fn intersect_atoms(&self, a: TypeId, b: TypeId) -> Option<TypeId> {
        if a == b {
            return Some(a);
        }
        match (self.resolve(a), self.resolve(b)) {
            (Type::Literal(lit), Type::Primitive(p)) if lit.base() == *p => Some(a),
            (Type::Primitive(p), Type::Literal(lit)) if lit.base() == *p => Some(b),
            (Type::Primitive(PrimitiveType::Void), Type::Primitive(PrimitiveType::Undefined)) => {
                Some(b)
            }
            (Type::Primitive(PrimitiveType::Undefined), Type::Primitive(PrimitiveType::Void)) => {
                Some(a)
            }
            _ => None,
        }
    }

    /// Field-wise merge. A shared field whose types are disjoint becomes
    /// `never`; the other fields are kept.
    fn merge_objects(&mut self, a: &ObjectType, b: &ObjectType) -> ObjectType {
        let mut properties = Vec::with_capacity(a.properties.len() + b.properties.len());
        for prop in &a.properties {
            match b.property(&prop.name) {
                Some(other) => {
                    let ty = if prop.ty == other.ty {
                        prop.ty
                    } else {
                        self.intersection_type(vec![prop.ty, other.ty])
                    };
                    properties.push(PropertySignature {
                        name: prop.name.clone(),
                        ty,
                        optional: prop.optional && other.optional,
                        readonly: prop.readonly || other.readonly,
                    });
                }
                None => properties.push(prop.clone()),
            }
        }
        for prop in &b.properties {
            if a.property(&prop.name).is_none() {
                properties.push(prop.clone());
            }
        }
        properties.sort_by(|x, y| x.name.cmp(&y.name));

        let index_signature = match (a.index_signature, b.index_signature) {
            (Some(x), Some(y)) if x != y => Some(self.intersection_type(vec![x, y])),
            (x, y) => x.or(y),
        };

        ObjectType {
            properties,
            index_signature,
        }
    }

    /// Shape comparison that ignores parameter names and does not expand
    /// references. Used to collapse duplicate union members.
    fn structurally_identical(&self, a: TypeId, b: TypeId, depth: u32) -> bool {
        if a == b {
            return true;
        }
        if depth > self.limits.max_depth {
            return false;
        }
        let same = |x: TypeId, y: TypeId| self.structurally_identical(x, y, depth + 1);
        match (self.resolve(a), self.resolve(b)) {
            (Type::Object(x), Type::Object(y)) => {
                x.properties.len() == y.properties.len()
                    && x.properties.iter().zip(&y.properties).all(|(p, q)| {
                        p.name == q.name
                            && p.optional == q.optional
                            && p.readonly == q.readonly
                            && same(p.ty, q.ty)
                    })
                    && match (x.index_signature, y.index_signature) {
                        (Some(i), Some(j)) => same(i, j),
                        (None, None) => true,
                        _ => false,
                    }
            }
            (Type::Array(x), Type::Array(y)) => same(x.element, y.element),
            (Type::Promise(x), Type::Promise(y)) => same(*x, *y),
            (Type::Function(f), Type::Function(g)) => {
                f.kind == g.kind
                    && f.type_params == g.type_params
                    && f.params.len() == g.params.len()
                    && f.params
                        .iter()
                        .zip(&g.params)
                        .all(|(p, q)| p.optional == q.optional && same(p.ty, q.ty))
                    && match (f.rest, g.rest) {
                        (Some(r), Some(s)) => same(r, s),
                        (None, None) => true,
                        _ => false,
                    }
                    && same(f.return_type, g.return_type)
                    && f.predicate == g.predicate
            }
            _ => false,
        }
    }

    /// Replace literal types by their primitive
    pub fn widen_literals(&mut self, id: TypeId) -> TypeId {
        match self.resolve(id) {
            Type::Literal(lit) => lit.base().id(),
            Type::Union(u) => {
                let members = u.members.clone();
                let widened = members.into_iter().map(|m| self.widen_literals(m)).collect();
                self.union_type(widened)
            }
            _ => id,
        }
    }

    /// Members of a union, or the type itself
    pub fn union_members(&self, id: TypeId) -> Vec<TypeId> {
        match self.resolve(id) {
            Type::Union(u) => u.members.clone(),
            Type::Never => Vec::new(),
            _ => vec![id],
        }
    }

    /// Type parameters occurring free in `id`. References are not expanded.
    pub fn free_type_params(&self, id: TypeId) -> Vec<TypeId> {
        let mut out = Vec::new();
        let mut bound = Vec::new();
        self.collect_free_params(id, &mut bound, &mut out, 0);
        out
    }

    pub fn has_free_type_params(&self, id: TypeId) -> bool {
        !self.free_type_params(id).is_empty()
    }

    fn collect_free_params(
        &self,
        id: TypeId,
        bound: &mut Vec<TypeId>,
        out: &mut Vec<TypeId>,
        depth: u32,
    ) {
        if depth > self.limits.max_depth {
            return;
        }
        let depth = depth + 1;
        match self.resolve(id) {
            Type::TypeParam(_) => {
                if !bound.contains(&id) && !out.contains(&id) {
                    out.push(id);
                }
            }
            Type::Object(obj) => {
                for prop in &obj.properties {
                    self.collect_free_params(prop.ty, bound, out, depth);
                }
                if let Some(index) = obj.index_signature {
                    self.collect_free_params(index, bound, out, depth);
                }
            }
            Type::Array(arr) => self.collect_free_params(arr.element, bound, out, depth),
            Type::Tuple(tuple) => {
                for el in &tuple.elements {
                    self.collect_free_params(el.ty, bound, out, depth);
                }
                if let Some(rest) = tuple.rest {
                    self.collect_free_params(rest, bound, out, depth);
                }
            }
            Type::Function(func) => {
                let mark = bound.len();
                bound.extend_from_slice(&func.type_params);
                for param in &func.params {
                    self.collect_free_params(param.ty, bound, out, depth);
                }
                if let Some(rest) = func.rest {
                    self.collect_free_params(rest, bound, out, depth);
                }
                self.collect_free_params(func.return_type, bound, out, depth);
                if let Some(pred) = &func.predicate {
                    self.collect_free_params(pred.ty, bound, out, depth);
                }
                bound.truncate(mark);
            }
            Type::Union(UnionType { members }) | Type::Intersection(IntersectionType { members }) => {
                for &m in members {
                    self.collect_free_params(m, bound, out, depth);
                }
            }
            Type::Ref(r) => {
                for &arg in &r.args {
                    self.collect_free_params(arg, bound, out, depth);
                }
            }
            Type::Conditional(c) => {
                for part in [c.check, c.extends, c.true_type, c.false_type] {
                    self.collect_free_params(part, bound, out, depth);
                }
            }
            Type::Mapped(m) => {
                self.collect_free_params(m.constraint, bound, out, depth);
                bound.push(m.param);
                self.collect_free_params(m.template, bound, out, depth);
                bound.pop();
            }
            Type::KeyOf(inner) | Type::Promise(inner) => {
                self.collect_free_params(*inner, bound, out, depth)
            }
            Type::IndexedAccess(ia) => {
                self.collect_free_params(ia.object, bound, out, depth);
                self.collect_free_params(ia.index, bound, out, depth);
            }
            Type::TemplateLiteral(t) => {
                for span in &t.spans {
                    if let TemplateSpan::Hole(hole) = span {
                        self.collect_free_params(*hole, bound, out, depth);
                    }
                }
            }
            Type::StringMapping(sm) => self.collect_free_params(sm.inner, bound, out, depth),
            Type::Primitive(_)
            | Type::Literal(_)
            | Type::Any
            | Type::Unknown
            | Type::Never
            | Type::TypeVar(_)
            | Type::Infer(_) => {}
        }
    }

    // Aliases

    /// First phase of alias registration. Returns the self reference
    /// `Name<P1, ..>` that the body may use before it is defined.
    pub fn declare_alias(&mut self, name: impl Into<String>, params: Vec<TypeId>) -> TypeId {
        let name = name.into();
        let self_ref = self.reference(name.clone(), params.clone());
        self.aliases.insert(
            name.clone(),
            Arc::new(AliasDef {
                name,
                params,
                body: None,
            }),
        );
        self_ref
    }

    /// Second phase of alias registration
    pub fn define_alias(&mut self, name: &str, body: TypeId) -> Result<(), TypeError> {
        let def = self
            .aliases
            .get(name)
            .ok_or_else(|| TypeError::UndefinedType {
                name: name.to_string(),
            })?;
        if matches!(self.resolve(body), Type::Ref(r) if r.name == name && r.args == def.params) {
            return Err(TypeError::CircularReference {
                name: name.to_string(),
            });
        }
        let updated = AliasDef {
            name: def.name.clone(),
            params: def.params.clone(),
            body: Some(body),
        };
        tracing::trace!(alias = name, body = %self.display(body), "defined alias");
        self.aliases.insert(name.to_string(), Arc::new(updated));
        Ok(())
    }

    pub fn alias(&self, name: &str) -> Option<Arc<AliasDef>> {
        self.aliases.get(name).cloned()
    }

    pub fn has_alias(&self, name: &str) -> bool {
        self.aliases.contains_key(name)
    }

    /// Apply an alias to explicit arguments. Missing trailing arguments take
    /// their defaults; arguments are checked against their bounds.
    pub fn instantiate_alias(&mut self, name: &str, args: Vec<TypeId>) -> Result<TypeId, TypeError> {
        let def = self.alias(name).ok_or_else(|| TypeError::UndefinedType {
            name: name.to_string(),
        })?;
        let required = def
            .params
            .iter()
            .take_while(|&&p| !matches!(self.resolve(p), Type::TypeParam(tp) if tp.default.is_some()))
            .count();
        if args.len() < required || args.len() > def.params.len() {
            return Err(TypeError::InvalidTypeArgCount {
                name: name.to_string(),
                expected: def.params.len(),
                actual: args.len(),
            });
        }

        let mut subst = crate::substitute::Substitution::new();
        let mut full_args = Vec::with_capacity(def.params.len());
        for (i, &param) in def.params.iter().enumerate() {
            let (param_name, constraint, default) = match self.resolve(param) {
                Type::TypeParam(tp) => (tp.name.clone(), tp.constraint, tp.default),
                _ => (String::new(), None, None),
            };
            let arg = match args.get(i) {
                Some(&arg) => arg,
                None => match default {
                    Some(d) => crate::substitute::substitute(self, d, &subst),
                    None => TypeId::UNKNOWN,
                },
            };
            subst.insert(param, arg);
            if let Some(constraint) = constraint {
                let bound = crate::substitute::substitute(self, constraint, &subst);
                let ok = crate::subtyping::SubtypingContext::new(self).is_subtype(arg, bound);
                if !ok {
                    return Err(TypeError::ConstraintViolation {
                        param: param_name,
                        actual: self.display(arg),
                        constraint: self.display(bound),
                    });
                }
            }
            full_args.push(arg);
        }
        Ok(self.reference(name, full_args))
    }

    /// Property names of a type after evaluation
    pub fn key_names(&mut self, id: TypeId) -> Vec<String> {
        crate::evaluate::Evaluator::new(self).key_names(id)
    }

    // Recursion guard shared by every component

    pub(crate) fn enter_recursion(&mut self) -> bool {
        if self.depth_error.is_some() {
            return false;
        }
        if self.depth >= self.limits.max_depth {
            let chain = if self.expansion_chain.is_empty() {
                "<structural comparison>".to_string()
            } else {
                self.expansion_chain.join(" -> ")
            };
            tracing::warn!(%chain, limit = self.limits.max_depth, "type recursion limit reached");
            self.depth_error = Some(TypeError::DepthExceeded {
                chain,
                limit: self.limits.max_depth,
            });
            return false;
        }
        self.depth += 1;
        true
    }

    pub(crate) fn leave_recursion(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub(crate) fn push_expansion(&mut self, name: &str) {
        self.expansion_chain.push(name.to_string());
    }

    pub(crate) fn pop_expansion(&mut self) {
        self.expansion_chain.pop();
    }

    /// Whether the recursion guard has tripped since the last `take_depth_error`
    pub fn depth_exceeded(&self) -> bool {
        self.depth_error.is_some()
    }

    pub fn take_depth_error(&mut self) -> Option<TypeError> {
        self.depth_error.take()
    }

    // Display

    /// Get a display string for a type
    pub fn display(&self, id: TypeId) -> String {
        let mut out = String::new();
        self.write_type(id, &mut out, 0);
        out
    }

    fn write_type(&self, id: TypeId, out: &mut String, depth: u32) {
        if depth > DISPLAY_DEPTH {
            out.push_str("...");
            return;
        }
        let depth = depth + 1;
        match self.resolve(id) {
            Type::Primitive(p) => out.push_str(p.type_name()),
            Type::Literal(lit) => {
                let _ = write!(out, "{}", lit);
            }
            Type::Any => out.push_str("any"),
            Type::Unknown => out.push_str("unknown"),
            Type::Never => out.push_str("never"),
            Type::Object(obj) => {
                if obj.properties.is_empty() && obj.index_signature.is_none() {
                    out.push_str("{}");
                    return;
                }
                out.push_str("{ ");
                for prop in &obj.properties {
                    if prop.readonly {
                        out.push_str("readonly ");
                    }
                    out.push_str(&prop.name);
                    if prop.optional {
                        out.push('?');
                    }
                    out.push_str(": ");
                    self.write_type(prop.ty, out, depth);
                    out.push_str("; ");
                }
                if let Some(index) = obj.index_signature {
                    out.push_str("[key: string]: ");
                    self.write_type(index, out, depth);
                    out.push_str("; ");
                }
                out.push('}');
            }
            Type::Array(arr) => {
                self.write_operand(arr.element, out, depth);
                out.push_str("[]");
            }
            Type::Tuple(tuple) => {
                out.push('[');
                let mut first = true;
                for el in &tuple.elements {
                    if !first {
                        out.push_str(", ");
                    }
                    first = false;
                    self.write_type(el.ty, out, depth);
                    if el.optional {
                        out.push('?');
                    }
                }
                if let Some(rest) = tuple.rest {
                    if !first {
                        out.push_str(", ");
                    }
                    out.push_str("...");
                    self.write_operand(rest, out, depth);
                    out.push_str("[]");
                }
                out.push(']');
            }
            Type::Function(func) => {
                if func.kind == FunctionKind::Construct {
                    out.push_str("new ");
                }
                if !func.type_params.is_empty() {
                    out.push('<');
                    for (i, &tp) in func.type_params.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        self.write_type(tp, out, depth);
                    }
                    out.push('>');
                }
                out.push('(');
                for (i, param) in func.params.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&param.name);
                    if param.optional {
                        out.push('?');
                    }
                    out.push_str(": ");
                    self.write_type(param.ty, out, depth);
                }
                if let Some(rest) = func.rest {
                    if !func.params.is_empty() {
                        out.push_str(", ");
                    }
                    out.push_str("...rest: ");
                    self.write_operand(rest, out, depth);
                    out.push_str("[]");
                }
                out.push_str(") => ");
                match &func.predicate {
                    Some(pred) => {
                        if pred.asserts {
                            out.push_str("asserts ");
                        }
                        let name = func
                            .params
                            .get(pred.param)
                            .map(|p| p.name.as_str())
                            .unwrap_or("this");
                        out.push_str(name);
                        out.push_str(" is ");
                        self.write_type(pred.ty, out, depth);
                    }
                    None => self.write_type(func.return_type, out, depth),
                }
            }
            Type::Union(u) => self.write_joined(&u.members, " | ", out, depth),
            Type::Intersection(i) => self.write_joined(&i.members, " & ", out, depth),
            Type::TypeParam(tp) => out.push_str(&tp.name),
            Type::TypeVar(var) => {
                let _ = write!(out, "?{}", var.0);
            }
            Type::Ref(r) => {
                out.push_str(&r.name);
                if !r.args.is_empty() {
                    out.push('<');
                    self.write_joined(&r.args, ", ", out, depth);
                    out.push('>');
                }
            }
            Type::Conditional(c) => {
                self.write_operand(c.check, out, depth);
                out.push_str(" extends ");
                self.write_operand(c.extends, out, depth);
                out.push_str(" ? ");
                self.write_type(c.true_type, out, depth);
                out.push_str(" : ");
                self.write_type(c.false_type, out, depth);
            }
            Type::Infer(name) => {
                out.push_str("infer ");
                out.push_str(name);
            }
            Type::Mapped(m) => {
                out.push_str("{ ");
                match m.readonly {
                    MappedModifier::Add => out.push_str("readonly "),
                    MappedModifier::Remove => out.push_str("-readonly "),
                    MappedModifier::Preserve => {}
                }
                out.push('[');
                self.write_type(m.param, out, depth);
                out.push_str(" in ");
                self.write_type(m.constraint, out, depth);
                out.push(']');
                match m.optional {
                    MappedModifier::Add => out.push('?'),
                    MappedModifier::Remove => out.push_str("-?"),
                    MappedModifier::Preserve => {}
                }
                out.push_str(": ");
                self.write_type(m.template, out, depth);
                out.push_str(" }");
            }
            Type::KeyOf(inner) => {
                out.push_str("keyof ");
                self.write_operand(*inner, out, depth);
            }
            Type::IndexedAccess(ia) => {
                self.write_operand(ia.object, out, depth);
                out.push('[');
                self.write_type(ia.index, out, depth);
                out.push(']');
            }
            Type::TemplateLiteral(t) => {
                out.push('`');
                for span in &t.spans {
                    match span {
                        TemplateSpan::Text(text) => out.push_str(text),
                        TemplateSpan::Hole(hole) => {
                            out.push_str("${");
                            self.write_type(*hole, out, depth);
                            out.push('}');
                        }
                    }
                }
                out.push('`');
            }
            Type::StringMapping(sm) => {
                out.push_str(sm.kind.name());
                out.push('<');
                self.write_type(sm.inner, out, depth);
                out.push('>');
            }
            Type::Promise(inner) => {
                out.push_str("Promise<");
                self.write_type(*inner, out, depth);
                out.push('>');
            }
        }
    }

    fn write_joined(&self, ids: &[TypeId], sep: &str, out: &mut String, depth: u32) {
        for (i, &id) in ids.iter().enumerate() {
            if i > 0 {
                out.push_str(sep);
            }
            if sep == ", " {
                self.write_type(id, out, depth);
            } else {
                self.write_operand(id, out, depth);
            }
        }
    }

    /// Writes a type that appears as an operand, parenthesizing compound forms
    fn write_operand(&self, id: TypeId, out: &mut String, depth: u32) {
        let needs_parens = matches!(
            self.resolve(id),
            Type::Union(_) | Type::Intersection(_) | Type::Function(_) | Type::Conditional(_)
        );
        if needs_parens {
            out.push('(');
            self.write_type(id, out, depth);
            out.push(')');
        } else {
            self.write_type(id, out, depth);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(ctx: &mut TypeContext, fields: &[(&str, TypeId)]) -> TypeId {
        let props = fields
            .iter()
            .map(|(n, t)| PropertySignature::new(*n, *t))
            .collect();
        ctx.object_type(props, None)
    }

    #[test]
    fn test_type_interning() {
        let mut ctx = TypeContext::new();
        let a = ctx.array_type(TypeId::NUMBER);
        let b = ctx.array_type(TypeId::NUMBER);
        assert_eq!(a, b);
        assert_ne!(a, ctx.array_type(TypeId::STRING));
    }

    #[test]
    fn test_well_known_ids() {
        let ctx = TypeContext::new();
        assert_eq!(ctx.resolve(TypeId::STRING), &Type::Primitive(PrimitiveType::String));
        assert_eq!(ctx.resolve(TypeId::NEVER), &Type::Never);
        assert_eq!(
            ctx.resolve(TypeId::FALSE),
            &Type::Literal(LiteralValue::Boolean(false))
        );
    }

    #[test]
    fn test_union_flattening() {
        let mut ctx = TypeContext::new();
        let inner = ctx.union_type(vec![TypeId::STRING, TypeId::NUMBER]);
        let outer = ctx.union_type(vec![inner, TypeId::BOOLEAN]);
        let direct = ctx.union_type(vec![TypeId::BOOLEAN, TypeId::NUMBER, TypeId::STRING]);
        assert_eq!(outer, direct);
    }

    #[test]
    fn test_union_absorption() {
        let mut ctx = TypeContext::new();
        assert_eq!(ctx.union_type(vec![TypeId::STRING, TypeId::UNKNOWN]), TypeId::UNKNOWN);
        assert_eq!(ctx.union_type(vec![TypeId::STRING, TypeId::ANY]), TypeId::ANY);
        assert_eq!(ctx.union_type(vec![TypeId::STRING, TypeId::NEVER]), TypeId::STRING);
        assert_eq!(ctx.union_type(vec![]), TypeId::NEVER);
    }

    #[test]
    fn test_union_literal_subsumption() {
        let mut ctx = TypeContext::new();
        let a = ctx.string_literal("a");
        assert_eq!(ctx.union_type(vec![a, TypeId::STRING]), TypeId::STRING);
        assert_eq!(
            ctx.union_type(vec![TypeId::TRUE, TypeId::FALSE]),
            TypeId::BOOLEAN
        );
    }

    #[test]
    fn test_union_dedup_deeply_nested_members() {
        let mut ctx = TypeContext::new();
        let nested = |ctx: &mut TypeContext, param: &str| {
            let mut ty = ctx.function_type(FunctionType::new(
                vec![ParamSignature {
                    name: param.into(),
                    ty: TypeId::NUMBER,
                    optional: false,
                }],
                TypeId::STRING,
            ));
            for _ in 0..12 {
                ty = obj(ctx, &[("inner", ty)]);
            }
            ty
        };
        let a = nested(&mut ctx, "a");
        let b = nested(&mut ctx, "b");
        assert_ne!(a, b);
        let both = ctx.union_type(vec![a, b]);
        assert!(both == a || both == b, "{}", ctx.display(both));
    }

    #[test]
    fn test_union_display_order() {
        let mut ctx = TypeContext::new();
        let u = ctx.union_type(vec![TypeId::BOOLEAN, TypeId::NUMBER]);
        assert_eq!(ctx.display(u), "number | boolean");
    }

    #[test]
    fn test_intersection_merges_objects() {
        let mut ctx = TypeContext::new();
        let a = obj(&mut ctx, &[("name", TypeId::STRING)]);
        let b = obj(&mut ctx, &[("age", TypeId::NUMBER)]);
        let both = ctx.intersection_type(vec![a, b]);
        let expected = obj(&mut ctx, &[("age", TypeId::NUMBER), ("name", TypeId::STRING)]);
        assert_eq!(both, expected);
    }

    #[test]
    fn test_intersection_conflicting_field_is_never() {
        let mut ctx = TypeContext::new();
        let a = obj(&mut ctx, &[("x", TypeId::STRING), ("y", TypeId::NUMBER)]);
        let b = obj(&mut ctx, &[("x", TypeId::NUMBER)]);
        let both = ctx.intersection_type(vec![a, b]);
        assert_ne!(both, TypeId::NEVER);
        let expected = obj(&mut ctx, &[("x", TypeId::NEVER), ("y", TypeId::NUMBER)]);
        assert_eq!(both, expected);
        assert_eq!(ctx.display(both), "{ x: never; y: number; }");
    }

    #[test]
    fn test_intersection_modifiers() {
        let mut ctx = TypeContext::new();
        let a = ctx.object_type(
            vec![PropertySignature::new("x", TypeId::NUMBER).readonly().optional()],
            None,
        );
        let b = ctx.object_type(vec![PropertySignature::new("x", TypeId::NUMBER)], None);
        let merged = ctx.intersection_type(vec![a, b]);
        let prop = ctx
            .resolve(merged)
            .as_object()
            .and_then(|o| o.property("x"))
            .cloned();
        let prop = prop.expect("merged property");
        assert!(prop.readonly);
        assert!(!prop.optional);
    }

    #[test]
    fn test_intersection_primitives() {
        let mut ctx = TypeContext::new();
        let lit = ctx.string_literal("a");
        assert_eq!(ctx.intersection_type(vec![TypeId::STRING, TypeId::NUMBER]), TypeId::NEVER);
        assert_eq!(ctx.intersection_type(vec![lit, TypeId::STRING]), lit);
        assert_eq!(ctx.intersection_type(vec![TypeId::STRING, TypeId::UNKNOWN]), TypeId::STRING);
        assert_eq!(ctx.intersection_type(vec![TypeId::STRING, TypeId::ANY]), TypeId::ANY);
    }

    #[test]
    fn test_intersection_distributes_over_union() {
        let mut ctx = TypeContext::new();
        let a = ctx.string_literal("a");
        let one = ctx.number_literal(1.0);
        let u = ctx.union_type(vec![a, one]);
        assert_eq!(ctx.intersection_type(vec![u, TypeId::STRING]), a);
    }

    #[test]
    fn test_promise_flattens_one_level() {
        let mut ctx = TypeContext::new();
        let p = ctx.promise_type(TypeId::NUMBER);
        assert_eq!(ctx.promise_type(p), p);
    }

    #[test]
    fn test_template_literal_without_holes() {
        let mut ctx = TypeContext::new();
        let t = ctx.template_literal(vec![
            TemplateSpan::Text("on".into()),
            TemplateSpan::Text("Click".into()),
        ]);
        assert_eq!(t, ctx.string_literal("onClick"));
    }

    #[test]
    fn test_alias_two_phase() {
        let mut ctx = TypeContext::new();
        let self_ref = ctx.declare_alias("Node", vec![]);
        let arr = ctx.array_type(self_ref);
        let body = obj(&mut ctx, &[("children", arr)]);
        assert!(ctx.define_alias("Node", body).is_ok());
        assert_eq!(ctx.alias("Node").and_then(|d| d.body), Some(body));
        assert!(matches!(
            ctx.define_alias("Missing", body),
            Err(TypeError::UndefinedType { .. })
        ));
    }

    #[test]
    fn test_alias_argument_count() {
        let mut ctx = TypeContext::new();
        let scope = ctx.fresh_scope();
        let t = ctx.type_param(TypeParam {
            name: "T".into(),
            constraint: Some(TypeId::STRING),
            default: None,
            variance: None,
            scope,
        });
        ctx.declare_alias("Box", vec![t]);
        let body = obj(&mut ctx, &[("value", t)]);
        ctx.define_alias("Box", body).expect("define");
        assert!(ctx.instantiate_alias("Box", vec![TypeId::STRING]).is_ok());
        assert!(matches!(
            ctx.instantiate_alias("Box", vec![]),
            Err(TypeError::InvalidTypeArgCount { expected: 1, actual: 0, .. })
        ));
        assert!(matches!(
            ctx.instantiate_alias("Box", vec![TypeId::NUMBER]),
            Err(TypeError::ConstraintViolation { .. })
        ));
    }

    #[test]
    fn test_display() {
        let mut ctx = TypeContext::new();
        let u = ctx.union_type(vec![TypeId::STRING, TypeId::NUMBER]);
        let arr = ctx.array_type(u);
        assert_eq!(ctx.display(arr), "(string | number)[]");
        let f = ctx.function_type(FunctionType::new(
            vec![ParamSignature {
                name: "x".into(),
                ty: TypeId::NUMBER,
                optional: false,
            }],
            TypeId::VOID,
        ));
        assert_eq!(ctx.display(f), "(x: number) => void");
    }

    #[test]
    fn test_fork_shares_types() {
        let mut ctx = TypeContext::new();
        let arr = ctx.array_type(TypeId::STRING);
        let mut fork = ctx.fork();
        assert_eq!(fork.array_type(TypeId::STRING), arr);
        fork.array_type(TypeId::BOOLEAN);
        assert!(fork.len() > ctx.len());
    }
}
