//! Core type definitions for the Gradus type system

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a type in the type context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub(crate) u32);

impl TypeId {
    pub const ANY: TypeId = TypeId(0);
    pub const UNKNOWN: TypeId = TypeId(1);
    pub const NEVER: TypeId = TypeId(2);
    pub const STRING: TypeId = TypeId(3);
    pub const NUMBER: TypeId = TypeId(4);
    pub const BOOLEAN: TypeId = TypeId(5);
    pub const NULL: TypeId = TypeId(6);
    pub const UNDEFINED: TypeId = TypeId(7);
    pub const VOID: TypeId = TypeId(8);
    pub const SYMBOL: TypeId = TypeId(9);
    pub const BIGINT: TypeId = TypeId(10);
    pub const TRUE: TypeId = TypeId(11);
    pub const FALSE: TypeId = TypeId(12);

    /// Create a new TypeId from a raw value
    ///
    /// Note: This should generally only be used internally or for interop.
    /// Prefer the associated constants or TypeContext constructors.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw value of this TypeId
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

/// Primitive types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    String,
    Number,
    Boolean,
    Null,
    Undefined,
    /// Absence of a return value. Accepts `undefined`.
    Void,
    Symbol,
    BigInt,
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

impl PrimitiveType {
    pub fn type_name(&self) -> &'static str {
        match self {
            PrimitiveType::String => "string",
            PrimitiveType::Number => "number",
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Null => "null",
            PrimitiveType::Undefined => "undefined",
            PrimitiveType::Void => "void",
            PrimitiveType::Symbol => "symbol",
            PrimitiveType::BigInt => "bigint",
        }
    }

    /// The string a runtime `typeof` check reports for values of this type
    pub fn typeof_tag(&self) -> &'static str {
        match self {
            PrimitiveType::String => "string",
            PrimitiveType::Number => "number",
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Null => "object",
            PrimitiveType::Undefined | PrimitiveType::Void => "undefined",
            PrimitiveType::Symbol => "symbol",
            PrimitiveType::BigInt => "bigint",
        }
    }

    /// `null`, `undefined` and `void` have a single falsy inhabitant
    pub fn is_nullish(&self) -> bool {
        matches!(
            self,
            PrimitiveType::Null | PrimitiveType::Undefined | PrimitiveType::Void
        )
    }

    /// Well-known id for this primitive
    pub fn id(&self) -> TypeId {
        match self {
            PrimitiveType::String => TypeId::STRING,
            PrimitiveType::Number => TypeId::NUMBER,
            PrimitiveType::Boolean => TypeId::BOOLEAN,
            PrimitiveType::Null => TypeId::NULL,
            PrimitiveType::Undefined => TypeId::UNDEFINED,
            PrimitiveType::Void => TypeId::VOID,
            PrimitiveType::Symbol => TypeId::SYMBOL,
            PrimitiveType::BigInt => TypeId::BIGINT,
        }
    }
}

/// Number literal stored by bit pattern so it can be hashed.
///
/// `-0` is folded into `0` and every NaN shares one representation.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NumberLit(u64);

impl NumberLit {
    pub fn new(value: f64) -> Self {
        let value = if value == 0.0 {
            0.0
        } else if value.is_nan() {
            f64::NAN
        } else {
            value
        };
        Self(value.to_bits())
    }

    pub fn value(self) -> f64 {
        f64::from_bits(self.0)
    }
}

impl fmt::Debug for NumberLit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for NumberLit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.value();
        if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
            write!(f, "{}", v as i64)
        } else {
            write!(f, "{}", v)
        }
    }
}

/// Literal value for literal types
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LiteralValue {
    String(String),
    Number(NumberLit),
    Boolean(bool),
    /// Decimal digits without the trailing `n`
    BigInt(String),
}

impl LiteralValue {
    /// The primitive every value of this literal belongs to
    pub fn base(&self) -> PrimitiveType {
        match self {
            LiteralValue::String(_) => PrimitiveType::String,
            LiteralValue::Number(_) => PrimitiveType::Number,
            LiteralValue::Boolean(_) => PrimitiveType::Boolean,
            LiteralValue::BigInt(_) => PrimitiveType::BigInt,
        }
    }

    pub fn is_falsy(&self) -> bool {
        match self {
            LiteralValue::String(s) => s.is_empty(),
            LiteralValue::Number(n) => n.value() == 0.0 || n.value().is_nan(),
            LiteralValue::Boolean(b) => !b,
            LiteralValue::BigInt(digits) => digits.trim_start_matches('0').is_empty(),
        }
    }

    /// Text this literal contributes when spliced into a template literal
    /// or used as a property key
    pub fn as_text(&self) -> String {
        match self {
            LiteralValue::String(s) => s.clone(),
            LiteralValue::Number(n) => n.to_string(),
            LiteralValue::Boolean(b) => b.to_string(),
            LiteralValue::BigInt(digits) => digits.clone(),
        }
    }
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::String(s) => write!(f, "\"{}\"", s),
            LiteralValue::Number(n) => write!(f, "{}", n),
            LiteralValue::Boolean(b) => write!(f, "{}", b),
            LiteralValue::BigInt(digits) => write!(f, "{}n", digits),
        }
    }
}

/// Property signature (one field slot of an object type)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertySignature {
    /// Property name
    pub name: String,
    /// Property type
    pub ty: TypeId,
    /// Whether the property may be absent
    pub optional: bool,
    /// Whether the property can be written through this type
    pub readonly: bool,
}

impl PropertySignature {
    pub fn new(name: impl Into<String>, ty: TypeId) -> Self {
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

/// Object type. Properties are kept sorted by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectType {
    pub properties: Vec<PropertySignature>,
    /// String index signature `[key: string]: T`
    pub index_signature: Option<TypeId>,
}

impl ObjectType {
    pub fn property(&self, name: &str) -> Option<&PropertySignature> {
        self.properties
            .binary_search_by(|p| p.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.properties[i])
    }

    /// Type a read of `name` produces, consulting the index signature
    pub fn read_type(&self, name: &str) -> Option<TypeId> {
        self.property(name)
            .map(|p| p.ty)
            .or(self.index_signature)
    }
}

/// Array type `T[]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArrayType {
    pub element: TypeId,
}

/// One positional element of a tuple
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleElement {
    pub ty: TypeId,
    pub optional: bool,
}

/// Tuple type `[T1, T2?, ...R[]]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleType {
    pub elements: Vec<TupleElement>,
    /// Element type of a trailing rest
    pub rest: Option<TypeId>,
}

impl TupleType {
    /// Number of elements that must be present
    pub fn min_len(&self) -> usize {
        self.elements.iter().take_while(|e| !e.optional).count()
    }

    /// Type at a position, including the rest element
    pub fn element_at(&self, index: usize) -> Option<TypeId> {
        self.elements.get(index).map(|e| e.ty).or(self.rest)
    }
}

/// Function parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamSignature {
    pub name: String,
    pub ty: TypeId,
    pub optional: bool,
}

/// Whether a function type is invoked directly or with `new`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    Call,
    Construct,
}

/// `param is T` / `asserts param is T` on a function's return position
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypePredicate {
    /// Index into the parameter list
    pub param: usize,
    pub ty: TypeId,
    pub asserts: bool,
}

/// Function type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    /// Generic parameters (each a `Type::TypeParam`)
    pub type_params: Vec<TypeId>,
    pub params: Vec<ParamSignature>,
    /// Element type of a trailing `...rest` parameter
    pub rest: Option<TypeId>,
    pub return_type: TypeId,
    pub kind: FunctionKind,
    pub predicate: Option<TypePredicate>,
}

impl FunctionType {
    pub fn new(params: Vec<ParamSignature>, return_type: TypeId) -> Self {
        Self {
            type_params: Vec::new(),
            params,
            rest: None,
            return_type,
            kind: FunctionKind::Call,
            predicate: None,
        }
    }

    /// Number of leading parameters a caller must supply
    pub fn min_params(&self) -> usize {
        self.params.iter().take_while(|p| !p.optional).count()
    }

    /// Declared type of the argument at `index`
    pub fn param_type_at(&self, index: usize) -> Option<TypeId> {
        self.params.get(index).map(|p| p.ty).or(self.rest)
    }
}

/// Union type (A | B | C). Members are flattened, deduplicated and sorted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnionType {
    pub members: Vec<TypeId>,
}

/// Intersection type (A & B)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IntersectionType {
    pub members: Vec<TypeId>,
}

/// Declared variance of a generic parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variance {
    Covariant,
    Contravariant,
    Invariant,
}

/// Generic type parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeParam {
    pub name: String,
    /// Upper bound (`T extends C`)
    pub constraint: Option<TypeId>,
    /// Default when neither supplied nor inferred
    pub default: Option<TypeId>,
    /// `in` / `out` annotation; `None` means compare structurally
    pub variance: Option<Variance>,
    /// Distinguishes same-named parameters of different declarations
    pub scope: u32,
}

/// Inference variable created for one generic call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InferenceVar(pub u32);

/// Named reference to an alias, interface, class or built-in utility,
/// optionally applied to arguments. Expanded lazily.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefType {
    pub name: String,
    pub args: Vec<TypeId>,
}

/// `Check extends Extends ? True : False`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConditionalType {
    pub check: TypeId,
    pub extends: TypeId,
    pub true_type: TypeId,
    pub false_type: TypeId,
    /// Set when the check type was a naked type parameter
    pub distributive: bool,
}

/// `+` / `-` / absent on a mapped type modifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MappedModifier {
    Preserve,
    Add,
    Remove,
}

impl MappedModifier {
    pub fn apply(self, current: bool) -> bool {
        match self {
            MappedModifier::Preserve => current,
            MappedModifier::Add => true,
            MappedModifier::Remove => false,
        }
    }
}

/// `{ [P in Keys]: Template }`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MappedType {
    /// The iteration parameter `P`
    pub param: TypeId,
    pub constraint: TypeId,
    pub template: TypeId,
    pub readonly: MappedModifier,
    pub optional: MappedModifier,
}

/// `T[K]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexedAccessType {
    pub object: TypeId,
    pub index: TypeId,
}

/// Piece of a template literal type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TemplateSpan {
    Text(String),
    Hole(TypeId),
}

/// `` `prefix${T}suffix` ``
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateLiteralType {
    pub spans: Vec<TemplateSpan>,
}

/// Intrinsic string transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringMappingKind {
    Uppercase,
    Lowercase,
    Capitalize,
    Uncapitalize,
}

impl StringMappingKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Uppercase" => Some(Self::Uppercase),
            "Lowercase" => Some(Self::Lowercase),
            "Capitalize" => Some(Self::Capitalize),
            "Uncapitalize" => Some(Self::Uncapitalize),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Uppercase => "Uppercase",
            Self::Lowercase => "Lowercase",
            Self::Capitalize => "Capitalize",
            Self::Uncapitalize => "Uncapitalize",
        }
    }

    pub fn apply(&self, s: &str) -> String {
        match self {
            Self::Uppercase => s.to_uppercase(),
            Self::Lowercase => s.to_lowercase(),
            Self::Capitalize => {
                let mut chars = s.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
            Self::Uncapitalize => {
                let mut chars = s.chars();
                match chars.next() {
                    Some(first) => first.to_lowercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StringMappingType {
    pub kind: StringMappingKind,
    pub inner: TypeId,
}

/// Core type representation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Primitive(PrimitiveType),
    Literal(LiteralValue),
    /// Gradual escape hatch, assignable both ways
    Any,
    /// Top type
    Unknown,
    /// Bottom type
    Never,
    Object(ObjectType),
    Array(ArrayType),
    Tuple(TupleType),
    Function(FunctionType),
    Union(UnionType),
    Intersection(IntersectionType),
    TypeParam(TypeParam),
    TypeVar(InferenceVar),
    Ref(RefType),
    Conditional(ConditionalType),
    /// `infer X` placeholder inside a conditional's extends clause
    Infer(String),
    Mapped(MappedType),
    KeyOf(TypeId),
    IndexedAccess(IndexedAccessType),
    TemplateLiteral(TemplateLiteralType),
    StringMapping(StringMappingType),
    /// Asynchronous result wrapper
    Promise(TypeId),
}

impl Type {
    pub fn is_never(&self) -> bool {
        matches!(self, Type::Never)
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Type::Any)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Type::Unknown)
    }

    /// Nodes the evaluator rewrites into a normal form
    pub fn is_reducible(&self) -> bool {
        matches!(
            self,
            Type::Ref(_)
                | Type::Conditional(_)
                | Type::Mapped(_)
                | Type::KeyOf(_)
                | Type::IndexedAccess(_)
                | Type::TemplateLiteral(_)
                | Type::StringMapping(_)
        )
    }

    pub fn as_union(&self) -> Option<&UnionType> {
        match self {
            Type::Union(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectType> {
        match self {
            Type::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionType> {
        match self {
            Type::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&LiteralValue> {
        match self {
            Type::Literal(l) => Some(l),
            _ => None,
        }
    }

    /// Primitive this type is, or the base primitive of this literal
    pub fn primitive_base(&self) -> Option<PrimitiveType> {
        match self {
            Type::Primitive(p) => Some(*p),
            Type::Literal(l) => Some(l.base()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_literal_zero_folding() {
        assert_eq!(NumberLit::new(0.0), NumberLit::new(-0.0));
        assert_eq!(NumberLit::new(f64::NAN), NumberLit::new(f64::NAN));
        assert_ne!(NumberLit::new(1.0), NumberLit::new(1.5));
    }

    #[test]
    fn test_number_literal_display() {
        assert_eq!(NumberLit::new(42.0).to_string(), "42");
        assert_eq!(NumberLit::new(-3.0).to_string(), "-3");
        assert_eq!(NumberLit::new(1.5).to_string(), "1.5");
    }

    #[test]
    fn test_literal_falsiness() {
        assert!(LiteralValue::String(String::new()).is_falsy());
        assert!(!LiteralValue::String("a".into()).is_falsy());
        assert!(LiteralValue::Number(NumberLit::new(0.0)).is_falsy());
        assert!(LiteralValue::Boolean(false).is_falsy());
        assert!(LiteralValue::BigInt("0".into()).is_falsy());
        assert!(!LiteralValue::BigInt("10".into()).is_falsy());
    }

    #[test]
    fn test_string_mapping() {
        assert_eq!(StringMappingKind::Uppercase.apply("get"), "GET");
        assert_eq!(StringMappingKind::Capitalize.apply("name"), "Name");
        assert_eq!(StringMappingKind::Uncapitalize.apply("Name"), "name");
        assert_eq!(StringMappingKind::Capitalize.apply(""), "");
    }

    #[test]
    fn test_typeof_tags() {
        assert_eq!(PrimitiveType::Null.typeof_tag(), "object");
        assert_eq!(PrimitiveType::Void.typeof_tag(), "undefined");
        assert_eq!(PrimitiveType::BigInt.typeof_tag(), "bigint");
    }

    #[test]
    fn test_object_property_lookup() {
        let obj = ObjectType {
            properties: vec![
                PropertySignature::new("a", TypeId::NUMBER),
                PropertySignature::new("b", TypeId::STRING).optional(),
            ],
            index_signature: None,
        };
        assert_eq!(obj.property("b").map(|p| p.optional), Some(true));
        assert!(obj.property("c").is_none());
    }
}
