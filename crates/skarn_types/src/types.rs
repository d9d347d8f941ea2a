//! Structural type representation and the compatibility relation

use std::collections::{HashMap, HashSet};
use std::fmt;

use skarn_ast::{Arena, NodeId, NodeKind};

pub const I32_MIN: i64 = -(1_i64 << 31);
pub const I32_MAX: i64 = (1_i64 << 31) - 1;

const NUMERIC: &[&str] = &[
    "I8", "I16", "I32", "I64", "I128", "U8", "U16", "U32", "U64", "U128", "USize", "ISize", "F32",
    "F64",
];

const UNSIGNED: &[&str] = &["U8", "U16", "U32", "U64", "U128", "USize"];

pub fn is_numeric(name: &str) -> bool {
    NUMERIC.contains(&name)
}

pub fn is_unsigned(name: &str) -> bool {
    UNSIGNED.contains(&name)
}

/// Single uppercase letters act as generic type placeholders.
pub fn is_type_variable(name: &str) -> bool {
    matches!(name.as_bytes(), [b'A'..=b'Z'])
}

/// Comparison operator in a refinement type annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl RefineOp {
    pub fn parse(op: &str) -> Option<RefineOp> {
        match op {
            "==" => Some(RefineOp::Eq),
            "!=" => Some(RefineOp::Ne),
            "<" => Some(RefineOp::Lt),
            "<=" => Some(RefineOp::Le),
            ">" => Some(RefineOp::Gt),
            ">=" => Some(RefineOp::Ge),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RefineOp::Eq => "==",
            RefineOp::Ne => "!=",
            RefineOp::Lt => "<",
            RefineOp::Le => "<=",
            RefineOp::Gt => ">",
            RefineOp::Ge => ">=",
        }
    }
}

/// Numeric literal appearing on the right of a refinement, e.g. the `0USize`
/// in `*I32 | 0USize`. Non-literal refinement values carry no static
/// evidence and are dropped at conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefinementValue {
    pub value: i64,
    pub suffix: String,
}

/// The type of a value, converted out of type-syntax AST nodes. Canonical
/// names rendered from this enum are the compatibility keys shared by the
/// typechecker and the borrow checker.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Named { name: String, args: Vec<Type> },
    Pointer { mutable: bool, moving: bool, inner: Box<Type> },
    Array { element: Box<Type>, init: Option<i64>, total: Option<i64> },
    Tuple(Vec<Type>),
    Refinement { base: Box<Type>, op: RefineOp, value: Option<RefinementValue> },
    Union(Box<Type>, Box<Type>),
    Function { params: Vec<Type>, ret: Box<Type> },
    Unknown,
}

impl Type {
    /// Convert a type-syntax node into a structural type. Pointer lifetime
    /// annotations are erased here; the resolver has already validated them
    /// and they play no part in compatibility.
    pub fn from_node(arena: &Arena, node: NodeId) -> Type {
        match arena.kind(node) {
            NodeKind::NamedType => Type::Named {
                name: arena.string(node, 1).to_string(),
                args: arena
                    .seq(node, 2)
                    .iter()
                    .map(|&a| Type::from_node(arena, a))
                    .collect(),
            },
            NodeKind::PointerType => Type::Pointer {
                mutable: arena.int(node, 2) != 0,
                moving: arena.int(node, 3) != 0,
                inner: Box::new(match arena.node(node, 1) {
                    Some(inner) => Type::from_node(arena, inner),
                    None => Type::Unknown,
                }),
            },
            NodeKind::ArrayType => Type::Array {
                element: Box::new(match arena.node(node, 1) {
                    Some(element) => Type::from_node(arena, element),
                    None => Type::Unknown,
                }),
                init: arena.node(node, 2).and_then(|n| literal_int(arena, n)),
                total: arena.node(node, 3).and_then(|n| literal_int(arena, n)),
            },
            NodeKind::TupleType => Type::Tuple(
                arena
                    .seq(node, 1)
                    .iter()
                    .map(|&m| Type::from_node(arena, m))
                    .collect(),
            ),
            NodeKind::RefinementType => {
                let base = match arena.node(node, 1) {
                    Some(base) => Type::from_node(arena, base),
                    None => Type::Unknown,
                };
                match RefineOp::parse(arena.string(node, 2)) {
                    Some(op) => Type::Refinement {
                        base: Box::new(base),
                        op,
                        value: arena.node(node, 3).and_then(|n| literal_value(arena, n)),
                    },
                    None => base,
                }
            }
            NodeKind::UnionType => Type::Union(
                Box::new(match arena.node(node, 1) {
                    Some(left) => Type::from_node(arena, left),
                    None => Type::Unknown,
                }),
                Box::new(match arena.node(node, 2) {
                    Some(right) => Type::from_node(arena, right),
                    None => Type::Unknown,
                }),
            ),
            NodeKind::FunctionType => Type::Function {
                params: arena
                    .seq(node, 1)
                    .iter()
                    .map(|&p| Type::from_node(arena, p))
                    .collect(),
                ret: Box::new(match arena.node(node, 2) {
                    Some(ret) => Type::from_node(arena, ret),
                    None => Type::Unknown,
                }),
            },
            _ => Type::Unknown,
        }
    }

    /// Render the canonical name used as the compatibility key. Generic
    /// arguments, refinement predicates, and pointer loan modes are erased;
    /// only the shape that matters for compatibility survives.
    pub fn canonical(&self) -> String {
        match self {
            Type::Named { name, .. } => name.clone(),
            Type::Pointer { mutable, inner, .. } => {
                if *mutable {
                    format!("*mut {}", inner.canonical())
                } else {
                    format!("*{}", inner.canonical())
                }
            }
            Type::Array { .. } => "Array".to_string(),
            Type::Tuple(_) => "Tuple".to_string(),
            Type::Refinement { base, .. } => base.canonical(),
            Type::Union(left, right) => format!("{}|{}", left.canonical(), right.canonical()),
            Type::Function { params, ret } => {
                let params: Vec<String> = params.iter().map(Type::canonical).collect();
                format!("({})=>{}", params.join(","), ret.canonical())
            }
            Type::Unknown => "Unknown".to_string(),
        }
    }

    /// A refinement of the shape `USize == 0`, the null-pointer sentinel.
    pub fn is_usize_zero_sentinel(&self) -> bool {
        match self {
            Type::Refinement { base, op: RefineOp::Eq, value: Some(value) } => {
                value.value == 0
                    && value.suffix == "USize"
                    && matches!(base.as_ref(), Type::Named { name, .. } if name == "USize")
            }
            _ => false,
        }
    }

    /// For a nullable pointer type `*T | 0USize` (either order), the pointer
    /// side of the union.
    pub fn nullable_pointer_branch(&self) -> Option<&Type> {
        match self {
            Type::Union(left, right) => {
                if matches!(left.as_ref(), Type::Pointer { .. }) && right.is_usize_zero_sentinel() {
                    Some(left)
                } else if matches!(right.as_ref(), Type::Pointer { .. })
                    && left.is_usize_zero_sentinel()
                {
                    Some(right)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

pub(crate) fn literal_int(arena: &Arena, node: NodeId) -> Option<i64> {
    if arena.kind(node) == NodeKind::NumberLit && arena.int(node, 3) == 0 {
        Some(arena.int(node, 1))
    } else {
        None
    }
}

fn literal_value(arena: &Arena, node: NodeId) -> Option<RefinementValue> {
    literal_int(arena, node).map(|value| RefinementValue {
        value,
        suffix: arena.string(node, 2).to_string(),
    })
}

// === Compatibility relation ===

/// Decide whether a value of type `actual` may appear where `expected` is
/// required. Reflexive; `Unknown` and `AnyValue` are escape hatches on
/// either side; single-letter names are generic placeholders; a union
/// accepts any of its members; a mutable pointer satisfies an immutable
/// pointer to the same pointee.
pub fn compatible(expected: &Type, actual: &Type) -> bool {
    compatible_names(&expected.canonical(), &actual.canonical())
}

/// The same relation over canonical names.
pub fn compatible_names(expected: &str, actual: &str) -> bool {
    if expected == actual {
        return true;
    }
    if expected == "Unknown" || expected == "AnyValue" || actual == "Unknown" || actual == "AnyValue"
    {
        return true;
    }
    if is_type_variable(expected) || is_type_variable(actual) {
        return true;
    }
    if expected.contains('|') && expected.split('|').any(|part| part.trim() == actual) {
        return true;
    }
    if expected.starts_with('*') && !expected.starts_with("*mut ") {
        if let Some(actual_inner) = actual.strip_prefix("*mut ") {
            return expected[1..] == *actual_inner;
        }
    }
    false
}

/// Numeric positions additionally accept any numeric actual, except that an
/// unsigned expected type demands a proven non-negative lower bound.
pub fn compatible_numeric(expected: &str, actual: &str, actual_info: &TypeInfo) -> bool {
    if expected == actual {
        return true;
    }
    if !is_numeric(expected) || !is_numeric(actual) {
        return false;
    }
    if is_unsigned(expected) {
        return matches!(actual_info.min, Some(min) if min >= 0);
    }
    true
}

// === Inference state ===

/// Everything the checker knows about one expression: its canonical name,
/// interval bounds and non-zero evidence for hazard proofs, array length
/// refinements, union member tags for exhaustiveness, and the structural
/// type when one is known.
#[derive(Debug, Clone, Default)]
pub struct TypeInfo {
    pub name: String,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub non_zero: bool,
    pub array_init: Option<i64>,
    pub array_total: Option<i64>,
    pub union_tags: Vec<String>,
    pub ty: Option<Type>,
}

impl TypeInfo {
    pub fn unknown() -> TypeInfo {
        TypeInfo {
            name: "Unknown".to_string(),
            ..TypeInfo::default()
        }
    }

    pub fn named(name: &str) -> TypeInfo {
        TypeInfo {
            name: name.to_string(),
            ..TypeInfo::default()
        }
    }

    /// View this info as flow evidence, for narrowing a declared type by an
    /// initializer or assigned value.
    pub fn as_fact(&self) -> Fact {
        Fact {
            min: self.min,
            max: self.max,
            non_zero: Some(self.non_zero),
            non_null_pointer: None,
        }
    }
}

/// Flow-sensitive evidence about one identifier, derived from a branch
/// condition. Fields left `None` are unconstrained by this fact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fact {
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub non_zero: Option<bool>,
    pub non_null_pointer: Option<bool>,
}

impl Fact {
    /// Later facts about the same name overwrite the fields they constrain
    /// and leave the rest.
    pub fn merged(&self, patch: &Fact) -> Fact {
        Fact {
            min: patch.min.or(self.min),
            max: patch.max.or(self.max),
            non_zero: patch.non_zero.or(self.non_zero),
            non_null_pointer: patch.non_null_pointer.or(self.non_null_pointer),
        }
    }
}

/// Narrow `info` by `fact`. A nonnull-pointer fact collapses a nullable
/// union to its pointer branch; interval bounds tighten toward each other
/// and reset when they become contradictory rather than erroring.
pub fn intersect_bounds(info: &TypeInfo, fact: &Fact) -> TypeInfo {
    let mut out = info.clone();
    if fact.non_null_pointer == Some(true) {
        let branch = out
            .ty
            .as_ref()
            .and_then(Type::nullable_pointer_branch)
            .cloned();
        if let Some(branch) = branch {
            out.name = branch.canonical();
            out.non_zero = true;
            out.ty = Some(branch);
        }
    }
    if let Some(min) = fact.min {
        out.min = Some(out.min.map_or(min, |m| m.max(min)));
    }
    if let Some(max) = fact.max {
        out.max = Some(out.max.map_or(max, |m| m.min(max)));
    }
    if fact.non_zero == Some(true) {
        out.non_zero = true;
    }
    if let (Some(min), Some(max)) = (out.min, out.max) {
        if min > max {
            out.min = None;
            out.max = None;
        }
    }
    if let (Some(min), Some(max)) = (out.min, out.max) {
        if min > 0 || max < 0 {
            out.non_zero = true;
        }
    }
    out
}

// === Generics ===

/// Replace bound generic placeholders throughout a type.
pub fn substitute(ty: &Type, bindings: &HashMap<String, Type>) -> Type {
    match ty {
        Type::Named { name, args } => {
            if args.is_empty() {
                if let Some(bound) = bindings.get(name) {
                    return bound.clone();
                }
            }
            Type::Named {
                name: name.clone(),
                args: args.iter().map(|a| substitute(a, bindings)).collect(),
            }
        }
        Type::Pointer { mutable, moving, inner } => Type::Pointer {
            mutable: *mutable,
            moving: *moving,
            inner: Box::new(substitute(inner, bindings)),
        },
        Type::Array { element, init, total } => Type::Array {
            element: Box::new(substitute(element, bindings)),
            init: *init,
            total: *total,
        },
        Type::Tuple(members) => {
            Type::Tuple(members.iter().map(|m| substitute(m, bindings)).collect())
        }
        Type::Refinement { base, op, value } => Type::Refinement {
            base: Box::new(substitute(base, bindings)),
            op: *op,
            value: value.clone(),
        },
        Type::Union(left, right) => Type::Union(
            Box::new(substitute(left, bindings)),
            Box::new(substitute(right, bindings)),
        ),
        _ => ty.clone(),
    }
}

/// Unify a declared parameter type against an argument type, recording the
/// first binding seen for each generic placeholder.
pub fn bind_generics(
    param: &Type,
    arg: &Type,
    generic_names: &HashSet<String>,
    bindings: &mut HashMap<String, Type>,
) {
    match (param, arg) {
        (Type::Named { name, args }, _) => {
            if args.is_empty() && generic_names.contains(name) {
                if !bindings.contains_key(name) {
                    bindings.insert(name.clone(), arg.clone());
                }
                return;
            }
            if let Type::Named { name: arg_name, args: arg_args } = arg {
                if arg_name == name {
                    for (p, a) in args.iter().zip(arg_args.iter()) {
                        bind_generics(p, a, generic_names, bindings);
                    }
                }
            }
        }
        (Type::Pointer { inner: p, .. }, Type::Pointer { inner: a, .. }) => {
            bind_generics(p, a, generic_names, bindings);
        }
        (Type::Array { element: p, .. }, Type::Array { element: a, .. }) => {
            bind_generics(p, a, generic_names, bindings);
        }
        (Type::Tuple(ps), Type::Tuple(as_)) => {
            for (p, a) in ps.iter().zip(as_.iter()) {
                bind_generics(p, a, generic_names, bindings);
            }
        }
        (Type::Refinement { base, .. }, _) => {
            bind_generics(base, arg, generic_names, bindings);
        }
        _ => {}
    }
}

/// Collect argument-free names that are not declared types anywhere; they
/// behave as implicit generic placeholders at call sites.
pub fn collect_type_variables(ty: &Type, known: &HashSet<String>, out: &mut HashSet<String>) {
    match ty {
        Type::Named { name, args } => {
            if args.is_empty() && !known.contains(name) {
                out.insert(name.clone());
                return;
            }
            for arg in args {
                collect_type_variables(arg, known, out);
            }
        }
        Type::Pointer { inner, .. } => collect_type_variables(inner, known, out),
        Type::Array { element, .. } => collect_type_variables(element, known, out),
        Type::Tuple(members) => {
            for member in members {
                collect_type_variables(member, known, out);
            }
        }
        Type::Refinement { base, .. } => collect_type_variables(base, known, out),
        Type::Union(left, right) => {
            collect_type_variables(left, known, out);
            collect_type_variables(right, known, out);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> Type {
        Type::Named {
            name: name.to_string(),
            args: vec![],
        }
    }

    #[test]
    fn test_compatibility_is_reflexive() {
        for name in ["I32", "Bool", "*mut I32", "Foo|Bar", "Tuple", "Array"] {
            assert!(compatible_names(name, name));
        }
    }

    #[test]
    fn test_unknown_and_anyvalue_are_escape_hatches() {
        assert!(compatible_names("Unknown", "I32"));
        assert!(compatible_names("I32", "Unknown"));
        assert!(compatible_names("AnyValue", "Foo"));
        assert!(compatible_names("Foo", "AnyValue"));
    }

    #[test]
    fn test_single_letter_names_are_generic_placeholders() {
        assert!(compatible_names("T", "I32"));
        assert!(compatible_names("*Str", "U"));
        assert!(!compatible_names("Ty", "I32"));
    }

    #[test]
    fn test_union_accepts_members() {
        assert!(compatible_names("Some|None", "Some"));
        assert!(compatible_names("Some|None", "None"));
        assert!(!compatible_names("Some|None", "Other"));
    }

    #[test]
    fn test_mutable_pointer_satisfies_immutable() {
        assert!(compatible_names("*I32", "*mut I32"));
        assert!(!compatible_names("*mut I32", "*I32"));
        assert!(!compatible_names("*I32", "*mut Bool"));
    }

    #[test]
    fn test_canonical_erases_refinements_and_generics() {
        let refined = Type::Refinement {
            base: Box::new(named("I32")),
            op: RefineOp::Ne,
            value: Some(RefinementValue {
                value: 0,
                suffix: String::new(),
            }),
        };
        assert_eq!(refined.canonical(), "I32");

        let vec = Type::Named {
            name: "Vec".to_string(),
            args: vec![named("I32")],
        };
        assert_eq!(vec.canonical(), "Vec");

        let ptr = Type::Pointer {
            mutable: true,
            moving: false,
            inner: Box::new(named("Str")),
        };
        assert_eq!(ptr.canonical(), "*mut Str");

        let callback = Type::Function {
            params: vec![named("I32"), named("Bool")],
            ret: Box::new(named("I32")),
        };
        assert_eq!(callback.canonical(), "(I32,Bool)=>I32");
    }

    #[test]
    fn test_nullable_pointer_branch_detection() {
        let sentinel = Type::Refinement {
            base: Box::new(named("USize")),
            op: RefineOp::Eq,
            value: Some(RefinementValue {
                value: 0,
                suffix: "USize".to_string(),
            }),
        };
        let pointer = Type::Pointer {
            mutable: false,
            moving: false,
            inner: Box::new(named("I32")),
        };
        let nullable = Type::Union(Box::new(pointer.clone()), Box::new(sentinel.clone()));
        assert_eq!(nullable.nullable_pointer_branch(), Some(&pointer));

        let flipped = Type::Union(Box::new(sentinel), Box::new(pointer.clone()));
        assert_eq!(flipped.nullable_pointer_branch(), Some(&pointer));

        let plain = Type::Union(Box::new(named("Some")), Box::new(named("None")));
        assert_eq!(plain.nullable_pointer_branch(), None);
    }

    #[test]
    fn test_intersect_bounds_tightens_and_resets() {
        let info = TypeInfo {
            name: "I32".to_string(),
            min: Some(0),
            max: Some(100),
            ..TypeInfo::default()
        };
        let narrowed = intersect_bounds(
            &info,
            &Fact {
                min: Some(5),
                max: Some(50),
                ..Fact::default()
            },
        );
        assert_eq!(narrowed.min, Some(5));
        assert_eq!(narrowed.max, Some(50));
        assert!(narrowed.non_zero);

        let contradictory = intersect_bounds(
            &info,
            &Fact {
                min: Some(200),
                ..Fact::default()
            },
        );
        assert_eq!(contradictory.min, None);
        assert_eq!(contradictory.max, None);
    }

    #[test]
    fn test_substitute_replaces_placeholders() {
        let mut bindings = HashMap::new();
        bindings.insert("T".to_string(), named("I32"));
        let param = Type::Pointer {
            mutable: false,
            moving: false,
            inner: Box::new(named("T")),
        };
        assert_eq!(substitute(&param, &bindings).canonical(), "*I32");
    }

    #[test]
    fn test_bind_generics_from_argument() {
        let mut generic_names = HashSet::new();
        generic_names.insert("T".to_string());
        let mut bindings = HashMap::new();
        let param = Type::Pointer {
            mutable: false,
            moving: false,
            inner: Box::new(named("T")),
        };
        let arg = Type::Pointer {
            mutable: true,
            moving: false,
            inner: Box::new(named("Bool")),
        };
        bind_generics(&param, &arg, &generic_names, &mut bindings);
        assert_eq!(bindings.get("T"), Some(&named("Bool")));
    }
}
