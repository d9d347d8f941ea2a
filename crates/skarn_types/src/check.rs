//! Refinement typechecking pass

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use skarn_ast::{Arena, NodeId, NodeKind};
use skarn_diag::{Diagnostic, ErrorCode};

use crate::types::*;

pub type TypeResult<T> = Result<T, Diagnostic>;

/// Prelude of names the checker never treats as generic placeholders.
const PRIMITIVES: &[&str] = &[
    "I8", "I16", "I32", "I64", "I128", "U8", "U16", "U32", "U64", "U128", "USize", "ISize", "F32",
    "F64", "Bool", "Char", "AnyValue", "Void", "Unknown",
];

#[derive(Debug, Clone, Default)]
pub struct TypeOptions {
    /// Skips the four hazard proofs. Reserved for compiler-internal
    /// bootstrap builds; user compilations always run strict.
    pub relaxed_safety: bool,
}

/// Typecheck a resolved program. Validation only: the AST is never
/// rewritten, and the first error aborts the pass.
pub fn typecheck(arena: &Arena, root: NodeId) -> TypeResult<()> {
    typecheck_with(arena, root, &TypeOptions::default())
}

pub fn typecheck_with(arena: &Arena, root: NodeId, options: &TypeOptions) -> TypeResult<()> {
    let mut checker = TypeChecker::new(arena, options);
    checker.run(root)
}

type Scope = HashMap<String, TypeInfo>;
type Facts = HashMap<String, Fact>;

pub struct TypeChecker<'a> {
    arena: &'a Arena,
    strict_safety: bool,
    structs: HashMap<String, NodeId>,
    enums: HashMap<String, NodeId>,
    functions: HashMap<String, NodeId>,
    type_aliases: HashMap<String, Type>,
    globals: HashMap<String, TypeInfo>,
    known_type_names: HashSet<String>,
    /// Identifier denominators proven non-zero by the division and
    /// modulo proofs
    proven_nonzero: RefCell<HashSet<String>>,
}

impl<'a> TypeChecker<'a> {
    pub fn new(arena: &'a Arena, options: &TypeOptions) -> Self {
        TypeChecker {
            arena,
            strict_safety: !options.relaxed_safety,
            structs: HashMap::new(),
            enums: HashMap::new(),
            functions: HashMap::new(),
            type_aliases: HashMap::new(),
            globals: HashMap::new(),
            known_type_names: HashSet::new(),
            proven_nonzero: RefCell::new(HashSet::new()),
        }
    }

    /// Identifier names the hazard proofs established as non-zero.
    /// Backends may narrow runtime checks with these.
    pub fn into_proven_nonzero(self) -> HashSet<String> {
        self.proven_nonzero.into_inner()
    }

    pub fn run(&mut self, root: NodeId) -> TypeResult<()> {
        let body = self.arena.seq(root, 1);
        self.collect_tables(body);
        for &node in body {
            let mut scope = Scope::new();
            self.infer_node(node, &mut scope, &Facts::new(), None)?;
        }
        Ok(())
    }

    // === Declaration tables ===

    fn collect_tables(&mut self, body: &[NodeId]) {
        for &node in body {
            let name = self.arena.string(node, 1).to_string();
            match self.arena.kind(node) {
                NodeKind::StructDecl => {
                    self.structs.insert(name, node);
                }
                NodeKind::EnumDecl => {
                    self.enums.insert(name, node);
                }
                NodeKind::FnDecl
                | NodeKind::ExternFnDecl
                | NodeKind::ExpectFnDecl
                | NodeKind::ActualFnDecl => {
                    self.functions.insert(name, node);
                }
                NodeKind::TypeAlias => {
                    let aliased = match self.arena.node(node, 2) {
                        Some(ty) => Type::from_node(self.arena, ty),
                        None => Type::Unknown,
                    };
                    self.type_aliases.insert(name, aliased);
                }
                NodeKind::ExternTypeDecl => {
                    self.type_aliases.insert(name, Type::Unknown);
                }
                _ => {}
            }
        }
        for &node in body {
            let typed_let = matches!(
                self.arena.kind(node),
                NodeKind::LetDecl | NodeKind::ExternLetDecl
            );
            if typed_let {
                if let Some(ty) = self.arena.node(node, 2) {
                    let info = self.resolve_info(&Type::from_node(self.arena, ty));
                    self.globals
                        .insert(self.arena.string(node, 1).to_string(), info);
                }
            }
        }
        self.known_type_names = self
            .type_aliases
            .keys()
            .chain(self.structs.keys())
            .chain(self.enums.keys())
            .cloned()
            .chain(PRIMITIVES.iter().map(|p| p.to_string()))
            .collect();
    }

    /// Fold type annotations down to the bounds and tags the hazard proofs
    /// consume. Alias chains contribute only their union tags; a cycle guard
    /// stops self-referential aliases.
    fn resolve_info(&self, ty: &Type) -> TypeInfo {
        self.resolve_info_inner(ty, &mut HashSet::new())
    }

    fn resolve_info_inner(&self, ty: &Type, seen: &mut HashSet<String>) -> TypeInfo {
        match ty {
            Type::Named { name, .. } => {
                let mut info = TypeInfo::named(name);
                if name == "I32" {
                    info.min = Some(I32_MIN);
                    info.max = Some(I32_MAX);
                }
                if is_unsigned(name) {
                    info.min = Some(0);
                }
                if let Some(aliased) = self.type_aliases.get(name) {
                    if !seen.contains(name) {
                        seen.insert(name.clone());
                        info.union_tags = self.resolve_info_inner(aliased, seen).union_tags;
                    }
                }
                info.ty = Some(ty.clone());
                info
            }
            Type::Refinement { base, op, value } => {
                let mut info = self.resolve_info_inner(base, seen);
                if let Some(value) = value {
                    let v = value.value;
                    match op {
                        RefineOp::Ne if v == 0 => info.non_zero = true,
                        RefineOp::Lt => {
                            info.max = Some(info.max.map_or(v - 1, |m| m.min(v - 1)));
                        }
                        RefineOp::Le => {
                            info.max = Some(info.max.map_or(v, |m| m.min(v)));
                        }
                        RefineOp::Gt => {
                            info.min = Some(info.min.map_or(v + 1, |m| m.max(v + 1)));
                        }
                        RefineOp::Ge => {
                            info.min = Some(info.min.map_or(v, |m| m.max(v)));
                        }
                        _ => {}
                    }
                }
                info
            }
            Type::Union(left, right) => {
                let left = self.resolve_info_inner(left, seen);
                let right = self.resolve_info_inner(right, seen);
                let mut tags = Vec::new();
                for name in [&left.name, &right.name] {
                    if name != "Unknown" && !tags.contains(name) {
                        tags.push(name.clone());
                    }
                }
                TypeInfo {
                    name: format!("{}|{}", left.name, right.name),
                    union_tags: tags,
                    ty: Some(ty.clone()),
                    ..TypeInfo::default()
                }
            }
            Type::Array { init, total, .. } => TypeInfo {
                name: "Array".to_string(),
                array_init: *init,
                array_total: *total,
                ty: Some(ty.clone()),
                ..TypeInfo::default()
            },
            Type::Pointer { mutable, inner, .. } => {
                let inner_info = self.resolve_info_inner(inner, seen);
                let name = if *mutable {
                    format!("*mut {}", inner_info.name)
                } else {
                    format!("*{}", inner_info.name)
                };
                TypeInfo {
                    name,
                    ty: Some(ty.clone()),
                    ..inner_info
                }
            }
            _ => TypeInfo {
                name: ty.canonical(),
                ty: Some(ty.clone()),
                ..TypeInfo::default()
            },
        }
    }

    fn info_for_node(&self, node: Option<NodeId>) -> TypeInfo {
        match node {
            Some(node) => self.resolve_info(&Type::from_node(self.arena, node)),
            None => TypeInfo::unknown(),
        }
    }

    // === Flow facts ===

    /// Pattern-match a branch condition into per-identifier evidence; the
    /// negated form feeds the else branch. Only comparison shapes against
    /// number literals are understood.
    fn derive_facts(&self, cond: NodeId, truthy: bool) -> Facts {
        let mut facts = Facts::new();
        self.derive_into(cond, truthy, &mut facts);
        facts
    }

    fn derive_into(&self, node: NodeId, truthy: bool, facts: &mut Facts) {
        if self.arena.kind(node) != NodeKind::Binary {
            return;
        }
        let op = self.arena.string(node, 1);
        let left = self.arena.node(node, 2);
        let right = self.arena.node(node, 3);
        match op {
            "&&" => {
                if truthy {
                    if let Some(left) = left {
                        self.derive_into(left, true, facts);
                    }
                    if let Some(right) = right {
                        self.derive_into(right, true, facts);
                    }
                }
            }
            "||" => {
                if !truthy {
                    if let Some(left) = left {
                        self.derive_into(left, false, facts);
                    }
                    if let Some(right) = right {
                        self.derive_into(right, false, facts);
                    }
                }
            }
            _ => {
                let effective = if truthy { op } else { negate_op(op) };
                if let (Some(left), Some(right)) = (left, right) {
                    self.fact_from_comparison(left, effective, right, facts);
                }
            }
        }
    }

    fn fact_from_comparison(&self, left: NodeId, op: &str, right: NodeId, facts: &mut Facts) {
        if self.arena.kind(left) == NodeKind::Ident {
            if let Some(v) = literal_int(self.arena, right) {
                let name = self.arena.string(left, 1);
                match op {
                    "<" => add_fact(facts, name, Fact { max: Some(v - 1), ..Fact::default() }),
                    "<=" => add_fact(facts, name, Fact { max: Some(v), ..Fact::default() }),
                    ">" => add_fact(facts, name, Fact { min: Some(v + 1), ..Fact::default() }),
                    ">=" => add_fact(facts, name, Fact { min: Some(v), ..Fact::default() }),
                    "==" => add_fact(
                        facts,
                        name,
                        Fact {
                            min: Some(v),
                            max: Some(v),
                            non_zero: Some(v != 0),
                            ..Fact::default()
                        },
                    ),
                    "!=" => {
                        if v == 0 {
                            add_fact(facts, name, Fact { non_zero: Some(true), ..Fact::default() });
                        }
                        if self.is_usize_zero_literal(right) {
                            add_fact(
                                facts,
                                name,
                                Fact { non_null_pointer: Some(true), ..Fact::default() },
                            );
                        }
                    }
                    _ => {}
                }
            }
        }
        if self.arena.kind(right) == NodeKind::Ident
            && op == "!="
            && self.is_usize_zero_literal(left)
        {
            add_fact(
                facts,
                self.arena.string(right, 1),
                Fact { non_null_pointer: Some(true), ..Fact::default() },
            );
        }
    }

    fn is_usize_zero_literal(&self, node: NodeId) -> bool {
        literal_int(self.arena, node) == Some(0) && self.arena.string(node, 2) == "USize"
    }

    // === Statements ===

    fn infer_node(
        &self,
        node: NodeId,
        scope: &mut Scope,
        facts: &Facts,
        expected_return: Option<&TypeInfo>,
    ) -> TypeResult<TypeInfo> {
        match self.arena.kind(node) {
            NodeKind::Block => {
                let mut last = TypeInfo::named("Void");
                let mut local = scope.clone();
                for &stmt in self.arena.seq(node, 1) {
                    last = self.infer_node(stmt, &mut local, facts, expected_return)?;
                }
                Ok(last)
            }
            NodeKind::LetDecl => {
                let value = match self.arena.node(node, 3) {
                    Some(value) => self.infer_expr(value, scope, facts)?,
                    None => TypeInfo::unknown(),
                };
                let name = self.arena.string(node, 1).to_string();
                let expected = self.arena.node(node, 2).map(|ty| self.info_for_node(Some(ty)));
                if let Some(expected) = &expected {
                    if value.name != "Unknown"
                        && !compatible_names(&expected.name, &value.name)
                        && !compatible_numeric(&expected.name, &value.name, &value)
                        && !self.type_aliases.contains_key(&expected.name)
                    {
                        return Err(self.err_code(
                            ErrorCode::TypeMismatch,
                            format!(
                                "Type mismatch for let {}: expected {}, got {}",
                                name, expected.name, value.name
                            ),
                            node,
                        ));
                    }
                    if self.strict_safety && expected.non_zero && !value.non_zero {
                        return Err(self.err_code(
                            ErrorCode::TypeRefinementUnproven,
                            format!("Cannot prove non-zero refinement for {}", name),
                            node,
                        ));
                    }
                }
                let stored = match &expected {
                    Some(expected) => intersect_bounds(expected, &value.as_fact()),
                    None => value,
                };
                scope.insert(name, stored);
                Ok(TypeInfo::named("Void"))
            }
            NodeKind::AssignStmt => {
                let value = match self.arena.node(node, 2) {
                    Some(value) => self.infer_expr(value, scope, facts)?,
                    None => TypeInfo::unknown(),
                };
                if let Some(target) = self.arena.node(node, 1) {
                    if self.arena.kind(target) == NodeKind::Ident {
                        let name = self.arena.string(target, 1).to_string();
                        if let Some(t) = scope.get(&name).cloned() {
                            if value.name != "Unknown" && !compatible_names(&t.name, &value.name) {
                                return Err(self.err_code(
                                    ErrorCode::TypeMismatch,
                                    format!(
                                        "Assignment mismatch for {}: expected {}, got {}",
                                        name, t.name, value.name
                                    ),
                                    node,
                                ));
                            }
                            scope.insert(name, intersect_bounds(&t, &value.as_fact()));
                        }
                    }
                }
                Ok(TypeInfo::named("Void"))
            }
            NodeKind::ExprStmt => match self.arena.node(node, 1) {
                Some(expr) => self.infer_expr(expr, scope, facts),
                None => Ok(TypeInfo::named("Void")),
            },
            NodeKind::ReturnStmt => {
                let value = match self.arena.node(node, 1) {
                    Some(value) => self.infer_expr(value, scope, facts)?,
                    None => TypeInfo::named("Void"),
                };
                if let Some(expected) = expected_return {
                    if expected.name != "Unknown"
                        && value.name != "Unknown"
                        && !compatible_names(&expected.name, &value.name)
                    {
                        return Err(self.err_code(
                            ErrorCode::TypeMismatch,
                            format!(
                                "Return type mismatch: expected {}, got {}",
                                expected.name, value.name
                            ),
                            node,
                        ));
                    }
                    if self.strict_safety && expected.non_zero && !value.non_zero {
                        return Err(self.err_code(
                            ErrorCode::TypeRefinementUnproven,
                            "Return value does not satisfy non-zero refinement",
                            node,
                        ));
                    }
                }
                Ok(value)
            }
            NodeKind::IfStmt => {
                let cond = match self.arena.node(node, 1) {
                    Some(cond) => {
                        let info = self.infer_expr(cond, scope, facts)?;
                        if info.name != "Bool" && info.name != "Unknown" {
                            return Err(self.err_code(
                                ErrorCode::TypeMismatch,
                                "if condition must be Bool",
                                cond,
                            ));
                        }
                        Some(cond)
                    }
                    None => None,
                };
                if let Some(then_branch) = self.arena.node(node, 2) {
                    let branch_facts = self.branch_facts(cond, true, facts);
                    let mut branch_scope = scope.clone();
                    self.infer_branch(then_branch, &mut branch_scope, &branch_facts, expected_return)?;
                }
                if let Some(else_branch) = self.arena.node(node, 3) {
                    let branch_facts = self.branch_facts(cond, false, facts);
                    let mut branch_scope = scope.clone();
                    self.infer_branch(else_branch, &mut branch_scope, &branch_facts, expected_return)?;
                }
                Ok(TypeInfo::named("Void"))
            }
            NodeKind::WhileStmt => {
                if let Some(cond) = self.arena.node(node, 1) {
                    self.infer_expr(cond, scope, facts)?;
                }
                if let Some(body) = self.arena.node(node, 2) {
                    let mut branch_scope = scope.clone();
                    self.infer_branch(body, &mut branch_scope, facts, expected_return)?;
                }
                Ok(TypeInfo::named("Void"))
            }
            NodeKind::ForStmt => {
                let iterator = self.arena.string(node, 1).to_string();
                scope.insert(
                    iterator,
                    TypeInfo {
                        name: "I32".to_string(),
                        min: Some(0),
                        ..TypeInfo::default()
                    },
                );
                if let Some(start) = self.arena.node(node, 2) {
                    self.infer_expr(start, scope, facts)?;
                }
                if let Some(end) = self.arena.node(node, 3) {
                    self.infer_expr(end, scope, facts)?;
                }
                if let Some(body) = self.arena.node(node, 4) {
                    let mut branch_scope = scope.clone();
                    self.infer_branch(body, &mut branch_scope, facts, expected_return)?;
                }
                Ok(TypeInfo::named("Void"))
            }
            NodeKind::LoopStmt => {
                if let Some(body) = self.arena.node(node, 1) {
                    let mut branch_scope = scope.clone();
                    self.infer_branch(body, &mut branch_scope, facts, expected_return)?;
                }
                Ok(TypeInfo::named("Void"))
            }
            NodeKind::LifetimeStmt => {
                if let Some(body) = self.arena.node(node, 2) {
                    let mut branch_scope = scope.clone();
                    self.infer_branch(body, &mut branch_scope, facts, expected_return)?;
                }
                Ok(TypeInfo::named("Void"))
            }
            NodeKind::FnDecl | NodeKind::ActualFnDecl => {
                let mut fn_scope = self.globals.clone();
                for &param in self.arena.seq(node, 3) {
                    let info = self.info_for_node(self.arena.node(param, 2));
                    fn_scope.insert(self.arena.string(param, 1).to_string(), info);
                }
                let expected = self.info_for_node(self.arena.node(node, 4));
                let body_type = match self.arena.node(node, 5) {
                    Some(body) if self.arena.kind(body) == NodeKind::Block => {
                        self.infer_node(body, &mut fn_scope, &Facts::new(), Some(&expected))?
                    }
                    Some(body) => self.infer_expr(body, &fn_scope, &Facts::new())?,
                    None => TypeInfo::named("Void"),
                };
                if body_type.name != "Unknown"
                    && body_type.name != "Void"
                    && !compatible_names(&expected.name, &body_type.name)
                {
                    return Err(self.err_code(
                        ErrorCode::TypeMismatch,
                        format!(
                            "Function {} return type mismatch: expected {}, got {}",
                            self.arena.string(node, 1),
                            expected.name,
                            body_type.name
                        ),
                        node,
                    ));
                }
                Ok(TypeInfo::named("Void"))
            }
            NodeKind::TypeAlias => {
                self.check_destructor(node)?;
                Ok(TypeInfo::named("Void"))
            }
            _ => Ok(TypeInfo::named("Void")),
        }
    }

    /// A branch is either a block statement or a bare expression.
    fn infer_branch(
        &self,
        node: NodeId,
        scope: &mut Scope,
        facts: &Facts,
        expected_return: Option<&TypeInfo>,
    ) -> TypeResult<TypeInfo> {
        if self.arena.kind(node) == NodeKind::Block {
            self.infer_node(node, scope, facts, expected_return)
        } else {
            self.infer_expr(node, scope, facts)
        }
    }

    fn branch_facts(&self, cond: Option<NodeId>, truthy: bool, facts: &Facts) -> Facts {
        let mut out = facts.clone();
        if let Some(cond) = cond {
            for (name, patch) in self.derive_facts(cond, truthy) {
                let merged = match out.get(&name) {
                    Some(prev) => prev.merged(&patch),
                    None => patch,
                };
                out.insert(name, merged);
            }
        }
        out
    }

    // === Expressions ===

    fn infer_expr(&self, node: NodeId, scope: &Scope, facts: &Facts) -> TypeResult<TypeInfo> {
        match self.arena.kind(node) {
            NodeKind::NumberLit => {
                if self.arena.int(node, 3) != 0 {
                    let value = f64::from_bits(self.arena.int(node, 1) as u64);
                    return Ok(TypeInfo {
                        name: "F64".to_string(),
                        non_zero: value != 0.0,
                        ty: Some(Type::Named { name: "F64".to_string(), args: vec![] }),
                        ..TypeInfo::default()
                    });
                }
                let value = self.arena.int(node, 1);
                let name = if self.arena.string(node, 2) == "USize" {
                    "USize"
                } else {
                    "I32"
                };
                Ok(TypeInfo {
                    name: name.to_string(),
                    min: Some(value),
                    max: Some(value),
                    non_zero: value != 0,
                    ty: Some(Type::Named { name: name.to_string(), args: vec![] }),
                    ..TypeInfo::default()
                })
            }
            NodeKind::BoolLit => Ok(TypeInfo::named("Bool")),
            NodeKind::StringLit => Ok(TypeInfo::named("*Str")),
            NodeKind::CharLit => Ok(TypeInfo::named("Char")),
            NodeKind::Ident => {
                let name = self.arena.string(node, 1);
                if let Some(base) = scope.get(name) {
                    return Ok(match facts.get(name) {
                        Some(fact) => intersect_bounds(base, fact),
                        None => base.clone(),
                    });
                }
                if let Some(info) = self.globals.get(name) {
                    return Ok(info.clone());
                }
                if self.functions.contains_key(name) {
                    return Ok(TypeInfo::named("Fn"));
                }
                if self.structs.contains_key(name) || self.enums.contains_key(name) {
                    return Ok(TypeInfo::named(name));
                }
                Ok(TypeInfo::unknown())
            }
            NodeKind::StructInit => {
                let name = self.arena.string(node, 1);
                let decl = match self.structs.get(name) {
                    Some(&decl) => decl,
                    None => {
                        return Err(self.err_code(
                            ErrorCode::ResolveUnknownStruct,
                            format!("Unknown struct '{}'", name),
                            node,
                        ));
                    }
                };
                let declared: HashSet<&str> = self
                    .arena
                    .seq(decl, 2)
                    .iter()
                    .map(|&f| self.arena.string(f, 1))
                    .collect();
                for &field in self.arena.seq(node, 2) {
                    let key = self.arena.string(field, 1);
                    if !declared.contains(key) {
                        return Err(self.err_code(
                            ErrorCode::TypeMismatch,
                            format!("Unknown field '{}' for struct {}", key, name),
                            node,
                        ));
                    }
                    if let Some(value) = self.arena.node(field, 2) {
                        self.infer_expr(value, scope, facts)?;
                    }
                }
                Ok(TypeInfo::named(name))
            }
            NodeKind::Unary => {
                let op = self.arena.string(node, 1);
                let operand = match self.arena.node(node, 2) {
                    Some(operand) => self.infer_expr(operand, scope, facts)?,
                    None => TypeInfo::unknown(),
                };
                if op == "&" || op == "&mut" {
                    let mutable = op == "&mut";
                    let inner = operand.ty.clone().unwrap_or(Type::Named {
                        name: operand.name.clone(),
                        args: vec![],
                    });
                    let ty = Type::Pointer {
                        mutable,
                        moving: false,
                        inner: Box::new(inner),
                    };
                    return Ok(TypeInfo {
                        name: ty.canonical(),
                        non_zero: true,
                        ty: Some(ty),
                        ..TypeInfo::default()
                    });
                }
                if op == "!" && operand.name != "Bool" && operand.name != "Unknown" {
                    return Err(self.err_code(ErrorCode::TypeOperator, "'!' expects Bool", node));
                }
                if op == "-" {
                    if !is_numeric(&operand.name) && operand.name != "Unknown" {
                        return Err(self.err_code(
                            ErrorCode::TypeOperator,
                            "Unary '-' expects numeric type",
                            node,
                        ));
                    }
                    let mut out = operand.clone();
                    out.min = operand.max.map(|m| -m);
                    out.max = operand.min.map(|m| -m);
                    return Ok(out);
                }
                Ok(TypeInfo::named("Bool"))
            }
            NodeKind::Binary => self.infer_binary(node, scope, facts),
            NodeKind::Call => self.infer_call(node, scope, facts),
            NodeKind::Member => {
                let object = match self.arena.node(node, 1) {
                    Some(object) => self.infer_expr(object, scope, facts)?,
                    None => TypeInfo::unknown(),
                };
                if self.strict_safety && is_nullable_pointer(&object) {
                    return Err(self
                        .err_code(
                            ErrorCode::SafetyNullablePointerGuard,
                            "Nullable pointer access requires guard",
                            node,
                        )
                        .with_fix(
                            "Use if (p != 0USize) or if (0USize != p) before accessing members.",
                        ));
                }
                let property = self.arena.string(node, 2);
                if property == "length" || property == "init" {
                    return Ok(TypeInfo {
                        name: "USize".to_string(),
                        min: Some(0),
                        max: object.array_total.or(object.array_init),
                        ..TypeInfo::default()
                    });
                }
                Ok(TypeInfo::unknown())
            }
            NodeKind::Index => {
                let target = match self.arena.node(node, 1) {
                    Some(target) => self.infer_expr(target, scope, facts)?,
                    None => TypeInfo::unknown(),
                };
                if self.strict_safety && is_nullable_pointer(&target) {
                    return Err(self
                        .err_code(
                            ErrorCode::SafetyNullablePointerGuard,
                            "Nullable pointer indexing requires guard",
                            node,
                        )
                        .with_fix(
                            "Use if (p != 0USize) or if (0USize != p) before indexing through pointers.",
                        ));
                }
                let index = match self.arena.node(node, 2) {
                    Some(index) => self.infer_expr(index, scope, facts)?,
                    None => TypeInfo::unknown(),
                };
                if self.strict_safety {
                    if let Some(init) = target.array_init {
                        let max = match index.max {
                            Some(max) => max,
                            None => {
                                return Err(self
                                    .err_code(
                                        ErrorCode::SafetyArrayBoundsUnproven,
                                        "Cannot prove array index bound safety",
                                        node,
                                    )
                                    .with_fix(
                                        "Guard index with 'if (i < arr.length)' before indexing.",
                                    ));
                            }
                        };
                        if max >= init || matches!(index.min, Some(min) if min < 0) {
                            return Err(self
                                .err_code(
                                    ErrorCode::SafetyArrayBounds,
                                    "Array index may be out of bounds",
                                    node,
                                )
                                .with_fix("Ensure 0 <= index < initialized length."));
                        }
                    }
                }
                Ok(TypeInfo::unknown())
            }
            NodeKind::IfExpr => {
                let cond = self.arena.node(node, 1);
                if let Some(cond) = cond {
                    let info = self.infer_expr(cond, scope, facts)?;
                    if info.name != "Bool" && info.name != "Unknown" {
                        return Err(self.err_code(
                            ErrorCode::TypeMismatch,
                            "if condition must be Bool",
                            cond,
                        ));
                    }
                }
                let then_info = match self.arena.node(node, 2) {
                    Some(then_branch) => {
                        let branch_facts = self.branch_facts(cond, true, facts);
                        let mut branch_scope = scope.clone();
                        self.infer_branch(then_branch, &mut branch_scope, &branch_facts, None)?
                    }
                    None => TypeInfo::unknown(),
                };
                if let Some(else_branch) = self.arena.node(node, 3) {
                    let branch_facts = self.branch_facts(cond, false, facts);
                    let mut branch_scope = scope.clone();
                    let else_info =
                        self.infer_branch(else_branch, &mut branch_scope, &branch_facts, None)?;
                    if then_info.name == else_info.name {
                        return Ok(then_info);
                    }
                    return Ok(TypeInfo::unknown());
                }
                Ok(then_info)
            }
            NodeKind::MatchExpr => {
                let target = match self.arena.node(node, 1) {
                    Some(target) => self.infer_expr(target, scope, facts)?,
                    None => TypeInfo::unknown(),
                };
                let mut seen = HashSet::new();
                let mut has_wildcard = false;
                for &arm in self.arena.seq(node, 2) {
                    if let Some(pattern) = self.arena.node(arm, 1) {
                        match self.arena.kind(pattern) {
                            NodeKind::WildcardPat => has_wildcard = true,
                            NodeKind::NamePat | NodeKind::StructPat => {
                                seen.insert(self.arena.string(pattern, 1).to_string());
                            }
                            _ => {}
                        }
                    }
                    if let Some(body) = self.arena.node(arm, 2) {
                        let mut branch_scope = scope.clone();
                        self.infer_branch(body, &mut branch_scope, facts, None)?;
                    }
                }
                if self.strict_safety && !target.union_tags.is_empty() && !has_wildcard {
                    for tag in &target.union_tags {
                        if !seen.contains(tag) {
                            return Err(self
                                .err_code(
                                    ErrorCode::MatchNonExhaustive,
                                    format!("Non-exhaustive match: missing case for {}", tag),
                                    node,
                                )
                                .with_fix("Add missing case arms or a wildcard case '_'."));
                        }
                    }
                }
                Ok(TypeInfo::unknown())
            }
            NodeKind::IsExpr => {
                if let Some(subject) = self.arena.node(node, 1) {
                    self.infer_expr(subject, scope, facts)?;
                }
                Ok(TypeInfo::named("Bool"))
            }
            NodeKind::UnwrapExpr => match self.arena.node(node, 1) {
                Some(inner) => self.infer_expr(inner, scope, facts),
                None => Ok(TypeInfo::unknown()),
            },
            _ => Ok(TypeInfo::unknown()),
        }
    }

    fn infer_binary(&self, node: NodeId, scope: &Scope, facts: &Facts) -> TypeResult<TypeInfo> {
        let op = self.arena.string(node, 1).to_string();
        let left_node = self.arena.node(node, 2);
        let right_node = self.arena.node(node, 3);
        let left = match left_node {
            Some(left) => self.infer_expr(left, scope, facts)?,
            None => TypeInfo::unknown(),
        };
        let right = match right_node {
            Some(right) => self.infer_expr(right, scope, facts)?,
            None => TypeInfo::unknown(),
        };

        if matches!(op.as_str(), "+" | "-" | "*" | "/" | "%") {
            let left_ok = is_numeric(&left.name) || left.name == "Unknown";
            let right_ok = is_numeric(&right.name) || right.name == "Unknown";
            if !left_ok || !right_ok {
                return Err(self.err_code(
                    ErrorCode::TypeOperator,
                    format!("Operator {} expects numeric operands", op),
                    node,
                ));
            }

            if self.strict_safety && op == "/" && !right.non_zero {
                return Err(self
                    .err_code(
                        ErrorCode::SafetyDivByZero,
                        "Division by zero cannot be ruled out at compile time",
                        node,
                    )
                    .with_fix("Prove denominator != 0 via refinement type or control-flow guard."));
            }

            let mut out = TypeInfo::named(&left.name);
            if let (Some(l_min), Some(l_max), Some(r_min), Some(r_max)) =
                (left.min, left.max, right.min, right.max)
            {
                match op.as_str() {
                    "+" => {
                        out.min = Some(l_min.saturating_add(r_min));
                        out.max = Some(l_max.saturating_add(r_max));
                    }
                    "-" => {
                        out.min = Some(l_min.saturating_sub(r_max));
                        out.max = Some(l_max.saturating_sub(r_min));
                    }
                    "*" => {
                        let candidates = [
                            l_min.saturating_mul(r_min),
                            l_min.saturating_mul(r_max),
                            l_max.saturating_mul(r_min),
                            l_max.saturating_mul(r_max),
                        ];
                        out.min = candidates.iter().min().copied();
                        out.max = candidates.iter().max().copied();
                    }
                    _ => {}
                }
            }

            if self.strict_safety && matches!(op.as_str(), "+" | "-" | "*") {
                let left_lit = left_node.and_then(|n| literal_int(self.arena, n));
                let right_lit = right_node.and_then(|n| literal_int(self.arena, n));
                if let (Some(a), Some(b)) = (left_lit, right_lit) {
                    let folded = match op.as_str() {
                        "+" => a.checked_add(b),
                        "-" => a.checked_sub(b),
                        _ => a.checked_mul(b),
                    };
                    let in_range = matches!(folded, Some(r) if (I32_MIN..=I32_MAX).contains(&r));
                    if !in_range {
                        return Err(self
                            .err_code(
                                ErrorCode::SafetyOverflow,
                                format!("Integer overflow/underflow proven possible for '{}'", op),
                                node,
                            )
                            .with_fix(
                                "Constrain operands or use a larger intermediate numeric type.",
                            ));
                    }
                }
            }

            if self.strict_safety && op == "%" && !right.non_zero {
                return Err(self
                    .err_code(
                        ErrorCode::SafetyModByZero,
                        "Modulo by zero cannot be ruled out at compile time",
                        node,
                    )
                    .with_fix("Prove modulo divisor != 0 via guard or refinement."));
            }

            // Identifier denominators carry a non-zero proof past this point.
            if matches!(op.as_str(), "/" | "%") && right.non_zero {
                if let Some(denom) = right_node {
                    if self.arena.kind(denom) == NodeKind::Ident {
                        self.proven_nonzero
                            .borrow_mut()
                            .insert(self.arena.string(denom, 1).to_string());
                    }
                }
            }

            if let (Some(min), Some(max)) = (out.min, out.max) {
                if min > 0 || max < 0 {
                    out.non_zero = true;
                }
            }
            return Ok(out);
        }

        if matches!(op.as_str(), "==" | "!=" | "<" | "<=" | ">" | ">=") {
            return Ok(TypeInfo::named("Bool"));
        }

        if matches!(op.as_str(), "&&" | "||") {
            let left_ok = left.name == "Bool" || left.name == "Unknown";
            let right_ok = right.name == "Bool" || right.name == "Unknown";
            if !left_ok || !right_ok {
                return Err(self.err_code(
                    ErrorCode::TypeOperator,
                    format!("Operator {} expects Bool operands", op),
                    node,
                ));
            }
            return Ok(TypeInfo::named("Bool"));
        }

        Ok(TypeInfo::unknown())
    }

    fn infer_call(&self, node: NodeId, scope: &Scope, facts: &Facts) -> TypeResult<TypeInfo> {
        let callee = self.arena.node(node, 1);
        let args = self.arena.seq(node, 2);

        let fn_node = callee.and_then(|callee| {
            if self.arena.kind(callee) == NodeKind::Ident {
                self.functions.get(self.arena.string(callee, 1)).copied()
            } else {
                None
            }
        });
        let fn_node = match fn_node {
            Some(fn_node) => fn_node,
            None => {
                for &arg in args {
                    self.infer_expr(arg, scope, facts)?;
                }
                return Ok(TypeInfo::unknown());
            }
        };
        let fn_name = self.arena.string(fn_node, 1);

        let mut arg_infos = Vec::with_capacity(args.len());
        for &arg in args {
            arg_infos.push(self.infer_expr(arg, scope, facts)?);
        }

        let params = self.arena.seq(fn_node, 3);
        let param_types: Vec<Option<Type>> = params
            .iter()
            .map(|&p| self.arena.node(p, 2).map(|ty| Type::from_node(self.arena, ty)))
            .collect();
        let ret_type = self
            .arena
            .node(fn_node, 4)
            .map(|ty| Type::from_node(self.arena, ty));

        let mut generic_names: HashSet<String> = self
            .arena
            .seq(fn_node, 2)
            .iter()
            .map(|&g| self.arena.string(g, 1).to_string())
            .collect();
        for ty in param_types.iter().flatten() {
            collect_type_variables(ty, &self.known_type_names, &mut generic_names);
        }
        if let Some(ret) = &ret_type {
            collect_type_variables(ret, &self.known_type_names, &mut generic_names);
        }

        let mut bindings = HashMap::new();
        if !generic_names.is_empty() {
            for (idx, arg) in arg_infos.iter().enumerate() {
                if let Some(Some(param)) = param_types.get(idx) {
                    if let Some(arg_ty) = &arg.ty {
                        bind_generics(param, arg_ty, &generic_names, &mut bindings);
                    }
                }
            }
        }
        let resolved_return = ret_type.map(|ret| substitute(&ret, &bindings));

        if args.len() != params.len() {
            return Err(self.err_code(
                ErrorCode::TypeArity,
                format!(
                    "Function {} expects {} args, got {}",
                    fn_name,
                    params.len(),
                    args.len()
                ),
                node,
            ));
        }

        for (idx, arg) in arg_infos.iter().enumerate() {
            let expected_info = match &param_types[idx] {
                Some(ty) => self.resolve_info(ty),
                None => TypeInfo::unknown(),
            };
            let expected = expected_info.name.clone();

            if self.strict_safety && expected.starts_with('*') && is_nullable_pointer(arg) {
                return Err(self
                    .err_code(
                        ErrorCode::SafetyNullablePointerGuard,
                        format!(
                            "Call to {} arg {} requires nullable pointer guard",
                            fn_name,
                            idx + 1
                        ),
                        node,
                    )
                    .with_fix(
                        "Guard pointer use with if (p != 0USize) (or 0USize != p) before dereference/consumption.",
                    ));
            }

            if arg.name != "Unknown"
                && !compatible_names(&expected, &arg.name)
                && !compatible_numeric(&expected, &arg.name, arg)
                && !self.type_aliases.contains_key(&expected)
            {
                return Err(self.err_code(
                    ErrorCode::TypeMismatch,
                    format!(
                        "Type mismatch in call to {} arg {}: expected {}, got {}",
                        fn_name,
                        idx + 1,
                        expected,
                        arg.name
                    ),
                    node,
                ));
            }

            if self.strict_safety && expected_info.non_zero && !arg.non_zero {
                return Err(self.err_code(
                    ErrorCode::TypeRefinementUnproven,
                    format!(
                        "Call to {} requires arg {} to be proven non-zero",
                        fn_name,
                        idx + 1
                    ),
                    node,
                ));
            }
        }

        Ok(match resolved_return {
            Some(ret) => self.resolve_info(&ret),
            None => TypeInfo::unknown(),
        })
    }

    // === Destructors ===

    /// A `then destructorName` clause demands a function taking exactly
    /// `this : *move Alias` and returning Void.
    fn check_destructor(&self, node: NodeId) -> TypeResult<()> {
        let dtor = self.arena.string(node, 4);
        if dtor.is_empty() {
            return Ok(());
        }
        let alias = self.arena.string(node, 1);
        let fn_node = match self.functions.get(dtor) {
            Some(&fn_node) => fn_node,
            None => {
                return Err(self
                    .err_code(
                        ErrorCode::TypeDestructorNotFound,
                        format!("Destructor '{}' for type '{}' is not defined", dtor, alias),
                        node,
                    )
                    .with_fix("Define the destructor function or remove the 'then' clause."));
            }
        };
        let params = self.arena.seq(fn_node, 3);
        let receiver_ok = params.len() == 1 && {
            let param = params[0];
            self.arena.string(param, 1) == "this"
                && match self.arena.node(param, 2) {
                    Some(ty) => match Type::from_node(self.arena, ty) {
                        Type::Pointer { moving: true, inner, .. } => inner.canonical() == alias,
                        _ => false,
                    },
                    None => false,
                }
        };
        let ret_ok = match self.arena.node(fn_node, 4) {
            Some(ret) => Type::from_node(self.arena, ret).canonical() == "Void",
            None => true,
        };
        if !receiver_ok || !ret_ok {
            return Err(self
                .err_code(
                    ErrorCode::TypeDestructorSignature,
                    format!(
                        "Destructor '{}' must have signature (this : *move {}) : Void",
                        dtor, alias
                    ),
                    node,
                )
                .with_fix(
                    "Give the destructor exactly one 'this : *move' parameter and a Void return.",
                ));
        }
        Ok(())
    }

    // === Errors ===

    fn err_code(&self, code: ErrorCode, message: impl Into<String>, node: NodeId) -> Diagnostic {
        Diagnostic::new(code, message).with_span(self.arena.span(node))
    }
}

fn is_nullable_pointer(info: &TypeInfo) -> bool {
    info.ty
        .as_ref()
        .and_then(Type::nullable_pointer_branch)
        .is_some()
}

fn negate_op(op: &str) -> &str {
    match op {
        "<" => ">=",
        "<=" => ">",
        ">" => "<=",
        ">=" => "<",
        "==" => "!=",
        "!=" => "==",
        _ => op,
    }
}

fn add_fact(facts: &mut Facts, name: &str, patch: Fact) {
    let merged = match facts.get(name) {
        Some(prev) => prev.merged(&patch),
        None => patch,
    };
    facts.insert(name.to_string(), merged);
}

#[cfg(test)]
mod tests {
    use super::*;
    use skarn_parser::Parser;

    fn check(source: &str) -> TypeResult<()> {
        let (arena, root) = Parser::parse(source).unwrap();
        typecheck(&arena, root)
    }

    #[test]
    fn test_overflow_is_exact_on_literals_silent_on_unknowns() {
        let err = check("fn f() : I32 => 2147483647 + 1;").unwrap_err();
        assert_eq!(err.code, ErrorCode::SafetyOverflow);
        assert!(check("fn f(x : I32) : I32 => x + 1;").is_ok());
    }

    #[test]
    fn test_division_requires_evidence() {
        let err = check("fn f(x : I32) : I32 => 100 / x;").unwrap_err();
        assert_eq!(err.code, ErrorCode::SafetyDivByZero);
        assert!(check("fn f(x : I32 != 0) : I32 => 100 / x;").is_ok());
        assert!(check("fn f(x : I32) : I32 => if (x == 0) { 0 } else { 100 / x };").is_ok());
    }

    #[test]
    fn test_modulo_requires_evidence() {
        let err = check("fn f(x : I32) : I32 => 7 % x;").unwrap_err();
        assert_eq!(err.code, ErrorCode::SafetyModByZero);
        assert!(check("fn f(x : I32 != 0) : I32 => 7 % x;").is_ok());

        // A positive lower bound alone is not non-zero evidence; only the
        // explicit refinement or a flow guard is.
        let err = check("fn f(x : I32 > 3) : I32 => 7 % x;").unwrap_err();
        assert_eq!(err.code, ErrorCode::SafetyModByZero);
    }

    #[test]
    fn test_guard_negation_feeds_else_branch() {
        assert!(check("fn f(x : I32) : I32 => if (x != 0) { 100 / x } else { 0 };").is_ok());
        let err = check("fn f(x : I32) : I32 => if (x != 0) { 0 } else { 100 / x };").unwrap_err();
        assert_eq!(err.code, ErrorCode::SafetyDivByZero);
    }

    #[test]
    fn test_nullable_pointer_member_access() {
        let source = "struct Buf { size : I32 }\n\
                      fn f(p : *Buf | 0USize) : I32 => p.size;";
        let err = check(source).unwrap_err();
        assert_eq!(err.code, ErrorCode::SafetyNullablePointerGuard);

        let guarded = "struct Buf { size : I32 }\n\
                       fn f(p : *Buf | 0USize) : I32 => if (p != 0USize) { 0 } else { 0 };";
        assert!(check(guarded).is_ok());
    }

    #[test]
    fn test_nullable_pointer_call_argument() {
        let source = "fn read(p : *I32) : I32 => 0;\n\
                      fn f(q : *I32 | 0USize) : I32 => read(q);";
        let err = check(source).unwrap_err();
        assert_eq!(err.code, ErrorCode::SafetyNullablePointerGuard);

        let guarded = "fn read(p : *I32) : I32 => 0;\n\
                       fn f(q : *I32 | 0USize) : I32 => if (q != 0USize) { read(q) } else { 0 };";
        assert!(check(guarded).is_ok());

        let flipped = "fn read(p : *I32) : I32 => 0;\n\
                       fn f(q : *I32 | 0USize) : I32 => if (0USize != q) { read(q) } else { 0 };";
        assert!(check(flipped).is_ok());
    }

    #[test]
    fn test_array_bounds() {
        let unproven = "fn f(a : [I32; 8; 8], i : USize) : I32 => a[i];";
        let err = check(unproven).unwrap_err();
        assert_eq!(err.code, ErrorCode::SafetyArrayBoundsUnproven);

        let out_of_range = "fn f(a : [I32; 8; 8]) : I32 => a[9];";
        let err = check(out_of_range).unwrap_err();
        assert_eq!(err.code, ErrorCode::SafetyArrayBounds);

        let refined = "fn f(a : [I32; 8; 8], i : USize < 8) : I32 => a[i];";
        assert!(check(refined).is_ok());
    }

    #[test]
    fn test_match_exhaustiveness_over_union_alias() {
        let full = "struct Some { value : I32 } struct None { }\n\
                    type Option = Some | None;\n\
                    fn f(o : Option) : I32 => match (o) {\n\
                      case Some { value } = value;\n\
                      case None = 0;\n\
                    };";
        assert!(check(full).is_ok());

        let missing = "struct Some { value : I32 } struct None { }\n\
                       type Option = Some | None;\n\
                       fn f(o : Option) : I32 => match (o) {\n\
                         case Some { value } = value;\n\
                       };";
        let err = check(missing).unwrap_err();
        assert_eq!(err.code, ErrorCode::MatchNonExhaustive);

        let wildcard = "struct Some { value : I32 } struct None { }\n\
                        type Option = Some | None;\n\
                        fn f(o : Option) : I32 => match (o) {\n\
                          case Some { value } = value;\n\
                          case _ = 0;\n\
                        };";
        assert!(check(wildcard).is_ok());
    }

    #[test]
    fn test_generic_union_alias_exhaustiveness() {
        let missing = "struct Some { value : I32 } struct None { }\n\
                       type Option<T> = Some<T> | None<T>;\n\
                       fn f(o : Option<I32>) : I32 => match (o) {\n\
                         case None = 0;\n\
                       };";
        let err = check(missing).unwrap_err();
        assert_eq!(err.code, ErrorCode::MatchNonExhaustive);
    }

    #[test]
    fn test_destructor_signature_validation() {
        let ok = "type D = I32 then dtor;\n\
                  fn dtor(this : *move D) : Void => {}\n\
                  fn main() : I32 => 0;";
        assert!(check(ok).is_ok());

        let bad_ret = "type D = I32 then dtor;\n\
                       fn dtor(this : *move D) : I32 => 1;\n\
                       fn main() : I32 => 0;";
        let err = check(bad_ret).unwrap_err();
        assert_eq!(err.code, ErrorCode::TypeDestructorSignature);

        let bad_recv = "type D = I32 then dtor;\n\
                        fn dtor(this : *D) : Void => {}\n\
                        fn main() : I32 => 0;";
        let err = check(bad_recv).unwrap_err();
        assert_eq!(err.code, ErrorCode::TypeDestructorSignature);

        let missing = "type D = I32 then dtor;\n\
                       fn main() : I32 => 0;";
        let err = check(missing).unwrap_err();
        assert_eq!(err.code, ErrorCode::TypeDestructorNotFound);
    }

    #[test]
    fn test_let_compatibility() {
        let err = check("fn f() : I32 => { let x : Bool = 1; 0 }").unwrap_err();
        assert_eq!(err.code, ErrorCode::TypeMismatch);
        assert!(err.message.contains("Type mismatch for let x"));

        assert!(check("fn f() : I32 => { let n : USize = 5; 0 }").is_ok());
        let err = check("fn f() : I32 => { let n : USize = -5; 0 }").unwrap_err();
        assert_eq!(err.code, ErrorCode::TypeMismatch);
    }

    #[test]
    fn test_nonzero_refinement_obligations() {
        let err = check("fn f(d : I32 != 0) : I32 => d;\nfn g(x : I32) : I32 => f(x);").unwrap_err();
        assert!(err.message.contains("proven non-zero"));
        assert!(check("fn f(d : I32 != 0) : I32 => d;\nfn g() : I32 => f(5);").is_ok());

        let err = check("fn f() : I32 => { let d : I32 != 0 = 0; 0 }").unwrap_err();
        assert!(err.message.contains("Cannot prove non-zero refinement"));
    }

    #[test]
    fn test_call_arity_and_argument_types() {
        let err = check("fn f(a : I32, b : I32) : I32 => a;\nfn g() : I32 => f(1);").unwrap_err();
        assert!(err.message.contains("expects 2 args, got 1"));

        let err = check("fn f(a : Bool) : I32 => 0;\nfn g() : I32 => f(1);").unwrap_err();
        assert!(err.message.contains("Type mismatch in call to f arg 1"));
    }

    #[test]
    fn test_mutable_pointer_subsumption_at_calls() {
        let ok = "fn read(p : *I32) : I32 => 0;\n\
                  fn f(x : I32) : I32 => read(&mut x);";
        assert!(check(ok).is_ok());

        let bad = "fn write(p : *mut I32) : I32 => 0;\n\
                   fn f(x : I32) : I32 => write(&x);";
        let err = check(bad).unwrap_err();
        assert!(err.message.contains("Type mismatch"));
    }

    #[test]
    fn test_generic_call_return_binding() {
        assert!(check("fn id<T>(x : T) : T => x;\nfn f() : I32 => id(5);").is_ok());
        assert!(check("fn id(x : T) : T => x;\nfn f() : I32 => id(5);").is_ok());
    }

    #[test]
    fn test_if_condition_must_be_bool() {
        let err = check("fn f() : I32 => { if (1) { } 0 }").unwrap_err();
        assert!(err.message.contains("if condition must be Bool"));
    }

    #[test]
    fn test_function_body_type_must_match_declared_return() {
        let err = check("fn f() : Bool => 1;").unwrap_err();
        assert!(err.message.contains("return type mismatch"));
        assert!(check("fn f() : Bool => true;").is_ok());
    }

    #[test]
    fn test_assignment_narrowing_keeps_bounds() {
        assert!(check("fn f() : I32 => { let mut x : I32 != 0 = 3; x = 5; 100 / x }").is_ok());
    }

    #[test]
    fn test_relaxed_safety_skips_hazard_proofs() {
        let source = "fn f(x : I32) : I32 => 100 / x;";
        let (arena, root) = Parser::parse(source).unwrap();
        let options = TypeOptions {
            relaxed_safety: true,
        };
        assert!(typecheck_with(&arena, root, &options).is_ok());
    }
}
