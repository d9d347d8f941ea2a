use std::collections::{HashMap, HashSet};

use skarn_ast::{Arena, NodeId, NodeKind};
use skarn_diag::{Diagnostic, ErrorCode};

pub type ResolveResult<T> = Result<T, Diagnostic>;

/// Names the compiler understands without any declaration in scope.
const INTRINSICS: &[&str] = &["drop"];

/// Loader-side context for a resolve run. A single-file check leaves all
/// fields empty; the module loader merges exported names from other modules
/// into `extra_globals` before resolving each unit.
#[derive(Debug, Clone, Default)]
pub struct ResolveInputs {
    pub extra_globals: HashSet<String>,
    pub host_builtins: HashSet<String>,
    pub allow_host_prefix: String,
}

/// Check that every identifier in the program binds to a declaration, that
/// no scope declares a name twice, that lifetime annotations reference an
/// active region, and that expect/actual pairs line up.
pub fn resolve_names(arena: &Arena, root: NodeId, inputs: &ResolveInputs) -> ResolveResult<()> {
    let mut resolver = Resolver {
        arena,
        inputs,
        globals: inputs.extra_globals.clone(),
        contracts: HashSet::new(),
        scopes: Vec::new(),
        lifetimes: Vec::new(),
    };
    resolver.run(root)
}

struct Resolver<'a> {
    arena: &'a Arena,
    inputs: &'a ResolveInputs,
    globals: HashSet<String>,
    contracts: HashSet<String>,
    scopes: Vec<HashSet<String>>,
    lifetimes: Vec<HashSet<String>>,
}

impl<'a> Resolver<'a> {
    fn run(&mut self, root: NodeId) -> ResolveResult<()> {
        let body = self.arena.seq(root, 1);
        self.collect_globals(body)?;
        self.check_expect_actual(body)?;
        for &node in body {
            self.visit_stmt(node)?;
        }
        Ok(())
    }

    // === Globals ===

    fn collect_globals(&mut self, body: &[NodeId]) -> ResolveResult<()> {
        for &node in body {
            let kind = self.arena.kind(node);
            let declares = matches!(
                kind,
                NodeKind::FnDecl
                    | NodeKind::StructDecl
                    | NodeKind::EnumDecl
                    | NodeKind::TypeAlias
                    | NodeKind::ExternFnDecl
                    | NodeKind::ExternLetDecl
                    | NodeKind::ExternTypeDecl
                    | NodeKind::LetDecl
                    | NodeKind::ObjectDecl
                    | NodeKind::ContractDecl
                    | NodeKind::ExpectFnDecl
            );
            if !declares {
                continue;
            }
            let name = self.arena.string(node, 1).to_string();
            if !self.globals.insert(name.clone()) {
                return Err(self.err_shadowing(&name, node));
            }
            if kind == NodeKind::ContractDecl {
                self.contracts.insert(name);
            }
        }
        Ok(())
    }

    /// Every expect fn needs exactly one actual fn of the same name whose
    /// rendered signature matches; an actual fn without an expect is an
    /// error too.
    fn check_expect_actual(&self, body: &[NodeId]) -> ResolveResult<()> {
        let mut expects: Vec<(String, NodeId)> = Vec::new();
        let mut actuals: HashMap<String, Vec<NodeId>> = HashMap::new();
        for &node in body {
            match self.arena.kind(node) {
                NodeKind::ExpectFnDecl => {
                    expects.push((self.arena.string(node, 1).to_string(), node));
                }
                NodeKind::ActualFnDecl => {
                    actuals
                        .entry(self.arena.string(node, 1).to_string())
                        .or_default()
                        .push(node);
                }
                _ => {}
            }
        }

        for (name, expect_node) in &expects {
            let matched = actuals.get(name).map(Vec::as_slice).unwrap_or(&[]);
            match matched {
                [] => {
                    return Err(self.err_pairing(
                        format!("expect fn '{}' has no actual implementation", name),
                        *expect_node,
                    ));
                }
                [actual_node] => {
                    let want = self.render_signature(*expect_node);
                    let got = self.render_signature(*actual_node);
                    if want != got {
                        return Err(Diagnostic::new(
                            ErrorCode::ExpectActualSignatureMismatch,
                            format!(
                                "actual fn '{}' does not match its expect declaration: expected {}, found {}",
                                name, want, got
                            ),
                        )
                        .with_fix("Keep the expect and actual signatures identical.")
                        .with_span(self.arena.span(*actual_node)));
                    }
                }
                _ => {
                    return Err(self.err_pairing(
                        format!("expect fn '{}' has multiple actual implementations", name),
                        *expect_node,
                    ));
                }
            }
        }

        let expect_names: HashSet<&str> = expects.iter().map(|(n, _)| n.as_str()).collect();
        for &node in body {
            if self.arena.kind(node) == NodeKind::ActualFnDecl {
                let name = self.arena.string(node, 1);
                if !expect_names.contains(name) {
                    return Err(self.err_pairing(
                        format!("actual fn '{}' has no expect declaration", name),
                        node,
                    ));
                }
            }
        }
        Ok(())
    }

    fn render_signature(&self, node: NodeId) -> String {
        let generics = self.arena.seq(node, 2).len();
        let params: Vec<String> = self
            .arena
            .seq(node, 3)
            .iter()
            .map(|&p| match self.arena.node(p, 2) {
                Some(ty) => self.render_type(ty),
                None => "Unknown".to_string(),
            })
            .collect();
        let ret = match self.arena.node(node, 4) {
            Some(ty) => self.render_type(ty),
            None => "Void".to_string(),
        };
        if generics == 0 {
            format!("({}) : {}", params.join(", "), ret)
        } else {
            format!("<{}>({}) : {}", generics, params.join(", "), ret)
        }
    }

    fn render_type(&self, ty: NodeId) -> String {
        match self.arena.kind(ty) {
            NodeKind::NamedType => {
                let name = self.arena.string(ty, 1).to_string();
                let args = self.arena.seq(ty, 2);
                if args.is_empty() {
                    name
                } else {
                    let rendered: Vec<String> = args.iter().map(|&a| self.render_type(a)).collect();
                    format!("{}<{}>", name, rendered.join(", "))
                }
            }
            NodeKind::PointerType => {
                let mut out = String::from("*");
                let lifetime = self.arena.string(ty, 4);
                if !lifetime.is_empty() {
                    out.push_str(lifetime);
                    out.push(' ');
                }
                if self.arena.int(ty, 2) != 0 {
                    out.push_str("mut ");
                }
                if self.arena.int(ty, 3) != 0 {
                    out.push_str("move ");
                }
                if let Some(inner) = self.arena.node(ty, 1) {
                    out.push_str(&self.render_type(inner));
                }
                out
            }
            NodeKind::UnionType => {
                let left = self.arena.node(ty, 1).map(|n| self.render_type(n));
                let right = self.arena.node(ty, 2).map(|n| self.render_type(n));
                format!("{} | {}", left.unwrap_or_default(), right.unwrap_or_default())
            }
            NodeKind::TupleType => {
                let members: Vec<String> = self
                    .arena
                    .seq(ty, 1)
                    .iter()
                    .map(|&m| self.render_type(m))
                    .collect();
                format!("({})", members.join(", "))
            }
            NodeKind::ArrayType => {
                let element = self
                    .arena
                    .node(ty, 1)
                    .map(|n| self.render_type(n))
                    .unwrap_or_default();
                match (self.arena.node(ty, 2), self.arena.node(ty, 3)) {
                    (Some(init), Some(total)) => format!(
                        "[{}; {}; {}]",
                        element,
                        self.render_value(init),
                        self.render_value(total)
                    ),
                    _ => format!("[{}]", element),
                }
            }
            NodeKind::RefinementType => {
                let base = self
                    .arena
                    .node(ty, 1)
                    .map(|n| self.render_type(n))
                    .unwrap_or_default();
                let value = self
                    .arena
                    .node(ty, 3)
                    .map(|n| self.render_value(n))
                    .unwrap_or_default();
                format!("{} {} {}", base, self.arena.string(ty, 2), value)
            }
            NodeKind::FunctionType => {
                let params: Vec<String> = self
                    .arena
                    .seq(ty, 1)
                    .iter()
                    .map(|&p| self.render_type(p))
                    .collect();
                let ret = self
                    .arena
                    .node(ty, 2)
                    .map(|n| self.render_type(n))
                    .unwrap_or_default();
                format!("({}) => {}", params.join(", "), ret)
            }
            _ => "Unknown".to_string(),
        }
    }

    fn render_value(&self, expr: NodeId) -> String {
        match self.arena.kind(expr) {
            NodeKind::NumberLit => {
                if self.arena.int(expr, 3) != 0 {
                    format!("{}", f64::from_bits(self.arena.int(expr, 1) as u64))
                } else {
                    format!("{}{}", self.arena.int(expr, 1), self.arena.string(expr, 2))
                }
            }
            NodeKind::BoolLit => {
                if self.arena.int(expr, 1) != 0 {
                    "true".to_string()
                } else {
                    "false".to_string()
                }
            }
            NodeKind::StringLit => format!("\"{}\"", self.arena.string(expr, 1)),
            NodeKind::Ident => self.arena.string(expr, 1).to_string(),
            NodeKind::Unary => format!(
                "{}{}",
                self.arena.string(expr, 1),
                self.arena
                    .node(expr, 2)
                    .map(|n| self.render_value(n))
                    .unwrap_or_default()
            ),
            _ => "_".to_string(),
        }
    }

    // === Statements ===

    fn visit_stmt(&mut self, node: NodeId) -> ResolveResult<()> {
        match self.arena.kind(node) {
            NodeKind::Program => {
                for &stmt in self.arena.seq(node, 1) {
                    self.visit_stmt(stmt)?;
                }
                Ok(())
            }
            NodeKind::Block => {
                self.scopes.push(HashSet::new());
                for &stmt in self.arena.seq(node, 1) {
                    self.visit_stmt(stmt)?;
                }
                self.scopes.pop();
                Ok(())
            }
            NodeKind::FnDecl | NodeKind::ActualFnDecl => {
                self.check_signature_types(node)?;
                self.scopes.push(HashSet::new());
                self.define_params(node, 3)?;
                if let Some(body) = self.arena.node(node, 5) {
                    self.visit_branch(body)?;
                }
                self.scopes.pop();
                Ok(())
            }
            NodeKind::ExpectFnDecl | NodeKind::ExternFnDecl => self.check_signature_types(node),
            NodeKind::StructDecl | NodeKind::ObjectDecl => {
                for &field in self.arena.seq(node, 2) {
                    if let Some(ty) = self.arena.node(field, 2) {
                        self.check_type(ty)?;
                    }
                }
                Ok(())
            }
            NodeKind::TypeAlias | NodeKind::ExternLetDecl => {
                if let Some(ty) = self.arena.node(node, 2) {
                    self.check_type(ty)?;
                }
                Ok(())
            }
            NodeKind::ContractDecl => {
                for &item in self.arena.seq(node, 2) {
                    self.check_signature_types(item)?;
                }
                Ok(())
            }
            NodeKind::LetDecl => {
                if let Some(value) = self.arena.node(node, 3) {
                    self.visit_expr(value)?;
                }
                if let Some(ty) = self.arena.node(node, 2) {
                    self.check_type(ty)?;
                }
                let name = self.arena.string(node, 1).to_string();
                match self.scopes.last_mut() {
                    Some(frame) => {
                        if !frame.insert(name.clone()) {
                            return Err(self.err_shadowing(&name, node));
                        }
                    }
                    // Top-level lets were already defined by the globals pass.
                    None => {
                        self.globals.insert(name);
                    }
                }
                Ok(())
            }
            NodeKind::AssignStmt => {
                if let Some(target) = self.arena.node(node, 1) {
                    self.visit_expr(target)?;
                }
                if let Some(value) = self.arena.node(node, 2) {
                    self.visit_expr(value)?;
                }
                Ok(())
            }
            NodeKind::ReturnStmt => {
                if let Some(value) = self.arena.node(node, 1) {
                    self.visit_expr(value)?;
                }
                Ok(())
            }
            NodeKind::ExprStmt => {
                if let Some(expr) = self.arena.node(node, 1) {
                    self.visit_expr(expr)?;
                }
                Ok(())
            }
            NodeKind::IfStmt => {
                if let Some(cond) = self.arena.node(node, 1) {
                    self.visit_expr(cond)?;
                }
                if let Some(then_branch) = self.arena.node(node, 2) {
                    self.visit_branch(then_branch)?;
                }
                if let Some(else_branch) = self.arena.node(node, 3) {
                    self.visit_branch(else_branch)?;
                }
                Ok(())
            }
            NodeKind::WhileStmt => {
                if let Some(cond) = self.arena.node(node, 1) {
                    self.visit_expr(cond)?;
                }
                if let Some(body) = self.arena.node(node, 2) {
                    self.visit_branch(body)?;
                }
                Ok(())
            }
            NodeKind::ForStmt => {
                self.scopes.push(HashSet::new());
                let iterator = self.arena.string(node, 1).to_string();
                if let Some(frame) = self.scopes.last_mut() {
                    frame.insert(iterator);
                }
                if let Some(start) = self.arena.node(node, 2) {
                    self.visit_expr(start)?;
                }
                if let Some(end) = self.arena.node(node, 3) {
                    self.visit_expr(end)?;
                }
                if let Some(body) = self.arena.node(node, 4) {
                    self.visit_branch(body)?;
                }
                self.scopes.pop();
                Ok(())
            }
            NodeKind::LoopStmt => {
                if let Some(body) = self.arena.node(node, 1) {
                    self.visit_branch(body)?;
                }
                Ok(())
            }
            NodeKind::LifetimeStmt => {
                let mut frame = HashSet::new();
                for &ident in self.arena.seq(node, 1) {
                    let name = self.arena.string(ident, 1).to_string();
                    if frame.contains(&name) || self.lifetime_active(&name) {
                        return Err(Diagnostic::new(
                            ErrorCode::ResolveDuplicateLifetime,
                            format!("Lifetime '{}' is already declared in an active region", name),
                        )
                        .with_fix("Rename the lifetime or close the enclosing region first.")
                        .with_span(self.arena.span(ident)));
                    }
                    frame.insert(name);
                }
                self.lifetimes.push(frame);
                if let Some(body) = self.arena.node(node, 2) {
                    self.visit_branch(body)?;
                }
                self.lifetimes.pop();
                Ok(())
            }
            NodeKind::IntoStmt => {
                let name = self.arena.string(node, 1);
                if !self.contracts.contains(name) {
                    return Err(Diagnostic::new(
                        ErrorCode::ResolveUnknownIdentifier,
                        format!("Unknown contract '{}'", name),
                    )
                    .with_fix("Declare the contract before converting into it.")
                    .with_span(self.arena.span(node)));
                }
                Ok(())
            }
            NodeKind::EnumDecl
            | NodeKind::ExternTypeDecl
            | NodeKind::BreakStmt
            | NodeKind::ContinueStmt => Ok(()),
            _ => self.visit_expr(node),
        }
    }

    /// An if/while/for arm is either a block statement or a bare expression;
    /// route to the matching visitor.
    fn visit_branch(&mut self, node: NodeId) -> ResolveResult<()> {
        if self.arena.kind(node) == NodeKind::Block {
            self.visit_stmt(node)
        } else {
            self.visit_expr(node)
        }
    }

    fn check_signature_types(&mut self, node: NodeId) -> ResolveResult<()> {
        for &param in self.arena.seq(node, 3) {
            if let Some(ty) = self.arena.node(param, 2) {
                self.check_type(ty)?;
            }
        }
        if let Some(ret) = self.arena.node(node, 4) {
            self.check_type(ret)?;
        }
        Ok(())
    }

    fn define_params(&mut self, node: NodeId, slot: usize) -> ResolveResult<()> {
        for &param in self.arena.seq(node, slot) {
            if let Some(ty) = self.arena.node(param, 2) {
                self.check_type(ty)?;
            }
            let name = self.arena.string(param, 1).to_string();
            let frame = match self.scopes.last_mut() {
                Some(frame) => frame,
                None => return Ok(()),
            };
            if !frame.insert(name.clone()) {
                return Err(self.err_shadowing(&name, param));
            }
        }
        Ok(())
    }

    // === Expressions ===

    fn visit_expr(&mut self, node: NodeId) -> ResolveResult<()> {
        match self.arena.kind(node) {
            NodeKind::Ident => self.resolve_ident(node),
            NodeKind::NumberLit | NodeKind::BoolLit | NodeKind::StringLit | NodeKind::CharLit => {
                Ok(())
            }
            NodeKind::Binary => {
                if let Some(left) = self.arena.node(node, 2) {
                    self.visit_expr(left)?;
                }
                if let Some(right) = self.arena.node(node, 3) {
                    self.visit_expr(right)?;
                }
                Ok(())
            }
            NodeKind::Unary => {
                if let Some(operand) = self.arena.node(node, 2) {
                    self.visit_expr(operand)?;
                }
                Ok(())
            }
            NodeKind::UnwrapExpr => {
                if let Some(inner) = self.arena.node(node, 1) {
                    self.visit_expr(inner)?;
                }
                Ok(())
            }
            NodeKind::Call => {
                if let Some(callee) = self.arena.node(node, 1) {
                    self.visit_expr(callee)?;
                }
                for &arg in self.arena.seq(node, 2) {
                    self.visit_expr(arg)?;
                }
                Ok(())
            }
            NodeKind::Member => {
                if let Some(object) = self.arena.node(node, 1) {
                    self.visit_expr(object)?;
                }
                Ok(())
            }
            NodeKind::Index => {
                if let Some(target) = self.arena.node(node, 1) {
                    self.visit_expr(target)?;
                }
                if let Some(index) = self.arena.node(node, 2) {
                    self.visit_expr(index)?;
                }
                Ok(())
            }
            NodeKind::StructInit => {
                let name = self.arena.string(node, 1);
                if !self.globals.contains(name) {
                    return Err(Diagnostic::new(
                        ErrorCode::ResolveUnknownStruct,
                        format!("Unknown struct/type '{}' in initializer", name),
                    )
                    .with_fix("Declare the struct before using it or import the correct module.")
                    .with_span(self.arena.span(node)));
                }
                for &field in self.arena.seq(node, 2) {
                    if let Some(value) = self.arena.node(field, 2) {
                        self.visit_expr(value)?;
                    }
                }
                Ok(())
            }
            NodeKind::IfExpr => {
                if let Some(cond) = self.arena.node(node, 1) {
                    self.visit_expr(cond)?;
                }
                if let Some(then_branch) = self.arena.node(node, 2) {
                    self.visit_branch(then_branch)?;
                }
                if let Some(else_branch) = self.arena.node(node, 3) {
                    self.visit_branch(else_branch)?;
                }
                Ok(())
            }
            NodeKind::MatchExpr => {
                if let Some(target) = self.arena.node(node, 1) {
                    self.visit_expr(target)?;
                }
                for &arm in self.arena.seq(node, 2) {
                    self.scopes.push(HashSet::new());
                    if let Some(pattern) = self.arena.node(arm, 1) {
                        self.bind_pattern(pattern)?;
                    }
                    if let Some(body) = self.arena.node(arm, 2) {
                        self.visit_branch(body)?;
                    }
                    self.scopes.pop();
                }
                Ok(())
            }
            NodeKind::IsExpr => {
                if let Some(subject) = self.arena.node(node, 1) {
                    self.visit_expr(subject)?;
                }
                Ok(())
            }
            NodeKind::Lambda => {
                self.scopes.push(HashSet::new());
                self.define_params(node, 1)?;
                if let Some(body) = self.arena.node(node, 2) {
                    self.visit_branch(body)?;
                }
                self.scopes.pop();
                Ok(())
            }
            NodeKind::FnExpr => {
                self.scopes.push(HashSet::new());
                let name = self.arena.string(node, 1).to_string();
                if let Some(frame) = self.scopes.last_mut() {
                    frame.insert(name);
                }
                self.define_params(node, 2)?;
                if let Some(body) = self.arena.node(node, 4) {
                    self.visit_branch(body)?;
                }
                self.scopes.pop();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn bind_pattern(&mut self, pattern: NodeId) -> ResolveResult<()> {
        match self.arena.kind(pattern) {
            NodeKind::StructPat => {
                for &field in self.arena.seq(pattern, 2) {
                    let alias = self.arena.string(field, 2);
                    let bind = if alias.is_empty() {
                        self.arena.string(field, 1).to_string()
                    } else {
                        alias.to_string()
                    };
                    let frame = match self.scopes.last_mut() {
                        Some(frame) => frame,
                        None => return Ok(()),
                    };
                    if !frame.insert(bind.clone()) {
                        return Err(self.err_shadowing(&bind, field));
                    }
                }
                Ok(())
            }
            NodeKind::NamePat => {
                let name = self.arena.string(pattern, 1).to_string();
                if !self.globals.contains(&name) {
                    if let Some(frame) = self.scopes.last_mut() {
                        if !frame.insert(name.clone()) {
                            return Err(self.err_shadowing(&name, pattern));
                        }
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn resolve_ident(&self, node: NodeId) -> ResolveResult<()> {
        let name = self.arena.string(node, 1);
        if self.scopes.iter().any(|frame| frame.contains(name)) {
            return Ok(());
        }
        if self.globals.contains(name) {
            return Ok(());
        }
        if self.is_host_builtin(name) {
            return Ok(());
        }
        Err(Diagnostic::new(
            ErrorCode::ResolveUnknownIdentifier,
            format!("Unknown identifier '{}'", name),
        )
        .with_fix("Declare the identifier in scope or import it from a module.")
        .with_span(self.arena.span(node)))
    }

    fn is_host_builtin(&self, name: &str) -> bool {
        if INTRINSICS.contains(&name) {
            return true;
        }
        if self.inputs.host_builtins.contains(name) {
            return true;
        }
        let prefix = &self.inputs.allow_host_prefix;
        !prefix.is_empty() && name.starts_with(prefix.as_str())
    }

    // === Lifetimes ===

    fn lifetime_active(&self, name: &str) -> bool {
        self.lifetimes.iter().any(|frame| frame.contains(name))
    }

    /// Structural walk over type syntax. Only pointer lifetime annotations
    /// resolve against the active region stack; refinement values and array
    /// length expressions are value-level and belong to the typechecker.
    fn check_type(&self, ty: NodeId) -> ResolveResult<()> {
        match self.arena.kind(ty) {
            NodeKind::PointerType => {
                let lifetime = self.arena.string(ty, 4);
                if !lifetime.is_empty() && !self.lifetime_active(lifetime) {
                    return Err(Diagnostic::new(
                        ErrorCode::ResolveUndefinedLifetime,
                        format!("Unknown lifetime '{}' in pointer type", lifetime),
                    )
                    .with_fix("Declare the lifetime with a 'lifetime' region around this use.")
                    .with_span(self.arena.span(ty)));
                }
                if let Some(inner) = self.arena.node(ty, 1) {
                    self.check_type(inner)?;
                }
                Ok(())
            }
            NodeKind::UnionType => {
                if let Some(left) = self.arena.node(ty, 1) {
                    self.check_type(left)?;
                }
                if let Some(right) = self.arena.node(ty, 2) {
                    self.check_type(right)?;
                }
                Ok(())
            }
            NodeKind::TupleType => {
                for &member in self.arena.seq(ty, 1) {
                    self.check_type(member)?;
                }
                Ok(())
            }
            NodeKind::FunctionType => {
                for &param in self.arena.seq(ty, 1) {
                    self.check_type(param)?;
                }
                if let Some(ret) = self.arena.node(ty, 2) {
                    self.check_type(ret)?;
                }
                Ok(())
            }
            NodeKind::ArrayType => {
                if let Some(element) = self.arena.node(ty, 1) {
                    self.check_type(element)?;
                }
                Ok(())
            }
            NodeKind::RefinementType => {
                if let Some(base) = self.arena.node(ty, 1) {
                    self.check_type(base)?;
                }
                Ok(())
            }
            NodeKind::NamedType => {
                for &arg in self.arena.seq(ty, 2) {
                    self.check_type(arg)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    // === Errors ===

    fn err_shadowing(&self, name: &str, node: NodeId) -> Diagnostic {
        Diagnostic::new(
            ErrorCode::ResolveShadowing,
            format!("Variable shadowing/redeclaration is not allowed: {}", name),
        )
        .with_fix("Rename one of the variables; shadowing is disallowed in Skarn.")
        .with_span(self.arena.span(node))
    }

    fn err_pairing(&self, message: String, node: NodeId) -> Diagnostic {
        Diagnostic::new(ErrorCode::ExpectActualPairing, message)
            .with_fix("Provide exactly one actual fn for every expect fn.")
            .with_span(self.arena.span(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skarn_parser::Parser;

    fn resolve(source: &str) -> ResolveResult<()> {
        let (arena, root) = Parser::parse(source).unwrap();
        resolve_names(&arena, root, &ResolveInputs::default())
    }

    fn resolve_with(source: &str, inputs: &ResolveInputs) -> ResolveResult<()> {
        let (arena, root) = Parser::parse(source).unwrap();
        resolve_names(&arena, root, inputs)
    }

    #[test]
    fn test_unknown_identifier() {
        let err = resolve("fn main() : I32 => missing;").unwrap_err();
        assert_eq!(err.code, ErrorCode::ResolveUnknownIdentifier);
        assert!(err.message.contains("'missing'"));
    }

    #[test]
    fn test_forward_reference_to_global() {
        assert!(resolve("fn main() : I32 => helper(); fn helper() : I32 => 1;").is_ok());
    }

    #[test]
    fn test_same_scope_redeclaration() {
        let err = resolve("fn main() : I32 => { let x = 1; let x = 2; x }").unwrap_err();
        assert_eq!(err.code, ErrorCode::ResolveShadowing);
    }

    #[test]
    fn test_duplicate_globals() {
        let err = resolve("fn twice() : I32 => 1; fn twice() : I32 => 2;").unwrap_err();
        assert_eq!(err.code, ErrorCode::ResolveShadowing);
    }

    #[test]
    fn test_let_initializer_resolves_before_binding() {
        let err = resolve("fn main() : I32 => { let x = x; x }").unwrap_err();
        assert_eq!(err.code, ErrorCode::ResolveUnknownIdentifier);
    }

    #[test]
    fn test_match_arm_binders() {
        let source = "struct Some { value : I32 } struct None { }\n\
                      fn main(v : Some) : I32 => match (v) {\n\
                        case Some { value } = value;\n\
                        case None = 0;\n\
                        case other = 1;\n\
                      };";
        assert!(resolve(source).is_ok());
    }

    #[test]
    fn test_match_binder_not_visible_outside_arm() {
        let source = "struct Some { value : I32 }\n\
                      fn main(v : Some) : I32 => {\n\
                        let r = match (v) { case Some { value } = value; };\n\
                        value\n\
                      }";
        let err = resolve(source).unwrap_err();
        assert_eq!(err.code, ErrorCode::ResolveUnknownIdentifier);
    }

    #[test]
    fn test_for_iterator_scope() {
        assert!(resolve("fn main() : I32 => { for (i in 0 .. 10) { i; } 0 }").is_ok());
        let err = resolve("fn main() : I32 => { for (i in 0 .. 10) { } i }").unwrap_err();
        assert_eq!(err.code, ErrorCode::ResolveUnknownIdentifier);
    }

    #[test]
    fn test_fn_expr_supports_self_recursion() {
        assert!(resolve("fn main() : I32 => { let f = fn go(n : I32) : I32 => go(n); 0 }").is_ok());
    }

    #[test]
    fn test_unknown_struct_init() {
        let err = resolve("fn main() : I32 => { let p = Point { x: 1 }; 0 }").unwrap_err();
        assert_eq!(err.code, ErrorCode::ResolveUnknownStruct);
    }

    #[test]
    fn test_host_builtins_and_prefix() {
        let mut inputs = ResolveInputs::default();
        inputs.host_builtins.insert("print".to_string());
        inputs.allow_host_prefix = "host_".to_string();
        assert!(resolve_with("fn main() : I32 => { print(1); host_clock(); 0 }", &inputs).is_ok());
        let err = resolve("fn main() : I32 => { print(1); 0 }").unwrap_err();
        assert_eq!(err.code, ErrorCode::ResolveUnknownIdentifier);
    }

    #[test]
    fn test_drop_is_always_known() {
        assert!(resolve("fn main() : I32 => { let x = 1; drop(x); 0 }").is_ok());
    }

    #[test]
    fn test_lifetime_annotation_must_be_active() {
        let source = "extern fn acquire() : *I32;\n\
                      fn main() : I32 => { lifetime a { let p : *a I32 = acquire(); } 0 }";
        assert!(resolve(source).is_ok());
        let bad = "extern fn acquire() : *I32;\n\
                   fn main() : I32 => { let p : *a I32 = acquire(); 0 }";
        let err = resolve(bad).unwrap_err();
        assert_eq!(err.code, ErrorCode::ResolveUndefinedLifetime);
    }

    #[test]
    fn test_lifetime_redeclaration() {
        let err = resolve("fn main() : I32 => { lifetime a { lifetime a { } } 0 }").unwrap_err();
        assert_eq!(err.code, ErrorCode::ResolveDuplicateLifetime);
    }

    #[test]
    fn test_expect_requires_single_actual() {
        let err = resolve("expect fn now() : I64;").unwrap_err();
        assert_eq!(err.code, ErrorCode::ExpectActualPairing);

        let err = resolve(
            "expect fn now() : I64;\n\
             actual fn now() : I64 => 1;\n\
             actual fn now() : I64 => 2;",
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::ExpectActualPairing);
    }

    #[test]
    fn test_actual_without_expect() {
        let err = resolve("actual fn now() : I64 => 1;").unwrap_err();
        assert_eq!(err.code, ErrorCode::ExpectActualPairing);
    }

    #[test]
    fn test_expect_actual_signature_mismatch() {
        let err = resolve(
            "expect fn now() : I64;\n\
             actual fn now() : I32 => 1;",
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::ExpectActualSignatureMismatch);

        assert!(resolve(
            "expect fn add(a : I32, b : I32) : I32;\n\
             actual fn add(x : I32, y : I32) : I32 => x + y;"
        )
        .is_ok());
    }

    #[test]
    fn test_into_requires_declared_contract() {
        assert!(resolve("contract HasLen { fn len(*this) : I32; } into HasLen;").is_ok());
        let err = resolve("into HasLen;").unwrap_err();
        assert_eq!(err.code, ErrorCode::ResolveUnknownIdentifier);
    }

    #[test]
    fn test_extra_globals_from_loader() {
        let mut inputs = ResolveInputs::default();
        inputs.extra_globals.insert("vec_push".to_string());
        assert!(resolve_with("fn main() : I32 => { vec_push(1); 0 }", &inputs).is_ok());
    }
}
