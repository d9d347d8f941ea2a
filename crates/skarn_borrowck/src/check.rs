//! Move and borrow checking pass

use std::collections::{HashMap, HashSet};

use skarn_ast::{Arena, NodeId, NodeKind};
use skarn_diag::{Diagnostic, ErrorCode};
use skarn_types::Type;

use crate::state::{LoanKind, OwnershipState, Place};

pub type BorrowResult<T> = Result<T, Diagnostic>;

/// Primitive names whose values copy instead of moving.
const COPY_PRIMITIVES: &[&str] = &[
    "I8", "I16", "I32", "I64", "I128", "U8", "U16", "U32", "U64", "U128", "USize", "ISize", "F32",
    "F64", "Bool", "Char",
];

const OWNERSHIP_REASON: &str = "Borrowing and ownership rules require exclusive mutable access \
                                or shared immutable access, and disallow use-after-move.";

/// Run move and borrow checking over a parsed program. Validation only:
/// the AST is never rewritten, and the first error aborts the pass.
pub fn borrowcheck(arena: &Arena, root: NodeId) -> BorrowResult<()> {
    let mut checker = BorrowChecker::new(arena);
    checker.run(root)
}

/// How an expression's value is used at a visit site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Read,
    Move,
}

/// Variable name to canonical type name.
type Env = HashMap<String, String>;

pub struct BorrowChecker<'a> {
    arena: &'a Arena,
    /// Opaque foreign types, never copyable
    extern_types: HashSet<String>,
    /// Top-level function names; a bare reference to one is not a move
    global_fns: HashSet<String>,
    fn_returns: HashMap<String, String>,
    /// Annotated type of each top-level let
    global_types: HashMap<String, String>,
    /// Names with copy semantics: copy structs, enums, and validated
    /// copy aliases
    copy_types: HashSet<String>,
    /// Aliased type per `copy type` alias, for copyability recursion
    copy_aliases: HashMap<String, Type>,
    /// Destructor function per alias declared with a `then` clause
    destructors: HashMap<String, String>,
}

impl<'a> BorrowChecker<'a> {
    pub fn new(arena: &'a Arena) -> Self {
        Self {
            arena,
            extern_types: HashSet::new(),
            global_fns: HashSet::new(),
            fn_returns: HashMap::new(),
            global_types: HashMap::new(),
            copy_types: HashSet::new(),
            copy_aliases: HashMap::new(),
            destructors: HashMap::new(),
        }
    }

    pub fn run(&mut self, root: NodeId) -> BorrowResult<()> {
        let body = self.arena.seq(root, 1);
        self.collect_tables(body)?;

        let mut state = OwnershipState::new();
        let mut env: Env = self.global_types.clone();
        for &node in body {
            self.check_stmt(node, &mut state, &mut env)?;
        }
        Ok(())
    }

    // === Declaration tables ===

    fn collect_tables(&mut self, body: &[NodeId]) -> BorrowResult<()> {
        let mut copy_alias_order: Vec<(String, Type, NodeId)> = Vec::new();
        for &node in body {
            match self.arena.kind(node) {
                NodeKind::ExternTypeDecl => {
                    self.extern_types
                        .insert(self.arena.string(node, 1).to_string());
                }
                NodeKind::FnDecl
                | NodeKind::ExternFnDecl
                | NodeKind::ExpectFnDecl
                | NodeKind::ActualFnDecl => {
                    let name = self.arena.string(node, 1).to_string();
                    let ret = self.type_name_of(self.arena.node(node, 4));
                    self.global_fns.insert(name.clone());
                    self.fn_returns.insert(name, ret);
                }
                NodeKind::LetDecl | NodeKind::ExternLetDecl => {
                    let name = self.arena.string(node, 1).to_string();
                    let ty = self.type_name_of(self.arena.node(node, 2));
                    self.global_types.insert(name, ty);
                }
                NodeKind::StructDecl => {
                    if self.arena.int(node, 3) != 0 {
                        self.copy_types
                            .insert(self.arena.string(node, 1).to_string());
                    }
                }
                // Enums are plain tags and always copy.
                NodeKind::EnumDecl => {
                    self.copy_types
                        .insert(self.arena.string(node, 1).to_string());
                }
                NodeKind::TypeAlias => {
                    let name = self.arena.string(node, 1).to_string();
                    let dtor = self.arena.string(node, 4);
                    if !dtor.is_empty() {
                        self.destructors.insert(name.clone(), dtor.to_string());
                    }
                    if self.arena.int(node, 3) != 0 {
                        if let Some(target) = self.arena.node(node, 2) {
                            let aliased = Type::from_node(self.arena, target);
                            self.copy_aliases.insert(name.clone(), aliased.clone());
                            copy_alias_order.push((name, aliased, node));
                        }
                    }
                }
                _ => {}
            }
        }

        // Copy aliases are validated eagerly, in declaration order, so
        // the first offending alias is the one reported.
        for (name, aliased, node) in copy_alias_order {
            let mut visiting = HashSet::new();
            visiting.insert(name.clone());
            if !self.type_copyable(&aliased, &mut visiting) {
                return Err(Diagnostic::new(
                    ErrorCode::BorrowInvalidCopyAlias,
                    format!("copy type {} must alias a copy-compatible type", name),
                )
                .with_reason(
                    "A type alias marked 'copy' resolved to a non-copy type under move semantics.",
                )
                .with_fix(
                    "Only mark aliases as 'copy' when the aliased type is copy-compatible \
                     (primitives, pointers, enums, copy structs, or other copy aliases).",
                )
                .with_span(self.arena.span(node)));
            }
            self.copy_types.insert(name);
        }
        Ok(())
    }

    fn type_name_of(&self, node: Option<NodeId>) -> String {
        match node {
            Some(node) => Type::from_node(self.arena, node).canonical(),
            None => "Unknown".to_string(),
        }
    }

    fn type_copyable(&self, ty: &Type, visiting: &mut HashSet<String>) -> bool {
        match ty {
            Type::Named { name, .. } => {
                if has_builtin_copy_semantics(name) || self.copy_types.contains(name) {
                    return true;
                }
                if self.extern_types.contains(name) {
                    return false;
                }
                match self.copy_aliases.get(name) {
                    Some(aliased) => {
                        if visiting.contains(name) {
                            return false;
                        }
                        visiting.insert(name.clone());
                        let copyable = self.type_copyable(aliased, visiting);
                        visiting.remove(name);
                        copyable
                    }
                    None => false,
                }
            }
            Type::Refinement { base, .. } => self.type_copyable(base, visiting),
            Type::Pointer { .. } => true,
            Type::Union(left, right) => {
                self.type_copyable(left, visiting) && self.type_copyable(right, visiting)
            }
            Type::Tuple(members) => members.iter().all(|m| self.type_copyable(m, visiting)),
            _ => false,
        }
    }

    fn is_copy_name(&self, name: &str) -> bool {
        has_builtin_copy_semantics(name) || self.copy_types.contains(name)
    }

    fn has_destructor(&self, type_name: &str) -> bool {
        self.destructors.contains_key(type_name)
    }

    // === Places ===

    fn place_of(&self, node: NodeId) -> Option<Place> {
        match self.arena.kind(node) {
            NodeKind::Ident => Some(Place::var(self.arena.string(node, 1))),
            NodeKind::Member => {
                let base = self.place_of(self.arena.node(node, 1)?)?;
                Some(base.field(self.arena.string(node, 2)))
            }
            NodeKind::Index => {
                let base = self.place_of(self.arena.node(node, 1)?)?;
                Some(base.index())
            }
            _ => None,
        }
    }

    /// Best-effort type name for an expression. The move checker only
    /// needs enough precision for copyability and destructor lookup;
    /// anything structural degrades to Unknown.
    fn expr_type_name(&self, node: NodeId, env: &Env) -> String {
        match self.arena.kind(node) {
            NodeKind::NumberLit => {
                if self.arena.int(node, 3) != 0 {
                    "F64".to_string()
                } else if self.arena.string(node, 2) == "USize" {
                    "USize".to_string()
                } else {
                    "I32".to_string()
                }
            }
            NodeKind::BoolLit => "Bool".to_string(),
            NodeKind::CharLit => "Char".to_string(),
            NodeKind::StringLit => "*Str".to_string(),
            NodeKind::Ident => env
                .get(self.arena.string(node, 1))
                .cloned()
                .unwrap_or_else(|| "Unknown".to_string()),
            NodeKind::Unary => {
                let inner = match self.arena.node(node, 2) {
                    Some(operand) => self.expr_type_name(operand, env),
                    None => "Unknown".to_string(),
                };
                match self.arena.string(node, 1) {
                    "&" => format!("*{}", inner),
                    "&mut" => format!("*mut {}", inner),
                    "!" => "Bool".to_string(),
                    _ => inner,
                }
            }
            NodeKind::Binary => {
                let op = self.arena.string(node, 1);
                if matches!(op, "==" | "!=" | "<" | "<=" | ">" | ">=" | "&&" | "||") {
                    return "Bool".to_string();
                }
                match self.arena.node(node, 2) {
                    Some(left) => self.expr_type_name(left, env),
                    None => "Unknown".to_string(),
                }
            }
            NodeKind::Call => match self.arena.node(node, 1) {
                Some(callee) if self.arena.kind(callee) == NodeKind::Ident => self
                    .fn_returns
                    .get(self.arena.string(callee, 1))
                    .cloned()
                    .unwrap_or_else(|| "Unknown".to_string()),
                _ => "Unknown".to_string(),
            },
            NodeKind::StructInit => self.arena.string(node, 1).to_string(),
            _ => "Unknown".to_string(),
        }
    }

    // === Ownership queries ===

    fn check_not_moved(
        &self,
        state: &OwnershipState,
        place: &Place,
        node: NodeId,
        fix: &str,
    ) -> BorrowResult<()> {
        if state.dropped.contains(&place.base) {
            return Err(self.ownership_err(
                ErrorCode::BorrowUseAfterDrop,
                format!("Use of dropped value '{}'", place.base),
                node,
                "Do not use a value after explicit or implicit drop; move/copy before dropping \
                 if needed.",
            ));
        }
        if state.moved.contains(&place.base) {
            return Err(self.ownership_err(
                ErrorCode::BorrowUseAfterMove,
                format!("Use of moved value '{}'", place.base),
                node,
                fix,
            ));
        }
        Ok(())
    }

    /// Give up ownership of a place expression. Copy types and index
    /// places are exempt.
    fn consume_place(
        &self,
        node: NodeId,
        state: &mut OwnershipState,
        env: &Env,
    ) -> BorrowResult<()> {
        let place = match self.place_of(node) {
            Some(place) => place,
            None => return Ok(()),
        };
        self.check_not_moved(
            state,
            &place,
            node,
            "Reinitialize the value before use, or borrow it with '&' / '&mut' instead of moving.",
        )?;
        if state.any_loan_conflicts(&place) {
            return Err(self.ownership_err(
                ErrorCode::BorrowMoveWhileBorrowed,
                format!("Cannot move '{}' while it is borrowed", place.base),
                node,
                "Ensure all borrows end before moving, or pass a borrow (&/&mut) instead.",
            ));
        }
        let ty = self.expr_type_name(node, env);
        if !self.is_copy_name(&ty) {
            // Indexing moves one element, not the allocation behind it.
            if !place.path.contains("[]") {
                state.moved.insert(place.base);
            }
        }
        Ok(())
    }

    fn ensure_readable(&self, node: NodeId, state: &OwnershipState) -> BorrowResult<()> {
        match self.place_of(node) {
            Some(place) => self.check_not_moved(
                state,
                &place,
                node,
                "Reinitialize the value before use, or borrow it before moving.",
            ),
            None => Ok(()),
        }
    }

    // === Expressions ===

    fn check_expr(
        &mut self,
        node: NodeId,
        mode: Mode,
        state: &mut OwnershipState,
        env: &Env,
    ) -> BorrowResult<()> {
        let kind = self.arena.kind(node);

        // A bare function name is a value with no ownership to give up.
        if mode == Mode::Move
            && kind == NodeKind::Ident
            && self.global_fns.contains(self.arena.string(node, 1))
        {
            return Ok(());
        }

        if kind == NodeKind::Unary {
            let op = self.arena.string(node, 1);
            if op == "&" || op == "&mut" {
                return self.check_borrow(node, op, state, env);
            }
        }

        match kind {
            NodeKind::Ident | NodeKind::Member | NodeKind::Index => match mode {
                Mode::Read => self.ensure_readable(node, state),
                Mode::Move => self.consume_place(node, state, env),
            },
            NodeKind::NumberLit | NodeKind::BoolLit | NodeKind::StringLit | NodeKind::CharLit => {
                Ok(())
            }
            NodeKind::Unary => match self.arena.node(node, 2) {
                Some(operand) => self.check_expr(operand, Mode::Read, state, env),
                None => Ok(()),
            },
            NodeKind::Binary => {
                if let Some(left) = self.arena.node(node, 2) {
                    self.check_expr(left, Mode::Read, state, env)?;
                }
                if let Some(right) = self.arena.node(node, 3) {
                    self.check_expr(right, Mode::Read, state, env)?;
                }
                Ok(())
            }
            NodeKind::Call => self.check_call(node, state, env),
            NodeKind::StructInit => {
                for &field in self.arena.seq(node, 2) {
                    if let Some(value) = self.arena.node(field, 2) {
                        self.check_expr(value, Mode::Read, state, env)?;
                    }
                }
                Ok(())
            }
            NodeKind::IfExpr => self.check_conditional(node, state, env),
            NodeKind::MatchExpr => {
                if let Some(target) = self.arena.node(node, 1) {
                    self.check_expr(target, Mode::Read, state, env)?;
                }
                let mut moved_union = state.moved.clone();
                for &arm in self.arena.seq(node, 2) {
                    if let Some(body) = self.arena.node(arm, 2) {
                        let mut arm_state = state.fork();
                        let mut arm_env = env.clone();
                        self.check_node(body, &mut arm_state, &mut arm_env)?;
                        moved_union.extend(arm_state.moved);
                    }
                }
                state.moved = moved_union;
                Ok(())
            }
            NodeKind::IsExpr | NodeKind::UnwrapExpr => match self.arena.node(node, 1) {
                Some(subject) => self.check_expr(subject, Mode::Read, state, env),
                None => Ok(()),
            },
            // Lambdas defer their bodies; captures are not tracked.
            _ => Ok(()),
        }
    }

    /// `&place` and `&mut place` record loans; any other operand is
    /// rejected apart from borrows of fresh struct literals.
    fn check_borrow(
        &mut self,
        node: NodeId,
        op: &str,
        state: &mut OwnershipState,
        env: &Env,
    ) -> BorrowResult<()> {
        let operand = match self.arena.node(node, 2) {
            Some(operand) => operand,
            None => return Ok(()),
        };
        let place = match self.place_of(operand) {
            Some(place) => place,
            None => {
                if self.arena.kind(operand) == NodeKind::StructInit {
                    return self.check_expr(operand, Mode::Read, state, env);
                }
                return Err(self.ownership_err(
                    ErrorCode::BorrowInvalidTarget,
                    "Borrow target is not a place expression",
                    node,
                    "Borrow only identifiers, fields, or index places (e.g. &x, &obj.f, &arr[i]).",
                ));
            }
        };
        self.ensure_readable(operand, state)?;
        if op == "&" {
            if state.mut_loan_conflicts(&place) {
                return Err(self.ownership_err(
                    ErrorCode::BorrowImmutWhileMut,
                    format!(
                        "Cannot immutably borrow '{}' because it is mutably borrowed",
                        place.base
                    ),
                    node,
                    "End the mutable borrow first, or borrow mutably in a non-overlapping scope.",
                ));
            }
            state.add_loan(LoanKind::Shared, place);
        } else {
            if state.mut_loan_conflicts(&place) || state.shared_loan_conflicts(&place) {
                return Err(self.ownership_err(
                    ErrorCode::BorrowMutConflict,
                    format!(
                        "Cannot mutably borrow '{}' because it is already borrowed",
                        place.base
                    ),
                    node,
                    "Ensure no active borrows overlap this place before taking '&mut'.",
                ));
            }
            state.add_loan(LoanKind::Mut, place);
        }
        Ok(())
    }

    fn check_call(
        &mut self,
        node: NodeId,
        state: &mut OwnershipState,
        env: &Env,
    ) -> BorrowResult<()> {
        let callee = self.arena.node(node, 1);
        let args = self.arena.seq(node, 2);
        let callee_name = match callee {
            Some(callee) if self.arena.kind(callee) == NodeKind::Ident => {
                Some(self.arena.string(callee, 1))
            }
            _ => None,
        };

        if callee_name == Some("drop") {
            return self.check_drop(node, args.first().copied(), state, env);
        }

        let callee_is_global = callee_name.map_or(false, |name| self.global_fns.contains(name));
        if !callee_is_global {
            if let Some(callee) = callee {
                self.check_expr(callee, Mode::Read, state, env)?;
            }
        }
        for &arg in args {
            self.check_expr(arg, Mode::Read, state, env)?;
        }
        Ok(())
    }

    /// Explicit destructor invocation, `drop(h)` or `h.drop()`.
    fn check_drop(
        &self,
        call: NodeId,
        target: Option<NodeId>,
        state: &mut OwnershipState,
        env: &Env,
    ) -> BorrowResult<()> {
        let place = target.and_then(|node| self.place_of(node));
        let (target, place) = match (target, place) {
            (Some(target), Some(place)) => (target, place),
            _ => {
                return Err(self.ownership_err(
                    ErrorCode::BorrowInvalidTarget,
                    "drop target must be a place expression",
                    call,
                    "Call drop with a local/place value such as drop(x) or x.drop().",
                ));
            }
        };
        if state.dropped.contains(&place.base) {
            return Err(self.ownership_err(
                ErrorCode::BorrowDoubleDrop,
                format!("Double drop of '{}'", place.base),
                call,
                "Ensure each owned value is dropped exactly once.",
            ));
        }
        let target_ty = self.expr_type_name(target, env);
        if !self.has_destructor(&target_ty) {
            return Err(self.ownership_err(
                ErrorCode::BorrowDropMissingDestructor,
                format!("Type '{}' has no associated destructor", target_ty),
                call,
                "Associate a destructor via 'type Alias = Base then destructorName;' and use \
                 that alias type.",
            ));
        }
        self.check_not_moved(
            state,
            &place,
            target,
            "Only live, non-moved values can be dropped.",
        )?;
        if state.any_loan_conflicts(&place) {
            return Err(self.ownership_err(
                ErrorCode::BorrowMoveWhileBorrowed,
                format!("Cannot drop '{}' while it is borrowed", place.base),
                call,
                "Ensure all borrows end before dropping the value.",
            ));
        }
        state.pending_drops.remove(&place.base);
        state.dropped.insert(place.base.clone());
        state.moved.insert(place.base);
        Ok(())
    }

    /// Initializers, assignments, and returns move place expressions and
    /// read everything else.
    fn check_value(
        &mut self,
        node: NodeId,
        state: &mut OwnershipState,
        env: &Env,
    ) -> BorrowResult<()> {
        let mode = if self.place_of(node).is_some() {
            Mode::Move
        } else {
            Mode::Read
        };
        self.check_expr(node, mode, state, env)
    }

    /// Branches run on forked state; only the move facts survive the join.
    fn check_conditional(
        &mut self,
        node: NodeId,
        state: &mut OwnershipState,
        env: &Env,
    ) -> BorrowResult<()> {
        if let Some(cond) = self.arena.node(node, 1) {
            self.check_expr(cond, Mode::Read, state, env)?;
        }
        let then_state = match self.arena.node(node, 2) {
            Some(branch) => {
                let mut fork = state.fork();
                let mut branch_env = env.clone();
                self.check_node(branch, &mut fork, &mut branch_env)?;
                fork
            }
            None => state.fork(),
        };
        let else_state = match self.arena.node(node, 3) {
            Some(branch) => {
                let mut fork = state.fork();
                let mut branch_env = env.clone();
                self.check_node(branch, &mut fork, &mut branch_env)?;
                Some(fork)
            }
            None => None,
        };
        state.merge_moved(then_state, else_state);
        Ok(())
    }

    // === Statements ===

    fn check_stmt(
        &mut self,
        node: NodeId,
        state: &mut OwnershipState,
        env: &mut Env,
    ) -> BorrowResult<()> {
        match self.arena.kind(node) {
            NodeKind::LetDecl => {
                let name = self.arena.string(node, 1);
                let value = self.arena.node(node, 3);
                if let Some(value) = value {
                    self.check_value(value, state, env)?;
                }
                let ty = match self.arena.node(node, 2) {
                    Some(annotation) => Type::from_node(self.arena, annotation).canonical(),
                    None => match value {
                        Some(value) => self.expr_type_name(value, env),
                        None => "Unknown".to_string(),
                    },
                };
                env.insert(name.to_string(), ty.clone());
                state.moved.remove(name);
                state.dropped.remove(name);
                if self.has_destructor(&ty) {
                    state.track_pending_drop(name);
                }
                Ok(())
            }
            NodeKind::AssignStmt => {
                let target = self.arena.node(node, 1);
                let value = self.arena.node(node, 2);
                if let Some(target) = target {
                    // Rebinding a destructor-owing value drops the old one
                    // before the new value is computed.
                    if self.arena.kind(target) == NodeKind::Ident {
                        let name = self.arena.string(target, 1);
                        let owes_drop = env.get(name).map_or(false, |ty| self.has_destructor(ty));
                        if owes_drop && state.pending_drops.contains(name) {
                            state.pending_drops.remove(name);
                            state.dropped.insert(name.to_string());
                        }
                    }
                    if let Some(place) = self.place_of(target) {
                        if state.any_loan_conflicts(&place) {
                            return Err(self.ownership_err(
                                ErrorCode::BorrowAssignWhileBorrowed,
                                format!("Cannot assign to '{}' while it is borrowed", place.base),
                                node,
                                "End active borrows before assignment, or assign in a \
                                 non-overlapping scope.",
                            ));
                        }
                    }
                }
                if let Some(value) = value {
                    self.check_value(value, state, env)?;
                }
                if let Some(target) = target {
                    if self.arena.kind(target) == NodeKind::Ident {
                        let name = self.arena.string(target, 1);
                        state.moved.remove(name);
                        state.dropped.remove(name);
                        let owes_drop = env.get(name).map_or(false, |ty| self.has_destructor(ty));
                        if owes_drop {
                            state.track_pending_drop(name);
                        }
                    }
                }
                Ok(())
            }
            NodeKind::ExprStmt => match self.arena.node(node, 1) {
                Some(expr) => self.check_expr(expr, Mode::Move, state, env),
                None => Ok(()),
            },
            NodeKind::ReturnStmt => match self.arena.node(node, 1) {
                Some(value) => self.check_value(value, state, env),
                None => Ok(()),
            },
            NodeKind::IfStmt => self.check_conditional(node, state, env),
            NodeKind::ForStmt => {
                if let Some(start) = self.arena.node(node, 2) {
                    self.check_expr(start, Mode::Read, state, env)?;
                }
                if let Some(end) = self.arena.node(node, 3) {
                    self.check_expr(end, Mode::Read, state, env)?;
                }
                state.begin_scope();
                let mut loop_env = env.clone();
                loop_env.insert(self.arena.string(node, 1).to_string(), "I32".to_string());
                let body = match self.arena.node(node, 4) {
                    Some(body) => self.check_node(body, state, &mut loop_env),
                    None => Ok(()),
                };
                state.end_scope();
                body
            }
            NodeKind::LoopStmt => {
                state.begin_scope();
                let body = match self.arena.node(node, 1) {
                    Some(body) => {
                        let mut loop_env = env.clone();
                        self.check_node(body, state, &mut loop_env)
                    }
                    None => Ok(()),
                };
                state.end_scope();
                body
            }
            NodeKind::WhileStmt => {
                if let Some(cond) = self.arena.node(node, 1) {
                    self.check_expr(cond, Mode::Read, state, env)?;
                }
                state.begin_scope();
                let body = match self.arena.node(node, 2) {
                    Some(body) => {
                        let mut loop_env = env.clone();
                        self.check_node(body, state, &mut loop_env)
                    }
                    None => Ok(()),
                };
                state.end_scope();
                body
            }
            NodeKind::Block => self.check_block(node, state, env),
            NodeKind::LifetimeStmt => match self.arena.node(node, 2) {
                Some(body) => {
                    let mut region_env = env.clone();
                    self.check_node(body, state, &mut region_env)
                }
                None => Ok(()),
            },
            NodeKind::FnDecl | NodeKind::ActualFnDecl => {
                let mut fn_state = OwnershipState::new();
                let mut fn_env: Env = self.global_types.clone();
                for &param in self.arena.seq(node, 3) {
                    let param_name = self.arena.string(param, 1).to_string();
                    let ty = self.type_name_of(self.arena.node(param, 2));
                    fn_env.insert(param_name, ty);
                }
                match self.arena.node(node, 5) {
                    Some(body) if self.arena.kind(body) == NodeKind::Block => {
                        self.check_block(body, &mut fn_state, &fn_env)
                    }
                    Some(body) => self.check_expr(body, Mode::Move, &mut fn_state, &fn_env),
                    None => Ok(()),
                }
            }
            NodeKind::ContractDecl | NodeKind::IntoStmt => Ok(()),
            // Aliases inside function bodies can attach destructors too.
            NodeKind::TypeAlias => {
                let dtor = self.arena.string(node, 4);
                if !dtor.is_empty() {
                    let name = self.arena.string(node, 1).to_string();
                    self.destructors.insert(name, dtor.to_string());
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn check_block(
        &mut self,
        node: NodeId,
        state: &mut OwnershipState,
        env: &Env,
    ) -> BorrowResult<()> {
        state.begin_scope();
        let mut block_env = env.clone();
        let mut result = Ok(());
        for &stmt in self.arena.seq(node, 1) {
            result = self.check_stmt(stmt, state, &mut block_env);
            if result.is_err() {
                break;
            }
        }
        state.end_scope();
        result
    }

    fn check_node(
        &mut self,
        node: NodeId,
        state: &mut OwnershipState,
        env: &mut Env,
    ) -> BorrowResult<()> {
        match self.arena.kind(node) {
            NodeKind::Block => self.check_block(node, state, env),
            NodeKind::NumberLit
            | NodeKind::BoolLit
            | NodeKind::StringLit
            | NodeKind::CharLit
            | NodeKind::Ident
            | NodeKind::Unary
            | NodeKind::Binary
            | NodeKind::Call
            | NodeKind::Member
            | NodeKind::Index
            | NodeKind::StructInit
            | NodeKind::IfExpr
            | NodeKind::MatchExpr
            | NodeKind::IsExpr
            | NodeKind::UnwrapExpr => self.check_expr(node, Mode::Move, state, env),
            _ => self.check_stmt(node, state, env),
        }
    }

    fn ownership_err(
        &self,
        code: ErrorCode,
        message: impl Into<String>,
        node: NodeId,
        fix: &str,
    ) -> Diagnostic {
        Diagnostic::new(code, message)
            .with_reason(OWNERSHIP_REASON)
            .with_fix(fix)
            .with_span(self.arena.span(node))
    }
}

fn has_builtin_copy_semantics(name: &str) -> bool {
    if name.is_empty() || name == "Unknown" {
        return false;
    }
    // Pointers copy; so do the builtin collection handles.
    if name.starts_with('*') {
        return true;
    }
    COPY_PRIMITIVES.contains(&name) || matches!(name, "Vec" | "Map" | "Set")
}

#[cfg(test)]
mod tests {
    use super::*;
    use skarn_parser::Parser;

    fn check(source: &str) -> BorrowResult<()> {
        let (arena, root) = Parser::parse(source).unwrap();
        borrowcheck(&arena, root)
    }

    #[test]
    fn test_use_after_move_of_struct_value() {
        let source = "struct Parcel { weight : I32 }\n\
                      fn main() : Void => {\n\
                        let parcel = Parcel { weight : 3 };\n\
                        let taken = parcel;\n\
                        let again = parcel;\n\
                      }";
        let err = check(source).unwrap_err();
        assert_eq!(err.code, ErrorCode::BorrowUseAfterMove);
        assert!(err.message.contains("'parcel'"));
    }

    #[test]
    fn test_copy_values_do_not_move() {
        let source = "copy struct Point { x : I32 }\n\
                      enum Gear { Low, High }\n\
                      fn main(gear : Gear) : Void => {\n\
                        let p = Point { x : 1 };\n\
                        let a = p;\n\
                        let b = p;\n\
                        let g = gear;\n\
                        let h = gear;\n\
                        let n = 7;\n\
                        let m = n;\n\
                        let k = n;\n\
                      }";
        assert!(check(source).is_ok());
    }

    #[test]
    fn test_move_while_borrowed_is_rejected() {
        let source = "struct Parcel { weight : I32 }\n\
                      fn main() : Void => {\n\
                        let parcel = Parcel { weight : 3 };\n\
                        let tag = &parcel;\n\
                        let taken = parcel;\n\
                      }";
        let err = check(source).unwrap_err();
        assert_eq!(err.code, ErrorCode::BorrowMoveWhileBorrowed);
    }

    #[test]
    fn test_shared_borrow_while_mutably_borrowed() {
        let source = "fn main() : Void => {\n\
                        let mut count = 0;\n\
                        let writer = &mut count;\n\
                        let reader = &count;\n\
                      }";
        let err = check(source).unwrap_err();
        assert_eq!(err.code, ErrorCode::BorrowImmutWhileMut);
    }

    #[test]
    fn test_mutable_borrow_over_existing_borrow() {
        let source = "fn main() : Void => {\n\
                        let mut count = 0;\n\
                        let reader = &count;\n\
                        let writer = &mut count;\n\
                      }";
        let err = check(source).unwrap_err();
        assert_eq!(err.code, ErrorCode::BorrowMutConflict);
    }

    #[test]
    fn test_loans_end_with_their_scope() {
        let source = "struct Parcel { weight : I32 }\n\
                      fn main() : Void => {\n\
                        let parcel = Parcel { weight : 3 };\n\
                        {\n\
                          let tag = &parcel;\n\
                        }\n\
                        let taken = parcel;\n\
                      }";
        assert!(check(source).is_ok());

        let reborrowed = "fn main(go : Bool) : Void => {\n\
                            let mut count = 0;\n\
                            while (go) {\n\
                              let reader = &count;\n\
                            }\n\
                            let writer = &mut count;\n\
                          }";
        assert!(check(reborrowed).is_ok());
    }

    #[test]
    fn test_assign_while_borrowed_is_rejected() {
        let source = "fn main() : Void => {\n\
                        let mut total = 0;\n\
                        let watcher = &total;\n\
                        total = 5;\n\
                      }";
        let err = check(source).unwrap_err();
        assert_eq!(err.code, ErrorCode::BorrowAssignWhileBorrowed);
    }

    #[test]
    fn test_reassignment_revives_moved_value() {
        let source = "struct Parcel { weight : I32 }\n\
                      fn main() : Void => {\n\
                        let mut parcel = Parcel { weight : 3 };\n\
                        let taken = parcel;\n\
                        parcel = Parcel { weight : 4 };\n\
                        let again = parcel;\n\
                      }";
        assert!(check(source).is_ok());
    }

    #[test]
    fn test_branch_moves_merge_at_join() {
        let leaky = "struct Parcel { weight : I32 }\n\
                     fn main(flip : Bool) : Void => {\n\
                       let parcel = Parcel { weight : 3 };\n\
                       if (flip) {\n\
                         let taken = parcel;\n\
                       }\n\
                       let again = parcel;\n\
                     }";
        let err = check(leaky).unwrap_err();
        assert_eq!(err.code, ErrorCode::BorrowUseAfterMove);

        // A rebind on every path revives the value at the join.
        let rebound = "struct Parcel { weight : I32 }\n\
                       fn main(flip : Bool) : Void => {\n\
                         let mut parcel = Parcel { weight : 3 };\n\
                         let taken = parcel;\n\
                         if (flip) {\n\
                           parcel = Parcel { weight : 1 };\n\
                         } else {\n\
                           parcel = Parcel { weight : 2 };\n\
                         }\n\
                         let again = parcel;\n\
                       }";
        assert!(check(rebound).is_ok());
    }

    #[test]
    fn test_double_drop_and_use_after_drop() {
        let doubled = "fn close(sock : *move Socket) : Void => {}\n\
                       type Socket = I32 then close;\n\
                       fn main() : Void => {\n\
                         let sock : Socket = 3;\n\
                         sock.drop();\n\
                         drop(sock);\n\
                       }";
        let err = check(doubled).unwrap_err();
        assert_eq!(err.code, ErrorCode::BorrowDoubleDrop);

        let zombie = "fn close(sock : *move Socket) : Void => {}\n\
                      type Socket = I32 then close;\n\
                      fn main() : Void => {\n\
                        let sock : Socket = 3;\n\
                        drop(sock);\n\
                        let reuse = sock;\n\
                      }";
        let err = check(zombie).unwrap_err();
        assert_eq!(err.code, ErrorCode::BorrowUseAfterDrop);
    }

    #[test]
    fn test_drop_validation() {
        let plain = "fn main() : Void => {\n\
                       let n = 3;\n\
                       drop(n);\n\
                     }";
        let err = check(plain).unwrap_err();
        assert_eq!(err.code, ErrorCode::BorrowDropMissingDestructor);
        assert!(err.message.contains("'I32'"));

        let err = check("fn main() : Void => { drop(3); }").unwrap_err();
        assert_eq!(err.code, ErrorCode::BorrowInvalidTarget);
    }

    #[test]
    fn test_borrow_target_must_be_place() {
        let err = check("fn main() : Void => { let r = &1; }").unwrap_err();
        assert_eq!(err.code, ErrorCode::BorrowInvalidTarget);

        let fresh = "struct Parcel { weight : I32 }\n\
                     fn main() : Void => { let r = &Parcel { weight : 3 }; }";
        assert!(check(fresh).is_ok());
    }

    #[test]
    fn test_copy_alias_validation() {
        let meters = "copy type Meters = I32;\n\
                      fn main() : Void => {\n\
                        let m : Meters = 5;\n\
                        let a = m;\n\
                        let b = m;\n\
                      }";
        assert!(check(meters).is_ok());

        // Forward reference through another copy alias resolves.
        assert!(check("copy type Outer = Inner; copy type Inner = I32;").is_ok());

        let noncopy = "struct Parcel { weight : I32 }\n\
                       copy type Shipment = Parcel;";
        let err = check(noncopy).unwrap_err();
        assert_eq!(err.code, ErrorCode::BorrowInvalidCopyAlias);

        let cyclic = "copy type Echo = Echo;";
        let err = check(cyclic).unwrap_err();
        assert_eq!(err.code, ErrorCode::BorrowInvalidCopyAlias);
    }

    #[test]
    fn test_drop_while_borrowed_is_rejected() {
        let source = "fn close(sock : *move Socket) : Void => {}\n\
                      type Socket = I32 then close;\n\
                      fn main() : Void => {\n\
                        let sock : Socket = 3;\n\
                        let watcher = &sock;\n\
                        drop(sock);\n\
                      }";
        let err = check(source).unwrap_err();
        assert_eq!(err.code, ErrorCode::BorrowMoveWhileBorrowed);
        assert!(err.message.contains("drop"));
    }

    #[test]
    fn test_index_moves_element_not_allocation() {
        let source = "fn main(bins : [I32; 4; 4]) : Void => {\n\
                        let first = bins[0];\n\
                        let second = bins[0];\n\
                      }";
        assert!(check(source).is_ok());

        let whole = "fn main(bins : [I32; 4; 4]) : Void => {\n\
                       let taken = bins;\n\
                       let again = bins;\n\
                     }";
        let err = check(whole).unwrap_err();
        assert_eq!(err.code, ErrorCode::BorrowUseAfterMove);
    }

    #[test]
    fn test_match_arm_moves_union_at_join() {
        let source = "struct Parcel { weight : I32 }\n\
                      enum Gear { Low, High }\n\
                      fn main(gear : Gear) : Void => {\n\
                        let parcel = Parcel { weight : 3 };\n\
                        let result = match (gear) {\n\
                          case Low = parcel;\n\
                          case High = 0;\n\
                        };\n\
                        let again = parcel;\n\
                      }";
        let err = check(source).unwrap_err();
        assert_eq!(err.code, ErrorCode::BorrowUseAfterMove);
    }

    #[test]
    fn test_function_references_are_not_moves() {
        let source = "fn helper() : I32 => 4;\n\
                      fn main() : Void => {\n\
                        let f = helper;\n\
                        let g = helper;\n\
                        let x = helper();\n\
                      }";
        assert!(check(source).is_ok());
    }

    #[test]
    fn test_rebinding_destructor_type_drops_old_value() {
        let clean = "fn close(sock : *move Socket) : Void => {}\n\
                     type Socket = I32 then close;\n\
                     fn main() : Void => {\n\
                       let mut sock : Socket = 3;\n\
                       sock = 4;\n\
                       let live = sock;\n\
                     }";
        assert!(check(clean).is_ok());

        // The old value is gone before the right side runs.
        let stale = "fn close(sock : *move Socket) : Void => {}\n\
                     type Socket = I32 then close;\n\
                     fn main() : Void => {\n\
                       let mut sock : Socket = 3;\n\
                       sock = sock;\n\
                     }";
        let err = check(stale).unwrap_err();
        assert_eq!(err.code, ErrorCode::BorrowUseAfterDrop);
    }

    #[test]
    fn test_field_move_poisons_base() {
        let source = "struct Parcel { weight : I32 }\n\
                      fn main() : Void => {\n\
                        let parcel = Parcel { weight : 3 };\n\
                        let w = parcel.weight;\n\
                        let again = parcel;\n\
                      }";
        let err = check(source).unwrap_err();
        assert_eq!(err.code, ErrorCode::BorrowUseAfterMove);
    }

    #[test]
    fn test_for_loop_body_runs_on_outer_state() {
        let source = "fn main() : Void => {\n\
                        let mut total = 0;\n\
                        for (i in 0 .. 3) {\n\
                          total = total + i;\n\
                        }\n\
                        let done = total;\n\
                      }";
        assert!(check(source).is_ok());
    }

    #[test]
    fn test_call_arguments_are_reads() {
        let source = "struct Parcel { weight : I32 }\n\
                      fn weigh(parcel : Parcel) : I32 => 0;\n\
                      fn main() : Void => {\n\
                        let parcel = Parcel { weight : 3 };\n\
                        let a = weigh(parcel);\n\
                        let b = weigh(parcel);\n\
                      }";
        assert!(check(source).is_ok());
    }
}
