//! Ownership and loan state tracking

use std::collections::{HashMap, HashSet};

/// A place in memory: a root variable plus the field/index path used to
/// reach it. Paths are canonical strings, e.g. `parcel.tags[]` for an
/// index into a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Place {
    /// The root variable
    pub base: String,
    /// Full access path, including the base
    pub path: String,
}

impl Place {
    pub fn var(name: &str) -> Self {
        Self {
            base: name.to_string(),
            path: name.to_string(),
        }
    }

    pub fn field(mut self, name: &str) -> Self {
        self.path.push('.');
        self.path.push_str(name);
        self
    }

    pub fn index(mut self) -> Self {
        self.path.push_str("[]");
        self
    }

    /// Check if two places overlap
    pub fn conflicts_with(&self, other: &Place) -> bool {
        self.base == other.base && self.path_overlaps(&other.path)
    }

    /// Overlap test against another path under the same base. An index
    /// segment aliases every element, so `xs[].len` overlaps `xs[]`.
    pub fn path_overlaps(&self, other: &str) -> bool {
        if self.path == other {
            return true;
        }
        if self.path.contains("[]") || other.contains("[]") {
            let own = self.path.replace("[]", "");
            let theirs = other.replace("[]", "");
            return own.starts_with(&theirs) || theirs.starts_with(&own);
        }
        is_field_prefix(&self.path, other) || is_field_prefix(other, &self.path)
    }
}

/// True when `path` reaches into a field of `prefix`.
fn is_field_prefix(prefix: &str, path: &str) -> bool {
    path.starts_with(prefix) && path[prefix.len()..].starts_with('.')
}

/// Which access a loan grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanKind {
    Shared,
    Mut,
}

/// One recorded borrow, owned by the innermost scope open when it was
/// taken.
#[derive(Debug, Clone)]
pub struct Loan {
    pub kind: LoanKind,
    pub place: Place,
}

/// Ownership facts at a program point.
///
/// Loan tables are keyed by base variable so conflict queries only scan
/// paths under the same root. Conditional branches run on a
/// [`fork`](Self::fork) and the checker merges the surviving move sets
/// back with [`merge_moved`](Self::merge_moved).
#[derive(Debug, Clone, Default)]
pub struct OwnershipState {
    /// Bases whose value has been moved out
    pub moved: HashSet<String>,
    /// Bases that were dropped, explicitly or by rebinding
    pub dropped: HashSet<String>,
    /// Bases of destructor types that still owe an implicit drop
    pub pending_drops: HashSet<String>,
    shared_loans: HashMap<String, HashSet<String>>,
    mut_loans: HashMap<String, HashSet<String>>,
    loan_scopes: Vec<Vec<Loan>>,
    drop_scopes: Vec<Vec<String>>,
}

impl OwnershipState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy for checking a conditional branch. Loans transfer, but scope
    /// frames do not: a fork never releases loans owned by the original.
    pub fn fork(&self) -> OwnershipState {
        OwnershipState {
            moved: self.moved.clone(),
            dropped: self.dropped.clone(),
            pending_drops: self.pending_drops.clone(),
            shared_loans: self.shared_loans.clone(),
            mut_loans: self.mut_loans.clone(),
            loan_scopes: Vec::new(),
            drop_scopes: Vec::new(),
        }
    }

    /// Open a lexical scope. Loans and drop obligations recorded while it
    /// is innermost are released by [`end_scope`](Self::end_scope).
    pub fn begin_scope(&mut self) {
        self.loan_scopes.push(Vec::new());
        self.drop_scopes.push(Vec::new());
    }

    pub fn end_scope(&mut self) {
        for loan in self.loan_scopes.pop().unwrap_or_default().into_iter().rev() {
            let table = match loan.kind {
                LoanKind::Shared => &mut self.shared_loans,
                LoanKind::Mut => &mut self.mut_loans,
            };
            if let Some(paths) = table.get_mut(&loan.place.base) {
                paths.remove(&loan.place.path);
                if paths.is_empty() {
                    table.remove(&loan.place.base);
                }
            }
        }
        for name in self.drop_scopes.pop().unwrap_or_default() {
            self.pending_drops.remove(&name);
        }
    }

    /// Record a loan against the innermost scope. Loans taken outside any
    /// scope last for the rest of the run.
    pub fn add_loan(&mut self, kind: LoanKind, place: Place) {
        let table = match kind {
            LoanKind::Shared => &mut self.shared_loans,
            LoanKind::Mut => &mut self.mut_loans,
        };
        table
            .entry(place.base.clone())
            .or_default()
            .insert(place.path.clone());
        if let Some(scope) = self.loan_scopes.last_mut() {
            scope.push(Loan { kind, place });
        }
    }

    /// Register a destructor obligation for `name` in the innermost scope.
    pub fn track_pending_drop(&mut self, name: &str) {
        self.pending_drops.insert(name.to_string());
        if let Some(scope) = self.drop_scopes.last_mut() {
            scope.push(name.to_string());
        }
    }

    pub fn shared_loan_conflicts(&self, place: &Place) -> bool {
        conflicts_in(&self.shared_loans, place)
    }

    pub fn mut_loan_conflicts(&self, place: &Place) -> bool {
        conflicts_in(&self.mut_loans, place)
    }

    pub fn any_loan_conflicts(&self, place: &Place) -> bool {
        self.shared_loan_conflicts(place) || self.mut_loan_conflicts(place)
    }

    /// Fold branch move sets back in. With both branches present their
    /// union replaces the current set, so a value reinitialized on every
    /// path comes back usable.
    pub fn merge_moved(
        &mut self,
        then_branch: OwnershipState,
        else_branch: Option<OwnershipState>,
    ) {
        match else_branch {
            Some(other) => {
                let mut merged = then_branch.moved;
                merged.extend(other.moved);
                self.moved = merged;
            }
            None => self.moved.extend(then_branch.moved),
        }
    }
}

fn conflicts_in(table: &HashMap<String, HashSet<String>>, place: &Place) -> bool {
    match table.get(&place.base) {
        Some(paths) => paths.iter().any(|path| place.path_overlaps(path)),
        None => false,
    }
}
