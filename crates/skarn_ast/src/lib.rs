use std::collections::HashMap;

use skarn_lexer::Span;

/// Handle to a node in the [`Arena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to an interned string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrId(u32);

impl StrId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to a stored sequence of node handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeqId(u32);

impl SeqId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Payload of one data slot. `None` marks an absent operand, so optional
/// children need no reserved node index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    None,
    Node(NodeId),
    Str(StrId),
    Int(i64),
    Seq(SeqId),
}

impl Slot {
    pub fn is_none(self) -> bool {
        matches!(self, Slot::None)
    }
}

/// Node tags. The doc comment on each variant gives the slot layout
/// (slots are numbered 1 through 5; unlisted slots are unused).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    // === Declarations ===
    /// 1: sequence of top-level declarations and statements
    Program,
    /// 1: name, 2: sequence of generic params (Ident), 3: sequence of Param,
    /// 4: return type node, 5: body node (Block or expression)
    FnDecl,
    /// Platform-abstract signature. Same layout as FnDecl minus the body.
    ExpectFnDecl,
    /// Platform implementation paired with an ExpectFnDecl. Layout of FnDecl.
    ActualFnDecl,
    /// Foreign function signature. Same layout as FnDecl minus the body.
    ExternFnDecl,
    /// 1: name, 2: sequence of Field, 3: copy flag, 4: sequence of generic params
    StructDecl,
    /// 1: name, 2: sequence of variant names (Ident)
    EnumDecl,
    /// 1: name, 2: aliased type node, 3: copy flag, 4: destructor name
    TypeAlias,
    /// 1: name, 2: sequence of required fn signatures (FnDecl without body)
    ContractDecl,
    /// 1: name, 2: sequence of member declarations
    ObjectDecl,
    /// 1: name, 2: type node
    ExternLetDecl,
    /// 1: name
    ExternTypeDecl,

    // === Statements ===
    /// 1: name, 2: declared type node (optional), 3: initializer, 4: mutable flag
    LetDecl,
    /// 1: target expression, 2: value expression
    AssignStmt,
    /// 1: value expression (optional)
    ReturnStmt,
    /// 1: condition, 2: then block, 3: else node (optional)
    IfStmt,
    /// 1: condition, 2: body block
    WhileStmt,
    /// 1: iterator name, 2: range start, 3: range end, 4: body block
    ForStmt,
    /// 1: body block
    LoopStmt,
    /// 1: sequence of statements
    Block,
    BreakStmt,
    ContinueStmt,
    /// 1: expression
    ExprStmt,
    /// 1: sequence of region names (Ident), 2: body block
    LifetimeStmt,
    /// 1: contract name
    IntoStmt,

    // === Expressions ===
    /// 1: value (f64 bits when slot 3 is set), 2: suffix text, 3: float flag
    NumberLit,
    /// 1: value flag
    BoolLit,
    /// 1: text
    StringLit,
    /// 1: code point
    CharLit,
    /// 1: name
    Ident,
    /// 1: operator text, 2: left operand, 3: right operand
    Binary,
    /// 1: operator text, 2: operand
    Unary,
    /// 1: callee expression, 2: sequence of argument expressions,
    /// 3: receiver-sugar flag (set when lowered from `value.method(..)`)
    Call,
    /// 1: receiver expression, 2: property name
    Member,
    /// 1: target expression, 2: index expression
    Index,
    /// 1: struct name, 2: sequence of FieldInit
    StructInit,
    /// 1: condition, 2: then branch, 3: else branch
    IfExpr,
    /// 1: scrutinee expression, 2: sequence of MatchArm
    MatchExpr,
    /// 1: subject expression, 2: pattern node
    IsExpr,
    /// 1: subject expression
    UnwrapExpr,
    /// 1: sequence of Param, 2: body node
    Lambda,
    /// 1: name, 2: sequence of Param, 3: return type node, 4: body node
    FnExpr,

    // === Type syntax ===
    /// 1: name, 2: sequence of generic argument type nodes
    NamedType,
    /// 1: pointee type node, 2: mutable flag, 3: move flag, 4: lifetime name
    PointerType,
    /// 1: element type node, 2: initialized-length expression, 3: capacity expression
    ArrayType,
    /// 1: sequence of member type nodes
    TupleType,
    /// 1: base type node, 2: operator text, 3: bound expression
    RefinementType,
    /// 1: left type node, 2: right type node, 3: extract-from-left flag
    UnionType,
    /// 1: sequence of parameter type nodes, 2: return type node
    FunctionType,

    // === Patterns ===
    WildcardPat,
    /// 1: literal expression node
    LiteralPat,
    /// 1: bound name
    NamePat,
    /// 1: struct or variant name, 2: sequence of PatField
    StructPat,

    // === Auxiliary ===
    /// 1: name, 2: type node
    Param,
    /// 1: name, 2: type node
    Field,
    /// 1: field name, 2: value expression
    FieldInit,
    /// 1: pattern node, 2: arm body node
    MatchArm,
    /// 1: field name, 2: binding name (optional, defaults to the field name)
    PatField,
}

/// Append-only node table. Nodes are parallel columns (kind, span, five data
/// slots); sequences and interned strings live in side tables referenced by
/// handle. Passes hold `&Arena` and never mutate node shape.
#[derive(Debug, Default)]
pub struct Arena {
    kinds: Vec<NodeKind>,
    spans: Vec<Span>,
    slots: [Vec<Slot>; 5],
    seqs: Vec<Vec<NodeId>>,
    strings: Vec<String>,
    interned: HashMap<String, StrId>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node and return its handle. `data` fills slots 1 through
    /// `data.len()`; the remaining slots are [`Slot::None`].
    pub fn add(&mut self, kind: NodeKind, span: Span, data: &[Slot]) -> NodeId {
        debug_assert!(data.len() <= 5);
        let id = NodeId(self.kinds.len() as u32);
        self.kinds.push(kind);
        self.spans.push(span);
        for (index, column) in self.slots.iter_mut().enumerate() {
            column.push(data.get(index).copied().unwrap_or(Slot::None));
        }
        id
    }

    /// Store a sequence of node handles and return its handle.
    pub fn add_seq(&mut self, nodes: Vec<NodeId>) -> SeqId {
        let id = SeqId(self.seqs.len() as u32);
        self.seqs.push(nodes);
        id
    }

    /// Intern `text`, reusing the existing handle when the same text was
    /// interned before. Equal text always yields an equal handle.
    pub fn intern(&mut self, text: &str) -> StrId {
        if let Some(&id) = self.interned.get(text) {
            return id;
        }
        let id = StrId(self.strings.len() as u32);
        self.strings.push(text.to_string());
        self.interned.insert(text.to_string(), id);
        id
    }

    pub fn kind(&self, node: NodeId) -> NodeKind {
        self.kinds[node.index()]
    }

    pub fn span(&self, node: NodeId) -> Span {
        self.spans[node.index()]
    }

    /// Raw slot value. `slot` is 1-based, matching the layouts documented
    /// on [`NodeKind`].
    pub fn slot(&self, node: NodeId, slot: usize) -> Slot {
        debug_assert!((1..=5).contains(&slot));
        self.slots[slot - 1][node.index()]
    }

    /// Node handle in a slot, or `None` when the slot holds no node.
    pub fn node(&self, node: NodeId, slot: usize) -> Option<NodeId> {
        match self.slot(node, slot) {
            Slot::Node(id) => Some(id),
            _ => None,
        }
    }

    /// String handle in a slot, or `None` when the slot holds no string.
    pub fn str_id(&self, node: NodeId, slot: usize) -> Option<StrId> {
        match self.slot(node, slot) {
            Slot::Str(id) => Some(id),
            _ => None,
        }
    }

    /// Interned text in a slot, or `""` when the slot holds no string.
    pub fn string(&self, node: NodeId, slot: usize) -> &str {
        match self.slot(node, slot) {
            Slot::Str(id) => self.text(id),
            _ => "",
        }
    }

    /// Integer in a slot, or `0` when the slot holds no integer.
    pub fn int(&self, node: NodeId, slot: usize) -> i64 {
        match self.slot(node, slot) {
            Slot::Int(value) => value,
            _ => 0,
        }
    }

    /// Sequence in a slot, or the empty slice when the slot holds no sequence.
    pub fn seq(&self, node: NodeId, slot: usize) -> &[NodeId] {
        match self.slot(node, slot) {
            Slot::Seq(id) => self.seq_nodes(id),
            _ => &[],
        }
    }

    pub fn seq_nodes(&self, seq: SeqId) -> &[NodeId] {
        &self.seqs[seq.index()]
    }

    pub fn text(&self, id: StrId) -> &str {
        &self.strings[id.index()]
    }

    /// Number of nodes stored so far.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Compact one-line rendering of a subtree, for tests and debugging.
    pub fn dump(&self, node: NodeId) -> String {
        let mut parts = Vec::new();
        for slot in 1..=5 {
            match self.slot(node, slot) {
                Slot::None => {}
                Slot::Node(child) => parts.push(self.dump(child)),
                Slot::Str(id) => parts.push(format!("'{}'", self.text(id))),
                Slot::Int(value) => parts.push(value.to_string()),
                Slot::Seq(id) => {
                    let items: Vec<String> =
                        self.seq_nodes(id).iter().map(|&n| self.dump(n)).collect();
                    parts.push(format!("[{}]", items.join(", ")));
                }
            }
        }
        if parts.is_empty() {
            format!("{:?}", self.kind(node))
        } else {
            format!("{:?}({})", self.kind(node), parts.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span::new(0, 0)
    }

    #[test]
    fn test_intern_deduplicates() {
        let mut arena = Arena::new();
        let a = arena.intern("counter");
        let b = arena.intern("counter");
        let c = arena.intern("total");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(arena.text(a), "counter");
        assert_eq!(arena.text(c), "total");
    }

    #[test]
    fn test_add_and_read_slots() {
        let mut arena = Arena::new();
        let name = arena.intern("x");
        let value = arena.add(NodeKind::NumberLit, span(), &[Slot::Int(42)]);
        let decl = arena.add(
            NodeKind::LetDecl,
            span(),
            &[Slot::Str(name), Slot::None, Slot::Node(value), Slot::Int(1)],
        );

        assert_eq!(arena.kind(decl), NodeKind::LetDecl);
        assert_eq!(arena.string(decl, 1), "x");
        assert_eq!(arena.node(decl, 3), Some(value));
        assert_eq!(arena.node(decl, 2), None);
        assert_eq!(arena.int(decl, 4), 1);
        assert_eq!(arena.int(value, 1), 42);
        assert_eq!(arena.slot(decl, 5), Slot::None);
    }

    #[test]
    fn test_sequences() {
        let mut arena = Arena::new();
        let a = arena.add(NodeKind::BreakStmt, span(), &[]);
        let b = arena.add(NodeKind::ContinueStmt, span(), &[]);
        let seq = arena.add_seq(vec![a, b]);
        let block = arena.add(NodeKind::Block, span(), &[Slot::Seq(seq)]);

        assert_eq!(arena.seq(block, 1), &[a, b]);
        assert!(arena.seq(block, 2).is_empty());
    }

    #[test]
    fn test_dump() {
        let mut arena = Arena::new();
        let name = arena.intern("n");
        let ident = arena.add(NodeKind::Ident, span(), &[Slot::Str(name)]);
        let one = arena.add(NodeKind::NumberLit, span(), &[Slot::Int(1)]);
        let op = arena.intern("+");
        let sum = arena.add(
            NodeKind::Binary,
            span(),
            &[Slot::Str(op), Slot::Node(ident), Slot::Node(one)],
        );

        assert_eq!(arena.dump(sum), "Binary('+', Ident('n'), NumberLit(1))");
    }
}
