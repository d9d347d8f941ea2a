use skarn_ast::*;
use skarn_diag::{Diagnostic, ErrorCode};
use skarn_lexer::{LexError, Lexer, Span, SpannedToken, Token};

pub type ParseResult<T> = Result<T, Diagnostic>;

const EXPECTED_TOKEN_FIX: &str =
    "Check token order, punctuation, and delimiters around this location.";
const UNEXPECTED_TOKEN_FIX: &str = "Ensure expressions and statements use valid Skarn syntax.";
const LEX_FIX: &str = "Fix the source text so it forms complete Skarn tokens.";

fn lex_diagnostic(err: LexError, source: &str) -> Diagnostic {
    let rest = &source[err.span.start.min(source.len())..];
    let (code, message) = if rest.starts_with('"') {
        (
            ErrorCode::LexUnterminatedString,
            "Unterminated string literal".to_string(),
        )
    } else if rest.starts_with('\'') {
        (
            ErrorCode::LexUnterminatedChar,
            "Unterminated char literal".to_string(),
        )
    } else if rest.starts_with("/*") {
        (
            ErrorCode::LexUnterminatedBlockComment,
            "Unterminated block comment".to_string(),
        )
    } else {
        (ErrorCode::LexUnexpectedChar, err.message)
    };
    Diagnostic::new(code, message)
        .with_fix(LEX_FIX)
        .with_span(err.span)
}

fn opt(node: Option<NodeId>) -> Slot {
    node.map(Slot::Node).unwrap_or(Slot::None)
}

fn flag(set: bool) -> Slot {
    if set { Slot::Int(1) } else { Slot::None }
}

pub struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    arena: Arena,
}

impl Parser {
    pub fn new(source: &str) -> ParseResult<Self> {
        let tokens = Lexer::tokenize(source).map_err(|e| lex_diagnostic(e, source))?;
        Ok(Self { tokens, pos: 0, arena: Arena::new() })
    }

    /// Parse a whole compilation unit, yielding the arena and the Program node.
    pub fn parse(source: &str) -> ParseResult<(Arena, NodeId)> {
        let mut parser = Parser::new(source)?;
        let root = parser.parse_program()?;
        Ok((parser.arena, root))
    }

    // === Token Access ===

    fn current(&self) -> &SpannedToken {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        &self.current().token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].token
    }

    fn peek_span(&self) -> Span {
        self.current().span
    }

    fn prev_end(&self) -> usize {
        self.tokens[self.pos.saturating_sub(1)].span.end
    }

    fn span_from(&self, start: Span) -> Span {
        Span::new(start.start, self.prev_end())
    }

    fn advance(&mut self) -> &SpannedToken {
        let tok = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn check(&self, token: &Token) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(token)
    }

    fn expect(&mut self, expected: Token) -> ParseResult<SpannedToken> {
        if self.check(&expected) {
            Ok(self.advance().clone())
        } else {
            Err(Diagnostic::new(
                ErrorCode::ParseExpectedToken,
                format!("Expected '{}', found '{}'", expected, self.peek()),
            )
            .with_fix(EXPECTED_TOKEN_FIX)
            .with_span(self.peek_span()))
        }
    }

    fn expect_ident(&mut self) -> ParseResult<String> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(Diagnostic::new(
                ErrorCode::ParseExpectedToken,
                format!("Expected identifier, found '{}'", other),
            )
            .with_fix(EXPECTED_TOKEN_FIX)
            .with_span(self.peek_span())),
        }
    }

    fn expected(&self, message: &str) -> Diagnostic {
        Diagnostic::new(
            ErrorCode::ParseExpectedToken,
            format!("{}, found '{}'", message, self.peek()),
        )
        .with_fix(EXPECTED_TOKEN_FIX)
        .with_span(self.peek_span())
    }

    fn unexpected(&self) -> Diagnostic {
        Diagnostic::new(
            ErrorCode::ParseUnexpectedToken,
            format!("Unexpected token '{}'", self.peek()),
        )
        .with_fix(UNEXPECTED_TOKEN_FIX)
        .with_span(self.peek_span())
    }

    fn seq_slot(&mut self, nodes: Vec<NodeId>) -> Slot {
        if nodes.is_empty() {
            Slot::None
        } else {
            Slot::Seq(self.arena.add_seq(nodes))
        }
    }

    // === Statements ===

    fn parse_program(&mut self) -> ParseResult<NodeId> {
        let start = self.peek_span();
        let mut body = Vec::new();
        while !self.is_at_end() {
            if let Some(stmt) = self.parse_statement()? {
                body.push(stmt);
            }
        }
        let span = Span::new(start.start, self.peek_span().end);
        let body_slot = self.seq_slot(body);
        Ok(self.arena.add(NodeKind::Program, span, &[body_slot]))
    }

    /// Returns None for import-style lets, which bind names at the module
    /// loading boundary and leave nothing behind in a single-unit parse.
    fn parse_statement(&mut self) -> ParseResult<Option<NodeId>> {
        match self.peek() {
            Token::Out => {
                // Export markers matter to the module loader, not to these passes.
                self.advance();
                let decl = match self.peek() {
                    Token::Fn => self.parse_fn_decl(NodeKind::FnDecl)?,
                    Token::Struct => self.parse_struct(false)?,
                    Token::Enum => self.parse_enum()?,
                    Token::Type => self.parse_type_alias(false)?,
                    _ => {
                        return Err(self
                            .expected("Expected declaration after 'out'")
                            .with_fix("Use 'out' before a top-level fn/struct/enum/type declaration."));
                    }
                };
                Ok(Some(decl))
            }
            Token::Let => self.parse_let(),
            Token::Fn => self.parse_fn_decl(NodeKind::FnDecl).map(Some),
            Token::Struct => self.parse_struct(false).map(Some),
            Token::Enum => self.parse_enum().map(Some),
            Token::Type => self.parse_type_alias(false).map(Some),
            Token::Copy => {
                self.advance();
                match self.peek() {
                    Token::Struct => self.parse_struct(true).map(Some),
                    Token::Type => self.parse_type_alias(true).map(Some),
                    _ => Err(self
                        .expected("Expected 'struct' or 'type' after 'copy'")
                        .with_fix("Use 'copy' before a struct declaration or a type alias.")),
                }
            }
            Token::Extern => self.parse_extern().map(Some),
            Token::Expect => {
                self.advance();
                self.parse_fn_signature(NodeKind::ExpectFnDecl, None).map(Some)
            }
            Token::Actual => {
                self.advance();
                self.parse_fn_decl(NodeKind::ActualFnDecl).map(Some)
            }
            Token::Contract => self.parse_contract().map(Some),
            Token::Object => self.parse_object().map(Some),
            Token::Into => self.parse_into().map(Some),
            Token::Lifetime => self.parse_lifetime().map(Some),
            Token::Return => self.parse_return().map(Some),
            Token::If => {
                // A block-bodied if in statement position is an if statement;
                // anything else is an expression statement and needs ';'.
                let expr = self.parse_primary()?;
                if self.arena.kind(expr) == NodeKind::IfExpr {
                    if let Some(then) = self.arena.node(expr, 2) {
                        if self.arena.kind(then) == NodeKind::Block {
                            let slots = [
                                self.arena.slot(expr, 1),
                                self.arena.slot(expr, 2),
                                self.arena.slot(expr, 3),
                            ];
                            let span = self.arena.span(expr);
                            return Ok(Some(self.arena.add(NodeKind::IfStmt, span, &slots)));
                        }
                    }
                }
                self.expect(Token::Semi)?;
                let span = self.arena.span(expr);
                Ok(Some(self.arena.add(NodeKind::ExprStmt, span, &[Slot::Node(expr)])))
            }
            Token::While => self.parse_while().map(Some),
            Token::For => self.parse_for().map(Some),
            Token::Loop => self.parse_loop().map(Some),
            Token::Break => {
                let span = self.peek_span();
                self.advance();
                self.expect(Token::Semi)?;
                Ok(Some(self.arena.add(NodeKind::BreakStmt, span, &[])))
            }
            Token::Continue => {
                let span = self.peek_span();
                self.advance();
                self.expect(Token::Semi)?;
                Ok(Some(self.arena.add(NodeKind::ContinueStmt, span, &[])))
            }
            Token::LBrace => self.parse_block().map(Some),
            _ => {
                let expr = self.parse_expression(0)?;
                if self.check(&Token::Eq) {
                    self.advance();
                    let value = self.parse_expression(0)?;
                    self.expect(Token::Semi)?;
                    let span = Span::new(self.arena.span(expr).start, self.prev_end());
                    return Ok(Some(self.arena.add(
                        NodeKind::AssignStmt,
                        span,
                        &[Slot::Node(expr), Slot::Node(value)],
                    )));
                }
                if self.check(&Token::Semi) {
                    self.advance();
                } else if !self.check(&Token::RBrace) {
                    self.expect(Token::Semi)?;
                }
                let span = self.arena.span(expr);
                Ok(Some(self.arena.add(NodeKind::ExprStmt, span, &[Slot::Node(expr)])))
            }
        }
    }

    fn parse_block(&mut self) -> ParseResult<NodeId> {
        let start = self.peek_span();
        self.expect(Token::LBrace)?;
        let mut stmts = Vec::new();
        while !self.check(&Token::RBrace) && !self.is_at_end() {
            if let Some(stmt) = self.parse_statement()? {
                stmts.push(stmt);
            }
        }
        let end = self.expect(Token::RBrace)?;
        let span = Span::new(start.start, end.span.end);
        let stmts_slot = self.seq_slot(stmts);
        Ok(self.arena.add(NodeKind::Block, span, &[stmts_slot]))
    }

    fn parse_let(&mut self) -> ParseResult<Option<NodeId>> {
        let start = self.peek_span();
        self.expect(Token::Let)?;

        // Import-style let: let { a, b } = std::vec;
        if self.check(&Token::LBrace) {
            self.advance();
            while !self.check(&Token::RBrace) && !self.is_at_end() {
                self.expect_ident()?;
                if !self.check(&Token::RBrace) {
                    self.expect(Token::Comma)?;
                }
            }
            self.expect(Token::RBrace)?;
            self.expect(Token::Eq)?;
            self.expect_ident()?;
            while self.check(&Token::ColonColon) {
                self.advance();
                self.expect_ident()?;
            }
            self.expect(Token::Semi)?;
            return Ok(None);
        }

        let mutable = if self.check(&Token::Mut) {
            self.advance();
            true
        } else {
            false
        };
        let name = self.expect_ident()?;
        let ty = if self.check(&Token::Colon) {
            self.advance();
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(Token::Eq)?;
        let value = self.parse_expression(0)?;
        self.expect(Token::Semi)?;

        let span = self.span_from(start);
        let name_id = self.arena.intern(&name);
        Ok(Some(self.arena.add(
            NodeKind::LetDecl,
            span,
            &[Slot::Str(name_id), opt(ty), Slot::Node(value), flag(mutable)],
        )))
    }

    /// Function declaration: fn name<T>(a : T, b) : Ret => body
    fn parse_fn_decl(&mut self, kind: NodeKind) -> ParseResult<NodeId> {
        let start = self.peek_span();
        self.expect(Token::Fn)?;
        let name = self.expect_ident()?;
        let generics = if self.check(&Token::Lt) {
            self.parse_generic_params()?
        } else {
            Vec::new()
        };
        let params = self.parse_param_list(None)?;
        let ret = if self.check(&Token::Colon) {
            self.advance();
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(Token::FatArrow)?;
        let body = if self.check(&Token::LBrace) {
            self.parse_block()?
        } else {
            let body = self.parse_expression(0)?;
            if !self.check(&Token::RBrace) && !self.is_at_end() {
                self.expect(Token::Semi)?;
            }
            body
        };

        let span = self.span_from(start);
        let name_id = self.arena.intern(&name);
        let generics_slot = self.seq_slot(generics);
        let params_slot = self.seq_slot(params);
        Ok(self.arena.add(
            kind,
            span,
            &[Slot::Str(name_id), generics_slot, params_slot, opt(ret), Slot::Node(body)],
        ))
    }

    /// Bodyless signature: expect fns, extern fns, and contract items.
    fn parse_fn_signature(&mut self, kind: NodeKind, owner: Option<&str>) -> ParseResult<NodeId> {
        let start = self.peek_span();
        self.expect(Token::Fn)?;
        let name = self.expect_ident()?;
        let generics = if self.check(&Token::Lt) {
            self.parse_generic_params()?
        } else {
            Vec::new()
        };
        let params = self.parse_param_list(owner)?;
        let ret = if self.check(&Token::Colon) {
            self.advance();
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(Token::Semi)?;

        let span = self.span_from(start);
        let name_id = self.arena.intern(&name);
        let generics_slot = self.seq_slot(generics);
        let params_slot = self.seq_slot(params);
        Ok(self.arena.add(
            kind,
            span,
            &[Slot::Str(name_id), generics_slot, params_slot, opt(ret)],
        ))
    }

    fn parse_generic_params(&mut self) -> ParseResult<Vec<NodeId>> {
        self.expect(Token::Lt)?;
        let mut params = Vec::new();
        while !self.check(&Token::Gt) && !self.is_at_end() {
            let span = self.peek_span();
            let name = self.expect_ident()?;
            let name_id = self.arena.intern(&name);
            params.push(self.arena.add(NodeKind::Ident, span, &[Slot::Str(name_id)]));
            if !self.check(&Token::Gt) {
                self.expect(Token::Comma)?;
            }
        }
        self.expect(Token::Gt)?;
        Ok(params)
    }

    /// Generic parameter lists on aliases, extern types, and objects are
    /// accepted but carry no meaning in the checked subset.
    fn skip_generic_params(&mut self) -> ParseResult<()> {
        self.expect(Token::Lt)?;
        while !self.check(&Token::Gt) && !self.is_at_end() {
            self.expect_ident()?;
            if !self.check(&Token::Gt) {
                self.expect(Token::Comma)?;
            }
        }
        self.expect(Token::Gt)?;
        Ok(())
    }

    fn parse_param_list(&mut self, owner: Option<&str>) -> ParseResult<Vec<NodeId>> {
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        while !self.check(&Token::RParen) && !self.is_at_end() {
            params.push(self.parse_param(owner)?);
            if !self.check(&Token::RParen) {
                self.expect(Token::Comma)?;
            }
        }
        self.expect(Token::RParen)?;
        Ok(params)
    }

    fn parse_param(&mut self, owner: Option<&str>) -> ParseResult<NodeId> {
        let start = self.peek_span();

        // Contract receiver shorthand: *this
        if let Some(owner_name) = owner {
            if self.check(&Token::Star) {
                self.advance();
                let name_span = self.peek_span();
                let name = self.expect_ident()?;
                let owner_id = self.arena.intern(owner_name);
                let named = self.arena.add(NodeKind::NamedType, name_span, &[Slot::Str(owner_id)]);
                let span = Span::new(start.start, name_span.end);
                let pointer = self.arena.add(NodeKind::PointerType, span, &[Slot::Node(named)]);
                let name_id = self.arena.intern(&name);
                return Ok(self.arena.add(
                    NodeKind::Param,
                    span,
                    &[Slot::Str(name_id), Slot::Node(pointer)],
                ));
            }
        }

        let name = self.expect_ident()?;
        let ty = if self.check(&Token::Colon) {
            self.advance();
            Some(self.parse_type()?)
        } else {
            None
        };
        let span = self.span_from(start);
        let name_id = self.arena.intern(&name);
        Ok(self.arena.add(NodeKind::Param, span, &[Slot::Str(name_id), opt(ty)]))
    }

    fn parse_struct(&mut self, is_copy: bool) -> ParseResult<NodeId> {
        let start = self.peek_span();
        self.expect(Token::Struct)?;
        let name = self.expect_ident()?;
        let generics = if self.check(&Token::Lt) {
            self.parse_generic_params()?
        } else {
            Vec::new()
        };
        self.expect(Token::LBrace)?;
        let mut fields = Vec::new();
        while !self.check(&Token::RBrace) && !self.is_at_end() {
            let field_start = self.peek_span();
            let field_name = self.expect_ident()?;
            self.expect(Token::Colon)?;
            let field_type = self.parse_type()?;
            let field_span = self.span_from(field_start);
            let field_id = self.arena.intern(&field_name);
            fields.push(self.arena.add(
                NodeKind::Field,
                field_span,
                &[Slot::Str(field_id), Slot::Node(field_type)],
            ));
            if self.check(&Token::Comma) || self.check(&Token::Semi) {
                self.advance();
            }
        }
        self.expect(Token::RBrace)?;

        let span = self.span_from(start);
        let name_id = self.arena.intern(&name);
        let fields_slot = self.seq_slot(fields);
        let generics_slot = self.seq_slot(generics);
        Ok(self.arena.add(
            NodeKind::StructDecl,
            span,
            &[Slot::Str(name_id), fields_slot, flag(is_copy), generics_slot],
        ))
    }

    fn parse_enum(&mut self) -> ParseResult<NodeId> {
        let start = self.peek_span();
        self.expect(Token::Enum)?;
        let name = self.expect_ident()?;
        self.expect(Token::LBrace)?;
        let mut variants = Vec::new();
        while !self.check(&Token::RBrace) && !self.is_at_end() {
            let span = self.peek_span();
            let variant = self.expect_ident()?;
            let variant_id = self.arena.intern(&variant);
            variants.push(self.arena.add(NodeKind::Ident, span, &[Slot::Str(variant_id)]));
            if self.check(&Token::Comma) || self.check(&Token::Semi) {
                self.advance();
            }
        }
        self.expect(Token::RBrace)?;

        let span = self.span_from(start);
        let name_id = self.arena.intern(&name);
        let variants_slot = self.seq_slot(variants);
        Ok(self.arena.add(NodeKind::EnumDecl, span, &[Slot::Str(name_id), variants_slot]))
    }

    /// Type alias: type Name = T; optionally with a destructor: then drop_fn
    fn parse_type_alias(&mut self, is_copy: bool) -> ParseResult<NodeId> {
        let start = self.peek_span();
        self.expect(Token::Type)?;
        let name = self.expect_ident()?;
        if self.check(&Token::Lt) {
            self.skip_generic_params()?;
        }
        self.expect(Token::Eq)?;
        let aliased = self.parse_type()?;
        let destructor = if self.check(&Token::Then) {
            self.advance();
            Some(self.expect_ident()?)
        } else {
            None
        };
        self.expect(Token::Semi)?;

        let span = self.span_from(start);
        let name_id = self.arena.intern(&name);
        let dtor_slot = match destructor {
            Some(dtor) => Slot::Str(self.arena.intern(&dtor)),
            None => Slot::None,
        };
        Ok(self.arena.add(
            NodeKind::TypeAlias,
            span,
            &[Slot::Str(name_id), Slot::Node(aliased), flag(is_copy), dtor_slot],
        ))
    }

    fn parse_extern(&mut self) -> ParseResult<NodeId> {
        let start = self.peek_span();
        self.expect(Token::Extern)?;
        match self.peek() {
            Token::Fn => self.parse_fn_signature(NodeKind::ExternFnDecl, None),
            Token::Let => {
                self.advance();
                let name = self.expect_ident()?;
                self.expect(Token::Colon)?;
                let ty = self.parse_type()?;
                self.expect(Token::Semi)?;
                let span = self.span_from(start);
                let name_id = self.arena.intern(&name);
                Ok(self.arena.add(
                    NodeKind::ExternLetDecl,
                    span,
                    &[Slot::Str(name_id), Slot::Node(ty)],
                ))
            }
            Token::Type => {
                self.advance();
                let name = self.expect_ident()?;
                if self.check(&Token::Lt) {
                    self.skip_generic_params()?;
                }
                self.expect(Token::Semi)?;
                let span = self.span_from(start);
                let name_id = self.arena.intern(&name);
                Ok(self.arena.add(NodeKind::ExternTypeDecl, span, &[Slot::Str(name_id)]))
            }
            _ => Err(self
                .expected("Expected 'fn', 'let', or 'type' after 'extern'")
                .with_fix("Declare the foreign item as an extern fn, extern let, or extern type.")),
        }
    }

    fn parse_contract(&mut self) -> ParseResult<NodeId> {
        let start = self.peek_span();
        self.expect(Token::Contract)?;
        let name = self.expect_ident()?;
        self.expect(Token::LBrace)?;
        let mut items = Vec::new();
        while !self.check(&Token::RBrace) && !self.is_at_end() {
            items.push(self.parse_fn_signature(NodeKind::FnDecl, Some(&name))?);
        }
        self.expect(Token::RBrace)?;

        let span = self.span_from(start);
        let name_id = self.arena.intern(&name);
        let items_slot = self.seq_slot(items);
        Ok(self.arena.add(NodeKind::ContractDecl, span, &[Slot::Str(name_id), items_slot]))
    }

    fn parse_object(&mut self) -> ParseResult<NodeId> {
        let start = self.peek_span();
        self.expect(Token::Object)?;
        let name = self.expect_ident()?;
        if self.check(&Token::Lt) {
            self.skip_generic_params()?;
        }
        self.expect(Token::LBrace)?;
        let mut members = Vec::new();
        while !self.check(&Token::RBrace) && !self.is_at_end() {
            let member_start = self.peek_span();
            self.expect(Token::In)?;
            self.expect(Token::Let)?;
            let member_name = self.expect_ident()?;
            self.expect(Token::Colon)?;
            let member_type = self.parse_type()?;
            self.expect(Token::Semi)?;
            let member_span = self.span_from(member_start);
            let member_id = self.arena.intern(&member_name);
            members.push(self.arena.add(
                NodeKind::Field,
                member_span,
                &[Slot::Str(member_id), Slot::Node(member_type)],
            ));
        }
        self.expect(Token::RBrace)?;

        let span = self.span_from(start);
        let name_id = self.arena.intern(&name);
        let members_slot = self.seq_slot(members);
        Ok(self.arena.add(NodeKind::ObjectDecl, span, &[Slot::Str(name_id), members_slot]))
    }

    fn parse_into(&mut self) -> ParseResult<NodeId> {
        let start = self.peek_span();
        self.expect(Token::Into)?;
        let name = self.expect_ident()?;
        self.expect(Token::Semi)?;
        let span = self.span_from(start);
        let name_id = self.arena.intern(&name);
        Ok(self.arena.add(NodeKind::IntoStmt, span, &[Slot::Str(name_id)]))
    }

    /// Lifetime region: lifetime a, b { ... }
    fn parse_lifetime(&mut self) -> ParseResult<NodeId> {
        let start = self.peek_span();
        self.expect(Token::Lifetime)?;
        let mut names = Vec::new();
        loop {
            let span = self.peek_span();
            let name = self.expect_ident()?;
            let name_id = self.arena.intern(&name);
            names.push(self.arena.add(NodeKind::Ident, span, &[Slot::Str(name_id)]));
            if !self.check(&Token::Comma) {
                break;
            }
            self.advance();
        }
        let body = self.parse_block()?;

        let span = self.span_from(start);
        let names_slot = self.seq_slot(names);
        Ok(self.arena.add(NodeKind::LifetimeStmt, span, &[names_slot, Slot::Node(body)]))
    }

    fn parse_return(&mut self) -> ParseResult<NodeId> {
        let start = self.peek_span();
        self.expect(Token::Return)?;
        let value = if self.check(&Token::Semi) {
            None
        } else {
            Some(self.parse_expression(0)?)
        };
        self.expect(Token::Semi)?;
        let span = self.span_from(start);
        Ok(self.arena.add(NodeKind::ReturnStmt, span, &[opt(value)]))
    }

    fn parse_while(&mut self) -> ParseResult<NodeId> {
        let start = self.peek_span();
        self.expect(Token::While)?;
        self.expect(Token::LParen)?;
        let cond = self.parse_expression(0)?;
        self.expect(Token::RParen)?;
        let body = self.parse_block()?;
        let span = self.span_from(start);
        Ok(self.arena.add(NodeKind::WhileStmt, span, &[Slot::Node(cond), Slot::Node(body)]))
    }

    /// Range loop: for (i in start .. end) { ... }
    fn parse_for(&mut self) -> ParseResult<NodeId> {
        let start = self.peek_span();
        self.expect(Token::For)?;
        self.expect(Token::LParen)?;
        let iterator = self.expect_ident()?;
        self.expect(Token::In)?;
        let range_start = self.parse_expression(0)?;
        self.expect(Token::DotDot)?;
        let range_end = self.parse_expression(0)?;
        self.expect(Token::RParen)?;
        let body = self.parse_block()?;

        let span = self.span_from(start);
        let iterator_id = self.arena.intern(&iterator);
        Ok(self.arena.add(
            NodeKind::ForStmt,
            span,
            &[Slot::Str(iterator_id), Slot::Node(range_start), Slot::Node(range_end), Slot::Node(body)],
        ))
    }

    fn parse_loop(&mut self) -> ParseResult<NodeId> {
        let start = self.peek_span();
        self.expect(Token::Loop)?;
        let body = self.parse_block()?;
        let span = self.span_from(start);
        Ok(self.arena.add(NodeKind::LoopStmt, span, &[Slot::Node(body)]))
    }

    // === Types ===

    fn parse_type(&mut self) -> ParseResult<NodeId> {
        let mut ty = self.parse_type_core()?;
        while self.check(&Token::Pipe) || self.check(&Token::PipeGt) {
            let extract = self.check(&Token::PipeGt);
            self.advance();
            let right = self.parse_type()?;
            let span = Span::new(self.arena.span(ty).start, self.arena.span(right).end);
            ty = self.arena.add(
                NodeKind::UnionType,
                span,
                &[Slot::Node(ty), Slot::Node(right), flag(extract)],
            );
        }
        Ok(ty)
    }

    fn parse_type_core(&mut self) -> ParseResult<NodeId> {
        let start = self.peek_span();

        // Pointer: *t mut I32 (lifetime and mutability both optional)
        if self.check(&Token::Star) {
            self.advance();
            let mut lifetime = None;
            if let Token::Ident(name) = self.peek().clone() {
                let next = self.peek_at(1).clone();
                if Self::can_start_type(&next) || matches!(next, Token::Mut | Token::Move) {
                    self.advance();
                    lifetime = Some(name);
                }
            }
            let mut mutable = false;
            let mut moving = false;
            if self.check(&Token::Mut) {
                self.advance();
                mutable = true;
            } else if self.check(&Token::Move) {
                self.advance();
                moving = true;
            }
            let inner = self.parse_type_core()?;
            let span = self.span_from(start);
            let lifetime_slot = match lifetime {
                Some(name) => Slot::Str(self.arena.intern(&name)),
                None => Slot::None,
            };
            return Ok(self.arena.add(
                NodeKind::PointerType,
                span,
                &[Slot::Node(inner), flag(mutable), flag(moving), lifetime_slot],
            ));
        }

        // Array: [T] or [T; init; total]
        if self.check(&Token::LBracket) {
            self.advance();
            let element = self.parse_type()?;
            let mut init = None;
            let mut total = None;
            if self.check(&Token::Semi) {
                self.advance();
                init = Some(self.parse_expression(0)?);
                self.expect(Token::Semi)?;
                total = Some(self.parse_expression(0)?);
            }
            self.expect(Token::RBracket)?;
            let span = self.span_from(start);
            return Ok(self.arena.add(
                NodeKind::ArrayType,
                span,
                &[Slot::Node(element), opt(init), opt(total)],
            ));
        }

        // Tuple: (A, B); becomes a function type when followed by =>
        if self.check(&Token::LParen) {
            self.advance();
            let mut members = Vec::new();
            while !self.check(&Token::RParen) && !self.is_at_end() {
                members.push(self.parse_type()?);
                if !self.check(&Token::RParen) {
                    self.expect(Token::Comma)?;
                }
            }
            self.expect(Token::RParen)?;
            if self.check(&Token::FatArrow) {
                self.advance();
                let ret = self.parse_type()?;
                let span = self.span_from(start);
                let params_slot = self.seq_slot(members);
                return Ok(self.arena.add(
                    NodeKind::FunctionType,
                    span,
                    &[params_slot, Slot::Node(ret)],
                ));
            }
            let span = self.span_from(start);
            let members_slot = self.seq_slot(members);
            return Ok(self.arena.add(NodeKind::TupleType, span, &[members_slot]));
        }

        // Suffixed numeric sentinel: 0USize desugars to USize == 0
        if let Token::IntLiteral(lit) = self.peek().clone() {
            let span = self.peek_span();
            self.advance();
            let suffix = match lit.suffix {
                Some(suffix) => suffix,
                None => {
                    return Err(Diagnostic::new(
                        ErrorCode::ParseInvalidNumericTypeLiteral,
                        format!(
                            "Numeric literal '{}' needs a type suffix to act as a type-level numeric sentinel",
                            lit.value
                        ),
                    )
                    .with_fix("Suffix the literal with its carrier type, as in 0USize.")
                    .with_span(span));
                }
            };
            let base_id = self.arena.intern(&suffix);
            let base = self.arena.add(NodeKind::NamedType, span, &[Slot::Str(base_id)]);
            let suffix_id = self.arena.intern(&suffix);
            let value = self.arena.add(
                NodeKind::NumberLit,
                span,
                &[Slot::Int(lit.value), Slot::Str(suffix_id)],
            );
            let op_id = self.arena.intern("==");
            return Ok(self.arena.add(
                NodeKind::RefinementType,
                span,
                &[Slot::Node(base), Slot::Str(op_id), Slot::Node(value)],
            ));
        }

        // Named type with :: path segments, generic args, and refinement
        if !matches!(self.peek(), Token::Ident(_)) {
            return Err(self.expected("Expected type name"));
        }
        let mut name = self.expect_ident()?;
        while self.check(&Token::ColonColon) {
            self.advance();
            let part = self.expect_ident()?;
            name.push_str("::");
            name.push_str(&part);
        }
        let mut generics = Vec::new();
        if self.check(&Token::Lt) && Self::can_start_type(self.peek_at(1)) {
            self.advance();
            while !self.check(&Token::Gt) && !self.is_at_end() {
                generics.push(self.parse_type()?);
                if !self.check(&Token::Gt) {
                    self.expect(Token::Comma)?;
                }
            }
            self.expect(Token::Gt)?;
        }
        let span = self.span_from(start);
        let name_id = self.arena.intern(&name);
        let generics_slot = self.seq_slot(generics);
        let mut ty = self.arena.add(NodeKind::NamedType, span, &[Slot::Str(name_id), generics_slot]);

        let refine_op = match self.peek() {
            Token::NotEq => Some("!="),
            Token::Lt => Some("<"),
            Token::Gt => Some(">"),
            Token::LtEq => Some("<="),
            Token::GtEq => Some(">="),
            _ => None,
        };
        if let Some(op) = refine_op {
            if Self::can_start_refinement_value(self.peek_at(1)) {
                self.advance();
                let value = self.parse_expression(0)?;
                let span = self.span_from(start);
                let op_id = self.arena.intern(op);
                ty = self.arena.add(
                    NodeKind::RefinementType,
                    span,
                    &[Slot::Node(ty), Slot::Str(op_id), Slot::Node(value)],
                );
            }
        }
        Ok(ty)
    }

    fn can_start_type(tok: &Token) -> bool {
        matches!(
            tok,
            Token::Ident(_) | Token::Star | Token::LBracket | Token::LParen | Token::IntLiteral(_)
        )
    }

    fn can_start_refinement_value(tok: &Token) -> bool {
        matches!(
            tok,
            Token::IntLiteral(_)
                | Token::FloatLiteral(_)
                | Token::StringLiteral(_)
                | Token::CharLiteral(_)
                | Token::Ident(_)
                | Token::True
                | Token::False
                | Token::LParen
                | Token::Minus
                | Token::Not
        )
    }

    // === Patterns ===

    fn parse_pattern(&mut self) -> ParseResult<NodeId> {
        let start = self.peek_span();
        match self.peek().clone() {
            Token::Ident(name) if name == "_" => {
                self.advance();
                Ok(self.arena.add(NodeKind::WildcardPat, start, &[]))
            }
            Token::IntLiteral(lit) => {
                self.advance();
                let suffix_slot = match lit.suffix {
                    Some(suffix) => Slot::Str(self.arena.intern(&suffix)),
                    None => Slot::None,
                };
                let literal = self.arena.add(
                    NodeKind::NumberLit,
                    start,
                    &[Slot::Int(lit.value), suffix_slot],
                );
                Ok(self.arena.add(NodeKind::LiteralPat, start, &[Slot::Node(literal)]))
            }
            Token::True | Token::False => {
                let value = matches!(self.peek(), Token::True);
                self.advance();
                let literal = self.arena.add(NodeKind::BoolLit, start, &[Slot::Int(value as i64)]);
                Ok(self.arena.add(NodeKind::LiteralPat, start, &[Slot::Node(literal)]))
            }
            Token::StringLiteral(text) => {
                self.advance();
                let text_id = self.arena.intern(&text);
                let literal = self.arena.add(NodeKind::StringLit, start, &[Slot::Str(text_id)]);
                Ok(self.arena.add(NodeKind::LiteralPat, start, &[Slot::Node(literal)]))
            }
            Token::Ident(name) => {
                self.advance();
                if self.check(&Token::Lt) && Self::can_start_type(self.peek_at(1)) {
                    self.skip_generic_args()?;
                }
                let name_id = self.arena.intern(&name);
                if self.check(&Token::LBrace) {
                    self.advance();
                    let mut fields = Vec::new();
                    while !self.check(&Token::RBrace) && !self.is_at_end() {
                        let field_span = self.peek_span();
                        let field = self.expect_ident()?;
                        let field_id = self.arena.intern(&field);
                        fields.push(self.arena.add(
                            NodeKind::PatField,
                            field_span,
                            &[Slot::Str(field_id)],
                        ));
                        if !self.check(&Token::RBrace) {
                            self.expect(Token::Comma)?;
                        }
                    }
                    self.expect(Token::RBrace)?;
                    let span = self.span_from(start);
                    let fields_slot = self.seq_slot(fields);
                    return Ok(self.arena.add(
                        NodeKind::StructPat,
                        span,
                        &[Slot::Str(name_id), fields_slot],
                    ));
                }
                Ok(self.arena.add(NodeKind::NamePat, start, &[Slot::Str(name_id)]))
            }
            _ => Err(self.expected("Expected pattern")),
        }
    }

    // === Expressions ===

    fn parse_expression(&mut self, min_prec: u8) -> ParseResult<NodeId> {
        let mut left = self.parse_unary()?;
        while let Some((op, prec)) = self.peek_binop() {
            if prec < min_prec {
                break;
            }
            self.advance();
            if op == "is" {
                let pattern = self.parse_pattern()?;
                let span = Span::new(self.arena.span(left).start, self.prev_end());
                left = self.arena.add(
                    NodeKind::IsExpr,
                    span,
                    &[Slot::Node(left), Slot::Node(pattern)],
                );
            } else {
                let right = self.parse_expression(prec + 1)?;
                let span = Span::new(self.arena.span(left).start, self.arena.span(right).end);
                let op_id = self.arena.intern(op);
                left = self.arena.add(
                    NodeKind::Binary,
                    span,
                    &[Slot::Str(op_id), Slot::Node(left), Slot::Node(right)],
                );
            }
        }
        if self.check(&Token::Question) {
            let end = self.peek_span().end;
            self.advance();
            let span = Span::new(self.arena.span(left).start, end);
            left = self.arena.add(NodeKind::UnwrapExpr, span, &[Slot::Node(left)]);
        }
        Ok(left)
    }

    fn peek_binop(&self) -> Option<(&'static str, u8)> {
        match self.peek() {
            Token::OrOr => Some(("||", 1)),
            Token::AndAnd => Some(("&&", 2)),
            Token::EqEq => Some(("==", 3)),
            Token::NotEq => Some(("!=", 3)),
            Token::Lt => Some(("<", 4)),
            Token::LtEq => Some(("<=", 4)),
            Token::Gt => Some((">", 4)),
            Token::GtEq => Some((">=", 4)),
            Token::Is => Some(("is", 4)),
            Token::Plus => Some(("+", 5)),
            Token::Minus => Some(("-", 5)),
            Token::Star => Some(("*", 6)),
            Token::Slash => Some(("/", 6)),
            Token::Percent => Some(("%", 6)),
            _ => None,
        }
    }

    fn parse_unary(&mut self) -> ParseResult<NodeId> {
        let start = self.peek_span();
        let op = match self.peek() {
            Token::Not => "!",
            Token::Minus => "-",
            Token::Amp => "&",
            _ => return self.parse_primary(),
        };
        self.advance();
        let op = if op == "&" && self.check(&Token::Mut) {
            self.advance();
            "&mut"
        } else {
            op
        };
        let inner = self.parse_unary()?;
        let span = Span::new(start.start, self.arena.span(inner).end);
        let op_id = self.arena.intern(op);
        Ok(self.arena.add(NodeKind::Unary, span, &[Slot::Str(op_id), Slot::Node(inner)]))
    }

    fn parse_primary(&mut self) -> ParseResult<NodeId> {
        let start = self.peek_span();
        match self.peek().clone() {
            Token::IntLiteral(lit) => {
                self.advance();
                let suffix_slot = match lit.suffix {
                    Some(suffix) => Slot::Str(self.arena.intern(&suffix)),
                    None => Slot::None,
                };
                let node = self.arena.add(
                    NodeKind::NumberLit,
                    start,
                    &[Slot::Int(lit.value), suffix_slot],
                );
                self.parse_postfix(node)
            }
            Token::FloatLiteral(value) => {
                self.advance();
                let node = self.arena.add(
                    NodeKind::NumberLit,
                    start,
                    &[Slot::Int(value.to_bits() as i64), Slot::None, Slot::Int(1)],
                );
                self.parse_postfix(node)
            }
            Token::True | Token::False => {
                let value = matches!(self.peek(), Token::True);
                self.advance();
                let node = self.arena.add(NodeKind::BoolLit, start, &[Slot::Int(value as i64)]);
                self.parse_postfix(node)
            }
            Token::StringLiteral(text) => {
                self.advance();
                let text_id = self.arena.intern(&text);
                let node = self.arena.add(NodeKind::StringLit, start, &[Slot::Str(text_id)]);
                self.parse_postfix(node)
            }
            Token::CharLiteral(c) => {
                self.advance();
                let node = self.arena.add(NodeKind::CharLit, start, &[Slot::Int(c as i64)]);
                self.parse_postfix(node)
            }
            Token::LParen => {
                if self.lambda_ahead() {
                    return self.parse_lambda();
                }
                self.advance();
                let expr = self.parse_expression(0)?;
                self.expect(Token::RParen)?;
                self.parse_postfix(expr)
            }
            Token::If => {
                self.advance();
                self.expect(Token::LParen)?;
                let cond = self.parse_expression(0)?;
                self.expect(Token::RParen)?;
                let then_branch = if self.check(&Token::LBrace) {
                    self.parse_block()?
                } else {
                    self.parse_expression(0)?
                };
                let else_branch = if self.check(&Token::Else) {
                    self.advance();
                    if self.check(&Token::LBrace) {
                        Some(self.parse_block()?)
                    } else {
                        Some(self.parse_expression(0)?)
                    }
                } else {
                    None
                };
                let span = self.span_from(start);
                let node = self.arena.add(
                    NodeKind::IfExpr,
                    span,
                    &[Slot::Node(cond), Slot::Node(then_branch), opt(else_branch)],
                );
                self.parse_postfix(node)
            }
            Token::Match => {
                self.advance();
                self.expect(Token::LParen)?;
                let scrutinee = self.parse_expression(0)?;
                self.expect(Token::RParen)?;
                self.expect(Token::LBrace)?;
                let mut arms = Vec::new();
                while !self.check(&Token::RBrace) && !self.is_at_end() {
                    let arm_start = self.peek_span();
                    self.expect(Token::Case)?;
                    let pattern = self.parse_pattern()?;
                    self.expect(Token::Eq)?;
                    let body = if self.check(&Token::LBrace) {
                        self.parse_block()?
                    } else {
                        self.parse_expression(0)?
                    };
                    self.expect(Token::Semi)?;
                    let arm_span = self.span_from(arm_start);
                    arms.push(self.arena.add(
                        NodeKind::MatchArm,
                        arm_span,
                        &[Slot::Node(pattern), Slot::Node(body)],
                    ));
                }
                self.expect(Token::RBrace)?;
                let span = self.span_from(start);
                let arms_slot = self.seq_slot(arms);
                let node = self.arena.add(
                    NodeKind::MatchExpr,
                    span,
                    &[Slot::Node(scrutinee), arms_slot],
                );
                self.parse_postfix(node)
            }
            Token::Fn => self.parse_fn_expr(),
            Token::Ident(name) => {
                self.advance();
                // Explicit call-site generics are accepted and discarded;
                // binding is driven by argument types downstream.
                if self.check(&Token::Lt) && self.generic_args_ahead() {
                    self.skip_generic_args()?;
                }
                let name_id = self.arena.intern(&name);
                let mut expr = self.arena.add(NodeKind::Ident, start, &[Slot::Str(name_id)]);
                if self.check(&Token::LBrace) {
                    self.advance();
                    let mut fields = Vec::new();
                    while !self.check(&Token::RBrace) && !self.is_at_end() {
                        let field_start = self.peek_span();
                        let key = self.expect_ident()?;
                        self.expect(Token::Colon)?;
                        let value = self.parse_expression(0)?;
                        let field_span = self.span_from(field_start);
                        let key_id = self.arena.intern(&key);
                        fields.push(self.arena.add(
                            NodeKind::FieldInit,
                            field_span,
                            &[Slot::Str(key_id), Slot::Node(value)],
                        ));
                        if !self.check(&Token::RBrace) {
                            self.expect(Token::Comma)?;
                        }
                    }
                    self.expect(Token::RBrace)?;
                    let span = self.span_from(start);
                    let fields_slot = self.seq_slot(fields);
                    expr = self.arena.add(
                        NodeKind::StructInit,
                        span,
                        &[Slot::Str(name_id), fields_slot],
                    );
                }
                self.parse_postfix(expr)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn parse_postfix(&mut self, base: NodeId) -> ParseResult<NodeId> {
        let mut expr = base;
        loop {
            if self.check(&Token::LParen) {
                self.advance();
                let mut args = Vec::new();
                while !self.check(&Token::RParen) && !self.is_at_end() {
                    args.push(self.parse_expression(0)?);
                    if !self.check(&Token::RParen) {
                        self.expect(Token::Comma)?;
                    }
                }
                let close = self.expect(Token::RParen)?;
                expr = self.finish_call(expr, args, close.span.end);
                continue;
            }
            if self.check(&Token::Dot) {
                self.advance();
                let prop_span = self.peek_span();
                let prop = self.expect_ident()?;
                let span = Span::new(self.arena.span(expr).start, prop_span.end);
                let prop_id = self.arena.intern(&prop);
                expr = self.arena.add(
                    NodeKind::Member,
                    span,
                    &[Slot::Node(expr), Slot::Str(prop_id)],
                );
                continue;
            }
            if self.check(&Token::LBracket) {
                self.advance();
                let index = self.parse_expression(0)?;
                let close = self.expect(Token::RBracket)?;
                let span = Span::new(self.arena.span(expr).start, close.span.end);
                expr = self.arena.add(
                    NodeKind::Index,
                    span,
                    &[Slot::Node(expr), Slot::Node(index)],
                );
                continue;
            }
            break;
        }
        Ok(expr)
    }

    fn finish_call(&mut self, callee: NodeId, args: Vec<NodeId>, end: usize) -> NodeId {
        let span = Span::new(self.arena.span(callee).start, end);
        // Receiver-call sugar: value.method(a, b) => method(value, a, b)
        if self.arena.kind(callee) == NodeKind::Member {
            let receiver = self.arena.node(callee, 1);
            let prop = self.arena.slot(callee, 2);
            let callee_span = self.arena.span(callee);
            let fn_ident = self.arena.add(NodeKind::Ident, callee_span, &[prop]);
            let mut full = Vec::with_capacity(args.len() + 1);
            if let Some(receiver) = receiver {
                full.push(receiver);
            }
            full.extend(args);
            let args_slot = self.seq_slot(full);
            return self.arena.add(
                NodeKind::Call,
                span,
                &[Slot::Node(fn_ident), args_slot, flag(true)],
            );
        }
        let args_slot = self.seq_slot(args);
        self.arena.add(NodeKind::Call, span, &[Slot::Node(callee), args_slot])
    }

    /// Anonymous function: (a : I32, b) => body
    fn parse_lambda(&mut self) -> ParseResult<NodeId> {
        let start = self.peek_span();
        let params = self.parse_param_list(None)?;
        self.expect(Token::FatArrow)?;
        let body = if self.check(&Token::LBrace) {
            self.parse_block()?
        } else {
            self.parse_expression(0)?
        };
        let span = self.span_from(start);
        let params_slot = self.seq_slot(params);
        Ok(self.arena.add(NodeKind::Lambda, span, &[params_slot, Slot::Node(body)]))
    }

    /// Named function expression: fn helper(a : I32) : I32 => a
    fn parse_fn_expr(&mut self) -> ParseResult<NodeId> {
        let start = self.peek_span();
        self.expect(Token::Fn)?;
        let name = self.expect_ident()?;
        let params = self.parse_param_list(None)?;
        let ret = if self.check(&Token::Colon) {
            self.advance();
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(Token::FatArrow)?;
        let body = if self.check(&Token::LBrace) {
            self.parse_block()?
        } else {
            self.parse_expression(0)?
        };
        let span = self.span_from(start);
        let name_id = self.arena.intern(&name);
        let params_slot = self.seq_slot(params);
        Ok(self.arena.add(
            NodeKind::FnExpr,
            span,
            &[Slot::Str(name_id), params_slot, opt(ret), Slot::Node(body)],
        ))
    }

    /// Lookahead from '(': a parenthesized token run followed by '=>' is a
    /// lambda parameter list, not a grouped expression.
    fn lambda_ahead(&self) -> bool {
        let mut depth = 0usize;
        let mut i = self.pos;
        while i < self.tokens.len() {
            match &self.tokens[i].token {
                Token::LParen => depth += 1,
                Token::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return matches!(
                            self.tokens.get(i + 1).map(|t| &t.token),
                            Some(Token::FatArrow)
                        );
                    }
                }
                Token::Eof => return false,
                _ => {}
            }
            i += 1;
        }
        false
    }

    /// Lookahead from '<' after an identifier: a balanced run of type-shaped
    /// tokens closed by '>' and followed by a call or initializer is a generic
    /// argument list; anything else is a comparison.
    fn generic_args_ahead(&self) -> bool {
        let mut depth = 0usize;
        let mut i = self.pos;
        while i < self.tokens.len() {
            match &self.tokens[i].token {
                Token::Lt => depth += 1,
                Token::Gt => {
                    depth -= 1;
                    if depth == 0 {
                        return matches!(
                            self.tokens.get(i + 1).map(|t| &t.token),
                            Some(Token::LParen) | Some(Token::LBrace)
                        );
                    }
                }
                Token::Ident(_)
                | Token::IntLiteral(_)
                | Token::Comma
                | Token::Star
                | Token::LBracket
                | Token::RBracket
                | Token::LParen
                | Token::RParen
                | Token::ColonColon
                | Token::Pipe
                | Token::PipeGt
                | Token::FatArrow
                | Token::Semi
                | Token::Mut
                | Token::Move => {}
                _ => return false,
            }
            i += 1;
        }
        false
    }

    fn skip_generic_args(&mut self) -> ParseResult<()> {
        self.expect(Token::Lt)?;
        while !self.check(&Token::Gt) && !self.is_at_end() {
            self.parse_type()?;
            if !self.check(&Token::Gt) {
                self.expect(Token::Comma)?;
            }
        }
        self.expect(Token::Gt)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> (Arena, NodeId) {
        Parser::parse(source).unwrap()
    }

    fn first_stmt(arena: &Arena, root: NodeId) -> NodeId {
        arena.seq(root, 1)[0]
    }

    #[test]
    fn test_parse_fn_decl() {
        let (arena, root) = parse("fn add(a : I32, b : I32) : I32 => a + b;");
        let decl = first_stmt(&arena, root);
        assert_eq!(
            arena.dump(decl),
            "FnDecl('add', [Param('a', NamedType('I32')), Param('b', NamedType('I32'))], \
             NamedType('I32'), Binary('+', Ident('a'), Ident('b')))"
        );
    }

    #[test]
    fn test_if_statement_vs_expression() {
        let (arena, root) = parse("if (1 > 0) { return 1; } if (1 > 0) 2 else 3;");
        let stmts = arena.seq(root, 1);
        assert_eq!(arena.kind(stmts[0]), NodeKind::IfStmt);
        assert_eq!(
            arena.dump(stmts[1]),
            "ExprStmt(IfExpr(Binary('>', NumberLit(1), NumberLit(0)), NumberLit(2), NumberLit(3)))"
        );
    }

    #[test]
    fn test_receiver_call_sugar() {
        let (arena, root) = parse("items.push(3);");
        let stmt = first_stmt(&arena, root);
        assert_eq!(
            arena.dump(stmt),
            "ExprStmt(Call(Ident('push'), [Ident('items'), NumberLit(3)], 1))"
        );
    }

    #[test]
    fn test_trailing_unwrap_binds_tight() {
        let (arena, root) = parse("let r = head(xs)?;");
        let stmt = first_stmt(&arena, root);
        assert_eq!(
            arena.dump(stmt),
            "LetDecl('r', UnwrapExpr(Call(Ident('head'), [Ident('xs')])))"
        );
    }

    #[test]
    fn test_nullable_pointer_type_shape() {
        let (arena, root) = parse("extern let p : *I32 | 0USize;");
        let decl = first_stmt(&arena, root);
        assert_eq!(
            arena.dump(decl),
            "ExternLetDecl('p', UnionType(PointerType(NamedType('I32')), \
             RefinementType(NamedType('USize'), '==', NumberLit(0, 'USize'))))"
        );
    }

    #[test]
    fn test_pointer_modifiers_and_lifetime() {
        let (arena, root) = parse("lifetime t { extern let s : *t mut Str; }");
        let stmt = first_stmt(&arena, root);
        assert_eq!(arena.kind(stmt), NodeKind::LifetimeStmt);
        let block = arena.node(stmt, 2).unwrap();
        let decl = arena.seq(block, 1)[0];
        assert_eq!(
            arena.dump(decl),
            "ExternLetDecl('s', PointerType(NamedType('Str'), 1, 't'))"
        );
    }

    #[test]
    fn test_match_expression() {
        let (arena, root) =
            parse("let v = match (x) { case Some { value } = value; case None = 0; };");
        let stmt = first_stmt(&arena, root);
        assert_eq!(
            arena.dump(stmt),
            "LetDecl('v', MatchExpr(Ident('x'), [MatchArm(StructPat('Some', [PatField('value')]), \
             Ident('value')), MatchArm(NamePat('None'), NumberLit(0))]))"
        );
    }

    #[test]
    fn test_is_expression_parses_pattern() {
        let (arena, root) = parse("let b = v is Some { value };");
        let stmt = first_stmt(&arena, root);
        assert_eq!(
            arena.dump(stmt),
            "LetDecl('b', IsExpr(Ident('v'), StructPat('Some', [PatField('value')])))"
        );
    }

    #[test]
    fn test_lambda_and_fn_expr() {
        let (arena, root) = parse("let f = (v : I32) => v + 3; let g = fn get() : I32 => 100;");
        let stmts = arena.seq(root, 1);
        assert_eq!(
            arena.dump(stmts[0]),
            "LetDecl('f', Lambda([Param('v', NamedType('I32'))], Binary('+', Ident('v'), NumberLit(3))))"
        );
        assert_eq!(
            arena.dump(stmts[1]),
            "LetDecl('g', FnExpr('get', NamedType('I32'), NumberLit(100)))"
        );
    }

    #[test]
    fn test_copy_struct_and_destructor_alias() {
        let (arena, root) =
            parse("copy struct Vec2 { x : F32, y : F32 } type DbHandle = USize then close_db;");
        let stmts = arena.seq(root, 1);
        assert_eq!(
            arena.dump(stmts[0]),
            "StructDecl('Vec2', [Field('x', NamedType('F32')), Field('y', NamedType('F32'))], 1)"
        );
        assert_eq!(
            arena.dump(stmts[1]),
            "TypeAlias('DbHandle', NamedType('USize'), 'close_db')"
        );
    }

    #[test]
    fn test_contract_with_receiver_shorthand() {
        let (arena, root) = parse("contract HasLen { fn len(*this) : I32; }");
        let decl = first_stmt(&arena, root);
        assert_eq!(
            arena.dump(decl),
            "ContractDecl('HasLen', [FnDecl('len', [Param('this', PointerType(NamedType('HasLen')))], \
             NamedType('I32'))])"
        );
    }

    #[test]
    fn test_object_and_into() {
        let (arena, root) = parse("object Wrapper { in let x : I32; } into HasLen;");
        let stmts = arena.seq(root, 1);
        assert_eq!(
            arena.dump(stmts[0]),
            "ObjectDecl('Wrapper', [Field('x', NamedType('I32'))])"
        );
        assert_eq!(arena.dump(stmts[1]), "IntoStmt('HasLen')");
    }

    #[test]
    fn test_expect_actual_pair() {
        let (arena, root) = parse("expect fn now() : I64; actual fn now() : I64 => host_now();");
        let stmts = arena.seq(root, 1);
        assert_eq!(arena.dump(stmts[0]), "ExpectFnDecl('now', NamedType('I64'))");
        assert_eq!(
            arena.dump(stmts[1]),
            "ActualFnDecl('now', NamedType('I64'), Call(Ident('host_now')))"
        );
    }

    #[test]
    fn test_import_let_is_dropped() {
        let (arena, root) = parse("let { push, pop } = std::vec; let x = 1;");
        let stmts = arena.seq(root, 1);
        assert_eq!(stmts.len(), 1);
        assert_eq!(arena.dump(stmts[0]), "LetDecl('x', NumberLit(1))");
    }

    #[test]
    fn test_explicit_generic_call_is_discarded() {
        let (arena, root) = parse("let a = id<I32>(41); let cmp = a < b;");
        let stmts = arena.seq(root, 1);
        assert_eq!(arena.dump(stmts[0]), "LetDecl('a', Call(Ident('id'), [NumberLit(41)]))");
        assert_eq!(
            arena.dump(stmts[1]),
            "LetDecl('cmp', Binary('<', Ident('a'), Ident('b')))"
        );
    }

    #[test]
    fn test_for_and_loop() {
        let (arena, root) = parse("for (i in 0 .. 10) { } loop { break; }");
        let stmts = arena.seq(root, 1);
        assert_eq!(
            arena.dump(stmts[0]),
            "ForStmt('i', NumberLit(0), NumberLit(10), Block)"
        );
        assert_eq!(arena.dump(stmts[1]), "LoopStmt(Block([BreakStmt]))");
    }

    #[test]
    fn test_array_and_function_types() {
        let (arena, root) = parse("extern let buf : [I32; 4; 8]; extern let f : (I32) => I32;");
        let stmts = arena.seq(root, 1);
        assert_eq!(
            arena.dump(stmts[0]),
            "ExternLetDecl('buf', ArrayType(NamedType('I32'), NumberLit(4), NumberLit(8)))"
        );
        assert_eq!(
            arena.dump(stmts[1]),
            "ExternLetDecl('f', FunctionType([NamedType('I32')], NamedType('I32')))"
        );
    }

    #[test]
    fn test_refinement_type() {
        let (arena, root) = parse("fn half(n : I32 != 0) : I32 => 10 / n;");
        let decl = first_stmt(&arena, root);
        let params = arena.seq(decl, 3);
        assert_eq!(
            arena.dump(params[0]),
            "Param('n', RefinementType(NamedType('I32'), '!=', NumberLit(0)))"
        );
    }

    #[test]
    fn test_unsuffixed_numeric_type_literal_is_rejected() {
        let err = Parser::parse("let x : 5 = 5;").unwrap_err();
        assert_eq!(err.code, ErrorCode::ParseInvalidNumericTypeLiteral);
    }

    #[test]
    fn test_unexpected_token_error() {
        let err = Parser::parse("let x = ;").unwrap_err();
        assert_eq!(err.code, ErrorCode::ParseUnexpectedToken);
        assert!(!err.fix.is_empty());
    }

    #[test]
    fn test_missing_semicolon_error() {
        let err = Parser::parse("let x = 1").unwrap_err();
        assert_eq!(err.code, ErrorCode::ParseExpectedToken);
    }

    #[test]
    fn test_unterminated_string_classification() {
        let err = Parser::parse("let s = \"oops;").unwrap_err();
        assert_eq!(err.code, ErrorCode::LexUnterminatedString);
    }
}
