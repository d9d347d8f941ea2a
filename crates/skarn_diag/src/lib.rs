use std::fmt;

use skarn_lexer::Span;

const FALLBACK_REASON: &str =
    "This violates the language rules or safety guarantees enforced by the compiler.";
const FALLBACK_FIX: &str =
    "Update the code near this location so it satisfies the expected syntax, typing, and safety constraints.";

/// Stable error codes. Every failure the compiler reports carries exactly
/// one of these; the rendered form is the `E_*` identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // === Lexing ===
    LexUnexpectedChar,
    LexUnterminatedString,
    LexUnterminatedChar,
    LexUnterminatedBlockComment,

    // === Parsing ===
    ParseExpectedToken,
    ParseUnexpectedToken,
    ParseInvalidNumericTypeLiteral,

    // === Name resolution ===
    ResolveUnknownIdentifier,
    ResolveUnknownStruct,
    ResolveShadowing,
    ResolveUndefinedLifetime,
    ResolveDuplicateLifetime,
    ExpectActualPairing,
    ExpectActualSignatureMismatch,

    // === Typechecking ===
    TypeMismatch,
    TypeArity,
    TypeOperator,
    TypeRefinementUnproven,
    TypeDestructorNotFound,
    TypeDestructorSignature,
    MatchNonExhaustive,
    SafetyDivByZero,
    SafetyModByZero,
    SafetyOverflow,
    SafetyNullablePointerGuard,
    SafetyArrayBounds,
    SafetyArrayBoundsUnproven,

    // === Borrow and move checking ===
    BorrowUseAfterMove,
    BorrowUseAfterDrop,
    BorrowMoveWhileBorrowed,
    BorrowImmutWhileMut,
    BorrowMutConflict,
    BorrowAssignWhileBorrowed,
    BorrowDoubleDrop,
    BorrowInvalidCopyAlias,
    BorrowInvalidTarget,
    BorrowDropMissingDestructor,

    // === Module loading boundary (raised by the loader, not these passes) ===
    ModuleCycle,
    ModuleImplicitImport,

    /// Failures with no more specific classification.
    Generic,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::LexUnexpectedChar => "E_LEX_UNEXPECTED_CHAR",
            ErrorCode::LexUnterminatedString => "E_LEX_UNTERMINATED_STRING",
            ErrorCode::LexUnterminatedChar => "E_LEX_UNTERMINATED_CHAR",
            ErrorCode::LexUnterminatedBlockComment => "E_LEX_UNTERMINATED_BLOCK_COMMENT",
            ErrorCode::ParseExpectedToken => "E_PARSE_EXPECTED_TOKEN",
            ErrorCode::ParseUnexpectedToken => "E_PARSE_UNEXPECTED_TOKEN",
            ErrorCode::ParseInvalidNumericTypeLiteral => "E_PARSE_INVALID_NUMERIC_TYPE_LITERAL",
            ErrorCode::ResolveUnknownIdentifier => "E_RESOLVE_UNKNOWN_IDENTIFIER",
            ErrorCode::ResolveUnknownStruct => "E_RESOLVE_UNKNOWN_STRUCT",
            ErrorCode::ResolveShadowing => "E_RESOLVE_SHADOWING",
            ErrorCode::ResolveUndefinedLifetime => "E_RESOLVE_UNDEFINED_LIFETIME",
            ErrorCode::ResolveDuplicateLifetime => "E_RESOLVE_DUPLICATE_LIFETIME",
            ErrorCode::ExpectActualPairing => "E_EXPECT_ACTUAL_PAIRING",
            ErrorCode::ExpectActualSignatureMismatch => "E_EXPECT_ACTUAL_SIGNATURE_MISMATCH",
            ErrorCode::TypeMismatch => "E_TYPE_MISMATCH",
            ErrorCode::TypeArity => "E_TYPE_ARITY",
            ErrorCode::TypeOperator => "E_TYPE_OPERATOR",
            ErrorCode::TypeRefinementUnproven => "E_TYPE_REFINEMENT_UNPROVEN",
            ErrorCode::TypeDestructorNotFound => "E_TYPE_DESTRUCTOR_NOT_FOUND",
            ErrorCode::TypeDestructorSignature => "E_TYPE_DESTRUCTOR_SIGNATURE",
            ErrorCode::MatchNonExhaustive => "E_MATCH_NON_EXHAUSTIVE",
            ErrorCode::SafetyDivByZero => "E_SAFETY_DIV_BY_ZERO",
            ErrorCode::SafetyModByZero => "E_SAFETY_MOD_BY_ZERO",
            ErrorCode::SafetyOverflow => "E_SAFETY_OVERFLOW",
            ErrorCode::SafetyNullablePointerGuard => "E_SAFETY_NULLABLE_POINTER_GUARD",
            ErrorCode::SafetyArrayBounds => "E_SAFETY_ARRAY_BOUNDS",
            ErrorCode::SafetyArrayBoundsUnproven => "E_SAFETY_ARRAY_BOUNDS_UNPROVEN",
            ErrorCode::BorrowUseAfterMove => "E_BORROW_USE_AFTER_MOVE",
            ErrorCode::BorrowUseAfterDrop => "E_BORROW_USE_AFTER_DROP",
            ErrorCode::BorrowMoveWhileBorrowed => "E_BORROW_MOVE_WHILE_BORROWED",
            ErrorCode::BorrowImmutWhileMut => "E_BORROW_IMMUT_WHILE_MUT",
            ErrorCode::BorrowMutConflict => "E_BORROW_MUT_CONFLICT",
            ErrorCode::BorrowAssignWhileBorrowed => "E_BORROW_ASSIGN_WHILE_BORROWED",
            ErrorCode::BorrowDoubleDrop => "E_BORROW_DOUBLE_DROP",
            ErrorCode::BorrowInvalidCopyAlias => "E_BORROW_INVALID_COPY_ALIAS",
            ErrorCode::BorrowInvalidTarget => "E_BORROW_INVALID_TARGET",
            ErrorCode::BorrowDropMissingDestructor => "E_BORROW_DROP_MISSING_DESTRUCTOR",
            ErrorCode::ModuleCycle => "E_MODULE_CYCLE",
            ErrorCode::ModuleImplicitImport => "E_MODULE_IMPLICIT_IMPORT",
            ErrorCode::Generic => "E_GENERIC",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single structured compile failure. Passes abort on the first one;
/// `reason` says why the construct is disallowed and `fix` gives an
/// actionable remediation hint, both falling back to generic wording when
/// the raise site has nothing more specific.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub message: String,
    pub reason: String,
    pub fix: String,
    pub span: Option<Span>,
}

impl Diagnostic {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            reason: FALLBACK_REASON.to_string(),
            fix: FALLBACK_FIX.to_string(),
            span: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.fix = fix.into();
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some(span) => write!(
                f,
                "[{}] {} @ {}..{}",
                self.code, self.message, span.start, span.end
            ),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

impl std::error::Error for Diagnostic {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_rendering_is_stable() {
        assert_eq!(ErrorCode::SafetyDivByZero.as_str(), "E_SAFETY_DIV_BY_ZERO");
        assert_eq!(
            ErrorCode::BorrowUseAfterMove.as_str(),
            "E_BORROW_USE_AFTER_MOVE"
        );
        assert_eq!(
            ErrorCode::ExpectActualSignatureMismatch.as_str(),
            "E_EXPECT_ACTUAL_SIGNATURE_MISMATCH"
        );
        assert_eq!(ErrorCode::Generic.as_str(), "E_GENERIC");
    }

    #[test]
    fn test_diagnostic_always_carries_reason_and_fix() {
        let diag = Diagnostic::new(ErrorCode::Generic, "type mismatch");
        assert!(!diag.reason.is_empty());
        assert!(!diag.fix.is_empty());

        let diag = diag
            .with_reason("expected I32, found Bool")
            .with_fix("change the declared type");
        assert_eq!(diag.reason, "expected I32, found Bool");
        assert_eq!(diag.fix, "change the declared type");
    }

    #[test]
    fn test_display_includes_code_and_span() {
        let diag =
            Diagnostic::new(ErrorCode::SafetyModByZero, "modulo by zero").with_span(Span::new(4, 9));
        assert_eq!(
            diag.to_string(),
            "[E_SAFETY_MOD_BY_ZERO] modulo by zero @ 4..9"
        );
    }
}
