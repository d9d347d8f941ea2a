//! Front-end pipeline for Skarn
//!
//! Chains parsing, name resolution, refinement type checking, and the
//! move/borrow pass over a single source text, and renders the resulting
//! diagnostics as annotated snippets with ariadne.

use std::collections::HashSet;

use ariadne::{Color, Label, Report, ReportKind, Source};

use skarn_ast::{Arena, NodeId};
use skarn_borrowck::borrowcheck;
use skarn_parser::Parser;
use skarn_resolve::resolve_names;
use skarn_types::TypeChecker;

pub use skarn_diag::{Diagnostic, ErrorCode};
pub use skarn_resolve::ResolveInputs;
pub use skarn_types::TypeOptions;

pub type CheckResult<T> = Result<T, Diagnostic>;

/// Knobs for a full front-end run.
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// Extra names visible during resolution, for host-provided globals.
    pub resolve: ResolveInputs,
    /// Safety-proof strictness for the type checking pass.
    pub types: TypeOptions,
}

/// Facts the passes proved about an accepted program.
#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    /// Identifier denominators the division and modulo proofs established
    /// as non-zero. Backends may elide runtime zero checks for these.
    pub proven_nonzero: HashSet<String>,
}

/// Parse and check `source` with default options.
pub fn compile(source: &str) -> CheckResult<(Arena, NodeId, CheckReport)> {
    compile_with(source, &CheckOptions::default())
}

/// Parse `source` and run every checking pass over the result.
pub fn compile_with(
    source: &str,
    options: &CheckOptions,
) -> CheckResult<(Arena, NodeId, CheckReport)> {
    let (arena, root) = Parser::parse(source)?;
    let report = check_program(&arena, root, options)?;
    Ok((arena, root, report))
}

/// Run the checking passes over an already parsed program. Passes run in
/// dependency order and the first diagnostic stops the pipeline.
pub fn check_program(
    arena: &Arena,
    root: NodeId,
    options: &CheckOptions,
) -> CheckResult<CheckReport> {
    resolve_names(arena, root, &options.resolve)?;
    let mut types = TypeChecker::new(arena, &options.types);
    types.run(root)?;
    let proven_nonzero = types.into_proven_nonzero();
    borrowcheck(arena, root)?;
    Ok(CheckReport { proven_nonzero })
}

/// Render a diagnostic as an annotated source snippet. `path` is the name
/// shown for the source in the snippet header. Diagnostics without a span,
/// and rendering failures, fall back to a plain multi-line form.
pub fn render_diagnostic(source: &str, path: &str, diag: &Diagnostic) -> String {
    let span = match diag.span {
        Some(span) => span,
        None => return render_plain(diag),
    };
    let mut out = Vec::new();
    let result = Report::build(ReportKind::Error, path, span.start)
        .with_code(diag.code.as_str())
        .with_message(&diag.message)
        .with_label(
            Label::new((path, span.start..span.end))
                .with_message(&diag.reason)
                .with_color(Color::Red),
        )
        .with_help(&diag.fix)
        .finish()
        .write((path, Source::from(source)), &mut out);
    match result {
        Ok(()) => String::from_utf8_lossy(&out).into_owned(),
        Err(_) => render_plain(diag),
    }
}

fn render_plain(diag: &Diagnostic) -> String {
    format!(
        "[{}] {}\n  reason: {}\n  fix: {}",
        diag.code.as_str(),
        diag.message,
        diag.reason,
        diag.fix
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(source: &str) -> Diagnostic {
        match compile(source) {
            Ok(_) => panic!("expected a diagnostic for: {}", source),
            Err(err) => err,
        }
    }

    #[test]
    fn test_pipeline_accepts_well_formed_program() {
        let source = "fn add(a : I32, b : I32) : I32 => a + b;\n\
                      fn main() : I32 => add(1, 2);";
        assert!(compile(source).is_ok());
    }

    #[test]
    fn test_parse_failures_surface_as_diagnostics() {
        let err = rejected("fn broken( : I32;");
        assert!(err.code.as_str().starts_with("E_PARSE"));
        assert!(err.span.is_some());
    }

    #[test]
    fn test_resolution_runs_before_type_checking() {
        // Both an undefined name and a division hazard: resolution wins.
        let source = "fn f(x : I32) : I32 => 100 / x + missing;";
        let err = rejected(source);
        assert_eq!(err.code, ErrorCode::ResolveUnknownIdentifier);
    }

    #[test]
    fn test_type_checking_runs_before_borrow_checking() {
        // Both a division hazard and a use after move: the hazard wins.
        let source = "struct Res { v : I32 }\n\
                      fn f(x : I32) : I32 => {\n\
                        let r = Res { v : 1 };\n\
                        let a = r;\n\
                        let b = r;\n\
                        100 / x\n\
                      }";
        let err = rejected(source);
        assert_eq!(err.code, ErrorCode::SafetyDivByZero);
    }

    #[test]
    fn test_render_draws_annotated_snippet() {
        let source = "fn f(x : I32) : I32 => 100 / x;";
        let err = rejected(source);
        assert_eq!(err.code, ErrorCode::SafetyDivByZero);
        let rendered = render_diagnostic(source, "demo.skn", &err);
        assert!(rendered.contains("E_SAFETY_DIV_BY_ZERO"));
        assert!(rendered.contains("demo.skn"));
        assert!(rendered.contains(&err.message));
    }

    #[test]
    fn test_render_without_span_falls_back_to_plain_form() {
        let diag = Diagnostic::new(ErrorCode::Generic, "pipeline failure");
        let rendered = render_diagnostic("", "demo.skn", &diag);
        assert!(rendered.contains("E_GENERIC"));
        assert!(rendered.contains("pipeline failure"));
        assert!(rendered.contains("reason:"));
    }

    #[test]
    fn test_host_builtins_thread_through_options() {
        let mut options = CheckOptions::default();
        options.resolve.host_builtins.insert("print".to_string());
        let source = "fn main() : I32 => { print(1); 0 }";
        assert!(compile(source).is_err());
        assert!(compile_with(source, &options).is_ok());
    }
}
