//! End-to-end tests for the front-end pipeline.
//!
//! Every test feeds a complete source text through `compile` and asserts
//! on the exact diagnostic code, so these double as a regression net for
//! the pass ordering: resolution before type checking before the
//! move/borrow pass.

use skarn_driver::{compile, compile_with, CheckOptions, Diagnostic, ErrorCode};

fn accepts(source: &str) {
    if let Err(err) = compile(source) {
        panic!("expected acceptance, got {}", err);
    }
}

fn rejected(source: &str) -> Diagnostic {
    match compile(source) {
        Ok(_) => panic!("expected a diagnostic for: {}", source),
        Err(err) => err,
    }
}

fn rejects(source: &str, code: ErrorCode) {
    let err = rejected(source);
    assert_eq!(err.code, code, "unexpected diagnostic: {}", err);
}

#[test]
fn test_rejection_is_deterministic() {
    let source = "fn main() : I32 => missing;";
    let first = rejected(source);
    let second = rejected(source);
    assert_eq!(first.code, second.code);
    assert_eq!(first.message, second.message);
    assert_eq!(first.span, second.span);
}

#[test]
fn test_overflow_is_exact_on_literals_silent_on_unknowns() {
    rejects("fn f() : I32 => 2147483647 + 1;", ErrorCode::SafetyOverflow);
    accepts("fn f(x : I32) : I32 => x + 1;");
}

#[test]
fn test_division_requires_evidence() {
    rejects("fn f(x : I32) : I32 => 100 / x;", ErrorCode::SafetyDivByZero);
    accepts("fn f(x : I32 != 0) : I32 => 100 / x;");
    accepts("fn f(x : I32) : I32 => if (x == 0) { 0 } else { 100 / x };");
}

#[test]
fn test_moved_value_is_dead_until_reassigned() {
    let leaky = "struct Res { v : I32 }\n\
                 fn main() : Void => {\n\
                   let mut p = Res { v : 1 };\n\
                   let q = p;\n\
                   let r = p;\n\
                 }";
    rejects(leaky, ErrorCode::BorrowUseAfterMove);

    let revived = "struct Res { v : I32 }\n\
                   fn main() : Void => {\n\
                     let mut p = Res { v : 1 };\n\
                     let q = p;\n\
                     p = Res { v : 2 };\n\
                     let r = p;\n\
                   }";
    accepts(revived);
}

#[test]
fn test_borrow_exclusivity_in_both_directions() {
    let shared_over_mut = "fn main() : Void => {\n\
                             let mut x = 0;\n\
                             let w = &mut x;\n\
                             let r = &x;\n\
                           }";
    rejects(shared_over_mut, ErrorCode::BorrowImmutWhileMut);

    let mut_over_shared = "fn main() : Void => {\n\
                             let mut x = 0;\n\
                             let r = &x;\n\
                             let w = &mut x;\n\
                           }";
    rejects(mut_over_shared, ErrorCode::BorrowMutConflict);
}

#[test]
fn test_loans_are_released_at_scope_exit() {
    let source = "fn main() : Void => {\n\
                    let mut x = 0;\n\
                    {\n\
                      let w = &mut x;\n\
                    }\n\
                    let r = &x;\n\
                  }";
    accepts(source);
}

#[test]
fn test_match_exhaustiveness_over_generic_union() {
    let covered = "struct Some { value : I32 } struct None { }\n\
                   type Option<T> = Some<T> | None<T>;\n\
                   fn pick(o : Option<I32>) : I32 => match (o) {\n\
                     case Some { value } = value;\n\
                     case None = 0;\n\
                   };";
    accepts(covered);

    let missing = "struct Some { value : I32 } struct None { }\n\
                   type Option<T> = Some<T> | None<T>;\n\
                   fn pick(o : Option<I32>) : I32 => match (o) {\n\
                     case Some { value } = value;\n\
                   };";
    rejects(missing, ErrorCode::MatchNonExhaustive);

    let wildcard = "struct Some { value : I32 } struct None { }\n\
                    type Option<T> = Some<T> | None<T>;\n\
                    fn pick(o : Option<I32>) : I32 => match (o) {\n\
                      case Some { value } = value;\n\
                      case _ = 0;\n\
                    };";
    accepts(wildcard);
}

#[test]
fn test_destructor_lifecycle_end_to_end() {
    let use_after_drop = "type D = I32 then dtor;\n\
                          fn dtor(this : *move D) : Void => {}\n\
                          fn main() : I32 => {\n\
                            let x : D = 1;\n\
                            drop(x);\n\
                            let y : D = x;\n\
                            0\n\
                          }";
    rejects(use_after_drop, ErrorCode::BorrowUseAfterDrop);

    let double_drop = "type D = I32 then dtor;\n\
                       fn dtor(this : *move D) : Void => {}\n\
                       fn main() : I32 => {\n\
                         let x : D = 1;\n\
                         x.drop();\n\
                         drop(x);\n\
                         0\n\
                       }";
    rejects(double_drop, ErrorCode::BorrowDoubleDrop);
}

#[test]
fn test_nullable_pointer_requires_guard() {
    let unguarded = "fn read(p : *I32) : I32 => 0;\n\
                     fn f(q : *I32 | 0USize) : I32 => read(q);";
    rejects(unguarded, ErrorCode::SafetyNullablePointerGuard);

    let guarded = "fn read(p : *I32) : I32 => 0;\n\
                   fn f(q : *I32 | 0USize) : I32 => if (q != 0USize) { read(q) } else { 0 };";
    accepts(guarded);
}

#[test]
fn test_array_indexing_requires_bounds_proof() {
    rejects(
        "fn f(a : [I32; 8; 8], i : USize) : I32 => a[i];",
        ErrorCode::SafetyArrayBoundsUnproven,
    );
    rejects(
        "fn f(a : [I32; 8; 8]) : I32 => a[9];",
        ErrorCode::SafetyArrayBounds,
    );
    accepts("fn f(a : [I32; 8; 8], i : USize < 8) : I32 => a[i];");
}

#[test]
fn test_expect_fns_pair_with_matching_actuals() {
    rejects("expect fn now() : I64;", ErrorCode::ExpectActualPairing);
    rejects(
        "expect fn now() : I64;\n\
         actual fn now() : I32 => 1;",
        ErrorCode::ExpectActualSignatureMismatch,
    );
    accepts(
        "expect fn add(a : I32, b : I32) : I32;\n\
         actual fn add(x : I32, y : I32) : I32 => x + y;",
    );
}

#[test]
fn test_lifetime_annotations_need_an_active_region() {
    let scoped = "extern fn acquire() : *I32;\n\
                  fn main() : I32 => { lifetime a { let p : *a I32 = acquire(); } 0 }";
    accepts(scoped);

    let unscoped = "extern fn acquire() : *I32;\n\
                    fn main() : I32 => { let p : *a I32 = acquire(); 0 }";
    rejects(unscoped, ErrorCode::ResolveUndefinedLifetime);
}

#[test]
fn test_shadowing_is_rejected() {
    rejects(
        "fn main() : I32 => { let x = 1; let x = 2; x }",
        ErrorCode::ResolveShadowing,
    );
}

#[test]
fn test_copy_alias_gates_move_tracking() {
    let noncopy = "struct Handle { id : I32 }\n\
                   copy type H = Handle;";
    rejects(noncopy, ErrorCode::BorrowInvalidCopyAlias);

    let meters = "copy type Meters = I32;\n\
                  fn main() : Void => {\n\
                    let m : Meters = 5;\n\
                    let a = m;\n\
                    let b = m;\n\
                  }";
    accepts(meters);
}

#[test]
fn test_report_names_proven_nonzero_denominators() {
    let source = "fn f(d : I32 != 0) : I32 => 100 / d;";
    let (_, _, report) = compile(source).expect("refined denominator should be accepted");
    assert!(report.proven_nonzero.contains("d"));
}

#[test]
fn test_loader_globals_resolve_through_options() {
    let source = "fn main() : I32 => { vec_push(1); 0 }";
    rejects(source, ErrorCode::ResolveUnknownIdentifier);

    let mut options = CheckOptions::default();
    options.resolve.extra_globals.insert("vec_push".to_string());
    if let Err(err) = compile_with(source, &options) {
        panic!("expected acceptance, got {}", err);
    }
}
