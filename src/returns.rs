//! Return-path analysis
//!
//! A pure AST walk per function deciding `(contains_return,
//! all_paths_return)`. A function with a declared non-Void return type
//! must return on every path; one without a declared type must either
//! return on every path or on none. Statements after the point where
//! every path already returned are flagged unreachable.

use crate::ast::*;
use crate::errors::{CompilerError, CompilerWarning};

/// Check every function in the file, returning warnings and errors
pub fn check_file(file: &SplFile) -> (Vec<CompilerWarning>, Vec<CompilerError>) {
    let mut warnings = Vec::new();
    let mut errors = Vec::new();
    for decl in &file.declarations {
        let Decl::Fun(f) = decl else { continue };
        let (contains_return, all_return) = block_paths(&f.body, &mut warnings);
        match &f.signature {
            Some(sig) => {
                if matches!(sig.ret, ReturnTypeExpr::Void(_)) {
                    // missing returns are fine for Void; typing checks the rest
                    continue;
                }
                if !all_return {
                    errors.push(CompilerError::NotAllPathsReturn {
                        name: f.name.name.clone(),
                        range: f.range,
                    });
                }
            }
            None => {
                if contains_return != all_return {
                    errors.push(CompilerError::NotAllPathsReturn {
                        name: f.name.name.clone(),
                        range: f.range,
                    });
                }
            }
        }
    }
    (warnings, errors)
}

fn block_paths(block: &Block, warnings: &mut Vec<CompilerWarning>) -> (bool, bool) {
    let mut contains_return = false;
    let mut all_return = false;
    for stmt in &block.statements {
        if all_return {
            warnings.push(CompilerWarning::UnreachableCode {
                range: stmt.range(),
            });
        }
        let (stmt_contains, stmt_all) = stmt_paths(stmt, warnings);
        contains_return = contains_return || stmt_contains;
        all_return = all_return || stmt_all;
    }
    (contains_return, all_return)
}

fn stmt_paths(stmt: &Statement, warnings: &mut Vec<CompilerWarning>) -> (bool, bool) {
    match stmt {
        Statement::Return(_) => (true, true),
        Statement::If(s) => {
            let (then_contains, then_all) = block_paths(&s.then_block, warnings);
            match &s.else_block {
                Some(else_block) => {
                    let (else_contains, else_all) = block_paths(else_block, warnings);
                    (then_contains || else_contains, then_all && else_all)
                }
                // without an else the condition may skip the whole branch
                None => (then_contains, false),
            }
        }
        Statement::While(s) => {
            // the loop body may never execute
            let (contains, _) = block_paths(&s.body, warnings);
            (contains, false)
        }
        Statement::Block(b) => block_paths(b, warnings),
        _ => (false, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn check(source: &str) -> (Vec<CompilerWarning>, Vec<CompilerError>) {
        let (tokens, lex_errors) = lex(source);
        assert!(lex_errors.is_empty());
        let (file, parse_errors) = parse(tokens);
        assert!(parse_errors.is_empty(), "parse errors: {:?}", parse_errors);
        check_file(&file)
    }

    #[test]
    fn test_if_without_else_fails() {
        let (_, errors) = check("f(x) :: Bool -> Int { if(x) { return 1; } }\nmain() { return; }");
        assert!(errors
            .iter()
            .any(|e| matches!(e, CompilerError::NotAllPathsReturn { .. })));
    }

    #[test]
    fn test_if_with_else_passes() {
        let (_, errors) =
            check("f(x) :: Bool -> Int { if(x) { return 1; } else { return 2; } }\nmain() { return; }");
        assert!(errors.is_empty());
    }

    #[test]
    fn test_tail_return_passes() {
        let (_, errors) =
            check("f(x) :: Bool -> Int { if(x) { return 1; } return 2; }\nmain() { return; }");
        assert!(errors.is_empty());
    }

    #[test]
    fn test_void_signature_not_required_to_return() {
        let (_, errors) = check("f() :: -> Void { println(1); }\nmain() { return; }");
        assert!(errors.is_empty());
    }

    #[test]
    fn test_while_never_guarantees_return() {
        let (_, errors) =
            check("f() :: -> Int { while(True) { return 1; } }\nmain() { return; }");
        assert!(errors
            .iter()
            .any(|e| matches!(e, CompilerError::NotAllPathsReturn { .. })));
    }

    #[test]
    fn test_undeclared_partial_return_fails() {
        let (_, errors) =
            check("f(x) { if(x) { return 1; } println(1); }\nmain() { return; }");
        assert!(errors
            .iter()
            .any(|e| matches!(e, CompilerError::NotAllPathsReturn { .. })));
    }

    #[test]
    fn test_unreachable_code_warned_and_still_checked() {
        let (warnings, errors) =
            check("f() :: -> Int { return 1; println(2); }\nmain() { return; }");
        assert!(warnings
            .iter()
            .any(|w| matches!(w, CompilerWarning::UnreachableCode { .. })));
        assert!(errors.is_empty());
    }
}
