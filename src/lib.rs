//! SPL compiler library
//!
//! Compiles SPL source text to a Simple Stack Machine listing or to
//! x86-64 assembly (NASM macho64), optionally assembling and linking
//! the latter into an executable.
//!
//! Pipeline: lex, parse, return-path check, binding analysis, type
//! inference, monomorphizing IR generation, backend. The frontend
//! passes accumulate diagnostics and stop at their phase boundary; the
//! code generators only ever run on well-typed input and fail fast.
//!
//! ```rust
//! let listing = splc::compile_to_ssm("main() { println(1 + 2); }").unwrap();
//! assert!(listing.contains("add"));
//! ```

pub mod ast;
pub mod binding;
pub mod codegen;
pub mod config;
pub mod errors;
pub mod lexer;
pub mod parser;
pub mod returns;
pub mod typechecker;
pub mod types;
pub mod unification;

pub use config::{CompilerConfig, Target, Verbosity};
pub use errors::{CompilerError, CompilerWarning};

use ast::SplFile;
use codegen::ssm::SsmGenerator;
use codegen::x64::X64Generator;
use codegen::GenericProgram;
use std::fs;
use std::path::Path;
use std::process::Command;
use tracing::{info, warn};
use typechecker::Env;

/// Run everything up to and including type inference
fn frontend(source: &str) -> Result<(SplFile, Env), Vec<CompilerError>> {
    info!("starting parsing phase");
    let (tokens, lex_errors) = lexer::lex(source);
    if !lex_errors.is_empty() {
        return Err(lex_errors);
    }

    let (mut file, parse_errors) = parser::parse(tokens);
    if !parse_errors.is_empty() {
        return Err(parse_errors);
    }

    info!("starting analysis phase");
    let (return_warnings, return_errors) = returns::check_file(&file);
    for w in &return_warnings {
        warn!("{}", w.render(source));
    }
    if !return_errors.is_empty() {
        return Err(return_errors);
    }

    let feedback = binding::analyze(&mut file, &codegen::builtins::BUILTIN_NAMES);
    for w in &feedback.warnings {
        warn!("{}", w.render(source));
    }
    if feedback.has_errors() {
        return Err(feedback.errors);
    }

    let mut env = Env::new();
    codegen::builtins::seed_env(&mut env);
    let subst = typechecker::infer_file(&mut env, &file).map_err(|e| vec![e])?;
    env.apply(&subst);
    info!("analysis done");
    Ok((file, env))
}

fn generate_ir(source: &str) -> Result<GenericProgram, Vec<CompilerError>> {
    let (file, env) = frontend(source)?;
    info!("starting code generation");
    codegen::generate(&file, &env).map_err(|e| vec![e])
}

/// Compile source text to an SSM listing
pub fn compile_to_ssm(source: &str) -> Result<String, Vec<CompilerError>> {
    let program = generate_ir(source)?;
    let mut generator = SsmGenerator::new(&program);
    generator.generate().map_err(|e| vec![e])?;
    Ok(generator.write_to_string())
}

/// Compile source text to a NASM listing
pub fn compile_to_asm(source: &str) -> Result<String, Vec<CompilerError>> {
    let program = generate_ir(source)?;
    let mut generator = X64Generator::new(&program);
    generator.generate().map_err(|e| vec![e])?;
    Ok(generator.write_to_string())
}

/// Compile a source file according to `config`. For the x64 target the
/// emitted assembly is assembled with nasm and linked against the system
/// C library.
pub fn compile_file(input: &Path, config: &CompilerConfig) -> Result<(), Vec<CompilerError>> {
    let source = fs::read_to_string(input).map_err(|e| {
        vec![CompilerError::Io {
            message: format!("Failed to read {}: {}", input.display(), e),
        }]
    })?;

    match config.target {
        Target::Ssm => {
            let listing = compile_to_ssm(&source)?;
            let path = config.output.with_extension("ssm");
            info!("writing SSM listing to {}", path.display());
            fs::write(&path, listing).map_err(|e| {
                vec![CompilerError::Io {
                    message: format!("Failed to write {}: {}", path.display(), e),
                }]
            })?;
        }
        Target::X64 => {
            let listing = compile_to_asm(&source)?;
            let asm_path = config.output.with_extension("asm");
            info!("writing assembly to {}", asm_path.display());
            fs::write(&asm_path, listing).map_err(|e| {
                vec![CompilerError::Io {
                    message: format!("Failed to write {}: {}", asm_path.display(), e),
                }]
            })?;
            assemble_and_link(config, &asm_path, &config.output).map_err(|e| vec![e])?;
            if !config.keep_asm {
                let _ = fs::remove_file(&asm_path);
                let _ = fs::remove_file(config.output.with_extension("o"));
            }
        }
    }
    Ok(())
}

/// Run the external assembler and linker on the emitted `.asm` file.
/// Their stdout/stderr are inherited; a non-zero exit maps to the
/// corresponding error.
fn assemble_and_link(
    config: &CompilerConfig,
    asm_path: &Path,
    out_path: &Path,
) -> Result<(), CompilerError> {
    let object_path = out_path.with_extension("o");

    info!("assembling {}", asm_path.display());
    let status = Command::new(&config.assembler)
        .arg("-g")
        .arg("-f")
        .arg("macho64")
        .arg("-o")
        .arg(&object_path)
        .arg(asm_path)
        .status()
        .map_err(|e| CompilerError::Assembler {
            message: format!("failed to run {}: {}", config.assembler, e),
        })?;
    if !status.success() {
        return Err(CompilerError::Assembler {
            message: format!("{} returned non-zero status: {}", config.assembler, status),
        });
    }

    info!("linking {}", out_path.display());
    let status = Command::new(&config.linker)
        .arg(&config.libc)
        .arg(&object_path)
        .arg("-o")
        .arg(out_path)
        .status()
        .map_err(|e| CompilerError::Linker {
            message: format!("failed to run {}: {}", config.linker, e),
        })?;
    if !status.success() {
        return Err(CompilerError::Linker {
            message: format!("{} returned non-zero status: {}", config.linker, status),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_program_end_to_end() {
        let listing = compile_to_ssm("main() { println(1 + 2); }").unwrap();
        assert!(listing.contains("ldc 1"));
        assert!(listing.contains("ldc 2"));
        assert!(listing.contains("add"));
        assert!(listing.contains("halt"));
    }

    #[test]
    fn test_factorial_end_to_end() {
        let listing = compile_to_ssm(
            "factorial(n) :: Int -> Int { if(n == 0) { return 1; } return n * factorial(n - 1); }\n\
             main() { println(factorial(5)); }",
        )
        .unwrap();
        assert!(listing.contains("f_factorial_1_int"));
        assert!(listing.contains("trap 0"));
    }

    #[test]
    fn test_swap_scenario() {
        let listing = compile_to_ssm(
            "swap(p) :: (Int, Int) -> (Int, Int) { return (p.snd, p.fst); }\n\
             main() { println(swap((7, 9))); }",
        )
        .unwrap();
        assert!(listing.contains("f_swap_1__PO_int_CM__int_PC_"));
        // the tuple print instance materializes
        assert!(listing.contains("f_print_1__PO_int_CM__int_PC_"));
    }

    #[test]
    fn test_string_mutation_scenario() {
        let listing =
            compile_to_ssm("main() { var x = \"ab\"; x.hd = 'z'; println(x); }").unwrap();
        assert!(listing.contains("sta -1"));
        assert!(listing.contains("f_print_1__BO_char_BC_"));
    }

    #[test]
    fn test_len_scenario() {
        let listing =
            compile_to_ssm("main() { var xs = 1 : 2 : 3 : []; println(len(xs)); }").unwrap();
        assert!(listing.contains("f_len_1__BO_int_BC_"));
    }

    #[test]
    fn test_asm_end_to_end() {
        let asm = compile_to_asm("main() { println(1 + 2); }").unwrap();
        assert!(asm.starts_with("default rel\nglobal _main\n"));
        assert!(asm.contains("call    f_println_1_int"));
    }

    #[test]
    fn test_type_error_stops_pipeline() {
        let errors = compile_to_ssm("main() { Int x = True; println(x); }").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].category(), "TypeError");
    }

    #[test]
    fn test_binding_errors_collected() {
        let errors = compile_to_ssm("main() { println(x); println(y); }").unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.category() == "BindingError"));
    }

    #[test]
    fn test_return_check_runs_before_binding() {
        // the undefined variable is reported only after the return-path
        // phase passes
        let errors =
            compile_to_ssm("f() :: -> Int { println(1); }\nmain() { return; }").unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, CompilerError::NotAllPathsReturn { .. })));
    }

    #[test]
    fn test_compile_file_writes_ssm() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("prog.spl");
        fs::write(&input, "main() { println(42); }").unwrap();
        let config = CompilerConfig {
            target: Target::Ssm,
            output: dir.path().join("prog"),
            ..CompilerConfig::default()
        };
        compile_file(&input, &config).unwrap();
        let listing = fs::read_to_string(dir.path().join("prog.ssm")).unwrap();
        assert!(listing.contains("ldc 42"));
    }

    #[test]
    fn test_compile_file_missing_input() {
        let config = CompilerConfig::default();
        let errors = compile_file(Path::new("/nonexistent/input.spl"), &config).unwrap_err();
        assert!(matches!(errors[0], CompilerError::Io { .. }));
    }
}
