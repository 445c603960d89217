//! Diagnostics for every compiler phase
//!
//! One error enum covering the whole taxonomy (lexing through linking),
//! a separate warning enum, and the feedback bag the analysis passes
//! accumulate into before failing at their phase boundary. Rendering
//! shows the category, the message, the offending source line and a
//! caret underline sized to the code range.

use crate::ast::CodeRange;
use crate::types::InferenceType;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompilerError {
    // ---- lexing ----
    #[error("Unexpected character '{ch}'")]
    UnexpectedChar { ch: char, range: CodeRange },

    #[error("Unterminated character literal")]
    UnterminatedChar { range: CodeRange },

    #[error("Unterminated string literal")]
    UnterminatedString { range: CodeRange },

    // ---- parsing ----
    #[error("Expected '{symbol}' but found '{found}'")]
    ExpectedSymbol {
        symbol: String,
        found: String,
        range: CodeRange,
    },

    #[error("Identifier expected but found '{found}'")]
    ExpectedIdent { found: String, range: CodeRange },

    #[error("Term expected but found '{found}'")]
    ExpectedTerm { found: String, range: CodeRange },

    #[error("Type expected but found '{found}'")]
    ExpectedType { found: String, range: CodeRange },

    #[error("Statement expected but found '{found}'")]
    ExpectedStatement { found: String, range: CodeRange },

    #[error("Missing semicolon ';'")]
    MissingSemicolon { range: CodeRange },

    #[error("Unbalanced brackets '{open}' and '{close}'")]
    UnbalancedBrackets {
        open: String,
        close: String,
        range: CodeRange,
    },

    #[error("Too many nested brackets")]
    TooManyBrackets { range: CodeRange },

    #[error("Function '{name}' has an empty body")]
    EmptyFunctionBody { name: String, range: CodeRange },

    #[error("Unknown field '{field}', valid fields are: fst, snd, hd, tl")]
    UnknownField { field: String, range: CodeRange },

    // ---- binding ----
    #[error("Already defined identifier '{name}' is re-defined")]
    DuplicateIdentifier { name: String, range: CodeRange },

    #[error("Already defined function '{name}' is re-defined")]
    DuplicateFunction { name: String, range: CodeRange },

    #[error("Variable with name '{name}' is not defined")]
    UnknownVariable { name: String, range: CodeRange },

    #[error("Function with name '{name}' is not defined")]
    UnknownFunction { name: String, range: CodeRange },

    #[error("Function 'main' is required but was not found")]
    MissingMain,

    // ---- return paths ----
    #[error("Not all paths in function '{name}' return")]
    NotAllPathsReturn { name: String, range: CodeRange },

    // ---- typing ----
    #[error("Type mismatch! Expected type {expected} but found {actual}")]
    TypeMismatch {
        expected: InferenceType,
        actual: InferenceType,
        range: CodeRange,
    },

    #[error("Invalid type {ty} contains v{var}, but types cannot be recursive")]
    RecursiveType {
        var: usize,
        ty: InferenceType,
        range: CodeRange,
    },

    #[error("Type {ty} of global variable '{name}' could not be determined")]
    IndeterminateGlobalType {
        name: String,
        ty: InferenceType,
        range: CodeRange,
    },

    #[error("Function '{name}' is declared with {params} arguments, but has {types} argument types")]
    FunArgsTypesMismatch {
        name: String,
        params: usize,
        types: usize,
        range: CodeRange,
    },

    #[error("Function '{name}' is called with {given} arguments, but is declared with {expected}")]
    CallArityMismatch {
        name: String,
        given: usize,
        expected: usize,
        range: CodeRange,
    },

    #[error("Number '{literal}' is too large for target integer type")]
    IntOverflow { literal: String, range: CodeRange },

    #[error("Number '{literal}' is too small for target integer type")]
    IntUnderflow { literal: String, range: CodeRange },

    #[error("Function 'main' cannot take arguments, but is defined with {count}")]
    MainWithParams { count: usize, range: CodeRange },

    // ---- code generation ----
    #[error("No instance of function '{name}' is available for argument types: {arg_types}")]
    NoFunctionInstance { name: String, arg_types: String },

    #[error("Unknown function '{name}' encountered while generating code")]
    UnknownCallee { name: String },

    #[error("Function '{second}' is marked as entry point, but '{first}' is already the entry point")]
    DuplicateEntryPoint { first: String, second: String },

    #[error("{message}")]
    Internal { message: String },

    // ---- external processes ----
    #[error("Assembler failed: {message}")]
    Assembler { message: String },

    #[error("Linker failed: {message}")]
    Linker { message: String },

    #[error("{message}")]
    Io { message: String },
}

impl CompilerError {
    pub fn internal(message: impl Into<String>) -> Self {
        CompilerError::Internal {
            message: message.into(),
        }
    }

    /// The taxonomy category this diagnostic reports under
    pub fn category(&self) -> &'static str {
        use CompilerError::*;
        match self {
            UnexpectedChar { .. } | UnterminatedChar { .. } | UnterminatedString { .. } => {
                "LexError"
            }
            ExpectedSymbol { .. }
            | ExpectedIdent { .. }
            | ExpectedTerm { .. }
            | ExpectedType { .. }
            | ExpectedStatement { .. }
            | MissingSemicolon { .. }
            | UnbalancedBrackets { .. }
            | TooManyBrackets { .. }
            | EmptyFunctionBody { .. }
            | UnknownField { .. } => "SyntaxError",
            DuplicateIdentifier { .. }
            | DuplicateFunction { .. }
            | UnknownVariable { .. }
            | UnknownFunction { .. }
            | MissingMain => "BindingError",
            NotAllPathsReturn { .. } => "ReturnValueError",
            TypeMismatch { .. }
            | RecursiveType { .. }
            | IndeterminateGlobalType { .. }
            | FunArgsTypesMismatch { .. }
            | CallArityMismatch { .. }
            | IntOverflow { .. }
            | IntUnderflow { .. }
            | MainWithParams { .. } => "TypeError",
            NoFunctionInstance { .. }
            | UnknownCallee { .. }
            | DuplicateEntryPoint { .. }
            | Internal { .. } => "CodeGenError",
            Assembler { .. } => "AssemblerError",
            Linker { .. } => "LinkerError",
            Io { .. } => "IoError",
        }
    }

    pub fn code_range(&self) -> Option<CodeRange> {
        use CompilerError::*;
        match self {
            UnexpectedChar { range, .. }
            | UnterminatedChar { range }
            | UnterminatedString { range }
            | ExpectedSymbol { range, .. }
            | ExpectedIdent { range, .. }
            | ExpectedTerm { range, .. }
            | ExpectedType { range, .. }
            | ExpectedStatement { range, .. }
            | MissingSemicolon { range }
            | UnbalancedBrackets { range, .. }
            | TooManyBrackets { range }
            | EmptyFunctionBody { range, .. }
            | UnknownField { range, .. }
            | DuplicateIdentifier { range, .. }
            | DuplicateFunction { range, .. }
            | UnknownVariable { range, .. }
            | UnknownFunction { range, .. }
            | NotAllPathsReturn { range, .. }
            | TypeMismatch { range, .. }
            | RecursiveType { range, .. }
            | IndeterminateGlobalType { range, .. }
            | FunArgsTypesMismatch { range, .. }
            | CallArityMismatch { range, .. }
            | IntOverflow { range, .. }
            | IntUnderflow { range, .. }
            | MainWithParams { range, .. } => Some(*range),
            _ => None,
        }
    }

    /// Render category, message and a two-line source context
    pub fn render(&self, source: &str) -> String {
        render_diagnostic(self.category(), &self.to_string(), self.code_range(), source)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompilerWarning {
    #[error("Code is unreachable")]
    UnreachableCode { range: CodeRange },

    #[error("Variable declaration of '{name}' hides variable '{name}' from outer scope")]
    VariableHiding { name: String, range: CodeRange },
}

impl CompilerWarning {
    pub fn code_range(&self) -> CodeRange {
        match self {
            CompilerWarning::UnreachableCode { range } => *range,
            CompilerWarning::VariableHiding { range, .. } => *range,
        }
    }

    pub fn render(&self, source: &str) -> String {
        render_diagnostic(
            "Warning",
            &self.to_string(),
            Some(self.code_range()),
            source,
        )
    }
}

/// Errors and warnings gathered by one analysis pass
#[derive(Debug, Default)]
pub struct Feedback {
    pub errors: Vec<CompilerError>,
    pub warnings: Vec<CompilerWarning>,
}

impl Feedback {
    pub fn new() -> Self {
        Feedback::default()
    }

    pub fn error(&mut self, e: CompilerError) {
        self.errors.push(e);
    }

    pub fn warning(&mut self, w: CompilerWarning) {
        self.warnings.push(w);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

fn source_line(source: &str, number: usize) -> &str {
    let mut lines = source.lines();
    match number.checked_sub(1).and_then(|n| lines.nth(n)) {
        Some(line) => line,
        None => "",
    }
}

fn render_diagnostic(
    category: &str,
    message: &str,
    range: Option<CodeRange>,
    source: &str,
) -> String {
    let Some(range) = range else {
        return format!("{}: {}", category, message);
    };
    let line = source_line(source, range.start.line);
    let prefix = format!("{}:{}: ", range.start.line, range.start.col);
    let carets = if range.end.line == range.start.line {
        range.end.col.saturating_sub(range.start.col).max(1)
    } else {
        line.len().saturating_sub(range.start.col - 1).max(1)
    };
    let pad = " ".repeat(prefix.len() + range.start.col.saturating_sub(1));
    format!(
        "{}: {} at:\n{}{}\n{}{}",
        category,
        message,
        prefix,
        line,
        pad,
        "^".repeat(carets)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::CodePos;

    fn range(line: usize, start: usize, end: usize) -> CodeRange {
        CodeRange::new(CodePos::new(line, start), CodePos::new(line, end))
    }

    #[test]
    fn test_categories() {
        let e = CompilerError::UnexpectedChar {
            ch: '$',
            range: range(1, 1, 2),
        };
        assert_eq!(e.category(), "LexError");
        let e = CompilerError::TypeMismatch {
            expected: InferenceType::Int,
            actual: InferenceType::Bool,
            range: range(1, 1, 2),
        };
        assert_eq!(e.category(), "TypeError");
        assert_eq!(CompilerError::MissingMain.category(), "BindingError");
    }

    #[test]
    fn test_render_caret_width() {
        let source = "var x = True;\n";
        let e = CompilerError::TypeMismatch {
            expected: InferenceType::Int,
            actual: InferenceType::Bool,
            range: range(1, 9, 13),
        };
        let rendered = e.render(source);
        assert!(rendered.starts_with("TypeError:"));
        assert!(rendered.contains("var x = True;"));
        assert!(rendered.ends_with("^^^^"));
        assert!(!rendered.ends_with("^^^^^"));
    }

    #[test]
    fn test_render_without_range() {
        let e = CompilerError::MissingMain;
        let rendered = e.render("");
        assert_eq!(
            rendered,
            "BindingError: Function 'main' is required but was not found"
        );
    }

    #[test]
    fn test_feedback_bag() {
        let mut fb = Feedback::new();
        assert!(!fb.has_errors());
        fb.warning(CompilerWarning::UnreachableCode {
            range: range(1, 1, 2),
        });
        assert!(!fb.has_errors());
        fb.error(CompilerError::MissingMain);
        assert!(fb.has_errors());
    }
}
