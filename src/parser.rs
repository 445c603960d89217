//! Recursive descent parser for SPL
//!
//! Accumulates up to five syntax errors before giving up. Recovery skips
//! to the next `;`, the matching closing bracket, or one block level up,
//! leaving `Error` placeholder nodes in the tree so later parsing can
//! continue.

use crate::ast::*;
use crate::errors::CompilerError;
use crate::lexer::{Token, TokenKind};
use tracing::debug;

/// Parsing stops after this many errors
pub const MAX_PARSE_ERRORS: usize = 5;

/// Bracket nesting beyond this is reported instead of recursing further
const MAX_BRACKET_DEPTH: usize = 200;

/// Signals that the current production gave up; the error itself has
/// already been pushed onto the error list
struct ParseAbort;

type PResult<T> = Result<T, ParseAbort>;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    block_depth: i64,
    bracket_depth: usize,
    pub errors: Vec<CompilerError>,
}

/// Parse a token stream into an [`SplFile`], returning the (possibly
/// partial) tree together with all accumulated errors
pub fn parse(tokens: Vec<Token>) -> (SplFile, Vec<CompilerError>) {
    let mut parser = Parser::new(tokens);
    let file = parser.parse_spl();
    (file, parser.errors)
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            pos: 0,
            block_depth: 0,
            bracket_depth: 0,
            errors: Vec::new(),
        }
    }

    // ---- token cursor ----

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn current_range(&self) -> CodeRange {
        self.current().range
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        match token.kind {
            TokenKind::CurlyOpen => self.block_depth += 1,
            TokenKind::CurlyClose => self.block_depth -= 1,
            _ => {}
        }
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn check_keyword(&self, keyword: &str) -> bool {
        self.check(TokenKind::Keyword) && self.current().text == keyword
    }

    fn check_operator(&self, op: &str) -> bool {
        self.check(TokenKind::Operator) && self.current().text == op
    }

    fn read_if_kind(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn read_if_keyword(&mut self, keyword: &str) -> Option<Token> {
        if self.check_keyword(keyword) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn expect_symbol(&mut self, kind: TokenKind, symbol: &str) -> PResult<Token> {
        match self.read_if_kind(kind) {
            Some(t) => Ok(t),
            None => {
                self.errors.push(CompilerError::ExpectedSymbol {
                    symbol: symbol.to_string(),
                    found: self.current().text.clone(),
                    range: self.current_range(),
                });
                Err(ParseAbort)
            }
        }
    }

    fn expect_operator(&mut self, op: &str) -> PResult<Token> {
        if self.check_operator(op) {
            Ok(self.advance())
        } else {
            self.errors.push(CompilerError::ExpectedSymbol {
                symbol: op.to_string(),
                found: self.current().text.clone(),
                range: self.current_range(),
            });
            Err(ParseAbort)
        }
    }

    fn expect_ident(&mut self) -> PResult<Token> {
        match self.read_if_kind(TokenKind::Identifier) {
            Some(t) => Ok(t),
            None => {
                self.errors.push(CompilerError::ExpectedIdent {
                    found: self.current().text.clone(),
                    range: self.current_range(),
                });
                Err(ParseAbort)
            }
        }
    }

    /// Advance until a token of `kind` (or end of input) is current
    fn skip_to(&mut self, kind: TokenKind) {
        while !self.check(kind) && !self.check(TokenKind::Eof) {
            self.advance();
        }
    }

    fn skip_to_operator(&mut self, op: &str) {
        while !self.check_operator(op) && !self.check(TokenKind::Eof) {
            self.advance();
        }
    }

    fn skip_to_semicolon(&mut self) {
        self.skip_to(TokenKind::Semicolon);
    }

    /// Consume tokens until the enclosing block has been closed
    fn move_context_up(&mut self) {
        let target = self.block_depth - 1;
        while self.block_depth > target && !self.check(TokenKind::Eof) {
            self.advance();
        }
    }

    // ---- driver ----

    pub fn parse_spl(&mut self) -> SplFile {
        let mut declarations = Vec::new();
        while !self.check(TokenKind::Eof) {
            if self.errors.len() > MAX_PARSE_ERRORS {
                debug!("aborting parse: too many errors");
                break;
            }
            match self.parse_decl() {
                Ok(decl) => declarations.push(decl),
                Err(_) => {
                    debug!("unrecovered parse error at {}", self.current_range());
                    break;
                }
            }
        }
        SplFile { declarations }
    }

    /// Require a `;`, but treat a missing one as recoverable
    fn parse_semicolon(&mut self) {
        if self.read_if_kind(TokenKind::Semicolon).is_none() {
            self.errors.push(CompilerError::MissingSemicolon {
                range: self.current_range(),
            });
        }
    }

    /// Parse `open`, then `f`, then `close`, recovering to the closing
    /// bracket (or one block level up) when `f` fails
    fn parse_balanced<T>(
        &mut self,
        open: TokenKind,
        open_sym: &str,
        close: TokenKind,
        close_sym: &str,
        f: impl FnOnce(&mut Self) -> PResult<T>,
        on_error: impl FnOnce(CodeRange) -> T,
    ) -> PResult<T> {
        let open_tok = self.expect_symbol(open, open_sym)?;

        if self.bracket_depth >= MAX_BRACKET_DEPTH {
            self.errors.push(CompilerError::TooManyBrackets {
                range: open_tok.range,
            });
            self.skip_to(close);
            let _ = self.read_if_kind(close);
            return Ok(on_error(CodeRange::span(open_tok.range, self.current_range())));
        }

        self.bracket_depth += 1;
        let result = f(self);
        self.bracket_depth -= 1;

        let value = match result {
            Ok(v) => v,
            Err(_) => {
                let range = CodeRange::span(open_tok.range, self.current_range());
                if close == TokenKind::CurlyClose {
                    // a broken block: climb out of it and carry on
                    self.move_context_up();
                    return Ok(on_error(range));
                }
                self.skip_to(close);
                on_error(range)
            }
        };
        match self.read_if_kind(close) {
            Some(_) => Ok(value),
            None => {
                self.errors.push(CompilerError::UnbalancedBrackets {
                    open: open_sym.to_string(),
                    close: close_sym.to_string(),
                    range: open_tok.range,
                });
                Err(ParseAbort)
            }
        }
    }

    // ---- declarations ----

    fn parse_decl(&mut self) -> PResult<Decl> {
        if self.check(TokenKind::Identifier) {
            self.parse_fun_decl().map(Decl::Fun)
        } else {
            self.parse_var_decl(None).map(Decl::Var)
        }
    }

    fn parse_fun_decl(&mut self) -> PResult<FunDecl> {
        let name_tok = self.expect_ident()?;
        let name = Ident::new(name_tok.text, name_tok.range);

        let params = self.parse_balanced(
            TokenKind::ParenOpen,
            "(",
            TokenKind::ParenClose,
            ")",
            |p| {
                let mut params = Vec::new();
                while !p.check(TokenKind::ParenClose) && !p.check(TokenKind::Eof) {
                    if !params.is_empty() {
                        p.expect_symbol(TokenKind::Comma, ",")?;
                    }
                    let t = p.expect_ident()?;
                    params.push(Ident::new(t.text, t.range));
                }
                Ok(params)
            },
            |_| Vec::new(),
        )?;

        let signature = if self.read_if_kind(TokenKind::DoubleColon).is_some() {
            Some(self.parse_fun_type()?)
        } else {
            None
        };

        let body = self.parse_block()?;
        let recovered = matches!(body.statements.first(), Some(Statement::Error(_)));
        if !recovered && body.statements.is_empty() {
            self.errors.push(CompilerError::EmptyFunctionBody {
                name: name.name.clone(),
                range: name.range,
            });
        }
        Ok(FunDecl {
            range: name.range,
            name,
            params,
            signature,
            body,
            param_ids: Vec::new(),
        })
    }

    fn parse_var_decl(&mut self, id_token: Option<Token>) -> PResult<VarDecl> {
        let start_range = id_token
            .as_ref()
            .map(|t| t.range)
            .unwrap_or_else(|| self.current_range());

        let declared = if id_token.is_none() && self.read_if_keyword("var").is_some() {
            None
        } else {
            Some(self.parse_type(id_token)?)
        };

        let name_tok = self.expect_ident()?;
        let name = Ident::new(name_tok.text, name_tok.range);
        self.expect_operator("=")?;
        let init = self.parse_expr()?;
        let range = CodeRange::span(start_range, init.range());
        self.parse_semicolon();
        Ok(VarDecl {
            declared,
            name,
            init,
            id: None,
            range,
        })
    }

    // ---- types ----

    fn parse_type(&mut self, type_token: Option<Token>) -> PResult<TypeExpr> {
        // a passed-in token has already been consumed from the stream
        if let Some(token) = type_token {
            return match token.kind {
                TokenKind::Identifier => Ok(TypeExpr::Var {
                    name: token.text,
                    id: None,
                    range: token.range,
                }),
                _ => self.basic_type_from(token),
            };
        }

        match self.current().kind {
            TokenKind::BracketOpen => {
                let range = self.current_range();
                let inner = self.parse_balanced(
                    TokenKind::BracketOpen,
                    "[",
                    TokenKind::BracketClose,
                    "]",
                    |p| p.parse_type(None),
                    TypeExpr::Error,
                )?;
                Ok(TypeExpr::List(Box::new(inner), range))
            }
            TokenKind::ParenOpen => {
                let range = self.current_range();
                self.parse_balanced(
                    TokenKind::ParenOpen,
                    "(",
                    TokenKind::ParenClose,
                    ")",
                    |p| {
                        let t1 = match p.parse_type(None) {
                            Ok(t) => t,
                            Err(_) => {
                                // recover at the comma so the second half can parse
                                p.skip_to(TokenKind::Comma);
                                TypeExpr::Error(p.current_range())
                            }
                        };
                        p.expect_symbol(TokenKind::Comma, ",")?;
                        let t2 = p.parse_type(None)?;
                        Ok(TypeExpr::Tuple(Box::new(t1), Box::new(t2), range))
                    },
                    TypeExpr::Error,
                )
            }
            TokenKind::Identifier => {
                let token = self.advance();
                Ok(TypeExpr::Var {
                    name: token.text,
                    id: None,
                    range: token.range,
                })
            }
            _ => {
                let token = self.advance();
                self.basic_type_from(token)
            }
        }
    }

    fn basic_type_from(&mut self, token: Token) -> PResult<TypeExpr> {
        if token.kind == TokenKind::Keyword {
            let t = match token.text.as_str() {
                "Int" => Some(TypeExpr::Int(token.range)),
                "Bool" => Some(TypeExpr::Bool(token.range)),
                "Char" => Some(TypeExpr::Char(token.range)),
                _ => None,
            };
            if let Some(t) = t {
                return Ok(t);
            }
        }
        self.errors.push(CompilerError::ExpectedType {
            found: token.text,
            range: token.range,
        });
        Err(ParseAbort)
    }

    fn parse_fun_type(&mut self) -> PResult<FunSignature> {
        let start = self.current_range();
        let mut arg_types = Vec::new();
        while !self.check(TokenKind::Arrow) && !self.check(TokenKind::Eof) {
            match self.parse_type(None) {
                Ok(t) => arg_types.push(t),
                Err(_) => {
                    arg_types.push(TypeExpr::Error(self.current_range()));
                    self.skip_to(TokenKind::Arrow);
                    break;
                }
            }
        }
        self.expect_symbol(TokenKind::Arrow, "->")?;
        let ret = self.parse_return_type();
        let range = CodeRange::span(start, self.current_range());
        Ok(FunSignature {
            arg_types,
            ret,
            range,
        })
    }

    fn parse_return_type(&mut self) -> ReturnTypeExpr {
        if self.check_keyword("Void") {
            let token = self.advance();
            return ReturnTypeExpr::Void(token.range);
        }
        match self.parse_type(None) {
            Ok(t) => ReturnTypeExpr::Value(t),
            Err(_) => {
                let range = self.current_range();
                self.skip_to(TokenKind::CurlyOpen);
                ReturnTypeExpr::Value(TypeExpr::Error(range))
            }
        }
    }

    // ---- statements ----

    fn parse_statement(&mut self) -> PResult<Statement> {
        let current = self.current().clone();
        if current.kind == TokenKind::Keyword {
            match current.text.as_str() {
                "return" => return self.parse_return(),
                "if" => return self.parse_if(),
                "while" => return self.parse_while(),
                "var" | "Bool" | "Int" | "Char" => {
                    return self.parse_var_decl(None).map(Statement::Var);
                }
                _ => {}
            }
        }
        match current.kind {
            TokenKind::BracketOpen | TokenKind::ParenOpen => {
                self.parse_var_decl(None).map(Statement::Var)
            }
            TokenKind::Identifier => self.parse_identifier_statement(),
            TokenKind::CurlyOpen => {
                let block = self.parse_block()?;
                Ok(Statement::Block(block))
            }
            _ => {
                self.errors.push(CompilerError::ExpectedStatement {
                    found: current.text,
                    range: current.range,
                });
                Err(ParseAbort)
            }
        }
    }

    fn parse_return(&mut self) -> PResult<Statement> {
        let t = self.advance(); // 'return'
        let value = if self.check(TokenKind::Semicolon) {
            None
        } else {
            match self.parse_expr() {
                Ok(e) => Some(e),
                Err(_) => {
                    self.skip_to_semicolon();
                    Some(Expr::Error {
                        range: self.current_range(),
                    })
                }
            }
        };
        let range = CodeRange::span(t.range, self.current_range());
        self.parse_semicolon();
        Ok(Statement::Return(Return { value, range }))
    }

    fn parse_if(&mut self) -> PResult<Statement> {
        let t = self.advance(); // 'if'
        let condition = self.parse_bracketed_expr(false)?;
        let then_block = self.parse_block()?;
        let else_block = if self.read_if_keyword("else").is_some() {
            Some(self.parse_block()?)
        } else {
            None
        };
        let range = CodeRange::span(t.range, self.current_range());
        Ok(Statement::If(If {
            condition,
            then_block,
            else_block,
            range,
        }))
    }

    fn parse_while(&mut self) -> PResult<Statement> {
        let t = self.advance(); // 'while'
        let condition = self.parse_bracketed_expr(false)?;
        let body = self.parse_block()?;
        let range = CodeRange::span(t.range, self.current_range());
        Ok(Statement::While(While {
            condition,
            body,
            range,
        }))
    }

    fn parse_identifier_statement(&mut self) -> PResult<Statement> {
        let id_token = self.advance();
        if self.check(TokenKind::ParenOpen) {
            let call = self.parse_function_call(id_token)?;
            let range = call.range();
            self.parse_semicolon();
            return Ok(Statement::Expr(ExprStmt { expr: call, range }));
        }
        if self.check(TokenKind::Dot) || self.check(TokenKind::Operator) {
            let base = FieldAccess::Var {
                name: id_token.text.clone(),
                id: None,
                range: id_token.range,
            };
            let target = self.parse_field_accessor(base)?;
            self.expect_operator("=")?;
            let value = self.parse_expr()?;
            let range = CodeRange::span(id_token.range, self.current_range());
            self.parse_semicolon();
            return Ok(Statement::Assign(Assign {
                target,
                value,
                range,
            }));
        }
        // `t x = e;` where t is a declared type variable
        self.parse_var_decl(Some(id_token)).map(Statement::Var)
    }

    fn parse_block(&mut self) -> PResult<Block> {
        self.parse_balanced(
            TokenKind::CurlyOpen,
            "{",
            TokenKind::CurlyClose,
            "}",
            |p| {
                let start = p.current_range();
                let mut statements = Vec::new();
                while !p.check(TokenKind::CurlyClose) && !p.check(TokenKind::Eof) {
                    statements.push(p.parse_statement()?);
                }
                let range = CodeRange::span(start, p.current_range());
                Ok(Block { statements, range })
            },
            |range| Block {
                statements: vec![Statement::Error(range)],
                range,
            },
        )
    }

    // ---- expressions ----

    fn parse_binary_chain(
        &mut self,
        lookup: fn(&str) -> Option<BinaryOp>,
        next: fn(&mut Self) -> PResult<Expr>,
    ) -> PResult<Expr> {
        let mut result = next(self)?;
        while self.check(TokenKind::Operator) {
            let Some(op) = lookup(&self.current().text) else {
                break;
            };
            self.advance();
            let rhs = next(self)?;
            let range = CodeRange::span(result.range(), rhs.range());
            result = Expr::Binary {
                op,
                lhs: Box::new(result),
                rhs: Box::new(rhs),
                range,
            };
        }
        Ok(result)
    }

    fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_bool_expr()
    }

    fn parse_bool_expr(&mut self) -> PResult<Expr> {
        self.parse_binary_chain(
            |sym| match sym {
                "&&" => Some(BinaryOp::And),
                "||" => Some(BinaryOp::Or),
                _ => None,
            },
            Self::parse_comp_expr,
        )
    }

    fn parse_comp_expr(&mut self) -> PResult<Expr> {
        self.parse_binary_chain(
            |sym| match sym {
                "==" => Some(BinaryOp::Eq),
                "!=" => Some(BinaryOp::Ne),
                "<" => Some(BinaryOp::Lt),
                "<=" => Some(BinaryOp::Le),
                ">=" => Some(BinaryOp::Ge),
                ">" => Some(BinaryOp::Gt),
                _ => None,
            },
            Self::parse_list_expr,
        )
    }

    /// Cons is right-associative: `1 : 2 : []` is `1 : (2 : [])`
    fn parse_list_expr(&mut self) -> PResult<Expr> {
        let lhs = self.parse_mod_expr()?;
        if self.check_operator(":") {
            self.advance();
            let rhs = self.parse_list_expr()?;
            let range = CodeRange::span(lhs.range(), rhs.range());
            return Ok(Expr::Binary {
                op: BinaryOp::Cons,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                range,
            });
        }
        Ok(lhs)
    }

    fn parse_mod_expr(&mut self) -> PResult<Expr> {
        self.parse_binary_chain(
            |sym| match sym {
                "%" => Some(BinaryOp::Mod),
                _ => None,
            },
            Self::parse_sum,
        )
    }

    fn parse_sum(&mut self) -> PResult<Expr> {
        self.parse_binary_chain(
            |sym| match sym {
                "+" => Some(BinaryOp::Add),
                "-" => Some(BinaryOp::Sub),
                _ => None,
            },
            Self::parse_product,
        )
    }

    fn parse_product(&mut self) -> PResult<Expr> {
        self.parse_binary_chain(
            |sym| match sym {
                "*" => Some(BinaryOp::Mul),
                "/" => Some(BinaryOp::Div),
                _ => None,
            },
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let op = if self.check_operator("!") {
            Some(UnaryOp::Not)
        } else if self.check_operator("-") {
            Some(UnaryOp::Minus)
        } else {
            None
        };
        let Some(op) = op else {
            return self.parse_term();
        };
        let start = self.current_range();
        self.advance();
        let mut operand = self.parse_unary()?;
        if op == UnaryOp::Minus {
            if let Expr::Number { negated, .. } = &mut operand {
                *negated = true;
            }
        }
        let range = CodeRange::span(start, operand.range());
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
            range,
        })
    }

    fn parse_term(&mut self) -> PResult<Expr> {
        let current = self.current().clone();
        match current.kind {
            TokenKind::Identifier => self.parse_identifier_expr(),
            TokenKind::Int => self.parse_number(),
            TokenKind::Char => {
                self.advance();
                let value = current.text.chars().next().unwrap_or('\0');
                Ok(Expr::Char {
                    value,
                    range: current.range,
                })
            }
            TokenKind::Str => {
                self.advance();
                Ok(desugar_string(&current.text, current.range))
            }
            TokenKind::Keyword if current.text == "True" || current.text == "False" => {
                self.advance();
                Ok(Expr::Bool {
                    value: current.text == "True",
                    range: current.range,
                })
            }
            TokenKind::ParenOpen => self.parse_bracketed_expr(true),
            TokenKind::BracketOpen => {
                self.advance();
                let close = self.expect_symbol(TokenKind::BracketClose, "]")?;
                Ok(Expr::EmptyList {
                    range: CodeRange::span(current.range, close.range),
                })
            }
            _ => {
                self.errors.push(CompilerError::ExpectedTerm {
                    found: current.text,
                    range: current.range,
                });
                Err(ParseAbort)
            }
        }
    }

    fn parse_identifier_expr(&mut self) -> PResult<Expr> {
        let token = self.advance();
        if self.check(TokenKind::ParenOpen) {
            return self.parse_function_call(token);
        }
        let base = FieldAccess::Var {
            name: token.text,
            id: None,
            range: token.range,
        };
        let field = self.parse_field_accessor(base)?;
        Ok(Expr::Field(field))
    }

    fn parse_field_accessor(&mut self, base: FieldAccess) -> PResult<FieldAccess> {
        let mut field = base;
        while self.check(TokenKind::Dot) {
            self.advance();
            let id = self.expect_ident()?;
            let sel = match id.text.as_str() {
                "fst" => Selector::Fst,
                "snd" => Selector::Snd,
                "hd" => Selector::Hd,
                "tl" => Selector::Tl,
                _ => {
                    self.errors.push(CompilerError::UnknownField {
                        field: id.text,
                        range: id.range,
                    });
                    return Err(ParseAbort);
                }
            };
            field = FieldAccess::Accessor {
                sel,
                base: Box::new(field),
                range: id.range,
            };
        }
        Ok(field)
    }

    fn parse_function_call(&mut self, id_token: Token) -> PResult<Expr> {
        let name = Ident::new(id_token.text, id_token.range);
        self.parse_balanced(
            TokenKind::ParenOpen,
            "(",
            TokenKind::ParenClose,
            ")",
            |p| {
                let mut args = Vec::new();
                while !p.check(TokenKind::ParenClose) && !p.check(TokenKind::Eof) {
                    if !args.is_empty() {
                        p.expect_symbol(TokenKind::Comma, ",")?;
                    }
                    args.push(p.parse_expr()?);
                }
                Ok(Expr::Call(CallExpr {
                    range: name.range,
                    name,
                    args,
                }))
            },
            |range| Expr::Error { range },
        )
    }

    fn parse_number(&mut self) -> PResult<Expr> {
        let token = self.advance();
        match token.text.parse::<i64>() {
            Ok(value) => Ok(Expr::Number {
                value,
                negated: false,
                range: token.range,
            }),
            Err(_) => {
                self.errors.push(CompilerError::IntOverflow {
                    literal: token.text,
                    range: token.range,
                });
                Err(ParseAbort)
            }
        }
    }

    fn parse_bracketed_expr(&mut self, allow_tuple: bool) -> PResult<Expr> {
        self.parse_balanced(
            TokenKind::ParenOpen,
            "(",
            TokenKind::ParenClose,
            ")",
            |p| {
                let expr = p.parse_expr()?;
                if allow_tuple && p.read_if_kind(TokenKind::Comma).is_some() {
                    let snd = p.parse_expr()?;
                    let range = CodeRange::span(expr.range(), snd.range());
                    return Ok(Expr::Tuple {
                        fst: Box::new(expr),
                        snd: Box::new(snd),
                        range,
                    });
                }
                Ok(expr)
            },
            |range| Expr::Error { range },
        )
    }
}

/// A string literal is sugar for a cons chain of its characters
fn desugar_string(s: &str, range: CodeRange) -> Expr {
    let mut expr = Expr::EmptyList { range };
    for c in s.chars().rev() {
        expr = Expr::Binary {
            op: BinaryOp::Cons,
            lhs: Box::new(Expr::Char { value: c, range }),
            rhs: Box::new(expr),
            range,
        };
    }
    expr
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use pretty_assertions::assert_eq;

    fn parse_ok(source: &str) -> SplFile {
        let (tokens, lex_errors) = lex(source);
        assert!(lex_errors.is_empty(), "lex errors: {:?}", lex_errors);
        let (file, errors) = parse(tokens);
        assert!(errors.is_empty(), "parse errors: {:?}", errors);
        file
    }

    fn parse_errors(source: &str) -> Vec<CompilerError> {
        let (tokens, _) = lex(source);
        parse(tokens).1
    }

    #[test]
    fn test_var_decl_forms() {
        let file = parse_ok("var x = 1;\nInt y = 2;\n[Int] zs = [];\n(Int, Bool) p = (1, True);\nmain() { return; }");
        assert_eq!(file.declarations.len(), 5);
        match &file.declarations[2] {
            Decl::Var(v) => {
                assert!(matches!(v.declared, Some(TypeExpr::List(_, _))));
                assert!(matches!(v.init, Expr::EmptyList { .. }));
            }
            other => panic!("expected var decl, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        let file = parse_ok("main() { var x = 1 + 2 * 3; return; }");
        let Decl::Fun(f) = &file.declarations[0] else {
            panic!()
        };
        let Statement::Var(v) = &f.body.statements[0] else {
            panic!()
        };
        // must parse as 1 + (2 * 3)
        let Expr::Binary { op, rhs, .. } = &v.init else {
            panic!()
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            **rhs,
            Expr::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn test_cons_right_associative() {
        let file = parse_ok("main() { var x = 1 : 2 : []; return; }");
        let Decl::Fun(f) = &file.declarations[0] else {
            panic!()
        };
        let Statement::Var(v) = &f.body.statements[0] else {
            panic!()
        };
        let Expr::Binary { op, rhs, .. } = &v.init else {
            panic!()
        };
        assert_eq!(*op, BinaryOp::Cons);
        assert!(matches!(
            **rhs,
            Expr::Binary {
                op: BinaryOp::Cons,
                ..
            }
        ));
    }

    #[test]
    fn test_string_desugars_to_cons_chain() {
        let file = parse_ok("main() { var s = \"ab\"; return; }");
        let Decl::Fun(f) = &file.declarations[0] else {
            panic!()
        };
        let Statement::Var(v) = &f.body.statements[0] else {
            panic!()
        };
        let Expr::Binary { op, lhs, rhs, .. } = &v.init else {
            panic!()
        };
        assert_eq!(*op, BinaryOp::Cons);
        assert!(matches!(**lhs, Expr::Char { value: 'a', .. }));
        let Expr::Binary { lhs: inner, .. } = &**rhs else {
            panic!()
        };
        assert!(matches!(**inner, Expr::Char { value: 'b', .. }));
    }

    #[test]
    fn test_negated_literal_flag() {
        let file = parse_ok("main() { var x = -2147483648; return; }");
        let Decl::Fun(f) = &file.declarations[0] else {
            panic!()
        };
        let Statement::Var(v) = &f.body.statements[0] else {
            panic!()
        };
        let Expr::Unary { operand, .. } = &v.init else {
            panic!()
        };
        assert!(matches!(**operand, Expr::Number { negated: true, .. }));
    }

    #[test]
    fn test_fun_signature() {
        let file = parse_ok("swap(p) :: (Int, Int) -> (Int, Int) { return (p.snd, p.fst); }");
        let Decl::Fun(f) = &file.declarations[0] else {
            panic!()
        };
        let sig = f.signature.as_ref().unwrap();
        assert_eq!(sig.arg_types.len(), 1);
        assert!(matches!(sig.ret, ReturnTypeExpr::Value(_)));
    }

    #[test]
    fn test_field_assignment() {
        let file = parse_ok("main() { var x = \"ab\"; x.hd = 'z'; return; }");
        let Decl::Fun(f) = &file.declarations[0] else {
            panic!()
        };
        let Statement::Assign(a) = &f.body.statements[1] else {
            panic!()
        };
        assert!(matches!(
            a.target,
            FieldAccess::Accessor {
                sel: Selector::Hd,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_semicolon_recovers() {
        let errors = parse_errors("main() { var x = 1 return; }");
        assert!(errors
            .iter()
            .any(|e| matches!(e, CompilerError::MissingSemicolon { .. })));
    }

    #[test]
    fn test_unknown_field_reported() {
        let errors = parse_errors("main() { x.third = 1; }");
        assert!(errors
            .iter()
            .any(|e| matches!(e, CompilerError::UnknownField { .. })));
    }

    #[test]
    fn test_broken_block_recovers_to_next_decl() {
        let (tokens, _) = lex("broken() { var = ; }\nmain() { return; }");
        let (file, errors) = parse(tokens);
        assert!(!errors.is_empty());
        // the second declaration still parses
        assert_eq!(file.declarations.len(), 2);
        let Decl::Fun(f) = &file.declarations[1] else {
            panic!()
        };
        assert_eq!(f.name.name, "main");
    }

    #[test]
    fn test_empty_body_reported() {
        let errors = parse_errors("f() { }\nmain() { return; }");
        assert!(errors
            .iter()
            .any(|e| matches!(e, CompilerError::EmptyFunctionBody { .. })));
    }

    #[test]
    fn test_call_statement() {
        let file = parse_ok("main() { println(1 + 2); }");
        let Decl::Fun(f) = &file.declarations[0] else {
            panic!()
        };
        assert!(matches!(f.body.statements[0], Statement::Expr(_)));
    }
}
