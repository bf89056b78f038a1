use crate::ast::{AssignOp, Ast, AstKind, BinaryOp, ReturnType, UnaryOp};
use crate::error::{CompileError, CompileResult, SourceLocation};
use crate::lexer::{Keyword, Punct, Token, TokenKind};

pub fn parse(tokens: &[Token]) -> CompileResult<Ast> {
    let mut parser = Parser::new(tokens);
    parser.parse_program()
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn parse_program(&mut self) -> CompileResult<Ast> {
        let location = self.location();
        let mut globals = Vec::new();
        let mut functions = Vec::new();

        while !self.at_eof() {
            let decl_location = self.location();
            let return_type = if self.consume_keyword(Keyword::Void) {
                ReturnType::Void
            } else if self.consume_keyword(Keyword::Int) {
                ReturnType::Int
            } else {
                return Err(self.error_expected("a function or variable declaration"));
            };
            let name = self.expect_ident()?;

            // One token decides it: '(' starts a function definition,
            // anything else continues a global variable declaration.
            if self.consume_punct(Punct::LParen) {
                let parameters = self.parse_params()?;
                let body = self.parse_block()?;
                functions.push(Ast::new(
                    AstKind::FunctionDecl {
                        name,
                        return_type,
                        parameters,
                        body: Box::new(body),
                    },
                    decl_location,
                ));
            } else {
                globals.push(self.parse_decl_rest(name, decl_location)?);
            }
        }

        Ok(Ast::new(
            AstKind::Program { globals, functions },
            location,
        ))
    }

    fn parse_params(&mut self) -> CompileResult<Vec<String>> {
        let mut params = Vec::new();
        while !self.check_punct(Punct::RParen) {
            // The 'int' before a parameter name is accepted and ignored.
            self.consume_keyword(Keyword::Int);
            params.push(self.expect_ident()?);
            if !self.check_punct(Punct::RParen) {
                self.expect_punct(Punct::Comma)?;
            }
        }
        self.expect_punct(Punct::RParen)?;
        Ok(params)
    }

    /// The tail of a variable declaration, after `int name` has been
    /// consumed: optional `[N]`, optional `= expr`, `;`.
    fn parse_decl_rest(&mut self, name: String, location: SourceLocation) -> CompileResult<Ast> {
        let mut is_array = false;
        let mut array_size = None;
        if self.consume_punct(Punct::LBracket) {
            is_array = true;
            array_size = Some(self.expect_num()?);
            self.expect_punct(Punct::RBracket)?;
        }
        let initializer = if self.consume_punct(Punct::Assign) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        self.expect_punct(Punct::Semicolon)?;
        Ok(Ast::new(
            AstKind::VarDecl {
                name,
                is_array,
                array_size,
                initializer,
            },
            location,
        ))
    }

    fn parse_block(&mut self) -> CompileResult<Ast> {
        let location = self.location();
        self.expect_punct(Punct::LBrace)?;
        let mut statements = Vec::new();
        while !self.check_punct(Punct::RBrace) {
            if self.at_eof() {
                return Err(self.error_expected("'}'"));
            }
            statements.push(self.parse_stmt()?);
        }
        self.expect_punct(Punct::RBrace)?;
        Ok(Ast::new(AstKind::Block { statements }, location))
    }

    fn parse_stmt(&mut self) -> CompileResult<Ast> {
        let location = self.location();

        if self.consume_keyword(Keyword::Int) {
            let name = self.expect_ident()?;
            return self.parse_decl_rest(name, location);
        }

        if self.consume_keyword(Keyword::If) {
            self.expect_punct(Punct::LParen)?;
            let condition = self.parse_expr()?;
            self.expect_punct(Punct::RParen)?;
            let then = self.parse_stmt()?;
            // Dangling else binds to the nearest if.
            let els = if self.consume_keyword(Keyword::Else) {
                Some(Box::new(self.parse_stmt()?))
            } else {
                None
            };
            return Ok(Ast::new(
                AstKind::IfStatement {
                    condition: Box::new(condition),
                    then: Box::new(then),
                    els,
                },
                location,
            ));
        }

        if self.consume_keyword(Keyword::While) {
            self.expect_punct(Punct::LParen)?;
            let condition = self.parse_expr()?;
            self.expect_punct(Punct::RParen)?;
            let body = self.parse_stmt()?;
            return Ok(Ast::new(
                AstKind::WhileLoop {
                    condition: Box::new(condition),
                    body: Box::new(body),
                },
                location,
            ));
        }

        if self.consume_keyword(Keyword::For) {
            return self.parse_for(location);
        }

        if self.consume_keyword(Keyword::Return) {
            let value = if self.check_punct(Punct::Semicolon) {
                None
            } else {
                Some(Box::new(self.parse_expr()?))
            };
            self.expect_punct(Punct::Semicolon)?;
            return Ok(Ast::new(AstKind::ReturnStatement { value }, location));
        }

        if self.check_punct(Punct::LBrace) {
            return self.parse_block();
        }

        let expr = self.parse_expr()?;
        self.expect_punct(Punct::Semicolon)?;
        Ok(expr)
    }

    fn parse_for(&mut self, location: SourceLocation) -> CompileResult<Ast> {
        self.expect_punct(Punct::LParen)?;

        let init = if self.consume_keyword(Keyword::Int) {
            // `for (int i = 0; ...)` declares a plain scalar.
            let decl_location = self.location();
            let name = self.expect_ident()?;
            let initializer = if self.consume_punct(Punct::Assign) {
                Some(Box::new(self.parse_expr()?))
            } else {
                None
            };
            Some(Box::new(Ast::new(
                AstKind::VarDecl {
                    name,
                    is_array: false,
                    array_size: None,
                    initializer,
                },
                decl_location,
            )))
        } else if !self.check_punct(Punct::Semicolon) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        self.expect_punct(Punct::Semicolon)?;

        let condition = if self.check_punct(Punct::Semicolon) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        self.expect_punct(Punct::Semicolon)?;

        let update = if self.check_punct(Punct::RParen) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        self.expect_punct(Punct::RParen)?;

        let body = self.parse_stmt()?;
        Ok(Ast::new(
            AstKind::ForLoop {
                init,
                condition,
                update,
                body: Box::new(body),
            },
            location,
        ))
    }

    fn parse_expr(&mut self) -> CompileResult<Ast> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> CompileResult<Ast> {
        let left = self.parse_logical_or()?;
        let location = self.location();

        let operator = if self.consume_punct(Punct::Assign) {
            AssignOp::Plain
        } else if self.consume_punct(Punct::AddAssign) {
            AssignOp::Add
        } else if self.consume_punct(Punct::SubAssign) {
            AssignOp::Sub
        } else {
            return Ok(left);
        };

        // Right-associative.
        let right = self.parse_assignment()?;
        Ok(Ast::new(
            AstKind::Assignment {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            },
            location,
        ))
    }

    fn parse_logical_or(&mut self) -> CompileResult<Ast> {
        let mut expr = self.parse_logical_and()?;
        loop {
            let location = self.location();
            if !self.consume_punct(Punct::LogOr) {
                break;
            }
            let rhs = self.parse_logical_and()?;
            expr = binary(BinaryOp::Or, expr, rhs, location);
        }
        Ok(expr)
    }

    fn parse_logical_and(&mut self) -> CompileResult<Ast> {
        let mut expr = self.parse_equality()?;
        loop {
            let location = self.location();
            if !self.consume_punct(Punct::LogAnd) {
                break;
            }
            let rhs = self.parse_equality()?;
            expr = binary(BinaryOp::And, expr, rhs, location);
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> CompileResult<Ast> {
        let mut expr = self.parse_relational()?;
        loop {
            let location = self.location();
            let op = if self.consume_punct(Punct::EqEq) {
                BinaryOp::Eq
            } else if self.consume_punct(Punct::NotEq) {
                BinaryOp::Ne
            } else {
                break;
            };
            let rhs = self.parse_relational()?;
            expr = binary(op, expr, rhs, location);
        }
        Ok(expr)
    }

    fn parse_relational(&mut self) -> CompileResult<Ast> {
        let mut expr = self.parse_additive()?;
        loop {
            let location = self.location();
            let op = if self.consume_punct(Punct::Less) {
                BinaryOp::Lt
            } else if self.consume_punct(Punct::LessEq) {
                BinaryOp::Le
            } else if self.consume_punct(Punct::Greater) {
                BinaryOp::Gt
            } else if self.consume_punct(Punct::GreaterEq) {
                BinaryOp::Ge
            } else {
                break;
            };
            let rhs = self.parse_additive()?;
            expr = binary(op, expr, rhs, location);
        }
        Ok(expr)
    }

    fn parse_additive(&mut self) -> CompileResult<Ast> {
        let mut expr = self.parse_multiplicative()?;
        loop {
            let location = self.location();
            let op = if self.consume_punct(Punct::Plus) {
                BinaryOp::Add
            } else if self.consume_punct(Punct::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            let rhs = self.parse_multiplicative()?;
            expr = binary(op, expr, rhs, location);
        }
        Ok(expr)
    }

    fn parse_multiplicative(&mut self) -> CompileResult<Ast> {
        let mut expr = self.parse_unary()?;
        loop {
            let location = self.location();
            let op = if self.consume_punct(Punct::Star) {
                BinaryOp::Mul
            } else if self.consume_punct(Punct::Slash) {
                BinaryOp::Div
            } else if self.consume_punct(Punct::Percent) {
                BinaryOp::Mod
            } else {
                break;
            };
            let rhs = self.parse_unary()?;
            expr = binary(op, expr, rhs, location);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> CompileResult<Ast> {
        let location = self.location();

        if self.consume_punct(Punct::Minus) {
            let operand = self.parse_unary()?;
            return Ok(Ast::new(
                AstKind::UnaryOp {
                    operator: UnaryOp::Neg,
                    operand: Box::new(operand),
                },
                location,
            ));
        }
        if self.consume_punct(Punct::Not) {
            let operand = self.parse_unary()?;
            return Ok(Ast::new(
                AstKind::UnaryOp {
                    operator: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                location,
            ));
        }

        // Prefix ++/-- desugar to `name = name +/- 1` on the spot.
        let inc = self.check_punct(Punct::Inc);
        if inc || self.check_punct(Punct::Dec) {
            self.pos += 1;
            let name = self.expect_ident()?;
            let var = |loc| Ast::new(AstKind::Variable { name: name.clone() }, loc);
            let one = Ast::new(AstKind::NumLiteral { value: 1 }, location);
            let op = if inc { BinaryOp::Add } else { BinaryOp::Sub };
            return Ok(Ast::new(
                AstKind::Assignment {
                    operator: AssignOp::Plain,
                    left: Box::new(var(location)),
                    right: Box::new(binary(op, var(location), one, location)),
                },
                location,
            ));
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> CompileResult<Ast> {
        let token = self.peek().clone();
        let location = token.location;
        match token.kind {
            TokenKind::Num(value) => {
                self.pos += 1;
                Ok(Ast::new(AstKind::NumLiteral { value }, location))
            }
            TokenKind::Str(value) => {
                self.pos += 1;
                Ok(Ast::new(AstKind::StringLiteral { value }, location))
            }
            TokenKind::Punct(Punct::LParen) => {
                self.pos += 1;
                let expr = self.parse_expr()?;
                self.expect_punct(Punct::RParen)?;
                Ok(expr)
            }
            TokenKind::Punct(Punct::Amp) => {
                self.pos += 1;
                let name = self.expect_ident()?;
                Ok(Ast::new(AstKind::AddressOf { name }, location))
            }
            TokenKind::Ident(name) => {
                self.pos += 1;
                if self.consume_punct(Punct::LParen) {
                    let mut arguments = Vec::new();
                    while !self.check_punct(Punct::RParen) {
                        arguments.push(self.parse_expr()?);
                        if !self.check_punct(Punct::RParen) {
                            self.expect_punct(Punct::Comma)?;
                        }
                    }
                    self.expect_punct(Punct::RParen)?;
                    return Ok(Ast::new(AstKind::FunctionCall { name, arguments }, location));
                }
                if self.consume_punct(Punct::LBracket) {
                    let index = self.parse_expr()?;
                    self.expect_punct(Punct::RBracket)?;
                    return Ok(Ast::new(
                        AstKind::ArrayAccess {
                            name,
                            index: Box::new(index),
                        },
                        location,
                    ));
                }
                Ok(Ast::new(AstKind::Variable { name }, location))
            }
            _ => Err(self.error_expected("an expression")),
        }
    }

    fn consume_keyword(&mut self, kw: Keyword) -> bool {
        if matches!(self.peek().kind, TokenKind::Keyword(found) if found == kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_ident(&mut self) -> CompileResult<String> {
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error_expected("an identifier")),
        }
    }

    fn expect_num(&mut self) -> CompileResult<i32> {
        match self.peek().kind {
            TokenKind::Num(value) => {
                self.pos += 1;
                Ok(value)
            }
            _ => Err(self.error_expected("a number")),
        }
    }

    fn expect_punct(&mut self, punct: Punct) -> CompileResult<()> {
        if self.consume_punct(punct) {
            Ok(())
        } else {
            Err(self.error_expected(format!("'{punct}'")))
        }
    }

    fn consume_punct(&mut self, punct: Punct) -> bool {
        if matches!(self.peek().kind, TokenKind::Punct(found) if found == punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn check_punct(&self, punct: Punct) -> bool {
        matches!(self.peek().kind, TokenKind::Punct(found) if found == punct)
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn peek(&self) -> &Token {
        // Saturates at the trailing Eof token.
        self.tokens
            .get(self.pos)
            .unwrap_or_else(|| &self.tokens[self.tokens.len() - 1])
    }

    fn location(&self) -> SourceLocation {
        self.peek().location
    }

    fn error_expected(&self, expected: impl Into<String>) -> CompileError {
        let expected = expected.into();
        let found = token_desc(self.peek());
        CompileError::at(
            format!("expected {expected}, found {found}"),
            self.peek().location,
        )
    }
}

fn binary(op: BinaryOp, lhs: Ast, rhs: Ast, location: SourceLocation) -> Ast {
    Ast::new(
        AstKind::BinaryOp {
            operator: op,
            left: Box::new(lhs),
            right: Box::new(rhs),
        },
        location,
    )
}

fn token_desc(token: &Token) -> String {
    match &token.kind {
        TokenKind::Keyword(kw) => format!("keyword '{kw}'"),
        TokenKind::Ident(name) => format!("identifier '{name}'"),
        TokenKind::Num(value) => format!("number {value}"),
        TokenKind::Str(_) => "string literal".to_string(),
        TokenKind::Punct(punct) => format!("'{punct}'"),
        TokenKind::Eof => "end of file".to_string(),
    }
}
