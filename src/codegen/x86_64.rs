use super::Target;
use crate::ast::{AssignOp, Ast, AstKind, BinaryOp, UnaryOp};
use crate::error::{CompileError, CompileResult, SourceLocation};
use crate::symtab::{Symbol, SymbolKind, SymbolTable};

const ARG_REGS: [&str; 6] = ["rdi", "rsi", "rdx", "rcx", "r8", "r9"];

/// One-pass x86-64 emitter (AT&T syntax). Every expression leaves its
/// result in `eax`; binary operands go left-push-right through the stack.
pub(super) struct Codegen<'a> {
    target: Target,
    out: String,
    label_count: usize,
    symbols: SymbolTable,
    strings: Vec<&'a str>,
}

impl<'a> Codegen<'a> {
    pub(super) fn new(target: Target) -> Self {
        Self {
            target,
            out: String::new(),
            label_count: 0,
            symbols: SymbolTable::new(),
            strings: Vec::new(),
        }
    }

    pub(super) fn generate(mut self, program: &'a Ast) -> CompileResult<String> {
        let AstKind::Program { globals, functions } = &program.kind else {
            return Err(CompileError::at("expected a program", program.location));
        };

        for global in globals {
            if let AstKind::VarDecl {
                name,
                is_array,
                array_size,
                ..
            } = &global.kind
            {
                self.symbols
                    .define_global(name, *is_array, array_size.unwrap_or(0));
            }
        }

        self.emit(self.target.text_section());
        self.emit("");

        for func in functions {
            self.gen_func(func)?;
        }

        self.emit(self.target.data_section());
        for global in globals {
            self.gen_global(global)?;
        }

        self.emit(self.target.rodata_section());
        let prefix = self.target.symbol_prefix();
        for (i, text) in self.strings.iter().enumerate() {
            self.out.push_str(&format!("{prefix}str{i}:\n"));
            self.out.push_str(&format!("    .asciz \"{text}\"\n"));
        }

        Ok(self.out)
    }

    fn gen_global(&mut self, global: &Ast) -> CompileResult<()> {
        let AstKind::VarDecl {
            name,
            is_array,
            array_size,
            initializer,
        } = &global.kind
        else {
            return Err(CompileError::at(
                "expected a variable declaration",
                global.location,
            ));
        };
        let prefix = self.target.symbol_prefix();
        self.emit(&format!(".globl {prefix}{name}"));
        self.emit(&format!("{prefix}{name}:"));
        if *is_array {
            self.emit(&format!("    .zero {}", array_size.unwrap_or(0) * 4));
        } else {
            match initializer.as_deref() {
                Some(Ast {
                    kind: AstKind::NumLiteral { value },
                    ..
                }) => self.emit(&format!("    .long {value}")),
                Some(init) => {
                    return Err(CompileError::at(
                        format!("global initializer for '{name}' must be an integer literal"),
                        init.location,
                    ));
                }
                None => self.emit("    .long 0"),
            }
        }
        self.emit("");
        Ok(())
    }

    fn gen_func(&mut self, func: &'a Ast) -> CompileResult<()> {
        let AstKind::FunctionDecl {
            name,
            parameters,
            body,
            ..
        } = &func.kind
        else {
            return Err(CompileError::at(
                "expected a function definition",
                func.location,
            ));
        };
        if parameters.len() > ARG_REGS.len() {
            return Err(CompileError::at(
                format!("too many parameters in '{name}' (at most {})", ARG_REGS.len()),
                func.location,
            ));
        }

        let mark = self.symbols.enter_function(parameters.len());
        let prefix = self.target.symbol_prefix();

        self.emit(&format!(".globl {prefix}{name}"));
        self.emit(&format!("{prefix}{name}:"));

        // Prologue; the frame reservation is a fixed over-estimate.
        self.emit("    pushq %rbp");
        self.emit("    movq %rsp, %rbp");
        self.emit("    subq $256, %rsp");

        for (i, param) in parameters.iter().enumerate() {
            self.symbols.define_param(param, i);
            self.emit(&format!("    movq %{}, -{}(%rbp)", ARG_REGS[i], (i + 1) * 8));
        }

        self.gen_stmt(body)?;

        // Fall-through epilogue for bodies without a trailing return.
        self.emit_epilogue();
        self.emit("");

        self.symbols.leave_function(mark);
        Ok(())
    }

    fn gen_stmt(&mut self, node: &'a Ast) -> CompileResult<()> {
        match &node.kind {
            AstKind::VarDecl {
                name,
                is_array,
                array_size,
                initializer,
            } => {
                let offset =
                    self.symbols
                        .define_local(name, *is_array, array_size.unwrap_or(0));
                if let Some(init) = initializer {
                    self.gen_expr(init)?;
                    self.emit(&format!("    movl %eax, -{offset}(%rbp)"));
                }
                Ok(())
            }
            AstKind::IfStatement {
                condition,
                then,
                els,
            } => {
                let else_label = self.next_label();
                let end_label = self.next_label();
                self.gen_expr(condition)?;
                self.emit("    testl %eax, %eax");
                self.emit(&format!("    je L{else_label}"));
                self.gen_stmt(then)?;
                self.emit(&format!("    jmp L{end_label}"));
                self.emit(&format!("L{else_label}:"));
                if let Some(els) = els {
                    self.gen_stmt(els)?;
                }
                self.emit(&format!("L{end_label}:"));
                Ok(())
            }
            AstKind::WhileLoop { condition, body } => {
                let start_label = self.next_label();
                let end_label = self.next_label();
                self.emit(&format!("L{start_label}:"));
                self.gen_expr(condition)?;
                self.emit("    testl %eax, %eax");
                self.emit(&format!("    je L{end_label}"));
                self.gen_stmt(body)?;
                self.emit(&format!("    jmp L{start_label}"));
                self.emit(&format!("L{end_label}:"));
                Ok(())
            }
            AstKind::ForLoop {
                init,
                condition,
                update,
                body,
            } => {
                let start_label = self.next_label();
                let end_label = self.next_label();
                if let Some(init) = init {
                    self.gen_stmt(init)?;
                }
                self.emit(&format!("L{start_label}:"));
                // An absent condition loops unconditionally.
                if let Some(condition) = condition {
                    self.gen_expr(condition)?;
                    self.emit("    testl %eax, %eax");
                    self.emit(&format!("    je L{end_label}"));
                }
                self.gen_stmt(body)?;
                if let Some(update) = update {
                    self.gen_expr(update)?;
                }
                self.emit(&format!("    jmp L{start_label}"));
                self.emit(&format!("L{end_label}:"));
                Ok(())
            }
            AstKind::ReturnStatement { value } => {
                if let Some(value) = value {
                    self.gen_expr(value)?;
                }
                self.emit_epilogue();
                Ok(())
            }
            AstKind::Block { statements } => {
                for stmt in statements {
                    self.gen_stmt(stmt)?;
                }
                Ok(())
            }
            _ => self.gen_expr(node),
        }
    }

    fn gen_expr(&mut self, node: &'a Ast) -> CompileResult<()> {
        match &node.kind {
            AstKind::NumLiteral { value } => {
                self.emit(&format!("    movl ${value}, %eax"));
                Ok(())
            }
            AstKind::StringLiteral { value } => {
                let idx = self.strings.len();
                self.strings.push(value);
                let prefix = self.target.symbol_prefix();
                self.emit(&format!("    leaq {prefix}str{idx}(%rip), %rax"));
                Ok(())
            }
            AstKind::Variable { name } => {
                let sym = self.resolve(name, node.location)?;
                let prefix = self.target.symbol_prefix();
                match sym.kind {
                    SymbolKind::Global => {
                        // A global array evaluates to its address.
                        if sym.is_array {
                            self.emit(&format!("    leaq {prefix}{name}(%rip), %rax"));
                        } else {
                            self.emit(&format!("    movl {prefix}{name}(%rip), %eax"));
                        }
                    }
                    SymbolKind::Param { index } => {
                        self.emit(&format!("    movl -{}(%rbp), %eax", (index + 1) * 8));
                    }
                    SymbolKind::Local { offset } => {
                        self.emit(&format!("    movl -{offset}(%rbp), %eax"));
                    }
                }
                Ok(())
            }
            AstKind::AddressOf { name } => {
                let sym = self.resolve(name, node.location)?;
                match sym.kind {
                    SymbolKind::Global => {
                        let prefix = self.target.symbol_prefix();
                        self.emit(&format!("    leaq {prefix}{name}(%rip), %rax"));
                    }
                    SymbolKind::Param { index } => {
                        self.emit(&format!("    leaq -{}(%rbp), %rax", (index + 1) * 8));
                    }
                    SymbolKind::Local { offset } => {
                        self.emit(&format!("    leaq -{offset}(%rbp), %rax"));
                    }
                }
                Ok(())
            }
            AstKind::ArrayAccess { name, index } => {
                let sym = self.resolve(name, node.location)?;
                self.gen_expr(index)?;
                self.emit("    pushq %rax");
                self.emit_array_base(&sym, name);
                self.emit("    popq %rax");
                self.emit("    movl (%rcx,%rax,4), %eax");
                Ok(())
            }
            AstKind::BinaryOp {
                operator,
                left,
                right,
            } => {
                self.gen_expr(left)?;
                self.emit("    pushq %rax");
                self.gen_expr(right)?;
                self.emit("    movl %eax, %ecx");
                self.emit("    popq %rax");
                self.gen_binop(*operator);
                Ok(())
            }
            AstKind::UnaryOp { operator, operand } => {
                self.gen_expr(operand)?;
                match operator {
                    UnaryOp::Neg => self.emit("    negl %eax"),
                    UnaryOp::Not => {
                        self.emit("    testl %eax, %eax");
                        self.emit("    sete %al");
                        self.emit("    movzbl %al, %eax");
                    }
                }
                Ok(())
            }
            AstKind::Assignment {
                operator,
                left,
                right,
            } => self.gen_assign(*operator, left, right),
            AstKind::FunctionCall { name, arguments } => {
                self.gen_call(name, arguments, node.location)
            }
            _ => Err(CompileError::at(
                "cannot generate code for this expression",
                node.location,
            )),
        }
    }

    fn gen_binop(&mut self, op: BinaryOp) {
        match op {
            BinaryOp::Add => self.emit("    addl %ecx, %eax"),
            BinaryOp::Sub => self.emit("    subl %ecx, %eax"),
            BinaryOp::Mul => self.emit("    imull %ecx, %eax"),
            BinaryOp::Div => {
                self.emit("    cltd");
                self.emit("    idivl %ecx");
            }
            BinaryOp::Mod => {
                self.emit("    cltd");
                self.emit("    idivl %ecx");
                self.emit("    movl %edx, %eax");
            }
            BinaryOp::Eq => self.emit_cmp_set("sete"),
            BinaryOp::Ne => self.emit_cmp_set("setne"),
            BinaryOp::Lt => self.emit_cmp_set("setl"),
            BinaryOp::Gt => self.emit_cmp_set("setg"),
            BinaryOp::Le => self.emit_cmp_set("setle"),
            BinaryOp::Ge => self.emit_cmp_set("setge"),
            // Both operands were already evaluated; a conditional move picks
            // the result, then a final test normalizes to {0,1}.
            BinaryOp::And => {
                let label = self.next_label();
                self.emit("    testl %eax, %eax");
                self.emit(&format!("    je L{label}"));
                self.emit("    movl %ecx, %eax");
                self.emit(&format!("L{label}:"));
                self.emit("    testl %eax, %eax");
                self.emit("    setne %al");
                self.emit("    movzbl %al, %eax");
            }
            BinaryOp::Or => {
                let label = self.next_label();
                self.emit("    testl %eax, %eax");
                self.emit(&format!("    jne L{label}"));
                self.emit("    movl %ecx, %eax");
                self.emit(&format!("L{label}:"));
                self.emit("    testl %eax, %eax");
                self.emit("    setne %al");
                self.emit("    movzbl %al, %eax");
            }
        }
    }

    fn gen_assign(&mut self, op: AssignOp, left: &'a Ast, right: &'a Ast) -> CompileResult<()> {
        self.gen_expr(right)?;

        match &left.kind {
            AstKind::Variable { name } => {
                let sym = self.resolve(name, left.location)?;
                if op != AssignOp::Plain {
                    self.emit_compound(op, left)?;
                }
                let prefix = self.target.symbol_prefix();
                match sym.kind {
                    SymbolKind::Global => {
                        self.emit(&format!("    movl %eax, {prefix}{name}(%rip)"));
                    }
                    SymbolKind::Param { index } => {
                        self.emit(&format!("    movl %eax, -{}(%rbp)", (index + 1) * 8));
                    }
                    SymbolKind::Local { offset } => {
                        self.emit(&format!("    movl %eax, -{offset}(%rbp)"));
                    }
                }
                Ok(())
            }
            AstKind::ArrayAccess { name, index } => {
                let sym = self.resolve(name, left.location)?;
                if op != AssignOp::Plain {
                    // Reload the element, combine, then fall through to the
                    // plain store. The index expression runs again below.
                    self.emit_compound(op, left)?;
                }
                self.emit("    pushq %rax");
                self.gen_expr(index)?;
                self.emit("    pushq %rax");
                self.emit_array_base(&sym, name);
                self.emit("    popq %rax");
                self.emit("    popq %rdx");
                self.emit("    movl %edx, (%rcx,%rax,4)");
                self.emit("    movl %edx, %eax");
                Ok(())
            }
            _ => Err(CompileError::at(
                "assignment target must be a variable or array element",
                left.location,
            )),
        }
    }

    /// With the right-hand side in `eax`, folds in the current value of the
    /// target for `+=`/`-=`.
    fn emit_compound(&mut self, op: AssignOp, target: &'a Ast) -> CompileResult<()> {
        self.emit("    pushq %rax");
        self.gen_expr(target)?;
        self.emit("    movl %eax, %ecx");
        self.emit("    popq %rax");
        if op == AssignOp::Add {
            self.emit("    addl %ecx, %eax");
        } else {
            self.emit("    subl %eax, %ecx");
            self.emit("    movl %ecx, %eax");
        }
        Ok(())
    }

    fn gen_call(
        &mut self,
        name: &str,
        arguments: &'a [Ast],
        location: SourceLocation,
    ) -> CompileResult<()> {
        if arguments.len() > ARG_REGS.len() {
            return Err(CompileError::at(
                format!(
                    "too many arguments in call to '{name}' (at most {})",
                    ARG_REGS.len()
                ),
                location,
            ));
        }
        // Evaluate right to left, then pop into the argument registers.
        for arg in arguments.iter().rev() {
            self.gen_expr(arg)?;
            self.emit("    pushq %rax");
        }
        for reg in &ARG_REGS[..arguments.len()] {
            self.emit(&format!("    popq %{reg}"));
        }
        // Align the stack through callee-saved rbx; eax = 0 tells variadic
        // callees there are no vector arguments.
        self.emit("    pushq %rbx");
        self.emit("    movq %rsp, %rbx");
        self.emit("    andq $-16, %rsp");
        self.emit("    xorl %eax, %eax");
        let prefix = self.target.symbol_prefix();
        self.emit(&format!("    callq {prefix}{name}"));
        self.emit("    movq %rbx, %rsp");
        self.emit("    popq %rbx");
        Ok(())
    }

    fn emit_array_base(&mut self, sym: &Symbol, name: &str) {
        match sym.kind {
            SymbolKind::Global => {
                let prefix = self.target.symbol_prefix();
                self.emit(&format!("    leaq {prefix}{name}(%rip), %rcx"));
            }
            SymbolKind::Param { index } => {
                self.emit(&format!("    leaq -{}(%rbp), %rcx", (index + 1) * 8));
            }
            SymbolKind::Local { offset } => {
                self.emit(&format!("    leaq -{offset}(%rbp), %rcx"));
            }
        }
    }

    fn emit_cmp_set(&mut self, set: &str) {
        self.emit("    cmpl %ecx, %eax");
        self.emit(&format!("    {set} %al"));
        self.emit("    movzbl %al, %eax");
    }

    fn emit_epilogue(&mut self) {
        self.emit("    movq %rbp, %rsp");
        self.emit("    popq %rbp");
        self.emit("    retq");
    }

    fn resolve(&self, name: &str, location: SourceLocation) -> CompileResult<Symbol> {
        self.symbols
            .resolve(name)
            .cloned()
            .ok_or_else(|| CompileError::at(format!("Undefined variable: {name}"), location))
    }

    fn next_label(&mut self) -> usize {
        let label = self.label_count;
        self.label_count += 1;
        label
    }

    fn emit(&mut self, line: &str) {
        self.out.push_str(line);
        self.out.push('\n');
    }
}
