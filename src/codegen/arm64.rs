use super::Target;
use crate::ast::{AssignOp, Ast, AstKind, BinaryOp, UnaryOp};
use crate::error::{CompileError, CompileResult, SourceLocation};
use crate::symtab::{Symbol, SymbolKind, SymbolTable};

/// One-pass ARM64 emitter. Every expression leaves its result in `w0`;
/// binary operands go left-push-right through 16-byte stack slots, which
/// keeps `sp` aligned without any extra bookkeeping.
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

        // Globals are visible to every function body; seed them first.
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
        self.emit(".p2align 2");
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
        if parameters.len() > 6 {
            return Err(CompileError::at(
                format!("too many parameters in '{name}' (at most 6)"),
                func.location,
            ));
        }

        let mark = self.symbols.enter_function(parameters.len());
        let prefix = self.target.symbol_prefix();

        self.emit(&format!(".globl {prefix}{name}"));
        self.emit(".p2align 2");
        self.emit(&format!("{prefix}{name}:"));

        // Prologue; the frame reservation is a fixed over-estimate.
        self.emit("    stp x29, x30, [sp, #-16]!");
        self.emit("    mov x29, sp");
        self.emit("    sub sp, sp, #256");

        for (i, param) in parameters.iter().enumerate() {
            self.symbols.define_param(param, i);
            self.emit(&format!("    str x{}, [x29, #-{}]", i, (i + 1) * 8));
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
                    self.emit(&format!("    str w0, [x29, #-{offset}]"));
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
                self.emit(&format!("    cbz w0, L{else_label}"));
                self.gen_stmt(then)?;
                self.emit(&format!("    b L{end_label}"));
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
                self.emit(&format!("    cbz w0, L{end_label}"));
                self.gen_stmt(body)?;
                self.emit(&format!("    b L{start_label}"));
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
                    self.emit(&format!("    cbz w0, L{end_label}"));
                }
                self.gen_stmt(body)?;
                if let Some(update) = update {
                    self.gen_expr(update)?;
                }
                self.emit(&format!("    b L{start_label}"));
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
                let value = *value;
                if (0..65536).contains(&value) {
                    self.emit(&format!("    mov w0, #{value}"));
                } else {
                    // Wide literals load in 16-bit halves.
                    self.emit(&format!("    mov x0, #{}", value & 0xffff));
                    if value > 65535 {
                        self.emit(&format!(
                            "    movk x0, #{}, lsl #16",
                            (value >> 16) & 0xffff
                        ));
                    }
                }
                Ok(())
            }
            AstKind::StringLiteral { value } => {
                let idx = self.strings.len();
                self.strings.push(value);
                let prefix = self.target.symbol_prefix();
                self.emit(&format!("    adrp x0, {prefix}str{idx}@PAGE"));
                self.emit(&format!("    add x0, x0, {prefix}str{idx}@PAGEOFF"));
                Ok(())
            }
            AstKind::Variable { name } => {
                let sym = self.resolve(name, node.location)?;
                match sym.kind {
                    SymbolKind::Global => {
                        let prefix = self.target.symbol_prefix();
                        self.emit(&format!("    adrp x0, {prefix}{name}@PAGE"));
                        self.emit(&format!("    add x0, x0, {prefix}{name}@PAGEOFF"));
                        // A global array evaluates to its address.
                        if !sym.is_array {
                            self.emit("    ldr w0, [x0]");
                        }
                    }
                    SymbolKind::Param { index } => {
                        self.emit(&format!("    ldr w0, [x29, #-{}]", (index + 1) * 8));
                    }
                    SymbolKind::Local { offset } => {
                        self.emit(&format!("    ldr w0, [x29, #-{offset}]"));
                    }
                }
                Ok(())
            }
            AstKind::AddressOf { name } => {
                let sym = self.resolve(name, node.location)?;
                match sym.kind {
                    SymbolKind::Global => {
                        let prefix = self.target.symbol_prefix();
                        self.emit(&format!("    adrp x0, {prefix}{name}@PAGE"));
                        self.emit(&format!("    add x0, x0, {prefix}{name}@PAGEOFF"));
                    }
                    SymbolKind::Param { index } => {
                        self.emit(&format!("    sub x0, x29, #{}", (index + 1) * 8));
                    }
                    SymbolKind::Local { offset } => {
                        self.emit(&format!("    sub x0, x29, #{offset}"));
                    }
                }
                Ok(())
            }
            AstKind::ArrayAccess { name, index } => {
                let sym = self.resolve(name, node.location)?;
                self.gen_expr(index)?;
                self.emit("    str x0, [sp, #-16]!");
                self.emit_array_base(&sym, name);
                self.emit("    ldr x0, [sp], #16");
                self.emit("    ldr w0, [x1, x0, lsl #2]");
                Ok(())
            }
            AstKind::BinaryOp {
                operator,
                left,
                right,
            } => {
                self.gen_expr(left)?;
                self.emit("    str x0, [sp, #-16]!");
                self.gen_expr(right)?;
                self.emit("    mov x1, x0");
                self.emit("    ldr x0, [sp], #16");
                self.gen_binop(*operator);
                Ok(())
            }
            AstKind::UnaryOp { operator, operand } => {
                self.gen_expr(operand)?;
                match operator {
                    UnaryOp::Neg => self.emit("    neg w0, w0"),
                    UnaryOp::Not => {
                        self.emit("    cmp w0, #0");
                        self.emit("    cset w0, eq");
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
            BinaryOp::Add => self.emit("    add w0, w0, w1"),
            BinaryOp::Sub => self.emit("    sub w0, w0, w1"),
            BinaryOp::Mul => self.emit("    mul w0, w0, w1"),
            BinaryOp::Div => self.emit("    sdiv w0, w0, w1"),
            BinaryOp::Mod => {
                self.emit("    sdiv w2, w0, w1");
                self.emit("    msub w0, w2, w1, w0");
            }
            BinaryOp::Eq => self.emit_cmp_set("eq"),
            BinaryOp::Ne => self.emit_cmp_set("ne"),
            BinaryOp::Lt => self.emit_cmp_set("lt"),
            BinaryOp::Gt => self.emit_cmp_set("gt"),
            BinaryOp::Le => self.emit_cmp_set("le"),
            BinaryOp::Ge => self.emit_cmp_set("ge"),
            // Both operands were already evaluated; a conditional move picks
            // the result, then a final compare normalizes to {0,1}.
            BinaryOp::And => {
                let label = self.next_label();
                self.emit(&format!("    cbz w0, L{label}"));
                self.emit("    mov w0, w1");
                self.emit(&format!("L{label}:"));
                self.emit("    cmp w0, #0");
                self.emit("    cset w0, ne");
            }
            BinaryOp::Or => {
                let label = self.next_label();
                self.emit(&format!("    cbnz w0, L{label}"));
                self.emit("    mov w0, w1");
                self.emit(&format!("L{label}:"));
                self.emit("    cmp w0, #0");
                self.emit("    cset w0, ne");
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
                match sym.kind {
                    SymbolKind::Global => {
                        let prefix = self.target.symbol_prefix();
                        self.emit(&format!("    adrp x1, {prefix}{name}@PAGE"));
                        self.emit(&format!("    add x1, x1, {prefix}{name}@PAGEOFF"));
                        self.emit("    str w0, [x1]");
                    }
                    SymbolKind::Param { index } => {
                        self.emit(&format!("    str w0, [x29, #-{}]", (index + 1) * 8));
                    }
                    SymbolKind::Local { offset } => {
                        self.emit(&format!("    str w0, [x29, #-{offset}]"));
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
                self.emit("    str x0, [sp, #-16]!");
                self.gen_expr(index)?;
                self.emit("    str x0, [sp, #-16]!");
                self.emit_array_base(&sym, name);
                self.emit("    ldr x0, [sp], #16");
                self.emit("    ldr x2, [sp], #16");
                self.emit("    str w2, [x1, x0, lsl #2]");
                self.emit("    mov w0, w2");
                Ok(())
            }
            _ => Err(CompileError::at(
                "assignment target must be a variable or array element",
                left.location,
            )),
        }
    }

    /// With the right-hand side in `w0`, folds in the current value of the
    /// target for `+=`/`-=`.
    fn emit_compound(&mut self, op: AssignOp, target: &'a Ast) -> CompileResult<()> {
        self.emit("    str x0, [sp, #-16]!");
        self.gen_expr(target)?;
        self.emit("    mov w1, w0");
        self.emit("    ldr x0, [sp], #16");
        if op == AssignOp::Add {
            self.emit("    add w0, w1, w0");
        } else {
            self.emit("    sub w0, w1, w0");
        }
        Ok(())
    }

    fn gen_call(
        &mut self,
        name: &str,
        arguments: &'a [Ast],
        location: SourceLocation,
    ) -> CompileResult<()> {
        if arguments.len() > 8 {
            return Err(CompileError::at(
                format!("too many arguments in call to '{name}' (at most 8)"),
                location,
            ));
        }
        // Evaluate right to left, then pop into x0..; each argument holds a
        // full 16-byte slot so sp stays aligned.
        for arg in arguments.iter().rev() {
            self.gen_expr(arg)?;
            self.emit("    str x0, [sp, #-16]!");
        }
        for i in 0..arguments.len() {
            self.emit(&format!("    ldr x{i}, [sp], #16"));
        }
        let prefix = self.target.symbol_prefix();
        self.emit(&format!("    bl {prefix}{name}"));
        Ok(())
    }

    fn emit_array_base(&mut self, sym: &Symbol, name: &str) {
        match sym.kind {
            SymbolKind::Global => {
                let prefix = self.target.symbol_prefix();
                self.emit(&format!("    adrp x1, {prefix}{name}@PAGE"));
                self.emit(&format!("    add x1, x1, {prefix}{name}@PAGEOFF"));
            }
            SymbolKind::Param { index } => {
                self.emit(&format!("    sub x1, x29, #{}", (index + 1) * 8));
            }
            SymbolKind::Local { offset } => {
                self.emit(&format!("    sub x1, x29, #{offset}"));
            }
        }
    }

    fn emit_cmp_set(&mut self, cond: &str) {
        self.emit("    cmp w0, w1");
        self.emit(&format!("    cset w0, {cond}"));
    }

    fn emit_epilogue(&mut self) {
        self.emit("    mov sp, x29");
        self.emit("    ldp x29, x30, [sp], #16");
        self.emit("    ret");
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
