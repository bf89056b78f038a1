//! Assembly generation. Two sibling back-ends share the walk order and the
//! calling discipline (every expression leaves its value in the return
//! register) but select instructions independently.

mod arm64;
mod x86_64;

use crate::ast::Ast;
use crate::error::CompileResult;

/// Object-file conventions, fixed at start-up from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub is_arm64: bool,
    pub is_linux: bool,
}

impl Target {
    pub fn host() -> Self {
        Self {
            is_arm64: cfg!(target_arch = "aarch64"),
            is_linux: cfg!(target_os = "linux"),
        }
    }

    /// Mach-O decorates externally visible symbols with a leading
    /// underscore; ELF does not.
    fn symbol_prefix(self) -> &'static str {
        if self.is_linux {
            ""
        } else {
            "_"
        }
    }

    fn text_section(self) -> &'static str {
        if self.is_linux {
            ".section .text"
        } else {
            ".section __TEXT,__text"
        }
    }

    fn data_section(self) -> &'static str {
        if self.is_linux {
            ".section .data"
        } else {
            ".section __DATA,__data"
        }
    }

    fn rodata_section(self) -> &'static str {
        if self.is_linux {
            ".section .rodata"
        } else {
            ".section __TEXT,__cstring"
        }
    }
}

/// Generates assembly for the host target.
pub fn generate(program: &Ast) -> CompileResult<String> {
    generate_for(program, Target::host())
}

/// Generates assembly for an explicit target; lets tests cover both
/// back-ends and both object-file conventions on any host.
pub fn generate_for(program: &Ast, target: Target) -> CompileResult<String> {
    if target.is_arm64 {
        arm64::Codegen::new(target).generate(program)
    } else {
        x86_64::Codegen::new(target).generate(program)
    }
}
