use crate::error::SourceLocation;
use serde::Serialize;

/// A syntax tree node. The kind flattens into the node's JSON object, so
/// `--dump-ast` output carries a `type` field per node; source locations are
/// diagnostic-only and never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ast {
    #[serde(flatten)]
    pub kind: AstKind,
    #[serde(skip)]
    pub location: SourceLocation,
}

impl Ast {
    pub fn new(kind: AstKind, location: SourceLocation) -> Self {
        Self { kind, location }
    }
}

/// Variant names double as the `type` tag in the JSON dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum AstKind {
    NumLiteral {
        value: i32,
    },
    StringLiteral {
        value: String,
    },
    Variable {
        name: String,
    },
    BinaryOp {
        operator: BinaryOp,
        left: Box<Ast>,
        right: Box<Ast>,
    },
    UnaryOp {
        operator: UnaryOp,
        operand: Box<Ast>,
    },
    Assignment {
        operator: AssignOp,
        left: Box<Ast>,
        right: Box<Ast>,
    },
    FunctionCall {
        name: String,
        arguments: Vec<Ast>,
    },
    IfStatement {
        condition: Box<Ast>,
        then: Box<Ast>,
        #[serde(rename = "else")]
        els: Option<Box<Ast>>,
    },
    WhileLoop {
        condition: Box<Ast>,
        body: Box<Ast>,
    },
    ForLoop {
        init: Option<Box<Ast>>,
        condition: Option<Box<Ast>>,
        update: Option<Box<Ast>>,
        body: Box<Ast>,
    },
    ReturnStatement {
        value: Option<Box<Ast>>,
    },
    Block {
        statements: Vec<Ast>,
    },
    VarDecl {
        name: String,
        #[serde(rename = "isArray")]
        is_array: bool,
        #[serde(rename = "arraySize", skip_serializing_if = "Option::is_none")]
        array_size: Option<i32>,
        initializer: Option<Box<Ast>>,
    },
    FunctionDecl {
        name: String,
        #[serde(rename = "returnType")]
        return_type: ReturnType,
        parameters: Vec<String>,
        body: Box<Ast>,
    },
    Program {
        globals: Vec<Ast>,
        functions: Vec<Ast>,
    },
    ArrayAccess {
        name: String,
        index: Box<Ast>,
    },
    AddressOf {
        name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "%")]
    Mod,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "&&")]
    And,
    #[serde(rename = "||")]
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    #[serde(rename = "-")]
    Neg,
    #[serde(rename = "!")]
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssignOp {
    #[serde(rename = "=")]
    Plain,
    #[serde(rename = "+=")]
    Add,
    #[serde(rename = "-=")]
    Sub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReturnType {
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "void")]
    Void,
}
