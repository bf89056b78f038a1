use minicc::ast::Ast;
use minicc::lexer::{self, TokenKind};
use minicc::parser;
use minicc::symtab::{SymbolKind, SymbolTable};
use serde_json::Value;

fn parse(src: &str) -> Ast {
    let tokens = lexer::tokenize(src).expect("tokenize");
    parser::parse(&tokens).expect("parse")
}

fn parse_json(src: &str) -> Value {
    serde_json::to_value(parse(src)).expect("serialize")
}

#[test]
fn tokenizes_in_source_order() {
    let tokens = lexer::tokenize("int x = 42;").expect("tokenize");
    let kinds: Vec<String> = tokens.iter().map(|t| format!("{:?}", t.kind)).collect();
    assert_eq!(
        kinds,
        [
            "Keyword(Int)",
            "Ident(\"x\")",
            "Punct(Assign)",
            "Num(42)",
            "Punct(Semicolon)",
            "Eof"
        ]
    );
}

#[test]
fn empty_input_is_a_single_eof() {
    let tokens = lexer::tokenize("").expect("tokenize");
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].kind, TokenKind::Eof);
}

#[test]
fn comments_are_whitespace() {
    let src = "// line\nint x; /* block\nspanning lines */ int y;";
    let tokens = lexer::tokenize(src).expect("tokenize");
    let idents: Vec<_> = tokens
        .iter()
        .filter_map(|t| match &t.kind {
            TokenKind::Ident(name) => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(idents, ["x", "y"]);
}

#[test]
fn unterminated_block_comment_reaches_eof_without_error() {
    let tokens = lexer::tokenize("int x; /* never closed").expect("tokenize");
    assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    assert_eq!(tokens.len(), 4);
}

#[test]
fn string_literals_keep_escapes_verbatim() {
    let tokens = lexer::tokenize(r#""a\n\"b""#).expect("tokenize");
    assert_eq!(tokens[0].kind, TokenKind::Str(r#"a\n\"b"#.to_string()));
}

#[test]
fn lone_pipe_is_rejected() {
    let err = lexer::tokenize("int x = 1 | 2;").unwrap_err();
    assert!(err.message().contains("expected '||'"), "{err}");
    assert_eq!(err.location().unwrap().line, 1);
}

#[test]
fn number_overflow_wraps_silently() {
    let tokens = lexer::tokenize("99999999999999999999").expect("tokenize");
    assert!(matches!(tokens[0].kind, TokenKind::Num(_)));
}

#[test]
fn positions_track_lines_and_columns() {
    let tokens = lexer::tokenize("int\n  x;").expect("tokenize");
    assert_eq!((tokens[0].location.line, tokens[0].location.column), (1, 1));
    assert_eq!((tokens[1].location.line, tokens[1].location.column), (2, 3));
}

#[test]
fn multiplication_binds_tighter_than_addition() {
    let v = parse_json("int main() { return 1 + 2 * 3; }");
    let ret = &v["functions"][0]["body"]["statements"][0];
    assert_eq!(ret["type"], "ReturnStatement");
    let value = &ret["value"];
    assert_eq!(value["operator"], "+");
    assert_eq!(value["right"]["operator"], "*");
}

#[test]
fn comparison_binds_tighter_than_logical_and() {
    let v = parse_json("int main() { return 1 < 2 && 3 == 3; }");
    let value = &v["functions"][0]["body"]["statements"][0]["value"];
    assert_eq!(value["operator"], "&&");
    assert_eq!(value["left"]["operator"], "<");
    assert_eq!(value["right"]["operator"], "==");
}

#[test]
fn assignment_is_right_associative() {
    let v = parse_json("int main() { int a; int b; a = b = 1; }");
    let assign = &v["functions"][0]["body"]["statements"][2];
    assert_eq!(assign["type"], "Assignment");
    assert_eq!(assign["right"]["type"], "Assignment");
}

#[test]
fn dangling_else_binds_to_nearest_if() {
    let v = parse_json("int main() { int x; if (1) if (2) x = 1; else x = 2; }");
    let outer = &v["functions"][0]["body"]["statements"][1];
    assert_eq!(outer["type"], "IfStatement");
    assert!(outer["else"].is_null());
    let inner = &outer["then"];
    assert_eq!(inner["type"], "IfStatement");
    assert_eq!(inner["else"]["type"], "Assignment");
}

#[test]
fn prefix_increment_desugars_to_assignment() {
    let v = parse_json("int main() { int x = 0; ++x; --x; }");
    let inc = &v["functions"][0]["body"]["statements"][1];
    assert_eq!(inc["type"], "Assignment");
    assert_eq!(inc["operator"], "=");
    assert_eq!(inc["left"], serde_json::json!({"type": "Variable", "name": "x"}));
    assert_eq!(inc["right"]["operator"], "+");
    assert_eq!(inc["right"]["right"], serde_json::json!({"type": "NumLiteral", "value": 1}));
    let dec = &v["functions"][0]["body"]["statements"][2];
    assert_eq!(dec["right"]["operator"], "-");
}

#[test]
fn compound_assignment_keeps_its_operator() {
    let v = parse_json("int main() { int x = 0; x += 2; x -= 1; }");
    assert_eq!(v["functions"][0]["body"]["statements"][1]["operator"], "+=");
    assert_eq!(v["functions"][0]["body"]["statements"][2]["operator"], "-=");
}

#[test]
fn for_loop_parts_may_be_absent() {
    let v = parse_json("int main() { for (;;) { return 0; } }");
    let f = &v["functions"][0]["body"]["statements"][0];
    assert_eq!(f["type"], "ForLoop");
    assert!(f["init"].is_null());
    assert!(f["condition"].is_null());
    assert!(f["update"].is_null());
}

#[test]
fn for_loop_can_declare_its_counter() {
    let v = parse_json("int main() { for (int i = 0; i < 3; i = i + 1) {} }");
    let f = &v["functions"][0]["body"]["statements"][0];
    assert_eq!(f["init"]["type"], "VarDecl");
    assert_eq!(f["init"]["name"], "i");
}

#[test]
fn top_level_splits_globals_from_functions() {
    let v = parse_json("int g = 1;\nint a[5];\nint main() { return g; }\nvoid noop() {}");
    assert_eq!(v["type"], "Program");
    assert_eq!(v["globals"].as_array().unwrap().len(), 2);
    assert_eq!(v["functions"].as_array().unwrap().len(), 2);
    assert_eq!(v["functions"][0]["returnType"], "int");
    assert_eq!(v["functions"][1]["returnType"], "void");
}

#[test]
fn array_decl_carries_its_size() {
    let v = parse_json("int a[5];");
    let decl = &v["globals"][0];
    assert_eq!(decl["isArray"], true);
    assert_eq!(decl["arraySize"], 5);
    assert!(decl["initializer"].is_null());
}

#[test]
fn scalar_decl_has_no_array_size_field() {
    let v = parse_json("int g = 7;");
    let decl = &v["globals"][0];
    assert_eq!(decl["isArray"], false);
    assert!(decl.get("arraySize").is_none());
    assert_eq!(decl["initializer"]["value"], 7);
}

#[test]
fn parameter_type_keywords_are_optional() {
    let v = parse_json("int add(int a, b) { return a + b; }");
    assert_eq!(v["functions"][0]["parameters"], serde_json::json!(["a", "b"]));
}

#[test]
fn call_array_access_and_address_of_parse() {
    let v = parse_json("int main() { int a[2]; f(a[0], &a); return 0; }");
    let call = &v["functions"][0]["body"]["statements"][1];
    assert_eq!(call["type"], "FunctionCall");
    assert_eq!(call["arguments"][0]["type"], "ArrayAccess");
    assert_eq!(call["arguments"][1]["type"], "AddressOf");
}

#[test]
fn locations_do_not_leak_into_json() {
    let v = parse_json("int main() { return 0; }");
    assert!(v.get("location").is_none());
    assert!(v["functions"][0].get("location").is_none());
}

#[test]
fn pointer_declarator_is_a_syntax_error() {
    let tokens = lexer::tokenize("int main() { int x = 3; int *u; return 0; }").unwrap();
    let err = parser::parse(&tokens).unwrap_err();
    assert!(err.message().contains("expected an identifier"), "{err}");
}

#[test]
fn truncated_input_reports_instead_of_running_off_the_end() {
    let tokens = lexer::tokenize("int main() {").unwrap();
    let err = parser::parse(&tokens).unwrap_err();
    assert!(err.message().contains("end of file"), "{err}");
}

#[test]
fn serialized_tree_is_reproducible() {
    let src = "int g;\nint main() { for (int i = 0; i < 3; ++i) g += i; return g; }";
    assert_eq!(parse(src), parse(src));
    assert_eq!(parse_json(src), parse_json(src));
}

#[test]
fn symbol_table_layout_and_lifetime() {
    let mut table = SymbolTable::new();
    table.define_global("g", false, 0);

    let mark = table.enter_function(2);
    table.define_param("a", 0);
    table.define_param("b", 1);

    // First local lands just past the parameter spill slots.
    assert_eq!(table.define_local("x", false, 0), 24);
    assert_eq!(table.define_local("arr", true, 5), 48);
    assert_eq!(table.define_local("y", false, 0), 56);

    // Reverse scan: the innermost binding wins.
    table.define_local("g", false, 0);
    assert!(matches!(
        table.resolve("g").unwrap().kind,
        SymbolKind::Local { .. }
    ));
    assert!(matches!(
        table.resolve("b").unwrap().kind,
        SymbolKind::Param { index: 1 }
    ));
    assert!(table.resolve("missing").is_none());

    // Function exit restores the pre-function state.
    table.leave_function(mark);
    assert_eq!(table.len(), 1);
    assert!(matches!(table.resolve("g").unwrap().kind, SymbolKind::Global));
}
