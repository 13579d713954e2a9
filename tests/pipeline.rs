use minic::{
    ast::{build::*, BinOp, Program},
    compile, Options,
};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn lines(program: &minic::ir::Program) -> Vec<String> {
    program.code.iter().map(ToString::to_string).collect()
}

fn sum() -> Program {
    program(vec![function(
        "int",
        "sum",
        vec![],
        vec![
            decl("int", "a", Some(num("3"))),
            decl("int", "b", Some(num("4"))),
            decl("int", "c", Some(bin(var("a"), BinOp::Add, var("b")))),
            ret(Some(var("c"))),
        ],
    )])
}

#[test]
fn straight_line_function() {
    init();

    let compilation = compile(&sum(), Options::default()).unwrap();
    assert!(compilation.succeeded(), "{}", compilation.diagnostics);

    assert_eq!(
        lines(&compilation.ir),
        [
            "function sum():",
            "a = 3",
            "b = 4",
            "t0 = a + b",
            "c = t0",
            "return c"
        ]
    );

    assert_eq!(lines(&compilation.optimized), ["function sum():", "return 7"]);

    let assembly = compilation.assembly.unwrap();
    let body = &assembly[assembly.find("\nsum:").unwrap()..];
    assert!(body.contains("\n.exit:"));
}

#[test]
fn loops_with_break() {
    init();

    let source = program(vec![
        decl("int", "total", Some(num("0"))),
        for_(
            Some(decl("int", "i", Some(num("0")))),
            bin(var("i"), BinOp::Less, num("5")),
            Some(assign("i", bin(var("i"), BinOp::Add, num("1")))),
            vec![
                if_(bin(var("i"), BinOp::Equal, num("3")), vec![brk()], None),
                assign("total", bin(var("total"), BinOp::Add, var("i"))),
            ],
        ),
    ]);

    let compilation = compile(&source, Options::default()).unwrap();
    assert!(compilation.succeeded(), "{}", compilation.diagnostics);

    let ir = lines(&compilation.ir);
    assert_eq!(ir.iter().filter(|line| *line == "goto l3").count(), 2);

    // `total` es global y debe sobrevivir a la optimización
    let optimized = lines(&compilation.optimized);
    assert!(optimized.iter().any(|line| line.starts_with("total = ")));
    assert!(optimized.contains(&String::from("l3:")));
}

#[test]
fn optimization_reaches_a_fixed_point() {
    init();

    let source = program(vec![
        decl("int", "n", Some(num("10"))),
        decl("double", "scale", Some(num("0.5"))),
        while_(
            bin(var("n"), BinOp::Greater, num("0")),
            vec![
                assign("scale", bin(var("scale"), BinOp::Mul, num("2"))),
                assign("n", bin(var("n"), BinOp::Sub, num("1"))),
            ],
        ),
    ]);

    let compilation = compile(&source, Options::default()).unwrap();
    let again = minic::opt::optimize(&compilation.optimized);

    assert_eq!(compilation.optimized, again);
}

#[test]
fn semantic_errors_do_not_stop_the_pipeline() {
    init();

    let source = program(vec![
        assign("missing", num("1")),
        decl("int", "x", Some(num("1"))),
        brk(),
    ]);

    let compilation = compile(&source, Options::default()).unwrap();

    assert!(!compilation.succeeded());
    assert_eq!(compilation.diagnostics.error_count(), 2);
    assert!(compilation
        .diagnostics
        .to_string()
        .ends_with("Build failed with 2 errors\n"));

    assert!(!compilation.ir.code.is_empty());
    assert!(compilation.assembly.is_some());
}

#[test]
fn optional_phases_can_be_skipped() {
    init();

    let compilation = compile(&sum(), Options::empty()).unwrap();

    assert_eq!(compilation.ir, compilation.optimized);
    assert!(compilation.assembly.is_none());
}

#[test]
fn artifacts_are_written_to_disk() {
    init();

    let directory = std::env::temp_dir().join(format!("minic_test_{}", std::process::id()));
    let compilation = compile(&sum(), Options::default()).unwrap();

    compilation.write_to(&directory, "sum").unwrap();

    let ir = std::fs::read_to_string(directory.join("sum.ir")).unwrap();
    let optimized = std::fs::read_to_string(directory.join("sum.opt.ir")).unwrap();
    let assembly = std::fs::read_to_string(directory.join("sum.asm")).unwrap();

    assert!(ir.starts_with("function sum():\n"));
    assert_eq!(optimized, "function sum():\nreturn 7\n");
    assert!(assembly.contains("section .text"));

    std::fs::remove_dir_all(&directory).ok();
}
