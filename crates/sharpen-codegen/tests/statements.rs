//! Function bodies: control flow, locals and initializers.

use sharpen_build::GeneratorConfig;
use sharpen_clang::{AstBuilder, BinaryOp, RecordTag, StmtKind, UnaryOp};
use sharpen_codegen::CSharpGenerator;

fn render(b: AstBuilder) -> String {
    let config = GeneratorConfig::default()
        .with_namespace("ClangSharp.Test")
        .with_library("ClangSharpPInvokeGenerator");
    CSharpGenerator::new(config).render_unit(&b.finish()).unwrap()
}

/// A rendered file holding only the methods class with `members`.
fn methods_class(members: &str) -> String {
    format!(
        "namespace ClangSharp.Test\n{{\n    public static partial class Methods\n    {{\n{}    }}\n}}\n",
        members
    )
}

fn value_is(b: &mut AstBuilder, value: sharpen_clang::DeclId, n: i64) -> sharpen_clang::ExprId {
    let lhs = b.load(value);
    let rhs = b.int_lit(n);
    b.binary(BinaryOp::Eq, lhs, rhs)
}

fn returning(b: &mut AstBuilder, n: i64) -> sharpen_clang::StmtId {
    let lit = b.int_lit(n);
    b.ret(Some(lit))
}

/// `else if` chains stay flat and every branch is braced.
#[test]
fn test_if_else_chain() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let int = b.int();
    let value = b.param("value", int);

    let c0 = value_is(&mut b, value, 0);
    let r0 = returning(&mut b, 0);
    let c1 = value_is(&mut b, value, 1);
    let r1 = returning(&mut b, 1);
    let r2 = returning(&mut b, 2);
    let inner = b.if_stmt(c1, r1, Some(r2));
    let outer = b.if_stmt(c0, r0, Some(inner));
    let body = b.compound(vec![outer]);
    b.function(None, "MyFunction", int, vec![value], Some(body));

    let expected = methods_class(
        "        public static int MyFunction(int value)
        {
            if (value == 0)
            {
                return 0;
            }
            else if (value == 1)
            {
                return 1;
            }
            else
            {
                return 2;
            }
        }
",
    );
    assert_eq!(render(b), expected);
}

/// A branch written as a block and the same branch written bare emit the
/// same text.
#[test]
fn test_branches_are_normalized_to_blocks() {
    let build = |braced: bool| {
        let mut b = AstBuilder::new("ClangUnsavedFile.h");
        let int = b.int();
        let value = b.param("value", int);
        let cond = value_is(&mut b, value, 0);
        let mut then_branch = returning(&mut b, 1);
        if braced {
            then_branch = b.compound(vec![then_branch]);
        }
        let fallback = returning(&mut b, 0);
        let stmt = b.if_stmt(cond, then_branch, None);
        let body = b.compound(vec![stmt, fallback]);
        b.function(None, "MyFunction", int, vec![value], Some(body));
        render(b)
    };

    let bare = build(false);
    assert_eq!(bare, build(true));
    assert!(bare.contains(
        "            if (value == 0)\n            {\n                return 1;\n            }\n\n            return 0;\n"
    ));
}

/// Case labels without statements stack onto the following section.
#[test]
fn test_switch_sections() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let int = b.int();
    let value = b.param("value", int);

    let zero = b.int_lit(0);
    let r0 = returning(&mut b, 0);
    let case0 = b.case_stmt(zero, r0);
    let three = b.int_lit(3);
    let r5 = returning(&mut b, 5);
    let case3 = b.case_stmt(three, r5);
    let two = b.int_lit(2);
    let case2 = b.case_stmt(two, case3);
    let brk = b.break_stmt();
    let default = b.default_stmt(brk);
    let cases = b.compound(vec![case0, case2, default]);
    let cond = b.load(value);
    let switch = b.switch_stmt(cond, cases);
    let one = b.int_lit(1);
    let minus_one = b.unary(UnaryOp::Minus, one);
    let fallback = b.ret(Some(minus_one));
    let body = b.compound(vec![switch, fallback]);
    b.function(None, "MyFunction", int, vec![value], Some(body));

    let expected = methods_class(
        "        public static int MyFunction(int value)
        {
            switch (value)
            {
                case 0:
                {
                    return 0;
                }

                case 2:
                case 3:
                {
                    return 5;
                }

                default:
                {
                    break;
                }
            }

            return -1;
        }
",
    );
    assert_eq!(render(b), expected);
}

/// A label whose statements are all empty falls through, so it stacks
/// onto the next section instead of ending in `break`.
#[test]
fn test_empty_case_falls_through() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let int = b.int();
    let value = b.param("value", int);

    let one = b.int_lit(1);
    let null = b.stmt(StmtKind::Null);
    let case1 = b.case_stmt(one, null);
    let two = b.int_lit(2);
    let r5 = returning(&mut b, 5);
    let case2 = b.case_stmt(two, r5);
    let cases = b.compound(vec![case1, case2]);
    let cond = b.load(value);
    let switch = b.switch_stmt(cond, cases);
    let fallback = returning(&mut b, 0);
    let body = b.compound(vec![switch, fallback]);
    b.function(None, "MyFunction", int, vec![value], Some(body));

    let expected = methods_class(
        "        public static int MyFunction(int value)
        {
            switch (value)
            {
                case 1:
                case 2:
                {
                    return 5;
                }
            }

            return 0;
        }
",
    );
    assert_eq!(render(b), expected);
}

/// Loop bodies and switch sections written bare or braced emit the same
/// text.
#[test]
fn test_loop_and_switch_bodies_are_normalized_to_blocks() {
    let build = |braced: bool| {
        let mut b = AstBuilder::new("ClangUnsavedFile.h");
        let void = b.void();
        let int = b.int();
        let value = b.param("value", int);
        let wrap = |b: &mut AstBuilder, stmt: sharpen_clang::StmtId| {
            if braced {
                b.compound(vec![stmt])
            } else {
                stmt
            }
        };
        let decrement = |b: &mut AstBuilder| {
            let target = b.decl_ref(value);
            let dec = b.unary(UnaryOp::PreDec, target);
            b.expr_stmt(dec)
        };

        let cond = b.load(value);
        let step = decrement(&mut b);
        let while_body = wrap(&mut b, step);
        let while_loop = b.while_stmt(cond, while_body);

        let step = decrement(&mut b);
        let do_body = wrap(&mut b, step);
        let cond = b.load(value);
        let do_loop = b.do_stmt(do_body, cond);

        let step = decrement(&mut b);
        let for_body = wrap(&mut b, step);
        let cond = b.load(value);
        let for_loop = b.for_stmt(None, Some(cond), None, for_body);

        let zero = b.int_lit(0);
        let brk = b.break_stmt();
        let section = wrap(&mut b, brk);
        let case0 = b.case_stmt(zero, section);
        let cases = b.compound(vec![case0]);
        let cond = b.load(value);
        let switch = b.switch_stmt(cond, cases);

        let body = b.compound(vec![while_loop, do_loop, for_loop, switch]);
        b.function(None, "MyFunction", void, vec![value], Some(body));
        render(b)
    };

    let bare = build(false);
    assert_eq!(bare, build(true));
    let expected = methods_class(
        "        public static void MyFunction(int value)
        {
            while ((value) != 0)
            {
                --value;
            }

            do
            {
                --value;
            }
            while ((value) != 0);

            for (; (value) != 0;)
            {
                --value;
            }

            switch (value)
            {
                case 0:
                {
                    break;
                }
            }
        }
",
    );
    assert_eq!(bare, expected);
}

/// A missing `for` condition leaves its slot empty.
#[test]
fn test_for_clause_omission() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let void = b.void();
    let int = b.int();
    let zero = b.int_lit(0);
    let i = b.local("i", int, Some(zero));
    let init = b.decl_stmt(vec![i]);
    let i_ref = b.decl_ref(i);
    let dec = b.unary(UnaryOp::PostDec, i_ref);
    let loop_body = b.compound(vec![]);
    let counted = b.for_stmt(Some(init), None, Some(dec), loop_body);
    let forever_body = b.compound(vec![]);
    let forever = b.for_stmt(None, None, None, forever_body);
    let body = b.compound(vec![counted, forever]);
    b.function(None, "MyFunction", void, vec![], Some(body));

    let expected = methods_class(
        "        public static void MyFunction()
        {
            for (int i = 0;; i--)
            {
            }

            for (;;)
            {
            }
        }
",
    );
    assert_eq!(render(b), expected);
}

/// Array locals become managed arrays; missing elements are `default`.
#[test]
fn test_array_initializer_is_filled() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let void = b.void();
    let int = b.int();
    let array = b.array(int, 4);
    let elements = vec![b.int_lit(1), b.int_lit(2), b.int_lit(3)];
    let init = b.init_list(elements, array);
    let y = b.local("y", array, Some(init));
    let decl = b.decl_stmt(vec![y]);
    let body = b.compound(vec![decl]);
    b.function(None, "MyFunction", void, vec![], Some(body));

    let expected = methods_class(
        "        public static void MyFunction()
        {
            int[] y = new int[4]
            {
                1,
                2,
                3,
                default,
            };
        }
",
    );
    assert_eq!(render(b), expected);
}

/// A default-initialized struct local is constructed, and a blank line
/// separates declarations from what follows.
#[test]
fn test_return_struct() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let double = b.double();
    let s = b.record(None, RecordTag::Struct, "MyStruct");
    b.field(s, "r", double);
    b.field(s, "g", double);
    b.field(s, "b", double);
    let s_ty = b.named_type(s);
    let local = b.local("myStruct", s_ty, None);
    let decl = b.decl_stmt(vec![local]);
    let value = b.load(local);
    let ret = b.ret(Some(value));
    let body = b.compound(vec![decl, ret]);
    b.function(None, "MyFunction", s_ty, vec![], Some(body));

    let expected = "namespace ClangSharp.Test
{
    public partial struct MyStruct
    {
        public double r;

        public double g;

        public double b;
    }

    public static partial class Methods
    {
        public static MyStruct MyFunction()
        {
            MyStruct myStruct = new MyStruct();

            return myStruct;
        }
    }
}
";
    assert_eq!(render(b), expected);
}

/// Reference parameters become pointers and member access goes through
/// `->`.
#[test]
fn test_reference_parameters_become_pointers() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let int = b.int();
    let boolean = b.bool_type();
    let s = b.record(None, RecordTag::Struct, "MyStruct");
    let field = b.field(s, "value", int);
    let s_ty = b.named_type(s);
    let ref_ty = b.const_ref(s_ty);
    let lhs = b.param("lhs", ref_ty);
    let rhs = b.param("rhs", ref_ty);

    let lhs_ref = b.decl_ref(lhs);
    let lhs_value = b.member(lhs_ref, field, false);
    let lhs_value = b.rvalue(lhs_value);
    let rhs_ref = b.decl_ref(rhs);
    let rhs_value = b.member(rhs_ref, field, false);
    let rhs_value = b.rvalue(rhs_value);
    let eq = b.binary(BinaryOp::Eq, lhs_value, rhs_value);
    let ret = b.ret(Some(eq));
    let body = b.compound(vec![ret]);
    b.function(None, "MyFunction", boolean, vec![lhs, rhs], Some(body));

    let expected = "namespace ClangSharp.Test
{
    public partial struct MyStruct
    {
        public int value;
    }

    public static unsafe partial class Methods
    {
        public static bool MyFunction([NativeTypeName(\"const MyStruct &\")] MyStruct* lhs, [NativeTypeName(\"const MyStruct &\")] MyStruct* rhs)
        {
            return lhs->value == rhs->value;
        }
    }
}
";
    assert_eq!(render(b), expected);
}

/// Loops and expression statements that C# would reject as statements.
#[test]
fn test_while_and_discarded_expression() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let void = b.void();
    let int = b.int();
    let value = b.param("value", int);

    let cond = b.load(value);
    let target = b.decl_ref(value);
    let dec = b.unary(UnaryOp::PreDec, target);
    let step = b.expr_stmt(dec);
    let loop_body = b.compound(vec![step]);
    let while_loop = b.while_stmt(cond, loop_body);
    let discarded = b.load(value);
    let discarded = b.expr_stmt(discarded);
    let body = b.compound(vec![while_loop, discarded]);
    b.function(None, "MyFunction", void, vec![value], Some(body));

    let text = render(b);
    assert!(text.contains(
        "            while ((value) != 0)\n            {\n                --value;\n            }\n\n            _ = value;\n"
    ));
}
