//! Records, unions, enums and virtual dispatch.

use sharpen_build::GeneratorConfig;
use sharpen_clang::{
    AstBuilder, BinaryOp, CastKind, CastStyle, DeclKind, RecordTag, TranslationUnit,
};
use sharpen_codegen::{CSharpGenerator, EmittedUnit};
use sharpen_common::DiagnosticKind;

fn config() -> GeneratorConfig {
    GeneratorConfig::default()
        .with_namespace("ClangSharp.Test")
        .with_library("ClangSharpPInvokeGenerator")
}

fn render(b: AstBuilder) -> String {
    CSharpGenerator::new(config()).render_unit(&b.finish()).unwrap()
}

fn emit(unit: &TranslationUnit) -> EmittedUnit {
    CSharpGenerator::new(config()).emit_unit(unit).unwrap()
}

/// Deprecated fields carry `[Obsolete]`, with the message when one is given.
#[test]
fn test_deprecated_fields() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let int = b.int();
    let s = b.record(None, RecordTag::Struct, "MyStruct");
    b.field(s, "Field", int);
    let deprecated = b.field(s, "DeprecatedField", int);
    b.deprecate(deprecated, None);
    let with_message = b.field(s, "DeprecatedWithMessage", int);
    b.deprecate(with_message, Some("This is obsolete."));

    let expected = "using System;

namespace ClangSharp.Test
{
    public partial struct MyStruct
    {
        public int Field;

        [Obsolete]
        public int DeprecatedField;

        [Obsolete(\"This is obsolete.\")]
        public int DeprecatedWithMessage;
    }
}
";
    assert_eq!(render(b), expected);
}

/// A deprecated struct, directly or through the typedef naming it.
#[test]
fn test_deprecated_structs() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let int = b.int();
    let s = b.record(None, RecordTag::Struct, "MyStruct0");
    b.field(s, "Field", int);
    b.deprecate(s, None);

    let unnamed = b.record(None, RecordTag::Struct, "");
    b.field(unnamed, "Field", int);
    let unnamed_ty = b.named_type(unnamed);
    let typedef = b.typedef(None, "MyStruct1", unnamed_ty);
    b.deprecate(typedef, Some("This is obsolete."));

    let expected = "using System;

namespace ClangSharp.Test
{
    [Obsolete]
    public partial struct MyStruct0
    {
        public int Field;
    }

    [Obsolete(\"This is obsolete.\")]
    public partial struct MyStruct1
    {
        public int Field;
    }
}
";
    assert_eq!(render(b), expected);
}

/// Members of an anonymous struct inside a union are reached through the
/// synthesized field and forwarded by ref accessors.
#[test]
fn test_anonymous_struct_in_union() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let int = b.int();
    let void = b.void();
    let u = b.record(None, RecordTag::Union, "MyUnion");
    b.at(3, 5);
    let anonymous = b.anonymous_record(u, RecordTag::Struct);
    b.at(4, 13);
    let a = b.field(anonymous, "a", int);
    b.at(8, 1);

    let u_ty = b.named_type(u);
    let local = b.local("myUnion", u_ty, None);
    let decl = b.decl_stmt(vec![local]);
    let base = b.decl_ref(local);
    let member = b.member(base, a, false);
    let ten = b.int_lit(10);
    let assign = b.binary(BinaryOp::Assign, member, ten);
    let store = b.expr_stmt(assign);
    let body = b.compound(vec![decl, store]);
    b.function(None, "MyFunction", void, vec![], Some(body));

    let expected = "using System.Diagnostics.CodeAnalysis;
using System.Runtime.InteropServices;

namespace ClangSharp.Test
{
    [StructLayout(LayoutKind.Explicit)]
    public partial struct MyUnion
    {
        [FieldOffset(0)]
        [NativeTypeName(\"__AnonymousRecord_ClangUnsavedFile_L3_C5\")]
        public _Anonymous_e__Struct Anonymous;

        public partial struct _Anonymous_e__Struct
        {
            public int a;
        }

        [UnscopedRef]
        public ref int a
        {
            get
            {
                return ref Anonymous.a;
            }
        }
    }

    public static partial class Methods
    {
        public static void MyFunction()
        {
            MyUnion myUnion = new MyUnion();

            myUnion.Anonymous.a = 10;
        }
    }
}
";
    assert_eq!(render(b), expected);
}

/// `dynamic_cast` down a polymorphic hierarchy is an unchecked pointer cast,
/// and each vtable slot becomes a trampoline.
#[test]
fn test_dynamic_cast_and_trampolines() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let void = b.void();
    let a = b.record(None, RecordTag::Struct, "MyStructA");
    b.virtual_method(a, "MyMethod", void, vec![], None);
    let derived = b.record(None, RecordTag::Struct, "MyStructB");
    b.add_base(derived, a);

    let a_ty = b.named_type(a);
    let a_ptr = b.pointer(a_ty);
    let b_ty = b.named_type(derived);
    let b_ptr = b.pointer(b_ty);
    let input = b.param("input", a_ptr);
    let value = b.load(input);
    let cast = b.cast(CastStyle::Dynamic, CastKind::Dynamic, value, b_ptr);
    let ret = b.ret(Some(cast));
    let body = b.compound(vec![ret]);
    b.function(None, "MyFunction", b_ptr, vec![input], Some(body));

    let expected = "using System.Runtime.CompilerServices;

namespace ClangSharp.Test
{
    public unsafe partial struct MyStructA
    {
        public void** lpVtbl;

        public void MyMethod()
        {
            ((delegate* unmanaged[Thiscall]<MyStructA*, void>)(lpVtbl[0]))((MyStructA*)Unsafe.AsPointer(ref this));
        }
    }

    [NativeTypeName(\"struct MyStructB : MyStructA\")]
    public unsafe partial struct MyStructB
    {
        public void** lpVtbl;

        public void MyMethod()
        {
            ((delegate* unmanaged[Thiscall]<MyStructB*, void>)(lpVtbl[0]))((MyStructB*)Unsafe.AsPointer(ref this));
        }
    }

    public static unsafe partial class Methods
    {
        public static MyStructB* MyFunction(MyStructA* input)
        {
            return (MyStructB*)(input);
        }
    }
}
";
    assert_eq!(render(b), expected);
}

/// An override reuses its base slot; base fields are laid out after the
/// vtable pointer.
#[test]
fn test_override_reuses_slot() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let void = b.void();
    let int = b.int();
    let base = b.record(None, RecordTag::Class, "MyBase");
    b.field(base, "value", int);
    let x = b.param("x", int);
    b.virtual_method(base, "Get", int, vec![x], None);
    b.virtual_method(base, "Set", void, vec![], None);

    let derived = b.record(None, RecordTag::Class, "MyDerived");
    b.add_base(derived, base);
    b.field(derived, "extra", int);
    let x = b.param("x", int);
    b.virtual_method(derived, "Get", int, vec![x], None);

    let text = render(b);
    let expected = "    [NativeTypeName(\"class MyDerived : MyBase\")]
    public unsafe partial struct MyDerived
    {
        public void** lpVtbl;

        public int value;

        public int extra;

        public int Get(int x)
        {
            return ((delegate* unmanaged[Thiscall]<MyDerived*, int, int>)(lpVtbl[0]))((MyDerived*)Unsafe.AsPointer(ref this), x);
        }

        public void Set()
        {
            ((delegate* unmanaged[Thiscall]<MyDerived*, void>)(lpVtbl[1]))((MyDerived*)Unsafe.AsPointer(ref this));
        }
    }
";
    assert!(text.contains(expected), "{}", text);
}

/// Enums keep explicit literals as spelled and name a non-`int` underlying
/// type.
#[test]
fn test_enum() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let uint = b.uint();
    let e = b.enumeration(None, "MyEnum", uint);
    b.enum_constant(e, "MyEnum_Value0", 0, None);
    let five = b.int_lit_typed("5u", uint);
    b.enum_constant(e, "MyEnum_Value1", 5, Some(five));
    let obsolete = b.enum_constant(e, "MyEnum_Value2", 6, None);
    b.deprecate(obsolete, None);

    let expected = "using System;

namespace ClangSharp.Test
{
    public enum MyEnum : uint
    {
        MyEnum_Value0,
        MyEnum_Value1 = 5,
        [Obsolete]
        MyEnum_Value2,
    }
}
";
    assert_eq!(render(b), expected);
}

/// Constants of an unnamed enum become constants of the methods class.
#[test]
fn test_anonymous_enum_becomes_constants() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let int = b.int();
    let e = b.enumeration(None, "", int);
    let three = b.int_lit(3);
    b.enum_constant(e, "MyConst", 3, Some(three));
    b.enum_constant(e, "MyNext", 4, None);

    let expected = "namespace ClangSharp.Test
{
    public static partial class Methods
    {
        public const int MyConst = 3;

        public const int MyNext = 4;
    }
}
";
    assert_eq!(render(b), expected);
}

/// Unsigned bitfields share one storage field and are masked in place.
#[test]
fn test_unsigned_bitfields() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let uint = b.uint();
    let s = b.record(None, RecordTag::Struct, "MyStruct");
    b.bitfield(s, "a", uint, 1);
    b.bitfield(s, "b", uint, 3);

    let expected = "namespace ClangSharp.Test
{
    public partial struct MyStruct
    {
        public uint _bitfield;

        [NativeTypeName(\"unsigned int : 1\")]
        public uint a
        {
            readonly get
            {
                return _bitfield & 0x1u;
            }

            set
            {
                _bitfield = (_bitfield & ~0x1u) | (value & 0x1u);
            }
        }

        [NativeTypeName(\"unsigned int : 3\")]
        public uint b
        {
            readonly get
            {
                return (_bitfield >> 1) & 0x7u;
            }

            set
            {
                _bitfield = (_bitfield & ~(0x7u << 1)) | ((value & 0x7u) << 1);
            }
        }
    }
}
";
    assert_eq!(render(b), expected);
}

/// Signed bitfields are sign-extended by shifting up then down.
#[test]
fn test_signed_bitfields() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let int = b.int();
    let s = b.record(None, RecordTag::Struct, "MyStruct");
    b.bitfield(s, "c", int, 4);
    b.bitfield(s, "d", int, 4);

    let text = render(b);
    assert!(text.contains("        public int _bitfield;\n"));
    assert!(text.contains("                return (_bitfield << 28) >> 28;\n"));
    assert!(text.contains("                _bitfield = (_bitfield & ~0xF) | (value & 0xF);\n"));
    assert!(text.contains("                return (_bitfield << 24) >> 28;\n"));
    assert!(text.contains(
        "                _bitfield = (_bitfield & ~(0xF << 4)) | ((value & 0xF) << 4);\n"
    ));
    assert!(text.contains("        [NativeTypeName(\"int : 4\")]\n"));
}

/// A bitfield filling all of signed storage masks with all ones instead of
/// an unsigned hex literal.
#[test]
fn test_full_width_signed_bitfield() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let int = b.int();
    let s = b.record(None, RecordTag::Struct, "MyStruct");
    b.bitfield(s, "whole", int, 32);

    let text = render(b);
    assert!(text.contains("        public int _bitfield;\n"), "{}", text);
    assert!(text.contains("                return _bitfield;\n"), "{}", text);
    assert!(
        text.contains("                _bitfield = (_bitfield & ~(-1)) | (value & (-1));\n"),
        "{}",
        text
    );
    assert!(!text.contains("0xFFFFFFFF"));
}

/// Bitfields flattened from a polymorphic base get storage of their own
/// next to the derived record's.
#[test]
fn test_inherited_bitfield_storage_is_distinct() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let void = b.void();
    let uint = b.uint();
    let base = b.record(None, RecordTag::Struct, "MyBase");
    b.virtual_method(base, "MyMethod", void, vec![], None);
    b.bitfield(base, "a", uint, 1);
    let derived = b.record(None, RecordTag::Struct, "MyDerived");
    b.add_base(derived, base);
    b.bitfield(derived, "b", uint, 2);

    let text = render(b);
    let fields = "        public void** lpVtbl;\n\n        public uint _MyBase_bitfield;\n\n        public uint _bitfield;\n";
    assert!(text.contains(fields), "{}", text);
    assert!(text.contains("                return _MyBase_bitfield & 0x1u;\n"), "{}", text);
    assert!(text.contains("                return _bitfield & 0x3u;\n"), "{}", text);
}

/// A plain field between bitfields closes the storage unit.
#[test]
fn test_bitfield_units_are_numbered() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let uint = b.uint();
    let int = b.int();
    let s = b.record(None, RecordTag::Struct, "MyStruct");
    b.bitfield(s, "a", uint, 1);
    b.field(s, "x", int);
    b.bitfield(s, "b", uint, 1);

    let text = render(b);
    let fields = "        public uint _bitfield1;\n\n        public int x;\n\n        public uint _bitfield2;\n";
    assert!(text.contains(fields), "{}", text);
    assert!(text.contains("                return _bitfield2 & 0x1u;\n"));
}

/// Primitive arrays are fixed buffers in an unsafe struct.
#[test]
fn test_fixed_buffer() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let int = b.int();
    let s = b.record(None, RecordTag::Struct, "MyStruct");
    let array = b.array(int, 4);
    b.field(s, "a", array);

    let expected = "namespace ClangSharp.Test
{
    public unsafe partial struct MyStruct
    {
        [NativeTypeName(\"int[4]\")]
        public fixed int a[4];
    }
}
";
    assert_eq!(render(b), expected);
}

/// Arrays of records get an inline array buffer type.
#[test]
fn test_inline_array_buffer() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let int = b.int();
    let inner = b.record(None, RecordTag::Struct, "MyInner");
    b.field(inner, "x", int);
    let inner_ty = b.named_type(inner);
    let array = b.array(inner_ty, 3);
    let s = b.record(None, RecordTag::Struct, "MyStruct");
    b.field(s, "items", array);

    let text = render(b);
    assert!(text.starts_with("using System.Runtime.CompilerServices;\n"));
    assert!(text.contains(
        "        [NativeTypeName(\"MyInner[3]\")]\n        public _items_e__FixedBuffer items;\n\n        [InlineArray(3)]\n        public partial struct _items_e__FixedBuffer\n        {\n            public MyInner e0;\n        }\n"
    ), "{}", text);
}

/// A non-polymorphic base is embedded as a `Base` field.
#[test]
fn test_non_polymorphic_base() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let int = b.int();
    let a = b.record(None, RecordTag::Struct, "MyBase");
    b.field(a, "x", int);
    let derived = b.record(None, RecordTag::Struct, "MyDerived");
    b.add_base(derived, a);
    b.field(derived, "y", int);

    let text = render(b);
    assert!(text.contains(
        "    [NativeTypeName(\"struct MyDerived : MyBase\")]\n    public partial struct MyDerived\n    {\n        public MyBase Base;\n\n        public int y;\n    }\n"
    ), "{}", text);
}

/// A forward declaration alone yields an opaque struct; with a definition
/// present it yields nothing.
#[test]
fn test_forward_declarations() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    b.forward_record(None, RecordTag::Struct, "MyOpaque");
    let expected = "namespace ClangSharp.Test
{
    public partial struct MyOpaque
    {
    }
}
";
    assert_eq!(render(b), expected);

    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let int = b.int();
    b.forward_record(None, RecordTag::Struct, "MyStruct");
    let s = b.record(None, RecordTag::Struct, "MyStruct");
    b.field(s, "x", int);
    let text = render(b);
    assert_eq!(text.matches("public partial struct MyStruct").count(), 1);
    assert!(text.contains("public int x;"));
}

/// Packing is carried into the layout attribute.
#[test]
fn test_packed_struct() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let int = b.int();
    let s = b.record(None, RecordTag::Struct, "MyStruct");
    b.field(s, "x", int);
    b.decl_mut(s).attrs.packed = Some(1);

    let text = render(b);
    assert!(text.starts_with("using System.Runtime.InteropServices;\n"));
    assert!(text.contains(
        "    [StructLayout(LayoutKind.Sequential, Pack = 1)]\n    public partial struct MyStruct\n"
    ));
}

/// Methods with bodies become instance methods; fields are read directly.
#[test]
fn test_method_with_body() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let int = b.int();
    let s = b.record(None, RecordTag::Struct, "MyStruct");
    let x = b.field(s, "x", int);
    let this = b.this(s, true);
    let read = b.member(this, x, true);
    let read = b.rvalue(read);
    let ret = b.ret(Some(read));
    let body = b.compound(vec![ret]);
    b.method(s, "GetX", int, vec![], Some(body));

    let expected = "namespace ClangSharp.Test
{
    public partial struct MyStruct
    {
        public int x;

        public int GetX()
        {
            return x;
        }
    }
}
";
    assert_eq!(render(b), expected);
}

/// Constructors are skipped with a diagnostic; the rest of the record is
/// still emitted.
#[test]
fn test_constructor_is_reported() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let int = b.int();
    let s = b.record(None, RecordTag::Struct, "MyStruct");
    b.field(s, "x", int);
    b.at(3, 5);
    b.add_decl(
        Some(s),
        "MyStruct",
        DeclKind::Constructor {
            params: vec![],
            body: None,
        },
    );

    let emitted = emit(&b.finish());
    assert_eq!(emitted.fragments.len(), 1);
    assert!(emitted.fragments[0].text.contains("public int x;"));
    assert_eq!(emitted.diagnostics.len(), 1);
    let diagnostic = &emitted.diagnostics[0];
    assert_eq!(diagnostic.kind, DiagnosticKind::Unsupported);
    assert_eq!(diagnostic.location.as_ref().map(|l| l.line), Some(3));
}

/// A record with two bases has no single-vtable layout and is skipped.
#[test]
fn test_multiple_inheritance_is_skipped() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let int = b.int();
    let first = b.record(None, RecordTag::Struct, "MyFirst");
    b.field(first, "a", int);
    let second = b.record(None, RecordTag::Struct, "MySecond");
    b.field(second, "b", int);
    let both = b.record(None, RecordTag::Struct, "MyBoth");
    b.add_base(both, first);
    b.add_base(both, second);

    let emitted = emit(&b.finish());
    let names: Vec<&str> = emitted.fragments.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["MyFirst", "MySecond"]);
    assert!(emitted.has_errors());
}

/// Every member of a plain union is pinned at offset zero.
#[test]
fn test_union_members_share_offset_zero() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let int = b.int();
    let float = b.float();
    let u = b.record(None, RecordTag::Union, "MyUnion");
    b.field(u, "i", int);
    b.field(u, "f", float);

    insta::assert_snapshot!(render(b), @r###"
    using System.Runtime.InteropServices;

    namespace ClangSharp.Test
    {
        [StructLayout(LayoutKind.Explicit)]
        public partial struct MyUnion
        {
            [FieldOffset(0)]
            public int i;

            [FieldOffset(0)]
            public float f;
        }
    }
    "###);
}

/// A virtual call through a base pointer goes to the base trampoline, which
/// dispatches through the derived record's vtable slot.
#[test]
fn test_virtual_call_through_base_pointer() {
    let mut b = AstBuilder::new("ClangUnsavedFile.h");
    let int = b.int();
    let base = b.record(None, RecordTag::Struct, "MyBase");
    let get = b.virtual_method(base, "Get", int, vec![], None);
    let derived = b.record(None, RecordTag::Struct, "MyDerived");
    b.add_base(derived, base);
    b.virtual_method(derived, "Get", int, vec![], None);

    let base_ty = b.named_type(base);
    let base_ptr = b.pointer(base_ty);
    let p = b.param("p", base_ptr);
    let receiver = b.load(p);
    let call = b.member_call(receiver, get, true, vec![]);
    let ret = b.ret(Some(call));
    let body = b.compound(vec![ret]);
    b.function(None, "CallGet", int, vec![p], Some(body));

    insta::assert_snapshot!(render(b), @r###"
    using System.Runtime.CompilerServices;

    namespace ClangSharp.Test
    {
        public unsafe partial struct MyBase
        {
            public void** lpVtbl;

            public int Get()
            {
                return ((delegate* unmanaged[Thiscall]<MyBase*, int>)(lpVtbl[0]))((MyBase*)Unsafe.AsPointer(ref this));
            }
        }

        [NativeTypeName("struct MyDerived : MyBase")]
        public unsafe partial struct MyDerived
        {
            public void** lpVtbl;

            public int Get()
            {
                return ((delegate* unmanaged[Thiscall]<MyDerived*, int>)(lpVtbl[0]))((MyDerived*)Unsafe.AsPointer(ref this));
            }
        }

        public static unsafe partial class Methods
        {
            public static int CallGet(MyBase* p)
            {
                return p->Get();
            }
        }
    }
    "###);
}
