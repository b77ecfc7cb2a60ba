//! Builds the model of the `sample` fixture and checks every kind of
//! declaration the assembler extracts.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use bnd_cppmodel::model::{
    CallConv, Enum, EnumWidth, Field, Include, Interface, Module, ParamAttribute, Struct,
};

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../tests/fixtures/sample/bnd-cppmodel.toml")
}

fn sample_module() -> Module {
    bnd_cppmodel::generate(&fixture()).expect("generate sample model")
}

fn include<'m>(module: &'m Module, name: &str) -> &'m Include {
    module
        .find_include(name)
        .unwrap_or_else(|| panic!("include {name} missing"))
}

fn find_struct(include: &Include, name: &str) -> Rc<Struct> {
    let names: Vec<&str> = include.structs().map(|s| s.name.as_str()).collect();
    include
        .structs()
        .find(|s| s.name == name)
        .cloned()
        .unwrap_or_else(|| panic!("struct {name} missing. Found: {names:?}"))
}

fn find_interface(include: &Include, name: &str) -> Rc<Interface> {
    include
        .interfaces()
        .find(|i| i.name == name)
        .cloned()
        .unwrap_or_else(|| panic!("interface {name} missing"))
}

fn offsets(fields: &[Field]) -> Vec<(&str, u32)> {
    fields.iter().map(|f| (f.name.as_str(), f.offset)).collect()
}

// ---------------------------------------------------------------------------
// Assembler scope
// ---------------------------------------------------------------------------

#[test]
fn only_attached_includes_are_built() {
    let module = sample_module();
    assert_eq!(module.name, "Sample");

    let names: Vec<&str> = module.includes.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["sample", "sampletypes"], "Found: {names:?}");
}

#[test]
fn partial_attachment_keeps_listed_names() {
    let module = sample_module();
    let types = include(&module, "SampleTypes");

    let structs: Vec<&str> = types.structs().map(|s| s.name.as_str()).collect();
    assert_eq!(structs, ["RECT"], "Found: {structs:?}");
}

#[test]
fn skipped_declarations() {
    let module = sample_module();
    let sample = include(&module, "sample");
    let names: Vec<&str> = sample.decls.iter().map(|d| d.name()).collect();

    for skipped in [
        "InlineHelper",
        "__builtin_expect",
        "INCOMPLETE",
        "EXTERN_ONLY",
        "HRESULT",
        "UNION_HOLDER_INNER_0",
    ] {
        assert!(
            !names.contains(&skipped),
            "{skipped} should not be extracted. Found: {names:?}"
        );
    }
}

#[test]
fn declarations_in_file_order() {
    let module = sample_module();
    let sample = include(&module, "sample");
    let names: Vec<&str> = sample.decls.iter().map(|d| d.name()).collect();

    assert_eq!(
        names,
        [
            "FOO_T",
            "UNION_HOLDER",
            "FLAGS",
            "HOLDER_Detail_INNER",
            "HOLDER",
            "IUnknownLike",
            "IRaw",
            "IDerived",
            "SAMPLE_ENUM_0",
            "SAMPLE_ENUM_1",
            "COLOR",
            "SampleInit",
            "IID_ISample",
            "SAMPLE_MAX",
            "SAMPLE_SCALE",
            "SAMPLE_NAME",
            "SAMPLE_VERSION",
        ],
        "Found: {names:?}"
    );
}

// ---------------------------------------------------------------------------
// Structs and unions
// ---------------------------------------------------------------------------

#[test]
fn tag_struct_takes_typedef_name() {
    let module = sample_module();
    let sample = include(&module, "sample");

    let foo = find_struct(sample, "FOO_T");
    assert_eq!(offsets(&foo.fields), [("x", 0), ("y", 1)]);
    assert_eq!(foo.fields[1].ty.name, "float");

    let holder = find_struct(sample, "HOLDER");
    let field = holder.fields.iter().find(|f| f.name == "foo").unwrap();
    assert_eq!(field.ty.name, "FOO_T");
}

#[test]
fn anonymous_union_is_inlined() {
    let module = sample_module();
    let holder = find_struct(include(&module, "sample"), "UNION_HOLDER");

    assert!(!holder.is_union);
    let found = offsets(&holder.fields);
    assert_eq!(found, [("a", 0), ("b", 1), ("c", 1), ("d", 2)], "Found: {found:?}");
}

#[test]
fn bitfields_share_a_slot() {
    let module = sample_module();
    let flags = find_struct(include(&module, "sample"), "FLAGS");

    // The plain field closing a bitfield run stays in the run's slot.
    let found = offsets(&flags.fields);
    assert_eq!(found, [("a", 0), ("b", 1), ("c", 1), ("d", 1)], "Found: {found:?}");

    let widths: Vec<(bool, u32)> = flags
        .fields
        .iter()
        .map(|f| (f.is_bitfield, f.bit_offset))
        .collect();
    assert_eq!(widths, [(false, 0), (true, 1), (true, 2), (false, 0)]);
    assert_eq!(flags.fields[1].ty.name, "unsigned int");
}

#[test]
fn named_nested_struct_is_a_sibling() {
    let module = sample_module();
    let sample = include(&module, "sample");

    let detail = find_struct(sample, "HOLDER_Detail_INNER");
    assert_eq!(offsets(&detail.fields), [("v", 0)]);

    let holder = find_struct(sample, "HOLDER");
    let found = offsets(&holder.fields);
    assert_eq!(
        found,
        [("inner", 0), ("foo", 1), ("data", 2), ("next", 3)],
        "Found: {found:?}"
    );
    assert_eq!(holder.fields[0].ty.name, "HOLDER_Detail_INNER");

    let data = &holder.fields[2].ty;
    assert_eq!(data.name, "int");
    assert!(data.is_array());
    assert_eq!(data.array_dims, [4]);

    let next = &holder.fields[3].ty;
    assert_eq!(next.name, "HOLDER");
    assert_eq!(next.pointer_depth(), 1);
}

// ---------------------------------------------------------------------------
// Interfaces
// ---------------------------------------------------------------------------

#[test]
fn base_interface_slots_and_guid() {
    let module = sample_module();
    let unknown = find_interface(include(&module, "sample"), "IUnknownLike");

    assert_eq!(unknown.base, None);
    assert_eq!(unknown.total_method_count, 3);
    assert_eq!(
        unknown.guid.map(|g| g.to_string()),
        Some("00000000-0000-0000-c000-000000000046".to_string())
    );

    let slots: Vec<(&str, u32, u32)> = unknown
        .methods
        .iter()
        .map(|m| (m.name(), m.offset, m.abi_offset))
        .collect();
    assert_eq!(
        slots,
        [
            ("QueryInterface", 0, 0),
            ("AddRef", 1, 1),
            ("Release", 2, 2)
        ]
    );

    let qi = &unknown.methods[0].callable;
    assert_eq!(qi.calling_convention, Some(CallConv::StdCall));
    assert_eq!(qi.return_value.name, "HRESULT");
    assert_eq!(qi.params[0].ty.name, "GUID");
    assert!(qi.params[0].ty.is_const);
    // No annotation at all leaves the direction unset.
    assert_eq!(qi.params[0].attribute, ParamAttribute::empty());
    assert_eq!(qi.params[1].ty.name, "void");
    assert_eq!(qi.params[1].ty.pointer, "**");
    assert_eq!(qi.params[1].attribute, ParamAttribute::OUT);
}

#[test]
fn overloads_are_regrouped() {
    let module = sample_module();
    let raw = find_interface(include(&module, "sample"), "IRaw");

    let slots: Vec<(&str, &str, u32, u32)> = raw
        .methods
        .iter()
        .map(|m| {
            (
                m.name(),
                m.callable
                    .params
                    .first()
                    .map_or("", |p| p.name.as_str()),
                m.offset,
                m.abi_offset,
            )
        })
        .collect();
    // Second Create first, then the first Create, then Release.
    assert_eq!(
        slots,
        [
            ("Create", "size", 0, 1),
            ("Release", "", 1, 2),
            ("Create", "scale", 2, 0),
        ],
        "Found: {slots:?}"
    );
}

#[test]
fn derived_interface_continues_after_base() {
    let module = sample_module();
    let derived = find_interface(include(&module, "sample"), "IDerived");

    assert_eq!(derived.base.as_deref(), Some("IUnknownLike"));
    assert_eq!(
        derived.guid.map(|g| g.to_string()),
        Some("6f15aaf2-d208-4e89-9ab4-489535d34f9c".to_string())
    );

    // The QueryInterface override and the non-virtual helper open no slot.
    let names: Vec<&str> = derived.methods.iter().map(|m| m.name()).collect();
    assert_eq!(names, ["DoWork"], "Found: {names:?}");
    assert_eq!(derived.methods[0].offset, 3);
    assert_eq!(derived.methods[0].abi_offset, 3);
    assert_eq!(derived.total_method_count, 4);

    let params = &derived.methods[0].callable.params;
    assert_eq!(params[0].name, "arg0");
    assert_eq!(params[0].ty.name, "unsigned long");
    assert_eq!(params[1].name, "arg1");
    assert_eq!(
        params[1].attribute,
        ParamAttribute::OUT | ParamAttribute::BUFFER
    );
}

// ---------------------------------------------------------------------------
// Enums, functions, variables, macros
// ---------------------------------------------------------------------------

#[test]
fn anonymous_enums_are_numbered_per_include() {
    let module = sample_module();
    let enums: Vec<&Enum> = include(&module, "sample").enums().collect();
    let names: Vec<&str> = enums.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["SAMPLE_ENUM_0", "SAMPLE_ENUM_1", "COLOR"], "Found: {names:?}");

    let items: Vec<(&str, Option<&str>)> = enums[0]
        .items
        .iter()
        .map(|i| (i.name.as_str(), i.value.as_deref()))
        .collect();
    assert_eq!(items, [("A_ONE", Some("1")), ("A_TWO", Some("2"))]);

    assert_eq!(enums[0].underlying, Some(EnumWidth::Int));
    assert_eq!(enums[2].underlying, Some(EnumWidth::Byte));
}

#[test]
fn function_signature() {
    let module = sample_module();
    let functions: Vec<_> = include(&module, "sample").functions().collect();
    assert_eq!(functions.len(), 1, "Found: {functions:?}");

    let init = functions[0];
    assert_eq!(init.name, "SampleInit");
    assert_eq!(init.calling_convention, Some(CallConv::StdCall));
    assert_eq!(init.return_value.name, "HRESULT");

    let params: Vec<(&str, &str, &str)> = init
        .params
        .iter()
        .map(|p| (p.name.as_str(), p.ty.name.as_str(), p.ty.pointer.as_str()))
        .collect();
    assert_eq!(
        params,
        [("flags", "unsigned long", ""), ("arg1", "FOO_T", "*")],
        "Found: {params:?}"
    );
    assert_eq!(init.params[0].attribute, ParamAttribute::empty());
    assert_eq!(init.params[1].attribute, ParamAttribute::OUT);
}

#[test]
fn guid_constant() {
    let module = sample_module();
    let guids: Vec<_> = include(&module, "sample").guids().collect();
    assert_eq!(guids.len(), 1, "Found: {guids:?}");
    assert_eq!(guids[0].name, "IID_ISample");

    let bytes = guids[0].guid.to_bytes();
    assert_eq!(bytes[0..4], (-1135593225i32).to_le_bytes());
    assert_eq!(bytes[4..6], 9184u16.to_le_bytes());
    assert_eq!(bytes[6..8], 18784u16.to_le_bytes());
    assert_eq!(bytes[8..], [150, 218, 51, 171, 175, 89, 53, 236]);
}

#[test]
fn typed_constants() {
    let module = sample_module();
    let constants: Vec<(&str, &str, &str)> = include(&module, "sample")
        .constants()
        .map(|c| (c.name.as_str(), c.type_name.as_str(), c.value.as_str()))
        .collect();
    assert_eq!(
        constants,
        [
            ("SAMPLE_MAX", "unsigned long", "5"),
            ("SAMPLE_SCALE", "float", "1.0F")
        ],
        "Found: {constants:?}"
    );
}

#[test]
fn macros_attached_to_processed_includes() {
    let module = sample_module();

    let sample: Vec<(&str, &str)> = include(&module, "sample")
        .macros()
        .map(|d| (d.name.as_str(), d.value.as_str()))
        .collect();
    assert_eq!(
        sample,
        [("SAMPLE_NAME", "\"sample\""), ("SAMPLE_VERSION", "2")],
        "Found: {sample:?}"
    );

    let types: Vec<&str> = include(&module, "sampletypes")
        .macros()
        .map(|d| d.name.as_str())
        .collect();
    assert_eq!(types, ["SAMPLETYPES_MAX"]);

    assert!(module.find_include("unlisted").is_none());
}
