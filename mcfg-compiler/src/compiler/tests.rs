use std::sync::Arc;

use mcfg_cfg::ConfigSet;
use mcfg_fragment::Fragment;
use mcfg_process::{ProcessOutput, ScriptedRunner};
use mcfg_types::{Define, Defines, FilePath, LanguageStandard, SourceLanguage};

use super::*;

static CLANG_C_OUTPUT: &[&str] = &[
    "clang -cc1 version 17.0.6 based upon LLVM 17.0.6 default target x86_64-unknown-linux-gnu",
    "#include \"...\" search starts here:",
    "#include <...> search starts here:",
    "  /usr/include",
    "  /usr/include/foo (framework directory)",
    "End of search list.",
    "#define __clang__ 1",
    "#define __STDC__ 1",
];

static CLANG_CPP_OUTPUT: &[&str] = &[
    "#include <...> search starts here:",
    " /usr/include/c++/13",
    " /usr/include",
    "End of search list.",
    "#define __clang__ 1",
    "#define __cplusplus 201402L",
];

fn configs() -> ConfigSet {
    let mut builder = ConfigSet::builder();
    crate::register_configs(&mut builder);
    builder.build()
}

fn base(cc_type: &str) -> Fragment {
    let mut fragment = Fragment::new();
    fragment.set("CC_TYPE", cc_type);
    fragment.set("_CC", "/usr/bin/clang");
    fragment
}

fn context(runner: &ScriptedRunner) -> CompilerContext {
    CompilerContext {
        configs: configs(),
        runner: Arc::new(runner.clone()),
    }
}

fn scripted() -> ScriptedRunner {
    let runner = ScriptedRunner::new();
    runner
        .respond(&["-xc"], ProcessOutput::new(0, CLANG_C_OUTPUT.iter().copied(), []))
        .respond(
            &["-xc++"],
            ProcessOutput::new(0, CLANG_CPP_OUTPUT.iter().copied(), []),
        );
    runner
}

fn command(program: &str) -> Vec<String> {
    vec![program.to_string()]
}

fn strings(set: &FilePathSet) -> Vec<&str> {
    set.iter().map(|path| path.as_str()).collect()
}

async fn clang(runner: &ScriptedRunner, language: SourceLanguage) -> Compiler {
    Compiler::create(
        &context(runner),
        command("/usr/bin/clang"),
        language,
        &base("clang"),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn discovers_clang_defaults() {
    let runner = scripted();
    let compiler = clang(&runner, SourceLanguage::C).await;
    assert_eq!(compiler.family(), CompilerFamily::Clang);

    let invocations = runner.invocations();
    assert_eq!(invocations.len(), 1);
    assert_eq!(
        invocations[0].command,
        vec!["/usr/bin/clang", "-std=gnu99", "-xc", "-Wp,-v", "-E", "-dD", "/dev/null"]
    );

    let config = compiler.default_configuration();
    assert_eq!(strings(&config.sys_includes), vec!["/usr/include"]);
    assert_eq!(strings(&config.framework_includes), vec!["/usr/include/foo"]);
    assert!(config.includes.is_empty());
    assert_eq!(config.defines.len(), 2);
    assert_eq!(config.standard, LanguageStandard::C99);
    assert_eq!(config.intellisense_mode, IntelliSenseMode::ClangX64);
    assert_eq!(config.compiler_path, None);
}

#[tokio::test]
async fn cpp_uses_its_own_flags() {
    let runner = scripted();
    let compiler = clang(&runner, SourceLanguage::Cpp).await;

    let invocation = &runner.invocations()[0];
    assert!(invocation.command.iter().any(|arg| arg == "-std=c++14"));
    assert!(invocation.command.iter().any(|arg| arg == "-xc++"));
    assert_eq!(
        compiler.default_configuration().standard,
        LanguageStandard::Cpp14
    );
}

#[tokio::test]
async fn baseline_is_immutable() {
    let runner = scripted();
    let compiler = clang(&runner, SourceLanguage::C).await;
    let base_dir = FilePath::new("/obj/dom");

    let empty: &[&str] = &[];
    let original = compiler.resolve_configuration(empty, &base_dir);
    let first = compiler.resolve_configuration(&["-DFOO", "-I/inc"], &base_dir);
    let second = compiler.resolve_configuration(&["-D__clang__=0", "-include", "/a.h"], &base_dir);
    let again = compiler.resolve_configuration(empty, &base_dir);

    assert!(first.defines.get("FOO").is_some());
    assert_eq!(second.defines.get("__clang__").unwrap().value, "0");
    assert_eq!(again, original);
    assert_eq!(again, compiler.default_configuration());
}

#[tokio::test]
async fn forced_include_flag_depends_on_family() {
    let runner = scripted();
    let compiler = clang(&runner, SourceLanguage::C).await;
    let base_dir = FilePath::new("/obj");

    let config = compiler.resolve_configuration(&["-include", "/obj/mozilla-config.h"], &base_dir);
    assert_eq!(strings(&config.forced_includes), vec!["/obj/mozilla-config.h"]);
    let config = compiler.resolve_configuration(&["-include"], &base_dir);
    assert!(config.forced_includes.is_empty());

    let msvc = Compiler::create(
        &context(&runner),
        command("clang-cl"),
        SourceLanguage::C,
        &base("clang-cl"),
    )
    .await
    .unwrap();
    let config = msvc.resolve_configuration(&["-FI", "/obj/mozilla-config.h"], &base_dir);
    assert_eq!(strings(&config.forced_includes), vec!["/obj/mozilla-config.h"]);
}

#[tokio::test]
async fn clang_cl_discovery_and_compile() {
    let runner = ScriptedRunner::new();
    runner.respond(&["-TP"], ProcessOutput::new(0, CLANG_CPP_OUTPUT.iter().copied(), []));
    let compiler = Compiler::create(
        &context(&runner),
        command("clang-cl"),
        SourceLanguage::Cpp,
        &base("clang-cl"),
    )
    .await
    .unwrap();
    assert_eq!(compiler.family(), CompilerFamily::Msvc);
    assert_eq!(
        runner.invocations()[0].command,
        vec!["clang-cl", "-std:c++14", "-TP", "-v", "-E", "-Xclang", "-dM", "/dev/null"]
    );

    let config = compiler.default_configuration();
    let err = compiler
        .compile(&config, &FilePath::new("/src/a.cpp"))
        .await
        .unwrap_err();
    assert!(matches!(err, CompilerError::CompileUnsupported(_)), "{err:?}");
}

#[tokio::test]
async fn unsupported_compilers() {
    let runner = scripted();
    let create = |cc_type: &'static str| {
        let context = context(&runner);
        async move {
            let base = if cc_type.is_empty() {
                Fragment::new()
            } else {
                base(cc_type)
            };
            Compiler::create(&context, command("cc"), SourceLanguage::C, &base).await
        }
    };

    let err = create("msvc").await.unwrap_err();
    assert_eq!(err.to_string(), "msvc compiler is currently not supported");
    let err = create("gcc").await.unwrap_err();
    assert!(matches!(err, CompilerError::UnknownType(ty) if ty == "gcc"));
    let err = create("").await.unwrap_err();
    assert!(matches!(err, CompilerError::MissingType));

    // We never got far enough to run anything.
    assert!(runner.invocations().is_empty());
}

#[tokio::test]
async fn discovery_failures() {
    // Nothing that looks like a define.
    let runner = ScriptedRunner::new();
    runner.respond(&["-xc"], ProcessOutput::new(0, ["garbage"], []));
    let err = Compiler::create(&context(&runner), command("cc"), SourceLanguage::C, &base("clang"))
        .await
        .unwrap_err();
    assert!(matches!(err, CompilerError::NoDefines { .. }), "{err:?}");

    // The compiler ran but failed.
    let runner = ScriptedRunner::new();
    runner.respond(&["-xc"], ProcessOutput::new(1, CLANG_C_OUTPUT.iter().copied(), []));
    let err = Compiler::create(&context(&runner), command("cc"), SourceLanguage::C, &base("clang"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, CompilerError::DiscoveryExit { exit_code: 1, .. }),
        "{err:?}"
    );

    // The compiler doesn't exist.
    let runner = ScriptedRunner::new();
    let err = Compiler::create(&context(&runner), command("cc"), SourceLanguage::C, &base("clang"))
        .await
        .unwrap_err();
    assert!(matches!(err, CompilerError::Process(_)), "{err:?}");
}

#[tokio::test]
async fn command_override() {
    let runner = ScriptedRunner::new();
    // The override reports nothing, but is trusted anyway.
    runner
        .respond(&["/opt/clang/bin/clang", "-xc"], ProcessOutput::new(0, ["nothing"], []))
        .respond(&["-c"], ProcessOutput::new(0, Vec::<String>::new(), []));
    let context = context(&runner);
    context
        .configs
        .update(&C_COMPILER_COMMAND, "/opt/clang/bin/clang --target=x86_64");

    let compiler = Compiler::create(&context, command("cc"), SourceLanguage::C, &base("clang"))
        .await
        .unwrap();
    let config = compiler.default_configuration();
    assert_eq!(
        config.compiler_path,
        Some(FilePath::new("/opt/clang/bin/clang"))
    );
    assert!(config.defines.is_empty());
    assert_eq!(
        &runner.invocations()[0].command[..2],
        &["/opt/clang/bin/clang", "--target=x86_64"]
    );

    // Overrides are read when they're used.
    context.configs.update(&C_COMPILER_COMMAND, "");
    compiler
        .compile(&config, &FilePath::new("/src/a.c"))
        .await
        .unwrap();
    assert_eq!(runner.invocations()[1].program(), Some("cc"));

    let state = compiler.state();
    assert_eq!(state.command_override, None);
    assert_eq!(state.command, vec!["cc"]);

    context.configs.update(&C_COMPILER_COMMAND, "'unterminated");
    let err = compiler
        .compile(&config, &FilePath::new("/src/a.c"))
        .await
        .unwrap_err();
    assert!(matches!(err, CompilerError::Override { .. }), "{err:?}");
}

#[tokio::test]
async fn compile_command_layout() {
    let runner = scripted();
    runner.respond(&["-c"], ProcessOutput::new(1, ["a.c:1:1: error: oops"], ["1 error generated."]));
    let compiler = clang(&runner, SourceLanguage::C).await;

    let mut config = compiler.resolve_configuration(
        &["-DFOO=1", "-I/src/inc", "-include", "/obj/mozilla-config.h"],
        &FilePath::new("/obj/dom"),
    );
    config.defines = Defines::new();
    config.defines.insert(Define::parse("FOO=1", '='));

    let source = FilePath::new("/src/dom/a.c");
    let output = compiler.compile(&config, &source).await.unwrap();
    assert_eq!(output.exit_code, 1);
    assert_eq!(output.output.len(), 2);

    let invocation = &runner.invocations()[1];
    assert_eq!(invocation.cwd, Some(FilePath::new("/src/dom")));
    assert_eq!(
        invocation.command,
        vec![
            "/usr/bin/clang",
            "-nobuiltininc",
            "-undef",
            "-c",
            "-Wno-everything",
            "-o",
            "/dev/null",
            "-isystem/usr/include",
            "-iframework/usr/include/foo",
            "-DFOO=1",
            "-I/src/inc",
            "-include",
            "/obj/mozilla-config.h",
            "/src/dom/a.c",
        ]
    );
}

#[tokio::test]
async fn compile_passes_sdk_first() {
    let runner = scripted();
    runner.respond(&["-c"], ProcessOutput::new(0, Vec::<String>::new(), []));
    let compiler = clang(&runner, SourceLanguage::C).await;

    let mut config = compiler.default_configuration();
    config.macos_sdk = Some(FilePath::new("/Applications/Xcode.app/SDKs/MacOSX.sdk"));
    compiler
        .compile(&config, &FilePath::new("/src/a.c"))
        .await
        .unwrap();

    let invocation = &runner.invocations()[1];
    assert_eq!(
        &invocation.command[..4],
        &[
            "/usr/bin/clang",
            "-isysroot",
            "/Applications/Xcode.app/SDKs/MacOSX.sdk",
            "-nobuiltininc",
        ]
    );
}

#[test]
fn sdk_only_on_macos() {
    let mut base = base("clang");
    assert_eq!(discovery_sdk(&base, true), None);

    base.set("MACOS_SDK_DIR", "/sdk");
    assert_eq!(discovery_sdk(&base, true), Some(FilePath::new("/sdk")));
    assert_eq!(discovery_sdk(&base, false), None);
}

#[test]
fn discovery_command_with_sdk() {
    let sdk = FilePath::new("/sdk");
    assert_eq!(
        discovery_command(command("clang"), CompilerFamily::Clang, SourceLanguage::Cpp, Some(&sdk)),
        vec!["clang", "-std=c++14", "-xc++", "-isysroot", "/sdk", "-Wp,-v", "-E", "-dD", "/dev/null"]
    );
    // clang-cl has no use for it.
    assert_eq!(
        discovery_command(command("clang-cl"), CompilerFamily::Msvc, SourceLanguage::C, Some(&sdk)),
        vec!["clang-cl", "-std:gnu99", "-TC", "-v", "-E", "-Xclang", "-dM", "/dev/null"]
    );
}

#[tokio::test]
async fn include_paths_order() {
    let runner = ScriptedRunner::new();
    runner.respond(
        &["-xc"],
        ProcessOutput::new(
            0,
            [
                "#include \"...\" search starts here:",
                " /quoted",
                "#include <...> search starts here:",
                " /usr/include",
                " /Frameworks (framework directory)",
                "End of search list.",
                "#define A 1",
            ],
            [],
        ),
    );
    let compiler = clang(&runner, SourceLanguage::C).await;
    assert_eq!(
        strings(&compiler.include_paths()),
        vec!["/usr/include", "/Frameworks", "/quoted"]
    );
}

#[tokio::test]
async fn state_shape() {
    let runner = scripted();
    let compiler = clang(&runner, SourceLanguage::Cpp).await;

    let state = serde_json::to_value(compiler.state()).unwrap();
    assert_eq!(
        state,
        serde_json::json!({
            "type": "clang",
            "language": "cpp",
            "command": ["/usr/bin/clang"],
            "override": null,
            "includes": [],
            "sysIncludes": ["/usr/include/c++/13", "/usr/include"],
            "osxFrameworkIncludes": [],
            "defines": 2,
        })
    );
}
