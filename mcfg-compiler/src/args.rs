//! Folding compiler arguments into a [`CompileConfig`].
//!
//! This is not a compiler driver, we only pick out the arguments that change how a file is
//! understood: `-D`, `-I` and the forced include flag. Everything else is skipped.

use mcfg_types::{CompileConfig, Define, FilePath};

/// Apply `args` on top of `config`.
///
/// Relative include paths are resolved against `base_dir`, the directory the real build runs
/// the compiler from. `forced_include_flag` is the family specific spelling of "include this
/// header first", e.g. `-include` for Clang or `-FI` for MSVC.
pub fn apply_arguments<S: AsRef<str>>(
    args: &[S],
    forced_include_flag: &str,
    base_dir: &FilePath,
    config: &mut CompileConfig,
) {
    let mut args = args.iter().map(AsRef::as_ref);

    while let Some(arg) = args.next() {
        if let Some((flag, rest)) = split_flag(arg) {
            match flag {
                'D' => {
                    if !rest.is_empty() {
                        config.defines.insert(Define::parse(rest, '='));
                    }
                    continue;
                }
                'I' => {
                    if !rest.is_empty() {
                        config.includes.insert(base_dir.resolve(rest));
                    }
                    continue;
                }
                _ => (),
            }
        }

        if arg == forced_include_flag {
            match args.next() {
                Some(header) => {
                    config.forced_includes.insert(base_dir.resolve(header));
                }
                None => tracing::debug!(flag = %arg, "forced include flag without a header"),
            }
        }
    }
}

/// Splits `-Xrest` or `/Xrest` into `X` and `rest`.
fn split_flag(arg: &str) -> Option<(char, &str)> {
    let rest = arg.strip_prefix(['-', '/'])?;
    let mut chars = rest.chars();
    let flag = chars.next()?;
    Some((flag, chars.as_str()))
}
