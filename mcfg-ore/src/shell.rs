//! POSIX shell style word splitting.
//!
//! Build systems hand us compiler flags as a single string, e.g.
//! `-DMOZ_APP_NAME="firefox" -I'/some dir/include'`. [`split`] turns that into the argument
//! vector a shell would have produced, without doing any expansion.

/// Error returned from [`split`] when the input is not a complete shell word list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShellParseError {
    #[error("unterminated single quote starting at byte {0}")]
    UnterminatedSingleQuote(usize),
    #[error("unterminated double quote starting at byte {0}")]
    UnterminatedDoubleQuote(usize),
    #[error("trailing backslash with nothing to escape")]
    TrailingBackslash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Between words.
    Whitespace,
    /// Inside an unquoted part of a word.
    Unquoted,
    /// Inside `'...'`, the byte offset is where the quote started.
    SingleQuoted(usize),
    /// Inside `"..."`, the byte offset is where the quote started.
    DoubleQuoted(usize),
}

/// Split `input` into words following POSIX shell quoting rules.
///
/// * Unquoted whitespace separates words.
/// * Single quotes preserve everything literally.
/// * Double quotes preserve everything except `\` followed by one of ``$ ` " \`` or a newline.
/// * An unquoted backslash escapes the following character, `\<newline>` is removed.
///
/// No parameter, command, or glob expansion is performed.
pub fn split(input: &str) -> Result<Vec<String>, ShellParseError> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut state = State::Whitespace;
    let mut chars = input.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        state = match state {
            State::Whitespace | State::Unquoted => match c {
                c if c.is_whitespace() => {
                    if state == State::Unquoted {
                        words.push(std::mem::take(&mut word));
                    }
                    State::Whitespace
                }
                '\'' => State::SingleQuoted(pos),
                '"' => State::DoubleQuoted(pos),
                '\\' => {
                    let Some((_, escaped)) = chars.next() else {
                        return Err(ShellParseError::TrailingBackslash);
                    };
                    if escaped == '\n' {
                        state
                    } else {
                        word.push(escaped);
                        State::Unquoted
                    }
                }
                c => {
                    word.push(c);
                    State::Unquoted
                }
            },
            State::SingleQuoted(start) => match c {
                '\'' => State::Unquoted,
                c => {
                    word.push(c);
                    State::SingleQuoted(start)
                }
            },
            State::DoubleQuoted(start) => match c {
                '"' => State::Unquoted,
                '\\' => {
                    match chars.peek().map(|(_, next)| *next) {
                        Some('\n') => {
                            chars.next();
                        }
                        Some(next @ ('$' | '`' | '"' | '\\')) => {
                            word.push(next);
                            chars.next();
                        }
                        _ => word.push('\\'),
                    }
                    State::DoubleQuoted(start)
                }
                c => {
                    word.push(c);
                    State::DoubleQuoted(start)
                }
            },
        };
    }

    match state {
        State::Whitespace => (),
        State::Unquoted => words.push(word),
        State::SingleQuoted(start) => return Err(ShellParseError::UnterminatedSingleQuote(start)),
        State::DoubleQuoted(start) => return Err(ShellParseError::UnterminatedDoubleQuote(start)),
    }

    Ok(words)
}
