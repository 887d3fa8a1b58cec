//! Tokenization of recipe source text using `nom`.
//!
//! A recipe is line oriented. The lexer joins `\` continuations, drops
//! `#` comment lines and blank lines, and splits each logical line into its
//! instruction keyword and the raw argument text. [`split_words`] then breaks
//! argument text into shell-like words.

use berth_common::error::{BerthError, Result};
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::char,
    multi::many1,
};

/// Characters of offending text quoted in parse errors.
const ERROR_SNIPPET_CHARS: usize = 20;

/// Instruction keywords understood by Berth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    /// `FROM`: base runtime image.
    From,
    /// `WORKDIR`: the service root.
    Workdir,
    /// `ENV`: environment assignments.
    Env,
    /// `COPY`: populate the root from the build context.
    Copy,
    /// `RUN`: dependency installation command.
    Run,
    /// `EXPOSE`: port declaration.
    Expose,
    /// `CMD`: the service entrypoint.
    Cmd,
}

/// One logical recipe line after continuation joining.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// 1-based physical line where the instruction starts.
    pub line: usize,
    /// Instruction keyword.
    pub keyword: Keyword,
    /// Argument text with surrounding whitespace trimmed.
    pub rest: String,
}

fn parse_keyword(word: &str) -> Option<Keyword> {
    let kw = match word.to_ascii_uppercase().as_str() {
        "FROM" => Keyword::From,
        "WORKDIR" => Keyword::Workdir,
        "ENV" => Keyword::Env,
        "COPY" => Keyword::Copy,
        "RUN" => Keyword::Run,
        "EXPOSE" => Keyword::Expose,
        "CMD" => Keyword::Cmd,
        _ => return None,
    };
    Some(kw)
}

/// Splits a logical line into the leading keyword and the remaining text.
fn keyword_and_rest(input: &str) -> IResult<&str, &str> {
    let (input, word) = take_while1(|c: char| c.is_ascii_alphabetic())(input)?;
    let (input, _) = take_while(char::is_whitespace)(input)?;
    Ok((input, word))
}

/// Tokenizes recipe source into logical lines.
///
/// # Errors
///
/// Returns an error for unknown instructions, lines that do not start with
/// an instruction word, or a continuation that runs off the end of the file.
pub fn tokenize(input: &str) -> Result<Vec<LogicalLine>> {
    let mut lines = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (idx, raw) in input.lines().enumerate() {
        let number = idx + 1;
        let trimmed = raw.trim();

        if trimmed.starts_with('#') {
            continue;
        }
        if trimmed.is_empty() && pending.is_none() {
            continue;
        }

        let (start, mut text) = pending.take().unwrap_or_else(|| (number, String::new()));
        if let Some(body) = trimmed.strip_suffix('\\') {
            text.push_str(body);
            text.push(' ');
            pending = Some((start, text));
            continue;
        }
        text.push_str(trimmed);
        lines.push(lex_line(start, &text)?);
    }

    if let Some((start, _)) = pending {
        return Err(BerthError::Parse {
            line: start,
            message: "line continuation runs past the end of the file".into(),
        });
    }

    Ok(lines)
}

fn lex_line(line: usize, text: &str) -> Result<LogicalLine> {
    let (rest, word) = keyword_and_rest(text).map_err(|_| BerthError::Parse {
        line,
        message: format!(
            "expected an instruction at: \"{}\"",
            snippet(text)
        ),
    })?;
    let keyword = parse_keyword(word).ok_or_else(|| BerthError::Parse {
        line,
        message: format!("unknown instruction {}", word.to_ascii_uppercase()),
    })?;
    Ok(LogicalLine {
        line,
        keyword,
        rest: rest.trim().to_string(),
    })
}

/// First characters of `text` for error messages.
fn snippet(text: &str) -> String {
    text.chars().take(ERROR_SNIPPET_CHARS).collect()
}

/// Parses a double-quoted segment with basic escape support.
fn quoted(input: &str) -> IResult<&str, String> {
    let (input, _) = char('"')(input)?;
    let mut result = String::new();
    let mut chars = input.char_indices();
    loop {
        match chars.next() {
            Some((idx, '"')) => {
                let remaining = &input[idx + 1..];
                return Ok((remaining, result));
            }
            Some((_, '\\')) => match chars.next() {
                Some((_, 'n')) => result.push('\n'),
                Some((_, 't')) => result.push('\t'),
                Some((_, '\\')) => result.push('\\'),
                Some((_, '"')) => result.push('"'),
                Some((_, c)) => {
                    result.push('\\');
                    result.push(c);
                }
                None => {
                    return Err(nom::Err::Failure(nom::error::Error::new(
                        input,
                        nom::error::ErrorKind::Char,
                    )));
                }
            },
            Some((_, c)) => result.push(c),
            None => {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Char,
                )));
            }
        }
    }
}

fn bare(input: &str) -> IResult<&str, String> {
    let (input, chunk) = take_while1(|c: char| !c.is_whitespace() && c != '"')(input)?;
    Ok((input, chunk.to_string()))
}

/// A word is a run of bare and quoted segments with no whitespace between.
fn word(input: &str) -> IResult<&str, String> {
    let (input, parts) = many1(alt((quoted, bare))).parse(input)?;
    Ok((input, parts.concat()))
}

/// Splits argument text into words, honouring double quotes.
///
/// # Errors
///
/// Returns an error if a quoted segment is not terminated.
pub fn split_words(rest: &str, line: usize) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut remaining = rest.trim_start();
    while !remaining.is_empty() {
        let (after, w) = word(remaining).map_err(|_| BerthError::Parse {
            line,
            message: format!(
                "unterminated quote at: \"{}\"",
                snippet(remaining)
            ),
        })?;
        words.push(w);
        remaining = after.trim_start();
    }
    Ok(words)
}

/// Parses the JSON array form (`["a", "b"]`) used by `RUN`, `CMD` and `COPY`.
///
/// Returns `None` when the text is not a JSON array of strings, so callers
/// can fall back to the shell form.
#[must_use]
pub fn json_array(rest: &str) -> Option<Vec<String>> {
    if !rest.starts_with('[') {
        return None;
    }
    serde_json::from_str::<Vec<String>>(rest).ok()
}
