//! Descriptor file parser using winnow.
//!
//! Parses the flat key/value format of on-disk filter descriptors:
//!
//! ```text
//! # enscript text filter
//! Name=Enscript
//! Comment=Text to PostScript converter
//! MimeTypeIn=text/plain,text/html
//! MimeTypeOut=application/postscript
//! Require=exec:/enscript
//! Command=enscript -p- %in
//! ```
//!
//! # Syntax
//!
//! - One `Key=Value` field per line
//! - `#` starts a comment line
//! - Blank lines are ignored
//! - Whitespace around keys and values is trimmed

use super::descriptor::DescriptorError;
use winnow::Parser;
use winnow::combinator::{opt, repeat};
use winnow::error::ContextError;
use winnow::token::take_till;

type WResult<T> = std::result::Result<T, ContextError>;

/// Parse a descriptor file into its key/value fields, in file order.
///
/// Repeated keys are preserved; interpretation is the caller's concern.
pub(super) fn parse_fields(input: &str) -> Result<Vec<(String, String)>, DescriptorError> {
    fields
        .parse(input)
        .map_err(|e| DescriptorError::Parse(e.to_string()))
}

/// Parse every line of the file.
fn fields(input: &mut &str) -> WResult<Vec<(String, String)>> {
    let lines: Vec<Option<(String, String)>> = repeat(0.., line).parse_next(input)?;

    // Ensure we consumed all input (a malformed line stops the repeat).
    if !input.is_empty() {
        return Err(ContextError::new());
    }

    Ok(lines.into_iter().flatten().collect())
}

/// Parse one line: a field, a comment, or a blank line.
fn line(input: &mut &str) -> WResult<Option<(String, String)>> {
    if input.is_empty() {
        return Err(ContextError::new());
    }

    let content: &str = take_till(0.., '\n').parse_next(input)?;
    let _ = opt('\n').parse_next(input)?;

    let content = content.trim();
    if content.is_empty() || content.starts_with('#') {
        return Ok(None);
    }

    match content.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok(Some((key.trim().to_string(), value.trim().to_string())))
        }
        _ => Err(ContextError::new()),
    }
}
