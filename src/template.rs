//! Streaming `{{ expression }}` templates.
//!
//! The document is scanned once from left to right. Literal text and the
//! rendered result of each expression go to the sink as soon as they are
//! known; nothing is buffered and no tree is built. The first `}}` after an
//! opening `{{` closes the expression, and there is no way to escape a
//! literal `{{`.

use crate::errors::{AppError, AppResult};

pub const OPEN: &[u8] = b"{{";
pub const CLOSE: &[u8] = b"}}";

/// Evaluates the text between the delimiters to the bytes it renders as.
pub trait Evaluate {
    fn evaluate(&mut self, expression: &[u8]) -> AppResult<Vec<u8>>;
}

impl<F> Evaluate for F
where
    F: ?Sized + FnMut(&[u8]) -> AppResult<Vec<u8>>,
{
    fn evaluate(&mut self, expression: &[u8]) -> AppResult<Vec<u8>> {
        self(expression)
    }
}

/// Renders `template` into `sink`.
///
/// Expressions are evaluated exactly once, in document order, each before the
/// literal that follows it is emitted. On error the spans already handed to
/// the sink stay written.
pub fn render<E, S>(template: &[u8], evaluator: &mut E, mut sink: S) -> AppResult<()>
where
    E: Evaluate + ?Sized,
    S: FnMut(&[u8]) -> AppResult<()>,
{
    let mut cursor = 0;
    while cursor < template.len() {
        let rest = &template[cursor..];
        let Some(open) = find(rest, OPEN) else {
            sink(rest)?;
            break;
        };
        if open > 0 {
            sink(&rest[..open])?;
        }

        let start = cursor + open + OPEN.len();
        let close = find(&template[start..], CLOSE)
            .ok_or(AppError::UnterminatedExpression { offset: cursor + open })?;
        let expression = &template[start..start + close];
        let rendered = evaluator.evaluate(expression)?;
        sink(&rendered)?;
        cursor = start + close + CLOSE.len();
    }
    Ok(())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
