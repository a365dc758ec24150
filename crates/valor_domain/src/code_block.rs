use crate::{Error, Result};

/// A fenced code block extracted from an assistant response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: Option<String>,
    pub code: String,
}

/// Extracts the single fenced code block from an assistant response.
///
/// The generation prompt instructs the model to emit exactly one block, and
/// this parser enforces that contract: ambiguous input is an error, never a
/// silently-truncated result. A fence is a line whose trimmed form starts
/// with three backticks; the opener may carry an info string, the closer
/// must be bare. An info-string fence inside an open block reads as a nested
/// opener and makes the outer block unterminated.
///
/// The enclosed code is returned verbatim with the delimiters stripped;
/// prose outside the fences is discarded.
pub fn extract_single_block(text: &str) -> Result<CodeBlock> {
    let mut blocks: Vec<CodeBlock> = Vec::new();
    let mut open: Option<(Option<String>, Vec<&str>)> = None;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if let Some(info) = trimmed.strip_prefix("```") {
            let info = info.trim();
            match open.take() {
                None => {
                    let language = (!info.is_empty()).then(|| info.to_string());
                    open = Some((language, Vec::new()));
                }
                Some((language, lines)) => {
                    if !info.is_empty() {
                        // A new opener before the previous block closed.
                        return Err(Error::UnterminatedCodeBlock);
                    }
                    blocks.push(CodeBlock {
                        language,
                        code: lines.join("\n"),
                    });
                    if blocks.len() > 1 {
                        return Err(Error::MultipleCodeBlocksFound);
                    }
                }
            }
        } else if let Some((_, lines)) = open.as_mut() {
            lines.push(line);
        }
    }

    if open.is_some() {
        return Err(Error::UnterminatedCodeBlock);
    }

    match blocks.len() {
        0 => Err(Error::NoCodeBlockFound),
        1 => Ok(blocks.remove(0)),
        _ => Err(Error::MultipleCodeBlocksFound),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_extracts_single_block_verbatim() {
        let fixture = "Here is the test:\n```python\nimport os\n\nprint('ok')\n```\nLet me know.";

        let actual = extract_single_block(fixture).unwrap();

        assert_eq!(actual.language.as_deref(), Some("python"));
        assert_eq!(actual.code, "import os\n\nprint('ok')");
    }

    #[test]
    fn test_block_without_language_tag() {
        let fixture = "```\nx = 1\n```";

        let actual = extract_single_block(fixture).unwrap();

        assert_eq!(actual.language, None);
        assert_eq!(actual.code, "x = 1");
    }

    #[test]
    fn test_indented_fences_are_recognized() {
        let fixture = "  ```python\n  x = 1\n  ```";

        let actual = extract_single_block(fixture).unwrap();
        assert_eq!(actual.code, "  x = 1");
    }

    #[test]
    fn test_no_fences_is_an_error() {
        let fixture = "I could not produce code for this request.";

        let actual = extract_single_block(fixture);
        assert!(matches!(actual, Err(Error::NoCodeBlockFound)));
    }

    #[test]
    fn test_two_blocks_is_an_error() {
        let fixture = "```python\na = 1\n```\nand also\n```python\nb = 2\n```";

        let actual = extract_single_block(fixture);
        assert!(matches!(actual, Err(Error::MultipleCodeBlocksFound)));
    }

    #[test]
    fn test_unterminated_block_is_an_error() {
        let fixture = "```python\na = 1\n";

        let actual = extract_single_block(fixture);
        assert!(matches!(actual, Err(Error::UnterminatedCodeBlock)));
    }

    #[test]
    fn test_nested_opener_is_unterminated() {
        let fixture = "```python\nprint('outer')\n```bash\necho inner\n```";

        let actual = extract_single_block(fixture);
        assert!(matches!(actual, Err(Error::UnterminatedCodeBlock)));
    }

    #[test]
    fn test_empty_block_is_returned_empty() {
        let fixture = "```python\n```";

        let actual = extract_single_block(fixture).unwrap();
        assert_eq!(actual.code, "");
    }
}
