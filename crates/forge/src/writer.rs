//! Indentation-aware text sink for generated C#.

const INDENT: &str = "    ";

/// Accumulates lines, indenting each by the current brace depth.
#[derive(Debug, Default)]
pub struct CodeWriter {
    buf: String,
    depth: usize,
}

/// Braces outside string and char literals: `(leading closers, remaining opens, remaining closes)`.
fn brace_counts(line: &str) -> (usize, usize, usize) {
    let mut leading = 0;
    let mut opens = 0;
    let mut closes = 0;
    let mut seen_code = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' | '\'' => {
                seen_code = true;
                skip_literal(&mut chars, c, false);
            }
            '@' if chars.peek() == Some(&'"') => {
                seen_code = true;
                chars.next();
                skip_literal(&mut chars, '"', true);
            }
            '/' if chars.peek() == Some(&'/') => break,
            '{' => {
                seen_code = true;
                opens += 1;
            }
            '}' if !seen_code => leading += 1,
            '}' => closes += 1,
            c if c.is_whitespace() => {}
            _ => seen_code = true,
        }
    }
    (leading, opens, closes)
}

fn skip_literal(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, quote: char, verbatim: bool) {
    while let Some(c) = chars.next() {
        if c == '\\' && !verbatim {
            chars.next();
        } else if c == quote {
            if verbatim && chars.peek() == Some(&quote) {
                chars.next();
                continue;
            }
            return;
        }
    }
}

impl CodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes one line. Leading `}` dedent it; unbalanced braces adjust the depth
    /// for the lines that follow.
    pub fn line(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            self.blank();
            return;
        }
        let (leading, opens, closes) = brace_counts(text);
        self.depth = self.depth.saturating_sub(leading);
        for _ in 0..self.depth {
            self.buf.push_str(INDENT);
        }
        self.buf.push_str(text);
        self.buf.push('\n');
        self.depth = (self.depth + opens).saturating_sub(closes);
    }

    /// Writes every line of a multi-line snippet, ignoring its own indentation.
    pub fn block(&mut self, snippet: &str) {
        for line in snippet.lines() {
            self.line(line);
        }
    }

    /// Empty line, never two in a row and never right after an opening brace.
    pub fn blank(&mut self) {
        if self.buf.is_empty() || self.buf.ends_with("\n\n") || self.buf.ends_with("{\n") {
            return;
        }
        self.buf.push('\n');
    }

    pub fn open(&mut self, header: &str) {
        self.line(header);
        self.line("{");
    }

    pub fn close(&mut self) {
        // A blank line right before a closing brace reads as noise.
        while self.buf.ends_with("\n\n") {
            self.buf.pop();
        }
        self.line("}");
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The text written so far, ending in exactly one newline.
    pub fn finish(self) -> String {
        let mut text = self.buf.trim_end().to_string();
        text.push('\n');
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_reindents_by_brace_depth() {
        let mut w = CodeWriter::new();
        w.open("class C");
        w.block("if (x)\n{\ntry\n{");
        w.line("Call();");
        w.block("}\ncatch (Exception e)\n{\nthrow;\n}\n}");
        w.close();
        assert_eq!(
            w.finish(),
            "class C\n{\n    if (x)\n    {\n        try\n        {\n            Call();\n        }\n        catch (Exception e)\n        {\n            throw;\n        }\n    }\n}\n"
        );
    }

    #[test]
    fn test_braces_in_literals_ignored() {
        assert_eq!(brace_counts("var s = \"{ not a block\";"), (0, 0, 0));
        assert_eq!(brace_counts("var c = '{';"), (0, 0, 0));
        assert_eq!(brace_counts("var v = @\"}\"\"{\";"), (0, 0, 0));
        assert_eq!(brace_counts("x(\"\\\"{\"); // }"), (0, 0, 0));
    }

    #[test]
    fn test_leading_close_dedents_before_writing() {
        assert_eq!(brace_counts("}, Mode.PublicationOnly);"), (1, 0, 0));
        let mut w = CodeWriter::new();
        w.line("var f = new Lazy<A>(() =>");
        w.line("{");
        w.line("return a;");
        w.line("}, Mode.PublicationOnly);");
        assert_eq!(w.depth(), 0);
        assert_eq!(
            w.finish(),
            "var f = new Lazy<A>(() =>\n{\n    return a;\n}, Mode.PublicationOnly);\n"
        );
    }

    #[test]
    fn test_blank_lines_collapse() {
        let mut w = CodeWriter::new();
        w.blank();
        w.open("namespace N");
        w.blank();
        w.line("int x;");
        w.blank();
        w.blank();
        w.close();
        assert_eq!(w.finish(), "namespace N\n{\n    int x;\n}\n");
    }
}
