//! Terminal rendering for diagnostics.
//!
//! Pure string building over (file path, diagnostic, source text) — no I/O,
//! no state, so the same diagnostic always renders the same way.

use std::path::Path;

use crate::protocol::{Diagnostic, DiagnosticCode};

/// One-line form: `<file>(<line>,<col>): <severity> <code>: <message>`.
///
/// Line and column are 1-based on output; the wire carries them 0-based.
/// The code clause is dropped when the diagnostic has no code.
#[must_use]
pub fn simple(file: &Path, diagnostic: &Diagnostic) -> String {
    let start = diagnostic.range.start;
    let severity = diagnostic.severity().label();
    match code_label(diagnostic) {
        Some(code) => format!(
            "{}({},{}): {severity} {code}: {}",
            file.display(),
            start.line + 1,
            start.character + 1,
            diagnostic.message
        ),
        None => format!(
            "{}({},{}): {severity}: {}",
            file.display(),
            start.line + 1,
            start.character + 1,
            diagnostic.message
        ),
    }
}

/// Multi-line form: a `file:line:col` header, the offending source line,
/// and an underline covering the diagnostic's range.
///
/// The source line is looked up in `text` by the 0-based start line; an
/// index past the end of the file renders as an empty line. The underline
/// runs from the start character to the end character, never narrower than
/// one column.
#[must_use]
pub fn pretty(file: &Path, diagnostic: &Diagnostic, text: &str) -> String {
    let start = diagnostic.range.start;
    let severity = diagnostic.severity().label();

    let header = match code_label(diagnostic) {
        Some(code) => format!(
            "{}:{}:{} - {severity} {code}: {}",
            file.display(),
            start.line + 1,
            start.character + 1,
            diagnostic.message
        ),
        None => format!(
            "{}:{}:{} - {severity}: {}",
            file.display(),
            start.line + 1,
            start.character + 1,
            diagnostic.message
        ),
    };

    let source_line = text.lines().nth(start.line as usize).unwrap_or("");
    let gutter = (start.line + 1).to_string();

    let mut out = String::new();
    out.push_str(&header);
    out.push('\n');
    out.push('\n');
    out.push_str(&format!("{gutter} {source_line}\n"));
    out.push_str(&format!(
        "{} {}{}",
        " ".repeat(gutter.len()),
        " ".repeat(start.character as usize),
        "~".repeat(underline_width(diagnostic)),
    ));
    out
}

/// Underline span in columns, at least one even for a zero-width range.
fn underline_width(diagnostic: &Diagnostic) -> usize {
    let range = diagnostic.range;
    range
        .end
        .character
        .saturating_sub(range.start.character)
        .max(1) as usize
}

fn code_label(diagnostic: &Diagnostic) -> Option<String> {
    match &diagnostic.code {
        Some(DiagnosticCode::Number(n)) => Some(format!("TS{n}")),
        Some(DiagnosticCode::Text(text)) => Some(text.clone()),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Position, Range};

    fn span(start_line: u32, start_char: u32, end_line: u32, end_char: u32) -> Range {
        Range {
            start: Position {
                line: start_line,
                character: start_char,
            },
            end: Position {
                line: end_line,
                character: end_char,
            },
        }
    }

    #[test]
    fn simple_is_one_based() {
        let diagnostic = Diagnostic::for_tests(
            span(4, 2, 4, 9),
            Some(1),
            Some(DiagnosticCode::Number(2304)),
            "Cannot find name 'x'.",
        );
        assert_eq!(
            simple(Path::new("src/app.ts"), &diagnostic),
            "src/app.ts(5,3): error TS2304: Cannot find name 'x'."
        );
    }

    #[test]
    fn simple_without_code_drops_the_code_clause() {
        let diagnostic = Diagnostic::for_tests(span(0, 0, 0, 1), Some(2), None, "unused variable");
        assert_eq!(
            simple(Path::new("lib.ts"), &diagnostic),
            "lib.ts(1,1): warning: unused variable"
        );
    }

    #[test]
    fn simple_keeps_string_codes_verbatim() {
        let diagnostic = Diagnostic::for_tests(
            span(0, 0, 0, 1),
            Some(2),
            Some(DiagnosticCode::Text("no-undef".into())),
            "not defined",
        );
        assert!(simple(Path::new("a.ts"), &diagnostic).contains("warning no-undef:"));
    }

    #[test]
    fn unknown_severity_reads_as_hint() {
        let diagnostic = Diagnostic::for_tests(span(0, 0, 0, 1), Some(9), None, "odd");
        assert_eq!(
            simple(Path::new("a.ts"), &diagnostic),
            "a.ts(1,1): hint: odd"
        );
    }

    #[test]
    fn pretty_underlines_the_range() {
        // Range end carrying only a character offset, as some servers emit.
        let diagnostic = Diagnostic::for_tests(
            span(4, 2, 0, 9),
            Some(1),
            Some(DiagnosticCode::Number(2322)),
            "wrong type",
        );
        let text = "one\ntwo\nthree\nfour\nlet bad = 5;\n";

        let rendered = pretty(Path::new("src/app.ts"), &diagnostic, text);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "src/app.ts:5:3 - error TS2322: wrong type");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "5 let bad = 5;");
        assert_eq!(lines[3], "    ~~~~~~~", "two columns in, seven wide");
    }

    #[test]
    fn pretty_zero_width_range_still_underlines() {
        let diagnostic = Diagnostic::for_tests(span(0, 3, 0, 3), Some(1), None, "missing semicolon");
        let rendered = pretty(Path::new("a.ts"), &diagnostic, "let x\n");
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[2], "1 let x");
        assert_eq!(lines[3], "     ~");
    }

    #[test]
    fn pretty_line_past_the_end_renders_empty() {
        let diagnostic = Diagnostic::for_tests(span(40, 0, 40, 5), Some(1), None, "phantom");
        let rendered = pretty(Path::new("a.ts"), &diagnostic, "only one line\n");
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[2], "41 ");
        assert_eq!(lines[3], "   ~~~~~");
    }

    #[test]
    fn rendering_is_pure() {
        let diagnostic = Diagnostic::for_tests(
            span(1, 0, 1, 4),
            Some(3),
            Some(DiagnosticCode::Number(7044)),
            "implicit any",
        );
        let text = "a\nb c d e\n";
        assert_eq!(
            simple(Path::new("x.ts"), &diagnostic),
            simple(Path::new("x.ts"), &diagnostic)
        );
        assert_eq!(
            pretty(Path::new("x.ts"), &diagnostic, text),
            pretty(Path::new("x.ts"), &diagnostic, text)
        );
    }
}
