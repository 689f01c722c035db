//! Prometheus text exposition primitives.
//!
//! Pure string helpers shared by every metric family: name validation,
//! label-value escaping and sample value formatting. Rendering of whole
//! families lives next to the families themselves in the server crate.

use std::fmt::Write;

/// Content type of the text exposition format, version 0.0.4.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Whether `name` matches `[a-zA-Z_:][a-zA-Z0-9_:]*`.
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Whether `name` is usable as a label name (`[a-zA-Z_][a-zA-Z0-9_]*`, no `__` prefix).
pub fn is_valid_label_name(name: &str) -> bool {
    if name.starts_with("__") {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Escape a label value (`\`, `"` and newline).
pub fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

/// Escape HELP text (`\` and newline).
pub fn escape_help(v: &str) -> String {
    v.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Format a sample value or bucket bound.
///
/// Integral values keep a trailing `.0` the way the reference client renders
/// bucket bounds (`le="1.0"`), infinities render as `+Inf`/`-Inf`.
pub fn format_float(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

/// Render `k="v",...` for the given label pairs (no braces).
pub fn label_pairs(names: &[String], values: &[String]) -> String {
    let mut out = String::new();
    for (i, (k, v)) in names.iter().zip(values).enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{}=\"{}\"", k, escape_label(v));
    }
    out
}

/// Write the `# HELP` / `# TYPE` header of a family.
pub fn write_header(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {} {}", name, escape_help(help));
    let _ = writeln!(out, "# TYPE {} {}", name, kind);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats_render_like_the_reference_client() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.005), "0.005");
        assert_eq!(format_float(2.5), "2.5");
        assert_eq!(format_float(f64::INFINITY), "+Inf");
        assert_eq!(format_float(0.0), "0.0");
    }

    #[test]
    fn label_pairs_escape_values() {
        let names = vec!["path".to_string(), "method".to_string()];
        let values = vec!["/a\"b".to_string(), "GET".to_string()];
        assert_eq!(label_pairs(&names, &values), r#"path="/a\"b",method="GET""#);
    }
}
