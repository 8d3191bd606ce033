//! Derived secret variants
//!
//! A secret rarely appears in logs byte-for-byte: tools re-quote it, compact
//! JSON blobs, expand shell fragments or URL-encode it. In the guarded
//! extra-masking mode each secret therefore also registers these derived
//! forms. Variants of length <= 1 are discarded by the caller.

use regex::Regex;
use std::sync::OnceLock;

fn shell_var_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{[^}]*\}|\$\w+").expect("static regex"))
}

fn backtick_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`[^`]*`").expect("static regex"))
}

/// All derived variants of `secret`, unfiltered and possibly duplicated.
pub fn expand(secret: &str) -> Vec<String> {
    let mut out = Vec::new();

    // Quote handling
    out.push(secret.replace('"', ""));
    out.push(secret.replace('\'', ""));
    out.push(secret.replace("\\\"", "\""));

    // JSON handling
    let compact = compact_json(secret);
    out.push(compact.clone());
    out.push(compact.replace('"', ""));

    // Shell handling
    out.push(shell_var_re().replace_all(secret, "").into_owned());
    out.push(backtick_re().replace_all(secret, "").into_owned());

    // URL encodings
    let pct = urlencoding::encode(secret).into_owned();
    out.push(pct.replace("%20", "+"));
    out.push(pct.clone());
    out.push(pct.replace("%2F", "/"));

    out.retain(|v| v != secret);
    out
}

/// Remove whitespace that sits outside JSON string literals.
///
/// Works on arbitrary text: no parse is attempted, only quote tracking with
/// backslash escapes.
fn compact_json(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;
    for ch in input.chars() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            c if c.is_whitespace() => {}
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_stripping_variants() {
        let variants = expand(r#"pa"ss'wd"#);
        assert!(variants.iter().any(|v| v == "pass'wd"));
        assert!(variants.iter().any(|v| v == r#"pa"sswd"#));
    }

    #[test]
    fn test_json_compaction_preserves_string_spaces() {
        let compact = compact_json(r#"{ "key": "two words" }"#);
        assert_eq!(compact, r#"{"key":"two words"}"#);
    }

    #[test]
    fn test_json_compact_variant_present() {
        let variants = expand(r#"{ "user": "admin" }"#);
        assert!(variants.iter().any(|v| v == r#"{"user":"admin"}"#));
        assert!(variants.iter().any(|v| v == "{user:admin}"));
    }

    #[test]
    fn test_shell_expansion_stripped() {
        let variants = expand("prefix-$HOME-suffix");
        assert!(variants.iter().any(|v| v == "prefix--suffix"));

        let braced = expand("a${VAR}b");
        assert!(braced.iter().any(|v| v == "ab"));
    }

    #[test]
    fn test_backtick_substitution_stripped() {
        let variants = expand("x`whoami`y");
        assert!(variants.iter().any(|v| v == "xy"));
    }

    #[test]
    fn test_url_encoded_variants() {
        let variants = expand("a b/c");
        assert!(variants.iter().any(|v| v == "a+b%2Fc"));
        assert!(variants.iter().any(|v| v == "a%20b%2Fc"));
        assert!(variants.iter().any(|v| v == "a%20b/c"));
    }

    #[test]
    fn test_identity_variants_filtered() {
        // A plain token produces no variant equal to itself.
        let variants = expand("plaintoken");
        assert!(variants.iter().all(|v| v != "plaintoken"));
    }
}
