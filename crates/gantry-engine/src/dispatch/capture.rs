//! Output-capture command synthesis per shell dialect
//!
//! When a step declares output variables and no explicit output file is
//! supplied, the dispatcher appends a capture suffix to the user command.
//! Values are base64-wrapped behind the `__B64__` prefix so multi-line and
//! special-character values survive the `KEY=VALUE` file format.

use std::path::Path;

/// Marker prefix for base64-encoded values in capture files.
pub const B64_PREFIX: &str = "__B64__";

/// Shell family of the step entrypoint, selected by its first element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellDialect {
    Posix,
    Powershell,
    Python,
}

impl ShellDialect {
    /// Detect the dialect from an entrypoint. An empty entrypoint is the
    /// platform default POSIX shell.
    pub fn detect(entrypoint: &[String]) -> Self {
        let Some(first) = entrypoint.first() else {
            return ShellDialect::Posix;
        };
        let program = Path::new(first)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(first)
            .to_ascii_lowercase();
        match program.as_str() {
            "powershell" | "powershell.exe" | "pwsh" | "pwsh.exe" => ShellDialect::Powershell,
            "python3" | "python" | "python.exe" | "python3.exe" => ShellDialect::Python,
            _ => ShellDialect::Posix,
        }
    }

    /// One capture statement per variable, appendable to the user command.
    pub fn capture_lines(&self, file: &Path, keys: &[String]) -> Vec<String> {
        let file = file.display();
        keys.iter()
            .map(|key| match self {
                ShellDialect::Posix => format!(
                    r#"printf '%s=__B64__%s\n' '{key}' "$(printf '%s' "${key}" | base64 | tr -d '\n')" >> {file}"#
                ),
                ShellDialect::Powershell => format!(
                    r#"Add-Content -Path {file} -Value ("{key}=__B64__" + [Convert]::ToBase64String([Text.Encoding]::UTF8.GetBytes("$Env:{key}")))"#
                ),
                ShellDialect::Python => format!(
                    r#"import os, base64
with open(r'{file}', 'a') as f:
    f.write('{key}=__B64__' + base64.b64encode(os.environ.get('{key}', '').encode()).decode() + '\n')"#
                ),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_detect_defaults_to_posix() {
        assert_eq!(ShellDialect::detect(&[]), ShellDialect::Posix);
        assert_eq!(
            ShellDialect::detect(&entry(&["sh", "-c"])),
            ShellDialect::Posix
        );
        assert_eq!(
            ShellDialect::detect(&entry(&["/bin/bash"])),
            ShellDialect::Posix
        );
    }

    #[test]
    fn test_detect_powershell_variants() {
        assert_eq!(
            ShellDialect::detect(&entry(&["powershell"])),
            ShellDialect::Powershell
        );
        assert_eq!(
            ShellDialect::detect(&entry(&["C:\\tools\\pwsh.exe"])),
            ShellDialect::Powershell
        );
    }

    #[test]
    fn test_detect_python() {
        assert_eq!(
            ShellDialect::detect(&entry(&["python3"])),
            ShellDialect::Python
        );
        assert_eq!(
            ShellDialect::detect(&entry(&["/usr/bin/python3", "-c"])),
            ShellDialect::Python
        );
    }

    #[test]
    fn test_posix_capture_line_shape() {
        let lines = ShellDialect::Posix.capture_lines(
            Path::new("/tmp/out.env"),
            &["TOKEN".to_string(), "REGION".to_string()],
        );
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("'TOKEN'"));
        assert!(lines[0].contains("__B64__"));
        assert!(lines[0].contains(">> /tmp/out.env"));
        assert!(lines[1].contains("'REGION'"));
    }

    #[test]
    fn test_powershell_capture_line_shape() {
        let lines =
            ShellDialect::Powershell.capture_lines(Path::new("C:\\out.env"), &["K".to_string()]);
        assert!(lines[0].starts_with("Add-Content -Path"));
        assert!(lines[0].contains("$Env:K"));
        assert!(lines[0].contains("K=__B64__"));
    }

    #[test]
    fn test_python_capture_line_shape() {
        let lines = ShellDialect::Python.capture_lines(Path::new("/tmp/out.env"), &["K".to_string()]);
        assert!(lines[0].contains("os.environ.get('K', '')"));
        assert!(lines[0].contains("K=__B64__"));
        assert!(lines[0].contains("open(r'/tmp/out.env', 'a')"));
    }
}
