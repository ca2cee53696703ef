use colored::*;
use regex::Regex;
use std::sync::OnceLock;

pub struct FeedbackAnalyzer;

fn missing_header_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"(?:fatal error: ([^\s:]+): No such file or directory|Cannot open include file: '([^']+)')",
            )
            .ok()
        })
        .as_ref()
}

impl FeedbackAnalyzer {
    /// Suggests a fix for well-known compiler and linker failures.
    pub fn analyze(output: &str) -> Option<String> {
        // 1. Main function missing (specific linker error)
        if output.contains("undefined reference to `main'")
            || output.contains("entry point must be defined")
        {
            return Some(format!(
                "No {} function was linked.\nMake sure one source file under {} defines it.",
                "main()".bold().yellow(),
                "source_dirs".bold().green()
            ));
        }

        // 2. Unresolved symbols (linker error)
        if output.contains("LNK2019") || output.contains("undefined reference to") {
            return Some(format!(
                "It looks like a {} error.\nA library may be missing from {} or {} in cbuild.toml.",
                "Linker".bold().red(),
                "library_names".bold().yellow(),
                "library_dirs".bold().yellow()
            ));
        }

        // 3. Missing header (compiler error)
        if let Some(caps) = missing_header_pattern().and_then(|re| re.captures(output)) {
            let header = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or("header");
            return Some(format!(
                "{} '{}' was not found.\nCheck {} in cbuild.toml.",
                "Missing Header".bold().red(),
                header,
                "include_dirs".bold().yellow()
            ));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linker_error() {
        let err = "error LNK2019: unresolved external symbol foo";
        let msg = FeedbackAnalyzer::analyze(err).unwrap();
        assert!(msg.contains("error."));
        assert!(msg.contains("cbuild.toml"));
    }

    #[test]
    fn test_include_error_names_header() {
        let err = "src/main.c:1:10: fatal error: foo.h: No such file or directory";
        let msg = FeedbackAnalyzer::analyze(err).unwrap();
        assert!(msg.contains("Missing Header"));
        assert!(msg.contains("'foo.h'"));
    }

    #[test]
    fn test_msvc_include_error() {
        let err = "main.cpp(1): fatal error C1083: Cannot open include file: 'bar.h': No such file or directory";
        let msg = FeedbackAnalyzer::analyze(err).unwrap();
        assert!(msg.contains("'bar.h'"));
    }

    #[test]
    fn test_main_error() {
        let err = "undefined reference to `main'";
        let msg = FeedbackAnalyzer::analyze(err).unwrap();
        assert!(msg.contains("main()"));
    }

    #[test]
    fn test_unknown_output() {
        assert!(FeedbackAnalyzer::analyze("warning: unused variable 'x'").is_none());
    }
}
