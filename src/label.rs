//! Application label extraction from JVM command lines.
//!
//! Each configured marker such as `-Dapp.name` matches `-Dapp.name=value`
//! with the value optionally wrapped in single or double quotes. Markers are
//! tried in configured order and the first match wins.

use regex::Regex;
use tracing::debug;

/// Compiled, ordered set of label markers.
#[derive(Debug, Clone)]
pub struct LabelResolver {
    patterns: Vec<Regex>,
}

impl LabelResolver {
    /// Compiles one pattern per marker.
    pub fn new<S: AsRef<str>>(markers: &[S]) -> Result<Self, regex::Error> {
        let patterns = markers
            .iter()
            .map(|marker| {
                Regex::new(&format!(
                    r#"{}=["']?([^"'\s]+)"#,
                    regex::escape(marker.as_ref())
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Resolves the label for `pid`, falling back to `pid-<pid>` when the
    /// command line is unavailable or carries none of the markers.
    pub fn resolve(&self, pid: u32, cmdline: Option<&str>) -> String {
        let Some(args) = cmdline else {
            debug!("No command line for pid {}, using fallback label", pid);
            return fallback_label(pid);
        };

        self.patterns
            .iter()
            .find_map(|pattern| pattern.captures(args))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| fallback_label(pid))
    }
}

/// Label used when no marker matches.
pub fn fallback_label(pid: u32) -> String {
    format!("pid-{pid}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> LabelResolver {
        LabelResolver::new(&["-Dapp.name", "-Dapp", "-Dspring.application.name"]).unwrap()
    }

    #[test]
    fn test_unquoted_value() {
        let label = resolver().resolve(7, Some("java -Xmx1g -Dapp.name=orders -jar app.jar"));
        assert_eq!(label, "orders");
    }

    #[test]
    fn test_quoted_values() {
        let r = resolver();
        assert_eq!(r.resolve(7, Some(r#"java "-Dapp.name="billing" -jar"#)), "billing");
        assert_eq!(r.resolve(7, Some("java -Dapp.name='search' -jar")), "search");
    }

    #[test]
    fn test_marker_order_wins_over_position() {
        let cmd = "java -Dspring.application.name=gateway -Dapp.name=edge -jar x.jar";
        assert_eq!(resolver().resolve(7, Some(cmd)), "edge");
    }

    #[test]
    fn test_later_marker_used_when_earlier_absent() {
        let cmd = "java -Dspring.application.name=gateway -jar x.jar";
        assert_eq!(resolver().resolve(7, Some(cmd)), "gateway");
    }

    #[test]
    fn test_marker_is_matched_literally() {
        // The dot in "-Dapp.name" must not match arbitrary characters.
        let cmd = "java -DappXname=wrong -jar x.jar";
        assert_eq!(resolver().resolve(42, Some(cmd)), "pid-42");
    }

    #[test]
    fn test_fallback_without_cmdline() {
        assert_eq!(resolver().resolve(1234, None), "pid-1234");
    }

    #[test]
    fn test_empty_marker_list_always_falls_back() {
        let r = LabelResolver::new::<&str>(&[]).unwrap();
        assert_eq!(r.resolve(5, Some("java -Dapp.name=x")), "pid-5");
    }
}
