use std::fmt;

/// Ordered, human-readable log produced by one solver stage.
///
/// Every line is also forwarded to `tracing`, so callers that install a
/// subscriber see the same messages without reading the returned log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    lines: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::info!(target: "montage", "{}", line);
        self.lines.push(line);
    }

    pub fn warn(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::warn!(target: "montage", "{}", line);
        self.lines.push(format!("warning: {line}"));
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.lines.extend(other.lines);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|l| l.contains(needle))
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_are_prefixed_and_ordered() {
        let mut diag = Diagnostics::new();
        diag.info("Before optimization energy is 10");
        diag.warn("large penalty replaced");
        assert_eq!(diag.lines().len(), 2);
        assert_eq!(diag.lines()[1], "warning: large penalty replaced");
        assert!(diag.contains("energy is 10"));
        assert_eq!(diag.to_string().lines().count(), 2);
    }
}
