//! Per-case test output

use parking_lot::Mutex;

/// Line buffer a test body writes diagnostic output to. Registered as owned
/// by the `Case` scope, so each case execution gets its own.
#[derive(Debug, Default)]
pub struct TestOutput {
    lines: Mutex<Vec<String>>,
}

impl TestOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_line(&self, line: impl Into<String>) {
        self.lines.lock().push(line.into());
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// All lines joined with newlines.
    pub fn output(&self) -> String {
        self.lines.lock().join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_lines() {
        let output = TestOutput::new();
        assert!(output.is_empty());

        output.write_line("connecting");
        output.write_line(format!("attempt {}", 2));
        assert_eq!(output.lines().len(), 2);
        assert_eq!(output.output(), "connecting\nattempt 2");
    }
}
