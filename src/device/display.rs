use tracing::info;

use crate::device::Display;

/// A display that logs each line it is asked to show.
///
/// It also remembers the current text of every line, which is what a
/// character LCD would be showing.
#[derive(Debug, Default)]
pub struct LogDisplay {
    lines: Vec<String>,
}

impl LogDisplay {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl Display for LogDisplay {
    fn show(&mut self, text: &str, line: usize) {
        let idx = line.saturating_sub(1);
        if self.lines.len() <= idx {
            self.lines.resize(idx + 1, String::new());
        }
        self.lines[idx] = text.to_string();
        info!(line, text, "Display");
    }

    fn clear(&mut self) {
        self.lines.clear();
        info!("Display cleared");
    }
}
