use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    sync::Arc,
};

use parking_lot::Mutex;

/// Removes ANSI escape sequences so the log file stays plain text.
pub fn strip_ansi_escapes(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' {
            in_escape = true;
        } else if in_escape {
            if c.is_ascii_alphabetic() {
                in_escape = false;
            }
        } else {
            result.push(c);
        }
    }
    result
}

/// Appends to a log file and trims it back to the newest `max_lines` lines
/// every time roughly a tenth of that budget has been written.
#[derive(Clone)]
pub(crate) struct CircularFileWriter {
    path: String,
    max_lines: u32,
    state: Arc<Mutex<WriterState>>,
}

struct WriterState {
    file: Option<File>,
    lines_since_prune: u32,
}

impl CircularFileWriter {
    pub fn new(path: String, max_lines: u32) -> Self {
        Self {
            path,
            max_lines: max_lines.max(1),
            state: Arc::new(Mutex::new(WriterState {
                file: None,
                lines_since_prune: 0,
            })),
        }
    }

    fn prune_threshold(&self) -> u32 {
        (self.max_lines / 10).max(50)
    }

    fn prune(&self, state: &mut WriterState) -> io::Result<()> {
        // Drop the append handle before rewriting the file.
        state.file = None;

        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        let lines: Vec<&str> = contents.lines().collect();
        if lines.len() > self.max_lines as usize {
            let start = lines.len() - self.max_lines as usize;
            let mut file = File::create(&self.path)?;
            for line in &lines[start..] {
                writeln!(file, "{}", line)?;
            }
        }
        Ok(())
    }
}

impl io::Write for CircularFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();

        if state.file.is_none() {
            state.file = Some(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)?,
            );
        }
        if let Some(file) = state.file.as_mut() {
            file.write_all(buf)?;
        }

        state.lines_since_prune += buf.iter().filter(|&&b| b == b'\n').count() as u32;
        if state.lines_since_prune >= self.prune_threshold() {
            if let Err(e) = self.prune(&mut state) {
                eprintln!("Failed to prune log file: {}", e);
            }
            state.lines_since_prune = 0;
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.state.lock().file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CircularFileWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_color_codes() {
        assert_eq!(
            strip_ansi_escapes("\x1b[32mINFO \x1b[0mready"),
            "INFO ready"
        );
    }

    #[test]
    fn keeps_only_newest_lines() {
        let path = std::env::temp_dir().join(format!("airwave-writer-{}.log", std::process::id()));
        let _ = fs::remove_file(&path);
        let path_str = path.to_string_lossy().into_owned();

        let mut writer = CircularFileWriter::new(path_str.clone(), 60);
        for i in 0..120 {
            writer.write_all(format!("line {i}\n").as_bytes()).unwrap();
        }
        writer.flush().unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert!(lines.len() <= 60 + 50, "got {} lines", lines.len());
        assert_eq!(lines.last(), Some(&"line 119"));
        assert!(!lines.contains(&"line 0"));

        let _ = fs::remove_file(&path);
    }
}
