//! Interactive menu
//!
//! Line-oriented front end over file inspection, the copy comparison and the
//! asynchronous multi-file copy. Input and output are generic so whole
//! sessions can be replayed in tests.

use crate::config::EngineConfig;
use crate::core::{PipelineManager, TransferRequest};
use crate::error::Result;
use crate::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::debug;

/// Menu session over a reader and a writer
pub struct Menu<R, W> {
    input: R,
    output: W,
    config: EngineConfig,
}

impl<R: BufRead, W: Write> Menu<R, W> {
    /// Session using `config` for copies
    pub fn new(input: R, output: W, config: EngineConfig) -> Self {
        Self {
            input,
            output,
            config,
        }
    }

    /// Give back the writer
    pub fn into_output(self) -> W {
        self.output
    }

    /// Loop until `0` or end of input
    pub fn run(&mut self) -> Result<()> {
        writeln!(self.output, "multicopy - file system & async I/O")?;

        loop {
            write!(
                self.output,
                "\nMenu:\n\
                 1 - Show file attributes\n\
                 2 - Compare buffered vs direct copy\n\
                 3 - Asynchronous copy of multiple files\n\
                 0 - Exit\n\
                 Your choice: "
            )?;
            self.output.flush()?;

            let Some(choice) = self.read_line()? else {
                break;
            };
            debug!("menu choice {:?}", choice);
            match choice.as_str() {
                "1" => self.show_info()?,
                "2" => self.compare()?,
                "3" => self.async_copy()?,
                "0" => break,
                _ => writeln!(self.output, "Invalid choice.")?,
            }
        }
        Ok(())
    }

    /// Next trimmed line, `None` at end of input
    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn prompt(&mut self, text: &str) -> io::Result<Option<String>> {
        write!(self.output, "{}\n> ", text)?;
        self.output.flush()?;
        self.read_line()
    }

    fn show_info(&mut self) -> Result<()> {
        let path = match self.prompt("\nEnter file path:")? {
            Some(p) if !p.is_empty() => PathBuf::from(p),
            _ => return Ok(()),
        };
        match fs::inspect(&path) {
            Ok(info) => info.render(&mut self.output)?,
            Err(e) => writeln!(self.output, "Error: {}", e)?,
        }
        Ok(())
    }

    fn compare(&mut self) -> Result<()> {
        let path = match self.prompt("\nEnter path to a large file:")? {
            Some(p) if !p.is_empty() => PathBuf::from(p),
            _ => {
                writeln!(self.output, "No file.")?;
                return Ok(());
            }
        };
        fs::compare_methods(&path, self.config.buffer_size).render(&mut self.output)?;
        Ok(())
    }

    fn async_copy(&mut self) -> Result<()> {
        let max = self.config.max_concurrency;
        let question = format!("\nHow many files to copy asynchronously (1-{})?", max);
        // Larger counts are clamped to the limit.
        let count = match self.prompt(&question)?.map(|s| s.parse::<usize>()) {
            Some(Ok(n)) if n > 0 => n.min(max),
            _ => {
                writeln!(self.output, "Invalid number.")?;
                return Ok(());
            }
        };

        let mut requests = Vec::with_capacity(count);
        for i in 1..=count {
            match self.prompt(&format!("Enter source path for file {}:", i))? {
                Some(p) if !p.is_empty() => requests.push(TransferRequest::with_suffix(
                    p,
                    &self.config.destination_suffix,
                )),
                Some(_) => writeln!(self.output, "Skipped (empty path).")?,
                None => break,
            }
        }

        if requests.is_empty() {
            writeln!(self.output, "No valid files to process.")?;
            return Ok(());
        }

        writeln!(
            self.output,
            "\nStarting asynchronous copy of {} file(s)...",
            requests.len()
        )?;

        let manager = PipelineManager::new(self.config.clone())?;
        let output = &mut self.output;
        let mut write_error = None;
        let report = manager.run_all_with(&requests, |outcome| {
            if let Err(e) = writeln!(output, "{}", outcome.status_line()) {
                write_error.get_or_insert(e);
            }
        });
        if let Some(e) = write_error {
            return Err(e.into());
        }

        report.render_summary(&mut self.output)?;
        writeln!(self.output, "Async copy completed.")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn session(input: &str, config: EngineConfig) -> String {
        let mut menu = Menu::new(Cursor::new(input.to_string()), Vec::new(), config);
        menu.run().unwrap();
        String::from_utf8(menu.into_output()).unwrap()
    }

    fn small_config() -> EngineConfig {
        EngineConfig {
            buffer_size: 4096,
            io_threads: 1,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_exit_and_invalid_choice() {
        let out = session("9\nabc\n0\n", small_config());
        assert_eq!(out.matches("Invalid choice.").count(), 2);
        assert_eq!(out.matches("Your choice: ").count(), 3);
    }

    #[test]
    fn test_end_of_input_exits() {
        let out = session("", small_config());
        assert!(out.contains("Your choice: "));
    }

    #[test]
    fn test_file_info() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"12345").unwrap();

        let out = session(&format!("1\n{}\n0\n", path.display()), small_config());
        assert!(out.contains("=== File info for:"));
        assert!(out.contains("File size: 5 bytes"));

        let out = session(&format!("1\n{}\n0\n", dir.path().join("nope").display()), small_config());
        assert!(out.contains("Error: Path not found"));

        let out = session("1\n\n0\n", small_config());
        assert!(!out.contains("Error:"));
        assert!(!out.contains("=== File info for:"));
        assert_eq!(out.matches("Your choice: ").count(), 2);
    }

    #[test]
    fn test_compare() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.bin");
        std::fs::write(&path, vec![3u8; 20_000]).unwrap();

        let out = session(&format!("2\n{}\n0\n", path.display()), small_config());
        assert!(out.contains("=== RESULT ==="));
        assert!(dir.path().join("big.bin.direct.bin").exists());

        let out = session("2\n\n0\n", small_config());
        assert!(out.contains("No file."));
    }

    #[test]
    fn test_async_copy() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        std::fs::write(&a, vec![1u8; 50_000]).unwrap();
        std::fs::write(&b, vec![2u8; 100]).unwrap();

        let input = format!("3\n3\n{}\n\n{}\n0\n", a.display(), b.display());
        let out = session(&input, small_config());

        assert!(out.contains("Skipped (empty path)."));
        assert!(out.contains("Starting asynchronous copy of 2 file(s)..."));
        assert_eq!(out.matches("Finished async copy for").count(), 2);
        assert!(out.contains("Async copy completed."));
        assert_eq!(
            std::fs::read(&a).unwrap(),
            std::fs::read(dir.path().join("a.bin.async.bin")).unwrap()
        );
    }

    #[test]
    fn test_async_copy_rejects_bad_count() {
        let out = session("3\n0\n3\nx\n3\n-2\n0\n", small_config());
        assert_eq!(out.matches("Invalid number.").count(), 3);

        let out = session("3\n1\n\n0\n", small_config());
        assert!(out.contains("No valid files to process."));
    }

    #[test]
    fn test_async_copy_clamps_large_count() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.bin");
        std::fs::write(&a, vec![5u8; 1000]).unwrap();

        // Four paths are asked for; the remaining lines go back to the menu.
        let input = format!("3\n9\n{}\n\n\n\n0\n", a.display());
        let out = session(&input, small_config());

        assert!(!out.contains("Invalid number."));
        assert!(out.contains("Enter source path for file 4:"));
        assert!(!out.contains("Enter source path for file 5:"));
        assert_eq!(out.matches("Skipped (empty path).").count(), 3);
        assert!(out.contains("Starting asynchronous copy of 1 file(s)..."));
        assert!(dir.path().join("a.bin.async.bin").exists());
    }
}
