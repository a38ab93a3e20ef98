use std::io::Write;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Clone, Copy)]
pub(crate) struct ConsoleMakeWriter {
    /// Keeps stdout free for command output (`ask`, `schema`).
    pub to_stderr: bool,
}

impl<'a> MakeWriter<'a> for ConsoleMakeWriter {
    type Writer = ConsoleWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleWriter {
            to_stderr: self.to_stderr,
        }
    }
}

pub(crate) struct ConsoleWriter {
    to_stderr: bool,
}

impl Write for ConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.to_stderr {
            std::io::stderr().write(buf)
        } else {
            std::io::stdout().write(buf)
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if self.to_stderr {
            std::io::stderr().flush()
        } else {
            std::io::stdout().flush()
        }
    }
}

/// Unknown level strings fall back to INFO.
pub(crate) fn parse_level(level: &str) -> Level {
    level.trim().parse().unwrap_or(Level::INFO)
}

pub(crate) fn init_logging(level: &str, to_stderr: bool) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(level))
        .with_writer(ConsoleMakeWriter { to_stderr })
        .with_ansi(!to_stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok(); // Already set in tests
}
