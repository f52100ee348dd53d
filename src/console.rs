use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

/// Character I/O capability injected into the machine. The trap services
/// and the keyboard status register are written against this seam, so a
/// host can hand the machine a real terminal, a pipe, or a test script.
pub trait Console {
    /// Blocks until a byte is available. `None` means the input stream
    /// is exhausted and no further byte will ever arrive.
    fn read_byte(&mut self) -> io::Result<Option<u8>>;

    /// Returns a pending byte without blocking, if there is one.
    fn poll_byte(&mut self) -> io::Result<Option<u8>>;

    fn write_byte(&mut self, byte: u8) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;
}

/// Console over the process's stdin/stdout. A reader thread pumps stdin
/// into a channel so the keyboard status register can be polled without
/// blocking; the thread exits on EOF, which disconnects the channel.
pub struct StdConsole {
    keys: Receiver<u8>,
    out: io::Stdout,
}

impl StdConsole {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for byte in io::stdin().bytes() {
                let Ok(byte) = byte else { break };
                if tx.send(byte).is_err() {
                    break;
                }
            }
        });
        Self {
            keys: rx,
            out: io::stdout(),
        }
    }
}

impl Default for StdConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for StdConsole {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.keys.recv().ok())
    }

    fn poll_byte(&mut self) -> io::Result<Option<u8>> {
        match self.keys.try_recv() {
            Ok(byte) => Ok(Some(byte)),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Ok(None),
        }
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.out.write_all(&[byte])
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// In-memory console with scripted input and captured output, for tests
/// and for embedding the machine without a terminal.
#[derive(Debug, Default)]
pub struct BufferConsole {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(input: impl Into<Vec<u8>>) -> Self {
        Self {
            input: VecDeque::from(input.into()),
            output: Vec::new(),
        }
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }
}

impl Console for BufferConsole {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.input.pop_front())
    }

    fn poll_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.input.pop_front())
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.output.push(byte);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
