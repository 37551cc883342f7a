//! ANSI/VT100 escape stripping.
//!
//! Applied to the bytes an operation returns, never to the live read buffer:
//! a chunk boundary can split an escape sequence, and the parser state here
//! is per call.

use vte::{Parser, Perform};

/// Collects printable output and the control bytes that shape text layout.
struct Collector {
    out: Vec<u8>,
}

impl Perform for Collector {
    fn print(&mut self, c: char) {
        let mut buf = [0u8; 4];
        self.out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' | b'\r' | b'\t' | 0x08 => self.out.push(byte),
            _ => {}
        }
    }
}

/// Strip escape sequences from `data`, keeping text and line structure.
pub fn strip_ansi(data: &[u8]) -> Vec<u8> {
    if !data.contains(&0x1b) {
        return data.to_vec();
    }
    let mut parser = Parser::new();
    let mut collector = Collector {
        out: Vec::with_capacity(data.len()),
    };
    parser.advance(&mut collector, data);
    collector.out
}
