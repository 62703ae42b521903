use std::fmt;
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use chardetng::EncodingDetector;
use encoding_rs::{
    Decoder, DecoderResult, Encoder, EncoderResult, Encoding, UTF_8, UTF_16BE, UTF_16LE,
};
use log::{debug, error};

const CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingSource {
    Bom,
    Detector,
    AssumedUtf8,
    Fallback,
}

impl fmt::Display for EncodingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EncodingSource::Bom => "bom",
            EncodingSource::Detector => "detector",
            EncodingSource::AssumedUtf8 => "assumed-utf8",
            EncodingSource::Fallback => "fallback",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EncodingDecision {
    pub encoding: &'static Encoding,
    pub source: EncodingSource,
}

impl EncodingDecision {
    fn fallback() -> Self {
        Self {
            encoding: UTF_8,
            source: EncodingSource::Fallback,
        }
    }

    pub fn label(&self) -> &'static str {
        self.encoding.name()
    }

    fn bom(&self) -> Option<&'static [u8]> {
        if self.source != EncodingSource::Bom {
            return None;
        }
        bom_bytes(self.encoding)
    }
}

/// Reads the whole file and guesses its encoding. Never fails: an unreadable
/// file is reported and treated as UTF-8.
pub fn detect_encoding(path: &Path) -> EncodingDecision {
    match fs::read(path) {
        Ok(bytes) => {
            let decision = detect_auto(&bytes);
            debug!(
                "detected encoding {} ({}) for {}",
                decision.label(),
                decision.source,
                path.display()
            );
            decision
        }
        Err(err) => {
            error!("Error detecting encoding: {err}");
            EncodingDecision::fallback()
        }
    }
}

fn detect_auto(bytes: &[u8]) -> EncodingDecision {
    if let Some(encoding) = detect_bom(bytes) {
        return EncodingDecision {
            encoding,
            source: EncodingSource::Bom,
        };
    }

    if std::str::from_utf8(bytes).is_ok() {
        return EncodingDecision {
            encoding: UTF_8,
            source: EncodingSource::AssumedUtf8,
        };
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);

    EncodingDecision {
        encoding,
        source: EncodingSource::Detector,
    }
}

fn detect_bom(bytes: &[u8]) -> Option<&'static Encoding> {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return Some(UTF_8);
    }
    if bytes.starts_with(&[0xFF, 0xFE]) {
        return Some(UTF_16LE);
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        return Some(UTF_16BE);
    }

    None
}

fn bom_bytes(encoding: &'static Encoding) -> Option<&'static [u8]> {
    if encoding == UTF_8 {
        Some(&[0xEF, 0xBB, 0xBF])
    } else if encoding == UTF_16LE {
        Some(&[0xFF, 0xFE])
    } else if encoding == UTF_16BE {
        Some(&[0xFE, 0xFF])
    } else {
        None
    }
}

/// Lazily decodes a byte stream into lines. Each yielded line keeps its `\n`
/// terminator; the last line may lack one. Malformed input ends the iteration
/// with an error.
pub struct LineReader<R> {
    reader: R,
    decoder: Decoder,
    encoding: &'static Encoding,
    pending: String,
    scanned: usize,
    consumed: u64,
    eof: bool,
}

impl<R: Read> LineReader<R> {
    pub fn new(reader: R, decision: &EncodingDecision) -> Self {
        let decoder = if decision.source == EncodingSource::Bom {
            decision.encoding.new_decoder_with_bom_removal()
        } else {
            decision.encoding.new_decoder_without_bom_handling()
        };
        Self {
            reader,
            decoder,
            encoding: decision.encoding,
            pending: String::new(),
            scanned: 0,
            consumed: 0,
            eof: false,
        }
    }

    fn fill(&mut self) -> Result<()> {
        let mut chunk = [0u8; CHUNK_SIZE];
        let read = loop {
            match self.reader.read(&mut chunk) {
                Ok(read) => break read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err).context("reading input"),
            }
        };
        let last = read == 0;
        self.decode(&chunk[..read], last)?;
        self.eof = last;
        Ok(())
    }

    fn decode(&mut self, mut src: &[u8], last: bool) -> Result<()> {
        loop {
            let needed = self
                .decoder
                .max_utf8_buffer_length_without_replacement(src.len())
                .unwrap_or_else(|| src.len().saturating_mul(3));
            self.pending.reserve(needed.max(4));
            let (result, read) =
                self.decoder
                    .decode_to_string_without_replacement(src, &mut self.pending, last);
            self.consumed += read as u64;
            src = &src[read..];
            match result {
                DecoderResult::InputEmpty => return Ok(()),
                DecoderResult::OutputFull => continue,
                DecoderResult::Malformed(_, _) => bail!(
                    "input is not valid {} (malformed sequence before byte {})",
                    self.encoding.name(),
                    self.consumed
                ),
            }
        }
    }
}

impl<R: Read> Iterator for LineReader<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            // Bytes before `scanned` are known to hold no newline.
            if let Some(pos) = self.pending[self.scanned..].find('\n') {
                let rest = self.pending.split_off(self.scanned + pos + 1);
                self.scanned = 0;
                return Some(Ok(std::mem::replace(&mut self.pending, rest)));
            }
            self.scanned = self.pending.len();
            if self.eof {
                if self.pending.is_empty() {
                    return None;
                }
                self.scanned = 0;
                return Some(Ok(std::mem::take(&mut self.pending)));
            }
            if let Err(err) = self.fill() {
                self.eof = true;
                self.pending.clear();
                self.scanned = 0;
                return Some(Err(err));
            }
        }
    }
}

enum Sink {
    Utf16 { big_endian: bool },
    Encoder(Encoder),
}

/// Encodes text into the detected encoding as it is written. Characters the
/// target encoding cannot represent are an error rather than being replaced.
pub struct LineWriter<W: Write> {
    writer: W,
    sink: Sink,
    encoding: &'static Encoding,
    scratch: Vec<u8>,
}

impl<W: Write> LineWriter<W> {
    pub fn new(mut writer: W, decision: &EncodingDecision) -> Result<Self> {
        if let Some(bom) = decision.bom() {
            writer.write_all(bom).context("writing byte order mark")?;
        }
        // encoding_rs only encodes UTF-16 labels as UTF-8, so those are handled here.
        let sink = if decision.encoding == UTF_16LE {
            Sink::Utf16 { big_endian: false }
        } else if decision.encoding == UTF_16BE {
            Sink::Utf16 { big_endian: true }
        } else {
            Sink::Encoder(decision.encoding.new_encoder())
        };
        Ok(Self {
            writer,
            sink,
            encoding: decision.encoding,
            scratch: Vec::new(),
        })
    }

    pub fn write_text(&mut self, text: &str) -> Result<()> {
        self.encode(text, false)?;
        self.writer
            .write_all(&self.scratch)
            .context("writing output")?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        self.encode("", true)?;
        self.writer
            .write_all(&self.scratch)
            .context("writing output")?;
        self.writer.flush().context("flushing output")?;
        Ok(self.writer)
    }

    fn encode(&mut self, mut src: &str, last: bool) -> Result<()> {
        self.scratch.clear();
        let encoder = match &mut self.sink {
            Sink::Utf16 { big_endian } => {
                for unit in src.encode_utf16() {
                    let bytes = if *big_endian {
                        unit.to_be_bytes()
                    } else {
                        unit.to_le_bytes()
                    };
                    self.scratch.extend_from_slice(&bytes);
                }
                return Ok(());
            }
            Sink::Encoder(encoder) => encoder,
        };

        loop {
            let needed = encoder
                .max_buffer_length_from_utf8_without_replacement(src.len())
                .unwrap_or_else(|| src.len().saturating_mul(4));
            self.scratch.reserve(needed.max(16));
            let (result, read) =
                encoder.encode_from_utf8_to_vec_without_replacement(src, &mut self.scratch, last);
            src = &src[read..];
            match result {
                EncoderResult::InputEmpty => return Ok(()),
                EncoderResult::OutputFull => continue,
                EncoderResult::Unmappable(ch) => bail!(
                    "character {ch:?} cannot be encoded as {}",
                    self.encoding.name()
                ),
            }
        }
    }
}
