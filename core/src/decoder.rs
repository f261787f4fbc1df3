// Decoder seam: QR symbol decoding is provided by a third-party library

/// A symbol found in a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub text: String,
}

impl Symbol {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Opaque QR decoder.
///
/// `pixels` is RGBA, `width * height * 4` bytes. Returns `None` when no symbol
/// is found; that is the normal per-frame outcome, not an error.
#[cfg_attr(test, mockall::automock)]
pub trait Decoder {
    fn decode(&self, pixels: &[u8], width: u32, height: u32) -> Option<Symbol>;
}

/// Text of a successful decode, trimmed. Consumed exactly once by the handoff.
#[derive(Debug, PartialEq, Eq)]
pub struct DecodedPayload(String);

impl DecodedPayload {
    /// Trim the symbol text; whitespace-only symbols are not a match
    pub fn from_symbol(symbol: Symbol) -> Option<Self> {
        let trimmed = symbol.text.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for DecodedPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
