//! Supported character encodings and their byte-order marks.
//!
//! | Encoding     | BOM            |
//! |--------------|----------------|
//! | `UTF-8`      | `EF BB BF`     |
//! | `UTF-16BE`   | `FE FF`        |
//! | `UTF-16LE`   | `FF FE`        |
//! | `UTF-16`     | none (BE)      |
//! | `UTF-32BE`   | `00 00 FE FF`  |
//! | `UTF-32LE`   | `FF FE 00 00`  |
//! | `ISO-8859-1` | none           |
//! | `US-ASCII`   | none           |

use std::fmt;
use std::io;
use std::str::FromStr;

use crate::error::ConfigError;

/// A character encoding that rendered text can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    Utf8,
    Utf16Be,
    Utf16Le,
    /// Unmarked UTF-16; written big-endian.
    Utf16,
    Utf32Be,
    Utf32Le,
    Latin1,
    Ascii,
}

impl Encoding {
    /// Canonical upper-case name.
    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "UTF-8",
            Encoding::Utf16Be => "UTF-16BE",
            Encoding::Utf16Le => "UTF-16LE",
            Encoding::Utf16 => "UTF-16",
            Encoding::Utf32Be => "UTF-32BE",
            Encoding::Utf32Le => "UTF-32LE",
            Encoding::Latin1 => "ISO-8859-1",
            Encoding::Ascii => "US-ASCII",
        }
    }

    /// Look up an encoding by name or common alias, case-insensitively.
    pub fn for_name(name: &str) -> Result<Self, ConfigError> {
        let upper = name.trim().to_ascii_uppercase();
        let e = match upper.as_str() {
            "UTF-8" | "UTF8" => Encoding::Utf8,
            "UTF-16BE" | "UTF16BE" | "UTF_16BE" => Encoding::Utf16Be,
            "UTF-16LE" | "UTF16LE" | "UTF_16LE" => Encoding::Utf16Le,
            "UTF-16" | "UTF16" => Encoding::Utf16,
            "UTF-32BE" | "UTF32BE" | "UTF_32BE" => Encoding::Utf32Be,
            "UTF-32LE" | "UTF32LE" | "UTF_32LE" => Encoding::Utf32Le,
            "ISO-8859-1" | "ISO8859-1" | "ISO_8859_1" | "LATIN1" | "LATIN-1" => Encoding::Latin1,
            "US-ASCII" | "ASCII" => Encoding::Ascii,
            _ => return Err(ConfigError::UnknownEncoding(name.to_string())),
        };
        Ok(e)
    }

    /// The byte-order mark for this encoding, if one is defined.
    pub fn bom(&self) -> Option<&'static [u8]> {
        match self {
            Encoding::Utf8 => Some(&[0xEF, 0xBB, 0xBF]),
            Encoding::Utf16Be => Some(&[0xFE, 0xFF]),
            Encoding::Utf16Le => Some(&[0xFF, 0xFE]),
            Encoding::Utf32Be => Some(&[0x00, 0x00, 0xFE, 0xFF]),
            Encoding::Utf32Le => Some(&[0xFF, 0xFE, 0x00, 0x00]),
            Encoding::Utf16 | Encoding::Latin1 | Encoding::Ascii => None,
        }
    }

    /// The byte-order mark, or `ConfigError::NoByteOrderMark`.
    pub fn require_bom(&self) -> Result<&'static [u8], ConfigError> {
        self.bom()
            .ok_or_else(|| ConfigError::NoByteOrderMark(self.name().to_string()))
    }

    /// Append the encoded form of `text` to `out`.
    ///
    /// Characters a single-byte encoding cannot represent become `?`.
    pub fn encode_into(&self, text: &str, out: &mut Vec<u8>) {
        match self {
            Encoding::Utf8 => out.extend_from_slice(text.as_bytes()),
            Encoding::Utf16Be | Encoding::Utf16 => {
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_be_bytes());
                }
            }
            Encoding::Utf16Le => {
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_le_bytes());
                }
            }
            Encoding::Utf32Be => {
                for c in text.chars() {
                    out.extend_from_slice(&(c as u32).to_be_bytes());
                }
            }
            Encoding::Utf32Le => {
                for c in text.chars() {
                    out.extend_from_slice(&(c as u32).to_le_bytes());
                }
            }
            Encoding::Latin1 => out.extend(text.chars().map(|c| single_byte(c, 0xFF))),
            Encoding::Ascii => out.extend(text.chars().map(|c| single_byte(c, 0x7F))),
        }
    }

    /// Encode `text` to a fresh buffer.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(text.len());
        self.encode_into(text, &mut out);
        out
    }

    /// Decode `bytes`, skipping a leading BOM that matches this encoding.
    ///
    /// Malformed input is an `InvalidData` I/O error.
    pub fn decode(&self, bytes: &[u8]) -> io::Result<String> {
        let bytes = match self.bom() {
            Some(bom) if bytes.starts_with(bom) => &bytes[bom.len()..],
            _ => bytes,
        };
        match self {
            Encoding::Utf8 => String::from_utf8(bytes.to_vec()).map_err(invalid_data),
            Encoding::Utf16Be | Encoding::Utf16 => decode_utf16(bytes, u16::from_be_bytes),
            Encoding::Utf16Le => decode_utf16(bytes, u16::from_le_bytes),
            Encoding::Utf32Be => decode_utf32(bytes, u32::from_be_bytes),
            Encoding::Utf32Le => decode_utf32(bytes, u32::from_le_bytes),
            Encoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
            Encoding::Ascii => bytes
                .iter()
                .map(|&b| {
                    if b.is_ascii() {
                        Ok(b as char)
                    } else {
                        Err(invalid_data(format!("non-ASCII byte 0x{b:02X}")))
                    }
                })
                .collect(),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoding {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Encoding::for_name(s)
    }
}

fn single_byte(c: char, max: u32) -> u8 {
    let v = c as u32;
    if v <= max {
        v as u8
    } else {
        b'?'
    }
}

fn invalid_data(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

fn decode_utf16(bytes: &[u8], read: fn([u8; 2]) -> u16) -> io::Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(invalid_data("truncated UTF-16 input"));
    }
    let units = bytes.chunks_exact(2).map(|c| read([c[0], c[1]]));
    char::decode_utf16(units)
        .collect::<Result<String, _>>()
        .map_err(invalid_data)
}

fn decode_utf32(bytes: &[u8], read: fn([u8; 4]) -> u32) -> io::Result<String> {
    if bytes.len() % 4 != 0 {
        return Err(invalid_data("truncated UTF-32 input"));
    }
    bytes
        .chunks_exact(4)
        .map(|c| {
            let v = read([c[0], c[1], c[2], c[3]]);
            char::from_u32(v).ok_or_else(|| invalid_data(format!("invalid code point 0x{v:X}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("utf-8", Encoding::Utf8)]
    #[case("UTF8", Encoding::Utf8)]
    #[case("utf-16le", Encoding::Utf16Le)]
    #[case("latin1", Encoding::Latin1)]
    #[case("US-ASCII", Encoding::Ascii)]
    fn names_resolve_case_insensitively(#[case] name: &str, #[case] expected: Encoding) {
        assert_eq!(Encoding::for_name(name).expect("known"), expected);
    }

    #[test]
    fn unknown_encoding_is_a_config_error() {
        let err = Encoding::for_name("EBCDIC-FR").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownEncoding(_)));
    }

    #[rstest]
    #[case(Encoding::Utf8, true)]
    #[case(Encoding::Utf16Be, true)]
    #[case(Encoding::Utf32Le, true)]
    #[case(Encoding::Utf16, false)]
    #[case(Encoding::Latin1, false)]
    #[case(Encoding::Ascii, false)]
    fn bom_table(#[case] encoding: Encoding, #[case] has_bom: bool) {
        assert_eq!(encoding.require_bom().is_ok(), has_bom);
    }

    #[test]
    fn utf16le_encoding() {
        assert_eq!(Encoding::Utf16Le.encode("hé"), vec![0x68, 0x00, 0xE9, 0x00]);
    }

    #[test]
    fn utf32be_encoding() {
        assert_eq!(Encoding::Utf32Be.encode("A"), vec![0, 0, 0, 0x41]);
    }

    #[test]
    fn ascii_replaces_unmappable() {
        assert_eq!(Encoding::Ascii.encode("né"), b"n?".to_vec());
        assert_eq!(Encoding::Latin1.encode("né€"), vec![b'n', 0xE9, b'?']);
    }

    #[test]
    fn decode_skips_matching_bom() {
        let mut bytes = Encoding::Utf16Be.bom().expect("bom").to_vec();
        bytes.extend(Encoding::Utf16Be.encode("x ::= \"y\""));
        assert_eq!(Encoding::Utf16Be.decode(&bytes).expect("decode"), "x ::= \"y\"");
    }

    #[test]
    fn decode_rejects_malformed_utf8() {
        let err = Encoding::Utf8.decode(&[0xC3]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
