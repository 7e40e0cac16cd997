//! Pre-compressed sprite variants
//!
//! Every sprite is published three times: as-is, gzip and brotli. Both
//! encoders run at their highest quality; sprites are small and written once.

use std::fmt::{self, Display, Formatter};
use std::io::Write;

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use iconforge_core::Bundle;
use serde::{Deserialize, Serialize};

const BROTLI_BUFFER: usize = 4096;
const BROTLI_QUALITY: u32 = 11;
const BROTLI_LG_WINDOW: u32 = 22;

/// Content encoding of a published object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Identity,
    Gzip,
    Brotli,
}

impl Encoding {
    /// Every variant published per sprite
    pub const ALL: [Encoding; 3] = [Encoding::Identity, Encoding::Gzip, Encoding::Brotli];

    /// Object key suffix
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Identity => "",
            Self::Gzip => ".gz",
            Self::Brotli => ".br",
        }
    }

    /// `Content-Encoding` header value
    #[must_use]
    pub const fn header(self) -> Option<&'static str> {
        match self {
            Self::Identity => None,
            Self::Gzip => Some("gzip"),
            Self::Brotli => Some("br"),
        }
    }

    /// Object key of this variant of `file_name`
    #[must_use]
    pub fn key_for(self, file_name: &str) -> String {
        format!("{file_name}{}", self.suffix())
    }

    /// Encode `data`
    ///
    /// # Errors
    /// Propagates encoder I/O errors (in-memory, so effectively never)
    pub fn encode(self, data: &[u8]) -> std::io::Result<Bytes> {
        match self {
            Self::Identity => Ok(Bytes::copy_from_slice(data)),
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
                encoder.write_all(data)?;
                encoder.finish().map(Bytes::from)
            }
            Self::Brotli => {
                let mut encoder = brotli::CompressorWriter::new(
                    Vec::new(),
                    BROTLI_BUFFER,
                    BROTLI_QUALITY,
                    BROTLI_LG_WINDOW,
                );
                encoder.write_all(data)?;
                encoder.flush()?;
                Ok(Bytes::from(encoder.into_inner()))
            }
        }
    }
}

impl Display for Encoding {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Identity => "identity",
            Self::Gzip => "gzip",
            Self::Brotli => "br",
        })
    }
}

/// One encoded object ready for upload
#[derive(Debug, Clone)]
pub struct Variant {
    pub key: String,
    pub encoding: Encoding,
    pub body: Bytes,
}

/// All variants of a sprite, original first
///
/// # Errors
/// Propagates encoder I/O errors
pub fn variants(bundle: &Bundle) -> std::io::Result<Vec<Variant>> {
    Encoding::ALL
        .into_iter()
        .map(|encoding| {
            let body = match encoding {
                Encoding::Identity => bundle.content().clone(),
                other => other.encode(bundle.content())?,
            };
            Ok(Variant {
                key: encoding.key_for(bundle.file_name()),
                encoding,
                body,
            })
        })
        .collect()
}
