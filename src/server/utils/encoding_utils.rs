use std::io::Read;

use flate2::read::{GzDecoder, ZlibDecoder};

/// what we advertise to the portal, everything in here can be undone by `ContentEncoding::decode`
pub const UPSTREAM_ACCEPT_ENCODING: &str = "gzip, deflate, zstd";

/// Content-Encoding of an upstream body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Gzip,
    Deflate,
    Zstd,
    /// anything we can't undo, the body stays as it came
    Unsupported(String),
}

impl ContentEncoding {
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            None => Self::Identity,
            Some(v) => match v.as_str() {
                "" | "identity" => Self::Identity,
                "gzip" | "x-gzip" => Self::Gzip,
                "deflate" => Self::Deflate,
                "zstd" => Self::Zstd,
                _ => Self::Unsupported(v),
            },
        }
    }

    /// plain bytes, or an error if the body doesn't match its header
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        match self {
            Self::Identity => Ok(bytes.to_vec()),
            Self::Gzip => {
                let mut decoder = GzDecoder::new(bytes);
                let mut decomp = Vec::new();
                decoder.read_to_end(&mut decomp)?;
                Ok(decomp)
            }
            Self::Deflate => {
                let mut decoder = ZlibDecoder::new(bytes);
                let mut decomp = Vec::new();
                decoder.read_to_end(&mut decomp)?;
                Ok(decomp)
            }
            Self::Zstd => zstd::decode_all(bytes),
            Self::Unsupported(name) => Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                format!("unsupported content encoding {}", name),
            )),
        }
    }
}
