// Page Record & Codec
//
// A page is one fixed-capacity chunk of a log. Its storage form is
//
//     prev,next,size|record_0,record_1,...,record_{n-1}
//
// Only the first pipe is significant. Records are never escaped, so a record
// must not contain a delimiter byte; see `validate_record`.

use crate::address::{AddressError, PageAddress};

/// Separates fields of the metadata section and records of the data section.
pub const FIELD_DELIMITER: u8 = b',';

/// Separates the metadata section from the data section.
pub const SECTION_DELIMITER: u8 = b'|';

/// A single page of a log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// On the head page: address of the current tail. Otherwise: the page
    /// before this one.
    pub prev_address: PageAddress,

    /// Address of the page appended after this one, or the head address if
    /// this page has no successor. The head page points at itself.
    pub next_address: PageAddress,

    /// Number of records in `data`.
    pub size: usize,

    pub data: Vec<Vec<u8>>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("missing section delimiter '|'")]
    MissingSection,

    #[error("expected 3 metadata fields, found {0}")]
    FieldCount(usize),

    #[error("metadata is not valid UTF-8")]
    InvalidUtf8,

    #[error("invalid page address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("invalid size field: {0:?}")]
    InvalidSize(String),

    #[error("size field says {declared} records, data holds {actual}")]
    SizeMismatch { declared: usize, actual: usize },
}

/// Why a record cannot be stored in a page.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record is empty")]
    Empty,

    #[error("record contains delimiter byte {0:?} at offset {1}")]
    Delimiter(char, usize),
}

impl Page {
    /// A fresh page with no records.
    pub fn empty(prev_address: PageAddress, next_address: PageAddress) -> Self {
        Self {
            prev_address,
            next_address,
            size: 0,
            data: Vec::new(),
        }
    }

    pub fn push(&mut self, record: &[u8]) {
        self.data.push(record.to_vec());
        self.size += 1;
    }

    pub fn is_full(&self, capacity: usize) -> bool {
        self.size >= capacity
    }

    pub fn encode(&self) -> Vec<u8> {
        encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        decode(bytes)
    }
}

/// Check that `record` round-trips through the page encoding.
///
/// Empty records are refused because an empty data section decodes to zero
/// records.
pub fn validate_record(record: &[u8]) -> Result<(), RecordError> {
    if record.is_empty() {
        return Err(RecordError::Empty);
    }
    match record
        .iter()
        .position(|&b| b == FIELD_DELIMITER || b == SECTION_DELIMITER)
    {
        Some(offset) => Err(RecordError::Delimiter(record[offset] as char, offset)),
        None => Ok(()),
    }
}

pub fn encode(page: &Page) -> Vec<u8> {
    let mut out = format!(
        "{},{},{}",
        page.prev_address, page.next_address, page.size
    )
    .into_bytes();
    out.push(SECTION_DELIMITER);

    for (i, record) in page.data.iter().enumerate() {
        if i > 0 {
            out.push(FIELD_DELIMITER);
        }
        out.extend_from_slice(record);
    }
    out
}

pub fn decode(bytes: &[u8]) -> Result<Page, CodecError> {
    let split = bytes
        .iter()
        .position(|&b| b == SECTION_DELIMITER)
        .ok_or(CodecError::MissingSection)?;
    let (meta, data) = (&bytes[..split], &bytes[split + 1..]);

    let meta = std::str::from_utf8(meta).map_err(|_| CodecError::InvalidUtf8)?;
    let fields: Vec<&str> = meta.split(FIELD_DELIMITER as char).collect();
    let [prev, next, size] = fields[..] else {
        return Err(CodecError::FieldCount(fields.len()));
    };

    let prev_address = PageAddress::parse(prev)?;
    let next_address = PageAddress::parse(next)?;
    // `usize::from_str` also takes a leading '+'; the encoder never writes one.
    if size.is_empty() || !size.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CodecError::InvalidSize(size.to_string()));
    }
    let size: usize = size
        .parse()
        .map_err(|_| CodecError::InvalidSize(size.to_string()))?;

    let data: Vec<Vec<u8>> = if data.is_empty() {
        Vec::new()
    } else {
        data.split(|&b| b == FIELD_DELIMITER)
            .map(<[u8]>::to_vec)
            .collect()
    };

    if data.len() != size {
        return Err(CodecError::SizeMismatch {
            declared: size,
            actual: data.len(),
        });
    }

    Ok(Page {
        prev_address,
        next_address,
        size,
        data,
    })
}
