//! Splitting payloads and byte sources into bounded chunks.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::TransferError;

/// A non-empty, bounded slice of a file's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    offset: u64,
    data: Vec<u8>,
}

impl Chunk {
    /// Creates a chunk starting at `offset`. Empty data is rejected.
    pub fn new(offset: u64, data: Vec<u8>) -> Result<Self, TransferError> {
        if data.is_empty() {
            return Err(TransferError::EmptyChunk);
        }
        Ok(Self { offset, data })
    }

    /// Byte offset of the first byte within the file.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Splits `payload` into chunks of at most `max_chunk_size` bytes.
///
/// The last chunk may be shorter. An empty payload yields no chunks.
pub fn split(payload: &[u8], max_chunk_size: usize) -> Result<Vec<Chunk>, TransferError> {
    if max_chunk_size == 0 {
        return Err(TransferError::InvalidChunkSize);
    }
    let mut offset = 0u64;
    let chunks = payload
        .chunks(max_chunk_size)
        .map(|piece| {
            let chunk = Chunk {
                offset,
                data: piece.to_vec(),
            };
            offset += piece.len() as u64;
            chunk
        })
        .collect();
    Ok(chunks)
}

/// Concatenates chunks in order.
pub fn reassemble<'a>(chunks: impl IntoIterator<Item = &'a Chunk>) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in chunks {
        out.extend_from_slice(&chunk.data);
    }
    out
}

/// Pulls up to `max_chunk_size` bytes from `source`.
///
/// Keeps reading until the chunk is full or the source is exhausted, so
/// chunk boundaries only depend on the chunk size. Returns `None` once the
/// source yields zero bytes; a zero-length read is never returned as data.
pub async fn read_next<R>(
    source: &mut R,
    max_chunk_size: usize,
    offset: u64,
) -> Result<Option<Chunk>, TransferError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    if max_chunk_size == 0 {
        return Err(TransferError::InvalidChunkSize);
    }

    let mut buf = vec![0u8; max_chunk_size];
    let mut filled = 0;
    while filled < max_chunk_size {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    if filled == 0 {
        return Ok(None);
    }
    buf.truncate(filled);
    Ok(Some(Chunk { offset, data: buf }))
}

/// Reads a byte source in fixed-size chunks, tracking the offset.
pub struct ChunkReader<R> {
    source: R,
    chunk_size: usize,
    offset: u64,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    pub fn new(source: R, chunk_size: usize) -> Result<Self, TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::InvalidChunkSize);
        }
        Ok(Self {
            source,
            chunk_size,
            offset: 0,
        })
    }

    /// Reads the next chunk. Returns `None` at end of input.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        let chunk = read_next(&mut self.source, self.chunk_size, self.offset).await?;
        if let Some(c) = &chunk {
            self.offset += c.len() as u64;
        }
        Ok(chunk)
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}
