//! Growable vertex accumulator backed by pooled chunks

use crate::pool::{CHUNK_VERTICES, Chunk, ChunkPool};
use crate::{BYTES_PER_COLOR, Color, SHORTS_PER_VERTEX};

/// A packed line vertex: x, y, dx, dy
pub(crate) type PackedVertex = [i16; SHORTS_PER_VERTEX];

/// Vertex accumulator made of pooled [`Chunk`]s
///
/// The total vertex count always equals the sum of `used` over the held chunks.
/// Chunks go back to the pool on [`VertexData::clear`] and on drop.
pub struct VertexData {
    pool: ChunkPool,
    chunks: Vec<Box<Chunk>>,
    len: usize,
}

impl std::fmt::Debug for VertexData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexData")
            .field("len", &self.len)
            .field("chunks", &self.chunks.len())
            .finish()
    }
}

impl VertexData {
    pub fn new(pool: ChunkPool) -> Self {
        Self {
            pool,
            chunks: Vec::new(),
            len: 0,
        }
    }

    /// Number of vertices
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of chunks currently held
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Append one vertex, writing the color in RGBA byte order
    #[inline]
    pub fn push(&mut self, vertex: PackedVertex, color: Color) {
        self.push_rgba(vertex, color.to_rgba_bytes());
    }

    #[inline]
    pub(crate) fn push_rgba(&mut self, vertex: PackedVertex, rgba: [u8; BYTES_PER_COLOR]) {
        let needs_chunk = self.chunks.last().is_none_or(|chunk| chunk.is_full());
        if needs_chunk {
            self.chunks.push(self.pool.checkout());
        }
        if let Some(chunk) = self.chunks.last_mut() {
            chunk.push(vertex, rgba);
            self.len += 1;
        }
    }

    /// Vertex at `index` with its RGBA color
    pub fn get(&self, index: usize) -> Option<(PackedVertex, [u8; BYTES_PER_COLOR])> {
        if index >= self.len {
            return None;
        }
        // All chunks but the last one are full
        let chunk = self.chunks.get(index / CHUNK_VERTICES)?;
        Some(chunk.get(index % CHUNK_VERTICES))
    }

    /// Last written vertex
    #[inline]
    pub fn last(&self) -> Option<(PackedVertex, [u8; BYTES_PER_COLOR])> {
        self.len.checked_sub(1).and_then(|index| self.get(index))
    }

    /// Append all vertices and colors to flat buffers, returning the vertices written
    pub fn fill(&self, vertices: &mut Vec<i16>, colors: &mut Vec<u8>) -> usize {
        #[cfg(feature = "profiling")]
        profiling::scope!("vertex_data::fill");

        vertices.reserve(self.len * SHORTS_PER_VERTEX);
        colors.reserve(self.len * BYTES_PER_COLOR);
        let mut written = 0;
        for chunk in &self.chunks {
            vertices.extend_from_slice(chunk.vertices());
            colors.extend_from_slice(chunk.colors());
            written += chunk.used();
        }
        written
    }

    /// Release every chunk back to the pool
    pub fn clear(&mut self) {
        self.pool.release_all(self.chunks.drain(..));
        self.len = 0;
    }
}

impl Drop for VertexData {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(i: usize) -> PackedVertex {
        [i as i16, -(i as i16), 1, 2]
    }

    #[test]
    fn test_push_spans_chunks() {
        let pool = ChunkPool::new(16);
        let mut data = VertexData::new(pool.clone());
        for i in 0..(CHUNK_VERTICES * 2 + 5) {
            data.push(vertex(i), Color(0xFF112233));
        }
        assert_eq!(data.len(), CHUNK_VERTICES * 2 + 5);
        assert_eq!(data.chunk_count(), 3);
        assert_eq!(
            data.get(CHUNK_VERTICES + 1),
            Some((vertex(CHUNK_VERTICES + 1), [0x11, 0x22, 0x33, 0xFF]))
        );
        assert_eq!(data.last().map(|(v, _)| v), Some(vertex(CHUNK_VERTICES * 2 + 4)));
        assert_eq!(data.get(data.len()), None);
    }

    #[test]
    fn test_fill_matches_len() {
        let mut data = VertexData::new(ChunkPool::default());
        for i in 0..200 {
            data.push(vertex(i), Color(0x80FF0000));
        }
        let mut vbo = Vec::new();
        let mut colors = Vec::new();
        assert_eq!(data.fill(&mut vbo, &mut colors), 200);
        assert_eq!(vbo.len(), 200 * 4);
        assert_eq!(colors.len(), 200 * 4);
        assert_eq!(&vbo[4..8], &vertex(1));
        assert_eq!(&colors[0..4], &[0xFF, 0x00, 0x00, 0x80]);
    }

    #[test]
    fn test_clear_and_drop_return_chunks() {
        let pool = ChunkPool::new(16);
        {
            let mut data = VertexData::new(pool.clone());
            for i in 0..(CHUNK_VERTICES * 3) {
                data.push(vertex(i), Color::WHITE);
            }
            data.clear();
            assert!(data.is_empty());
            assert_eq!(pool.pooled(), 3);

            data.push(vertex(0), Color::WHITE);
            assert_eq!(pool.pooled(), 2);
        }
        assert_eq!(pool.pooled(), 3);
    }
}
