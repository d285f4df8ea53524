//! Upload sink that only keeps counts

use track_mesh_lib::{TrackBuffers, UploadSink};

/// Stands in for GPU buffer objects
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub uploads: usize,
    pub releases: usize,
    /// Size of the buffers currently "on the GPU"
    pub resident_bytes: usize,
    pub last_vertices: usize,
    pub last_arrow_vertices: usize,
}

impl UploadSink for RecordingSink {
    fn upload(&mut self, buffers: &TrackBuffers) -> bool {
        self.uploads += 1;
        self.resident_bytes = buffers.vertices.len() * std::mem::size_of::<i16>()
            + buffers.colors.len()
            + buffers.arrow_positions.len() * std::mem::size_of::<i16>()
            + buffers.arrow_color_coords.len() * std::mem::size_of::<i16>();
        self.last_vertices = buffers.num_vertices();
        self.last_arrow_vertices = buffers.num_arrow_vertices();
        tracing::trace!(
            vertices = self.last_vertices,
            bytes = self.resident_bytes,
            "Buffers uploaded"
        );
        true
    }

    fn release(&mut self) {
        self.releases += 1;
        self.resident_bytes = 0;
        self.last_vertices = 0;
        self.last_arrow_vertices = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_then_release() {
        let buffers = TrackBuffers {
            vertices: vec![0; 8],
            colors: vec![0xFF; 8],
            ..Default::default()
        };
        let mut sink = RecordingSink::default();

        assert!(sink.upload(&buffers));
        assert_eq!(sink.uploads, 1);
        assert_eq!(sink.last_vertices, 2);
        assert_eq!(sink.resident_bytes, 8 * 2 + 8);

        sink.release();
        assert_eq!(sink.releases, 1);
        assert_eq!(sink.resident_bytes, 0);
        assert_eq!(sink.last_vertices, 0);
    }
}
