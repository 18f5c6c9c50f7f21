use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use super::{
    properties::{PlyDataType, PlyEncoding, PlyPropertyDefinition, PlyType},
    PlyError, PlyPropertyTrait,
};
use crate::pointcloud::PointCloud;

/// Maximum number of bytes scanned for `end_header` before giving up.
///
/// Real headers are a few hundred bytes; a truncated or corrupted file fails with
/// [`PlyError::UnterminatedHeader`] once this budget is spent instead of scanning the payload.
pub const MAX_HEADER_BYTES: u64 = 64 * 1024;

#[derive(Debug)]
struct PlyHeader {
    pub vertex_count: usize,
    pub properties: Vec<PlyPropertyDefinition>,
    pub format: PlyType,
    pub encoding: PlyEncoding,
}

fn parse_header<R: BufRead>(reader: &mut R) -> Result<PlyHeader, PlyError> {
    let mut limited = reader.take(MAX_HEADER_BYTES);
    let mut raw = Vec::new();
    let mut line_no = 0;

    let mut encoding = None;
    let mut vertex_count = None;
    let mut current_element: Option<String> = None;
    let mut properties = Vec::new();

    loop {
        raw.clear();
        // end of stream and an exhausted scan budget both leave the line without its newline
        limited.read_until(b'\n', &mut raw)?;
        if raw.last() != Some(&b'\n') {
            return Err(PlyError::UnterminatedHeader {
                limit: MAX_HEADER_BYTES,
            });
        }
        line_no += 1;

        let malformed = || PlyError::MalformedHeaderLine {
            line: line_no,
            content: String::from_utf8_lossy(&raw).trim_end().to_string(),
        };

        let line = std::str::from_utf8(&raw).map_err(|_| malformed())?;
        let trimmed = line.trim();

        if line_no == 1 {
            if trimmed != "ply" {
                return Err(PlyError::MissingMagic);
            }
            continue;
        }

        let parts = trimmed.split_whitespace().collect::<Vec<_>>();
        match parts.as_slice() {
            ["end_header"] => break,
            [] | ["comment", ..] | ["obj_info", ..] => {}
            ["format", kind, _version] => {
                encoding = Some(match *kind {
                    "binary_little_endian" => PlyEncoding::BinaryLittleEndian,
                    "binary_big_endian" => PlyEncoding::BinaryBigEndian,
                    other => return Err(PlyError::UnsupportedFormat(other.to_string())),
                });
            }
            ["element", name, count] => {
                if *name == "vertex" {
                    if let Some(previous) = current_element {
                        return Err(PlyError::VertexElementNotFirst(previous));
                    }
                    vertex_count = Some(count.parse::<usize>().map_err(|_| malformed())?);
                }
                current_element = Some(name.to_string());
            }
            ["property", "list", ..] => {
                if current_element.as_deref() == Some("vertex") {
                    return Err(PlyError::UnsupportedListProperty(trimmed.to_string()));
                }
            }
            ["property", data_type, name] => {
                let data_type = PlyDataType::parse(data_type)?;
                match current_element.as_deref() {
                    Some("vertex") => properties.push(PlyPropertyDefinition {
                        name: name.to_string(),
                        data_type,
                    }),
                    Some(_) => {}
                    None => return Err(malformed()),
                }
            }
            _ => return Err(malformed()),
        }
    }

    let encoding =
        encoding.ok_or_else(|| PlyError::UnsupportedFormat("missing format line".to_string()))?;
    let vertex_count = vertex_count.ok_or(PlyError::MissingVertexElement)?;
    let format = PlyType::detect_format(&properties)?;

    Ok(PlyHeader {
        vertex_count,
        properties,
        format,
        encoding,
    })
}

/// Read the vertex element of a binary PLY file into a point cloud.
///
/// Colors and normals are carried over when the header declares them.
pub fn read_ply_binary(path: impl AsRef<Path>) -> Result<PointCloud, PlyError> {
    let file = std::fs::File::open(path)?;
    read_ply_binary_from_reader(BufReader::new(file))
}

/// Read a binary PLY point cloud from a seekable stream.
///
/// The payload size implied by the header is checked against the bytes left in the stream
/// before any vertex is read.
pub fn read_ply_binary_from_reader<R: BufRead + Seek>(
    mut reader: R,
) -> Result<PointCloud, PlyError> {
    let header = parse_header(&mut reader)?;
    let row_size = header.format.size_of();

    let payload_start = reader.stream_position()?;
    let stream_end = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(payload_start))?;

    let available = stream_end.saturating_sub(payload_start);
    let expected = (header.vertex_count as u64)
        .checked_mul(row_size as u64)
        .unwrap_or(u64::MAX);
    if expected > available {
        return Err(PlyError::PayloadTooLarge {
            expected,
            available,
        });
    }

    log::debug!(
        "reading {} PLY vertices ({} properties, {} bytes per row, {:?})",
        header.vertex_count,
        header.properties.len(),
        row_size,
        header.encoding
    );

    let mut buffer = vec![0u8; row_size];
    let mut points = Vec::with_capacity(header.vertex_count);
    let mut colors = header
        .format
        .has_color()
        .then(|| Vec::with_capacity(header.vertex_count));
    let mut normals = header
        .format
        .has_normal()
        .then(|| Vec::with_capacity(header.vertex_count));

    for _ in 0..header.vertex_count {
        reader.read_exact(&mut buffer)?;
        let property_entry = header.format.deserialize(&buffer, header.encoding)?;
        points.push(property_entry.to_point());
        if let (Some(colors), Some(color)) = (colors.as_mut(), property_entry.to_color()) {
            colors.push(color);
        }
        if let (Some(normals), Some(normal)) = (normals.as_mut(), property_entry.to_normal()) {
            normals.push(normal);
        }
    }

    Ok(PointCloud::new(points, colors, normals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    const XYZ_RGB_HEADER: &str = "ply\nformat binary_little_endian 1.0\ncomment exported\nelement vertex 2\nproperty float x\nproperty float y\nproperty float z\nproperty uchar red\nproperty uchar green\nproperty uchar blue\nend_header\n";

    fn xyz_rgb_row(data: &mut Vec<u8>, p: [f32; 3], c: [u8; 3]) {
        for v in p {
            data.extend_from_slice(&v.to_le_bytes());
        }
        data.extend_from_slice(&c);
    }

    #[test]
    fn test_parse_header_basic() -> Result<(), PlyError> {
        let header_text = "ply\nformat binary_little_endian 1.0\nelement vertex 10\nproperty float x\nproperty float y\nproperty float z\nend_header\n";
        let mut reader = std::io::BufReader::new(header_text.as_bytes());
        let header = parse_header(&mut reader)?;
        assert_eq!(header.vertex_count, 10);
        assert_eq!(header.properties.len(), 3);
        assert_eq!(header.properties[0].name, "x");
        assert_eq!(header.properties[0].data_type, PlyDataType::Float32);
        assert_eq!(header.encoding, PlyEncoding::BinaryLittleEndian);
        Ok(())
    }

    #[test]
    fn test_parse_header_ignores_later_elements() -> Result<(), PlyError> {
        let header_text = "ply\nformat binary_big_endian 1.0\nelement vertex 5\nproperty double x\nproperty double y\nproperty double z\nelement face 1\nproperty list uchar int vertex_indices\nend_header\n";
        let mut reader = std::io::BufReader::new(header_text.as_bytes());
        let header = parse_header(&mut reader)?;
        assert_eq!(header.vertex_count, 5);
        assert_eq!(header.properties.len(), 3);
        assert_eq!(header.encoding, PlyEncoding::BinaryBigEndian);
        Ok(())
    }

    #[test]
    fn test_parse_header_errors() {
        let cases: [(&str, fn(&PlyError) -> bool); 7] = [
            ("plx\nend_header\n", |e| matches!(e, PlyError::MissingMagic)),
            (
                "ply\nformat ascii 1.0\nelement vertex 1\nend_header\n",
                |e| matches!(e, PlyError::UnsupportedFormat(_)),
            ),
            (
                "ply\nformat binary_little_endian 1.0\nelement vertex 1\nproperty half x\nend_header\n",
                |e| matches!(e, PlyError::UnknownPropertyType(t) if t == "half"),
            ),
            (
                "ply\nformat binary_little_endian 1.0\nelement face 1\nproperty uchar n\nelement vertex 1\nend_header\n",
                |e| matches!(e, PlyError::VertexElementNotFirst(_)),
            ),
            (
                "ply\nformat binary_little_endian 1.0\nelement vertex many\nend_header\n",
                |e| matches!(e, PlyError::MalformedHeaderLine { line: 3, .. }),
            ),
            (
                "ply\nformat binary_little_endian 1.0\nend_header\n",
                |e| matches!(e, PlyError::MissingVertexElement),
            ),
            (
                "ply\nformat binary_little_endian 1.0\nelement vertex 1\nproperty list uchar int idx\nend_header\n",
                |e| matches!(e, PlyError::UnsupportedListProperty(_)),
            ),
        ];

        for (text, check) in cases {
            let mut reader = std::io::BufReader::new(text.as_bytes());
            match parse_header(&mut reader) {
                Err(e) => assert!(check(&e), "{text:?} -> {e:?}"),
                Ok(header) => panic!("{text:?} parsed as {header:?}"),
            }
        }
    }

    #[test]
    fn test_unterminated_header_is_bounded() {
        // a header that never ends, followed by a large binary tail
        let mut data = b"ply\nformat binary_little_endian 1.0\nelement vertex 1\n".to_vec();
        data.extend(std::iter::repeat(b'\n').take(2 * MAX_HEADER_BYTES as usize));
        let result = read_ply_binary_from_reader(Cursor::new(data));
        assert!(matches!(
            result,
            Err(PlyError::UnterminatedHeader { limit }) if limit == MAX_HEADER_BYTES
        ));

        // binary garbage with no newline at all
        let mut data = b"ply\n".to_vec();
        data.extend(std::iter::repeat(0xffu8).take(2 * MAX_HEADER_BYTES as usize));
        let result = read_ply_binary_from_reader(Cursor::new(data));
        assert!(matches!(result, Err(PlyError::UnterminatedHeader { .. })));

        // plain end of file
        let result = read_ply_binary_from_reader(Cursor::new(b"ply\nformat".to_vec()));
        assert!(matches!(result, Err(PlyError::UnterminatedHeader { .. })));
    }

    #[test]
    fn test_payload_larger_than_stream() {
        let mut data = XYZ_RGB_HEADER.as_bytes().to_vec();
        xyz_rgb_row(&mut data, [1.0, 2.0, 3.0], [1, 2, 3]);
        let result = read_ply_binary_from_reader(Cursor::new(data));
        assert!(matches!(
            result,
            Err(PlyError::PayloadTooLarge {
                expected: 30,
                available: 15
            })
        ));

        let huge = "ply\nformat binary_little_endian 1.0\nelement vertex 18446744073709551615\nproperty double x\nproperty double y\nproperty double z\nend_header\n";
        let result = read_ply_binary_from_reader(Cursor::new(huge.as_bytes().to_vec()));
        assert!(matches!(result, Err(PlyError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_read_ply_binary_xyz_rgb() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = NamedTempFile::new()?;
        let mut data = XYZ_RGB_HEADER.as_bytes().to_vec();
        xyz_rgb_row(&mut data, [1.0, 2.0, 3.0], [255, 128, 0]);
        xyz_rgb_row(&mut data, [-1.0, 0.5, 0.0], [0, 0, 9]);
        file.write_all(&data)?;

        let pointcloud = read_ply_binary(file.path())?;
        assert_eq!(pointcloud.len(), 2);
        assert_eq!(pointcloud.points()[0], [1.0, 2.0, 3.0]);
        assert_eq!(pointcloud.points()[1], [-1.0, 0.5, 0.0]);
        assert_eq!(pointcloud.colors().map(|c| c[0]), Some([255, 128, 0]));
        assert!(pointcloud.normals().is_none());
        Ok(())
    }

    #[test]
    fn test_read_ply_binary_dynamic_format() -> Result<(), PlyError> {
        let header = "ply\nformat binary_little_endian 1.0\nelement vertex 1\nproperty float x\nproperty float y\nproperty float z\nproperty float nx\nproperty float ny\nproperty float nz\nproperty float intensity\nend_header\n";
        let mut data = header.as_bytes().to_vec();
        for v in [1.0f32, 2.0, 3.0, 0.0, 1.0, 0.0, 0.5] {
            data.extend_from_slice(&v.to_le_bytes());
        }

        let pointcloud = read_ply_binary_from_reader(Cursor::new(data))?;
        assert_eq!(pointcloud.len(), 1);
        assert_eq!(pointcloud.points()[0], [1.0, 2.0, 3.0]);
        assert!(pointcloud.colors().is_none());
        assert_eq!(pointcloud.normals().map(|n| n[0]), Some([0.0, 1.0, 0.0]));
        Ok(())
    }

    #[test]
    fn test_trailing_elements_are_ignored() -> Result<(), PlyError> {
        let header = "ply\nformat binary_little_endian 1.0\nelement vertex 1\nproperty float x\nproperty float y\nproperty float z\nelement face 1\nproperty list uchar int vertex_indices\nend_header\n";
        let mut data = header.as_bytes().to_vec();
        for v in [4.0f32, 5.0, 6.0] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        data.push(3);
        for i in [0i32, 0, 0] {
            data.extend_from_slice(&i.to_le_bytes());
        }

        let pointcloud = read_ply_binary_from_reader(Cursor::new(data))?;
        assert_eq!(pointcloud.points(), &[[4.0, 5.0, 6.0]]);
        Ok(())
    }

    #[test]
    fn test_read_ply_big_endian_floats() -> Result<(), PlyError> {
        let header = "ply\nformat binary_big_endian 1.0\nelement vertex 2\nproperty float x\nproperty float y\nproperty float z\nend_header\n";
        let mut data = header.as_bytes().to_vec();
        for v in [0.1f32, -2.7, 1e-3, 1234.567, 0.0, -0.25] {
            data.extend_from_slice(&v.to_be_bytes());
        }

        let pointcloud = read_ply_binary_from_reader(Cursor::new(data))?;
        let expected = [[0.1, -2.7, 1e-3], [1234.567, 0.0, -0.25]];
        for (point, expected) in pointcloud.points().iter().zip(expected) {
            for (v, e) in point.iter().zip(expected) {
                assert_relative_eq!(*v, e, max_relative = 1e-6);
            }
        }
        Ok(())
    }
}
