use std::{
    fs::File,
    io::{BufRead, BufReader},
    marker::PhantomData,
    path::{Path, PathBuf},
};

use super::{
    CameraModelId, ColmapCamera, ColmapError, ColmapImage, ColmapPoint2d, ColmapPoint3d,
    ColmapTrackElement,
};

/// Line source shared by the COLMAP text readers.
///
/// Tracks the 1-based physical line number so that errors can point at the offending line.
pub struct LineReader<R> {
    reader: R,
    path: PathBuf,
    line_no: usize,
}

impl<R: BufRead> LineReader<R> {
    fn new(reader: R, path: PathBuf) -> Self {
        Self {
            reader,
            path,
            line_no: 0,
        }
    }

    /// Read the next physical line into `buf` without its line terminator.
    ///
    /// Returns `false` at end of input.
    fn read_physical(&mut self, buf: &mut String) -> Result<bool, ColmapError> {
        buf.clear();
        let mut raw = Vec::new();
        if self.reader.read_until(b'\n', &mut raw)? == 0 {
            return Ok(false);
        }
        self.line_no += 1;
        while matches!(raw.last(), Some(b'\n' | b'\r')) {
            raw.pop();
        }
        match std::str::from_utf8(&raw) {
            Ok(line) => buf.push_str(line),
            Err(e) => {
                return Err(self.error(
                    self.line_no,
                    &String::from_utf8_lossy(&raw),
                    format!("invalid UTF-8: {e}"),
                ))
            }
        }
        Ok(true)
    }

    /// Read the next line that is neither blank nor a `#` comment.
    fn read_record(&mut self, buf: &mut String) -> Result<bool, ColmapError> {
        while self.read_physical(buf)? {
            let trimmed = buf.trim_start();
            if !trimmed.is_empty() && !trimmed.starts_with('#') {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn error(&self, line: usize, content: &str, reason: impl Into<String>) -> ColmapError {
        ColmapError::ParseError {
            path: self.path.clone(),
            line,
            content: content.to_string(),
            reason: reason.into(),
        }
    }
}

/// A record type that can be read from a COLMAP text file.
pub trait TextRecord: Sized {
    /// Read the next record, or `None` at end of input.
    fn read_next<R: BufRead>(lines: &mut LineReader<R>) -> Result<Option<Self>, ColmapError>;
}

/// Lazy, forward-only sequence of records read from a COLMAP text file.
///
/// Only one record is held in memory at a time. The sequence stops after the first error.
pub struct TextRecords<R, T> {
    lines: LineReader<R>,
    failed: bool,
    _record: PhantomData<T>,
}

impl<T: TextRecord> TextRecords<BufReader<File>, T> {
    /// Open a file for streaming. Every call re-opens the file and starts from the beginning.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ColmapError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Ok(Self::from_reader(BufReader::new(file), path))
    }
}

impl<R: BufRead, T: TextRecord> TextRecords<R, T> {
    /// Stream records from an already opened reader. `source` names it in errors.
    pub fn from_reader(reader: R, source: impl Into<PathBuf>) -> Self {
        Self {
            lines: LineReader::new(reader, source.into()),
            failed: false,
            _record: PhantomData,
        }
    }
}

impl<R: BufRead, T: TextRecord> Iterator for TextRecords<R, T> {
    type Item = Result<T, ColmapError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match T::read_next(&mut self.lines) {
            Ok(record) => record.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Streaming reader over `cameras.txt`.
pub type CamerasTxt<R> = TextRecords<R, ColmapCamera>;

/// Streaming reader over `images.txt`.
pub type ImagesTxt<R> = TextRecords<R, ColmapImage>;

/// Streaming reader over `points3D.txt`.
pub type Points3dTxt<R> = TextRecords<R, ColmapPoint3d>;

/// Read the cameras.txt file and return a vector of ColmapCamera structs.
///
/// # Arguments
///
/// * `path` - The path to the cameras.txt file.
///
/// # Returns
///
/// A vector of ColmapCamera structs.
pub fn read_cameras_txt(path: impl AsRef<Path>) -> Result<Vec<ColmapCamera>, ColmapError> {
    CamerasTxt::open(path)?.collect()
}

/// Read the points3D.txt file and return a vector of ColmapPoint3d structs.
///
/// Prefer [`Points3dTxt::open`] for large reconstructions.
pub fn read_points3d_txt(path: impl AsRef<Path>) -> Result<Vec<ColmapPoint3d>, ColmapError> {
    Points3dTxt::open(path)?.collect()
}

/// Read the images.txt file and return a vector of ColmapImage structs.
pub fn read_images_txt(path: impl AsRef<Path>) -> Result<Vec<ColmapImage>, ColmapError> {
    ImagesTxt::open(path)?.collect()
}

/// Utility functions for parsing COLMAP text files
fn parse_part<T: std::str::FromStr>(s: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    s.parse::<T>().map_err(|e| format!("{}: {}", s, e))
}

fn parse_array<T: std::str::FromStr, const N: usize>(parts: &[&str]) -> Result<[T; N], String>
where
    T::Err: std::fmt::Display,
{
    parts
        .iter()
        .map(|s| parse_part(s))
        .collect::<Result<Vec<_>, _>>()?
        .try_into()
        .map_err(|_| format!("expected {} values", N))
}

/// Parse a camera line.
///       CAMERA_ID, MODEL, WIDTH, HEIGHT, PARAMS[0], PARAMS[1], ...
fn parse_camera_line(line: &str) -> Result<ColmapCamera, String> {
    let parts = line.split_whitespace().collect::<Vec<_>>();

    if parts.len() < 4 {
        return Err(format!("Invalid number of parts: {}", parts.len()));
    }

    let model_id = CameraModelId::from_name(parts[1])
        .ok_or_else(|| format!("Invalid camera model id: {}", parts[1]))?;

    let params = parts[4..]
        .iter()
        .map(|s| parse_part(s))
        .collect::<Result<Vec<f64>, _>>()?;

    if params.len() != model_id.num_params() {
        return Err(format!(
            "Invalid number of camera parameters for {}: expected {}, found {}",
            model_id.name(),
            model_id.num_params(),
            params.len()
        ));
    }

    Ok(ColmapCamera {
        camera_id: parse_part(parts[0])?,
        model_id,
        width: parse_part(parts[2])?,
        height: parse_part(parts[3])?,
        params,
    })
}

/// Parse a point3d line.
///       POINT3D_ID, X, Y, Z, R, G, B, ERROR, TRACK[] as (IMAGE_ID, POINT2D_IDX)
fn parse_point3d_line(line: &str) -> Result<ColmapPoint3d, String> {
    let parts = line.split_whitespace().collect::<Vec<_>>();

    if parts.len() < 8 || (parts.len() - 8) % 2 != 0 {
        return Err(format!("Invalid number of parts: {}", parts.len()));
    }

    Ok(ColmapPoint3d {
        point3d_id: parse_part(parts[0])?,
        xyz: parse_array(&parts[1..4])?,
        rgb: parse_array(&parts[4..7])?,
        error: parse_part(parts[7])?,
        track: parts[8..]
            .chunks_exact(2)
            .map(|chunk| -> Result<ColmapTrackElement, String> {
                Ok(ColmapTrackElement {
                    image_id: parse_part(chunk[0])?,
                    point2d_idx: parse_part(chunk[1])?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
    })
}

/// Parse the pose line of an image.
///       IMAGE_ID, QW, QX, QY, QZ, TX, TY, TZ, CAMERA_ID, NAME
fn parse_image_pose_line(line: &str) -> Result<ColmapImage, String> {
    let parts = line.split_whitespace().collect::<Vec<_>>();

    if parts.len() != 10 {
        return Err(format!("Invalid number of parts: {}", parts.len()));
    }

    Ok(ColmapImage {
        image_id: parse_part(parts[0])?,
        rotation: parse_array(&parts[1..5])?,
        translation: parse_array(&parts[5..8])?,
        camera_id: parse_part(parts[8])?,
        name: parts[9].to_string(),
        points2d: Vec::new(),
    })
}

/// Parse the observation line of an image.
///       POINTS2D[] as (X, Y, POINT3D_ID)
fn parse_image_points2d_line(line: &str) -> Result<Vec<ColmapPoint2d>, String> {
    let parts = line.split_whitespace().collect::<Vec<_>>();

    if parts.len() % 3 != 0 {
        return Err(format!(
            "Invalid number of parts: {} is not a multiple of 3",
            parts.len()
        ));
    }

    parts
        .chunks_exact(3)
        .map(|chunk| -> Result<ColmapPoint2d, String> {
            let point3d_id = match parse_part::<i64>(chunk[2])? {
                -1 => None,
                id => Some(u64::try_from(id).map_err(|_| format!("Invalid point3d id: {}", id))?),
            };
            Ok(ColmapPoint2d {
                xy: [parse_part(chunk[0])?, parse_part(chunk[1])?],
                point3d_id,
            })
        })
        .collect()
}

impl TextRecord for ColmapCamera {
    fn read_next<R: BufRead>(lines: &mut LineReader<R>) -> Result<Option<Self>, ColmapError> {
        let mut line = String::new();
        if !lines.read_record(&mut line)? {
            return Ok(None);
        }
        parse_camera_line(&line)
            .map(Some)
            .map_err(|reason| lines.error(lines.line_no, &line, reason))
    }
}

impl TextRecord for ColmapPoint3d {
    fn read_next<R: BufRead>(lines: &mut LineReader<R>) -> Result<Option<Self>, ColmapError> {
        let mut line = String::new();
        if !lines.read_record(&mut line)? {
            return Ok(None);
        }
        parse_point3d_line(&line)
            .map(Some)
            .map_err(|reason| lines.error(lines.line_no, &line, reason))
    }
}

impl TextRecord for ColmapImage {
    fn read_next<R: BufRead>(lines: &mut LineReader<R>) -> Result<Option<Self>, ColmapError> {
        let mut pose_line = String::new();
        if !lines.read_record(&mut pose_line)? {
            return Ok(None);
        }
        let mut image = parse_image_pose_line(&pose_line)
            .map_err(|reason| lines.error(lines.line_no, &pose_line, reason))?;

        // the observation line always follows the pose line, even when it is empty
        let mut points_line = String::new();
        if lines.read_physical(&mut points_line)? {
            image.points2d = parse_image_points2d_line(&points_line)
                .map_err(|reason| lines.error(lines.line_no, &points_line, reason))?;
        }

        Ok(Some(image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CAMERAS_TXT: &str = "# Camera list with one line of data per camera:\n\
        #   CAMERA_ID, MODEL, WIDTH, HEIGHT, PARAMS[]\n\
        # Number of cameras: 2\n\
        1 PINHOLE 1920 1080 1500 1500 960 540\n\
        2 SIMPLE_RADIAL 640 480 500 320 240 0.01\n";

    const IMAGES_TXT: &str = "# Image list with two lines of data per image:\n\
        #   IMAGE_ID, QW, QX, QY, QZ, TX, TY, TZ, CAMERA_ID, NAME\n\
        #   POINTS2D[] as (X, Y, POINT3D_ID)\n\
        1 1 0 0 0 0.5 -1.5 2 1 a.jpg\n\
        10.5 20.5 7 30 40 -1\n\
        2 0.7071 0 0.7071 0 1 2 3 2 b.jpg\n\
        \n\
        3 1 0 0 0 0 0 0 1 c.jpg\n\
        1 2 9\n";

    const POINTS3D_TXT: &str = "# 3D point list with one line of data per point:\n\
        #   POINT3D_ID, X, Y, Z, R, G, B, ERROR, TRACK[] as (IMAGE_ID, POINT2D_IDX)\n\
        7 0.1 0.2 0.3 255 128 0 0.5 1 0 3 0\n\
        9 -1 -2 -3 1 2 3 1.25\n";

    fn images(text: &str) -> ImagesTxt<&[u8]> {
        ImagesTxt::from_reader(text.as_bytes(), "images.txt")
    }

    #[test]
    fn test_read_cameras() -> Result<(), ColmapError> {
        let cameras = CamerasTxt::from_reader(CAMERAS_TXT.as_bytes(), "cameras.txt")
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(cameras.len(), 2);
        assert_eq!(cameras[0].camera_id, 1);
        assert_eq!(cameras[0].model_id, CameraModelId::Pinhole);
        assert_eq!(cameras[0].width, 1920);
        assert_eq!(cameras[0].height, 1080);
        assert_eq!(cameras[0].params, vec![1500.0, 1500.0, 960.0, 540.0]);
        assert_eq!(cameras[1].model_id, CameraModelId::SimpleRadial);
        Ok(())
    }

    #[test]
    fn test_read_images_pairs_lines() -> Result<(), ColmapError> {
        let images = images(IMAGES_TXT).collect::<Result<Vec<_>, _>>()?;
        assert_eq!(images.len(), 3);

        assert_eq!(images[0].image_id, 1);
        assert_eq!(images[0].translation, [0.5, -1.5, 2.0]);
        assert_eq!(images[0].name, "a.jpg");
        assert_eq!(images[0].points2d.len(), 2);
        assert_eq!(images[0].points2d[0].xy, [10.5, 20.5]);
        assert_eq!(images[0].points2d[0].point3d_id, Some(7));
        assert_eq!(images[0].points2d[1].point3d_id, None);

        // the blank observation line belongs to image 2, not a separator
        assert_eq!(images[1].image_id, 2);
        assert!(images[1].points2d.is_empty());
        assert_eq!(images[2].image_id, 3);
        assert_eq!(images[2].points2d[0].point3d_id, Some(9));
        Ok(())
    }

    #[test]
    fn test_read_images_missing_last_observation_line() -> Result<(), ColmapError> {
        let images = images("1 1 0 0 0 0 0 0 1 a.jpg").collect::<Result<Vec<_>, _>>()?;
        assert_eq!(images.len(), 1);
        assert!(images[0].points2d.is_empty());
        Ok(())
    }

    #[test]
    fn test_read_points3d() -> Result<(), ColmapError> {
        let points = Points3dTxt::from_reader(POINTS3D_TXT.as_bytes(), "points3D.txt")
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].point3d_id, 7);
        assert_eq!(points[0].xyz, [0.1, 0.2, 0.3]);
        assert_eq!(points[0].rgb, [255, 128, 0]);
        assert_eq!(points[0].error, 0.5);
        assert_eq!(
            points[0].track,
            vec![
                ColmapTrackElement {
                    image_id: 1,
                    point2d_idx: 0
                },
                ColmapTrackElement {
                    image_id: 3,
                    point2d_idx: 0
                },
            ]
        );
        assert!(points[1].track.is_empty());
        Ok(())
    }

    #[test]
    fn test_parse_error_has_context() {
        let text = "# header\n1 1 0 0 0 0 0 0 1 a.jpg\n1 2 nope\n";
        let mut records = images(text);
        match records.next() {
            Some(Err(ColmapError::ParseError {
                path,
                line,
                content,
                ..
            })) => {
                assert_eq!(path, PathBuf::from("images.txt"));
                assert_eq!(line, 3);
                assert_eq!(content, "1 2 nope");
            }
            other => panic!("expected parse error, got {other:?}"),
        }
        // the sequence is fused after an error
        assert!(records.next().is_none());
    }

    #[test]
    fn test_invalid_utf8_is_a_parse_error() {
        let data = b"# header\n1 1 0 0 0 0 0 0 1 caf\xe9.jpg\n\n";
        let result = ImagesTxt::from_reader(data.as_slice(), "images.txt")
            .collect::<Result<Vec<_>, _>>();
        match result {
            Err(ColmapError::ParseError {
                path,
                line,
                content,
                reason,
            }) => {
                assert_eq!(path, PathBuf::from("images.txt"));
                assert_eq!(line, 2);
                assert!(content.starts_with("1 1 0 0 0 0 0 0 1 caf"));
                assert!(reason.contains("UTF-8"));
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_field_counts() {
        let bad_cameras = [
            "1 PINHOLE 10 10 1 2 3",
            "1 NOT_A_MODEL 10 10 1 2 3 4",
            "1 PINHOLE",
            "x PINHOLE 10 10 1 2 3 4",
        ];
        for line in bad_cameras {
            let result = CamerasTxt::from_reader(line.as_bytes(), "cameras.txt")
                .collect::<Result<Vec<_>, _>>();
            assert!(
                matches!(result, Err(ColmapError::ParseError { line: 1, .. })),
                "{line}"
            );
        }

        let bad_points = ["1 0 0 0 1 2 3", "1 0 0 0 1 2 3 0.5 4", "1 0 0 0 300 2 3 0.5"];
        for line in bad_points {
            let result = Points3dTxt::from_reader(line.as_bytes(), "points3D.txt")
                .collect::<Result<Vec<_>, _>>();
            assert!(matches!(result, Err(ColmapError::ParseError { .. })), "{line}");
        }

        let result = images("1 1 0 0 0 0 0 0 1\n\n").collect::<Result<Vec<_>, _>>();
        assert!(matches!(result, Err(ColmapError::ParseError { line: 1, .. })));

        let result = images("1 1 0 0 0 0 0 0 1 a.jpg\n1 2 -5\n").collect::<Result<Vec<_>, _>>();
        assert!(matches!(result, Err(ColmapError::ParseError { line: 2, .. })));
    }

    #[test]
    fn test_open_restarts_from_beginning() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(POINTS3D_TXT.as_bytes())?;

        let first = Points3dTxt::open(file.path())?.collect::<Result<Vec<_>, _>>()?;
        let second = read_points3d_txt(file.path())?;
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        Ok(())
    }

    #[test]
    fn test_open_missing_file() {
        let result = CamerasTxt::open("/nonexistent/cameras.txt");
        assert!(matches!(result, Err(ColmapError::IoError(_))));
    }
}
